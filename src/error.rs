/// Error types for the ipgeo library
use std::fmt;

/// Result type alias for ipgeo operations
pub type Result<T> = std::result::Result<T, GeoError>;

/// Main error type for ipgeo operations
///
/// Per-query variants (`InvalidAddress`, `InvalidPrefix`, `InvalidInput`,
/// `NotFound`, `IndexUnready`) are returned to the caller of a single lookup
/// and never affect other queries. `DuplicateKey` is builder-internal and only
/// ever surfaces as a counted statistic. `SourceUnavailable` aborts one build
/// attempt without touching the snapshot that is currently serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoError {
    /// Text is neither an IP address nor CIDR notation
    InvalidAddress(String),

    /// Prefix length out of range for the address family
    InvalidPrefix(String),

    /// Malformed request (e.g. an empty bulk query)
    InvalidInput(String),

    /// No stored prefix covers the queried address
    NotFound(String),

    /// A (source, prefix) pair was already present in the build
    DuplicateKey {
        /// Record source
        source: String,
        /// Canonical prefix in CIDR notation
        prefix: String,
    },

    /// The row source could not be opened or streamed
    SourceUnavailable(String),

    /// The resolver has no snapshot installed yet
    IndexUnready,

    /// I/O errors
    Io(String),

    /// Snapshot bytes are corrupt or of an unsupported version
    Format(String),

    /// Serialization/deserialization errors
    Serialization(String),
}

impl GeoError {
    /// True for errors caused by the query text itself rather than the index
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            GeoError::InvalidAddress(_) | GeoError::InvalidPrefix(_) | GeoError::InvalidInput(_)
        )
    }
}

impl fmt::Display for GeoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoError::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),
            GeoError::InvalidPrefix(msg) => write!(f, "Invalid prefix: {}", msg),
            GeoError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            GeoError::NotFound(query) => write!(f, "No matching network for {}", query),
            GeoError::DuplicateKey { source, prefix } => {
                write!(f, "Duplicate record for source '{}' and {}", source, prefix)
            }
            GeoError::SourceUnavailable(msg) => write!(f, "Row source unavailable: {}", msg),
            GeoError::IndexUnready => write!(f, "No snapshot loaded"),
            GeoError::Io(msg) => write!(f, "I/O error: {}", msg),
            GeoError::Format(msg) => write!(f, "Format error: {}", msg),
            GeoError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for GeoError {}

impl From<std::io::Error> for GeoError {
    fn from(err: std::io::Error) -> Self {
        GeoError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GeoError {
    fn from(err: serde_json::Error) -> Self {
        GeoError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = GeoError::DuplicateKey {
            source: "csv_import".to_string(),
            prefix: "10.0.0.0/8".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Duplicate record for source 'csv_import' and 10.0.0.0/8"
        );
        assert_eq!(GeoError::IndexUnready.to_string(), "No snapshot loaded");
    }

    #[test]
    fn test_invalid_input_classification() {
        assert!(GeoError::InvalidAddress("x".into()).is_invalid_input());
        assert!(GeoError::InvalidPrefix("x".into()).is_invalid_input());
        assert!(!GeoError::NotFound("1.2.3.4".into()).is_invalid_input());
        assert!(!GeoError::IndexUnready.is_invalid_input());
    }
}

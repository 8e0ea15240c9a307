//! Response envelopes for front ends (HTTP handlers, the CLI)
//!
//! Both the single-query form (one address, or a comma-separated list) and
//! the bulk form (an array of strings) reduce to one batch resolution. Each
//! entry of the response carries the queried text under `ip`, plus the
//! record fields and `cidr` when it resolved. Entries that did not resolve
//! carry only `ip`.
//!
//! ```rust
//! use ipgeo::{api, Resolver, BuildOptions};
//! use ipgeo::source::IterSource;
//!
//! let resolver = Resolver::new();
//! resolver.rebuild(
//!     &IterSource::new(vec![vec![("cidr", "10.0.0.0/8"), ("city", "Berlin")]]),
//!     BuildOptions::default(),
//! )?;
//!
//! let envelope = api::lookup_envelope(&resolver, "10.0.0.1, 192.0.2.1");
//! assert_eq!(envelope.code, 200);
//! assert_eq!(envelope.data.len(), 2);
//! assert!(envelope.data[0].found());
//! assert!(!envelope.data[1].found());
//! # Ok::<(), ipgeo::GeoError>(())
//! ```

use crate::error::GeoError;
use crate::record::GeoRecord;
use crate::resolver::{BatchEntry, Resolver};
use serde::Serialize;

/// Response envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T> {
    /// HTTP-style status code
    pub code: u16,
    /// Status message
    pub msg: String,
    /// Payload
    pub data: T,
}

impl<T> Envelope<T> {
    /// Successful envelope around `data`
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            msg: "success".to_string(),
            data,
        }
    }
}

impl Envelope<String> {
    /// Error envelope for a rejected request
    pub fn bad_request(err: &GeoError) -> Self {
        Self {
            code: 400,
            msg: err.to_string(),
            data: String::new(),
        }
    }
}

/// One entry of a lookup response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupEntry {
    /// The queried text
    pub ip: String,
    /// Matched prefix in CIDR notation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    /// Matched record, flattened into the entry
    #[serde(flatten)]
    pub record: Option<GeoRecord>,
}

impl LookupEntry {
    /// Whether this entry resolved
    pub fn found(&self) -> bool {
        self.record.is_some()
    }

    fn not_found(ip: String) -> Self {
        Self {
            ip,
            cidr: None,
            record: None,
        }
    }
}

impl From<BatchEntry> for LookupEntry {
    fn from(entry: BatchEntry) -> Self {
        match entry.result {
            Ok(resolution) => Self {
                ip: entry.input,
                cidr: Some(resolution.prefix.to_string()),
                record: Some(resolution.record),
            },
            Err(_) => Self::not_found(entry.input),
        }
    }
}

/// Split a single-query path segment into its inputs
///
/// Comma-separated pieces are trimmed and empty pieces dropped. A segment
/// without commas is one input, kept even when empty so the caller's
/// fallback (e.g. the client address) can apply.
pub fn split_query_list(query: &str) -> Vec<String> {
    if !query.contains(',') {
        return vec![query.trim().to_string()];
    }
    query
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Basic syntax screen for bulk inputs
///
/// Accepts only characters that can appear in address or CIDR text:
/// hex digits, `.`, `:`, `/` and `-`.
pub fn is_plausible_address(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_hexdigit() || matches!(c, '.' | ':' | '/' | '-'))
}

/// Resolve a single or comma-separated query into an envelope
pub fn lookup_envelope(resolver: &Resolver, query: &str) -> Envelope<Vec<LookupEntry>> {
    let inputs = split_query_list(query);
    Envelope::success(
        resolver
            .resolve_batch(&inputs)
            .into_iter()
            .map(LookupEntry::from)
            .collect(),
    )
}

/// Resolve a bulk request
///
/// Inputs are trimmed and blank inputs dropped; inputs failing
/// [`is_plausible_address`] become not-found entries without touching the
/// index. An empty request is rejected.
pub fn bulk_lookup(
    resolver: &Resolver,
    inputs: &[String],
) -> Result<Envelope<Vec<LookupEntry>>, GeoError> {
    if inputs.is_empty() {
        return Err(GeoError::InvalidInput("IP list must not be empty".to_string()));
    }

    let inputs: Vec<&str> = inputs
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    let plausible: Vec<&str> = inputs
        .iter()
        .copied()
        .filter(|s| is_plausible_address(s))
        .collect();
    let mut resolved = resolver.resolve_batch(&plausible).into_iter();

    let data = inputs
        .iter()
        .map(|input| {
            if is_plausible_address(input) {
                resolved
                    .next()
                    .map(LookupEntry::from)
                    .unwrap_or_else(|| LookupEntry::not_found(input.to_string()))
            } else {
                LookupEntry::not_found(input.to_string())
            }
        })
        .collect();

    Ok(Envelope::success(data))
}

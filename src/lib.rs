//! ipgeo - IP Geolocation Resolution Engine
//!
//! ipgeo answers "what geographic and network metadata belongs to this IP
//! address?" from a large set of overlapping, multi-source network prefixes.
//! Lookups use longest-prefix matching over a binary trie with a fixed,
//! deterministic tie-break, and the whole index can be replaced while
//! readers keep running.
//!
//! # Quick Start
//!
//! ```rust
//! use ipgeo::{BuildOptions, Resolver};
//! use ipgeo::source::IterSource;
//!
//! let rows = IterSource::new(vec![
//!     vec![("cidr", "10.0.0.0/8"), ("country", "Germany"), ("confidence", "50")],
//!     vec![("cidr", "10.1.0.0/16"), ("country", "France"), ("confidence", "50")],
//! ]);
//!
//! let resolver = Resolver::new();
//! let stats = resolver.rebuild(&rows, BuildOptions::default())?;
//! assert_eq!(stats.rows_inserted, 2);
//!
//! // Host address: longest-prefix match
//! assert_eq!(resolver.resolve("10.1.2.3")?.record.country, "France");
//!
//! // CIDR: exact prefix only
//! assert!(resolver.resolve("10.0.0.0/24").is_err());
//! # Ok::<(), ipgeo::GeoError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   rows    ┌─────────────────┐  Snapshot  ┌──────────────┐
//! │ RowSource  │ ────────▶ │ SnapshotBuilder │ ─────────▶ │   Resolver   │
//! │ (CSV, ...) │           │ validate/dedup  │  (atomic   │ ArcSwap ptr  │
//! └────────────┘           └─────────────────┘   swap)    └──────┬───────┘
//!                                                                │ resolve()
//!                          ┌─────────────────────────────────────▼───────┐
//!                          │ Snapshot = PrefixIndex (trie) + RecordStore │
//!                          └─────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Response envelopes for front ends
pub mod api;
/// Row ingestion and deduplication
pub mod builder;
/// Error types
pub mod error;
/// Static field table for row extraction
pub mod fields;
/// Binary prefix trie
pub mod ip_tree;
/// Canonical network prefixes
pub mod prefix;
/// Geo-metadata records
pub mod record;
/// Query-facing resolver
pub mod resolver;
/// Immutable snapshots and their persistence
pub mod snapshot;
/// Row sources
pub mod source;
/// File watching and hot reload
pub mod watch;

pub use crate::builder::{BuildOptions, BuildStats, ConflictPolicy, SnapshotBuilder};
pub use crate::error::{GeoError, Result};
pub use crate::prefix::{AddressFamily, NetworkPrefix, QueryInput};
pub use crate::record::GeoRecord;
pub use crate::resolver::{BatchEntry, Resolution, Resolver};
pub use crate::snapshot::Snapshot;

/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

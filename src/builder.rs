//! Snapshot builder
//!
//! Consumes raw rows, validates and deduplicates them, and produces an
//! immutable [`Snapshot`]. Rows are never fatal: a row without a usable
//! `cidr` is counted as malformed, and a row whose (source, prefix) pair was
//! already accepted is counted as a duplicate and dropped. Only a source
//! that cannot be opened aborts the build.
//!
//! ```rust
//! use ipgeo::builder::{BuildOptions, SnapshotBuilder};
//! use ipgeo::source::IterSource;
//!
//! let rows = IterSource::new(vec![
//!     vec![("cidr", "10.0.0.0/8"), ("country", "DE")],
//!     vec![("cidr", "10.0.0.0/8"), ("country", "FR")], // duplicate, dropped
//! ]);
//!
//! let mut builder = SnapshotBuilder::new(BuildOptions::default());
//! builder.load(&rows)?;
//! let (snapshot, stats) = builder.finish()?;
//!
//! assert_eq!(stats.rows_inserted, 1);
//! assert_eq!(stats.rows_skipped(), 1);
//! assert_eq!(snapshot.resolve("10.1.2.3")?.record.country, "DE");
//! # Ok::<(), ipgeo::GeoError>(())
//! ```

use crate::error::GeoError;
use crate::fields;
use crate::ip_tree::PrefixIndex;
use crate::prefix::NetworkPrefix;
use crate::record::{GeoRecord, RecordStore, StoredRecord};
use crate::snapshot::{Snapshot, SnapshotMeta};
use crate::source::{Row, RowSource};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source assigned to rows that do not name one
pub const DEFAULT_SOURCE: &str = "csv_import";

/// Confidence assigned to rows that do not carry one
pub const DEFAULT_CONFIDENCE: u8 = 80;

/// Records committed to the trie per batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Rows between progress log lines
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 10_000;

/// Builder configuration
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Source for rows without a `source` field
    pub default_source: String,
    /// Confidence for rows without a `confidence` field
    pub default_confidence: u8,
    /// Records accumulated before committing to the trie
    pub batch_size: usize,
    /// Rows between progress log lines (0 disables)
    pub progress_interval: u64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            default_source: DEFAULT_SOURCE.to_string(),
            default_confidence: DEFAULT_CONFIDENCE,
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl BuildOptions {
    /// Set the default source name
    pub fn with_default_source(mut self, source: impl Into<String>) -> Self {
        self.default_source = source.into();
        self
    }

    /// Set the default confidence (clamped to 100)
    pub fn with_default_confidence(mut self, confidence: u8) -> Self {
        self.default_confidence = confidence.min(100);
        self
    }

    /// Set the commit batch size (at least 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the progress logging interval
    pub fn with_progress_interval(mut self, rows: u64) -> Self {
        self.progress_interval = rows;
        self
    }
}

/// How records of a previous snapshot interact with incoming rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Previous records win; incoming rows with the same key are dropped
    KeepExisting,
    /// Incoming rows replace previous records with the same key
    PreferIncoming,
}

/// Ingestion statistics for one build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Rows read from sources
    pub rows_seen: u64,
    /// Rows that became records
    pub rows_inserted: u64,
    /// Rows without a usable network, or unreadable rows
    pub rows_malformed: u64,
    /// Rows dropped because their (source, prefix) was already present
    pub rows_duplicate: u64,
    /// Records carried over from a previous snapshot
    pub records_carried: u64,
    /// Wall-clock build time
    pub elapsed: Duration,
}

impl BuildStats {
    /// Malformed plus duplicate rows
    pub fn rows_skipped(&self) -> u64 {
        self.rows_malformed + self.rows_duplicate
    }
}

/// Builds one snapshot from rows
pub struct SnapshotBuilder {
    options: BuildOptions,
    index: PrefixIndex,
    store: RecordStore,
    /// (source, prefix) pairs accepted so far
    seen: FxHashSet<(String, NetworkPrefix)>,
    /// Records waiting for the next batch commit
    pending: Vec<StoredRecord>,
    /// Previous records applied at finish (PreferIncoming only)
    deferred: Vec<StoredRecord>,
    next_seq: u64,
    stats: BuildStats,
    sources: Vec<String>,
    started: Instant,
}

impl SnapshotBuilder {
    /// Create a builder for a fresh snapshot
    pub fn new(options: BuildOptions) -> Self {
        let batch_size = options.batch_size.max(1);
        Self {
            options,
            index: PrefixIndex::new(),
            store: RecordStore::new(),
            seen: FxHashSet::default(),
            pending: Vec::with_capacity(batch_size),
            deferred: Vec::new(),
            next_seq: 0,
            stats: BuildStats::default(),
            sources: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Create a builder that starts from the records of `previous`
    ///
    /// Carried records keep their insertion sequence, so they rank as older
    /// than anything ingested by this build.
    pub fn seeded(previous: &Snapshot, policy: ConflictPolicy, options: BuildOptions) -> Self {
        let mut builder = Self::new(options);
        builder.next_seq = previous.records().max_seq().map_or(0, |s| s + 1);
        builder.sources.push(format!("seed:{}", previous.len()));

        let carried = previous.records().iter().map(|(_, r)| r.clone());
        match policy {
            ConflictPolicy::KeepExisting => {
                for stored in carried {
                    if builder
                        .seen
                        .insert((stored.record.source.clone(), stored.prefix))
                    {
                        builder.stats.records_carried += 1;
                        builder.pending.push(stored);
                    }
                }
            }
            ConflictPolicy::PreferIncoming => builder.deferred = carried.collect(),
        }
        builder
    }

    /// Build statistics so far
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Stream every row of `source` into the build
    ///
    /// Bad rows are counted and skipped. Fails with
    /// [`GeoError::SourceUnavailable`] when the source cannot be opened or
    /// its stream breaks partway; the partial build must then be discarded.
    pub fn load(&mut self, source: &dyn RowSource) -> Result<(), GeoError> {
        let description = source.describe();
        log::info!("Loading rows from {}", description);
        let rows = source.open()?;
        self.sources.push(description.clone());

        for row in rows {
            match row {
                Ok(row) => match self.add_row(&row) {
                    // Skips are counted inside add_row
                    Ok(())
                    | Err(GeoError::InvalidAddress(_))
                    | Err(GeoError::InvalidPrefix(_))
                    | Err(GeoError::DuplicateKey { .. }) => {}
                    Err(e) => return Err(e),
                },
                Err(e @ GeoError::SourceUnavailable(_)) => {
                    log::warn!(
                        "Aborting build: {} failed after {} rows: {}",
                        description,
                        self.stats.rows_seen,
                        e
                    );
                    return Err(e);
                }
                Err(e) => {
                    self.stats.rows_seen += 1;
                    self.stats.rows_malformed += 1;
                    log::debug!("Unreadable row {}: {}", self.stats.rows_seen, e);
                }
            }

            let interval = self.options.progress_interval;
            if interval > 0 && self.stats.rows_seen % interval == 0 {
                log::info!(
                    "Progress: processed={} inserted={} skipped={}",
                    self.stats.rows_seen,
                    self.stats.rows_inserted,
                    self.stats.rows_skipped()
                );
            }
        }
        Ok(())
    }

    /// Add one raw row
    ///
    /// On skip, returns the reason (`InvalidAddress`, `InvalidPrefix` or
    /// `DuplicateKey`) after counting it.
    pub fn add_row(&mut self, row: &Row) -> Result<(), GeoError> {
        self.stats.rows_seen += 1;

        let prefix = match fields::value(row, "cidr")
            .ok_or_else(|| GeoError::InvalidAddress("missing cidr".to_string()))
            .and_then(|cidr| cidr.parse::<NetworkPrefix>())
        {
            Ok(prefix) => prefix,
            Err(e) => {
                self.stats.rows_malformed += 1;
                log::debug!("Skipping row {}: {}", self.stats.rows_seen, e);
                return Err(e);
            }
        };

        let mut record = GeoRecord {
            source: fields::value(row, "source")
                .unwrap_or(&self.options.default_source)
                .to_string(),
            confidence: fields::integer(row, "confidence", self.options.default_confidence as i64)
                .clamp(0, 100) as u8,
            ..Default::default()
        };
        fields::extract_geo_fields(row, &mut record);

        self.insert(prefix, record)
    }

    /// Add one typed record for `prefix`
    ///
    /// Subject to the same (source, prefix) deduplication as rows.
    pub fn add_record(&mut self, prefix: NetworkPrefix, record: GeoRecord) -> Result<(), GeoError> {
        self.stats.rows_seen += 1;
        self.insert(prefix, record)
    }

    fn insert(&mut self, prefix: NetworkPrefix, record: GeoRecord) -> Result<(), GeoError> {
        if !self.seen.insert((record.source.clone(), prefix)) {
            self.stats.rows_duplicate += 1;
            log::debug!(
                "Dropping duplicate record for source '{}' and {}",
                record.source,
                prefix
            );
            return Err(GeoError::DuplicateKey {
                source: record.source,
                prefix: prefix.to_string(),
            });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.stats.rows_inserted += 1;
        self.pending.push(StoredRecord {
            seq,
            prefix,
            record,
        });

        if self.pending.len() >= self.options.batch_size {
            self.commit()?;
        }
        Ok(())
    }

    /// Commit pending records into the store and trie
    fn commit(&mut self) -> Result<(), GeoError> {
        for stored in self.pending.drain(..) {
            let prefix = stored.prefix;
            let id = self.store.push(stored.seq, prefix, stored.record);
            self.index.insert(&prefix, id)?;
        }
        Ok(())
    }

    /// Finish the build and return the snapshot with its statistics
    pub fn finish(mut self) -> Result<(Snapshot, BuildStats), GeoError> {
        for stored in std::mem::take(&mut self.deferred) {
            if self
                .seen
                .insert((stored.record.source.clone(), stored.prefix))
            {
                self.stats.records_carried += 1;
                self.pending.push(stored);
            }
        }
        self.commit()?;

        self.stats.elapsed = self.started.elapsed();
        let built_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        log::info!(
            "Build complete: processed={} inserted={} malformed={} duplicate={} carried={} in {:?}",
            self.stats.rows_seen,
            self.stats.rows_inserted,
            self.stats.rows_malformed,
            self.stats.rows_duplicate,
            self.stats.records_carried,
            self.stats.elapsed
        );

        let meta = SnapshotMeta {
            stats: self.stats.clone(),
            built_at,
            source: self.sources.join(", "),
        };
        Ok((
            Snapshot::from_parts(self.index, self.store, meta),
            self.stats,
        ))
    }
}

/// Build a snapshot from a single source
pub fn build_from(
    source: &dyn RowSource,
    options: BuildOptions,
) -> Result<(Snapshot, BuildStats), GeoError> {
    let mut builder = SnapshotBuilder::new(options);
    builder.load(source)?;
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{IterSource, Rows};

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_duplicate_is_counted_and_dropped() {
        let mut builder = SnapshotBuilder::new(BuildOptions::default());
        builder
            .add_row(&row(&[("cidr", "10.0.0.0/8"), ("city", "first")]))
            .unwrap();
        let err = builder
            .add_row(&row(&[("cidr", "10.0.0.0/8"), ("city", "second")]))
            .unwrap_err();
        assert!(matches!(err, GeoError::DuplicateKey { .. }));

        let (snapshot, stats) = builder.finish().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(stats.rows_duplicate, 1);
        assert_eq!(stats.rows_skipped(), 1);
        // First import wins, never overwritten
        assert_eq!(snapshot.resolve("10.0.0.1").unwrap().record.city, "first");
    }

    #[test]
    fn test_duplicate_detected_on_canonical_form() {
        let mut builder = SnapshotBuilder::new(BuildOptions::default());
        builder.add_row(&row(&[("cidr", "10.0.0.0/8")])).unwrap();
        assert!(builder.add_row(&row(&[("cidr", "10.9.9.9/8")])).is_err());
    }

    #[test]
    fn test_same_prefix_different_source_kept() {
        let mut builder = SnapshotBuilder::new(BuildOptions::default());
        builder
            .add_row(&row(&[("cidr", "10.0.0.0/8"), ("source", "a")]))
            .unwrap();
        builder
            .add_row(&row(&[("cidr", "10.0.0.0/8"), ("source", "b")]))
            .unwrap();
        let (snapshot, stats) = builder.finish().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(stats.rows_duplicate, 0);
    }

    #[test]
    fn test_malformed_rows_are_counted() {
        let mut builder = SnapshotBuilder::new(BuildOptions::default());
        assert!(builder.add_row(&row(&[("country", "DE")])).is_err());
        assert!(builder.add_row(&row(&[("cidr", "")])).is_err());
        assert!(builder.add_row(&row(&[("cidr", "not-a-network")])).is_err());
        assert!(builder.add_row(&row(&[("cidr", "10.0.0.0/99")])).is_err());
        builder.add_row(&row(&[("cidr", "10.0.0.1")])).unwrap();

        let (snapshot, stats) = builder.finish().unwrap();
        assert_eq!(stats.rows_seen, 5);
        assert_eq!(stats.rows_malformed, 4);
        assert_eq!(stats.rows_inserted, 1);
        // Bare address becomes a host prefix
        assert!(snapshot.resolve("10.0.0.1/32").is_ok());
    }

    #[test]
    fn test_source_and_confidence_defaults() {
        let options = BuildOptions::default()
            .with_default_source("ipip")
            .with_default_confidence(60);
        let mut builder = SnapshotBuilder::new(options);
        builder.add_row(&row(&[("cidr", "10.0.0.0/8")])).unwrap();
        builder
            .add_row(&row(&[("cidr", "11.0.0.0/8"), ("confidence", "250")]))
            .unwrap();
        builder
            .add_row(&row(&[("cidr", "12.0.0.0/8"), ("confidence", "high")]))
            .unwrap();
        let (snapshot, _) = builder.finish().unwrap();

        let r = &snapshot.resolve("10.0.0.1").unwrap().record;
        assert_eq!(r.source, "ipip");
        assert_eq!(r.confidence, 60);
        assert_eq!(snapshot.resolve("11.0.0.1").unwrap().record.confidence, 100);
        assert_eq!(snapshot.resolve("12.0.0.1").unwrap().record.confidence, 60);
    }

    #[test]
    fn test_batch_size_has_no_semantic_effect() {
        let rows: Vec<Vec<(String, String)>> = (0..50)
            .map(|i| vec![("cidr".to_string(), format!("10.{}.0.0/16", i))])
            .collect();
        let source = IterSource::new(rows);

        let (a, _) = build_from(&source, BuildOptions::default().with_batch_size(1)).unwrap();
        let (b, _) = build_from(&source, BuildOptions::default().with_batch_size(7)).unwrap();
        let (c, _) = build_from(&source, BuildOptions::default()).unwrap();

        for i in 0..50 {
            let addr = format!("10.{}.1.1", i);
            let expected = &a.resolve(&addr).unwrap().prefix;
            assert_eq!(&b.resolve(&addr).unwrap().prefix, expected);
            assert_eq!(&c.resolve(&addr).unwrap().prefix, expected);
        }
        assert_eq!(a.node_counts(), c.node_counts());
    }

    #[test]
    fn test_seeded_keep_existing() {
        let (previous, _) = build_from(
            &IterSource::new(vec![vec![("cidr", "10.0.0.0/8"), ("city", "old")]]),
            BuildOptions::default(),
        )
        .unwrap();

        let mut builder = SnapshotBuilder::seeded(
            &previous,
            ConflictPolicy::KeepExisting,
            BuildOptions::default(),
        );
        builder
            .load(&IterSource::new(vec![
                vec![("cidr", "10.0.0.0/8"), ("city", "new")],
                vec![("cidr", "11.0.0.0/8"), ("city", "added")],
            ]))
            .unwrap();
        let (snapshot, stats) = builder.finish().unwrap();

        assert_eq!(snapshot.resolve("10.0.0.1").unwrap().record.city, "old");
        assert_eq!(snapshot.resolve("11.0.0.1").unwrap().record.city, "added");
        assert_eq!(stats.records_carried, 1);
        assert_eq!(stats.rows_duplicate, 1);
    }

    #[test]
    fn test_seeded_prefer_incoming() {
        let (previous, _) = build_from(
            &IterSource::new(vec![
                vec![("cidr", "10.0.0.0/8"), ("city", "old")],
                vec![("cidr", "12.0.0.0/8"), ("city", "kept")],
            ]),
            BuildOptions::default(),
        )
        .unwrap();

        let mut builder = SnapshotBuilder::seeded(
            &previous,
            ConflictPolicy::PreferIncoming,
            BuildOptions::default(),
        );
        builder
            .load(&IterSource::new(vec![vec![
                ("cidr", "10.0.0.0/8"),
                ("city", "new"),
            ]]))
            .unwrap();
        let (snapshot, stats) = builder.finish().unwrap();

        assert_eq!(snapshot.resolve("10.0.0.1").unwrap().record.city, "new");
        assert_eq!(snapshot.resolve("12.0.0.1").unwrap().record.city, "kept");
        assert_eq!(stats.records_carried, 1);
        assert_eq!(stats.rows_duplicate, 0);

        // Carried records keep their older sequence numbers
        let kept = snapshot.resolve("12.0.0.1").unwrap().seq;
        let new = snapshot.resolve("10.0.0.1").unwrap().seq;
        assert!(kept < new);
    }

    /// Rows, then a broken stream
    struct TruncatedSource;

    impl RowSource for TruncatedSource {
        fn open(&self) -> Result<Rows, GeoError> {
            let rows: Vec<Result<Row, GeoError>> = vec![
                Ok(row(&[("cidr", "10.0.0.0/8")])),
                Err(GeoError::Format("bad CSV record".to_string())),
                Ok(row(&[("cidr", "11.0.0.0/8")])),
                Err(GeoError::SourceUnavailable("read failed".to_string())),
                Ok(row(&[("cidr", "12.0.0.0/8")])),
            ];
            Ok(Box::new(rows.into_iter()))
        }

        fn describe(&self) -> String {
            "truncated".to_string()
        }
    }

    #[test]
    fn test_broken_stream_aborts_load() {
        let mut builder = SnapshotBuilder::new(BuildOptions::default());
        let err = builder.load(&TruncatedSource).unwrap_err();
        assert!(matches!(err, GeoError::SourceUnavailable(_)));

        // Rows before the break were seen; nothing after it was
        let stats = builder.stats();
        assert_eq!(stats.rows_seen, 3);
        assert_eq!(stats.rows_inserted, 2);
        assert_eq!(stats.rows_malformed, 1);
    }

    #[test]
    fn test_unavailable_source_aborts() {
        let mut builder = SnapshotBuilder::new(BuildOptions::default());
        let err = builder
            .load(&crate::source::CsvSource::new("/nonexistent/rows.csv"))
            .unwrap_err();
        assert!(matches!(err, GeoError::SourceUnavailable(_)));
    }
}

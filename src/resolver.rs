//! Query-facing resolver with lock-free snapshot swapping
//!
//! The resolver holds a single atomic reference to the current snapshot.
//! Every query loads that reference once at entry and works against it to
//! completion, so a concurrent [`Resolver::reload`] is never observed half
//! way. Reloads replace the whole snapshot; there is no in-place update.
//!
//! ```rust
//! use ipgeo::{BuildOptions, Resolver, GeoError};
//! use ipgeo::source::IterSource;
//!
//! let resolver = Resolver::new();
//! assert!(matches!(resolver.resolve("10.0.0.1"), Err(GeoError::IndexUnready)));
//!
//! let rows = IterSource::new(vec![vec![("cidr", "10.0.0.0/8"), ("country", "DE")]]);
//! resolver.rebuild(&rows, BuildOptions::default())?;
//!
//! let hit = resolver.resolve("10.1.2.3")?;
//! assert_eq!(hit.record.country, "DE");
//! assert_eq!(hit.prefix.to_string(), "10.0.0.0/8");
//! # Ok::<(), ipgeo::GeoError>(())
//! ```

use crate::builder::{BuildOptions, BuildStats, SnapshotBuilder};
use crate::error::GeoError;
use crate::prefix::{parse_input, NetworkPrefix};
use crate::record::GeoRecord;
use crate::snapshot::Snapshot;
use crate::source::RowSource;
use arc_swap::ArcSwapOption;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Batches at least this large are resolved in parallel
pub const PARALLEL_BATCH_THRESHOLD: usize = 256;

/// A successful resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    /// The winning record
    pub record: GeoRecord,
    /// The prefix the record was declared for
    pub prefix: NetworkPrefix,
    /// Generation of the snapshot that answered
    pub generation: u64,
}

/// One entry of a batch result, in input order
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    /// The input text, verbatim
    pub input: String,
    /// Resolution or the per-item failure
    pub result: Result<Resolution, GeoError>,
}

/// A snapshot together with the generation it was installed as
#[derive(Debug)]
struct Installed {
    generation: u64,
    snapshot: Arc<Snapshot>,
}

/// Resolver holding the current snapshot
#[derive(Debug, Default)]
pub struct Resolver {
    current: ArcSwapOption<Installed>,
    /// Generation counter; 0 means nothing installed yet
    generation: AtomicU64,
    /// Serializes builds and installs; never taken by queries
    build_lock: Mutex<()>,
}

impl Resolver {
    /// Create a resolver with no snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver serving `snapshot`
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let resolver = Self::new();
        resolver.reload(snapshot);
        resolver
    }

    /// Install a new snapshot, returning the previous one
    ///
    /// Queries already running keep the snapshot they loaded. Installs are
    /// serialized with builds, so generations only ever increase.
    pub fn reload(&self, snapshot: impl Into<Arc<Snapshot>>) -> Option<Arc<Snapshot>> {
        let _guard = self.lock_builds();
        self.install(snapshot.into())
    }

    /// Build a snapshot from `source` and install it
    ///
    /// Builds are serialized; queries keep using the current snapshot while
    /// this runs. If the source cannot be opened or breaks partway nothing
    /// is installed and the current snapshot keeps serving.
    pub fn rebuild(
        &self,
        source: &dyn RowSource,
        options: BuildOptions,
    ) -> Result<BuildStats, GeoError> {
        let _guard = self.lock_builds();
        let mut builder = SnapshotBuilder::new(options);
        builder.load(source)?;
        let (snapshot, stats) = builder.finish()?;
        self.install(Arc::new(snapshot));
        Ok(stats)
    }

    fn lock_builds(&self) -> MutexGuard<'_, ()> {
        self.build_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Caller holds `build_lock`
    fn install(&self, snapshot: Arc<Snapshot>) -> Option<Arc<Snapshot>> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let records = snapshot.len();
        let previous = self.current.swap(Some(Arc::new(Installed {
            generation,
            snapshot,
        })));
        log::info!(
            "Installed snapshot generation {} ({} records)",
            generation,
            records
        );
        previous.map(|installed| Arc::clone(&installed.snapshot))
    }

    /// Current snapshot, if one is installed
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current
            .load_full()
            .map(|installed| Arc::clone(&installed.snapshot))
    }

    /// Generation of the current snapshot (0 before the first install)
    pub fn generation(&self) -> u64 {
        let current = self.current.load();
        (*current)
            .as_ref()
            .map_or(0, |installed| installed.generation)
    }

    /// True once a snapshot is installed
    pub fn is_ready(&self) -> bool {
        self.current.load().is_some()
    }

    /// Resolve an address (longest-prefix match) or CIDR (exact match)
    pub fn resolve(&self, input: &str) -> Result<Resolution, GeoError> {
        let installed = self.current.load_full().ok_or(GeoError::IndexUnready)?;
        resolve_in(&installed, input)
    }

    /// Resolve many inputs against one snapshot, preserving order
    ///
    /// Every input yields exactly one entry; invalid or empty inputs become
    /// per-entry failures and never affect the rest of the batch.
    pub fn resolve_batch<S: AsRef<str> + Sync>(&self, inputs: &[S]) -> Vec<BatchEntry> {
        let installed = self.current.load_full();
        let resolve_one = |input: &S| {
            let input = input.as_ref();
            BatchEntry {
                input: input.to_string(),
                result: match &installed {
                    Some(installed) => resolve_in(installed, input),
                    None => Err(GeoError::IndexUnready),
                },
            }
        };

        if inputs.len() >= PARALLEL_BATCH_THRESHOLD {
            inputs.par_iter().map(resolve_one).collect()
        } else {
            inputs.iter().map(resolve_one).collect()
        }
    }
}

fn resolve_in(installed: &Installed, input: &str) -> Result<Resolution, GeoError> {
    let query = parse_input(input)?;
    let stored = installed
        .snapshot
        .lookup(&query)
        .ok_or_else(|| GeoError::NotFound(input.trim().to_string()))?;
    Ok(Resolution {
        record: stored.record.clone(),
        prefix: stored.prefix,
        generation: installed.generation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::IterSource;

    fn resolver_with(rows: Vec<Vec<(&str, &str)>>) -> Resolver {
        let resolver = Resolver::new();
        resolver
            .rebuild(&IterSource::new(rows), BuildOptions::default())
            .unwrap();
        resolver
    }

    #[test]
    fn test_index_unready_is_distinct() {
        let resolver = Resolver::new();
        assert!(!resolver.is_ready());
        assert_eq!(resolver.generation(), 0);
        assert_eq!(resolver.resolve("10.0.0.1"), Err(GeoError::IndexUnready));

        let batch = resolver.resolve_batch(&["10.0.0.1"]);
        assert_eq!(batch[0].result, Err(GeoError::IndexUnready));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let resolver = resolver_with(vec![
            vec![("cidr", "10.0.0.0/8"), ("confidence", "50"), ("city", "wide")],
            vec![("cidr", "10.1.0.0/16"), ("confidence", "50"), ("city", "narrow")],
        ]);
        assert_eq!(resolver.resolve("10.1.2.3").unwrap().record.city, "narrow");
        assert_eq!(resolver.resolve("10.2.2.3").unwrap().record.city, "wide");
    }

    #[test]
    fn test_not_found_vs_invalid() {
        let resolver = resolver_with(vec![vec![("cidr", "10.0.0.0/8")]]);
        assert!(matches!(
            resolver.resolve("192.0.2.1"),
            Err(GeoError::NotFound(_))
        ));
        assert!(matches!(
            resolver.resolve("bad!ip"),
            Err(GeoError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_batch_order_and_failures() {
        let resolver = resolver_with(vec![vec![("cidr", "10.0.0.0/8")]]);
        let batch = resolver.resolve_batch(&["bad!ip", "10.0.0.1", ""]);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].input, "bad!ip");
        assert!(batch[0].result.is_err());
        assert!(batch[1].result.is_ok());
        assert_eq!(batch[2].input, "");
        assert!(batch[2].result.is_err());
    }

    #[test]
    fn test_parallel_batch_preserves_order() {
        let resolver = resolver_with(vec![vec![("cidr", "10.0.0.0/8")]]);
        let inputs: Vec<String> = (0..1000)
            .map(|i| {
                if i % 3 == 0 {
                    format!("10.0.{}.{}", i / 256, i % 256)
                } else {
                    format!("junk-{}", i)
                }
            })
            .collect();
        let batch = resolver.resolve_batch(&inputs);
        assert_eq!(batch.len(), inputs.len());
        for (i, entry) in batch.iter().enumerate() {
            assert_eq!(entry.input, inputs[i]);
            assert_eq!(entry.result.is_ok(), i % 3 == 0);
        }
    }

    #[test]
    fn test_reload_bumps_generation_and_returns_previous() {
        let resolver = resolver_with(vec![vec![("cidr", "10.0.0.0/8")]]);
        assert_eq!(resolver.generation(), 1);
        let held = resolver.snapshot().unwrap();

        let previous = resolver.reload(Snapshot::empty()).unwrap();
        assert!(Arc::ptr_eq(&held, &previous));
        assert_eq!(resolver.generation(), 2);
        assert!(matches!(
            resolver.resolve("10.0.0.1"),
            Err(GeoError::NotFound(_))
        ));
        // The old snapshot stays usable by whoever holds it
        assert!(held.resolve("10.0.0.1").is_ok());
    }

    #[test]
    fn test_failed_rebuild_keeps_current() {
        let resolver = resolver_with(vec![vec![("cidr", "10.0.0.0/8")]]);
        let err = resolver
            .rebuild(
                &crate::source::CsvSource::new("/nonexistent/rows.csv"),
                BuildOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, GeoError::SourceUnavailable(_)));
        assert_eq!(resolver.generation(), 1);
        assert!(resolver.resolve("10.0.0.1").is_ok());
    }
}

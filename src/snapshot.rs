//! Immutable snapshots: one prefix index plus its record store
//!
//! A snapshot is produced by one builder run and never mutated afterwards.
//! It can be written to disk and reopened so a process can warm-start
//! without re-reading the row source.
//!
//! # File format
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  Magic "IPGEOSNP" (8 bytes)          │
//! │  Format version (u32, big-endian)    │
//! │  Body: gzip(JSON {meta,store,index}) │
//! └──────────────────────────────────────┘
//! ```

use crate::builder::BuildStats;
use crate::error::GeoError;
use crate::ip_tree::PrefixIndex;
use crate::prefix::{parse_input, NetworkPrefix, QueryInput};
use crate::record::{RecordId, RecordStore, StoredRecord};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Magic bytes at the start of every snapshot file
pub const SNAPSHOT_MAGIC: &[u8; 8] = b"IPGEOSNP";

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

const HEADER_LEN: usize = SNAPSHOT_MAGIC.len() + 4;

/// Descriptive metadata carried by a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Statistics of the build that produced the snapshot
    pub stats: BuildStats,
    /// Build completion time, seconds since the Unix epoch
    pub built_at: u64,
    /// Description of the row source(s)
    pub source: String,
}

/// One complete, immutable build of the prefix index and its records
#[derive(Debug, Clone)]
pub struct Snapshot {
    index: PrefixIndex,
    store: RecordStore,
    meta: SnapshotMeta,
}

#[derive(Serialize)]
struct SnapshotBodyRef<'a> {
    meta: &'a SnapshotMeta,
    store: &'a RecordStore,
    index: &'a PrefixIndex,
}

#[derive(Deserialize)]
struct SnapshotBody {
    meta: SnapshotMeta,
    store: RecordStore,
    index: PrefixIndex,
}

impl Snapshot {
    pub(crate) fn from_parts(index: PrefixIndex, store: RecordStore, meta: SnapshotMeta) -> Self {
        Self { index, store, meta }
    }

    /// A snapshot with no records
    pub fn empty() -> Self {
        Self::from_parts(PrefixIndex::new(), RecordStore::new(), SnapshotMeta::default())
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// True when the snapshot holds no records
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Snapshot metadata
    pub fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    /// Backing record store
    pub fn records(&self) -> &RecordStore {
        &self.store
    }

    /// Trie node counts per family (v4, v6)
    pub fn node_counts(&self) -> (usize, usize) {
        self.index.node_counts()
    }

    /// Record count per source
    pub fn source_counts(&self) -> BTreeMap<String, usize> {
        self.store.source_counts()
    }

    /// Resolve parsed input against this snapshot
    ///
    /// Hosts use longest-prefix match; networks require an exact prefix.
    /// Returns `None` when nothing matches.
    pub fn lookup(&self, input: &QueryInput) -> Option<&StoredRecord> {
        let candidates = match input {
            QueryInput::Host(addr) => self.index.longest_match(*addr)?.records,
            QueryInput::Network(prefix) => self.index.exact_match(prefix)?,
        };
        self.select(candidates)
    }

    /// Parse and resolve query text against this snapshot
    pub fn resolve(&self, text: &str) -> Result<&StoredRecord, GeoError> {
        let input = parse_input(text)?;
        self.lookup(&input)
            .ok_or_else(|| GeoError::NotFound(text.trim().to_string()))
    }

    /// Every record declared for exactly `prefix`, in insertion order
    pub fn records_for(&self, prefix: &NetworkPrefix) -> Vec<&StoredRecord> {
        self.index
            .exact_match(prefix)
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.store.get(*id))
            .collect()
    }

    /// Pick the winner among candidates at one node
    ///
    /// Highest confidence first, then the largest insertion sequence.
    fn select(&self, candidates: &[RecordId]) -> Option<&StoredRecord> {
        candidates
            .iter()
            .filter_map(|id| self.store.get(*id))
            .max_by_key(|stored| (stored.record.confidence, stored.seq))
    }

    /// Serialize to the snapshot file format
    pub fn to_bytes(&self) -> Result<Vec<u8>, GeoError> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.store.len() * 64);
        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_be_bytes());

        let mut encoder = GzEncoder::new(out, Compression::default());
        serde_json::to_writer(
            &mut encoder,
            &SnapshotBodyRef {
                meta: &self.meta,
                store: &self.store,
                index: &self.index,
            },
        )?;
        Ok(encoder.finish()?)
    }

    /// Deserialize from the snapshot file format
    ///
    /// The header is checked, the decoded index is validated against the
    /// record store and every stored prefix must be canonical, so corrupt
    /// input yields an error rather than a panic.
    pub fn from_bytes(data: &[u8]) -> Result<Self, GeoError> {
        if data.len() < HEADER_LEN || &data[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
            return Err(GeoError::Format("not an ipgeo snapshot".to_string()));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&data[SNAPSHOT_MAGIC.len()..HEADER_LEN]);
        let version = u32::from_be_bytes(version);
        if version != SNAPSHOT_VERSION {
            return Err(GeoError::Format(format!(
                "unsupported snapshot version {} (expected {})",
                version, SNAPSHOT_VERSION
            )));
        }

        let body: SnapshotBody = serde_json::from_reader(GzDecoder::new(&data[HEADER_LEN..]))?;
        body.index.validate(body.store.len())?;
        if let Some((id, stored)) = body.store.iter().find(|(_, r)| !r.prefix.is_canonical()) {
            return Err(GeoError::Format(format!(
                "record {} has a malformed prefix",
                id.0
            )));
        }
        Ok(Self::from_parts(body.index, body.store, body.meta))
    }

    /// Write the snapshot to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), GeoError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let mut file = File::create(path)
            .map_err(|e| GeoError::Io(format!("Failed to create {}: {}", path.display(), e)))?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    }

    /// Open a snapshot file using memory mapping
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GeoError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| GeoError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

        // SAFETY: the map is read-only and dropped before this function
        // returns; decoding copies everything it keeps.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| GeoError::Io(format!("Failed to mmap {}: {}", path.display(), e)))?;

        Self::from_bytes(&mmap[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::GeoRecord;

    fn snapshot(entries: &[(&str, &str, u8, u64)]) -> Snapshot {
        let mut index = PrefixIndex::new();
        let mut store = RecordStore::new();
        for (cidr, source, confidence, seq) in entries {
            let prefix: NetworkPrefix = cidr.parse().unwrap();
            let id = store.push(
                *seq,
                prefix,
                GeoRecord {
                    source: source.to_string(),
                    confidence: *confidence,
                    ..Default::default()
                },
            );
            index.insert(&prefix, id).unwrap();
        }
        Snapshot::from_parts(index, store, SnapshotMeta::default())
    }

    #[test]
    fn test_confidence_tie_break() {
        let snap = snapshot(&[("10.0.0.0/8", "a", 90, 1), ("10.0.0.0/8", "b", 40, 2)]);
        assert_eq!(snap.resolve("10.0.0.1").unwrap().record.source, "a");
    }

    #[test]
    fn test_equal_confidence_most_recent_wins() {
        let snap = snapshot(&[
            ("10.0.0.0/8", "a", 50, 1),
            ("10.0.0.0/8", "b", 50, 3),
            ("10.0.0.0/8", "c", 50, 2),
        ]);
        assert_eq!(snap.resolve("10.0.0.1").unwrap().record.source, "b");
    }

    #[test]
    fn test_cidr_requires_exact_match() {
        let snap = snapshot(&[("10.0.0.0/8", "a", 50, 1)]);
        assert!(snap.resolve("10.0.0.5").is_ok());
        assert!(snap.resolve("10.0.0.0/8").is_ok());
        assert!(matches!(
            snap.resolve("10.0.0.0/24"),
            Err(GeoError::NotFound(_))
        ));
    }

    #[test]
    fn test_records_for_prefix() {
        let snap = snapshot(&[("10.0.0.0/8", "a", 50, 1), ("10.0.0.0/8", "b", 60, 2)]);
        let all = snap.records_for(&"10.0.0.0/8".parse().unwrap());
        assert_eq!(all.len(), 2);
        assert!(snap.records_for(&"10.0.0.0/9".parse().unwrap()).is_empty());
    }

    #[test]
    fn test_round_trip_bytes() {
        let snap = snapshot(&[
            ("10.0.0.0/8", "a", 50, 1),
            ("10.1.0.0/16", "b", 50, 2),
            ("2001:db8::/32", "c", 70, 3),
        ]);
        let bytes = snap.to_bytes().unwrap();
        assert_eq!(&bytes[..8], SNAPSHOT_MAGIC);

        let loaded = Snapshot::from_bytes(&bytes).unwrap();
        assert_eq!(loaded.len(), 3);
        for query in ["10.1.2.3", "10.2.0.1", "2001:db8::1", "10.0.0.0/8"] {
            assert_eq!(
                loaded.resolve(query).unwrap().record.source,
                snap.resolve(query).unwrap().record.source
            );
        }
        assert!(loaded.resolve("192.0.2.1").is_err());
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(matches!(
            Snapshot::from_bytes(b"hello"),
            Err(GeoError::Format(_))
        ));

        let mut bytes = snapshot(&[]).to_bytes().unwrap();
        bytes[11] = 99; // bump version
        assert!(matches!(
            Snapshot::from_bytes(&bytes),
            Err(GeoError::Format(_))
        ));

        let mut truncated = SNAPSHOT_MAGIC.to_vec();
        truncated.extend_from_slice(&SNAPSHOT_VERSION.to_be_bytes());
        truncated.extend_from_slice(b"not gzip");
        assert!(Snapshot::from_bytes(&truncated).is_err());
    }
}

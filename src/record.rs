//! Geo-metadata records and the store that owns them
//!
//! Records are addressed by [`RecordId`], a dense index into the
//! [`RecordStore`]. The prefix index only ever holds ids; the store owns the
//! record payloads, including the extend map.

use crate::prefix::NetworkPrefix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Geo-metadata attached to a network prefix by one source
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoRecord {
    /// Origin identifier (e.g. "csv_import", "maxmind")
    pub source: String,
    /// Trust score, 0-100; higher wins among same-specificity candidates
    pub confidence: u8,
    /// Internet service provider
    pub isp: String,
    /// Compass region label
    pub eswn: String,
    /// Continent name
    pub continent: String,
    /// Country name
    pub country: String,
    /// Country code
    pub country_code: String,
    /// Country name in English
    pub country_english: String,
    /// Province or state
    pub province: String,
    /// City
    pub city: String,
    /// District or county
    pub district: String,
    /// Area code
    pub area_code: i64,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Autonomous system number
    pub asn: u32,
    /// Autonomous system organization
    pub asn_org: String,
    /// Fields outside the fixed schema, verbatim
    pub extend: BTreeMap<String, String>,
}

/// Dense record identifier within one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u32);

/// A record together with the prefix it was declared for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Insertion sequence; larger is more recent and wins confidence ties
    pub seq: u64,
    /// Canonical prefix
    pub prefix: NetworkPrefix,
    /// The geo-metadata
    pub record: GeoRecord,
}

/// Owns every record of a snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordStore {
    records: Vec<StoredRecord>,
}

impl RecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with room for `capacity` records
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    /// Append a record and return its id
    pub fn push(&mut self, seq: u64, prefix: NetworkPrefix, record: GeoRecord) -> RecordId {
        let id = RecordId(self.records.len() as u32);
        self.records.push(StoredRecord {
            seq,
            prefix,
            record,
        });
        id
    }

    /// Look up a record by id
    pub fn get(&self, id: RecordId) -> Option<&StoredRecord> {
        self.records.get(id.0 as usize)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in id order
    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &StoredRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| (RecordId(i as u32), r))
    }

    /// Highest insertion sequence in the store, if any
    pub fn max_seq(&self) -> Option<u64> {
        self.records.iter().map(|r| r.seq).max()
    }

    /// Record count per source, sorted by source name
    pub fn source_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for stored in &self.records {
            *counts.entry(stored.record.source.clone()).or_insert(0) += 1;
        }
        counts
    }
}

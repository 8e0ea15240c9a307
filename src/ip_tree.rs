//! Binary prefix trie for longest-prefix matching
//!
//! One trie per address family, with nodes allocated in an arena. Each node
//! corresponds to one bit depth along a path and carries the ids of every
//! record whose prefix terminates exactly there. Insertion only ever extends
//! paths and appends ids; nothing is removed once inserted. A reload builds a
//! whole new trie instead of editing one in place.
//!
//! Lookup cost is bounded by the address width (32 or 128 steps),
//! independent of how many prefixes are stored.

use crate::error::GeoError;
use crate::prefix::{addr_to_bits, address_bit, AddressFamily, NetworkPrefix};
use crate::record::RecordId;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A node in the trie
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Node {
    /// Child for bit 0
    left: Option<u32>,
    /// Child for bit 1
    right: Option<u32>,
    /// Records whose prefix ends at this node, in insertion order
    records: Vec<RecordId>,
}

impl Node {
    fn child(&self, bit: usize) -> Option<u32> {
        if bit == 0 {
            self.left
        } else {
            self.right
        }
    }
}

/// Trie over one address family using arena allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixTrie {
    family: AddressFamily,
    /// All nodes; index 0 is the root (the zero-length prefix)
    nodes: Vec<Node>,
}

impl PrefixTrie {
    /// Create an empty trie with just a root node
    pub fn new(family: AddressFamily) -> Self {
        Self {
            family,
            nodes: vec![Node::default()],
        }
    }

    /// Address family this trie indexes
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Number of allocated nodes (including the root)
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of record references held across all nodes
    pub fn reference_count(&self) -> usize {
        self.nodes.iter().map(|n| n.records.len()).sum()
    }

    /// Insert a record reference at the node for `prefix`
    ///
    /// Walks the prefix bits from the root, allocating missing nodes, and
    /// appends `id` to the terminal node.
    pub fn insert(&mut self, prefix: &NetworkPrefix, id: RecordId) -> Result<(), GeoError> {
        if prefix.family() != self.family {
            return Err(GeoError::InvalidPrefix(format!(
                "cannot insert {} into {:?} trie",
                prefix, self.family
            )));
        }

        let mut node_id = 0u32; // Start at root

        for depth in 0..prefix.len() {
            let bit = prefix.bit(depth);
            node_id = match self.nodes[node_id as usize].child(bit) {
                Some(child_id) => child_id,
                None => {
                    let new_id = self.allocate_node();
                    let current_node = &mut self.nodes[node_id as usize];
                    if bit == 0 {
                        current_node.left = Some(new_id);
                    } else {
                        current_node.right = Some(new_id);
                    }
                    new_id
                }
            };
        }

        self.nodes[node_id as usize].records.push(id);
        Ok(())
    }

    /// Allocate a new node and return its ID
    fn allocate_node(&mut self) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(Node::default());
        id
    }

    /// Longest-prefix match for an address integer
    ///
    /// Returns the prefix length of the deepest node on the address path that
    /// carries records, together with those records.
    pub fn longest_match(&self, bits: u128) -> Option<(u8, &[RecordId])> {
        let mut node = &self.nodes[0];
        let mut best = if node.records.is_empty() {
            None
        } else {
            Some((0u8, node.records.as_slice()))
        };

        for depth in 0..self.family.width() {
            match node.child(address_bit(self.family, bits, depth)) {
                Some(child_id) => node = &self.nodes[child_id as usize],
                None => break,
            }
            if !node.records.is_empty() {
                best = Some((depth + 1, node.records.as_slice()));
            }
        }

        best
    }

    /// Records stored at exactly `prefix`, if any
    pub fn exact_match(&self, prefix: &NetworkPrefix) -> Option<&[RecordId]> {
        if prefix.family() != self.family {
            return None;
        }
        let mut node = &self.nodes[0];
        for depth in 0..prefix.len() {
            node = &self.nodes[node.child(prefix.bit(depth))? as usize];
        }
        if node.records.is_empty() {
            None
        } else {
            Some(node.records.as_slice())
        }
    }

    /// Check structural integrity of a deserialized trie
    ///
    /// Every child index must be in bounds and point forward in the arena
    /// (children are always allocated after their parent), and every record
    /// id must be below `record_count`.
    pub fn validate(&self, record_count: usize) -> Result<(), GeoError> {
        if self.nodes.is_empty() {
            return Err(GeoError::Format(format!(
                "{:?} trie has no root node",
                self.family
            )));
        }
        let node_count = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            for child in [node.left, node.right].into_iter().flatten() {
                if child as usize >= node_count || child as usize <= i {
                    return Err(GeoError::Format(format!(
                        "node {} has invalid child {} (node_count={})",
                        i, child, node_count
                    )));
                }
            }
            if let Some(bad) = node.records.iter().find(|id| id.0 as usize >= record_count) {
                return Err(GeoError::Format(format!(
                    "node {} references missing record {}",
                    i, bad.0
                )));
            }
        }
        Ok(())
    }
}

/// Match returned by [`PrefixIndex::longest_match`]
#[derive(Debug, Clone, Copy)]
pub struct IndexMatch<'a> {
    /// Matched prefix length
    pub prefix_len: u8,
    /// Candidate records at the matched node, in insertion order
    pub records: &'a [RecordId],
}

/// Prefix index covering both address families
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixIndex {
    v4: PrefixTrie,
    v6: PrefixTrie,
}

impl Default for PrefixIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl PrefixIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self {
            v4: PrefixTrie::new(AddressFamily::V4),
            v6: PrefixTrie::new(AddressFamily::V6),
        }
    }

    fn trie(&self, family: AddressFamily) -> &PrefixTrie {
        match family {
            AddressFamily::V4 => &self.v4,
            AddressFamily::V6 => &self.v6,
        }
    }

    /// Insert a record reference for `prefix`
    pub fn insert(&mut self, prefix: &NetworkPrefix, id: RecordId) -> Result<(), GeoError> {
        match prefix.family() {
            AddressFamily::V4 => self.v4.insert(prefix, id),
            AddressFamily::V6 => self.v6.insert(prefix, id),
        }
    }

    /// Longest-prefix match for a host address
    pub fn longest_match(&self, addr: IpAddr) -> Option<IndexMatch<'_>> {
        self.trie(AddressFamily::of(&addr))
            .longest_match(addr_to_bits(addr))
            .map(|(prefix_len, records)| IndexMatch {
                prefix_len,
                records,
            })
    }

    /// Records declared for exactly `prefix`
    pub fn exact_match(&self, prefix: &NetworkPrefix) -> Option<&[RecordId]> {
        self.trie(prefix.family()).exact_match(prefix)
    }

    /// Node count per family (v4, v6)
    pub fn node_counts(&self) -> (usize, usize) {
        (self.v4.node_count(), self.v6.node_count())
    }

    /// Total record references across both tries
    pub fn reference_count(&self) -> usize {
        self.v4.reference_count() + self.v6.reference_count()
    }

    /// Check structural integrity of both tries
    pub fn validate(&self, record_count: usize) -> Result<(), GeoError> {
        if self.v4.family != AddressFamily::V4 || self.v6.family != AddressFamily::V6 {
            return Err(GeoError::Format("trie family mismatch".to_string()));
        }
        self.v4.validate(record_count)?;
        self.v6.validate(record_count)
    }
}

//! Pseudo-TLD Name Table
//!
//! Maps fully qualified names under the served zone to IPv4 addresses.
//! Built once at startup from static configuration; the DNS responder
//! only reads it while serving. Dynamic registration is possible but
//! must go through the surrounding lock so readers always observe a
//! consistent snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// A single name-to-address entry
///
/// Appears as `[[records]]` in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    /// Fully qualified name; a missing trailing dot is added on insertion
    pub name: String,

    /// Address the name resolves to
    pub address: Ipv4Addr,
}

/// Name table for the served zone
///
/// Keys are normalized: lowercase, always carrying the trailing dot.
pub struct NameTable {
    /// Zone label without separators, e.g. "p2p"
    zone: String,

    /// Zone suffix used for membership checks, e.g. ".p2p."
    zone_suffix: String,

    /// Normalized FQDN -> address
    records: HashMap<String, Ipv4Addr>,

    /// Answer for in-zone names missing from the table (off by default)
    wildcard: Option<Ipv4Addr>,
}

impl NameTable {
    /// Build a table for `zone` from the configured records
    pub fn new(zone: &str, records: &[NameRecord], wildcard: Option<Ipv4Addr>) -> Self {
        let mut table = Self {
            zone: zone.to_string(),
            zone_suffix: format!(".{}.", zone),
            records: HashMap::new(),
            wildcard,
        };

        for record in records {
            table.register(&record.name, record.address);
        }

        table
    }

    /// Look up a fully qualified, normalized name
    ///
    /// Exact entries win; otherwise an in-zone name falls back to the
    /// wildcard address when one is configured.
    pub fn lookup(&self, name: &str) -> Option<Ipv4Addr> {
        if let Some(address) = self.records.get(name) {
            return Some(*address);
        }

        if name.ends_with(&self.zone_suffix) {
            return self.wildcard;
        }

        None
    }

    /// Insert or replace an entry; the key is normalized first
    pub fn register(&mut self, name: &str, address: Ipv4Addr) {
        self.records.insert(normalize_name(name), address);
    }

    /// Snapshot of all entries, sorted by name
    pub fn records(&self) -> Vec<NameRecord> {
        let mut records: Vec<NameRecord> = self
            .records
            .iter()
            .map(|(name, address)| NameRecord {
                name: name.clone(),
                address: *address,
            })
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the table has no entries
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Zone label without separators
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Configured wildcard address, if any
    pub fn wildcard(&self) -> Option<Ipv4Addr> {
        self.wildcard
    }
}

/// Normalize a name to its table key form: lowercase with trailing dot
pub fn normalize_name(name: &str) -> String {
    let mut name = name.trim().to_lowercase();
    if !name.ends_with('.') {
        name.push('.');
    }
    name
}

//! Static name-to-address table consulted for every query.

use std::net::Ipv4Addr;

use rustc_hash::FxHashMap;

/// Read-only mapping from fully-qualified domain name to its A records.
///
/// Built once at startup and never mutated afterwards. A miss is not an
/// error: it tells the dispatcher to relay the query upstream.
pub struct MatchTable {
    records: FxHashMap<String, Vec<Ipv4Addr>>,
}

impl MatchTable {
    /// Build the table from configured (name, addresses) entries.
    pub fn new(records: impl IntoIterator<Item = (String, Vec<Ipv4Addr>)>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }

    /// Exact, case-sensitive lookup.
    ///
    /// Wildcard and regex matching are intentionally out of scope. The
    /// returned slice preserves the configured address order.
    pub fn lookup(&self, name: &str) -> Option<&[Ipv4Addr]> {
        self.records.get(name).map(Vec::as_slice)
    }

    /// Number of names in the table.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

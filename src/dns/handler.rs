//! DNS Query Handler
//!
//! Resolves question names against the shared name table. Only A/IN
//! questions ever produce an address; everything else resolves to
//! nothing so the responder sends an empty authoritative reply.

use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::names::{normalize_name, NameTable};

/// DNS record types
pub const TYPE_A: u16 = 1;

/// DNS classes
pub const CLASS_IN: u16 = 1;

/// Resolves questions for the served zone
pub struct QueryHandler {
    /// Shared name table
    table: Arc<RwLock<NameTable>>,
}

impl QueryHandler {
    /// Create a new query handler
    pub fn new(table: Arc<RwLock<NameTable>>) -> Self {
        Self { table }
    }

    /// Resolve a single question to its answer address, if any
    pub async fn resolve(&self, qname: &str, qtype: u16, qclass: u16) -> Option<Ipv4Addr> {
        if qtype != TYPE_A || qclass != CLASS_IN {
            return None;
        }

        let name = normalize_name(qname);
        let address = self.table.read().await.lookup(&name);

        match address {
            Some(address) => debug!("resolved {} -> {}", name, address),
            None => debug!("no address for {}", name),
        }

        address
    }
}

//! DNS Responder Module
//!
//! Serves the pseudo-TLD over UDP: address queries are answered from
//! the name table, everything else gets an empty authoritative reply.

pub mod handler;
mod server;

pub use server::run_dns_server;

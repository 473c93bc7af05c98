//! Metrics Collection
//!
//! Collects and exposes metrics for monitoring the resolver service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics collector for the resolver service
#[derive(Default)]
pub struct Metrics {
    /// Start time for uptime calculation
    start_time: Option<Instant>,

    /// DNS query packets received
    pub dns_queries: AtomicU64,

    /// Answer records sent
    pub dns_answers: AtomicU64,

    /// Replies sent with an empty answer section
    pub dns_empty_replies: AtomicU64,

    /// Packets dropped as malformed
    pub dns_malformed: AtomicU64,

    /// Reply writes that failed
    pub dns_send_failures: AtomicU64,

    /// HTTP requests served
    pub http_requests: AtomicU64,

    /// Peers registered through the HTTP API
    pub peers_registered: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Increment DNS queries received
    pub fn inc_dns_queries(&self) {
        self.dns_queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Add answer records sent
    pub fn add_dns_answers(&self, count: u64) {
        self.dns_answers.fetch_add(count, Ordering::Relaxed);
    }

    /// Increment empty replies
    pub fn inc_dns_empty_replies(&self) {
        self.dns_empty_replies.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment malformed packets
    pub fn inc_dns_malformed(&self) {
        self.dns_malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment reply write failures
    pub fn inc_dns_send_failures(&self) {
        self.dns_send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment HTTP requests
    pub fn inc_http_requests(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment registered peers
    pub fn inc_peers_registered(&self) {
        self.peers_registered.fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        // Uptime
        output.push_str(&format!(
            "# HELP p2p_dns_uptime_seconds Service uptime in seconds\n\
             # TYPE p2p_dns_uptime_seconds gauge\n\
             p2p_dns_uptime_seconds {}\n\n",
            self.uptime_secs()
        ));

        // DNS
        output.push_str(&format!(
            "# HELP p2p_dns_queries_total DNS query packets received\n\
             # TYPE p2p_dns_queries_total counter\n\
             p2p_dns_queries_total {}\n\n",
            self.dns_queries.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP p2p_dns_answers_total Answer records sent\n\
             # TYPE p2p_dns_answers_total counter\n\
             p2p_dns_answers_total {}\n\n",
            self.dns_answers.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP p2p_dns_empty_replies_total Replies with an empty answer section\n\
             # TYPE p2p_dns_empty_replies_total counter\n\
             p2p_dns_empty_replies_total {}\n\n",
            self.dns_empty_replies.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP p2p_dns_malformed_total Packets dropped as malformed\n\
             # TYPE p2p_dns_malformed_total counter\n\
             p2p_dns_malformed_total {}\n\n",
            self.dns_malformed.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP p2p_dns_send_failures_total Reply writes that failed\n\
             # TYPE p2p_dns_send_failures_total counter\n\
             p2p_dns_send_failures_total {}\n\n",
            self.dns_send_failures.load(Ordering::Relaxed)
        ));

        // HTTP
        output.push_str(&format!(
            "# HELP p2p_dns_http_requests_total HTTP requests served\n\
             # TYPE p2p_dns_http_requests_total counter\n\
             p2p_dns_http_requests_total {}\n\n",
            self.http_requests.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP p2p_dns_peers_registered_total Peers registered through the HTTP API\n\
             # TYPE p2p_dns_peers_registered_total counter\n\
             p2p_dns_peers_registered_total {}\n\n",
            self.peers_registered.load(Ordering::Relaxed)
        ));

        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "dns": {
                "queries": self.dns_queries.load(Ordering::Relaxed),
                "answers": self.dns_answers.load(Ordering::Relaxed),
                "empty_replies": self.dns_empty_replies.load(Ordering::Relaxed),
                "malformed": self.dns_malformed.load(Ordering::Relaxed),
                "send_failures": self.dns_send_failures.load(Ordering::Relaxed),
            },
            "http": {
                "requests": self.http_requests.load(Ordering::Relaxed),
                "peers_registered": self.peers_registered.load(Ordering::Relaxed),
            },
        })
    }
}

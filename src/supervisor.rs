//! Service Supervisor
//!
//! Runs the DNS and HTTP serve loops concurrently, owns the resolver
//! binding lifecycle, and guarantees the restore action runs exactly
//! once however shutdown is triggered. Signals and serve-loop exits
//! race; the cleanup guard is the single point that serializes them.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::api;
use crate::api::Metrics;
use crate::binding::{self, RestoreAction};
use crate::config::{BindFailurePolicy, Config};
use crate::dns;
use crate::names::NameTable;
use crate::registry::PeerRegistry;

/// Lifecycle phases, in the order the supervisor moves through them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SupervisorState {
    Idle,
    Binding,
    Running,
    Draining,
    Stopped,
}

/// Runs the restore action at most once.
///
/// Shutdown has racing triggers: signal delivery and serve-loop exit.
/// Whoever fires first takes the action out of the slot; later calls
/// find it empty and do nothing.
pub struct CleanupGuard {
    action: Mutex<Option<RestoreAction>>,
}

impl CleanupGuard {
    /// New guard with nothing armed
    pub fn new() -> Self {
        Self {
            action: Mutex::new(None),
        }
    }

    /// Arm the guard with the restore action
    pub fn arm(&self, action: RestoreAction) {
        *self.lock() = Some(action);
    }

    /// Run the armed action; every call after the first is a no-op
    pub fn fire(&self) {
        let action = self.lock().take();
        if let Some(action) = action {
            action.run();
        }
    }

    // Restore must still run if a holder panicked, so poisoning is
    // deliberately ignored.
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<RestoreAction>> {
        self.action.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CleanupGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Ties the serve loops, resolver binding and shutdown triggers together
pub struct Supervisor {
    config: Arc<Config>,
    table: Arc<RwLock<NameTable>>,
    peers: Arc<RwLock<PeerRegistry>>,
    metrics: Arc<Metrics>,
    state: Arc<RwLock<SupervisorState>>,
    guard: Arc<CleanupGuard>,
}

impl Supervisor {
    /// Create a supervisor for the given configuration and name table
    pub fn new(config: Arc<Config>, table: Arc<RwLock<NameTable>>) -> Self {
        Self {
            config,
            table,
            peers: Arc::new(RwLock::new(PeerRegistry::new())),
            metrics: Arc::new(Metrics::new()),
            state: Arc::new(RwLock::new(SupervisorState::Idle)),
            guard: Arc::new(CleanupGuard::new()),
        }
    }

    /// Run the service until it drains
    ///
    /// The returned error decides the process exit code.
    pub async fn run(self) -> anyhow::Result<()> {
        // Install signal watchers before anything mutates the system,
        // so every later failure path goes through the drain sequence
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        self.enter(SupervisorState::Binding).await;

        match binding::bind(&self.config) {
            Ok(action) => self.guard.arm(action),
            Err(e) => match self.config.on_bind_failure {
                BindFailurePolicy::FailFast => {
                    self.enter(SupervisorState::Stopped).await;
                    return Err(anyhow::Error::new(e).context("resolver binding failed"));
                }
                BindFailurePolicy::DegradedNoRedirect => {
                    warn!("resolver binding failed: {}; serving without a redirect", e);
                }
            },
        }

        self.enter(SupervisorState::Running).await;

        let mut dns_handle = tokio::spawn(dns::run_dns_server(
            self.config.clone(),
            self.table.clone(),
            self.metrics.clone(),
        ));

        let mut http_handle = tokio::spawn(api::run_api_server(
            self.config.clone(),
            self.table.clone(),
            self.peers.clone(),
            self.metrics.clone(),
            self.state.clone(),
        ));

        info!("✅ All services started");
        info!("   Press Ctrl+C to shut down gracefully");

        let mut http_running = true;
        let mut failure: Option<anyhow::Error> = None;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("🛑 interrupt received");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("🛑 termination signal received");
                    break;
                }
                result = &mut dns_handle => {
                    failure = Some(service_error("DNS responder", result));
                    break;
                }
                result = &mut http_handle, if http_running => {
                    let err = service_error("HTTP responder", result);
                    if self.config.http_failure_fatal {
                        failure = Some(err);
                        break;
                    }
                    error!("HTTP responder exited: {:#}; DNS keeps serving", err);
                    http_running = false;
                }
            }
        }

        self.enter(SupervisorState::Draining).await;

        // Stop whatever is still serving before touching the resolver
        dns_handle.abort();
        http_handle.abort();

        self.guard.fire();

        self.enter(SupervisorState::Stopped).await;
        info!("👋 shut down");

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn enter(&self, next: SupervisorState) {
        let mut state = self.state.write().await;
        info!("lifecycle: {:?} -> {:?}", *state, next);
        *state = next;
    }
}

/// Describe why a serve loop stopped
fn service_error(
    name: &str,
    result: Result<anyhow::Result<()>, tokio::task::JoinError>,
) -> anyhow::Error {
    match result {
        Ok(Ok(())) => anyhow::anyhow!("{} exited unexpectedly", name),
        Ok(Err(e)) => e.context(format!("{} failed", name)),
        Err(e) => anyhow::anyhow!("{} panicked: {}", name, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindingStrategy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn probe() -> (RestoreAction, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (RestoreAction::Probe(count.clone()), count)
    }

    #[test]
    fn test_guard_fires_once() {
        let guard = CleanupGuard::new();
        let (action, count) = probe();
        guard.arm(action);

        guard.fire();
        guard.fire();
        guard.fire();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unarmed_guard_is_a_noop() {
        let guard = CleanupGuard::new();
        guard.fire();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_restore_exactly_once() {
        let guard = Arc::new(CleanupGuard::new());
        let (action, count) = probe();
        guard.arm(action);

        // A signal and a loop failure arriving together must not run
        // the restore twice nor skip it
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let signal_trigger = {
            let guard = guard.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                guard.fire();
            })
        };

        let failure_trigger = {
            let guard = guard.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                guard.fire();
            })
        };

        signal_trigger.await.unwrap();
        failure_trigger.await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rearming_after_fire_allows_one_more_run() {
        let guard = CleanupGuard::new();
        let (action, count) = probe();
        guard.arm(action);

        guard.fire();
        guard.fire();

        let (action, second) = probe();
        guard.arm(action);
        guard.fire();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fail_fast_binding_error_stops_before_serving() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            binding_strategy: BindingStrategy::ResolvConf,
            resolv_conf_path: dir.path().join("missing.conf"),
            on_bind_failure: BindFailurePolicy::FailFast,
            ..Config::default()
        };

        let table = NameTable::new("p2p", &[], None);
        let supervisor = Supervisor::new(Arc::new(config), Arc::new(RwLock::new(table)));
        let state = supervisor.state.clone();

        let result = supervisor.run().await;

        assert!(result.is_err());
        assert_eq!(*state.read().await, SupervisorState::Stopped);
    }
}

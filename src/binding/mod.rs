//! Resolver Binding
//!
//! Points the host's system resolver at the local DNS responder and
//! hands back the action that undoes it. Two strategies cover the
//! deployments we run on: rewriting the resolver file directly, or
//! scoping the redirect to one link through resolvectl. Either way the
//! prior state must come back exactly once the service drains.

mod resolv_conf;
mod resolvectl;

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{BindingStrategy, Config};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("unable to read {}: {source}", .path.display())]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to write {}: {source}", .path.display())]
    WriteConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to launch '{command}': {source}")]
    CommandLaunch {
        command: String,
        source: std::io::Error,
    },

    #[error("'{command}' failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("no link with a default route in resolver status output")]
    NoDefaultRouteLink,
}

// =============================================================================
// EXTERNAL COMMANDS
// =============================================================================

/// Executes external resolver configuration commands.
///
/// The seam keeps status-output parsing and rollback sequencing
/// testable against canned command output.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> std::io::Result<std::process::Output>;
}

/// Runs commands through the operating system
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> std::io::Result<std::process::Output> {
        std::process::Command::new(program).args(args).output()
    }
}

/// Run a command, failing on launch errors and nonzero exits
pub(crate) fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> Result<std::process::Output, BindError> {
    let command = format!("{} {}", program, args.join(" "));

    let output = runner
        .run(program, args)
        .map_err(|source| BindError::CommandLaunch {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(BindError::CommandFailed {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}

// =============================================================================
// RESTORE
// =============================================================================

/// Action that puts the system resolver back the way it was.
///
/// Produced by a successful `bind`; the supervisor runs it exactly
/// once during drain. `None` is returned when binding was a no-op, so
/// running it is always safe.
pub enum RestoreAction {
    /// Nothing to undo
    None,

    /// Rewrite the resolver file to its captured original bytes
    ResolvConf { path: PathBuf, original: Vec<u8> },

    /// Revert the link's DNS settings
    RevertLink {
        runner: Arc<dyn CommandRunner>,
        link: String,
    },

    /// Counts invocations instead of touching the system
    #[cfg(test)]
    Probe(Arc<std::sync::atomic::AtomicUsize>),
}

// Written out by hand: the command runner held by RevertLink has no
// Debug form
impl std::fmt::Debug for RestoreAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestoreAction::None => f.write_str("None"),
            RestoreAction::ResolvConf { path, original } => f
                .debug_struct("ResolvConf")
                .field("path", path)
                .field("original_len", &original.len())
                .finish(),
            RestoreAction::RevertLink { link, .. } => f
                .debug_struct("RevertLink")
                .field("link", link)
                .finish_non_exhaustive(),
            #[cfg(test)]
            RestoreAction::Probe(count) => f.debug_tuple("Probe").field(count).finish(),
        }
    }
}

impl RestoreAction {
    /// Undo the binding
    ///
    /// Failures are logged; there is nowhere useful to escalate them
    /// during shutdown.
    pub fn run(&self) {
        match self {
            RestoreAction::None => {}
            RestoreAction::ResolvConf { path, original } => {
                match std::fs::write(path, original) {
                    Ok(()) => info!("🔄 {} restored", path.display()),
                    Err(e) => error!("failed to restore {}: {}", path.display(), e),
                }
            }
            RestoreAction::RevertLink { runner, link } => {
                match run_checked(runner.as_ref(), "resolvectl", &["revert", link]) {
                    Ok(_) => info!("🔄 DNS settings for link {} reverted", link),
                    Err(e) => error!("failed to revert link {}: {}", link, e),
                }
            }
            #[cfg(test)]
            RestoreAction::Probe(count) => {
                count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }
    }
}

// =============================================================================
// BINDING
// =============================================================================

/// Redirect the host resolver at the local responder
///
/// Called at most once per process. The returned action undoes the
/// redirect; the caller decides whether a failure here is fatal.
pub fn bind(config: &Config) -> Result<RestoreAction, BindError> {
    match config.binding_strategy {
        BindingStrategy::ResolvConf => {
            resolv_conf::bind_resolv_conf(&config.resolv_conf_path, config.resolver_target)
        }
        BindingStrategy::Resolvectl => {
            let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
            resolvectl::bind_resolvectl(runner, config.resolver_target, &config.zone)
        }
        BindingStrategy::Disabled => {
            info!("resolver binding disabled; system resolver left untouched");
            Ok(RestoreAction::None)
        }
    }
}

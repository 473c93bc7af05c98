//! File-Based Resolver Binding
//!
//! Prepends our nameserver line to the resolver configuration file and
//! captures the original bytes so restore can rewrite them exactly. A
//! file that already starts with our line is never touched, so binding
//! twice in a row stays a no-op.

use std::net::Ipv4Addr;
use std::path::Path;
use tracing::info;

use crate::binding::{BindError, RestoreAction};

/// Bind by rewriting the resolver configuration file
pub(crate) fn bind_resolv_conf(
    path: &Path,
    target: Ipv4Addr,
) -> Result<RestoreAction, BindError> {
    let line = nameserver_line(target);

    let original = std::fs::read(path).map_err(|source| BindError::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;

    if original.starts_with(line.as_bytes()) {
        info!("{} already points at {}; leaving it alone", path.display(), target);
        return Ok(RestoreAction::None);
    }

    let mut updated = Vec::with_capacity(line.len() + original.len());
    updated.extend_from_slice(line.as_bytes());
    updated.extend_from_slice(&original);

    std::fs::write(path, &updated).map_err(|source| BindError::WriteConfig {
        path: path.to_path_buf(),
        source,
    })?;

    info!("🔗 {} updated to use the local DNS responder", path.display());

    Ok(RestoreAction::ResolvConf {
        path: path.to_path_buf(),
        original,
    })
}

fn nameserver_line(target: Ipv4Addr) -> String {
    format!("nameserver {}\n", target)
}

//! Link-Scoped Resolver Binding
//!
//! Uses resolvectl to point the link carrying the default route at the
//! local responder, with the zone attached as a routing domain so only
//! names under it travel this way. The link is discovered by scanning
//! `resolvectl status` output; that parsing is kept free of process
//! handling so it can run against captured fixtures.

use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::binding::{run_checked, BindError, CommandRunner, RestoreAction};

/// Bind by configuring the default-route link through resolvectl
pub(crate) fn bind_resolvectl(
    runner: Arc<dyn CommandRunner>,
    target: Ipv4Addr,
    zone: &str,
) -> Result<RestoreAction, BindError> {
    let status = run_checked(runner.as_ref(), "resolvectl", &["status"])?;
    let status_text = String::from_utf8_lossy(&status.stdout);

    let link = default_route_link(&status_text).ok_or(BindError::NoDefaultRouteLink)?;
    info!("default route runs over link {}", link);

    let target = target.to_string();
    run_checked(runner.as_ref(), "resolvectl", &["dns", &link, &target])?;

    // Routing domain: only names under the zone reach this server
    let domain = format!("~{}", zone);
    if let Err(e) = run_checked(runner.as_ref(), "resolvectl", &["domain", &link, &domain]) {
        warn!("domain step failed for link {}; reverting its DNS setting", link);
        if let Err(revert_err) = run_checked(runner.as_ref(), "resolvectl", &["revert", &link]) {
            error!("rollback revert for link {} failed: {}", link, revert_err);
        }
        return Err(e);
    }

    info!("🔗 link {} now resolves .{} through {}", link, zone, target);

    Ok(RestoreAction::RevertLink { runner, link })
}

/// Find the link carrying the default route in `resolvectl status` output
///
/// Scans in output order and returns the interface name from the first
/// `Link N (name)` section that shows a default-route marker.
pub fn default_route_link(status: &str) -> Option<String> {
    let mut current = None;

    for line in status.lines() {
        if let Some(name) = link_name(line) {
            current = Some(name);
            continue;
        }

        if is_default_route_marker(line) && current.is_some() {
            return current;
        }
    }

    None
}

/// Extract the interface name from a `Link 2 (eth0)` header line
fn link_name(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix("Link ")?;
    if !rest.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let (_, tail) = rest.split_once('(')?;
    let (name, _) = tail.split_once(')')?;
    Some(name.to_string())
}

/// Per-link default-route markers across resolvectl versions
fn is_default_route_marker(line: &str) -> bool {
    line.contains("+DefaultRoute")
        || (line.contains("DefaultRoute setting:") && line.trim_end().ends_with("yes"))
}

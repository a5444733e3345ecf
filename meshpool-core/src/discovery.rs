use anyhow::Result;
use glob::glob;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::connection::Session;
use crate::error::PoolError;
use crate::state::NodeIdentity;

/// Service type Meshtastic firmware advertises on the local network.
const MDNS_SERVICE: &str = "_meshtastic._tcp.local.";

const MACOS_PATTERNS: &[&str] = &["/dev/cu.usbmodem*", "/dev/cu.usbserial*"];
const LINUX_PATTERNS: &[&str] = &["/dev/ttyUSB*", "/dev/ttyACM*"];

/// Serial device paths that may have a node on the other end.
///
/// Unknown platforms search the union of every known pattern rather than
/// failing.
pub fn list_local_endpoints() -> Vec<String> {
    if cfg!(target_os = "macos") {
        glob_patterns(MACOS_PATTERNS)
    } else if cfg!(target_os = "linux") {
        glob_patterns(LINUX_PATTERNS)
    } else if cfg!(target_os = "windows") {
        windows_com_ports()
    } else {
        warn!("unknown platform, scanning every known serial pattern");
        union_of_all_patterns()
    }
}

pub(crate) fn union_of_all_patterns() -> Vec<String> {
    let mut ports = glob_patterns(MACOS_PATTERNS);
    ports.extend(glob_patterns(LINUX_PATTERNS));
    ports.extend(windows_com_ports());
    ports
}

fn glob_patterns(patterns: &[&str]) -> Vec<String> {
    let mut ports = Vec::new();
    for pattern in patterns {
        match glob(pattern) {
            Ok(paths) => ports.extend(paths.flatten().map(|p| p.display().to_string())),
            Err(e) => debug!("bad serial pattern {pattern}: {e}"),
        }
    }
    ports
}

fn windows_com_ports() -> Vec<String> {
    (1..=20).map(|i| format!("COM{i}")).collect()
}

/// A network endpoint advertised over mDNS.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkEndpoint {
    pub connection_string: String,
    pub instance_name: String,
}

/// Listens passively for mDNS-advertised nodes for `timeout`, returning
/// whatever showed up. Zero results is a normal outcome.
pub async fn discover_network_endpoints(timeout: Duration) -> Result<Vec<NetworkEndpoint>> {
    let daemon = ServiceDaemon::new().map_err(|e| PoolError::Transport(e.to_string()))?;
    let receiver = daemon
        .browse(MDNS_SERVICE)
        .map_err(|e| PoolError::Transport(e.to_string()))?;

    let mut endpoints = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, receiver.recv_async()).await {
            Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                if let Some(addr) = info.get_addresses().iter().next() {
                    let suffix = format!(".{MDNS_SERVICE}");
                    let endpoint = NetworkEndpoint {
                        connection_string: format!(
                            "tcp://{addr}:{port}",
                            port = info.get_port()
                        ),
                        instance_name: info
                            .get_fullname()
                            .trim_end_matches(suffix.as_str())
                            .to_string(),
                    };
                    debug!("mDNS resolved {}", endpoint.connection_string);
                    endpoints.push(endpoint);
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(_)) => break, // daemon went away
            Err(_) => break,     // listen window elapsed
        }
    }

    if let Err(e) = daemon.shutdown() {
        debug!("mDNS daemon shutdown: {e}");
    }
    Ok(endpoints)
}

/// Result of probing one candidate endpoint.
#[derive(Debug, Serialize)]
pub struct ProbeResult {
    pub endpoint: String,
    pub identity: Option<NodeIdentity>,
    pub error: Option<String>,
}

/// Probes every candidate endpoint concurrently, one independent worker
/// per endpoint. A dead endpoint reports its own error without disturbing
/// the others.
pub async fn scan_endpoints(endpoints: Vec<String>, setup_timeout: Duration) -> Vec<ProbeResult> {
    let mut tasks = JoinSet::new();
    for endpoint in endpoints {
        tasks.spawn(async move { probe_endpoint(endpoint, setup_timeout).await });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!("probe task failed: {e}"),
        }
    }
    results.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
    results
}

async fn probe_endpoint(endpoint: String, setup_timeout: Duration) -> ProbeResult {
    match Session::open(&endpoint, setup_timeout).await {
        Ok(mut session) => {
            let identity = session.local_identity().await;
            if let Err(e) = session.close().await {
                debug!("close after probe failed on {endpoint}: {e}");
            }
            match identity {
                Ok(identity) => ProbeResult {
                    endpoint,
                    identity: Some(identity),
                    error: None,
                },
                Err(e) => ProbeResult {
                    endpoint,
                    identity: None,
                    error: Some(e.to_string()),
                },
            }
        }
        Err(e) => {
            debug!("probe failed on {endpoint}: {e}");
            ProbeResult {
                endpoint,
                identity: None,
                error: Some(e.to_string()),
            }
        }
    }
}

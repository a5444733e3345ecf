use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::DeviceState;

/// Catalog record for a node overheard on the mesh.
#[derive(Debug, Clone, Serialize)]
pub struct HeardNode {
    pub id: String,
    pub short_name: String,
    pub long_name: String,
    pub hw_model: Option<String>,
    pub firmware_version: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub snr: Option<f32>,
    pub hops_away: Option<u32>,
}

/// Who-heard-whom history entry.
#[derive(Debug, Clone, Serialize)]
pub struct HeardHistory {
    pub node_id: String,
    pub long_name: String,
    pub seen_by: String,
    pub timestamp: DateTime<Utc>,
    pub snr: Option<f32>,
    pub hops_away: Option<u32>,
    pub position_lat: Option<f64>,
    pub position_lon: Option<f64>,
}

/// Turns a session's cache of overheard nodes into catalog and history
/// records, excluding the local node itself. Pure transform: the cache is
/// already populated by background listening.
pub fn import_heard(
    state: &DeviceState,
    local_node_id: &str,
) -> (Vec<HeardNode>, Vec<HeardHistory>) {
    let now = Utc::now();
    let mut nodes = Vec::new();
    let mut history = Vec::new();

    for entry in state.nodes.values() {
        if entry.id == local_node_id {
            continue;
        }

        let long_name = if entry.user.long_name.is_empty() {
            "Unknown".to_string()
        } else {
            entry.user.long_name.clone()
        };
        let last_seen = entry
            .last_heard
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
            .unwrap_or(now);

        nodes.push(HeardNode {
            id: entry.id.clone(),
            short_name: if entry.user.short_name.is_empty() {
                "?".to_string()
            } else {
                entry.user.short_name.clone()
            },
            long_name: long_name.clone(),
            hw_model: entry.user.hw_model.clone(),
            // Only the locally attached node reports its firmware
            firmware_version: None,
            last_seen,
            snr: entry.snr,
            hops_away: entry.hops_away,
        });

        let position = state.positions.get(&entry.num);
        history.push(HeardHistory {
            node_id: entry.id.clone(),
            long_name,
            seen_by: local_node_id.to_string(),
            timestamp: now,
            snr: entry.snr,
            hops_away: entry.hops_away,
            position_lat: position.map(|p| p.latitude),
            position_lon: position.map(|p| p.longitude),
        });
    }

    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    history.sort_by(|a, b| a.node_id.cmp(&b.node_id));
    (nodes, history)
}

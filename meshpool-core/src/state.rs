use meshtastic::protobufs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Canonical textual spelling of a node number: "!" followed by eight
/// lowercase hex digits, zero-padded.
pub fn canonical_id(num: u32) -> String {
    format!("!{num:08x}")
}

/// Short, loggable preview of key material. Full keys never hit the logs.
pub(crate) fn key_prefix(key: &[u8]) -> String {
    if key.is_empty() {
        "unset".to_string()
    } else {
        let head = &key[..key.len().min(4)];
        format!("{}…", hex::encode(head))
    }
}

/// Everything a session has overheard or been handed during setup.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    pub nodes: HashMap<u32, NodeEntry>,
    pub positions: HashMap<u32, Position>,
    pub channels: Vec<ChannelInfo>,
    pub my_node: Option<MyNodeInfo>,
    pub firmware_version: Option<String>,
    pub device_config: Option<protobufs::config::DeviceConfig>,
    pub position_config: Option<protobufs::config::PositionConfig>,
    pub power_config: Option<protobufs::config::PowerConfig>,
    pub network_config: Option<protobufs::config::NetworkConfig>,
    pub display_config: Option<protobufs::config::DisplayConfig>,
    pub lora_config: Option<protobufs::config::LoRaConfig>,
    pub bluetooth_config: Option<protobufs::config::BluetoothConfig>,
    pub security_config: Option<protobufs::config::SecurityConfig>,
    pub module_mqtt: Option<protobufs::module_config::MqttConfig>,
    pub module_serial: Option<protobufs::module_config::SerialConfig>,
    pub module_telemetry: Option<protobufs::module_config::TelemetryConfig>,
    /// Flat key/value blob from firmware that pre-dates per-domain config
    /// frames, or from stored captures in the old layout.
    pub legacy_config: HashMap<String, Value>,
}

/// One node known to the session, directly or indirectly overheard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    pub id: String,
    pub num: u32,
    pub user: UserInfo,
    pub last_heard: Option<u64>,
    pub snr: Option<f32>,
    pub rssi: Option<i32>,
    pub hops_away: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub long_name: String,
    pub short_name: String,
    pub hw_model: Option<String>,
}

/// Self-announcement of the node on the other end of the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MyNodeInfo {
    pub node_num: u32,
    pub node_id: String,
    pub reboot_count: u32,
    pub min_app_version: u32,
    pub device_id: String,
}

/// Resolved identity of a node, as reported by the node itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub id: String,
    pub short_name: String,
    pub long_name: String,
    pub hardware_model: Option<String>,
    pub firmware_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub node_id: String,
    pub node_num: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<i32>,
    pub time: Option<String>,
    pub last_updated: u64,
}

/// Channel slot with its raw key material. The key leaves this struct only
/// as hex via the snapshot builders.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub index: u32,
    pub name: String,
    pub role: String,
    pub psk: Vec<u8>,
    pub uplink_enabled: bool,
    pub downlink_enabled: bool,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_node(&mut self, node_num: u32, entry: NodeEntry) {
        self.nodes.insert(node_num, entry);
    }

    pub fn update_position(&mut self, node_num: u32, position: Position) {
        self.positions.insert(node_num, position);
    }

    pub fn update_channel(&mut self, channel: ChannelInfo) {
        if let Some(existing) = self.channels.iter_mut().find(|c| c.index == channel.index) {
            *existing = channel;
        } else {
            self.channels.push(channel);
        }
    }

    pub fn set_my_node(&mut self, info: MyNodeInfo) {
        self.my_node = Some(info);
    }

    /// Refreshes signal metrics for a node we just heard a frame from.
    /// Unknown senders are left for the next NodeInfo broadcast to name.
    pub fn observe(&mut self, node_num: u32, snr: f32, rssi: i32, heard_at: u64) {
        if let Some(entry) = self.nodes.get_mut(&node_num) {
            entry.snr = Some(snr);
            if rssi != 0 {
                entry.rssi = Some(rssi);
            }
            entry.last_heard = Some(heard_at);
        }
    }

    pub fn node_by_id(&self, node_id: &str) -> Option<&NodeEntry> {
        self.nodes.values().find(|n| n.id == node_id)
    }

    pub fn node_by_num(&self, node_num: u32) -> Option<&NodeEntry> {
        self.nodes.get(&node_num)
    }

    /// Looks up a node by textual id, accepting both the canonical
    /// "!"-prefixed spelling and bare hex.
    pub fn resolve(&self, target: &str) -> Option<&NodeEntry> {
        if let Some(entry) = self.node_by_id(target) {
            return Some(entry);
        }
        let alternate = match target.strip_prefix('!') {
            Some(bare) => bare.to_string(),
            None => format!("!{target}"),
        };
        self.node_by_id(&alternate)
    }

    /// True once at least one per-domain config frame has arrived.
    pub fn has_domain_config(&self) -> bool {
        self.device_config.is_some()
            || self.position_config.is_some()
            || self.power_config.is_some()
            || self.network_config.is_some()
            || self.display_config.is_some()
            || self.lora_config.is_some()
            || self.bluetooth_config.is_some()
    }

    /// The local node's own public key, reused as the admin-channel
    /// authentication token on requests to remote targets.
    pub fn session_passkey(&self) -> Option<&[u8]> {
        self.security_config
            .as_ref()
            .map(|s| s.public_key.as_slice())
            .filter(|key| !key.is_empty())
    }
}

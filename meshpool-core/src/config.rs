use meshtastic::protobufs;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::state::{ChannelInfo, DeviceState};

/// Section-keyed configuration snapshot.
///
/// Partial by construction: an absent section means "never captured",
/// never "empty". Which keys are present tells the caller exactly how
/// complete a retrieval was.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(flatten)]
    sections: BTreeMap<String, Value>,
}

impl ConfigSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, section: &str, fields: Value) {
        self.sections.insert(section.to_string(), fields);
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Which layout the endpoint pushed during transport setup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigShape {
    /// Per-domain config frames (current firmware). Preferred.
    #[default]
    Nested,
    /// Single flat key/value blob (legacy firmware or old captures).
    Flat,
}

/// Picks the snapshot shape once, at session-open time. Nested wins
/// whenever at least one per-domain frame arrived.
pub fn detect_shape(state: &DeviceState) -> ConfigShape {
    if state.has_domain_config() || state.legacy_config.is_empty() {
        ConfigShape::Nested
    } else {
        ConfigShape::Flat
    }
}

/// Shape-specific extraction of the primary config sections.
trait LocalConfigSource {
    fn primary_sections(&self, snapshot: &mut ConfigSnapshot);
}

struct NestedSource<'a>(&'a DeviceState);

impl LocalConfigSource for NestedSource<'_> {
    fn primary_sections(&self, snapshot: &mut ConfigSnapshot) {
        let state = self.0;
        if let Some(c) = &state.device_config {
            snapshot.insert("device", device_section(c));
        }
        if let Some(c) = &state.power_config {
            snapshot.insert("power", power_section(c));
        }
        if let Some(c) = &state.network_config {
            snapshot.insert("network", network_section(c));
        }
        if let Some(c) = &state.display_config {
            snapshot.insert("display", display_section(c));
        }
        if let Some(c) = &state.lora_config {
            snapshot.insert("lora", lora_section(c));
        }
        if let Some(c) = &state.bluetooth_config {
            snapshot.insert("bluetooth", bluetooth_section(c));
        }
    }
}

struct FlatSource<'a>(&'a DeviceState);

impl LocalConfigSource for FlatSource<'_> {
    fn primary_sections(&self, snapshot: &mut ConfigSnapshot) {
        let legacy = &self.0.legacy_config;
        let lora: serde_json::Map<String, Value> = ["hop_limit", "region"]
            .iter()
            .filter_map(|key| legacy.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect();
        if !lora.is_empty() {
            snapshot.insert("lora", Value::Object(lora));
        }
        let device: serde_json::Map<String, Value> = ["role"]
            .iter()
            .filter_map(|key| legacy.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect();
        if !device.is_empty() {
            snapshot.insert("device", Value::Object(device));
        }
    }
}

/// Builds the local configuration snapshot from whatever the handshake
/// pushed. Security, channels, position, and module sections do not depend
/// on the top-level shape and are merged afterwards.
pub fn local_snapshot(state: &DeviceState, shape: ConfigShape) -> ConfigSnapshot {
    let mut snapshot = ConfigSnapshot::new();
    let source: &dyn LocalConfigSource = match shape {
        ConfigShape::Nested => &NestedSource(state),
        ConfigShape::Flat => &FlatSource(state),
    };
    source.primary_sections(&mut snapshot);

    if let Some(c) = &state.security_config {
        snapshot.insert("security", security_section(c));
    }
    if !state.channels.is_empty() {
        snapshot.insert("channels", channels_section(&state.channels));
    }
    if let Some(c) = &state.position_config {
        snapshot.insert("position", position_section(c));
    }
    if let Some(c) = &state.module_mqtt {
        snapshot.insert("mqtt", mqtt_section(c));
    }
    if let Some(c) = &state.module_serial {
        snapshot.insert("serial", serial_module_section(c));
    }
    if let Some(c) = &state.module_telemetry {
        snapshot.insert("telemetry", telemetry_module_section(c));
    }
    snapshot
}

/// Maps an admin-channel config response onto its section name and fields.
pub(crate) fn config_section(config: &protobufs::Config) -> Option<(&'static str, Value)> {
    use protobufs::config::PayloadVariant;
    match config.payload_variant.as_ref()? {
        PayloadVariant::Device(c) => Some(("device", device_section(c))),
        PayloadVariant::Position(c) => Some(("position", position_section(c))),
        PayloadVariant::Power(c) => Some(("power", power_section(c))),
        PayloadVariant::Network(c) => Some(("network", network_section(c))),
        PayloadVariant::Display(c) => Some(("display", display_section(c))),
        PayloadVariant::Lora(c) => Some(("lora", lora_section(c))),
        PayloadVariant::Bluetooth(c) => Some(("bluetooth", bluetooth_section(c))),
        PayloadVariant::Security(c) => Some(("security", security_section(c))),
        _ => None,
    }
}

/// Maps an admin-channel module config response onto its section.
pub(crate) fn module_section(module: &protobufs::ModuleConfig) -> Option<(&'static str, Value)> {
    use protobufs::module_config::PayloadVariant;
    match module.payload_variant.as_ref()? {
        PayloadVariant::Mqtt(c) => Some(("mqtt", mqtt_section(c))),
        PayloadVariant::Serial(c) => Some(("serial", serial_module_section(c))),
        PayloadVariant::Telemetry(c) => Some(("telemetry", telemetry_module_section(c))),
        _ => None,
    }
}

pub(crate) fn metadata_section(m: &protobufs::DeviceMetadata) -> Value {
    json!({
        "firmware_version": m.firmware_version,
        "device_state_version": m.device_state_version,
        "hw_model": format!("{:?}", m.hw_model()),
        "role": format!("{:?}", m.role()),
        "has_wifi": m.has_wifi,
        "has_bluetooth": m.has_bluetooth,
        "has_ethernet": m.has_ethernet,
        "can_shutdown": m.can_shutdown,
    })
}

fn device_section(c: &protobufs::config::DeviceConfig) -> Value {
    json!({
        "role": format!("{:?}", c.role()),
        "rebroadcast_mode": format!("{:?}", c.rebroadcast_mode()),
        "node_info_broadcast_secs": c.node_info_broadcast_secs,
        "button_gpio": c.button_gpio,
        "buzzer_gpio": c.buzzer_gpio,
        "tzdef": if c.tzdef.is_empty() { Value::Null } else { json!(c.tzdef) },
        "disable_triple_click": c.disable_triple_click,
    })
}

fn position_section(c: &protobufs::config::PositionConfig) -> Value {
    json!({
        "position_broadcast_secs": c.position_broadcast_secs,
        "position_broadcast_smart_enabled": c.position_broadcast_smart_enabled,
        "fixed_position": c.fixed_position,
        "gps_mode": format!("{:?}", c.gps_mode()),
        "gps_update_interval": c.gps_update_interval,
        "position_flags": c.position_flags,
    })
}

fn power_section(c: &protobufs::config::PowerConfig) -> Value {
    json!({
        "is_power_saving": c.is_power_saving,
        "on_battery_shutdown_after_secs": c.on_battery_shutdown_after_secs,
        "adc_multiplier_override": c.adc_multiplier_override,
        "wait_bluetooth_secs": c.wait_bluetooth_secs,
        "sds_secs": c.sds_secs,
        "ls_secs": c.ls_secs,
        "min_wake_secs": c.min_wake_secs,
    })
}

fn network_section(c: &protobufs::config::NetworkConfig) -> Value {
    json!({
        "wifi_enabled": c.wifi_enabled,
        "wifi_ssid": c.wifi_ssid,
        "wifi_psk_set": !c.wifi_psk.is_empty(),
        "ntp_server": c.ntp_server,
        "eth_enabled": c.eth_enabled,
    })
}

fn display_section(c: &protobufs::config::DisplayConfig) -> Value {
    json!({
        "screen_on_secs": c.screen_on_secs,
        "gps_format": format!("{:?}", c.gps_format()),
        "auto_screen_carousel_secs": c.auto_screen_carousel_secs,
        "compass_north_top": c.compass_north_top,
        "flip_screen": c.flip_screen,
        "units": format!("{:?}", c.units()),
        "displaymode": format!("{:?}", c.displaymode()),
        "heading_bold": c.heading_bold,
        "wake_on_tap_or_motion": c.wake_on_tap_or_motion,
    })
}

fn lora_section(c: &protobufs::config::LoRaConfig) -> Value {
    json!({
        "use_preset": c.use_preset,
        "modem_preset": format!("{:?}", c.modem_preset()),
        "bandwidth": c.bandwidth,
        "spread_factor": c.spread_factor,
        "coding_rate": c.coding_rate,
        "frequency_offset": c.frequency_offset,
        "region": format!("{:?}", c.region()),
        "hop_limit": c.hop_limit,
        "tx_enabled": c.tx_enabled,
        "tx_power": c.tx_power,
        "channel_num": c.channel_num,
        "ignore_mqtt": c.ignore_mqtt,
    })
}

fn bluetooth_section(c: &protobufs::config::BluetoothConfig) -> Value {
    json!({
        "enabled": c.enabled,
        "mode": format!("{:?}", c.mode()),
        "fixed_pin": c.fixed_pin,
    })
}

/// Key material is surfaced as lowercase hex plus an explicit slot-set
/// flag, never as raw bytes.
fn security_section(c: &protobufs::config::SecurityConfig) -> Value {
    json!({
        "public_key": hex_or_null(&c.public_key),
        "public_key_set": !c.public_key.is_empty(),
        "private_key": hex_or_null(&c.private_key),
        "private_key_set": !c.private_key.is_empty(),
        "admin_key": c.admin_key.first().map(hex::encode),
        "admin_key_set": c.admin_key.iter().any(|k| !k.is_empty()),
        "is_managed": c.is_managed,
        "serial_enabled": c.serial_enabled,
        "admin_channel_enabled": c.admin_channel_enabled,
    })
}

fn mqtt_section(c: &protobufs::module_config::MqttConfig) -> Value {
    json!({
        "enabled": c.enabled,
        "address": c.address,
        "username": c.username,
        "password_set": !c.password.is_empty(),
        "encryption_enabled": c.encryption_enabled,
        "json_enabled": c.json_enabled,
        "tls_enabled": c.tls_enabled,
        "root": c.root,
        "proxy_to_client_enabled": c.proxy_to_client_enabled,
        "map_reporting_enabled": c.map_reporting_enabled,
    })
}

fn serial_module_section(c: &protobufs::module_config::SerialConfig) -> Value {
    json!({
        "enabled": c.enabled,
        "echo": c.echo,
        "rxd": c.rxd,
        "txd": c.txd,
        "baud": format!("{:?}", c.baud()),
        "timeout": c.timeout,
        "mode": format!("{:?}", c.mode()),
    })
}

fn telemetry_module_section(c: &protobufs::module_config::TelemetryConfig) -> Value {
    json!({
        "device_update_interval": c.device_update_interval,
        "environment_update_interval": c.environment_update_interval,
        "environment_measurement_enabled": c.environment_measurement_enabled,
        "environment_screen_enabled": c.environment_screen_enabled,
        "environment_display_fahrenheit": c.environment_display_fahrenheit,
    })
}

fn channels_section(channels: &[ChannelInfo]) -> Value {
    Value::Array(
        channels
            .iter()
            .map(|c| {
                json!({
                    "index": c.index,
                    "name": c.name,
                    "role": c.role,
                    "psk": hex_or_null(&c.psk),
                    "psk_set": !c.psk.is_empty(),
                    "uplink_enabled": c.uplink_enabled,
                    "downlink_enabled": c.downlink_enabled,
                })
            })
            .collect(),
    )
}

fn hex_or_null(key: &[u8]) -> Value {
    if key.is_empty() {
        Value::Null
    } else {
        json!(hex::encode(key))
    }
}

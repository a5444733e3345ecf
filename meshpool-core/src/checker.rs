use serde::Serialize;
use serde_json::{Value, json};
use strum::Display;

use crate::config::ConfigSnapshot;

/// Outcome class for one configuration rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warning,
    Fail,
}

/// One evaluated configuration rule.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigCheck {
    pub node_id: String,
    pub check_type: &'static str,
    pub expected: Value,
    pub actual: Value,
    pub status: CheckStatus,
    pub message: String,
}

impl ConfigCheck {
    fn new(
        node_id: &str,
        check_type: &'static str,
        expected: Value,
        actual: Value,
        status: CheckStatus,
        message: String,
    ) -> Self {
        Self {
            node_id: node_id.to_string(),
            check_type,
            expected,
            actual,
            status,
            message,
        }
    }
}

/// Evaluates node configuration snapshots against expected settings.
/// Pure: operates on snapshot JSON, no I/O.
pub struct ConfigChecker {
    pub expected_hop_limit: u64,
    pub expected_region: Option<String>,
}

impl ConfigChecker {
    pub fn new(expected_hop_limit: u64, expected_region: Option<String>) -> Self {
        Self {
            expected_hop_limit,
            expected_region,
        }
    }

    /// Runs every applicable rule against one node's snapshot.
    pub fn check_node(&self, node_id: &str, config: &ConfigSnapshot) -> Vec<ConfigCheck> {
        let mut checks = vec![self.check_hop_limit(node_id, config)];
        if self.expected_region.is_some() {
            checks.push(self.check_region(node_id, config));
        }
        if config.contains("security") {
            checks.push(self.check_admin_key(node_id, config));
            checks.push(self.check_serial_console(node_id, config));
        }
        if config.contains("channels") {
            checks.extend(self.check_channel_encryption(node_id, config));
        }
        checks
    }

    fn check_hop_limit(&self, node_id: &str, config: &ConfigSnapshot) -> ConfigCheck {
        let expected = self.expected_hop_limit;
        let actual = config
            .section("lora")
            .and_then(|lora| lora.get("hop_limit"))
            .and_then(Value::as_u64);
        match actual {
            None => ConfigCheck::new(
                node_id,
                "hop_limit",
                json!(expected),
                Value::Null,
                CheckStatus::Warning,
                format!("Hop limit not configured (expected: {expected})"),
            ),
            Some(value) if value == expected => ConfigCheck::new(
                node_id,
                "hop_limit",
                json!(expected),
                json!(value),
                CheckStatus::Pass,
                format!("Hop limit correctly set to {expected}"),
            ),
            Some(value) => ConfigCheck::new(
                node_id,
                "hop_limit",
                json!(expected),
                json!(value),
                CheckStatus::Fail,
                format!("Hop limit mismatch: expected {expected}, got {value}"),
            ),
        }
    }

    fn check_region(&self, node_id: &str, config: &ConfigSnapshot) -> ConfigCheck {
        let Some(expected) = self.expected_region.as_deref() else {
            return ConfigCheck::new(
                node_id,
                "region",
                Value::Null,
                Value::Null,
                CheckStatus::Pass,
                "Region check skipped (no expected region configured)".to_string(),
            );
        };
        let actual = config
            .section("lora")
            .and_then(|lora| lora.get("region"))
            .and_then(Value::as_str);
        match actual {
            None => ConfigCheck::new(
                node_id,
                "region",
                json!(expected),
                Value::Null,
                CheckStatus::Warning,
                format!("Region not configured (expected: {expected})"),
            ),
            Some(value) if value == expected => ConfigCheck::new(
                node_id,
                "region",
                json!(expected),
                json!(value),
                CheckStatus::Pass,
                format!("Region correctly set to {expected}"),
            ),
            Some(value) => ConfigCheck::new(
                node_id,
                "region",
                json!(expected),
                json!(value),
                CheckStatus::Fail,
                format!("Region mismatch: expected {expected}, got {value}"),
            ),
        }
    }

    fn check_admin_key(&self, node_id: &str, config: &ConfigSnapshot) -> ConfigCheck {
        let security = config.section("security");
        let key_set = security
            .and_then(|s| s.get("admin_key_set"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let key = security
            .and_then(|s| s.get("admin_key"))
            .and_then(Value::as_str);

        if !key_set {
            return ConfigCheck::new(
                node_id,
                "admin_key",
                json!("Admin key set"),
                Value::Null,
                CheckStatus::Warning,
                "Admin key not configured".to_string(),
            );
        }
        // "00"/"01" are the well-known default placeholder keys
        if matches!(key, Some("00") | Some("01")) {
            return ConfigCheck::new(
                node_id,
                "admin_key",
                json!("Secure admin key"),
                json!(preview(key)),
                CheckStatus::Fail,
                "Admin key appears to be default/weak".to_string(),
            );
        }
        ConfigCheck::new(
            node_id,
            "admin_key",
            json!("Admin key set"),
            json!(preview(key)),
            CheckStatus::Pass,
            "Admin key is configured".to_string(),
        )
    }

    fn check_serial_console(&self, node_id: &str, config: &ConfigSnapshot) -> ConfigCheck {
        let serial_enabled = config
            .section("security")
            .and_then(|s| s.get("serial_enabled"))
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if serial_enabled {
            ConfigCheck::new(
                node_id,
                "serial_access",
                json!("Serial disabled"),
                json!("Serial enabled"),
                CheckStatus::Warning,
                "Serial console is enabled (security consideration)".to_string(),
            )
        } else {
            ConfigCheck::new(
                node_id,
                "serial_access",
                json!("Serial disabled"),
                json!("Serial disabled"),
                CheckStatus::Pass,
                "Serial console is disabled".to_string(),
            )
        }
    }

    fn check_channel_encryption(&self, node_id: &str, config: &ConfigSnapshot) -> Vec<ConfigCheck> {
        let channels = config
            .section("channels")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if channels.is_empty() {
            return vec![ConfigCheck::new(
                node_id,
                "channel_encryption",
                json!("Channels configured"),
                Value::Null,
                CheckStatus::Warning,
                "No channels configured".to_string(),
            )];
        }

        channels
            .iter()
            .map(|channel| {
                let name = channel
                    .get("name")
                    .and_then(Value::as_str)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        format!(
                            "Channel {index}",
                            index = channel.get("index").and_then(Value::as_u64).unwrap_or(0)
                        )
                    });
                let psk_set = channel
                    .get("psk_set")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if psk_set {
                    let psk = channel.get("psk").and_then(Value::as_str);
                    ConfigCheck::new(
                        node_id,
                        "channel_encryption",
                        json!(format!("{name} encrypted")),
                        json!(preview(psk)),
                        CheckStatus::Pass,
                        format!("{name} is encrypted"),
                    )
                } else {
                    ConfigCheck::new(
                        node_id,
                        "channel_encryption",
                        json!(format!("{name} encrypted")),
                        json!("Not encrypted"),
                        CheckStatus::Warning,
                        format!("{name} is not encrypted"),
                    )
                }
            })
            .collect()
    }
}

/// First eight hex characters of a key, for display.
fn preview(key: Option<&str>) -> String {
    match key {
        Some(k) if k.len() > 8 => format!("{}…", &k[..8]),
        Some(k) => k.to_string(),
        None => "?".to_string(),
    }
}

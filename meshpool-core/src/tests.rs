#[cfg(test)]
mod correlator_tests {
    use crate::correlator::Correlator;
    use anyhow::Result;
    use meshtastic::Message;
    use meshtastic::protobufs;
    use std::time::Duration;

    fn routing_ack(request_id: u32, from: u32) -> protobufs::MeshPacket {
        let routing = protobufs::Routing {
            variant: Some(protobufs::routing::Variant::ErrorReason(0)),
        };
        protobufs::MeshPacket {
            payload_variant: Some(protobufs::mesh_packet::PayloadVariant::Decoded(
                protobufs::Data {
                    portnum: protobufs::PortNum::RoutingApp as i32,
                    payload: routing.encode_to_vec(),
                    request_id,
                    ..Default::default()
                },
            )),
            from,
            ..Default::default()
        }
    }

    fn admin_reply(request_id: u32, from: u32) -> protobufs::MeshPacket {
        let admin = protobufs::AdminMessage {
            payload_variant: Some(protobufs::admin_message::PayloadVariant::GetConfigResponse(
                protobufs::Config {
                    payload_variant: Some(protobufs::config::PayloadVariant::Lora(
                        protobufs::config::LoRaConfig {
                            hop_limit: 7,
                            ..Default::default()
                        },
                    )),
                },
            )),
            session_passkey: Vec::new(),
        };
        protobufs::MeshPacket {
            payload_variant: Some(protobufs::mesh_packet::PayloadVariant::Decoded(
                protobufs::Data {
                    portnum: protobufs::PortNum::AdminApp as i32,
                    payload: admin.encode_to_vec(),
                    request_id,
                    ..Default::default()
                },
            )),
            from,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ack_matched_to_waiter() -> Result<()> {
        let correlator = Correlator::new();
        correlator.register(42).await;

        correlator.dispatch(&routing_ack(42, 0xaaa111)).await;

        let ack = correlator.await_ack(42, Duration::from_millis(200)).await?;
        let ack = ack.expect("ack should be delivered");
        assert_eq!(ack.request_id, 42);
        assert_eq!(ack.responder_id, "!00aaa111");
        Ok(())
    }

    #[tokio::test]
    async fn test_ack_consumed_exactly_once() -> Result<()> {
        let correlator = Correlator::new();
        correlator.register(42).await;
        correlator.dispatch(&routing_ack(42, 1)).await;

        let first = correlator.await_ack(42, Duration::from_millis(200)).await?;
        assert!(first.is_some());

        // The slot is gone; a second waiter can only time out.
        let second = correlator.await_ack(42, Duration::from_millis(50)).await?;
        assert!(second.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_second_concurrent_waiter_times_out() -> Result<()> {
        let correlator = Correlator::new();
        correlator.register(7).await;

        let c1 = correlator.clone();
        let holder =
            tokio::spawn(async move { c1.await_ack(7, Duration::from_millis(500)).await });
        // Let the first waiter claim the slot before the second arrives.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let c2 = correlator.clone();
        let latecomer =
            tokio::spawn(async move { c2.await_ack(7, Duration::from_millis(100)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        correlator.dispatch(&routing_ack(7, 2)).await;

        let first = holder.await??;
        let second = latecomer.await??;
        assert!(first.is_some());
        assert!(second.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_unrelated_request_id_not_matched() -> Result<()> {
        let correlator = Correlator::new();
        correlator.register(1).await;

        correlator.dispatch(&routing_ack(2, 3)).await;

        let ack = correlator.await_ack(1, Duration::from_millis(50)).await?;
        assert!(ack.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout_stops_tracking() -> Result<()> {
        let correlator = Correlator::new();
        correlator.register(9).await;

        let ack = correlator.await_ack(9, Duration::from_millis(30)).await?;
        assert!(ack.is_none());
        assert!(!correlator.is_tracked(9).await);

        // A late response finds nothing to resolve and is dropped.
        correlator.dispatch(&routing_ack(9, 4)).await;
        let again = correlator.await_ack(9, Duration::from_millis(30)).await?;
        assert!(again.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_response_decoded() -> Result<()> {
        let correlator = Correlator::new();
        correlator.register(55).await;
        correlator.dispatch(&admin_reply(55, 0xdef456)).await;

        let response = correlator
            .await_admin_response(55, Duration::from_millis(200))
            .await?
            .expect("admin response should be delivered");
        assert_eq!(response.responder_id, "!00def456");
        assert!(matches!(
            response.message.payload_variant,
            Some(protobufs::admin_message::PayloadVariant::GetConfigResponse(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_admin_payload_dropped() -> Result<()> {
        let correlator = Correlator::new();
        correlator.register(5).await;

        let garbage = protobufs::MeshPacket {
            payload_variant: Some(protobufs::mesh_packet::PayloadVariant::Decoded(
                protobufs::Data {
                    portnum: protobufs::PortNum::AdminApp as i32,
                    payload: vec![0xff, 0xfe, 0xfd, 0x99, 0x98],
                    request_id: 5,
                    ..Default::default()
                },
            )),
            from: 6,
            ..Default::default()
        };
        correlator.dispatch(&garbage).await;

        let response = correlator
            .await_admin_response(5, Duration::from_millis(50))
            .await?;
        assert!(response.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_transport_close_fails_outstanding_wait() -> Result<()> {
        let correlator = Correlator::new();
        correlator.register(11).await;

        let c = correlator.clone();
        let waiter = tokio::spawn(async move { c.await_ack(11, Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        correlator.fail_all().await;

        let outcome = waiter.await?;
        assert!(outcome.is_err(), "closed transport must error, not hang");
        Ok(())
    }
}

#[cfg(test)]
mod resolution_tests {
    use crate::state::{DeviceState, NodeEntry, UserInfo, canonical_id};
    use anyhow::{Context, Result};

    fn node(id: &str, num: u32) -> NodeEntry {
        NodeEntry {
            id: id.to_string(),
            num,
            user: UserInfo {
                id: id.to_string(),
                long_name: format!("Node {id}"),
                short_name: "N".to_string(),
                hw_model: None,
            },
            last_heard: None,
            snr: None,
            rssi: None,
            hops_away: None,
        }
    }

    #[test]
    fn test_both_spellings_resolve_to_same_entry() -> Result<()> {
        let mut state = DeviceState::new();
        state.update_node(0xabc123, node("!abc123", 0xabc123));

        let bare = state.resolve("abc123").context("bare spelling")?;
        let prefixed = state.resolve("!abc123").context("prefixed spelling")?;
        assert_eq!(bare.num, prefixed.num);
        assert_eq!(bare.id, "!abc123");
        Ok(())
    }

    #[test]
    fn test_alternate_spelling_found() -> Result<()> {
        let mut state = DeviceState::new();
        state.update_node(0xdef456, node("!def456", 0xdef456));

        let entry = state.resolve("def456").context("alternate spelling")?;
        assert_eq!(entry.id, "!def456");
        Ok(())
    }

    #[test]
    fn test_unknown_target_resolves_to_none() {
        let mut state = DeviceState::new();
        state.update_node(1, node("!00000001", 1));
        assert!(state.resolve("cafebabe").is_none());
        assert!(state.resolve("!cafebabe").is_none());
    }

    #[test]
    fn test_canonical_id_zero_pads() {
        assert_eq!(canonical_id(0xabc), "!00000abc");
        assert_eq!(canonical_id(0xdeadbeef), "!deadbeef");
    }

    #[test]
    fn test_observe_only_touches_known_nodes() {
        let mut state = DeviceState::new();
        state.update_node(10, node("!0000000a", 10));

        state.observe(10, 5.5, -70, 1_700_000_000);
        state.observe(99, 1.0, -90, 1_700_000_000);

        let entry = state.nodes.get(&10).expect("known node");
        assert_eq!(entry.snr, Some(5.5));
        assert_eq!(entry.rssi, Some(-70));
        assert_eq!(entry.last_heard, Some(1_700_000_000));
        assert!(!state.nodes.contains_key(&99));
    }
}

#[cfg(test)]
mod session_tests {
    use crate::connection::Session;
    use anyhow::Result;

    #[tokio::test]
    async fn test_close_twice_is_noop() -> Result<()> {
        let mut session = Session::detached("/dev/null-endpoint");
        session.close().await?;
        assert!(!session.is_open());
        session.close().await?;
        assert!(!session.is_open());
        Ok(())
    }
}

#[cfg(test)]
mod config_tests {
    use crate::config::{ConfigShape, ConfigSnapshot, detect_shape, local_snapshot};
    use crate::state::{ChannelInfo, DeviceState};
    use anyhow::{Context, Result};
    use meshtastic::protobufs;
    use serde_json::json;

    fn state_with_lora() -> DeviceState {
        let mut state = DeviceState::new();
        state.lora_config = Some(protobufs::config::LoRaConfig {
            hop_limit: 7,
            tx_enabled: true,
            ..Default::default()
        });
        state
    }

    #[test]
    fn test_nested_snapshot_has_exactly_pushed_sections() -> Result<()> {
        let mut state = state_with_lora();
        state.device_config = Some(protobufs::config::DeviceConfig::default());

        let snapshot = local_snapshot(&state, ConfigShape::Nested);
        assert!(snapshot.contains("lora"));
        assert!(snapshot.contains("device"));
        assert!(!snapshot.contains("power"));
        assert!(!snapshot.contains("network"));

        let lora = snapshot.section("lora").context("lora section")?;
        assert_eq!(lora.get("hop_limit"), Some(&json!(7)));
        Ok(())
    }

    #[test]
    fn test_flat_snapshot_fallback() -> Result<()> {
        let mut state = DeviceState::new();
        state
            .legacy_config
            .insert("hop_limit".to_string(), json!(3));
        state.legacy_config.insert("region".to_string(), json!("Us"));
        state.legacy_config.insert("role".to_string(), json!("Router"));

        assert_eq!(detect_shape(&state), ConfigShape::Flat);

        let snapshot = local_snapshot(&state, ConfigShape::Flat);
        let lora = snapshot.section("lora").context("lora section")?;
        assert_eq!(lora.get("hop_limit"), Some(&json!(3)));
        assert_eq!(lora.get("region"), Some(&json!("Us")));
        let device = snapshot.section("device").context("device section")?;
        assert_eq!(device.get("role"), Some(&json!("Router")));
        Ok(())
    }

    #[test]
    fn test_nested_shape_preferred_over_legacy() {
        let mut state = state_with_lora();
        state
            .legacy_config
            .insert("hop_limit".to_string(), json!(3));
        assert_eq!(detect_shape(&state), ConfigShape::Nested);
    }

    #[test]
    fn test_empty_state_defaults_to_nested() {
        assert_eq!(detect_shape(&DeviceState::new()), ConfigShape::Nested);
    }

    #[test]
    fn test_security_material_surfaced_as_hex() -> Result<()> {
        let mut state = DeviceState::new();
        state.security_config = Some(protobufs::config::SecurityConfig {
            public_key: vec![0xab, 0xcd, 0xef],
            private_key: Vec::new(),
            admin_key: vec![vec![0x01, 0x02]],
            serial_enabled: true,
            ..Default::default()
        });

        let snapshot = local_snapshot(&state, ConfigShape::Nested);
        let security = snapshot.section("security").context("security section")?;
        assert_eq!(security.get("public_key"), Some(&json!("abcdef")));
        assert_eq!(security.get("public_key_set"), Some(&json!(true)));
        assert_eq!(security.get("private_key"), Some(&json!(null)));
        assert_eq!(security.get("private_key_set"), Some(&json!(false)));
        assert_eq!(security.get("admin_key"), Some(&json!("0102")));
        assert_eq!(security.get("admin_key_set"), Some(&json!(true)));
        Ok(())
    }

    #[test]
    fn test_channel_psk_surfaced_as_hex() -> Result<()> {
        let mut state = DeviceState::new();
        state.update_channel(ChannelInfo {
            index: 0,
            name: "Primary".to_string(),
            role: "Primary".to_string(),
            psk: vec![0x01],
            uplink_enabled: false,
            downlink_enabled: false,
        });
        state.update_channel(ChannelInfo {
            index: 1,
            name: "ops".to_string(),
            role: "Secondary".to_string(),
            psk: Vec::new(),
            uplink_enabled: true,
            downlink_enabled: true,
        });

        let snapshot = local_snapshot(&state, ConfigShape::Nested);
        let channels = snapshot
            .section("channels")
            .and_then(|c| c.as_array())
            .context("channels array")?;
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].get("psk"), Some(&json!("01")));
        assert_eq!(channels[0].get("psk_set"), Some(&json!(true)));
        assert_eq!(channels[1].get("psk"), Some(&json!(null)));
        assert_eq!(channels[1].get("psk_set"), Some(&json!(false)));
        Ok(())
    }

    #[test]
    fn test_position_merged_independently_of_shape() -> Result<()> {
        let mut state = DeviceState::new();
        state
            .legacy_config
            .insert("hop_limit".to_string(), json!(3));
        state.position_config = Some(protobufs::config::PositionConfig {
            position_broadcast_secs: 900,
            ..Default::default()
        });

        let snapshot = local_snapshot(&state, ConfigShape::Flat);
        let position = snapshot.section("position").context("position section")?;
        assert_eq!(position.get("position_broadcast_secs"), Some(&json!(900)));
        Ok(())
    }

    #[test]
    fn test_snapshot_round_trips_through_json() -> Result<()> {
        let mut snapshot = ConfigSnapshot::new();
        snapshot.insert("lora", json!({"hop_limit": 7}));
        let text = serde_json::to_string(&snapshot)?;
        let parsed: ConfigSnapshot = serde_json::from_str(&text)?;
        assert_eq!(parsed, snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod admin_policy_tests {
    use crate::admin::{ConfigFetcher, SectionSpec, build_send_report, retrieve_with};
    use crate::correlator::Ack;
    use crate::error::PoolError;
    use anyhow::Result;
    use chrono::Utc;
    use serde_json::{Value, json};
    use std::collections::{HashMap, VecDeque};
    use std::time::Duration;

    /// Scripted stand-in for the radio: every unscripted section answers
    /// on the first attempt.
    #[derive(Default)]
    struct ScriptedFetcher {
        metadata: VecDeque<Result<Option<Value>>>,
        sections: HashMap<&'static str, VecDeque<Result<Option<Value>>>>,
        metadata_calls: u32,
        section_calls: Vec<&'static str>,
    }

    impl ScriptedFetcher {
        fn new() -> Self {
            Self::default()
        }

        fn with_metadata(mut self) -> Self {
            self.metadata
                .push_back(Ok(Some(json!({"firmware_version": "2.5.6"}))));
            self
        }

        fn metadata_outcome(mut self, outcome: Result<Option<Value>>) -> Self {
            self.metadata.push_back(outcome);
            self
        }

        fn silent_section(mut self, name: &'static str) -> Self {
            // Three timeouts uses up every attempt a section gets.
            self.sections
                .insert(name, VecDeque::from([Ok(None), Ok(None), Ok(None)]));
            self
        }
    }

    impl ConfigFetcher for ScriptedFetcher {
        async fn fetch_metadata(&mut self) -> Result<Option<Value>> {
            self.metadata_calls += 1;
            self.metadata.pop_front().unwrap_or(Ok(None))
        }

        async fn fetch_section(&mut self, section: &SectionSpec) -> Result<Option<Value>> {
            self.section_calls.push(section.name);
            match self.sections.get_mut(section.name) {
                Some(queue) => queue.pop_front().unwrap_or(Ok(None)),
                None => Ok(Some(json!({"section": section.name}))),
            }
        }
    }

    fn transport_error() -> anyhow::Error {
        PoolError::Transport("serial unplugged".to_string()).into()
    }

    #[tokio::test]
    async fn test_metadata_silence_raises_no_response() -> Result<()> {
        let mut fetcher = ScriptedFetcher::new();
        let err = retrieve_with(&mut fetcher, "!abc123", 1)
            .await
            .expect_err("silent metadata must fail");

        match err.downcast_ref::<PoolError>() {
            Some(PoolError::NoResponse { attempts, .. }) => assert_eq!(*attempts, 2),
            other => panic!("expected NoResponse, got {other:?}"),
        }
        assert_eq!(fetcher.metadata_calls, 2);
        assert!(
            fetcher.section_calls.is_empty(),
            "no section request may be sent when metadata never answered"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_first_section_failure_aborts_remaining() -> Result<()> {
        let mut fetcher = ScriptedFetcher::new().with_metadata().silent_section("device");
        let snapshot = retrieve_with(&mut fetcher, "!abc123", 1).await?;

        let keys: Vec<&str> = snapshot.section_names().collect();
        assert_eq!(keys, vec!["metadata"]);
        assert_eq!(fetcher.section_calls, vec!["device", "device", "device"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_later_section_failure_skips_only_itself() -> Result<()> {
        let mut fetcher = ScriptedFetcher::new().with_metadata().silent_section("position");
        let snapshot = retrieve_with(&mut fetcher, "!abc123", 1).await?;

        assert!(snapshot.contains("metadata"));
        assert!(snapshot.contains("device"));
        assert!(!snapshot.contains("position"));
        assert!(snapshot.contains("power"));
        assert!(snapshot.contains("telemetry"));

        let position_attempts = fetcher
            .section_calls
            .iter()
            .filter(|s| **s == "position")
            .count();
        assert_eq!(position_attempts, 3);
        assert!(fetcher.section_calls.contains(&"bluetooth"));
        Ok(())
    }

    #[tokio::test]
    async fn test_snapshot_keys_equal_captured_sections() -> Result<()> {
        let mut fetcher = ScriptedFetcher::new().with_metadata().silent_section("mqtt");
        let snapshot = retrieve_with(&mut fetcher, "!abc123", 0).await?;

        let keys: Vec<&str> = snapshot.section_names().collect();
        assert_eq!(
            keys,
            vec![
                "bluetooth",
                "device",
                "display",
                "lora",
                "metadata",
                "network",
                "position",
                "power",
                "serial",
                "telemetry",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_transport_error_restarts_whole_sequence() -> Result<()> {
        let mut fetcher = ScriptedFetcher::new()
            .metadata_outcome(Err(transport_error()))
            .with_metadata();
        let snapshot = retrieve_with(&mut fetcher, "!abc123", 1).await?;

        assert!(snapshot.contains("metadata"));
        assert_eq!(fetcher.metadata_calls, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_transport_exhaustion_raises() -> Result<()> {
        let mut fetcher = ScriptedFetcher::new()
            .metadata_outcome(Err(transport_error()))
            .metadata_outcome(Err(transport_error()));
        let err = retrieve_with(&mut fetcher, "!abc123", 1)
            .await
            .expect_err("persistent transport failure must exhaust retries");

        match err.downcast_ref::<PoolError>() {
            Some(PoolError::RetriesExhausted { attempts, .. }) => assert_eq!(*attempts, 2),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_send_report_with_ack() {
        let ack = Ack {
            request_id: 77,
            responder_id: "!00aaa111".to_string(),
            received_at: Utc::now(),
        };
        let report = build_send_report(77, Some(ack), Duration::from_secs(30));
        assert!(report.success);
        assert!(report.ack_received);
        assert_eq!(report.responder_id.as_deref(), Some("!00aaa111"));
        assert!(report.error.is_none());
    }

    #[test]
    fn test_send_report_without_ack() {
        let report = build_send_report(77, None, Duration::from_secs(30));
        assert!(!report.success);
        assert!(!report.ack_received);
        assert!(report.responder_id.is_none());
        assert_eq!(
            report.error.as_deref(),
            Some("No ACK received within 30s")
        );
    }
}

#[cfg(test)]
mod heard_tests {
    use crate::heard::import_heard;
    use crate::state::{DeviceState, NodeEntry, Position, UserInfo};
    use anyhow::{Context, Result};

    fn node(id: &str, num: u32, long_name: &str, snr: Option<f32>) -> NodeEntry {
        NodeEntry {
            id: id.to_string(),
            num,
            user: UserInfo {
                id: id.to_string(),
                long_name: long_name.to_string(),
                short_name: "N1".to_string(),
                hw_model: Some("TBeam".to_string()),
            },
            last_heard: Some(1_700_000_000),
            snr,
            rssi: Some(-80),
            hops_away: Some(2),
        }
    }

    #[test]
    fn test_import_excludes_local_node() -> Result<()> {
        let mut state = DeviceState::new();
        state.update_node(1, node("!00000001", 1, "Local", None));
        state.update_node(2, node("!00000002", 2, "Remote A", Some(5.5)));
        state.update_node(3, node("!00000003", 3, "Remote B", Some(-2.0)));

        let (nodes, history) = import_heard(&state, "!00000001");
        assert_eq!(nodes.len(), 2);
        assert_eq!(history.len(), 2);
        assert!(nodes.iter().all(|n| n.id != "!00000001"));
        assert!(history.iter().all(|h| h.seen_by == "!00000001"));
        Ok(())
    }

    #[test]
    fn test_history_carries_position_when_known() -> Result<()> {
        let mut state = DeviceState::new();
        state.update_node(1, node("!00000001", 1, "Local", None));
        state.update_node(2, node("!00000002", 2, "Remote", Some(1.0)));
        state.update_position(
            2,
            Position {
                node_id: "!00000002".to_string(),
                node_num: 2,
                latitude: 37.7749,
                longitude: -122.4194,
                altitude: Some(12),
                time: None,
                last_updated: 1_700_000_000,
            },
        );

        let (_, history) = import_heard(&state, "!00000001");
        let entry = history.first().context("history entry")?;
        assert_eq!(entry.position_lat, Some(37.7749));
        assert_eq!(entry.position_lon, Some(-122.4194));
        assert_eq!(entry.hops_away, Some(2));
        Ok(())
    }

    #[test]
    fn test_empty_names_get_placeholders() -> Result<()> {
        let mut state = DeviceState::new();
        let mut anonymous = node("!00000005", 5, "", None);
        anonymous.user.short_name = String::new();
        state.update_node(5, anonymous);

        let (nodes, history) = import_heard(&state, "!00000001");
        let imported = nodes.first().context("imported node")?;
        assert_eq!(imported.short_name, "?");
        assert_eq!(imported.long_name, "Unknown");
        assert_eq!(history[0].long_name, "Unknown");
        assert!(imported.firmware_version.is_none());
        Ok(())
    }
}

#[cfg(test)]
mod discovery_tests {
    use crate::discovery::{list_local_endpoints, union_of_all_patterns};

    #[test]
    fn test_unknown_platform_union_includes_all_families() {
        let union = union_of_all_patterns();
        assert!(union.iter().any(|p| p == "COM1"));
        assert!(union.iter().any(|p| p == "COM20"));
        assert!(!union.iter().any(|p| p == "COM21"));
    }

    #[test]
    fn test_list_local_endpoints_never_fails() {
        // Whatever the host looks like, enumeration must not panic; an
        // empty list is a valid answer.
        let _ = list_local_endpoints();
    }
}

#[cfg(test)]
mod checker_tests {
    use crate::checker::{CheckStatus, ConfigChecker};
    use crate::config::ConfigSnapshot;
    use anyhow::Result;
    use serde_json::json;

    fn snapshot(lora_hop_limit: Option<u64>, region: Option<&str>) -> ConfigSnapshot {
        let mut snap = ConfigSnapshot::new();
        let mut lora = serde_json::Map::new();
        if let Some(hops) = lora_hop_limit {
            lora.insert("hop_limit".to_string(), json!(hops));
        }
        if let Some(region) = region {
            lora.insert("region".to_string(), json!(region));
        }
        if !lora.is_empty() {
            snap.insert("lora", serde_json::Value::Object(lora));
        }
        snap
    }

    fn status_of(checks: &[crate::checker::ConfigCheck], check_type: &str) -> CheckStatus {
        checks
            .iter()
            .find(|c| c.check_type == check_type)
            .unwrap_or_else(|| panic!("missing {check_type} check"))
            .status
    }

    #[test]
    fn test_hop_limit_outcomes() -> Result<()> {
        let checker = ConfigChecker::new(7, None);

        let pass = checker.check_node("!a", &snapshot(Some(7), None));
        assert_eq!(status_of(&pass, "hop_limit"), CheckStatus::Pass);

        let fail = checker.check_node("!a", &snapshot(Some(3), None));
        assert_eq!(status_of(&fail, "hop_limit"), CheckStatus::Fail);

        let missing = checker.check_node("!a", &snapshot(None, None));
        assert_eq!(status_of(&missing, "hop_limit"), CheckStatus::Warning);
        Ok(())
    }

    #[test]
    fn test_region_mismatch_fails() -> Result<()> {
        let checker = ConfigChecker::new(7, Some("Us".to_string()));
        let checks = checker.check_node("!a", &snapshot(Some(7), Some("Eu868")));
        assert_eq!(status_of(&checks, "region"), CheckStatus::Fail);
        Ok(())
    }

    #[test]
    fn test_weak_admin_key_fails() -> Result<()> {
        let checker = ConfigChecker::new(7, None);
        let mut snap = snapshot(Some(7), None);
        snap.insert(
            "security",
            json!({"admin_key": "01", "admin_key_set": true, "serial_enabled": false}),
        );
        let checks = checker.check_node("!a", &snap);
        assert_eq!(status_of(&checks, "admin_key"), CheckStatus::Fail);
        assert_eq!(status_of(&checks, "serial_access"), CheckStatus::Pass);
        Ok(())
    }

    #[test]
    fn test_enabled_serial_console_warns() -> Result<()> {
        let checker = ConfigChecker::new(7, None);
        let mut snap = snapshot(Some(7), None);
        snap.insert(
            "security",
            json!({"admin_key": "aabbccddeeff0011", "admin_key_set": true, "serial_enabled": true}),
        );
        let checks = checker.check_node("!a", &snap);
        assert_eq!(status_of(&checks, "admin_key"), CheckStatus::Pass);
        assert_eq!(status_of(&checks, "serial_access"), CheckStatus::Warning);
        Ok(())
    }

    #[test]
    fn test_channel_encryption_per_channel() -> Result<()> {
        let checker = ConfigChecker::new(7, None);
        let mut snap = snapshot(Some(7), None);
        snap.insert(
            "channels",
            json!([
                {"index": 0, "name": "Primary", "psk": "01", "psk_set": true},
                {"index": 1, "name": "open", "psk": null, "psk_set": false},
            ]),
        );
        let checks = checker.check_node("!a", &snap);
        let encryption: Vec<_> = checks
            .iter()
            .filter(|c| c.check_type == "channel_encryption")
            .collect();
        assert_eq!(encryption.len(), 2);
        assert_eq!(encryption[0].status, CheckStatus::Pass);
        assert_eq!(encryption[1].status, CheckStatus::Warning);
        assert!(encryption[1].message.contains("open"));
        Ok(())
    }
}

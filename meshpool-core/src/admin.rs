use anyhow::Result;
use meshtastic::Message as ProstMessage;
use meshtastic::protobufs;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use strum::Display;
use tracing::{debug, info, warn};

use crate::config::{self, ConfigSnapshot};
use crate::connection::Session;
use crate::correlator::Ack;
use crate::error::PoolError;

/// Attempts per configuration section before giving up on it.
const SECTION_ATTEMPTS: u32 = 3;

/// Whether total failure of the opening section abandons the rest of the
/// order. Policy, not protocol: the first section doubles as a canary for
/// a target that answered metadata and then went quiet.
const ABORT_ON_FIRST_SECTION: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    Local(protobufs::admin_message::ConfigType),
    Module(protobufs::admin_message::ModuleConfigType),
}

/// One independently retrievable configuration section.
#[derive(Debug, Clone, Copy)]
pub struct SectionSpec {
    pub name: &'static str,
    kind: SectionKind,
}

/// Fixed retrieval order: primary config domains first, then modules.
const SECTION_ORDER: &[SectionSpec] = &[
    SectionSpec {
        name: "device",
        kind: SectionKind::Local(protobufs::admin_message::ConfigType::DeviceConfig),
    },
    SectionSpec {
        name: "position",
        kind: SectionKind::Local(protobufs::admin_message::ConfigType::PositionConfig),
    },
    SectionSpec {
        name: "power",
        kind: SectionKind::Local(protobufs::admin_message::ConfigType::PowerConfig),
    },
    SectionSpec {
        name: "network",
        kind: SectionKind::Local(protobufs::admin_message::ConfigType::NetworkConfig),
    },
    SectionSpec {
        name: "display",
        kind: SectionKind::Local(protobufs::admin_message::ConfigType::DisplayConfig),
    },
    SectionSpec {
        name: "lora",
        kind: SectionKind::Local(protobufs::admin_message::ConfigType::LoraConfig),
    },
    SectionSpec {
        name: "bluetooth",
        kind: SectionKind::Local(protobufs::admin_message::ConfigType::BluetoothConfig),
    },
    SectionSpec {
        name: "mqtt",
        kind: SectionKind::Module(protobufs::admin_message::ModuleConfigType::MqttConfig),
    },
    SectionSpec {
        name: "serial",
        kind: SectionKind::Module(protobufs::admin_message::ModuleConfigType::SerialConfig),
    },
    SectionSpec {
        name: "telemetry",
        kind: SectionKind::Module(protobufs::admin_message::ModuleConfigType::TelemetryConfig),
    },
];

/// Section names in retrieval order, for display layers.
pub fn section_names() -> Vec<&'static str> {
    SECTION_ORDER.iter().map(|s| s.name).collect()
}

/// Where a retrieval attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
enum RetrievalPhase {
    Resolving,
    MetadataWait,
    SectionWait,
    Assembled,
    Aborted,
}

/// Per-section diagnostic record. Logged, never persisted.
#[derive(Debug, Clone)]
struct SectionAttempt {
    section: &'static str,
    attempts: u32,
    elapsed: Duration,
    captured: bool,
}

/// Outcome of one acknowledged text delivery. "No ack" is a result, not
/// an error; only resolution and transport failures raise.
#[derive(Debug, Clone, Serialize)]
pub struct SendReport {
    pub success: bool,
    pub packet_id: u32,
    pub ack_received: bool,
    pub responder_id: Option<String>,
    pub error: Option<String>,
}

async fn resolve_target(session: &Session, target: &str) -> Result<(u32, String)> {
    debug!(phase = %RetrievalPhase::Resolving, "resolving '{target}'");
    match session.resolve_node(target).await {
        Some(entry) => Ok((entry.num, entry.id)),
        None => Err(PoolError::Resolution(target.to_string()).into()),
    }
}

/// Sends a text message to a mesh-routed target and waits for the routing
/// acknowledgement.
pub async fn send_acknowledged_message(
    session: &mut Session,
    target: &str,
    text: &str,
    timeout: Duration,
) -> Result<SendReport> {
    let (dest, dest_id) = resolve_target(session, target).await?;
    let packet_id = rand::random::<u32>();

    // Register before transmitting so a fast ack cannot slip past.
    session.correlator().register(packet_id).await;

    let packet = text_packet(dest, packet_id, text);
    if let Err(e) = session.send_packet(packet).await {
        session.correlator().deregister(packet_id).await;
        return Err(e);
    }
    debug!("sent message {packet_id:08x} to {dest_id}, awaiting ack");

    let ack = session.correlator().await_ack(packet_id, timeout).await?;
    Ok(build_send_report(packet_id, ack, timeout))
}

/// Shapes the caller-facing delivery result.
pub(crate) fn build_send_report(packet_id: u32, ack: Option<Ack>, timeout: Duration) -> SendReport {
    match ack {
        Some(ack) => SendReport {
            success: true,
            packet_id,
            ack_received: true,
            responder_id: Some(ack.responder_id),
            error: None,
        },
        None => SendReport {
            success: false,
            packet_id,
            ack_received: false,
            responder_id: None,
            error: Some(format!(
                "No ACK received within {secs}s",
                secs = timeout.as_secs()
            )),
        },
    }
}

/// Sends a `BeginEditSettings` probe to a remote target, authenticated
/// with the local session passkey.
///
/// No acknowledgement is requested: routing acks for admin frames are
/// generated hop-by-hop and prove nothing about the far end, so `true`
/// means "transmitted", not "delivered". Callers needing certainty follow
/// with [`get_remote_config`].
pub async fn verify_remote_admin(session: &mut Session, target: &str) -> Result<bool> {
    let (dest, dest_id) = resolve_target(session, target).await?;
    let passkey = session.session_passkey().await?;

    let admin = protobufs::AdminMessage {
        payload_variant: Some(
            protobufs::admin_message::PayloadVariant::BeginEditSettings(true),
        ),
        session_passkey: passkey,
    };
    let packet_id = rand::random::<u32>();
    session
        .send_packet(admin_packet(dest, packet_id, &admin, false))
        .await?;
    info!("admin probe transmitted to {dest_id}");
    Ok(true)
}

/// Retrieves a remote target's configuration section by section over the
/// admin channel.
///
/// Metadata is requested first and is mandatory (`retries + 1` attempts,
/// silence ⇒ [`PoolError::NoResponse`]). Sections then follow the fixed
/// order with up to three attempts each; total failure of the first
/// section abandons the remainder, later failures only skip themselves.
/// A transport error restarts the whole sequence, no backoff, up to
/// `retries` times. The returned snapshot holds exactly the sections that
/// answered.
pub async fn get_remote_config(
    session: &mut Session,
    target: &str,
    timeout_per_attempt: Duration,
    retries: u32,
) -> Result<ConfigSnapshot> {
    let (dest, dest_id) = resolve_target(session, target).await?;
    let passkey = session.session_passkey().await?;
    let mut fetcher = MeshFetcher {
        session,
        dest,
        passkey,
        timeout: timeout_per_attempt,
    };
    retrieve_with(&mut fetcher, &dest_id, retries).await
}

/// One metadata-or-section exchange against a remote target. Factored out
/// so the retry and abort policy can be driven without a radio.
pub(crate) trait ConfigFetcher {
    /// `Ok(None)` means the attempt timed out; `Err` means the transport
    /// failed and the whole sequence should restart.
    async fn fetch_metadata(&mut self) -> Result<Option<Value>>;
    async fn fetch_section(&mut self, section: &SectionSpec) -> Result<Option<Value>>;
}

struct MeshFetcher<'a> {
    session: &'a mut Session,
    dest: u32,
    passkey: Vec<u8>,
    timeout: Duration,
}

impl MeshFetcher<'_> {
    async fn exchange(
        &mut self,
        variant: protobufs::admin_message::PayloadVariant,
    ) -> Result<Option<protobufs::AdminMessage>> {
        let admin = protobufs::AdminMessage {
            payload_variant: Some(variant),
            session_passkey: self.passkey.clone(),
        };
        let packet_id = rand::random::<u32>();
        self.session.correlator().register(packet_id).await;
        if let Err(e) = self
            .session
            .send_packet(admin_packet(self.dest, packet_id, &admin, true))
            .await
        {
            self.session.correlator().deregister(packet_id).await;
            return Err(e);
        }
        let response = self
            .session
            .correlator()
            .await_admin_response(packet_id, self.timeout)
            .await?;
        Ok(response.map(|r| r.message))
    }
}

impl ConfigFetcher for MeshFetcher<'_> {
    async fn fetch_metadata(&mut self) -> Result<Option<Value>> {
        let response = self
            .exchange(protobufs::admin_message::PayloadVariant::GetDeviceMetadataRequest(true))
            .await?;
        Ok(response.and_then(|msg| match msg.payload_variant {
            Some(protobufs::admin_message::PayloadVariant::GetDeviceMetadataResponse(m)) => {
                Some(config::metadata_section(&m))
            }
            other => {
                debug!("unexpected admin reply to metadata request: {other:?}");
                None
            }
        }))
    }

    async fn fetch_section(&mut self, section: &SectionSpec) -> Result<Option<Value>> {
        let request = match section.kind {
            SectionKind::Local(config_type) => {
                protobufs::admin_message::PayloadVariant::GetConfigRequest(config_type as i32)
            }
            SectionKind::Module(module_type) => {
                protobufs::admin_message::PayloadVariant::GetModuleConfigRequest(module_type as i32)
            }
        };
        let response = self.exchange(request).await?;
        Ok(response.and_then(|msg| match msg.payload_variant {
            Some(protobufs::admin_message::PayloadVariant::GetConfigResponse(c)) => {
                config::config_section(&c).map(|(_, fields)| fields)
            }
            Some(protobufs::admin_message::PayloadVariant::GetModuleConfigResponse(m)) => {
                config::module_section(&m).map(|(_, fields)| fields)
            }
            other => {
                debug!(
                    "unexpected admin reply to '{name}' request: {other:?}",
                    name = section.name
                );
                None
            }
        }))
    }
}

/// Drives the metadata-then-sections sequence with the retry policy.
pub(crate) async fn retrieve_with<F: ConfigFetcher>(
    fetcher: &mut F,
    target: &str,
    retries: u32,
) -> Result<ConfigSnapshot> {
    let started = Instant::now();
    let mut sequence_attempts = 0u32;
    loop {
        sequence_attempts += 1;
        match retrieve_once(fetcher, target, retries).await {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) if is_transport(&e) && sequence_attempts <= retries => {
                warn!("transport failure talking to {target}, restarting sequence: {e}");
            }
            Err(e) if is_transport(&e) => {
                return Err(PoolError::RetriesExhausted {
                    target: target.to_string(),
                    attempts: sequence_attempts,
                    elapsed: started.elapsed(),
                }
                .into());
            }
            Err(e) => return Err(e),
        }
    }
}

async fn retrieve_once<F: ConfigFetcher>(
    fetcher: &mut F,
    target: &str,
    retries: u32,
) -> Result<ConfigSnapshot> {
    let mut snapshot = ConfigSnapshot::new();

    // Metadata is the reachability gate: a target that will not answer it
    // will not answer section requests either.
    debug!(phase = %RetrievalPhase::MetadataWait, "requesting device metadata from {target}");
    let metadata_attempts = retries + 1;
    let mut metadata = None;
    for attempt in 1..=metadata_attempts {
        match fetcher.fetch_metadata().await? {
            Some(fields) => {
                metadata = Some(fields);
                break;
            }
            None => debug!("metadata attempt {attempt}/{metadata_attempts} timed out"),
        }
    }
    let Some(metadata) = metadata else {
        debug!(phase = %RetrievalPhase::Aborted, "{target} never answered metadata");
        return Err(PoolError::NoResponse {
            target: target.to_string(),
            attempts: metadata_attempts,
        }
        .into());
    };
    snapshot.insert("metadata", metadata);

    for (index, section) in SECTION_ORDER.iter().enumerate() {
        debug!(phase = %RetrievalPhase::SectionWait, "requesting section '{name}'", name = section.name);
        let section_started = Instant::now();
        let mut captured = false;
        let mut attempts = 0;
        for attempt in 1..=SECTION_ATTEMPTS {
            attempts = attempt;
            match fetcher.fetch_section(section).await? {
                Some(fields) => {
                    snapshot.insert(section.name, fields);
                    captured = true;
                    break;
                }
                None => debug!(
                    "section '{name}' attempt {attempt}/{SECTION_ATTEMPTS} timed out",
                    name = section.name
                ),
            }
        }
        let record = SectionAttempt {
            section: section.name,
            attempts,
            elapsed: section_started.elapsed(),
            captured,
        };
        debug!(
            section = record.section,
            attempts = record.attempts,
            elapsed = ?record.elapsed,
            captured = record.captured,
            "section exchange finished"
        );

        if !captured {
            if index == 0 && ABORT_ON_FIRST_SECTION {
                warn!(
                    phase = %RetrievalPhase::Aborted,
                    "first section unanswered, skipping the rest for {target}"
                );
                return Ok(snapshot);
            }
            warn!(
                "section '{name}' unanswered after {SECTION_ATTEMPTS} attempts, continuing",
                name = section.name
            );
        }
    }

    debug!(
        phase = %RetrievalPhase::Assembled,
        "captured {count} sections from {target}",
        count = snapshot.len()
    );
    Ok(snapshot)
}

fn is_transport(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<PoolError>(), Some(PoolError::Transport(_)))
}

/// Wraps an admin message in a mesh packet addressed across the mesh.
fn admin_packet(
    dest: u32,
    packet_id: u32,
    admin: &protobufs::AdminMessage,
    want_response: bool,
) -> protobufs::MeshPacket {
    protobufs::MeshPacket {
        payload_variant: Some(protobufs::mesh_packet::PayloadVariant::Decoded(
            protobufs::Data {
                portnum: protobufs::PortNum::AdminApp as i32,
                payload: admin.encode_to_vec(),
                want_response,
                dest: 0,
                source: 0,
                request_id: packet_id,
                reply_id: 0,
                emoji: 0,
                bitfield: Some(0),
            },
        )),
        from: 0,
        to: dest,
        id: packet_id,
        rx_time: 0,
        rx_snr: 0.0,
        hop_limit: 7,
        want_ack: false,
        priority: protobufs::mesh_packet::Priority::Reliable as i32,
        rx_rssi: 0,
        via_mqtt: false,
        hop_start: 7,
        ..Default::default()
    }
}

fn text_packet(dest: u32, packet_id: u32, text: &str) -> protobufs::MeshPacket {
    protobufs::MeshPacket {
        payload_variant: Some(protobufs::mesh_packet::PayloadVariant::Decoded(
            protobufs::Data {
                portnum: protobufs::PortNum::TextMessageApp as i32,
                payload: text.as_bytes().to_vec(),
                want_response: false,
                dest: 0,
                source: 0,
                request_id: 0,
                reply_id: 0,
                emoji: 0,
                bitfield: Some(0),
            },
        )),
        from: 0,
        to: dest,
        id: packet_id,
        rx_time: 0,
        rx_snr: 0.0,
        hop_limit: 7,
        want_ack: true,
        priority: protobufs::mesh_packet::Priority::Reliable as i32,
        rx_rssi: 0,
        via_mqtt: false,
        hop_start: 7,
        ..Default::default()
    }
}

use anyhow::{Context, Result};
use chrono::Utc;
use meshtastic::Message as ProstMessage;
use meshtastic::api::state::Configured;
use meshtastic::api::{ConnectedStreamApi, StreamApi};
use meshtastic::packet::PacketReceiver;
use meshtastic::protobufs;
use meshtastic::utils;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{self, ConfigShape, ConfigSnapshot};
use crate::correlator::Correlator;
use crate::error::PoolError;
use crate::state::{
    ChannelInfo, DeviceState, MyNodeInfo, NodeEntry, NodeIdentity, Position, UserInfo,
    canonical_id, key_prefix,
};

/// How often to re-check the cache for the self-announcement while a
/// session is opening.
const IDENTITY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An open duplex link to one locally attached node.
///
/// The session owns the packet-processing task and exactly one
/// [`Correlator`] for its whole lifetime. Callers run one logical exchange
/// at a time; distinct sessions share nothing.
pub struct Session {
    endpoint: String,
    api: Option<ConnectedStreamApi<Configured>>,
    state: Arc<Mutex<DeviceState>>,
    correlator: Correlator,
    shape: ConfigShape,
    packet_task: Option<JoinHandle<()>>,
}

impl Session {
    /// Opens a session to a serial path, `host:port`, or `tcp://host:port`
    /// endpoint and waits for the node to announce itself.
    pub async fn open(endpoint: &str, setup_timeout: Duration) -> Result<Self> {
        let stream_api = StreamApi::new();

        let (packet_receiver, connected) = if let Some(addr) = tcp_address(endpoint) {
            info!("Connecting via TCP to {addr}");
            let stream = utils::stream::build_tcp_stream(addr)
                .await
                .context("Failed to connect via TCP")?;
            stream_api.connect(stream).await
        } else {
            info!("Connecting via serial port {endpoint}");
            let stream = utils::stream::build_serial_stream(
                endpoint.to_string(),
                None, // Use default baud rate
                None, // Use default DTR
                None, // Use default RTS
            )
            .context("Failed to connect via serial")?;
            stream_api.connect(stream).await
        };

        let config_id = utils::generate_rand_id();
        let api = connected
            .configure(config_id)
            .await
            .context("Failed to configure connection")?;

        let state = Arc::new(Mutex::new(DeviceState::new()));
        let correlator = Correlator::new();
        let packet_task = spawn_packet_loop(packet_receiver, state.clone(), correlator.clone());

        let mut session = Self {
            endpoint: endpoint.to_string(),
            api: Some(api),
            state,
            correlator,
            shape: ConfigShape::Nested,
            packet_task: Some(packet_task),
        };
        if let Err(e) = session.await_identity(setup_timeout).await {
            let _ = session.close().await;
            return Err(e);
        }
        session.shape = config::detect_shape(&*session.state.lock().await);
        debug!("session to {endpoint} open, config shape {:?}", session.shape);
        Ok(session)
    }

    async fn await_identity(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.state.lock().await.my_node.is_some() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PoolError::NoIdentity(self.endpoint.clone()).into());
            }
            tokio::time::sleep(IDENTITY_POLL_INTERVAL).await;
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.api.is_some()
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn config_shape(&self) -> ConfigShape {
        self.shape
    }

    /// Identity of the node on the other end of this session, derived from
    /// its announced node number and the cache entry it broadcast.
    pub async fn local_identity(&self) -> Result<NodeIdentity> {
        let state = self.state.lock().await;
        let my = state
            .my_node
            .as_ref()
            .ok_or_else(|| PoolError::NoIdentity(self.endpoint.clone()))?;
        let node_id = canonical_id(my.node_num);
        let entry = state
            .node_by_id(&node_id)
            .ok_or(PoolError::IdentityNotFound(node_id))?;
        Ok(NodeIdentity {
            id: entry.id.clone(),
            short_name: entry.user.short_name.clone(),
            long_name: entry.user.long_name.clone(),
            hardware_model: entry.user.hw_model.clone(),
            firmware_version: state.firmware_version.clone(),
        })
    }

    /// Snapshot of whatever configuration the transport pushed during the
    /// handshake, in the shape detected at open time.
    pub async fn local_config(&self) -> ConfigSnapshot {
        config::local_snapshot(&*self.state.lock().await, self.shape)
    }

    /// Clone of the full session cache.
    pub async fn state_snapshot(&self) -> DeviceState {
        self.state.lock().await.clone()
    }

    /// Looks up a cached node by id, trying both spellings.
    pub async fn resolve_node(&self, target: &str) -> Option<NodeEntry> {
        self.state.lock().await.resolve(target).cloned()
    }

    /// The local node's public key, presented on remote admin requests.
    pub async fn session_passkey(&self) -> Result<Vec<u8>> {
        let state = self.state.lock().await;
        match state.session_passkey() {
            Some(key) => Ok(key.to_vec()),
            None => Err(PoolError::NoPasskey.into()),
        }
    }

    /// Hands a fully formed mesh packet to the radio.
    pub(crate) async fn send_packet(&mut self, packet: protobufs::MeshPacket) -> Result<()> {
        let api = self
            .api
            .as_mut()
            .ok_or_else(|| PoolError::Transport("session is closed".to_string()))?;
        api.send_to_radio_packet(Some(protobufs::to_radio::PayloadVariant::Packet(packet)))
            .await
            .map_err(|e| PoolError::Transport(e.to_string()))?;
        Ok(())
    }

    /// Releases the transport and fails any outstanding correlator waits.
    /// Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(task) = self.packet_task.take() {
            task.abort();
        }
        self.correlator.fail_all().await;
        if let Some(api) = self.api.take() {
            api.disconnect()
                .await
                .map_err(|e| PoolError::Transport(e.to_string()))?;
            debug!("session to {} closed", self.endpoint);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn detached(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api: None,
            state: Arc::new(Mutex::new(DeviceState::new())),
            correlator: Correlator::new(),
            shape: ConfigShape::Nested,
            packet_task: None,
        }
    }
}

/// Endpoints with a `tcp://` scheme or a port separator are TCP; anything
/// else is a serial device path.
fn tcp_address(endpoint: &str) -> Option<String> {
    if let Some(rest) = endpoint.strip_prefix("tcp://") {
        return Some(rest.to_string());
    }
    if endpoint.contains(':') && !endpoint.starts_with('/') {
        return Some(endpoint.to_string());
    }
    None
}

fn spawn_packet_loop(
    mut receiver: PacketReceiver,
    state: Arc<Mutex<DeviceState>>,
    correlator: Correlator,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("packet loop started");
        while let Some(packet) = receiver.recv().await {
            if let Err(e) = process_from_radio(packet, &state, &correlator).await {
                warn!("Error processing packet: {e}");
            }
        }
        debug!("packet loop ended");
    })
}

async fn process_from_radio(
    from_radio: protobufs::FromRadio,
    state: &Arc<Mutex<DeviceState>>,
    correlator: &Correlator,
) -> Result<()> {
    let Some(variant) = from_radio.payload_variant else {
        return Ok(());
    };

    match variant {
        protobufs::from_radio::PayloadVariant::MyInfo(my_info) => {
            let mut st = state.lock().await;
            if st.firmware_version.is_none() && !my_info.pio_env.is_empty() {
                st.firmware_version = Some(my_info.pio_env.clone());
            }
            st.set_my_node(MyNodeInfo {
                node_num: my_info.my_node_num,
                node_id: canonical_id(my_info.my_node_num),
                reboot_count: my_info.reboot_count,
                min_app_version: my_info.min_app_version,
                device_id: hex::encode(my_info.device_id),
            });
            debug!("node announced itself as {:08x}", my_info.my_node_num);
        }

        protobufs::from_radio::PayloadVariant::NodeInfo(node_info) => {
            let user = node_info.user.clone().unwrap_or_default();
            let mut st = state.lock().await;
            st.update_node(
                node_info.num,
                NodeEntry {
                    id: canonical_id(node_info.num),
                    num: node_info.num,
                    user: UserInfo {
                        id: user.id.clone(),
                        long_name: user.long_name.clone(),
                        short_name: user.short_name.clone(),
                        hw_model: Some(format!("{:?}", user.hw_model())),
                    },
                    last_heard: Some(node_info.last_heard as u64),
                    snr: Some(node_info.snr),
                    rssi: None,
                    hops_away: node_info.hops_away,
                },
            );
            if let Some(position) = node_info.position
                && let (Some(lat), Some(lon)) = (position.latitude_i, position.longitude_i)
            {
                st.update_position(
                    node_info.num,
                    Position {
                        node_id: canonical_id(node_info.num),
                        node_num: node_info.num,
                        latitude: lat as f64 / 1e7,
                        longitude: lon as f64 / 1e7,
                        altitude: position.altitude,
                        time: if position.time > 0 {
                            chrono::DateTime::from_timestamp(position.time as i64, 0)
                                .map(|dt| dt.to_rfc3339())
                        } else {
                            None
                        },
                        last_updated: Utc::now().timestamp() as u64,
                    },
                );
            }
            debug!("cached node info for {:08x}", node_info.num);
        }

        protobufs::from_radio::PayloadVariant::Channel(channel) => {
            let role = format!("{:?}", channel.role());
            let settings = channel.settings.unwrap_or_default();
            let mut st = state.lock().await;
            st.update_channel(ChannelInfo {
                index: channel.index as u32,
                name: if settings.name.is_empty() {
                    format!("Channel {index}", index = channel.index)
                } else {
                    settings.name.clone()
                },
                role,
                psk: settings.psk,
                uplink_enabled: settings.uplink_enabled,
                downlink_enabled: settings.downlink_enabled,
            });
            debug!("cached channel {}", channel.index);
        }

        protobufs::from_radio::PayloadVariant::Config(config) => {
            store_domain_config(config, state).await;
        }

        protobufs::from_radio::PayloadVariant::ModuleConfig(module) => {
            store_module_config(module, state).await;
        }

        protobufs::from_radio::PayloadVariant::Metadata(metadata) => {
            let mut st = state.lock().await;
            st.firmware_version = Some(metadata.firmware_version.clone());
            debug!("firmware version {}", metadata.firmware_version);
        }

        protobufs::from_radio::PayloadVariant::Packet(mesh_packet) => {
            // Correlation runs once per frame, before any other consumer,
            // and never swallows the frame.
            correlator.dispatch(&mesh_packet).await;
            process_mesh_packet(mesh_packet, state).await?;
        }

        _ => {
            // Other packet types not needed for the cache
        }
    }

    Ok(())
}

async fn store_domain_config(config: protobufs::Config, state: &Arc<Mutex<DeviceState>>) {
    use protobufs::config::PayloadVariant;
    let Some(variant) = config.payload_variant else {
        return;
    };
    let mut st = state.lock().await;
    match variant {
        PayloadVariant::Device(c) => st.device_config = Some(c),
        PayloadVariant::Position(c) => st.position_config = Some(c),
        PayloadVariant::Power(c) => st.power_config = Some(c),
        PayloadVariant::Network(c) => st.network_config = Some(c),
        PayloadVariant::Display(c) => st.display_config = Some(c),
        PayloadVariant::Lora(c) => st.lora_config = Some(c),
        PayloadVariant::Bluetooth(c) => st.bluetooth_config = Some(c),
        PayloadVariant::Security(c) => {
            debug!("security config received (public key {})", key_prefix(&c.public_key));
            st.security_config = Some(c);
        }
        _ => {
            // Sessionkey / DeviceUi frames carry nothing we cache
        }
    }
}

async fn store_module_config(module: protobufs::ModuleConfig, state: &Arc<Mutex<DeviceState>>) {
    use protobufs::module_config::PayloadVariant;
    let Some(variant) = module.payload_variant else {
        return;
    };
    let mut st = state.lock().await;
    match variant {
        PayloadVariant::Mqtt(c) => st.module_mqtt = Some(c),
        PayloadVariant::Serial(c) => st.module_serial = Some(c),
        PayloadVariant::Telemetry(c) => st.module_telemetry = Some(c),
        _ => {
            // Remaining module domains are not part of the retrieval set
        }
    }
}

async fn process_mesh_packet(
    mesh_packet: protobufs::MeshPacket,
    state: &Arc<Mutex<DeviceState>>,
) -> Result<()> {
    let Some(variant) = mesh_packet.payload_variant else {
        return Ok(());
    };
    let data = match &variant {
        protobufs::mesh_packet::PayloadVariant::Decoded(decoded) => decoded,
        protobufs::mesh_packet::PayloadVariant::Encrypted(_) => {
            // Can't process encrypted packets
            return Ok(());
        }
    };

    if mesh_packet.from != 0 {
        let mut st = state.lock().await;
        st.observe(
            mesh_packet.from,
            mesh_packet.rx_snr,
            mesh_packet.rx_rssi,
            Utc::now().timestamp() as u64,
        );
    }

    match data.portnum() {
        protobufs::PortNum::PositionApp => {
            if let Ok(position) = protobufs::Position::decode(data.payload.as_slice())
                && let (Some(lat), Some(lon)) = (position.latitude_i, position.longitude_i)
            {
                let mut st = state.lock().await;
                st.update_position(
                    mesh_packet.from,
                    Position {
                        node_id: canonical_id(mesh_packet.from),
                        node_num: mesh_packet.from,
                        latitude: lat as f64 / 1e7,
                        longitude: lon as f64 / 1e7,
                        altitude: position.altitude,
                        time: if position.time > 0 {
                            chrono::DateTime::from_timestamp(position.time as i64, 0)
                                .map(|dt| dt.to_rfc3339())
                        } else {
                            None
                        },
                        last_updated: Utc::now().timestamp() as u64,
                    },
                );
                debug!("updated position for {:08x}", mesh_packet.from);
            }
        }

        protobufs::PortNum::TextMessageApp => {
            debug!(
                "text from {:08x}: {} bytes",
                mesh_packet.from,
                data.payload.len()
            );
        }

        _ => {
            // Routing/admin frames already went through the correlator;
            // nothing else feeds the cache.
        }
    }

    Ok(())
}

use anyhow::Result;
use chrono::{DateTime, Utc};
use meshtastic::Message;
use meshtastic::protobufs;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tracing::debug;

use crate::error::PoolError;
use crate::state::canonical_id;

/// Routing-layer acknowledgement matched to an outstanding request.
#[derive(Debug, Clone)]
pub struct Ack {
    pub request_id: u32,
    pub responder_id: String,
    pub received_at: DateTime<Utc>,
}

/// Decoded admin-channel reply matched to an outstanding request.
#[derive(Debug, Clone)]
pub struct AdminResponse {
    pub request_id: u32,
    pub responder_id: String,
    pub received_at: DateTime<Utc>,
    pub message: protobufs::AdminMessage,
}

struct Slot<T> {
    tx: Option<oneshot::Sender<T>>,
    rx: Option<oneshot::Receiver<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            tx: Some(tx),
            rx: Some(rx),
        }
    }
}

struct Pending {
    ack: Slot<Ack>,
    admin: Slot<AdminResponse>,
}

impl Pending {
    fn new() -> Self {
        Self {
            ack: Slot::new(),
            admin: Slot::new(),
        }
    }
}

/// Matches asynchronous, reorderable responses back to the caller that
/// sent the request.
///
/// Each registered packet id owns one single-slot future per response
/// class (routing ack, admin reply). Dispatch resolves a slot at most
/// once and a waiter consumes it at most once, so duplicate or late
/// responses simply find nothing to resolve. Registration must happen
/// before the request is transmitted, otherwise a fast reply can race
/// past the waiter.
#[derive(Clone, Default)]
pub struct Correlator {
    pending: Arc<Mutex<HashMap<u32, Pending>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a packet id. Call before sending the request.
    pub async fn register(&self, packet_id: u32) {
        self.pending.lock().await.insert(packet_id, Pending::new());
    }

    /// Stops tracking a packet id, failing any waiter still parked on it.
    pub async fn deregister(&self, packet_id: u32) {
        self.pending.lock().await.remove(&packet_id);
    }

    #[cfg(test)]
    pub(crate) async fn is_tracked(&self, packet_id: u32) -> bool {
        self.pending.lock().await.contains_key(&packet_id)
    }

    /// Waits up to `timeout` for the routing ack matching `packet_id`.
    ///
    /// `Ok(None)` means no ack arrived in time. An error is returned only
    /// when the transport went away while waiting.
    pub async fn await_ack(&self, packet_id: u32, timeout: Duration) -> Result<Option<Ack>> {
        let rx = {
            let mut pending = self.pending.lock().await;
            pending.get_mut(&packet_id).and_then(|p| p.ack.rx.take())
        };
        self.await_slot(packet_id, rx, timeout, "ack").await
    }

    /// Waits up to `timeout` for the decoded admin reply matching
    /// `packet_id`. Same contract as [`await_ack`](Self::await_ack).
    pub async fn await_admin_response(
        &self,
        packet_id: u32,
        timeout: Duration,
    ) -> Result<Option<AdminResponse>> {
        let rx = {
            let mut pending = self.pending.lock().await;
            pending.get_mut(&packet_id).and_then(|p| p.admin.rx.take())
        };
        self.await_slot(packet_id, rx, timeout, "admin response").await
    }

    async fn await_slot<T>(
        &self,
        packet_id: u32,
        rx: Option<oneshot::Receiver<T>>,
        timeout: Duration,
        what: &str,
    ) -> Result<Option<T>> {
        let Some(rx) = rx else {
            // Another waiter already holds this slot (or the id was never
            // registered); all this caller can do is time out empty-handed.
            tokio::time::sleep(timeout).await;
            return Ok(None);
        };
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => {
                self.deregister(packet_id).await;
                Ok(Some(value))
            }
            Ok(Err(_)) => Err(PoolError::Transport(format!(
                "link closed while waiting for {what} to {packet_id:08x}"
            ))
            .into()),
            Err(_) => {
                debug!("no {what} for {packet_id:08x} within {timeout:?}");
                self.deregister(packet_id).await;
                Ok(None)
            }
        }
    }

    /// Classifies one received frame against the tracked set. Runs before
    /// any other consumer; the frame is never swallowed — the caller
    /// continues with normal handling regardless of what matched here.
    pub async fn dispatch(&self, packet: &protobufs::MeshPacket) {
        let Some(protobufs::mesh_packet::PayloadVariant::Decoded(data)) = &packet.payload_variant
        else {
            return;
        };
        if data.request_id == 0 {
            return;
        }

        match data.portnum() {
            protobufs::PortNum::RoutingApp => {
                let mut pending = self.pending.lock().await;
                if let Some(slot) = pending.get_mut(&data.request_id)
                    && let Some(tx) = slot.ack.tx.take()
                {
                    let _ = tx.send(Ack {
                        request_id: data.request_id,
                        responder_id: canonical_id(packet.from),
                        received_at: Utc::now(),
                    });
                    debug!("matched ack for request {:08x}", data.request_id);
                }
            }
            protobufs::PortNum::AdminApp => {
                let mut pending = self.pending.lock().await;
                let Some(slot) = pending.get_mut(&data.request_id) else {
                    return;
                };
                match protobufs::AdminMessage::decode(data.payload.as_slice()) {
                    Ok(message) => {
                        if let Some(tx) = slot.admin.tx.take() {
                            let _ = tx.send(AdminResponse {
                                request_id: data.request_id,
                                responder_id: canonical_id(packet.from),
                                received_at: Utc::now(),
                                message,
                            });
                            debug!("matched admin response for request {:08x}", data.request_id);
                        }
                    }
                    // A frame we cannot decode is logged and dropped; it
                    // must never take the session down.
                    Err(e) => debug!(
                        "undecodable admin payload for request {:08x}: {e}",
                        data.request_id
                    ),
                }
            }
            _ => {}
        }
    }

    /// Fails every outstanding wait. Called when the transport closes so
    /// parked waiters observe an error instead of hanging.
    pub async fn fail_all(&self) {
        self.pending.lock().await.clear();
    }
}

use std::time::Duration;
use thiserror::Error;

/// Failure taxonomy for pool operations.
///
/// Operations return `anyhow::Result`; callers that need to branch on the
/// failure class downcast with `err.downcast_ref::<PoolError>()`.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The target id matched nothing in the session cache, under either
    /// the "!"-prefixed or the bare-hex spelling.
    #[error("node '{0}' not found in mesh cache")]
    Resolution(String),

    /// The local node has no public key to present on the admin channel.
    #[error("local node has no public key; cannot authenticate admin requests")]
    NoPasskey,

    /// The mandatory metadata exchange got no answer at all. A target that
    /// stays silent on metadata will not answer section requests either.
    #[error("no response from {target} after {attempts} metadata attempts")]
    NoResponse { target: String, attempts: u32 },

    /// The endpoint never announced a node identity during transport setup.
    #[error("no node identity announced on {0}")]
    NoIdentity(String),

    /// The announced node number is missing from the session cache. Often
    /// transient handshake timing rather than a permanent condition.
    #[error("node {0} missing from session cache")]
    IdentityNotFound(String),

    /// Send or receive failed at the transport layer. Distinct from a
    /// timeout: timeouts are reported as absent data, not errors.
    #[error("transport error: {0}")]
    Transport(String),

    /// Whole-sequence retries exhausted on transport errors.
    #[error("gave up on {target} after {attempts} attempts ({elapsed:?} elapsed)")]
    RetriesExhausted {
        target: String,
        attempts: u32,
        elapsed: Duration,
    },
}

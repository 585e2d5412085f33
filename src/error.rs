//! Error kinds for the control state machine, wire codec, and data pump.

use thiserror::Error;

/// Unified error type for a single client/server run.
///
/// All errors are scoped to one run: the caller (role driver / `main`) decides
/// whether to retry, log, or exit based on the variant.
#[derive(Debug, Error)]
pub enum Iperf3Error {
    /// Malformed JSON, an unexpected command byte at a non-applicable point,
    /// or a short read on the control channel.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Socket-level failure during setup (connect, bind, accept) or any I/O
    /// failure not otherwise classified.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The data socket was closed by the peer mid-run.
    #[error("peer closed the data connection")]
    PeerClosed,

    /// Parameter JSON carried neither `tcp` nor `udp` set to true.
    #[error("config error: {0}")]
    Config(String),

    /// JSON (de)serialization failure outside the `read_json_blob` framing
    /// path, where §7's `ProtocolError` classification does not apply.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Iperf3Error>;

impl Iperf3Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Iperf3Error::Protocol(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Iperf3Error::Config(msg.into())
    }

    /// True for the I/O error kinds that §4.5/§7 treat as a normal
    /// "peer went away" termination signal rather than a hard failure.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, Iperf3Error::PeerClosed)
            || matches!(
                self,
                Iperf3Error::Transport(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::BrokenPipe
                            | std::io::ErrorKind::ConnectionReset
                            | std::io::ErrorKind::UnexpectedEof
                    )
            )
    }
}

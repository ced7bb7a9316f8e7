//! Error kinds surfaced by a transfer.
//!
//! Timeout-class conditions (an ack that did not arrive in time) are not
//! represented here: they drive retransmission and are never returned to the
//! caller.  Malformed datagrams are dropped at the socket boundary and only
//! reach this type when a caller decodes a frame directly.

use std::net::SocketAddr;

use thiserror::Error;

use crate::packet::PacketError;

#[derive(Error, Debug)]
pub enum ArqError {
    /// A socket could not be bound or opened.  Fatal.
    #[error("transport unavailable on {addr}: {source}")]
    TransportUnavailable {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The sender could not resolve the receiving host.  Fatal.
    #[error("host {0:?} could not be resolved")]
    HostUnresolvable(String),

    /// Reading the input, writing the output, or a socket send/receive failed.
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Admission refused because the outstanding window is at capacity.
    ///
    /// Backpressure only; the driver waits for acks and tries again.
    #[error("window full ({0} packets outstanding)")]
    WindowFull(usize),

    /// A datagram too short to carry a header (or an ack of the wrong width).
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] PacketError),

    /// A packet was transmitted more often than `max_retransmits` allows.
    #[error("packet {seq} still unacknowledged after {transmissions} transmissions")]
    RetransmitsExhausted { seq: u16, transmissions: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The ack listener (or the test relay) task panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

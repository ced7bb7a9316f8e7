//! Transfer configuration.
//!
//! One [`TransferConfig`] describes both ends of a transfer; the sender uses
//! `host`/`port` as its destination and the receiver binds `port` locally.
//! Acknowledgments always travel to `port + 1` on the opposite side.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ArqError;
use crate::packet::HEADER_LEN;
use crate::seq::MAX_WINDOW;

/// Largest UDP payload over IPv4.
pub const MAX_PACKET_SIZE: usize = 65_507;

/// ARQ policy used for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Fire-and-forget; no acks, no retransmission.
    Unacknowledged,
    /// One packet outstanding, alternating 0/1 sequence numbers.
    StopAndWait,
    /// Window of N, cumulative acks, resend-all on timeout.
    GoBackN,
    /// Window of N, per-packet acks and timers, receiver buffering.
    SelectiveRepeat,
}

impl Policy {
    /// Short tag used as the log prefix.
    pub fn tag(self) -> &'static str {
        match self {
            Policy::Unacknowledged => "noack",
            Policy::StopAndWait => "saw",
            Policy::GoBackN => "gbn",
            Policy::SelectiveRepeat => "sr",
        }
    }

    pub fn is_windowed(self) -> bool {
        matches!(self, Policy::GoBackN | Policy::SelectiveRepeat)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Policy::Unacknowledged => "unacknowledged",
            Policy::StopAndWait => "stop-and-wait",
            Policy::GoBackN => "go-back-n",
            Policy::SelectiveRepeat => "selective-repeat",
        };
        f.write_str(name)
    }
}

impl FromStr for Policy {
    type Err = ArqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "noack" | "unacknowledged" => Ok(Policy::Unacknowledged),
            "saw" | "stop-and-wait" => Ok(Policy::StopAndWait),
            "gbn" | "go-back-n" => Ok(Policy::GoBackN),
            "sr" | "selective-repeat" => Ok(Policy::SelectiveRepeat),
            other => Err(ArqError::InvalidConfig(format!("unknown policy {other:?}"))),
        }
    }
}

/// Every tunable of a transfer.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub policy: Policy,
    /// Receiving host (sender side) or bind address (receiver side).
    pub host: String,
    /// Data port; acks use `port + 1`.
    pub port: u16,
    /// Retransmission timeout for stop-and-wait and windowed policies.
    pub ack_timeout: Duration,
    /// Window size N for go-back-N and selective-repeat.
    pub window_size: usize,
    /// Total datagram size including the 3-byte header.
    pub packet_size: usize,
    /// How long the ack listener blocks before re-checking its stop flag.
    pub ack_poll_interval: Duration,
    /// Quiet period the receiver keeps re-acking after end-of-stream.
    pub linger: Duration,
    /// Abort once a packet has been retransmitted this many times.
    pub max_retransmits: Option<u32>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            policy: Policy::SelectiveRepeat,
            host: "localhost".to_string(),
            port: 9000,
            ack_timeout: Duration::from_millis(300),
            window_size: 16,
            packet_size: 1024,
            ack_poll_interval: Duration::from_millis(5),
            linger: Duration::ZERO,
            max_retransmits: None,
        }
    }
}

impl TransferConfig {
    pub fn new(policy: Policy, host: impl Into<String>, port: u16) -> Self {
        Self {
            policy,
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Payload bytes carried by a full packet.
    pub fn max_payload(&self) -> usize {
        self.packet_size - HEADER_LEN
    }

    /// Port acknowledgments are sent to.
    pub fn ack_port(&self) -> Result<u16, ArqError> {
        self.port.checked_add(1).ok_or_else(|| {
            ArqError::InvalidConfig(format!("port {} leaves no room for the ack port", self.port))
        })
    }

    /// Window actually used by the policy: 1 for stop-and-wait, configured
    /// size for the windowed policies.
    pub fn effective_window(&self) -> usize {
        if self.policy.is_windowed() {
            self.window_size
        } else {
            1
        }
    }

    pub fn validate(&self) -> Result<(), ArqError> {
        if self.packet_size <= HEADER_LEN {
            return Err(ArqError::InvalidConfig(format!(
                "packet size {} leaves no room for payload after the {HEADER_LEN}-byte header",
                self.packet_size
            )));
        }
        if self.packet_size > MAX_PACKET_SIZE {
            return Err(ArqError::InvalidConfig(format!(
                "packet size {} exceeds the UDP limit of {MAX_PACKET_SIZE}",
                self.packet_size
            )));
        }
        if self.policy.is_windowed() && !(1..=MAX_WINDOW).contains(&self.window_size) {
            return Err(ArqError::InvalidConfig(format!(
                "window size {} must be between 1 and {MAX_WINDOW}",
                self.window_size
            )));
        }
        if self.ack_poll_interval.is_zero() {
            return Err(ArqError::InvalidConfig("ack poll interval must be nonzero".into()));
        }
        self.ack_port()?;
        Ok(())
    }
}

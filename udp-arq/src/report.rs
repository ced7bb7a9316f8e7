//! Summary of a finished transfer.

use std::fmt;
use std::time::Duration;

use crate::config::Policy;

/// Counters collected by either end of a transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReport {
    pub policy: Policy,
    /// Payload bytes read (sender) or written to the sink (receiver).
    pub bytes: u64,
    /// Distinct data packets sent or delivered.
    pub packets: u64,
    /// Datagrams put on the wire, first sends and retransmissions alike.
    pub transmissions: u64,
    pub retransmissions: u64,
    /// Receiver: arrivals discarded as duplicate, out of order or ahead.
    pub discarded: u64,
    /// Receiver: datagrams too short to decode.
    pub malformed: u64,
    /// Acks received (sender) or emitted (receiver).
    pub acks: u64,
    pub elapsed: Duration,
}

impl TransferReport {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            bytes: 0,
            packets: 0,
            transmissions: 0,
            retransmissions: 0,
            discarded: 0,
            malformed: 0,
            acks: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Payload throughput in KiB/s; `0.0` for an instantaneous transfer.
    pub fn throughput_kib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.bytes as f64 / 1024.0 / secs
        }
    }
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Policy: {}", self.policy)?;
        writeln!(f, "Time taken: {:.3} s", self.elapsed.as_secs_f64())?;
        writeln!(
            f,
            "Data size: {} bytes ({:.2} KiB) in {} packets",
            self.bytes,
            self.bytes as f64 / 1024.0,
            self.packets
        )?;
        writeln!(f, "Retransmissions: {}", self.retransmissions)?;
        write!(f, "Throughput: {:.2} KiB/s", self.throughput_kib_per_sec())
    }
}

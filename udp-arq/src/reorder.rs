//! Receive-side acceptance state machines.
//!
//! [`ReorderBuffer`] implements the windowed receivers:
//!
//! - **Go-back-N**: only the in-order packet (`seq == expected`) is accepted.
//!   Everything else is discarded without buffering, and every arrival is
//!   answered with the cumulative position `expected - 1`.
//! - **Selective-repeat**: packets inside `[base, base + N)` are accepted;
//!   out-of-order ones wait in an ordered buffer until the gap before them
//!   closes.  Each arrival inside or behind the window is acknowledged with
//!   its own sequence number; arrivals beyond the window are dropped silently.
//!
//! [`Acceptor`] wraps it together with the two trivial policies so the
//! receive loop has a single entry point.
//!
//! The receiver's window base always equals `expected`: the base only moves
//! when contiguous packets are delivered.  No I/O happens here; delivered
//! payloads and the ack to emit are returned in an [`Acceptance`].

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::config::Policy;
use crate::packet::DataPacket;
use crate::seq::{seq_diff, seq_lt};

/// What happened to one arriving packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Delivered immediately, possibly followed by buffered packets.
    InOrder,
    /// Held for later delivery (selective-repeat only).
    Buffered,
    /// Already delivered or already buffered; payload discarded.
    Duplicate,
    /// Ahead of `expected` but discarded (go-back-N never buffers).
    OutOfOrder,
    /// Beyond the acceptance window; discarded with no ack.
    Ahead,
}

/// Outcome of feeding one packet to an acceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acceptance {
    pub disposition: Disposition,
    /// Payloads now deliverable, in order.
    pub delivered: Vec<Vec<u8>>,
    /// Sequence number to acknowledge, if an ack is due.
    pub ack: Option<u16>,
    /// The end-of-stream packet has just been delivered.
    pub finished: bool,
}

impl Acceptance {
    fn discard(disposition: Disposition, ack: Option<u16>) -> Self {
        Self {
            disposition,
            delivered: Vec::new(),
            ack,
            finished: false,
        }
    }
}

// ---------------------------------------------------------------------------
// BufferedPacket
// ---------------------------------------------------------------------------

/// An out-of-order packet waiting for the gap before it to close.
///
/// Identity is the map key (its absolute position), never the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedPacket {
    pub seq: u16,
    pub eof: bool,
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// ReorderBuffer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderMode {
    GoBackN,
    SelectiveRepeat,
}

#[derive(Debug)]
pub struct ReorderBuffer {
    mode: ReorderMode,
    window_size: usize,
    /// Next contiguous sequence number required for delivery.
    expected: u16,
    /// `expected` as a position that does not wrap; keys `buffered`.
    expected_abs: u64,
    buffered: BTreeMap<u64, BufferedPacket>,
    finished: bool,
}

impl ReorderBuffer {
    /// # Panics
    ///
    /// Panics if `window_size` is zero.
    pub fn new(mode: ReorderMode, window_size: usize, seq_start: u16) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            mode,
            window_size,
            expected: seq_start,
            expected_abs: 0,
            buffered: BTreeMap::new(),
            finished: false,
        }
    }

    pub fn expected(&self) -> u16 {
        self.expected
    }

    pub fn window_base(&self) -> u16 {
        self.expected
    }

    /// Number of packets held out of order.
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drive the acceptance state machine with one arriving packet.
    pub fn accept(&mut self, packet: DataPacket) -> Acceptance {
        match self.mode {
            ReorderMode::GoBackN => self.accept_go_back_n(packet),
            ReorderMode::SelectiveRepeat => self.accept_selective(packet),
        }
    }

    fn accept_go_back_n(&mut self, packet: DataPacket) -> Acceptance {
        if packet.seq == self.expected && !self.finished {
            let seq = packet.seq;
            let mut acceptance = self.deliver(packet);
            acceptance.ack = Some(seq);
            return acceptance;
        }
        let disposition = if seq_lt(packet.seq, self.expected) {
            Disposition::Duplicate
        } else {
            Disposition::OutOfOrder
        };
        Acceptance::discard(disposition, Some(self.expected.wrapping_sub(1)))
    }

    fn accept_selective(&mut self, packet: DataPacket) -> Acceptance {
        let seq = packet.seq;
        let offset = seq_diff(self.expected, seq);

        if offset < 0 || self.finished {
            return Acceptance::discard(Disposition::Duplicate, Some(seq));
        }
        let offset = offset as usize;
        if offset >= self.window_size {
            return Acceptance::discard(Disposition::Ahead, None);
        }

        if offset == 0 {
            let mut acceptance = self.deliver(packet);
            acceptance.ack = Some(seq);
            return acceptance;
        }

        let disposition = match self.buffered.entry(self.expected_abs + offset as u64) {
            Entry::Occupied(_) => Disposition::Duplicate,
            Entry::Vacant(slot) => {
                slot.insert(BufferedPacket {
                    seq,
                    eof: packet.eof,
                    payload: packet.payload,
                });
                Disposition::Buffered
            }
        };
        Acceptance::discard(disposition, Some(seq))
    }

    /// Deliver the in-order `packet`, then drain every buffered packet that
    /// has become contiguous.
    fn deliver(&mut self, packet: DataPacket) -> Acceptance {
        let mut finished = packet.eof;
        let mut delivered = vec![packet.payload];
        self.advance();

        while !finished {
            let Some(next) = self.buffered.remove(&self.expected_abs) else {
                break;
            };
            finished = next.eof;
            delivered.push(next.payload);
            self.advance();
        }

        if finished {
            self.finished = true;
            self.buffered.clear();
        }
        Acceptance {
            disposition: Disposition::InOrder,
            delivered,
            ack: None,
            finished,
        }
    }

    fn advance(&mut self) {
        self.expected = self.expected.wrapping_add(1);
        self.expected_abs += 1;
    }
}

// ---------------------------------------------------------------------------
// Acceptor
// ---------------------------------------------------------------------------

/// Acceptance rules for every policy behind one interface.
#[derive(Debug)]
pub enum Acceptor {
    /// Accept everything; duplicates are not even detected.  Never acks.
    Unacknowledged { finished: bool },
    /// Alternating bit: a repeat of the previous number is a duplicate.
    AlternatingBit { last: Option<u16>, finished: bool },
    Windowed(ReorderBuffer),
}

impl Acceptor {
    pub fn for_policy(policy: Policy, window_size: usize) -> Self {
        match policy {
            Policy::Unacknowledged => Acceptor::Unacknowledged { finished: false },
            Policy::StopAndWait => Acceptor::AlternatingBit {
                last: None,
                finished: false,
            },
            Policy::GoBackN => {
                Acceptor::Windowed(ReorderBuffer::new(ReorderMode::GoBackN, window_size, 0))
            }
            Policy::SelectiveRepeat => Acceptor::Windowed(ReorderBuffer::new(
                ReorderMode::SelectiveRepeat,
                window_size,
                0,
            )),
        }
    }

    pub fn accept(&mut self, packet: DataPacket) -> Acceptance {
        match self {
            Acceptor::Unacknowledged { finished } => {
                *finished |= packet.eof;
                Acceptance {
                    disposition: Disposition::InOrder,
                    finished: packet.eof,
                    delivered: vec![packet.payload],
                    ack: None,
                }
            }
            Acceptor::AlternatingBit { last, finished } => {
                let seq = packet.seq;
                if *last == Some(seq) {
                    return Acceptance::discard(Disposition::Duplicate, Some(seq));
                }
                *last = Some(seq);
                *finished |= packet.eof;
                Acceptance {
                    disposition: Disposition::InOrder,
                    finished: packet.eof,
                    delivered: vec![packet.payload],
                    ack: Some(seq),
                }
            }
            Acceptor::Windowed(buffer) => buffer.accept(packet),
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            Acceptor::Unacknowledged { finished } => *finished,
            Acceptor::AlternatingBit { finished, .. } => *finished,
            Acceptor::Windowed(buffer) => buffer.is_finished(),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

//! Sender-side outstanding-packet window.
//!
//! [`OutstandingWindow`] holds up to `N` admitted packets in ascending
//! sequence order, each with its acknowledgment state and last transmit time.
//!
//! # Contract
//!
//! - At most `window_size` entries are un-retired at once; [`admit`] refuses
//!   with [`ArqError::WindowFull`] beyond that.
//! - **Cumulative** retirement (go-back-N): an ack for `K` retires every entry
//!   with sequence ≤ `K`.
//! - **Selective** retirement (selective-repeat): an ack marks one entry; the
//!   window only slides past an acknowledged prefix.
//! - Acks outside `[base, next_seq)` are stale or spurious and change nothing.
//!
//! This module only manages state; socket I/O and locking are the caller's
//! responsibility.
//!
//! [`admit`]: OutstandingWindow::admit

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::ArqError;
use crate::packet::DataPacket;
use crate::seq::{in_window, seq_le};

/// How acknowledgments retire entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireMode {
    Cumulative,
    Selective,
}

// ---------------------------------------------------------------------------
// OutstandingEntry
// ---------------------------------------------------------------------------

/// A single admitted packet occupying one slot in the window.
#[derive(Debug, Clone)]
pub struct OutstandingEntry {
    pub packet: DataPacket,
    /// Encoded form, kept so retransmissions skip the codec.
    pub wire: Vec<u8>,
    pub acked: bool,
    /// `None` until the first transmission; such entries are always due.
    pub last_sent: Option<Instant>,
    /// Total number of times this packet has been transmitted.
    pub tx_count: u32,
}

impl OutstandingEntry {
    fn new(packet: DataPacket) -> Self {
        let wire = packet.encode();
        Self {
            packet,
            wire,
            acked: false,
            last_sent: None,
            tx_count: 0,
        }
    }

    pub fn seq(&self) -> u16 {
        self.packet.seq
    }

    /// `last_sent + timeout < now`, or never sent.
    pub fn is_due(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_sent {
            None => true,
            Some(sent) => now.saturating_duration_since(sent) > timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// OutstandingWindow
// ---------------------------------------------------------------------------

/// Outstanding-packet window for one transfer.
///
/// ```text
///  base                next_seq
///   │                      │
///  ─┼──────────────────────┼──────────────▶ seq space
///   │ <── un-retired ────▶ │ <── not yet admitted
/// ```
#[derive(Debug)]
pub struct OutstandingWindow {
    mode: RetireMode,
    window_size: usize,
    /// Sequence number the next admitted packet must carry.
    next_seq: u16,
    entries: VecDeque<OutstandingEntry>,
}

impl OutstandingWindow {
    /// Create an empty window whose first packet will carry `seq_start`.
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero.  [`TransferConfig::validate`] rejects
    /// such a configuration before any driver gets here.
    ///
    /// [`TransferConfig::validate`]: crate::config::TransferConfig::validate
    pub fn new(mode: RetireMode, window_size: usize, seq_start: u16) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            mode,
            window_size,
            next_seq: seq_start,
            entries: VecDeque::with_capacity(window_size),
        }
    }

    /// Sequence number of the oldest un-retired entry, or `next_seq` when empty.
    pub fn base(&self) -> u16 {
        self.entries.front().map_or(self.next_seq, OutstandingEntry::seq)
    }

    pub fn next_seq(&self) -> u16 {
        self.next_seq
    }

    /// Number of un-retired entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when every admitted packet has been retired.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Free slots left before admission is refused.
    pub fn room(&self) -> usize {
        self.window_size - self.entries.len()
    }

    /// Append `packet` as a never-sent entry.
    ///
    /// The packet must carry [`next_seq`](Self::next_seq); admission order is
    /// sequence order.
    pub fn admit(&mut self, packet: DataPacket) -> Result<(), ArqError> {
        if self.entries.len() >= self.window_size {
            return Err(ArqError::WindowFull(self.entries.len()));
        }
        debug_assert_eq!(packet.seq, self.next_seq, "packets must be admitted in order");
        self.next_seq = packet.seq.wrapping_add(1);
        self.entries.push_back(OutstandingEntry::new(packet));
        Ok(())
    }

    /// Apply an ack according to the window's [`RetireMode`].
    ///
    /// Returns the number of entries removed from the window.
    pub fn apply_ack(&mut self, seq: u16) -> usize {
        match self.mode {
            RetireMode::Cumulative => self.retire_through(seq),
            RetireMode::Selective => {
                if self.retire_one(seq) {
                    self.slide()
                } else {
                    0
                }
            }
        }
    }

    /// Remove every entry with sequence ≤ `acked`.
    ///
    /// Returns the number of entries retired; `0` for a stale, duplicate or
    /// not-yet-sent ack.
    pub fn retire_through(&mut self, acked: u16) -> usize {
        if !self.covers(acked) {
            return 0;
        }
        let mut retired = 0;
        while let Some(front) = self.entries.front() {
            if seq_le(front.seq(), acked) {
                self.entries.pop_front();
                retired += 1;
            } else {
                break;
            }
        }
        retired
    }

    /// Mark the single entry carrying `acked` as acknowledged.
    ///
    /// Returns `true` only when this changed its state; a repeated ack is a
    /// no-op.  Does not slide the window, see [`apply_ack`](Self::apply_ack).
    pub fn retire_one(&mut self, acked: u16) -> bool {
        if !self.covers(acked) {
            return false;
        }
        let offset = acked.wrapping_sub(self.base()) as usize;
        match self.entries.get_mut(offset) {
            Some(entry) if !entry.acked => {
                entry.acked = true;
                true
            }
            _ => false,
        }
    }

    /// Drop the acknowledged prefix.  Returns how many entries left.
    pub fn slide(&mut self) -> usize {
        let mut retired = 0;
        while self.entries.front().is_some_and(|e| e.acked) {
            self.entries.pop_front();
            retired += 1;
        }
        retired
    }

    /// Entries that should be (re)transmitted at `now`, in ascending order.
    ///
    /// - Selective: every unacknowledged entry that is individually due.
    /// - Cumulative: never-sent entries always; and once the oldest entry is
    ///   due, every entry in the window (go back to N).
    pub fn candidates(
        &self,
        now: Instant,
        timeout: Duration,
    ) -> impl Iterator<Item = &OutstandingEntry> + '_ {
        let mode = self.mode;
        let resend_all = mode == RetireMode::Cumulative
            && self.entries.front().is_some_and(|e| e.is_due(now, timeout));
        self.entries.iter().filter(move |e| {
            !e.acked
                && match mode {
                    RetireMode::Selective => e.is_due(now, timeout),
                    RetireMode::Cumulative => resend_all || e.last_sent.is_none(),
                }
        })
    }

    /// Record a transmission of `seq` at `now`.
    ///
    /// Returns the entry's new transmission count, or `None` if `seq` is no
    /// longer in the window.
    pub fn mark_sent(&mut self, seq: u16, now: Instant) -> Option<u32> {
        if !self.covers(seq) {
            return None;
        }
        let offset = seq.wrapping_sub(self.base()) as usize;
        let entry = self.entries.get_mut(offset)?;
        entry.last_sent = Some(now);
        entry.tx_count += 1;
        Some(entry.tx_count)
    }

    /// Earliest instant at which a transmitted entry becomes due.
    ///
    /// Never-sent entries carry no timer and are not considered here.
    pub fn next_deadline(&self, timeout: Duration) -> Option<Instant> {
        let mut pending = self.entries.iter().filter(|e| !e.acked);
        let oldest = match self.mode {
            RetireMode::Cumulative => pending.next().and_then(|e| e.last_sent),
            RetireMode::Selective => pending.filter_map(|e| e.last_sent).min(),
        };
        oldest.map(|sent| sent + timeout)
    }

    fn covers(&self, seq: u16) -> bool {
        in_window(seq, self.base(), self.entries.len())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

//! Sending side of a transfer.
//!
//! [`Sender`] owns the data socket and, for acknowledged policies, the ack
//! socket bound on `port + 1`.  Each policy has its own loop:
//!
//! - **Unacknowledged**: every packet is sent once, back to back.
//! - **Stop-and-wait**: one packet in flight; resend it every `ack_timeout`
//!   until the matching single-byte ack arrives.
//! - **Go-back-N / selective-repeat**: an [`OutstandingWindow`] shared with an
//!   [`AckListener`] task.  The loop admits new packets while there is room,
//!   sends whatever [`OutstandingWindow::candidates`] reports as due, and
//!   otherwise sleeps until the next timer expires or an ack frees a slot.
//!
//! The transfer ends when the end-of-stream packet has been admitted and the
//! window is empty again, i.e. every packet including the last was acked.

use std::fs::File;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::time::timeout_at;

use crate::config::{Policy, TransferConfig};
use crate::error::ArqError;
use crate::listener::{AckListener, SharedWindow, StopFlag};
use crate::packet::AckFormat;
use crate::report::TransferReport;
use crate::socket::{resolve, Socket};
use crate::source::{ByteSource, Numbering, Packetizer};
use crate::window::{OutstandingWindow, RetireMode};

/// Sending endpoint for one transfer.
#[derive(Debug)]
pub struct Sender {
    config: TransferConfig,
    dest: SocketAddr,
    data: Socket,
    /// `None` for the unacknowledged policy.
    acks: Option<Socket>,
}

impl Sender {
    /// Resolve the receiver and bind both sockets.
    ///
    /// The data socket uses an ephemeral port; the ack socket binds the
    /// wildcard address on `port + 1`.
    pub async fn bind(config: TransferConfig) -> Result<Self, ArqError> {
        config.validate()?;
        let dest = resolve(&config.host, config.port).await?;
        let data = Socket::bind(SocketAddr::new(wildcard(dest.ip()), 0)).await?;
        let acks = match config.policy {
            Policy::Unacknowledged => None,
            _ => {
                let addr = SocketAddr::new(wildcard(dest.ip()), config.ack_port()?);
                Some(Socket::bind(addr).await?)
            }
        };
        Ok(Self {
            config,
            dest,
            data,
            acks,
        })
    }

    /// Address packets are sent to.
    pub fn dest(&self) -> SocketAddr {
        self.dest
    }

    /// Send the contents of `path`.
    pub async fn send_file(self, path: impl AsRef<Path>) -> Result<TransferReport, ArqError> {
        let source: ByteSource<File> = ByteSource::open(path)?;
        self.send(source).await
    }

    /// Send everything `source` yields.  Both sockets are released on return,
    /// whether the transfer succeeded or not.
    pub async fn send<R: Read>(
        mut self,
        source: ByteSource<R>,
    ) -> Result<TransferReport, ArqError> {
        let numbering = match self.config.policy {
            Policy::StopAndWait => Numbering::Alternating,
            _ => Numbering::Wrapping,
        };
        let mut packets = Packetizer::new(source, self.config.max_payload(), numbering);
        let mut report = TransferReport::new(self.config.policy);
        report.bytes = packets.total_len();
        let started = Instant::now();

        log::info!(
            "[{}] sending {} bytes to {}",
            self.config.policy.tag(),
            report.bytes,
            self.dest
        );

        match (self.config.policy, self.acks.take()) {
            (Policy::Unacknowledged, _) => {
                self.send_unacknowledged(&mut packets, &mut report).await?
            }
            (Policy::StopAndWait, Some(acks)) => {
                self.send_stop_and_wait(&acks, &mut packets, &mut report)
                    .await?
            }
            (Policy::GoBackN | Policy::SelectiveRepeat, Some(acks)) => {
                self.send_windowed(acks, &mut packets, &mut report).await?
            }
            (_, None) => {
                return Err(ArqError::InvalidConfig(
                    "acknowledged policy without an ack socket".into(),
                ))
            }
        }

        report.elapsed = started.elapsed();
        log::info!(
            "[{}] sent {} packets ({} retransmissions) in {:?}",
            self.config.policy.tag(),
            report.packets,
            report.retransmissions,
            report.elapsed
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Unacknowledged
    // -----------------------------------------------------------------------

    async fn send_unacknowledged<R: Read>(
        &self,
        packets: &mut Packetizer<R>,
        report: &mut TransferReport,
    ) -> Result<(), ArqError> {
        while let Some(pkt) = packets.next_packet()? {
            self.data.send_to(&pkt.encode(), self.dest).await?;
            report.packets += 1;
            report.transmissions += 1;
            log::debug!("[noack] → DATA seq={} len={} eof={}", pkt.seq, pkt.payload.len(), pkt.eof);
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stop-and-wait
    // -----------------------------------------------------------------------

    async fn send_stop_and_wait<R: Read>(
        &self,
        acks: &Socket,
        packets: &mut Packetizer<R>,
        report: &mut TransferReport,
    ) -> Result<(), ArqError> {
        let mut buf = [0u8; 16];

        while let Some(pkt) = packets.next_packet()? {
            let wire = pkt.encode();
            let mut transmissions = 0u32;

            'resend: loop {
                self.check_budget(pkt.seq, transmissions)?;
                self.data.send_to(&wire, self.dest).await?;
                transmissions += 1;
                log::debug!(
                    "[saw] → DATA seq={} len={} attempt={}",
                    pkt.seq,
                    pkt.payload.len(),
                    transmissions
                );

                let deadline = tokio::time::Instant::now() + self.config.ack_timeout;
                loop {
                    let (n, _) = match timeout_at(deadline, acks.recv_from(&mut buf)).await {
                        Err(_elapsed) => {
                            log::debug!("[saw] timeout waiting for ACK {}", pkt.seq);
                            continue 'resend;
                        }
                        Ok(Err(e)) => {
                            log::warn!("[saw] ack receive failed: {e}");
                            continue 'resend;
                        }
                        Ok(Ok(v)) => v,
                    };
                    match AckFormat::SingleByte.decode(&buf[..n]) {
                        Ok(seq) if seq == pkt.seq => {
                            report.acks += 1;
                            log::debug!("[saw] ← ACK {seq}");
                            break 'resend;
                        }
                        Ok(seq) => {
                            report.acks += 1;
                            log::trace!("[saw] ← ACK {seq} (stale)");
                        }
                        Err(e) => log::debug!("[saw] dropped datagram: {e}"),
                    }
                }
            }

            report.packets += 1;
            report.transmissions += u64::from(transmissions);
            report.retransmissions += u64::from(transmissions - 1);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Go-back-N / selective-repeat
    // -----------------------------------------------------------------------

    async fn send_windowed<R: Read>(
        &self,
        acks: Socket,
        packets: &mut Packetizer<R>,
        report: &mut TransferReport,
    ) -> Result<(), ArqError> {
        let mode = match self.config.policy {
            Policy::GoBackN => RetireMode::Cumulative,
            _ => RetireMode::Selective,
        };
        let shared = SharedWindow::new(OutstandingWindow::new(mode, self.config.effective_window(), 0));
        let stop = StopFlag::new();

        // The listener owns the ack socket and drops it when it exits.
        let listener = AckListener::new(
            acks,
            Arc::clone(&shared),
            stop.clone(),
            self.config.ack_poll_interval,
            self.config.policy.tag(),
        )
        .spawn();

        let result = self.pump(&shared, packets, report).await;

        stop.raise();
        let stats = listener.await?;
        report.acks = stats.acks;
        result
    }

    /// The windowed send loop.
    async fn pump<R: Read>(
        &self,
        shared: &SharedWindow,
        packets: &mut Packetizer<R>,
        report: &mut TransferReport,
    ) -> Result<(), ArqError> {
        let tag = self.config.policy.tag();
        let timeout = self.config.ack_timeout;

        loop {
            // Read new packets outside the lock; acks only ever add room.
            let room = shared.lock().room();
            let mut fresh = Vec::with_capacity(room);
            while fresh.len() < room {
                match packets.next_packet()? {
                    Some(pkt) => fresh.push(pkt),
                    None => break,
                }
            }
            report.packets += fresh.len() as u64;

            let now = Instant::now();
            let (due, done, more_room, deadline) = {
                let mut window = shared.lock();
                for pkt in fresh {
                    window.admit(pkt)?;
                }
                let due: Vec<(u16, Vec<u8>)> = window
                    .candidates(now, timeout)
                    .map(|e| (e.seq(), e.wire.clone()))
                    .collect();
                for (seq, _) in &due {
                    if let Some(tx) = window.mark_sent(*seq, now) {
                        self.check_budget(*seq, tx - 1)?;
                        if tx > 1 {
                            report.retransmissions += 1;
                        }
                    }
                }
                (
                    due,
                    window.is_empty() && packets.is_exhausted(),
                    window.room() > 0 && !packets.is_exhausted(),
                    window.next_deadline(timeout),
                )
            };

            for (seq, wire) in &due {
                self.data.send_to(wire, self.dest).await?;
                log::debug!("[{tag}] → DATA seq={seq} len={}", wire.len());
            }
            report.transmissions += due.len() as u64;

            if done {
                return Ok(());
            }
            if more_room {
                tokio::task::yield_now().await;
                continue;
            }
            let wait = deadline.map_or(timeout, |d| d.saturating_duration_since(Instant::now()));
            shared.wait_for_progress(wait).await;
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Fail once `seq` has already been sent `1 + max_retransmits` times.
    fn check_budget(&self, seq: u16, transmissions: u32) -> Result<(), ArqError> {
        match self.config.max_retransmits {
            Some(max) if transmissions > max => {
                Err(ArqError::RetransmitsExhausted { seq, transmissions })
            }
            _ => Ok(()),
        }
    }
}

fn wildcard(peer: IpAddr) -> IpAddr {
    match peer {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

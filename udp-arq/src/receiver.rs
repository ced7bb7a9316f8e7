//! Receiving side of a transfer.
//!
//! The [`Receiver`] binds the data port, decodes each datagram, and hands it
//! to the policy's [`Acceptor`].  Whatever the acceptor releases is written to
//! the sink in order; whatever ack it asks for is sent from the same socket to
//! the sender's address on `port + 1`.
//!
//! Once the end-of-stream packet has been delivered the receiver optionally
//! lingers, re-acknowledging retransmissions until the line has been quiet
//! for `linger`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Instant;

use tokio::time::timeout;

use crate::config::{Policy, TransferConfig, MAX_PACKET_SIZE};
use crate::error::ArqError;
use crate::packet::{AckFormat, DataPacket, PacketError, HEADER_LEN};
use crate::reorder::{Acceptor, Disposition};
use crate::report::TransferReport;
use crate::socket::{resolve, Socket};

/// Receiving endpoint for one transfer.
#[derive(Debug)]
pub struct Receiver {
    config: TransferConfig,
    socket: Socket,
}

impl Receiver {
    /// Bind `host:port` from the config.
    pub async fn bind(config: TransferConfig) -> Result<Self, ArqError> {
        config.validate()?;
        let addr = resolve(&config.host, config.port).await?;
        let socket = Socket::bind(addr).await?;
        log::info!(
            "[{}] listening on {}",
            config.policy.tag(),
            socket.local_addr
        );
        Ok(Self { config, socket })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Receive into the file at `path`, creating or truncating it.
    pub async fn receive_to_file(
        self,
        path: impl AsRef<Path>,
    ) -> Result<TransferReport, ArqError> {
        let file = File::create(path.as_ref())?;
        self.receive(BufWriter::new(file)).await
    }

    /// Receive one complete transfer into `sink`.
    pub async fn receive<W: Write>(self, mut sink: W) -> Result<TransferReport, ArqError> {
        let tag = self.config.policy.tag();
        let ack_format = match self.config.policy {
            Policy::StopAndWait => AckFormat::SingleByte,
            _ => AckFormat::Wide,
        };
        let ack_port = self.config.ack_port()?;
        let mut acceptor = Acceptor::for_policy(self.config.policy, self.config.effective_window());
        let mut report = TransferReport::new(self.config.policy);
        // One byte over the UDP limit, so an oversized datagram is seen whole
        // rather than silently cut to fit.
        let mut buf = vec![0u8; MAX_PACKET_SIZE + 1];
        let mut started: Option<Instant> = None;
        let mut peer: Option<SocketAddr> = None;

        while !acceptor.is_finished() {
            let (n, from) = self.socket.recv_from(&mut buf).await?;
            started.get_or_insert_with(Instant::now);

            let packet = match self.decode_frame(&buf[..n]) {
                Ok(p) => p,
                Err(e) => {
                    report.malformed += 1;
                    log::debug!("[{tag}] dropped datagram from {from}: {e}");
                    continue;
                }
            };
            let seq = packet.seq;
            let outcome = acceptor.accept(packet);
            log::debug!("[{tag}] ← DATA seq={seq} len={} {:?}", n - HEADER_LEN, outcome.disposition);

            if outcome.disposition != Disposition::InOrder
                && outcome.disposition != Disposition::Buffered
            {
                report.discarded += 1;
            }
            for payload in &outcome.delivered {
                sink.write_all(payload)?;
                report.bytes += payload.len() as u64;
                report.packets += 1;
            }

            if let Some(ack) = outcome.ack {
                let dest = SocketAddr::new(from.ip(), ack_port);
                self.socket.send_to(&ack_format.encode(ack), dest).await?;
                report.acks += 1;
                log::debug!("[{tag}] → ACK {ack}");
            }
            peer = Some(from);
        }
        sink.flush()?;
        report.elapsed = started.map(|t| t.elapsed()).unwrap_or_default();

        log::info!(
            "[{tag}] received {} bytes in {} packets from {}",
            report.bytes,
            report.packets,
            peer.map_or_else(|| "?".to_string(), |p| p.to_string())
        );

        if self.config.policy != Policy::Unacknowledged && !self.config.linger.is_zero() {
            self.linger(&mut acceptor, ack_format, ack_port, &mut buf, &mut report)
                .await;
        }
        Ok(report)
    }

    /// Decode one datagram, refusing anything longer than `packet_size`.
    fn decode_frame(&self, datagram: &[u8]) -> Result<DataPacket, PacketError> {
        if datagram.len() > self.config.packet_size {
            return Err(PacketError::Oversized {
                len: datagram.len(),
                max: self.config.packet_size,
            });
        }
        DataPacket::decode(datagram)
    }

    /// Re-acknowledge retransmissions until nothing arrives for `linger`.
    /// Errors here cannot affect the already-written output, so they only
    /// end the quiet period early.
    async fn linger(
        &self,
        acceptor: &mut Acceptor,
        ack_format: AckFormat,
        ack_port: u16,
        buf: &mut [u8],
        report: &mut TransferReport,
    ) {
        let tag = self.config.policy.tag();
        log::debug!("[{tag}] lingering for {:?}", self.config.linger);

        while let Ok(received) = timeout(self.config.linger, self.socket.recv_from(buf)).await {
            let (n, from) = match received {
                Ok(v) => v,
                Err(e) => {
                    log::debug!("[{tag}] linger ended: {e}");
                    return;
                }
            };
            let Ok(packet) = self.decode_frame(&buf[..n]) else {
                report.malformed += 1;
                continue;
            };
            report.discarded += 1;
            if let Some(ack) = acceptor.accept(packet).ack {
                let dest = SocketAddr::new(from.ip(), ack_port);
                if let Err(e) = self.socket.send_to(&ack_format.encode(ack), dest).await {
                    log::debug!("[{tag}] linger ended: {e}");
                    return;
                }
                report.acks += 1;
                log::debug!("[{tag}] → ACK {ack} (linger)");
            }
        }
    }
}

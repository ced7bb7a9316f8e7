//! Lossy UDP relay for exercising the ARQ policies.
//!
//! Real networks drop, reorder, and duplicate packets.  [`Simulator`] sits
//! between a sender and a receiver on loopback and forwards traffic in both
//! directions, applying a seeded fault model so a failing run can be replayed:
//!
//! | Fault        | Description                                              |
//! |--------------|----------------------------------------------------------|
//! | Packet loss  | Drop a datagram with probability `loss_rate`.            |
//! | Reordering   | Hold a datagram back until the next one has gone out.    |
//! | Duplication  | Deliver a datagram twice.                                |
//!
//! Port layout, with the receiver on `P` and the sender pointed at `Q`:
//!
//! ```text
//!  sender ──data──▶ Q (relay) ──data──▶ P receiver
//!  sender Q+1 ◀──acks── relay ◀──acks── P+1 (relay)
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::ArqError;
use crate::listener::StopFlag;
use crate::socket::Socket;

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]` and apply to both
/// directions.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is held back behind the next one.
    pub reorder_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults: a transparent pass-through.
        Self {
            loss_rate: 0.0,
            reorder_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

impl SimulatorConfig {
    fn validate(&self) -> Result<(), ArqError> {
        for (name, p) in [
            ("loss_rate", self.loss_rate),
            ("reorder_rate", self.reorder_rate),
            ("duplicate_rate", self.duplicate_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ArqError::InvalidConfig(format!(
                    "{name} {p} is not a probability"
                )));
            }
        }
        Ok(())
    }
}

/// What happened to the traffic that crossed the relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    pub forwarded: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Sender to receiver.
    Data,
    /// Receiver to sender.
    Ack,
}

/// One direction of the relay plus the datagram held back for reordering.
struct Lane {
    dir: Direction,
    held: Option<Vec<u8>>,
}

/// A running relay.  Dropping it without [`Simulator::shutdown`] leaves the
/// task running until the runtime stops.
#[derive(Debug)]
pub struct Simulator {
    /// Address the sender should target (`Q`).
    pub front_addr: SocketAddr,
    stop: StopFlag,
    task: JoinHandle<SimulatorStats>,
}

impl Simulator {
    /// Bind `front` for data and `receiver.port() + 1` for acks, then start
    /// relaying between the sender and the receiver at `receiver`.
    pub async fn start(
        front: SocketAddr,
        receiver: SocketAddr,
        config: SimulatorConfig,
    ) -> Result<Self, ArqError> {
        config.validate()?;
        let ack_in_port = receiver.port().checked_add(1).ok_or_else(|| {
            ArqError::InvalidConfig(format!("receiver port {} has no ack port", receiver.port()))
        })?;
        let data_in = Socket::bind(front).await?;
        let forward = Socket::bind(SocketAddr::new(receiver.ip(), 0)).await?;
        let ack_in = Socket::bind(SocketAddr::new(forward.local_addr.ip(), ack_in_port)).await?;
        let front_addr = data_in.local_addr;
        let ack_out_port = front_addr.port().checked_add(1).ok_or_else(|| {
            ArqError::InvalidConfig(format!("front port {} has no ack port", front_addr.port()))
        })?;

        let stop = StopFlag::new();
        let relay = Relay {
            data_in,
            forward,
            ack_in,
            receiver,
            ack_out_port,
            sender: None,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            stats: SimulatorStats::default(),
        };
        let task = tokio::spawn(relay.run(stop.clone()));
        log::debug!("[sim] relaying {front_addr} -> {receiver}");
        Ok(Self {
            front_addr,
            stop,
            task,
        })
    }

    /// Stop relaying and return the traffic counters.
    pub async fn shutdown(self) -> Result<SimulatorStats, ArqError> {
        self.stop.raise();
        Ok(self.task.await?)
    }
}

struct Relay {
    data_in: Socket,
    forward: Socket,
    ack_in: Socket,
    receiver: SocketAddr,
    ack_out_port: u16,
    /// Learned from the first data datagram.
    sender: Option<SocketAddr>,
    rng: StdRng,
    config: SimulatorConfig,
    stats: SimulatorStats,
}

const POLL: Duration = Duration::from_millis(5);

impl Relay {
    async fn run(mut self, stop: StopFlag) -> SimulatorStats {
        let mut data = Lane {
            dir: Direction::Data,
            held: None,
        };
        let mut acks = Lane {
            dir: Direction::Ack,
            held: None,
        };
        let mut data_buf = vec![0u8; 65_536];
        let mut ack_buf = [0u8; 64];

        while !stop.is_raised() {
            let polled = timeout(POLL, async {
                tokio::select! {
                    r = self.data_in.recv_from(&mut data_buf) => r.map(|(n, from)| (true, n, from)),
                    r = self.ack_in.recv_from(&mut ack_buf) => r.map(|(n, from)| (false, n, from)),
                }
            })
            .await;

            match polled {
                // Idle: let held datagrams go so a quiet line still drains.
                Err(_elapsed) => {
                    self.release(&mut data).await;
                    self.release(&mut acks).await;
                }
                Ok(Err(e)) => log::warn!("[sim] receive failed: {e}"),
                Ok(Ok((true, n, from))) => {
                    self.sender.get_or_insert(from);
                    let bytes = data_buf[..n].to_vec();
                    self.relay(&mut data, bytes).await;
                }
                Ok(Ok((false, n, _from))) => {
                    let bytes = ack_buf[..n].to_vec();
                    self.relay(&mut acks, bytes).await;
                }
            }
        }
        log::debug!("[sim] stopped: {:?}", self.stats);
        self.stats
    }

    async fn relay(&mut self, lane: &mut Lane, bytes: Vec<u8>) {
        if self.rng.random_bool(self.config.loss_rate) {
            self.stats.dropped += 1;
            log::trace!("[sim] drop {:?} len={}", lane.dir, bytes.len());
            return;
        }
        if lane.held.is_none() && self.rng.random_bool(self.config.reorder_rate) {
            self.stats.reordered += 1;
            lane.held = Some(bytes);
            return;
        }
        let copies = if self.rng.random_bool(self.config.duplicate_rate) {
            self.stats.duplicated += 1;
            2
        } else {
            1
        };
        for _ in 0..copies {
            self.emit(lane, &bytes).await;
        }
        self.release(lane).await;
    }

    async fn release(&mut self, lane: &mut Lane) {
        if let Some(bytes) = lane.held.take() {
            self.emit(lane, &bytes).await;
        }
    }

    async fn emit(&mut self, lane: &Lane, bytes: &[u8]) {
        let sent = match (lane.dir, self.sender) {
            (Direction::Data, _) => self.forward.send_to(bytes, self.receiver).await,
            (Direction::Ack, Some(s)) => {
                let dest = SocketAddr::new(s.ip(), self.ack_out_port);
                self.data_in.send_to(bytes, dest).await
            }
            (Direction::Ack, None) => return,
        };
        match sent {
            Ok(()) => self.stats.forwarded += 1,
            Err(e) => log::debug!("[sim] forward {:?} failed: {e}", lane.dir),
        }
    }
}

//! Concurrent acknowledgment listener for the windowed senders.
//!
//! The send loop and the [`AckListener`] share exactly one thing: the
//! [`SharedWindow`].  Every ack is applied under its mutex in a single short
//! critical section, after which the send loop is woken through a
//! [`Notify`] so it can admit new packets without waiting out its timer.
//!
//! ```text
//!   send loop ──admit / candidates / mark_sent──┐
//!                                               ▼
//!                                  Mutex<OutstandingWindow>
//!                                               ▲
//!   AckListener ──recv (poll timeout)──apply_ack┘──notify──▶ send loop
//! ```
//!
//! The listener polls with a short receive timeout so it notices the
//! [`StopFlag`] promptly once the transfer is over.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::packet::AckFormat;
use crate::socket::Socket;
use crate::window::OutstandingWindow;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// The outstanding window plus the wake-up used when acks retire entries.
#[derive(Debug)]
pub struct SharedWindow {
    window: Mutex<OutstandingWindow>,
    progress: Notify,
}

impl SharedWindow {
    pub fn new(window: OutstandingWindow) -> Arc<Self> {
        Arc::new(Self {
            window: Mutex::new(window),
            progress: Notify::new(),
        })
    }

    /// Lock the window.  A panic while holding the lock cannot leave the
    /// window half-updated, so a poisoned lock is still usable.
    pub fn lock(&self) -> MutexGuard<'_, OutstandingWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one ack and wake the send loop if anything was retired.
    pub fn apply_ack(&self, seq: u16) -> usize {
        let retired = self.lock().apply_ack(seq);
        if retired > 0 {
            self.progress.notify_one();
        }
        retired
    }

    /// Sleep until an ack retires something or `max_wait` elapses.
    pub async fn wait_for_progress(&self, max_wait: Duration) {
        tokio::select! {
            _ = self.progress.notified() => {}
            _ = tokio::time::sleep(max_wait) => {}
        }
    }
}

/// Cooperative stop signal shared by the send loop and the listener.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// AckListener
// ---------------------------------------------------------------------------

/// Counters reported when the listener exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    /// Well-formed acks received.
    pub acks: u64,
    /// Acks that retired at least one entry.
    pub applied: u64,
    /// Acks that changed nothing (stale, duplicate, or out of range).
    pub stale: u64,
    /// Datagrams that were not a valid ack.
    pub malformed: u64,
}

/// Receives acks on the sender's ack port and applies them to the window.
#[derive(Debug)]
pub struct AckListener {
    socket: Socket,
    shared: Arc<SharedWindow>,
    stop: StopFlag,
    poll_interval: Duration,
    tag: &'static str,
}

impl AckListener {
    pub fn new(
        socket: Socket,
        shared: Arc<SharedWindow>,
        stop: StopFlag,
        poll_interval: Duration,
        tag: &'static str,
    ) -> Self {
        Self {
            socket,
            shared,
            stop,
            poll_interval,
            tag,
        }
    }

    /// Run the listener on its own task.
    pub fn spawn(self) -> JoinHandle<ListenerStats> {
        tokio::spawn(self.run())
    }

    /// Listen until the stop flag is raised.  The socket is released on return.
    pub async fn run(self) -> ListenerStats {
        let mut stats = ListenerStats::default();
        let mut buf = [0u8; 16];

        while !self.stop.is_raised() {
            let (n, _from) = match timeout(self.poll_interval, self.socket.recv_from(&mut buf)).await
            {
                Err(_elapsed) => continue,
                Ok(Ok(v)) => v,
                Ok(Err(e)) => {
                    log::warn!("[{}:ack] receive failed: {e}", self.tag);
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };

            let seq = match AckFormat::Wide.decode(&buf[..n]) {
                Ok(seq) => seq,
                Err(e) => {
                    stats.malformed += 1;
                    log::debug!("[{}:ack] dropped datagram: {e}", self.tag);
                    continue;
                }
            };

            stats.acks += 1;
            let retired = self.shared.apply_ack(seq);
            if retired > 0 {
                stats.applied += 1;
                log::debug!("[{}:ack] ← ACK {seq} retired={retired}", self.tag);
            } else {
                stats.stale += 1;
                log::trace!("[{}:ack] ← ACK {seq} (no change)", self.tag);
            }
        }

        log::debug!("[{}:ack] listener stopped: {stats:?}", self.tag);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::DataPacket;
    use crate::window::RetireMode;

    fn window_with(mode: RetireMode, count: u16) -> OutstandingWindow {
        let mut w = OutstandingWindow::new(mode, 8, 0);
        for seq in 0..count {
            w.admit(DataPacket::new(seq, false, vec![])).unwrap();
        }
        w
    }

    async fn loopback() -> Socket {
        Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap()
    }

    #[test]
    fn stale_ack_leaves_window_unchanged() {
        let shared = SharedWindow::new(window_with(RetireMode::Cumulative, 8));
        assert_eq!(shared.apply_ack(4), 5);
        assert_eq!(shared.apply_ack(2), 0);
        let w = shared.lock();
        assert_eq!(w.base(), 5);
        assert_eq!(w.len(), 3);
    }

    #[tokio::test]
    async fn applied_ack_wakes_waiter() {
        let shared = SharedWindow::new(window_with(RetireMode::Selective, 2));
        let waiter = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                shared.wait_for_progress(Duration::from_secs(30)).await;
            })
        };
        shared.apply_ack(0);
        timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter was not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn listener_applies_acks_and_stops() {
        let ack_sock = loopback().await;
        let ack_addr = ack_sock.local_addr;
        let shared = SharedWindow::new(window_with(RetireMode::Cumulative, 4));
        let stop = StopFlag::new();
        let handle = AckListener::new(
            ack_sock,
            Arc::clone(&shared),
            stop.clone(),
            Duration::from_millis(5),
            "test",
        )
        .spawn();

        let peer = loopback().await;
        peer.send_to(&AckFormat::Wide.encode(1), ack_addr).await.unwrap();
        peer.send_to(&AckFormat::Wide.encode(0), ack_addr).await.unwrap();
        peer.send_to(&[0xff], ack_addr).await.unwrap();
        peer.send_to(&AckFormat::Wide.encode(3), ack_addr).await.unwrap();

        timeout(Duration::from_secs(5), async {
            while !shared.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("acks were not applied");

        stop.raise();
        let stats = timeout(Duration::from_secs(5), handle)
            .await
            .expect("listener did not stop")
            .unwrap();
        assert_eq!(stats.acks, 3);
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.stale, 1);
        assert_eq!(stats.malformed, 1);
    }
}

//! End-to-end transfers over loopback, one per policy.
//!
//! Each test runs a [`Receiver`] and a [`Sender`] as separate tokio tasks in
//! the same process.  The data port and the ack port above it both have to be
//! free, so ports come from [`free_port_pair`] rather than port `0`.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod common;

use common::free_port_pair;
use tokio::time::timeout;
use udp_arq::{
    socket::Socket, ArqError, ByteSource, Policy, Receiver, Sender, TransferConfig,
    TransferReport,
};

const DEADLINE: Duration = Duration::from_secs(120);

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// A sink the test can inspect while the receiver still owns it.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run one transfer of `data` and return what the receiver wrote plus both
/// reports.
async fn transfer(
    policy: Policy,
    data: Vec<u8>,
    tweak: impl Fn(&mut TransferConfig),
) -> (Vec<u8>, TransferReport, TransferReport) {
    let port = free_port_pair().await;
    let mut config = TransferConfig::new(policy, "127.0.0.1", port);
    config.ack_timeout = Duration::from_millis(50);
    tweak(&mut config);

    let receiver = Receiver::bind(config.clone()).await.expect("receiver bind");
    let rx = tokio::spawn(async move {
        let mut out = Vec::new();
        let report = receiver.receive(&mut out).await.expect("receive");
        (out, report)
    });

    let sender = Sender::bind(config).await.expect("sender bind");
    let tx_report = timeout(DEADLINE, sender.send(ByteSource::from_bytes(data)))
        .await
        .expect("sender timed out")
        .expect("send");
    let (out, rx_report) = timeout(DEADLINE, rx)
        .await
        .expect("receiver timed out")
        .unwrap();
    (out, tx_report, rx_report)
}

// ---------------------------------------------------------------------------
// Lossless transfers
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unacknowledged_delivers_small_file() {
    let data = pattern(2500);
    let (out, tx, rx) = transfer(Policy::Unacknowledged, data.clone(), |_| {}).await;
    assert_eq!(out, data);
    assert_eq!(tx.packets, 3);
    assert_eq!(tx.retransmissions, 0);
    assert_eq!(rx.acks, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_and_wait_delivers_in_order() {
    let data = pattern(2500);
    let (out, tx, rx) = transfer(Policy::StopAndWait, data.clone(), |_| {}).await;
    assert_eq!(out, data);
    assert_eq!(tx.packets, 3);
    assert_eq!(rx.packets, 3);
    assert_eq!(rx.bytes, 2500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn go_back_n_delivers_in_order() {
    let data = pattern(200_000);
    let (out, tx, _) = transfer(Policy::GoBackN, data.clone(), |c| c.window_size = 8).await;
    assert_eq!(out, data);
    assert_eq!(tx.bytes, 200_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn selective_repeat_delivers_in_order() {
    let data = pattern(200_000);
    let (out, tx, _) = transfer(Policy::SelectiveRepeat, data.clone(), |c| {
        c.window_size = 8;
        c.packet_size = 512;
    })
    .await;
    assert_eq!(out, data);
    assert_eq!(tx.packets, 200_000u64.div_ceil(509));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_input_sends_a_single_eof_packet() {
    for policy in [Policy::StopAndWait, Policy::GoBackN, Policy::SelectiveRepeat] {
        let (out, tx, rx) = transfer(policy, Vec::new(), |_| {}).await;
        assert!(out.is_empty(), "{policy}");
        assert_eq!(tx.packets, 1, "{policy}");
        assert_eq!(rx.bytes, 0, "{policy}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn window_of_one_behaves_like_stop_and_wait() {
    let data = pattern(10_000);
    let (out, _, _) = transfer(Policy::GoBackN, data.clone(), |c| c.window_size = 1).await;
    assert_eq!(out, data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_to_file() {
    let data = pattern(50_000);
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("in.bin");
    let dst = dir.path().join("out.bin");
    std::fs::write(&src, &data).unwrap();

    let port = free_port_pair().await;
    let config = TransferConfig::new(Policy::SelectiveRepeat, "127.0.0.1", port);
    let receiver = Receiver::bind(config.clone()).await.unwrap();
    let dst_clone = dst.clone();
    let rx = tokio::spawn(async move { receiver.receive_to_file(dst_clone).await });

    let sender = Sender::bind(config).await.unwrap();
    timeout(DEADLINE, sender.send_file(&src))
        .await
        .expect("sender timed out")
        .unwrap();
    let report = timeout(DEADLINE, rx).await.unwrap().unwrap().unwrap();

    assert_eq!(report.bytes, 50_000);
    assert_eq!(std::fs::read(&dst).unwrap(), data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_datagram_is_skipped() {
    let data = pattern(3000);
    let port = free_port_pair().await;
    let config = TransferConfig::new(Policy::SelectiveRepeat, "127.0.0.1", port);
    let receiver = Receiver::bind(config.clone()).await.unwrap();
    let rx = tokio::spawn(async move {
        let mut out = Vec::new();
        let report = receiver.receive(&mut out).await.unwrap();
        (out, report)
    });

    let junk = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    junk.send_to(&[0x00, 0x01], format!("127.0.0.1:{port}").parse().unwrap())
        .await
        .unwrap();

    let sender = Sender::bind(config).await.unwrap();
    timeout(DEADLINE, sender.send(ByteSource::from_bytes(data.clone())))
        .await
        .unwrap()
        .unwrap();
    let (out, report) = timeout(DEADLINE, rx).await.unwrap().unwrap();
    assert_eq!(out, data);
    assert_eq!(report.malformed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_datagram_is_skipped() {
    let data = pattern(3000);
    let port = free_port_pair().await;
    let mut config = TransferConfig::new(Policy::GoBackN, "127.0.0.1", port);
    config.packet_size = 512;
    let receiver = Receiver::bind(config.clone()).await.unwrap();
    let rx = tokio::spawn(async move {
        let mut out = Vec::new();
        let report = receiver.receive(&mut out).await.unwrap();
        (out, report)
    });

    // A well-formed frame for seq 0 that is longer than the receiver allows.
    let mut oversized = vec![0x00, 0x00, 0x01];
    oversized.extend_from_slice(&[0xaa; 1021]);
    let junk = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    junk.send_to(&oversized, format!("127.0.0.1:{port}").parse().unwrap())
        .await
        .unwrap();

    let sender = Sender::bind(config).await.unwrap();
    timeout(DEADLINE, sender.send(ByteSource::from_bytes(data.clone())))
        .await
        .unwrap()
        .unwrap();
    let (out, report) = timeout(DEADLINE, rx).await.unwrap().unwrap();
    assert_eq!(out, data);
    assert_eq!(report.malformed, 1);
}

// ---------------------------------------------------------------------------
// Sequence wraparound
// ---------------------------------------------------------------------------

/// 70 000 two-byte packets carry sequence numbers past 65 535 and back.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transfer_wraps_the_sequence_space() {
    const PACKETS: usize = 70_000;
    let data = pattern(PACKETS * 2);
    for policy in [Policy::GoBackN, Policy::SelectiveRepeat] {
        let (out, tx, rx) = transfer(policy, data.clone(), |c| {
            c.packet_size = 5;
            c.window_size = 64;
            c.ack_timeout = Duration::from_millis(200);
        })
        .await;
        assert_eq!(out.len(), data.len(), "{policy}");
        assert!(out == data, "{policy}: output differs");
        assert_eq!(tx.packets, PACKETS as u64, "{policy}");
        assert_eq!(rx.packets, PACKETS as u64, "{policy}");
    }
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// A sender whose packets exceed the receiver's packet size must fail rather
/// than have its frames cut short and written.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn packet_size_mismatch_never_writes_short_output() {
    let port = free_port_pair().await;
    let mut rx_config = TransferConfig::new(Policy::SelectiveRepeat, "127.0.0.1", port);
    rx_config.packet_size = 512;
    let receiver = Receiver::bind(rx_config.clone()).await.unwrap();
    let sink = SharedSink::default();
    let rx = tokio::spawn(receiver.receive(sink.clone()));

    let tx_config = TransferConfig {
        packet_size: 1024,
        ack_timeout: Duration::from_millis(20),
        max_retransmits: Some(3),
        ..rx_config
    };
    let sender = Sender::bind(tx_config).await.unwrap();
    let err = timeout(DEADLINE, sender.send(ByteSource::from_bytes(pattern(5000))))
        .await
        .expect("sender timed out")
        .unwrap_err();
    assert!(matches!(err, ArqError::RetransmitsExhausted { .. }), "{err}");

    assert!(!rx.is_finished(), "receiver finished on truncated frames");
    rx.abort();
    assert!(sink.contents().is_empty());
}

#[tokio::test]
async fn silent_receiver_exhausts_retransmissions() {
    for policy in [Policy::StopAndWait, Policy::GoBackN, Policy::SelectiveRepeat] {
        let port = free_port_pair().await;
        let mut config = TransferConfig::new(policy, "127.0.0.1", port);
        config.ack_timeout = Duration::from_millis(10);
        config.max_retransmits = Some(2);

        let sender = Sender::bind(config).await.unwrap();
        let err = timeout(DEADLINE, sender.send(ByteSource::from_bytes(pattern(100))))
            .await
            .expect("sender timed out")
            .unwrap_err();
        assert!(
            matches!(
                err,
                ArqError::RetransmitsExhausted {
                    seq: 0,
                    transmissions: 3
                }
            ),
            "{policy}: {err}"
        );
    }
}

#[tokio::test]
async fn zero_window_is_rejected() {
    let mut config = TransferConfig::new(Policy::GoBackN, "127.0.0.1", 9000);
    config.window_size = 0;
    let err = Sender::bind(config).await.unwrap_err();
    assert!(matches!(err, ArqError::InvalidConfig(_)));
}

#[tokio::test]
async fn occupied_ack_port_is_transport_unavailable() {
    let port = free_port_pair().await;
    let _squatter = Socket::bind(format!("0.0.0.0:{}", port + 1).parse().unwrap())
        .await
        .unwrap();
    let config = TransferConfig::new(Policy::SelectiveRepeat, "127.0.0.1", port);
    let err = Sender::bind(config).await.unwrap_err();
    assert!(matches!(err, ArqError::TransportUnavailable { .. }));
}

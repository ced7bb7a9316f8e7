//! Helpers shared by the integration tests.

use udp_arq::socket::Socket;

/// Find a port `p` such that `p` and `p + 1` are both free on loopback.
///
/// Both ends of a transfer need the data port and the ack port above it, so
/// port `0` cannot be used directly.
pub async fn free_port_pair() -> u16 {
    loop {
        let a = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let p = a.local_addr.port();
        if p == u16::MAX {
            continue;
        }
        let b = Socket::bind(format!("127.0.0.1:{}", p + 1).parse().unwrap()).await;
        if b.is_ok() {
            return p;
        }
    }
}

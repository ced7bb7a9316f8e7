//! `udp-arq`: reliable, ordered file delivery over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌────────────┐  data (port P)   ┌────────────┐
//!  │   Sender   │─────────────────▶│  Receiver  │
//!  │ Packetizer │                  │  Acceptor  │
//!  │  Window ◀──┼── AckListener ◀──┤ ReorderBuf │
//!  └─────┬──────┘  acks (port P+1) └─────┬──────┘
//!        │ raw UDP datagrams             │
//!  ┌─────▼───────────────────────────────▼──────┐
//!  │   Socket  (thin async wrapper over tokio)  │
//!  └────────────────────────────────────────────┘
//! ```
//!
//! Four ARQ policies share the same wire format and differ only in how the
//! two ends use it: unacknowledged, stop-and-wait, go-back-N and
//! selective-repeat.  See [`config::Policy`].
//!
//! Each module has a single responsibility:
//! - [`packet`]: wire format (serialise / deserialise)
//! - [`seq`]: modulo-2^16 sequence comparisons
//! - [`window`]: sender's outstanding-packet window
//! - [`reorder`]: receiver's acceptance and reorder buffer
//! - [`listener`]: concurrent acknowledgment listener
//! - [`source`]: input reading and packetisation
//! - [`sender`]: sending driver, one loop per policy
//! - [`receiver`]: receiving driver
//! - [`report`]: transfer summary
//! - [`config`]: policies and tunables
//! - [`error`]: crate error types
//! - [`simulator`]: lossy relay for testing
//! - [`socket`]: async UDP socket abstraction

pub mod config;
pub mod error;
pub mod listener;
pub mod packet;
pub mod receiver;
pub mod reorder;
pub mod report;
pub mod sender;
pub mod seq;
pub mod simulator;
pub mod socket;
pub mod source;
pub mod window;

pub use config::{Policy, TransferConfig};
pub use error::ArqError;
pub use receiver::Receiver;
pub use report::TransferReport;
pub use sender::Sender;
pub use source::ByteSource;

//! Wire-format definitions for data packets and acknowledgments.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Data packet
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-
//! |        Sequence Number        |      EOF      | Payload ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 3 bytes.  Any nonzero EOF byte means
//! end-of-stream; the encoder always writes `1`.
//!
//! # Acknowledgments
//!
//! - Stop-and-wait: [`SAW_ACK_LEN`] = 1 byte, the low byte of the sequence
//!   number (which is only ever 0 or 1).
//! - Windowed policies: [`ACK_LEN`] = 2 bytes, big-endian sequence number.

/// Byte length of the fixed-size data header on the wire.
pub const HEADER_LEN: usize = 3;

/// Byte length of a windowed (go-back-N / selective-repeat) acknowledgment.
pub const ACK_LEN: usize = 2;

/// Byte length of a stop-and-wait acknowledgment.
pub const SAW_ACK_LEN: usize = 1;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_EOF: usize = 2;

/// A data packet.  Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub seq: u16,
    pub eof: bool,
    pub payload: Vec<u8>,
}

impl DataPacket {
    pub fn new(seq: u16, eof: bool, payload: Vec<u8>) -> Self {
        Self { seq, eof, payload }
    }

    /// Size of this packet on the wire: header plus payload.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Serialise this packet into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.wire_len()];
        buf[OFF_SEQ..OFF_SEQ + 2].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_EOF] = u8::from(self.eof);
        buf[HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a [`DataPacket`] from a raw datagram.
    ///
    /// The only failure is a datagram shorter than [`HEADER_LEN`]; everything
    /// after the header is payload, however long.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::TooShort { len: buf.len() });
        }
        Ok(Self {
            seq: u16::from_be_bytes([buf[OFF_SEQ], buf[OFF_SEQ + 1]]),
            eof: buf[OFF_EOF] != 0,
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Acknowledgment encodings.  The two widths never share a socket, so the
/// caller always knows which one to expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckFormat {
    /// One byte: the alternating-bit sequence number.
    SingleByte,
    /// Two bytes, big-endian.
    Wide,
}

impl AckFormat {
    pub fn len(self) -> usize {
        match self {
            AckFormat::SingleByte => SAW_ACK_LEN,
            AckFormat::Wide => ACK_LEN,
        }
    }

    pub fn encode(self, seq: u16) -> Vec<u8> {
        match self {
            AckFormat::SingleByte => vec![seq as u8],
            AckFormat::Wide => seq.to_be_bytes().to_vec(),
        }
    }

    pub fn decode(self, buf: &[u8]) -> Result<u16, PacketError> {
        if buf.len() != self.len() {
            return Err(PacketError::BadAckLength {
                expected: self.len(),
                len: buf.len(),
            });
        }
        Ok(match self {
            AckFormat::SingleByte => u16::from(buf[0]),
            AckFormat::Wide => u16::from_be_bytes([buf[0], buf[1]]),
        })
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram of {len} bytes is shorter than the {HEADER_LEN}-byte header")]
    TooShort { len: usize },
    #[error("ack of {len} bytes, expected {expected}")]
    BadAckLength { expected: usize, len: usize },
    #[error("datagram of {len} bytes exceeds the {max}-byte packet size")]
    Oversized { len: usize, max: usize },
}

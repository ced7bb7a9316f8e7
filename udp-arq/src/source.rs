//! Input side of a transfer: a length-aware byte source and the packetiser
//! that cuts it into numbered data packets.
//!
//! A packet is the last one when the bytes remaining before it is cut fit in
//! a single payload, so a 2 500-byte input with a 1 021-byte payload cap
//! becomes packets of 1 021, 1 021 and 458 bytes, and an empty input becomes
//! one empty end-of-stream packet.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::Path;

use crate::error::ArqError;
use crate::packet::DataPacket;

/// A byte stream whose remaining length is known up front.
#[derive(Debug)]
pub struct ByteSource<R> {
    reader: R,
    remaining: u64,
}

impl ByteSource<File> {
    /// Open `path` for sending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArqError> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        Ok(Self::new(file, len))
    }
}

impl ByteSource<Cursor<Vec<u8>>> {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        Self::new(Cursor::new(bytes), len)
    }
}

impl<R: Read> ByteSource<R> {
    /// Wrap `reader`, which must yield exactly `len` bytes.
    pub fn new(reader: R, len: u64) -> Self {
        Self {
            reader,
            remaining: len,
        }
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Read the next `min(max, remaining)` bytes.
    pub fn read_chunk(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let len = self.remaining.min(max as u64) as usize;
        let mut chunk = vec![0u8; len];
        self.reader.read_exact(&mut chunk)?;
        self.remaining -= len as u64;
        Ok(chunk)
    }
}

/// How consecutive packets are numbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Numbering {
    /// 0, 1, 2, … wrapping at 2^16.
    Wrapping,
    /// 0, 1, 0, 1, … for stop-and-wait.
    Alternating,
}

/// Cuts a [`ByteSource`] into [`DataPacket`]s.
#[derive(Debug)]
pub struct Packetizer<R> {
    source: ByteSource<R>,
    max_payload: usize,
    numbering: Numbering,
    next_seq: u16,
    /// End-of-stream packet already produced.
    exhausted: bool,
    total_len: u64,
}

impl<R: Read> Packetizer<R> {
    /// # Panics
    ///
    /// Panics if `max_payload` is zero; a packet must carry at least one
    /// byte or the input would never be consumed.
    pub fn new(source: ByteSource<R>, max_payload: usize, numbering: Numbering) -> Self {
        assert!(max_payload >= 1, "max_payload must be at least 1");
        let total_len = source.remaining();
        Self {
            source,
            max_payload,
            numbering,
            next_seq: 0,
            exhausted: false,
            total_len,
        }
    }

    /// Length of the whole input.
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// `true` once the end-of-stream packet has been handed out.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Produce the next packet, or `None` after end-of-stream.
    pub fn next_packet(&mut self) -> Result<Option<DataPacket>, ArqError> {
        if self.exhausted {
            return Ok(None);
        }
        let eof = self.source.remaining() <= self.max_payload as u64;
        let payload = self.source.read_chunk(self.max_payload)?;
        let seq = self.next_seq;
        self.next_seq = match self.numbering {
            Numbering::Wrapping => seq.wrapping_add(1),
            Numbering::Alternating => (seq + 1) % 2,
        };
        self.exhausted = eof;
        Ok(Some(DataPacket::new(seq, eof, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn packets(bytes: Vec<u8>, max_payload: usize, numbering: Numbering) -> Vec<DataPacket> {
        let mut p = Packetizer::new(ByteSource::from_bytes(bytes), max_payload, numbering);
        let mut out = Vec::new();
        while let Some(pkt) = p.next_packet().unwrap() {
            out.push(pkt);
        }
        assert!(p.is_exhausted());
        out
    }

    #[test]
    fn splits_2500_bytes_into_three_packets() {
        let data: Vec<u8> = (0..2500u32).map(|i| i as u8).collect();
        let pkts = packets(data.clone(), 1021, Numbering::Wrapping);

        let sizes: Vec<usize> = pkts.iter().map(|p| p.payload.len()).collect();
        assert_eq!(sizes, vec![1021, 1021, 458]);
        let seqs: Vec<u16> = pkts.iter().map(|p| p.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        let eofs: Vec<bool> = pkts.iter().map(|p| p.eof).collect();
        assert_eq!(eofs, vec![false, false, true]);

        let joined: Vec<u8> = pkts.into_iter().flat_map(|p| p.payload).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn exact_multiple_ends_on_full_packet() {
        let pkts = packets(vec![1u8; 20], 10, Numbering::Wrapping);
        assert_eq!(pkts.len(), 2);
        assert!(pkts[1].eof);
        assert_eq!(pkts[1].payload.len(), 10);
    }

    #[test]
    fn empty_input_is_one_empty_eof_packet() {
        let pkts = packets(Vec::new(), 10, Numbering::Wrapping);
        assert_eq!(pkts, vec![DataPacket::new(0, true, Vec::new())]);
    }

    #[test]
    fn alternating_numbering() {
        let pkts = packets(vec![0u8; 35], 10, Numbering::Alternating);
        let seqs: Vec<u16> = pkts.iter().map(|p| p.seq).collect();
        assert_eq!(seqs, vec![0, 1, 0, 1]);
    }

    #[test]
    fn file_source_reports_length() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"some file contents").unwrap();
        let mut src = ByteSource::open(file.path()).unwrap();
        assert_eq!(src.remaining(), 18);
        assert_eq!(src.read_chunk(4).unwrap(), b"some");
        assert_eq!(src.remaining(), 14);
    }

    #[test]
    fn missing_file_is_io_failure() {
        let err = ByteSource::open("/definitely/not/here").unwrap_err();
        assert!(matches!(err, ArqError::Io(_)));
    }
}

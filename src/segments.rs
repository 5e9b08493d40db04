//! Structures found inside the (decompressed) body of a [`Bundle`](crate::framing::Bundle).
//!
//! A bundle body is a back to back sequence of exactly `message_count` segments. Each segment has
//! a 16 byte header carrying its total size and a type tag, and the type tag decides how the
//! segment data is interpreted:
//! - [`SegmentType::Ipc`] data starts with a 16 byte [`IpcHeader`], followed by an opaque body
//! - Keepalive data is an 8 byte [`KeepAlive`] record
//! - Anything else is passed through as raw bytes
//!
//! There is no resynchronization between segments, so one bad `size` field ruins the rest of
//! the bundle. Every slice is bounds-checked and such a bundle fails with a [`SegmentError`].

mod ipc;
mod keepalive;
mod payload;
mod segment_type;
mod unpack;

pub use ipc::{Ipc, IpcHeader, IPC_HDR_LEN};
pub use keepalive::{KeepAlive, KEEPALIVE_LEN};
pub use payload::Payload;
pub use segment_type::SegmentType;

use crate::framing::{Compression, FramingError};
use byteorder::{ReadBytesExt, LE};
use std::io::Cursor;
use thiserror::Error;

pub const SEGMENT_HDR_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("Unsupported bundle compression {0:#x}")]
    UnsupportedCompression(Compression),
    #[error("Failed to inflate bundle payload")]
    Inflate { source: std::io::Error },
    #[error("Segment {index} at offset {offset:#x} needs {size:#x} bytes, but only {available:#x} remain")]
    OutOfBounds {
        index: usize,
        offset: usize,
        size: usize,
        available: usize,
    },
    #[error("Segment {index} declares size {size:#x}, smaller than its own header")]
    BadSize { index: usize, size: u32 },
    #[error("{kind} payload needs {needed:#x} bytes, got {actual:#x}")]
    TruncatedPayload {
        kind: SegmentType,
        needed: usize,
        actual: usize,
    },
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error("Segment IO error")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub struct SegmentHeader {
    /// Total size of the segment, including this header
    pub size: u32,
    /// Actor ID of the sender
    pub source: u32,
    /// Actor ID of the receiver
    pub target: u32,
    pub kind: SegmentType,
    /// Usually 0
    pub unknown: u16,
}

impl SegmentHeader {
    /// Length of the data following the header, `None` if `size` is too small to be valid
    pub fn data_size(&self) -> Option<usize> {
        (self.size as usize).checked_sub(SEGMENT_HDR_LEN)
    }

    pub(crate) fn from_buf(buf: &[u8]) -> Result<Self, SegmentError> {
        let mut reader = Cursor::new(buf);
        Ok(Self {
            size: reader.read_u32::<LE>()?,
            source: reader.read_u32::<LE>()?,
            target: reader.read_u32::<LE>()?,
            kind: reader.read_u16::<LE>()?.into(),
            unknown: reader.read_u16::<LE>()?,
        })
    }

    pub fn to_buf(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SEGMENT_HDR_LEN);
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf.extend_from_slice(&self.source.to_le_bytes());
        buf.extend_from_slice(&self.target.to_le_bytes());
        buf.extend_from_slice(&u16::from(self.kind).to_le_bytes());
        buf.extend_from_slice(&self.unknown.to_le_bytes());
        buf
    }
}

/// One record of a bundle body. The `data` is always uncompressed.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Segment {
    pub header: SegmentHeader,
    pub data: Vec<u8>,
}

impl Segment {
    pub fn new(source: u32, target: u32, kind: SegmentType, data: Vec<u8>) -> Self {
        Self {
            header: SegmentHeader {
                size: (SEGMENT_HDR_LEN + data.len()) as u32,
                source,
                target,
                kind,
                unknown: 0,
            },
            data,
        }
    }

    /// Decodes the segment data according to the segment type
    pub fn payload(&self) -> Result<Payload, SegmentError> {
        Payload::decode(self.header.kind, &self.data)
    }

    pub fn to_buf(&self) -> Vec<u8> {
        let mut buf = self.header.to_buf();
        buf.extend_from_slice(&self.data);
        buf
    }
}

#[cfg(test)]
mod test {
    use crate::segments::{Segment, SegmentHeader, SegmentType, SEGMENT_HDR_LEN};
    use anyhow::Result;

    #[test_log::test]
    fn header_layout() -> Result<()> {
        let seg = Segment::new(0x11223344, 0x55667788, SegmentType::Ipc, vec![9; 5]);
        let buf = seg.to_buf();
        assert_eq!(buf.len(), SEGMENT_HDR_LEN + 5);
        assert_eq!(&buf[..4], &[21, 0, 0, 0]);
        assert_eq!(&buf[4..8], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(&buf[12..14], &[3, 0]);

        let header = SegmentHeader::from_buf(&buf)?;
        assert_eq!(header, seg.header);
        assert_eq!(header.data_size(), Some(5));
        Ok(())
    }

    #[test]
    fn undersized_header_has_no_data_size() {
        let mut seg = Segment::new(1, 2, SegmentType::Other(0x99), vec![]);
        assert_eq!(seg.header.data_size(), Some(0));
        seg.header.size = 15;
        assert_eq!(seg.header.data_size(), None);
    }

    #[test]
    fn short_header_buffer_fails() {
        assert!(SegmentHeader::from_buf(&[0; SEGMENT_HDR_LEN - 1]).is_err());
    }
}

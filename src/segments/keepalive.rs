use crate::segments::{SegmentError, SegmentType};
use byteorder::{ReadBytesExt, LE};
use std::io::Cursor;

pub const KEEPALIVE_LEN: usize = 8;

/// Body of both client and server keepalive segments
#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub struct KeepAlive {
    pub id: u32,
    /// Seconds since the Unix epoch
    pub epoch: u32,
}

impl KeepAlive {
    /// Bytes past the 8 byte record are ignored
    pub(crate) fn from_buf(kind: SegmentType, buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < KEEPALIVE_LEN {
            return Err(SegmentError::TruncatedPayload {
                kind,
                needed: KEEPALIVE_LEN,
                actual: buf.len(),
            });
        }
        let mut reader = Cursor::new(buf);
        Ok(Self {
            id: reader.read_u32::<LE>()?,
            epoch: reader.read_u32::<LE>()?,
        })
    }

    pub fn to_buf(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(KEEPALIVE_LEN);
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.epoch.to_le_bytes());
        buf
    }
}

use crate::segments::{SegmentError, SegmentType};
use byteorder::{ReadBytesExt, LE};
use std::io::Cursor;

pub const IPC_HDR_LEN: usize = 16;

/// Sub-header in front of every IPC segment
#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub struct IpcHeader {
    /// Usually 0x14
    pub magic: u16,
    /// The IPC opcode. The same value does not mean the same message across game patches.
    pub kind: u16,
    /// Usually 0
    pub unknown_1: u16,
    /// Probably the ID of the world server handling the connection
    pub server_id: u16,
    /// Seconds since the Unix epoch
    pub epoch: u32,
    /// Usually 0
    pub unknown_2: u32,
}

impl IpcHeader {
    pub fn to_buf(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(IPC_HDR_LEN);
        buf.extend_from_slice(&self.magic.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(&self.unknown_1.to_le_bytes());
        buf.extend_from_slice(&self.server_id.to_le_bytes());
        buf.extend_from_slice(&self.epoch.to_le_bytes());
        buf.extend_from_slice(&self.unknown_2.to_le_bytes());
        buf
    }
}

/// An IPC message. The body layout depends on the opcode and is not interpreted here.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Ipc {
    pub header: IpcHeader,
    pub data: Vec<u8>,
}

impl Ipc {
    pub(crate) fn from_buf(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < IPC_HDR_LEN {
            return Err(SegmentError::TruncatedPayload {
                kind: SegmentType::Ipc,
                needed: IPC_HDR_LEN,
                actual: buf.len(),
            });
        }
        let mut reader = Cursor::new(buf);
        let header = IpcHeader {
            magic: reader.read_u16::<LE>()?,
            kind: reader.read_u16::<LE>()?,
            unknown_1: reader.read_u16::<LE>()?,
            server_id: reader.read_u16::<LE>()?,
            epoch: reader.read_u32::<LE>()?,
            unknown_2: reader.read_u32::<LE>()?,
        };
        Ok(Self {
            header,
            data: buf[IPC_HDR_LEN..].to_vec(),
        })
    }

    pub fn to_buf(&self) -> Vec<u8> {
        let mut buf = self.header.to_buf();
        buf.extend_from_slice(&self.data);
        buf
    }
}

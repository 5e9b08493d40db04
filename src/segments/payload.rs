use crate::segments::{Ipc, KeepAlive, SegmentError, SegmentType};

/// Decoded segment data, selected by the segment type tag
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Payload {
    Ipc(Ipc),
    ClientKeepAlive(KeepAlive),
    ServerKeepAlive(KeepAlive),
    /// Segment types without a known layout, kept verbatim
    Unknown(Vec<u8>),
}

impl Payload {
    pub fn decode(kind: SegmentType, data: &[u8]) -> Result<Self, SegmentError> {
        Ok(match kind {
            SegmentType::Ipc => Self::Ipc(Ipc::from_buf(data)?),
            SegmentType::ClientKeepAlive => Self::ClientKeepAlive(KeepAlive::from_buf(kind, data)?),
            SegmentType::ServerKeepAlive => Self::ServerKeepAlive(KeepAlive::from_buf(kind, data)?),
            SegmentType::Other(_) => Self::Unknown(data.to_vec()),
        })
    }
}

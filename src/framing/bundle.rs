use crate::framing::{Compression, FramingError, BUNDLE_MAGIC, HEADER_LEN, MAGIC_LEN, MAX_BUNDLE_LEN};
use byteorder::{ReadBytesExt, LE};
use std::io::{Cursor, Read};

/// The fixed 40 byte header in front of every bundle
#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub struct BundleHeader {
    /// Either [`BUNDLE_MAGIC`] or, for some keepalives, all zeroes
    pub magic: [u8; MAGIC_LEN],
    /// Milliseconds since the Unix epoch
    pub epoch: u64,
    /// Total length of the bundle, including this header
    pub length: u16,
    /// Usually 0
    pub unknown_1: u16,
    /// Usually 0
    pub connection_type: u16,
    /// Number of segments packed in the (decompressed) body
    pub message_count: u16,
    pub encoding: u8,
    pub compression: Compression,
    pub unknown_2: u16,
    pub unknown_3: u16,
    pub unknown_4: u16,
}

impl BundleHeader {
    /// Length of the body that follows the header
    pub fn payload_length(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_LEN)
    }

    pub fn is_compressed(&self) -> bool {
        self.compression != Compression::None
    }

    /// Decodes the header at the start of `buf`, ignoring any bytes after the first 40
    pub fn from_buf(buf: &[u8]) -> Result<Self, FramingError> {
        if buf.len() < HEADER_LEN {
            return Err(FramingError::ShortHeader(buf.len()));
        }
        let mut reader = Cursor::new(buf);
        let mut magic = [0; MAGIC_LEN];
        reader.read_exact(&mut magic)?;
        Ok(Self {
            magic,
            epoch: reader.read_u64::<LE>()?,
            length: reader.read_u16::<LE>()?,
            unknown_1: reader.read_u16::<LE>()?,
            connection_type: reader.read_u16::<LE>()?,
            message_count: reader.read_u16::<LE>()?,
            encoding: reader.read_u8()?,
            compression: reader.read_u8()?.into(),
            unknown_2: reader.read_u16::<LE>()?,
            unknown_3: reader.read_u16::<LE>()?,
            unknown_4: reader.read_u16::<LE>()?,
        })
    }

    pub fn to_buf(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        buf.extend_from_slice(&self.magic);
        buf.extend_from_slice(&self.epoch.to_le_bytes());
        buf.extend_from_slice(&self.length.to_le_bytes());
        buf.extend_from_slice(&self.unknown_1.to_le_bytes());
        buf.extend_from_slice(&self.connection_type.to_le_bytes());
        buf.extend_from_slice(&self.message_count.to_le_bytes());
        buf.push(self.encoding);
        buf.push(self.compression.into());
        buf.extend_from_slice(&self.unknown_2.to_le_bytes());
        buf.extend_from_slice(&self.unknown_3.to_le_bytes());
        buf.extend_from_slice(&self.unknown_4.to_le_bytes());
        buf
    }
}

/// One complete frame, as cut out of the stream by the decoder.
///
/// The payload is still compressed if the header says so,
/// use [`Bundle::segments`](Bundle::segments) to get at the contents.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Bundle {
    pub header: BundleHeader,
    pub payload: Vec<u8>,
}

impl Bundle {
    /// Builds a bundle with the primary marker and a `length` matching the payload
    pub fn new(
        epoch: u64,
        compression: Compression,
        message_count: u16,
        payload: Vec<u8>,
    ) -> Result<Self, FramingError> {
        let length = HEADER_LEN + payload.len();
        if length > MAX_BUNDLE_LEN {
            return Err(FramingError::PayloadTooLarge(payload.len()));
        }
        let header = BundleHeader {
            magic: BUNDLE_MAGIC,
            epoch,
            length: length as u16,
            unknown_1: 0,
            connection_type: 0,
            message_count,
            encoding: 0,
            compression,
            unknown_2: 0,
            unknown_3: 0,
            unknown_4: 0,
        };
        Ok(Self { header, payload })
    }

    /// Serializes the header as is, followed by the payload
    pub fn to_buf(&self) -> Vec<u8> {
        let mut buf = self.header.to_buf();
        buf.extend_from_slice(&self.payload);
        buf
    }
}

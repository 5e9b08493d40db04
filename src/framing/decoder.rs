use crate::framing::{
    Bundle, BundleHeader, FramingError, BUNDLE_MAGIC, HEADER_LEN, KEEPALIVE_MAGIC, MAGIC_LEN,
    MAX_BUFFERED,
};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, error, trace, warn};

fn find_marker(buf: &[u8], marker: &[u8; MAGIC_LEN]) -> Option<usize> {
    buf.windows(MAGIC_LEN).position(|w| w == marker)
}

/// Cuts at most one bundle off the front of `buf`.
///
/// Nothing is trimmed until a marker is found, since the tail of the buffer may be the first
/// bytes of a marker that hasn't fully arrived yet. Once a marker is found, everything before
/// it is garbage and is dropped even if the bundle itself is still incomplete.
pub(crate) fn extract_bundle(buf: &mut BytesMut) -> Option<Bundle> {
    // A suffix of a buffer without the primary marker can't contain it either
    let mut primary_absent = false;
    loop {
        let primary = if primary_absent {
            None
        } else {
            find_marker(buf, &BUNDLE_MAGIC)
        };
        let start = match primary {
            Some(pos) => pos,
            None => {
                primary_absent = true;
                find_marker(buf, &KEEPALIVE_MAGIC)?
            }
        };

        let available = buf.len() - start;
        if available < HEADER_LEN {
            buf.advance(start);
            return None;
        }

        let header = match BundleHeader::from_buf(&buf[start..start + HEADER_LEN]) {
            Ok(h) => h,
            Err(e) => {
                error!("Failed to read bundle header at {:#x}: {}", start, e);
                buf.advance(start + 1);
                continue;
            }
        };
        let length = header.length as usize;
        if length < HEADER_LEN {
            // Can't be a real bundle. Skip one byte so that an overlapping marker is still found.
            if primary.is_some() {
                warn!(
                    "Bundle at {:#x} declares length {:#x}, smaller than its header, skipping marker",
                    start, length
                );
            } else {
                trace!("Zero run at {:#x} is not a keepalive bundle", start);
            }
            buf.advance(start + 1);
            continue;
        }
        if available < length {
            buf.advance(start);
            return None;
        }

        if start != 0 {
            debug!(
                "Discarding {:#x} bytes before bundle: {}",
                start,
                hex::encode(&buf[..start])
            );
        }
        buf.advance(start);
        let frame = buf.split_to(length);
        let bundle = Bundle {
            header,
            payload: frame[HEADER_LEN..].to_vec(),
        };
        trace!(
            "Decoded bundle with {} segments and {:#x} bytes payload: {}",
            bundle.header.message_count,
            bundle.payload.len(),
            hex::encode(&bundle.payload),
        );
        return Some(bundle);
    }
}

/// Incremental bundle decoder for one direction of one flow.
///
/// Bytes are appended with [`feed`](Self::feed), then [`next_bundle`](Self::next_bundle)
/// must be called until it returns `None` to drain every bundle currently available.
#[derive(Debug, Default)]
pub struct BundleDecoder {
    buf: BytesMut,
}

impl BundleDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends already ordered bytes, no parsing happens here
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn next_bundle(&mut self) -> Option<Bundle> {
        extract_bundle(&mut self.buf)
    }

    /// Bytes received but not yet part of a returned bundle
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// [`Decoder`] for replaying a recorded one-direction byte stream through a `FramedRead`
#[derive(Debug, Clone)]
pub struct BundleCodec {
    max_buffered: usize,
}

impl BundleCodec {
    pub fn new() -> Self {
        Self {
            max_buffered: MAX_BUFFERED,
        }
    }

    /// Fail the stream once more than `max_buffered` bytes are held without a bundle
    pub fn with_max_buffered(max_buffered: usize) -> Self {
        Self { max_buffered }
    }
}

impl Default for BundleCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BundleCodec {
    type Item = Bundle;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bundle>, FramingError> {
        if let Some(bundle) = extract_bundle(src) {
            return Ok(Some(bundle));
        }
        if src.len() > self.max_buffered {
            return Err(FramingError::BufferOverflow(src.len()));
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bundle>, FramingError> {
        if let Some(bundle) = self.decode(src)? {
            return Ok(Some(bundle));
        }
        if !src.is_empty() {
            debug!("Discarding {:#x} unframed bytes at end of stream", src.len());
            src.clear();
        }
        Ok(None)
    }
}

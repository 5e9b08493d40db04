//! This module turns a reassembled, one-direction TCP byte stream into [`Bundle`](bundle::Bundle)s.
//!
//! A bundle is the outer frame of the protocol: a 40 byte little endian header that starts with a
//! 16 byte marker, followed by a possibly compressed body. The stream carries no other
//! synchronization, so the decoder scans for the marker and only trims bytes once a marker
//! has been located.
//!
//! The framing layer does not look inside the body, see [`segments`](crate::segments) for that.

pub mod bundle;
mod compression;
mod decoder;
mod reader;

pub use bundle::{Bundle, BundleHeader};
pub use compression::Compression;
pub use decoder::{BundleCodec, BundleDecoder};
pub use reader::BundleReader;

use thiserror::Error;

pub const MAGIC_LEN: usize = 16;
pub const HEADER_LEN: usize = 40;

/// The largest value the header's `length` field can hold
pub const MAX_BUNDLE_LEN: usize = u16::MAX as usize;

/// A direction that buffers more than this without producing a bundle is considered corrupted
pub const MAX_BUFFERED: usize = 2 * MAX_BUNDLE_LEN;

/// Marker found at the start of nearly every bundle (words 0x41a05252 0xe2465dff 0x4d642a7f 0x75c4997b)
#[rustfmt::skip]
pub const BUNDLE_MAGIC: [u8; MAGIC_LEN] = [
    0x52, 0x52, 0xa0, 0x41,
    0xff, 0x5d, 0x46, 0xe2,
    0x7f, 0x2a, 0x64, 0x4d,
    0x7b, 0x99, 0xc4, 0x75,
];

/// Link keepalive bundles have been observed with an all-zero marker instead.
///
/// Sixteen zero bytes can just as well be padding inside unrelated data, and nothing on the wire
/// disambiguates the two. The decoder accepts the first such run it finds, after ruling out the
/// primary marker.
pub const KEEPALIVE_MAGIC: [u8; MAGIC_LEN] = [0; MAGIC_LEN];

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("Bundle header needs {HEADER_LEN:#x} bytes, got {0:#x}")]
    ShortHeader(usize),
    #[error("Bundle payload of {0:#x} bytes does not fit in the length field")]
    PayloadTooLarge(usize),
    #[error("Buffered {0:#x} bytes without finding a complete bundle")]
    BufferOverflow(usize),
    #[error("Bundle IO error")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

use crate::framing::{Bundle, Compression};
use crate::segments::{Segment, SegmentError, SegmentHeader, SEGMENT_HDR_LEN};
use std::borrow::Cow;
use tracing::trace;

#[cfg(feature = "zlib")]
use flate2::read::ZlibDecoder;
#[cfg(feature = "zlib")]
use std::io::Read;

impl Bundle {
    /// The bundle body after any decompression
    pub fn decompressed_payload(&self) -> Result<Cow<'_, [u8]>, SegmentError> {
        match self.header.compression {
            Compression::None => Ok(Cow::Borrowed(self.payload.as_slice())),
            #[cfg(feature = "zlib")]
            Compression::Zlib => {
                let mut inflated = Vec::with_capacity(self.payload.len() * 4);
                ZlibDecoder::new(self.payload.as_slice())
                    .read_to_end(&mut inflated)
                    .map_err(|source| SegmentError::Inflate { source })?;
                trace!(
                    "Inflated {:#x} bytes bundle payload to {:#x} bytes",
                    self.payload.len(),
                    inflated.len()
                );
                Ok(Cow::Owned(inflated))
            }
            other => Err(SegmentError::UnsupportedCompression(other)),
        }
    }

    /// Splits the body into exactly `message_count` segments
    pub fn segments(&self) -> Result<Vec<Segment>, SegmentError> {
        let body = self.decompressed_payload()?;
        let count = self.header.message_count as usize;
        let mut segments = Vec::with_capacity(count);
        let mut offset = 0;

        for index in 0..count {
            let available = body.len() - offset;
            if available < SEGMENT_HDR_LEN {
                return Err(SegmentError::OutOfBounds {
                    index,
                    offset,
                    size: SEGMENT_HDR_LEN,
                    available,
                });
            }
            let header = SegmentHeader::from_buf(&body[offset..offset + SEGMENT_HDR_LEN])?;
            if header.data_size().is_none() {
                return Err(SegmentError::BadSize {
                    index,
                    size: header.size,
                });
            }
            let size = header.size as usize;
            if size > available {
                return Err(SegmentError::OutOfBounds {
                    index,
                    offset,
                    size,
                    available,
                });
            }
            segments.push(Segment {
                header,
                data: body[offset + SEGMENT_HDR_LEN..offset + size].to_vec(),
            });
            offset += size;
        }

        if offset != body.len() {
            trace!(
                "{:#x} bytes left in bundle body after {} segments",
                body.len() - offset,
                count
            );
        }
        Ok(segments)
    }

    /// Packs `segments` into a new bundle body, compressing it if asked to
    pub fn from_segments(
        epoch: u64,
        compression: Compression,
        segments: &[Segment],
    ) -> Result<Self, SegmentError> {
        let mut body = Vec::new();
        for segment in segments {
            body.extend_from_slice(&segment.to_buf());
        }
        let payload = match compression {
            Compression::None => body,
            #[cfg(feature = "zlib")]
            Compression::Zlib => {
                use std::io::Write;
                let mut encoder =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(&body)?;
                encoder.finish()?
            }
            other => return Err(SegmentError::UnsupportedCompression(other)),
        };
        Ok(Self::new(epoch, compression, segments.len() as u16, payload)?)
    }
}

#[cfg(test)]
mod test {
    use crate::framing::{Bundle, Compression};
    use crate::segments::{
        Ipc, IpcHeader, KeepAlive, Payload, Segment, SegmentError, SegmentType, SEGMENT_HDR_LEN,
    };
    use anyhow::Result;

    fn keepalive_bundle() -> Bundle {
        let ka = KeepAlive {
            id: 0xCAFE,
            epoch: 1_700_000_000,
        };
        let seg = Segment::new(0x1000, 0x2000, SegmentType::ClientKeepAlive, ka.to_buf());
        Bundle::from_segments(1_700_000_000_123, Compression::None, &[seg]).unwrap()
    }

    #[test_log::test]
    fn single_keepalive_segment() -> Result<()> {
        let bundle = keepalive_bundle();
        assert_eq!(bundle.header.message_count, 1);
        let segments = bundle.segments()?;
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].header.source, 0x1000);
        assert_eq!(segments[0].header.target, 0x2000);
        assert_eq!(
            segments[0].payload()?,
            Payload::ClientKeepAlive(KeepAlive {
                id: 0xCAFE,
                epoch: 1_700_000_000
            })
        );
        Ok(())
    }

    #[test_log::test]
    fn mixed_segments_keep_order() -> Result<()> {
        let ipc = Ipc {
            header: IpcHeader {
                magic: 0x14,
                kind: 0x1A3,
                unknown_1: 0,
                server_id: 3,
                epoch: 1_700_000_001,
                unknown_2: 0,
            },
            data: vec![0xEE; 40],
        };
        let segs = vec![
            Segment::new(1, 1, SegmentType::Ipc, ipc.to_buf()),
            Segment::new(1, 1, SegmentType::Other(0x0A), vec![1, 2]),
            Segment::new(1, 1, SegmentType::ServerKeepAlive, vec![0; 8]),
        ];
        let bundle = Bundle::from_segments(0, Compression::None, &segs)?;
        let decoded = bundle.segments()?;
        assert_eq!(decoded, segs);
        assert_eq!(decoded[0].payload()?, Payload::Ipc(ipc));
        Ok(())
    }

    #[cfg(feature = "zlib")]
    #[test_log::test]
    fn zlib_payload_inflates_to_original() -> Result<()> {
        use flate2::write::ZlibEncoder;
        use std::io::Write;

        let seg = Segment::new(7, 8, SegmentType::Other(0x65), b"hello hello hello".to_vec());
        let original = seg.to_buf();
        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::best());
        encoder.write_all(&original)?;
        let compressed = encoder.finish()?;

        let bundle = Bundle::new(0, Compression::Zlib, 1, compressed)?;
        assert_eq!(&*bundle.decompressed_payload()?, original.as_slice());
        assert_eq!(bundle.segments()?, vec![seg]);
        Ok(())
    }

    #[cfg(feature = "zlib")]
    #[test_log::test]
    fn from_segments_compresses() -> Result<()> {
        let segs = vec![Segment::new(1, 2, SegmentType::Other(0x1), vec![0x42; 500])];
        let bundle = Bundle::from_segments(0, Compression::Zlib, &segs)?;
        assert!(bundle.payload.len() < 500);
        assert_eq!(bundle.segments()?, segs);
        Ok(())
    }

    #[test_log::test]
    fn corrupt_zlib_stream_fails() -> Result<()> {
        let bundle = Bundle::new(0, Compression::Zlib, 1, b"definitely not zlib".to_vec())?;
        let err = bundle.segments().unwrap_err();
        #[cfg(feature = "zlib")]
        assert!(matches!(err, SegmentError::Inflate { .. }));
        #[cfg(not(feature = "zlib"))]
        assert!(matches!(err, SegmentError::UnsupportedCompression(_)));
        Ok(())
    }

    #[test_log::test]
    fn unknown_compression_fails() -> Result<()> {
        let bundle = Bundle::new(0, Compression::Other(7), 0, vec![])?;
        assert!(matches!(
            bundle.segments(),
            Err(SegmentError::UnsupportedCompression(Compression::Other(7)))
        ));
        Ok(())
    }

    #[test_log::test]
    fn message_count_past_body_fails() -> Result<()> {
        let mut bundle = keepalive_bundle();
        bundle.header.message_count = 2;
        assert!(matches!(
            bundle.segments(),
            Err(SegmentError::OutOfBounds {
                index: 1,
                available: 0,
                ..
            })
        ));
        Ok(())
    }

    #[test_log::test]
    fn oversized_segment_fails() -> Result<()> {
        let mut seg = Segment::new(1, 2, SegmentType::Other(1), vec![0; 4]);
        seg.header.size = 0xFFFF_FFFF;
        let bundle = Bundle::new(0, Compression::None, 1, seg.to_buf())?;
        assert!(matches!(
            bundle.segments(),
            Err(SegmentError::OutOfBounds {
                index: 0,
                offset: 0,
                available: 20,
                ..
            })
        ));
        Ok(())
    }

    #[test_log::test]
    fn undersized_segment_fails() -> Result<()> {
        let mut seg = Segment::new(1, 2, SegmentType::Other(1), vec![0; 4]);
        seg.header.size = (SEGMENT_HDR_LEN - 1) as u32;
        let bundle = Bundle::new(0, Compression::None, 1, seg.to_buf())?;
        assert!(matches!(
            bundle.segments(),
            Err(SegmentError::BadSize { index: 0, size: 15 })
        ));
        Ok(())
    }

    #[test_log::test]
    fn zero_segments_is_empty() -> Result<()> {
        let bundle = Bundle::new(0, Compression::None, 0, vec![1, 2, 3])?;
        assert!(bundle.segments()?.is_empty());
        Ok(())
    }
}

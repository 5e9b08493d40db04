use crate::framing::{Bundle, BundleCodec};
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{error, trace};

/// Async [`Stream`] of the bundles found in a single-direction byte stream.
///
/// This is meant for replaying recorded streams (e.g. one direction of a connection dumped to a file).
/// Live captures should feed a [`BundleDecoder`](super::BundleDecoder) per direction instead.
pub struct BundleReader<IO> {
    read: FramedRead<IO, BundleCodec>,
}

impl<IO> BundleReader<IO>
where
    IO: AsyncRead + Unpin,
{
    pub fn new(io: IO) -> Self {
        Self::with_codec(io, BundleCodec::new())
    }

    pub fn with_codec(io: IO, codec: BundleCodec) -> Self {
        Self {
            read: FramedRead::new(io, codec),
        }
    }

    pub fn into_inner(self) -> IO {
        self.read.into_inner()
    }
}

impl<IO> Stream for BundleReader<IO>
where
    IO: AsyncRead + Unpin,
{
    type Item = Bundle;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match ready!(this.read.poll_next_unpin(cx)) {
            Some(Ok(bundle)) => {
                trace!(
                    "Read bundle with {} segments and {:#x} bytes payload",
                    bundle.header.message_count,
                    bundle.payload.len(),
                );
                Poll::Ready(Some(bundle))
            }
            Some(Err(e)) => {
                error!("Failed to read bundle stream: {}", e);
                Poll::Ready(None)
            }
            None => Poll::Ready(None),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::framing::{Bundle, BundleCodec, BundleReader, Compression};
    use anyhow::Result;
    use futures_util::StreamExt;
    use rand::Rng;
    use tokio::io::AsyncWriteExt;

    #[test_log::test(tokio::test)]
    async fn replays_chunked_stream() -> Result<()> {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let reader = BundleReader::new(reader);

        let mut rng = rand::thread_rng();
        let bundles = (0..5)
            .map(|epoch| {
                let len = rng.gen_range(0..4096usize);
                Bundle::new(epoch, Compression::None, 0, vec![0xA5; len])
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut stream = b"leading junk".to_vec();
        for bundle in &bundles {
            stream.extend_from_slice(&bundle.to_buf());
        }

        let writer_task = tokio::spawn(async move {
            for chunk in stream.chunks(333) {
                writer.write_all(chunk).await?;
            }
            writer.shutdown().await?;
            Ok::<_, std::io::Error>(())
        });

        let received: Vec<Bundle> = reader.collect().await;
        assert_eq!(received, bundles);
        writer_task.await??;
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn overflow_ends_the_stream() -> Result<()> {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BundleReader::with_codec(reader, BundleCodec::with_max_buffered(100));
        writer.write_all(&[0x33; 200]).await?;
        drop(writer);
        assert!(reader.next().await.is_none());
        Ok(())
    }
}

//! Duplex byte stream handed to a session.

use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, TryStreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{BytesCodec, FramedWrite};
use tokio_util::io::ReaderStream;

use crate::backend::BackendError;

/// Read half: chunks in the order the backend produced them.
pub type BackendReader = Pin<Box<dyn Stream<Item = Result<Bytes, BackendError>> + Send>>;

/// Write half: each item is written to the backend in order.
pub type BackendWriter = Pin<Box<dyn Sink<Bytes, Error = BackendError> + Send>>;

/// A backend byte stream split into independently owned halves.
pub struct BackendStream {
    reader: BackendReader,
    writer: BackendWriter,
}

impl BackendStream {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: Stream<Item = Result<Bytes, BackendError>> + Send + 'static,
        W: Sink<Bytes, Error = BackendError> + Send + 'static,
    {
        Self {
            reader: Box::pin(reader),
            writer: Box::pin(writer),
        }
    }

    /// Wrap any async byte pipe, e.g. a TCP or in-memory duplex stream.
    pub fn from_io<T>(io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(io);
        let reader = ReaderStream::new(read).map_err(BackendError::transport);
        let writer = SinkExt::<Bytes>::sink_map_err(
            FramedWrite::new(write, BytesCodec::new()),
            BackendError::transport,
        );
        Self::new(reader, writer)
    }

    pub fn into_split(self) -> (BackendReader, BackendWriter) {
        (self.reader, self.writer)
    }
}

impl std::fmt::Debug for BackendStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendStream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn from_io_moves_bytes_both_ways() {
        let (local, mut remote) = tokio::io::duplex(64);
        let (mut reader, mut writer) = BackendStream::from_io(local).into_split();

        writer.send(Bytes::from_static(b"hello")).await.unwrap();
        let mut buf = [0u8; 5];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        remote.write_all(b"world").await.unwrap();
        let chunk = reader.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"world");

        drop(remote);
        assert!(reader.next().await.is_none());
    }
}

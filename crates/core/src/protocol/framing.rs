//! Deadline-bounded reads and writes of fixed-size fields
//!
//! `FramedStream` absorbs short reads and writes: a field is either fully
//! transferred or the call fails. A read that returns zero bytes before the
//! field is complete is [`CoreError::PeerClosed`]; there is no "end of batch"
//! signal at this layer.

use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::MESSAGE_BUFFER_SIZE;
use crate::{CoreError, Result};

/// Stream wrapper applying an optional deadline to every transfer
pub struct FramedStream<S> {
    inner: S,
    timeout: Option<Duration>,
}

/// Run `fut` under `timeout`, mapping expiry to [`CoreError::Timeout`]
async fn with_deadline<F, T>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| CoreError::Timeout(limit.as_millis() as u64))?,
        None => fut.await,
    }
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap `inner`; `None` means transfers may block forever
    pub fn new(inner: S, timeout: Option<Duration>) -> Self {
        Self { inner, timeout }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Fill `buf` completely
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let inner = &mut self.inner;
        with_deadline(self.timeout, async move {
            let expected = buf.len();
            let mut received = 0;
            while received < expected {
                let n = inner.read(&mut buf[received..]).await?;
                if n == 0 {
                    return Err(CoreError::PeerClosed { received, expected });
                }
                received += n;
            }
            Ok(())
        })
        .await
    }

    pub async fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf).await?;
        Ok(u32::from_le_bytes(buf))
    }

    pub async fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf).await?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Single bounded receive of an unframed handshake message
    ///
    /// Reads at most [`MESSAGE_BUFFER_SIZE`] - 1 bytes in one call and cuts
    /// the result at the first NUL byte. A closed peer yields an empty
    /// message rather than an error.
    pub async fn read_message(&mut self) -> Result<Vec<u8>> {
        let inner = &mut self.inner;
        with_deadline(self.timeout, async move {
            let mut buf = [0u8; MESSAGE_BUFFER_SIZE];
            let n = inner.read(&mut buf[..MESSAGE_BUFFER_SIZE - 1]).await?;
            let received = &buf[..n];
            let end = received.iter().position(|&b| b == 0).unwrap_or(n);
            Ok(received[..end].to_vec())
        })
        .await
    }

    /// Deliver all of `bytes` and flush
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let inner = &mut self.inner;
        with_deadline(self.timeout, async move {
            inner.write_all(bytes).await?;
            inner.flush().await?;
            Ok(())
        })
        .await
    }

    pub async fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_all(&value.to_le_bytes()).await
    }

    pub async fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_all(&value.to_le_bytes()).await
    }

    /// Half-close the write side
    pub async fn shutdown(&mut self) -> Result<()> {
        let inner = &mut self.inner;
        with_deadline(self.timeout, async move {
            inner.shutdown().await?;
            Ok(())
        })
        .await
    }
}

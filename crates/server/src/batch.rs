//! Vector batch loop run after a successful login
//!
//! Reads the declared vector count, then for each vector its length and
//! elements, replying with the wrapped sum of squares as soon as the last
//! element arrives. Only the running sum is kept in memory.

use anyhow::{Context, Result};
use quadsum_core::{FramedStream, SquareSum, VectorLimits};
use tokio::io::{AsyncRead, AsyncWrite};

/// Serve one batch, returning the number of vectors answered
pub async fn serve_batch<S>(stream: &mut FramedStream<S>, limits: VectorLimits) -> Result<u32>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let count = stream.read_u32().await.context("recv (vector count)")?;
    limits.check_count(count).context("vector count")?;
    tracing::debug!("Batch of {} vectors", count);

    for vector in 0..count {
        let len = stream
            .read_u32()
            .await
            .with_context(|| format!("recv (length of vector {})", vector))?;
        limits
            .check_len(len)
            .with_context(|| format!("length of vector {}", vector))?;

        let mut sum = SquareSum::new();
        for element in 0..len {
            let value = stream
                .read_i32()
                .await
                .with_context(|| format!("recv (element {} of vector {})", element, vector))?;
            sum.push(value);
        }

        stream
            .write_i32(sum.value())
            .await
            .with_context(|| format!("send (result of vector {})", vector))?;
        tracing::trace!("Vector {} ({} elements) -> {}", vector, len, sum.value());
    }

    Ok(count)
}

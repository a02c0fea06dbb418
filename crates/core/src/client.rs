//! Client side of the protocol
//!
//! Drives the login handshake and streams vectors, reading one reply per
//! vector as soon as that vector has been written.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::auth::digest;
use crate::protocol::{FramedStream, VectorCodec, AUTH_ERR, AUTH_OK, USER_NOT_FOUND};
use crate::{CoreError, Result};

/// How the server answered a login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// `OK`; the connection is ready for a batch
    Accepted,
    /// `ERR_USER_NOT_FOUND`; no challenge was sent
    UnknownUser,
    /// `ERR`; the digest did not match
    WrongSecret,
}

/// Protocol client over any byte stream
pub struct ComputeClient<S> {
    stream: FramedStream<S>,
}

impl<S> ComputeClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, timeout: Option<Duration>) -> Self {
        Self {
            stream: FramedStream::new(stream, timeout),
        }
    }

    /// Send `username`, answer the challenge with the digest of `secret`
    pub async fn login(&mut self, username: &str, secret: &str) -> Result<LoginOutcome> {
        self.stream.write_all(username.as_bytes()).await?;

        let challenge = self.stream.read_message().await?;
        if challenge == USER_NOT_FOUND {
            return Ok(LoginOutcome::UnknownUser);
        }
        if challenge.is_empty() {
            return Err(CoreError::Protocol("server closed before sending challenge".into()));
        }
        tracing::debug!("Received challenge of {} bytes", challenge.len());

        let answer = digest(&challenge, secret.as_bytes());
        self.stream.write_all(answer.as_bytes()).await?;

        let verdict = self.stream.read_message().await?;
        match verdict.as_slice() {
            v if v == AUTH_OK => Ok(LoginOutcome::Accepted),
            v if v == AUTH_ERR => Ok(LoginOutcome::WrongSecret),
            other => Err(CoreError::Protocol(format!(
                "unexpected auth verdict: {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    /// Announce how many vectors will follow
    pub async fn begin_batch(&mut self, count: u32) -> Result<()> {
        self.stream.write_all(&VectorCodec::encode_count(count)).await
    }

    /// Send one vector and wait for its sum of squares
    pub async fn compute(&mut self, elements: &[i32]) -> Result<i32> {
        self.stream.write_all(&VectorCodec::encode_vector(elements)).await?;
        self.stream.read_i32().await
    }

    /// Send a whole batch, collecting replies in order
    pub async fn compute_batch(&mut self, vectors: &[Vec<i32>]) -> Result<Vec<i32>> {
        self.begin_batch(vectors.len() as u32).await?;
        let mut results = Vec::with_capacity(vectors.len());
        for vector in vectors {
            results.push(self.compute(vector).await?);
        }
        Ok(results)
    }

    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}

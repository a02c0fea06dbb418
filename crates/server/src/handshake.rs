//! Challenge-response login
//!
//! ```text
//! AwaitingLogin --unknown user--> Rejected(UnknownUser)
//!       |
//!   send salt
//!       v
//! AwaitingHash --digest matches--> Authenticated
//!       |
//!       +------mismatch-----> Rejected(WrongDigest)
//! ```
//!
//! Rejections are ordinary outcomes: the client is told, the journal gets a
//! line naming the user, and the caller closes the connection. Transport
//! failures are returned as errors.

use anyhow::{Context, Result};
use quadsum_core::protocol::{AUTH_ERR, AUTH_OK, USER_NOT_FOUND};
use quadsum_core::{Challenge, FramedStream};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::credentials::{CredentialStore, Secret};
use crate::journal::Journal;

/// Why a login was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UnknownUser,
    WrongDigest,
}

/// Result of a completed handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Authenticated { username: String },
    Rejected { username: String, reason: Rejection },
}

enum State {
    AwaitingLogin,
    AwaitingHash { username: String, secret: Secret },
    Done(HandshakeOutcome),
}

/// One login exchange against the credential store
pub struct Handshake<'a> {
    credentials: &'a CredentialStore,
    journal: &'a Journal,
    challenge: Challenge,
}

impl<'a> Handshake<'a> {
    pub fn new(credentials: &'a CredentialStore, journal: &'a Journal, challenge: Challenge) -> Self {
        Self {
            credentials,
            journal,
            challenge,
        }
    }

    pub async fn run<S>(self, stream: &mut FramedStream<S>) -> Result<HandshakeOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut state = State::AwaitingLogin;
        loop {
            state = match state {
                State::AwaitingLogin => self.on_login(stream).await?,
                State::AwaitingHash { username, secret } => {
                    self.on_hash(stream, username, secret).await?
                }
                State::Done(outcome) => return Ok(outcome),
            };
        }
    }

    async fn on_login<S>(&self, stream: &mut FramedStream<S>) -> Result<State>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let login = stream.read_message().await.context("recv (login)")?;
        let username = String::from_utf8_lossy(&login).into_owned();

        let Some(secret) = self.credentials.find_secret(&login).await else {
            self.journal
                .error(format!("user not found: {}", username))
                .await;
            // Best effort, the connection is closed either way
            if let Err(e) = stream.write_all(USER_NOT_FOUND).await {
                tracing::debug!("Failed to send rejection to {}: {}", username, e);
            }
            return Ok(State::Done(HandshakeOutcome::Rejected {
                username,
                reason: Rejection::UnknownUser,
            }));
        };

        stream
            .write_all(self.challenge.as_bytes())
            .await
            .context("send (salt)")?;
        Ok(State::AwaitingHash { username, secret })
    }

    async fn on_hash<S>(
        &self,
        stream: &mut FramedStream<S>,
        username: String,
        secret: Secret,
    ) -> Result<State>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let answer = stream.read_message().await.context("recv (hash)")?;

        if self.challenge.verify(secret.as_bytes(), &answer) {
            stream.write_all(AUTH_OK).await.context("send (auth result)")?;
            tracing::info!("User {} authenticated", username);
            return Ok(State::Done(HandshakeOutcome::Authenticated { username }));
        }

        self.journal
            .error(format!("authentication failed: wrong hash for user {}", username))
            .await;
        stream.write_all(AUTH_ERR).await.context("send (auth result)")?;
        Ok(State::Done(HandshakeOutcome::Rejected {
            username,
            reason: Rejection::WrongDigest,
        }))
    }
}

//! TCP server for sum-of-squares sessions
//!
//! Owns the listening socket and runs each accepted connection through the
//! handshake and, once authenticated, the batch loop. Sockets are closed on
//! every exit path when their owners drop.

use anyhow::{Context, Result};
use quadsum_core::{Challenge, FramedStream};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufStream;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinSet;

use crate::batch::serve_batch;
use crate::config::ServerConfig;
use crate::credentials::CredentialStore;
use crate::handshake::{Handshake, HandshakeOutcome, Rejection};
use crate::journal::Journal;
use crate::ratelimit::{ConnectionQuota, PRUNE_INTERVAL};

/// Pending connections the kernel queues before `accept`
const LISTEN_BACKLOG: u32 = 5;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How a connection ended, short of a transport failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Authenticated and the whole batch answered
    Completed { username: String, vectors: u32 },
    /// Handshake refused the login
    Rejected { username: String, reason: Rejection },
    /// Dropped before the handshake by the connection quota
    Refused { peer: SocketAddr },
}

impl SessionOutcome {
    /// Process exit status for single-connection mode
    pub fn exit_code(&self) -> u8 {
        match self {
            SessionOutcome::Completed { .. } => 0,
            SessionOutcome::Rejected { .. } | SessionOutcome::Refused { .. } => 1,
        }
    }
}

/// Read-only state shared by every connection
struct ConnectionContext {
    config: ServerConfig,
    credentials: CredentialStore,
    journal: Journal,
    quota: ConnectionQuota,
}

/// Listening server
pub struct ComputeServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: Arc<ConnectionContext>,
}

impl ComputeServer {
    /// Create, bind and listen on the configured address
    ///
    /// Failures are journalled with the OS error before being returned.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let journal = Journal::new(&config.log_path);
        let addr = config.socket_addr();

        let listener = match Self::listen(addr) {
            Ok(listener) => listener,
            Err(e) => {
                journal.error(format!("{:#}", e)).await;
                return Err(e);
            }
        };
        let local_addr = listener.local_addr().context("local address")?;
        tracing::info!("Server listening on {}", local_addr);
        tracing::info!("Error journal: {}", journal.path().display());

        Ok(Self {
            listener,
            local_addr,
            ctx: Arc::new(ConnectionContext {
                credentials: CredentialStore::new(&config.credentials_path),
                journal,
                quota: ConnectionQuota::new(),
                config,
            }),
        })
    }

    fn listen(addr: SocketAddr) -> Result<TcpListener> {
        let socket = TcpSocket::new_v4().context("socket create")?;
        #[cfg(unix)]
        socket.set_reuseaddr(true).context("socket options")?;
        socket
            .bind(addr)
            .with_context(|| format!("bind {}", addr))?;
        socket.listen(LISTEN_BACKLOG).context("listen")
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept exactly one connection, serve it and close the listener
    pub async fn serve_once(self) -> Result<SessionOutcome> {
        let (stream, peer) = match self.listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                self.ctx.journal.error(format!("accept: {}", e)).await;
                return Err(e).context("accept");
            }
        };
        let outcome = Self::handle_connection(stream, peer, Arc::clone(&self.ctx)).await;
        drop(self.listener);
        outcome
    }

    /// Accept connections until `shutdown` resolves, one task per connection
    ///
    /// Sessions still running at shutdown are aborted and journalled.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut sessions = JoinSet::new();
        let mut prune = tokio::time::interval(PRUNE_INTERVAL);
        prune.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let ctx = Arc::clone(&self.ctx);
                            sessions.spawn(async move {
                                match Self::handle_connection(stream, peer, ctx).await {
                                    Ok(outcome) => tracing::info!("Connection {} finished: {:?}", peer, outcome),
                                    Err(e) => tracing::debug!("Connection {} failed: {:#}", peer, e),
                                }
                            });
                        }
                        Err(e) => {
                            self.ctx.journal.error(format!("accept: {}", e)).await;
                            // EMFILE and similar errors persist across retries
                            tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                        }
                    }
                }
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!("Connection task failed: {}", e);
                    }
                }
                _ = prune.tick() => self.ctx.quota.prune(),
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        if !sessions.is_empty() {
            self.ctx
                .journal
                .error(format!("shutdown: aborting {} active connection(s)", sessions.len()))
                .await;
            sessions.shutdown().await;
        }
        Ok(())
    }

    /// Serve one client, journalling any transport or protocol failure
    async fn handle_connection(
        stream: TcpStream,
        peer: SocketAddr,
        ctx: Arc<ConnectionContext>,
    ) -> Result<SessionOutcome> {
        tracing::info!("Connection from {}", peer);

        if let Err(e) = ctx.quota.admit(peer.ip()) {
            ctx.journal
                .error(format!("connection from {} refused: {}", peer, e))
                .await;
            return Ok(SessionOutcome::Refused { peer });
        }

        let mut framed = FramedStream::new(BufStream::new(stream), ctx.config.io_timeout);
        let result = Self::run_session(&mut framed, peer, &ctx).await;

        if let Err(e) = &result {
            ctx.journal.error(format!("connection {}: {:#}", peer, e)).await;
        }
        if let Err(e) = framed.shutdown().await {
            tracing::debug!("Shutdown of {} failed: {}", peer, e);
        }
        result
    }

    async fn run_session(
        framed: &mut FramedStream<BufStream<TcpStream>>,
        peer: SocketAddr,
        ctx: &ConnectionContext,
    ) -> Result<SessionOutcome> {
        let challenge = if ctx.config.fresh_salt {
            Challenge::fresh()
        } else {
            Challenge::fixed()
        };

        let outcome = Handshake::new(&ctx.credentials, &ctx.journal, challenge)
            .run(framed)
            .await?;

        match outcome {
            HandshakeOutcome::Authenticated { username } => {
                let vectors = serve_batch(framed, ctx.config.limits).await?;
                tracing::info!("Served {} vectors for {} ({})", vectors, username, peer);
                Ok(SessionOutcome::Completed { username, vectors })
            }
            HandshakeOutcome::Rejected { username, reason } => {
                Ok(SessionOutcome::Rejected { username, reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadsum_core::{ComputeClient, CoreError, LoginOutcome, VectorLimits};
    use std::io::Write;
    use std::net::Ipv4Addr;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const TIMEOUT: Option<Duration> = Some(Duration::from_secs(10));

    struct Fixture {
        _creds: NamedTempFile,
        dir: TempDir,
        config: ServerConfig,
    }

    fn fixture() -> Fixture {
        let mut creds = NamedTempFile::new().unwrap();
        creds.write_all(b"# users\nalice:secret123\n").unwrap();
        creds.flush().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            credentials_path: creds.path().to_path_buf(),
            journal_path: dir.path().join("journal.log"),
            log_path: dir.path().join("journal.txt"),
            bind_address: Ipv4Addr::LOCALHOST,
            port: 0,
            io_timeout: TIMEOUT,
            limits: VectorLimits::default(),
            keep_serving: false,
            fresh_salt: false,
        };
        Fixture {
            _creds: creds,
            dir,
            config,
        }
    }

    impl Fixture {
        fn journal(&self) -> String {
            std::fs::read_to_string(self.dir.path().join("journal.txt")).unwrap_or_default()
        }
    }

    async fn connect(addr: SocketAddr) -> ComputeClient<TcpStream> {
        ComputeClient::new(TcpStream::connect(addr).await.unwrap(), TIMEOUT)
    }

    #[tokio::test]
    async fn test_full_session() {
        let fx = fixture();
        let server = ComputeServer::bind(fx.config.clone()).await.unwrap();
        let addr = server.local_addr();
        let handle = tokio::spawn(server.serve_once());

        let mut client = connect(addr).await;
        assert_eq!(
            client.login("alice", "secret123").await.unwrap(),
            LoginOutcome::Accepted
        );
        assert_eq!(client.compute_batch(&[vec![1, 2, 3]]).await.unwrap(), vec![14]);

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::Completed {
                username: "alice".into(),
                vectors: 1
            }
        );
        assert_eq!(outcome.exit_code(), 0);
        assert!(fx.journal().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_closes_with_failure() {
        let fx = fixture();
        let server = ComputeServer::bind(fx.config.clone()).await.unwrap();
        let addr = server.local_addr();
        let handle = tokio::spawn(server.serve_once());

        let mut client = connect(addr).await;
        assert_eq!(
            client.login("bob", "secret123").await.unwrap(),
            LoginOutcome::UnknownUser
        );

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.exit_code(), 1);

        // Nothing follows the rejection
        let mut rest = Vec::new();
        client.into_inner().read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert!(fx.journal().contains("ERROR: user not found: bob"));
    }

    #[tokio::test]
    async fn test_wrong_secret_closes_with_failure() {
        let fx = fixture();
        let server = ComputeServer::bind(fx.config.clone()).await.unwrap();
        let addr = server.local_addr();
        let handle = tokio::spawn(server.serve_once());

        let mut client = connect(addr).await;
        assert_eq!(
            client.login("alice", "wrong").await.unwrap(),
            LoginOutcome::WrongSecret
        );

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::Rejected {
                username: "alice".into(),
                reason: Rejection::WrongDigest
            }
        );
        assert!(fx.journal().contains("wrong hash for user alice"));
    }

    #[tokio::test]
    async fn test_listener_closed_after_single_session() {
        let fx = fixture();
        let server = ComputeServer::bind(fx.config.clone()).await.unwrap();
        let addr = server.local_addr();
        let handle = tokio::spawn(server.serve_once());

        let mut client = connect(addr).await;
        client.login("bob", "x").await.unwrap();
        handle.await.unwrap().unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_batch_is_journalled() {
        let fx = fixture();
        let server = ComputeServer::bind(fx.config.clone()).await.unwrap();
        let addr = server.local_addr();
        let handle = tokio::spawn(server.serve_once());

        let mut client = connect(addr).await;
        client.login("alice", "secret123").await.unwrap();
        client.begin_batch(2).await.unwrap();
        assert_eq!(client.compute(&[2, 3]).await.unwrap(), 13);
        let mut stream = client.into_inner();
        stream.write_all(&2u32.to_le_bytes()).await.unwrap();
        drop(stream);

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.downcast_ref::<CoreError>().unwrap().is_transport());
        assert!(fx.journal().contains("recv (element 0 of vector 1)"));
    }

    #[tokio::test]
    async fn test_bind_failure_is_journalled() {
        let fx = fixture();
        let first = ComputeServer::bind(fx.config.clone()).await.unwrap();

        let mut config = fx.config.clone();
        config.port = first.local_addr().port();
        let err = ComputeServer::bind(config).await.err().unwrap();

        assert!(format!("{:#}", err).starts_with("bind 127.0.0.1:"));
        assert!(fx.journal().contains("ERROR: bind 127.0.0.1:"));
    }

    #[tokio::test]
    async fn test_keep_serving_handles_concurrent_clients() {
        let fx = fixture();
        let mut config = fx.config.clone();
        config.keep_serving = true;
        let server = ComputeServer::bind(config).await.unwrap();
        let addr = server.local_addr();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async move {
            let _ = stop_rx.await;
        }));

        let mut tasks = Vec::new();
        for i in 1..=4 {
            tasks.push(tokio::spawn(async move {
                let mut client = connect(addr).await;
                assert_eq!(
                    client.login("alice", "secret123").await.unwrap(),
                    LoginOutcome::Accepted
                );
                client.compute_batch(&[vec![i, i], vec![]]).await.unwrap()
            }));
        }
        for (i, task) in (1..=4).zip(tasks) {
            assert_eq!(task.await.unwrap(), vec![2 * i * i, 0]);
        }

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_rejections_do_not_lock_out_valid_user() {
        let fx = fixture();
        let server = ComputeServer::bind(fx.config.clone()).await.unwrap();
        let addr = server.local_addr();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async move {
            let _ = stop_rx.await;
        }));

        for _ in 0..3 {
            let mut client = connect(addr).await;
            assert_eq!(
                client.login("alcie", "secret123").await.unwrap(),
                LoginOutcome::UnknownUser
            );
        }
        for _ in 0..3 {
            let mut client = connect(addr).await;
            assert_eq!(
                client.login("alice", "wrong").await.unwrap(),
                LoginOutcome::WrongSecret
            );
        }

        let mut client = connect(addr).await;
        assert_eq!(
            client.login("alice", "secret123").await.unwrap(),
            LoginOutcome::Accepted
        );
        assert_eq!(client.compute_batch(&[vec![5]]).await.unwrap(), vec![25]);

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert!(!fx.journal().contains("refused"));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_active_sessions() {
        let fx = fixture();
        let server = ComputeServer::bind(fx.config.clone()).await.unwrap();
        let addr = server.local_addr();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async move {
            let _ = stop_rx.await;
        }));

        // Authenticated, then idle while the server waits for the vector count
        let mut client = connect(addr).await;
        assert_eq!(
            client.login("alice", "secret123").await.unwrap(),
            LoginOutcome::Accepted
        );

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert!(fx
            .journal()
            .contains("ERROR: shutdown: aborting 1 active connection(s)"));

        let mut rest = Vec::new();
        let _ = client.into_inner().read_to_end(&mut rest).await;
        assert!(rest.is_empty());
    }
}

//! TCP acceptor.
//!
//! Binds the listening socket and spawns one [`Session`] task per accepted
//! connection. The accept loop never waits on a session, so a stalled peer
//! cannot hold up new connections.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use wsecho_protocol::constants::{DEFAULT_PORT, HANDSHAKE_BUFFER_SIZE};

use crate::ServerError;
use crate::handler::Handler;
use crate::session::{Session, SessionLimits};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Size of the single receive that must hold the upgrade request.
    pub handshake_buffer: usize,
    /// Per-operation idle deadline; `None` keeps sessions open indefinitely.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            handshake_buffer: HANDSHAKE_BUFFER_SIZE,
            idle_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Rejects settings no session could work with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.handshake_buffer == 0 {
            return Err(ServerError::InvalidConfig(
                "handshake_buffer must be greater than zero",
            ));
        }
        Ok(())
    }

    fn limits(&self) -> SessionLimits {
        SessionLimits {
            handshake_buffer: self.handshake_buffer,
            idle_timeout: self.idle_timeout,
        }
    }
}

/// The echo server.
pub struct EchoServer<H: Handler> {
    config: ServerConfig,
    handler: Arc<H>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl<H: Handler> EchoServer<H> {
    pub fn new(config: ServerConfig, handler: H) -> Arc<Self> {
        Arc::new(Self {
            config,
            handler: Arc::new(handler),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Stops accepting and cancels every live session.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the accept loop until [`shutdown`](Self::shutdown).
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        self.config.validate()?;
        let addr = SocketAddr::new(self.config.bind, self.config.port);
        let listener = TcpListener::bind(addr).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!("echo server listening on {local_addr}");

        let limits = self.config.limits();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            tracing::debug!(%peer_addr, "connection accepted");
                            let handler = Arc::clone(&self.handler);
                            let session = Session::new(stream, peer_addr, limits, self.cancel.child_token());
                            tokio::spawn(async move {
                                session.run(&*handler).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }
}

//! Per-connection session loop.
//!
//! ```text
//! AwaitingHandshake -> Upgraded -> (ExchangingFrames)* -> Closed
//! ```
//!
//! A session owns its stream for its whole life. The only suspension
//! points are the receive and the write; both go through [`Suspend`], which
//! races them against the server's cancellation token and an optional
//! idle deadline. `Closed` is terminal: [`Session::run`] consumes the
//! session, shuts the stream down and drops it.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wsecho_protocol::constants::HANDSHAKE_BUFFER_SIZE;
use wsecho_protocol::{BAD_REQUEST_RESPONSE, WsError, negotiate, read_frame, write_frame};

use crate::handler::Handler;

/// Lifecycle of one connection. Transitions are traced at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    AwaitingHandshake,
    Upgraded,
    ExchangingFrames,
    Closed,
}

/// Why a session reached `Closed`.
#[derive(Debug, thiserror::Error)]
pub enum CloseReason {
    /// `Upgrade: websocket` was absent; nothing was sent back.
    #[error("not a websocket upgrade request")]
    NotAnUpgrade,

    /// The key was absent or empty; a 400 response was sent.
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("connection closed by peer")]
    PeerClosed,

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("reply too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("idle timeout elapsed")]
    TimedOut,

    #[error("session cancelled")]
    Cancelled,
}

impl CloseReason {
    /// Returns `true` for endings worth a warning.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            CloseReason::Transport(_) | CloseReason::MessageTooLarge(_) | CloseReason::TimedOut
        )
    }
}

impl From<WsError> for CloseReason {
    fn from(err: WsError) -> Self {
        match err {
            WsError::Transport(e) => CloseReason::Transport(e),
            WsError::ConnectionClosed => CloseReason::PeerClosed,
            WsError::NotAnUpgradeRequest => CloseReason::NotAnUpgrade,
            WsError::MissingKey => CloseReason::MissingKey,
            WsError::MessageTooLarge(len) => CloseReason::MessageTooLarge(len),
        }
    }
}

/// Per-session knobs taken from the server configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Size of the single receive that must hold the upgrade request.
    pub handshake_buffer: usize,
    /// Deadline for each receive or write. `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            handshake_buffer: HANDSHAKE_BUFFER_SIZE,
            idle_timeout: None,
        }
    }
}

/// Cancellable wrapper around a suspension point.
struct Suspend {
    cancel: CancellationToken,
    idle_timeout: Option<Duration>,
}

impl Suspend {
    async fn run<F: Future>(&self, fut: F) -> Result<F::Output, CloseReason> {
        let bounded = async {
            match self.idle_timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| CloseReason::TimedOut),
                None => Ok(fut.await),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CloseReason::Cancelled),
            result = bounded => result,
        }
    }
}

/// One accepted connection.
pub struct Session<S> {
    stream: S,
    peer: SocketAddr,
    state: SessionState,
    handshake_buffer: usize,
    suspend: Suspend,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    pub fn new(
        stream: S,
        peer: SocketAddr,
        limits: SessionLimits,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream,
            peer,
            state: SessionState::AwaitingHandshake,
            handshake_buffer: limits.handshake_buffer,
            suspend: Suspend {
                cancel,
                idle_timeout: limits.idle_timeout,
            },
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(peer = %self.peer, from = ?self.state, to = ?next, "session state");
            self.state = next;
        }
    }

    /// Drives the connection until it closes and reports why.
    pub async fn run<H: Handler>(mut self, handler: &H) -> CloseReason {
        let reason = match self.upgrade().await {
            Ok(()) => loop {
                if let Err(reason) = self.exchange(handler).await {
                    break reason;
                }
            },
            Err(reason) => reason,
        };

        let peer = self.peer;
        self.release(&reason).await;
        handler.on_session_closed(peer, &reason);
        reason
    }

    /// `AwaitingHandshake`: one receive, then 101, 400 or silence.
    async fn upgrade(&mut self) -> Result<(), CloseReason> {
        let mut buf = vec![0u8; self.handshake_buffer];
        let n = self.suspend.run(self.stream.read(&mut buf)).await??;
        if n == 0 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }

        let handshake = match negotiate(&buf[..n]) {
            Ok(handshake) => handshake,
            Err(WsError::MissingKey) => {
                if let Err(e) = self.send(BAD_REQUEST_RESPONSE).await {
                    debug!(peer = %self.peer, "failed to send 400 response: {e}");
                }
                return Err(CloseReason::MissingKey);
            }
            Err(e) => return Err(e.into()),
        };

        self.send(handshake.response().as_bytes()).await?;
        self.transition(SessionState::Upgraded);
        info!(peer = %self.peer, "WebSocket connection established");
        Ok(())
    }

    /// One request/reply round trip.
    async fn exchange<H: Handler>(&mut self, handler: &H) -> Result<(), CloseReason> {
        let payload = self.suspend.run(read_frame(&mut self.stream)).await??;
        self.transition(SessionState::ExchangingFrames);
        debug!(
            peer = %self.peer,
            len = payload.len(),
            text = %String::from_utf8_lossy(&payload),
            "frame received"
        );

        let reply = handler.on_message(payload);
        self.suspend
            .run(write_frame(&mut self.stream, &reply))
            .await??;
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), CloseReason> {
        let stream = &mut self.stream;
        self.suspend
            .run(async move {
                stream.write_all(bytes).await?;
                stream.flush().await?;
                Ok::<_, io::Error>(())
            })
            .await??;
        Ok(())
    }

    /// `Closed`: the only place the stream is released.
    async fn release(mut self, reason: &CloseReason) {
        self.transition(SessionState::Closed);
        let peer = self.peer;

        match reason {
            CloseReason::PeerClosed => info!(%peer, "connection closed"),
            CloseReason::Cancelled => info!(%peer, "session cancelled by server shutdown"),
            reason if reason.is_fault() => warn!(%peer, %reason, "session terminated"),
            reason => warn!(%peer, %reason, "upgrade rejected"),
        }

        // Best-effort: the peer may already be gone.
        let _ = self.stream.shutdown().await;
    }
}

//! The persistent outbound TCP session.
//!
//! [`SessionManager`] owns at most one connection.  While started it runs a
//! reconnect loop on its own task:
//!
//! ```text
//!            start(mode)
//!   Idle ───────────────► Connecting ──connect ok──► Connected
//!    ▲                      ▲    │                      │
//!    │                      │    └─connect failed─┐     │ peer close /
//!    │ stop()               │                     │     │ read error
//!    │                      └──── sleep(backoff) ◄┴─────┘
//!  Draining ◄── stop() from any state
//! ```
//!
//! Outbound envelopes are written newline-terminated.  Inbound bytes go
//! through a [`FrameDecoder`]; every decoded envelope is forwarded on the
//! command channel and malformed input is logged and dropped without closing
//! the connection.
//!
//! `stop()` is idempotent and may be called from any task.  A `send()` stuck
//! behind a peer that stopped reading is cancelled, so `stop()` always
//! releases the socket.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gpio_core::{ConfigurationRecord, Envelope, FrameDecoder, SessionMode};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::application::dispatch::{SessionTransport, TransportError};

/// Delay between a failed or closed connection and the next attempt.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Size of a single socket read.
const READ_CHUNK: usize = 128;

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started, or stopped.
    Idle,
    /// Attempting to connect, or waiting out the backoff.
    Connecting,
    /// A connection is established and `send` will write to it.
    Connected,
    /// `stop()` is tearing the session down.
    Draining,
}

/// Why an established connection ended.
#[derive(Debug, Error)]
enum SessionError {
    #[error("connection closed by peer")]
    Closed,
    #[error("receive failed: {0}")]
    Io(#[from] io::Error),
}

struct Shared {
    state: watch::Sender<SessionState>,
    writer: Mutex<Option<Connection>>,
    /// `true` while no write may proceed.  Flipping it cancels writes in
    /// flight.
    writes_closed: watch::Sender<bool>,
    commands: mpsc::Sender<Envelope>,
    backoff: Duration,
}

/// Write side of an established connection and the mode it was opened in.
struct Connection {
    mode: SessionMode,
    half: OwnedWriteHalf,
}

struct RunningSession {
    mode: SessionMode,
    id: Uuid,
    handle: JoinHandle<()>,
}

/// Owns the single outbound session and its reconnect loop.
pub struct SessionManager {
    shared: Arc<Shared>,
    lifecycle: Mutex<Option<RunningSession>>,
}

impl SessionManager {
    /// Creates an idle manager.  Inbound envelopes are delivered on `commands`.
    pub fn new(commands: mpsc::Sender<Envelope>) -> Self {
        Self::with_backoff(commands, RECONNECT_BACKOFF)
    }

    pub fn with_backoff(commands: mpsc::Sender<Envelope>, backoff: Duration) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (writes_closed, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                state,
                writer: Mutex::new(None),
                writes_closed,
                commands,
                backoff,
            }),
            lifecycle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// The mode of the running session, if any.
    pub async fn active_mode(&self) -> Option<SessionMode> {
        self.lifecycle.lock().await.as_ref().map(|running| running.mode)
    }

    /// Starts the session in `mode`.
    ///
    /// A session already running in the same mode is left alone; one running
    /// in a different mode is stopped first.
    pub async fn start(&self, mode: SessionMode) {
        let mut lifecycle = self.lifecycle.lock().await;

        if let Some(running) = lifecycle.as_ref() {
            if running.mode == mode && !running.handle.is_finished() {
                debug!("session {} already running in {} mode", running.id, mode.kind());
                return;
            }
        }
        self.stop_locked(&mut lifecycle).await;

        let id = Uuid::new_v4();
        let span = info_span!("session", %id, mode = mode.kind(), target = %mode.target());
        self.shared.state.send_replace(SessionState::Connecting);
        let handle = tokio::spawn(run_session(Arc::clone(&self.shared), mode).instrument(span));
        info!("session {id} started in {} mode towards {}", mode.kind(), mode.target());

        *lifecycle = Some(RunningSession { mode, id, handle });
    }

    /// Stops the session and releases the connection.  Safe to call twice
    /// and from any task.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.stop_locked(&mut lifecycle).await;
    }

    async fn stop_locked(&self, lifecycle: &mut Option<RunningSession>) {
        if let Some(running) = lifecycle.take() {
            self.shared.state.send_replace(SessionState::Draining);
            running.handle.abort();
            let _ = running.handle.await;
            info!("session {} stopped", running.id);
        }

        // The task is gone, so nothing reopens writes; any send still
        // holding the writer gives it up.
        self.shared.writes_closed.send_replace(true);
        let connection = self.shared.writer.lock().await.take();
        if let Some(mut connection) = connection {
            let _ = connection.half.shutdown().await;
        }
        self.shared.state.send_replace(SessionState::Idle);
    }

    /// Writes one envelope, newline-terminated, on whatever session is
    /// connected.  Used for replies.
    ///
    /// # Errors
    ///
    /// - [`TransportError::NotConnected`] unless the session is connected.
    /// - [`TransportError::Io`] if the write fails or the connection is torn
    ///   down while the write is pending.  A failed write is left for the
    ///   read side to detect.
    pub async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.write(None, payload).await
    }

    /// Like [`SessionManager::send`], but only if the connected session was
    /// opened in `mode`.
    ///
    /// # Errors
    ///
    /// As [`SessionManager::send`], plus [`TransportError::ModeMismatch`]
    /// when the live connection belongs to a different mode.
    pub async fn send_as(&self, mode: SessionMode, payload: &[u8]) -> Result<(), TransportError> {
        self.write(Some(mode), payload).await
    }

    async fn write(&self, expected: Option<SessionMode>, payload: &[u8]) -> Result<(), TransportError> {
        let mut closed = self.shared.writes_closed.subscribe();
        let mut guard = tokio::select! {
            guard = self.shared.writer.lock() => guard,
            () = writes_closed(&mut closed) => return Err(TransportError::NotConnected),
        };
        let connection = guard.as_mut().ok_or(TransportError::NotConnected)?;
        if expected.is_some_and(|mode| mode != connection.mode) {
            return Err(TransportError::ModeMismatch);
        }

        let mut line = Vec::with_capacity(payload.len() + 1);
        line.extend_from_slice(payload);
        line.push(b'\n');

        tokio::select! {
            written = connection.half.write_all(&line) => {
                written.map_err(|e| TransportError::Io(e.to_string()))
            }
            () = writes_closed(&mut closed) => {
                Err(TransportError::Io("connection closed while writing".to_string()))
            }
        }
    }

    /// Keeps the session in line with the configuration until the
    /// configuration channel closes.
    ///
    /// The session is restarted only when the resolved [`SessionMode`]
    /// changes (kind or endpoint); it is stopped when no session transport
    /// is enabled.
    pub async fn supervise(self: Arc<Self>, mut config: watch::Receiver<Arc<ConfigurationRecord>>) {
        loop {
            let mode = config.borrow_and_update().session_mode();
            match mode {
                Some(mode) => self.start(mode).await,
                None => {
                    if self.active_mode().await.is_some() {
                        info!("no session transport enabled; stopping session");
                    }
                    self.stop().await;
                }
            }

            if config.changed().await.is_err() {
                break;
            }
        }
        debug!("session supervisor stopped");
    }
}

#[async_trait]
impl SessionTransport for SessionManager {
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        SessionManager::send(self, payload).await
    }

    async fn send_as(&self, mode: SessionMode, payload: &[u8]) -> Result<(), TransportError> {
        SessionManager::send_as(self, mode, payload).await
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(running) = self.lifecycle.get_mut().take() {
            running.handle.abort();
        }
    }
}

async fn run_session(shared: Arc<Shared>, mode: SessionMode) {
    let target = mode.target();

    loop {
        shared.state.send_replace(SessionState::Connecting);

        match TcpStream::connect(target).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP_NODELAY not set: {e}");
                }
                let (reader, half) = stream.into_split();
                {
                    let mut writer = shared.writer.lock().await;
                    *writer = Some(Connection { mode, half });
                    shared.writes_closed.send_replace(false);
                }
                shared.state.send_replace(SessionState::Connected);
                info!("connected to {target}");

                let reason = read_loop(&shared, reader).await;

                shared.writes_closed.send_replace(true);
                let connection = shared.writer.lock().await.take();
                if let Some(mut connection) = connection {
                    let _ = connection.half.shutdown().await;
                }
                shared.state.send_replace(SessionState::Connecting);
                info!("{reason}; reconnecting in {:?}", shared.backoff);
            }
            Err(e) => {
                warn!("could not connect to {target}: {e}; retrying in {:?}", shared.backoff);
            }
        }

        time::sleep(shared.backoff).await;
    }
}

/// Resolves once writes are closed.
async fn writes_closed(closed: &mut watch::Receiver<bool>) {
    loop {
        let is_closed = *closed.borrow_and_update();
        if is_closed {
            return;
        }
        if closed.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn read_loop(shared: &Shared, mut reader: OwnedReadHalf) -> SessionError {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return SessionError::Closed,
            Ok(n) => n,
            Err(e) => return SessionError::from(e),
        };

        for decoded in decoder.push(&buf[..n]) {
            match decoded {
                Ok(envelope) => {
                    debug!("received {:?}", envelope.event);
                    if shared.commands.send(envelope).await.is_err() {
                        debug!("command receiver gone; inbound envelope dropped");
                    }
                }
                Err(e) => warn!("malformed inbound payload dropped: {e}"),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

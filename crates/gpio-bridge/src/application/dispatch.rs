//! Dispatcher: routes input changes out and inbound commands in.
//!
//! # Outbound routing
//!
//! For every debounced [`InputChange`] the dispatcher takes one configuration
//! snapshot and then:
//!
//! - **companion mode enabled**: sends one envelope through the session with
//!   empty credentials and does nothing else;
//! - **otherwise**: sends through the session (TCP credentials) if the TCP
//!   transport is enabled, submits an HTTP POST (HTTP credentials) if the
//!   HTTP transport is enabled, and records the envelope in the local log
//!   (no credentials) if the local log is enabled.
//!
//! Credentials are never mixed across transports.  A failure on one transport
//! is logged and does not stop the others.
//!
//! # Inbound commands
//!
//! `GPO-<n>` with `HIGH`/`LOW` drives an output through the [`ChannelBank`];
//! `sync`/`request` answers with a full-state `sync-response` on the session.
//! Anything else is rejected and logged.

use std::sync::Arc;

use async_trait::async_trait;
use gpio_core::{
    encode_event, encode_sync, ChannelBank, ChannelError, CodecError, Command, CommandError,
    ConfigurationRecord, Envelope, InputChange, Level, SessionMode,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Failure reported by the persistent session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("session is not connected")]
    NotConnected,
    #[error("session is connected in a different mode")]
    ModeMismatch,
    #[error("session write failed: {0}")]
    Io(String),
}

/// The persistent outbound session.
///
/// Infrastructure implementation is the TCP `SessionManager`; tests record
/// calls.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Writes one encoded envelope.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] when no session is established.
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Writes one encoded envelope only if the live session was opened in
    /// `mode`, so credentials never reach a peer of the other mode while a
    /// restart is pending.
    ///
    /// # Errors
    ///
    /// As [`SessionTransport::send`], plus [`TransportError::ModeMismatch`].
    async fn send_as(&self, mode: SessionMode, payload: &[u8]) -> Result<(), TransportError>;
}

/// Fire-and-forget HTTP notification.  Implementations must not block the
/// caller on the network.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationTransport: Send + Sync {
    fn submit(&self, url: &str, secure: bool, payload: Vec<u8>);
}

/// Local record of outbound events.
pub trait EventLogSink: Send + Sync {
    fn record(&self, payload: &[u8]);
}

/// Transport an input change was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Companion,
    Session,
    Http,
    LocalLog,
}

/// What an accepted inbound command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    OutputSet { index: usize, level: Level },
    SyncSent,
}

/// Why an inbound command was not carried out.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("could not encode reply: {0}")]
    Codec(#[from] CodecError),
    #[error("could not send reply: {0}")]
    Transport(#[from] TransportError),
}

/// Routes input changes to transports and commands to the channel bank.
pub struct Dispatcher {
    config: watch::Receiver<Arc<ConfigurationRecord>>,
    bank: Arc<ChannelBank>,
    session: Arc<dyn SessionTransport>,
    notifier: Arc<dyn NotificationTransport>,
    log: Arc<dyn EventLogSink>,
}

impl Dispatcher {
    pub fn new(
        config: watch::Receiver<Arc<ConfigurationRecord>>,
        bank: Arc<ChannelBank>,
        session: Arc<dyn SessionTransport>,
        notifier: Arc<dyn NotificationTransport>,
        log: Arc<dyn EventLogSink>,
    ) -> Self {
        Self {
            config,
            bank,
            session,
            notifier,
            log,
        }
    }

    /// Fans one input change out to the enabled transports.
    ///
    /// Returns the routes that were attempted, in order.
    pub async fn handle_input_change(&self, change: InputChange) -> Vec<Route> {
        let config = Arc::clone(&self.config.borrow());
        let name = change.channel_name();
        let state = change.level.as_str();

        let mode = config.session_mode();

        if let Some(mode @ SessionMode::Companion(target)) = mode {
            debug!("{name} {state} -> companion {target}");
            self.send_session(Route::Companion, mode, &name, state, "", "").await;
            return vec![Route::Companion];
        }

        let mut routes = Vec::new();

        // Companion is ruled out above, so a mode here means TCP is enabled.
        if let Some(mode @ SessionMode::Regular(_)) = mode {
            let tcp = &config.tcp;
            self.send_session(Route::Session, mode, &name, state, &tcp.user, &tcp.password)
                .await;
            routes.push(Route::Session);
        }

        if config.http.enabled {
            match encode_event(&name, state, &config.http.user, &config.http.password) {
                Ok(payload) => self.notifier.submit(&config.http.url, config.http.secure, payload),
                Err(e) => error!("{name}: HTTP envelope not built: {e}"),
            }
            routes.push(Route::Http);
        }

        if config.local_log.enabled {
            match encode_event(&name, state, "", "") {
                Ok(payload) => self.log.record(&payload),
                Err(e) => error!("{name}: log envelope not built: {e}"),
            }
            routes.push(Route::LocalLog);
        }

        if routes.is_empty() {
            debug!("{name} {state}: no transport enabled");
        }
        routes
    }

    async fn send_session(
        &self,
        route: Route,
        mode: SessionMode,
        name: &str,
        state: &str,
        user: &str,
        password: &str,
    ) {
        let payload = match encode_event(name, state, user, password) {
            Ok(payload) => payload,
            Err(e) => {
                error!("{name}: {route:?} envelope not built: {e}");
                return;
            }
        };
        if let Err(e) = self.session.send_as(mode, &payload).await {
            warn!("{name}: {route:?} send failed: {e}");
        }
    }

    /// Carries out one inbound command envelope.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Command`] for an unknown event, an out-of-range
    ///   output, or an unsupported state.  No output is touched.
    /// - [`DispatchError::Codec`] / [`DispatchError::Transport`] if a sync
    ///   response could not be built or sent.
    pub async fn handle_command(&self, envelope: &Envelope) -> Result<CommandOutcome, DispatchError> {
        match Command::from_envelope(envelope)? {
            Command::SetOutput { index, level } => {
                self.bank.set_output(index, level)?;
                info!("{} set {level}", envelope.event);
                Ok(CommandOutcome::OutputSet { index, level })
            }
            Command::SyncRequest => {
                let payload = encode_sync(&self.bank.input_levels(), &self.bank.output_levels())?;
                self.session.send(&payload).await?;
                debug!("sync-response sent");
                Ok(CommandOutcome::SyncSent)
            }
        }
    }

    /// Serves both queues until both are closed.
    pub async fn run(
        self,
        mut changes: mpsc::Receiver<InputChange>,
        mut commands: mpsc::Receiver<Envelope>,
    ) {
        loop {
            tokio::select! {
                Some(change) = changes.recv() => {
                    self.handle_input_change(change).await;
                }
                Some(envelope) = commands.recv() => {
                    if let Err(e) = self.handle_command(&envelope).await {
                        warn!("command {:?} rejected: {e}", envelope.event);
                    }
                }
                else => break,
            }
        }
        info!("dispatcher stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

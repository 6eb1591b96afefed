//! The envelope exchanged on every transport, and the commands it can carry.
//!
//! An envelope is a flat JSON object:
//!
//! ```json
//! {"event":"GPI-3","state":"HIGH","user":"op","password":"secret"}
//! ```
//!
//! Outbound, `event` names the input that changed.  Inbound, `event` is either
//! an output name (`GPO-<n>`, with `state` = `HIGH`/`LOW`) or the control
//! keyword `sync` (with `state` = `request`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::channel::{ChannelError, ChannelId, Direction, Level};

/// Control keyword for a full-state resynchronisation request.
pub const SYNC_EVENT: &str = "sync";

/// `state` value that accompanies [`SYNC_EVENT`].
pub const SYNC_REQUEST_STATE: &str = "request";

/// A decoded envelope.  `state`, `user`, and `password` are empty when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Envelope {
    pub fn new(
        event: impl Into<String>,
        state: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            event: event.into(),
            state: state.into(),
            user: user.into(),
            password: password.into(),
        }
    }
}

/// Why an inbound envelope could not be turned into a [`Command`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognised command event {0:?}")]
    UnknownEvent(String),

    #[error("command {event:?} addresses a channel that does not exist: {source}")]
    OutputOutOfRange {
        event: String,
        #[source]
        source: ChannelError,
    },

    #[error("command {event:?} carries unsupported state {state:?}")]
    InvalidState { event: String, state: String },
}

/// An actionable inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Drive the output at `index` (0-based) to `level`.
    SetOutput { index: usize, level: Level },
    /// Reply with the full channel state.
    SyncRequest,
}

impl Command {
    /// Interprets an inbound envelope.
    ///
    /// `{"event":"GPO-3","state":"HIGH"}` becomes
    /// `SetOutput { index: 2, level: High }`; `{"event":"sync","state":"request"}`
    /// becomes `SyncRequest`.  State strings are matched exactly.
    ///
    /// # Errors
    ///
    /// - [`CommandError::OutputOutOfRange`] for a well-formed `GPO-<n>` whose
    ///   `n` exceeds the output count.
    /// - [`CommandError::InvalidState`] for a recognised event with a state
    ///   other than the ones listed above.
    /// - [`CommandError::UnknownEvent`] for anything else, input names included.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, CommandError> {
        let event = envelope.event.as_str();

        if event == SYNC_EVENT {
            return if envelope.state == SYNC_REQUEST_STATE {
                Ok(Command::SyncRequest)
            } else {
                Err(CommandError::InvalidState {
                    event: event.to_string(),
                    state: envelope.state.clone(),
                })
            };
        }

        let channel = match ChannelId::parse(event) {
            Ok(id) if id.direction() == Direction::Output => id,
            Ok(_) | Err(ChannelError::UnknownName(_)) => {
                return Err(CommandError::UnknownEvent(event.to_string()))
            }
            Err(source @ ChannelError::OutOfRange { direction, .. }) => {
                return if direction == Direction::Output {
                    Err(CommandError::OutputOutOfRange {
                        event: event.to_string(),
                        source,
                    })
                } else {
                    Err(CommandError::UnknownEvent(event.to_string()))
                };
            }
        };

        let level = Level::from_wire(&envelope.state).ok_or_else(|| CommandError::InvalidState {
            event: event.to_string(),
            state: envelope.state.clone(),
        })?;

        Ok(Command::SetOutput {
            index: channel.index(),
            level,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

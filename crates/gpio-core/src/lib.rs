//! # gpio-core
//!
//! Shared library for the GPIO bridge containing the channel domain, the
//! per-channel debounce state machine, the device configuration schema, and
//! the JSON envelope codec.
//!
//! This crate has zero dependencies on sockets, async runtimes, or pin
//! hardware.  The `gpio-bridge` crate wires it to tokio, TCP, and HTTP.
//!
//! # Architecture overview
//!
//! The bridge watches 8 discrete inputs (`GPI-1` .. `GPI-8`) and drives 5
//! discrete outputs (`GPO-1` .. `GPO-5`).  Debounced input changes become
//! small JSON envelopes sent to a controller; the controller sends envelopes
//! back to set outputs or to ask for a full-state snapshot.
//!
//! - **`domain`** – Channels and their stable levels (`ChannelBank`), the
//!   `Debouncer` that turns raw level samples into stable changes, and the
//!   `ConfigurationRecord` that parameterises every transport.
//!
//! - **`protocol`** – The envelope types, the bounded JSON codec, and the
//!   stream framer that recovers complete JSON values from a byte stream.

pub mod domain;
pub mod protocol;

pub use domain::channel::{
    ChannelBank, ChannelError, ChannelId, Direction, InputChange, Level, OutputDriver,
    INPUT_COUNT, OUTPUT_COUNT,
};
pub use domain::config::{ConfigValidationError, ConfigurationRecord, SessionMode};
pub use domain::debounce::{DebounceOutcome, Debouncer, DEBOUNCE_WINDOW};
pub use protocol::codec::{decode, encode_event, encode_sync, CodecError, MAX_ENVELOPE_LEN};
pub use protocol::envelope::{Command, CommandError, Envelope};
pub use protocol::frame::FrameDecoder;

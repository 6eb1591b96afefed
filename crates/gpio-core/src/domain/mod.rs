//! Domain entities for the GPIO bridge.
//!
//! Pure state and rules with no I/O: which channels exist and what level they
//! are at, how a noisy raw signal becomes a stable level, and what the device
//! configuration looks like.
//!
//! Code in the bridge's application and infrastructure layers depends on this
//! module; nothing here depends on them.

/// Channel identities, levels, and the shared channel state holder.
pub mod channel;

/// The persisted device configuration record and its validation rules.
pub mod config;

/// Per-channel debounce state machine.
pub mod debounce;

//! gpio-bridge library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the bridge do?
//!
//! The bridge sits between a bank of discrete pins and a controller on the
//! network:
//!
//! 1. The [`application::input_monitor::InputMonitor`] turns raw edge
//!    notifications into debounced input changes.
//! 2. The [`application::dispatch::Dispatcher`] wraps each change in an
//!    envelope and fans it out to the enabled transports: the persistent
//!    TCP session, a one-shot HTTP POST, and the local event log.
//! 3. The [`infrastructure::network::session_manager::SessionManager`] keeps
//!    one outbound TCP session alive and hands inbound commands back to the
//!    dispatcher, which drives outputs or answers sync requests.
//! 4. The [`infrastructure::storage::config_store::ConfigStore`] holds the
//!    configuration record; applying a new record restarts whatever it
//!    affects.

/// Application layer: input monitoring and event/command dispatch.
pub mod application;

/// Infrastructure layer: sockets, HTTP, storage, pins, and the console.
pub mod infrastructure;

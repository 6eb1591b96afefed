//! Infrastructure layer for the bridge.
//!
//! Contains the concrete adapters: the TCP session, the HTTP notifier, the
//! local log sink, configuration storage, the pin backend, and the operator
//! console.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `gpio_core`, but MUST NOT be imported by the `application` layer.

pub mod console;
pub mod io;
pub mod log_sink;
pub mod network;
pub mod storage;

//! Application layer use cases for the bridge.
//!
//! Code here orchestrates `gpio_core` domain objects and talks to the outside
//! world only through the traits it defines (`InputReader`,
//! `SessionTransport`, `NotificationTransport`, `EventLogSink`).  It contains
//! no socket, HTTP, or file-system code.
//!
//! - **`input_monitor`** – Debounces every input channel and emits one
//!   `InputChange` per stable transition.
//! - **`dispatch`** – Routes input changes to transports and inbound
//!   commands to the channel bank.

pub mod dispatch;
pub mod input_monitor;

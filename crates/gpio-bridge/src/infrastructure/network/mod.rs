//! Network transports: the persistent TCP session and one-shot HTTP POSTs.

pub mod http_notifier;
pub mod session_manager;

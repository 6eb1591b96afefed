//! Local event log transport.
//!
//! Writes each outbound envelope as one line.  This is a data channel for an
//! operator watching the device, separate from `tracing` diagnostics.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::application::dispatch::EventLogSink;

/// Line-per-envelope sink over any writer.  Defaults to stdout.
pub struct ConsoleLogSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleLogSink {
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl EventLogSink for ConsoleLogSink {
    fn record(&self, payload: &[u8]) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let written = out
            .write_all(payload)
            .and_then(|()| out.write_all(b"\n"))
            .and_then(|()| out.flush());
        if let Err(e) = written {
            warn!("local event log write failed: {e}");
        }
    }
}

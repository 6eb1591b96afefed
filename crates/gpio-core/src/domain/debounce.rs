//! Per-channel debounce state machine.
//!
//! A [`Debouncer`] is fed raw level samples together with the time they were
//! taken.  It reports a [`DebounceOutcome::Changed`] exactly once per stable
//! transition: the raw level must hold, unchanged, for at least
//! [`DEBOUNCE_WINDOW`] and must differ from the last stable level.
//!
//! The debouncer owns no clock.  Callers pass `now` explicitly so that the
//! same code runs against wall-clock time in production and against a paused
//! runtime clock in tests.
//!
//! # Example
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use gpio_core::{DebounceOutcome, Debouncer, Level};
//!
//! let t0 = Instant::now();
//! let mut d = Debouncer::new(Level::Low, t0);
//!
//! assert_eq!(d.observe(Level::High, t0), DebounceOutcome::Pending);
//! assert_eq!(
//!     d.observe(Level::High, t0 + Duration::from_millis(50)),
//!     DebounceOutcome::Changed(Level::High)
//! );
//! assert_eq!(d.stable(), Level::High);
//! ```

use std::time::{Duration, Instant};

use super::channel::Level;

/// Minimum contiguous stability before a raw level becomes the stable level.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(50);

/// Result of one [`Debouncer::observe`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceOutcome {
    /// The raw level differs from the stable level but has not yet held for
    /// the full window.  Poll again.
    Pending,
    /// The raw level equals the stable level; nothing to do.
    Settled,
    /// The stable level just changed to this value.
    Changed(Level),
}

/// Debounce state for a single input channel.
#[derive(Debug, Clone)]
pub struct Debouncer {
    stable: Level,
    raw: Level,
    raw_since: Instant,
    window: Duration,
}

impl Debouncer {
    /// Starts with `initial` as both the stable and the raw level.
    pub fn new(initial: Level, now: Instant) -> Self {
        Self::with_window(initial, now, DEBOUNCE_WINDOW)
    }

    pub fn with_window(initial: Level, now: Instant, window: Duration) -> Self {
        Self {
            stable: initial,
            raw: initial,
            raw_since: now,
            window,
        }
    }

    /// Feeds one raw sample taken at `now`.
    ///
    /// A raw level different from the previous sample restarts the window.
    pub fn observe(&mut self, raw: Level, now: Instant) -> DebounceOutcome {
        if raw != self.raw {
            self.raw = raw;
            self.raw_since = now;
        }

        if self.raw == self.stable {
            return DebounceOutcome::Settled;
        }

        if now.saturating_duration_since(self.raw_since) >= self.window {
            self.stable = self.raw;
            DebounceOutcome::Changed(self.stable)
        } else {
            DebounceOutcome::Pending
        }
    }

    /// The last stable level.
    pub fn stable(&self) -> Level {
        self.stable
    }

    /// `true` while a raw transition is waiting out the window.
    pub fn is_pending(&self) -> bool {
        self.raw != self.stable
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_same_level_is_settled() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Level::Low, t0);

        assert_eq!(d.observe(Level::Low, t0 + ms(100)), DebounceOutcome::Settled);
        assert!(!d.is_pending());
    }

    #[test]
    fn test_change_before_window_is_pending() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Level::Low, t0);

        assert_eq!(d.observe(Level::High, t0), DebounceOutcome::Pending);
        assert_eq!(d.observe(Level::High, t0 + ms(49)), DebounceOutcome::Pending);
        assert_eq!(d.stable(), Level::Low);
        assert!(d.is_pending());
    }

    #[test]
    fn test_change_after_window_emits_exactly_once() {
        // Arrange
        let t0 = Instant::now();
        let mut d = Debouncer::new(Level::Low, t0);
        d.observe(Level::High, t0);

        // Act
        let first = d.observe(Level::High, t0 + ms(50));
        let second = d.observe(Level::High, t0 + ms(60));

        // Assert
        assert_eq!(first, DebounceOutcome::Changed(Level::High));
        assert_eq!(second, DebounceOutcome::Settled);
    }

    #[test]
    fn test_oscillation_restarts_window() {
        // Arrange: flip every 20 ms, nine times, ending on High at t=180.
        let t0 = Instant::now();
        let mut d = Debouncer::new(Level::Low, t0);
        let mut level = Level::Low;

        // Act
        let mut changes = 0;
        for step in 1..=9u64 {
            level = if level.is_high() { Level::Low } else { Level::High };
            if let DebounceOutcome::Changed(_) = d.observe(level, t0 + ms(step * 20)) {
                changes += 1;
            }
        }

        // Assert: no event during the bounce.
        assert_eq!(changes, 0);
        assert_eq!(level, Level::High);
        let settled_at = t0 + ms(180);
        assert_eq!(d.observe(level, settled_at + ms(49)), DebounceOutcome::Pending);
        assert_eq!(
            d.observe(level, settled_at + ms(50)),
            DebounceOutcome::Changed(level)
        );
    }

    #[test]
    fn test_glitch_back_to_stable_cancels_pending_change() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Level::High, t0);

        d.observe(Level::Low, t0 + ms(10));
        assert_eq!(d.observe(Level::High, t0 + ms(20)), DebounceOutcome::Settled);
        assert_eq!(d.observe(Level::High, t0 + ms(200)), DebounceOutcome::Settled);
        assert_eq!(d.stable(), Level::High);
    }

    #[test]
    fn test_custom_window() {
        let t0 = Instant::now();
        let mut d = Debouncer::with_window(Level::Low, t0, ms(5));

        d.observe(Level::High, t0);
        assert_eq!(
            d.observe(Level::High, t0 + ms(5)),
            DebounceOutcome::Changed(Level::High)
        );
    }
}

//! Use case: turn raw input edges into debounced input changes.
//!
//! # Pipeline
//!
//! ```text
//! pin edge ──EdgeSignal::notify(i)──► bounded queue ──► InputMonitor::run
//!                                                          │ re-reads pin i
//!                                                          │ Debouncer[i]
//!                                                          ▼
//!                                              InputChange ──► dispatcher
//! ```
//!
//! The edge source only enqueues a channel index.  If the queue is full the
//! index is dropped; the monitor always re-reads the live level, so a dropped
//! notification is coalesced with the one already queued.
//!
//! While any channel is waiting out its debounce window the monitor polls all
//! pending channels every [`POLL_INTERVAL`].  A bouncing channel therefore
//! never delays another channel by more than one tick.

use std::sync::Arc;
use std::time::Duration;

use gpio_core::{ChannelBank, DebounceOutcome, Debouncer, InputChange, Level};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Capacity of the edge queue between the edge source and the monitor.
pub const EDGE_QUEUE_CAPACITY: usize = 10;

/// Re-poll period for channels under active debounce.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Reads the instantaneous raw level of an input pin.
pub trait InputReader: Send + Sync {
    fn read(&self, index: usize) -> Level;
}

/// Producer half of the edge queue, handed to whatever detects pin edges.
#[derive(Debug, Clone)]
pub struct EdgeSignal {
    tx: mpsc::Sender<usize>,
}

impl EdgeSignal {
    /// Records that input `index` may have changed.  Never blocks; drops the
    /// notification when the queue is full.
    ///
    /// Returns `false` once the monitor has gone away.
    pub fn notify(&self, index: usize) -> bool {
        match self.tx.try_send(index) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => {
                debug!("edge for input {index} dropped: input monitor is not running");
                false
            }
        }
    }
}

/// Creates the bounded edge queue.
pub fn edge_queue(capacity: usize) -> (EdgeSignal, mpsc::Receiver<usize>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EdgeSignal { tx }, rx)
}

/// Debounces every input channel and publishes stable changes.
pub struct InputMonitor {
    reader: Arc<dyn InputReader>,
    bank: Arc<ChannelBank>,
    debouncers: Vec<Debouncer>,
    poll_interval: Duration,
}

impl InputMonitor {
    /// Samples every input once and records it as the initial stable level.
    /// No change is emitted for the initial sample.
    pub fn new(reader: Arc<dyn InputReader>, bank: Arc<ChannelBank>) -> Self {
        let now = Instant::now().into_std();
        let debouncers = (0..bank.input_count())
            .map(|index| {
                let level = reader.read(index);
                if let Err(e) = bank.set_input(index, level) {
                    warn!("initial sample of input {index} not recorded: {e}");
                }
                Debouncer::new(level, now)
            })
            .collect();
        debug!("input monitor sampled {} initial levels", bank.input_count());

        Self {
            reader,
            bank,
            debouncers,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Runs until the edge queue closes or the change receiver is dropped.
    pub async fn run(mut self, mut edges: mpsc::Receiver<usize>, changes: mpsc::Sender<InputChange>) {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let open = if self.any_pending() {
                tokio::select! {
                    edge = edges.recv() => match edge {
                        Some(index) => self.sample(index, &changes).await,
                        None => false,
                    },
                    _ = ticker.tick() => self.poll_pending(&changes).await,
                }
            } else {
                match edges.recv().await {
                    Some(index) => {
                        // Start the poll cadence from this edge.
                        ticker.reset();
                        self.sample(index, &changes).await
                    }
                    None => false,
                }
            };

            if !open {
                break;
            }
        }
        info!("input monitor stopped");
    }

    fn any_pending(&self) -> bool {
        self.debouncers.iter().any(Debouncer::is_pending)
    }

    async fn poll_pending(&mut self, changes: &mpsc::Sender<InputChange>) -> bool {
        let pending: Vec<usize> = self
            .debouncers
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_pending())
            .map(|(index, _)| index)
            .collect();

        for index in pending {
            if !self.sample(index, changes).await {
                return false;
            }
        }
        true
    }

    /// Reads input `index`, advances its debouncer, and publishes a change
    /// if one settled.  Returns `false` once nobody is listening.
    async fn sample(&mut self, index: usize, changes: &mpsc::Sender<InputChange>) -> bool {
        let Some(debouncer) = self.debouncers.get_mut(index) else {
            warn!("edge for unknown input {index} ignored");
            return true;
        };

        let raw = self.reader.read(index);
        let DebounceOutcome::Changed(level) = debouncer.observe(raw, Instant::now().into_std())
        else {
            return true;
        };

        if let Err(e) = self.bank.set_input(index, level) {
            warn!("stable level for input {index} not recorded: {e}");
            return true;
        }

        let change = InputChange { index, level };
        debug!("{} settled {}", change.channel_name(), level);
        changes.send(change).await.is_ok()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use gpio_core::{OutputDriver, INPUT_COUNT};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::{sleep, timeout};

    struct FakePins {
        levels: Vec<AtomicBool>,
    }

    impl FakePins {
        fn new() -> Self {
            Self {
                levels: (0..INPUT_COUNT).map(|_| AtomicBool::new(false)).collect(),
            }
        }

        fn set(&self, index: usize, level: Level) {
            self.levels[index].store(level.is_high(), Ordering::SeqCst);
        }
    }

    impl InputReader for FakePins {
        fn read(&self, index: usize) -> Level {
            Level::from(self.levels[index].load(Ordering::SeqCst))
        }
    }

    struct NullDriver;

    impl OutputDriver for NullDriver {
        fn drive(&self, _index: usize, _level: Level) {}
    }

    struct Harness {
        pins: Arc<FakePins>,
        bank: Arc<ChannelBank>,
        edges: EdgeSignal,
        changes: mpsc::Receiver<InputChange>,
    }

    impl Harness {
        fn start(pins: FakePins) -> Self {
            let pins = Arc::new(pins);
            let bank = Arc::new(ChannelBank::new(Arc::new(NullDriver)));
            let (edges, edge_rx) = edge_queue(EDGE_QUEUE_CAPACITY);
            let (change_tx, changes) = mpsc::channel(16);

            let monitor = InputMonitor::new(Arc::clone(&pins) as Arc<dyn InputReader>, Arc::clone(&bank));
            tokio::spawn(monitor.run(edge_rx, change_tx));

            Self {
                pins,
                bank,
                edges,
                changes,
            }
        }

        fn flip(&self, index: usize, level: Level) {
            self.pins.set(index, level);
            self.edges.notify(index);
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_levels_are_recorded_without_events() {
        // Arrange
        let pins = FakePins::new();
        pins.set(2, Level::High);

        // Act
        let mut h = Harness::start(pins);

        // Assert
        assert_eq!(h.bank.get_input(2), Ok(Level::High));
        assert_eq!(h.bank.get_input(0), Ok(Level::Low));
        assert!(timeout(ms(500), h.changes.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_edge_emits_once_after_window() {
        // Arrange
        let mut h = Harness::start(FakePins::new());
        let started = Instant::now();

        // Act
        h.flip(0, Level::High);
        let change = timeout(ms(200), h.changes.recv()).await.unwrap().unwrap();

        // Assert
        assert_eq!(
            change,
            InputChange {
                index: 0,
                level: Level::High
            }
        );
        let elapsed = started.elapsed();
        assert!(elapsed >= ms(50), "emitted after {elapsed:?}");
        assert!(elapsed <= ms(70), "emitted after {elapsed:?}");
        assert_eq!(h.bank.get_input(0), Ok(Level::High));
        assert!(timeout(ms(500), h.changes.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounce_emits_single_event_with_final_level() {
        // Arrange
        let mut h = Harness::start(FakePins::new());

        // Act: bounce every 5 ms for 40 ms, ending High.
        let mut level = Level::Low;
        for _ in 0..9 {
            level = if level.is_high() { Level::Low } else { Level::High };
            h.flip(4, level);
            sleep(ms(5)).await;
        }
        let last_flip = Instant::now() - ms(5);
        let change = timeout(ms(200), h.changes.recv()).await.unwrap().unwrap();

        // Assert
        assert_eq!(change.level, Level::High);
        assert_eq!(change.index, 4);
        assert!(last_flip.elapsed() >= ms(50));
        assert!(timeout(ms(500), h.changes.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_glitch_shorter_than_window_is_suppressed() {
        let mut h = Harness::start(FakePins::new());

        h.flip(1, Level::High);
        sleep(ms(20)).await;
        h.flip(1, Level::Low);

        assert!(timeout(ms(500), h.changes.recv()).await.is_err());
        assert_eq!(h.bank.get_input(1), Ok(Level::Low));
    }

    #[tokio::test(start_paused = true)]
    async fn test_channels_debounce_independently() {
        // Arrange
        let mut h = Harness::start(FakePins::new());

        // Act: channel 3 settles while channel 6 keeps bouncing.
        h.flip(3, Level::High);
        let mut level = Level::Low;
        for _ in 0..20 {
            level = if level.is_high() { Level::Low } else { Level::High };
            h.flip(6, level);
            sleep(ms(5)).await;
        }

        // Assert: channel 3's event arrived while channel 6 was still noisy.
        let first = timeout(ms(10), h.changes.recv()).await.unwrap().unwrap();
        assert_eq!(
            first,
            InputChange {
                index: 3,
                level: Level::High
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_coalesces_notifications() {
        // Arrange
        let mut h = Harness::start(FakePins::new());

        // Act: far more notifications than the queue holds.
        h.pins.set(7, Level::High);
        for _ in 0..(EDGE_QUEUE_CAPACITY * 5) {
            assert!(h.edges.notify(7));
        }

        // Assert
        let change = timeout(ms(200), h.changes.recv()).await.unwrap().unwrap();
        assert_eq!(change.index, 7);
        assert!(timeout(ms(500), h.changes.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_index_is_ignored() {
        let mut h = Harness::start(FakePins::new());

        h.edges.notify(INPUT_COUNT + 3);
        h.flip(0, Level::High);

        let change = timeout(ms(200), h.changes.recv()).await.unwrap().unwrap();
        assert_eq!(change.index, 0);
    }

    #[tokio::test]
    async fn test_monitor_stops_when_edge_queue_closes() {
        let pins: Arc<dyn InputReader> = Arc::new(FakePins::new());
        let bank = Arc::new(ChannelBank::new(Arc::new(NullDriver)));
        let (edges, edge_rx) = edge_queue(1);
        let (change_tx, _changes) = mpsc::channel(1);
        let handle = tokio::spawn(InputMonitor::new(pins, bank).run(edge_rx, change_tx));

        drop(edges);

        tokio_test::assert_ok!(timeout(ms(1000), handle).await);
    }

    #[test]
    fn test_notify_reports_closed_queue_but_not_full_queue() {
        // Arrange
        let (edges, edge_rx) = edge_queue(1);

        // Act
        let first = edges.notify(0);
        let overflow = edges.notify(1);
        drop(edge_rx);
        let after_close = edges.notify(2);

        // Assert
        assert!(first);
        assert!(overflow);
        assert!(!after_close);
    }
}

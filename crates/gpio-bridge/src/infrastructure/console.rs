//! Operator console for bench bring-up.
//!
//! Reads commands line by line (stdin in the binary):
//!
//! | Command              | Effect                                             |
//! |----------------------|----------------------------------------------------|
//! | `gpi <n> high\|low`  | Drive simulated input `GPI-<n>`; raises an edge    |
//! | `status`             | Log every channel level and the session state      |
//! | `reload`             | Re-read the stored configuration and apply it      |
//!
//! Bad lines are logged and skipped.

use std::sync::Arc;

use gpio_core::{ChannelBank, ChannelId, Level, INPUT_COUNT};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::infrastructure::io::simulated::SimulatedPins;
use crate::infrastructure::network::session_manager::SessionManager;
use crate::infrastructure::storage::config_store::ConfigStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Drive input `index` (0-based) to `level`.
    SetInput { index: usize, level: Level },
    Status,
    Reload,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArg(&'static str),
    #[error("invalid value {0:?}")]
    InvalidValue(String),
    #[error("input {0} out of range (1..={INPUT_COUNT})")]
    OutOfRange(usize),
}

/// Parses one console line.  Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns [`ConsoleError`] describing the first problem found.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(None);
    };

    match command.to_ascii_lowercase().as_str() {
        "gpi" => {
            let number = parts.next().ok_or(ConsoleError::MissingArg("input number"))?;
            let level = parts.next().ok_or(ConsoleError::MissingArg("high|low"))?;

            let ordinal: usize = number
                .parse()
                .map_err(|_| ConsoleError::InvalidValue(number.to_string()))?;
            let channel = ordinal
                .checked_sub(1)
                .and_then(|index| ChannelId::input(index).ok())
                .ok_or(ConsoleError::OutOfRange(ordinal))?;
            let level = Level::from_wire(&level.to_ascii_uppercase())
                .ok_or_else(|| ConsoleError::InvalidValue(level.to_string()))?;

            Ok(Some(ConsoleCommand::SetInput {
                index: channel.index(),
                level,
            }))
        }
        "status" => Ok(Some(ConsoleCommand::Status)),
        "reload" => Ok(Some(ConsoleCommand::Reload)),
        _ => Err(ConsoleError::UnknownCommand(command.to_string())),
    }
}

/// Executes console commands against the running bridge.
pub struct Console {
    pins: Arc<SimulatedPins>,
    bank: Arc<ChannelBank>,
    session: Arc<SessionManager>,
    store: Arc<ConfigStore>,
}

impl Console {
    pub fn new(
        pins: Arc<SimulatedPins>,
        bank: Arc<ChannelBank>,
        session: Arc<SessionManager>,
        store: Arc<ConfigStore>,
    ) -> Self {
        Self {
            pins,
            bank,
            session,
            store,
        }
    }

    /// Reads and executes lines until `input` reaches end of file.
    pub async fn run<R>(self, input: R)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(Some(command)) => self.execute(command).await,
                    Ok(None) => {}
                    Err(e) => warn!("console: {e}"),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("console input failed: {e}");
                    break;
                }
            }
        }
        info!("console closed");
    }

    pub async fn execute(&self, command: ConsoleCommand) {
        match command {
            ConsoleCommand::SetInput { index, level } => {
                self.pins.set_input(index, level);
                info!("console: GPI-{} driven {level}", index + 1);
            }
            ConsoleCommand::Status => {
                let inputs = join_levels(&self.bank.input_levels());
                let outputs = join_levels(&self.bank.output_levels());
                let mode = self
                    .session
                    .active_mode()
                    .await
                    .map_or_else(|| "none".to_string(), |m| format!("{} {}", m.kind(), m.target()));
                info!(
                    "inputs [{inputs}] outputs [{outputs}] session {:?} ({mode})",
                    self.session.state()
                );
            }
            ConsoleCommand::Reload => match self.store.reload() {
                Ok(()) => info!("console: configuration reloaded"),
                Err(e) => warn!("console: reload failed: {e}"),
            },
        }
    }
}

fn join_levels(levels: &[Level]) -> String {
    levels
        .iter()
        .map(|level| if level.is_high() { "1" } else { "0" })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::input_monitor::edge_queue;
    use crate::infrastructure::storage::config_file::{ConfigPersistence, MemoryPersistence};
    use gpio_core::ConfigurationRecord;
    use tokio::sync::mpsc;

    #[test]
    fn test_parse_gpi_command() {
        assert_eq!(
            parse_line("gpi 3 high"),
            Ok(Some(ConsoleCommand::SetInput {
                index: 2,
                level: Level::High
            }))
        );
        assert_eq!(
            parse_line("  GPI 8 Low "),
            Ok(Some(ConsoleCommand::SetInput {
                index: 7,
                level: Level::Low
            }))
        );
    }

    #[test]
    fn test_parse_gpi_errors() {
        assert_eq!(parse_line("gpi"), Err(ConsoleError::MissingArg("input number")));
        assert_eq!(parse_line("gpi 2"), Err(ConsoleError::MissingArg("high|low")));
        assert_eq!(parse_line("gpi 0 high"), Err(ConsoleError::OutOfRange(0)));
        assert_eq!(parse_line("gpi 9 high"), Err(ConsoleError::OutOfRange(9)));
        assert_eq!(
            parse_line("gpi x high"),
            Err(ConsoleError::InvalidValue("x".to_string()))
        );
        assert_eq!(
            parse_line("gpi 1 up"),
            Err(ConsoleError::InvalidValue("up".to_string()))
        );
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(parse_line("status"), Ok(Some(ConsoleCommand::Status)));
        assert_eq!(parse_line("reload"), Ok(Some(ConsoleCommand::Reload)));
        assert_eq!(parse_line("   "), Ok(None));
        assert_eq!(
            parse_line("reboot now"),
            Err(ConsoleError::UnknownCommand("reboot".to_string()))
        );
    }

    #[tokio::test]
    async fn test_run_drives_pins_and_reloads_config() {
        // Arrange
        let pins = Arc::new(SimulatedPins::new());
        let (edges, mut edge_rx) = edge_queue(4);
        pins.attach(edges);
        let bank = Arc::new(ChannelBank::new(Arc::clone(&pins) as Arc<dyn gpio_core::OutputDriver>));
        let (command_tx, _command_rx) = mpsc::channel(1);
        let session = Arc::new(SessionManager::new(command_tx));
        let backend = Arc::new(MemoryPersistence::new());
        let store = Arc::new(ConfigStore::load(Arc::clone(&backend) as Arc<dyn ConfigPersistence>));
        let mut edited = ConfigurationRecord::default();
        edited.local_log.enabled = true;
        backend.save(&edited).unwrap();
        let console = Console::new(Arc::clone(&pins), bank, session, Arc::clone(&store));

        // Act
        console
            .run(&b"gpi 2 high\nbogus\n\nstatus\nreload\n"[..])
            .await;

        // Assert
        assert_eq!(edge_rx.try_recv().unwrap(), 1);
        assert!(store.snapshot().local_log.enabled);
    }
}

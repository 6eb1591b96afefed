//! GPIO bridge: entry point.
//!
//! Wires the input monitor, dispatcher, session manager and configuration
//! store together over simulated pins, then runs until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! gpio-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>                 Configuration file [default: $XDG_CONFIG_HOME/gpio-bridge/config.toml]
//!   --ephemeral                     Keep configuration in memory only
//!   --log-level <FILTER>            Diagnostic filter when RUST_LOG is unset [default: info]
//!   --reconnect-backoff-ms <MS>     Delay between session connection attempts [default: 2000]
//!   --edge-queue-capacity <N>       Pending edge notifications kept [default: 10]
//!   --no-console                    Do not read operator commands from stdin
//! ```
//!
//! # Environment variables
//!
//! | Variable                    | Description                          |
//! |-----------------------------|--------------------------------------|
//! | `GPIO_BRIDGE_CONFIG`        | Same as `--config`                   |
//! | `GPIO_BRIDGE_LOG`           | Same as `--log-level`                |
//! | `GPIO_BRIDGE_BACKOFF_MS`    | Same as `--reconnect-backoff-ms`     |
//! | `RUST_LOG`                  | Overrides `--log-level` when set     |
//!
//! # Task layout
//!
//! ```text
//! SimulatedPins ──edges──▶ InputMonitor ──changes──▶ Dispatcher ──▶ session / HTTP / log
//!                                                        ▲
//! SessionManager (reader) ───────commands────────────────┘
//! ConfigStore ──watch──▶ SessionManager::supervise, Dispatcher
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use gpio_core::{ChannelBank, OutputDriver};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gpio_bridge::application::dispatch::{Dispatcher, EventLogSink, NotificationTransport, SessionTransport};
use gpio_bridge::application::input_monitor::{edge_queue, InputMonitor, InputReader, EDGE_QUEUE_CAPACITY};
use gpio_bridge::infrastructure::console::Console;
use gpio_bridge::infrastructure::io::simulated::SimulatedPins;
use gpio_bridge::infrastructure::log_sink::ConsoleLogSink;
use gpio_bridge::infrastructure::network::http_notifier::HttpNotifier;
use gpio_bridge::infrastructure::network::session_manager::{SessionManager, RECONNECT_BACKOFF};
use gpio_bridge::infrastructure::storage::config_file::{
    ConfigPersistence, MemoryPersistence, TomlFilePersistence,
};
use gpio_bridge::infrastructure::storage::config_store::ConfigStore;

/// Capacity of the monitor-to-dispatcher and session-to-dispatcher queues.
const DISPATCH_QUEUE_CAPACITY: usize = 32;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Network-attached GPIO bridge.
#[derive(Debug, Parser)]
#[command(
    name = "gpio-bridge",
    about = "Reports debounced input changes over TCP/HTTP and drives outputs on command",
    version
)]
struct Cli {
    /// Configuration file.  Defaults to the per-user config directory.
    #[arg(long, env = "GPIO_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Keep configuration in memory only; nothing is read or written.
    #[arg(long, conflicts_with = "config")]
    ephemeral: bool,

    /// Diagnostic filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info", env = "GPIO_BRIDGE_LOG")]
    log_level: String,

    /// Delay between session connection attempts, in milliseconds.
    #[arg(long, default_value_t = RECONNECT_BACKOFF.as_millis() as u64, env = "GPIO_BRIDGE_BACKOFF_MS")]
    reconnect_backoff_ms: u64,

    /// Pending edge notifications kept before new ones are dropped.
    #[arg(long, default_value_t = EDGE_QUEUE_CAPACITY)]
    edge_queue_capacity: usize,

    /// Do not read operator commands from stdin.
    #[arg(long)]
    no_console: bool,
}

/// Runtime settings resolved from [`Cli`].
struct Settings {
    persistence: Arc<dyn ConfigPersistence>,
    /// Where the configuration lives, for the startup log line.
    backend: String,
    reconnect_backoff: Duration,
    edge_queue_capacity: usize,
    console: bool,
}

impl Cli {
    /// # Errors
    ///
    /// Returns an error if the backoff or queue capacity is zero, or if no
    /// config path was given and the default location cannot be resolved.
    fn into_settings(self) -> anyhow::Result<Settings> {
        anyhow::ensure!(self.reconnect_backoff_ms > 0, "--reconnect-backoff-ms must be positive");
        anyhow::ensure!(self.edge_queue_capacity > 0, "--edge-queue-capacity must be positive");

        let (persistence, backend): (Arc<dyn ConfigPersistence>, String) = if self.ephemeral {
            (Arc::new(MemoryPersistence::new()), "memory".to_string())
        } else {
            let file = match self.config {
                Some(path) => TomlFilePersistence::new(path),
                None => TomlFilePersistence::at_default_location()
                    .context("cannot locate the configuration file; pass --config")?,
            };
            let backend = file.path().display().to_string();
            (Arc::new(file), backend)
        };

        Ok(Settings {
            persistence,
            backend,
            reconnect_backoff: Duration::from_millis(self.reconnect_backoff_ms),
            edge_queue_capacity: self.edge_queue_capacity,
            console: !self.no_console,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let settings = cli.into_settings()?;
    info!("GPIO bridge starting; configuration at {}", settings.backend);

    let store = Arc::new(ConfigStore::load(Arc::clone(&settings.persistence)));

    // ── Pins and channel bank ─────────────────────────────────────────────────
    let pins = Arc::new(SimulatedPins::new());
    let bank = Arc::new(ChannelBank::new(Arc::clone(&pins) as Arc<dyn OutputDriver>));
    let (edges, edge_rx) = edge_queue(settings.edge_queue_capacity);
    pins.attach(edges);

    // ── Input monitor ─────────────────────────────────────────────────────────
    let (change_tx, change_rx) = mpsc::channel(DISPATCH_QUEUE_CAPACITY);
    let monitor = InputMonitor::new(Arc::clone(&pins) as Arc<dyn InputReader>, Arc::clone(&bank));
    tokio::spawn(monitor.run(edge_rx, change_tx));

    // ── Session ───────────────────────────────────────────────────────────────
    let (command_tx, command_rx) = mpsc::channel(DISPATCH_QUEUE_CAPACITY);
    let session = Arc::new(SessionManager::with_backoff(command_tx, settings.reconnect_backoff));
    tokio::spawn(Arc::clone(&session).supervise(store.subscribe()));

    // ── Dispatcher ────────────────────────────────────────────────────────────
    let notifier = HttpNotifier::new().context("failed to build the HTTP client")?;
    let dispatcher = Dispatcher::new(
        store.subscribe(),
        Arc::clone(&bank),
        Arc::clone(&session) as Arc<dyn SessionTransport>,
        Arc::new(notifier) as Arc<dyn NotificationTransport>,
        Arc::new(ConsoleLogSink::stdout()) as Arc<dyn EventLogSink>,
    );
    tokio::spawn(dispatcher.run(change_rx, command_rx));

    // ── Operator console ──────────────────────────────────────────────────────
    if settings.console {
        let console = Console::new(
            Arc::clone(&pins),
            Arc::clone(&bank),
            Arc::clone(&session),
            Arc::clone(&store),
        );
        tokio::spawn(console.run(BufReader::new(tokio::io::stdin())));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("received Ctrl+C; shutting down");

    session.stop().await;
    info!("GPIO bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act
        let cli = Cli::parse_from(["gpio-bridge"]);

        // Assert
        assert_eq!(cli.config, None);
        assert!(!cli.ephemeral);
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.reconnect_backoff_ms, 2000);
        assert_eq!(cli.edge_queue_capacity, 10);
        assert!(!cli.no_console);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "gpio-bridge",
            "--config",
            "/tmp/bridge.toml",
            "--reconnect-backoff-ms",
            "250",
            "--edge-queue-capacity",
            "4",
            "--no-console",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/bridge.toml")));
        assert_eq!(cli.reconnect_backoff_ms, 250);
        assert_eq!(cli.edge_queue_capacity, 4);
        assert!(cli.no_console);
    }

    #[test]
    fn test_ephemeral_conflicts_with_config() {
        let result = Cli::try_parse_from(["gpio-bridge", "--ephemeral", "--config", "/tmp/x.toml"]);

        assert!(result.is_err());
    }

    #[test]
    fn test_into_settings_converts_units() {
        // Arrange
        let cli = Cli::parse_from(["gpio-bridge", "--ephemeral", "--reconnect-backoff-ms", "500"]);

        // Act
        let settings = cli.into_settings().unwrap();

        // Assert
        assert_eq!(settings.reconnect_backoff, Duration::from_millis(500));
        assert_eq!(settings.edge_queue_capacity, 10);
        assert!(settings.console);
        assert_eq!(settings.backend, "memory");
        assert!(settings.persistence.load().unwrap().is_none());
    }

    #[test]
    fn test_into_settings_rejects_zero_backoff() {
        let cli = Cli::parse_from(["gpio-bridge", "--ephemeral", "--reconnect-backoff-ms", "0"]);

        assert!(cli.into_settings().is_err());
    }

    #[test]
    fn test_into_settings_rejects_zero_queue() {
        let cli = Cli::parse_from(["gpio-bridge", "--ephemeral", "--edge-queue-capacity", "0"]);

        assert!(cli.into_settings().is_err());
    }
}

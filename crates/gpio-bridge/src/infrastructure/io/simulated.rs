//! In-memory pin bank.
//!
//! Stands in for real pins on a bench or in tests.  Setting an input level
//! raises the edge signal exactly as a pin interrupt would; output writes are
//! recorded so they can be inspected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use gpio_core::{Level, OutputDriver, INPUT_COUNT, OUTPUT_COUNT};
use tracing::{debug, warn};

use crate::application::input_monitor::{EdgeSignal, InputReader};

/// Simulated input and output pins.
#[derive(Debug)]
pub struct SimulatedPins {
    inputs: Vec<AtomicBool>,
    outputs: Vec<AtomicBool>,
    edges: Mutex<Option<EdgeSignal>>,
}

impl Default for SimulatedPins {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPins {
    /// All pins low, no edge signal attached.
    pub fn new() -> Self {
        Self {
            inputs: (0..INPUT_COUNT).map(|_| AtomicBool::new(false)).collect(),
            outputs: (0..OUTPUT_COUNT).map(|_| AtomicBool::new(false)).collect(),
            edges: Mutex::new(None),
        }
    }

    /// Routes later input changes to `edges`.
    pub fn attach(&self, edges: EdgeSignal) {
        *self.edges.lock().unwrap_or_else(PoisonError::into_inner) = Some(edges);
    }

    /// Drives input pin `index` to `level` and raises an edge if it changed.
    /// Returns `false` for an unknown pin.
    pub fn set_input(&self, index: usize, level: Level) -> bool {
        let Some(pin) = self.inputs.get(index) else {
            warn!("simulated input {index} does not exist");
            return false;
        };
        let previous = pin.swap(level.is_high(), Ordering::SeqCst);
        if previous != level.is_high() {
            if let Some(edges) = self.edges.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
                edges.notify(index);
            }
        }
        true
    }

    /// Current level of output pin `index`.
    pub fn output(&self, index: usize) -> Option<Level> {
        self.outputs
            .get(index)
            .map(|pin| Level::from(pin.load(Ordering::SeqCst)))
    }
}

impl InputReader for SimulatedPins {
    fn read(&self, index: usize) -> Level {
        self.inputs
            .get(index)
            .map_or(Level::Low, |pin| Level::from(pin.load(Ordering::SeqCst)))
    }
}

impl OutputDriver for SimulatedPins {
    fn drive(&self, index: usize, level: Level) {
        match self.outputs.get(index) {
            Some(pin) => {
                pin.store(level.is_high(), Ordering::SeqCst);
                debug!("simulated output {index} -> {level}");
            }
            None => warn!("simulated output {index} does not exist"),
        }
    }
}

//! Channel identities, levels, and the [`ChannelBank`] that owns their state.
//!
//! The bridge exposes a fixed set of discrete channels:
//!
//! | Direction | Count | Wire names          |
//! |-----------|-------|---------------------|
//! | Input     | 8     | `GPI-1` .. `GPI-8`  |
//! | Output    | 5     | `GPO-1` .. `GPO-5`  |
//!
//! Wire names are 1-based; every API in this crate takes 0-based indices.
//!
//! # Ownership rules
//!
//! [`ChannelBank`] is the only holder of channel state.  Each channel sits
//! behind its own lock, so a reader of `GPI-3` never waits on a writer of
//! `GPO-1`.  The input monitor is the only writer of input levels; the
//! dispatcher (acting on an inbound command) is the only writer of outputs.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

/// Number of discrete input channels.
pub const INPUT_COUNT: usize = 8;

/// Number of discrete output channels.
pub const OUTPUT_COUNT: usize = 5;

/// Errors raised when addressing a channel.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The index does not name a channel of that direction.
    #[error("{direction} channel index {index} out of range (count {count})")]
    OutOfRange {
        direction: Direction,
        index: usize,
        count: usize,
    },

    /// The string is not a `GPI-<n>` / `GPO-<n>` channel name.
    #[error("unrecognised channel name: {0:?}")]
    UnknownName(String),
}

/// Whether a channel is sampled (input) or driven (output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    /// Number of channels that exist in this direction.
    pub fn count(self) -> usize {
        match self {
            Direction::Input => INPUT_COUNT,
            Direction::Output => OUTPUT_COUNT,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Direction::Input => "GPI",
            Direction::Output => "GPO",
        }
    }

    /// Wire name of channel `index` (0-based) in this direction.  Does not
    /// check the range.
    pub(crate) fn wire_name(self, index: usize) -> String {
        ChannelId {
            direction: self,
            index,
        }
        .to_string()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// A boolean signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    /// The wire spelling: `"HIGH"` or `"LOW"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Level::High => "HIGH",
            Level::Low => "LOW",
        }
    }

    /// Parses the exact wire spelling.  Any other string is rejected.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "HIGH" => Some(Level::High),
            "LOW" => Some(Level::Low),
            _ => None,
        }
    }

    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level.is_high()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one channel: direction plus 0-based index.
///
/// A `ChannelId` can only be constructed for an index that exists, so holding
/// one is proof that the channel is addressable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId {
    direction: Direction,
    index: usize,
}

impl ChannelId {
    /// Builds an input channel id.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::OutOfRange`] if `index >= INPUT_COUNT`.
    pub fn input(index: usize) -> Result<Self, ChannelError> {
        Self::new(Direction::Input, index)
    }

    /// Builds an output channel id.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::OutOfRange`] if `index >= OUTPUT_COUNT`.
    pub fn output(index: usize) -> Result<Self, ChannelError> {
        Self::new(Direction::Output, index)
    }

    fn new(direction: Direction, index: usize) -> Result<Self, ChannelError> {
        let count = direction.count();
        if index >= count {
            return Err(ChannelError::OutOfRange {
                direction,
                index,
                count,
            });
        }
        Ok(Self { direction, index })
    }

    /// Parses a wire name such as `"GPO-3"` (which yields output index 2).
    ///
    /// # Errors
    ///
    /// - [`ChannelError::UnknownName`] if the prefix or number is malformed
    ///   (including `GPI-0`, since wire names are 1-based).
    /// - [`ChannelError::OutOfRange`] if the number is well-formed but names a
    ///   channel that does not exist, e.g. `"GPO-9"`.
    pub fn parse(name: &str) -> Result<Self, ChannelError> {
        let unknown = || ChannelError::UnknownName(name.to_string());

        let (prefix, number) = name.split_once('-').ok_or_else(unknown)?;
        let direction = match prefix {
            "GPI" => Direction::Input,
            "GPO" => Direction::Output,
            _ => return Err(unknown()),
        };
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(unknown());
        }
        let ordinal: usize = number.parse().map_err(|_| unknown())?;
        if ordinal == 0 {
            return Err(unknown());
        }
        Self::new(direction, ordinal - 1)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// 0-based index within the direction.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The 1-based wire name, e.g. `"GPI-1"` for input index 0.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.direction.prefix(), self.index + 1)
    }
}

/// A debounced input transition, emitted exactly once per stable change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputChange {
    /// 0-based input index.
    pub index: usize,
    /// The new stable level.
    pub level: Level,
}

impl InputChange {
    /// The wire name of the input that changed, e.g. `"GPI-4"`.
    pub fn channel_name(&self) -> String {
        Direction::Input.wire_name(self.index)
    }
}

/// Sink that applies an output level to the physical pin.
///
/// Hardware backends implement this; [`ChannelBank`] calls it while holding
/// the channel's lock so the stored level and the pin never disagree.
pub trait OutputDriver: Send + Sync {
    fn drive(&self, index: usize, level: Level);
}

/// Owns the last-known stable level of every input and output channel.
pub struct ChannelBank {
    inputs: Vec<Mutex<Level>>,
    outputs: Vec<Mutex<Level>>,
    driver: Arc<dyn OutputDriver>,
}

impl ChannelBank {
    /// Creates a bank with every channel at [`Level::Low`] and drives every
    /// output low.
    pub fn new(driver: Arc<dyn OutputDriver>) -> Self {
        for index in 0..OUTPUT_COUNT {
            driver.drive(index, Level::Low);
        }
        Self {
            inputs: (0..INPUT_COUNT).map(|_| Mutex::new(Level::Low)).collect(),
            outputs: (0..OUTPUT_COUNT).map(|_| Mutex::new(Level::Low)).collect(),
            driver,
        }
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Returns the stable level of input `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::OutOfRange`] for an unknown index.
    pub fn get_input(&self, index: usize) -> Result<Level, ChannelError> {
        let slot = self.slot(Direction::Input, index)?;
        Ok(*slot.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Returns the last level written to output `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::OutOfRange`] for an unknown index.
    pub fn get_output(&self, index: usize) -> Result<Level, ChannelError> {
        let slot = self.slot(Direction::Output, index)?;
        Ok(*slot.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Drives output `index` to `level` and records it.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::OutOfRange`] for an unknown index; no output
    /// is touched in that case.
    pub fn set_output(&self, index: usize, level: Level) -> Result<(), ChannelError> {
        let slot = self.slot(Direction::Output, index)?;
        let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
        self.driver.drive(index, level);
        *current = level;
        Ok(())
    }

    /// Records a new stable level for input `index`.
    ///
    /// Only the input monitor calls this.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::OutOfRange`] for an unknown index.
    pub fn set_input(&self, index: usize, level: Level) -> Result<(), ChannelError> {
        let slot = self.slot(Direction::Input, index)?;
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = level;
        Ok(())
    }

    /// Snapshot of every input level, in index order.
    pub fn input_levels(&self) -> Vec<Level> {
        Self::levels(&self.inputs)
    }

    /// Snapshot of every output level, in index order.
    pub fn output_levels(&self) -> Vec<Level> {
        Self::levels(&self.outputs)
    }

    fn levels(slots: &[Mutex<Level>]) -> Vec<Level> {
        slots
            .iter()
            .map(|slot| *slot.lock().unwrap_or_else(PoisonError::into_inner))
            .collect()
    }

    fn slot(&self, direction: Direction, index: usize) -> Result<&Mutex<Level>, ChannelError> {
        let slots = match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        };
        slots.get(index).ok_or(ChannelError::OutOfRange {
            direction,
            index,
            count: slots.len(),
        })
    }
}

impl fmt::Debug for ChannelBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBank")
            .field("inputs", &self.input_levels())
            .field("outputs", &self.output_levels())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

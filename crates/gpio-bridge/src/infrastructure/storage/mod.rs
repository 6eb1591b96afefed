//! Configuration storage: the in-memory store and its persistence backends.

pub mod config_file;
pub mod config_store;

//! Pin backends.
//!
//! Only the in-memory backend ships; hardware backends implement
//! `InputReader` and `OutputDriver` the same way.

pub mod simulated;

//! Envelope types, the bounded JSON codec, and the inbound stream framer.

pub mod codec;
pub mod envelope;
pub mod frame;

pub use codec::{decode, encode_event, encode_sync, CodecError, MAX_ENVELOPE_LEN};
pub use envelope::{Command, CommandError, Envelope};
pub use frame::FrameDecoder;

#![forbid(unsafe_code)]

pub mod envelope;

pub use envelope::{
	DEFAULT_MAX_MESSAGE_SIZE, Envelope, EnvelopeError, InboundFrame, JOIN_TYPE, ServerMessage, SignalKind,
	decode_envelope,
};

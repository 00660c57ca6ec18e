#![forbid(unsafe_code)]

use huddle_domain::{ConnectionId, RoomId};
use huddle_protocol::EnvelopeError;
use thiserror::Error;

/// Recoverable routing outcomes. None of these close the sender's connection.
#[derive(Debug, Error)]
pub enum RelayError {
	#[error("malformed message: {0}")]
	Malformed(#[from] EnvelopeError),

	#[error("room mismatch: claimed={claimed:?} joined={joined:?}")]
	RoomMismatch {
		claimed: Option<RoomId>,
		joined: Option<RoomId>,
	},

	#[error("room not found: {0}")]
	UnknownRoom(RoomId),

	#[error("connection {0} is not registered")]
	UnknownConnection(ConnectionId),
}

impl RelayError {
	/// Stable label used for metrics.
	pub fn label(&self) -> &'static str {
		match self {
			RelayError::Malformed(_) => "malformed",
			RelayError::RoomMismatch { .. } => "room_mismatch",
			RelayError::UnknownRoom(_) => "unknown_room",
			RelayError::UnknownConnection(_) => "unknown_connection",
		}
	}
}

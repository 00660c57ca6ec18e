#![forbid(unsafe_code)]

use huddle_domain::{ParseIdError, RoomId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Default maximum inbound message size.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024; // 1 MiB

/// `type` tag of a room join request.
pub const JOIN_TYPE: &str = "join";

#[derive(Debug, Error)]
pub enum EnvelopeError {
	#[error("message exceeds maximum size: len={len} max={max}")]
	TooLarge {
		len: usize,
		max: usize,
	},

	#[error("json decode error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("missing or invalid field: {0}")]
	MissingField(&'static str),

	#[error("invalid roomId: {0}")]
	InvalidRoom(#[from] ParseIdError),
}

/// Call-negotiation message kinds. These are never echoed back to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
	CallUser,
	CallAccepted,
	Offer,
	Answer,
	IceCandidate,
}

impl SignalKind {
	pub const ALL: [SignalKind; 5] = [
		SignalKind::CallUser,
		SignalKind::CallAccepted,
		SignalKind::Offer,
		SignalKind::Answer,
		SignalKind::IceCandidate,
	];

	/// Wire `type` tag.
	pub const fn as_str(self) -> &'static str {
		match self {
			SignalKind::CallUser => "call-user",
			SignalKind::CallAccepted => "call-accepted",
			SignalKind::Offer => "offer",
			SignalKind::Answer => "answer",
			SignalKind::IceCandidate => "ice-candidate",
		}
	}

	pub fn from_type(kind: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|k| k.as_str() == kind)
	}
}

/// Classified inbound envelope.
///
/// Only `type`, `roomId` and (for joins) `username` are read; all other payload fields stay opaque and
/// travel inside the original frame text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
	Join {
		username: String,
		room_id: RoomId,
	},
	Signal {
		kind: SignalKind,
		room_id: Option<RoomId>,
	},
	/// Any other `type`, relayed to the whole room.
	Other {
		kind: String,
		room_id: Option<RoomId>,
	},
}

impl Envelope {
	pub fn kind(&self) -> &str {
		match self {
			Envelope::Join { .. } => JOIN_TYPE,
			Envelope::Signal { kind, .. } => kind.as_str(),
			Envelope::Other { kind, .. } => kind,
		}
	}

	/// Room claimed by the envelope, if present and non-empty.
	pub fn room_id(&self) -> Option<&RoomId> {
		match self {
			Envelope::Join { room_id, .. } => Some(room_id),
			Envelope::Signal { room_id, .. } | Envelope::Other { room_id, .. } => room_id.as_ref(),
		}
	}

	/// Whether delivery skips the sending connection.
	pub fn excludes_sender(&self) -> bool {
		matches!(self, Envelope::Signal { .. })
	}
}

#[derive(Debug, Deserialize)]
struct Header {
	#[serde(rename = "type")]
	kind: String,
	#[serde(rename = "roomId", default)]
	room_id: Option<Value>,
	#[serde(default)]
	username: Option<Value>,
}

fn string_field(value: Option<Value>, name: &'static str) -> Result<String, EnvelopeError> {
	match value {
		Some(Value::String(s)) => Ok(s),
		_ => Err(EnvelopeError::MissingField(name)),
	}
}

/// Decode and classify a JSON text frame.
///
/// `username` is only interpreted on joins; on every other type it is payload like any other field.
pub fn decode_envelope(text: &str) -> Result<Envelope, EnvelopeError> {
	let header: Header = serde_json::from_str(text)?;

	if header.kind == JOIN_TYPE {
		let username = string_field(header.username, "username")?;
		if username.trim().is_empty() {
			return Err(EnvelopeError::MissingField("username"));
		}
		let room_id = RoomId::new(string_field(header.room_id, "roomId")?)?;
		return Ok(Envelope::Join { username, room_id });
	}

	// A missing, empty or non-string roomId can never match a joined room, so it is kept as "no room".
	let room_id = match header.room_id {
		Some(Value::String(r)) => RoomId::new(r).ok(),
		_ => None,
	};

	Ok(match SignalKind::from_type(&header.kind) {
		Some(kind) => Envelope::Signal { kind, room_id },
		None => Envelope::Other {
			kind: header.kind,
			room_id,
		},
	})
}

/// An inbound frame: the classified envelope plus the exact text to relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
	pub envelope: Envelope,
	text: String,
}

impl InboundFrame {
	/// Parse a frame, rejecting anything larger than `max_len` bytes.
	pub fn parse(text: impl Into<String>, max_len: usize) -> Result<Self, EnvelopeError> {
		let text = text.into();
		if text.len() > max_len {
			return Err(EnvelopeError::TooLarge {
				len: text.len(),
				max: max_len,
			});
		}

		let envelope = decode_envelope(&text)?;
		Ok(Self { envelope, text })
	}

	/// Verbatim frame text, forwarded to recipients unchanged.
	pub fn text(&self) -> &str {
		&self.text
	}
}

/// Messages originated by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
	/// Greeting sent only to a freshly accepted connection.
	System { message: String, timestamp: i64 },

	/// Notification that a joined peer closed its connection.
	Leave {
		username: String,
		#[serde(rename = "roomId")]
		room_id: RoomId,
		timestamp: i64,
	},
}

impl ServerMessage {
	pub fn to_text(&self) -> Result<String, EnvelopeError> {
		Ok(serde_json::to_string(self)?)
	}
}

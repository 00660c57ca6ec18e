#![forbid(unsafe_code)]

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
}

/// Server-assigned connection identifier.
///
/// Allocated monotonically on connect and never reused for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
	/// First identifier handed out by a fresh allocator.
	pub const FIRST: Self = Self(1);

	pub const fn new(raw: u64) -> Self {
		Self(raw)
	}

	/// The identifier following this one.
	pub const fn next(self) -> Self {
		Self(self.0.saturating_add(1))
	}
}

impl fmt::Display for ConnectionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Client-chosen room identifier.
///
/// Any string is accepted except an empty or whitespace-only one. A join naming such a room is treated as
/// malformed, as is a join with a whitespace-only `username`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
	/// Create a non-empty `RoomId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for RoomId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl TryFrom<String> for RoomId {
	type Error = ParseIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		RoomId::new(value)
	}
}

impl From<RoomId> for String {
	fn from(value: RoomId) -> Self {
		value.0
	}
}

impl PartialEq<str> for RoomId {
	fn eq(&self, other: &str) -> bool {
		self.0 == other
	}
}

impl PartialEq<&str> for RoomId {
	fn eq(&self, other: &&str) -> bool {
		self.0 == *other
	}
}

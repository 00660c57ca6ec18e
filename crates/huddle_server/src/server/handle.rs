#![forbid(unsafe_code)]

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;

/// Delivery to one connection failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
	#[error("connection closed")]
	Closed,
}

/// Outbound side of a live peer connection, as seen by the relay core.
///
/// `send` must not block: it enqueues and returns.
pub trait ConnectionHandle: Send + fmt::Debug {
	fn send(&self, text: &str) -> Result<(), SendError>;

	fn is_open(&self) -> bool;
}

/// Handle backed by an unbounded channel drained by the connection's writer task.
#[derive(Debug, Clone)]
pub struct OutboundHandle {
	tx: mpsc::UnboundedSender<String>,
}

impl OutboundHandle {
	/// Create a handle and the receiver its writer task drains.
	pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { tx }, rx)
	}
}

impl ConnectionHandle for OutboundHandle {
	fn send(&self, text: &str) -> Result<(), SendError> {
		self.tx.send(text.to_string()).map_err(|_| SendError::Closed)
	}

	fn is_open(&self) -> bool {
		!self.tx.is_closed()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn outbound_handle_reports_closed_after_receiver_drop() {
		let (handle, mut rx) = OutboundHandle::channel();
		assert!(handle.is_open());
		handle.send("hello").expect("send while open");
		assert_eq!(rx.try_recv().expect("queued"), "hello");

		drop(rx);
		assert!(!handle.is_open());
		assert_eq!(handle.send("late"), Err(SendError::Closed));
	}
}

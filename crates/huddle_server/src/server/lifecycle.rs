#![forbid(unsafe_code)]

use std::fmt;

use huddle_domain::ConnectionId;
use huddle_protocol::ServerMessage;
use tracing::{debug, info, warn};

use crate::server::handle::ConnectionHandle;
use crate::server::router::BroadcastReport;
use crate::server::state::RelayState;

impl RelayState {
	/// Register a freshly accepted connection and greet it with a `system` message.
	pub fn connect(&mut self, handle: Box<dyn ConnectionHandle>, welcome: &str, now_ms: i64) -> ConnectionId {
		let id = self.clients.register(handle);
		info!(conn_id = %id, clients = self.clients.len(), "client connected");

		let greeting = ServerMessage::System {
			message: welcome.to_string(),
			timestamp: now_ms,
		};

		match greeting.to_text() {
			Ok(text) => {
				if let Some(client) = self.clients.get(id)
					&& let Err(e) = client.handle().send(&text)
				{
					warn!(conn_id = %id, error = %e, "failed to send welcome message");
				}
			}
			Err(e) => warn!(conn_id = %id, error = %e, "failed to encode welcome message"),
		}

		id
	}

	/// Graceful close: tell the rest of the room, then drop the connection.
	///
	/// Returns the report of the `leave` broadcast when one was sent.
	pub fn disconnect(&mut self, id: ConnectionId, now_ms: i64) -> Option<BroadcastReport> {
		let leave = self.clients.get(id).and_then(|client| {
			let username = client.display_name()?;
			let room_id = client.room_id()?;
			Some(ServerMessage::Leave {
				username: username.to_string(),
				room_id: room_id.clone(),
				timestamp: now_ms,
			})
		});

		let mut report = None;

		if let Some(leave) = leave {
			match leave.to_text() {
				Ok(text) => {
					if let ServerMessage::Leave { room_id, .. } = &leave {
						report = self.broadcast_to_room(&text, room_id, id, true).ok();
					}
				}
				Err(e) => warn!(conn_id = %id, error = %e, "failed to encode leave message"),
			}
		}

		self.remove_connection(id);
		info!(conn_id = %id, clients = self.clients.len(), "client disconnected");

		report
	}

	/// Abrupt teardown after a transport error. No `leave` is broadcast.
	pub fn fail(&mut self, id: ConnectionId, err: &(dyn fmt::Display + Sync)) {
		warn!(conn_id = %id, error = %err, "connection error");
		self.remove_connection(id);
		debug!(conn_id = %id, clients = self.clients.len(), "client removed after error");
	}
}

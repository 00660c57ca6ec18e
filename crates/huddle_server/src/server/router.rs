#![forbid(unsafe_code)]

use huddle_domain::{ConnectionId, RoomId};
use huddle_protocol::{Envelope, InboundFrame};
use tracing::{debug, info, warn};

use crate::server::error::RelayError;
use crate::server::state::RelayState;

/// Result of one broadcast sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
	/// Recipients the frame was handed to.
	pub delivered: usize,

	/// Recipients found dead during the sweep and removed from the relay.
	pub reaped: Vec<ConnectionId>,
}

/// What happened to a routed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
	Joined {
		room: RoomId,
		previous: Option<RoomId>,
		report: BroadcastReport,
	},
	Relayed {
		room: RoomId,
		excluded_sender: bool,
		report: BroadcastReport,
	},
}

impl Routed {
	pub fn report(&self) -> &BroadcastReport {
		match self {
			Routed::Joined { report, .. } | Routed::Relayed { report, .. } => report,
		}
	}
}

impl RelayState {
	/// Parse and route a raw text frame from `sender`.
	pub fn handle_message(&mut self, sender: ConnectionId, text: &str, max_len: usize) -> Result<Routed, RelayError> {
		let frame = InboundFrame::parse(text, max_len)?;
		self.route_frame(sender, &frame)
	}

	/// Route an already parsed frame from `sender`.
	pub fn route_frame(&mut self, sender: ConnectionId, frame: &InboundFrame) -> Result<Routed, RelayError> {
		if let Envelope::Join { username, room_id } = &frame.envelope {
			return self.join(sender, username, room_id, frame.text());
		}

		let claimed = frame.envelope.room_id();
		let joined = self.clients.get(sender).and_then(|c| c.room_id());

		let room = match (joined, claimed) {
			(Some(joined), Some(claimed)) if joined == claimed => joined.clone(),
			_ => {
				debug!(
					conn_id = %sender,
					kind = frame.envelope.kind(),
					claimed = ?claimed,
					joined = ?joined,
					"message rejected: room mismatch"
				);
				return Err(RelayError::RoomMismatch {
					claimed: claimed.cloned(),
					joined: joined.cloned(),
				});
			}
		};

		let excluded_sender = frame.envelope.excludes_sender();
		if excluded_sender {
			debug!(conn_id = %sender, kind = frame.envelope.kind(), room = %room, "call signaling");
		}

		let report = self.broadcast_to_room(frame.text(), &room, sender, excluded_sender)?;

		Ok(Routed::Relayed {
			room,
			excluded_sender,
			report,
		})
	}

	fn join(&mut self, sender: ConnectionId, username: &str, room: &RoomId, text: &str) -> Result<Routed, RelayError> {
		let Some(client) = self.clients.get_mut(sender) else {
			debug!(conn_id = %sender, room = %room, "join from unregistered connection ignored");
			return Err(RelayError::UnknownConnection(sender));
		};

		let previous = client.set_membership(username.to_string(), room.clone());
		if let Some(prev) = previous.as_ref() {
			self.rooms.leave(prev, sender);
		}

		let members = self.rooms.join(room, sender);
		info!(conn_id = %sender, username, room = %room, members, "joined room");

		let report = self.broadcast_to_room(text, room, sender, false)?;

		Ok(Routed::Joined {
			room: room.clone(),
			previous,
			report,
		})
	}

	/// Deliver `text` to every member of `room`, reaping members that cannot receive it.
	///
	/// Members whose client is gone, whose handle is closed, whose recorded room differs, or whose send
	/// fails are unregistered after the sweep; delivery to the others is unaffected.
	pub fn broadcast_to_room(
		&mut self,
		text: &str,
		room: &RoomId,
		sender: ConnectionId,
		exclude_sender: bool,
	) -> Result<BroadcastReport, RelayError> {
		let Some(members) = self.rooms.members_of(room) else {
			debug!(room = %room, "room not found");
			return Err(RelayError::UnknownRoom(room.clone()));
		};

		let mut recipients: Vec<ConnectionId> = members.iter().copied().collect();
		recipients.sort_unstable();

		let mut report = BroadcastReport::default();

		for id in recipients {
			if exclude_sender && id == sender {
				continue;
			}

			let Some(client) = self.clients.get(id) else {
				debug!(conn_id = %id, room = %room, "member not registered, removing from room");
				report.reaped.push(id);
				continue;
			};

			if !client.handle().is_open() {
				debug!(conn_id = %id, room = %room, "member disconnected, removing from room");
				report.reaped.push(id);
				continue;
			}

			if client.room_id() != Some(room) {
				debug!(
					conn_id = %id,
					expected = %room,
					actual = ?client.room_id(),
					"member room mismatch, removing from room"
				);
				report.reaped.push(id);
				continue;
			}

			match client.handle().send(text) {
				Ok(()) => {
					report.delivered += 1;
				}
				Err(e) => {
					warn!(conn_id = %id, room = %room, error = %e, "send failed, removing from room");
					report.reaped.push(id);
				}
			}
		}

		for id in &report.reaped {
			self.reap(*id, room);
		}

		debug!(
			room = %room,
			delivered = report.delivered,
			reaped = report.reaped.len(),
			"broadcast complete"
		);

		Ok(report)
	}

	fn reap(&mut self, id: ConnectionId, room: &RoomId) {
		self.rooms.leave(room, id);

		// Keep the recorded room consistent too, in case it differs from the swept one.
		if let Some(client) = self.clients.unregister(id)
			&& let Some(recorded) = client.room_id()
			&& recorded != room
		{
			self.rooms.leave(recorded, id);
		}
	}
}

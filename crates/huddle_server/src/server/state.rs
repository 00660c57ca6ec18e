#![forbid(unsafe_code)]

use huddle_domain::{ConnectionId, RoomId};
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use crate::server::registry::Client;
use crate::server::registry::ClientRegistry;
use crate::server::room_index::RoomIndex;

/// Relay state: the client registry and the room index, mutated only together.
///
/// Router operations live in `router.rs`, connection lifecycle in `lifecycle.rs`.
#[derive(Debug, Default)]
pub struct RelayState {
	pub(super) clients: ClientRegistry,
	pub(super) rooms: RoomIndex,
}

/// Point-in-time view of connections and rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
	pub clients: usize,
	pub rooms: usize,
	pub room_details: Vec<RoomStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
	pub room_id: RoomId,
	pub members: usize,
}

impl RelayState {
	#[cfg(test)]
	pub fn client(&self, id: ConnectionId) -> Option<&Client> {
		self.clients.get(id)
	}

	pub fn snapshot(&self) -> StatusSnapshot {
		StatusSnapshot {
			clients: self.clients.len(),
			rooms: self.rooms.len(),
			room_details: self
				.rooms
				.member_counts()
				.into_iter()
				.map(|(room_id, members)| RoomStatus { room_id, members })
				.collect(),
		}
	}

	/// Whether `id` is currently a member of `room`.
	#[cfg(test)]
	pub fn is_member(&self, room: &RoomId, id: ConnectionId) -> bool {
		self.rooms.members_of(room).is_some_and(|m| m.contains(&id))
	}

	/// Drop a connection's room membership and registry entry. Safe to repeat.
	pub(super) fn remove_connection(&mut self, id: ConnectionId) {
		let Some(client) = self.clients.unregister(id) else {
			return;
		};
		if let Some(room) = client.room_id() {
			self.rooms.leave(room, client.id());
		}
		debug!(conn_id = %client.id(), room = ?client.room_id(), "connection removed");
	}

	/// Checks the registry/index agreement. Returns a description of the first violation.
	#[cfg(test)]
	pub fn check_invariants(&self) -> Result<(), String> {
		for client in self.clients.iter() {
			let rooms = self.rooms.rooms_containing(client.id());
			match client.room_id() {
				Some(room) if rooms.len() == 1 && &rooms[0] == room => {}
				Some(room) => {
					return Err(format!("client {} in room {room} but indexed in {rooms:?}", client.id()));
				}
				None if rooms.is_empty() => {}
				None => return Err(format!("unjoined client {} indexed in {rooms:?}", client.id())),
			}
		}

		for (room, members) in self.rooms.iter() {
			if members.is_empty() {
				return Err(format!("room {room} is empty but still indexed"));
			}
			for id in members {
				if self.clients.get(*id).is_none() {
					return Err(format!("room {room} lists unregistered connection {id}"));
				}
			}
		}

		Ok(())
	}
}

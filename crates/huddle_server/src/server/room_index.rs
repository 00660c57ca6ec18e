#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use huddle_domain::{ConnectionId, RoomId};
use tracing::debug;

/// Room id -> member connection ids.
///
/// A room has an entry only while it has at least one member.
#[derive(Debug, Default)]
pub struct RoomIndex {
	rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl RoomIndex {
	/// Add `id` to `room`, creating the room on first join. Returns the member count.
	pub fn join(&mut self, room: &RoomId, id: ConnectionId) -> usize {
		let members = self.rooms.entry(room.clone()).or_default();
		members.insert(id);
		members.len()
	}

	/// Remove `id` from `room`, dropping the room once empty. Returns whether `id` was a member.
	pub fn leave(&mut self, room: &RoomId, id: ConnectionId) -> bool {
		let Some(members) = self.rooms.get_mut(room) else {
			return false;
		};

		let removed = members.remove(&id);

		if members.is_empty() {
			self.rooms.remove(room);
			debug!(room = %room, "room deleted (empty)");
		} else if removed {
			debug!(room = %room, members = members.len(), "room membership changed");
		}

		removed
	}

	pub fn members_of(&self, room: &RoomId) -> Option<&HashSet<ConnectionId>> {
		self.rooms.get(room)
	}

	/// Number of rooms with members.
	pub fn len(&self) -> usize {
		self.rooms.len()
	}

	/// Member count per room, ordered by room id.
	pub fn member_counts(&self) -> Vec<(RoomId, usize)> {
		let mut counts: Vec<(RoomId, usize)> = self.rooms.iter().map(|(k, v)| (k.clone(), v.len())).collect();
		counts.sort_by(|a, b| a.0.cmp(&b.0));
		counts
	}

	/// Rooms whose member set contains `id`.
	#[cfg(test)]
	pub fn rooms_containing(&self, id: ConnectionId) -> Vec<RoomId> {
		self.rooms
			.iter()
			.filter(|(_, members)| members.contains(&id))
			.map(|(room, _)| room.clone())
			.collect()
	}

	#[cfg(test)]
	pub fn iter(&self) -> impl Iterator<Item = (&RoomId, &HashSet<ConnectionId>)> {
		self.rooms.iter()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn room(id: &str) -> RoomId {
		RoomId::new(id).expect("valid RoomId")
	}

	#[test]
	fn join_creates_room_and_counts_members() {
		let mut idx = RoomIndex::default();
		let r = room("R");

		assert_eq!(idx.join(&r, ConnectionId::new(1)), 1);
		assert_eq!(idx.join(&r, ConnectionId::new(2)), 2);
		assert_eq!(idx.join(&r, ConnectionId::new(2)), 2);

		let members = idx.members_of(&r).expect("room exists");
		assert!(members.contains(&ConnectionId::new(1)));
		assert!(members.contains(&ConnectionId::new(2)));
		assert_eq!(idx.len(), 1);
	}

	#[test]
	fn last_leave_deletes_room() {
		let mut idx = RoomIndex::default();
		let r = room("R");
		idx.join(&r, ConnectionId::new(1));

		assert!(idx.leave(&r, ConnectionId::new(1)));
		assert!(idx.members_of(&r).is_none());
		assert_eq!(idx.len(), 0);
	}

	#[test]
	fn leave_is_idempotent() {
		let mut idx = RoomIndex::default();
		let r = room("R");
		idx.join(&r, ConnectionId::new(1));
		idx.join(&r, ConnectionId::new(2));

		assert!(idx.leave(&r, ConnectionId::new(1)));
		assert!(!idx.leave(&r, ConnectionId::new(1)));
		assert!(!idx.leave(&room("missing"), ConnectionId::new(1)));
		assert_eq!(idx.members_of(&r).map(HashSet::len), Some(1));
	}

	#[test]
	fn member_counts_are_sorted_by_room() {
		let mut idx = RoomIndex::default();
		idx.join(&room("b"), ConnectionId::new(1));
		idx.join(&room("a"), ConnectionId::new(2));
		idx.join(&room("a"), ConnectionId::new(3));

		assert_eq!(idx.member_counts(), vec![(room("a"), 2), (room("b"), 1)]);
	}
}

#![forbid(unsafe_code)]

use std::collections::HashMap;

use huddle_domain::{ConnectionId, RoomId};

use crate::server::handle::ConnectionHandle;

/// Per-connection bookkeeping.
#[derive(Debug)]
pub struct Client {
	id: ConnectionId,
	handle: Box<dyn ConnectionHandle>,
	display_name: Option<String>,
	room_id: Option<RoomId>,
}

impl Client {
	pub fn id(&self) -> ConnectionId {
		self.id
	}

	pub fn handle(&self) -> &dyn ConnectionHandle {
		self.handle.as_ref()
	}

	pub fn display_name(&self) -> Option<&str> {
		self.display_name.as_deref()
	}

	pub fn room_id(&self) -> Option<&RoomId> {
		self.room_id.as_ref()
	}

	/// Record a join. Returns the previously joined room, if any.
	pub(super) fn set_membership(&mut self, display_name: String, room_id: RoomId) -> Option<RoomId> {
		self.display_name = Some(display_name);
		self.room_id.replace(room_id)
	}
}

/// Connection id -> client. Ids are allocated monotonically and never reused.
#[derive(Debug)]
pub struct ClientRegistry {
	clients: HashMap<ConnectionId, Client>,
	next_id: ConnectionId,
}

impl Default for ClientRegistry {
	fn default() -> Self {
		Self {
			clients: HashMap::new(),
			next_id: ConnectionId::FIRST,
		}
	}
}

impl ClientRegistry {
	pub fn register(&mut self, handle: Box<dyn ConnectionHandle>) -> ConnectionId {
		let id = self.next_id;
		self.next_id = id.next();

		self.clients.insert(
			id,
			Client {
				id,
				handle,
				display_name: None,
				room_id: None,
			},
		);

		id
	}

	pub fn get(&self, id: ConnectionId) -> Option<&Client> {
		self.clients.get(&id)
	}

	pub(super) fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Client> {
		self.clients.get_mut(&id)
	}

	/// Remove a client. Returns `None` if it was already gone.
	pub fn unregister(&mut self, id: ConnectionId) -> Option<Client> {
		self.clients.remove(&id)
	}

	pub fn len(&self) -> usize {
		self.clients.len()
	}

	#[cfg(test)]
	pub fn iter(&self) -> impl Iterator<Item = &Client> {
		self.clients.values()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::server::handle::OutboundHandle;

	#[test]
	fn register_allocates_fresh_monotonic_ids() {
		let mut reg = ClientRegistry::default();
		let (h1, _rx1) = OutboundHandle::channel();
		let (h2, _rx2) = OutboundHandle::channel();

		let a = reg.register(Box::new(h1));
		let b = reg.register(Box::new(h2));

		assert_eq!(a, ConnectionId::FIRST);
		assert!(b > a);
		assert_eq!(reg.len(), 2);

		let client = reg.get(a).expect("registered");
		assert_eq!(client.id(), a);
		assert!(client.display_name().is_none());
		assert!(client.room_id().is_none());
	}

	#[test]
	fn ids_are_not_reused_after_unregister() {
		let mut reg = ClientRegistry::default();
		let (h1, _rx1) = OutboundHandle::channel();
		let (h2, _rx2) = OutboundHandle::channel();

		let a = reg.register(Box::new(h1));
		assert!(reg.unregister(a).is_some());
		let b = reg.register(Box::new(h2));
		assert_ne!(a, b);
	}

	#[test]
	fn unregister_is_idempotent() {
		let mut reg = ClientRegistry::default();
		let (h, _rx) = OutboundHandle::channel();
		let a = reg.register(Box::new(h));

		assert!(reg.unregister(a).is_some());
		assert!(reg.unregister(a).is_none());
		assert!(reg.get(a).is_none());
		assert_eq!(reg.len(), 0);
	}

	#[test]
	fn set_membership_returns_previous_room() {
		let mut reg = ClientRegistry::default();
		let (h, _rx) = OutboundHandle::channel();
		let a = reg.register(Box::new(h));
		let client = reg.get_mut(a).expect("registered");

		assert_eq!(client.set_membership("alice".into(), RoomId::new("R1").unwrap()), None);
		let prev = client.set_membership("alice".into(), RoomId::new("R2").unwrap());
		assert_eq!(prev, Some(RoomId::new("R1").unwrap()));
		assert_eq!(client.room_id().map(RoomId::as_str), Some("R2"));
		assert_eq!(client.display_name(), Some("alice"));
	}
}

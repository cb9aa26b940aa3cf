use crate::context::{ConnectionId, Context};
use dashmap::DashMap;
use mqtt_protocol::misc::Will;
use std::sync::Arc;

/// A live connection, registered by the Connect flow.
#[derive(Clone)]
pub struct Connection {
	pub context: Context,

	/// Published on the Client's behalf if the connection is lost without a
	/// Disconnect.
	pub will: Option<Will>,
}

/// Maps Client IDs to their live connection.
#[derive(Default)]
pub struct ConnectionRegistry {
	connections: DashMap<String, Connection>,
}

impl ConnectionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers the connection for `client_id`, returning the connection it
	/// displaces, if any.
	pub fn register(&self, client_id: &str, context: Context, will: Option<Will>) -> Option<Connection> {
		self.connections
			.insert(client_id.to_owned(), Connection { context, will })
	}

	/// Returns the context of the live connection of `client_id`.
	pub fn get(&self, client_id: &str) -> Option<Context> {
		self.connections
			.get(client_id)
			.map(|connection| Arc::clone(&connection.context))
	}

	/// Removes the connection of `client_id`, but only if it is still
	/// `connection_id`. A connection that has already been displaced does not
	/// remove its successor.
	pub fn remove(&self, client_id: &str, connection_id: ConnectionId) -> Option<Connection> {
		self.connections
			.remove_if(client_id, |_, connection| {
				connection.context.connection_id() == connection_id
			})
			.map(|(_, connection)| connection)
	}

	/// Returns `true` if `connection_id` is the live connection of
	/// `client_id`.
	pub fn is_live(&self, client_id: &str, connection_id: ConnectionId) -> bool {
		self.connections
			.get(client_id)
			.is_some_and(|connection| connection.context.connection_id() == connection_id)
	}

	/// Discards the will of `client_id` if `connection_id` is still its live
	/// connection, returning the discarded will.
	pub fn clear_will(&self, client_id: &str, connection_id: ConnectionId) -> Option<Will> {
		let mut connection = self.connections.get_mut(client_id)?;
		if connection.context.connection_id() != connection_id {
			return None;
		}
		connection.will.take()
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.connections.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.connections.is_empty()
	}
}

use super::{unexpected, Flow};
use crate::{
	connections::ConnectionRegistry,
	context::Context,
	error::Result,
	packet_id::PacketIdTracker,
	router::PublishRouter,
	session::PendingMessage,
	store::SessionStore,
};
use async_trait::async_trait;
use mqtt_protocol::{Packet, PacketType};
use std::sync::Arc;

/// Ends a Client's connection, either on its request or when the transport
/// reports the connection lost.
pub struct DisconnectFlow {
	sessions: Arc<SessionStore>,
	packet_ids: Arc<PacketIdTracker>,
	connections: Arc<ConnectionRegistry>,
	router: Arc<PublishRouter>,
}

impl DisconnectFlow {
	pub fn new(
		sessions: Arc<SessionStore>,
		packet_ids: Arc<PacketIdTracker>,
		connections: Arc<ConnectionRegistry>,
		router: Arc<PublishRouter>,
	) -> Self {
		Self {
			sessions,
			packet_ids,
			connections,
			router,
		}
	}

	/// Closes the connection behind `context`.
	///
	/// A `graceful` close discards the Client's will; any other close
	/// publishes it. Clean sessions end with the connection. Nothing but the
	/// context is touched if the connection has already been displaced by a
	/// newer one for the same Client.
	pub async fn close(&self, client_id: &str, context: &Context, graceful: bool) -> Result<()> {
		let connection_id = context.connection_id();
		if graceful {
			self.connections.clear_will(client_id, connection_id);
		}
		context.disconnect();

		// A Connect registers before taking the session lock, so under the
		// lock the registry tells whether a newer connection owns the session.
		let connection = {
			let _lock = self.sessions.lock(client_id).await;
			let Some(connection) = self.connections.remove(client_id, connection_id) else {
				tracing::debug!(client_id, connection_id, "connection already displaced");
				return Ok(());
			};

			tracing::debug!(client_id, connection_id, graceful, "connection closed");
			self.end_clean_session(client_id).await?;
			connection
		};
		self.sessions.prune_locks();

		if let Some(will) = connection.will {
			let message = PendingMessage::from(will);
			tracing::debug!(client_id, topic = %message.topic, "publishing will");
			self.router.route(&message).await?;
		}

		Ok(())
	}

	/// Discards the session of `client_id` if it is clean. The caller holds
	/// the session lock.
	async fn end_clean_session(&self, client_id: &str) -> Result<()> {
		let Some(session) = self.sessions.get(client_id).await? else {
			return Ok(());
		};

		if session.clean {
			self.sessions.delete(client_id).await?;
			self.packet_ids.clear(client_id).await?;
			tracing::debug!(client_id, "clean session discarded");
		}

		Ok(())
	}
}

#[async_trait]
impl Flow for DisconnectFlow {
	fn packet_types(&self) -> &'static [PacketType] {
		&[PacketType::Disconnect]
	}

	async fn execute(&self, client_id: &str, packet: Packet, context: &Context) -> Result<()> {
		match packet {
			Packet::Disconnect => self.close(client_id, context, true).await,
			packet => Err(unexpected("Disconnect", &packet)),
		}
	}
}

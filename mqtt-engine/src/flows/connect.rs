use super::{unexpected, Flow};
use crate::{
	connections::ConnectionRegistry,
	context::Context,
	error::{ProtocolError, Result},
	packet_id::PacketIdTracker,
	router::PublishRouter,
	session::ClientSession,
	store::SessionStore,
};
use async_trait::async_trait;
use mqtt_protocol::{
	packets::{ConnAck, Connect, ReturnCode, PROTOCOL_LEVEL, PROTOCOL_NAME},
	Packet, PacketType,
};
use std::sync::Arc;

/// Opens, or resumes, a Client's session.
///
/// The Client ID is taken from the Connect packet; the one the transport
/// passes in is not known yet when a Connect arrives.
pub struct ConnectFlow {
	sessions: Arc<SessionStore>,
	packet_ids: Arc<PacketIdTracker>,
	connections: Arc<ConnectionRegistry>,
	router: Arc<PublishRouter>,
}

impl ConnectFlow {
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

	async fn connect(&self, connect: Connect, context: &Context) -> Result<()> {
		let Connect {
			protocol_name,
			protocol_level,
			client_id,
			clean_session,
			will,
			..
		} = connect;

		if protocol_name != PROTOCOL_NAME {
			context.disconnect();
			return Err(ProtocolError::Violation("invalid protocol name").into());
		}

		if protocol_level != PROTOCOL_LEVEL {
			tracing::debug!(protocol_level, "refusing connection: unsupported protocol level");
			return self
				.refuse(ReturnCode::UnacceptableProtocolVersion, context)
				.await;
		}

		if client_id.is_empty() {
			tracing::debug!("refusing connection: empty client id");
			return self.refuse(ReturnCode::IdentifierRejected, context).await;
		}

		let client_id = client_id.as_str();
		if let Some(displaced) = self.connections.register(client_id, Arc::clone(context), will) {
			if displaced.context.connection_id() != context.connection_id() {
				tracing::warn!(
					client_id,
					connection_id = displaced.context.connection_id(),
					"client reconnected, closing previous connection"
				);
				displaced.context.disconnect();
			}
		}

		let session_present = {
			let _lock = self.sessions.lock(client_id).await;
			let existing = self.sessions.get(client_id).await?;

			match existing {
				Some(session) if !clean_session && !session.clean => true,
				existing => {
					if existing.is_some() {
						self.sessions.delete(client_id).await?;
					}
					self.packet_ids.clear(client_id).await?;
					self.sessions
						.update(ClientSession::new(client_id, clean_session))
						.await?;
					false
				}
			}
		};

		tracing::debug!(client_id, clean_session, session_present, "client connected");
		context
			.push_delivery(ConnAck::accepted(session_present).into())
			.await?;

		if session_present {
			let resent = self.router.resume(client_id, context).await?;
			tracing::debug!(client_id, resent, "session resumed");
		}

		Ok(())
	}

	async fn refuse(&self, code: ReturnCode, context: &Context) -> Result<()> {
		context.push_delivery(ConnAck::refused(code).into()).await?;
		context.disconnect();
		Ok(())
	}
}

#[async_trait]
impl Flow for ConnectFlow {
	fn packet_types(&self) -> &'static [PacketType] {
		&[PacketType::Connect]
	}

	async fn execute(&self, _client_id: &str, packet: Packet, context: &Context) -> Result<()> {
		match packet {
			Packet::Connect(connect) => self.connect(*connect, context).await,
			packet => Err(unexpected("Connect", &packet)),
		}
	}
}

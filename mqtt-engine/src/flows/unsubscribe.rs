use super::{unexpected, Flow};
use crate::{
	context::Context,
	error::Result,
	packet_id::PacketIdTracker,
	session::Direction,
	store::SessionStore,
};
use async_trait::async_trait;
use mqtt_protocol::{
	packets::{UnsubAck, Unsubscribe},
	Packet, PacketType,
};
use std::sync::Arc;

/// Handles Unsubscribe requests from Clients, and the UnsubAck for
/// Unsubscribe requests sent to them.
pub struct UnsubscribeFlow {
	sessions: Arc<SessionStore>,
	packet_ids: Arc<PacketIdTracker>,
}

impl UnsubscribeFlow {
	pub fn new(sessions: Arc<SessionStore>, packet_ids: Arc<PacketIdTracker>) -> Self {
		Self {
			sessions,
			packet_ids,
		}
	}

	async fn unsubscribe(&self, client_id: &str, unsubscribe: Unsubscribe, context: &Context) -> Result<()> {
		let Unsubscribe { id, filters } = unsubscribe;

		let removed = {
			let _lock = self.sessions.lock(client_id).await;
			match self.sessions.get(client_id).await? {
				Some(mut session) => {
					let mut removed = 0;
					for filter in &filters {
						if session.unsubscribe(filter) {
							removed += 1;
						}
					}

					if removed > 0 {
						self.sessions.update(session).await?;
					}
					removed
				}
				None => 0,
			}
		};

		tracing::debug!(client_id, %id, requested = filters.len(), removed, "unsubscribed");
		context.push_delivery(UnsubAck { id }.into()).await?;
		Ok(())
	}
}

#[async_trait]
impl Flow for UnsubscribeFlow {
	fn packet_types(&self) -> &'static [PacketType] {
		&[PacketType::Unsubscribe, PacketType::UnsubAck]
	}

	async fn execute(&self, client_id: &str, packet: Packet, context: &Context) -> Result<()> {
		match packet {
			Packet::Unsubscribe(unsubscribe) => self.unsubscribe(client_id, *unsubscribe, context).await,
			Packet::UnsubAck(UnsubAck { id }) => {
				self.packet_ids.delete(client_id, Direction::Outbound, id).await?;
				tracing::debug!(client_id, %id, "unsubscribe acknowledged");
				Ok(())
			}
			packet => Err(unexpected("Unsubscribe", &packet)),
		}
	}
}

use super::{unexpected, Flow};
use crate::{
	context::Context,
	error::{ProtocolError, Result},
	packet_id::PacketIdTracker,
	session::{Awaiting, Direction, PacketIdentifier},
};
use async_trait::async_trait;
use mqtt_protocol::{
	packets::{PubAck, PubComp, PubRec, PubRel},
	Packet, PacketId, PacketType,
};
use std::sync::Arc;

/// Completes the delivery of application messages sent to a Client.
pub struct PublishSenderFlow {
	packet_ids: Arc<PacketIdTracker>,
}

impl PublishSenderFlow {
	pub fn new(packet_ids: Arc<PacketIdTracker>) -> Self {
		Self { packet_ids }
	}

	/// Looks up the outbound exchange `id` of `client_id`, which must be
	/// waiting for one of `expected`.
	async fn in_flight(
		&self,
		client_id: &str,
		id: PacketId,
		packet: PacketType,
		expected: &[Awaiting],
	) -> Result<PacketIdentifier> {
		match self.packet_ids.get(client_id, Direction::Outbound, id).await? {
			Some(record) if expected.contains(&record.awaiting) => Ok(record),
			_ => Err(ProtocolError::Unsolicited { packet, id }.into()),
		}
	}

	async fn received(&self, client_id: &str, id: PacketId, context: &Context) -> Result<()> {
		let mut record = self
			.in_flight(
				client_id,
				id,
				PacketType::PubRec,
				&[Awaiting::PubRec, Awaiting::PubComp],
			)
			.await?;

		if record.awaiting == Awaiting::PubRec {
			record.awaiting = Awaiting::PubComp;
			record.message = None;
			self.packet_ids.replace(record).await?;
		}

		tracing::debug!(client_id, %id, "message received, releasing");
		context.push_delivery(PubRel { id }.into()).await?;
		Ok(())
	}
}

#[async_trait]
impl Flow for PublishSenderFlow {
	fn packet_types(&self) -> &'static [PacketType] {
		&[PacketType::PubAck, PacketType::PubRec, PacketType::PubComp]
	}

	async fn execute(&self, client_id: &str, packet: Packet, context: &Context) -> Result<()> {
		match packet {
			Packet::PubAck(PubAck { id }) => {
				self.in_flight(client_id, id, PacketType::PubAck, &[Awaiting::PubAck])
					.await?;
				self.packet_ids.delete(client_id, Direction::Outbound, id).await?;
				tracing::debug!(client_id, %id, "message acknowledged");
				Ok(())
			}
			Packet::PubRec(PubRec { id }) => self.received(client_id, id, context).await,
			Packet::PubComp(PubComp { id }) => {
				self.in_flight(client_id, id, PacketType::PubComp, &[Awaiting::PubComp])
					.await?;
				self.packet_ids.delete(client_id, Direction::Outbound, id).await?;
				tracing::debug!(client_id, %id, "message delivery complete");
				Ok(())
			}
			packet => Err(unexpected("PublishSender", &packet)),
		}
	}
}

use super::{unexpected, Flow};
use crate::{
	context::Context,
	error::{FlowError, ProtocolError, Result},
	packet_id::PacketIdTracker,
	router::PublishRouter,
	session::{Awaiting, Direction, PacketIdentifier, PendingMessage},
};
use async_trait::async_trait;
use mqtt_protocol::{
	packets::{PubAck, PubComp, PubRec, PubRel, Publish},
	Packet, PacketId, PacketType,
};
use std::sync::Arc;

/// Receives application messages published by a Client.
///
/// QoS 2 messages are routed once: the inbound packet identifier is tracked
/// from the first Publish until the Client releases it with PubRel, and any
/// Publish repeated in between is only acknowledged again.
pub struct PublishFlow {
	packet_ids: Arc<PacketIdTracker>,
	router: Arc<PublishRouter>,
}

impl PublishFlow {
	pub fn new(packet_ids: Arc<PacketIdTracker>, router: Arc<PublishRouter>) -> Self {
		Self { packet_ids, router }
	}

	async fn publish(&self, client_id: &str, publish: Publish, context: &Context) -> Result<()> {
		let message = PendingMessage::from(&publish);
		tracing::debug!(client_id, topic = %message.topic, qos = %message.qos, "received message");

		match publish {
			Publish::AtMostOnce { .. } => {
				self.router.route(&message).await?;
			}
			Publish::AtLeastOnce { id, .. } => {
				self.router.route(&message).await?;
				context.push_delivery(PubAck { id }.into()).await?;
			}
			Publish::ExactlyOnce { id, .. } => {
				self.receive_exactly_once(client_id, id, &message).await?;
				context.push_delivery(PubRec { id }.into()).await?;
			}
		}

		Ok(())
	}

	/// Routes a QoS 2 message unless it has been routed already.
	///
	/// The inbound identifier is recorded, holding the message, before the
	/// message is routed, and the message is cleared from the record once
	/// routing is done. A Publish repeated after a failure in between is
	/// routed again only if the first attempt never got that far.
	async fn receive_exactly_once(&self, client_id: &str, id: PacketId, message: &PendingMessage) -> Result<()> {
		match self.packet_ids.get(client_id, Direction::Inbound, id).await? {
			Some(record) if record.message.is_none() => {
				tracing::debug!(client_id, %id, "message already received");
				return Ok(());
			}
			Some(_) => tracing::debug!(client_id, %id, "routing message received before a failure"),
			None => {
				let mut record = PacketIdentifier::new(client_id, Direction::Inbound, id, Awaiting::PubRel);
				record.message = Some(message.clone());
				match self.packet_ids.add(record).await {
					Ok(()) => {}
					Err(FlowError::Protocol(ProtocolError::PacketIdInUse { .. })) => return Ok(()),
					Err(error) => return Err(error),
				}
			}
		}

		self.router.route(message).await?;

		let routed = PacketIdentifier::new(client_id, Direction::Inbound, id, Awaiting::PubRel);
		if let Err(error) = self.packet_ids.replace(routed).await {
			tracing::warn!(client_id, %id, %error, "failed to mark message as routed");
		}
		Ok(())
	}

	async fn release(&self, client_id: &str, id: PacketId, context: &Context) -> Result<()> {
		if !self.packet_ids.exists(client_id, Direction::Inbound, id).await? {
			tracing::debug!(client_id, %id, "release for unknown packet identifier");
		}

		self.packet_ids.delete(client_id, Direction::Inbound, id).await?;
		context.push_delivery(PubComp { id }.into()).await?;
		Ok(())
	}
}

#[async_trait]
impl Flow for PublishFlow {
	fn packet_types(&self) -> &'static [PacketType] {
		&[PacketType::Publish, PacketType::PubRel]
	}

	async fn execute(&self, client_id: &str, packet: Packet, context: &Context) -> Result<()> {
		match packet {
			Packet::Publish(publish) => self.publish(client_id, *publish, context).await,
			Packet::PubRel(PubRel { id }) => self.release(client_id, id, context).await,
			packet => Err(unexpected("Publish", &packet)),
		}
	}
}

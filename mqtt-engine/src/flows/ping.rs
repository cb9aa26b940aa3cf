use super::{unexpected, Flow};
use crate::{context::Context, error::Result};
use async_trait::async_trait;
use mqtt_protocol::{Packet, PacketType};

/// Answers keep-alive pings.
#[derive(Debug, Default)]
pub struct PingFlow;

#[async_trait]
impl Flow for PingFlow {
	fn packet_types(&self) -> &'static [PacketType] {
		&[PacketType::PingReq, PacketType::PingResp]
	}

	async fn execute(&self, client_id: &str, packet: Packet, context: &Context) -> Result<()> {
		match packet {
			Packet::PingReq => {
				tracing::trace!(client_id, "ping");
				context.push_delivery(Packet::PingResp).await?;
				Ok(())
			}
			Packet::PingResp => {
				tracing::trace!(client_id, "pong");
				Ok(())
			}
			packet => Err(unexpected("Ping", &packet)),
		}
	}
}

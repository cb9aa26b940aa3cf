use crate::{
	context::Context,
	error::{ProtocolError, Result},
	flows::Flow,
};
use mqtt_protocol::{Packet, PacketType};
use std::{collections::HashMap, sync::Arc};

/// Routes each packet to the flow registered for its type.
#[derive(Default)]
pub struct FlowDispatcher {
	flows: HashMap<PacketType, Arc<dyn Flow>>,
}

impl FlowDispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `flow` for every packet type it handles, replacing any flow
	/// previously registered for those types.
	pub fn register(&mut self, flow: Arc<dyn Flow>) -> &mut Self {
		for packet_type in flow.packet_types() {
			self.flows.insert(*packet_type, Arc::clone(&flow));
		}
		self
	}

	/// Returns `true` if a flow is registered for `packet_type`.
	#[inline]
	pub fn handles(&self, packet_type: PacketType) -> bool {
		self.flows.contains_key(&packet_type)
	}

	#[tracing::instrument(skip(self, packet, context), fields(packet_type = %packet.packet_type()), err)]
	pub async fn dispatch(&self, client_id: &str, packet: Packet, context: &Context) -> Result<()> {
		let packet_type = packet.packet_type();
		let Some(flow) = self.flows.get(&packet_type) else {
			return Err(ProtocolError::UnsupportedPacket(packet_type).into());
		};

		flow.execute(client_id, packet, context).await
	}
}

#[cfg(test)]
mod tests {
	use super::FlowDispatcher;
	use crate::{
		context::Context,
		error::{FlowError, ProtocolError},
		flows::PingFlow,
		test_support::RecordingContext,
	};
	use mqtt_protocol::{packets::ConnAck, Packet, PacketType};
	use std::sync::Arc;
	use tokio_test::{assert_err, assert_ok};

	#[tokio::test]
	async fn unregistered_packet_types_fail_fast() {
		let mut dispatcher = FlowDispatcher::new();
		dispatcher.register(Arc::new(PingFlow));
		assert!(dispatcher.handles(PacketType::PingReq));
		assert!(!dispatcher.handles(PacketType::ConnAck));

		let recording = RecordingContext::new();
		let context: Context = recording.clone();
		assert_ok!(dispatcher.dispatch("client1", Packet::PingReq, &context).await);

		let error = assert_err!(
			dispatcher
				.dispatch("client1", ConnAck::accepted(false).into(), &context)
				.await
		);
		assert!(matches!(
			error,
			FlowError::Protocol(ProtocolError::UnsupportedPacket(PacketType::ConnAck))
		));
		assert_eq!(recording.pushed(), vec![Packet::PingResp]);
	}
}

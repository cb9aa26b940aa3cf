//! Packet flows.
//!
//! Each flow owns the handling of a fixed set of packet types. Flows share
//! no state of their own: everything they read or write lives in the session
//! store and the packet identifier tracker.
mod connect;
mod disconnect;
mod ping;
mod publish;
mod publish_sender;
mod subscribe;
mod unsubscribe;

pub use self::{
	connect::ConnectFlow, disconnect::DisconnectFlow, ping::PingFlow, publish::PublishFlow,
	publish_sender::PublishSenderFlow, subscribe::SubscribeFlow, unsubscribe::UnsubscribeFlow,
};

use crate::{
	context::Context,
	error::{FlowError, ProtocolError, Result},
};
use async_trait::async_trait;
use mqtt_protocol::{Packet, PacketType};

#[async_trait]
pub trait Flow: Send + Sync {
	/// The packet types this flow handles.
	fn packet_types(&self) -> &'static [PacketType];

	/// Handles one packet received from `client_id`, pushing any response
	/// through `context`.
	async fn execute(&self, client_id: &str, packet: Packet, context: &Context) -> Result<()>;
}

/// The error returned when `flow` is handed a packet it does not handle.
pub(crate) fn unexpected(flow: &'static str, packet: &Packet) -> FlowError {
	ProtocolError::UnexpectedPacket {
		flow,
		packet: packet.packet_type(),
	}
	.into()
}

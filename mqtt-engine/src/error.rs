use mqtt_protocol::{PacketId, PacketType};
use std::error::Error;
use thiserror::Error;

/// Failure of a single flow invocation.
///
/// Whatever went wrong inside the flow is wrapped here, so callers at the
/// connection boundary handle one type.
#[derive(Debug, Error)]
pub enum FlowError {
	#[error("protocol error: {0}")]
	Protocol(#[from] ProtocolError),
	#[error("storage failure: {0}")]
	Storage(#[from] StorageError),
	#[error("delivery failed: {0}")]
	Delivery(#[from] DeliveryError),
}

/// The peer, or the dispatcher, broke the protocol contract.
///
/// Raised before any state is written.
#[derive(Debug, Error)]
pub enum ProtocolError {
	#[error("{flow} flow cannot handle {packet} packets")]
	UnexpectedPacket {
		flow: &'static str,
		packet: PacketType,
	},
	#[error("no flow is registered for {0} packets")]
	UnsupportedPacket(PacketType),
	#[error("unsolicited {packet} for packet identifier {id}")]
	Unsolicited { packet: PacketType, id: PacketId },
	#[error("packet identifier {id} is already in flight for client {client_id:?}")]
	PacketIdInUse { client_id: String, id: PacketId },
	#[error("every packet identifier is in flight for client {client_id:?}")]
	PacketIdsExhausted { client_id: String },
	#[error("{0}")]
	Violation(&'static str),
}

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("repository backend failed: {0}")]
	Backend(#[source] Box<dyn Error + Send + Sync>),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
	#[error("connection closed")]
	Closed,
	#[error("outbound buffer full")]
	Full,
}

impl FlowError {
	#[inline]
	pub fn is_protocol_error(&self) -> bool {
		matches!(self, Self::Protocol(_))
	}
}

pub type Result<T, E = FlowError> = std::result::Result<T, E>;

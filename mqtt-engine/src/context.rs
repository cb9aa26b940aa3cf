use crate::error::DeliveryError;
use async_trait::async_trait;
use mqtt_protocol::Packet;
use std::sync::{
	atomic::{AtomicU64, Ordering},
	Arc, PoisonError, RwLock,
};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Identifies one transport connection. Unique for the life of the process.
pub type ConnectionId = u64;

/// The outbound half of one connection, as seen by the flows.
#[async_trait]
pub trait CommunicationContext: Send + Sync {
	fn connection_id(&self) -> ConnectionId;

	/// Returns `false` once the connection has been closed from either end.
	fn is_connected(&self) -> bool;

	/// Hands `packet` to the transport.
	///
	/// Completion means the transport has the packet, not that the peer
	/// received it.
	async fn push_delivery(&self, packet: Packet) -> Result<(), DeliveryError>;

	/// Hands `packet` to the transport if it can take it right away.
	///
	/// Used for packets pushed on behalf of another Client, which must never
	/// wait on this connection.
	fn try_push_delivery(&self, packet: Packet) -> Result<(), DeliveryError>;

	/// Asks the transport to close the connection once the packets already
	/// pushed have been written.
	fn disconnect(&self);
}

pub type Context = Arc<dyn CommunicationContext>;

/// Hands out process-unique [`ConnectionId`]s.
pub fn next_connection_id() -> ConnectionId {
	static NEXT: AtomicU64 = AtomicU64::new(1);
	NEXT.fetch_add(1, Ordering::Relaxed)
}

/// A [`CommunicationContext`] over a bounded channel.
///
/// The transport owns the receiving end and writes each packet it yields to
/// the socket. When the receiver yields `None` the connection should be
/// closed.
#[derive(Debug)]
pub struct ChannelContext {
	id: ConnectionId,
	tx: RwLock<Option<mpsc::Sender<Packet>>>,
}

impl ChannelContext {
	pub fn new(buffer: usize) -> (Arc<Self>, mpsc::Receiver<Packet>) {
		let (tx, rx) = mpsc::channel(buffer);
		let context = Self {
			id: next_connection_id(),
			tx: RwLock::new(Some(tx)),
		};
		(Arc::new(context), rx)
	}

	fn sender(&self) -> Option<mpsc::Sender<Packet>> {
		self.tx
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.as_ref()
			.filter(|tx| !tx.is_closed())
			.cloned()
	}
}

#[async_trait]
impl CommunicationContext for ChannelContext {
	#[inline]
	fn connection_id(&self) -> ConnectionId {
		self.id
	}

	fn is_connected(&self) -> bool {
		self.sender().is_some()
	}

	async fn push_delivery(&self, packet: Packet) -> Result<(), DeliveryError> {
		let tx = self.sender().ok_or(DeliveryError::Closed)?;
		tracing::trace!(connection_id = self.id, packet_type = %packet.packet_type(), "pushing packet");
		tx.send(packet).await.map_err(|_| DeliveryError::Closed)
	}

	fn try_push_delivery(&self, packet: Packet) -> Result<(), DeliveryError> {
		let tx = self.sender().ok_or(DeliveryError::Closed)?;
		tracing::trace!(connection_id = self.id, packet_type = %packet.packet_type(), "pushing packet");
		tx.try_send(packet).map_err(|error| match error {
			TrySendError::Full(_) => DeliveryError::Full,
			TrySendError::Closed(_) => DeliveryError::Closed,
		})
	}

	fn disconnect(&self) {
		let tx = self
			.tx
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.take();
		if tx.is_some() {
			tracing::debug!(connection_id = self.id, "closing connection");
		}
	}
}

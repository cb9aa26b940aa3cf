use crate::{
	config::EngineConfiguration,
	connections::ConnectionRegistry,
	context::{ChannelContext, Context},
	dispatcher::FlowDispatcher,
	error::{ProtocolError, Result},
	flows::{
		ConnectFlow, DisconnectFlow, PingFlow, PublishFlow, PublishSenderFlow, SubscribeFlow,
		UnsubscribeFlow,
	},
	packet_id::PacketIdTracker,
	router::PublishRouter,
	session::{ClientSession, PacketIdentifier, PendingMessage},
	storage::{MemoryRepository, Repository},
	store::SessionStore,
};
use mqtt_protocol::{Packet, PacketType};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Handles the packets of every connection against shared session state.
///
/// The transport owns the sockets: it opens a context per connection, feeds
/// each decoded packet to [`handle`], writes out whatever the context yields
/// and reports closed sockets through [`connection_lost`].
///
/// [`handle`]: Engine::handle
/// [`connection_lost`]: Engine::connection_lost
pub struct Engine {
	config: EngineConfiguration,
	sessions: Arc<SessionStore>,
	packet_ids: Arc<PacketIdTracker>,
	connections: Arc<ConnectionRegistry>,
	router: Arc<PublishRouter>,
	disconnect: Arc<DisconnectFlow>,
	dispatcher: FlowDispatcher,
}

impl Engine {
	/// Creates an engine keeping its state in memory.
	pub fn new(config: EngineConfiguration) -> Self {
		Self::with_repositories(
			config,
			Arc::new(MemoryRepository::<ClientSession>::new()),
			Arc::new(MemoryRepository::<PacketIdentifier>::new()),
		)
	}

	/// Creates an engine over the given session and packet identifier
	/// repositories.
	pub fn with_repositories(
		config: EngineConfiguration,
		sessions: Arc<dyn Repository<ClientSession>>,
		packet_ids: Arc<dyn Repository<PacketIdentifier>>,
	) -> Self {
		let sessions = Arc::new(SessionStore::new(sessions));
		let packet_ids = Arc::new(PacketIdTracker::new(packet_ids));
		let connections = Arc::new(ConnectionRegistry::new());
		let router = Arc::new(PublishRouter::new(
			Arc::clone(&sessions),
			Arc::clone(&packet_ids),
			Arc::clone(&connections),
			config.max_pending_messages,
		));
		let disconnect = Arc::new(DisconnectFlow::new(
			Arc::clone(&sessions),
			Arc::clone(&packet_ids),
			Arc::clone(&connections),
			Arc::clone(&router),
		));

		let mut dispatcher = FlowDispatcher::new();
		dispatcher
			.register(Arc::new(ConnectFlow::new(
				Arc::clone(&sessions),
				Arc::clone(&packet_ids),
				Arc::clone(&connections),
				Arc::clone(&router),
			)))
			.register(disconnect.clone())
			.register(Arc::new(PingFlow))
			.register(Arc::new(PublishFlow::new(
				Arc::clone(&packet_ids),
				Arc::clone(&router),
			)))
			.register(Arc::new(PublishSenderFlow::new(Arc::clone(&packet_ids))))
			.register(Arc::new(SubscribeFlow::new(
				Arc::clone(&sessions),
				Arc::clone(&packet_ids),
				config.maximum_qos,
			)))
			.register(Arc::new(UnsubscribeFlow::new(
				Arc::clone(&sessions),
				Arc::clone(&packet_ids),
			)));

		Self {
			config,
			sessions,
			packet_ids,
			connections,
			router,
			disconnect,
			dispatcher,
		}
	}

	/// Opens a context for a new connection. The transport writes out every
	/// packet the receiver yields, and closes the connection when it yields
	/// `None`.
	pub fn open_connection(&self) -> (Context, mpsc::Receiver<Packet>) {
		let (context, rx) = ChannelContext::new(self.config.delivery_buffer);
		let context: Context = context;
		tracing::debug!(connection_id = context.connection_id(), "opened connection");
		(context, rx)
	}

	/// Handles one packet received on the connection behind `context`.
	///
	/// The first packet of a connection must be a Connect, and it must be the
	/// only one. A connection breaking either rule is closed. Credentials
	/// carried by the Connect are not checked here; authenticating Clients is
	/// left to the transport.
	pub async fn handle(&self, client_id: &str, packet: Packet, context: &Context) -> Result<()> {
		let connected = self.connections.is_live(client_id, context.connection_id());
		let violation = match packet.packet_type() {
			PacketType::Connect if connected => Some("second Connect on one connection"),
			PacketType::Connect => None,
			_ if !connected => Some("first packet on a connection must be a Connect"),
			_ => None,
		};

		if let Some(violation) = violation {
			tracing::warn!(client_id, connection_id = context.connection_id(), violation, "closing connection");
			context.disconnect();
			return Err(ProtocolError::Violation(violation).into());
		}

		self.dispatcher.dispatch(client_id, packet, context).await
	}

	/// Cleans up after a connection that closed without a Disconnect packet.
	/// The Client's will is published and a clean session discarded.
	pub async fn connection_lost(&self, client_id: &str, context: &Context) -> Result<()> {
		self.disconnect.close(client_id, context, false).await
	}

	/// Resends the outbound exchanges in flight for a connected Client, then
	/// delivers the messages queued for it.
	pub async fn resume(&self, client_id: &str, context: &Context) -> Result<usize> {
		self.router.resume(client_id, context).await
	}

	/// Publishes `message` on behalf of the engine itself.
	pub async fn publish(&self, message: PendingMessage) -> Result<usize> {
		self.router.route(&message).await
	}

	#[inline]
	pub fn config(&self) -> &EngineConfiguration {
		&self.config
	}

	#[inline]
	pub fn sessions(&self) -> &SessionStore {
		&self.sessions
	}

	#[inline]
	pub fn packet_ids(&self) -> &PacketIdTracker {
		&self.packet_ids
	}

	#[inline]
	pub fn connections(&self) -> &ConnectionRegistry {
		&self.connections
	}
}

impl Default for Engine {
	fn default() -> Self {
		Self::new(EngineConfiguration::default())
	}
}

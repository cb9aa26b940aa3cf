//! MQTT 3.1.1 protocol flows over shared session and packet identifier
//! state.
//!
//! The engine sits between a transport, which decodes packets off the wire,
//! and the storage holding Client sessions. Every packet a connection
//! receives goes through [`Engine::handle`], which hands it to the flow
//! for its type; responses come back out through the connection's
//! [`CommunicationContext`].
mod config;
mod connections;
mod context;
mod dispatcher;
mod engine;
mod error;
pub mod flows;
mod packet_id;
mod router;
pub mod session;
pub mod storage;
mod store;

#[cfg(test)]
mod test_support;

pub use self::{
	config::EngineConfiguration,
	connections::{Connection, ConnectionRegistry},
	context::{next_connection_id, ChannelContext, CommunicationContext, ConnectionId, Context},
	dispatcher::FlowDispatcher,
	engine::Engine,
	error::{DeliveryError, FlowError, ProtocolError, Result, StorageError},
	packet_id::PacketIdTracker,
	router::PublishRouter,
	session::{ClientSession, ClientSubscription, PendingMessage},
	store::{SessionLock, SessionStore},
};

pub use mqtt_protocol as protocol;

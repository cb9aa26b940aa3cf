//! Durable per-client state: sessions, their subscriptions, queued messages,
//! and the packet identifiers of exchanges still in flight.
use crate::storage::Entity;
use bytes::Bytes;
use mqtt_protocol::{
	misc::Will,
	packets::Publish,
	Filter, FilterBuf, PacketId, QoS, Topic, TopicBuf,
};
use std::collections::VecDeque;

/// Session state for a connected, or previously connected, Client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientSession {
	pub client_id: String,

	/// The session is discarded when the Client disconnects.
	pub clean: bool,

	/// Active subscriptions, unique by topic filter.
	pub subscriptions: Vec<ClientSubscription>,

	/// Messages waiting for the Client to reconnect.
	pub pending_messages: VecDeque<PendingMessage>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientSubscription {
	pub client_id: String,
	pub topic_filter: FilterBuf,
	pub maximum_qos: QoS,
}

/// An application message on its way to a Client.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PendingMessage {
	pub topic: TopicBuf,
	pub payload: Bytes,
	pub qos: QoS,
	pub retain: bool,
}

impl ClientSession {
	pub fn new(client_id: impl Into<String>, clean: bool) -> Self {
		Self {
			client_id: client_id.into(),
			clean,
			..Default::default()
		}
	}

	/// Adds a subscription, or replaces the QoS of an existing subscription
	/// with the same filter.
	///
	/// Returns `true` if an existing subscription was replaced.
	pub fn subscribe(&mut self, topic_filter: FilterBuf, maximum_qos: QoS) -> bool {
		if let Some(existing) = self
			.subscriptions
			.iter_mut()
			.find(|sub| sub.topic_filter == topic_filter)
		{
			existing.maximum_qos = maximum_qos;
			return true;
		}

		self.subscriptions.push(ClientSubscription {
			client_id: self.client_id.clone(),
			topic_filter,
			maximum_qos,
		});
		false
	}

	/// Removes the subscription for `topic_filter`, returning `true` if there
	/// was one.
	pub fn unsubscribe(&mut self, topic_filter: &Filter) -> bool {
		let before = self.subscriptions.len();
		self.subscriptions
			.retain(|sub| &*sub.topic_filter != topic_filter);
		self.subscriptions.len() != before
	}

	/// Returns the highest QoS among the subscriptions matching `topic`, or
	/// `None` if nothing matches.
	pub fn matching_qos(&self, topic: &Topic) -> Option<QoS> {
		self.subscriptions
			.iter()
			.filter(|sub| sub.topic_filter.matches_topic(topic).is_some())
			.map(|sub| sub.maximum_qos)
			.max()
	}

	/// Queues a message for delivery on reconnect, dropping the oldest queued
	/// message once `limit` is reached.
	///
	/// Returns the dropped message, if any.
	pub fn enqueue(&mut self, message: PendingMessage, limit: usize) -> Option<PendingMessage> {
		if limit == 0 {
			return Some(message);
		}

		let dropped = (self.pending_messages.len() >= limit)
			.then(|| self.pending_messages.pop_front())
			.flatten();
		self.pending_messages.push_back(message);
		dropped
	}
}

impl PendingMessage {
	/// Builds the Publish packet delivering this message.
	///
	/// `id` must be present unless the message is [`QoS::AtMostOnce`].
	pub fn to_publish(&self, id: Option<PacketId>, duplicate: bool) -> Option<Publish> {
		Publish::new(
			self.topic.clone(),
			self.payload.clone(),
			self.qos,
			self.retain,
			id,
			duplicate,
		)
	}

	/// Returns a copy of the message downgraded to at most `qos`.
	#[inline]
	pub fn with_maximum_qos(&self, qos: QoS) -> Self {
		Self {
			qos: self.qos.min(qos),
			..self.clone()
		}
	}
}

impl From<&Publish> for PendingMessage {
	fn from(publish: &Publish) -> Self {
		Self {
			topic: publish.topic().clone(),
			payload: publish.payload().clone(),
			qos: publish.qos(),
			retain: publish.retain(),
		}
	}
}

impl From<Will> for PendingMessage {
	fn from(will: Will) -> Self {
		let Will {
			topic,
			payload,
			qos,
			retain,
		} = will;
		Self {
			topic,
			payload,
			qos,
			retain,
		}
	}
}

/// Which side of the connection chose a packet identifier.
///
/// MQTT gives each direction its own identifier space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
	/// Chosen by the Client, for packets it sent.
	Inbound,
	/// Chosen by the engine, for packets sent to the Client.
	Outbound,
}

/// The acknowledgment an in-flight exchange is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Awaiting {
	PubAck,
	PubRec,
	PubComp,
	PubRel,
	SubAck,
	UnsubAck,
}

/// An exchange awaiting acknowledgment.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PacketIdentifier {
	pub client_id: String,
	pub direction: Direction,
	pub id: PacketId,
	pub awaiting: Awaiting,

	/// For outbound exchanges, the message being delivered, kept until the
	/// receiver has it so it can be sent again. For inbound QoS 2 receipts,
	/// the message until it has been routed.
	pub message: Option<PendingMessage>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PacketIdKey {
	pub client_id: String,
	pub direction: Direction,
	pub id: PacketId,
}

impl PacketIdentifier {
	pub fn new(
		client_id: impl Into<String>,
		direction: Direction,
		id: PacketId,
		awaiting: Awaiting,
	) -> Self {
		Self {
			client_id: client_id.into(),
			direction,
			id,
			awaiting,
			message: None,
		}
	}

	/// Builds the packet that repeats the last step of this exchange, for
	/// outbound exchanges the engine must resend on reconnect.
	pub fn retransmission(&self) -> Option<Publish> {
		match self.awaiting {
			Awaiting::PubAck | Awaiting::PubRec => self
				.message
				.as_ref()
				.and_then(|message| message.to_publish(Some(self.id), true)),
			_ => None,
		}
	}
}

impl PacketIdKey {
	pub fn new(client_id: impl Into<String>, direction: Direction, id: PacketId) -> Self {
		Self {
			client_id: client_id.into(),
			direction,
			id,
		}
	}
}

impl Entity for ClientSession {
	type Key = String;

	#[inline]
	fn key(&self) -> Self::Key {
		self.client_id.clone()
	}
}

impl Entity for PacketIdentifier {
	type Key = PacketIdKey;

	#[inline]
	fn key(&self) -> Self::Key {
		PacketIdKey::new(self.client_id.clone(), self.direction, self.id)
	}
}

use crate::{
	connections::ConnectionRegistry,
	context::Context,
	error::{ProtocolError, Result},
	packet_id::PacketIdTracker,
	session::{Awaiting, PendingMessage},
	store::SessionStore,
};
use mqtt_protocol::{
	packets::{PubRel, Publish},
	Packet, QoS,
};
use std::{mem, sync::Arc};

/// Delivers application messages to the Clients subscribed to them.
pub struct PublishRouter {
	sessions: Arc<SessionStore>,
	packet_ids: Arc<PacketIdTracker>,
	connections: Arc<ConnectionRegistry>,
	max_pending_messages: usize,
}

impl PublishRouter {
	pub fn new(
		sessions: Arc<SessionStore>,
		packet_ids: Arc<PacketIdTracker>,
		connections: Arc<ConnectionRegistry>,
		max_pending_messages: usize,
	) -> Self {
		Self {
			sessions,
			packet_ids,
			connections,
			max_pending_messages,
		}
	}

	/// Sends `message` to every subscriber, at no more than the QoS each
	/// subscribed with. Subscribers that are not connected get the message
	/// queued in their session instead.
	///
	/// A failure to deliver to one subscriber is logged and does not stop
	/// delivery to the others. Only failing to look up the subscribers is an
	/// error.
	///
	/// Returns the number of subscribers the message was handed to.
	pub async fn route(&self, message: &PendingMessage) -> Result<usize> {
		let subscribers = self.sessions.subscribers(&message.topic).await?;
		tracing::debug!(topic = %message.topic, subscribers = subscribers.len(), "routing message");

		let mut delivered = 0;
		for (client_id, qos) in subscribers {
			let result = match self.connections.get(&client_id) {
				Some(context) if context.is_connected() => self
					.deliver(&client_id, &context, message.with_maximum_qos(qos))
					.await
					.map(|pushed| delivered += usize::from(pushed)),
				_ => self.store(&client_id, message.with_maximum_qos(qos)).await,
			};

			if let Err(error) = result {
				tracing::warn!(client_id = %client_id, topic = %message.topic, %error, "failed to route message");
			}
		}

		Ok(delivered)
	}

	/// Pushes `message` to a connected Client without waiting on its
	/// connection, tracking a packet identifier for acknowledged QoS levels.
	///
	/// A message the connection cannot take right away is dropped at QoS 0
	/// and left in flight otherwise, to be resent when the Client resumes its
	/// session. Returns `true` if the connection took the message.
	pub async fn deliver(&self, client_id: &str, context: &Context, message: PendingMessage) -> Result<bool> {
		let qos = message.qos;
		let publish = self.prepare(client_id, message).await?;

		match context.try_push_delivery(publish.into()) {
			Ok(()) => Ok(true),
			Err(error) => {
				tracing::warn!(client_id, %qos, %error, "failed to push message");
				Ok(false)
			}
		}
	}

	/// Builds the Publish delivering `message` to `client_id`, allocating its
	/// packet identifier if the QoS needs one.
	async fn prepare(&self, client_id: &str, message: PendingMessage) -> Result<Publish> {
		// Established subscriptions never see the retain flag.
		let message = PendingMessage {
			retain: false,
			..message
		};

		let id = match message.qos {
			QoS::AtMostOnce => None,
			QoS::AtLeastOnce => Some(
				self.packet_ids
					.allocate(client_id, Awaiting::PubAck, Some(message.clone()))
					.await?,
			),
			QoS::ExactlyOnce => Some(
				self.packet_ids
					.allocate(client_id, Awaiting::PubRec, Some(message.clone()))
					.await?,
			),
		};

		let publish = message
			.to_publish(id, false)
			.ok_or(ProtocolError::Violation("acknowledged delivery without a packet identifier"))?;
		Ok(publish)
	}

	/// Resends the outbound exchanges left in flight by a previous connection,
	/// then delivers the messages queued while the Client was away.
	///
	/// Unlike [`deliver`](Self::deliver), this waits for the connection to
	/// take each packet. Returns the number of packets pushed.
	pub async fn resume(&self, client_id: &str, context: &Context) -> Result<usize> {
		let mut pushed = 0;

		for record in self.packet_ids.outbound(client_id).await? {
			let packet: Packet = match record.awaiting {
				Awaiting::PubAck | Awaiting::PubRec => match record.retransmission() {
					Some(publish) => publish.into(),
					None => continue,
				},
				Awaiting::PubComp => PubRel { id: record.id }.into(),
				Awaiting::PubRel | Awaiting::SubAck | Awaiting::UnsubAck => continue,
			};

			tracing::debug!(client_id, id = %record.id, awaiting = ?record.awaiting, "resending in-flight packet");
			context.push_delivery(packet).await?;
			pushed += 1;
		}

		let pending = {
			let _lock = self.sessions.lock(client_id).await;
			let Some(mut session) = self.sessions.get(client_id).await? else {
				return Ok(pushed);
			};

			let pending = mem::take(&mut session.pending_messages);
			if !pending.is_empty() {
				self.sessions.update(session).await?;
			}
			pending
		};

		if !pending.is_empty() {
			tracing::debug!(client_id, count = pending.len(), "delivering queued messages");
		}

		for message in pending {
			let publish = self.prepare(client_id, message).await?;
			context.push_delivery(publish.into()).await?;
			pushed += 1;
		}

		Ok(pushed)
	}

	/// Queues `message` for a disconnected Client with a persistent session.
	async fn store(&self, client_id: &str, message: PendingMessage) -> Result<()> {
		if !message.qos.is_acknowledged() {
			tracing::trace!(client_id, topic = %message.topic, "dropping QoS 0 message for offline client");
			return Ok(());
		}

		let _lock = self.sessions.lock(client_id).await;
		let Some(mut session) = self.sessions.get(client_id).await? else {
			return Ok(());
		};

		if session.clean {
			tracing::trace!(client_id, topic = %message.topic, "dropping message for clean session");
			return Ok(());
		}

		if let Some(dropped) = session.enqueue(message, self.max_pending_messages) {
			tracing::warn!(
				client_id,
				topic = %dropped.topic,
				limit = self.max_pending_messages,
				"pending message queue full, dropping oldest message"
			);
		}

		self.sessions.update(session).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::PublishRouter;
	use crate::{
		connections::ConnectionRegistry,
		context::{ChannelContext, Context},
		packet_id::PacketIdTracker,
		session::{Awaiting, ClientSession, Direction, PacketIdentifier, PendingMessage},
		storage::{MemoryRepository, Repository},
		store::SessionStore,
		test_support::RecordingRepository,
	};
	use bytes::Bytes;
	use mqtt_protocol::{packets::Publish, FilterBuf, Packet, QoS, TopicBuf};
	use std::{sync::Arc, time::Duration};
	use tokio::time::timeout;
	use tokio_test::assert_ok;

	struct Fixture {
		sessions: Arc<SessionStore>,
		packet_ids: Arc<PacketIdTracker>,
		connections: Arc<ConnectionRegistry>,
		router: PublishRouter,
	}

	fn fixture(max_pending_messages: usize) -> Fixture {
		fixture_over(max_pending_messages, Arc::new(MemoryRepository::new()))
	}

	fn fixture_over(
		max_pending_messages: usize,
		packet_ids: Arc<dyn Repository<PacketIdentifier>>,
	) -> Fixture {
		let sessions = Arc::new(SessionStore::in_memory());
		let packet_ids = Arc::new(PacketIdTracker::new(packet_ids));
		let connections = Arc::new(ConnectionRegistry::new());
		let router = PublishRouter::new(
			Arc::clone(&sessions),
			Arc::clone(&packet_ids),
			Arc::clone(&connections),
			max_pending_messages,
		);
		Fixture {
			sessions,
			packet_ids,
			connections,
			router,
		}
	}

	fn message(topic: &str, qos: QoS) -> PendingMessage {
		PendingMessage {
			topic: TopicBuf::new(topic).unwrap(),
			payload: Bytes::from_static(b"21.5"),
			qos,
			retain: false,
		}
	}

	async fn subscribe(sessions: &SessionStore, client_id: &str, clean: bool, filter: &str, qos: QoS) {
		let mut session = ClientSession::new(client_id, clean);
		session.subscribe(FilterBuf::new(filter).unwrap(), qos);
		sessions.update(session).await.unwrap();
	}

	#[tokio::test]
	async fn delivers_at_the_lower_qos_and_tracks_acknowledged_deliveries() {
		let Fixture {
			sessions,
			packet_ids,
			connections,
			router,
		} = fixture(10);
		subscribe(&sessions, "subscriber", true, "sensors/#", QoS::AtLeastOnce).await;

		let (context, mut rx) = ChannelContext::new(8);
		connections.register("subscriber", context, None);

		let delivered = assert_ok!(router.route(&message("sensors/temperature", QoS::ExactlyOnce)).await);
		assert_eq!(delivered, 1);

		let Some(Packet::Publish(publish)) = rx.recv().await else {
			panic!("expected a Publish packet");
		};
		assert!(matches!(*publish, Publish::AtLeastOnce { duplicate: false, .. }));

		let id = publish.id().unwrap();
		let record = assert_ok!(packet_ids.get("subscriber", Direction::Outbound, id).await).unwrap();
		assert_eq!(record.awaiting, Awaiting::PubAck);
	}

	#[tokio::test]
	async fn queues_for_offline_persistent_sessions_only() {
		let Fixture {
			sessions, router, ..
		} = fixture(10);
		subscribe(&sessions, "persistent", false, "a/+", QoS::ExactlyOnce).await;
		subscribe(&sessions, "clean", true, "a/+", QoS::ExactlyOnce).await;

		assert_eq!(assert_ok!(router.route(&message("a/b", QoS::AtLeastOnce)).await), 0);
		assert_eq!(assert_ok!(router.route(&message("a/b", QoS::AtMostOnce)).await), 0);

		let persistent = assert_ok!(sessions.get("persistent").await).unwrap();
		assert_eq!(persistent.pending_messages.len(), 1);
		assert_eq!(persistent.pending_messages[0].qos, QoS::AtLeastOnce);

		let clean = assert_ok!(sessions.get("clean").await).unwrap();
		assert!(clean.pending_messages.is_empty());
	}

	#[tokio::test]
	async fn resume_resends_in_flight_then_drains_queue() {
		let Fixture {
			sessions,
			packet_ids,
			router,
			..
		} = fixture(10);
		subscribe(&sessions, "client1", false, "a/#", QoS::ExactlyOnce).await;

		let in_flight = assert_ok!(
			packet_ids
				.allocate("client1", Awaiting::PubAck, Some(message("a/1", QoS::AtLeastOnce)))
				.await
		);
		let released = assert_ok!(packet_ids.allocate("client1", Awaiting::PubComp, None).await);
		assert_ok!(router.route(&message("a/2", QoS::ExactlyOnce)).await);

		let (context, mut rx) = ChannelContext::new(8);
		let context: Context = context;
		assert_eq!(assert_ok!(router.resume("client1", &context).await), 3);

		let Some(Packet::Publish(first)) = rx.recv().await else {
			panic!("expected the in-flight Publish");
		};
		assert_eq!(first.id(), Some(in_flight));
		assert!(first.duplicate());

		assert_eq!(
			rx.recv().await,
			Some(Packet::PubRel(mqtt_protocol::packets::PubRel { id: released }))
		);

		let Some(Packet::Publish(queued)) = rx.recv().await else {
			panic!("expected the queued Publish");
		};
		assert_eq!(queued.topic().as_str(), "a/2");
		assert!(!queued.duplicate());

		let session = assert_ok!(sessions.get("client1").await).unwrap();
		assert!(session.pending_messages.is_empty());
	}

	#[tokio::test]
	async fn full_subscribers_do_not_hold_up_routing() {
		let Fixture {
			sessions,
			packet_ids,
			connections,
			router,
		} = fixture(10);
		subscribe(&sessions, "slow", true, "a/#", QoS::AtLeastOnce).await;

		// Nobody drains the slow subscriber's connection.
		let (context, mut rx) = ChannelContext::new(1);
		connections.register("slow", context, None);

		for _ in 0..3 {
			let routed = timeout(Duration::from_secs(1), router.route(&message("a/b", QoS::AtLeastOnce))).await;
			assert_ok!(assert_ok!(routed));
		}

		assert!(matches!(rx.try_recv(), Ok(Packet::Publish(_))));
		assert!(rx.try_recv().is_err());

		// Whatever the connection could not take stays in flight for resume.
		assert_eq!(assert_ok!(packet_ids.outbound("slow").await).len(), 3);
	}

	#[tokio::test]
	async fn one_failing_subscriber_does_not_fail_the_others() {
		let repository = RecordingRepository::<PacketIdentifier>::new();
		let Fixture {
			sessions,
			connections,
			router,
			..
		} = fixture_over(10, repository.clone());
		subscribe(&sessions, "first", true, "a/b", QoS::AtLeastOnce).await;
		subscribe(&sessions, "second", true, "a/b", QoS::AtLeastOnce).await;

		let (first, mut first_rx) = ChannelContext::new(4);
		let (second, mut second_rx) = ChannelContext::new(4);
		connections.register("first", first, None);
		connections.register("second", second, None);

		// Allocating the packet identifier for one of them fails.
		repository.fail_next_update();
		let delivered = assert_ok!(router.route(&message("a/b", QoS::AtLeastOnce)).await);
		assert_eq!(delivered, 1);

		let received = [first_rx.try_recv().is_ok(), second_rx.try_recv().is_ok()];
		assert_eq!(received.iter().filter(|received| **received).count(), 1);
	}

	#[tokio::test]
	async fn deliveries_clear_the_retain_flag() {
		let Fixture {
			sessions,
			connections,
			router,
			..
		} = fixture(10);
		subscribe(&sessions, "subscriber", true, "a/b", QoS::AtMostOnce).await;
		let (context, mut rx) = ChannelContext::new(4);
		connections.register("subscriber", context, None);

		let retained = PendingMessage {
			retain: true,
			..message("a/b", QoS::AtMostOnce)
		};
		assert_eq!(assert_ok!(router.route(&retained).await), 1);

		let Some(Packet::Publish(publish)) = rx.recv().await else {
			panic!("expected a Publish packet");
		};
		assert!(!publish.retain());
	}
}

use super::{unexpected, Flow};
use crate::{
	context::Context,
	error::{ProtocolError, Result},
	packet_id::PacketIdTracker,
	session::{ClientSession, Direction},
	store::SessionStore,
};
use async_trait::async_trait;
use mqtt_protocol::{
	packets::{SubAck, Subscribe},
	Packet, PacketType, QoS,
};
use std::sync::Arc;

/// Handles Subscribe requests from Clients, and the SubAck for Subscribe
/// requests sent to them.
pub struct SubscribeFlow {
	sessions: Arc<SessionStore>,
	packet_ids: Arc<PacketIdTracker>,
	maximum_qos: QoS,
}

impl SubscribeFlow {
	pub fn new(sessions: Arc<SessionStore>, packet_ids: Arc<PacketIdTracker>, maximum_qos: QoS) -> Self {
		Self {
			sessions,
			packet_ids,
			maximum_qos,
		}
	}

	async fn subscribe(&self, client_id: &str, subscribe: Subscribe, context: &Context) -> Result<()> {
		let Subscribe { id, filters } = subscribe;
		if filters.is_empty() {
			return Err(ProtocolError::Violation("Subscribe packet without topic filters").into());
		}

		let mut result = Vec::with_capacity(filters.len());
		{
			let _lock = self.sessions.lock(client_id).await;
			let mut session = self
				.sessions
				.get(client_id)
				.await?
				.unwrap_or_else(|| ClientSession::new(client_id, true));

			for (filter, requested) in filters {
				let granted = requested.min(self.maximum_qos);
				tracing::debug!(client_id, %filter, %requested, %granted, "subscribing");
				session.subscribe(filter, granted);
				result.push(Ok(granted));
			}

			self.sessions.update(session).await?;
		}

		context.push_delivery(SubAck { id, result }.into()).await?;
		Ok(())
	}
}

#[async_trait]
impl Flow for SubscribeFlow {
	fn packet_types(&self) -> &'static [PacketType] {
		&[PacketType::Subscribe, PacketType::SubAck]
	}

	async fn execute(&self, client_id: &str, packet: Packet, context: &Context) -> Result<()> {
		match packet {
			Packet::Subscribe(subscribe) => self.subscribe(client_id, *subscribe, context).await,
			Packet::SubAck(suback) => {
				self.packet_ids
					.delete(client_id, Direction::Outbound, suback.id)
					.await?;
				tracing::debug!(client_id, id = %suback.id, "subscribe acknowledged");
				Ok(())
			}
			packet => Err(unexpected("Subscribe", &packet)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::SubscribeFlow;
	use crate::{
		context::Context,
		error::FlowError,
		flows::{Flow, UnsubscribeFlow},
		packet_id::PacketIdTracker,
		session::ClientSession,
		store::SessionStore,
		test_support::{RecordingContext, RecordingRepository},
	};
	use mqtt_protocol::{
		packets::{SubAck, Subscribe, Unsubscribe},
		FilterBuf, Packet, PacketId, QoS,
	};
	use std::sync::Arc;
	use tokio_test::{assert_err, assert_ok};

	fn subscribe(id: u16, filters: &[(&str, QoS)]) -> Packet {
		Subscribe {
			id: PacketId::new(id).unwrap(),
			filters: filters
				.iter()
				.map(|(filter, qos)| (FilterBuf::new(*filter).unwrap(), *qos))
				.collect(),
		}
		.into()
	}

	#[tokio::test]
	async fn grants_at_most_the_configured_qos() {
		let sessions = RecordingRepository::<ClientSession>::new();
		let flow = SubscribeFlow::new(
			Arc::new(SessionStore::new(sessions.clone())),
			Arc::new(PacketIdTracker::in_memory()),
			QoS::AtLeastOnce,
		);

		let recording = RecordingContext::new();
		let context: Context = recording.clone();
		let packet = subscribe(
			9,
			&[("sensors/#", QoS::ExactlyOnce), ("lights/+", QoS::AtMostOnce)],
		);
		assert_ok!(flow.execute("client1", packet, &context).await);

		// No session existed, so a clean one is created.
		let session = sessions.peek(&String::from("client1")).await.unwrap();
		assert!(session.clean);
		assert_eq!(session.subscriptions.len(), 2);
		assert_eq!(session.subscriptions[0].maximum_qos, QoS::AtLeastOnce);
		assert_eq!(session.subscriptions[1].maximum_qos, QoS::AtMostOnce);

		assert_eq!(
			recording.pushed(),
			vec![Packet::SubAck(Box::new(SubAck {
				id: PacketId::new(9).unwrap(),
				result: vec![Ok(QoS::AtLeastOnce), Ok(QoS::AtMostOnce)],
			}))]
		);
	}

	#[tokio::test]
	async fn repeated_subscribe_leaves_the_same_state() {
		let sessions = RecordingRepository::<ClientSession>::new();
		sessions.seed(ClientSession::new("client1", false)).await;
		let flow = SubscribeFlow::new(
			Arc::new(SessionStore::new(sessions.clone())),
			Arc::new(PacketIdTracker::in_memory()),
			QoS::ExactlyOnce,
		);

		let recording = RecordingContext::new();
		let context: Context = recording.clone();
		let packet = subscribe(3, &[("a/b", QoS::ExactlyOnce)]);
		assert_ok!(flow.execute("client1", packet.clone(), &context).await);
		let once = sessions.peek(&String::from("client1")).await.unwrap();

		assert_ok!(flow.execute("client1", packet, &context).await);
		let twice = sessions.peek(&String::from("client1")).await.unwrap();

		assert_eq!(once, twice);
		assert!(!twice.clean);
		assert_eq!(recording.pushed().len(), 2);
		assert_eq!(recording.pushed()[0], recording.pushed()[1]);
	}

	#[tokio::test]
	async fn empty_subscribe_is_a_protocol_error() {
		let sessions = RecordingRepository::<ClientSession>::new();
		let flow = SubscribeFlow::new(
			Arc::new(SessionStore::new(sessions.clone())),
			Arc::new(PacketIdTracker::in_memory()),
			QoS::ExactlyOnce,
		);

		let recording = RecordingContext::new();
		let context: Context = recording.clone();
		let error = assert_err!(flow.execute("client1", subscribe(1, &[]), &context).await);
		assert!(error.is_protocol_error());
		assert_eq!(sessions.update_count(), 0);
		assert!(recording.pushed().is_empty());
	}

	#[tokio::test]
	async fn ping_is_not_a_subscribe_packet() {
		let flow = SubscribeFlow::new(
			Arc::new(SessionStore::in_memory()),
			Arc::new(PacketIdTracker::in_memory()),
			QoS::ExactlyOnce,
		);

		let recording = RecordingContext::new();
		let context: Context = recording.clone();
		let error = assert_err!(flow.execute("client1", Packet::PingReq, &context).await);
		assert!(matches!(error, FlowError::Protocol(_)));
		assert!(recording.pushed().is_empty());
	}

	#[tokio::test]
	async fn storage_failures_leave_the_session_unchanged() {
		let sessions = RecordingRepository::<ClientSession>::new();
		let mut session = ClientSession::new("client1", false);
		session.subscribe(FilterBuf::new("a/b").unwrap(), QoS::AtMostOnce);
		sessions.seed(session.clone()).await;
		let flow = SubscribeFlow::new(
			Arc::new(SessionStore::new(sessions.clone())),
			Arc::new(PacketIdTracker::in_memory()),
			QoS::ExactlyOnce,
		);

		let recording = RecordingContext::new();
		let context: Context = recording.clone();
		let packet = subscribe(5, &[("c/d", QoS::AtLeastOnce)]);

		sessions.fail_next_update();
		let error = assert_err!(flow.execute("client1", packet.clone(), &context).await);
		assert!(matches!(error, FlowError::Storage(_)));
		assert!(recording.pushed().is_empty());
		assert_eq!(sessions.peek(&String::from("client1")).await.unwrap(), session);

		assert_ok!(flow.execute("client1", packet, &context).await);
		assert_eq!(recording.pushed().len(), 1);
		let session = sessions.peek(&String::from("client1")).await.unwrap();
		assert_eq!(session.subscriptions.len(), 2);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_subscribe_and_unsubscribe_keep_every_change() {
		let store = Arc::new(SessionStore::in_memory());
		let packet_ids = Arc::new(PacketIdTracker::in_memory());
		let mut session = ClientSession::new("client1", false);
		for n in 0..16 {
			session.subscribe(FilterBuf::new(format!("old/{n}")).unwrap(), QoS::AtMostOnce);
		}
		assert_ok!(store.update(session).await);

		let subscribe_flow = Arc::new(SubscribeFlow::new(
			Arc::clone(&store),
			Arc::clone(&packet_ids),
			QoS::ExactlyOnce,
		));
		let unsubscribe_flow = Arc::new(UnsubscribeFlow::new(Arc::clone(&store), packet_ids));

		let mut tasks = Vec::new();
		for n in 0..16u16 {
			let flow = Arc::clone(&subscribe_flow);
			tasks.push(tokio::spawn(async move {
				let context: Context = RecordingContext::new();
				let filter = format!("new/{n}");
				flow.execute("client1", subscribe(n + 1, &[(filter.as_str(), QoS::AtLeastOnce)]), &context)
					.await
			}));

			let flow = Arc::clone(&unsubscribe_flow);
			tasks.push(tokio::spawn(async move {
				let context: Context = RecordingContext::new();
				let packet = Unsubscribe {
					id: PacketId::new(n + 100).unwrap(),
					filters: vec![FilterBuf::new(format!("old/{n}")).unwrap()],
				};
				flow.execute("client1", packet.into(), &context).await
			}));
		}

		for task in tasks {
			assert_ok!(assert_ok!(task.await));
		}

		let session = assert_ok!(store.get("client1").await).unwrap();
		assert_eq!(session.subscriptions.len(), 16);
		assert!(session
			.subscriptions
			.iter()
			.all(|sub| sub.topic_filter.as_str().starts_with("new/")));
	}
}

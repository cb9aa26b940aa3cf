use crate::{
	error::{ProtocolError, Result},
	session::{Awaiting, Direction, PacketIdKey, PacketIdentifier, PendingMessage},
	storage::{Entity, KeyedLocks, MemoryRepository, Repository},
};
use dashmap::DashMap;
use mqtt_protocol::{misc::WrappingNonZeroU16, PacketId};
use std::{collections::HashSet, sync::Arc};

/// Tracks the packet identifiers of exchanges still waiting for their final
/// acknowledgment.
///
/// Adding, allocating and clearing identifiers for a Client is serialized per
/// Client; different Clients proceed independently.
pub struct PacketIdTracker {
	repository: Arc<dyn Repository<PacketIdentifier>>,
	locks: KeyedLocks,

	/// The last outbound identifier handed out to each Client.
	next_ids: DashMap<String, WrappingNonZeroU16>,
}

impl PacketIdTracker {
	pub fn new(repository: Arc<dyn Repository<PacketIdentifier>>) -> Self {
		Self {
			repository,
			locks: KeyedLocks::new(),
			next_ids: DashMap::new(),
		}
	}

	pub fn in_memory() -> Self {
		Self::new(Arc::new(MemoryRepository::new()))
	}

	/// Starts tracking `record`.
	///
	/// Fails if its identifier is already in flight.
	pub async fn add(&self, record: PacketIdentifier) -> Result<()> {
		let _lock = self.locks.lock(&record.client_id).await;

		let key = record.key();
		if self.repository.get(&key).await?.is_some() {
			return Err(ProtocolError::PacketIdInUse {
				client_id: record.client_id,
				id: record.id,
			}
			.into());
		}

		self.repository.update(record).await?;
		Ok(())
	}

	/// Moves a tracked exchange on to its next step.
	pub async fn replace(&self, record: PacketIdentifier) -> Result<()> {
		let _lock = self.locks.lock(&record.client_id).await;
		self.repository.update(record).await?;
		Ok(())
	}

	pub async fn get(
		&self,
		client_id: &str,
		direction: Direction,
		id: PacketId,
	) -> Result<Option<PacketIdentifier>> {
		Ok(self
			.repository
			.get(&PacketIdKey::new(client_id, direction, id))
			.await?)
	}

	#[inline]
	pub async fn exists(&self, client_id: &str, direction: Direction, id: PacketId) -> Result<bool> {
		Ok(self.get(client_id, direction, id).await?.is_some())
	}

	pub async fn delete(&self, client_id: &str, direction: Direction, id: PacketId) -> Result<()> {
		self.repository
			.delete(&PacketIdKey::new(client_id, direction, id))
			.await?;
		Ok(())
	}

	/// Picks the next outbound identifier not in flight for `client_id` and
	/// records it, awaiting `awaiting`.
	pub async fn allocate(
		&self,
		client_id: &str,
		awaiting: Awaiting,
		message: Option<PendingMessage>,
	) -> Result<PacketId> {
		let _lock = self.locks.lock(client_id).await;

		let in_use: HashSet<PacketId> = self
			.outbound_unlocked(client_id)
			.await?
			.into_iter()
			.map(|record| record.id)
			.collect();

		if in_use.len() >= usize::from(u16::MAX) {
			return Err(ProtocolError::PacketIdsExhausted {
				client_id: client_id.to_owned(),
			}
			.into());
		}

		let id = {
			let mut next_id = self
				.next_ids
				.entry(client_id.to_owned())
				.or_insert(WrappingNonZeroU16::MAX);
			loop {
				*next_id += 1;
				if !in_use.contains(&next_id.get()) {
					break next_id.get();
				}
			}
		};

		let mut record = PacketIdentifier::new(client_id, Direction::Outbound, id, awaiting);
		record.message = message;
		self.repository.update(record).await?;

		tracing::trace!(client_id, %id, ?awaiting, "allocated packet identifier");
		Ok(id)
	}

	/// Returns the outbound exchanges in flight for `client_id`, oldest
	/// identifier first.
	pub async fn outbound(&self, client_id: &str) -> Result<Vec<PacketIdentifier>> {
		let _lock = self.locks.lock(client_id).await;
		self.outbound_unlocked(client_id).await
	}

	/// Forgets every exchange of `client_id`, in both directions.
	pub async fn clear(&self, client_id: &str) -> Result<usize> {
		let removed = {
			let _lock = self.locks.lock(client_id).await;
			self.next_ids.remove(client_id);
			self.repository
				.delete_where(&|record: &PacketIdentifier| record.client_id == client_id)
				.await?
		};

		self.locks.prune();
		if removed > 0 {
			tracing::debug!(client_id, removed, "cleared packet identifiers");
		}
		Ok(removed)
	}

	async fn outbound_unlocked(&self, client_id: &str) -> Result<Vec<PacketIdentifier>> {
		let mut records = self
			.repository
			.find(&|record: &PacketIdentifier| {
				record.client_id == client_id && record.direction == Direction::Outbound
			})
			.await?;
		records.sort_by_key(|record| record.id);
		Ok(records)
	}
}

#[cfg(test)]
mod tests {
	use super::PacketIdTracker;
	use crate::{
		error::{FlowError, ProtocolError},
		session::{Awaiting, Direction, PacketIdentifier},
	};
	use mqtt_protocol::PacketId;
	use std::sync::Arc;
	use tokio_test::{assert_err, assert_ok};

	fn id(value: u16) -> PacketId {
		PacketId::new(value).unwrap()
	}

	#[tokio::test]
	async fn rejects_identifiers_in_flight() {
		let tracker = PacketIdTracker::in_memory();
		let record = PacketIdentifier::new("client1", Direction::Inbound, id(10), Awaiting::PubRel);

		assert_ok!(tracker.add(record.clone()).await);
		let error = assert_err!(tracker.add(record).await);
		assert!(matches!(
			error,
			FlowError::Protocol(ProtocolError::PacketIdInUse { .. })
		));

		// The other direction and other clients have their own identifiers.
		assert_ok!(
			tracker
				.add(PacketIdentifier::new("client1", Direction::Outbound, id(10), Awaiting::PubAck))
				.await
		);
		assert_ok!(
			tracker
				.add(PacketIdentifier::new("client2", Direction::Inbound, id(10), Awaiting::PubRel))
				.await
		);

		assert!(assert_ok!(tracker.exists("client1", Direction::Inbound, id(10)).await));
		assert_ok!(tracker.delete("client1", Direction::Inbound, id(10)).await);
		assert!(!assert_ok!(tracker.exists("client1", Direction::Inbound, id(10)).await));
	}

	#[tokio::test]
	async fn allocates_sequentially_skipping_identifiers_in_flight() {
		let tracker = PacketIdTracker::in_memory();

		assert_ok!(
			tracker
				.add(PacketIdentifier::new("client1", Direction::Outbound, id(2), Awaiting::PubAck))
				.await
		);

		let first = assert_ok!(tracker.allocate("client1", Awaiting::PubAck, None).await);
		let second = assert_ok!(tracker.allocate("client1", Awaiting::PubRec, None).await);
		assert_eq!(first, id(1));
		assert_eq!(second, id(3));

		// Each client has its own sequence.
		let other = assert_ok!(tracker.allocate("client2", Awaiting::PubAck, None).await);
		assert_eq!(other, id(1));

		let outbound = assert_ok!(tracker.outbound("client1").await);
		let ids: Vec<_> = outbound.iter().map(|record| record.id.get()).collect();
		assert_eq!(ids, vec![1, 2, 3]);
	}

	#[tokio::test]
	async fn clears_one_client() {
		let tracker = PacketIdTracker::in_memory();
		assert_ok!(tracker.allocate("client1", Awaiting::PubAck, None).await);
		assert_ok!(
			tracker
				.add(PacketIdentifier::new("client1", Direction::Inbound, id(5), Awaiting::PubRel))
				.await
		);
		assert_ok!(tracker.allocate("client2", Awaiting::PubAck, None).await);

		assert_eq!(assert_ok!(tracker.clear("client1").await), 2);
		assert!(assert_ok!(tracker.outbound("client1").await).is_empty());
		assert_eq!(assert_ok!(tracker.outbound("client2").await).len(), 1);

		// The sequence restarts after a clean start.
		let first = assert_ok!(tracker.allocate("client1", Awaiting::PubAck, None).await);
		assert_eq!(first, id(1));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_allocations_never_collide() {
		let tracker = Arc::new(PacketIdTracker::in_memory());

		let tasks: Vec<_> = (0..64)
			.map(|_| {
				let tracker = Arc::clone(&tracker);
				tokio::spawn(async move { tracker.allocate("client1", Awaiting::PubAck, None).await })
			})
			.collect();

		let mut ids = Vec::new();
		for task in tasks {
			ids.push(assert_ok!(assert_ok!(task.await)));
		}
		ids.sort();
		ids.dedup();
		assert_eq!(ids.len(), 64);
	}
}

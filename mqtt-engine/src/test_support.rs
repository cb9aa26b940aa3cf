//! Recording doubles for the storage and connection seams.
use crate::{
	context::{next_connection_id, CommunicationContext, ConnectionId},
	error::{DeliveryError, StorageError},
	storage::{Entity, MemoryRepository, Predicate, Repository},
};
use async_trait::async_trait;
use mqtt_protocol::Packet;
use std::sync::{
	atomic::{AtomicBool, AtomicUsize, Ordering},
	Arc, Mutex,
};

/// A [`MemoryRepository`] that counts the calls made to it, and fails the
/// calls it is told to.
#[derive(Debug)]
pub struct RecordingRepository<T: Entity> {
	inner: MemoryRepository<T>,
	pub gets: AtomicUsize,
	pub finds: AtomicUsize,
	pub updates: AtomicUsize,
	pub deletes: AtomicUsize,
	failing_gets: AtomicUsize,
	failing_updates: AtomicUsize,
}

impl<T: Entity> RecordingRepository<T> {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			inner: MemoryRepository::new(),
			gets: AtomicUsize::new(0),
			finds: AtomicUsize::new(0),
			updates: AtomicUsize::new(0),
			deletes: AtomicUsize::new(0),
			failing_gets: AtomicUsize::new(0),
			failing_updates: AtomicUsize::new(0),
		})
	}

	/// Makes the next `get` fail.
	pub fn fail_next_get(&self) {
		self.failing_gets.fetch_add(1, Ordering::SeqCst);
	}

	/// Makes the next `update` fail.
	pub fn fail_next_update(&self) {
		self.failing_updates.fetch_add(1, Ordering::SeqCst);
	}

	/// Stores `entity` without counting the call.
	pub async fn seed(&self, entity: T) {
		self.inner.update(entity).await.unwrap();
	}

	/// Looks up `key` without counting the call.
	pub async fn peek(&self, key: &T::Key) -> Option<T> {
		self.inner.get(key).await.unwrap()
	}

	pub fn update_count(&self) -> usize {
		self.updates.load(Ordering::SeqCst)
	}

	pub fn delete_count(&self) -> usize {
		self.deletes.load(Ordering::SeqCst)
	}
}

fn take_failure(failures: &AtomicUsize) -> Result<(), StorageError> {
	match failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
		Ok(_) => Err(StorageError::Backend("injected failure".into())),
		Err(_) => Ok(()),
	}
}

#[async_trait]
impl<T: Entity> Repository<T> for RecordingRepository<T> {
	async fn get(&self, key: &T::Key) -> Result<Option<T>, StorageError> {
		self.gets.fetch_add(1, Ordering::SeqCst);
		take_failure(&self.failing_gets)?;
		self.inner.get(key).await
	}

	async fn find(&self, predicate: Predicate<'_, T>) -> Result<Vec<T>, StorageError> {
		self.finds.fetch_add(1, Ordering::SeqCst);
		self.inner.find(predicate).await
	}

	async fn update(&self, entity: T) -> Result<(), StorageError> {
		self.updates.fetch_add(1, Ordering::SeqCst);
		take_failure(&self.failing_updates)?;
		self.inner.update(entity).await
	}

	async fn delete(&self, key: &T::Key) -> Result<(), StorageError> {
		self.deletes.fetch_add(1, Ordering::SeqCst);
		self.inner.delete(key).await
	}

	async fn delete_where(&self, predicate: Predicate<'_, T>) -> Result<usize, StorageError> {
		self.deletes.fetch_add(1, Ordering::SeqCst);
		self.inner.delete_where(predicate).await
	}
}

/// A [`CommunicationContext`] that keeps every packet pushed to it.
#[derive(Debug)]
pub struct RecordingContext {
	id: ConnectionId,
	connected: AtomicBool,
	pushed: Mutex<Vec<Packet>>,
}

impl RecordingContext {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			id: next_connection_id(),
			connected: AtomicBool::new(true),
			pushed: Mutex::new(Vec::new()),
		})
	}

	pub fn pushed(&self) -> Vec<Packet> {
		self.pushed.lock().unwrap().clone()
	}
}

#[async_trait]
impl CommunicationContext for RecordingContext {
	fn connection_id(&self) -> ConnectionId {
		self.id
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}

	async fn push_delivery(&self, packet: Packet) -> Result<(), DeliveryError> {
		if !self.is_connected() {
			return Err(DeliveryError::Closed);
		}
		self.pushed.lock().unwrap().push(packet);
		Ok(())
	}

	fn try_push_delivery(&self, packet: Packet) -> Result<(), DeliveryError> {
		if !self.is_connected() {
			return Err(DeliveryError::Closed);
		}
		self.pushed.lock().unwrap().push(packet);
		Ok(())
	}

	fn disconnect(&self) {
		self.connected.store(false, Ordering::SeqCst);
	}
}

use crate::{
	error::StorageError,
	session::ClientSession,
	storage::{KeyedLocks, MemoryRepository, Repository},
};
use mqtt_protocol::{QoS, Topic};
use std::sync::Arc;

pub use crate::storage::KeyGuard as SessionLock;

/// Process-wide session store.
///
/// Isolation between concurrent flows is the store's job: a flow that reads,
/// changes and writes back a session does so while holding the
/// [`SessionLock`] for that client.
pub struct SessionStore {
	repository: Arc<dyn Repository<ClientSession>>,
	locks: KeyedLocks,
}

impl SessionStore {
	pub fn new(repository: Arc<dyn Repository<ClientSession>>) -> Self {
		Self {
			repository,
			locks: KeyedLocks::new(),
		}
	}

	pub fn in_memory() -> Self {
		Self::new(Arc::new(MemoryRepository::new()))
	}

	/// Waits for exclusive access to the session of `client_id`.
	#[inline]
	pub async fn lock(&self, client_id: &str) -> SessionLock {
		self.locks.lock(client_id).await
	}

	pub async fn get(&self, client_id: &str) -> Result<Option<ClientSession>, StorageError> {
		self.repository.get(&client_id.to_owned()).await
	}

	pub async fn update(&self, session: ClientSession) -> Result<(), StorageError> {
		self.repository.update(session).await
	}

	pub async fn delete(&self, client_id: &str) -> Result<(), StorageError> {
		self.repository.delete(&client_id.to_owned()).await
	}

	/// Finds the Clients subscribed to `topic`, with the highest QoS each has
	/// subscribed at.
	pub async fn subscribers(&self, topic: &Topic) -> Result<Vec<(String, QoS)>, StorageError> {
		let sessions = self
			.repository
			.find(&|session: &ClientSession| session.matching_qos(topic).is_some())
			.await?;

		Ok(sessions
			.into_iter()
			.filter_map(|session| {
				let qos = session.matching_qos(topic)?;
				Some((session.client_id, qos))
			})
			.collect())
	}

	/// Releases the lock table entries of idle clients.
	#[inline]
	pub fn prune_locks(&self) {
		self.locks.prune();
	}
}

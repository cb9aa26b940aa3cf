use super::{Entity, Predicate, Repository};
use crate::error::StorageError;
use async_trait::async_trait;
use dashmap::DashMap;

/// A [`Repository`] held in process memory.
///
/// Entries are sharded, so operations on different keys rarely contend. No
/// shard lock is held across an await point.
#[derive(Debug)]
pub struct MemoryRepository<T: Entity> {
	entries: DashMap<T::Key, T>,
}

impl<T: Entity> Default for MemoryRepository<T> {
	fn default() -> Self {
		Self {
			entries: DashMap::new(),
		}
	}
}

impl<T: Entity> MemoryRepository<T> {
	pub fn new() -> Self {
		Self::default()
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[async_trait]
impl<T: Entity> Repository<T> for MemoryRepository<T> {
	async fn get(&self, key: &T::Key) -> Result<Option<T>, StorageError> {
		Ok(self.entries.get(key).map(|entry| entry.value().clone()))
	}

	async fn find(&self, predicate: Predicate<'_, T>) -> Result<Vec<T>, StorageError> {
		Ok(self
			.entries
			.iter()
			.filter(|entry| predicate(entry.value()))
			.map(|entry| entry.value().clone())
			.collect())
	}

	async fn update(&self, entity: T) -> Result<(), StorageError> {
		self.entries.insert(entity.key(), entity);
		Ok(())
	}

	async fn delete(&self, key: &T::Key) -> Result<(), StorageError> {
		self.entries.remove(key);
		Ok(())
	}

	async fn delete_where(&self, predicate: Predicate<'_, T>) -> Result<usize, StorageError> {
		let keys: Vec<_> = self
			.entries
			.iter()
			.filter(|entry| predicate(entry.value()))
			.map(|entry| entry.key().clone())
			.collect();

		Ok(keys
			.iter()
			.filter(|key| self.entries.remove(*key).is_some())
			.count())
	}
}

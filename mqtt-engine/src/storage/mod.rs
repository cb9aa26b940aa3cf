//! Storage seam.
//!
//! Flows never talk to a storage engine directly: they go through
//! [`Repository`], which the in-memory [`MemoryRepository`] implements and
//! which a persistent backend can implement in its place.
mod locks;
mod memory;

pub use self::{
	locks::{KeyGuard, KeyedLocks},
	memory::MemoryRepository,
};

use crate::error::StorageError;
use async_trait::async_trait;
use core::{fmt, hash::Hash};

/// A value stored under a key it derives from itself.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
	type Key: Clone + fmt::Debug + Eq + Hash + Send + Sync + 'static;

	fn key(&self) -> Self::Key;
}

/// Predicate used by [`Repository::find`] and [`Repository::delete_where`].
pub type Predicate<'a, T> = &'a (dyn Fn(&T) -> bool + Send + Sync);

#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
	/// Looks up the entity stored under `key`.
	async fn get(&self, key: &T::Key) -> Result<Option<T>, StorageError>;

	/// Returns every entity accepted by `predicate`.
	async fn find(&self, predicate: Predicate<'_, T>) -> Result<Vec<T>, StorageError>;

	/// Inserts `entity`, replacing whatever was stored under its key.
	async fn update(&self, entity: T) -> Result<(), StorageError>;

	/// Removes the entity stored under `key`, if any.
	async fn delete(&self, key: &T::Key) -> Result<(), StorageError>;

	/// Removes every entity accepted by `predicate`, returning how many were
	/// removed.
	async fn delete_where(&self, predicate: Predicate<'_, T>) -> Result<usize, StorageError>;
}

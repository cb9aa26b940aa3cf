use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A table of async mutexes, one per key.
///
/// Holding the guard for a key serializes read-modify-write sequences on that
/// key. Different keys never contend.
#[derive(Debug, Default)]
pub struct KeyedLocks {
	locks: DashMap<String, Arc<Mutex<()>>>,
}

pub type KeyGuard = OwnedMutexGuard<()>;

impl KeyedLocks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Waits for exclusive access to `key`.
	pub async fn lock(&self, key: &str) -> KeyGuard {
		let mutex = Arc::clone(self.locks.entry(key.to_owned()).or_default().value());
		mutex.lock_owned().await
	}

	/// Drops the mutexes nobody is holding or waiting on.
	pub fn prune(&self) {
		self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.locks.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.locks.is_empty()
	}
}

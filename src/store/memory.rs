//! Thread-safe in-memory [`KeyValueStore`] for tests and non-persistent hosts.

// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreError},
};

/// Storage backend that keeps entries in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<HashMap<String, String>>>);
impl MemoryStore {
	/// Number of stored entries.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Sorted list of stored keys.
	pub fn keys(&self) -> Vec<String> {
		let mut keys = self.0.read().keys().cloned().collect::<Vec<_>>();

		keys.sort();

		keys
	}
}
impl KeyValueStore for MemoryStore {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.0.read().get(key).cloned())
	}

	fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.0.write().insert(key.to_owned(), value.to_owned());

		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.0.write().remove(key);

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn set_get_remove_cycle() {
		let store = MemoryStore::default();

		store.set("b", "2").expect("Memory set should not fail.");
		store.set("a", "1").expect("Memory set should not fail.");
		store.set("a", "3").expect("Memory set should not fail.");

		assert_eq!(store.get("a").expect("Memory get should not fail."), Some("3".into()));
		assert_eq!(store.keys(), vec!["a".to_owned(), "b".to_owned()]);

		store.remove("a").expect("Memory remove should not fail.");
		store.remove("missing").expect("Removing a missing key should not fail.");

		assert_eq!(store.get("a").expect("Memory get should not fail."), None);
		assert_eq!(store.len(), 1);
	}

	#[test]
	fn clones_share_entries() {
		let store = MemoryStore::default();
		let view = store.clone();

		store.set("k", "v").expect("Memory set should not fail.");

		assert_eq!(view.get("k").expect("Memory get should not fail."), Some("v".into()));
		assert!(!view.is_empty());
	}
}

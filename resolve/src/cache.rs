use std::collections::HashMap;
use std::time::Instant;

use crate::record::{AnswerRecord, RecordKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
	pub name: String,
	pub kind: RecordKind,
}

impl CacheKey {
	pub fn new(name: impl Into<String>, kind: RecordKind) -> Self {
		Self { name: name.into(), kind }
	}
}

struct Entry {
	records: Vec<AnswerRecord>,
	expiry: Instant,
}

/// A capability, not just a struct: `has`/`get`/`set`/`delete` with
/// TTL-based expiry. The in-memory map below is the default implementation;
/// another backend (shared-memory, a network cache) can implement the same
/// trait without the resolver changing.
pub trait AnswerCache {
	fn has(&self, key: &CacheKey) -> bool;
	fn get(&mut self, key: &CacheKey) -> Option<Vec<AnswerRecord>>;
	/// Returns `false` (and stores nothing) if every record's TTL is zero.
	fn set(&mut self, key: CacheKey, records: Vec<AnswerRecord>) -> bool;
	fn delete(&mut self, key: &CacheKey);
	/// Drops every expired entry. Not required for correctness — `get`
	/// performs lazy expiry — but keeps the map from growing unboundedly
	/// between lookups of the same name.
	fn sweep(&mut self, now: Instant);
}

#[derive(Default)]
pub struct MemoryCache {
	entries: HashMap<CacheKey, Entry>,
}

impl MemoryCache {
	pub fn new() -> Self {
		Self::default()
	}

	fn expired(entry: &Entry, now: Instant) -> bool {
		now >= entry.expiry
	}
}

impl AnswerCache for MemoryCache {
	fn has(&self, key: &CacheKey) -> bool {
		match self.entries.get(key) {
			Some(entry) => !Self::expired(entry, Instant::now()),
			None => false,
		}
	}

	fn get(&mut self, key: &CacheKey) -> Option<Vec<AnswerRecord>> {
		let now = Instant::now();

		match self.entries.get(key) {
			Some(entry) if Self::expired(entry, now) => {
				self.entries.remove(key);
				None
			}
			Some(entry) => Some(entry.records.clone()),
			None => None,
		}
	}

	fn set(&mut self, key: CacheKey, records: Vec<AnswerRecord>) -> bool {
		let min_ttl = records.iter().filter_map(|r| r.ttl.seconds()).filter(|&s| s > 0).min();

		let Some(min_ttl) = min_ttl else {
			self.entries.remove(&key);
			return false;
		};

		let expiry = Instant::now() + std::time::Duration::from_secs(min_ttl as u64);
		self.entries.insert(key, Entry { records, expiry });
		true
	}

	fn delete(&mut self, key: &CacheKey) {
		self.entries.remove(key);
	}

	fn sweep(&mut self, now: Instant) {
		self.entries.retain(|_, entry| !Self::expired(entry, now));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::Ttl;

	#[test]
	fn set_rejects_all_zero_ttl() {
		let mut cache = MemoryCache::new();
		let key = CacheKey::new("example.test", RecordKind::A);
		let stored = cache.set(key.clone(), vec![AnswerRecord::new("1.2.3.4", RecordKind::A, Ttl::Seconds(0))]);

		assert!(!stored);
		assert!(!cache.has(&key));
	}

	#[test]
	fn set_uses_minimum_positive_ttl() {
		let mut cache = MemoryCache::new();
		let key = CacheKey::new("example.test", RecordKind::A);

		cache.set(
			key.clone(),
			vec![
				AnswerRecord::new("1.2.3.4", RecordKind::A, Ttl::Seconds(600)),
				AnswerRecord::new("1.2.3.5", RecordKind::A, Ttl::Seconds(0)),
				AnswerRecord::new("1.2.3.6", RecordKind::A, Ttl::Seconds(60)),
			],
		);

		assert!(cache.has(&key));
		assert_eq!(cache.get(&key).unwrap().len(), 3);
	}

	#[test]
	fn get_evicts_expired_entry() {
		let mut cache = MemoryCache::new();
		let key = CacheKey::new("example.test", RecordKind::A);
		cache.entries.insert(
			key.clone(),
			Entry {
				records: vec![AnswerRecord::new("1.2.3.4", RecordKind::A, Ttl::Seconds(1))],
				expiry: Instant::now() - std::time::Duration::from_secs(1),
			},
		);

		assert!(cache.get(&key).is_none());
		assert!(!cache.entries.contains_key(&key));
	}
}

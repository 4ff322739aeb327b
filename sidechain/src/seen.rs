// Copyright 2021 The P2Pool Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded deduplication sets: recently observed block identities and
//! recently observed miner wallets. Both sit in front of (or beside) the
//! validation pipeline and are locked independently of the DAG so that
//! gossip echoes never touch the writer lock.

use std::collections::HashMap;

use p2pool_core::core::{FullBlockId, Wallet};
use p2pool_util::Mutex;

/// Recently observed full block identities (id plus both nonces). Bounded
/// by count and age; when the cap is hit, aged entries go first and as a
/// last resort the set is cleared, costing at most some duplicate work.
pub struct SeenBlocks {
	inner: Mutex<HashMap<FullBlockId, u64>>,
	capacity: usize,
	max_age: u64,
}

impl SeenBlocks {
	/// Creates a set bounded to `capacity` entries no older than `max_age`
	/// seconds.
	pub fn new(capacity: usize, max_age: u64) -> SeenBlocks {
		SeenBlocks {
			inner: Mutex::new(HashMap::new()),
			capacity,
			max_age,
		}
	}

	/// Marks an identity as seen. Returns whether it was new; a `false`
	/// means this exact block already went through recently and can be
	/// dropped before validation.
	pub fn check_and_mark(&self, full_id: FullBlockId, now: u64) -> bool {
		let mut seen = self.inner.lock();
		if seen.contains_key(&full_id) {
			return false;
		}
		if seen.len() >= self.capacity {
			let cutoff = now.saturating_sub(self.max_age);
			seen.retain(|_, first_seen| *first_seen > cutoff);
			if seen.len() >= self.capacity {
				// everything is recent and the set is still full, start
				// over rather than grow without bound
				debug!("seen_blocks: {} recent entries, clearing", seen.len());
				seen.clear();
			}
		}
		seen.insert(full_id, now);
		true
	}

	/// Forgets an identity so the same block can be retried, used when a
	/// block gets thrown away for reasons that may not hold next time.
	pub fn unmark(&self, full_id: &FullBlockId) {
		self.inner.lock().remove(full_id);
	}

	/// Current number of tracked identities.
	pub fn len(&self) -> usize {
		self.inner.lock().len()
	}
}

/// First-seen timestamps of miner wallets, evicted once older than the
/// chain window's time span. Lets the validator throttle a burst of
/// never-before-seen wallets showing up at the tip.
pub struct SeenWallets {
	inner: Mutex<SeenWalletsInner>,
	max_age: u64,
}

struct SeenWalletsInner {
	wallets: HashMap<Wallet, u64>,
	last_prune: u64,
}

impl SeenWallets {
	/// Creates a set whose entries expire after `max_age` seconds.
	pub fn new(max_age: u64) -> SeenWallets {
		SeenWallets {
			inner: Mutex::new(SeenWalletsInner {
				wallets: HashMap::new(),
				last_prune: 0,
			}),
			max_age,
		}
	}

	/// Records a wallet sighting and returns its first-seen timestamp
	/// (`now` if this is the first).
	pub fn mark(&self, wallet: &Wallet, now: u64) -> u64 {
		let mut inner = self.inner.lock();
		if now.saturating_sub(inner.last_prune) > self.max_age {
			let cutoff = now.saturating_sub(self.max_age);
			inner.wallets.retain(|_, first_seen| *first_seen > cutoff);
			inner.last_prune = now;
		}
		*inner.wallets.entry(*wallet).or_insert(now)
	}

	/// When this wallet was first seen, if it is still tracked.
	pub fn first_seen(&self, wallet: &Wallet) -> Option<u64> {
		self.inner.lock().wallets.get(wallet).cloned()
	}

	/// How many wallets were first seen at or after the given cutoff.
	pub fn new_wallets_since(&self, cutoff: u64) -> usize {
		self.inner
			.lock()
			.wallets
			.values()
			.filter(|first_seen| **first_seen >= cutoff)
			.count()
	}

	/// Number of tracked wallets.
	pub fn len(&self) -> usize {
		self.inner.lock().wallets.len()
	}
}

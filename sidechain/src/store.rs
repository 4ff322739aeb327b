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

//! In-memory store for the sidechain block DAG: every block keyed by id,
//! secondarily indexed by height. The store owns the blocks; everything
//! else looks them up by id under the coordinator's lock. There is no
//! persistence, a restarting peer rebuilds the DAG from its peers.

use std::collections::{BTreeMap, HashMap, HashSet};

use p2pool_core::core::{Hash, PoolBlock};

use crate::error::{Error, ErrorKind};

/// Outcome of a store insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
	/// Block is new and now owned by the store
	Inserted,
	/// A block with this id was already present, nothing changed
	AlreadyPresent,
}

/// The block DAG store.
pub struct BlockDagStore {
	// blocks indexed by their id, the owning map
	blocks_by_id: HashMap<Hash, PoolBlock>,
	// additional ordered index height -> ids, enables window walking and
	// pruning everything below a threshold height
	blocks_by_height: BTreeMap<u64, Vec<Hash>>,
	// monotone arrival stamp, last-resort tie-break for chain selection
	arrival_counter: u64,
}

impl BlockDagStore {
	/// Creates an empty store.
	pub fn new() -> BlockDagStore {
		BlockDagStore {
			blocks_by_id: HashMap::new(),
			blocks_by_height: BTreeMap::new(),
			arrival_counter: 0,
		}
	}

	/// Number of blocks currently held.
	pub fn len(&self) -> usize {
		self.blocks_by_id.len()
	}

	/// Whether the store holds no blocks at all.
	pub fn is_empty(&self) -> bool {
		self.blocks_by_id.is_empty()
	}

	/// Inserts a block, stamping its arrival order. Rejects a block whose
	/// parent is present at the wrong height: that invariant must hold for
	/// every window walk to terminate correctly.
	pub fn insert(&mut self, mut block: PoolBlock) -> Result<InsertResult, Error> {
		if self.blocks_by_id.contains_key(&block.id) {
			return Ok(InsertResult::AlreadyPresent);
		}
		if let Some(parent) = self.blocks_by_id.get(&block.parent_id) {
			if parent.height + 1 != block.height {
				return Err(ErrorKind::StoreErr(format!(
					"block {} at height {} has parent at height {}",
					block.id, block.height, parent.height
				))
				.into());
			}
		}

		self.arrival_counter += 1;
		block.arrival_order = self.arrival_counter;

		self.blocks_by_height
			.entry(block.height)
			.or_insert_with(Vec::new)
			.push(block.id);
		self.blocks_by_id.insert(block.id, block);
		Ok(InsertResult::Inserted)
	}

	/// Looks a block up by id.
	pub fn find(&self, id: &Hash) -> Option<&PoolBlock> {
		self.blocks_by_id.get(id)
	}

	/// Mutable lookup, for depth maintenance under the writer lock.
	pub(crate) fn find_mut(&mut self, id: &Hash) -> Option<&mut PoolBlock> {
		self.blocks_by_id.get_mut(id)
	}

	/// Whether a block with this id is present.
	pub fn contains(&self, id: &Hash) -> bool {
		self.blocks_by_id.contains_key(id)
	}

	/// The parent of the given block, if we hold it.
	pub fn parent_of(&self, block: &PoolBlock) -> Option<&PoolBlock> {
		self.blocks_by_id.get(&block.parent_id)
	}

	/// All blocks at the given height, in arrival order.
	pub fn at_height(&self, height: u64) -> Vec<&PoolBlock> {
		match self.blocks_by_height.get(&height) {
			Some(ids) => ids.iter().filter_map(|id| self.find(id)).collect(),
			None => vec![],
		}
	}

	/// The uncles of a block that we actually hold.
	pub fn uncles_of<'a>(&'a self, block: &'a PoolBlock) -> impl Iterator<Item = &'a PoolBlock> {
		block.uncle_ids.iter().filter_map(move |id| self.find(id))
	}

	/// Lowest and highest heights currently retained.
	pub fn height_range(&self) -> Option<(u64, u64)> {
		let lowest = self.blocks_by_height.keys().next()?;
		let highest = self.blocks_by_height.keys().next_back()?;
		Some((*lowest, *highest))
	}

	/// The ancestor-or-uncle-of-ancestor closure of the window hanging off
	/// the given tip: the ids whose consensus contribution the window still
	/// references directly.
	fn window_closure(&self, tip_id: &Hash, window: u64) -> HashSet<Hash> {
		let mut keep = HashSet::new();
		let mut cur = self.find(tip_id);
		let mut walked = 0;
		while let Some(block) = cur {
			keep.insert(block.id);
			for uncle in &block.uncle_ids {
				keep.insert(*uncle);
			}
			walked += 1;
			if walked >= window || block.is_genesis() {
				break;
			}
			cur = self.parent_of(block);
		}
		keep
	}

	/// Prunes every block at depth `keep_depth` or more below the tip that
	/// the window hanging off the tip no longer references. With the usual
	/// keep depth of two windows this clears those heights entirely; the
	/// pruned blocks' contribution to consensus is frozen inside their
	/// descendants' cumulative difficulty. Monotone and idempotent.
	/// Returns how many blocks were dropped.
	pub fn prune(&mut self, tip_id: &Hash, keep_depth: u64, window: u64) -> usize {
		let tip_height = match self.find(tip_id) {
			Some(b) => b.height,
			None => return 0,
		};
		if tip_height < keep_depth {
			return 0;
		}
		let cutoff = tip_height - keep_depth;
		let keep = self.window_closure(tip_id, window);

		let prune_heights: Vec<u64> = self
			.blocks_by_height
			.range(..=cutoff)
			.map(|(h, _)| *h)
			.collect();

		let mut pruned = 0;
		for height in prune_heights {
			let ids = match self.blocks_by_height.get_mut(&height) {
				Some(ids) => ids,
				None => continue,
			};
			let before = ids.len();
			let dropped: Vec<Hash> = ids.iter().filter(|id| !keep.contains(id)).cloned().collect();
			ids.retain(|id| keep.contains(id));
			pruned += before - ids.len();
			for id in dropped {
				self.blocks_by_id.remove(&id);
			}
			if self
				.blocks_by_height
				.get(&height)
				.map(|v| v.is_empty())
				.unwrap_or(false)
			{
				self.blocks_by_height.remove(&height);
			}
		}
		pruned
	}
}

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

//! Chain selection: which of two competing tips wins, how deep a reorg
//! reaches, and the depth bookkeeping pruning relies on. All of it runs
//! under the coordinator's writer lock.

use p2pool_core::core::{Hash, PoolBlock};

use crate::store::BlockDagStore;

/// Whether `ancestor_id` sits on the parent chain of `descendant`.
/// Bounded by the height difference, so never walks pruned history.
pub fn is_ancestor(store: &BlockDagStore, ancestor_id: &Hash, descendant: &PoolBlock) -> bool {
	let ancestor_height = match store.find(ancestor_id) {
		Some(b) => b.height,
		None => return false,
	};
	if ancestor_height > descendant.height {
		return false;
	}
	let mut cur = descendant;
	while cur.height > ancestor_height {
		cur = match store.parent_of(cur) {
			Some(parent) => parent,
			None => return false,
		};
	}
	cur.id == *ancestor_id
}

/// Lowest common ancestor of two blocks, or `None` when their branches
/// only join below what the store still holds.
pub fn lowest_common_ancestor<'a>(
	store: &'a BlockDagStore,
	a: &'a PoolBlock,
	b: &'a PoolBlock,
) -> Option<&'a PoolBlock> {
	let mut a = a;
	let mut b = b;
	while a.height > b.height {
		a = store.parent_of(a)?;
	}
	while b.height > a.height {
		b = store.parent_of(b)?;
	}
	while a.id != b.id {
		if a.is_genesis() || b.is_genesis() {
			return None;
		}
		a = store.parent_of(a)?;
		b = store.parent_of(b)?;
	}
	Some(a)
}

/// How many blocks of the old branch a switch from `old_tip` to `new_tip`
/// abandons. Zero when `new_tip` simply extends `old_tip`.
pub fn reorg_depth(store: &BlockDagStore, old_tip: &PoolBlock, new_tip: &PoolBlock) -> u64 {
	match lowest_common_ancestor(store, old_tip, new_tip) {
		Some(lca) => old_tip.height.saturating_sub(lca.height),
		// disjoint histories, everything we knew is abandoned
		None => old_tip.height + 1,
	}
}

/// Checks if `candidate` carries a longer (higher difficulty) chain than
/// `current`. `alternative` reports whether the two diverge at all.
///
/// A candidate on an alternative branch must beat the current tip by at
/// least one block's worth of difficulty, and the branches must diverge
/// within the prune depth: beyond it the abandoned region may already be
/// partially pruned and the reorg couldn't be validated.
pub fn is_longer_chain(
	store: &BlockDagStore,
	current: &PoolBlock,
	candidate: &PoolBlock,
	prune_depth: u64,
) -> (bool, bool) {
	if !candidate.verified || candidate.invalid {
		return (false, false);
	}

	let lca = match lowest_common_ancestor(store, current, candidate) {
		Some(lca) => lca,
		None => return (false, true),
	};
	let alternative = lca.id != current.id;

	if !alternative {
		// plain descendant, any gain in cumulative difficulty wins
		return (
			candidate.cumulative_difficulty > current.cumulative_difficulty,
			false,
		);
	}

	if current.height.saturating_sub(lca.height) > prune_depth {
		return (false, true);
	}
	let longer = candidate.cumulative_difficulty
		>= current.cumulative_difficulty + current.declared_difficulty;
	(longer, true)
}

/// Tie-break between two verified tips of equal cumulative difficulty:
/// smaller id wins, then earlier local arrival.
pub fn wins_tie(candidate: &PoolBlock, current: &PoolBlock) -> bool {
	if candidate.id != current.id {
		return candidate.id < current.id;
	}
	candidate.arrival_order < current.arrival_order
}

/// Propagates depth information from a newly linked block to its ancestors
/// and uncles, so pruning decisions see how deep a side branch already is
/// below the best chain.
pub fn update_depths(store: &mut BlockDagStore, start: &Hash) {
	let mut queue = vec![*start];
	while let Some(id) = queue.pop() {
		let (height, depth, parent_id, uncle_ids) = match store.find(&id) {
			Some(b) => (b.height, b.depth, b.parent_id, b.uncle_ids.clone()),
			None => continue,
		};

		if let Some(parent) = store.find_mut(&parent_id) {
			if parent.depth < depth + 1 {
				parent.depth = depth + 1;
				queue.push(parent_id);
			}
		}
		for uncle_id in uncle_ids {
			if let Some(uncle) = store.find_mut(&uncle_id) {
				let want = depth + (height - uncle.height);
				if uncle.depth < want {
					uncle.depth = want;
					queue.push(uncle_id);
				}
			}
		}
	}
}

/// Re-stamps depths along the best chain after a tip change: the tip sits
/// at depth zero, each ancestor one deeper, and side blocks pick their
/// depth up through `update_depths`. Only walks as far as pruning cares.
pub fn set_best_chain_depths(store: &mut BlockDagStore, tip_id: &Hash, max_depth: u64) {
	let mut cur = *tip_id;
	let mut depth = 0;
	loop {
		let parent_id = match store.find_mut(&cur) {
			Some(b) => {
				b.depth = depth;
				b.parent_id
			}
			None => break,
		};
		update_depths(store, &cur);
		if depth >= max_depth || !store.contains(&parent_id) {
			break;
		}
		cur = parent_id;
		depth += 1;
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::store::BlockDagStore;
	use p2pool_core::core::{Difficulty, SecretScalar, Wallet, ZERO_HASH};

	fn test_block(parent: Hash, height: u64, cum: u128, seed: u8) -> PoolBlock {
		let mut b = PoolBlock {
			parent_id: parent,
			uncle_ids: vec![],
			height,
			main_height: 0,
			main_prev_id: ZERO_HASH,
			miner_wallet: Wallet::from_secrets(
				&SecretScalar::from_entropy(&[b"s"]),
				&SecretScalar::from_entropy(&[b"v"]),
			),
			tx_key_sec: SecretScalar::from_entropy(&[&[seed]]),
			timestamp: 1_600_000_000 + height * 10,
			declared_difficulty: Difficulty::from_num(1000),
			cumulative_difficulty: Difficulty::from_num(cum),
			output_shares: vec![],
			nonce: 0,
			extra_nonce: 0,
			pow_hash: ZERO_HASH,
			id: ZERO_HASH,
			depth: 0,
			verified: true,
			invalid: false,
			arrival_order: 0,
		};
		b.id = b.compute_id(&ZERO_HASH);
		b
	}

	// trunk of `len` blocks plus a fork of `fork_len` blocks off `fork_at`
	fn forked_store(len: u64, fork_at: u64, fork_len: u64) -> (BlockDagStore, Vec<Hash>, Vec<Hash>) {
		let mut store = BlockDagStore::new();
		let mut trunk = vec![];
		let mut parent = ZERO_HASH;
		for h in 0..len {
			let b = test_block(parent, h, 1000 * (h as u128 + 1), 0);
			parent = b.id;
			trunk.push(b.id);
			store.insert(b).unwrap();
		}
		let mut branch = vec![];
		let mut parent = trunk[fork_at as usize];
		for i in 0..fork_len {
			let h = fork_at + 1 + i;
			let b = test_block(parent, h, 1000 * (fork_at as u128 + 1) + 2000 * (i as u128 + 1), 1);
			parent = b.id;
			branch.push(b.id);
			store.insert(b).unwrap();
		}
		(store, trunk, branch)
	}

	#[test]
	fn ancestry_and_lca() {
		let (store, trunk, branch) = forked_store(10, 5, 3);
		let tip = store.find(&trunk[9]).unwrap();
		let fork_tip = store.find(branch.last().unwrap()).unwrap();

		assert!(is_ancestor(&store, &trunk[0], tip));
		assert!(is_ancestor(&store, &trunk[5], fork_tip));
		assert!(!is_ancestor(&store, &trunk[6], fork_tip));

		let lca = lowest_common_ancestor(&store, tip, fork_tip).unwrap();
		assert_eq!(lca.id, trunk[5]);
		assert_eq!(reorg_depth(&store, tip, fork_tip), 4);
		assert_eq!(reorg_depth(&store, tip, tip), 0);
	}

	#[test]
	fn longer_chain_decision() {
		let (store, trunk, branch) = forked_store(10, 5, 3);
		let tip = store.find(&trunk[9]).unwrap();
		// fork tip: cum 6000 + 6000 = 12000 vs trunk 10000
		let fork_tip = store.find(branch.last().unwrap()).unwrap();

		let (longer, alternative) = is_longer_chain(&store, tip, fork_tip, 100);
		assert!(longer);
		assert!(alternative);

		// reversed, the trunk does not beat the heavier fork
		let (longer, alternative) = is_longer_chain(&store, fork_tip, tip, 100);
		assert!(!longer);
		assert!(alternative);

		// descendant of the tip is not an alternative
		let tip_parent = store.find(&trunk[8]).unwrap();
		let (longer, alternative) = is_longer_chain(&store, tip_parent, tip, 100);
		assert!(longer);
		assert!(!alternative);

		// divergence deeper than the prune depth can't reorg
		let (longer, alternative) = is_longer_chain(&store, tip, fork_tip, 2);
		assert!(!longer);
		assert!(alternative);
	}

	#[test]
	fn depth_propagation() {
		let (mut store, trunk, branch) = forked_store(10, 5, 1);
		let tip_id = trunk[9];
		set_best_chain_depths(&mut store, &tip_id, 100);
		assert_eq!(store.find(&trunk[9]).unwrap().depth, 0);
		assert_eq!(store.find(&trunk[0]).unwrap().depth, 9);

		// fork block at height 6 starts shallow, a later sibling link
		// deepens its ancestors only
		let fork_id = branch[0];
		store.find_mut(&fork_id).unwrap().depth = 3;
		update_depths(&mut store, &fork_id);
		// its parent (trunk[5]) must now be at least 4 deep, and it
		// already was (depth 9 - 5 = 4)
		assert_eq!(store.find(&trunk[5]).unwrap().depth, 4);
	}
}

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

//! The DAG stays bounded: deep history is pruned as the tip advances and
//! everything the window still needs survives.

use p2pool_core::consensus;
use p2pool_sidechain::BlockAddResult;

use self::chain_test_helper::{base_time, miner, setup, test_config};

#[test]
fn deep_history_pruned_best_chain_kept() {
	let mut config = test_config();
	config.chain_window_size = 60;
	let (chain, _events, mut builder) = setup(&config);
	let t0 = base_time();

	let trunk = builder.make_chain(None, 6, &miner(1), t0);
	for b in &trunk {
		assert_eq!(chain.add_external_block(b.clone()), BlockAddResult::Accepted);
	}
	// a stale fork block early in the chain
	let stale = builder.make_block(Some(&trunk[3].id), &[], &miner(2), t0 + 45);
	assert_eq!(
		chain.add_external_block(stale.clone()),
		BlockAddResult::Accepted
	);

	let more = builder.make_chain(Some(&trunk[5].id), 194, &miner(1), t0 + 60);
	for b in &more {
		assert_eq!(chain.add_external_block(b.clone()), BlockAddResult::Accepted);
	}

	let tip = chain.chain_tip().unwrap();
	assert_eq!(tip.height, 199);

	// heights at or below tip - prune_depth are gone, the fork included
	let prune_depth = consensus::prune_depth(60);
	let cutoff = 199 - prune_depth; // 67
	assert!(chain.find_block(&trunk[0].id).is_none());
	assert!(chain.find_block(&stale.id).is_none());
	for b in trunk.iter().chain(more.iter()) {
		let present = chain.find_block(&b.id).is_some();
		assert_eq!(
			present,
			b.height > cutoff,
			"block at height {} presence {}",
			b.height,
			present
		);
	}

	// the DAG is bounded well below the number of blocks ever ingested
	assert!(chain.block_count() as u64 <= prune_depth + 1);

	// and the tip's whole window is intact: the share computation walks
	// it without losing a parent
	assert!(chain.miner_count() >= 1);
}

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

//! Accepting straightforward chains and the share accounting they imply.

use p2pool_core::core::Difficulty;
use p2pool_sidechain::window;
use p2pool_sidechain::BlockAddResult;

use self::chain_test_helper::{base_time, miner, setup, test_config};

#[test]
fn single_miner_linear_chain() {
	let config = test_config();
	let (chain, events, mut builder) = setup(&config);
	let w1 = miner(1);

	let blocks = builder.make_chain(None, 10, &w1, base_time());
	for b in &blocks {
		assert_eq!(chain.add_external_block(b.clone()), BlockAddResult::Accepted);
	}

	let tip = chain.chain_tip().expect("tip");
	assert_eq!(tip.height, 9);
	assert_eq!(tip.last_block_h, blocks[9].id);
	assert_eq!(tip.cumulative_difficulty, Difficulty::from_num(10_000));
	assert_eq!(chain.block_count(), 10);
	assert_eq!(chain.miner_count(), 1);

	// every block extended the tip, no reorgs
	let changes = events.tip_changes();
	assert_eq!(changes.len(), 10);
	assert!(changes.iter().all(|(_, depth)| *depth == 0));

	// the whole window belongs to W1: weight 10 blocks x 1000
	let tip_block = chain.find_block(&tip.last_block_h).unwrap();
	let shares = window::get_shares(&tip_block, &builder.mirror, &builder.params).unwrap();
	assert_eq!(shares.len(), 1);
	assert_eq!(shares[0].wallet, w1);
	assert_eq!(shares[0].weight, Difficulty::from_num(10_000));
	assert_eq!(window::split_reward(10_000, &shares), Some(vec![10_000]));
	assert!((chain.get_reward_share(&w1) - 1.0).abs() < 1e-12);
}

#[test]
fn two_miners_split_evenly_over_full_window() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let (w1, w2) = (miner(1), miner(2));
	let t0 = base_time();

	let mut parent = None;
	let mut last = None;
	for i in 0..2160u64 {
		let wallet = if i % 2 == 0 { w1 } else { w2 };
		let b = builder.make_block(parent.as_ref(), &[], &wallet, t0 + i * 10);
		parent = Some(b.id);
		assert_eq!(chain.add_external_block(b.clone()), BlockAddResult::Accepted);
		last = Some(b);
	}

	let tip = chain.chain_tip().unwrap();
	assert_eq!(tip.height, 2159);

	let tip_block = last.unwrap();
	let shares = window::get_shares(&tip_block, &builder.mirror, &builder.params).unwrap();
	assert_eq!(shares.len(), 2);
	// 1080 blocks of difficulty 1000 each
	assert!(shares
		.iter()
		.all(|s| s.weight == Difficulty::from_num(1_080_000)));
	assert_eq!(window::split_reward(1000, &shares), Some(vec![500, 500]));

	// steady spacing at target keeps the difficulty where it started
	assert_eq!(chain.difficulty(), Difficulty::from_num(1000));
}

#[test]
fn blocks_already_in_dag_read_back() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let blocks = builder.make_chain(None, 3, &miner(1), base_time());
	for b in &blocks {
		chain.add_external_block(b.clone());
	}
	for b in &blocks {
		let found = chain.find_block(&b.id).expect("stored block");
		assert_eq!(found.height, b.height);
		assert!(found.verified);
	}
	assert_eq!(chain.total_hashes(), Difficulty::from_num(3000));
}

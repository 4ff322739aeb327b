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

//! Competing branches: the heavier chain wins, ties break on the smaller
//! id, and the reorg depth reported matches the abandoned blocks.

use p2pool_core::core::Difficulty;
use p2pool_sidechain::BlockAddResult;

use self::chain_test_helper::{base_time, miner, setup, test_config};

#[test]
fn heavier_fork_reorganizes_the_tip() {
	let config = test_config();
	let (chain, events, mut builder) = setup(&config);
	let (w1, w2) = (miner(1), miner(2));
	let t0 = base_time();

	// shared prefix: 5 blocks, cumulative difficulty 5000 at the fork point
	let prefix = builder.make_chain(None, 5, &w1, t0);
	let fork_point = prefix[4].id;

	// branch A: 3 more blocks (cumulative 8000)
	let branch_a = builder.make_chain(Some(&fork_point), 3, &w1, t0 + 50);
	// branch B: 4 more blocks (cumulative 9000)
	let branch_b = builder.make_chain(Some(&fork_point), 4, &w2, t0 + 50);

	for b in prefix.iter().chain(branch_a.iter()) {
		assert_eq!(chain.add_external_block(b.clone()), BlockAddResult::Accepted);
	}
	let tip_a = chain.chain_tip().unwrap();
	assert_eq!(tip_a.last_block_h, branch_a[2].id);
	assert_eq!(tip_a.cumulative_difficulty, Difficulty::from_num(8000));

	for b in &branch_b {
		assert_eq!(chain.add_external_block(b.clone()), BlockAddResult::Accepted);
	}

	// branch B took over
	let tip_b = chain.chain_tip().unwrap();
	assert_eq!(tip_b.last_block_h, branch_b[3].id);
	assert_eq!(tip_b.height, 8);
	assert_eq!(tip_b.cumulative_difficulty, Difficulty::from_num(9000));

	// exactly one tip change abandoned the three A-branch blocks
	let reorgs: Vec<u64> = events
		.tip_changes()
		.into_iter()
		.map(|(_, depth)| depth)
		.filter(|depth| *depth > 0)
		.collect();
	assert_eq!(reorgs, vec![3]);

	// the abandoned branch is still in the DAG (within prune depth)
	for b in &branch_a {
		assert!(chain.find_block(&b.id).is_some());
	}
}

#[test]
fn lighter_fork_does_not_move_the_tip() {
	let config = test_config();
	let (chain, events, mut builder) = setup(&config);
	let t0 = base_time();

	let trunk = builder.make_chain(None, 8, &miner(1), t0);
	let fork = builder.make_chain(Some(&trunk[4].id), 2, &miner(2), t0 + 50);

	for b in trunk.iter().chain(fork.iter()) {
		assert_eq!(chain.add_external_block(b.clone()), BlockAddResult::Accepted);
	}

	let tip = chain.chain_tip().unwrap();
	assert_eq!(tip.last_block_h, trunk[7].id);
	// only the trunk ever changed the tip
	assert!(events.tip_changes().iter().all(|(id, _)| trunk
		.iter()
		.any(|b| b.id == *id)));
}

#[test]
fn equal_difficulty_tie_breaks_on_smaller_id() {
	let config = test_config();
	let t0 = base_time();

	// two competing genesis blocks with identical cumulative difficulty,
	// ingested in both orders; the winner must be the same
	let mut winners = vec![];
	for order in 0..2 {
		let (chain, _events, mut builder) = setup(&config);
		let g1 = builder.make_block(None, &[], &miner(1), t0);
		let g2 = builder.make_block(None, &[], &miner(2), t0);
		let (first, second) = if order == 0 { (&g1, &g2) } else { (&g2, &g1) };
		assert_eq!(
			chain.add_external_block(first.clone()),
			BlockAddResult::Accepted
		);
		assert_eq!(
			chain.add_external_block(second.clone()),
			BlockAddResult::Accepted
		);
		winners.push(chain.chain_tip().unwrap().last_block_h);
	}
	assert_eq!(winners[0], winners[1]);
	// and it is the lexicographically smaller id
	let (chain, _events, mut builder) = setup(&config);
	let g1 = builder.make_block(None, &[], &miner(1), t0);
	let g2 = builder.make_block(None, &[], &miner(2), t0);
	chain.add_external_block(g1.clone());
	chain.add_external_block(g2.clone());
	let expected = if g1.id < g2.id { g1.id } else { g2.id };
	assert_eq!(winners[0], expected);
	assert_eq!(chain.chain_tip().unwrap().last_block_h, expected);
}

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

//! Blocks arriving before their ancestors get parked and promoted once
//! the ancestors show up.

use p2pool_sidechain::BlockAddResult;

use self::chain_test_helper::{base_time, miner, setup, test_config, LoggedEvent};

#[test]
fn out_of_order_block_parks_then_promotes() {
	let config = test_config();
	let (chain, events, mut builder) = setup(&config);
	let blocks = builder.make_chain(None, 4, &miner(1), base_time());

	// heights 0 and 1 arrive
	assert_eq!(
		chain.add_external_block(blocks[0].clone()),
		BlockAddResult::Accepted
	);
	assert_eq!(
		chain.add_external_block(blocks[1].clone()),
		BlockAddResult::Accepted
	);

	// height 3 arrives before height 2
	let res = chain.add_external_block(blocks[3].clone());
	assert_eq!(
		res,
		BlockAddResult::MissingParent(vec![blocks[2].id])
	);
	assert_eq!(chain.pending_count(), 1);
	assert_eq!(chain.chain_tip().unwrap().height, 1);
	assert_eq!(chain.get_missing_blocks(), vec![blocks[2].id]);
	assert!(events
		.all()
		.contains(&LoggedEvent::Missing(vec![blocks[2].id])));

	// height 2 arrives; height 3 auto-promotes and the tip jumps to it
	assert_eq!(
		chain.add_external_block(blocks[2].clone()),
		BlockAddResult::Accepted
	);
	assert_eq!(chain.pending_count(), 0);
	let tip = chain.chain_tip().unwrap();
	assert_eq!(tip.height, 3);
	assert_eq!(tip.last_block_h, blocks[3].id);
	assert!(events
		.tip_changes()
		.contains(&(blocks[3].id, 0)));
	assert!(chain.get_missing_blocks().is_empty());
}

#[test]
fn deep_pending_chain_promotes_recursively() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let blocks = builder.make_chain(None, 6, &miner(1), base_time());

	// everything but genesis arrives, in reverse order
	for b in blocks.iter().skip(1).rev() {
		match chain.add_external_block(b.clone()) {
			BlockAddResult::MissingParent(_) => {}
			other => panic!("expected parked block, got {:?}", other),
		}
	}
	assert_eq!(chain.pending_count(), 5);
	assert_eq!(chain.chain_tip(), None);

	// genesis unlocks the whole line
	assert_eq!(
		chain.add_external_block(blocks[0].clone()),
		BlockAddResult::Accepted
	);
	assert_eq!(chain.pending_count(), 0);
	assert_eq!(chain.chain_tip().unwrap().height, 5);
	assert_eq!(chain.block_count(), 6);
}

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

//! Main-chain anchoring and the watched-block reporting path.

use p2pool_core::core::{ChainMain, Difficulty, Hash};
use p2pool_sidechain::error::ErrorKind;
use p2pool_sidechain::BlockAddResult;

use self::chain_test_helper::{base_time, miner, setup, test_config};

fn main_block(tag: u8, height: u64) -> ChainMain {
	ChainMain {
		id: Hash::from_vec(&[tag; 32]),
		height,
		prev_id: Hash::from_vec(&[tag.wrapping_sub(1); 32]),
		difficulty: Difficulty::from_num(1_000_000_000),
		reward: 600_000_000_000,
		timestamp: base_time(),
	}
}

#[test]
fn unknown_anchor_rejected_once_anchors_exist() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);

	let anchor = main_block(10, 1000);
	chain.add_main_chain_block(anchor);
	assert_eq!(chain.latest_main_anchor().unwrap().height, 1000);

	// a block anchored to something we never saw
	builder.main_anchor = Some((Hash::from_vec(&[0x77; 32]), 1001));
	let bad = builder.make_block(None, &[], &miner(1), base_time());
	match chain.add_external_block(bad) {
		BlockAddResult::Rejected(ErrorKind::UnknownMainAnchor) => {}
		other => panic!("expected unknown anchor, got {:?}", other),
	}

	// correctly anchored blocks pass
	builder.main_anchor = Some((main_block(10, 1000).id, 1001));
	let good = builder.make_block(None, &[], &miner(2), base_time());
	assert_eq!(chain.add_external_block(good), BlockAddResult::Accepted);
}

#[test]
fn watched_block_reports_once_verified() {
	let config = test_config();
	let (chain, events, mut builder) = setup(&config);
	let t0 = base_time();

	let blocks = builder.make_chain(None, 3, &miner(1), t0);
	for b in blocks.iter().take(2) {
		chain.add_external_block(b.clone());
	}

	// the main-chain client spots a possible solution by blocks[2] before
	// the sidechain has it
	let found = main_block(20, 2000);
	chain.watch_mainchain_block(found, blocks[2].id);
	assert!(events.main_found().is_empty());

	// once the sidechain block verifies, the event fires with its shares
	assert_eq!(
		chain.add_external_block(blocks[2].clone()),
		BlockAddResult::Accepted
	);
	let found_events = events.main_found();
	assert_eq!(found_events.len(), 1);
	assert_eq!(found_events[0].0, found.id);
	assert_eq!(found_events[0].1, blocks[2].id);
	assert_eq!(found_events[0].2, 1); // one miner in the window
}

#[test]
fn watch_resolves_immediately_for_known_blocks() {
	let config = test_config();
	let (chain, events, mut builder) = setup(&config);
	let b = builder.make_block(None, &[], &miner(1), base_time());
	chain.add_external_block(b.clone());

	chain.watch_mainchain_block(main_block(30, 3000), b.id);
	let found_events = events.main_found();
	assert_eq!(found_events.len(), 1);
	assert_eq!(found_events[0].1, b.id);
}

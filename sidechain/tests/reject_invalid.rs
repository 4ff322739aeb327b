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

//! Every class of invalid block is refused with the right classification.

use p2pool_core::core::{Difficulty, Hash, ShareEntry};
use p2pool_sidechain::error::ErrorKind;
use p2pool_sidechain::BlockAddResult;

use self::chain_test_helper::{base_time, miner, setup, test_config};

fn expect_rejected(res: BlockAddResult, want: ErrorKind) {
	match res {
		BlockAddResult::Rejected(kind) => assert_eq!(kind, want),
		other => panic!("expected {:?}, got {:?}", want, other),
	}
}

#[test]
fn wrong_declared_difficulty() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let genesis = builder.make_block(None, &[], &miner(1), base_time());
	assert_eq!(
		chain.add_external_block(genesis.clone()),
		BlockAddResult::Accepted
	);

	let mut b = builder.make_block(Some(&genesis.id), &[], &miner(1), base_time() + 10);
	b.declared_difficulty = Difficulty::from_num(2000);
	b.cumulative_difficulty = genesis.cumulative_difficulty + b.declared_difficulty;
	b.id = b.compute_id(&chain.consensus_id());
	expect_rejected(chain.add_external_block(b), ErrorKind::BadDifficulty);
}

#[test]
fn wrong_cumulative_difficulty() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let genesis = builder.make_block(None, &[], &miner(1), base_time());
	chain.add_external_block(genesis.clone());

	let mut b = builder.make_block(Some(&genesis.id), &[], &miner(1), base_time() + 10);
	b.cumulative_difficulty = b.cumulative_difficulty + Difficulty::one();
	b.id = b.compute_id(&chain.consensus_id());
	expect_rejected(chain.add_external_block(b), ErrorKind::BadDifficulty);
}

#[test]
fn below_minimum_difficulty() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let mut b = builder.make_block(None, &[], &miner(1), base_time());
	b.declared_difficulty = Difficulty::from_num(999);
	b.cumulative_difficulty = b.declared_difficulty;
	b.id = b.compute_id(&chain.consensus_id());
	expect_rejected(chain.add_external_block(b), ErrorKind::BadDifficulty);
}

#[test]
fn bad_pow_hash() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let mut b = builder.make_block(None, &[], &miner(1), base_time());
	// numerically enormous, can't satisfy difficulty 1000
	b.pow_hash = Hash::from_vec(&[0xff; 32]);
	b.id = b.compute_id(&chain.consensus_id());
	expect_rejected(chain.add_external_block(b), ErrorKind::BadPow);
}

#[test]
fn timestamp_too_far_in_future() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let future = chrono::Utc::now().timestamp() as u64 + 100_000;
	let b = builder.make_block(None, &[], &miner(1), future);
	expect_rejected(chain.add_external_block(b), ErrorKind::BadTimestamp);
}

#[test]
fn timestamp_below_chain_median() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let t0 = base_time();
	let blocks = builder.make_chain(None, 5, &miner(1), t0);
	for b in &blocks {
		chain.add_external_block(b.clone());
	}
	// declared time way before the chain's median
	let b = builder.make_block(Some(&blocks[4].id), &[], &miner(1), t0 - 10_000);
	expect_rejected(chain.add_external_block(b), ErrorKind::BadTimestamp);
}

#[test]
fn tampered_reward_split() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let t0 = base_time();
	let g = builder.make_block(None, &[], &miner(1), t0);
	let b1 = builder.make_block(Some(&g.id), &[], &miner(2), t0 + 10);
	chain.add_external_block(g.clone());
	chain.add_external_block(b1.clone());

	// two outputs now; shifting one atomic unit between them keeps the
	// total but breaks the proportions
	let mut b2 = builder.make_block(Some(&b1.id), &[], &miner(1), t0 + 20);
	assert_eq!(b2.output_shares.len(), 2);
	b2.output_shares[0].reward -= 1;
	b2.output_shares[1].reward += 1;
	b2.id = b2.compute_id(&chain.consensus_id());
	expect_rejected(chain.add_external_block(b2), ErrorKind::BadRewardSplit);
}

#[test]
fn duplicate_wallet_in_outputs() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let mut b = builder.make_block(None, &[], &miner(1), base_time());
	let first = b.output_shares[0].clone();
	b.output_shares = vec![
		ShareEntry {
			wallet: first.wallet,
			reward: first.reward / 2,
		},
		ShareEntry {
			wallet: first.wallet,
			reward: first.reward - first.reward / 2,
		},
	];
	b.id = b.compute_id(&chain.consensus_id());
	expect_rejected(chain.add_external_block(b), ErrorKind::DuplicateWallet);
}

#[test]
fn tampered_id_is_malformed() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let mut b = builder.make_block(None, &[], &miner(1), base_time());
	let mut raw = b.id.to_vec();
	raw[0] ^= 0x01;
	b.id = Hash::from_vec(&raw);
	match chain.add_external_block(b) {
		BlockAddResult::Rejected(ErrorKind::Malformed(_)) => {}
		other => panic!("expected malformed rejection, got {:?}", other),
	}
}

#[test]
fn empty_outputs_are_malformed() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let mut b = builder.make_block(None, &[], &miner(1), base_time());
	b.output_shares = vec![];
	b.id = b.compute_id(&chain.consensus_id());
	match chain.add_external_block(b) {
		BlockAddResult::Rejected(ErrorKind::Malformed(_)) => {}
		other => panic!("expected malformed rejection, got {:?}", other),
	}
}

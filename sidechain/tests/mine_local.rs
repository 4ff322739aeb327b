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

//! The local mining path: fill a candidate from the current tip, build
//! its coinbase from the returned shares, submit it back.

use p2pool_core::core::{derive_output_key, SecretScalar, ShareEntry};
use p2pool_sidechain::{window, BlockAddResult};

use self::chain_test_helper::{base_time, empty_template, miner, setup, test_config};

#[test]
fn fill_build_and_submit_local_block() {
	let config = test_config();
	let (chain, events, mut builder) = setup(&config);
	let (w1, w2) = (miner(1), miner(2));

	let blocks = builder.make_chain(None, 5, &w1, base_time());
	for b in &blocks {
		chain.add_external_block(b.clone());
	}

	// the block builder asks the sidechain for the candidate's linkage
	let mut candidate = empty_template();
	let tx_sec = SecretScalar::from_entropy(&[b"local tx key"]);
	let shares = chain
		.fill_sidechain_data(&mut candidate, &w2, tx_sec)
		.expect("fill");
	assert_eq!(candidate.parent_id, blocks[4].id);
	assert_eq!(candidate.height, 5);
	assert_eq!(candidate.miner_wallet, w2);
	// the candidate's own share is already in the set
	assert!(shares.iter().any(|s| s.wallet == w2));

	// build the coinbase from the shares, then finalize and submit
	let total_reward = 600_000_000_000u64;
	let rewards = window::split_reward(total_reward, &shares).expect("split");
	candidate.output_shares = shares
		.iter()
		.zip(rewards.iter())
		.map(|(s, r)| ShareEntry {
			wallet: s.wallet,
			reward: *r,
		})
		.collect();
	candidate.nonce = 12345;
	candidate.id = candidate.compute_id(&chain.consensus_id());

	assert_eq!(chain.add_block(candidate.clone()), BlockAddResult::Accepted);
	let tip = chain.chain_tip().unwrap();
	assert_eq!(tip.last_block_h, candidate.id);
	assert_eq!(tip.height, 5);
	assert!(events.tip_changes().contains(&(candidate.id, 0)));

	// the echo of our own block is a duplicate
	assert_eq!(chain.add_block(candidate), BlockAddResult::Duplicate);
}

#[test]
fn precalc_covers_the_tip_wallets() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let (w1, w2) = (miner(1), miner(2));
	let t0 = base_time();

	let g = builder.make_block(None, &[], &w1, t0);
	let b1 = builder.make_block(Some(&g.id), &[], &w2, t0 + 10);
	chain.add_external_block(g.clone());
	chain.add_external_block(b1.clone());

	// wait for the workers, then every share position must resolve to
	// the same key the direct derivation gives
	chain.precalc().wait_finished();
	assert!(chain.precalc_finished());

	let tx_sec = SecretScalar::from_entropy(&[b"builder key"]);
	let shares = window::get_shares(&b1, &builder.mirror, &builder.params).unwrap();
	for (i, share) in shares.iter().enumerate() {
		let via_pool = chain
			.precalc()
			.lookup_or_compute(&share.wallet, &tx_sec, i as u64)
			.expect("valid wallet");
		let direct = derive_output_key(
			&share.wallet.view_pub,
			&share.wallet.spend_pub,
			&tx_sec,
			i as u64,
		)
		.unwrap();
		assert_eq!(via_pool, direct);
	}
}

#[test]
fn shutdown_refuses_new_work() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let b = builder.make_block(None, &[], &miner(1), base_time());
	chain.add_external_block(b.clone());

	chain.shutdown();

	let late = builder.make_block(Some(&b.id), &[], &miner(1), base_time() + 10);
	match chain.add_external_block(late) {
		BlockAddResult::Rejected(p2pool_sidechain::ErrorKind::Shutdown) => {}
		other => panic!("expected shutdown rejection, got {:?}", other),
	}

	let mut candidate = empty_template();
	let res = chain.fill_sidechain_data(
		&mut candidate,
		&miner(2),
		SecretScalar::from_entropy(&[b"late"]),
	);
	assert!(res.is_err());
}

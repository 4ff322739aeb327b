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

//! Gossip blobs round-trip byte-exactly through parse and re-serialize.

use p2pool_core::core::PoolBlock;
use p2pool_core::ser;
use p2pool_sidechain::BlockAddResult;

use self::chain_test_helper::{base_time, miner, setup, test_config};

#[test]
fn blob_parses_back_to_a_duplicate() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let blocks = builder.make_chain(None, 3, &miner(1), base_time());
	for b in &blocks {
		assert_eq!(chain.add_external_block(b.clone()), BlockAddResult::Accepted);
	}

	for b in &blocks {
		let blob = chain.get_block_blob(&b.id).expect("blob");
		let parsed: PoolBlock = ser::deserialize(&mut &blob[..]).expect("parse");
		assert_eq!(parsed.id, b.id);
		assert_eq!(parsed.height, b.height);

		// re-serialization is byte-identical
		let blob2 = ser::ser_vec(&parsed).unwrap();
		assert_eq!(blob, blob2);

		// and re-inserting it reads as a duplicate
		assert_eq!(chain.add_external_block(parsed), BlockAddResult::Duplicate);
	}

	// unknown ids have no blob
	let ghost = p2pool_core::core::Hash::from_vec(&[0xaa; 32]);
	assert_eq!(chain.get_block_blob(&ghost), None);
}

#[test]
fn runtime_fields_not_leaked_into_blob() {
	let config = test_config();
	let (chain, _events, mut builder) = setup(&config);
	let b = builder.make_block(None, &[], &miner(1), base_time());
	chain.add_external_block(b.clone());

	// the stored copy has runtime state (verified, arrival order); the
	// blob of the stored copy must equal the blob of the pristine one
	let stored_blob = chain.get_block_blob(&b.id).unwrap();
	let pristine_blob = ser::ser_vec(&b).unwrap();
	assert_eq!(stored_blob, pristine_blob);

	let parsed: PoolBlock = ser::deserialize(&mut &stored_blob[..]).unwrap();
	assert!(!parsed.verified);
	assert_eq!(parsed.arrival_order, 0);
	assert_eq!(parsed.depth, 0);
}

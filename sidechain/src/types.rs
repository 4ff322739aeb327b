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

//! Base types that the sidechain pipeline requires.

use std::fmt;

use p2pool_config::PoolConfig;
use p2pool_core::core::{Difficulty, Hash, PoolBlock};
use p2pool_core::NetworkType;
use p2pool_util::ZeroingString;

use crate::error::ErrorKind;
use crate::window::MinerShare;

bitflags! {
	/// Options for block validation
	pub struct Options: u32 {
		/// No flags
		const NONE = 0b0000_0001;
		/// Skips the PoW check. Only for locally mined blocks whose pow
		/// hash was already checked on the mining path.
		const SKIP_POW = 0b0000_0010;
	}
}

/// The consensus parameters of one pool. Every peer must run with an
/// identical set or end up on its own sidechain.
#[derive(Clone)]
pub struct ChainParams {
	/// Which network the pool mines on
	pub network_type: NetworkType,
	/// Pool name, part of the consensus id preimage
	pub pool_name: String,
	/// Pool password, part of the consensus id preimage, never transmitted
	pub pool_password: ZeroingString,
	/// Target sidechain block interval, seconds
	pub target_block_time: u64,
	/// Minimum accepted share difficulty
	pub min_difficulty: Difficulty,
	/// Number of blocks in the PPLNS window
	pub chain_window_size: u64,
	/// Percentage of an uncle's difficulty forfeited to the including miner
	pub uncle_penalty: u64,
}

impl ChainParams {
	/// Extracts the consensus parameters out of a loaded config document.
	pub fn from_config(config: &PoolConfig) -> ChainParams {
		ChainParams {
			network_type: config.network_type,
			pool_name: config.pool_name.clone(),
			pool_password: ZeroingString::from(config.pool_password.clone()),
			target_block_time: config.target_block_time,
			min_difficulty: config.min_difficulty,
			chain_window_size: config.chain_window_size,
			uncle_penalty: config.uncle_penalty,
		}
	}
}

impl fmt::Debug for ChainParams {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// the password stays out of logs
		f.debug_struct("ChainParams")
			.field("network_type", &self.network_type)
			.field("pool_name", &self.pool_name)
			.field("target_block_time", &self.target_block_time)
			.field("min_difficulty", &self.min_difficulty)
			.field("chain_window_size", &self.chain_window_size)
			.field("uncle_penalty", &self.uncle_penalty)
			.finish()
	}
}

/// The tip of the sidechain. A handle to the current best fork: the latest
/// block, its predecessor for convenience, and the accumulated difficulty.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Tip {
	/// Height of the tip (max height of the fork)
	pub height: u64,
	/// Last block pushed to the fork
	pub last_block_h: Hash,
	/// Block previous to last
	pub prev_block_h: Hash,
	/// Total difficulty accumulated on that fork
	pub cumulative_difficulty: Difficulty,
}

impl Tip {
	/// Creates the tip pointing at the provided block.
	pub fn from_block(b: &PoolBlock) -> Tip {
		Tip {
			height: b.height,
			last_block_h: b.id,
			prev_block_h: b.parent_id,
			cumulative_difficulty: b.cumulative_difficulty,
		}
	}
}

/// Outcome of handing a block to the sidechain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockAddResult {
	/// Block passed validation and is now part of the DAG
	Accepted,
	/// We'd already seen this exact block (id and nonces), dropped cheaply
	Duplicate,
	/// The block can't be judged yet, these ancestors need fetching first
	MissingParent(Vec<Hash>),
	/// The block is invalid and was dropped, with the failing check
	Rejected(ErrorKind),
}

/// Bridge between the sidechain and the rest of the system. Events are
/// emitted after the writer lock is released: anything an implementor looks
/// up through the read surface is guaranteed to observe the state the event
/// describes.
pub trait SideChainAdapter: Send + Sync {
	/// The block passed validation and was added to the DAG.
	fn block_accepted(&self, b: &PoolBlock);

	/// The block was rejected as invalid.
	fn block_rejected(&self, id: Hash, kind: &ErrorKind);

	/// A block was parked for lack of these ancestors; the P2P layer
	/// should request them from peers.
	fn missing_parents(&self, ids: &[Hash]);

	/// The chain tip moved. `reorg_depth` is the number of abandoned
	/// blocks on the old branch, zero for a plain extension.
	fn tip_changed(&self, new_tip: Hash, reorg_depth: u64);

	/// A sidechain block also satisfied the main chain's target: a real
	/// coinbase is being paid out along these shares.
	fn main_block_found(&self, main_id: Hash, sidechain_id: Hash, shares: &[MinerShare]);
}

/// Dummy adapter used as a placeholder and in tests where nobody listens.
pub struct NoopAdapter {}

impl SideChainAdapter for NoopAdapter {
	fn block_accepted(&self, _b: &PoolBlock) {}
	fn block_rejected(&self, _id: Hash, _kind: &ErrorKind) {}
	fn missing_parents(&self, _ids: &[Hash]) {}
	fn tip_changed(&self, _new_tip: Hash, _reorg_depth: u64) {}
	fn main_block_found(&self, _main_id: Hash, _sidechain_id: Hash, _shares: &[MinerShare]) {}
}

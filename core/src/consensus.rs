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

//! All the rules required for the pool to reach consensus across the whole
//! network are complex and hard to completely isolate. Some can be simple
//! parameters (like the uncle depth), others complex algorithms (like the
//! difficulty retarget). However, as long as they're simple enough,
//! consensus-relevant constants and short functions should be kept here.

use std::cmp::max;
use std::fmt;

use crate::core::difficulty::Difficulty;

/// How deep a sibling may sit below the including block and still be
/// creditable as an uncle.
pub const UNCLE_BLOCK_DEPTH: u64 = 3;

/// A block's timestamp must not be below the median of this many parent
/// chain timestamps.
pub const MEDIAN_TIMESTAMP_WINDOW: u64 = 60;

/// How far into the future (seconds) a declared timestamp may run ahead of
/// our clock.
pub const MAX_FUTURE_TIMESTAMP_DRIFT: u64 = 600;

/// How many recent main-chain blocks are retained as acceptable anchors.
pub const MAIN_CHAIN_WINDOW: usize = 720;

/// Default sidechain block interval, in seconds.
pub const DEFAULT_TARGET_BLOCK_TIME: u64 = 10;

/// Default number of blocks in the PPLNS window.
pub const DEFAULT_CHAIN_WINDOW_SIZE: u64 = 2160;

/// Default share of an uncle's difficulty forfeited to the including
/// block's miner, in percent.
pub const DEFAULT_UNCLE_PENALTY: u64 = 20;

/// Default minimum accepted share difficulty.
pub const DEFAULT_MIN_DIFFICULTY: u128 = 100_000;

/// Depth beyond which blocks are eligible for pruning: two full PPLNS
/// windows plus a couple minutes of spare blocks for lagging peers.
pub fn prune_depth(chain_window_size: u64) -> u64 {
	2 * chain_window_size + 12
}

/// The network the pool anchors to. Pools on different networks never
/// interoperate; the variant is mixed into the consensus id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NetworkType {
	/// Main production network
	Mainnet,
	/// Public testing network
	Testnet,
	/// Staging network, midway between the two
	Stagenet,
}

impl NetworkType {
	/// Stable name, used in the consensus id preimage.
	pub fn name(&self) -> &'static str {
		match *self {
			NetworkType::Mainnet => "mainnet",
			NetworkType::Testnet => "testnet",
			NetworkType::Stagenet => "stagenet",
		}
	}
}

impl Default for NetworkType {
	fn default() -> NetworkType {
		NetworkType::Mainnet
	}
}

impl fmt::Display for NetworkType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.name())
	}
}

/// One sample of the retarget window: when a block was declared mined and
/// how much work its chain had accumulated by then.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyData {
	/// Declared timestamp of the block
	pub timestamp: u64,
	/// Cumulative chain difficulty including the block
	pub cumulative_difficulty: Difficulty,
}

impl DifficultyData {
	/// Convenience constructor
	pub fn new(timestamp: u64, cumulative_difficulty: Difficulty) -> DifficultyData {
		DifficultyData {
			timestamp,
			cumulative_difficulty,
		}
	}
}

/// Computes the difficulty the next sidechain block must declare, from the
/// (timestamp, cumulative difficulty) samples of the chain window.
///
/// The lowest and highest sixth of timestamps are trimmed so a miner
/// declaring absurd timestamps moves the estimate as little as possible;
/// the rate of the surviving span is then scaled to the target block time
/// and clamped from below.
pub fn next_difficulty(
	window: &[DifficultyData],
	target_block_time: u64,
	min_difficulty: Difficulty,
) -> Difficulty {
	if window.len() < 2 {
		return min_difficulty;
	}

	let mut sorted = window.to_vec();
	// secondary key keeps the result independent of the caller's ordering
	sorted.sort_by(|a, b| {
		a.timestamp
			.cmp(&b.timestamp)
			.then(a.cumulative_difficulty.cmp(&b.cumulative_difficulty))
	});

	// windows shorter than 6 samples survive untrimmed
	let cut = sorted.len() / 6;
	let low = &sorted[cut];
	let high = &sorted[sorted.len() - 1 - cut];

	let work = high.cumulative_difficulty - low.cumulative_difficulty;
	let span = high.timestamp.saturating_sub(low.timestamp);
	if span == 0 {
		// degenerate window, all the work happened "at once"
		return max(work, min_difficulty);
	}

	max(work * target_block_time / span, min_difficulty)
}

/// Median of the provided timestamps. Zero for an empty slice.
pub fn median_timestamp(timestamps: &[u64]) -> u64 {
	if timestamps.is_empty() {
		return 0;
	}
	let mut sorted = timestamps.to_vec();
	sorted.sort_unstable();
	let mid = sorted.len() / 2;
	if sorted.len() % 2 == 0 {
		(sorted[mid - 1] + sorted[mid]) / 2
	} else {
		sorted[mid]
	}
}

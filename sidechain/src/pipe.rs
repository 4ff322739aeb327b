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

//! Implementation of the block acceptance (or refusal) pipeline. Checks
//! run fail-fast in order of cost; the first failure classifies the
//! rejection. Everything here is deterministic and pure given the store
//! snapshot, which is what lets every peer agree on every block.

use std::collections::{HashMap, HashSet};

use p2pool_core::consensus;
use p2pool_core::core::{ChainMain, Difficulty, Hash, PoolBlock, Wallet, ZERO_HASH};

use crate::error::{Error, ErrorKind};
use crate::seen::SeenWallets;
use crate::selector;
use crate::store::BlockDagStore;
use crate::types::{ChainParams, Options};
use crate::window;

/// How many wallets we accept seeing for the first time inside one burst
/// window before throttling further ones. Gossip-level DoS protection,
/// not a consensus rule.
const NEW_WALLET_BURST_LIMIT: usize = 64;

/// Length of the new-wallet burst window, seconds.
const NEW_WALLET_BURST_WINDOW: u64 = 600;

/// Contextual information required to process a new block and either
/// reject or accept it.
pub struct BlockContext<'a> {
	/// Validation options
	pub opts: Options,
	/// The DAG snapshot the block is judged against
	pub store: &'a BlockDagStore,
	/// Consensus parameters of this pool
	pub params: &'a ChainParams,
	/// Salt for the sidechain id
	pub consensus_id: Hash,
	/// Recently observed main-chain blocks, acceptable anchors
	pub main_anchors: &'a HashMap<Hash, ChainMain>,
	/// First-seen bookkeeping for miner wallets
	pub seen_wallets: &'a SeenWallets,
	/// Wall clock, seconds
	pub now: u64,
}

/// Runs the block validation pipeline. On success the caller marks the
/// block `verified` and inserts it into the store.
pub fn process_block(b: &PoolBlock, ctx: &BlockContext<'_>) -> Result<(), Error> {
	debug!(
		"pipe: process_block {} at height {}, in total {} blocks",
		b.id,
		b.height,
		ctx.store.len()
	);

	check_structural(b, ctx)?;
	check_parent(b, ctx)?;
	check_height_time(b, ctx)?;
	check_main_anchor(b, ctx)?;
	check_uncles(b, ctx)?;
	check_difficulty(b, ctx)?;
	check_pow(b, ctx)?;
	check_reward_split(b, ctx)?;
	Ok(())
}

/// The ancestors of `b` the store does not hold: its parent and any
/// missing uncles. What the P2P layer should go and fetch.
pub fn missing_ancestors(b: &PoolBlock, store: &BlockDagStore) -> Vec<Hash> {
	let mut missing = vec![];
	if !b.is_genesis() && !store.contains(&b.parent_id) {
		missing.push(b.parent_id);
	}
	for uncle_id in &b.uncle_ids {
		if !store.contains(uncle_id) {
			missing.push(*uncle_id);
		}
	}
	missing
}

// First level of validation, everything that only needs the block itself.
// Arranged by order of cost to keep the DoS surface as small as possible.
fn check_structural(b: &PoolBlock, ctx: &BlockContext<'_>) -> Result<(), Error> {
	if b.declared_difficulty < ctx.params.min_difficulty {
		return Err(ErrorKind::BadDifficulty.into());
	}
	if b.output_shares.is_empty() {
		return Err(ErrorKind::Malformed("no coinbase outputs".to_owned()).into());
	}
	if (b.parent_id == ZERO_HASH) != (b.height == 0) {
		return Err(ErrorKind::BadHeight.into());
	}

	// uncle list must come sorted and unique, one canonical encoding only
	for pair in b.uncle_ids.windows(2) {
		if pair[0] >= pair[1] {
			return Err(ErrorKind::Malformed("uncle list not canonical".to_owned()).into());
		}
	}

	let mut wallets: HashSet<&Wallet> = HashSet::new();
	for share in &b.output_shares {
		if !wallets.insert(&share.wallet) {
			return Err(ErrorKind::DuplicateWallet.into());
		}
	}

	if !b.miner_wallet.is_valid() {
		return Err(ErrorKind::Malformed("miner wallet not on curve".to_owned()).into());
	}

	// the id is salted with the consensus id: a block from a differently
	// configured pool fails right here
	if b.id != b.compute_id(&ctx.consensus_id) {
		return Err(ErrorKind::Malformed("sidechain id mismatch".to_owned()).into());
	}

	// throttle a gossip burst of never-before-seen wallets; local blocks
	// are exempt, the local miner is by definition known
	let first_seen = ctx.seen_wallets.mark(&b.miner_wallet, ctx.now);
	if first_seen == ctx.now && !ctx.opts.contains(Options::SKIP_POW) {
		let burst = ctx
			.seen_wallets
			.new_wallets_since(ctx.now.saturating_sub(NEW_WALLET_BURST_WINDOW));
		if burst > NEW_WALLET_BURST_LIMIT {
			return Err(
				ErrorKind::Malformed(format!("{} new wallets inside burst window", burst)).into(),
			);
		}
	}

	Ok(())
}

// Parent and uncle linkage. A block whose ancestors we don't hold is not
// rejected, it is parked until they arrive.
fn check_parent(b: &PoolBlock, ctx: &BlockContext<'_>) -> Result<(), Error> {
	if !b.is_genesis() && !ctx.store.contains(&b.parent_id) {
		return Err(ErrorKind::MissingParent.into());
	}
	for uncle_id in &b.uncle_ids {
		if !ctx.store.contains(uncle_id) {
			return Err(ErrorKind::MissingParent.into());
		}
	}
	Ok(())
}

fn check_height_time(b: &PoolBlock, ctx: &BlockContext<'_>) -> Result<(), Error> {
	if b.timestamp > ctx.now + consensus::MAX_FUTURE_TIMESTAMP_DRIFT {
		return Err(ErrorKind::BadTimestamp.into());
	}

	if b.is_genesis() {
		return Ok(());
	}
	let parent = ctx
		.store
		.find(&b.parent_id)
		.ok_or_else(|| Error::from(ErrorKind::MissingParent))?;
	if b.height != parent.height + 1 {
		return Err(ErrorKind::BadHeight.into());
	}

	// prevent time warping: the declared timestamp may not fall below the
	// median of the recent parent chain
	if b.timestamp < median_of_parent_chain(parent, ctx.store) {
		return Err(ErrorKind::BadTimestamp.into());
	}
	Ok(())
}

// Median timestamp of the chain ending in `parent`, over the median
// window. The floor for the next block's declared timestamp.
pub(crate) fn median_of_parent_chain(parent: &PoolBlock, store: &BlockDagStore) -> u64 {
	let mut timestamps = Vec::with_capacity(consensus::MEDIAN_TIMESTAMP_WINDOW as usize);
	let mut cur = parent;
	loop {
		timestamps.push(cur.timestamp);
		if timestamps.len() as u64 >= consensus::MEDIAN_TIMESTAMP_WINDOW || cur.is_genesis() {
			break;
		}
		match store.parent_of(cur) {
			Some(p) => cur = p,
			None => break,
		}
	}
	consensus::median_timestamp(&timestamps)
}

// The block must anchor to a main-chain block we observed recently. A
// freshly started node that hasn't heard from the main chain yet has
// nothing to judge against and lets blocks through; the rest of the
// pipeline still binds them to the sidechain.
fn check_main_anchor(b: &PoolBlock, ctx: &BlockContext<'_>) -> Result<(), Error> {
	if ctx.main_anchors.is_empty() {
		return Ok(());
	}
	let anchor = ctx
		.main_anchors
		.get(&b.main_prev_id)
		.ok_or_else(|| Error::from(ErrorKind::UnknownMainAnchor))?;
	if b.main_height != anchor.height + 1 {
		return Err(ErrorKind::UnknownMainAnchor.into());
	}
	Ok(())
}

fn check_uncles(b: &PoolBlock, ctx: &BlockContext<'_>) -> Result<(), Error> {
	if b.uncle_ids.is_empty() {
		return Ok(());
	}
	let parent = match ctx.store.find(&b.parent_id) {
		Some(p) => p,
		// genesis can't have uncles, nothing existed before it
		None => return Err(ErrorKind::BadUncle("uncles on genesis".to_owned()).into()),
	};

	// uncles already credited by the recent ancestry can't be claimed again
	let mut credited: HashSet<Hash> = HashSet::new();
	let mut cur = parent;
	for _ in 0..consensus::UNCLE_BLOCK_DEPTH {
		for uncle_id in &cur.uncle_ids {
			credited.insert(*uncle_id);
		}
		match ctx.store.parent_of(cur) {
			Some(p) => cur = p,
			None => break,
		}
	}

	for uncle_id in &b.uncle_ids {
		let uncle = ctx
			.store
			.find(uncle_id)
			.ok_or_else(|| Error::from(ErrorKind::MissingParent))?;

		if uncle.height >= b.height {
			return Err(ErrorKind::BadUncle("uncle not below block".to_owned()).into());
		}
		if uncle.height + consensus::UNCLE_BLOCK_DEPTH < b.height {
			return Err(ErrorKind::BadUncle("uncle too deep".to_owned()).into());
		}
		if selector::is_ancestor(ctx.store, uncle_id, parent) {
			return Err(ErrorKind::BadUncle("uncle is an ancestor".to_owned()).into());
		}
		if !selector::is_ancestor(ctx.store, &uncle.parent_id, parent) {
			return Err(
				ErrorKind::BadUncle("uncle does not branch off our chain".to_owned()).into(),
			);
		}
		if credited.contains(uncle_id) {
			return Err(ErrorKind::BadUncle("uncle already credited".to_owned()).into());
		}
	}
	Ok(())
}

// Declared difficulty must be exactly what the window engine derives from
// the parent, and the cumulative difficulty must account for the parent
// chain plus the discounted uncle credits.
fn check_difficulty(b: &PoolBlock, ctx: &BlockContext<'_>) -> Result<(), Error> {
	let (expected, parent_cum) = match ctx.store.find(&b.parent_id) {
		Some(parent) => (
			window::get_difficulty(parent, ctx.store, ctx.params)?,
			parent.cumulative_difficulty,
		),
		None => (ctx.params.min_difficulty, Difficulty::zero()),
	};
	if b.declared_difficulty != expected {
		debug!(
			"pipe: block {} declares difficulty {}, expected {}",
			b.id, b.declared_difficulty, expected
		);
		return Err(ErrorKind::BadDifficulty.into());
	}

	let mut expected_cum = parent_cum + b.declared_difficulty;
	for uncle_id in &b.uncle_ids {
		let uncle = ctx
			.store
			.find(uncle_id)
			.ok_or_else(|| Error::from(ErrorKind::MissingParent))?;
		expected_cum += uncle.declared_difficulty * (100 - ctx.params.uncle_penalty) / 100;
	}
	if b.cumulative_difficulty != expected_cum {
		return Err(ErrorKind::BadDifficulty.into());
	}
	Ok(())
}

fn check_pow(b: &PoolBlock, ctx: &BlockContext<'_>) -> Result<(), Error> {
	if ctx.opts.contains(Options::SKIP_POW) {
		// locally mined block, the mining path already checked the hash
		return Ok(());
	}
	if !b.declared_difficulty.check_pow(&b.pow_hash) {
		return Err(ErrorKind::BadPow.into());
	}
	Ok(())
}

// The declared coinbase outputs must be byte-identical to what we derive
// ourselves: same wallets, same amounts, same order.
fn check_reward_split(b: &PoolBlock, ctx: &BlockContext<'_>) -> Result<(), Error> {
	let shares = window::get_shares(b, ctx.store, ctx.params)?;

	let mut total: u64 = 0;
	for share in &b.output_shares {
		total = total
			.checked_add(share.reward)
			.ok_or_else(|| Error::from(ErrorKind::BadRewardSplit))?;
	}

	let rewards =
		window::split_reward(total, &shares).ok_or_else(|| Error::from(ErrorKind::BadRewardSplit))?;

	if b.output_shares.len() != shares.len() {
		return Err(ErrorKind::BadRewardSplit.into());
	}
	for (declared, (share, reward)) in b
		.output_shares
		.iter()
		.zip(shares.iter().zip(rewards.iter()))
	{
		if declared.wallet != share.wallet || declared.reward != *reward {
			return Err(ErrorKind::BadRewardSplit.into());
		}
	}
	Ok(())
}

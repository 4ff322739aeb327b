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

//! The PPLNS window engine. Walks the last N blocks hanging off a tip and
//! turns them into the things consensus needs: per-miner share weights
//! (uncles included, at a penalty), the retargeted difficulty, and the
//! wallet list for key precomputation. Every function here is a pure
//! function of the tip and its ancestor closure; all peers must produce
//! byte-identical results.

use std::collections::HashMap;

use p2pool_core::consensus::{self, DifficultyData};
use p2pool_core::core::{Difficulty, PoolBlock, Wallet};

use crate::error::{Error, ErrorKind};
use crate::store::BlockDagStore;
use crate::types::ChainParams;

/// One miner's share of the window: the wallet and its accumulated weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinerShare {
	/// Accumulated weight inside the window
	pub weight: Difficulty,
	/// The miner this weight belongs to
	pub wallet: Wallet,
}

impl MinerShare {
	/// Convenience constructor
	pub fn new(weight: Difficulty, wallet: Wallet) -> MinerShare {
		MinerShare { weight, wallet }
	}
}

// Walks the window from `tip` (which does not need to be in the store yet;
// a candidate block under validation walks from itself) and feeds every
// window block to `visit`. Stops after the configured window size or at
// genesis.
fn walk_window<'a, F>(
	tip: &'a PoolBlock,
	store: &'a BlockDagStore,
	params: &ChainParams,
	mut visit: F,
) -> Result<(), Error>
where
	F: FnMut(&'a PoolBlock) -> Result<(), Error>,
{
	let mut cur = tip;
	let mut walked = 0;
	loop {
		visit(cur)?;
		walked += 1;
		if walked >= params.chain_window_size || cur.is_genesis() {
			return Ok(());
		}
		cur = store.parent_of(cur).ok_or_else(|| {
			Error::from(ErrorKind::StoreErr(format!(
				"window walk from {} lost parent of {} at height {}",
				tip.id, cur.id, cur.height
			)))
		})?;
	}
}

/// Computes the ordered share set of the window hanging off `tip`: every
/// window block credits its declared difficulty to its miner, and every
/// uncle credited inside the window splits its difficulty between the
/// uncle's miner and the including miner according to the uncle penalty.
///
/// Shares come back merged per wallet in canonical order: descending
/// weight, ties broken by wallet byte order. The order is consensus, the
/// coinbase is built from it.
pub fn get_shares(
	tip: &PoolBlock,
	store: &BlockDagStore,
	params: &ChainParams,
) -> Result<Vec<MinerShare>, Error> {
	let bottom = tip.height.saturating_sub(params.chain_window_size - 1);
	let mut weights: HashMap<Wallet, Difficulty> = HashMap::new();

	walk_window(tip, store, params, |block| {
		let mut block_weight = block.declared_difficulty;

		for uncle_id in &block.uncle_ids {
			let uncle = store.find(uncle_id).ok_or_else(|| {
				Error::from(ErrorKind::StoreErr(format!(
					"uncle {} of {} not in store",
					uncle_id, block.id
				)))
			})?;
			if uncle.height < bottom {
				// dangling below the window, its work is not counted
				continue;
			}
			let credit = uncle.declared_difficulty * (100 - params.uncle_penalty) / 100;
			let bonus = uncle.declared_difficulty * params.uncle_penalty / 100;
			*weights.entry(uncle.miner_wallet).or_insert_with(Difficulty::zero) += credit;
			block_weight += bonus;
		}

		*weights
			.entry(block.miner_wallet)
			.or_insert_with(Difficulty::zero) += block_weight;
		Ok(())
	})?;

	let mut shares: Vec<MinerShare> = weights
		.into_iter()
		.map(|(wallet, weight)| MinerShare::new(weight, wallet))
		.collect();
	shares.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.wallet.cmp(&b.wallet)));
	Ok(shares)
}

/// The (timestamp, cumulative difficulty) samples of the window, input to
/// the retarget.
pub fn difficulty_data(
	tip: &PoolBlock,
	store: &BlockDagStore,
	params: &ChainParams,
) -> Result<Vec<DifficultyData>, Error> {
	let mut data = Vec::with_capacity(params.chain_window_size as usize);
	walk_window(tip, store, params, |block| {
		data.push(DifficultyData::new(
			block.timestamp,
			block.cumulative_difficulty,
		));
		Ok(())
	})?;
	Ok(data)
}

/// The difficulty the next block on top of `tip` must declare.
pub fn get_difficulty(
	tip: &PoolBlock,
	store: &BlockDagStore,
	params: &ChainParams,
) -> Result<Difficulty, Error> {
	let data = difficulty_data(tip, store, params)?;
	Ok(consensus::next_difficulty(
		&data,
		params.target_block_time,
		params.min_difficulty,
	))
}

/// The distinct wallets of the window in canonical share order: exactly
/// the coinbase output list the next block will carry, and the input to
/// output key precomputation.
pub fn get_wallets(
	tip: &PoolBlock,
	store: &BlockDagStore,
	params: &ChainParams,
) -> Result<Vec<Wallet>, Error> {
	Ok(get_shares(tip, store, params)?
		.into_iter()
		.map(|s| s.wallet)
		.collect())
}

/// Splits `reward` proportionally to the share weights using integer math
/// only. Floor division first, then the remainder goes one atomic unit at
/// a time to the entries with the largest fractional parts, ties broken by
/// canonical share order. The output always sums to `reward` exactly.
/// Returns `None` only when the total weight is zero.
pub fn split_reward(reward: u64, shares: &[MinerShare]) -> Option<Vec<u64>> {
	let total: u128 = shares
		.iter()
		.fold(0u128, |acc, s| acc.saturating_add(s.weight.to_num()));
	if total == 0 {
		return None;
	}

	// scale weights down so `reward * weight` can't overflow 128 bits;
	// with realistic window weights the shift is zero
	let bits = 128 - total.leading_zeros();
	let shift = bits.saturating_sub(64);
	let scaled: Vec<u128> = shares.iter().map(|s| s.weight.to_num() >> shift).collect();
	let scaled_total: u128 = scaled.iter().sum();
	if scaled_total == 0 {
		return None;
	}

	let mut rewards = Vec::with_capacity(shares.len());
	let mut fractions = Vec::with_capacity(shares.len());
	let mut distributed: u64 = 0;
	for (i, w) in scaled.iter().enumerate() {
		let product = reward as u128 * w;
		let r = (product / scaled_total) as u64;
		rewards.push(r);
		fractions.push((product % scaled_total, i));
		distributed += r;
	}

	// hand the remainder out by largest fraction, then canonical order
	let remainder = reward - distributed;
	fractions.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
	for k in 0..remainder as usize {
		rewards[fractions[k].1] += 1;
	}

	Some(rewards)
}

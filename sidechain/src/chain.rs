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

//! Facade and handler for the rest of the sidechain implementation and
//! mostly the block acceptance pipeline. All mutating operations serialize
//! behind a single writer lock over the DAG and tip; reads share it.
//! Events go out to the adapter only after the lock is released, so a
//! subscriber looking things up always observes the state its event
//! describes.

use std::cmp::max;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use p2pool_config::PoolConfig;
use p2pool_core::consensus;
use p2pool_core::core::hash::HashWriter;
use p2pool_core::core::{ChainMain, Difficulty, Hash, PoolBlock, SecretScalar, Wallet, ZERO_HASH};
use p2pool_core::ser::{self, Writeable, Writer};
use p2pool_util::{RwLock, StopState};

use crate::error::{Error, ErrorKind};
use crate::pipe::{self, BlockContext};
use crate::precalc::PrecalcPool;
use crate::seen::{SeenBlocks, SeenWallets};
use crate::selector;
use crate::store::{BlockDagStore, InsertResult};
use crate::types::{BlockAddResult, ChainParams, Options, SideChainAdapter, Tip};
use crate::window::{self, MinerShare};

/// Cap on blocks parked for a missing parent.
const MAX_PENDING_BLOCKS: usize = 500;

/// How long a parked block waits for its ancestors, seconds.
const PENDING_BLOCK_TTL: u64 = 600;

/// The seen-blocks set holds this many windows' worth of identities.
const SEEN_BLOCKS_OVERSCAN: u64 = 3;

#[derive(Clone)]
struct PendingBlock {
	block: PoolBlock,
	opts: Options,
	added_at: u64,
}

// Blocks whose parent (or uncle) hasn't arrived yet, keyed by their own
// id. Small enough that a freshly accepted block just rescans it for
// anything that became connectable.
struct PendingPool {
	blocks: HashMap<Hash, PendingBlock>,
}

impl PendingPool {
	fn new() -> PendingPool {
		PendingPool {
			blocks: HashMap::new(),
		}
	}

	fn len(&self) -> usize {
		self.blocks.len()
	}

	fn add(&mut self, block: PoolBlock, opts: Options, now: u64) {
		if self.blocks.contains_key(&block.id) {
			return;
		}
		self.evict_expired(now);
		if self.blocks.len() >= MAX_PENDING_BLOCKS {
			// drop the highest pending block, it is the furthest from
			// being connectable
			let highest = self
				.blocks
				.values()
				.max_by_key(|p| p.block.height)
				.map(|p| p.block.id);
			if let Some(id) = highest {
				self.blocks.remove(&id);
			}
		}
		self.blocks.insert(
			block.id,
			PendingBlock {
				block,
				opts,
				added_at: now,
			},
		);
	}

	// every parked block whose parent and uncles are now all present,
	// removed from the pool. A block waiting on an uncle only must come
	// out here too, not just direct children of the new arrival.
	fn take_ready(&mut self, store: &BlockDagStore) -> Vec<(PoolBlock, Options)> {
		let ready: Vec<Hash> = self
			.blocks
			.values()
			.filter(|p| pipe::missing_ancestors(&p.block, store).is_empty())
			.map(|p| p.block.id)
			.collect();
		ready
			.iter()
			.filter_map(|id| self.blocks.remove(id))
			.map(|p| (p.block, p.opts))
			.collect()
	}

	fn evict_expired(&mut self, now: u64) {
		let expired: Vec<Hash> = self
			.blocks
			.values()
			.filter(|p| now.saturating_sub(p.added_at) > PENDING_BLOCK_TTL)
			.map(|p| p.block.id)
			.collect();
		for id in expired {
			self.blocks.remove(&id);
		}
	}

	// ancestors referenced by parked blocks that we hold nowhere
	fn missing_ancestors(&self, store: &BlockDagStore) -> Vec<Hash> {
		let mut missing = HashSet::new();
		for pending in self.blocks.values() {
			for id in pipe::missing_ancestors(&pending.block, store) {
				if !self.blocks.contains_key(&id) {
					missing.insert(id);
				}
			}
		}
		missing.into_iter().collect()
	}
}

struct ChainInner {
	store: BlockDagStore,
	tip: Option<Hash>,
	pending: PendingPool,
	// recently observed main-chain blocks, the acceptable anchors
	main_anchors: HashMap<Hash, ChainMain>,
	// a main-chain block that may have been solved by a sidechain block
	watch_block: Option<(ChainMain, Hash)>,
	last_updated: u64,
}

// Observations collected under the writer lock, dispatched after release.
enum Event {
	Accepted(Box<PoolBlock>),
	Rejected(Hash, ErrorKind),
	Missing(Vec<Hash>),
	TipChanged(Hash, u64),
	MainFound(Hash, Hash, Vec<MinerShare>),
}

/// Facade to the sidechain: the block DAG, tip, the validation pipeline
/// and all the bookkeeping hanging off tip changes. Owns its downstream
/// components; everything upstream hears about state through the adapter.
pub struct SideChain {
	params: ChainParams,
	consensus_id: Hash,
	adapter: Arc<dyn SideChainAdapter>,
	stop_state: Arc<StopState>,

	inner: RwLock<ChainInner>,
	// separate lock so the stratum path reads the difficulty without
	// touching the DAG lock
	cur_difficulty: RwLock<Difficulty>,
	seen_blocks: SeenBlocks,
	seen_wallets: SeenWallets,
	precalc: PrecalcPool,
	// writer lock acquisitions, observable in tests and stats; duplicates
	// must be dropped without bumping this
	write_lock_count: AtomicU64,
}

impl SideChain {
	/// Builds the sidechain for the given pool configuration.
	pub fn new(
		config: &PoolConfig,
		adapter: Arc<dyn SideChainAdapter>,
		stop_state: Arc<StopState>,
	) -> Result<SideChain, Error> {
		config
			.validate()
			.map_err(|e| Error::from(ErrorKind::Other(format!("bad config: {}", e))))?;
		let params = ChainParams::from_config(config);
		let consensus_id = derive_consensus_id(&params)?;

		let window_span = params.chain_window_size * params.target_block_time;
		let seen_capacity = (params.chain_window_size * SEEN_BLOCKS_OVERSCAN) as usize;

		info!(
			"sidechain initialized: pool \"{}\" on {}, consensus id {}",
			params.pool_name, params.network_type, consensus_id
		);

		Ok(SideChain {
			consensus_id,
			adapter,
			stop_state: stop_state.clone(),
			inner: RwLock::new(ChainInner {
				store: BlockDagStore::new(),
				tip: None,
				pending: PendingPool::new(),
				main_anchors: HashMap::new(),
				watch_block: None,
				last_updated: 0,
			}),
			cur_difficulty: RwLock::new(params.min_difficulty),
			seen_blocks: SeenBlocks::new(seen_capacity, window_span * SEEN_BLOCKS_OVERSCAN),
			seen_wallets: SeenWallets::new(window_span),
			precalc: PrecalcPool::new(stop_state),
			write_lock_count: AtomicU64::new(0),
			params,
		})
	}

	/// The consensus id of this pool. Never transmitted; it salts every
	/// block id, silently partitioning incompatible peers.
	pub fn consensus_id(&self) -> Hash {
		self.consensus_id
	}

	/// A block received from the network. Deduplicated against the seen
	/// set before the writer lock is even considered.
	pub fn add_external_block(&self, block: PoolBlock) -> BlockAddResult {
		if self.stop_state.is_stopped() {
			let id = block.id;
			self.adapter.block_rejected(id, &ErrorKind::Shutdown);
			return BlockAddResult::Rejected(ErrorKind::Shutdown);
		}
		if !self.seen_blocks.check_and_mark(block.full_id(), self.now()) {
			return BlockAddResult::Duplicate;
		}
		self.process_block(block, Options::NONE)
	}

	/// A locally mined block. Same path as external ones, minus the PoW
	/// recomputation: the mining path already checked the hash.
	pub fn add_block(&self, block: PoolBlock) -> BlockAddResult {
		if self.stop_state.is_stopped() {
			let id = block.id;
			self.adapter.block_rejected(id, &ErrorKind::Shutdown);
			return BlockAddResult::Rejected(ErrorKind::Shutdown);
		}
		// mark it so our own gossip echo reads as a duplicate
		self.seen_blocks.check_and_mark(block.full_id(), self.now());
		self.process_block(block, Options::SKIP_POW)
	}

	/// Forgets a block's seen mark so a retry isn't dropped as an echo.
	pub fn unsee_block(&self, block: &PoolBlock) {
		self.seen_blocks.unmark(&block.full_id());
	}

	fn process_block(&self, block: PoolBlock, opts: Options) -> BlockAddResult {
		let mut events = vec![];
		let result = {
			let mut inner = self.inner.write();
			self.write_lock_count.fetch_add(1, Ordering::Relaxed);
			self.process_block_locked(&mut inner, block, opts, &mut events)
		};
		self.dispatch(events);
		result
	}

	fn process_block_locked(
		&self,
		inner: &mut ChainInner,
		block: PoolBlock,
		opts: Options,
		events: &mut Vec<Event>,
	) -> BlockAddResult {
		if inner.store.contains(&block.id) {
			return BlockAddResult::Duplicate;
		}
		let now = self.now();
		let res = {
			let ctx = BlockContext {
				opts,
				store: &inner.store,
				params: &self.params,
				consensus_id: self.consensus_id,
				main_anchors: &inner.main_anchors,
				seen_wallets: &self.seen_wallets,
				now,
			};
			pipe::process_block(&block, &ctx)
		};

		match res {
			Ok(()) => {}
			Err(e) => match e.kind() {
				ErrorKind::MissingParent => {
					let missing = pipe::missing_ancestors(&block, &inner.store);
					debug!(
						"process_block: {} at height {} parked, {} ancestors missing, {} pending",
						block.id,
						block.height,
						missing.len(),
						inner.pending.len() + 1,
					);
					inner.pending.add(block, opts, now);
					events.push(Event::Missing(missing.clone()));
					return BlockAddResult::MissingParent(missing);
				}
				kind => {
					info!(
						"rejected block {} at height {}: {}",
						block.id, block.height, e
					);
					events.push(Event::Rejected(block.id, kind.clone()));
					return BlockAddResult::Rejected(kind);
				}
			},
		}

		let id = block.id;
		let mut block = block;
		block.verified = true;
		block.invalid = false;
		if let Some(tip_id) = inner.tip {
			if let Some(tip) = inner.store.find(&tip_id) {
				block.depth = tip.height.saturating_sub(block.height);
			}
		}

		let accepted = block.clone();
		match inner.store.insert(block) {
			Ok(InsertResult::Inserted) => {}
			Ok(InsertResult::AlreadyPresent) => return BlockAddResult::Duplicate,
			Err(e) => {
				let kind = e.kind();
				error!("store refused block {}: {}", id, e);
				events.push(Event::Rejected(id, kind.clone()));
				return BlockAddResult::Rejected(kind);
			}
		}
		debug!(
			"process_block: accepted {} at height {}, {} blocks total",
			id,
			accepted.height,
			inner.store.len()
		);
		events.push(Event::Accepted(Box::new(accepted)));

		self.update_chain_tip(inner, &id, events);
		self.check_watched(inner, &id, events);

		// parked blocks may be connectable now, recursively
		let ready = inner.pending.take_ready(&inner.store);
		for (child, child_opts) in ready {
			let _ = self.process_block_locked(inner, child, child_opts, events);
		}

		BlockAddResult::Accepted
	}

	fn update_chain_tip(&self, inner: &mut ChainInner, id: &Hash, events: &mut Vec<Event>) {
		let prune_depth = consensus::prune_depth(self.params.chain_window_size);

		let decision = {
			let block = match inner.store.find(id) {
				Some(b) => b,
				None => return,
			};
			match inner.tip {
				None => Some(0),
				Some(tip_id) if tip_id == *id => None,
				Some(tip_id) => {
					let tip = match inner.store.find(&tip_id) {
						Some(t) => t,
						None => return,
					};
					if block.parent_id == tip_id {
						Some(0)
					} else {
						let (longer, alternative) =
							selector::is_longer_chain(&inner.store, tip, block, prune_depth);
						let tie = block.cumulative_difficulty == tip.cumulative_difficulty
							&& selector::wins_tie(block, tip);
						if longer || (alternative && tie) {
							let depth = selector::reorg_depth(&inner.store, tip, block);
							if alternative && depth > 0 {
								info!(
									"REORGANIZE: switching to {} at height {}, abandoning {} blocks",
									block.id, block.height, depth
								);
							}
							Some(depth)
						} else {
							None
						}
					}
				}
			}
		};

		match decision {
			Some(reorg_depth) => {
				inner.tip = Some(*id);
				inner.last_updated = self.now();
				selector::set_best_chain_depths(&mut inner.store, id, prune_depth);
				let pruned = inner.store.prune(id, prune_depth, self.params.chain_window_size);
				if pruned > 0 {
					debug!("pruned {} old blocks, {} left", pruned, inner.store.len());
				}

				if let Some(tip_block) = inner.store.find(id) {
					match window::get_difficulty(tip_block, &inner.store, &self.params) {
						Ok(next) => {
							*self.cur_difficulty.write() = next;
						}
						Err(e) => warn!("could not retarget difficulty at {}: {}", id, e),
					}
					match window::get_wallets(tip_block, &inner.store, &self.params) {
						Ok(wallets) => {
							let tx_sec = SecretScalar::from_entropy(&[
								self.consensus_id.as_ref(),
								id.as_ref(),
								b"precalc",
							]);
							self.precalc.submit(wallets, tx_sec);
						}
						Err(e) => warn!("could not collect wallets at {}: {}", id, e),
					}
				}
				events.push(Event::TipChanged(*id, reorg_depth));
			}
			None => {
				// not the best chain; keep the depth bookkeeping fresh so
				// pruning can reason about this branch
				selector::update_depths(&mut inner.store, id);
			}
		}
	}

	// Reports a watched main-chain block once its sidechain counterpart is
	// in, and logs any fresh block whose PoW also clears the main target.
	fn check_watched(&self, inner: &mut ChainInner, id: &Hash, events: &mut Vec<Event>) {
		if let Some((data, watch_id)) = inner.watch_block.clone() {
			if watch_id == *id {
				if let Some(block) = inner.store.find(id) {
					match window::get_shares(block, &inner.store, &self.params) {
						Ok(shares) => {
							info!(
								"main chain block {} at height {} found by sidechain block {}",
								data.id, data.height, id
							);
							events.push(Event::MainFound(data.id, *id, shares));
							inner.watch_block = None;
						}
						Err(e) => warn!("shares for found block {}: {}", id, e),
					}
				}
			}
		}

		if let Some(block) = inner.store.find(id) {
			if let Some(anchor) = inner.main_anchors.get(&block.main_prev_id) {
				if anchor.difficulty.check_pow(&block.pow_hash) {
					info!(
						"block {} clears the main chain difficulty {} as well",
						id, anchor.difficulty
					);
				}
			}
		}
	}

	/// Ingests a main-chain block reported by the node client: it becomes
	/// an acceptable anchor and may resolve a watched block.
	pub fn add_main_chain_block(&self, data: ChainMain) {
		let mut events = vec![];
		{
			let mut inner = self.inner.write();
			self.write_lock_count.fetch_add(1, Ordering::Relaxed);
			inner.main_anchors.insert(data.id, data);
			if inner.main_anchors.len() > consensus::MAIN_CHAIN_WINDOW {
				let keep_from = data.height.saturating_sub(consensus::MAIN_CHAIN_WINDOW as u64);
				inner.main_anchors.retain(|_, a| a.height >= keep_from);
			}

			// a watched block may have verified before its main-chain data
			// reached us
			if let Some((watch_data, watch_id)) = inner.watch_block.clone() {
				if watch_data.id == data.id && inner.store.contains(&watch_id) {
					self.check_watched(&mut inner, &watch_id, &mut events);
				}
			}
		}
		self.dispatch(events);
	}

	/// Remembers a main-chain block that may have been solved by the given
	/// sidechain block; once that block appears and verifies, a block
	/// found event goes out.
	pub fn watch_mainchain_block(&self, data: ChainMain, possible_id: Hash) {
		let mut events = vec![];
		{
			let mut inner = self.inner.write();
			self.write_lock_count.fetch_add(1, Ordering::Relaxed);
			inner.watch_block = Some((data, possible_id));
			if inner.store.contains(&possible_id) {
				self.check_watched(&mut inner, &possible_id, &mut events);
			}
		}
		self.dispatch(events);
	}

	/// Fills the sidechain fields of a candidate block for the block
	/// builder: linkage, uncles, difficulties and timestamp, and hands
	/// back the share set its coinbase must be built from. The builder
	/// still sets the outputs (it knows the actual reward), then the nonces
	/// and the final id.
	pub fn fill_sidechain_data(
		&self,
		block: &mut PoolBlock,
		wallet: &Wallet,
		tx_key_sec: SecretScalar,
	) -> Result<Vec<MinerShare>, Error> {
		if self.stop_state.is_stopped() {
			return Err(ErrorKind::Shutdown.into());
		}
		let inner = self.inner.read();

		block.miner_wallet = *wallet;
		block.tx_key_sec = tx_key_sec;

		match inner.tip {
			None => {
				block.parent_id = ZERO_HASH;
				block.uncle_ids = vec![];
				block.height = 0;
				block.timestamp = self.now();
				block.declared_difficulty = self.params.min_difficulty;
				block.cumulative_difficulty = self.params.min_difficulty;
			}
			Some(tip_id) => {
				let tip = inner.store.find(&tip_id).ok_or_else(|| {
					Error::from(ErrorKind::StoreErr("tip not in store".to_owned()))
				})?;
				block.parent_id = tip_id;
				block.height = tip.height + 1;
				block.uncle_ids = eligible_uncles(&inner.store, tip, block.height);
				block.timestamp = max(
					self.now(),
					pipe::median_of_parent_chain(tip, &inner.store),
				);
				block.declared_difficulty = *self.cur_difficulty.read();
				let mut cum = tip.cumulative_difficulty + block.declared_difficulty;
				for uncle_id in &block.uncle_ids {
					if let Some(uncle) = inner.store.find(uncle_id) {
						cum += uncle.declared_difficulty * (100 - self.params.uncle_penalty) / 100;
					}
				}
				block.cumulative_difficulty = cum;
			}
		}

		window::get_shares(&*block, &inner.store, &self.params)
	}

	/// Serialized form of a stored block, for gossip replies.
	pub fn get_block_blob(&self, id: &Hash) -> Option<Vec<u8>> {
		let inner = self.inner.read();
		let block = inner.store.find(id)?;
		match ser::ser_vec(block) {
			Ok(blob) => Some(blob),
			Err(e) => {
				error!("serializing block {}: {}", id, e);
				None
			}
		}
	}

	/// A stored block by id, cloned out of the DAG.
	pub fn find_block(&self, id: &Hash) -> Option<PoolBlock> {
		self.inner.read().store.find(id).cloned()
	}

	/// Ancestors still missing for the blocks parked in the pending pool.
	pub fn get_missing_blocks(&self) -> Vec<Hash> {
		let inner = self.inner.read();
		inner.pending.missing_ancestors(&inner.store)
	}

	/// The current chain tip, if any block ever verified.
	pub fn chain_tip(&self) -> Option<Tip> {
		let inner = self.inner.read();
		let tip_id = inner.tip?;
		inner.store.find(&tip_id).map(Tip::from_block)
	}

	/// The difficulty the next sidechain block must meet.
	pub fn difficulty(&self) -> Difficulty {
		*self.cur_difficulty.read()
	}

	/// Cumulative difficulty of the best chain, a proxy for the total
	/// hashes the pool ground through.
	pub fn total_hashes(&self) -> Difficulty {
		self.chain_tip()
			.map(|t| t.cumulative_difficulty)
			.unwrap_or_else(Difficulty::zero)
	}

	/// Number of distinct miners in the current window.
	pub fn miner_count(&self) -> usize {
		let inner = self.inner.read();
		match self.tip_shares(&inner) {
			Some(shares) => shares.len(),
			None => 0,
		}
	}

	/// This wallet's fraction of the current window, in [0, 1].
	pub fn get_reward_share(&self, wallet: &Wallet) -> f64 {
		let inner = self.inner.read();
		let shares = match self.tip_shares(&inner) {
			Some(shares) => shares,
			None => return 0.0,
		};
		let total: u128 = shares
			.iter()
			.fold(0u128, |acc, s| acc.saturating_add(s.weight.to_num()));
		if total == 0 {
			return 0.0;
		}
		let mine = shares
			.iter()
			.find(|s| s.wallet == *wallet)
			.map(|s| s.weight.to_num())
			.unwrap_or(0);
		mine as f64 / total as f64
	}

	fn tip_shares(&self, inner: &ChainInner) -> Option<Vec<MinerShare>> {
		let tip_id = inner.tip?;
		let tip = inner.store.find(&tip_id)?;
		match window::get_shares(tip, &inner.store, &self.params) {
			Ok(shares) => Some(shares),
			Err(e) => {
				warn!("shares at tip {}: {}", tip_id, e);
				None
			}
		}
	}

	/// When the tip last moved, unix seconds. Zero before the first block.
	pub fn last_updated(&self) -> u64 {
		self.inner.read().last_updated
	}

	/// The highest main-chain block we currently hold as an anchor.
	pub fn latest_main_anchor(&self) -> Option<ChainMain> {
		let inner = self.inner.read();
		inner
			.main_anchors
			.values()
			.max_by_key(|a| a.height)
			.cloned()
	}

	/// Whether the precalc queue has drained.
	pub fn precalc_finished(&self) -> bool {
		self.precalc.finished()
	}

	/// The precalc pool, for the block builder's key lookups.
	pub fn precalc(&self) -> &PrecalcPool {
		&self.precalc
	}

	/// Number of blocks currently in the DAG.
	pub fn block_count(&self) -> usize {
		self.inner.read().store.len()
	}

	/// Number of blocks parked for missing ancestors.
	pub fn pending_count(&self) -> usize {
		self.inner.read().pending.len()
	}

	/// How often the writer lock was taken. Duplicates must not bump this.
	pub fn write_lock_count(&self) -> u64 {
		self.write_lock_count.load(Ordering::Relaxed)
	}

	/// The network this pool runs on.
	pub fn network_type(&self) -> p2pool_core::NetworkType {
		self.params.network_type
	}

	/// PPLNS window size, blocks.
	pub fn chain_window_size(&self) -> u64 {
		self.params.chain_window_size
	}

	/// Target block interval, seconds.
	pub fn block_time(&self) -> u64 {
		self.params.target_block_time
	}

	/// Logs a status summary, the way operators like to see it.
	pub fn print_status(&self) {
		let inner = self.inner.read();
		let (height, cum) = match inner.tip.and_then(|id| inner.store.find(&id)) {
			Some(tip) => (tip.height as i64, tip.cumulative_difficulty),
			None => (-1, Difficulty::zero()),
		};
		let miners = self.tip_shares(&inner).map(|s| s.len()).unwrap_or(0);
		info!(
			"sidechain status: height {}, difficulty {}, cumulative {}, {} blocks, {} pending, {} miners",
			height,
			*self.cur_difficulty.read(),
			cum,
			inner.store.len(),
			inner.pending.len(),
			miners
		);
	}

	/// Stops accepting blocks and joins the precalc workers. In-flight
	/// validations finish first; later submissions get `Shutdown`.
	pub fn shutdown(&self) {
		self.stop_state.stop();
		self.precalc.shutdown();
	}

	fn now(&self) -> u64 {
		Utc::now().timestamp() as u64
	}

	fn dispatch(&self, events: Vec<Event>) {
		for event in events {
			match event {
				Event::Accepted(block) => self.adapter.block_accepted(&block),
				Event::Rejected(id, kind) => self.adapter.block_rejected(id, &kind),
				Event::Missing(ids) => self.adapter.missing_parents(&ids),
				Event::TipChanged(id, reorg_depth) => self.adapter.tip_changed(id, reorg_depth),
				Event::MainFound(main_id, side_id, shares) => {
					self.adapter.main_block_found(main_id, side_id, &shares)
				}
			}
		}
	}
}

// Uncle candidates for a new block at `height` on top of `tip`: verified
// blocks within the uncle depth that branch off our chain but aren't on
// it, and weren't credited by the recent ancestry already.
fn eligible_uncles(store: &BlockDagStore, tip: &PoolBlock, height: u64) -> Vec<Hash> {
	let mut credited: HashSet<Hash> = HashSet::new();
	let mut ancestors: HashSet<Hash> = HashSet::new();
	let mut cur = tip;
	for _ in 0..consensus::UNCLE_BLOCK_DEPTH {
		ancestors.insert(cur.id);
		for uncle_id in &cur.uncle_ids {
			credited.insert(*uncle_id);
		}
		match store.parent_of(cur) {
			Some(p) => cur = p,
			None => break,
		}
	}

	let mut uncles = vec![];
	for h in height.saturating_sub(consensus::UNCLE_BLOCK_DEPTH)..height {
		for candidate in store.at_height(h) {
			if !candidate.verified || candidate.invalid {
				continue;
			}
			if ancestors.contains(&candidate.id) || credited.contains(&candidate.id) {
				continue;
			}
			if !selector::is_ancestor(store, &candidate.parent_id, tip) {
				continue;
			}
			uncles.push(candidate.id);
		}
	}
	uncles.sort();
	uncles
}

// The consensus id: a hash over every consensus parameter plus the pool's
// name and password. Variable-length fields go in length-prefixed so no
// two configurations can collide.
fn derive_consensus_id(params: &ChainParams) -> Result<Hash, Error> {
	let mut hasher = HashWriter::default();
	let write = |hasher: &mut HashWriter| -> Result<(), ser::Error> {
		hasher.write_bytes(params.network_type.name().as_bytes())?;
		hasher.write_bytes(params.pool_name.as_bytes())?;
		hasher.write_bytes(params.pool_password.as_bytes())?;
		hasher.write_u64(params.target_block_time)?;
		params.min_difficulty.write(hasher)?;
		hasher.write_u64(params.chain_window_size)?;
		hasher.write_u64(params.uncle_penalty)?;
		Ok(())
	};
	write(&mut hasher).map_err(Error::from)?;
	Ok(hasher.into_hash())
}

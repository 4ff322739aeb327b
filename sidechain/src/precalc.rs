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

//! Precomputation of one-time coinbase output keys. Every tip change
//! submits the wallets of the next expected share set; a small worker
//! group computes the scalar multiplications off the hot path so the block
//! builder can assemble a coinbase without stalling. Jobs for superseded
//! tips are dropped when dequeued, and a missing cache entry is simply
//! recomputed inline by whoever asks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};

use p2pool_core::core::{
	derive_output_key, output_cache_key, Hash, PublicKey, SecretScalar, Wallet,
};
use p2pool_util::{Condvar, Mutex, RwLock, StopState};

/// Worker group size cap; beyond this the scalar mults just fight over
/// memory bandwidth.
const MAX_PRECALC_WORKERS: usize = 8;

/// Queue depth. Jobs are whole tip updates, a handful is plenty.
const PRECALC_QUEUE_DEPTH: usize = 4;

struct PrecalcJob {
	generation: u64,
	tx_sec: SecretScalar,
	wallets: Vec<Wallet>,
}

struct PrecalcShared {
	cache: RwLock<HashMap<Hash, PublicKey>>,
	generation: AtomicU64,
	inflight: AtomicUsize,
	finished: Mutex<bool>,
	finished_cond: Condvar,
}

impl PrecalcShared {
	fn mark_done(&self) {
		if self.inflight.fetch_sub(1, Ordering::SeqCst) == 1 {
			let mut finished = self.finished.lock();
			*finished = true;
			self.finished_cond.notify_all();
		}
	}
}

/// The precalc worker pool.
pub struct PrecalcPool {
	shared: Arc<PrecalcShared>,
	sender: Mutex<Option<Sender<PrecalcJob>>>,
	workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl PrecalcPool {
	/// Spawns the worker group, one worker per core up to a small cap.
	pub fn new(stop_state: Arc<StopState>) -> PrecalcPool {
		let (tx, rx) = bounded(PRECALC_QUEUE_DEPTH);
		let shared = Arc::new(PrecalcShared {
			cache: RwLock::new(HashMap::new()),
			generation: AtomicU64::new(0),
			inflight: AtomicUsize::new(0),
			finished: Mutex::new(true),
			finished_cond: Condvar::new(),
		});

		let worker_count = num_cpus::get().min(MAX_PRECALC_WORKERS).max(1);
		let mut workers = Vec::with_capacity(worker_count);
		for i in 0..worker_count {
			let rx: Receiver<PrecalcJob> = rx.clone();
			let shared = shared.clone();
			let stop_state = stop_state.clone();
			let builder = thread::Builder::new().name(format!("precalc_{}", i));
			match builder.spawn(move || worker_loop(rx, shared, stop_state)) {
				Ok(handle) => workers.push(handle),
				Err(e) => error!("precalc: failed to spawn worker {}: {}", i, e),
			}
		}

		PrecalcPool {
			shared,
			sender: Mutex::new(Some(tx)),
			workers: Mutex::new(workers),
		}
	}

	/// Submits the wallet set of a new tip. Bumps the generation so any
	/// queued work for older tips gets dropped when dequeued.
	pub fn submit(&self, wallets: Vec<Wallet>, tx_sec: SecretScalar) {
		let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

		// keep the cache bounded by the live wallet set
		{
			let cache_len = self.shared.cache.read().len();
			if cache_len > wallets.len() * 4 + 1024 {
				debug!("precalc: clearing {} cached output keys", cache_len);
				self.shared.cache.write().clear();
			}
		}

		// count the job before flipping the flag so a concurrent completion
		// can't mark the queue drained under us
		self.shared.inflight.fetch_add(1, Ordering::SeqCst);
		{
			let mut finished = self.shared.finished.lock();
			*finished = false;
		}

		let job = PrecalcJob {
			generation,
			tx_sec,
			wallets,
		};
		let sender = self.sender.lock();
		let sent = match sender.as_ref() {
			Some(tx) => tx.try_send(job).is_ok(),
			None => false,
		};
		if !sent {
			// queue full or shutting down; the work was superseded anyway
			debug!("precalc: dropping job for generation {}", generation);
			self.shared.mark_done();
		}
	}

	/// Whether the queue has drained. The block builder only waits on this
	/// if it races ahead of the workers.
	pub fn finished(&self) -> bool {
		*self.shared.finished.lock()
	}

	/// Blocks until the queue drains.
	pub fn wait_finished(&self) {
		let mut finished = self.shared.finished.lock();
		while !*finished {
			self.shared.finished_cond.wait(&mut finished);
		}
	}

	/// A precomputed output key, if the workers got to it.
	pub fn lookup(&self, wallet: &Wallet, tx_sec: &SecretScalar, index: u64) -> Option<PublicKey> {
		let key = output_cache_key(&wallet.view_pub, &wallet.spend_pub, tx_sec, index);
		self.shared.cache.read().get(&key).cloned()
	}

	/// The output key, from the cache or recomputed inline. `None` only
	/// for a wallet whose keys don't decompress.
	pub fn lookup_or_compute(
		&self,
		wallet: &Wallet,
		tx_sec: &SecretScalar,
		index: u64,
	) -> Option<PublicKey> {
		if let Some(key) = self.lookup(wallet, tx_sec, index) {
			return Some(key);
		}
		let derived = derive_output_key(&wallet.view_pub, &wallet.spend_pub, tx_sec, index)?;
		let key = output_cache_key(&wallet.view_pub, &wallet.spend_pub, tx_sec, index);
		self.shared.cache.write().insert(key, derived);
		Some(derived)
	}

	/// Closes the queue and joins the workers. Each worker finishes its
	/// current job and exits.
	pub fn shutdown(&self) {
		{
			let mut sender = self.sender.lock();
			*sender = None;
		}
		let mut workers = self.workers.lock();
		for handle in workers.drain(..) {
			if let Err(e) = handle.join() {
				error!("precalc: worker panicked: {:?}", e);
			}
		}
		// anything still marked in flight was dropped with its worker
		self.shared.inflight.store(0, Ordering::SeqCst);
		let mut finished = self.shared.finished.lock();
		*finished = true;
		self.shared.finished_cond.notify_all();
	}
}

fn worker_loop(rx: Receiver<PrecalcJob>, shared: Arc<PrecalcShared>, stop_state: Arc<StopState>) {
	while let Ok(job) = rx.recv() {
		if job.generation < shared.generation.load(Ordering::SeqCst) {
			// a newer tip came in while this job sat in the queue
			shared.mark_done();
			continue;
		}

		for (index, wallet) in job.wallets.iter().enumerate() {
			// re-check supersession now and then mid-job
			if index % 16 == 0 && job.generation < shared.generation.load(Ordering::SeqCst) {
				break;
			}
			let key = output_cache_key(&wallet.view_pub, &wallet.spend_pub, &job.tx_sec, index as u64);
			if shared.cache.read().contains_key(&key) {
				continue;
			}
			match derive_output_key(&wallet.view_pub, &wallet.spend_pub, &job.tx_sec, index as u64)
			{
				Some(derived) => {
					shared.cache.write().insert(key, derived);
				}
				None => {
					// never surfaces upstream, the block builder recomputes
					// (and re-fails) inline if it actually needs this one
					warn!("precalc: wallet {} does not decompress", wallet);
				}
			}
		}

		shared.mark_done();
		if stop_state.is_stopped() {
			break;
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn wallet(tag: u8) -> Wallet {
		Wallet::from_secrets(
			&SecretScalar::from_entropy(&[&[tag, 0]]),
			&SecretScalar::from_entropy(&[&[tag, 1]]),
		)
	}

	#[test]
	fn precalc_and_lookup() {
		let stop = Arc::new(StopState::new());
		let pool = PrecalcPool::new(stop.clone());
		let tx_sec = SecretScalar::from_entropy(&[b"job"]);
		let wallets: Vec<Wallet> = (0..8).map(wallet).collect();

		pool.submit(wallets.clone(), tx_sec);
		pool.wait_finished();
		assert!(pool.finished());

		for (i, w) in wallets.iter().enumerate() {
			let cached = pool.lookup(w, &tx_sec, i as u64).expect("not precalced");
			let direct = derive_output_key(&w.view_pub, &w.spend_pub, &tx_sec, i as u64).unwrap();
			assert_eq!(cached, direct);
		}

		stop.stop();
		pool.shutdown();
	}

	#[test]
	fn inline_fallback_matches_workers() {
		let stop = Arc::new(StopState::new());
		let pool = PrecalcPool::new(stop.clone());
		let tx_sec = SecretScalar::from_entropy(&[b"inline"]);
		let w = wallet(42);

		// nothing submitted, the builder path computes inline
		let inline = pool.lookup_or_compute(&w, &tx_sec, 3).unwrap();
		assert_eq!(
			inline,
			derive_output_key(&w.view_pub, &w.spend_pub, &tx_sec, 3).unwrap()
		);
		// and it is cached now
		assert_eq!(pool.lookup(&w, &tx_sec, 3), Some(inline));

		stop.stop();
		pool.shutdown();
	}

	#[test]
	fn shutdown_joins_workers() {
		let stop = Arc::new(StopState::new());
		let pool = PrecalcPool::new(stop.clone());
		pool.submit(vec![wallet(1)], SecretScalar::from_entropy(&[b"x"]));
		stop.stop();
		pool.shutdown();
		assert!(pool.finished());
		// submits after shutdown are dropped, not queued
		pool.submit(vec![wallet(2)], SecretScalar::from_entropy(&[b"y"]));
		assert!(pool.finished());
	}
}

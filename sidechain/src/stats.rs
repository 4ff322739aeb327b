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

//! Advisory statistics dumps: periodic JSON documents under the configured
//! api directory, one subdirectory per category. Every write goes to a
//! unique temp name first and is renamed over the final name, so readers
//! only ever see complete documents. Dump failures are logged and skipped;
//! nothing here may ever reach back into the consensus path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde_json::{json, Value};

use p2pool_util::{Mutex, StopState};

use crate::chain::SideChain;

/// Which subdirectory a document lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsCategory {
	/// Main-chain facts
	Network,
	/// Pool-wide facts
	Pool,
	/// This node only
	Local,
}

impl StatsCategory {
	fn dir(&self) -> &'static str {
		match *self {
			StatsCategory::Network => "network",
			StatsCategory::Pool => "pool",
			StatsCategory::Local => "local",
		}
	}
}

struct DumpRequest {
	category: StatsCategory,
	filename: String,
	value: Value,
}

/// Hands JSON documents to a background writer thread.
pub struct StatsDumper {
	sender: Mutex<Option<Sender<DumpRequest>>>,
	handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl StatsDumper {
	/// Creates the category directories and starts the writer thread.
	pub fn new(api_path: &Path) -> io::Result<StatsDumper> {
		for category in &[
			StatsCategory::Network,
			StatsCategory::Pool,
			StatsCategory::Local,
		] {
			fs::create_dir_all(api_path.join(category.dir()))?;
		}

		let (tx, rx) = bounded(64);
		let root = api_path.to_path_buf();
		let handle = thread::Builder::new()
			.name("stats_dump".to_owned())
			.spawn(move || dump_loop(root, rx))?;

		Ok(StatsDumper {
			sender: Mutex::new(Some(tx)),
			handle: Mutex::new(Some(handle)),
		})
	}

	/// Queues a document. Dropped with a warning if the writer is behind;
	/// stats are advisory and the next period overwrites them anyway.
	pub fn dump(&self, category: StatsCategory, filename: &str, value: Value) {
		let sender = self.sender.lock();
		if let Some(tx) = sender.as_ref() {
			let req = DumpRequest {
				category,
				filename: filename.to_owned(),
				value,
			};
			match tx.try_send(req) {
				Ok(()) => {}
				Err(TrySendError::Full(req)) => {
					warn!("stats: writer behind, dropping {}", req.filename)
				}
				Err(TrySendError::Disconnected(_)) => {}
			}
		}
	}

	/// Closes the queue and joins the writer after it drains.
	pub fn shutdown(&self) {
		{
			let mut sender = self.sender.lock();
			*sender = None;
		}
		let handle = self.handle.lock().take();
		if let Some(handle) = handle {
			if let Err(e) = handle.join() {
				error!("stats: writer panicked: {:?}", e);
			}
		}
	}
}

impl Drop for StatsDumper {
	fn drop(&mut self) {
		self.shutdown();
	}
}

fn dump_loop(root: PathBuf, rx: Receiver<DumpRequest>) {
	let mut counter: u64 = 0;
	while let Ok(req) = rx.recv() {
		counter += 1;
		let final_path = root.join(req.category.dir()).join(&req.filename);
		let tmp_path = root
			.join(req.category.dir())
			.join(format!("{}.{}", req.filename, counter));
		if let Err(e) = write_atomic(&tmp_path, &final_path, &req.value) {
			warn!("stats: failed to write {:?}: {}", final_path, e);
			let _ = fs::remove_file(&tmp_path);
		}
	}
}

fn write_atomic(tmp_path: &Path, final_path: &Path, value: &Value) -> io::Result<()> {
	let body = serde_json::to_vec_pretty(value)?;
	fs::write(tmp_path, body)?;
	fs::rename(tmp_path, final_path)
}

/// Snapshots the sidechain's read surface into the three stats documents.
/// Called periodically from the stats loop, never from the consensus path.
pub fn dump_sidechain_stats(chain: &SideChain, dumper: &StatsDumper) {
	let tip = chain.chain_tip();
	let difficulty = chain.difficulty();
	let hashrate = difficulty.to_num() / chain.block_time() as u128;

	dumper.dump(
		StatsCategory::Pool,
		"stats",
		json!({
			"pool_statistics": {
				"hashRate": hashrate.to_string(),
				"miners": chain.miner_count(),
				"totalHashes": chain.total_hashes(),
				"sidechainHeight": tip.as_ref().map(|t| t.height).unwrap_or(0),
				"sidechainDifficulty": difficulty,
				"lastBlockFound": chain.last_updated(),
			}
		}),
	);

	if let Some(anchor) = chain.latest_main_anchor() {
		dumper.dump(
			StatsCategory::Network,
			"stats",
			json!({
				"difficulty": anchor.difficulty,
				"hash": anchor.id,
				"height": anchor.height,
				"reward": anchor.reward,
				"timestamp": anchor.timestamp,
			}),
		);
	}

	dumper.dump(
		StatsCategory::Local,
		"stats",
		json!({
			"blocks": chain.block_count(),
			"pending": chain.pending_count(),
			"precalcFinished": chain.precalc_finished(),
			"writeLocks": chain.write_lock_count(),
		}),
	);
}

/// Drives periodic stats dumps until stopped. The thread sleeps in short
/// steps so shutdown doesn't wait out a whole period.
pub fn start_stats_loop(
	chain: Arc<SideChain>,
	dumper: Arc<StatsDumper>,
	interval_secs: u64,
	stop_state: Arc<StopState>,
) -> io::Result<thread::JoinHandle<()>> {
	thread::Builder::new()
		.name("stats_loop".to_owned())
		.spawn(move || {
			let mut elapsed = interval_secs; // dump once right away
			while !stop_state.is_stopped() {
				if elapsed >= interval_secs {
					dump_sidechain_stats(&chain, &dumper);
					elapsed = 0;
				}
				thread::sleep(Duration::from_secs(1));
				elapsed += 1;
			}
		})
}

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

//! Public types for pool configuration

use failure::Fail;
use std::io;

use p2pool_core::consensus;
use p2pool_core::core::Difficulty;
use p2pool_core::NetworkType;
use p2pool_util::LoggingConfig;

/// Error type wrapping config errors.
#[derive(Debug, Fail)]
pub enum ConfigError {
	/// Error with parsing of config file
	#[fail(display = "Error parsing configuration file at {} - {}", _0, _1)]
	ParseError(String, String),

	/// Error with fileIO while reading config file
	#[fail(display = "Config file IO error: {}", _0)]
	FileIOError(String),

	/// No file found
	#[fail(display = "Configuration file not found: {}", _0)]
	FileNotFoundError(String),

	/// A consensus-relevant field is outside its allowed range
	#[fail(display = "Invalid configuration: {}", _0)]
	InvalidField(String),
}

impl From<io::Error> for ConfigError {
	fn from(error: io::Error) -> ConfigError {
		ConfigError::FileIOError(format!("{}", error))
	}
}

fn default_target_block_time() -> u64 {
	consensus::DEFAULT_TARGET_BLOCK_TIME
}

fn default_min_difficulty() -> Difficulty {
	Difficulty::from_num(consensus::DEFAULT_MIN_DIFFICULTY)
}

fn default_chain_window_size() -> u64 {
	consensus::DEFAULT_CHAIN_WINDOW_SIZE
}

fn default_uncle_penalty() -> u64 {
	consensus::DEFAULT_UNCLE_PENALTY
}

/// The pool configuration document. The consensus fields (everything but
/// `api_path` and `logging`) feed the consensus id: peers disagreeing on
/// any of them end up on mutually incompatible sidechains.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
	/// Human-readable pool name, mixed into the consensus id.
	pub pool_name: String,
	/// Pool password, mixed into the consensus id and never transmitted.
	/// A non-empty password makes the pool effectively private.
	#[serde(default)]
	pub pool_password: String,
	/// Which network the pool mines on.
	#[serde(default)]
	pub network_type: NetworkType,
	/// Sidechain block interval the retarget aims for, seconds.
	#[serde(default = "default_target_block_time")]
	pub target_block_time: u64,
	/// Minimum accepted share difficulty, decimal string.
	#[serde(default = "default_min_difficulty")]
	pub min_difficulty: Difficulty,
	/// Number of blocks in the PPLNS window.
	#[serde(default = "default_chain_window_size")]
	pub chain_window_size: u64,
	/// Percentage of an uncle's difficulty forfeited to the block that
	/// includes it.
	#[serde(default = "default_uncle_penalty")]
	pub uncle_penalty: u64,
	/// Where to dump the advisory stats documents, if anywhere.
	#[serde(default)]
	pub api_path: Option<String>,
	/// Logging setup.
	#[serde(default)]
	pub logging: LoggingConfig,
}

impl Default for PoolConfig {
	fn default() -> PoolConfig {
		PoolConfig {
			pool_name: "default".to_owned(),
			pool_password: String::new(),
			network_type: NetworkType::default(),
			target_block_time: default_target_block_time(),
			min_difficulty: default_min_difficulty(),
			chain_window_size: default_chain_window_size(),
			uncle_penalty: default_uncle_penalty(),
			api_path: None,
			logging: LoggingConfig::default(),
		}
	}
}

impl PoolConfig {
	/// Checks every consensus-relevant field against its allowed range.
	/// Ranges are part of consensus: a config outside them must fail to
	/// start rather than silently producing an incompatible peer.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.pool_name.is_empty() {
			return Err(ConfigError::InvalidField("pool_name is empty".to_owned()));
		}
		if self.pool_name.len() > 128 {
			return Err(ConfigError::InvalidField(
				"pool_name is longer than 128 bytes".to_owned(),
			));
		}
		if self.target_block_time < 1 || self.target_block_time > 60 {
			return Err(ConfigError::InvalidField(format!(
				"target_block_time {} outside [1, 60]",
				self.target_block_time
			)));
		}
		if self.chain_window_size < 60 || self.chain_window_size > 10_080 {
			return Err(ConfigError::InvalidField(format!(
				"chain_window_size {} outside [60, 10080]",
				self.chain_window_size
			)));
		}
		if self.uncle_penalty > 99 {
			return Err(ConfigError::InvalidField(format!(
				"uncle_penalty {} outside [0, 99]",
				self.uncle_penalty
			)));
		}
		if self.min_difficulty < Difficulty::one() {
			return Err(ConfigError::InvalidField(
				"min_difficulty must be at least 1".to_owned(),
			));
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn default_config_is_valid() {
		assert!(PoolConfig::default().validate().is_ok());
	}

	#[test]
	fn bad_ranges_rejected() {
		let mut c = PoolConfig::default();
		c.target_block_time = 0;
		assert!(c.validate().is_err());

		let mut c = PoolConfig::default();
		c.chain_window_size = 10;
		assert!(c.validate().is_err());

		let mut c = PoolConfig::default();
		c.uncle_penalty = 100;
		assert!(c.validate().is_err());

		let mut c = PoolConfig::default();
		c.pool_name = String::new();
		assert!(c.validate().is_err());

		let mut c = PoolConfig::default();
		c.min_difficulty = Difficulty::zero();
		assert!(c.validate().is_err());
	}
}

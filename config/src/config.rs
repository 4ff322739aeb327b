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

//! Configuration file loading

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::types::{ConfigError, PoolConfig};

/// Reads, parses and validates a pool configuration file.
pub fn read_config_file(path: &Path) -> Result<PoolConfig, ConfigError> {
	if !path.exists() {
		return Err(ConfigError::FileNotFoundError(
			path.to_string_lossy().into_owned(),
		));
	}
	let mut file = File::open(path)?;
	let mut contents = String::new();
	file.read_to_string(&mut contents)?;

	let config: PoolConfig = serde_json::from_str(&contents).map_err(|e| {
		ConfigError::ParseError(path.to_string_lossy().into_owned(), format!("{}", e))
	})?;
	config.validate()?;
	Ok(config)
}

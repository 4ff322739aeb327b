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

//! Shared configuration types: log output settings, and the zeroizing
//! string that secrets travel in.

use log::LevelFilter;
use zeroize::Zeroizing;

/// A string that wipes its backing memory when dropped. The pool password
/// lives in one of these so a heap dump taken after shutdown reveals
/// nothing.
pub type ZeroingString = Zeroizing<String>;

/// Verbosity of a single log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	/// Errors only
	Error,
	/// Errors and warnings
	Warning,
	/// Normal operational records
	Info,
	/// Everything a developer cares about
	Debug,
	/// Everything
	Trace,
}

impl LogLevel {
	/// The log filter this level maps onto.
	pub fn to_filter(self) -> LevelFilter {
		match self {
			LogLevel::Error => LevelFilter::Error,
			LogLevel::Warning => LevelFilter::Warn,
			LogLevel::Info => LevelFilter::Info,
			LogLevel::Debug => LevelFilter::Debug,
			LogLevel::Trace => LevelFilter::Trace,
		}
	}
}

fn default_stdout_level() -> Option<LogLevel> {
	Some(LogLevel::Warning)
}

fn default_file_level() -> Option<LogLevel> {
	Some(LogLevel::Info)
}

fn default_log_file_path() -> String {
	"p2pool.log".to_owned()
}

fn default_rotate_size() -> u64 {
	16 * 1024 * 1024
}

fn default_rotate_count() -> u32 {
	10
}

/// Log output configuration: a console destination and a size-rotated
/// file, each with its own verbosity. Leaving a level out switches that
/// destination off entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
	/// Verbosity printed to stdout, `None` keeps the console quiet
	#[serde(default = "default_stdout_level")]
	pub stdout_level: Option<LogLevel>,
	/// Verbosity written to the log file, `None` disables the file
	#[serde(default = "default_file_level")]
	pub file_level: Option<LogLevel>,
	/// Where the log file lives
	#[serde(default = "default_log_file_path")]
	pub log_file_path: String,
	/// Rotate the log file once it grows past this many bytes
	#[serde(default = "default_rotate_size")]
	pub rotate_size: u64,
	/// Rotated files kept around before the oldest is dropped
	#[serde(default = "default_rotate_count")]
	pub rotate_count: u32,
}

impl Default for LoggingConfig {
	fn default() -> LoggingConfig {
		LoggingConfig {
			stdout_level: default_stdout_level(),
			file_level: default_file_level(),
			log_file_path: default_log_file_path(),
			rotate_size: default_rotate_size(),
			rotate_count: default_rotate_count(),
		}
	}
}

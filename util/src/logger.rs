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

//! log4rs wiring shared by everything in the workspace. Output is scoped
//! to the pool's own crates through per-target loggers hanging off a
//! silent root, and initialization is one-shot so parallel tests can race
//! on it safely.

use std::sync::Once;
use std::{panic, thread};

use backtrace::Backtrace;
use log::{error, info, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::threshold::ThresholdFilter;

use crate::types::{LogLevel, LoggingConfig};

// Records from these targets (and their submodules) reach the appenders;
// everything else dies at the root.
const POOL_TARGETS: [&str; 4] = [
	"p2pool_config",
	"p2pool_core",
	"p2pool_sidechain",
	"p2pool_util",
];

// double initialization would make log4rs panic
static LOG_INIT: Once = Once::new();

fn record_format() -> PatternEncoder {
	PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l:<5})} {t} - {m}{n}")
}

/// Wires up log4rs according to the config. Every call after the first is
/// a no-op, so library consumers and tests can both call it freely.
pub fn init_logger(config: &LoggingConfig) {
	LOG_INIT.call_once(|| match assemble(config) {
		Ok(assembled) => {
			if log4rs::init_config(assembled).is_ok() {
				install_panic_hook(config.log_file_path.clone());
				info!(
					"logging started: stdout {:?}, file {:?}",
					config.stdout_level, config.file_level
				);
			}
		}
		// a pool without logs still mines; complain and carry on
		Err(e) => eprintln!("unable to set up logging: {}", e),
	});
}

/// Stdout-only debug logging for unit and integration tests.
pub fn init_test_logger() {
	let config = LoggingConfig {
		stdout_level: Some(LogLevel::Debug),
		file_level: None,
		..LoggingConfig::default()
	};
	init_logger(&config);
}

// Builds the full log4rs configuration: the requested appenders hang off
// a root that is itself silent, and a logger per pool crate opens the
// gate for our records only.
fn assemble(config: &LoggingConfig) -> Result<Config, String> {
	let mut appenders = vec![];
	let mut attached = vec![];

	if let Some(level) = config.stdout_level {
		let stdout = ConsoleAppender::builder()
			.encoder(Box::new(record_format()))
			.build();
		appenders.push(
			Appender::builder()
				.filter(Box::new(ThresholdFilter::new(level.to_filter())))
				.build("stdout", Box::new(stdout)),
		);
		attached.push("stdout");
	}

	if let Some(level) = config.file_level {
		let roller = FixedWindowRoller::builder()
			.build(
				&format!("{}.{{}}.gz", config.log_file_path),
				config.rotate_count,
			)
			.map_err(|e| format!("bad rotation pattern: {}", e))?;
		let policy = CompoundPolicy::new(
			Box::new(SizeTrigger::new(config.rotate_size)),
			Box::new(roller),
		);
		let file = RollingFileAppender::builder()
			.append(true)
			.encoder(Box::new(record_format()))
			.build(&config.log_file_path, Box::new(policy))
			.map_err(|e| format!("cannot open {}: {}", config.log_file_path, e))?;
		appenders.push(
			Appender::builder()
				.filter(Box::new(ThresholdFilter::new(level.to_filter())))
				.build("file", Box::new(file)),
		);
		attached.push("file");
	}

	// the loosest destination decides how much the pool loggers let through
	let verbosity = [config.stdout_level, config.file_level]
		.iter()
		.flatten()
		.map(|level| level.to_filter())
		.max()
		.unwrap_or(LevelFilter::Off);

	let mut root = Root::builder();
	for name in attached {
		root = root.appender(name);
	}

	let pool_loggers: Vec<Logger> = POOL_TARGETS
		.iter()
		.map(|target| Logger::builder().build(*target, verbosity))
		.collect();

	Config::builder()
		.appenders(appenders)
		.loggers(pool_loggers)
		.build(root.build(LevelFilter::Off))
		.map_err(|e| format!("broken logging config: {}", e))
}

// Panics land in the log as well as on stderr; the log line is usually
// the only trace left when a worker thread dies unattended.
fn install_panic_hook(log_file_path: String) {
	panic::set_hook(Box::new(move |info| {
		let thread = thread::current();
		let name = thread.name().unwrap_or("?");
		let message = match info.payload().downcast_ref::<&'static str>() {
			Some(s) => (*s).to_owned(),
			None => info
				.payload()
				.downcast_ref::<String>()
				.cloned()
				.unwrap_or_else(|| "<non-string panic>".to_owned()),
		};
		let location = info
			.location()
			.map(|l| format!("{}:{}", l.file(), l.line()))
			.unwrap_or_else(|| "<unknown>".to_owned());

		error!(
			"thread '{}' panicked at {}: {}\n{:?}",
			name,
			location,
			message,
			Backtrace::new()
		);
		eprintln!(
			"thread '{}' panicked at {}: {} (see {})",
			name, location, message, log_file_path
		);
	}));
}

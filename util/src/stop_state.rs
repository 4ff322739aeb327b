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

//! Stopped state shared between the coordinator and its worker threads.

use crate::Mutex;

/// Stopped state. Shutdown sets it once, everybody else only ever reads it.
pub struct StopState {
	stop_state: Mutex<bool>,
}

impl StopState {
	/// Create new stop state
	pub fn new() -> StopState {
		StopState {
			stop_state: Mutex::new(false),
		}
	}

	/// Check if we're stopped
	pub fn is_stopped(&self) -> bool {
		*self.stop_state.lock()
	}

	/// Stop the server
	pub fn stop(&self) {
		*self.stop_state.lock() = true;
	}
}

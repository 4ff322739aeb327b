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

//! The sidechain itself: validates and accepts new blocks, maintains the
//! pruned block DAG, selects among competing tips, accounts shares over
//! the PPLNS window and precomputes coinbase output keys. Network I/O,
//! the main-chain client and the stratum surface live outside and talk to
//! this crate through `SideChainAdapter` and the public operations on
//! `SideChain`.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

mod chain;
pub mod error;
pub mod pipe;
pub mod precalc;
pub mod seen;
pub mod selector;
pub mod stats;
pub mod store;
pub mod types;
pub mod window;

// Re-export the base interface
pub use crate::chain::SideChain;
pub use crate::error::{Error, ErrorKind};
pub use crate::types::{BlockAddResult, ChainParams, NoopAdapter, Options, SideChainAdapter, Tip};
pub use crate::window::MinerShare;

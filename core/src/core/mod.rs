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

//! Core types: hashes, difficulties, keys, wallets and sidechain blocks.

pub mod block;
pub mod difficulty;
pub mod hash;
pub mod keys;
pub mod wallet;

pub use self::block::{ChainMain, FullBlockId, PoolBlock, ShareEntry};
pub use self::difficulty::Difficulty;
pub use self::hash::{Hash, Hashed, ZERO_HASH};
pub use self::keys::{derive_output_key, output_cache_key, PublicKey, SecretScalar};
pub use self::wallet::Wallet;

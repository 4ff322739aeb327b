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

//! Error types for the sidechain

use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};

use p2pool_core::ser;

/// Error definition
#[derive(Debug)]
pub struct Error {
	inner: Context<ErrorKind>,
}

/// Sidechain error definitions. The kind a rejected block fails with is the
/// classification reported back to the peer-to-peer layer.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
	/// The block failed a structural check and can never become valid
	#[fail(display = "Malformed block: {}", _0)]
	Malformed(String),
	/// The block's parent (or one of its uncles) is not known yet. Not a
	/// rejection: the block is parked until the missing ancestors arrive.
	#[fail(display = "Missing parent")]
	MissingParent,
	/// Height doesn't follow the parent's
	#[fail(display = "Invalid block height")]
	BadHeight,
	/// Timestamp below the chain median or too far in the future
	#[fail(display = "Invalid block time")]
	BadTimestamp,
	/// The main-chain block this block anchors to is not one we know
	#[fail(display = "Unknown main chain anchor")]
	UnknownMainAnchor,
	/// One of the declared uncles breaks the uncle rules
	#[fail(display = "Invalid uncle: {}", _0)]
	BadUncle(String),
	/// Declared or cumulative difficulty disagrees with the window engine
	#[fail(display = "Invalid difficulty")]
	BadDifficulty,
	/// The proof of work doesn't meet the declared difficulty
	#[fail(display = "Invalid PoW")]
	BadPow,
	/// Declared coinbase outputs disagree with the recomputed reward split
	#[fail(display = "Invalid reward split")]
	BadRewardSplit,
	/// The same wallet appears twice in the declared outputs
	#[fail(display = "Duplicate wallet in outputs")]
	DuplicateWallet,
	/// The sidechain is shutting down, no new blocks are accepted
	#[fail(display = "Shutting down")]
	Shutdown,
	/// Internal inconsistency while looking up blocks in the store
	#[fail(display = "Store error: {}", _0)]
	StoreErr(String),
	/// Error serializing or deserializing a block
	#[fail(display = "Serialization error")]
	SerErr(ser::Error),
	/// Anything else
	#[fail(display = "Other error: {}", _0)]
	Other(String),
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		Display::fmt(&self.inner, f)
	}
}

impl Error {
	/// get kind
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}
	/// get cause
	pub fn cause(&self) -> Option<&dyn Fail> {
		self.inner.cause()
	}
	/// get backtrace
	pub fn backtrace(&self) -> Option<&Backtrace> {
		self.inner.backtrace()
	}

	/// Whether the error is due to a block that is intrinsically wrong, as
	/// opposed to one we simply can't judge yet. Useful for peer banning
	/// decisions.
	pub fn is_bad_data(&self) -> bool {
		// shorter to match on all the "not the block's fault" errors
		match self.kind() {
			ErrorKind::MissingParent
			| ErrorKind::Shutdown
			| ErrorKind::StoreErr(_)
			| ErrorKind::Other(_) => false,
			_ => true,
		}
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Error {
		Error {
			inner: Context::new(kind),
		}
	}
}

impl From<Context<ErrorKind>> for Error {
	fn from(inner: Context<ErrorKind>) -> Error {
		Error { inner }
	}
}

impl From<ser::Error> for Error {
	fn from(error: ser::Error) -> Error {
		let ec = error.clone();
		Error {
			inner: error.context(ErrorKind::SerErr(ec)),
		}
	}
}

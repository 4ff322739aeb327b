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

//! Miner wallets. A wallet is the pair of public keys coinbase outputs get
//! derived against; two wallets are the same miner exactly when both keys
//! match, and the byte ordering is the canonical tie-break everywhere
//! shares need a stable order.

use std::fmt;

use crate::core::keys::{PublicKey, SecretScalar};
use crate::ser::{self, Readable, Reader, Writeable, Writer};

/// A miner wallet, by value. Ordering is lexicographic on the raw key
/// bytes, spend key first.
#[derive(Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub struct Wallet {
	/// Public spend key, the base of every one-time output key.
	pub spend_pub: PublicKey,
	/// Public view key, what the transaction secret is multiplied against.
	pub view_pub: PublicKey,
}

impl Wallet {
	/// Builds a wallet from its two public keys.
	pub fn from_keys(spend_pub: PublicKey, view_pub: PublicKey) -> Wallet {
		Wallet {
			spend_pub,
			view_pub,
		}
	}

	/// Derives the wallet belonging to a pair of secret scalars. Mostly
	/// useful for local mining setups and tests.
	pub fn from_secrets(spend_sec: &SecretScalar, view_sec: &SecretScalar) -> Wallet {
		Wallet {
			spend_pub: PublicKey::from_secret(spend_sec),
			view_pub: PublicKey::from_secret(view_sec),
		}
	}

	/// Whether both keys decode to valid curve points.
	pub fn is_valid(&self) -> bool {
		self.spend_pub.is_valid() && self.view_pub.is_valid()
	}
}

impl fmt::Debug for Wallet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.spend_pub)
	}
}

impl fmt::Display for Wallet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl Writeable for Wallet {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.spend_pub.write(writer)?;
		self.view_pub.write(writer)
	}
}

impl Readable for Wallet {
	fn read(reader: &mut dyn Reader) -> Result<Wallet, ser::Error> {
		let spend_pub = PublicKey::read(reader)?;
		let view_pub = PublicKey::read(reader)?;
		Ok(Wallet {
			spend_pub,
			view_pub,
		})
	}
}

impl serde::Serialize for Wallet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		let mut bytes = self.spend_pub.as_bytes().to_vec();
		bytes.extend_from_slice(self.view_pub.as_bytes());
		serializer.serialize_str(&p2pool_util::to_hex(bytes))
	}
}

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

//! Scalars, public keys and the one-time output key derivation used to
//! build coinbase outputs. Coinbase destinations are stealth addresses:
//! each output key is derived from the recipient wallet, the transaction
//! secret and the output index, so the derivation must be bit-exact across
//! peers.

use blake2_rfc::blake2b::Blake2b;
use std::fmt;

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;

use crate::core::hash::Hash;
use crate::ser::{self, Readable, Reader, Writeable, Writer};
use p2pool_util as util;

/// A scalar on the edwards25519 curve. Used for transaction secrets; those
/// travel inside sidechain blocks, so the type reads and writes like any
/// other consensus field.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecretScalar(Scalar);

impl SecretScalar {
	/// Builds a scalar from 32 bytes, reducing mod the group order.
	pub fn from_bytes(bytes: [u8; 32]) -> SecretScalar {
		SecretScalar(Scalar::from_bytes_mod_order(bytes))
	}

	/// Derives a scalar from arbitrary entropy by wide reduction of a
	/// 64-byte blake2b digest. Deterministic, uniform enough for one-time
	/// transaction secrets.
	pub fn from_entropy(parts: &[&[u8]]) -> SecretScalar {
		let mut state = Blake2b::new(64);
		for part in parts {
			state.update(part);
		}
		let mut wide = [0u8; 64];
		wide.copy_from_slice(state.finalize().as_bytes());
		SecretScalar(Scalar::from_bytes_mod_order_wide(&wide))
	}

	/// The canonical 32-byte representation.
	pub fn to_bytes(&self) -> [u8; 32] {
		self.0.to_bytes()
	}
}

impl fmt::Debug for SecretScalar {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", &util::to_hex(self.to_bytes().to_vec())[..12])
	}
}

impl Writeable for SecretScalar {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.to_bytes())
	}
}

impl Readable for SecretScalar {
	fn read(reader: &mut dyn Reader) -> Result<SecretScalar, ser::Error> {
		let v = reader.read_fixed_bytes(32)?;
		let mut bytes = [0u8; 32];
		bytes.copy_from_slice(&v[..]);
		// only the canonical form is acceptable on the wire, anything else
		// would break re-serialization
		let s: Option<Scalar> = Scalar::from_canonical_bytes(bytes).into();
		match s {
			Some(s) => Ok(SecretScalar(s)),
			None => Err(ser::Error::CorruptedData),
		}
	}
}

/// A compressed edwards25519 point. Kept compressed; decompression happens
/// on use and can fail for garbage bytes.
#[derive(Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
	/// Public counterpart of the provided secret scalar.
	pub fn from_secret(sec: &SecretScalar) -> PublicKey {
		PublicKey(EdwardsPoint::mul_base(&sec.0).compress().to_bytes())
	}

	/// Builds a public key directly from its compressed form.
	pub fn from_bytes(bytes: [u8; 32]) -> PublicKey {
		PublicKey(bytes)
	}

	/// The compressed representation.
	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}

	/// Whether the compressed bytes decode to a valid curve point.
	pub fn is_valid(&self) -> bool {
		self.decompress().is_some()
	}

	fn decompress(&self) -> Option<EdwardsPoint> {
		CompressedEdwardsY(self.0).decompress()
	}
}

impl fmt::Debug for PublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", &util::to_hex(self.0.to_vec())[..12])
	}
}

impl fmt::Display for PublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl Writeable for PublicKey {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl Readable for PublicKey {
	fn read(reader: &mut dyn Reader) -> Result<PublicKey, ser::Error> {
		let v = reader.read_fixed_bytes(32)?;
		let mut bytes = [0u8; 32];
		bytes.copy_from_slice(&v[..]);
		Ok(PublicKey(bytes))
	}
}

/// Derives the one-time destination key for a coinbase output:
/// `P = Hs(r*V || index)*G + S` where `r` is the transaction secret, `V`
/// and `S` the recipient's view and spend keys. Returns `None` when either
/// recipient key fails to decompress.
pub fn derive_output_key(
	view_pub: &PublicKey,
	spend_pub: &PublicKey,
	tx_sec: &SecretScalar,
	output_index: u64,
) -> Option<PublicKey> {
	let view = view_pub.decompress()?;
	let spend = spend_pub.decompress()?;

	let shared = view * tx_sec.0;

	let mut state = Blake2b::new(64);
	state.update(shared.compress().as_bytes());
	state.update(&output_index.to_le_bytes());
	let mut wide = [0u8; 64];
	wide.copy_from_slice(state.finalize().as_bytes());
	let h = Scalar::from_bytes_mod_order_wide(&wide);

	let key = EdwardsPoint::mul_base(&h) + spend;
	Some(PublicKey(key.compress().to_bytes()))
}

/// Cache key under which a precomputed output key is stored:
/// `H(view || spend || tx_sec || index)`.
pub fn output_cache_key(
	view_pub: &PublicKey,
	spend_pub: &PublicKey,
	tx_sec: &SecretScalar,
	output_index: u64,
) -> Hash {
	let mut state = Blake2b::new(Hash::LEN);
	state.update(view_pub.as_bytes());
	state.update(spend_pub.as_bytes());
	state.update(&tx_sec.to_bytes());
	state.update(&output_index.to_le_bytes());
	Hash::from_vec(state.finalize().as_bytes())
}

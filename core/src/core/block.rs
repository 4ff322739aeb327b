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

//! Sidechain blocks and the main-chain data they anchor to.

use crate::core::difficulty::Difficulty;
use crate::core::hash::{Hash, HashWriter, ZERO_HASH};
use crate::core::keys::SecretScalar;
use crate::core::wallet::Wallet;
use crate::ser::{self, Readable, Reader, Writeable, Writer};

/// Upper bound on uncles a single block may credit, purely to bound reads.
/// The validator enforces the much tighter depth rules on top.
const MAX_UNCLES: u64 = 1_000;

/// Upper bound on declared coinbase outputs, bounding reads. Real blocks
/// carry at most one output per distinct wallet in the chain window.
const MAX_OUTPUT_SHARES: u64 = 20_000;

/// One declared coinbase output: this wallet gets this many atomic units.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ShareEntry {
	/// Receiving wallet
	pub wallet: Wallet,
	/// Reward in atomic units
	pub reward: u64,
}

impl Writeable for ShareEntry {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.wallet.write(writer)?;
		writer.write_u64(self.reward)
	}
}

impl Readable for ShareEntry {
	fn read(reader: &mut dyn Reader) -> Result<ShareEntry, ser::Error> {
		let wallet = Wallet::read(reader)?;
		let reward = reader.read_u64()?;
		Ok(ShareEntry { wallet, reward })
	}
}

/// The identity a peer gossips under: the sidechain id plus the mining
/// nonces. Two submissions of the same template with fresh nonces are
/// different events as far as deduplication goes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FullBlockId([u8; 40]);

impl FullBlockId {
	/// Assembles a full id from its parts.
	pub fn new(id: Hash, nonce: u32, extra_nonce: u32) -> FullBlockId {
		let mut bytes = [0u8; 40];
		bytes[..32].copy_from_slice(id.as_ref());
		bytes[32..36].copy_from_slice(&nonce.to_le_bytes());
		bytes[36..].copy_from_slice(&extra_nonce.to_le_bytes());
		FullBlockId(bytes)
	}
}

/// A block of the sidechain. Carries the share-accounting snapshot every
/// peer must agree on, the main-chain anchor, and the proof-of-work search
/// fields. The trailing fields are local bookkeeping and never serialized.
#[derive(Clone, Debug)]
pub struct PoolBlock {
	/// Hash of the predecessor on this block's branch, ZERO_HASH for the
	/// genesis block.
	pub parent_id: Hash,
	/// Sibling-of-ancestor blocks credited by this block.
	pub uncle_ids: Vec<Hash>,
	/// parent.height + 1, zero for genesis.
	pub height: u64,
	/// Main-chain height this block was built at.
	pub main_height: u64,
	/// Main-chain block this block commits to.
	pub main_prev_id: Hash,
	/// Whose share this block is.
	pub miner_wallet: Wallet,
	/// Ephemeral transaction secret for the coinbase this block proposes.
	pub tx_key_sec: SecretScalar,
	/// Miner-declared timestamp, seconds.
	pub timestamp: u64,
	/// The sidechain target this block claims to beat.
	pub declared_difficulty: Difficulty,
	/// declared + parent cumulative + discounted uncle credits.
	pub cumulative_difficulty: Difficulty,
	/// Declared coinbase split, must match the recomputed window shares.
	pub output_shares: Vec<ShareEntry>,
	/// Proof-of-work search field.
	pub nonce: u32,
	/// Second search field, bumped by the block template distributor.
	pub extra_nonce: u32,
	/// Proof-of-work hash of this block, computed once by the miner path.
	pub pow_hash: Hash,

	/// The sidechain id, a salted hash of the template fields. Declared on
	/// the wire and recomputed against our consensus id on acceptance.
	pub id: Hash,
	/// Distance from the current chain tip. Maintained under the writer
	/// lock by the chain selector, meaningless on the wire.
	pub depth: u64,
	/// Whether this block passed full validation.
	pub verified: bool,
	/// Whether this block is known bad (kept to poison descendants).
	pub invalid: bool,
	/// Local arrival sequence number, stamped by the store. Last-resort
	/// tie-break for chain selection.
	pub arrival_order: u64,
}

impl PoolBlock {
	/// Serializes the template fields, everything that identifies the
	/// block except the nonces and the pow hash.
	pub fn write_template<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.parent_id.write(writer)?;
		writer.write_u64(self.uncle_ids.len() as u64)?;
		for uncle in &self.uncle_ids {
			uncle.write(writer)?;
		}
		writer.write_u64(self.height)?;
		writer.write_u64(self.main_height)?;
		self.main_prev_id.write(writer)?;
		self.miner_wallet.write(writer)?;
		self.tx_key_sec.write(writer)?;
		writer.write_u64(self.timestamp)?;
		self.declared_difficulty.write(writer)?;
		self.cumulative_difficulty.write(writer)?;
		writer.write_u64(self.output_shares.len() as u64)?;
		for share in &self.output_shares {
			share.write(writer)?;
		}
		Ok(())
	}

	/// The sidechain id: a hash of the template fields salted with the
	/// pool's consensus id. Peers configured differently compute different
	/// ids for the same bytes and drop each other's blocks as malformed.
	pub fn compute_id(&self, consensus_id: &Hash) -> Hash {
		let mut hasher = HashWriter::default();
		self.write_template(&mut hasher)
			.expect("write to hasher cannot fail");
		consensus_id
			.write(&mut hasher)
			.expect("write to hasher cannot fail");
		hasher.into_hash()
	}

	/// The gossip identity: id plus both nonces.
	pub fn full_id(&self) -> FullBlockId {
		FullBlockId::new(self.id, self.nonce, self.extra_nonce)
	}

	/// Whether this is a genesis block (no parent).
	pub fn is_genesis(&self) -> bool {
		self.parent_id == ZERO_HASH && self.height == 0
	}
}

impl Writeable for PoolBlock {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.write_template(writer)?;
		self.id.write(writer)?;
		writer.write_u32(self.nonce)?;
		writer.write_u32(self.extra_nonce)?;
		self.pow_hash.write(writer)
	}
}

impl Readable for PoolBlock {
	fn read(reader: &mut dyn Reader) -> Result<PoolBlock, ser::Error> {
		let parent_id = Hash::read(reader)?;
		let uncle_count = reader.read_u64()?;
		if uncle_count > MAX_UNCLES {
			return Err(ser::Error::CountError(uncle_count));
		}
		let mut uncle_ids = Vec::with_capacity(uncle_count as usize);
		for _ in 0..uncle_count {
			uncle_ids.push(Hash::read(reader)?);
		}
		let height = reader.read_u64()?;
		let main_height = reader.read_u64()?;
		let main_prev_id = Hash::read(reader)?;
		let miner_wallet = Wallet::read(reader)?;
		let tx_key_sec = SecretScalar::read(reader)?;
		let timestamp = reader.read_u64()?;
		let declared_difficulty = Difficulty::read(reader)?;
		let cumulative_difficulty = Difficulty::read(reader)?;
		let share_count = reader.read_u64()?;
		if share_count > MAX_OUTPUT_SHARES {
			return Err(ser::Error::CountError(share_count));
		}
		let mut output_shares = Vec::with_capacity(share_count as usize);
		for _ in 0..share_count {
			output_shares.push(ShareEntry::read(reader)?);
		}
		let id = Hash::read(reader)?;
		let nonce = reader.read_u32()?;
		let extra_nonce = reader.read_u32()?;
		let pow_hash = Hash::read(reader)?;

		Ok(PoolBlock {
			parent_id,
			uncle_ids,
			height,
			main_height,
			main_prev_id,
			miner_wallet,
			tx_key_sec,
			timestamp,
			declared_difficulty,
			cumulative_difficulty,
			output_shares,
			nonce,
			extra_nonce,
			pow_hash,
			id,
			depth: 0,
			verified: false,
			invalid: false,
			arrival_order: 0,
		})
	}
}

/// A main-chain block as reported by the main-chain client. The sidechain
/// only keeps what anchoring and payout math need.
#[derive(Clone, Copy, Debug)]
pub struct ChainMain {
	/// Main-chain block id
	pub id: Hash,
	/// Main-chain height
	pub height: u64,
	/// Predecessor id
	pub prev_id: Hash,
	/// Main-chain difficulty at this block
	pub difficulty: Difficulty,
	/// Coinbase reward available at this height, atomic units
	pub reward: u64,
	/// Main-chain timestamp
	pub timestamp: u64,
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::ser;

	fn test_wallet(tag: u8) -> Wallet {
		Wallet::from_secrets(
			&SecretScalar::from_entropy(&[&[tag, 0]]),
			&SecretScalar::from_entropy(&[&[tag, 1]]),
		)
	}

	fn test_block() -> PoolBlock {
		let mut b = PoolBlock {
			parent_id: ZERO_HASH,
			uncle_ids: vec![],
			height: 0,
			main_height: 1000,
			main_prev_id: Hash::from_vec(&[9; 32]),
			miner_wallet: test_wallet(1),
			tx_key_sec: SecretScalar::from_entropy(&[b"txkey"]),
			timestamp: 1_600_000_000,
			declared_difficulty: Difficulty::from_num(1000),
			cumulative_difficulty: Difficulty::from_num(1000),
			output_shares: vec![ShareEntry {
				wallet: test_wallet(1),
				reward: 5000,
			}],
			nonce: 42,
			extra_nonce: 7,
			pow_hash: Hash::from_vec(&[1; 32]),
			id: ZERO_HASH,
			depth: 0,
			verified: false,
			invalid: false,
			arrival_order: 0,
		};
		b.id = b.compute_id(&ZERO_HASH);
		b
	}

	#[test]
	fn blob_round_trip() {
		let b = test_block();
		let blob = ser::ser_vec(&b).unwrap();
		let b2: PoolBlock = ser::deserialize(&mut &blob[..]).unwrap();
		assert_eq!(b2.id, b.id);
		assert_eq!(b2.full_id(), b.full_id());
		assert_eq!(ser::ser_vec(&b2).unwrap(), blob);
	}

	#[test]
	fn id_salted_by_consensus_id() {
		let b = test_block();
		let other = b.compute_id(&Hash::from_vec(&[1]));
		assert_ne!(b.id, other);
	}

	#[test]
	fn nonces_do_not_change_id() {
		let mut b = test_block();
		let id = b.compute_id(&ZERO_HASH);
		b.nonce = 123456;
		b.extra_nonce = 654321;
		assert_eq!(b.compute_id(&ZERO_HASH), id);
		// but they do change the gossip identity
		assert_ne!(b.full_id(), FullBlockId::new(id, 42, 7));
	}
}

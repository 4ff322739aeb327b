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

//! The difficulty type used throughout the sidechain, a 128-bit unsigned
//! magnitude with saturating arithmetic, and the proof-of-work target check
//! it implies.

use std::ops::{Add, AddAssign, Div, Mul, Sub};
use std::str::FromStr;
use std::{fmt, iter};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::core::hash::Hash;
use crate::ser::{self, Readable, Reader, Writeable, Writer};

/// The difficulty is defined as the maximum target divided by the block hash.
/// Sidechain difficulties are summed over thousands of blocks, so the type is
/// wider than the u64 a single share would need.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash, Default)]
pub struct Difficulty {
	num: u128,
}

impl Difficulty {
	/// Difficulty of zero, which is invalid (no target can be computed from
	/// it) but very useful as a start for summations.
	pub fn zero() -> Difficulty {
		Difficulty { num: 0 }
	}

	/// Difficulty of one, the absolute minimum
	pub fn one() -> Difficulty {
		Difficulty { num: 1 }
	}

	/// Convert a `u128` into a `Difficulty`
	pub fn from_num(num: u128) -> Difficulty {
		Difficulty { num }
	}

	/// Converts the difficulty into a u128
	pub fn to_num(self) -> u128 {
		self.num
	}

	/// Whether a proof-of-work hash, interpreted as a 256-bit little-endian
	/// integer, beats this difficulty: `pow_hash * difficulty <= 2^256 - 1`.
	/// The product is computed over 64-bit limbs so the overflow check is
	/// exact.
	pub fn check_pow(&self, pow_hash: &Hash) -> bool {
		let mut h = [0u64; 4];
		for (i, limb) in h.iter_mut().enumerate() {
			let mut n = 0u64;
			for k in (0..8).rev() {
				n = (n << 8) | pow_hash.0[i * 8 + k] as u64;
			}
			*limb = n;
		}
		let d = [self.num as u64, (self.num >> 64) as u64];

		// 256 x 128 bit schoolbook multiply, product valid iff it fits in
		// 256 bits
		let mut r = [0u64; 6];
		for i in 0..4 {
			let mut carry = 0u128;
			for j in 0..2 {
				let t = (h[i] as u128) * (d[j] as u128) + (r[i + j] as u128) + carry;
				r[i + j] = t as u64;
				carry = t >> 64;
			}
			let mut k = i + 2;
			while carry > 0 && k < 6 {
				let t = (r[k] as u128) + carry;
				r[k] = t as u64;
				carry = t >> 64;
				k += 1;
			}
		}
		r[4] == 0 && r[5] == 0
	}
}

impl fmt::Display for Difficulty {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.num)
	}
}

impl FromStr for Difficulty {
	type Err = ser::Error;

	fn from_str(s: &str) -> Result<Difficulty, ser::Error> {
		let num = s.parse::<u128>().map_err(|_| ser::Error::CorruptedData)?;
		Ok(Difficulty::from_num(num))
	}
}

impl Add<Difficulty> for Difficulty {
	type Output = Difficulty;
	fn add(self, other: Difficulty) -> Difficulty {
		Difficulty {
			num: self.num.saturating_add(other.num),
		}
	}
}

impl AddAssign for Difficulty {
	fn add_assign(&mut self, other: Difficulty) {
		self.num = self.num.saturating_add(other.num);
	}
}

impl Sub<Difficulty> for Difficulty {
	type Output = Difficulty;
	fn sub(self, other: Difficulty) -> Difficulty {
		Difficulty {
			num: self.num.saturating_sub(other.num),
		}
	}
}

impl Mul<u64> for Difficulty {
	type Output = Difficulty;
	fn mul(self, other: u64) -> Difficulty {
		Difficulty {
			num: self.num.saturating_mul(other as u128),
		}
	}
}

impl Div<u64> for Difficulty {
	type Output = Difficulty;
	fn div(self, other: u64) -> Difficulty {
		Difficulty {
			num: self.num / other as u128,
		}
	}
}

impl iter::Sum for Difficulty {
	fn sum<I: Iterator<Item = Difficulty>>(iter: I) -> Difficulty {
		iter.fold(Difficulty::zero(), |a, b| a + b)
	}
}

impl Writeable for Difficulty {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64((self.num >> 64) as u64)?;
		writer.write_u64(self.num as u64)
	}
}

impl Readable for Difficulty {
	fn read(reader: &mut dyn Reader) -> Result<Difficulty, ser::Error> {
		let hi = reader.read_u64()?;
		let lo = reader.read_u64()?;
		Ok(Difficulty {
			num: ((hi as u128) << 64) | lo as u128,
		})
	}
}

impl Serialize for Difficulty {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		// u128 does not travel well through every JSON consumer, a decimal
		// string does
		serializer.serialize_str(&self.num.to_string())
	}
}

impl<'de> Deserialize<'de> for Difficulty {
	fn deserialize<D>(deserializer: D) -> Result<Difficulty, D::Error>
	where
		D: Deserializer<'de>,
	{
		deserializer.deserialize_any(DiffVisitor)
	}
}

struct DiffVisitor;

impl<'de> de::Visitor<'de> for DiffVisitor {
	type Value = Difficulty;

	fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
		formatter.write_str("a difficulty, as a decimal string or integer")
	}

	fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
	where
		E: de::Error,
	{
		let num = s
			.parse::<u128>()
			.map_err(|_| de::Error::invalid_value(de::Unexpected::Str(s), &"a decimal number"))?;
		Ok(Difficulty::from_num(num))
	}

	fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
	where
		E: de::Error,
	{
		Ok(Difficulty::from_num(value as u128))
	}
}

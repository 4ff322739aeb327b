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

//! Serialization and deserialization layer specialized for binary encoding.
//! Ensures consistency and safety. Basically a minimal subset of
//! rustc_serialize customized for our need.
//!
//! To use it simply implement `Writeable` or `Readable` and then use the
//! `serialize` or `deserialize` functions on them as appropriate.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use failure::Fail;
use std::io::{self, Read, Write};

/// Maximum size of a single length-prefixed byte vector we are willing to
/// read, purely for DoS protection.
const MAX_VEC_READ: u64 = 100_000;

/// Possible errors deriving from serializing or deserializing.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum Error {
	/// Wraps an io error produced when reading or writing
	#[fail(display = "IO error: {}", _0)]
	IOErr(String),
	/// Expected a given value that wasn't found
	#[fail(display = "expected {:?}, got {:?}", expected, received)]
	UnexpectedData {
		/// What we wanted
		expected: Vec<u8>,
		/// What we got
		received: Vec<u8>,
	},
	/// Data wasn't in a consumable format
	#[fail(display = "corrupted data")]
	CorruptedData,
	/// When asked to read too much data
	#[fail(display = "too large read: {}", _0)]
	TooLargeReadErr(u64),
	/// Count of elements outside the expected bounds
	#[fail(display = "invalid element count: {}", _0)]
	CountError(u64),
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::IOErr(format!("{}", e))
	}
}

/// Implementations defined how different numbers and binary structures are
/// written to an underlying stream or container (depending on implementation).
pub trait Writer {
	/// Writes a fixed number of bytes. The reader is expected to know the
	/// actual length on read.
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;

	/// Writes a u8 as bytes
	fn write_u8(&mut self, n: u8) -> Result<(), Error> {
		self.write_fixed_bytes(&[n])
	}

	/// Writes a u16 as bytes
	fn write_u16(&mut self, n: u16) -> Result<(), Error> {
		let mut bytes = Vec::with_capacity(2);
		bytes.write_u16::<BigEndian>(n)?;
		self.write_fixed_bytes(&bytes)
	}

	/// Writes a u32 as bytes
	fn write_u32(&mut self, n: u32) -> Result<(), Error> {
		let mut bytes = Vec::with_capacity(4);
		bytes.write_u32::<BigEndian>(n)?;
		self.write_fixed_bytes(&bytes)
	}

	/// Writes a u64 as bytes
	fn write_u64(&mut self, n: u64) -> Result<(), Error> {
		let mut bytes = Vec::with_capacity(8);
		bytes.write_u64::<BigEndian>(n)?;
		self.write_fixed_bytes(&bytes)
	}

	/// Writes an i64 as bytes
	fn write_i64(&mut self, n: i64) -> Result<(), Error> {
		let mut bytes = Vec::with_capacity(8);
		bytes.write_i64::<BigEndian>(n)?;
		self.write_fixed_bytes(&bytes)
	}

	/// Writes a variable size vector, the length of the vector is encoded as
	/// a prefix.
	fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.write_u64(bytes.len() as u64)?;
		self.write_fixed_bytes(bytes)
	}
}

/// Implementations defined how different numbers and binary structures are
/// read from an underlying stream or container (depending on implementation).
pub trait Reader {
	/// Read a u8 from the underlying Read
	fn read_u8(&mut self) -> Result<u8, Error>;
	/// Read a u16 from the underlying Read
	fn read_u16(&mut self) -> Result<u16, Error>;
	/// Read a u32 from the underlying Read
	fn read_u32(&mut self) -> Result<u32, Error>;
	/// Read a u64 from the underlying Read
	fn read_u64(&mut self) -> Result<u64, Error>;
	/// Read an i64 from the underlying Read
	fn read_i64(&mut self) -> Result<i64, Error>;
	/// Read a variable size vector from the underlying Read. Expects a usize
	/// first before the data bytes.
	fn read_bytes_len_prefix(&mut self) -> Result<Vec<u8>, Error>;
	/// Read a fixed number of bytes from the underlying reader.
	fn read_fixed_bytes(&mut self, length: usize) -> Result<Vec<u8>, Error>;
	/// Consumes a byte from the reader, producing an error if it doesn't have
	/// the expected value
	fn expect_u8(&mut self, val: u8) -> Result<u8, Error>;
}

/// Trait that every type that can be serialized as binary must implement.
/// Writes directly to a Writer, a utility type thinly wrapping an
/// underlying Write implementation.
pub trait Writeable {
	/// Write the data held by this Writeable to the provided writer
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error>;
}

/// Trait that every type that can be deserialized from binary must implement.
/// Reads directly from a Reader, a utility type thinly wrapping an
/// underlying Read implementation.
pub trait Readable
where
	Self: Sized,
{
	/// Reads the data necessary to this Readable from the provided reader
	fn read(reader: &mut dyn Reader) -> Result<Self, Error>;
}

/// Deserializes a Readable from any std::io::Read implementation.
pub fn deserialize<T: Readable>(source: &mut dyn Read) -> Result<T, Error> {
	let mut reader = BinReader { source };
	T::read(&mut reader)
}

/// Serializes a Writeable into any std::io::Write implementation.
pub fn serialize<W: Writeable>(sink: &mut dyn Write, thing: &W) -> Result<(), Error> {
	let mut writer = BinWriter { sink };
	thing.write(&mut writer)
}

/// Utility function to serialize a writeable directly in memory using a
/// Vec<u8>.
pub fn ser_vec<W: Writeable>(thing: &W) -> Result<Vec<u8>, Error> {
	let mut vec = vec![];
	serialize(&mut vec, thing)?;
	Ok(vec)
}

/// Utility wrapper for an underlying byte Reader. Defines higher level
/// methods to read numbers, byte vectors, hashes, etc.
struct BinReader<'a> {
	source: &'a mut dyn Read,
}

macro_rules! map_io {
	($res:expr) => {
		$res.map_err(|e| Error::IOErr(format!("{}", e)))
	};
}

impl<'a> Reader for BinReader<'a> {
	fn read_u8(&mut self) -> Result<u8, Error> {
		map_io!(self.source.read_u8())
	}
	fn read_u16(&mut self) -> Result<u16, Error> {
		map_io!(self.source.read_u16::<BigEndian>())
	}
	fn read_u32(&mut self) -> Result<u32, Error> {
		map_io!(self.source.read_u32::<BigEndian>())
	}
	fn read_u64(&mut self) -> Result<u64, Error> {
		map_io!(self.source.read_u64::<BigEndian>())
	}
	fn read_i64(&mut self) -> Result<i64, Error> {
		map_io!(self.source.read_i64::<BigEndian>())
	}
	fn read_bytes_len_prefix(&mut self) -> Result<Vec<u8>, Error> {
		let len = self.read_u64()?;
		if len > MAX_VEC_READ {
			return Err(Error::TooLargeReadErr(len));
		}
		self.read_fixed_bytes(len as usize)
	}
	fn read_fixed_bytes(&mut self, length: usize) -> Result<Vec<u8>, Error> {
		// not reading more than 100k bytes in a single read
		if length as u64 > MAX_VEC_READ {
			return Err(Error::TooLargeReadErr(length as u64));
		}
		let mut buf = vec![0; length];
		map_io!(self.source.read_exact(&mut buf).map(move |_| buf))
	}
	fn expect_u8(&mut self, val: u8) -> Result<u8, Error> {
		let b = self.read_u8()?;
		if b == val {
			Ok(b)
		} else {
			Err(Error::UnexpectedData {
				expected: vec![val],
				received: vec![b],
			})
		}
	}
}

/// Utility wrapper for an underlying byte Writer. Defines higher level
/// methods to write numbers, byte vectors, hashes, etc.
struct BinWriter<'a> {
	sink: &'a mut dyn Write,
}

impl<'a> Writer for BinWriter<'a> {
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.sink.write_all(bytes)?;
		Ok(())
	}
}

impl Writeable for Vec<u8> {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_bytes(self)
	}
}

impl Readable for Vec<u8> {
	fn read(reader: &mut dyn Reader) -> Result<Vec<u8>, Error> {
		reader.read_bytes_len_prefix()
	}
}

impl Writeable for u64 {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_u64(*self)
	}
}

impl Readable for u64 {
	fn read(reader: &mut dyn Reader) -> Result<u64, Error> {
		reader.read_u64()
	}
}

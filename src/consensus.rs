// Copyright 2021-2022 Farcaster Devs
//
// This library is free software; you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public
// License as published by the Free Software Foundation; either
// version 3 of the License, or (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this library; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301, USA

//! Consensus encoding used to strictly encode and decode breach evidence before it is written to
//! a storage backend.
//!
//! The format is fixed and versionless: fields are written in their declared order, integers are
//! fixed-width big-endian, byte vectors and sequences are prefixed by a `u16` length, and
//! optional values are preceded by a presence byte. Decoding never returns a partially populated
//! value: any truncated input, out-of-range tag or invalid key material fails with an [`Error`]
//! naming the field that could not be read.
//!
//! Implementation on blockchain foreign types with [`CanonicalBytes`] must follow the strict
//! consensus encoding from the blockchain itself, the library will then wrap the serialization
//! and treat it as a length prefixed vector of bytes when needed.

use hex::encode as hex_encode;
use thiserror::Error;

use std::io;

/// Encoding and decoding errors.
#[derive(Error, Debug)]
pub enum Error {
    /// The type is not defined in the consensus.
    #[error("Unknown consensus type")]
    UnknownType,
    /// The witness type tag is out of the known range.
    #[error("Unknown witness type: {0}")]
    UnknownWitnessType(u16),
    /// A presence flag or a boolean is neither `0x00` nor `0x01`.
    #[error("Invalid flag byte: {0:#04x}")]
    InvalidFlag(u8),
    /// The public key bytes do not parse as a valid secp256k1 point.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(#[from] bitcoin::secp256k1::Error),
    /// The signature hash type is not a standard one.
    #[error("Non-standard signature hash type: {0:#x}")]
    NonStandardSighash(u32),
    /// And I/O error, e.g. the input is truncated.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// A generic parsing error.
    #[error("Parsing error: {0}")]
    ParseFailed(&'static str),
    /// Decoding of a named field failed.
    #[error("Failed decoding `{field}`: {source}")]
    Field {
        /// Name of the field that failed to decode.
        field: &'static str,
        /// The underlying decoding error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps the error with the name of the field being decoded.
    pub fn in_field(self, field: &'static str) -> Self {
        Self::Field {
            field,
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping all the [`Self::Field`] wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::Field { source, .. } => source.root_cause(),
            e => e,
        }
    }

    /// Returns the path of field names leading to the innermost error, outermost first.
    pub fn field_path(&self) -> Vec<&'static str> {
        let mut path = vec![];
        let mut current = self;
        while let Self::Field { field, source } = current {
            path.push(*field);
            current = source;
        }
        path
    }

    /// Returns `true` if the innermost error is the result of an input too short.
    pub fn is_truncated(&self) -> bool {
        matches!(self.root_cause(), Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Attach the name of the decoded field to a decoding error.
pub trait FieldContext<T> {
    /// Wraps the error, if any, into [`Error::Field`].
    fn field(self, field: &'static str) -> Result<T, Error>;
}

impl<T> FieldContext<T> for Result<T, Error> {
    fn field(self, field: &'static str) -> Result<T, Error> {
        self.map_err(|e| e.in_field(field))
    }
}

/// Data represented in a canonical bytes format. The implementer **MUST** use the strict encoding
/// dictated by the blockchain consensus without any length prefix. Length prefix is done by the
/// library during the serialization. This trait is required on foreign types used inside breach
/// evidence (keys, scripts, etc).
pub trait CanonicalBytes {
    /// Returns the canonical bytes representation of the element.
    fn as_canonical_bytes(&self) -> Vec<u8>;

    /// Parse a supposedly canonical bytes representation of an element and return it, return an
    /// error if not canonical.
    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, Error>
    where
        Self: Sized;
}

/// Encode an object into a vector of bytes. The vector can be [`deserialize`]d to retrieve the
/// data.
pub fn serialize<T: Encodable + std::fmt::Debug + ?Sized>(data: &T) -> Vec<u8> {
    let mut encoder = Vec::new();
    // Writing into a vector only fails on sequences longer than the u16 length prefix allows.
    let len = data
        .consensus_encode(&mut encoder)
        .expect("in-memory encoding only fails on oversized sequences");
    debug_assert_eq!(len, encoder.len());
    encoder
}

/// Encode an object into a vector of bytes, returning an error instead of panicking when the
/// object cannot be represented, e.g. when a sequence is too long for its length prefix.
pub fn try_serialize<T: Encodable + ?Sized>(data: &T) -> Result<Vec<u8>, io::Error> {
    let mut encoder = Vec::new();
    data.consensus_encode(&mut encoder)?;
    Ok(encoder)
}

/// Encode an object into a hex-encoded string.
pub fn serialize_hex<T: Encodable + std::fmt::Debug + ?Sized>(data: &T) -> String {
    hex_encode(serialize(data))
}

/// Deserialize an object from a vector of bytes, will error if said deserialization doesn't
/// consume the entire vector.
pub fn deserialize<T: Decodable>(data: &[u8]) -> Result<T, Error> {
    let (rv, consumed) = deserialize_partial(data)?;

    // Fail if data are not consumed entirely.
    if consumed == data.len() {
        Ok(rv)
    } else {
        Err(Error::ParseFailed(
            "data not consumed entirely when explicitly deserializing",
        ))
    }
}

/// Deserialize an object from a vector of bytes, but will not report an error if said
/// deserialization doesn't consume the entire vector.
pub fn deserialize_partial<T: Decodable>(data: &[u8]) -> Result<(T, usize), Error> {
    let mut decoder = io::Cursor::new(data);
    let rv = Decodable::consensus_decode(&mut decoder)?;
    let consumed = decoder.position() as usize;

    Ok((rv, consumed))
}

/// Data which can be encoded in a consensus-consistent way.
pub trait Encodable {
    /// Encode an object with a well-defined format, should only ever error if the underlying
    /// encoder errors. If successful, returns size of the encoded object in bytes.
    ///
    /// The only errors returned are errors propagated from the writer.
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error>;
}

/// Data which can be decoded in a consensus-consistent way.
pub trait Decodable: Sized {
    /// Decode an object with a well-defined format
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, Error>;
}

/// Maximum number of items reserved up front when decoding a sequence.
const MAX_VEC_PREALLOC: usize = 64;

impl<T> Encodable for Vec<T>
where
    T: Encodable,
{
    #[inline]
    fn consensus_encode<S: io::Write>(&self, s: &mut S) -> Result<usize, io::Error> {
        if self.len() > u16::MAX as usize {
            return Err(io::Error::new(io::ErrorKind::Other, "Value is too long"));
        }
        let mut len = (self.len() as u16).consensus_encode(s)?;
        for t in self {
            len += t.consensus_encode(s)?;
        }
        Ok(len)
    }
}

impl<T> Decodable for Vec<T>
where
    T: Decodable,
{
    #[inline]
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, Error> {
        let len = u16::consensus_decode(d)?;
        // The count is untrusted, grow past the initial capacity as items are read.
        let mut ret = Vec::<T>::with_capacity(usize::from(len).min(MAX_VEC_PREALLOC));
        for _ in 0..len {
            ret.push(Decodable::consensus_decode(d)?);
        }
        Ok(ret)
    }
}

macro_rules! impl_fixed_array {
    ($len: expr) => {
        impl Encodable for [u8; $len] {
            #[inline]
            fn consensus_encode<S: io::Write>(&self, s: &mut S) -> Result<usize, io::Error> {
                s.write_all(&self[..])?;
                Ok($len)
            }
        }

        impl Decodable for [u8; $len] {
            #[inline]
            fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, Error> {
                let mut buffer = [0u8; $len];
                d.read_exact(&mut buffer)?;
                Ok(buffer)
            }
        }
    };
}

impl_fixed_array!(32);

#[macro_export]
macro_rules! unwrap_vec_ref {
    ($reader: ident) => {{
        let v: Vec<u8> = $crate::consensus::Decodable::consensus_decode($reader)?;
        v
    }};
}

macro_rules! impl_big_endian_int {
    ($ty: ty, $len: expr) => {
        impl Encodable for $ty {
            #[inline]
            fn consensus_encode<S: io::Write>(&self, s: &mut S) -> Result<usize, io::Error> {
                s.write_all(&self.to_be_bytes())?;
                Ok($len)
            }
        }

        impl Decodable for $ty {
            #[inline]
            fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, Error> {
                let mut buffer = [0u8; $len];
                d.read_exact(&mut buffer)?;
                Ok(<$ty>::from_be_bytes(buffer))
            }
        }
    };
}

impl_big_endian_int!(u8, 1);
impl_big_endian_int!(u16, 2);
impl_big_endian_int!(u32, 4);
impl_big_endian_int!(u64, 8);

impl Encodable for bool {
    #[inline]
    fn consensus_encode<S: io::Write>(&self, s: &mut S) -> Result<usize, io::Error> {
        (*self as u8).consensus_encode(s)
    }
}

impl Decodable for bool {
    #[inline]
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, Error> {
        match u8::consensus_decode(d)? {
            0x00 => Ok(false),
            0x01 => Ok(true),
            flag => Err(Error::InvalidFlag(flag)),
        }
    }
}

impl<T> Encodable for Option<T>
where
    T: Encodable,
{
    #[inline]
    fn consensus_encode<S: io::Write>(&self, s: &mut S) -> Result<usize, io::Error> {
        match self {
            Some(t) => {
                s.write_all(&[1u8])?;
                let len = t.consensus_encode(s)?;
                Ok(1 + len)
            }
            None => s.write_all(&[0u8]).map(|_| 1),
        }
    }
}

impl<T> Decodable for Option<T>
where
    T: Decodable,
{
    #[inline]
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, Error> {
        match u8::consensus_decode(d)? {
            1u8 => Ok(Some(Decodable::consensus_decode(d)?)),
            0u8 => Ok(None),
            flag => Err(Error::InvalidFlag(flag)),
        }
    }
}

#[macro_export]
macro_rules! impl_strict_encoding {
    ($thing:ty) => {
        impl strict_encoding::StrictEncode for $thing {
            fn strict_encode<E: ::std::io::Write>(
                &self,
                mut e: E,
            ) -> Result<usize, strict_encoding::Error> {
                $crate::consensus::Encodable::consensus_encode(self, &mut e)
                    .map_err(strict_encoding::Error::from)
            }
        }

        impl strict_encoding::StrictDecode for $thing {
            fn strict_decode<D: ::std::io::Read>(mut d: D) -> Result<Self, strict_encoding::Error> {
                $crate::consensus::Decodable::consensus_decode(&mut d)
                    .map_err(|e| strict_encoding::Error::DataIntegrityError(e.to_string()))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endianness_test() {
        assert_eq!(&[0xde, 0xad, 0xbe, 0xef], &serialize(&0xdeadbeefu32)[..]);
        assert_eq!(
            deserialize::<u32>(&[0xde, 0xad, 0xbe, 0xef]).unwrap(),
            0xdeadbeef
        );
        assert_eq!(&[0x01, 0x02], &serialize(&0x0102u16)[..]);
        assert_eq!(
            serialize_hex(&5_000_000_000u64),
            "000000012a05f200".to_string()
        );
        assert_eq!(&[0x01], &serialize(&0x01u8)[..]);
        assert_eq!(deserialize::<u8>(&[0x01]).unwrap(), 0x01);
    }

    #[test]
    fn simple_vec() {
        let vec: Vec<u8> = vec![0xde, 0xad, 0xbe, 0xef];
        // len of 4 as u16 in big endian = 0004
        assert_eq!(serialize_hex(&vec), "0004deadbeef");
        // test max size vec
        let vec = vec![0x41; u16::MAX.into()];
        assert_eq!(deserialize::<Vec<u8>>(&serialize(&vec)[..]).unwrap(), vec);
    }

    #[test]
    fn oversized_vec_fails_to_encode() {
        let vec = vec![0x41u8; u16::MAX as usize + 1];
        assert!(try_serialize(&vec).is_err());
    }

    #[test]
    fn huge_count_fails_without_reading_items() {
        // announce 65535 items, provide one
        let mut bytes = vec![0xff, 0xff];
        bytes.extend(serialize(&42u64));
        let res = deserialize::<Vec<u64>>(&bytes);
        assert!(res.unwrap_err().is_truncated());

        bytes[..2].copy_from_slice(&[0x00, 0x01]);
        bytes.push(0xff);
        let (items, consumed) = deserialize_partial::<Vec<u64>>(&bytes).unwrap();
        assert_eq!(items, vec![42]);
        assert_eq!(consumed, 10);
    }

    #[test]
    fn length_prefix_past_buffer_end() {
        // announce 5 bytes, provide 2
        let res = deserialize::<Vec<u8>>(&[0x00, 0x05, 0xaa, 0xbb]);
        assert!(res.unwrap_err().is_truncated());
    }

    #[test]
    fn option_and_bool_flags() {
        assert_eq!(serialize_hex(&Some(0x2au8)), "012a");
        assert_eq!(serialize_hex(&None::<u8>), "00");
        assert_eq!(deserialize::<Option<u8>>(&[0x01, 0x2a]).unwrap(), Some(0x2a));
        assert!(matches!(
            deserialize::<Option<u8>>(&[0x02, 0x2a]),
            Err(Error::InvalidFlag(0x02))
        ));
        assert!(deserialize::<bool>(&[0x01]).unwrap());
        assert!(!deserialize::<bool>(&[0x00]).unwrap());
        assert!(matches!(
            deserialize::<bool>(&[0xff]),
            Err(Error::InvalidFlag(0xff))
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        assert!(matches!(
            deserialize::<u16>(&[0x00, 0x01, 0x02]),
            Err(Error::ParseFailed(_))
        ));
        let (value, consumed) = deserialize_partial::<u16>(&[0x00, 0x01, 0x02]).unwrap();
        assert_eq!(value, 1);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn field_context_is_nested() {
        let res: Result<u8, Error> = Err(Error::InvalidFlag(3));
        let err = res.field("inner").field("outer").unwrap_err();
        assert_eq!(err.field_path(), vec!["outer", "inner"]);
        assert!(matches!(err.root_cause(), Error::InvalidFlag(3)));
        assert_eq!(
            err.to_string(),
            "Failed decoding `outer`: Failed decoding `inner`: Invalid flag byte: 0x03"
        );
    }
}

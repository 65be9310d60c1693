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

//! Consensus encoding of the Bitcoin foreign types used inside breach evidence: transaction ids,
//! outpoints, outputs, scripts, amounts, public keys and signature hash types.

use std::io;

use bitcoin::blockdata::script::Script;
use bitcoin::blockdata::transaction::{EcdsaSighashType, OutPoint, TxOut};
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Amount, Txid};

use crate::consensus::{self, CanonicalBytes, Decodable, Encodable, FieldContext};

/// Size in bytes of an encoded [`OutPoint`], the transaction id followed by the output index.
pub const OUTPOINT_SIZE: usize = 36;

impl Encodable for Txid {
    fn consensus_encode<W: io::Write>(&self, s: &mut W) -> Result<usize, io::Error> {
        self.into_inner().consensus_encode(s)
    }
}

impl Decodable for Txid {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        let bytes: [u8; 32] = Decodable::consensus_decode(d)?;
        Ok(Txid::from_inner(bytes))
    }
}

impl Encodable for OutPoint {
    fn consensus_encode<W: io::Write>(&self, s: &mut W) -> Result<usize, io::Error> {
        let len = self.txid.consensus_encode(s)?;
        Ok(len + self.vout.consensus_encode(s)?)
    }
}

impl Decodable for OutPoint {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(OutPoint {
            txid: Decodable::consensus_decode(d).field("txid")?,
            vout: Decodable::consensus_decode(d).field("vout")?,
        })
    }
}

impl Encodable for Amount {
    fn consensus_encode<W: io::Write>(&self, s: &mut W) -> Result<usize, io::Error> {
        self.as_sat().consensus_encode(s)
    }
}

impl Decodable for Amount {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(Amount::from_sat(Decodable::consensus_decode(d)?))
    }
}

impl Encodable for Script {
    fn consensus_encode<W: io::Write>(&self, s: &mut W) -> Result<usize, io::Error> {
        self.to_bytes().consensus_encode(s)
    }
}

impl Decodable for Script {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(Script::from(unwrap_vec_ref!(d)))
    }
}

impl Encodable for TxOut {
    fn consensus_encode<W: io::Write>(&self, s: &mut W) -> Result<usize, io::Error> {
        let len = self.value.consensus_encode(s)?;
        Ok(len + self.script_pubkey.consensus_encode(s)?)
    }
}

impl Decodable for TxOut {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(TxOut {
            value: Decodable::consensus_decode(d).field("value")?,
            script_pubkey: Decodable::consensus_decode(d).field("script_pubkey")?,
        })
    }
}

impl CanonicalBytes for PublicKey {
    fn as_canonical_bytes(&self) -> Vec<u8> {
        self.serialize().as_ref().into()
    }

    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, consensus::Error>
    where
        Self: Sized,
    {
        Ok(PublicKey::from_slice(bytes)?)
    }
}

impl Encodable for EcdsaSighashType {
    fn consensus_encode<W: io::Write>(&self, s: &mut W) -> Result<usize, io::Error> {
        (*self as u32).consensus_encode(s)
    }
}

impl Decodable for EcdsaSighashType {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        match u32::consensus_decode(d)? {
            0x01 => Ok(EcdsaSighashType::All),
            0x02 => Ok(EcdsaSighashType::None),
            0x03 => Ok(EcdsaSighashType::Single),
            0x81 => Ok(EcdsaSighashType::AllPlusAnyoneCanPay),
            0x82 => Ok(EcdsaSighashType::NonePlusAnyoneCanPay),
            0x83 => Ok(EcdsaSighashType::SinglePlusAnyoneCanPay),
            n => Err(consensus::Error::NonStandardSighash(n)),
        }
    }
}

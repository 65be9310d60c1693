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

//! Breached outputs. A breached output is one output of a revoked commitment transaction that the
//! victim of the breach is entitled to claim, together with everything needed to later sign for
//! it in a justice transaction.

use std::convert::TryFrom;
use std::io;
use std::str::FromStr;

use bitcoin::blockdata::script::Script;
use bitcoin::blockdata::transaction::{EcdsaSighashType, OutPoint, TxOut};
use bitcoin::secp256k1::PublicKey;
use bitcoin::Amount;

use crate::consensus::{self, CanonicalBytes, Decodable, Encodable, FieldContext};

/// Witness size, in bytes, of a spend of the to-local output through the CSV delay path.
pub const TO_LOCAL_TIMEOUT_WITNESS_SIZE: u64 = 1 + 1 + 73 + 1 + 1 + 79;

/// Witness size, in bytes, of a spend of the to-local output through the revocation path.
pub const TO_LOCAL_PENALTY_WITNESS_SIZE: u64 = 1 + 1 + 73 + 1 + 1 + 79;

/// Witness size, in bytes, of a pay-to-witness-pubkey-hash spend.
pub const P2WKH_WITNESS_SIZE: u64 = 1 + 1 + 73 + 1 + 33;

/// Witness size, in bytes, of a revocation spend of an offered HTLC output.
pub const OFFERED_HTLC_PENALTY_WITNESS_SIZE: u64 = 1 + 1 + 73 + 1 + 33 + 1 + 133;

/// Witness size, in bytes, of a revocation spend of an accepted HTLC output.
pub const ACCEPTED_HTLC_PENALTY_WITNESS_SIZE: u64 = 1 + 1 + 73 + 1 + 33 + 1 + 139;

/// The spending conditions of a breached output. The set is fixed by the channel protocol, every
/// consumer must match it exhaustively.
#[derive(Display, Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[display(Debug)]
pub enum WitnessType {
    /// A time-delayed balance output, spendable by its owner once the relative timelock expired.
    CommitmentTimeLock,
    /// The victim's own balance, paid directly to a key it controls without any delay.
    CommitmentNoDelay,
    /// The cheater's delayed balance, claimed immediately with the revocation key.
    CommitmentRevoke,
    /// An HTLC offered by the cheater, claimed with the revocation key.
    HtlcOfferedRevoke,
    /// An HTLC accepted by the cheater, claimed with the revocation key.
    HtlcAcceptedRevoke,
}

impl WitnessType {
    /// Return the consensus tag of the witness type.
    pub fn to_u16(&self) -> u16 {
        match self {
            Self::CommitmentTimeLock => 0,
            Self::CommitmentNoDelay => 1,
            Self::CommitmentRevoke => 2,
            Self::HtlcOfferedRevoke => 3,
            Self::HtlcAcceptedRevoke => 4,
        }
    }

    /// Returns `true` if the output is a conditional payment.
    pub fn is_htlc(&self) -> bool {
        match self {
            Self::HtlcOfferedRevoke | Self::HtlcAcceptedRevoke => true,
            Self::CommitmentTimeLock | Self::CommitmentNoDelay | Self::CommitmentRevoke => false,
        }
    }

    /// Returns `true` if the witness is produced with the revocation key, i.e. the signing key
    /// must be tweaked with the revealed revocation secret.
    pub fn uses_revocation_key(&self) -> bool {
        match self {
            Self::CommitmentRevoke | Self::HtlcOfferedRevoke | Self::HtlcAcceptedRevoke => true,
            Self::CommitmentTimeLock | Self::CommitmentNoDelay => false,
        }
    }

    /// Upper bound of the witness size in bytes, used to estimate the weight of the justice
    /// transaction.
    pub fn witness_size(&self) -> u64 {
        match self {
            Self::CommitmentTimeLock => TO_LOCAL_TIMEOUT_WITNESS_SIZE,
            Self::CommitmentNoDelay => P2WKH_WITNESS_SIZE,
            Self::CommitmentRevoke => TO_LOCAL_PENALTY_WITNESS_SIZE,
            Self::HtlcOfferedRevoke => OFFERED_HTLC_PENALTY_WITNESS_SIZE,
            Self::HtlcAcceptedRevoke => ACCEPTED_HTLC_PENALTY_WITNESS_SIZE,
        }
    }
}

impl TryFrom<u16> for WitnessType {
    type Error = consensus::Error;

    fn try_from(tag: u16) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::CommitmentTimeLock),
            1 => Ok(Self::CommitmentNoDelay),
            2 => Ok(Self::CommitmentRevoke),
            3 => Ok(Self::HtlcOfferedRevoke),
            4 => Ok(Self::HtlcAcceptedRevoke),
            _ => Err(consensus::Error::UnknownWitnessType(tag)),
        }
    }
}

impl FromStr for WitnessType {
    type Err = consensus::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CommitmentTimeLock" | "commitment_time_lock" => Ok(Self::CommitmentTimeLock),
            "CommitmentNoDelay" | "commitment_no_delay" => Ok(Self::CommitmentNoDelay),
            "CommitmentRevoke" | "commitment_revoke" => Ok(Self::CommitmentRevoke),
            "HtlcOfferedRevoke" | "htlc_offered_revoke" => Ok(Self::HtlcOfferedRevoke),
            "HtlcAcceptedRevoke" | "htlc_accepted_revoke" => Ok(Self::HtlcAcceptedRevoke),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

impl Encodable for WitnessType {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        self.to_u16().consensus_encode(writer)
    }
}

impl Decodable for WitnessType {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        WitnessType::try_from(u16::consensus_decode(d)?)
    }
}

impl_strict_encoding!(WitnessType);

/// Signing material sufficient to produce a valid witness for a breached output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignDescriptor {
    /// The public key the witness signs for. When a tweak is present this is the base point the
    /// tweak is applied to.
    pub pubkey: PublicKey,
    /// Private key tweak derived from the revocation scheme, if any.
    pub private_tweak: Option<Vec<u8>>,
    /// The script satisfied by the witness.
    pub witness_script: Script,
    /// The output being spent, value and locking script.
    pub output: TxOut,
    /// The signature hash type to apply when signing.
    pub hash_type: EcdsaSighashType,
}

impl SignDescriptor {
    /// Create a new sign descriptor without any private key tweak.
    pub fn new(
        pubkey: PublicKey,
        witness_script: Script,
        output: TxOut,
        hash_type: EcdsaSighashType,
    ) -> Self {
        Self {
            pubkey,
            private_tweak: None,
            witness_script,
            output,
            hash_type,
        }
    }

    /// Create a new sign descriptor from a serialized public key, the key is parsed and rejected
    /// if invalid.
    pub fn from_raw_pubkey(
        pubkey: &[u8],
        witness_script: Script,
        output: TxOut,
        hash_type: EcdsaSighashType,
    ) -> Result<Self, consensus::Error> {
        let pubkey = PublicKey::from_canonical_bytes(pubkey)?;
        Ok(Self::new(pubkey, witness_script, output, hash_type))
    }

    /// Set the private key tweak derived from the revocation scheme.
    pub fn with_private_tweak(mut self, tweak: Vec<u8>) -> Self {
        self.private_tweak = Some(tweak);
        self
    }
}

impl Encodable for SignDescriptor {
    fn consensus_encode<W: io::Write>(&self, s: &mut W) -> Result<usize, io::Error> {
        let mut len = self.pubkey.as_canonical_bytes().consensus_encode(s)?;
        len += self.private_tweak.consensus_encode(s)?;
        len += self.witness_script.consensus_encode(s)?;
        len += self.output.consensus_encode(s)?;
        Ok(len + self.hash_type.consensus_encode(s)?)
    }
}

impl Decodable for SignDescriptor {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        let pubkey = Vec::<u8>::consensus_decode(d)
            .and_then(|bytes| PublicKey::from_canonical_bytes(&bytes))
            .field("pubkey")?;
        Ok(SignDescriptor {
            pubkey,
            private_tweak: Decodable::consensus_decode(d).field("private_tweak")?,
            witness_script: Decodable::consensus_decode(d).field("witness_script")?,
            output: Decodable::consensus_decode(d).field("output")?,
            hash_type: Decodable::consensus_decode(d).field("hash_type")?,
        })
    }
}

impl_strict_encoding!(SignDescriptor);

/// One output of a revoked commitment transaction the victim can claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreachedOutput {
    /// Value of the output.
    pub amount: Amount,
    /// Reference to the output being claimed.
    pub outpoint: OutPoint,
    /// Spending condition of the output.
    pub witness_type: WitnessType,
    /// Set when the output must be claimed in an intermediate transaction before being swept.
    pub two_stage_claim: bool,
    /// Signing material for the output.
    pub sign_descriptor: SignDescriptor,
}

impl BreachedOutput {
    /// Create a new breached output.
    pub fn new(
        amount: Amount,
        outpoint: OutPoint,
        witness_type: WitnessType,
        two_stage_claim: bool,
        sign_descriptor: SignDescriptor,
    ) -> Self {
        Self {
            amount,
            outpoint,
            witness_type,
            two_stage_claim,
            sign_descriptor,
        }
    }
}

impl Encodable for BreachedOutput {
    fn consensus_encode<W: io::Write>(&self, s: &mut W) -> Result<usize, io::Error> {
        let mut len = self.amount.consensus_encode(s)?;
        len += self.outpoint.consensus_encode(s)?;
        len += self.sign_descriptor.consensus_encode(s)?;
        len += self.witness_type.consensus_encode(s)?;
        Ok(len + self.two_stage_claim.consensus_encode(s)?)
    }
}

impl Decodable for BreachedOutput {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        let amount = Decodable::consensus_decode(d).field("amount")?;
        let outpoint = Decodable::consensus_decode(d).field("outpoint")?;
        let sign_descriptor = Decodable::consensus_decode(d).field("sign_descriptor")?;
        Ok(BreachedOutput {
            amount,
            outpoint,
            witness_type: Decodable::consensus_decode(d).field("witness_type")?,
            two_stage_claim: Decodable::consensus_decode(d).field("two_stage_claim")?,
            sign_descriptor,
        })
    }
}

impl_strict_encoding!(BreachedOutput);

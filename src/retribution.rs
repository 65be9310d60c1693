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

//! Retribution information: every breached output of one channel's revoked state, aggregated in
//! a single punishable unit.
//!
//! A retribution is created once, when the revoked commitment is seen on-chain, and must be
//! persisted before any justice transaction is attempted. It is only ever replaced as a whole and
//! removed once the justice transaction is irreversibly confirmed.

use std::io;

use bitcoin::blockdata::transaction::OutPoint;
use bitcoin::{Amount, Txid};

use crate::breach::BreachedOutput;
use crate::consensus::{self, Decodable, Encodable, FieldContext};

/// All the data needed to punish a counterparty that broadcast a revoked commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetributionInfo {
    /// The revoked commitment transaction being punished.
    pub commit_hash: Txid,
    /// The channel funding outpoint, identifies the retribution in the store.
    pub chan_point: OutPoint,
    /// The victim's own balance in the revoked state, absent if it was zero.
    pub self_output: Option<BreachedOutput>,
    /// The cheater's balance in the revoked state, absent if it was zero.
    pub revoked_output: Option<BreachedOutput>,
    /// One output per pending HTLC in the revoked state. The order is kept for deterministic
    /// re-encoding but carries no meaning.
    pub htlc_outputs: Vec<BreachedOutput>,
}

impl RetributionInfo {
    /// Create a new retribution.
    pub fn new(
        commit_hash: Txid,
        chan_point: OutPoint,
        self_output: Option<BreachedOutput>,
        revoked_output: Option<BreachedOutput>,
        htlc_outputs: Vec<BreachedOutput>,
    ) -> Self {
        Self {
            commit_hash,
            chan_point,
            self_output,
            revoked_output,
            htlc_outputs,
        }
    }

    /// Iterates over all the breached outputs: self output first, then revoked output, then the
    /// HTLC outputs in order.
    pub fn breached_outputs(&self) -> impl Iterator<Item = &BreachedOutput> {
        self.self_output
            .iter()
            .chain(self.revoked_output.iter())
            .chain(self.htlc_outputs.iter())
    }

    /// Number of breached outputs.
    pub fn num_outputs(&self) -> usize {
        self.breached_outputs().count()
    }

    /// Returns `true` if there is nothing to claim.
    pub fn is_empty(&self) -> bool {
        self.num_outputs() == 0
    }

    /// Sum of all breached output amounts, `None` on overflow.
    pub fn total_amount(&self) -> Option<Amount> {
        self.breached_outputs()
            .try_fold(Amount::ZERO, |acc, output| acc.checked_add(output.amount))
    }
}

impl Encodable for RetributionInfo {
    fn consensus_encode<W: io::Write>(&self, s: &mut W) -> Result<usize, io::Error> {
        let mut len = self.commit_hash.consensus_encode(s)?;
        len += self.chan_point.consensus_encode(s)?;
        len += self.self_output.consensus_encode(s)?;
        len += self.revoked_output.consensus_encode(s)?;
        Ok(len + self.htlc_outputs.consensus_encode(s)?)
    }
}

impl Decodable for RetributionInfo {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(RetributionInfo {
            commit_hash: Decodable::consensus_decode(d).field("commit_hash")?,
            chan_point: Decodable::consensus_decode(d).field("chan_point")?,
            self_output: Decodable::consensus_decode(d).field("self_output")?,
            revoked_output: Decodable::consensus_decode(d).field("revoked_output")?,
            htlc_outputs: Decodable::consensus_decode(d).field("htlc_outputs")?,
        })
    }
}

impl_strict_encoding!(RetributionInfo);

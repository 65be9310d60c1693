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

//! Retribution core library: durable breach evidence for payment channels.
//!
//! When a channel counterparty broadcasts a revoked commitment transaction the victim must sweep
//! every output of that old state before the cheater's timelock expires. This library holds the
//! data needed to do so and persists it before any justice transaction is attempted:
//!
//! - [`breach`] describes one breached output and how to spend it,
//! - [`retribution`] aggregates all breached outputs of a channel into one punishable unit,
//! - [`consensus`] is the strict binary encoding used to persist them,
//! - [`store`] is the crash-consistent collection of retributions, built on any [`backend`].
//!
//! Detecting breaches on-chain and building the justice transaction are left to the caller.

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate serde;

#[macro_use]
pub mod consensus;

pub mod backend;
pub mod bitcoin;
pub mod breach;
pub mod retribution;
pub mod store;

pub use crate::breach::{BreachedOutput, SignDescriptor, WitnessType};
pub use crate::retribution::RetributionInfo;
pub use crate::store::{RetributionStore, RetributionStorer};

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

//! Retribution store, the durable collection of [`RetributionInfo`] keyed by channel point.
//!
//! A retribution must be added before any justice transaction is attempted and removed only once
//! the justice transaction is irreversibly confirmed. Both operations are single atomic writes on
//! the backend, a crash leaves the store either before or after the operation.
//!
//! The layout is one bucket, [`RETRIBUTION_BUCKET`], where the key is the 36 bytes consensus
//! encoding of the channel point and the value the consensus encoding of the retribution.

use std::convert::Infallible;
use std::error;
use std::fmt;
use std::io;

use bitcoin::blockdata::transaction::OutPoint;
use log::{debug, trace};
use thiserror::Error;

use crate::backend::{Backend, ScanError};
use crate::consensus::{self, deserialize, serialize, try_serialize};
use crate::retribution::RetributionInfo;

/// Name of the bucket holding the retributions.
pub const RETRIBUTION_BUCKET: &str = "retribution";

/// Store operations, used to qualify storage failures.
#[derive(Display, Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Operation {
    /// Persisting a retribution.
    #[display("add")]
    Add,
    /// Deleting a retribution.
    #[display("remove")]
    Remove,
    /// Reading a single retribution.
    #[display("fetch")]
    Fetch,
    /// Traversing all retributions.
    #[display("scan")]
    Scan,
}

/// Errors returned by the retribution store. Storage errors are never retried, the caller decides
/// whether the operation is still relevant.
#[derive(Error, Debug)]
pub enum Error {
    /// The backend failed, the error is carried verbatim.
    #[error("Failed to {operation} retribution{}: {source}", ChannelRef(.chan_point))]
    Storage {
        /// The failing operation.
        operation: Operation,
        /// The channel the operation was about, none for scans.
        chan_point: Option<OutPoint>,
        /// The backend error.
        #[source]
        source: Box<dyn error::Error + Send + Sync>,
    },
    /// The retribution cannot be represented with the consensus encoding.
    #[error("Failed to encode retribution for channel {chan_point}: {source}")]
    Encoding {
        /// The channel of the retribution.
        chan_point: OutPoint,
        /// The encoding error.
        #[source]
        source: io::Error,
    },
    /// A stored value does not decode, the data or the encoding is corrupted. This is never
    /// skipped, a skipped retribution is a lost punishment.
    #[error("Corrupted retribution under key {key}: {source}")]
    Corrupted {
        /// Hex encoded key of the corrupted value.
        key: String,
        /// The decoding error.
        #[source]
        source: consensus::Error,
    },
}

impl Error {
    fn storage<E>(operation: Operation, chan_point: Option<OutPoint>, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            operation,
            chan_point,
            source: Box::new(source),
        }
    }
}

struct ChannelRef<'a>(&'a Option<OutPoint>);

impl fmt::Display for ChannelRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(chan_point) => write!(f, " for channel {}", chan_point),
            None => Ok(()),
        }
    }
}

/// Persistence of retributions, as consumed by the breach detection and punishment loops.
pub trait RetributionStorer {
    /// Persist a retribution, overwriting any retribution stored for the same channel.
    fn add(&self, retribution: &RetributionInfo) -> Result<(), Error>;

    /// Returns `true` if a retribution is stored for the channel.
    fn is_breached(&self, chan_point: &OutPoint) -> Result<bool, Error>;

    /// Delete the retribution of the channel, succeed if there is none.
    fn remove(&self, chan_point: &OutPoint) -> Result<(), Error>;

    /// Visit every stored retribution of a consistent snapshot. The traversal stops at the first
    /// visitor error, which is returned as is. A value that fails to decode stops the traversal
    /// with [`Error::Corrupted`].
    fn for_all<F, E>(&self, visit: F) -> Result<(), E>
    where
        F: FnMut(RetributionInfo) -> Result<(), E>,
        E: From<Error>;
}

/// Retribution store on top of a [`Backend`]. The backend is borrowed, opening and closing it is
/// the caller's responsibility.
#[derive(Debug)]
pub struct RetributionStore<'a, B: Backend> {
    db: &'a B,
}

impl<'a, B: Backend> Clone for RetributionStore<'a, B> {
    fn clone(&self) -> Self {
        Self { db: self.db }
    }
}

impl<'a, B: Backend> RetributionStore<'a, B> {
    /// Create a store on an already opened backend.
    pub fn new(db: &'a B) -> Self {
        Self { db }
    }

    /// Return the retribution stored for the channel, if any.
    pub fn fetch(&self, chan_point: &OutPoint) -> Result<Option<RetributionInfo>, Error> {
        let key = serialize(chan_point);
        match self
            .db
            .get(RETRIBUTION_BUCKET, &key)
            .map_err(|e| Error::storage(Operation::Fetch, Some(*chan_point), e))?
        {
            Some(value) => deserialize(&value)
                .map(Some)
                .map_err(|source| Error::Corrupted {
                    key: hex::encode(&key),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Number of stored retributions.
    pub fn len(&self) -> Result<usize, Error> {
        let mut count = 0;
        self.db
            .for_each::<_, Infallible>(RETRIBUTION_BUCKET, |_, _| {
                count += 1;
                Ok(())
            })
            .map_err(|e| match e {
                ScanError::Backend(e) => Error::storage(Operation::Scan, None, e),
                ScanError::Visit(never) => match never {},
            })?;
        Ok(count)
    }

    /// Returns `true` if no retribution is stored.
    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }
}

impl<'a, B: Backend> RetributionStorer for RetributionStore<'a, B> {
    fn add(&self, retribution: &RetributionInfo) -> Result<(), Error> {
        let chan_point = retribution.chan_point;
        let key = serialize(&chan_point);
        let value = try_serialize(retribution).map_err(|source| Error::Encoding {
            chan_point,
            source,
        })?;
        self.db
            .put(RETRIBUTION_BUCKET, &key, &value)
            .map_err(|e| Error::storage(Operation::Add, Some(chan_point), e))?;
        debug!(
            "Persisted retribution for channel {} ({} breached outputs)",
            chan_point,
            retribution.num_outputs()
        );
        Ok(())
    }

    fn is_breached(&self, chan_point: &OutPoint) -> Result<bool, Error> {
        let key = serialize(chan_point);
        let value = self
            .db
            .get(RETRIBUTION_BUCKET, &key)
            .map_err(|e| Error::storage(Operation::Fetch, Some(*chan_point), e))?;
        Ok(value.is_some())
    }

    fn remove(&self, chan_point: &OutPoint) -> Result<(), Error> {
        let key = serialize(chan_point);
        self.db
            .delete(RETRIBUTION_BUCKET, &key)
            .map_err(|e| Error::storage(Operation::Remove, Some(*chan_point), e))?;
        debug!("Removed retribution for channel {}", chan_point);
        Ok(())
    }

    fn for_all<F, E>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(RetributionInfo) -> Result<(), E>,
        E: From<Error>,
    {
        let res = self.db.for_each(RETRIBUTION_BUCKET, |key, value| {
            let retribution = deserialize::<RetributionInfo>(value).map_err(|source| {
                E::from(Error::Corrupted {
                    key: hex::encode(key),
                    source,
                })
            })?;
            trace!("Visiting retribution for channel {}", retribution.chan_point);
            visit(retribution)
        });
        match res {
            Ok(()) => Ok(()),
            Err(ScanError::Visit(e)) => Err(e),
            Err(ScanError::Backend(e)) => Err(Error::storage(Operation::Scan, None, e).into()),
        }
    }
}

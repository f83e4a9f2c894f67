//! # Economy Error Types
//!
//! All errors that can occur in the economy engine.
//!
//! Business-rule failures carry enough detail (required vs. current
//! amounts, entity ids) for the caller to correct the request and retry.
//! [`EconomyError::kind`] folds every variant into the coarse taxonomy
//! exposed at the service boundary.

use crate::ledger::Currency;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Entity kinds referenced by [`EconomyError::NotFound`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Entity {
    /// A ledger account.
    Account,
    /// A loot container in the catalog.
    Container,
    /// An item type in the catalog.
    ItemType,
    /// An inventory record.
    InventoryRecord,
    /// A market listing.
    Listing,
    /// A high-value redemption item.
    HighValueItem,
    /// A referral code.
    ReferralCode,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Account => "account",
            Self::Container => "container",
            Self::ItemType => "item type",
            Self::InventoryRecord => "inventory record",
            Self::Listing => "listing",
            Self::HighValueItem => "high-value item",
            Self::ReferralCode => "referral code",
        };
        f.write_str(name)
    }
}

/// Coarse classification of an [`EconomyError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown container, item, listing or account.
    NotFound,
    /// The caller's own balance or fragment pool is too small.
    InsufficientBalance,
    /// A bound or format check failed on the request payload.
    InvalidArgument,
    /// The request conflicts with the current state of shared data.
    Conflict,
    /// The catalog or configuration is broken.
    Misconfiguration,
    /// The store failed. Never a business outcome.
    Internal,
}

/// Errors that can occur in the economy engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomyError {
    /// Referenced entity does not exist (or is inactive, or not the caller's).
    #[error("{entity} not found: {id}")]
    NotFound {
        /// What kind of entity was looked up.
        entity: Entity,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// A debit would drive a balance negative.
    #[error("insufficient {currency} funds: need {required}, have {current}")]
    InsufficientFunds {
        /// Currency of the failed debit.
        currency: Currency,
        /// Amount the operation needed.
        required: u64,
        /// Balance at the time of the check.
        current: u64,
    },

    /// Not enough fragments collected.
    #[error("insufficient fragments: need {required}, have {current}")]
    InsufficientFragments {
        /// Fragments the target requires.
        required: u32,
        /// Fragments the caller holds.
        current: u32,
    },

    /// Request payload out of the configured bounds or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The inventory record is already held in escrow by a listing.
    #[error("inventory record {record_id} is already listed")]
    AlreadyListed {
        /// The escrowed record.
        record_id: u64,
    },

    /// The listing was sold, cancelled or expired before this request ran.
    #[error("listing {listing_id} is no longer active")]
    ListingNoLongerActive {
        /// The listing that lost the race.
        listing_id: u64,
    },

    /// A seller tried to buy their own listing.
    #[error("cannot buy your own listing")]
    SelfTrade,

    /// The daily reward was already claimed for the current day.
    #[error("daily reward already claimed, next claim at {next_available}")]
    AlreadyClaimed {
        /// Start of the next claim window.
        next_available: DateTime<Utc>,
    },

    /// A container has no configured drops.
    #[error("container {container_id} has an empty reward table")]
    EmptyRewardTable {
        /// The broken container.
        container_id: u32,
    },

    /// Invalid configuration or catalog file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Arithmetic overflow in an economic calculation.
    #[error("arithmetic overflow in economic calculation")]
    ArithmeticOverflow,

    /// The store lock could not be acquired in time.
    #[error("store busy, try again")]
    StoreBusy,

    /// The durable log could not be read or written.
    #[error("storage failure: {0}")]
    Storage(String),

    /// The durable log contains data that cannot be decoded.
    #[error("corrupted store data: {0}")]
    Corrupted(String),
}

impl EconomyError {
    /// Shorthand for [`EconomyError::NotFound`].
    pub fn not_found(entity: Entity, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`EconomyError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Classifies this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InsufficientFunds { .. } | Self::InsufficientFragments { .. } => {
                ErrorKind::InsufficientBalance
            }
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::AlreadyListed { .. }
            | Self::ListingNoLongerActive { .. }
            | Self::SelfTrade
            | Self::AlreadyClaimed { .. } => ErrorKind::Conflict,
            Self::EmptyRewardTable { .. } | Self::InvalidConfig(_) => ErrorKind::Misconfiguration,
            Self::ArithmeticOverflow | Self::StoreBusy | Self::Storage(_) | Self::Corrupted(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether re-issuing the same request may succeed without changes.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ListingNoLongerActive { .. } | Self::StoreBusy)
    }
}

/// Result type for economy operations.
pub type EconomyResult<T> = Result<T, EconomyError>;

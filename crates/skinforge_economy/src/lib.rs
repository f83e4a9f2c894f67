//! # SKINFORGE Economy
//!
//! Ledger and reward-distribution engine for the SKINFORGE loot economy.
//!
//! ## Design Principles
//!
//! 1. **One atomic unit per request** - every value transfer runs inside
//!    [`EconomyStore::transaction`]; failure or panic rolls back everything
//! 2. **Authorize inside the transaction** - the balance read that allows a
//!    debit happens under the same lock as the debit
//! 3. **Integers for money** - balances are `u64`, valuations and payout
//!    multipliers are [`FixedPoint`]
//! 4. **Injectable everything** - store handle, clock and random source are
//!    constructed once and passed in; there are no globals
//! 5. **External configuration** - economy rules and the catalog are TOML
//!
//! ## Example
//!
//! ```rust,ignore
//! use skinforge_economy::{Catalog, Economy, EconomyConfig, SeededSource, SharedRandom, SystemClock};
//!
//! let config = EconomyConfig::from_path("data/economy.toml")?;
//! let catalog = Catalog::from_path("data/catalog.toml", &config.catalog)?;
//! let economy = Economy::open(
//!     "data/economy.wal",
//!     config,
//!     catalog,
//!     Arc::new(SystemClock),
//!     SharedRandom::new(SeededSource::from_entropy()),
//! )?;
//!
//! let caller = economy.register("tg:42", None)?.account.id;
//! let opening = economy.open_container(caller, 1)?;
//! println!("{}", opening.description);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod accounts;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod containers;
pub mod crafting;
pub mod distributor;
pub mod engine;
pub mod error;
pub mod events;
pub mod fixed_point;
pub mod inventory;
pub mod ledger;
pub mod market;
pub mod minigames;
pub mod random;
pub mod redemption;
pub mod store;
pub mod wal;

pub use accounts::{AccountService, DailyClaim, Registration};
pub use catalog::{Catalog, Container, ContainerKind, HighValueItem, ItemType, Rarity, RewardTableEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EconomyConfig;
pub use containers::ContainerOpening;
pub use crafting::{CombineOutcome, FragmentProgress};
pub use distributor::{RewardTable, SelectionStatistics, TableAudit};
pub use engine::Economy;
pub use error::{EconomyError, EconomyResult, Entity, ErrorKind};
pub use events::EconomyEvent;
pub use fixed_point::FixedPoint;
pub use inventory::{InventoryRecord, RecordId};
pub use ledger::{Account, AccountId, Currency, Denomination, EntryKind, LedgerEntry};
pub use market::{ListingStatus, MarketListing, MarketPage, MarketQuery, MarketSort, Purchase};
pub use minigames::{
    CoinSide, DicePrediction, GameKind, GameOutcome, GameRequest, GameResult, GameSession, GameStats,
    WheelBet,
};
pub use random::{RandomSource, ScriptedSource, SeededSource, SharedRandom};
pub use redemption::{RedemptionOutcome, WithdrawalRequest, WithdrawalStatus};
pub use store::{EconomyStore, StoreState, Txn};

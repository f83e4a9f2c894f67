//! # Economy Engine
//!
//! **The single entry point for the request boundary.**
//!
//! [`Economy`] owns one store handle, one catalog, one random source and
//! one event buffer, and wires every service to them at construction.
//! It is `Send + Sync`; share it behind an `Arc` across worker threads.
//!
//! ```text
//!  request boundary (authenticated caller)
//!        │
//!        ▼
//!  ┌──────────┐   accounts · containers · crafting · market · games · redemption
//!  │ Economy  │──────────────────────────────┬───────────────────────────────
//!  └──────────┘                              │
//!        │                                   ▼
//!        │                      EconomyStore::transaction(|txn| ..)
//!        │                           │              │
//!        ▼                           ▼              ▼
//!  drain_events()               in-memory state   write-ahead log
//!  (notification collaborator)
//! ```

use crate::accounts::{AccountService, DailyClaim, Registration};
use crate::catalog::{Catalog, ContainerId, HighValueItemId, ItemTypeId};
use crate::clock::Clock;
use crate::config::EconomyConfig;
use crate::containers::{ContainerOpening, ContainerService};
use crate::crafting::{CombineOutcome, CraftingService, FragmentProgress};
use crate::error::EconomyResult;
use crate::events::{EconomyEvent, EventBuffer};
use crate::inventory::{InventoryRecord, RecordId};
use crate::ledger::{Account, AccountId, Currency, EntryKind, LedgerEntry};
use crate::market::{ListingId, MarketListing, MarketPage, MarketQuery, MarketService, Purchase};
use crate::minigames::{GameKind, GameRequest, GameResult, GameSession, GameStats, MinigameService};
use crate::random::SharedRandom;
use crate::redemption::{RedemptionOutcome, RedemptionProgress, RedemptionService, WithdrawalRequest};
use crate::store::EconomyStore;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// The economy engine.
pub struct Economy {
    config: EconomyConfig,
    catalog: Arc<Catalog>,
    store: Arc<EconomyStore>,
    events: Arc<EventBuffer>,
    accounts: AccountService,
    containers: ContainerService,
    crafting: CraftingService,
    market: MarketService,
    games: MinigameService,
    redemption: RedemptionService,
}

impl Economy {
    /// Wires every service to an existing store.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `config` fails validation.
    pub fn new(
        config: EconomyConfig,
        catalog: Catalog,
        store: Arc<EconomyStore>,
        random: SharedRandom,
    ) -> EconomyResult<Self> {
        config.validate()?;
        let catalog = Arc::new(catalog);
        let events = Arc::new(EventBuffer::new());

        info!(
            item_types = catalog.item_types().count(),
            containers = catalog.active_containers().count(),
            high_value_items = catalog.high_value_items().count(),
            durable = store.is_durable(),
            "economy engine ready"
        );

        Ok(Self {
            accounts: AccountService::new(Arc::clone(&store), config.rewards.clone(), Arc::clone(&events)),
            containers: ContainerService::new(
                Arc::clone(&store),
                Arc::clone(&catalog),
                random.clone(),
                Arc::clone(&events),
            ),
            crafting: CraftingService::new(Arc::clone(&store), Arc::clone(&catalog), Arc::clone(&events)),
            market: MarketService::new(Arc::clone(&store), config.market.clone(), Arc::clone(&events)),
            games: MinigameService::new(Arc::clone(&store), config.games.clone(), random, Arc::clone(&events)),
            redemption: RedemptionService::new(
                Arc::clone(&store),
                Arc::clone(&catalog),
                config.redemption.clone(),
                Arc::clone(&events),
            ),
            config,
            catalog,
            store,
            events,
        })
    }

    /// Engine over a volatile store.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `config` fails validation.
    pub fn in_memory(
        config: EconomyConfig,
        catalog: Catalog,
        clock: Arc<dyn Clock>,
        random: SharedRandom,
    ) -> EconomyResult<Self> {
        let store = Arc::new(EconomyStore::in_memory(clock, &config.store));
        Self::new(config, catalog, store, random)
    }

    /// Engine over a durable store, replaying the log at `wal_path`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig`, `Storage` or `Corrupted`.
    pub fn open(
        wal_path: impl AsRef<Path>,
        config: EconomyConfig,
        catalog: Catalog,
        clock: Arc<dyn Clock>,
        random: SharedRandom,
    ) -> EconomyResult<Self> {
        let store = Arc::new(EconomyStore::open(wal_path, clock, &config.store)?);
        Self::new(config, catalog, store, random)
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// See [`AccountService::register`].
    pub fn register(&self, identity: &str, referral_code: Option<&str>) -> EconomyResult<Registration> {
        self.accounts.register(identity, referral_code)
    }

    /// Resolves an authenticated identity to its account id.
    pub fn authenticate(&self, identity: &str) -> EconomyResult<AccountId> {
        self.accounts.by_identity(identity).map(|a| a.id)
    }

    /// See [`AccountService::claim_daily`].
    pub fn claim_daily(&self, caller: AccountId) -> EconomyResult<DailyClaim> {
        self.accounts.claim_daily(caller)
    }

    /// See [`AccountService::top_up`].
    pub fn top_up(
        &self,
        account: AccountId,
        currency: Currency,
        amount: u64,
        external_ref: &str,
    ) -> EconomyResult<u64> {
        self.accounts.top_up(account, currency, amount, external_ref)
    }

    /// See [`AccountService::profile`].
    pub fn profile(&self, caller: AccountId) -> EconomyResult<Account> {
        self.accounts.profile(caller)
    }

    /// See [`AccountService::history`].
    pub fn history(
        &self,
        caller: AccountId,
        kind: Option<EntryKind>,
        limit: usize,
    ) -> EconomyResult<Vec<LedgerEntry>> {
        self.accounts.history(caller, kind, limit)
    }

    /// The caller's inventory, newest first.
    pub fn inventory(&self, caller: AccountId) -> EconomyResult<Vec<InventoryRecord>> {
        self.store
            .read(|s| s.records_of(caller).into_iter().cloned().collect())
    }

    // ========================================================================
    // Containers and crafting
    // ========================================================================

    /// See [`ContainerService::open`].
    pub fn open_container(&self, caller: AccountId, container: ContainerId) -> EconomyResult<ContainerOpening> {
        self.containers.open(caller, container)
    }

    /// See [`ContainerService::history`].
    pub fn container_history(&self, caller: AccountId, limit: usize) -> EconomyResult<Vec<LedgerEntry>> {
        self.containers.history(caller, limit)
    }

    /// See [`CraftingService::combine`].
    pub fn combine(&self, caller: AccountId, item_type: ItemTypeId) -> EconomyResult<CombineOutcome> {
        self.crafting.combine(caller, item_type)
    }

    /// See [`CraftingService::progress`].
    pub fn fragment_progress(&self, caller: AccountId) -> EconomyResult<Vec<FragmentProgress>> {
        self.crafting.progress(caller)
    }

    // ========================================================================
    // Market
    // ========================================================================

    /// See [`MarketService::list`].
    pub fn list_item(
        &self,
        caller: AccountId,
        record: RecordId,
        price: u64,
        duration_days: Option<u32>,
    ) -> EconomyResult<MarketListing> {
        self.market.list(caller, record, price, duration_days)
    }

    /// See [`MarketService::buy`].
    pub fn buy_listing(&self, caller: AccountId, listing: ListingId) -> EconomyResult<Purchase> {
        self.market.buy(caller, listing)
    }

    /// See [`MarketService::cancel`].
    pub fn cancel_listing(&self, caller: AccountId, listing: ListingId) -> EconomyResult<MarketListing> {
        self.market.cancel(caller, listing)
    }

    /// See [`MarketService::browse`].
    pub fn browse_market(&self, query: &MarketQuery) -> EconomyResult<MarketPage> {
        self.market.browse(query)
    }

    /// See [`MarketService::my_listings`].
    pub fn my_listings(&self, caller: AccountId) -> EconomyResult<Vec<MarketListing>> {
        self.market.my_listings(caller)
    }

    /// See [`MarketService::expire_stale`].
    pub fn expire_listings(&self) -> EconomyResult<Vec<ListingId>> {
        self.market.expire_stale()
    }

    // ========================================================================
    // Minigames
    // ========================================================================

    /// See [`MinigameService::play`].
    pub fn play(&self, caller: AccountId, request: GameRequest) -> EconomyResult<GameResult> {
        self.games.play(caller, request)
    }

    /// See [`MinigameService::history`].
    pub fn game_history(
        &self,
        caller: AccountId,
        kind: Option<GameKind>,
        limit: usize,
    ) -> EconomyResult<Vec<GameSession>> {
        self.games.history(caller, kind, limit)
    }

    /// See [`MinigameService::stats`].
    pub fn game_stats(&self, caller: AccountId) -> EconomyResult<GameStats> {
        self.games.stats(caller)
    }

    // ========================================================================
    // Redemption
    // ========================================================================

    /// See [`RedemptionService::redeem`].
    pub fn redeem(
        &self,
        caller: AccountId,
        item: HighValueItemId,
        delivery_address: &str,
    ) -> EconomyResult<RedemptionOutcome> {
        self.redemption.redeem(caller, item, delivery_address)
    }

    /// See [`RedemptionService::progress`].
    pub fn redemption_progress(&self, caller: AccountId) -> EconomyResult<RedemptionProgress> {
        self.redemption.progress(caller)
    }

    /// See [`RedemptionService::withdrawals`].
    pub fn withdrawal_history(&self, caller: AccountId) -> EconomyResult<Vec<WithdrawalRequest>> {
        self.redemption.withdrawals(caller)
    }

    // ========================================================================
    // Events and maintenance
    // ========================================================================

    /// Takes every event committed since the last drain.
    pub fn drain_events(&self) -> Vec<EconomyEvent> {
        self.events.drain()
    }

    /// Number of undrained events.
    #[must_use]
    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }

    /// Rewrites the write-ahead log as a snapshot.
    pub fn compact(&self) -> EconomyResult<()> {
        self.store.compact()
    }

    /// The store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<EconomyStore> {
        &self.store
    }

    /// The catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }
}

impl std::fmt::Debug for Economy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Economy")
            .field("store", &self.store)
            .field("pending_events", &self.events.len())
            .finish_non_exhaustive()
    }
}

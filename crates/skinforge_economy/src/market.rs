//! # Market Escrow Service
//!
//! Peer-to-peer trading with the marketplace holding the item in escrow.
//!
//! ## Listing lifecycle
//!
//! ```text
//!            buy                    cancel (seller)       expire_stale()
//! Active ──────────► Sold   Active ───────────► Cancelled  Active ───► Expired
//! ```
//!
//! No other transitions exist, and listings are never deleted.
//!
//! ## Buy
//!
//! The whole purchase runs inside one store transaction. The store lock is
//! held from the "is this listing still active" check to the status flip,
//! so of two racing buyers exactly one sees `Active`; the other gets a
//! clean, retryable `ListingNoLongerActive`.
//!
//! The seller receives `price - floor(price × fee% / 100)`. The fee is not
//! credited to anyone; it shows up only as the difference between the
//! buyer's and seller's journal entries.

use crate::catalog::{ItemTypeId, Rarity};
use crate::config::MarketConfig;
use crate::error::{EconomyError, EconomyResult, Entity};
use crate::events::{EconomyEvent, EventBuffer};
use crate::inventory::{InventoryRecord, RecordId};
use crate::ledger::{AccountId, Currency, Denomination, EntryKind};
use crate::store::{EconomyStore, IdKind, Mutation, StoreState, Txn};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Listing identifier.
pub type ListingId = u64;

/// Listing state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// On sale, item in escrow.
    Active,
    /// Bought; `buyer` is set.
    Sold,
    /// Withdrawn by the seller.
    Cancelled,
    /// Ran past `expires_at` unsold.
    Expired,
}

/// A market listing. Item attributes are copied at listing time so the
/// history stays readable after the record changes hands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketListing {
    /// Listing id.
    pub id: ListingId,
    /// Seller.
    pub seller: AccountId,
    /// Escrowed record.
    pub record_id: RecordId,
    /// Item type of the record.
    pub item_type: Option<ItemTypeId>,
    /// Display name.
    pub item_name: String,
    /// Weapon family.
    pub weapon: Option<String>,
    /// Rarity tier.
    pub rarity: Rarity,
    /// Fragment bundle.
    pub is_fragment: bool,
    /// Fragment count.
    pub fragments: u32,
    /// Asking price in primary currency.
    pub price: u64,
    /// Fee percentage, fixed at listing time.
    pub fee_percent: u8,
    /// Requested duration.
    pub duration_days: u32,
    /// State.
    pub status: ListingStatus,
    /// Buyer, once sold.
    pub buyer: Option<AccountId>,
    /// Listing time.
    pub created_at: DateTime<Utc>,
    /// End of the sale window.
    pub expires_at: DateTime<Utc>,
    /// When the listing left `Active`.
    pub closed_at: Option<DateTime<Utc>>,
}

impl MarketListing {
    /// `Active` and not past its expiry at `now`.
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ListingStatus::Active && now < self.expires_at
    }

    /// `floor(price × fee% / 100)`.
    #[must_use]
    pub fn fee_amount(&self) -> u64 {
        fee_amount(self.price, self.fee_percent)
    }

    /// What the seller receives on sale.
    #[must_use]
    pub fn seller_proceeds(&self) -> u64 {
        self.price - self.fee_amount()
    }
}

/// `floor(price × percent / 100)`.
#[must_use]
pub fn fee_amount(price: u64, percent: u8) -> u64 {
    let fee = u128::from(price) * u128::from(percent) / 100;
    u64::try_from(fee).unwrap_or(price).min(price)
}

/// A completed purchase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Purchase {
    /// The listing, now `Sold`.
    pub listing: MarketListing,
    /// The record, now owned by the buyer.
    pub record: InventoryRecord,
    /// Fee withheld from the seller.
    pub fee: u64,
    /// Amount credited to the seller.
    pub seller_proceeds: u64,
    /// Buyer's primary balance afterwards.
    pub buyer_balance: u64,
}

/// Browse ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSort {
    /// Most recent first.
    #[default]
    Newest,
    /// Oldest first.
    Oldest,
    /// Cheapest first.
    PriceAsc,
    /// Most expensive first.
    PriceDesc,
}

/// Browse filters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarketQuery {
    /// Only this rarity.
    pub rarity: Option<Rarity>,
    /// Lowest price.
    pub min_price: Option<u64>,
    /// Highest price.
    pub max_price: Option<u64>,
    /// Case-insensitive substring of name or weapon.
    pub search: Option<String>,
    /// Ordering.
    pub sort: MarketSort,
    /// 1-based page.
    pub page: usize,
    /// Listings per page (capped by config).
    pub page_size: usize,
}

impl Default for MarketQuery {
    fn default() -> Self {
        Self {
            rarity: None,
            min_price: None,
            max_price: None,
            search: None,
            sort: MarketSort::Newest,
            page: 1,
            page_size: 20,
        }
    }
}

/// Aggregate numbers over open listings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MarketStats {
    /// Open listings.
    pub active_listings: usize,
    /// Sum of their prices.
    pub total_volume: u64,
    /// Mean price, floored.
    pub average_price: u64,
    /// Distinct sellers.
    pub active_sellers: usize,
}

/// One page of browse results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarketPage {
    /// Listings on this page.
    pub listings: Vec<MarketListing>,
    /// Matches across all pages.
    pub total: usize,
    /// Page returned.
    pub page: usize,
    /// Number of pages.
    pub pages: usize,
    /// Market-wide stats (ignores filters).
    pub stats: MarketStats,
}

/// Escrowed peer-to-peer trading.
pub struct MarketService {
    store: Arc<EconomyStore>,
    config: MarketConfig,
    events: Arc<EventBuffer>,
}

impl MarketService {
    /// Wires the service to its collaborators.
    pub fn new(store: Arc<EconomyStore>, config: MarketConfig, events: Arc<EventBuffer>) -> Self {
        Self {
            store,
            config,
            events,
        }
    }

    /// Puts one of the caller's records up for sale.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a price or duration out of bounds or an
    /// untradable item, `NotFound` if the caller does not own the record,
    /// `AlreadyListed` if it is already in escrow.
    pub fn list(
        &self,
        caller: AccountId,
        record_id: RecordId,
        price: u64,
        duration_days: Option<u32>,
    ) -> EconomyResult<MarketListing> {
        let days = duration_days.unwrap_or(self.config.default_duration_days);
        if !(self.config.min_price..=self.config.max_price).contains(&price) {
            return Err(EconomyError::invalid(format!(
                "price must be between {} and {}",
                self.config.min_price, self.config.max_price
            )));
        }
        if !(self.config.min_duration_days..=self.config.max_duration_days).contains(&days) {
            return Err(EconomyError::invalid(format!(
                "duration must be between {} and {} days",
                self.config.min_duration_days, self.config.max_duration_days
            )));
        }
        let fee_percent = self.config.fee_for_duration(days);

        let listing = self
            .store
            .transaction(|txn| {
                let record = txn.owned_record(caller, record_id)?.clone();
                if record.in_escrow {
                    return Err(EconomyError::AlreadyListed { record_id });
                }
                if !record.tradable {
                    return Err(EconomyError::invalid(format!("{} is not tradable", record.name)));
                }

                let now = txn.now();
                let listing = MarketListing {
                    id: txn.next_id(IdKind::Listing),
                    seller: caller,
                    record_id,
                    item_type: record.item_type,
                    item_name: record.name.clone(),
                    weapon: record.weapon.clone(),
                    rarity: record.rarity,
                    is_fragment: record.is_fragment,
                    fragments: record.fragments,
                    price,
                    fee_percent,
                    duration_days: days,
                    status: ListingStatus::Active,
                    buyer: None,
                    created_at: now,
                    expires_at: now + Duration::days(i64::from(days)),
                    closed_at: None,
                };

                txn.put_record(InventoryRecord {
                    in_escrow: true,
                    ..record
                });
                txn.apply(Mutation::PutListing(listing.clone()));
                txn.journal(
                    caller,
                    Denomination::Primary,
                    0,
                    EntryKind::MarketListing,
                    json!({
                        "listing_id": listing.id,
                        "record_id": record_id,
                        "item_name": listing.item_name,
                        "price": price,
                        "fee_percent": fee_percent,
                        "expires_at": listing.expires_at,
                    }),
                )?;
                Ok(listing)
            })
            .map_err(|e| reject("list", caller, e))?;

        info!(account = caller, listing = listing.id, price, fee_percent, "item listed");
        self.events.push(EconomyEvent::ListingCreated {
            seller: caller,
            listing: listing.id,
            price,
        });
        Ok(listing)
    }

    /// Buys a listing for the caller.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown listing, `ListingNoLongerActive` if it was
    /// sold, cancelled or expired first, `SelfTrade` for the seller,
    /// `InsufficientFunds` if the caller cannot pay. Nothing is written on
    /// any failure.
    pub fn buy(&self, caller: AccountId, listing_id: ListingId) -> EconomyResult<Purchase> {
        let purchase = self
            .store
            .transaction(|txn| {
                let listing = listing_in(txn, listing_id)?.clone();
                if !listing.is_open_at(txn.now()) {
                    return Err(EconomyError::ListingNoLongerActive { listing_id });
                }
                if listing.seller == caller {
                    return Err(EconomyError::SelfTrade);
                }

                let fee = listing.fee_amount();
                let proceeds = listing.seller_proceeds();
                let buyer_balance = txn.debit(
                    caller,
                    Currency::Primary,
                    listing.price,
                    EntryKind::MarketBuy,
                    json!({
                        "listing_id": listing_id,
                        "record_id": listing.record_id,
                        "item_name": listing.item_name,
                        "seller": listing.seller,
                        "price": listing.price,
                        "fee": fee,
                    }),
                )?;
                txn.credit(
                    listing.seller,
                    Currency::Primary,
                    proceeds,
                    EntryKind::MarketSell,
                    json!({
                        "listing_id": listing_id,
                        "record_id": listing.record_id,
                        "item_name": listing.item_name,
                        "buyer": caller,
                        "price": listing.price,
                        "fee": fee,
                    }),
                )?;

                let record = txn.record(listing.record_id)?.clone();
                if record.owner != listing.seller || !record.in_escrow {
                    return Err(EconomyError::Corrupted(format!(
                        "listing {listing_id} does not hold record {} in escrow",
                        record.id
                    )));
                }
                let record = InventoryRecord {
                    owner: caller,
                    in_escrow: false,
                    acquired_at: txn.now(),
                    ..record
                };
                txn.put_record(record.clone());

                let listing = MarketListing {
                    status: ListingStatus::Sold,
                    buyer: Some(caller),
                    closed_at: Some(txn.now()),
                    ..listing
                };
                txn.apply(Mutation::PutListing(listing.clone()));

                Ok(Purchase {
                    listing,
                    record,
                    fee,
                    seller_proceeds: proceeds,
                    buyer_balance,
                })
            })
            .map_err(|e| reject("buy", caller, e))?;

        info!(
            buyer = caller,
            seller = purchase.listing.seller,
            listing = listing_id,
            price = purchase.listing.price,
            fee = purchase.fee,
            "listing sold"
        );
        self.events.push(EconomyEvent::ListingSold {
            listing: listing_id,
            seller: purchase.listing.seller,
            buyer: caller,
            price: purchase.listing.price,
            seller_proceeds: purchase.seller_proceeds,
        });
        Ok(purchase)
    }

    /// Withdraws the caller's active listing and releases the escrow.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown listing or one the caller did not create,
    /// `ListingNoLongerActive` if it already closed.
    pub fn cancel(&self, caller: AccountId, listing_id: ListingId) -> EconomyResult<MarketListing> {
        let listing = self
            .store
            .transaction(|txn| {
                let listing = listing_in(txn, listing_id)?.clone();
                if listing.seller != caller {
                    return Err(EconomyError::not_found(Entity::Listing, listing_id));
                }
                if listing.status != ListingStatus::Active {
                    return Err(EconomyError::ListingNoLongerActive { listing_id });
                }

                let closed = close_listing(txn, listing, ListingStatus::Cancelled)?;
                txn.journal(
                    caller,
                    Denomination::Primary,
                    0,
                    EntryKind::MarketCancel,
                    json!({ "listing_id": listing_id, "record_id": closed.record_id }),
                )?;
                Ok(closed)
            })
            .map_err(|e| reject("cancel", caller, e))?;

        info!(account = caller, listing = listing_id, "listing cancelled");
        self.events.push(EconomyEvent::ListingClosed {
            listing: listing_id,
            seller: caller,
            expired: false,
        });
        Ok(listing)
    }

    /// Moves every `Active` listing past its expiry to `Expired` and
    /// returns the items to their sellers.
    ///
    /// # Errors
    ///
    /// `StoreBusy` or `Storage`.
    pub fn expire_stale(&self) -> EconomyResult<Vec<ListingId>> {
        let expired = self.store.transaction(|txn| {
            let now = txn.now();
            let stale: Vec<MarketListing> = txn
                .state()
                .listings
                .values()
                .filter(|l| l.status == ListingStatus::Active && now >= l.expires_at)
                .cloned()
                .collect();

            let mut closed = Vec::with_capacity(stale.len());
            for listing in stale {
                closed.push(close_listing(txn, listing, ListingStatus::Expired)?);
            }
            Ok(closed)
        })?;

        if !expired.is_empty() {
            info!(count = expired.len(), "expired stale listings");
        }
        for listing in &expired {
            self.events.push(EconomyEvent::ListingClosed {
                listing: listing.id,
                seller: listing.seller,
                expired: true,
            });
        }
        Ok(expired.into_iter().map(|l| l.id).collect())
    }

    /// Looks up one listing.
    ///
    /// # Errors
    ///
    /// `NotFound` if unknown.
    pub fn listing(&self, listing_id: ListingId) -> EconomyResult<MarketListing> {
        self.store
            .read(|s| s.listing(listing_id).cloned())?
            .ok_or_else(|| EconomyError::not_found(Entity::Listing, listing_id))
    }

    /// The caller's listings in every state, newest first.
    ///
    /// # Errors
    ///
    /// `StoreBusy` if the store is locked too long.
    pub fn my_listings(&self, caller: AccountId) -> EconomyResult<Vec<MarketListing>> {
        self.store.read(|s| {
            s.listings
                .values()
                .rev()
                .filter(|l| l.seller == caller)
                .cloned()
                .collect()
        })
    }

    /// Filtered, sorted, paginated view of open listings.
    ///
    /// # Errors
    ///
    /// `StoreBusy` if the store is locked too long.
    pub fn browse(&self, query: &MarketQuery) -> EconomyResult<MarketPage> {
        let now = self.store.now();
        let page_size = query.page_size.clamp(1, self.config.max_page_size);
        let page = query.page.max(1);
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        self.store.read(|s| {
            let open: Vec<&MarketListing> = s.listings.values().filter(|l| l.is_open_at(now)).collect();
            let stats = market_stats(&open);

            let mut matches: Vec<&MarketListing> = open
                .into_iter()
                .filter(|l| query.rarity.map_or(true, |r| l.rarity == r))
                .filter(|l| query.min_price.map_or(true, |p| l.price >= p))
                .filter(|l| query.max_price.map_or(true, |p| l.price <= p))
                .filter(|l| {
                    needle.as_ref().map_or(true, |n| {
                        l.item_name.to_lowercase().contains(n)
                            || l.weapon.as_ref().is_some_and(|w| w.to_lowercase().contains(n))
                    })
                })
                .collect();

            match query.sort {
                MarketSort::Newest => matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))),
                MarketSort::Oldest => matches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))),
                MarketSort::PriceAsc => matches.sort_by(|a, b| a.price.cmp(&b.price).then(a.id.cmp(&b.id))),
                MarketSort::PriceDesc => matches.sort_by(|a, b| b.price.cmp(&a.price).then(a.id.cmp(&b.id))),
            }

            let total = matches.len();
            let pages = total.div_ceil(page_size);
            let listings = matches
                .into_iter()
                .skip((page - 1).saturating_mul(page_size))
                .take(page_size)
                .cloned()
                .collect();

            MarketPage {
                listings,
                total,
                page,
                pages,
                stats,
            }
        })
    }
}

fn listing_in<'t>(txn: &'t Txn<'_>, listing_id: ListingId) -> EconomyResult<&'t MarketListing> {
    txn.state()
        .listings
        .get(&listing_id)
        .ok_or_else(|| EconomyError::not_found(Entity::Listing, listing_id))
}

/// Moves an active listing to a terminal non-sale state and releases the
/// escrow flag on its record.
fn close_listing(txn: &mut Txn<'_>, listing: MarketListing, status: ListingStatus) -> EconomyResult<MarketListing> {
    if let Some(record) = txn.state().record(listing.record_id).cloned() {
        if record.owner == listing.seller && record.in_escrow {
            txn.put_record(InventoryRecord {
                in_escrow: false,
                ..record
            });
        }
    }
    let closed = MarketListing {
        status,
        closed_at: Some(txn.now()),
        ..listing
    };
    txn.apply(Mutation::PutListing(closed.clone()));
    Ok(closed)
}

fn market_stats(open: &[&MarketListing]) -> MarketStats {
    let total_volume: u64 = open.iter().map(|l| l.price).fold(0, u64::saturating_add);
    let sellers: BTreeSet<AccountId> = open.iter().map(|l| l.seller).collect();
    MarketStats {
        active_listings: open.len(),
        total_volume,
        average_price: if open.is_empty() {
            0
        } else {
            total_volume / open.len() as u64
        },
        active_sellers: sellers.len(),
    }
}

fn reject(operation: &'static str, caller: AccountId, error: EconomyError) -> EconomyError {
    debug!(operation, account = caller, error = %error, "market request rejected");
    error
}

impl StoreState {
    /// Looks up a listing.
    #[must_use]
    pub fn listing(&self, id: ListingId) -> Option<&MarketListing> {
        self.listings.get(&id)
    }
}

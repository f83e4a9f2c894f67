//! # Fragment Redemption
//!
//! Spends the caller's whole fragment pool on a high-value item that is
//! delivered outside the system.
//!
//! The pool is every spendable fragment record, typed or generic, not just
//! fragments of the target. A successful redemption consumes all of it,
//! surplus included, queues a [`WithdrawalRequest`] at `Pending` and
//! journals the fragments spent as a negative amount. Fulfilment is manual
//! and happens outside this crate.

use crate::catalog::{Catalog, HighValueItemId};
use crate::config::RedemptionConfig;
use crate::error::{EconomyError, EconomyResult};
use crate::events::{EconomyEvent, EventBuffer};
use crate::inventory::{clamp_fragments, FragmentScope};
use crate::ledger::{AccountId, Denomination, EntryKind};
use crate::store::{EconomyStore, IdKind, Mutation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Withdrawal request identifier.
pub type WithdrawalId = u64;

/// Administrative state of a withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    /// Waiting for an administrator.
    Pending,
    /// Being fulfilled.
    Processing,
    /// Delivered.
    Completed,
    /// Refused.
    Rejected,
}

/// A queued redemption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Request id.
    pub id: WithdrawalId,
    /// Requesting account.
    pub requester: AccountId,
    /// Target item.
    pub item: HighValueItemId,
    /// Target item name at request time.
    pub item_name: String,
    /// Fragments the item costs.
    pub fragments_required: u32,
    /// Fragments actually consumed (the whole pool).
    pub fragments_consumed: u64,
    /// Where to deliver.
    pub delivery_address: String,
    /// Administrative state.
    pub status: WithdrawalStatus,
    /// Free text left by an administrator.
    pub admin_notes: Option<String>,
    /// When the request was made.
    pub created_at: DateTime<Utc>,
}

/// Result of a redemption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedemptionOutcome {
    /// The queued request.
    pub request: WithdrawalRequest,
    /// Fragments the caller still holds (those in escrow).
    pub remaining_fragments: u64,
}

/// Whether the pool covers one high-value item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedemptionTarget {
    /// Item.
    pub item: HighValueItemId,
    /// Item name.
    pub name: String,
    /// Fragments required.
    pub required: u32,
    /// Whether the pool covers it.
    pub affordable: bool,
    /// Fragments still missing.
    pub missing: u64,
}

/// The caller's pool against every high-value item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedemptionProgress {
    /// Spendable fragments held.
    pub total_fragments: u64,
    /// One entry per catalog item, in id order.
    pub targets: Vec<RedemptionTarget>,
}

/// Turns fragment pools into withdrawal requests.
pub struct RedemptionService {
    store: Arc<EconomyStore>,
    catalog: Arc<Catalog>,
    config: RedemptionConfig,
    events: Arc<EventBuffer>,
}

impl RedemptionService {
    /// Wires the service to its collaborators.
    pub fn new(
        store: Arc<EconomyStore>,
        catalog: Arc<Catalog>,
        config: RedemptionConfig,
        events: Arc<EventBuffer>,
    ) -> Self {
        Self {
            store,
            catalog,
            config,
            events,
        }
    }

    fn validate_address(&self, address: &str) -> EconomyResult<String> {
        let address = address.trim();
        if address.is_empty() || address.len() > self.config.max_address_len {
            return Err(EconomyError::invalid(format!(
                "delivery address must be 1..={} characters",
                self.config.max_address_len
            )));
        }
        if !address.contains(self.config.address_marker.as_str()) {
            return Err(EconomyError::invalid("delivery address is not a trade offer link"));
        }
        Ok(address.to_string())
    }

    /// Redeems the caller's fragment pool for `item_id`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a malformed address or an untradeable item,
    /// `NotFound` for an unknown item or caller, `InsufficientFragments`
    /// if the pool is short.
    pub fn redeem(
        &self,
        caller: AccountId,
        item_id: HighValueItemId,
        address: &str,
    ) -> EconomyResult<RedemptionOutcome> {
        let outcome = self.try_redeem(caller, item_id, address).map_err(|e| {
            debug!(account = caller, item = item_id, error = %e, "redemption rejected");
            e
        })?;

        info!(
            account = caller,
            item = item_id,
            withdrawal = outcome.request.id,
            consumed = outcome.request.fragments_consumed,
            "redemption requested"
        );
        self.events.push(EconomyEvent::RedemptionRequested {
            account: caller,
            withdrawal: outcome.request.id,
            item: item_id,
        });
        Ok(outcome)
    }

    fn try_redeem(
        &self,
        caller: AccountId,
        item_id: HighValueItemId,
        address: &str,
    ) -> EconomyResult<RedemptionOutcome> {
        let address = self.validate_address(address)?;
        let item = self.catalog.high_value_item(item_id)?;
        if !item.tradeable {
            return Err(EconomyError::invalid(format!("{} cannot be redeemed", item.name)));
        }
        let required = item.fragments_required;

        self.store.transaction(|txn| {
            txn.account(caller)?;
            let current = txn.state().fragment_total(caller, FragmentScope::All);
            if current < u64::from(required) {
                return Err(EconomyError::InsufficientFragments {
                    required,
                    current: clamp_fragments(current),
                });
            }

            let consumed = txn.consume_fragments(caller, FragmentScope::All);
            let request = WithdrawalRequest {
                id: txn.next_id(IdKind::Withdrawal),
                requester: caller,
                item: item_id,
                item_name: item.name.clone(),
                fragments_required: required,
                fragments_consumed: consumed.fragments,
                delivery_address: address,
                status: WithdrawalStatus::Pending,
                admin_notes: None,
                created_at: txn.now(),
            };
            txn.apply(Mutation::PutWithdrawal(request.clone()));

            let spent = i64::try_from(consumed.fragments).map_err(|_| EconomyError::ArithmeticOverflow)?;
            txn.journal(
                caller,
                Denomination::Fragments,
                -spent,
                EntryKind::Withdrawal,
                json!({
                    "withdrawal_id": request.id,
                    "item_id": item_id,
                    "item_name": item.name,
                    "fragments_required": required,
                    "fragments_forfeited": consumed.fragments - u64::from(required),
                    "consumed_records": consumed.records,
                }),
            )?;

            let remaining_fragments = txn
                .state()
                .records_of(caller)
                .iter()
                .filter(|r| r.is_fragment)
                .map(|r| u64::from(r.fragments))
                .sum();
            Ok(RedemptionOutcome {
                request,
                remaining_fragments,
            })
        })
    }

    /// The caller's pool against every high-value item.
    ///
    /// # Errors
    ///
    /// `StoreBusy` if the store is locked too long.
    pub fn progress(&self, caller: AccountId) -> EconomyResult<RedemptionProgress> {
        let total = self
            .store
            .read(|s| s.fragment_total(caller, FragmentScope::All))?;
        let targets = self
            .catalog
            .high_value_items()
            .map(|item| {
                let required = u64::from(item.fragments_required);
                RedemptionTarget {
                    item: item.id,
                    name: item.name.clone(),
                    required: item.fragments_required,
                    affordable: item.tradeable && total >= required,
                    missing: required.saturating_sub(total),
                }
            })
            .collect();
        Ok(RedemptionProgress {
            total_fragments: total,
            targets,
        })
    }

    /// The caller's withdrawal requests, newest first.
    ///
    /// # Errors
    ///
    /// `StoreBusy` if the store is locked too long.
    pub fn withdrawals(&self, caller: AccountId) -> EconomyResult<Vec<WithdrawalRequest>> {
        self.store.read(|s| {
            s.withdrawals
                .values()
                .rev()
                .filter(|w| w.requester == caller)
                .cloned()
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{HighValueItem, ItemType, Rarity};
    use crate::clock::SystemClock;
    use crate::config::{CatalogConfig, StoreConfig};
    use crate::fixed_point::FixedPoint;
    use crate::inventory::NewRecord;
    use crate::store::StoreState;

    const ADDRESS: &str = "https://steamcommunity.com/tradeoffer/new/?partner=1&token=abc";

    fn knife(id: u32, required: u32, tradeable: bool) -> HighValueItem {
        HighValueItem {
            id,
            name: format!("Karambit #{id}"),
            weapon: Some("Karambit".to_string()),
            rarity: Rarity::Covert,
            external_price: FixedPoint::from_whole(1_500),
            fragments_required: required,
            tradeable,
            image_url: None,
        }
    }

    fn glock() -> ItemType {
        ItemType {
            id: 1,
            name: "Glock-18 | Fade".to_string(),
            weapon: Some("Glock-18".to_string()),
            rarity: Rarity::Restricted,
            price: FixedPoint::from_whole(30),
            fragments_required: 5,
            tradable: true,
            image_url: None,
        }
    }

    fn setup() -> (RedemptionService, Arc<EconomyStore>, AccountId) {
        let catalog = Catalog::build(
            vec![glock()],
            vec![],
            vec![knife(1, 10, true), knife(2, 3, false), knife(3, 50, true)],
            &CatalogConfig::default(),
        )
        .unwrap();
        let store = Arc::new(EconomyStore::in_memory(Arc::new(SystemClock), &StoreConfig::default()));
        let caller = store
            .transaction(|txn| {
                let id = txn.open_account("redeemer", None)?.id;
                txn.insert_record(NewRecord::generic_fragments(id, 6))?;
                txn.insert_record(NewRecord::fragments_of(id, &glock(), 6))?;
                txn.insert_record(NewRecord::whole_item(id, &glock()))?;
                Ok(id)
            })
            .unwrap();
        let service = RedemptionService::new(
            Arc::clone(&store),
            Arc::new(catalog),
            RedemptionConfig::default(),
            Arc::new(EventBuffer::new()),
        );
        (service, store, caller)
    }

    #[test]
    fn test_redeem_consumes_whole_pool() {
        let (service, store, caller) = setup();
        let outcome = service.redeem(caller, 1, ADDRESS).unwrap();

        assert_eq!(outcome.request.status, WithdrawalStatus::Pending);
        assert_eq!(outcome.request.fragments_consumed, 12);
        assert_eq!(outcome.remaining_fragments, 0);

        store
            .read(|s| {
                let records = s.records_of(caller);
                assert_eq!(records.len(), 1);
                assert!(!records[0].is_fragment);

                let entry = &s.history(caller, Some(EntryKind::Withdrawal), 1)[0];
                assert_eq!(entry.denomination, Denomination::Fragments);
                assert_eq!(entry.amount, -12);
                assert_eq!(entry.metadata["fragments_forfeited"], 2);
            })
            .unwrap();
        assert_eq!(service.withdrawals(caller).unwrap().len(), 1);
    }

    #[test]
    fn test_short_pool_reports_counts() {
        let (service, store, caller) = setup();
        let before = store.read(StoreState::journal_len).unwrap();

        assert_eq!(
            service.redeem(caller, 3, ADDRESS).unwrap_err(),
            EconomyError::InsufficientFragments { required: 50, current: 12 }
        );
        assert_eq!(store.read(StoreState::journal_len).unwrap(), before);
        assert_eq!(store.read(|s| s.fragment_total(caller, FragmentScope::All)).unwrap(), 12);
    }

    #[test]
    fn test_address_and_item_validation() {
        let (service, _, caller) = setup();
        assert!(matches!(
            service.redeem(caller, 1, "https://example.com/trade"),
            Err(EconomyError::InvalidArgument(_))
        ));
        let long = format!("{ADDRESS}{}", "x".repeat(600));
        assert!(matches!(service.redeem(caller, 1, &long), Err(EconomyError::InvalidArgument(_))));
        assert!(matches!(service.redeem(caller, 2, ADDRESS), Err(EconomyError::InvalidArgument(_))));
        assert!(matches!(service.redeem(caller, 9, ADDRESS), Err(EconomyError::NotFound { .. })));
    }

    #[test]
    fn test_progress() {
        let (service, _, caller) = setup();
        let progress = service.progress(caller).unwrap();
        assert_eq!(progress.total_fragments, 12);
        assert_eq!(progress.targets.len(), 3);
        assert!(progress.targets[0].affordable);
        assert!(!progress.targets[1].affordable);
        assert_eq!(progress.targets[2].missing, 38);
    }
}

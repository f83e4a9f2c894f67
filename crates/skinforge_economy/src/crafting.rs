//! # Fragment Crafting
//!
//! **All fragments in, one item out.**
//!
//! 1. **Threshold**: the caller's spendable fragments of the target type
//!    must reach the type's `fragments_required`.
//! 2. **All-or-nothing**: below the threshold nothing changes. At or above
//!    it, every fragment record of that type is consumed, including any
//!    surplus, and exactly one whole item is created.
//! 3. **Retry-safe**: a retry after a successful combine finds no fragments
//!    and fails with `InsufficientFragments` instead of crafting twice.
//!
//! Fragments held in escrow by a market listing are neither counted nor
//! consumed.

use crate::catalog::{Catalog, ItemTypeId};
use crate::error::{EconomyError, EconomyResult};
use crate::events::{EconomyEvent, EventBuffer};
use crate::inventory::{clamp_fragments, FragmentScope, InventoryRecord, NewRecord};
use crate::ledger::{AccountId, Denomination, EntryKind};
use crate::store::EconomyStore;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a successful combine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CombineOutcome {
    /// The crafted item.
    pub record: InventoryRecord,
    /// Fragments the item type requires.
    pub fragments_required: u32,
    /// Fragments actually consumed.
    pub fragments_consumed: u64,
    /// Surplus lost to the all-or-nothing rule.
    pub fragments_forfeited: u64,
}

/// Collection progress towards one item type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FragmentProgress {
    /// Item type.
    pub item_type: ItemTypeId,
    /// Display name.
    pub name: String,
    /// Spendable fragments held.
    pub collected: u64,
    /// Fragments needed.
    pub required: u32,
    /// Whether a combine would succeed now.
    pub can_combine: bool,
}

/// Combines fragments into finished items.
pub struct CraftingService {
    store: Arc<EconomyStore>,
    catalog: Arc<Catalog>,
    events: Arc<EventBuffer>,
}

impl CraftingService {
    /// Wires the service to its collaborators.
    pub fn new(store: Arc<EconomyStore>, catalog: Arc<Catalog>, events: Arc<EventBuffer>) -> Self {
        Self {
            store,
            catalog,
            events,
        }
    }

    /// Combines the caller's fragments of `item_type_id` into one item.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown item type or caller,
    /// `InsufficientFragments` below the threshold.
    pub fn combine(&self, caller: AccountId, item_type_id: ItemTypeId) -> EconomyResult<CombineOutcome> {
        let item_type = self.catalog.item_type(item_type_id)?;
        let required = item_type.fragments_required;
        let scope = FragmentScope::ItemType(item_type_id);

        let outcome = self.store.transaction(|txn| {
            txn.account(caller)?;
            let current = txn.state().fragment_total(caller, scope);
            if current < u64::from(required) {
                return Err(EconomyError::InsufficientFragments {
                    required,
                    current: clamp_fragments(current),
                });
            }

            let consumed = txn.consume_fragments(caller, scope);
            let record = txn.insert_record(NewRecord::whole_item(caller, item_type))?;
            let forfeited = consumed.fragments - u64::from(required);

            txn.journal(
                caller,
                Denomination::Primary,
                0,
                EntryKind::Combine,
                json!({
                    "item_type": item_type_id,
                    "item_name": item_type.name,
                    "fragments_required": required,
                    "fragments_used": consumed.fragments,
                    "fragments_forfeited": forfeited,
                    "consumed_records": consumed.records,
                    "new_record": record.id,
                }),
            )?;

            Ok(CombineOutcome {
                record,
                fragments_required: required,
                fragments_consumed: consumed.fragments,
                fragments_forfeited: forfeited,
            })
        });

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(account = caller, item_type = item_type_id, error = %e, "combine rejected");
                return Err(e);
            }
        };

        info!(
            account = caller,
            item_type = item_type_id,
            consumed = outcome.fragments_consumed,
            forfeited = outcome.fragments_forfeited,
            "fragments combined"
        );
        self.events.push(EconomyEvent::ItemCombined {
            account: caller,
            item_type: item_type_id,
            record: outcome.record.id,
        });
        Ok(outcome)
    }

    /// Progress towards every item type the caller holds fragments of.
    ///
    /// # Errors
    ///
    /// `StoreBusy` if the store is locked too long.
    pub fn progress(&self, caller: AccountId) -> EconomyResult<Vec<FragmentProgress>> {
        let totals: BTreeMap<ItemTypeId, u64> = self.store.read(|s| {
            let mut totals = BTreeMap::new();
            for record in s.spendable_fragments(caller, FragmentScope::All) {
                if let Some(item_type) = record.item_type {
                    *totals.entry(item_type).or_insert(0) += u64::from(record.fragments);
                }
            }
            totals
        })?;

        Ok(totals
            .into_iter()
            .filter_map(|(id, collected)| {
                let item_type = self.catalog.item_type(id).ok()?;
                Some(FragmentProgress {
                    item_type: id,
                    name: item_type.name.clone(),
                    collected,
                    required: item_type.fragments_required,
                    can_combine: collected >= u64::from(item_type.fragments_required),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ItemType, Rarity};
    use crate::clock::SystemClock;
    use crate::config::{CatalogConfig, StoreConfig};
    use crate::fixed_point::FixedPoint;
    use crate::store::StoreState;

    fn setup() -> (CraftingService, Arc<EconomyStore>, AccountId) {
        let item = ItemType {
            id: 3,
            name: "M4A4 | Howl".to_string(),
            weapon: Some("M4A4".to_string()),
            rarity: Rarity::Contraband,
            price: FixedPoint::from_whole(900),
            fragments_required: 5,
            tradable: true,
            image_url: None,
        };
        let catalog = Arc::new(
            Catalog::build(vec![item], vec![], vec![], &CatalogConfig::default()).unwrap(),
        );
        let store = Arc::new(EconomyStore::in_memory(Arc::new(SystemClock), &StoreConfig::default()));
        let caller = store
            .transaction(|txn| Ok(txn.open_account("crafter", None)?.id))
            .unwrap();
        let service = CraftingService::new(Arc::clone(&store), catalog, Arc::new(EventBuffer::new()));
        (service, store, caller)
    }

    fn give(store: &EconomyStore, catalog_item: &ItemType, owner: AccountId, counts: &[u32]) {
        store
            .transaction(|txn| {
                for &count in counts {
                    txn.insert_record(NewRecord::fragments_of(owner, catalog_item, count))?;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_below_threshold_changes_nothing() {
        let (service, store, caller) = setup();
        let item = service.catalog.item_type(3).unwrap().clone();
        give(&store, &item, caller, &[1, 3]);
        let journal_before = store.read(StoreState::journal_len).unwrap();

        let err = service.combine(caller, 3).unwrap_err();
        assert_eq!(err, EconomyError::InsufficientFragments { required: 5, current: 4 });

        store
            .read(|s| {
                assert_eq!(s.records_of(caller).len(), 2);
                assert_eq!(s.journal_len(), journal_before);
            })
            .unwrap();
    }

    #[test]
    fn test_surplus_is_forfeited() {
        let (service, store, caller) = setup();
        let item = service.catalog.item_type(3).unwrap().clone();
        give(&store, &item, caller, &[4, 3]);

        let outcome = service.combine(caller, 3).unwrap();
        assert_eq!(outcome.fragments_consumed, 7);
        assert_eq!(outcome.fragments_forfeited, 2);
        assert!(!outcome.record.is_fragment);
        assert_eq!(outcome.record.valuation, FixedPoint::from_whole(900));

        store
            .read(|s| {
                let records = s.records_of(caller);
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].id, outcome.record.id);

                let entry = &s.history(caller, Some(EntryKind::Combine), 1)[0];
                assert_eq!(entry.amount, 0);
                assert_eq!(entry.metadata["fragments_forfeited"], 2);
            })
            .unwrap();
    }

    #[test]
    fn test_retry_after_success_reports_shortfall() {
        let (service, store, caller) = setup();
        let item = service.catalog.item_type(3).unwrap().clone();
        give(&store, &item, caller, &[5]);

        service.combine(caller, 3).unwrap();
        assert_eq!(
            service.combine(caller, 3).unwrap_err(),
            EconomyError::InsufficientFragments { required: 5, current: 0 }
        );
    }

    #[test]
    fn test_progress_reports_per_type() {
        let (service, store, caller) = setup();
        let item = service.catalog.item_type(3).unwrap().clone();
        give(&store, &item, caller, &[2, 2]);

        let progress = service.progress(caller).unwrap();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].collected, 4);
        assert!(!progress[0].can_combine);
    }

    #[test]
    fn test_unknown_item_type() {
        let (service, _, caller) = setup();
        assert!(matches!(service.combine(caller, 404), Err(EconomyError::NotFound { .. })));
    }
}

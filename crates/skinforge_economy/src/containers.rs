//! # Container Opening Service
//!
//! ```text
//! open(caller, container)
//!   │
//!   ├─ catalog: active container?              ── NotFound
//!   ├─ reward table empty?                     ── EmptyRewardTable (logged as error)
//!   │
//!   └─ transaction ─────────────────────────────────────────────
//!        ├─ balance ≥ price?                   ── InsufficientFunds
//!        ├─ distributor draw (shared RNG)
//!        ├─ materialize: record | fragments | coins
//!        └─ debit price + journal "container_open" (zero-amount if free)
//! ```

use crate::catalog::{Catalog, ContainerId, DropGrant, Rarity};
use crate::error::{EconomyError, EconomyResult};
use crate::events::{EconomyEvent, EventBuffer};
use crate::inventory::{InventoryRecord, NewRecord};
use crate::ledger::{AccountId, Currency, EntryKind, LedgerEntry};
use crate::random::SharedRandom;
use crate::store::EconomyStore;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Result of opening a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerOpening {
    /// Container opened.
    pub container: ContainerId,
    /// Drop id selected from the reward table.
    pub drop_id: u32,
    /// New inventory record, unless the drop was pure currency.
    pub record: Option<InventoryRecord>,
    /// Primary currency granted by a currency drop.
    pub coins_awarded: u64,
    /// Price charged.
    pub price_paid: u64,
    /// Currency the price was charged in.
    pub currency: Currency,
    /// Caller's balance in that currency after the open.
    pub balance: u64,
    /// Human-readable outcome.
    pub description: String,
}

/// Opens loot containers.
pub struct ContainerService {
    store: Arc<EconomyStore>,
    catalog: Arc<Catalog>,
    random: SharedRandom,
    events: Arc<EventBuffer>,
}

impl ContainerService {
    /// Wires the service to its collaborators.
    pub fn new(
        store: Arc<EconomyStore>,
        catalog: Arc<Catalog>,
        random: SharedRandom,
        events: Arc<EventBuffer>,
    ) -> Self {
        Self {
            store,
            catalog,
            random,
            events,
        }
    }

    /// Opens `container_id` for `caller`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown or inactive container or an unknown
    /// caller, `EmptyRewardTable` for a container without drops,
    /// `InsufficientFunds` if the caller cannot pay.
    pub fn open(
        &self,
        caller: AccountId,
        container_id: ContainerId,
    ) -> EconomyResult<ContainerOpening> {
        let container = self.catalog.active_container(container_id)?;
        if container.drops.is_empty() {
            error!(
                container = container_id,
                name = %container.name,
                "refusing to open container with an empty reward table"
            );
            return Err(EconomyError::EmptyRewardTable { container_id });
        }

        let table = container.reward_table();
        let price = container.effective_price();
        let currency = container.currency;

        let (opening, rarity) = self
            .store
            .transaction(|txn| {
                let current = txn.account(caller)?.balance(currency);
                if current < price {
                    return Err(EconomyError::InsufficientFunds {
                        currency,
                        required: price,
                        current,
                    });
                }

                let drop = self
                    .random
                    .with(|rng| table.select(rng).copied())
                    .ok_or(EconomyError::EmptyRewardTable { container_id })?;

                let grant = self.catalog.resolve_drop(drop)?;
                let (record, coins, description, rarity) = match grant {
                    DropGrant::Item(item) => {
                        let record = txn.insert_record(NewRecord::whole_item(caller, item))?;
                        let text = format!("You got {} ({})!", item.name, item.rarity);
                        (Some(record), 0, text, Some(item.rarity))
                    }
                    DropGrant::Fragments(item, count) => {
                        let record =
                            txn.insert_record(NewRecord::fragments_of(caller, item, count))?;
                        let text = format!(
                            "You got {count} fragment(s) of {}. Collect {} to combine.",
                            item.name, item.fragments_required
                        );
                        (Some(record), 0, text, Some(item.rarity))
                    }
                    DropGrant::GenericFragments(count) => {
                        let record =
                            txn.insert_record(NewRecord::generic_fragments(caller, count))?;
                        let text = format!("You got {count} fragment(s) for redemption.");
                        (Some(record), 0, text, None::<Rarity>)
                    }
                    DropGrant::Coins(coins) => {
                        (None, coins, format!("You got {coins} coins!"), None)
                    }
                };

                let metadata = json!({
                    "container_id": container.id,
                    "container_name": container.name,
                    "container_kind": container.kind,
                    "drop_id": drop.id,
                    "item_type": drop.item_type,
                    "item_name": record.as_ref().map(|r| r.name.clone()),
                    "rarity": rarity,
                    "is_fragment": drop.is_fragment,
                    "fragments": record.as_ref().map_or(0, |r| r.fragments),
                    "coins": coins,
                });

                let mut balance = if price > 0 {
                    txn.debit(caller, currency, price, EntryKind::ContainerOpen, metadata.clone())?
                } else {
                    txn.journal(
                        caller,
                        currency.into(),
                        0,
                        EntryKind::ContainerOpen,
                        metadata.clone(),
                    )?;
                    current
                };
                if coins > 0 {
                    let primary = txn.credit(
                        caller,
                        Currency::Primary,
                        coins,
                        EntryKind::ContainerOpen,
                        metadata,
                    )?;
                    if currency == Currency::Primary {
                        balance = primary;
                    }
                }

                Ok((
                    ContainerOpening {
                        container: container_id,
                        drop_id: drop.id,
                        record,
                        coins_awarded: coins,
                        price_paid: price,
                        currency,
                        balance,
                        description,
                    },
                    rarity,
                ))
            })
            .map_err(|e| {
                debug!(
                    account = caller,
                    container = container_id,
                    error = %e,
                    "container open rejected"
                );
                e
            })?;

        info!(
            account = caller,
            container = container_id,
            drop = opening.drop_id,
            price,
            "container opened"
        );
        self.events.push(EconomyEvent::ContainerOpened {
            account: caller,
            container: container_id,
            description: opening.description.clone(),
            rarity,
        });
        Ok(opening)
    }

    /// The caller's container openings, newest first.
    ///
    /// # Errors
    ///
    /// `StoreBusy` if the store is locked too long.
    pub fn history(&self, caller: AccountId, limit: usize) -> EconomyResult<Vec<LedgerEntry>> {
        self.store
            .read(|s| s.history(caller, Some(EntryKind::ContainerOpen), limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Container, ContainerKind, ItemType, RewardTableEntry};
    use crate::clock::SystemClock;
    use crate::config::{CatalogConfig, StoreConfig};
    use crate::fixed_point::FixedPoint;
    use crate::random::ScriptedSource;
    use crate::store::StoreState;

    fn item(id: u32, name: &str) -> ItemType {
        ItemType {
            id,
            name: name.to_string(),
            weapon: None,
            rarity: Rarity::MilSpec,
            price: FixedPoint::from_whole(10),
            fragments_required: 5,
            tradable: true,
            image_url: None,
        }
    }

    fn entry(id: u32, item_type: Option<u32>, probability: f64) -> RewardTableEntry {
        RewardTableEntry {
            id,
            item_type,
            probability,
            is_fragment: false,
            fragments: 1,
            coins: 0,
        }
    }

    fn catalog() -> Catalog {
        let containers = vec![
            Container {
                id: 1,
                name: "Free Case".to_string(),
                kind: ContainerKind::Ad,
                price: 0,
                currency: Currency::Primary,
                active: true,
                drops: vec![entry(1, Some(1), 0.5), entry(2, Some(2), 0.5)],
            },
            Container {
                id: 2,
                name: "Paid Case".to_string(),
                kind: ContainerKind::Standard,
                price: 100,
                currency: Currency::Primary,
                active: true,
                drops: vec![
                    RewardTableEntry { is_fragment: true, fragments: 2, ..entry(1, Some(1), 0.6) },
                    RewardTableEntry { coins: 40, ..entry(2, None, 0.4) },
                ],
            },
            Container {
                id: 3,
                name: "Broken Case".to_string(),
                kind: ContainerKind::Standard,
                price: 10,
                currency: Currency::Primary,
                active: true,
                drops: vec![],
            },
        ];
        Catalog::build(
            vec![item(1, "A"), item(2, "B")],
            containers,
            vec![],
            &CatalogConfig::default(),
        )
        .unwrap()
    }

    fn service(draws: Vec<f64>) -> (ContainerService, Arc<EconomyStore>, AccountId) {
        let store = Arc::new(EconomyStore::in_memory(
            Arc::new(SystemClock),
            &StoreConfig::default(),
        ));
        let caller = store
            .transaction(|txn| Ok(txn.open_account("opener", None)?.id))
            .unwrap();
        let service = ContainerService::new(
            Arc::clone(&store),
            Arc::new(catalog()),
            SharedRandom::new(ScriptedSource::new(draws)),
            Arc::new(EventBuffer::new()),
        );
        (service, store, caller)
    }

    #[test]
    fn test_free_container_draw_selects_first() {
        let (service, store, caller) = service(vec![0.3]);
        let opening = service.open(caller, 1).unwrap();

        let record = opening.record.unwrap();
        assert_eq!(record.name, "A");
        assert_eq!(opening.balance, 0);
        assert_eq!(opening.price_paid, 0);

        let history = service.history(caller, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].amount, 0);
        assert_eq!(history[0].metadata["drop_id"], 1);
        assert_eq!(history[0].metadata["is_fragment"], false);
        assert_eq!(store.read(|s| s.records_of(caller).len()).unwrap(), 1);
    }

    #[test]
    fn test_paid_container_debits_and_grants_fragments() {
        let (service, store, caller) = service(vec![0.1]);
        store
            .transaction(|txn| {
                txn.credit(caller, Currency::Primary, 150, EntryKind::TopUp, json!({}))
            })
            .unwrap();

        let opening = service.open(caller, 2).unwrap();
        assert_eq!(opening.balance, 50);
        let record = opening.record.unwrap();
        assert!(record.is_fragment);
        assert_eq!(record.fragments, 2);
        assert!(opening.description.contains("fragment"));
    }

    #[test]
    fn test_coin_drop_credits_primary() {
        let (service, store, caller) = service(vec![0.9]);
        store
            .transaction(|txn| {
                txn.credit(caller, Currency::Primary, 100, EntryKind::TopUp, json!({}))
            })
            .unwrap();

        let opening = service.open(caller, 2).unwrap();
        assert!(opening.record.is_none());
        assert_eq!(opening.coins_awarded, 40);
        assert_eq!(opening.balance, 40);
        assert_eq!(service.history(caller, 10).unwrap().len(), 2);
    }

    #[test]
    fn test_insufficient_funds_changes_nothing() {
        let (service, store, caller) = service(vec![0.1]);
        let before = store.read(StoreState::journal_len).unwrap();

        let err = service.open(caller, 2).unwrap_err();
        assert_eq!(
            err,
            EconomyError::InsufficientFunds {
                currency: Currency::Primary,
                required: 100,
                current: 0,
            }
        );
        store
            .read(|s| {
                assert_eq!(s.journal_len(), before);
                assert!(s.records_of(caller).is_empty());
            })
            .unwrap();
    }

    #[test]
    fn test_empty_table_and_unknown_container() {
        let (service, _, caller) = service(vec![0.1]);
        assert_eq!(
            service.open(caller, 3).unwrap_err(),
            EconomyError::EmptyRewardTable { container_id: 3 }
        );
        assert!(matches!(service.open(caller, 99), Err(EconomyError::NotFound { .. })));
    }
}

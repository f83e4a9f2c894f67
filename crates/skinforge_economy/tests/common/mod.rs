//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use serde_json::json;
use skinforge_economy::inventory::NewRecord;
use skinforge_economy::{
    AccountId, Catalog, Currency, Economy, EconomyConfig, EntryKind, RandomSource, RecordId,
    ScriptedSource, SeededSource, SharedRandom, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;

pub const CATALOG: &str = r#"
    [[item_types]]
    id = 1
    name = "AK-47 | Redline"
    weapon = "AK-47"
    rarity = "classified"
    price = "45.50"
    fragments_required = 5

    [[item_types]]
    id = 2
    name = "Glock-18 | Candy Apple"
    weapon = "Glock-18"
    rarity = "mil-spec"
    price = "1.20"
    fragments_required = 3

    [[item_types]]
    id = 3
    name = "USP-S | Cortex"
    weapon = "USP-S"
    rarity = "restricted"
    price = "4.80"
    fragments_required = 3

    [[containers]]
    id = 1
    name = "Free Case"
    kind = "ad"
    drops = [
        { id = 1, item_type = 2, probability = 0.5 },
        { id = 2, item_type = 3, probability = 0.5 },
    ]

    [[containers]]
    id = 2
    name = "Classic Case"
    price = 100
    drops = [
        { id = 1, item_type = 1, probability = 0.7, is_fragment = true },
        { id = 2, item_type = 1, probability = 0.1 },
        { id = 3, probability = 0.2, is_fragment = true, fragments = 2 },
    ]

    [[containers]]
    id = 3
    name = "Broken Case"
    price = 10

    [[high_value_items]]
    id = 1
    name = "Karambit | Fade"
    weapon = "Karambit"
    rarity = "covert"
    external_price = "1400.00"
    fragments_required = 10
"#;

pub const TRADE_LINK: &str = "https://steamcommunity.com/tradeoffer/new/?partner=42&token=x1";

/// Default rules with no welcome bonus, so balances start at zero.
pub fn config() -> EconomyConfig {
    let mut config = EconomyConfig::default();
    config.rewards.welcome_bonus = 0;
    config
}

pub fn catalog(config: &EconomyConfig) -> Catalog {
    Catalog::from_toml_str(CATALOG, &config.catalog).unwrap()
}

pub fn economy_with(config: EconomyConfig, source: impl RandomSource + 'static) -> Economy {
    let catalog = catalog(&config);
    Economy::in_memory(config, catalog, Arc::new(SystemClock), SharedRandom::new(source)).unwrap()
}

pub fn scripted(draws: &[f64]) -> Economy {
    economy_with(config(), ScriptedSource::new(draws.to_vec()))
}

pub fn seeded(seed: u64) -> Economy {
    economy_with(config(), SeededSource::from_seed(seed))
}

pub fn account(economy: &Economy, identity: &str, primary: u64, premium: u64) -> AccountId {
    let id = economy.register(identity, None).unwrap().account.id;
    if primary > 0 {
        economy.top_up(id, Currency::Primary, primary, "fixture").unwrap();
    }
    if premium > 0 {
        economy.top_up(id, Currency::Premium, premium, "fixture").unwrap();
    }
    id
}

pub fn give_fragments(economy: &Economy, owner: AccountId, item_type: u32, counts: &[u32]) -> Vec<RecordId> {
    let item = economy.catalog().item_type(item_type).unwrap().clone();
    economy
        .store()
        .transaction(|txn| {
            let mut ids = Vec::new();
            for &count in counts {
                ids.push(txn.insert_record(NewRecord::fragments_of(owner, &item, count))?.id);
            }
            Ok(ids)
        })
        .unwrap()
}

pub fn give_items(economy: &Economy, owner: AccountId, item_type: u32, count: usize) -> Vec<RecordId> {
    let item = economy.catalog().item_type(item_type).unwrap().clone();
    economy
        .store()
        .transaction(|txn| {
            let mut ids = Vec::with_capacity(count);
            for _ in 0..count {
                ids.push(txn.insert_record(NewRecord::whole_item(owner, &item))?.id);
            }
            Ok(ids)
        })
        .unwrap()
}

pub fn primary(economy: &Economy, id: AccountId) -> u64 {
    economy.profile(id).unwrap().primary_balance
}

pub fn premium(economy: &Economy, id: AccountId) -> u64 {
    economy.profile(id).unwrap().premium_balance
}

/// Credits without going through the top-up path.
pub fn credit(economy: &Economy, id: AccountId, currency: Currency, amount: u64) {
    economy
        .store()
        .transaction(|txn| txn.credit(id, currency, amount, EntryKind::TopUp, json!({ "fixture": true })))
        .unwrap();
}

pub fn temp_wal_path(tag: &str) -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("skinforge_{tag}_{id}_{}.wal", std::process::id()))
}

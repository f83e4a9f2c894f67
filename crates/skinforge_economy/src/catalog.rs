//! # Catalog
//!
//! Read-only definitions supplied by the catalog collaborator: item types,
//! containers with their reward tables, and high-value redemption items.
//!
//! Every record is validated when the catalog is built. A container's
//! probabilities are audited against the configured
//! [`ProbabilityPolicy`]; a container with no drops is still accepted
//! (opening it fails with `EmptyRewardTable`) so one broken container does
//! not take the whole catalog down.
//!
//! ```toml
//! [[item_types]]
//! id = 1
//! name = "AK-47 | Redline"
//! weapon = "AK-47"
//! rarity = "classified"
//! price = "45.50"
//! fragments_required = 5
//!
//! [[containers]]
//! id = 1
//! name = "Daily Case"
//! kind = "ad"
//! drops = [
//!     { id = 1, item_type = 1, probability = 0.1 },
//!     { id = 2, item_type = 1, probability = 0.9, is_fragment = true },
//! ]
//! ```

use crate::config::{CatalogConfig, ProbabilityPolicy};
use crate::distributor::RewardTable;
use crate::error::{EconomyError, EconomyResult, Entity};
use crate::fixed_point::FixedPoint;
use crate::ledger::Currency;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{error, info};

/// Item type identifier.
pub type ItemTypeId = u32;

/// Container identifier.
pub type ContainerId = u32;

/// High-value item identifier.
pub type HighValueItemId = u32;

/// Rarity tier, lowest to highest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Rarity {
    /// White.
    #[default]
    Consumer = 0,
    /// Light blue.
    Industrial = 1,
    /// Blue.
    MilSpec = 2,
    /// Purple.
    Restricted = 3,
    /// Pink.
    Classified = 4,
    /// Red.
    Covert = 5,
    /// Gold.
    Contraband = 6,
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Consumer => "Consumer Grade",
            Self::Industrial => "Industrial Grade",
            Self::MilSpec => "Mil-Spec",
            Self::Restricted => "Restricted",
            Self::Classified => "Classified",
            Self::Covert => "Covert",
            Self::Contraband => "Contraband",
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_one() -> u32 {
    1
}

/// A kind of item that can be owned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemType {
    /// Catalog id.
    pub id: ItemTypeId,
    /// Display name.
    pub name: String,
    /// Weapon family, if any.
    #[serde(default)]
    pub weapon: Option<String>,
    /// Rarity tier.
    pub rarity: Rarity,
    /// Valuation of one whole item.
    pub price: FixedPoint,
    /// Fragments needed to combine into one whole item.
    pub fragments_required: u32,
    /// Whether records of this type may be listed on the market.
    #[serde(default = "default_true")]
    pub tradable: bool,
    /// Image reference.
    #[serde(default)]
    pub image_url: Option<String>,
}

/// How a container is paid for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// Unlocked by watching an ad. Always free.
    Ad,
    /// Bought with primary currency.
    #[default]
    Standard,
    /// Bought with premium currency.
    Premium,
}

impl ContainerKind {
    /// Currency a container of this kind is charged in.
    #[must_use]
    pub fn currency(self) -> Currency {
        match self {
            Self::Premium => Currency::Premium,
            Self::Ad | Self::Standard => Currency::Primary,
        }
    }
}

/// One line of a container's reward table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardTableEntry {
    /// Drop id, unique within the container.
    pub id: u32,
    /// Item type granted. `None` for generic fragments or currency.
    #[serde(default)]
    pub item_type: Option<ItemTypeId>,
    /// Probability in `(0, 1]`.
    pub probability: f64,
    /// Grants fragments instead of a whole item.
    #[serde(default)]
    pub is_fragment: bool,
    /// Fragment quantity (ignored for whole items).
    #[serde(default = "default_one")]
    pub fragments: u32,
    /// Primary currency granted by a pure-currency entry.
    #[serde(default)]
    pub coins: u64,
}

/// What a drop entry grants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropGrant<'a> {
    /// A whole item of a catalog type.
    Item(&'a ItemType),
    /// Fragments of a catalog type.
    Fragments(&'a ItemType, u32),
    /// Fragments not tied to a type. They only count towards redemption.
    GenericFragments(u32),
    /// Primary currency, no inventory record.
    Coins(u64),
}

/// A loot container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "ContainerSpec")]
pub struct Container {
    /// Catalog id.
    pub id: ContainerId,
    /// Display name.
    pub name: String,
    /// Payment kind.
    #[serde(default)]
    pub kind: ContainerKind,
    /// Price in `currency`. Ignored for ad containers.
    #[serde(default)]
    pub price: u64,
    /// Currency the price is charged in.
    pub currency: Currency,
    /// Inactive containers cannot be opened.
    pub active: bool,
    /// Reward table in walk order.
    pub drops: Vec<RewardTableEntry>,
}

/// Catalog form of [`Container`]; a missing `currency` follows the kind.
#[derive(Deserialize)]
struct ContainerSpec {
    id: ContainerId,
    name: String,
    #[serde(default)]
    kind: ContainerKind,
    #[serde(default)]
    price: u64,
    #[serde(default)]
    currency: Option<Currency>,
    #[serde(default = "default_true")]
    active: bool,
    #[serde(default)]
    drops: Vec<RewardTableEntry>,
}

impl From<ContainerSpec> for Container {
    fn from(spec: ContainerSpec) -> Self {
        Self {
            id: spec.id,
            name: spec.name,
            kind: spec.kind,
            price: spec.price,
            currency: spec.currency.unwrap_or_else(|| spec.kind.currency()),
            active: spec.active,
            drops: spec.drops,
        }
    }
}

impl Container {
    /// Price actually charged when opening.
    #[inline]
    #[must_use]
    pub fn effective_price(&self) -> u64 {
        match self.kind {
            ContainerKind::Ad => 0,
            ContainerKind::Standard | ContainerKind::Premium => self.price,
        }
    }

    /// Reward table over the drop entries.
    #[must_use]
    pub fn reward_table(&self) -> RewardTable<&RewardTableEntry> {
        RewardTable::new(self.drops.iter().map(|d| (d.probability, d)))
    }
}

/// An externally fulfilled reward bought with fragments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighValueItem {
    /// Catalog id.
    pub id: HighValueItemId,
    /// Display name.
    pub name: String,
    /// Weapon family, if any.
    #[serde(default)]
    pub weapon: Option<String>,
    /// Rarity tier.
    #[serde(default)]
    pub rarity: Rarity,
    /// Market value of the external item.
    pub external_price: FixedPoint,
    /// Fragments consumed by a redemption.
    pub fragments_required: u32,
    /// Untradeable items cannot be redeemed.
    #[serde(default = "default_true")]
    pub tradeable: bool,
    /// Image reference.
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    item_types: Vec<ItemType>,
    #[serde(default)]
    containers: Vec<Container>,
    #[serde(default)]
    high_value_items: Vec<HighValueItem>,
}

/// The validated catalog.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    item_types: BTreeMap<ItemTypeId, ItemType>,
    containers: BTreeMap<ContainerId, Container>,
    high_value_items: BTreeMap<HighValueItemId, HighValueItem>,
}

impl Catalog {
    /// Builds a catalog from records, validating all of them.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for duplicate ids, dangling references, bad
    /// probabilities, zero fragment counts, or a probability sum away from
    /// 1 under [`ProbabilityPolicy::Reject`].
    pub fn build(
        item_types: Vec<ItemType>,
        containers: Vec<Container>,
        high_value_items: Vec<HighValueItem>,
        config: &CatalogConfig,
    ) -> EconomyResult<Self> {
        let mut catalog = Self::default();

        for item in item_types {
            validate_item_type(&item)?;
            let id = item.id;
            if catalog.item_types.insert(id, item).is_some() {
                return Err(invalid(format!("duplicate item type id {id}")));
            }
        }
        for container in containers {
            catalog.validate_container(&container, config)?;
            let id = container.id;
            if catalog.containers.insert(id, container).is_some() {
                return Err(invalid(format!("duplicate container id {id}")));
            }
        }
        for item in high_value_items {
            if item.name.trim().is_empty() || item.fragments_required == 0 {
                return Err(invalid(format!(
                    "high-value item {} needs a name and a positive fragment count",
                    item.id
                )));
            }
            let id = item.id;
            if catalog.high_value_items.insert(id, item).is_some() {
                return Err(invalid(format!("duplicate high-value item id {id}")));
            }
        }

        info!(
            item_types = catalog.item_types.len(),
            containers = catalog.containers.len(),
            high_value_items = catalog.high_value_items.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    /// Parses and validates a TOML catalog.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` on parse or validation failure.
    pub fn from_toml_str(text: &str, config: &CatalogConfig) -> EconomyResult<Self> {
        let file: CatalogFile =
            toml::from_str(text).map_err(|e| invalid(format!("catalog: {e}")))?;
        Self::build(file.item_types, file.containers, file.high_value_items, config)
    }

    /// Reads a TOML catalog from disk.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the file cannot be read or is invalid.
    pub fn from_path(path: impl AsRef<Path>, config: &CatalogConfig) -> EconomyResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text, config)
    }

    fn validate_container(
        &self,
        container: &Container,
        config: &CatalogConfig,
    ) -> EconomyResult<()> {
        if container.name.trim().is_empty() {
            return Err(invalid(format!("container {} has no name", container.id)));
        }
        if container.kind != ContainerKind::Ad && container.currency != container.kind.currency() {
            return Err(invalid(format!(
                "container {}: {:?} containers are charged in {:?}, not {:?}",
                container.id,
                container.kind,
                container.kind.currency(),
                container.currency
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for drop in &container.drops {
            let context = || format!("container {} drop {}", container.id, drop.id);
            if !seen.insert(drop.id) {
                return Err(invalid(format!("{}: duplicate drop id", context())));
            }
            if !(drop.probability > 0.0 && drop.probability <= 1.0) {
                return Err(invalid(format!("{}: probability must be in (0, 1]", context())));
            }
            if drop.fragments == 0 {
                return Err(invalid(format!("{}: fragment quantity must be at least 1", context())));
            }
            match drop.item_type {
                Some(item_type) if !self.item_types.contains_key(&item_type) => {
                    return Err(invalid(format!(
                        "{}: unknown item type {item_type}",
                        context()
                    )));
                }
                None if !drop.is_fragment && drop.coins == 0 => {
                    return Err(invalid(format!(
                        "{}: entry without item type must grant fragments or coins",
                        context()
                    )));
                }
                _ => {}
            }
        }

        if container.drops.is_empty() {
            error!(container = container.id, "container has an empty reward table");
            return Ok(());
        }

        let audit = container.reward_table().audit();
        if !audit.is_normalized(config.probability_tolerance) {
            match config.probability_policy {
                ProbabilityPolicy::Reject => {
                    return Err(invalid(format!(
                        "container {} probabilities sum to {}, expected 1",
                        container.id, audit.total_weight
                    )));
                }
                ProbabilityPolicy::Warn => {
                    error!(
                        container = container.id,
                        total = audit.total_weight,
                        fallback_mass = audit.fallback_mass(),
                        "reward table probabilities do not sum to 1"
                    );
                }
            }
        }
        Ok(())
    }

    /// Looks up an item type.
    ///
    /// # Errors
    ///
    /// `NotFound` if unknown.
    pub fn item_type(&self, id: ItemTypeId) -> EconomyResult<&ItemType> {
        self.item_types
            .get(&id)
            .ok_or_else(|| EconomyError::not_found(Entity::ItemType, id))
    }

    /// Looks up an active container.
    ///
    /// # Errors
    ///
    /// `NotFound` if unknown or inactive.
    pub fn active_container(&self, id: ContainerId) -> EconomyResult<&Container> {
        self.containers
            .get(&id)
            .filter(|c| c.active)
            .ok_or_else(|| EconomyError::not_found(Entity::Container, id))
    }

    /// Looks up a high-value item.
    ///
    /// # Errors
    ///
    /// `NotFound` if unknown.
    pub fn high_value_item(&self, id: HighValueItemId) -> EconomyResult<&HighValueItem> {
        self.high_value_items
            .get(&id)
            .ok_or_else(|| EconomyError::not_found(Entity::HighValueItem, id))
    }

    /// Resolves what a drop entry grants.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entry references an unknown item type (cannot
    /// happen for entries of a validated container).
    pub fn resolve_drop<'a>(&'a self, drop: &RewardTableEntry) -> EconomyResult<DropGrant<'a>> {
        Ok(match (drop.item_type, drop.is_fragment) {
            (Some(id), false) => DropGrant::Item(self.item_type(id)?),
            (Some(id), true) => DropGrant::Fragments(self.item_type(id)?, drop.fragments),
            (None, true) => DropGrant::GenericFragments(drop.fragments),
            (None, false) => DropGrant::Coins(drop.coins),
        })
    }

    /// All item types in id order.
    pub fn item_types(&self) -> impl Iterator<Item = &ItemType> {
        self.item_types.values()
    }

    /// Active containers in id order.
    pub fn active_containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.values().filter(|c| c.active)
    }

    /// All high-value items in id order.
    pub fn high_value_items(&self) -> impl Iterator<Item = &HighValueItem> {
        self.high_value_items.values()
    }
}

fn validate_item_type(item: &ItemType) -> EconomyResult<()> {
    if item.name.trim().is_empty() {
        return Err(invalid(format!("item type {} has no name", item.id)));
    }
    if item.fragments_required == 0 {
        return Err(invalid(format!(
            "item type {} must require at least one fragment",
            item.id
        )));
    }
    Ok(())
}

fn invalid(message: String) -> EconomyError {
    EconomyError::InvalidConfig(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
        [[item_types]]
        id = 1
        name = "AK-47 | Redline"
        weapon = "AK-47"
        rarity = "classified"
        price = "45.50"
        fragments_required = 5

        [[item_types]]
        id = 2
        name = "P250 | Sand Dune"
        rarity = "consumer"
        price = "0.10"
        fragments_required = 2
        tradable = false

        [[containers]]
        id = 10
        name = "Daily Case"
        kind = "ad"
        price = 999
        drops = [
            { id = 1, item_type = 1, probability = 0.05 },
            { id = 2, item_type = 1, probability = 0.45, is_fragment = true, fragments = 2 },
            { id = 3, probability = 0.2, is_fragment = true, fragments = 3 },
            { id = 4, probability = 0.3, coins = 25 },
        ]

        [[containers]]
        id = 11
        name = "Retired Case"
        price = 100
        active = false
        drops = [{ id = 1, item_type = 2, probability = 1.0 }]

        [[high_value_items]]
        id = 100
        name = "Karambit | Doppler"
        external_price = "1250.00"
        fragments_required = 50
    "#;

    #[test]
    fn test_parse_catalog() {
        let catalog = Catalog::from_toml_str(CATALOG, &CatalogConfig::default()).unwrap();

        let ak = catalog.item_type(1).unwrap();
        assert_eq!(ak.rarity, Rarity::Classified);
        assert_eq!(ak.price.to_string(), "45.50");
        assert!(ak.tradable);
        assert!(!catalog.item_type(2).unwrap().tradable);

        let daily = catalog.active_container(10).unwrap();
        assert_eq!(daily.effective_price(), 0);
        assert_eq!(daily.drops.len(), 4);

        assert!(matches!(
            catalog.active_container(11),
            Err(EconomyError::NotFound { entity: Entity::Container, .. })
        ));
        assert_eq!(catalog.high_value_item(100).unwrap().fragments_required, 50);
    }

    #[test]
    fn test_resolve_drop_grants() {
        let catalog = Catalog::from_toml_str(CATALOG, &CatalogConfig::default()).unwrap();
        let drops = &catalog.active_container(10).unwrap().drops;

        assert!(matches!(
            catalog.resolve_drop(&drops[0]).unwrap(),
            DropGrant::Item(t) if t.id == 1
        ));
        assert!(matches!(
            catalog.resolve_drop(&drops[1]).unwrap(),
            DropGrant::Fragments(t, 2) if t.id == 1
        ));
        assert_eq!(catalog.resolve_drop(&drops[2]).unwrap(), DropGrant::GenericFragments(3));
        assert_eq!(catalog.resolve_drop(&drops[3]).unwrap(), DropGrant::Coins(25));
    }

    #[test]
    fn test_container_currency_follows_kind() {
        let text = r#"
            [[item_types]]
            id = 1
            name = "AK-47 | Redline"
            price = "45.50"
            fragments_required = 5

            [[containers]]
            id = 1
            name = "Classic Case"
            price = 100
            drops = [{ id = 1, item_type = 1, probability = 1.0 }]

            [[containers]]
            id = 2
            name = "Vanguard Case"
            kind = "premium"
            price = 250
            drops = [{ id = 1, item_type = 1, probability = 1.0 }]
        "#;
        let catalog = Catalog::from_toml_str(text, &CatalogConfig::default()).unwrap();

        assert_eq!(catalog.active_container(1).unwrap().currency, Currency::Primary);
        let premium = catalog.active_container(2).unwrap();
        assert_eq!(premium.currency, Currency::Premium);
        assert_eq!(premium.effective_price(), 250);
    }

    #[test]
    fn test_container_currency_mismatch_rejected() {
        let mut premium_in_coins = container(vec![]);
        premium_in_coins.kind = ContainerKind::Premium;
        let mut standard_in_premium = container(vec![]);
        standard_in_premium.currency = Currency::Premium;

        for bad in [premium_in_coins, standard_in_premium] {
            let result = Catalog::build(vec![], vec![bad], vec![], &CatalogConfig::default());
            assert!(matches!(result, Err(EconomyError::InvalidConfig(_))));
        }

        let mut ad = container(vec![]);
        ad.kind = ContainerKind::Ad;
        ad.currency = Currency::Premium;
        assert!(Catalog::build(vec![], vec![ad], vec![], &CatalogConfig::default()).is_ok());
    }

    fn container(drops: Vec<RewardTableEntry>) -> Container {
        Container {
            id: 1,
            name: "Test".to_string(),
            kind: ContainerKind::Standard,
            price: 10,
            currency: Currency::Primary,
            active: true,
            drops,
        }
    }

    fn coins(id: u32, probability: f64) -> RewardTableEntry {
        RewardTableEntry {
            id,
            item_type: None,
            probability,
            is_fragment: false,
            fragments: 1,
            coins: 5,
        }
    }

    #[test]
    fn test_probability_policy() {
        let underweight = vec![container(vec![coins(1, 0.25), coins(2, 0.25)])];

        let warn = CatalogConfig::default();
        assert!(Catalog::build(vec![], underweight.clone(), vec![], &warn).is_ok());

        let reject = CatalogConfig {
            probability_policy: ProbabilityPolicy::Reject,
            ..CatalogConfig::default()
        };
        assert!(matches!(
            Catalog::build(vec![], underweight, vec![], &reject),
            Err(EconomyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_bad_entries() {
        let config = CatalogConfig::default();
        for bad in [
            coins(1, 0.0),
            coins(1, 1.5),
            RewardTableEntry { coins: 0, ..coins(1, 1.0) },
            RewardTableEntry { item_type: Some(99), ..coins(1, 1.0) },
            RewardTableEntry { fragments: 0, is_fragment: true, ..coins(1, 1.0) },
        ] {
            assert!(Catalog::build(vec![], vec![container(vec![bad])], vec![], &config).is_err());
        }
    }

    #[test]
    fn test_empty_table_is_loaded() {
        let catalog =
            Catalog::build(vec![], vec![container(vec![])], vec![], &CatalogConfig::default())
                .unwrap();
        assert!(catalog.active_container(1).unwrap().drops.is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let config = CatalogConfig::default();
        let twice = vec![container(vec![coins(1, 1.0)]), container(vec![coins(1, 1.0)])];
        assert!(Catalog::build(vec![], twice, vec![], &config).is_err());
    }
}

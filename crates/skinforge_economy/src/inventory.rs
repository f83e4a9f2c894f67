//! # Inventory Store
//!
//! Items and fragments owned per account.
//!
//! A record is either a whole item (`is_fragment == false`, `fragments == 1`)
//! or a bundle of fragments. Fragment bundles either belong to a catalog
//! item type (combinable into that item) or are generic (only count towards
//! redemption). While a record is listed on the market its `in_escrow`
//! flag is set and its owner cannot consume, combine or relist it.

use crate::catalog::{ItemType, ItemTypeId, Rarity};
use crate::error::{EconomyError, EconomyResult, Entity};
use crate::fixed_point::FixedPoint;
use crate::ledger::AccountId;
use crate::store::{IdKind, Mutation, StoreState, Txn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inventory record identifier.
pub type RecordId = u64;

/// Display name of generic fragment bundles.
pub const GENERIC_FRAGMENT_NAME: &str = "Fragment";

/// An owned item or fragment bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    /// Record id.
    pub id: RecordId,
    /// Current owner.
    pub owner: AccountId,
    /// Catalog type. `None` for generic fragments.
    pub item_type: Option<ItemTypeId>,
    /// Display name.
    pub name: String,
    /// Weapon family, if any.
    pub weapon: Option<String>,
    /// Rarity tier.
    pub rarity: Rarity,
    /// Image reference.
    pub image_url: Option<String>,
    /// Fragment bundle rather than a whole item.
    pub is_fragment: bool,
    /// Fragment count, at least 1. Always 1 for whole items.
    pub fragments: u32,
    /// Monetary valuation.
    pub valuation: FixedPoint,
    /// Whether the record may be listed on the market.
    pub tradable: bool,
    /// Held by an active listing.
    pub in_escrow: bool,
    /// When the current owner received it.
    pub acquired_at: DateTime<Utc>,
}

/// A record about to be created. Validated on insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRecord {
    /// Owner.
    pub owner: AccountId,
    /// Catalog type.
    pub item_type: Option<ItemTypeId>,
    /// Display name.
    pub name: String,
    /// Weapon family.
    pub weapon: Option<String>,
    /// Rarity tier.
    pub rarity: Rarity,
    /// Image reference.
    pub image_url: Option<String>,
    /// Fragment bundle.
    pub is_fragment: bool,
    /// Fragment count.
    pub fragments: u32,
    /// Valuation.
    pub valuation: FixedPoint,
    /// Market eligibility.
    pub tradable: bool,
}

impl NewRecord {
    /// One whole item of `item_type`.
    #[must_use]
    pub fn whole_item(owner: AccountId, item_type: &ItemType) -> Self {
        Self {
            owner,
            item_type: Some(item_type.id),
            name: item_type.name.clone(),
            weapon: item_type.weapon.clone(),
            rarity: item_type.rarity,
            image_url: item_type.image_url.clone(),
            is_fragment: false,
            fragments: 1,
            valuation: item_type.price,
            tradable: item_type.tradable,
        }
    }

    /// `count` fragments of `item_type`, valued pro rata.
    #[must_use]
    pub fn fragments_of(owner: AccountId, item_type: &ItemType, count: u32) -> Self {
        let share = u128::from(item_type.price.raw()) * u128::from(count)
            / u128::from(item_type.fragments_required.max(1));
        Self {
            is_fragment: true,
            fragments: count,
            valuation: FixedPoint::from_raw(u64::try_from(share).unwrap_or(u64::MAX)),
            ..Self::whole_item(owner, item_type)
        }
    }

    /// `count` generic fragments.
    #[must_use]
    pub fn generic_fragments(owner: AccountId, count: u32) -> Self {
        Self {
            owner,
            item_type: None,
            name: GENERIC_FRAGMENT_NAME.to_string(),
            weapon: None,
            rarity: Rarity::Consumer,
            image_url: None,
            is_fragment: true,
            fragments: count,
            valuation: FixedPoint::ZERO,
            tradable: true,
        }
    }

    fn validate(&self) -> EconomyResult<()> {
        if self.name.trim().is_empty() {
            return Err(EconomyError::invalid("inventory record needs a name"));
        }
        if self.fragments == 0 {
            return Err(EconomyError::invalid("fragment count must be at least 1"));
        }
        if !self.is_fragment && self.fragments != 1 {
            return Err(EconomyError::invalid("whole items carry exactly one unit"));
        }
        if self.item_type.is_none() && !self.is_fragment {
            return Err(EconomyError::invalid("whole items need an item type"));
        }
        Ok(())
    }
}

/// Which fragment records a sum or consumption covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentScope {
    /// Fragments of one item type.
    ItemType(ItemTypeId),
    /// Every fragment record, typed or generic.
    All,
}

impl FragmentScope {
    fn covers(self, record: &InventoryRecord) -> bool {
        record.is_fragment
            && match self {
                Self::ItemType(id) => record.item_type == Some(id),
                Self::All => true,
            }
    }
}

/// Result of consuming a fragment pool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsumedFragments {
    /// Records deleted.
    pub records: Vec<RecordId>,
    /// Total fragments across those records.
    pub fragments: u64,
}

/// Saturates a fragment total into the error type's width.
#[must_use]
pub fn clamp_fragments(total: u64) -> u32 {
    u32::try_from(total).unwrap_or(u32::MAX)
}

// ============================================================================
// Transactional operations
// ============================================================================

impl Txn<'_> {
    /// Looks up a record.
    ///
    /// # Errors
    ///
    /// `NotFound` if it does not exist.
    pub fn record(&self, id: RecordId) -> EconomyResult<&InventoryRecord> {
        self.state()
            .records
            .get(&id)
            .ok_or_else(|| EconomyError::not_found(Entity::InventoryRecord, id))
    }

    /// Looks up a record owned by `owner`.
    ///
    /// # Errors
    ///
    /// `NotFound` if it does not exist or belongs to someone else.
    pub fn owned_record(&self, owner: AccountId, id: RecordId) -> EconomyResult<&InventoryRecord> {
        self.record(id)
            .ok()
            .filter(|r| r.owner == owner)
            .ok_or_else(|| EconomyError::not_found(Entity::InventoryRecord, id))
    }

    /// Creates a record.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the draft is malformed, `NotFound` if the owner
    /// does not exist.
    pub fn insert_record(&mut self, draft: NewRecord) -> EconomyResult<InventoryRecord> {
        draft.validate()?;
        self.account(draft.owner)?;
        let record = InventoryRecord {
            id: self.next_id(IdKind::Record),
            owner: draft.owner,
            item_type: draft.item_type,
            name: draft.name,
            weapon: draft.weapon,
            rarity: draft.rarity,
            image_url: draft.image_url,
            is_fragment: draft.is_fragment,
            fragments: draft.fragments,
            valuation: draft.valuation,
            tradable: draft.tradable,
            in_escrow: false,
            acquired_at: self.now(),
        };
        self.apply(Mutation::PutRecord(record.clone()));
        Ok(record)
    }

    /// Writes back a modified record.
    pub(crate) fn put_record(&mut self, record: InventoryRecord) {
        self.apply(Mutation::PutRecord(record));
    }

    /// Deletes every non-escrowed fragment record of `owner` in `scope`.
    pub fn consume_fragments(&mut self, owner: AccountId, scope: FragmentScope) -> ConsumedFragments {
        let targets: Vec<(RecordId, u32)> = self
            .state()
            .spendable_fragments(owner, scope)
            .map(|r| (r.id, r.fragments))
            .collect();

        let mut consumed = ConsumedFragments::default();
        for (id, fragments) in targets {
            self.apply(Mutation::RemoveRecord(id));
            consumed.records.push(id);
            consumed.fragments += u64::from(fragments);
        }
        consumed
    }
}

// ============================================================================
// Queries
// ============================================================================

impl StoreState {
    /// Looks up a record.
    #[must_use]
    pub fn record(&self, id: RecordId) -> Option<&InventoryRecord> {
        self.records.get(&id)
    }

    /// Records owned by `owner`, newest first.
    #[must_use]
    pub fn records_of(&self, owner: AccountId) -> Vec<&InventoryRecord> {
        let mut records: Vec<&InventoryRecord> =
            self.records.values().filter(|r| r.owner == owner).collect();
        records.sort_by(|a, b| b.acquired_at.cmp(&a.acquired_at).then(b.id.cmp(&a.id)));
        records
    }

    /// Fragment records of `owner` in `scope` that are not in escrow.
    pub fn spendable_fragments(
        &self,
        owner: AccountId,
        scope: FragmentScope,
    ) -> impl Iterator<Item = &InventoryRecord> {
        self.records
            .values()
            .filter(move |r| r.owner == owner && !r.in_escrow && scope.covers(r))
    }

    /// Total spendable fragments of `owner` in `scope`.
    #[must_use]
    pub fn fragment_total(&self, owner: AccountId, scope: FragmentScope) -> u64 {
        self.spendable_fragments(owner, scope)
            .map(|r| u64::from(r.fragments))
            .sum()
    }
}

//! Outcome events for the notification collaborator.
//!
//! Services push an event only after their transaction has committed, so a
//! consumer never announces something that was rolled back. Delivery is
//! best effort: the buffer is drained by whoever renders the messages and
//! correctness never depends on it.

use crate::catalog::{ContainerId, HighValueItemId, ItemTypeId, Rarity};
use crate::inventory::RecordId;
use crate::ledger::AccountId;
use crate::market::ListingId;
use crate::minigames::GameKind;
use crate::redemption::WithdrawalId;
use parking_lot::Mutex;

/// Something worth telling the user about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EconomyEvent {
    /// Registration completed.
    AccountRegistered {
        /// New account.
        account: AccountId,
        /// Referrer credited, if any.
        referrer: Option<AccountId>,
    },
    /// Daily reward claimed.
    DailyRewardClaimed {
        /// Claimant.
        account: AccountId,
        /// Amount credited.
        reward: u64,
        /// Streak after the claim.
        streak: u32,
    },
    /// A container was opened.
    ContainerOpened {
        /// Opener.
        account: AccountId,
        /// Container.
        container: ContainerId,
        /// Human-readable outcome.
        description: String,
        /// Rarity of the drop, for styling.
        rarity: Option<Rarity>,
    },
    /// Fragments were combined.
    ItemCombined {
        /// Owner.
        account: AccountId,
        /// Item type crafted.
        item_type: ItemTypeId,
        /// New record.
        record: RecordId,
    },
    /// An item was listed.
    ListingCreated {
        /// Seller.
        seller: AccountId,
        /// Listing.
        listing: ListingId,
        /// Asking price.
        price: u64,
    },
    /// A listing was bought.
    ListingSold {
        /// Listing.
        listing: ListingId,
        /// Seller.
        seller: AccountId,
        /// Buyer.
        buyer: AccountId,
        /// Price paid by the buyer.
        price: u64,
        /// Amount credited to the seller.
        seller_proceeds: u64,
    },
    /// A listing was withdrawn or expired.
    ListingClosed {
        /// Listing.
        listing: ListingId,
        /// Seller.
        seller: AccountId,
        /// `true` for expiry, `false` for cancellation.
        expired: bool,
    },
    /// A minigame round finished.
    GamePlayed {
        /// Player.
        account: AccountId,
        /// Game.
        kind: GameKind,
        /// Stake.
        wager: u64,
        /// Payout, zero on a loss.
        win_amount: u64,
    },
    /// A high-value redemption was queued.
    RedemptionRequested {
        /// Requester.
        account: AccountId,
        /// Request id.
        withdrawal: WithdrawalId,
        /// Target item.
        item: HighValueItemId,
    },
}

/// Buffer of committed events.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: Mutex<Vec<EconomyEvent>>,
}

impl EventBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event.
    pub fn push(&self, event: EconomyEvent) {
        self.events.lock().push(event);
    }

    /// Takes every pending event.
    pub fn drain(&self) -> Vec<EconomyEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

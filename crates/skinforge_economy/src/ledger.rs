//! # Ledger Store
//!
//! Two independently addressable balances per account and an append-only
//! journal.
//!
//! ## Rules
//!
//! 1. Every [`Txn::credit`] and [`Txn::debit`] appends exactly one
//!    [`LedgerEntry`] in the same transaction as the balance change.
//! 2. A debit that would leave the balance negative fails with
//!    `InsufficientFunds` and changes nothing.
//! 3. The balance check and the debit run under the same store lock, so two
//!    requests can never both pass the check against the same balance.
//! 4. Entries are never updated or deleted.

use crate::error::{EconomyError, EconomyResult, Entity};
use crate::store::{IdKind, Mutation, StoreState, Txn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::trace;

/// Account identifier.
pub type AccountId = u64;

/// Journal entry identifier.
pub type EntryId = u64;

/// Longest accepted external identity string.
const MAX_IDENTITY_LEN: usize = 128;

/// The two spendable currencies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// Earned through play, spent on containers and the market.
    #[default]
    Primary,
    /// Bought with real money, wagered in minigames.
    Premium,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Premium => "premium",
        })
    }
}

/// Unit of a journal entry's amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Denomination {
    /// Primary currency.
    Primary,
    /// Premium currency.
    Premium,
    /// Fragments (redemptions).
    Fragments,
}

impl From<Currency> for Denomination {
    fn from(currency: Currency) -> Self {
        match currency {
            Currency::Primary => Self::Primary,
            Currency::Premium => Self::Premium,
        }
    }
}

/// Why a journal entry was written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// One-time registration bonus.
    WelcomeBonus,
    /// Bonus to the referrer of a new account.
    ReferralBonus,
    /// Daily login reward.
    DailyReward,
    /// Inbound purchase from the payment collaborator.
    TopUp,
    /// Container opened.
    ContainerOpen,
    /// Fragments combined into an item.
    Combine,
    /// Item put up for sale.
    MarketListing,
    /// Listing withdrawn by its seller.
    MarketCancel,
    /// Purchase price paid by a buyer.
    MarketBuy,
    /// Sale proceeds paid to a seller.
    MarketSell,
    /// Minigame stake.
    GameWager,
    /// Minigame winnings.
    GamePayout,
    /// Fragments spent on a high-value item.
    Withdrawal,
}

impl EntryKind {
    /// Stable tag used in exports and logs.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::WelcomeBonus => "welcome_bonus",
            Self::ReferralBonus => "referral_bonus",
            Self::DailyReward => "daily_reward",
            Self::TopUp => "top_up",
            Self::ContainerOpen => "container_open",
            Self::Combine => "combine",
            Self::MarketListing => "market_listing",
            Self::MarketCancel => "market_cancel",
            Self::MarketBuy => "market_buy",
            Self::MarketSell => "market_sell",
            Self::GameWager => "game_wager",
            Self::GamePayout => "game_payout",
            Self::Withdrawal => "withdrawal",
        }
    }
}

/// A user account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Internal id.
    pub id: AccountId,
    /// Opaque identity from the auth collaborator.
    pub identity: String,
    /// Code other users enter to credit this account.
    pub referral_code: String,
    /// Account whose code was used at registration.
    pub referred_by: Option<AccountId>,
    /// Primary currency balance.
    pub primary_balance: u64,
    /// Premium currency balance.
    pub premium_balance: u64,
    /// Sum of every credit ever made.
    pub lifetime_earned: u64,
    /// Sum of every debit ever made.
    pub total_spent: u64,
    /// Consecutive days the daily reward was claimed.
    pub daily_streak: u32,
    /// Last daily reward claim.
    pub last_daily_at: Option<DateTime<Utc>>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates a zero-balance account, validating the identity.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the identity is empty, too long or contains
    /// control characters.
    pub fn new(
        id: AccountId,
        identity: &str,
        referral_code: String,
        referred_by: Option<AccountId>,
        created_at: DateTime<Utc>,
    ) -> EconomyResult<Self> {
        let identity = identity.trim();
        if identity.is_empty() || identity.len() > MAX_IDENTITY_LEN {
            return Err(EconomyError::invalid(format!(
                "identity must be 1..={MAX_IDENTITY_LEN} characters"
            )));
        }
        if identity.chars().any(char::is_control) {
            return Err(EconomyError::invalid("identity contains control characters"));
        }
        Ok(Self {
            id,
            identity: identity.to_string(),
            referral_code,
            referred_by,
            primary_balance: 0,
            premium_balance: 0,
            lifetime_earned: 0,
            total_spent: 0,
            daily_streak: 0,
            last_daily_at: None,
            created_at,
        })
    }

    /// Balance in `currency`.
    #[inline]
    #[must_use]
    pub fn balance(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Primary => self.primary_balance,
            Currency::Premium => self.premium_balance,
        }
    }

    fn balance_mut(&mut self, currency: Currency) -> &mut u64 {
        match currency {
            Currency::Primary => &mut self.primary_balance,
            Currency::Premium => &mut self.premium_balance,
        }
    }
}

/// Immutable journal record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Sequence number.
    pub id: EntryId,
    /// Account the entry belongs to.
    pub account: AccountId,
    /// Reason tag.
    pub kind: EntryKind,
    /// Unit of `amount`.
    pub denomination: Denomination,
    /// Signed change. Zero for audit-only entries.
    pub amount: i64,
    /// Balance in `denomination` right after the change, for currencies.
    pub balance_after: Option<u64>,
    /// Free-form context (container id, listing id, ...).
    pub metadata: Value,
    /// When the transaction ran.
    pub created_at: DateTime<Utc>,
}

/// Deterministic referral code. Unique because it embeds the account id.
fn referral_code_for(id: AccountId, identity: &str) -> String {
    format!("SF{id:X}{:08X}", crc32fast::hash(identity.as_bytes()))
}

fn signed(amount: u64) -> EconomyResult<i64> {
    i64::try_from(amount).map_err(|_| EconomyError::ArithmeticOverflow)
}

// ============================================================================
// Transactional operations
// ============================================================================

impl Txn<'_> {
    /// Looks up an account.
    ///
    /// # Errors
    ///
    /// `NotFound` if it does not exist.
    pub fn account(&self, id: AccountId) -> EconomyResult<&Account> {
        self.state()
            .accounts
            .get(&id)
            .ok_or_else(|| EconomyError::not_found(Entity::Account, id))
    }

    /// Creates an account with zero balances.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on a bad or already registered identity,
    /// `NotFound` for an unknown referrer.
    pub fn open_account(
        &mut self,
        identity: &str,
        referred_by: Option<AccountId>,
    ) -> EconomyResult<Account> {
        if self.state().identities.contains_key(identity.trim()) {
            return Err(EconomyError::invalid("identity already registered"));
        }
        if let Some(referrer) = referred_by {
            self.account(referrer)?;
        }
        let id = self.next_id(IdKind::Account);
        let code = referral_code_for(id, identity);
        let account = Account::new(id, identity, code, referred_by, self.now())?;
        self.apply(Mutation::PutAccount(account.clone()));
        Ok(account)
    }

    /// Replaces an account's non-balance fields.
    ///
    /// Balances and counters are taken from the stored account, so this
    /// cannot be used to move money.
    pub(crate) fn update_account_profile(&mut self, updated: &Account) -> EconomyResult<()> {
        let mut account = self.account(updated.id)?.clone();
        account.daily_streak = updated.daily_streak;
        account.last_daily_at = updated.last_daily_at;
        self.apply(Mutation::PutAccount(account));
        Ok(())
    }

    /// Adds `amount` to a balance and journals it. Returns the new balance.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown account, `ArithmeticOverflow` if the
    /// balance would overflow.
    pub fn credit(
        &mut self,
        account: AccountId,
        currency: Currency,
        amount: u64,
        kind: EntryKind,
        metadata: Value,
    ) -> EconomyResult<u64> {
        let mut updated = self.account(account)?.clone();
        let balance = updated
            .balance(currency)
            .checked_add(amount)
            .ok_or(EconomyError::ArithmeticOverflow)?;
        *updated.balance_mut(currency) = balance;
        updated.lifetime_earned = updated
            .lifetime_earned
            .checked_add(amount)
            .ok_or(EconomyError::ArithmeticOverflow)?;
        let signed_amount = signed(amount)?;

        self.apply(Mutation::PutAccount(updated));
        self.push_entry(account, kind, currency.into(), signed_amount, Some(balance), metadata);
        trace!(account, %currency, amount, kind = kind.tag(), balance, "credit");
        Ok(balance)
    }

    /// Removes `amount` from a balance and journals it. Returns the new
    /// balance.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown account, `InsufficientFunds` if the balance
    /// is below `amount` (nothing is written in that case).
    pub fn debit(
        &mut self,
        account: AccountId,
        currency: Currency,
        amount: u64,
        kind: EntryKind,
        metadata: Value,
    ) -> EconomyResult<u64> {
        let mut updated = self.account(account)?.clone();
        let current = updated.balance(currency);
        let Some(balance) = current.checked_sub(amount) else {
            return Err(EconomyError::InsufficientFunds {
                currency,
                required: amount,
                current,
            });
        };
        *updated.balance_mut(currency) = balance;
        updated.total_spent = updated
            .total_spent
            .checked_add(amount)
            .ok_or(EconomyError::ArithmeticOverflow)?;
        let signed_amount = -signed(amount)?;

        self.apply(Mutation::PutAccount(updated));
        self.push_entry(account, kind, currency.into(), signed_amount, Some(balance), metadata);
        trace!(account, %currency, amount, kind = kind.tag(), balance, "debit");
        Ok(balance)
    }

    /// Appends a journal entry without touching any balance.
    ///
    /// Used for audit-only records (zero-amount crafting entries, listing
    /// bookkeeping, fragment spends).
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown account.
    pub fn journal(
        &mut self,
        account: AccountId,
        denomination: Denomination,
        amount: i64,
        kind: EntryKind,
        metadata: Value,
    ) -> EconomyResult<EntryId> {
        self.account(account)?;
        Ok(self.push_entry(account, kind, denomination, amount, None, metadata))
    }

    fn push_entry(
        &mut self,
        account: AccountId,
        kind: EntryKind,
        denomination: Denomination,
        amount: i64,
        balance_after: Option<u64>,
        metadata: Value,
    ) -> EntryId {
        let id = self.next_id(IdKind::Entry);
        let entry = LedgerEntry {
            id,
            account,
            kind,
            denomination,
            amount,
            balance_after,
            metadata,
            created_at: self.now(),
        };
        self.apply(Mutation::AppendEntry(entry));
        id
    }
}

// ============================================================================
// Queries
// ============================================================================

impl StoreState {
    /// Looks up an account by id.
    #[must_use]
    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    /// Looks up an account by its external identity.
    #[must_use]
    pub fn account_by_identity(&self, identity: &str) -> Option<&Account> {
        self.identities
            .get(identity.trim())
            .and_then(|id| self.accounts.get(id))
    }

    /// Looks up an account by referral code.
    #[must_use]
    pub fn account_by_referral_code(&self, code: &str) -> Option<&Account> {
        self.referral_codes
            .get(code.trim())
            .and_then(|id| self.accounts.get(id))
    }

    /// Journal entries of one account, newest first.
    #[must_use]
    pub fn history(
        &self,
        account: AccountId,
        kind: Option<EntryKind>,
        limit: usize,
    ) -> Vec<LedgerEntry> {
        self.journal
            .iter()
            .rev()
            .filter(|e| e.account == account && kind.map_or(true, |k| e.kind == k))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Every journal entry, oldest first.
    #[must_use]
    pub fn journal(&self) -> &[LedgerEntry] {
        &self.journal
    }

    /// Sum of one account's journal amounts in `denomination`.
    #[must_use]
    pub fn journal_sum(&self, account: AccountId, denomination: Denomination) -> i128 {
        self.journal
            .iter()
            .filter(|e| e.account == account && e.denomination == denomination)
            .map(|e| i128::from(e.amount))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::StoreConfig;
    use crate::store::EconomyStore;
    use serde_json::json;
    use std::sync::Arc;

    fn store_with_account(primary: u64) -> (EconomyStore, AccountId) {
        let store = EconomyStore::in_memory(Arc::new(SystemClock), &StoreConfig::default());
        let id = store
            .transaction(|txn| {
                let account = txn.open_account("player-1", None)?;
                if primary > 0 {
                    txn.credit(account.id, Currency::Primary, primary, EntryKind::TopUp, json!({}))?;
                }
                Ok(account.id)
            })
            .unwrap();
        (store, id)
    }

    #[test]
    fn test_credit_and_debit_journal_once_each() {
        let (store, id) = store_with_account(0);

        let after_credit = store
            .transaction(|txn| {
                txn.credit(id, Currency::Primary, 300, EntryKind::DailyReward, json!({"day": 1}))
            })
            .unwrap();
        assert_eq!(after_credit, 300);

        let after_debit = store
            .transaction(|txn| {
                txn.debit(id, Currency::Primary, 120, EntryKind::ContainerOpen, json!({}))
            })
            .unwrap();
        assert_eq!(after_debit, 180);

        store
            .read(|s| {
                let account = s.account(id).unwrap();
                assert_eq!(account.lifetime_earned, 300);
                assert_eq!(account.total_spent, 120);

                let history = s.history(id, None, 10);
                assert_eq!(history.len(), 2);
                assert_eq!(history[0].amount, -120);
                assert_eq!(history[0].balance_after, Some(180));
                assert_eq!(history[1].amount, 300);
                assert_eq!(s.journal_sum(id, Denomination::Primary), 180);
            })
            .unwrap();
    }

    #[test]
    fn test_debit_insufficient_writes_nothing() {
        let (store, id) = store_with_account(50);
        let before = store.read(StoreState::journal_len).unwrap();

        let err = store
            .transaction(|txn| txn.debit(id, Currency::Primary, 51, EntryKind::MarketBuy, json!({})))
            .unwrap_err();
        assert_eq!(
            err,
            EconomyError::InsufficientFunds {
                currency: Currency::Primary,
                required: 51,
                current: 50,
            }
        );

        store
            .read(|s| {
                assert_eq!(s.account(id).unwrap().primary_balance, 50);
                assert_eq!(s.journal_len(), before);
            })
            .unwrap();
    }

    #[test]
    fn test_currencies_are_independent() {
        let (store, id) = store_with_account(1_000);
        let err = store
            .transaction(|txn| txn.debit(id, Currency::Premium, 1, EntryKind::GameWager, json!({})))
            .unwrap_err();
        assert!(matches!(
            err,
            EconomyError::InsufficientFunds { currency: Currency::Premium, .. }
        ));
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let (store, _) = store_with_account(0);
        let err = store
            .transaction(|txn| txn.open_account("player-1", None))
            .unwrap_err();
        assert!(matches!(err, EconomyError::InvalidArgument(_)));
    }

    #[test]
    fn test_identity_validation() {
        let now = Utc::now();
        assert!(Account::new(1, "", "X".into(), None, now).is_err());
        assert!(Account::new(1, "bad\nname", "X".into(), None, now).is_err());
        assert!(Account::new(1, &"x".repeat(200), "X".into(), None, now).is_err());
        assert_eq!(
            Account::new(1, "  tg:42  ", "X".into(), None, now).unwrap().identity,
            "tg:42"
        );
    }

    #[test]
    fn test_referral_codes_unique_and_indexed() {
        let (store, first) = store_with_account(0);
        let second = store
            .transaction(|txn| Ok(txn.open_account("player-2", Some(first))?.id))
            .unwrap();

        store
            .read(|s| {
                let a = s.account(first).unwrap();
                let b = s.account(second).unwrap();
                assert_ne!(a.referral_code, b.referral_code);
                assert_eq!(s.account_by_referral_code(&b.referral_code).unwrap().id, second);
                assert_eq!(b.referred_by, Some(first));
            })
            .unwrap();
    }
}

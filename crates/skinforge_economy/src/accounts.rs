//! # Account Service
//!
//! Registration bonuses, the daily reward streak and the top-up entry
//! point used by the payment collaborator.
//!
//! ## Daily reward
//!
//! ```text
//! reward = daily_base + min(streak × daily_streak_step, daily_streak_cap)
//!
//! last claim         streak
//! ───────────────    ──────────────
//! never              1
//! yesterday (UTC)    previous + 1
//! today (UTC)        AlreadyClaimed { next_available: next UTC midnight }
//! earlier            1
//! ```

use crate::config::RewardsConfig;
use crate::error::{EconomyError, EconomyResult, Entity};
use crate::events::{EconomyEvent, EventBuffer};
use crate::ledger::{Account, AccountId, Currency, EntryKind, LedgerEntry};
use crate::store::EconomyStore;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of [`AccountService::register`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// The account, with bonuses applied.
    pub account: Account,
    /// `false` when the identity was already registered.
    pub created: bool,
}

/// Result of a daily claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DailyClaim {
    /// Amount credited.
    pub reward: u64,
    /// Streak after this claim.
    pub streak: u32,
    /// Primary balance afterwards.
    pub balance: u64,
    /// Start of the next claim window.
    pub next_available: DateTime<Utc>,
}

fn next_midnight(day: NaiveDate) -> EconomyResult<DateTime<Utc>> {
    day.succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or(EconomyError::ArithmeticOverflow)
}

/// Account lifecycle and balance entry points.
pub struct AccountService {
    store: Arc<EconomyStore>,
    config: RewardsConfig,
    events: Arc<EventBuffer>,
}

impl AccountService {
    /// Wires the service to its collaborators.
    pub fn new(store: Arc<EconomyStore>, config: RewardsConfig, events: Arc<EventBuffer>) -> Self {
        Self {
            store,
            config,
            events,
        }
    }

    /// Registers `identity`, or returns its existing account unchanged.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a malformed identity, `NotFound` for an
    /// unknown referral code.
    pub fn register(&self, identity: &str, referral_code: Option<&str>) -> EconomyResult<Registration> {
        let code = referral_code.map(str::trim).filter(|c| !c.is_empty());

        let (registration, referrer) = self.store.transaction(|txn| {
            if let Some(existing) = txn.state().account_by_identity(identity) {
                return Ok((
                    Registration {
                        account: existing.clone(),
                        created: false,
                    },
                    None,
                ));
            }

            let referrer = match code {
                Some(code) => Some(
                    txn.state()
                        .account_by_referral_code(code)
                        .map(|a| a.id)
                        .ok_or_else(|| EconomyError::not_found(Entity::ReferralCode, code))?,
                ),
                None => None,
            };

            let account = txn.open_account(identity, referrer)?;
            if self.config.welcome_bonus > 0 {
                txn.credit(
                    account.id,
                    Currency::Primary,
                    self.config.welcome_bonus,
                    EntryKind::WelcomeBonus,
                    json!({ "referral_code": code }),
                )?;
            }
            if let Some(referrer) = referrer {
                if self.config.referral_bonus > 0 {
                    txn.credit(
                        referrer,
                        Currency::Primary,
                        self.config.referral_bonus,
                        EntryKind::ReferralBonus,
                        json!({ "referred_account": account.id }),
                    )?;
                }
            }

            Ok((
                Registration {
                    account: txn.account(account.id)?.clone(),
                    created: true,
                },
                referrer,
            ))
        })?;

        if registration.created {
            info!(account = registration.account.id, referrer, "account registered");
            self.events.push(EconomyEvent::AccountRegistered {
                account: registration.account.id,
                referrer,
            });
        } else {
            debug!(account = registration.account.id, "identity already registered");
        }
        Ok(registration)
    }

    /// Claims today's reward.
    ///
    /// # Errors
    ///
    /// `AlreadyClaimed` on a second claim within one UTC day, `NotFound`
    /// for an unknown account.
    pub fn claim_daily(&self, caller: AccountId) -> EconomyResult<DailyClaim> {
        let claim = self
            .store
            .transaction(|txn| {
                let now = txn.now();
                let today = now.date_naive();
                let mut account = txn.account(caller)?.clone();
                let last_day = account.last_daily_at.map(|t| t.date_naive());

                if last_day == Some(today) {
                    return Err(EconomyError::AlreadyClaimed {
                        next_available: next_midnight(today)?,
                    });
                }
                let streak = if last_day.is_some() && last_day == today.pred_opt() {
                    account.daily_streak.saturating_add(1)
                } else {
                    1
                };

                let bonus = u64::from(streak)
                    .saturating_mul(self.config.daily_streak_step)
                    .min(self.config.daily_streak_cap);
                let reward = self
                    .config
                    .daily_base
                    .checked_add(bonus)
                    .ok_or(EconomyError::ArithmeticOverflow)?;

                account.daily_streak = streak;
                account.last_daily_at = Some(now);
                txn.update_account_profile(&account)?;
                let balance = txn.credit(
                    caller,
                    Currency::Primary,
                    reward,
                    EntryKind::DailyReward,
                    json!({ "streak": streak, "bonus": bonus }),
                )?;

                Ok(DailyClaim {
                    reward,
                    streak,
                    balance,
                    next_available: next_midnight(today)?,
                })
            })
            .map_err(|e| {
                debug!(account = caller, error = %e, "daily claim rejected");
                e
            })?;

        info!(account = caller, reward = claim.reward, streak = claim.streak, "daily reward claimed");
        self.events.push(EconomyEvent::DailyRewardClaimed {
            account: caller,
            reward: claim.reward,
            streak: claim.streak,
        });
        Ok(claim)
    }

    /// Credits a purchase confirmed by the payment collaborator.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero amount, `NotFound` for an unknown
    /// account, `ArithmeticOverflow` if the balance would overflow.
    pub fn top_up(
        &self,
        account: AccountId,
        currency: Currency,
        amount: u64,
        external_ref: &str,
    ) -> EconomyResult<u64> {
        if amount == 0 {
            return Err(EconomyError::invalid("top-up amount must be positive"));
        }
        let balance = self.store.transaction(|txn| {
            txn.credit(
                account,
                currency,
                amount,
                EntryKind::TopUp,
                json!({ "external_ref": external_ref }),
            )
        })?;
        info!(account, %currency, amount, external_ref, "top-up credited");
        Ok(balance)
    }

    /// Current account state.
    ///
    /// # Errors
    ///
    /// `NotFound` if unknown.
    pub fn profile(&self, account: AccountId) -> EconomyResult<Account> {
        self.store
            .read(|s| s.account(account).cloned())?
            .ok_or_else(|| EconomyError::not_found(Entity::Account, account))
    }

    /// Resolves an external identity to its account.
    ///
    /// # Errors
    ///
    /// `NotFound` if the identity never registered.
    pub fn by_identity(&self, identity: &str) -> EconomyResult<Account> {
        self.store
            .read(|s| s.account_by_identity(identity).cloned())?
            .ok_or_else(|| EconomyError::not_found(Entity::Account, identity))
    }

    /// Journal entries of `account`, newest first.
    ///
    /// # Errors
    ///
    /// `StoreBusy` if the store is locked too long.
    pub fn history(
        &self,
        account: AccountId,
        kind: Option<EntryKind>,
        limit: usize,
    ) -> EconomyResult<Vec<LedgerEntry>> {
        self.store.read(|s| s.history(account, kind, limit))
    }
}

//! # Economy Store
//!
//! **One handle, one lock, one atomic unit per request.**
//!
//! [`EconomyStore`] owns every piece of shared mutable state: accounts and
//! the journal, inventory records, listings, withdrawal requests and game
//! sessions. It is constructed once at startup and handed to each service;
//! there is no process-wide instance.
//!
//! ## Scoped transactions
//!
//! ```text
//! store.transaction(|txn| {            lock acquired (timeout → StoreBusy)
//!     txn.debit(..)?;                  each mutation records an undo image
//!     txn.insert_record(..)?;
//!     Ok(result)                       Ok  → redo records appended to WAL, commit
//! })                                   Err → undo images replayed, nothing visible
//! ```
//!
//! The lock is held for the whole closure, so the balance read that
//! authorizes a debit and the debit itself can never interleave with
//! another request. Unwinding out of the closure also rolls back, because
//! [`Txn`] undoes itself on drop unless it was committed.

use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::error::{EconomyError, EconomyResult};
use crate::inventory::{InventoryRecord, RecordId};
use crate::ledger::{Account, AccountId, LedgerEntry};
use crate::market::{ListingId, MarketListing};
use crate::minigames::GameSession;
use crate::redemption::{WithdrawalId, WithdrawalRequest};
use crate::wal::WriteAheadLog;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

// ============================================================================
// Identifiers
// ============================================================================

/// Id sequences, one per entity kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdCounters {
    account: u64,
    record: u64,
    listing: u64,
    withdrawal: u64,
    session: u64,
    entry: u64,
}

impl Default for IdCounters {
    fn default() -> Self {
        Self {
            account: 1,
            record: 1,
            listing: 1,
            withdrawal: 1,
            session: 1,
            entry: 1,
        }
    }
}

/// Entity kinds that draw ids from [`IdCounters`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IdKind {
    Account,
    Record,
    Listing,
    Withdrawal,
    Session,
    Entry,
}

impl IdCounters {
    fn slot(&mut self, kind: IdKind) -> &mut u64 {
        match kind {
            IdKind::Account => &mut self.account,
            IdKind::Record => &mut self.record,
            IdKind::Listing => &mut self.listing,
            IdKind::Withdrawal => &mut self.withdrawal,
            IdKind::Session => &mut self.session,
            IdKind::Entry => &mut self.entry,
        }
    }

    fn take(&mut self, kind: IdKind) -> u64 {
        let slot = self.slot(kind);
        let id = *slot;
        *slot += 1;
        id
    }

    /// Makes sure the next id handed out for `kind` is above `seen`.
    fn observe(&mut self, kind: IdKind, seen: u64) {
        let slot = self.slot(kind);
        *slot = (*slot).max(seen.saturating_add(1));
    }

    fn merge(&mut self, other: &Self) {
        self.account = self.account.max(other.account);
        self.record = self.record.max(other.record);
        self.listing = self.listing.max(other.listing);
        self.withdrawal = self.withdrawal.max(other.withdrawal);
        self.session = self.session.max(other.session);
        self.entry = self.entry.max(other.entry);
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// A single redo record. Applying the committed mutations of a log in
/// order rebuilds the store exactly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum Mutation {
    /// Insert or replace an account.
    PutAccount(Account),
    /// Insert or replace an inventory record.
    PutRecord(InventoryRecord),
    /// Delete an inventory record.
    RemoveRecord(RecordId),
    /// Insert or replace a listing.
    PutListing(MarketListing),
    /// Insert or replace a withdrawal request.
    PutWithdrawal(WithdrawalRequest),
    /// Append a game session.
    AppendSession(GameSession),
    /// Append a journal entry.
    AppendEntry(LedgerEntry),
    /// Raise id sequences (written by compaction).
    ReserveIds(IdCounters),
}

/// Inverse of one applied [`Mutation`].
enum Undo {
    Account(AccountId, Option<Account>),
    Record(RecordId, Option<InventoryRecord>),
    Listing(ListingId, Option<MarketListing>),
    Withdrawal(WithdrawalId, Option<WithdrawalRequest>),
    PopSession,
    PopEntry,
    Ids(IdCounters),
}

// ============================================================================
// State
// ============================================================================

/// Everything the store holds. Read access is public through the query
/// methods on this type; writes only happen through [`Txn`].
#[derive(Debug, Default)]
pub struct StoreState {
    pub(crate) accounts: BTreeMap<AccountId, Account>,
    pub(crate) identities: HashMap<String, AccountId>,
    pub(crate) referral_codes: HashMap<String, AccountId>,
    pub(crate) journal: Vec<LedgerEntry>,
    pub(crate) records: BTreeMap<RecordId, InventoryRecord>,
    pub(crate) listings: BTreeMap<ListingId, MarketListing>,
    pub(crate) withdrawals: BTreeMap<WithdrawalId, WithdrawalRequest>,
    pub(crate) sessions: Vec<GameSession>,
    ids: IdCounters,
}

impl StoreState {
    fn apply(&mut self, mutation: Mutation) -> Undo {
        match mutation {
            Mutation::PutAccount(account) => {
                let id = account.id;
                self.ids.observe(IdKind::Account, id);
                self.identities.insert(account.identity.clone(), id);
                self.referral_codes.insert(account.referral_code.clone(), id);
                Undo::Account(id, self.accounts.insert(id, account))
            }
            Mutation::PutRecord(record) => {
                let id = record.id;
                self.ids.observe(IdKind::Record, id);
                Undo::Record(id, self.records.insert(id, record))
            }
            Mutation::RemoveRecord(id) => Undo::Record(id, self.records.remove(&id)),
            Mutation::PutListing(listing) => {
                let id = listing.id;
                self.ids.observe(IdKind::Listing, id);
                Undo::Listing(id, self.listings.insert(id, listing))
            }
            Mutation::PutWithdrawal(request) => {
                let id = request.id;
                self.ids.observe(IdKind::Withdrawal, id);
                Undo::Withdrawal(id, self.withdrawals.insert(id, request))
            }
            Mutation::AppendSession(session) => {
                self.ids.observe(IdKind::Session, session.id);
                self.sessions.push(session);
                Undo::PopSession
            }
            Mutation::AppendEntry(entry) => {
                self.ids.observe(IdKind::Entry, entry.id);
                self.journal.push(entry);
                Undo::PopEntry
            }
            Mutation::ReserveIds(ids) => {
                let before = self.ids;
                self.ids.merge(&ids);
                Undo::Ids(before)
            }
        }
    }

    fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::Account(id, Some(account)) => {
                self.accounts.insert(id, account);
            }
            Undo::Account(id, None) => {
                if let Some(account) = self.accounts.remove(&id) {
                    self.identities.remove(&account.identity);
                    self.referral_codes.remove(&account.referral_code);
                }
            }
            Undo::Record(id, Some(record)) => {
                self.records.insert(id, record);
            }
            Undo::Record(id, None) => {
                self.records.remove(&id);
            }
            Undo::Listing(id, Some(listing)) => {
                self.listings.insert(id, listing);
            }
            Undo::Listing(id, None) => {
                self.listings.remove(&id);
            }
            Undo::Withdrawal(id, Some(request)) => {
                self.withdrawals.insert(id, request);
            }
            Undo::Withdrawal(id, None) => {
                self.withdrawals.remove(&id);
            }
            Undo::PopSession => {
                self.sessions.pop();
            }
            Undo::PopEntry => {
                self.journal.pop();
            }
            Undo::Ids(ids) => self.ids = ids,
        }
    }

    /// The full state as a mutation list, for log compaction.
    fn snapshot(&self) -> Vec<Mutation> {
        let mut out = Vec::with_capacity(
            1 + self.accounts.len()
                + self.records.len()
                + self.listings.len()
                + self.withdrawals.len()
                + self.sessions.len()
                + self.journal.len(),
        );
        out.push(Mutation::ReserveIds(self.ids));
        out.extend(self.accounts.values().cloned().map(Mutation::PutAccount));
        out.extend(self.records.values().cloned().map(Mutation::PutRecord));
        out.extend(self.listings.values().cloned().map(Mutation::PutListing));
        out.extend(self.withdrawals.values().cloned().map(Mutation::PutWithdrawal));
        out.extend(self.sessions.iter().cloned().map(Mutation::AppendSession));
        out.extend(self.journal.iter().cloned().map(Mutation::AppendEntry));
        out
    }

    /// Number of journal entries.
    #[must_use]
    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// An open transaction. All service code mutates state through this type.
///
/// Dropping a `Txn` that was not committed reverts every mutation it made,
/// newest first, and restores the id sequences.
pub struct Txn<'s> {
    state: &'s mut StoreState,
    undo: Vec<Undo>,
    redo: Vec<Mutation>,
    ids_at_begin: IdCounters,
    now: DateTime<Utc>,
    committed: bool,
}

impl<'s> Txn<'s> {
    fn begin(state: &'s mut StoreState, now: DateTime<Utc>) -> Self {
        let ids_at_begin = state.ids;
        Self {
            state,
            undo: Vec::new(),
            redo: Vec::new(),
            ids_at_begin,
            now,
            committed: false,
        }
    }

    /// Timestamp shared by everything this transaction writes.
    #[inline]
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Read access to the state as this transaction sees it.
    #[inline]
    #[must_use]
    pub fn state(&self) -> &StoreState {
        self.state
    }

    /// Number of mutations recorded so far.
    #[must_use]
    pub fn pending_mutations(&self) -> usize {
        self.redo.len()
    }

    pub(crate) fn apply(&mut self, mutation: Mutation) {
        let undo = self.state.apply(mutation.clone());
        self.undo.push(undo);
        self.redo.push(mutation);
    }

    pub(crate) fn next_id(&mut self, kind: IdKind) -> u64 {
        self.state.ids.take(kind)
    }

    fn commit(mut self, wal: Option<&WriteAheadLog>) -> EconomyResult<usize> {
        if let Some(wal) = wal {
            if !self.redo.is_empty() {
                wal.append_transaction(&self.redo)?;
            }
        }
        self.committed = true;
        Ok(self.redo.len())
    }

    fn rollback_in_place(&mut self) {
        let reverted = self.undo.len();
        while let Some(undo) = self.undo.pop() {
            self.state.revert(undo);
        }
        self.state.ids = self.ids_at_begin;
        self.redo.clear();
        if reverted > 0 {
            trace!(reverted, "transaction rolled back");
        }
    }
}

impl Drop for Txn<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback_in_place();
        }
    }
}

// ============================================================================
// Store handle
// ============================================================================

/// The explicitly constructed store handle shared by every service.
pub struct EconomyStore {
    state: Mutex<StoreState>,
    wal: Option<WriteAheadLog>,
    clock: Arc<dyn Clock>,
    lock_timeout: Duration,
}

impl EconomyStore {
    /// Creates a volatile store. Nothing survives the process.
    pub fn in_memory(clock: Arc<dyn Clock>, config: &StoreConfig) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            wal: None,
            clock,
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
        }
    }

    /// Opens a durable store, replaying the write-ahead log at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
        config: &StoreConfig,
    ) -> EconomyResult<Self> {
        let start = Instant::now();
        let (wal, recovery) = WriteAheadLog::open(path.as_ref(), config.sync_on_commit)?;

        let mut state = StoreState::default();
        let replayed = recovery.mutations.len();
        for mutation in recovery.mutations {
            state.apply(mutation);
        }

        info!(
            path = %path.as_ref().display(),
            transactions = recovery.committed_transactions,
            mutations = replayed,
            accounts = state.accounts.len(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "economy store recovered"
        );

        Ok(Self {
            state: Mutex::new(state),
            wal: Some(wal),
            clock,
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
        })
    }

    /// Runs `f` as one atomic unit.
    ///
    /// Commits when `f` returns `Ok` (after the redo records are durable, if
    /// a log is configured). Rolls back when `f` returns `Err`, panics, or
    /// the log append fails.
    ///
    /// # Errors
    ///
    /// `StoreBusy` if the lock is not acquired within the configured
    /// timeout, `Storage` if the log append fails, or whatever `f` returns.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Txn<'_>) -> EconomyResult<T>,
    ) -> EconomyResult<T> {
        let mut guard = self
            .state
            .try_lock_for(self.lock_timeout)
            .ok_or(EconomyError::StoreBusy)?;

        let mut txn = Txn::begin(&mut guard, self.clock.now());
        let value = f(&mut txn)?;
        let mutations = txn.commit(self.wal.as_ref())?;
        trace!(mutations, "transaction committed");
        Ok(value)
    }

    /// Runs a read-only query against a consistent view.
    ///
    /// # Errors
    ///
    /// `StoreBusy` if the lock is not acquired in time.
    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> EconomyResult<T> {
        let guard = self
            .state
            .try_lock_for(self.lock_timeout)
            .ok_or(EconomyError::StoreBusy)?;
        Ok(f(&guard))
    }

    /// Rewrites the log as a single snapshot transaction.
    ///
    /// A no-op for in-memory stores.
    ///
    /// # Errors
    ///
    /// `StoreBusy` or `Storage`.
    pub fn compact(&self) -> EconomyResult<()> {
        let Some(wal) = &self.wal else {
            return Ok(());
        };
        let guard = self
            .state
            .try_lock_for(self.lock_timeout)
            .ok_or(EconomyError::StoreBusy)?;
        let snapshot = guard.snapshot();
        wal.rewrite(&snapshot)?;
        debug!(mutations = snapshot.len(), "write-ahead log compacted");
        Ok(())
    }

    /// Current time according to the store's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Whether commits are persisted.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.wal.is_some()
    }
}

impl std::fmt::Debug for EconomyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EconomyStore")
            .field("durable", &self.wal.is_some())
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::ledger::{Currency, EntryKind};
    use serde_json::json;

    fn store() -> EconomyStore {
        EconomyStore::in_memory(Arc::new(SystemClock), &StoreConfig::default())
    }

    #[test]
    fn test_commit_on_ok() {
        let store = store();
        let id = store
            .transaction(|txn| {
                let account = txn.open_account("alice", None)?;
                txn.credit(account.id, Currency::Primary, 250, EntryKind::TopUp, json!({}))?;
                Ok(account.id)
            })
            .unwrap();

        let balance = store
            .read(|s| s.account(id).map(|a| a.primary_balance))
            .unwrap();
        assert_eq!(balance, Some(250));
        assert_eq!(store.read(StoreState::journal_len).unwrap(), 1);
    }

    #[test]
    fn test_rollback_on_err() {
        let store = store();
        let id = store
            .transaction(|txn| Ok(txn.open_account("bob", None)?.id))
            .unwrap();

        let result: EconomyResult<()> = store.transaction(|txn| {
            txn.credit(id, Currency::Primary, 100, EntryKind::TopUp, json!({}))?;
            txn.open_account("carol", None)?;
            Err(EconomyError::invalid("abort"))
        });
        assert!(result.is_err());

        store
            .read(|s| {
                assert_eq!(s.account(id).unwrap().primary_balance, 0);
                assert!(s.account_by_identity("carol").is_none());
                assert_eq!(s.journal_len(), 0);
            })
            .unwrap();

        // The id sequence rewinds with the rollback.
        let next = store
            .transaction(|txn| Ok(txn.open_account("dave", None)?.id))
            .unwrap();
        assert_eq!(next, id + 1);
    }

    #[test]
    fn test_rollback_on_panic() {
        let store = store();
        let id = store
            .transaction(|txn| Ok(txn.open_account("erin", None)?.id))
            .unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: EconomyResult<()> = store.transaction(|txn| {
                txn.credit(id, Currency::Premium, 10, EntryKind::TopUp, json!({}))?;
                panic!("boom");
            });
        }));
        assert!(outcome.is_err());

        let premium = store
            .read(|s| s.account(id).map(|a| a.premium_balance))
            .unwrap();
        assert_eq!(premium, Some(0));
    }

    #[test]
    fn test_busy_when_lock_held() {
        let config = StoreConfig {
            lock_timeout_ms: 10,
            ..StoreConfig::default()
        };
        let store = Arc::new(EconomyStore::in_memory(Arc::new(SystemClock), &config));

        let inner = Arc::clone(&store);
        let result = store.transaction(|_| Ok(inner.read(|_| ())));
        assert_eq!(result.unwrap(), Err(EconomyError::StoreBusy));
    }
}

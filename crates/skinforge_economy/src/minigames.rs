//! # Minigames
//!
//! Wager-based games paid out of and into the premium balance.
//!
//! ```text
//! play(caller, request)
//!   ├─ wager within the game's bounds, parameters valid   ── InvalidArgument
//!   └─ transaction
//!        ├─ debit wager (premium)                          ── InsufficientFunds
//!        ├─ resolve outcome from the shared random source
//!        ├─ win: credit floor(wager × multiplier) (premium)
//!        └─ append GameSession
//! ```
//!
//! Resolution is a pure function of the draws, so a [`ScriptedSource`]
//! reproduces any round exactly. Draws happen after the debit: a rejected
//! request never consumes randomness.
//!
//! [`ScriptedSource`]: crate::random::ScriptedSource

use crate::config::GamesConfig;
use crate::error::{EconomyError, EconomyResult};
use crate::events::{EconomyEvent, EventBuffer};
use crate::fixed_point::FixedPoint;
use crate::ledger::{AccountId, Currency, EntryKind};
use crate::random::{RandomSource, SharedRandom};
use crate::store::{EconomyStore, IdKind, Mutation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Game session identifier.
pub type SessionId = u64;

/// Wheel pockets coloured red. Every other non-zero pocket is black.
pub const RED_NUMBERS: [u8; 18] = [1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36];

/// Symbols on every reel, in draw order.
pub const REEL: [Symbol; 8] = [
    Symbol::Cherry,
    Symbol::Lemon,
    Symbol::Orange,
    Symbol::Watermelon,
    Symbol::Star,
    Symbol::Seven,
    Symbol::Bell,
    Symbol::Diamond,
];

// ============================================================================
// Requests and outcomes
// ============================================================================

/// The four games.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    /// Two dice against a target.
    Dice,
    /// 37-pocket wheel.
    Wheel,
    /// Three reels.
    Reels,
    /// Coin flip.
    Coin,
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dice => "dice",
            Self::Wheel => "wheel",
            Self::Reels => "reels",
            Self::Coin => "coin",
        })
    }
}

/// Dice call relative to the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DicePrediction {
    /// Sum strictly above the target.
    Higher,
    /// Sum strictly below the target.
    Lower,
    /// Sum equal to the target.
    Exact,
}

/// Wheel bet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum WheelBet {
    /// Any red pocket.
    Red,
    /// Any black pocket.
    Black,
    /// The zero pocket.
    Green,
    /// One pocket, `0..=36`.
    Number(u8),
    /// Non-zero even pocket.
    Even,
    /// Odd pocket.
    Odd,
    /// `1` = 1-12, `2` = 13-24, `3` = 25-36.
    Dozen(u8),
    /// `1`, `2` or `3`, by `(n - 1) % 3 + 1`.
    Column(u8),
}

/// Pocket colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelColor {
    /// Red.
    Red,
    /// Black.
    Black,
    /// Zero.
    Green,
}

/// Reel symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    /// Cherry.
    Cherry,
    /// Lemon.
    Lemon,
    /// Orange.
    Orange,
    /// Watermelon.
    Watermelon,
    /// Star.
    Star,
    /// Seven.
    Seven,
    /// Bell.
    Bell,
    /// Diamond.
    Diamond,
}

/// Coin face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinSide {
    /// Heads.
    Heads,
    /// Tails.
    Tails,
}

/// A request to play one round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "game")]
pub enum GameRequest {
    /// Dice.
    Dice {
        /// Stake.
        wager: u64,
        /// Target sum.
        target: u8,
        /// Call.
        prediction: DicePrediction,
    },
    /// Wheel.
    Wheel {
        /// Stake.
        wager: u64,
        /// Bet.
        bet: WheelBet,
    },
    /// Reels.
    Reels {
        /// Stake.
        wager: u64,
    },
    /// Coin.
    Coin {
        /// Stake.
        wager: u64,
        /// Call.
        call: CoinSide,
    },
}

impl GameRequest {
    /// Which game this is.
    #[must_use]
    pub fn kind(&self) -> GameKind {
        match self {
            Self::Dice { .. } => GameKind::Dice,
            Self::Wheel { .. } => GameKind::Wheel,
            Self::Reels { .. } => GameKind::Reels,
            Self::Coin { .. } => GameKind::Coin,
        }
    }

    /// Stake.
    #[must_use]
    pub fn wager(&self) -> u64 {
        match *self {
            Self::Dice { wager, .. }
            | Self::Wheel { wager, .. }
            | Self::Reels { wager }
            | Self::Coin { wager, .. } => wager,
        }
    }
}

/// What the random source produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "game")]
pub enum GameOutcome {
    /// Dice faces.
    Dice {
        /// First die.
        die1: u8,
        /// Second die.
        die2: u8,
        /// Sum.
        total: u8,
    },
    /// Wheel pocket.
    Wheel {
        /// Pocket number.
        number: u8,
        /// Pocket colour.
        color: WheelColor,
    },
    /// Reel symbols, left to right.
    Reels {
        /// Symbols.
        symbols: [Symbol; 3],
    },
    /// Coin face.
    Coin {
        /// Face.
        side: CoinSide,
    },
}

/// Persisted record of one round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    /// Session id.
    pub id: SessionId,
    /// Player.
    pub account: AccountId,
    /// Game.
    pub kind: GameKind,
    /// Request as played.
    pub request: GameRequest,
    /// Stake.
    pub wager: u64,
    /// Draws.
    pub outcome: GameOutcome,
    /// Multiplier applied, zero on a loss.
    pub multiplier: FixedPoint,
    /// Payout, zero on a loss.
    pub win_amount: u64,
    /// When the round was played.
    pub played_at: DateTime<Utc>,
}

impl GameSession {
    /// Whether the round paid out.
    #[must_use]
    pub fn is_win(&self) -> bool {
        self.win_amount > 0
    }
}

/// Result of [`MinigameService::play`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameResult {
    /// The recorded session.
    pub session: GameSession,
    /// Premium balance afterwards.
    pub balance: u64,
}

/// Aggregate numbers over a player's sessions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GameStats {
    /// Rounds played.
    pub games: u64,
    /// Sum of wagers.
    pub wagered: u64,
    /// Sum of payouts.
    pub won: u64,
    /// Rounds that paid out.
    pub wins: u64,
}

impl GameStats {
    /// Payouts minus wagers.
    #[must_use]
    pub fn net(&self) -> i128 {
        i128::from(self.won) - i128::from(self.wagered)
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Colour of a wheel pocket.
#[must_use]
pub fn wheel_color(number: u8) -> WheelColor {
    if number == 0 {
        WheelColor::Green
    } else if RED_NUMBERS.contains(&number) {
        WheelColor::Red
    } else {
        WheelColor::Black
    }
}

fn wheel_wins(bet: WheelBet, number: u8) -> bool {
    let color = wheel_color(number);
    match bet {
        WheelBet::Red => color == WheelColor::Red,
        WheelBet::Black => color == WheelColor::Black,
        WheelBet::Green => number == 0,
        WheelBet::Number(n) => n == number,
        WheelBet::Even => number != 0 && number % 2 == 0,
        WheelBet::Odd => number % 2 == 1,
        WheelBet::Dozen(d) => number != 0 && (number - 1) / 12 + 1 == d,
        WheelBet::Column(c) => number != 0 && (number - 1) % 3 + 1 == c,
    }
}

fn draw_u8(rng: &mut dyn RandomSource, low: u8, high: u8) -> u8 {
    let value = rng.next_in_range(u32::from(low), u32::from(high));
    u8::try_from(value).unwrap_or(high)
}

/// Draws an outcome and the multiplier it pays.
fn resolve(config: &GamesConfig, request: &GameRequest, rng: &mut dyn RandomSource) -> (GameOutcome, FixedPoint) {
    match *request {
        GameRequest::Dice { target, prediction, .. } => {
            let die1 = draw_u8(rng, 1, 6);
            let die2 = draw_u8(rng, 1, 6);
            let total = die1 + die2;
            let dice = &config.dice;
            let multiplier = match prediction {
                DicePrediction::Higher if total > target => dice.higher_multiplier,
                DicePrediction::Lower if total < target => dice.lower_multiplier,
                DicePrediction::Exact if total == target => dice.exact_multiplier,
                _ => FixedPoint::ZERO,
            };
            (GameOutcome::Dice { die1, die2, total }, multiplier)
        }
        GameRequest::Wheel { bet, .. } => {
            let number = draw_u8(rng, 0, 36);
            let wheel = &config.wheel;
            let multiplier = if wheel_wins(bet, number) {
                match bet {
                    WheelBet::Red | WheelBet::Black => wheel.color_multiplier,
                    WheelBet::Green => wheel.green_multiplier,
                    WheelBet::Number(_) => wheel.number_multiplier,
                    WheelBet::Even | WheelBet::Odd => wheel.parity_multiplier,
                    WheelBet::Dozen(_) => wheel.dozen_multiplier,
                    WheelBet::Column(_) => wheel.column_multiplier,
                }
            } else {
                FixedPoint::ZERO
            };
            let color = wheel_color(number);
            (GameOutcome::Wheel { number, color }, multiplier)
        }
        GameRequest::Reels { .. } => {
            let last = u8::try_from(REEL.len() - 1).unwrap_or(u8::MAX);
            let symbols = [0; 3].map(|_| REEL[usize::from(draw_u8(rng, 0, last))]);
            (GameOutcome::Reels { symbols }, reels_multiplier(config, symbols))
        }
        GameRequest::Coin { call, .. } => {
            let side = if rng.next_in_range(0, 1) == 0 {
                CoinSide::Heads
            } else {
                CoinSide::Tails
            };
            let multiplier = if side == call {
                config.coin.multiplier
            } else {
                FixedPoint::ZERO
            };
            (GameOutcome::Coin { side }, multiplier)
        }
    }
}

fn reels_multiplier(config: &GamesConfig, [a, b, c]: [Symbol; 3]) -> FixedPoint {
    let reels = &config.reels;
    if a == b && b == c {
        match a {
            Symbol::Seven => reels.seven_triple,
            Symbol::Diamond => reels.diamond_triple,
            Symbol::Star => reels.star_triple,
            Symbol::Bell => reels.bell_triple,
            _ => reels.other_triple,
        }
    } else if a == b || b == c || a == c {
        reels.pair
    } else {
        FixedPoint::ZERO
    }
}

// ============================================================================
// Service
// ============================================================================

/// Plays minigames against the premium balance.
pub struct MinigameService {
    store: Arc<EconomyStore>,
    config: GamesConfig,
    random: SharedRandom,
    events: Arc<EventBuffer>,
}

impl MinigameService {
    /// Wires the service to its collaborators.
    pub fn new(
        store: Arc<EconomyStore>,
        config: GamesConfig,
        random: SharedRandom,
        events: Arc<EventBuffer>,
    ) -> Self {
        Self {
            store,
            config,
            random,
            events,
        }
    }

    fn validate(&self, request: &GameRequest) -> EconomyResult<()> {
        let (limits, kind) = match request {
            GameRequest::Dice { .. } => (self.config.dice.limits(), GameKind::Dice),
            GameRequest::Wheel { .. } => (self.config.wheel.limits(), GameKind::Wheel),
            GameRequest::Reels { .. } => (self.config.reels.limits(), GameKind::Reels),
            GameRequest::Coin { .. } => (self.config.coin.limits(), GameKind::Coin),
        };
        if !limits.accepts(request.wager()) {
            return Err(EconomyError::invalid(format!(
                "{kind} wager must be between {} and {}",
                limits.min_wager, limits.max_wager
            )));
        }

        match *request {
            GameRequest::Dice { target, .. } => {
                let dice = &self.config.dice;
                if !(dice.min_target..=dice.max_target).contains(&target) {
                    return Err(EconomyError::invalid(format!(
                        "dice target must be between {} and {}",
                        dice.min_target, dice.max_target
                    )));
                }
            }
            GameRequest::Wheel { bet, .. } => match bet {
                WheelBet::Number(n) if n > 36 => {
                    return Err(EconomyError::invalid("wheel number must be between 0 and 36"));
                }
                WheelBet::Dozen(d) | WheelBet::Column(d) if !(1..=3).contains(&d) => {
                    return Err(EconomyError::invalid("wheel dozen or column must be 1, 2 or 3"));
                }
                _ => {}
            },
            GameRequest::Reels { .. } | GameRequest::Coin { .. } => {}
        }
        Ok(())
    }

    /// Plays one round.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a wager or parameter out of bounds,
    /// `InsufficientFunds` if the premium balance is below the wager,
    /// `NotFound` for an unknown caller.
    pub fn play(&self, caller: AccountId, request: GameRequest) -> EconomyResult<GameResult> {
        self.validate(&request)
            .map_err(|e| reject(caller, &request, e))?;
        let kind = request.kind();
        let wager = request.wager();

        let result = self
            .store
            .transaction(|txn| {
                let session_id = txn.next_id(IdKind::Session);
                let mut balance = txn.debit(
                    caller,
                    Currency::Premium,
                    wager,
                    EntryKind::GameWager,
                    json!({ "session_id": session_id, "game": kind }),
                )?;

                let (outcome, multiplier) = self.random.with(|rng| resolve(&self.config, &request, rng));
                let win_amount = multiplier.safe_apply_floor(wager)?;
                if win_amount > 0 {
                    balance = txn.credit(
                        caller,
                        Currency::Premium,
                        win_amount,
                        EntryKind::GamePayout,
                        json!({
                            "session_id": session_id,
                            "game": kind,
                            "multiplier": multiplier,
                        }),
                    )?;
                }

                let session = GameSession {
                    id: session_id,
                    account: caller,
                    kind,
                    request,
                    wager,
                    outcome,
                    multiplier,
                    win_amount,
                    played_at: txn.now(),
                };
                txn.apply(Mutation::AppendSession(session.clone()));
                Ok(GameResult { session, balance })
            })
            .map_err(|e| reject(caller, &request, e))?;

        info!(
            account = caller,
            game = %kind,
            wager,
            win = result.session.win_amount,
            "game played"
        );
        self.events.push(EconomyEvent::GamePlayed {
            account: caller,
            kind,
            wager,
            win_amount: result.session.win_amount,
        });
        Ok(result)
    }

    /// The caller's sessions, newest first, optionally for one game.
    ///
    /// # Errors
    ///
    /// `StoreBusy` if the store is locked too long.
    pub fn history(
        &self,
        caller: AccountId,
        kind: Option<GameKind>,
        limit: usize,
    ) -> EconomyResult<Vec<GameSession>> {
        self.store.read(|s| {
            s.sessions
                .iter()
                .rev()
                .filter(|g| g.account == caller && kind.map_or(true, |k| g.kind == k))
                .take(limit)
                .cloned()
                .collect()
        })
    }

    /// Totals across every session of the caller.
    ///
    /// # Errors
    ///
    /// `StoreBusy` if the store is locked too long.
    pub fn stats(&self, caller: AccountId) -> EconomyResult<GameStats> {
        self.store.read(|s| {
            s.sessions
                .iter()
                .filter(|g| g.account == caller)
                .fold(GameStats::default(), |mut stats, g| {
                    stats.games += 1;
                    stats.wagered = stats.wagered.saturating_add(g.wager);
                    stats.won = stats.won.saturating_add(g.win_amount);
                    stats.wins += u64::from(g.is_win());
                    stats
                })
        })
    }
}

fn reject(caller: AccountId, request: &GameRequest, error: EconomyError) -> EconomyError {
    debug!(account = caller, game = %request.kind(), wager = request.wager(), error = %error, "game rejected");
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::StoreConfig;
    use crate::random::ScriptedSource;
    use crate::store::StoreState;

    fn setup(premium: u64, draws: Vec<f64>) -> (MinigameService, Arc<EconomyStore>, AccountId) {
        let store = Arc::new(EconomyStore::in_memory(Arc::new(SystemClock), &StoreConfig::default()));
        let caller = store
            .transaction(|txn| {
                let id = txn.open_account("gambler", None)?.id;
                if premium > 0 {
                    txn.credit(id, Currency::Premium, premium, EntryKind::TopUp, json!({}))?;
                }
                Ok(id)
            })
            .unwrap();
        let service = MinigameService::new(
            Arc::clone(&store),
            GamesConfig::default(),
            SharedRandom::new(ScriptedSource::new(draws)),
            Arc::new(EventBuffer::new()),
        );
        (service, store, caller)
    }

    fn die(face: u32) -> f64 {
        ScriptedSource::unit_for(face, 1, 6)
    }

    #[test]
    fn test_dice_exact_pays_six_times() {
        let (service, store, caller) = setup(1_000, vec![die(3), die(4)]);
        let result = service
            .play(
                caller,
                GameRequest::Dice {
                    wager: 100,
                    target: 7,
                    prediction: DicePrediction::Exact,
                },
            )
            .unwrap();

        assert_eq!(result.session.outcome, GameOutcome::Dice { die1: 3, die2: 4, total: 7 });
        assert_eq!(result.session.win_amount, 600);
        assert_eq!(result.balance, 1_500);

        store
            .read(|s| {
                let history = s.history(caller, None, 2);
                assert_eq!(history[0].kind, EntryKind::GamePayout);
                assert_eq!(history[0].amount, 600);
                assert_eq!(history[1].kind, EntryKind::GameWager);
                assert_eq!(history[1].amount, -100);
                assert_eq!(history[1].metadata["session_id"], result.session.id);
            })
            .unwrap();
    }

    #[test]
    fn test_dice_loss_keeps_wager() {
        let (service, _, caller) = setup(1_000, vec![die(1), die(1)]);
        let result = service
            .play(
                caller,
                GameRequest::Dice {
                    wager: 100,
                    target: 7,
                    prediction: DicePrediction::Higher,
                },
            )
            .unwrap();
        assert!(!result.session.is_win());
        assert_eq!(result.balance, 900);
    }

    #[test]
    fn test_wager_bounds_and_parameters() {
        let (service, store, caller) = setup(10_000, vec![0.5]);
        let before = store.read(StoreState::journal_len).unwrap();

        for request in [
            GameRequest::Dice { wager: 5, target: 7, prediction: DicePrediction::Exact },
            GameRequest::Dice { wager: 100, target: 13, prediction: DicePrediction::Exact },
            GameRequest::Wheel { wager: 10, bet: WheelBet::Red },
            GameRequest::Wheel { wager: 100, bet: WheelBet::Number(37) },
            GameRequest::Wheel { wager: 100, bet: WheelBet::Dozen(4) },
            GameRequest::Reels { wager: 2_001 },
            GameRequest::Coin { wager: 0, call: CoinSide::Heads },
        ] {
            assert!(matches!(service.play(caller, request), Err(EconomyError::InvalidArgument(_))));
        }
        assert_eq!(store.read(StoreState::journal_len).unwrap(), before);
    }

    #[test]
    fn test_insufficient_premium_changes_nothing() {
        let (service, store, caller) = setup(50, vec![0.5]);
        let err = service
            .play(caller, GameRequest::Coin { wager: 100, call: CoinSide::Heads })
            .unwrap_err();
        assert_eq!(
            err,
            EconomyError::InsufficientFunds {
                currency: Currency::Premium,
                required: 100,
                current: 50,
            }
        );
        store
            .read(|s| {
                assert!(s.sessions.is_empty());
                assert_eq!(s.account(caller).unwrap().premium_balance, 50);
            })
            .unwrap();
    }

    #[test]
    fn test_wheel_classification() {
        assert_eq!(wheel_color(0), WheelColor::Green);
        assert_eq!(wheel_color(1), WheelColor::Red);
        assert_eq!(wheel_color(2), WheelColor::Black);
        assert!(wheel_wins(WheelBet::Dozen(3), 25));
        assert!(!wheel_wins(WheelBet::Dozen(1), 13));
        assert!(wheel_wins(WheelBet::Column(1), 34));
        assert!(wheel_wins(WheelBet::Column(3), 36));
        assert!(!wheel_wins(WheelBet::Even, 0));
        assert!(!wheel_wins(WheelBet::Odd, 0));
    }

    #[test]
    fn test_wheel_green_pays_thirty_six() {
        let (service, _, caller) = setup(1_000, vec![ScriptedSource::unit_for(0, 0, 36)]);
        let result = service
            .play(caller, GameRequest::Wheel { wager: 50, bet: WheelBet::Green })
            .unwrap();
        assert_eq!(result.session.outcome, GameOutcome::Wheel { number: 0, color: WheelColor::Green });
        assert_eq!(result.session.win_amount, 1_800);
    }

    #[test]
    fn test_reels_paytable() {
        let config = GamesConfig::default();
        let seven = FixedPoint::from_whole(10);
        assert_eq!(reels_multiplier(&config, [Symbol::Seven; 3]), seven);
        assert_eq!(reels_multiplier(&config, [Symbol::Lemon; 3]), FixedPoint::from_whole(4));
        assert_eq!(
            reels_multiplier(&config, [Symbol::Bell, Symbol::Cherry, Symbol::Bell]),
            FixedPoint::from_whole(2)
        );
        assert_eq!(
            reels_multiplier(&config, [Symbol::Bell, Symbol::Cherry, Symbol::Star]),
            FixedPoint::ZERO
        );

        let seven_draw = ScriptedSource::unit_for(5, 0, 7);
        let (service, _, caller) = setup(1_000, vec![seven_draw]);
        let result = service.play(caller, GameRequest::Reels { wager: 20 }).unwrap();
        assert_eq!(result.session.outcome, GameOutcome::Reels { symbols: [Symbol::Seven; 3] });
        assert_eq!(result.session.win_amount, 200);
    }

    #[test]
    fn test_coin_payout_floors() {
        let (service, _, caller) = setup(1_000, vec![0.1]);
        let result = service
            .play(caller, GameRequest::Coin { wager: 15, call: CoinSide::Heads })
            .unwrap();
        assert_eq!(result.session.win_amount, 29);
        assert_eq!(result.balance, 1_000 - 15 + 29);
    }

    #[test]
    fn test_history_and_stats() {
        let (service, _, caller) = setup(1_000, vec![0.1, 0.9]);
        service.play(caller, GameRequest::Coin { wager: 100, call: CoinSide::Heads }).unwrap();
        service.play(caller, GameRequest::Coin { wager: 100, call: CoinSide::Heads }).unwrap();

        let history = service.history(caller, Some(GameKind::Coin), 10).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].id > history[1].id);
        assert!(service.history(caller, Some(GameKind::Dice), 10).unwrap().is_empty());

        let stats = service.stats(caller).unwrap();
        assert_eq!(stats.games, 2);
        assert_eq!(stats.wagered, 200);
        assert_eq!(stats.won, 195);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.net(), -5);
    }
}

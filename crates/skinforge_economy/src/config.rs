//! # Economy Configuration
//!
//! All tunable numbers live in `economy.toml`, loaded once at startup:
//!
//! ```toml
//! [market]
//! min_price = 10
//! max_price = 1000000
//! fee_tiers = [{ max_days = 1, percent = 5 }, { max_days = 3, percent = 4 }]
//! fallback_fee_percent = 1
//!
//! [games.coin]
//! min_wager = 10
//! max_wager = 1000
//! multiplier = "1.95"
//! ```
//!
//! Every section has a [`Default`] matching the production values, so a
//! file only needs the keys it overrides.

use crate::error::{EconomyError, EconomyResult};
use crate::fixed_point::FixedPoint;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Store tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a request waits for the store lock before `StoreBusy`.
    pub lock_timeout_ms: u64,
    /// fsync the log on every commit.
    pub sync_on_commit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2_000,
            sync_on_commit: true,
        }
    }
}

/// One marketplace fee tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTier {
    /// Longest listing duration (days) this tier applies to.
    pub max_days: u32,
    /// Fee percentage charged to the seller on sale.
    pub percent: u8,
}

/// Marketplace rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Lowest asking price.
    pub min_price: u64,
    /// Highest asking price.
    pub max_price: u64,
    /// Shortest listing duration in days.
    pub min_duration_days: u32,
    /// Longest listing duration in days.
    pub max_duration_days: u32,
    /// Duration used when the caller does not pick one.
    pub default_duration_days: u32,
    /// Ascending by `max_days`. Shorter listings pay more.
    pub fee_tiers: Vec<FeeTier>,
    /// Fee for durations beyond the last tier.
    pub fallback_fee_percent: u8,
    /// Page size cap for browsing.
    pub max_page_size: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            min_price: 10,
            max_price: 1_000_000,
            min_duration_days: 1,
            max_duration_days: 30,
            default_duration_days: 7,
            fee_tiers: vec![
                FeeTier { max_days: 1, percent: 5 },
                FeeTier { max_days: 3, percent: 4 },
                FeeTier { max_days: 7, percent: 3 },
                FeeTier { max_days: 14, percent: 2 },
            ],
            fallback_fee_percent: 1,
            max_page_size: 100,
        }
    }
}

impl MarketConfig {
    /// Fee percentage for a listing of `days`.
    #[must_use]
    pub fn fee_for_duration(&self, days: u32) -> u8 {
        self.fee_tiers
            .iter()
            .find(|tier| days <= tier.max_days)
            .map_or(self.fallback_fee_percent, |tier| tier.percent)
    }
}

/// Inclusive wager bounds shared by every game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerLimits {
    /// Smallest accepted wager.
    pub min_wager: u64,
    /// Largest accepted wager.
    pub max_wager: u64,
}

impl WagerLimits {
    /// Whether `wager` is within bounds.
    #[must_use]
    pub fn accepts(&self, wager: u64) -> bool {
        (self.min_wager..=self.max_wager).contains(&wager)
    }
}

/// Dice rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiceConfig {
    /// Smallest accepted wager.
    pub min_wager: u64,
    /// Largest accepted wager.
    pub max_wager: u64,
    /// Lowest target a caller may predict against.
    pub min_target: u8,
    /// Highest target a caller may predict against.
    pub max_target: u8,
    /// Payout for a winning `higher` call.
    pub higher_multiplier: FixedPoint,
    /// Payout for a winning `lower` call.
    pub lower_multiplier: FixedPoint,
    /// Payout for a winning `exact` call.
    pub exact_multiplier: FixedPoint,
}

impl DiceConfig {
    /// Wager bounds.
    #[must_use]
    pub fn limits(&self) -> WagerLimits {
        WagerLimits {
            min_wager: self.min_wager,
            max_wager: self.max_wager,
        }
    }
}

impl Default for DiceConfig {
    fn default() -> Self {
        Self {
            min_wager: 10,
            max_wager: 1000,
            min_target: 2,
            max_target: 12,
            higher_multiplier: FixedPoint::from_whole(2),
            lower_multiplier: FixedPoint::from_whole(2),
            exact_multiplier: FixedPoint::from_whole(6),
        }
    }
}

/// Wheel rules. One pocket per number in `0..=36`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Smallest accepted wager.
    pub min_wager: u64,
    /// Largest accepted wager.
    pub max_wager: u64,
    /// Red or black.
    pub color_multiplier: FixedPoint,
    /// The zero pocket.
    pub green_multiplier: FixedPoint,
    /// A single number.
    pub number_multiplier: FixedPoint,
    /// Even or odd (zero loses).
    pub parity_multiplier: FixedPoint,
    /// One of three dozens.
    pub dozen_multiplier: FixedPoint,
    /// One of three columns.
    pub column_multiplier: FixedPoint,
}

impl WheelConfig {
    /// Wager bounds.
    #[must_use]
    pub fn limits(&self) -> WagerLimits {
        WagerLimits {
            min_wager: self.min_wager,
            max_wager: self.max_wager,
        }
    }
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            min_wager: 50,
            max_wager: 5000,
            color_multiplier: FixedPoint::from_whole(2),
            green_multiplier: FixedPoint::from_whole(36),
            number_multiplier: FixedPoint::from_whole(36),
            parity_multiplier: FixedPoint::from_whole(2),
            dozen_multiplier: FixedPoint::from_whole(3),
            column_multiplier: FixedPoint::from_whole(3),
        }
    }
}

/// Reels rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReelsConfig {
    /// Smallest accepted wager.
    pub min_wager: u64,
    /// Largest accepted wager.
    pub max_wager: u64,
    /// Three sevens.
    pub seven_triple: FixedPoint,
    /// Three diamonds.
    pub diamond_triple: FixedPoint,
    /// Three stars.
    pub star_triple: FixedPoint,
    /// Three bells.
    pub bell_triple: FixedPoint,
    /// Three of any fruit.
    pub other_triple: FixedPoint,
    /// Any two matching symbols.
    pub pair: FixedPoint,
}

impl ReelsConfig {
    /// Wager bounds.
    #[must_use]
    pub fn limits(&self) -> WagerLimits {
        WagerLimits {
            min_wager: self.min_wager,
            max_wager: self.max_wager,
        }
    }
}

impl Default for ReelsConfig {
    fn default() -> Self {
        Self {
            min_wager: 20,
            max_wager: 2000,
            seven_triple: FixedPoint::from_whole(10),
            diamond_triple: FixedPoint::from_whole(8),
            star_triple: FixedPoint::from_whole(6),
            bell_triple: FixedPoint::from_whole(5),
            other_triple: FixedPoint::from_whole(4),
            pair: FixedPoint::from_whole(2),
        }
    }
}

/// Coin flip rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinConfig {
    /// Smallest accepted wager.
    pub min_wager: u64,
    /// Largest accepted wager.
    pub max_wager: u64,
    /// Payout for a correct call.
    pub multiplier: FixedPoint,
}

impl CoinConfig {
    /// Wager bounds.
    #[must_use]
    pub fn limits(&self) -> WagerLimits {
        WagerLimits {
            min_wager: self.min_wager,
            max_wager: self.max_wager,
        }
    }
}

impl Default for CoinConfig {
    fn default() -> Self {
        Self {
            min_wager: 10,
            max_wager: 1000,
            multiplier: FixedPoint::from_raw(1_950_000),
        }
    }
}

/// All minigames.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GamesConfig {
    /// Dice.
    pub dice: DiceConfig,
    /// Wheel.
    pub wheel: WheelConfig,
    /// Reels.
    pub reels: ReelsConfig,
    /// Coin flip.
    pub coin: CoinConfig,
}

/// Account bonuses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    /// Credited once on registration.
    pub welcome_bonus: u64,
    /// Credited to the referrer when a referred account registers.
    pub referral_bonus: u64,
    /// Daily reward before streak bonus.
    pub daily_base: u64,
    /// Extra per day of streak.
    pub daily_streak_step: u64,
    /// Cap on the streak bonus.
    pub daily_streak_cap: u64,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            welcome_bonus: 500,
            referral_bonus: 200,
            daily_base: 100,
            daily_streak_step: 20,
            daily_streak_cap: 500,
        }
    }
}

/// Redemption rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedemptionConfig {
    /// Substring every delivery address must contain.
    pub address_marker: String,
    /// Longest accepted delivery address.
    pub max_address_len: usize,
}

impl Default for RedemptionConfig {
    fn default() -> Self {
        Self {
            address_marker: "steamcommunity.com/tradeoffer/new/".to_string(),
            max_address_len: 512,
        }
    }
}

/// What to do when a container's probabilities do not sum to 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilityPolicy {
    /// Log an error and keep the table; the walk falls back to the last entry.
    #[default]
    Warn,
    /// Refuse to load the catalog.
    Reject,
}

/// Catalog loading rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Policy for probability sums away from 1.
    pub probability_policy: ProbabilityPolicy,
    /// Allowed distance from 1.0 before the policy applies.
    pub probability_tolerance: f64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            probability_policy: ProbabilityPolicy::Warn,
            probability_tolerance: 1e-9,
        }
    }
}

/// Top-level economy configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Store tuning.
    pub store: StoreConfig,
    /// Marketplace.
    pub market: MarketConfig,
    /// Minigames.
    pub games: GamesConfig,
    /// Account bonuses.
    pub rewards: RewardsConfig,
    /// Redemption.
    pub redemption: RedemptionConfig,
    /// Catalog loading.
    pub catalog: CatalogConfig,
}

impl EconomyConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` on parse failure or inconsistent values.
    pub fn from_toml_str(text: &str) -> EconomyResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| EconomyError::InvalidConfig(format!("economy config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the file cannot be read or is invalid.
    pub fn from_path(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EconomyError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks cross-field consistency.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> EconomyResult<()> {
        let bad = |msg: &str| Err(EconomyError::InvalidConfig(msg.to_string()));

        let m = &self.market;
        if m.min_price == 0 || m.min_price > m.max_price {
            return bad("market price bounds must satisfy 0 < min_price <= max_price");
        }
        if m.min_duration_days == 0
            || m.min_duration_days > m.max_duration_days
            || !(m.min_duration_days..=m.max_duration_days).contains(&m.default_duration_days)
        {
            return bad("market duration bounds are inconsistent");
        }
        if m.fee_tiers.windows(2).any(|w| w[0].max_days >= w[1].max_days) {
            return bad("market fee tiers must be strictly ascending by max_days");
        }
        if m.fee_tiers.iter().any(|t| t.percent > 100) || m.fallback_fee_percent > 100 {
            return bad("market fee percentages must be at most 100");
        }
        if m.max_page_size == 0 {
            return bad("market max_page_size must be positive");
        }

        let g = &self.games;
        for (name, limits) in [
            ("dice", g.dice.limits()),
            ("wheel", g.wheel.limits()),
            ("reels", g.reels.limits()),
            ("coin", g.coin.limits()),
        ] {
            if limits.min_wager == 0 || limits.min_wager > limits.max_wager {
                return Err(EconomyError::InvalidConfig(format!(
                    "{name} wager bounds must satisfy 0 < min_wager <= max_wager"
                )));
            }
        }
        if g.dice.min_target > g.dice.max_target {
            return bad("dice target bounds are inconsistent");
        }
        let multipliers = [
            g.dice.higher_multiplier,
            g.dice.lower_multiplier,
            g.dice.exact_multiplier,
            g.wheel.color_multiplier,
            g.wheel.green_multiplier,
            g.wheel.number_multiplier,
            g.wheel.parity_multiplier,
            g.wheel.dozen_multiplier,
            g.wheel.column_multiplier,
            g.reels.seven_triple,
            g.reels.diamond_triple,
            g.reels.star_triple,
            g.reels.bell_triple,
            g.reels.other_triple,
            g.reels.pair,
            g.coin.multiplier,
        ];
        if multipliers.iter().any(|m| m.is_zero()) {
            return bad("game multipliers must be positive");
        }

        if self.redemption.address_marker.is_empty() || self.redemption.max_address_len == 0 {
            return bad("redemption address rules are empty");
        }
        if !(0.0..1.0).contains(&self.catalog.probability_tolerance) {
            return bad("catalog probability_tolerance must be in [0, 1)");
        }
        Ok(())
    }
}

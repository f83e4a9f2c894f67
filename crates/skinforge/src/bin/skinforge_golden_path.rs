//! # Golden Path
//!
//! Walks every engine operation once, in the order a real player would hit
//! them, and prints how long each step took:
//!
//! Register → Daily Bonus → Top-Up → Open Cases → Combine →
//! List / Buy / Cancel → Browse → Play All Games → Redeem → Drain Events
//!
//! Uses `data/economy.toml` and `data/catalog.toml` unless `SKINFORGE_*`
//! overrides point elsewhere. Seeded with 2024 when no seed is configured.

use std::time::{Duration, Instant};

use skinforge::economy::{
    AccountId, CoinSide, Currency, DicePrediction, Economy, EconomyResult, GameRequest, MarketQuery,
    WheelBet,
};
use skinforge::{bootstrap, init_logging, AppConfig, AppError};
use tracing::{info, warn};

const TRADE_LINK: &str = "https://steamcommunity.com/tradeoffer/new/?partner=1&token=golden";

/// Per-step wall-clock timings.
#[derive(Default)]
struct Timings {
    steps: Vec<(&'static str, Duration)>,
}

impl Timings {
    fn run<T>(&mut self, label: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.steps.push((label, start.elapsed()));
        out
    }

    fn report(&self) {
        println!();
        println!("{:<28} {:>12}", "STEP", "TIME (us)");
        println!("{}", "-".repeat(41));
        for (label, elapsed) in &self.steps {
            println!("{label:<28} {:>12}", elapsed.as_micros());
        }
        let total: Duration = self.steps.iter().map(|(_, d)| *d).sum();
        println!("{}", "-".repeat(41));
        println!("{:<28} {:>12}", "TOTAL", total.as_micros());
    }
}

/// Logs an expected business rejection and carries on.
fn soft<T>(step: &str, result: EconomyResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(step, kind = ?e.kind(), error = %e, "step rejected");
            None
        }
    }
}

fn open_cases(economy: &Economy, caller: AccountId, timings: &mut Timings) -> EconomyResult<()> {
    let containers: Vec<_> = economy
        .catalog()
        .active_containers()
        .filter(|c| !c.drops.is_empty())
        .map(|c| (c.id, c.currency))
        .collect();

    for (container, currency) in containers {
        for _ in 0..5 {
            let opened = timings.run("open_container", || economy.open_container(caller, container));
            if let Some(opening) = soft("open_container", opened) {
                info!(container, ?currency, balance = opening.balance, "{}", opening.description);
            }
        }
    }
    let history = economy.container_history(caller, 100)?;
    info!(opened = history.len(), "container history");
    Ok(())
}

fn craft(economy: &Economy, caller: AccountId, timings: &mut Timings) -> EconomyResult<()> {
    let progress = timings.run("fragment_progress", || economy.fragment_progress(caller))?;
    for entry in progress {
        info!(
            item_type = entry.item_type,
            collected = entry.collected,
            required = entry.required,
            "fragment progress"
        );
        if entry.can_combine {
            let outcome = timings.run("combine", || economy.combine(caller, entry.item_type))?;
            info!(
                item = %outcome.record.name,
                forfeited = outcome.fragments_forfeited,
                "fragments combined"
            );
        }
    }
    Ok(())
}

fn trade(economy: &Economy, seller: AccountId, buyer: AccountId, timings: &mut Timings) -> EconomyResult<()> {
    let tradable: Vec<_> = economy
        .inventory(seller)?
        .into_iter()
        .filter(|r| r.tradable && !r.in_escrow)
        .map(|r| r.id)
        .collect();

    if let Some(&record) = tradable.first() {
        let listing = timings.run("list_item", || economy.list_item(seller, record, 150, Some(1)))?;
        let bought = timings.run("buy_listing", || economy.buy_listing(buyer, listing.id));
        if let Some(purchase) = soft("buy_listing", bought) {
            info!(
                listing = listing.id,
                fee = purchase.fee,
                seller_proceeds = purchase.seller_proceeds,
                "listing sold"
            );
        }
    }
    if let Some(&record) = tradable.get(1) {
        let listing = timings.run("list_item", || economy.list_item(seller, record, 400, None))?;
        timings.run("cancel_listing", || economy.cancel_listing(seller, listing.id))?;
    }
    if let Some(&record) = tradable.get(2) {
        economy.list_item(seller, record, 75, Some(14))?;
    }

    let page = timings.run("browse_market", || economy.browse_market(&MarketQuery::default()))?;
    info!(
        active = page.stats.active_listings,
        volume = page.stats.total_volume,
        shown = page.listings.len(),
        "market browsed"
    );
    let expired = timings.run("expire_listings", || economy.expire_listings())?;
    info!(expired = expired.len(), "expiry sweep");
    info!(mine = economy.my_listings(seller)?.len(), "seller listings");
    Ok(())
}

fn play(economy: &Economy, caller: AccountId, timings: &mut Timings) -> EconomyResult<()> {
    let rounds = [
        GameRequest::Dice {
            wager: 100,
            target: 7,
            prediction: DicePrediction::Higher,
        },
        GameRequest::Wheel {
            wager: 100,
            bet: WheelBet::Red,
        },
        GameRequest::Wheel {
            wager: 50,
            bet: WheelBet::Dozen(2),
        },
        GameRequest::Reels { wager: 100 },
        GameRequest::Coin {
            wager: 100,
            call: CoinSide::Heads,
        },
    ];
    for request in rounds {
        let kind = request.kind();
        if let Some(result) = soft("play", timings.run("play", || economy.play(caller, request))) {
            info!(
                game = %kind,
                win = result.session.win_amount,
                balance = result.balance,
                "round settled"
            );
        }
    }
    let stats = timings.run("game_stats", || economy.game_stats(caller))?;
    info!(games = stats.games, wagered = stats.wagered, won = stats.won, "game stats");
    info!(sessions = economy.game_history(caller, None, 50)?.len(), "game history");
    Ok(())
}

fn redeem(economy: &Economy, caller: AccountId, timings: &mut Timings) -> EconomyResult<()> {
    let progress = timings.run("redemption_progress", || economy.redemption_progress(caller))?;
    info!(pool = progress.total_fragments, "redemption pool");
    match progress.targets.iter().find(|t| t.affordable) {
        Some(target) => {
            let outcome = timings.run("redeem", || economy.redeem(caller, target.item, TRADE_LINK))?;
            info!(
                item = %target.name,
                consumed = outcome.request.fragments_consumed,
                "withdrawal requested"
            );
        }
        None => {
            let nearest = progress.targets.iter().map(|t| t.missing).min().unwrap_or(0);
            info!(missing = nearest, "no high-value item affordable yet");
        }
    }
    info!(withdrawals = economy.withdrawal_history(caller)?.len(), "withdrawal history");
    Ok(())
}

fn run(economy: &Economy) -> EconomyResult<Timings> {
    let mut timings = Timings::default();

    let alice = timings.run("register", || economy.register("golden:alice", None))?;
    let code = alice.account.referral_code.clone();
    let bob = timings.run("register", || economy.register("golden:bob", Some(&code)))?;
    let (alice, bob) = (alice.account.id, bob.account.id);
    economy.authenticate("golden:alice")?;

    if let Some(claim) = soft("claim_daily", timings.run("claim_daily", || economy.claim_daily(alice))) {
        info!(reward = claim.reward, streak = claim.streak, "daily bonus");
    }
    timings.run("top_up", || economy.top_up(alice, Currency::Primary, 5_000, "golden-primary"))?;
    timings.run("top_up", || economy.top_up(alice, Currency::Premium, 3_000, "golden-premium"))?;
    economy.top_up(bob, Currency::Primary, 1_000, "golden-bob")?;

    open_cases(economy, alice, &mut timings)?;
    craft(economy, alice, &mut timings)?;
    trade(economy, alice, bob, &mut timings)?;
    play(economy, alice, &mut timings)?;
    redeem(economy, alice, &mut timings)?;

    let profile = economy.profile(alice)?;
    info!(
        primary = profile.primary_balance,
        premium = profile.premium_balance,
        inventory = economy.inventory(alice)?.len(),
        journal = economy.history(alice, None, usize::MAX)?.len(),
        "final state"
    );

    let events = timings.run("drain_events", || economy.drain_events());
    info!(events = events.len(), "notifications drained");
    timings.run("compact", || economy.compact())?;
    Ok(timings)
}

fn main() -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    init_logging(&config.log)?;
    if config.seed.is_none() {
        config.seed = Some(2024);
    }

    info!("=== SKINFORGE GOLDEN PATH ===");
    let start = Instant::now();
    let economy = bootstrap(&config)?;
    let timings = run(&economy)?;
    timings.report();
    info!(total_ms = start.elapsed().as_millis(), "golden path complete");
    Ok(())
}

#![deny(warnings)]
//! Simulation runtime: tick scheduling, state reducers, and the [`Engine`]
//! facade that front ends drive.
//!
//! The reducers at the bottom of this crate are free functions over
//! [`ProgressionState`]. Anything random takes `&mut impl Rng`, so tests can
//! inject a scripted source and production code can hand in the engine's
//! seeded [`ChaCha8Rng`]. The [`Engine`] owns the state, the clock
//! accumulators, and an event queue that renderers drain once per frame.

use idle_core::{
    validate_catalog, validate_state, ActiveBuff, AchievementDef, BonusSpawn, BuffKind, Catalog,
    ProducerId, ProgressionState, RateSample, ResearchEffect, ResearchId, Stats, UpgradeEffect,
    UpgradeId, ValidationError,
};
use idle_econ::{
    milestone_bonus, prestige_gain, purchase_cost, rates, unlocked_achievements, RateBreakdown,
    MILESTONE_STEP,
};

use chrono::{DateTime, Utc};
use persistence::{reconcile_offline, Snapshot};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Production multiplier while a production frenzy is running.
pub const PRODUCTION_FRENZY_MULT: f64 = 7.0;
/// Duration of a production frenzy in seconds.
pub const PRODUCTION_FRENZY_SECS: f64 = 30.0;
/// Click multiplier while a click frenzy is running.
pub const CLICK_FRENZY_MULT: f64 = 50.0;
/// Duration of a click frenzy in seconds.
pub const CLICK_FRENZY_SECS: f64 = 15.0;
/// An instant-gain payout is worth this many seconds of production.
pub const INSTANT_RATE_FACTOR: f64 = 15.0;
/// Floor for an instant-gain payout, so early games still feel it.
pub const INSTANT_MIN: f64 = 10.0;

/// Rolls below this resolve to a production frenzy.
const PRODUCTION_FRENZY_CUTOFF: f64 = 0.4;
/// Rolls below this (and at or above the frenzy cutoff) resolve to a click
/// frenzy; everything else is an instant gain.
const CLICK_FRENZY_CUTOFF: f64 = 0.7;

/// Tunable knobs for the tick scheduler and the bonus-event lottery.
///
/// The defaults mirror live tuning: a 100 ms fast tick for accrual, a 1 s
/// slow tick for rate sampling, and a 2% spawn chance per fast tick with a
/// 3.5 to 5 second click window.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for the engine's random source. Same seed, same spawn pattern.
    pub rng_seed: u64,
    /// Fast tick interval in seconds. Accrual and expiry run here.
    pub fast_interval: f64,
    /// Slow tick interval in seconds. Rate history is sampled here.
    pub slow_interval: f64,
    /// Chance per fast tick of spawning a bonus event while none is pending.
    pub bonus_chance: f64,
    /// Shortest lifetime of a spawned bonus event, in seconds.
    pub bonus_ttl_min: f64,
    /// Longest lifetime of a spawned bonus event, in seconds.
    pub bonus_ttl_max: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            rng_seed: 0,
            fast_interval: 0.1,
            slow_interval: 1.0,
            bonus_chance: 0.02,
            bonus_ttl_min: 3.5,
            bonus_ttl_max: 5.0,
        }
    }
}

impl EngineConfig {
    /// Checks that intervals are positive, the spawn chance is a probability,
    /// and the bonus lifetime window is non-empty.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.fast_interval.is_finite() && self.fast_interval > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "fast interval must be positive, got {}",
                self.fast_interval
            )));
        }
        if !(self.slow_interval.is_finite() && self.slow_interval > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "slow interval must be positive, got {}",
                self.slow_interval
            )));
        }
        if !(self.bonus_chance.is_finite() && (0.0..=1.0).contains(&self.bonus_chance)) {
            return Err(EngineError::InvalidConfig(format!(
                "bonus chance must be within [0, 1], got {}",
                self.bonus_chance
            )));
        }
        if !(self.bonus_ttl_min.is_finite() && self.bonus_ttl_min > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "bonus lifetime must be positive, got {}",
                self.bonus_ttl_min
            )));
        }
        if !(self.bonus_ttl_max.is_finite() && self.bonus_ttl_max >= self.bonus_ttl_min) {
            return Err(EngineError::InvalidConfig(format!(
                "bonus lifetime window is empty: {} to {}",
                self.bonus_ttl_min, self.bonus_ttl_max
            )));
        }
        Ok(())
    }
}

/// Errors raised when constructing or reconfiguring an engine.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    /// The catalog failed validation.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(ValidationError),
    /// The state failed validation against the catalog.
    #[error("invalid state: {0}")]
    InvalidState(ValidationError),
    /// The engine configuration is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// What a clicked bonus event resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BonusOutcome {
    /// Production multiplied for a fixed window.
    ProductionFrenzy,
    /// Click value multiplied for a fixed window.
    ClickFrenzy,
    /// A one-off payout proportional to the current rate.
    InstantGain,
}

/// Partitions a uniform roll in `[0, 1)` into a bonus outcome.
///
/// The split is 40% production frenzy, 30% click frenzy, 30% instant gain.
/// Kept separate from the RNG so the boundaries can be tested exactly.
pub fn bonus_outcome(roll: f64) -> BonusOutcome {
    if roll < PRODUCTION_FRENZY_CUTOFF {
        BonusOutcome::ProductionFrenzy
    } else if roll < CLICK_FRENZY_CUTOFF {
        BonusOutcome::ClickFrenzy
    } else {
        BonusOutcome::InstantGain
    }
}

/// Notifications produced by reducers, drained by the caller each frame.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// A manual click landed at the given screen position.
    Clicked { x: f64, y: f64, value: f64 },
    /// A producer crossed a milestone count and earned a permanent bonus.
    Milestone {
        producer: ProducerId,
        count: u32,
        bonus: f64,
    },
    /// A bonus event appeared at the given position.
    BonusSpawned { x: f64, y: f64 },
    /// The pending bonus event timed out unclicked.
    BonusExpired,
    /// A timed buff started.
    BuffStarted {
        kind: BuffKind,
        mult: f64,
        seconds: f64,
    },
    /// The active buff ran out.
    BuffExpired { kind: BuffKind },
    /// A clicked bonus event paid out directly.
    InstantGain { amount: f64 },
    /// An ascension completed.
    Ascended { gain: u64, stardust: u64 },
    /// Time away from the game was credited on load.
    OfflineProgress { seconds: f64, amount: f64 },
}

/// Runs one fast tick: accrues production and research, advances the engine
/// clock, and rolls the bonus-event lottery.
///
/// Draw order against `rng` is fixed: spawn chance first, then x, y, and
/// lifetime when a spawn happens. Callers (and tests) can rely on it.
pub fn fast_tick(
    catalog: &Catalog,
    config: &EngineConfig,
    state: &mut ProgressionState,
    rng: &mut impl Rng,
    events: &mut Vec<EngineEvent>,
    dt: f64,
) {
    let breakdown = rates(catalog, state);
    let produced = breakdown.production * dt;
    state.balance += produced;
    state.lifetime_earned += produced;
    state.stats.passive_earned += produced;
    if breakdown.production > state.stats.peak_rate {
        state.stats.peak_rate = breakdown.production;
    }
    state.research_points += breakdown.research_rate * dt;
    state.elapsed += dt;

    if state.bonus_spawn.is_none() {
        if rng.gen::<f64>() < config.bonus_chance {
            let x = rng.gen_range(10.0..90.0);
            let y = rng.gen_range(10.0..80.0);
            let ttl = rng.gen_range(config.bonus_ttl_min..=config.bonus_ttl_max);
            let until = state.elapsed + ttl;
            debug!(x, y, until, "bonus event spawned");
            state.bonus_spawn = Some(BonusSpawn { x, y, until });
            events.push(EngineEvent::BonusSpawned { x, y });
        }
    } else if let Some(spawn) = &state.bonus_spawn {
        if spawn.until <= state.elapsed {
            state.bonus_spawn = None;
            events.push(EngineEvent::BonusExpired);
        }
    }

    if let Some(buff) = &state.buff {
        if buff.until <= state.elapsed {
            let kind = buff.kind;
            state.buff = None;
            events.push(EngineEvent::BuffExpired { kind });
        }
    }
}

/// Runs one slow tick: records a rate sample into the bounded history.
pub fn slow_tick(catalog: &Catalog, state: &mut ProgressionState) {
    let breakdown = rates(catalog, state);
    state.history.push(RateSample {
        at: state.elapsed,
        total: breakdown.production,
        per_producer: breakdown.per_producer,
    });
}

/// Applies one manual click at the given position and returns its value.
pub fn click(
    catalog: &Catalog,
    state: &mut ProgressionState,
    events: &mut Vec<EngineEvent>,
    x: f64,
    y: f64,
) -> f64 {
    let value = rates(catalog, state).click_value;
    state.balance += value;
    state.lifetime_earned += value;
    state.stats.clicks += 1;
    events.push(EngineEvent::Clicked { x, y, value });
    value
}

/// Buys one unit of a producer if the balance covers its current cost.
///
/// Returns whether the purchase went through. A rejected purchase leaves the
/// state untouched. Crossing a milestone count emits [`EngineEvent::Milestone`].
pub fn buy_producer(
    catalog: &Catalog,
    state: &mut ProgressionState,
    events: &mut Vec<EngineEvent>,
    id: &ProducerId,
) -> bool {
    let def = match catalog.producer(id) {
        Some(def) => def,
        None => return false,
    };
    let owned = state.producer_count(id);
    let cost = purchase_cost(def.base_cost, owned);
    if state.balance < cost {
        return false;
    }
    state.balance -= cost;
    let count = owned + 1;
    state.producers.insert(def.id.clone(), count);
    debug!(producer = %def.id.0, count, cost, "producer purchased");
    if count % MILESTONE_STEP == 0 {
        let bonus = milestone_bonus(count);
        info!(producer = %def.id.0, count, bonus, "milestone reached");
        events.push(EngineEvent::Milestone {
            producer: def.id.clone(),
            count,
            bonus,
        });
    }
    true
}

/// Buys an upgrade if it is unowned and affordable, folding its effect into
/// the permanent multipliers.
pub fn buy_upgrade(catalog: &Catalog, state: &mut ProgressionState, id: &UpgradeId) -> bool {
    let def = match catalog.upgrade(id) {
        Some(def) => def,
        None => return false,
    };
    if state.owned_upgrades.contains(id) || state.balance < def.cost {
        return false;
    }
    state.balance -= def.cost;
    state.owned_upgrades.insert(def.id.clone());
    match &def.effect {
        UpgradeEffect::Click { mult } => state.click_mult *= mult,
        UpgradeEffect::Global { mult } => state.global_mult *= mult,
        UpgradeEffect::Building { target, mult } => {
            *state.producer_mult.entry(target.clone()).or_insert(1.0) *= mult;
        }
    }
    info!(upgrade = %def.id.0, cost = def.cost, "upgrade purchased");
    true
}

/// Buys a research node if it is unowned, all prerequisites are owned, and
/// the research-point balance covers its cost.
pub fn buy_research(catalog: &Catalog, state: &mut ProgressionState, id: &ResearchId) -> bool {
    let def = match catalog.research_node(id) {
        Some(def) => def,
        None => return false,
    };
    if state.owned_research.contains(id) {
        return false;
    }
    if !def.requires.iter().all(|req| state.owned_research.contains(req)) {
        return false;
    }
    if state.research_points < def.cost {
        return false;
    }
    state.research_points -= def.cost;
    state.owned_research.insert(def.id.clone());
    match &def.effect {
        ResearchEffect::Global { mult } => state.global_mult *= mult,
        ResearchEffect::Click { mult } => state.click_mult *= mult,
        ResearchEffect::Building { target, mult } => {
            *state.producer_mult.entry(target.clone()).or_insert(1.0) *= mult;
        }
        ResearchEffect::LabOutput { mult } => state.lab_output_mult *= mult,
    }
    info!(research = %def.id.0, cost = def.cost, "research completed");
    true
}

/// Resolves the pending bonus event, if any, and applies its outcome.
///
/// The instant-gain payout is computed from the rate as it stands when the
/// event is clicked, so a running frenzy inflates it. A new frenzy replaces
/// whatever buff was active; there is a single buff slot.
pub fn resolve_bonus_event(
    catalog: &Catalog,
    state: &mut ProgressionState,
    rng: &mut impl Rng,
    events: &mut Vec<EngineEvent>,
) -> bool {
    if state.bonus_spawn.is_none() {
        return false;
    }
    let rate = rates(catalog, state).production;
    state.bonus_spawn = None;
    state.stats.bonus_events += 1;
    let roll: f64 = rng.gen();
    match bonus_outcome(roll) {
        BonusOutcome::ProductionFrenzy => {
            state.buff = Some(ActiveBuff {
                kind: BuffKind::ProductionFrenzy,
                mult: PRODUCTION_FRENZY_MULT,
                until: state.elapsed + PRODUCTION_FRENZY_SECS,
            });
            info!(mult = PRODUCTION_FRENZY_MULT, "production frenzy started");
            events.push(EngineEvent::BuffStarted {
                kind: BuffKind::ProductionFrenzy,
                mult: PRODUCTION_FRENZY_MULT,
                seconds: PRODUCTION_FRENZY_SECS,
            });
        }
        BonusOutcome::ClickFrenzy => {
            state.buff = Some(ActiveBuff {
                kind: BuffKind::ClickFrenzy,
                mult: CLICK_FRENZY_MULT,
                until: state.elapsed + CLICK_FRENZY_SECS,
            });
            info!(mult = CLICK_FRENZY_MULT, "click frenzy started");
            events.push(EngineEvent::BuffStarted {
                kind: BuffKind::ClickFrenzy,
                mult: CLICK_FRENZY_MULT,
                seconds: CLICK_FRENZY_SECS,
            });
        }
        BonusOutcome::InstantGain => {
            let amount = (rate * INSTANT_RATE_FACTOR).max(INSTANT_MIN);
            state.balance += amount;
            state.lifetime_earned += amount;
            info!(amount, "instant bonus collected");
            events.push(EngineEvent::InstantGain { amount });
        }
    }
    true
}

/// Converts lifetime earnings into stardust and resets the current cycle.
///
/// Returns `None` and leaves the state untouched when the conversion would
/// yield nothing. Stardust, lifetime statistics, and the engine clock survive
/// the reset; balances, producers, upgrades, research, buffs, and the rate
/// history do not.
pub fn ascend(state: &mut ProgressionState, events: &mut Vec<EngineEvent>) -> Option<u64> {
    let gain = prestige_gain(state.lifetime_earned);
    if gain == 0 {
        return None;
    }
    let stardust = state.stardust + gain;
    *state = ProgressionState {
        stardust,
        stats: Stats {
            ascensions: state.stats.ascensions + 1,
            earned_all_cycles: state.stats.earned_all_cycles + state.lifetime_earned,
            ..Stats::default()
        },
        elapsed: state.elapsed,
        ..ProgressionState::default()
    };
    info!(gain, stardust, "ascension complete");
    events.push(EngineEvent::Ascended { gain, stardust });
    Some(gain)
}

/// Owns the simulation state and drives it with a fixed-timestep scheduler.
///
/// [`Engine::advance`] banks wall-clock seconds and fires as many whole fast
/// and slow ticks as fit, so rendering cadence never changes simulation
/// results. Action methods delegate to the free reducers above.
pub struct Engine {
    catalog: Catalog,
    config: EngineConfig,
    state: ProgressionState,
    rng: ChaCha8Rng,
    fast_acc: f64,
    slow_acc: f64,
    events: Vec<EngineEvent>,
}

impl Engine {
    /// Creates an engine over a fresh state.
    pub fn new(catalog: Catalog, config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_state(catalog, config, ProgressionState::default())
    }

    /// Creates an engine over an existing state, validating everything first.
    pub fn with_state(
        catalog: Catalog,
        config: EngineConfig,
        state: ProgressionState,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        validate_catalog(&catalog).map_err(EngineError::InvalidCatalog)?;
        validate_state(&state, &catalog).map_err(EngineError::InvalidState)?;
        let rng = ChaCha8Rng::seed_from_u64(config.rng_seed);
        Ok(Engine {
            catalog,
            config,
            state,
            rng,
            fast_acc: 0.0,
            slow_acc: 0.0,
            events: Vec::new(),
        })
    }

    /// Rebuilds an engine from a saved snapshot, crediting offline progress.
    ///
    /// A snapshot whose state fails validation is discarded with a warning
    /// and the engine starts fresh, without offline credit.
    pub fn restore(
        catalog: Catalog,
        config: EngineConfig,
        snapshot: Snapshot,
        now: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        let (state, offline) = match validate_state(&snapshot.state, &catalog) {
            Ok(()) => {
                let mut state = snapshot.state;
                let offline =
                    reconcile_offline(&mut state, snapshot.last_save, snapshot.rate_snapshot, now);
                (state, offline)
            }
            Err(err) => {
                warn!(%err, "saved state failed validation, starting fresh");
                (ProgressionState::default(), None)
            }
        };
        let mut engine = Self::with_state(catalog, config, state)?;
        if let Some(gain) = offline {
            engine.events.push(EngineEvent::OfflineProgress {
                seconds: gain.seconds,
                amount: gain.amount,
            });
        }
        Ok(engine)
    }

    /// Captures the current state as a snapshot stamped with `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        Snapshot::new(self.state.clone(), self.rates().production, now)
    }

    /// Banks `dt` seconds of wall-clock time and fires every whole tick that
    /// fits. Non-positive and non-finite deltas are ignored.
    pub fn advance(&mut self, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        self.fast_acc += dt;
        self.slow_acc += dt;
        while self.fast_acc >= self.config.fast_interval {
            self.fast_acc -= self.config.fast_interval;
            fast_tick(
                &self.catalog,
                &self.config,
                &mut self.state,
                &mut self.rng,
                &mut self.events,
                self.config.fast_interval,
            );
        }
        while self.slow_acc >= self.config.slow_interval {
            self.slow_acc -= self.config.slow_interval;
            slow_tick(&self.catalog, &mut self.state);
        }
    }

    /// Applies one manual click and returns its value.
    pub fn click(&mut self, x: f64, y: f64) -> f64 {
        click(&self.catalog, &mut self.state, &mut self.events, x, y)
    }

    /// Buys one unit of a producer. Returns whether the purchase went through.
    pub fn buy_producer(&mut self, id: &ProducerId) -> bool {
        buy_producer(&self.catalog, &mut self.state, &mut self.events, id)
    }

    /// Buys an upgrade. Returns whether the purchase went through.
    pub fn buy_upgrade(&mut self, id: &UpgradeId) -> bool {
        buy_upgrade(&self.catalog, &mut self.state, id)
    }

    /// Buys a research node. Returns whether the purchase went through.
    pub fn buy_research(&mut self, id: &ResearchId) -> bool {
        buy_research(&self.catalog, &mut self.state, id)
    }

    /// Resolves the pending bonus event, if any.
    pub fn resolve_bonus_event(&mut self) -> bool {
        resolve_bonus_event(&self.catalog, &mut self.state, &mut self.rng, &mut self.events)
    }

    /// Ascends if lifetime earnings convert to any stardust.
    pub fn ascend(&mut self) -> Option<u64> {
        ascend(&mut self.state, &mut self.events)
    }

    /// Swaps in an imported state after validating it. Clock accumulators
    /// reset so the next ticks line up with the new state.
    pub fn replace_state(&mut self, state: ProgressionState) -> Result<(), EngineError> {
        validate_state(&state, &self.catalog).map_err(EngineError::InvalidState)?;
        self.state = state;
        self.fast_acc = 0.0;
        self.slow_acc = 0.0;
        Ok(())
    }

    /// Current simulation state.
    pub fn state(&self) -> &ProgressionState {
        &self.state
    }

    /// The catalog this engine runs over.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The configuration this engine runs with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Full rate breakdown for the current state.
    pub fn rates(&self) -> RateBreakdown {
        rates(&self.catalog, &self.state)
    }

    /// Cost of the next unit of a producer, or `None` for an unknown id.
    pub fn producer_cost(&self, id: &ProducerId) -> Option<f64> {
        let def = self.catalog.producer(id)?;
        Some(purchase_cost(def.base_cost, self.state.producer_count(id)))
    }

    /// Achievements currently unlocked, in catalog order.
    pub fn unlocked_achievements(&self) -> Vec<&AchievementDef> {
        unlocked_achievements(&self.catalog, &self.state)
    }

    /// Drains and returns every event queued since the last call.
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }
}

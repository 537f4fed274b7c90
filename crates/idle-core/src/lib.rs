#![deny(warnings)]

//! Core domain models and invariants for idle-bakery.
//!
//! This crate defines the immutable catalog (producers, upgrades, research
//! nodes, achievements), the mutable `ProgressionState` aggregate, and
//! validation helpers that guarantee basic invariants. All types serialize
//! with serde; collections are BTree-based for deterministic order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;

/// Unique identifier for a producer, e.g. "cursor", "grandma", "lab".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProducerId(pub String);

/// Unique identifier for a purchasable upgrade.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UpgradeId(pub String);

/// Unique identifier for a research node.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResearchId(pub String);

/// Unique identifier for an achievement.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AchievementId(pub String);

/// Tier thresholds shared by the standard catalog: owning at least
/// 1/10/25/50/100 units of a producer reaches tier 0..4.
pub const DEFAULT_TIER_THRESHOLDS: [u32; 5] = [1, 10, 25, 50, 100];

/// A producer definition from the immutable catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProducerDef {
    /// Producer identifier, stable across versions.
    pub id: ProducerId,
    /// Display name (presentation hint only).
    pub name: String,
    /// Cost of the first unit; later units scale exponentially.
    pub base_cost: f64,
    /// Output per unit per second before multipliers.
    pub base_rate: f64,
    /// Owned-count thresholds mapping to tiers 0..4.
    pub tier_thresholds: [u32; 5],
}

/// What an upgrade multiplies when purchased.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum UpgradeEffect {
    /// Multiplies the per-click value.
    Click {
        /// Multiplier folded into the click multiplier.
        mult: f64,
    },
    /// Multiplies all production and clicks.
    Global {
        /// Multiplier folded into the global multiplier.
        mult: f64,
    },
    /// Multiplies one producer's per-unit output.
    Building {
        /// Target producer.
        target: ProducerId,
        /// Multiplier folded into that producer's multiplier.
        mult: f64,
    },
}

/// An upgrade definition from the immutable catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpgradeDef {
    /// Upgrade identifier.
    pub id: UpgradeId,
    /// Display name.
    pub name: String,
    /// Cost in currency.
    pub cost: f64,
    /// Effect applied once on purchase.
    pub effect: UpgradeEffect,
}

/// What a research node multiplies when purchased.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ResearchEffect {
    /// Multiplies all production and clicks.
    Global {
        /// Multiplier folded into the global multiplier.
        mult: f64,
    },
    /// Multiplies the per-click value.
    Click {
        /// Multiplier folded into the click multiplier.
        mult: f64,
    },
    /// Multiplies one producer's per-unit output.
    Building {
        /// Target producer.
        target: ProducerId,
        /// Multiplier folded into that producer's multiplier.
        mult: f64,
    },
    /// Multiplies research-point generation.
    LabOutput {
        /// Multiplier folded into the lab-output multiplier.
        mult: f64,
    },
}

/// A research node from the immutable catalog. Paid in research points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResearchDef {
    /// Node identifier.
    pub id: ResearchId,
    /// Display name.
    pub name: String,
    /// Cost in research points.
    pub cost: f64,
    /// Effect applied once on purchase.
    pub effect: ResearchEffect,
    /// Nodes that must already be owned.
    pub requires: Vec<ResearchId>,
}

/// Predicate an achievement checks against the current state. Achievements
/// are derived on demand and never stored; a condition that stops holding
/// (e.g. after ascension) revokes the achievement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AchievementCondition {
    /// Cycle click count reached the threshold.
    ClicksAtLeast(u64),
    /// Cycle lifetime earnings reached the threshold.
    LifetimeAtLeast(f64),
    /// Bonus events resolved this cycle reached the threshold.
    BonusEventsAtLeast(u64),
    /// Stardust balance reached the threshold.
    StardustAtLeast(u64),
    /// At least one unit of any producer is owned.
    AnyProducerOwned,
}

impl AchievementCondition {
    /// Evaluate the predicate against a state snapshot.
    pub fn is_met(&self, state: &ProgressionState) -> bool {
        match self {
            Self::ClicksAtLeast(n) => state.stats.clicks >= *n,
            Self::LifetimeAtLeast(v) => state.lifetime_earned >= *v,
            Self::BonusEventsAtLeast(n) => state.stats.bonus_events >= *n,
            Self::StardustAtLeast(n) => state.stardust >= *n,
            Self::AnyProducerOwned => state.producers.values().any(|&c| c > 0),
        }
    }
}

/// An achievement definition from the immutable catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AchievementDef {
    /// Achievement identifier.
    pub id: AchievementId,
    /// Display name.
    pub name: String,
    /// Unlock predicate.
    pub condition: AchievementCondition,
}

/// Immutable reference data: every producer, upgrade, research node and
/// achievement the engine knows about. Catalog order is meaningful for
/// producers (synergy chains to the immediately preceding entry).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catalog {
    /// Producers in display/synergy order.
    pub producers: Vec<ProducerDef>,
    /// Purchasable upgrades.
    pub upgrades: Vec<UpgradeDef>,
    /// Research tree.
    pub research: Vec<ResearchDef>,
    /// Achievements.
    pub achievements: Vec<AchievementDef>,
}

impl Catalog {
    /// Look up a producer definition by id.
    pub fn producer(&self, id: &ProducerId) -> Option<&ProducerDef> {
        self.producers.iter().find(|p| &p.id == id)
    }

    /// Look up an upgrade definition by id.
    pub fn upgrade(&self, id: &UpgradeId) -> Option<&UpgradeDef> {
        self.upgrades.iter().find(|u| &u.id == id)
    }

    /// Look up a research node by id.
    pub fn research_node(&self, id: &ResearchId) -> Option<&ResearchDef> {
        self.research.iter().find(|r| &r.id == id)
    }

    /// Look up an achievement definition by id.
    pub fn achievement(&self, id: &AchievementId) -> Option<&AchievementDef> {
        self.achievements.iter().find(|a| &a.id == id)
    }

    /// The producer immediately before `id` in catalog order, if any.
    /// Drives the synergy bonus; the first producer has none.
    pub fn preceding_producer(&self, id: &ProducerId) -> Option<&ProducerDef> {
        let idx = self.producers.iter().position(|p| &p.id == id)?;
        if idx == 0 {
            None
        } else {
            self.producers.get(idx - 1)
        }
    }

    /// The balance tables shipped with the game.
    pub fn standard() -> Self {
        fn producer(id: &str, name: &str, base_cost: f64, base_rate: f64) -> ProducerDef {
            ProducerDef {
                id: ProducerId(id.to_string()),
                name: name.to_string(),
                base_cost,
                base_rate,
                tier_thresholds: DEFAULT_TIER_THRESHOLDS,
            }
        }
        fn upgrade(id: &str, name: &str, cost: f64, effect: UpgradeEffect) -> UpgradeDef {
            UpgradeDef {
                id: UpgradeId(id.to_string()),
                name: name.to_string(),
                cost,
                effect,
            }
        }
        fn building(target: &str, mult: f64) -> UpgradeEffect {
            UpgradeEffect::Building {
                target: ProducerId(target.to_string()),
                mult,
            }
        }
        fn research(
            id: &str,
            name: &str,
            cost: f64,
            effect: ResearchEffect,
            requires: &[&str],
        ) -> ResearchDef {
            ResearchDef {
                id: ResearchId(id.to_string()),
                name: name.to_string(),
                cost,
                effect,
                requires: requires.iter().map(|r| ResearchId(r.to_string())).collect(),
            }
        }
        fn achievement(id: &str, name: &str, condition: AchievementCondition) -> AchievementDef {
            AchievementDef {
                id: AchievementId(id.to_string()),
                name: name.to_string(),
                condition,
            }
        }

        Catalog {
            producers: vec![
                producer("cursor", "Cursor", 15.0, 0.1),
                producer("grandma", "Grandma", 100.0, 1.0),
                producer("farm", "Farm", 1_100.0, 8.0),
                producer("factory", "Factory", 12_000.0, 47.0),
                producer("lab", "Lab", 130_000.0, 260.0),
            ],
            upgrades: vec![
                upgrade("click1", "Thicker Dough", 100.0, UpgradeEffect::Click { mult: 2.0 }),
                upgrade("click2", "Oven Mitts", 1_000.0, UpgradeEffect::Click { mult: 2.0 }),
                upgrade("global1", "Organic Flour", 5_000.0, UpgradeEffect::Global { mult: 1.2 }),
                upgrade("global2", "Turbo Ovens", 50_000.0, UpgradeEffect::Global { mult: 1.5 }),
                upgrade("cursor1", "Precision Cursors", 2_000.0, building("cursor", 2.0)),
                upgrade("grandma1", "Grandma Espresso", 5_000.0, building("grandma", 2.0)),
                upgrade("farm1", "Fertilizer", 30_000.0, building("farm", 2.0)),
                upgrade("factory1", "Conveyor Belts", 200_000.0, building("factory", 2.0)),
                upgrade("lab1", "Overclocked Mixers", 800_000.0, building("lab", 2.0)),
            ],
            research: vec![
                research(
                    "r1",
                    "Efficient Logistics",
                    50.0,
                    ResearchEffect::Global { mult: 1.1 },
                    &[],
                ),
                research(
                    "r2",
                    "Click Ergonomics",
                    100.0,
                    ResearchEffect::Click { mult: 1.5 },
                    &["r1"],
                ),
                research(
                    "r3",
                    "Assembly Automation",
                    200.0,
                    ResearchEffect::Building {
                        target: ProducerId("factory".to_string()),
                        mult: 1.5,
                    },
                    &["r1"],
                ),
                research(
                    "r4",
                    "Lab Protocols",
                    250.0,
                    ResearchEffect::LabOutput { mult: 1.5 },
                    &["r1"],
                ),
                research(
                    "r5",
                    "Fine Mechanics",
                    300.0,
                    ResearchEffect::Building {
                        target: ProducerId("cursor".to_string()),
                        mult: 2.0,
                    },
                    &["r2"],
                ),
                research(
                    "r6",
                    "Industrial Synergy",
                    500.0,
                    ResearchEffect::Global { mult: 1.15 },
                    &["r5"],
                ),
                research(
                    "r7",
                    "Quantum Baking",
                    1_000.0,
                    ResearchEffect::LabOutput { mult: 2.0 },
                    &["r6"],
                ),
            ],
            achievements: vec![
                achievement(
                    "clicks100",
                    "Finger Workout",
                    AchievementCondition::ClicksAtLeast(100),
                ),
                achievement(
                    "baked1k",
                    "Small Batch",
                    AchievementCondition::LifetimeAtLeast(1_000.0),
                ),
                achievement(
                    "baked10k",
                    "Wholesale",
                    AchievementCondition::LifetimeAtLeast(10_000.0),
                ),
                achievement("firstAuto", "Hands Free", AchievementCondition::AnyProducerOwned),
                achievement(
                    "firstBonus",
                    "Lucky Crumb",
                    AchievementCondition::BonusEventsAtLeast(1),
                ),
                achievement(
                    "firstAscend",
                    "Written in Stardust",
                    AchievementCondition::StardustAtLeast(1),
                ),
            ],
        }
    }
}

/// Kinds of temporary buffs a bonus event can grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuffKind {
    /// Multiplies the production rate.
    ProductionFrenzy,
    /// Multiplies the click value.
    ClickFrenzy,
}

/// The single active buff slot. A new buff replaces the old one; two buffs
/// never stack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveBuff {
    /// Which rate the buff multiplies.
    pub kind: BuffKind,
    /// Multiplier, >= 1.
    pub mult: f64,
    /// Engine-clock deadline in seconds.
    pub until: f64,
}

/// A pending bonus-event spawn waiting to be resolved or to expire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BonusSpawn {
    /// Horizontal position in percent of the viewport (10..90).
    pub x: f64,
    /// Vertical position in percent of the viewport (10..80).
    pub y: f64,
    /// Engine-clock deadline in seconds.
    pub until: f64,
}

/// One production-rate sample for the history chart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateSample {
    /// Engine-clock timestamp in seconds.
    pub at: f64,
    /// Total production rate at sample time.
    pub total: f64,
    /// Per-producer contribution to the total.
    pub per_producer: BTreeMap<ProducerId, f64>,
}

/// Ring buffer of the most recent rate samples, capacity 60.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateHistory {
    samples: VecDeque<RateSample>,
}

impl RateHistory {
    /// Maximum number of retained samples.
    pub const CAPACITY: usize = 60;

    /// Append a sample, evicting the oldest beyond capacity.
    pub fn push(&mut self, sample: RateSample) {
        while self.samples.len() >= Self::CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples are retained.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest-to-newest iteration.
    pub fn iter(&self) -> impl Iterator<Item = &RateSample> {
        self.samples.iter()
    }

    /// The most recent sample, if any.
    pub fn latest(&self) -> Option<&RateSample> {
        self.samples.back()
    }

    /// Drop all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Running statistics. The first four are cycle-scoped and reset on
/// ascension; the last two accumulate across cycles.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    /// Manual clicks this cycle.
    pub clicks: u64,
    /// Bonus events resolved this cycle.
    pub bonus_events: u64,
    /// Highest production rate observed this cycle.
    pub peak_rate: f64,
    /// Currency produced by ticks this cycle (excludes clicks and grants).
    pub passive_earned: f64,
    /// Completed ascensions.
    pub ascensions: u64,
    /// Currency earned over all cycles.
    pub earned_all_cycles: f64,
}

/// The root mutable aggregate. Mutated only by the tick scheduler and the
/// transaction reducers; fully overwritten by ascension except for stardust,
/// the engine clock and the cross-cycle statistics.
///
/// Producer maps are sparse: an absent count is 0, an absent multiplier is 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionState {
    /// Spendable currency.
    pub balance: f64,
    /// Currency earned this cycle from every source; drives prestige gain.
    pub lifetime_earned: f64,
    /// Base value of one click before multipliers.
    pub click_base: f64,
    /// Click multiplier from upgrades and research.
    pub click_mult: f64,
    /// Global multiplier from upgrades and research.
    pub global_mult: f64,
    /// Per-producer multipliers from upgrades and research.
    pub producer_mult: BTreeMap<ProducerId, f64>,
    /// Owned units per producer.
    pub producers: BTreeMap<ProducerId, u32>,
    /// Purchased upgrades this cycle.
    pub owned_upgrades: BTreeSet<UpgradeId>,
    /// Research-point balance.
    pub research_points: f64,
    /// Purchased research nodes this cycle.
    pub owned_research: BTreeSet<ResearchId>,
    /// Research-point generation multiplier.
    pub lab_output_mult: f64,
    /// Permanent prestige currency.
    pub stardust: u64,
    /// Active buff, if any.
    pub buff: Option<ActiveBuff>,
    /// Pending bonus-event spawn, if any.
    pub bonus_spawn: Option<BonusSpawn>,
    /// Running statistics.
    pub stats: Stats,
    /// Rolling production-rate samples.
    pub history: RateHistory,
    /// Engine clock in seconds, advanced by fast ticks only.
    pub elapsed: f64,
}

impl Default for ProgressionState {
    fn default() -> Self {
        ProgressionState {
            balance: 0.0,
            lifetime_earned: 0.0,
            click_base: 1.0,
            click_mult: 1.0,
            global_mult: 1.0,
            producer_mult: BTreeMap::new(),
            producers: BTreeMap::new(),
            owned_upgrades: BTreeSet::new(),
            research_points: 0.0,
            owned_research: BTreeSet::new(),
            lab_output_mult: 1.0,
            stardust: 0,
            buff: None,
            bonus_spawn: None,
            stats: Stats::default(),
            history: RateHistory::default(),
            elapsed: 0.0,
        }
    }
}

impl ProgressionState {
    /// Owned count for a producer; absent means 0.
    pub fn producer_count(&self, id: &ProducerId) -> u32 {
        self.producers.get(id).copied().unwrap_or(0)
    }

    /// Multiplier for a producer; absent means 1.
    pub fn producer_multiplier(&self, id: &ProducerId) -> f64 {
        self.producer_mult.get(id).copied().unwrap_or(1.0)
    }
}

/// Validation errors for catalog and state invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// The same id appears twice within a catalog section.
    #[error("duplicate id: {0}")]
    DuplicateId(String),
    /// An effect targets a producer the catalog does not define.
    #[error("unknown producer referenced: {0}")]
    UnknownProducer(String),
    /// A research prerequisite names a node the catalog does not define.
    #[error("unknown research prerequisite: {0}")]
    UnknownPrerequisite(String),
    /// A state set references an id outside the catalog.
    #[error("unknown id in state: {0}")]
    UnknownId(String),
    /// Costs must be positive and finite.
    #[error("invalid cost for {0}")]
    InvalidCost(String),
    /// Base rates must be positive and finite.
    #[error("invalid base rate for {0}")]
    InvalidRate(String),
    /// Tier thresholds must be strictly increasing.
    #[error("tier thresholds not strictly increasing for {0}")]
    InvalidThresholds(String),
    /// Multipliers are always >= 1.
    #[error("multiplier below 1 for {0}")]
    MultiplierBelowOne(String),
    /// Currency and research balances are never negative.
    #[error("negative balance")]
    NegativeBalance,
    /// Numeric fields must be finite.
    #[error("non-finite numeric value encountered")]
    NonFinite,
    /// The history buffer holds more samples than its capacity.
    #[error("history exceeds capacity")]
    HistoryOverflow,
}

fn check_mult(mult: f64, what: &str) -> Result<(), ValidationError> {
    if !mult.is_finite() {
        return Err(ValidationError::NonFinite);
    }
    if mult < 1.0 {
        return Err(ValidationError::MultiplierBelowOne(what.to_string()));
    }
    Ok(())
}

/// Validate a single producer definition.
pub fn validate_producer(p: &ProducerDef) -> Result<(), ValidationError> {
    if !(p.base_cost.is_finite() && p.base_cost > 0.0) {
        return Err(ValidationError::InvalidCost(p.id.0.clone()));
    }
    if !(p.base_rate.is_finite() && p.base_rate > 0.0) {
        return Err(ValidationError::InvalidRate(p.id.0.clone()));
    }
    if !p.tier_thresholds.windows(2).all(|w| w[0] < w[1]) {
        return Err(ValidationError::InvalidThresholds(p.id.0.clone()));
    }
    Ok(())
}

/// Validate the catalog, including cross-references (upgrade and research
/// targets, research prerequisites).
pub fn validate_catalog(catalog: &Catalog) -> Result<(), ValidationError> {
    let mut producer_ids: BTreeSet<&ProducerId> = BTreeSet::new();
    for p in &catalog.producers {
        validate_producer(p)?;
        if !producer_ids.insert(&p.id) {
            return Err(ValidationError::DuplicateId(p.id.0.clone()));
        }
    }

    let mut upgrade_ids: BTreeSet<&UpgradeId> = BTreeSet::new();
    for u in &catalog.upgrades {
        if !upgrade_ids.insert(&u.id) {
            return Err(ValidationError::DuplicateId(u.id.0.clone()));
        }
        if !(u.cost.is_finite() && u.cost > 0.0) {
            return Err(ValidationError::InvalidCost(u.id.0.clone()));
        }
        match &u.effect {
            UpgradeEffect::Click { mult } | UpgradeEffect::Global { mult } => {
                check_mult(*mult, &u.id.0)?;
            }
            UpgradeEffect::Building { target, mult } => {
                check_mult(*mult, &u.id.0)?;
                if !producer_ids.contains(target) {
                    return Err(ValidationError::UnknownProducer(target.0.clone()));
                }
            }
        }
    }

    let mut research_ids: BTreeSet<&ResearchId> = BTreeSet::new();
    for r in &catalog.research {
        if !research_ids.insert(&r.id) {
            return Err(ValidationError::DuplicateId(r.id.0.clone()));
        }
        if !(r.cost.is_finite() && r.cost > 0.0) {
            return Err(ValidationError::InvalidCost(r.id.0.clone()));
        }
        match &r.effect {
            ResearchEffect::Global { mult }
            | ResearchEffect::Click { mult }
            | ResearchEffect::LabOutput { mult } => {
                check_mult(*mult, &r.id.0)?;
            }
            ResearchEffect::Building { target, mult } => {
                check_mult(*mult, &r.id.0)?;
                if !producer_ids.contains(target) {
                    return Err(ValidationError::UnknownProducer(target.0.clone()));
                }
            }
        }
    }
    for r in &catalog.research {
        for req in &r.requires {
            if !research_ids.contains(req) {
                return Err(ValidationError::UnknownPrerequisite(req.0.clone()));
            }
        }
    }

    let mut achievement_ids: BTreeSet<&AchievementId> = BTreeSet::new();
    for a in &catalog.achievements {
        if !achievement_ids.insert(&a.id) {
            return Err(ValidationError::DuplicateId(a.id.0.clone()));
        }
    }
    Ok(())
}

/// Validate a state against its catalog: balances non-negative, multipliers
/// >= 1, owned sets within the catalog, history within capacity.
pub fn validate_state(state: &ProgressionState, catalog: &Catalog) -> Result<(), ValidationError> {
    for v in [
        state.balance,
        state.lifetime_earned,
        state.research_points,
        state.elapsed,
        state.stats.peak_rate,
        state.stats.passive_earned,
        state.stats.earned_all_cycles,
    ] {
        if !v.is_finite() {
            return Err(ValidationError::NonFinite);
        }
        if v < 0.0 {
            return Err(ValidationError::NegativeBalance);
        }
    }
    if !(state.click_base.is_finite() && state.click_base > 0.0) {
        return Err(ValidationError::NonFinite);
    }
    check_mult(state.click_mult, "click")?;
    check_mult(state.global_mult, "global")?;
    check_mult(state.lab_output_mult, "lab output")?;
    for (id, mult) in &state.producer_mult {
        check_mult(*mult, &id.0)?;
        if catalog.producer(id).is_none() {
            return Err(ValidationError::UnknownId(id.0.clone()));
        }
    }
    for id in state.producers.keys() {
        if catalog.producer(id).is_none() {
            return Err(ValidationError::UnknownId(id.0.clone()));
        }
    }
    for id in &state.owned_upgrades {
        if catalog.upgrade(id).is_none() {
            return Err(ValidationError::UnknownId(id.0.clone()));
        }
    }
    for id in &state.owned_research {
        if catalog.research_node(id).is_none() {
            return Err(ValidationError::UnknownId(id.0.clone()));
        }
    }
    if let Some(buff) = &state.buff {
        check_mult(buff.mult, "buff")?;
        if !buff.until.is_finite() {
            return Err(ValidationError::NonFinite);
        }
    }
    if let Some(spawn) = &state.bonus_spawn {
        if !(spawn.x.is_finite() && spawn.y.is_finite() && spawn.until.is_finite()) {
            return Err(ValidationError::NonFinite);
        }
    }
    if state.history.len() > RateHistory::CAPACITY {
        return Err(ValidationError::HistoryOverflow);
    }
    Ok(())
}

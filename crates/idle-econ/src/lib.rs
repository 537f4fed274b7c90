#![deny(warnings)]

//! Progression math for idle-bakery.
//!
//! This module provides the pure formula library and the rate calculator:
//! - Tier, milestone, purchase-cost and prestige formulas
//! - Cross-producer synergy bonus
//! - Derived production, click and research rates (`RateBreakdown`)
//! - Achievement evaluation (derived, never stored)
//!
//! Every function here is total: no state, no randomness, no failure mode.

use idle_core::{
    AchievementDef, BuffKind, Catalog, ProducerId, ProgressionState, DEFAULT_TIER_THRESHOLDS,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-unit cost growth factor for repeated producer purchases.
pub const COST_GROWTH: f64 = 1.15;
/// Owned-count step that grants a milestone bonus.
pub const MILESTONE_STEP: u32 = 10;
/// Additive per-unit output bonus granted per milestone step.
pub const MILESTONE_BONUS_PER_STEP: f64 = 0.5;
/// Lifetime earnings backing one point of prestige gain.
pub const PRESTIGE_DIVISOR: f64 = 1_000_000.0;
/// Base of the cross-producer synergy bonus.
pub const SYNERGY_BASE: f64 = 1.02;
/// Production multiplier granted per stardust.
pub const STARDUST_BONUS: f64 = 0.01;
/// Production multiplier granted per unlocked achievement.
pub const ACHIEVEMENT_BONUS: f64 = 0.01;
/// Research points per second generated by one lab before multipliers.
pub const RESEARCH_RATE_PER_LAB: f64 = 0.05;
/// The producer whose owned count drives research-point generation.
pub const LAB_PRODUCER: &str = "lab";
/// Relative slack applied before flooring a cost. The growth product can
/// land a few ULP under an integer (100 * 1.15 computes as 114.999...),
/// which would floor one below the intended value.
const COST_FLOOR_SLACK: f64 = 1e-12;

/// Tier reached by an owned count: -1 below the first threshold, 0..4 at
/// 1/10/25/50/100 units.
///
/// Example:
/// assert_eq!(tier_of(0), -1);
/// assert_eq!(tier_of(10), 1);
/// assert_eq!(tier_of(100), 4);
pub fn tier_of(count: u32) -> i8 {
    let mut tier = -1;
    for (i, threshold) in DEFAULT_TIER_THRESHOLDS.iter().enumerate() {
        if count >= *threshold {
            tier = i as i8;
        }
    }
    tier
}

/// Permanent per-unit output bonus: `1 + floor(count / 10) * 0.5`.
///
/// Example:
/// assert_eq!(milestone_bonus(9), 1.0);
/// assert_eq!(milestone_bonus(10), 1.5);
pub fn milestone_bonus(count: u32) -> f64 {
    1.0 + (count / MILESTONE_STEP) as f64 * MILESTONE_BONUS_PER_STEP
}

/// Cost of the next unit: `floor(base * 1.15^owned)`, an integral f64.
///
/// Strictly increasing in `owned`; at extreme counts the value saturates
/// through f64 infinity and is simply never affordable. The raw product is
/// widened by `COST_FLOOR_SLACK` before flooring so that near-integer
/// results land on the integer rather than one below it.
///
/// Example:
/// assert_eq!(purchase_cost(100.0, 0), 100.0);
/// assert_eq!(purchase_cost(100.0, 1), 115.0);
pub fn purchase_cost(base_cost: f64, owned: u32) -> f64 {
    let raw = base_cost * COST_GROWTH.powi(owned as i32);
    (raw * (1.0 + COST_FLOOR_SLACK)).floor()
}

/// Stardust awarded for ascending with the given lifetime earnings:
/// `floor(sqrt(lifetime / 1_000_000))`, zero below one million.
pub fn prestige_gain(lifetime_earned: f64) -> u64 {
    let gain = (lifetime_earned / PRESTIGE_DIVISOR).sqrt().floor();
    if gain.is_finite() && gain > 0.0 {
        gain as u64
    } else {
        0
    }
}

/// Production multiplier from the stardust balance.
pub fn prestige_multiplier(stardust: u64) -> f64 {
    1.0 + stardust as f64 * STARDUST_BONUS
}

/// Production multiplier from the unlocked-achievement count.
pub fn achievement_multiplier(unlocked: usize) -> f64 {
    1.0 + unlocked as f64 * ACHIEVEMENT_BONUS
}

/// Achievements whose conditions currently hold. Recomputed from state on
/// every call; an achievement lapses if its condition stops holding.
pub fn unlocked_achievements<'a>(
    catalog: &'a Catalog,
    state: &ProgressionState,
) -> Vec<&'a AchievementDef> {
    catalog
        .achievements
        .iter()
        .filter(|a| a.condition.is_met(state))
        .collect()
}

/// Chained cross-producer bonus: `1.02^(owned count of the immediately
/// preceding producer in catalog order)`; 1 for the first producer.
pub fn synergy_bonus(catalog: &Catalog, state: &ProgressionState, id: &ProducerId) -> f64 {
    match catalog.preceding_producer(id) {
        Some(prev) => SYNERGY_BASE.powi(state.producer_count(&prev.id) as i32),
        None => 1.0,
    }
}

/// All derived rates for one state, shared by the tick scheduler and the
/// renderer. Rates are per second; the scheduler pro-rates per tick.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RateBreakdown {
    /// Final contribution per producer, including global factors; zero for
    /// unowned producers. Sums to `production`.
    pub per_producer: BTreeMap<ProducerId, f64>,
    /// Producer output before global factors.
    pub base_rate: f64,
    /// Final production per second.
    pub production: f64,
    /// Value of one click.
    pub click_value: f64,
    /// Research points per second; zero without labs.
    pub research_rate: f64,
}

/// Compute every derived rate for the given state.
///
/// Per producer: `base_rate * producer_mult * milestone_bonus * synergy`.
/// Production applies global, prestige, achievement and production-frenzy
/// multipliers on top; clicks apply the click multiplier and click-frenzy
/// instead. Research applies global, prestige, the lab's own producer
/// multiplier and the lab-output multiplier.
pub fn rates(catalog: &Catalog, state: &ProgressionState) -> RateBreakdown {
    let unlocked = unlocked_achievements(catalog, state).len();
    let prestige = prestige_multiplier(state.stardust);
    let achievement = achievement_multiplier(unlocked);
    let production_buff = match &state.buff {
        Some(b) if b.kind == BuffKind::ProductionFrenzy => b.mult,
        _ => 1.0,
    };
    let click_buff = match &state.buff {
        Some(b) if b.kind == BuffKind::ClickFrenzy => b.mult,
        _ => 1.0,
    };
    let global_production = state.global_mult * prestige * achievement * production_buff;

    let mut per_producer = BTreeMap::new();
    let mut base_rate = 0.0;
    for def in &catalog.producers {
        let count = state.producer_count(&def.id);
        if count == 0 {
            per_producer.insert(def.id.clone(), 0.0);
            continue;
        }
        let per_unit = def.base_rate
            * state.producer_multiplier(&def.id)
            * milestone_bonus(count)
            * synergy_bonus(catalog, state, &def.id);
        let contribution = count as f64 * per_unit;
        base_rate += contribution;
        per_producer.insert(def.id.clone(), contribution * global_production);
    }
    let production = base_rate * global_production;

    let click_value = state.click_base
        * state.click_mult
        * state.global_mult
        * prestige
        * achievement
        * click_buff;

    let lab = ProducerId(LAB_PRODUCER.to_string());
    let labs = state.producer_count(&lab);
    let research_rate = if labs > 0 {
        RESEARCH_RATE_PER_LAB
            * labs as f64
            * state.global_mult
            * prestige
            * state.producer_multiplier(&lab)
            * state.lab_output_mult
    } else {
        0.0
    };

    RateBreakdown {
        per_producer,
        base_rate,
        production,
        click_value,
        research_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idle_core::ActiveBuff;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn pid(s: &str) -> ProducerId {
        ProducerId(s.to_string())
    }

    fn state_with(producers: &[(&str, u32)]) -> ProgressionState {
        let mut state = ProgressionState::default();
        for (id, count) in producers {
            state.producers.insert(pid(id), *count);
        }
        state
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(tier_of(0), -1);
        assert_eq!(tier_of(1), 0);
        assert_eq!(tier_of(9), 0);
        assert_eq!(tier_of(10), 1);
        assert_eq!(tier_of(24), 1);
        assert_eq!(tier_of(25), 2);
        assert_eq!(tier_of(49), 2);
        assert_eq!(tier_of(50), 3);
        assert_eq!(tier_of(99), 3);
        assert_eq!(tier_of(100), 4);
        assert_eq!(tier_of(5_000), 4);
    }

    #[test]
    fn milestone_bonus_examples() {
        assert_eq!(milestone_bonus(0), 1.0);
        assert_eq!(milestone_bonus(9), 1.0);
        assert_eq!(milestone_bonus(10), 1.5);
        assert_eq!(milestone_bonus(25), 2.0);
    }

    #[test]
    fn purchase_cost_examples() {
        assert_eq!(purchase_cost(100.0, 0), 100.0);
        assert_eq!(purchase_cost(100.0, 1), 115.0);
        assert_eq!(purchase_cost(15.0, 0), 15.0);
        assert_eq!(purchase_cost(15.0, 1), 17.0); // floor(17.25)
    }

    #[test]
    fn near_integer_products_floor_to_the_intended_cost() {
        // 100 * 1.15 computes as 114.999_999_999_999_985_789; without the
        // slack it floors to 114.
        assert_eq!(purchase_cost(100.0, 1), 115.0);
        assert_eq!(purchase_cost(200.0, 1), 230.0);
        // The slack never lifts a genuinely fractional cost to the next
        // integer.
        assert_eq!(purchase_cost(15.0, 1), 17.0);
        assert_eq!(purchase_cost(100.0, 2), 132.0); // floor(132.25)
    }

    #[test]
    fn prestige_gain_examples() {
        assert_eq!(prestige_gain(0.0), 0);
        assert_eq!(prestige_gain(999_999.0), 0);
        assert_eq!(prestige_gain(1_000_000.0), 1);
        assert_eq!(prestige_gain(3_999_999.0), 1);
        assert_eq!(prestige_gain(4_000_000.0), 2);
    }

    #[test]
    fn synergy_first_producer_is_neutral() {
        let catalog = Catalog::standard();
        let state = state_with(&[("cursor", 50)]);
        assert_eq!(synergy_bonus(&catalog, &state, &pid("cursor")), 1.0);
    }

    #[test]
    fn synergy_chains_to_preceding_producer() {
        let catalog = Catalog::standard();
        let state = state_with(&[("cursor", 10), ("grandma", 3)]);
        let bonus = synergy_bonus(&catalog, &state, &pid("grandma"));
        assert!((bonus - SYNERGY_BASE.powi(10)).abs() < EPS);
        // farm's predecessor (grandma) is owned, cursor count is irrelevant
        let farm_bonus = synergy_bonus(&catalog, &state, &pid("farm"));
        assert!((farm_bonus - SYNERGY_BASE.powi(3)).abs() < EPS);
    }

    #[test]
    fn rates_on_default_state_are_zero() {
        let catalog = Catalog::standard();
        let breakdown = rates(&catalog, &ProgressionState::default());
        assert_eq!(breakdown.production, 0.0);
        assert_eq!(breakdown.research_rate, 0.0);
        assert_eq!(breakdown.click_value, 1.0);
        assert_eq!(breakdown.per_producer.len(), 5);
        assert!(breakdown.per_producer.values().all(|&v| v == 0.0));
    }

    #[test]
    fn production_hand_computed_for_ten_cursors() {
        let catalog = Catalog::standard();
        let state = state_with(&[("cursor", 10)]);
        let breakdown = rates(&catalog, &state);
        // per unit: 0.1 * 1 * 1.5 (milestone) * 1 (first producer) = 0.15
        // base: 10 * 0.15 = 1.5; one achievement holds (any producer owned)
        assert!((breakdown.base_rate - 1.5).abs() < EPS);
        assert!((breakdown.production - 1.5 * 1.01).abs() < EPS);
        let cursor = breakdown.per_producer.get(&pid("cursor")).unwrap();
        assert!((cursor - breakdown.production).abs() < EPS);
    }

    #[test]
    fn production_frenzy_scales_production_not_clicks() {
        let catalog = Catalog::standard();
        let mut state = state_with(&[("grandma", 1)]);
        let plain = rates(&catalog, &state);
        state.buff = Some(ActiveBuff {
            kind: BuffKind::ProductionFrenzy,
            mult: 7.0,
            until: 30.0,
        });
        let buffed = rates(&catalog, &state);
        assert!((buffed.production - plain.production * 7.0).abs() < EPS);
        assert!((buffed.click_value - plain.click_value).abs() < EPS);
    }

    #[test]
    fn click_frenzy_scales_clicks_not_production() {
        let catalog = Catalog::standard();
        let mut state = state_with(&[("grandma", 1)]);
        let plain = rates(&catalog, &state);
        state.buff = Some(ActiveBuff {
            kind: BuffKind::ClickFrenzy,
            mult: 50.0,
            until: 15.0,
        });
        let buffed = rates(&catalog, &state);
        assert!((buffed.click_value - plain.click_value * 50.0).abs() < EPS);
        assert!((buffed.production - plain.production).abs() < EPS);
    }

    #[test]
    fn research_rate_requires_labs_and_stacks_multipliers() {
        let catalog = Catalog::standard();
        let mut state = state_with(&[("lab", 2)]);
        state.global_mult = 1.2;
        state.stardust = 50; // prestige 1.5
        state.producer_mult.insert(pid("lab"), 2.0);
        state.lab_output_mult = 1.5;
        let breakdown = rates(&catalog, &state);
        // 0.05 * 2 * 1.2 * 1.5 * 2 * 1.5 = 0.54
        assert!((breakdown.research_rate - 0.54).abs() < EPS);

        state.producers.remove(&pid("lab"));
        assert_eq!(rates(&catalog, &state).research_rate, 0.0);
    }

    #[test]
    fn click_value_stacks_click_global_and_prestige() {
        let catalog = Catalog::standard();
        let mut state = ProgressionState::default();
        state.click_base = 1.0;
        state.click_mult = 4.0; // click1 + click2
        state.global_mult = 1.2;
        state.stardust = 100; // prestige 2.0
        let breakdown = rates(&catalog, &state);
        // one achievement holds (stardust >= 1): 1.01
        assert!((breakdown.click_value - 4.0 * 1.2 * 2.0 * 1.01).abs() < EPS);
    }

    #[test]
    fn per_producer_contributions_sum_to_production() {
        let catalog = Catalog::standard();
        let mut state = state_with(&[("cursor", 30), ("grandma", 12), ("farm", 5), ("lab", 1)]);
        state.global_mult = 1.32;
        state.producer_mult.insert(pid("grandma"), 2.0);
        state.stardust = 7;
        let breakdown = rates(&catalog, &state);
        let sum: f64 = breakdown.per_producer.values().sum();
        assert!((sum - breakdown.production).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn milestone_bonus_closed_form(c in 0u32..100_000) {
            let expected = 1.0 + (c / 10) as f64 * 0.5;
            prop_assert_eq!(milestone_bonus(c), expected);
        }

        #[test]
        fn purchase_cost_strictly_increasing(base in 10.0f64..1_000_000.0, owned in 0u32..500) {
            // strict once base * 1.15^owned has a step width >= 1
            let a = purchase_cost(base, owned);
            let b = purchase_cost(base, owned + 1);
            prop_assert!(b > a);
        }

        #[test]
        fn purchase_cost_is_integral(base in 1.0f64..1_000_000.0, owned in 0u32..200) {
            let cost = purchase_cost(base, owned);
            prop_assert!(cost.is_finite());
            prop_assert_eq!(cost.fract(), 0.0);
        }

        #[test]
        fn prestige_gain_monotonic(lifetime in 0.0f64..1e12) {
            let g1 = prestige_gain(lifetime);
            let g2 = prestige_gain(lifetime * 2.0 + 1.0);
            prop_assert!(g2 >= g1);
        }

        #[test]
        fn tier_never_exceeds_range(c in 0u32..u32::MAX) {
            let t = tier_of(c);
            prop_assert!((-1..=4).contains(&t));
        }
    }
}

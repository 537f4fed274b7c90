#![deny(warnings)]

//! Headless runner and balance harness: plays the game on a schedule and
//! prints KPIs, with optional save-file round trips.

use anyhow::{Context, Result};
use chrono::Utc;
use idle_core::{Catalog, ProducerId, ResearchId, UpgradeId};
use idle_econ::{prestige_gain, rates};
use idle_runtime::{Engine, EngineConfig, EngineEvent};
use persistence::SaveFile;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Simulated seconds between autosaves when a save path is set.
const AUTOSAVE_INTERVAL_SECS: f64 = 30.0;

struct Args {
    seconds: f64,
    seed: Option<u64>,
    save: Option<PathBuf>,
    scenario: Option<PathBuf>,
    import: Option<PathBuf>,
    export: bool,
    reset: bool,
    version: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        seconds: 300.0,
        seed: None,
        save: None,
        scenario: None,
        import: None,
        export: false,
        reset: false,
        version: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--seconds" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    args.seconds = v;
                }
            }
            "--seed" => args.seed = it.next().and_then(|s| s.parse().ok()),
            "--save" => args.save = it.next().map(PathBuf::from),
            "--scenario" => args.scenario = it.next().map(PathBuf::from),
            "--import" => args.import = it.next().map(PathBuf::from),
            "--export" => args.export = true,
            "--reset" => args.reset = true,
            "--version" => args.version = true,
            _ => {}
        }
    }
    args
}

/// Scenario file: engine tuning plus autoplay knobs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Scenario {
    engine: EngineConfig,
    autoplay: Autoplay,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct Autoplay {
    clicks_per_second: u32,
    buy_producers: bool,
    buy_upgrades: bool,
    buy_research: bool,
    /// Ascend once the pending stardust gain reaches this. Zero disables.
    ascend_at: u64,
}

impl Default for Autoplay {
    fn default() -> Self {
        Autoplay {
            clicks_per_second: 4,
            buy_producers: true,
            buy_upgrades: true,
            buy_research: true,
            ascend_at: 0,
        }
    }
}

fn load_scenario(path: &PathBuf) -> Result<Scenario> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing scenario {}", path.display()))
}

#[derive(Default)]
struct Tally {
    milestones: u64,
    frenzies: u64,
    instant_gains: u64,
    ascensions: u64,
}

fn tally_events(tally: &mut Tally, events: Vec<EngineEvent>) {
    for event in events {
        match event {
            EngineEvent::Milestone { .. } => tally.milestones += 1,
            EngineEvent::BuffStarted { .. } => tally.frenzies += 1,
            EngineEvent::InstantGain { .. } => tally.instant_gains += 1,
            EngineEvent::Ascended { .. } => tally.ascensions += 1,
            EngineEvent::OfflineProgress { seconds, amount } => {
                info!(seconds, amount, "offline progress credited");
            }
            _ => {}
        }
    }
}

/// Picks the affordable producer with the shortest payback, measured as cost
/// over the marginal rate it would add.
fn best_payback_producer(engine: &Engine) -> Option<ProducerId> {
    let state = engine.state();
    let current = engine.rates().production;
    let mut best: Option<(f64, ProducerId)> = None;
    for def in &engine.catalog().producers {
        let cost = match engine.producer_cost(&def.id) {
            Some(cost) => cost,
            None => continue,
        };
        if cost > state.balance {
            continue;
        }
        let mut trial = state.clone();
        *trial.producers.entry(def.id.clone()).or_insert(0) += 1;
        let gain = rates(engine.catalog(), &trial).production - current;
        if gain <= 0.0 {
            continue;
        }
        let payback = cost / gain;
        if best.as_ref().map_or(true, |(shortest, _)| payback < *shortest) {
            best = Some((payback, def.id.clone()));
        }
    }
    best.map(|(_, id)| id)
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args();
    if args.version {
        println!(
            "idle-bakery {} ({}, {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE")
        );
        return Ok(());
    }
    info!(seconds = args.seconds, "starting balance harness");

    let scenario = match &args.scenario {
        Some(path) => load_scenario(path)?,
        None => Scenario::default(),
    };
    let mut engine_config = scenario.engine.clone();
    if let Some(seed) = args.seed {
        engine_config.rng_seed = seed;
    }
    let autoplay = scenario.autoplay.clone();

    let save_file = args.save.as_ref().map(|path| SaveFile::new(path.clone()));
    if args.reset {
        if let Some(file) = &save_file {
            file.delete()?;
            info!(path = %file.path().display(), "save file deleted");
        }
    }

    let catalog = Catalog::standard();
    let mut engine = if let Some(path) = &args.import {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading snapshot {}", path.display()))?;
        let snapshot = persistence::decode(&text)
            .with_context(|| format!("importing snapshot {}", path.display()))?;
        Engine::restore(catalog, engine_config, snapshot, Utc::now())?
    } else if let Some(file) = &save_file {
        Engine::restore(catalog, engine_config, file.load_or_default(), Utc::now())?
    } else {
        Engine::new(catalog, engine_config)?
    };
    if args.import.is_some() {
        if let Some(file) = &save_file {
            file.store(&engine.snapshot(Utc::now()))?;
        }
    }

    if !args.export {
        println!(
            "Catalog OK | producers: {} | upgrades: {} | research: {} | achievements: {}",
            engine.catalog().producers.len(),
            engine.catalog().upgrades.len(),
            engine.catalog().research.len(),
            engine.catalog().achievements.len()
        );
    }

    let upgrade_ids: Vec<UpgradeId> = engine
        .catalog()
        .upgrades
        .iter()
        .map(|def| def.id.clone())
        .collect();
    let research_ids: Vec<ResearchId> = engine
        .catalog()
        .research
        .iter()
        .map(|def| def.id.clone())
        .collect();

    let mut tally = Tally::default();
    let mut autosave_clock = 0.0;
    let mut sim_time = 0.0;
    while sim_time < args.seconds {
        engine.advance(1.0);
        sim_time += 1.0;
        for _ in 0..autoplay.clicks_per_second {
            engine.click(50.0, 45.0);
        }
        engine.resolve_bonus_event();
        if autoplay.buy_upgrades {
            for id in &upgrade_ids {
                engine.buy_upgrade(id);
            }
        }
        if autoplay.buy_research {
            for id in &research_ids {
                engine.buy_research(id);
            }
        }
        if autoplay.buy_producers {
            while let Some(id) = best_payback_producer(&engine) {
                if !engine.buy_producer(&id) {
                    break;
                }
            }
        }
        if autoplay.ascend_at > 0
            && prestige_gain(engine.state().lifetime_earned) >= autoplay.ascend_at
        {
            engine.ascend();
        }
        tally_events(&mut tally, engine.take_events());
        if let Some(file) = &save_file {
            autosave_clock += 1.0;
            if autosave_clock >= AUTOSAVE_INTERVAL_SECS {
                autosave_clock = 0.0;
                file.store(&engine.snapshot(Utc::now()))?;
            }
        }
    }
    tally_events(&mut tally, engine.take_events());

    if let Some(file) = &save_file {
        file.store(&engine.snapshot(Utc::now()))?;
        info!(path = %file.path().display(), "state saved");
    }

    if args.export {
        println!("{}", persistence::encode(&engine.snapshot(Utc::now()))?);
    } else {
        let state = engine.state();
        let breakdown = engine.rates();
        let producers_owned: u32 = state.producers.values().sum();
        println!(
            "KPI | elapsed: {:.0}s | balance: {:.0} | lifetime: {:.0} | rate: {:.2}/s | producers: {} | upgrades: {} | research: {} | stardust: {} | peak: {:.2}/s",
            state.elapsed,
            state.balance,
            state.lifetime_earned,
            breakdown.production,
            producers_owned,
            state.owned_upgrades.len(),
            state.owned_research.len(),
            state.stardust,
            state.stats.peak_rate
        );
        println!(
            "Events | milestones: {} | frenzies: {} | instant gains: {} | ascensions: {}",
            tally.milestones, tally.frenzies, tally.instant_gains, tally.ascensions
        );
    }

    Ok(())
}

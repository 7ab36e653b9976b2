//! Headless balance runs over a content pack.
//!
//! Each simulated hour keeps one dispatch in flight, advances the world as
//! offline time, collects whatever finished and samples idle crew. The run
//! ends with a summary of the economy suitable for comparing packs or seeds.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;

use clay_core::catalog::Catalog;
use clay_core::config::EngineConfig;
use clay_core::engine::Engine;
use clay_core::state::DispatchStatus;

const BUNDLED_PACK: &str = include_str!("../../../content/pack.json");

const AUTOPLAN_TAGS: [&str; 6] = ["economy", "science", "defense", "era", "accelerator", "infrastructure"];

const SECONDS_PER_HOUR: f64 = 3_600.0;

#[derive(Parser, Debug)]
#[command(author, version, about = "Deterministic balance runs for Clay content", long_about = None)]
struct Args {
    /// Content pack file or directory (defaults to the bundled pack)
    #[arg(long)]
    content: Option<PathBuf>,

    /// Engine tuning file (TOML, RON or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulated days per run
    #[arg(long, default_value_t = 7)]
    days: u32,

    /// First seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of consecutive seeds to run in parallel
    #[arg(long, default_value_t = 1)]
    seeds: u64,

    /// Let the auto-planner pick projects
    #[arg(long)]
    autoplan: bool,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Summary {
    days: u32,
    seed: u64,
    energy_produced: f64,
    waste_pct: f64,
    crew_idle_pct: f64,
    raid_rate_per_day: f64,
    /// Hours until each era's keystone completed.
    time_to_era_hours: BTreeMap<String, f64>,
    domain_points: BTreeMap<String, u32>,
    domain_tiers: BTreeMap<String, u32>,
    dispatches_completed: u64,
    cache_collects: u64,
}

#[derive(Debug, Clone, Copy)]
struct RunOptions {
    days: u32,
    autoplan: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let catalog = match &args.content {
        Some(path) => clay_data::load_catalog(path)
            .with_context(|| format!("Failed to load content from {}", path.display()))?,
        None => clay_data::loader::catalog_from_json(BUNDLED_PACK)
            .context("Bundled content pack is invalid")?,
    };
    let config = match &args.config {
        Some(path) => clay_data::load_engine_config(path)
            .with_context(|| format!("Failed to load engine config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let catalog = Arc::new(catalog);
    let options = RunOptions {
        days: args.days,
        autoplan: args.autoplan,
    };
    let seeds = args.seed..args.seed.saturating_add(args.seeds.max(1));
    tracing::info!(days = args.days, runs = seeds.end - seeds.start, "balance.start");

    let summaries: Vec<Summary> = seeds
        .into_par_iter()
        .map(|seed| simulate(&catalog, &config, options, seed))
        .collect();

    if args.json {
        let rendered = if summaries.len() == 1 {
            serde_json::to_string_pretty(&summaries[0])?
        } else {
            serde_json::to_string_pretty(&summaries)?
        };
        println!("{rendered}");
    } else {
        for (i, summary) in summaries.iter().enumerate() {
            if i > 0 {
                println!();
            }
            print!("{}", render_text(summary));
        }
    }
    Ok(())
}

fn simulate(catalog: &Arc<Catalog>, config: &EngineConfig, options: RunOptions, seed: u64) -> Summary {
    let mut engine = Engine::new(catalog.clone(), config.clone(), seed, 0.0);
    if options.autoplan {
        engine.set_auto_planner_enabled(true);
        for tag in AUTOPLAN_TAGS {
            engine.set_auto_plan_tag(tag, true);
        }
    }

    let hours = u64::from(options.days) * 24;
    let mut idle_sum = 0.0;
    let mut era_hours: BTreeMap<String, f64> = BTreeMap::new();

    for hour in 1..=hours {
        let any_active = engine
            .state()
            .dispatches
            .values()
            .any(|d| d.status == DispatchStatus::Active);
        if !any_active {
            let next = catalog
                .dispatches()
                .iter()
                .find(|d| engine.dispatch_block_reason(d.id.as_str()).is_none())
                .map(|d| d.id.clone());
            if let Some(id) = next {
                if let Err(err) = engine.start_dispatch(id.as_str()) {
                    tracing::debug!(%id, %err, "balance.dispatch_refused");
                }
            }
        }

        let now = hour as f64 * SECONDS_PER_HOUR;
        engine.advance(SECONDS_PER_HOUR, now, true);

        let finished: Vec<_> = engine
            .state()
            .dispatches
            .iter()
            .filter(|(_, d)| d.status != DispatchStatus::Active)
            .map(|(key, _)| key)
            .collect();
        for key in finished {
            if let Err(err) = engine.collect_dispatch(key) {
                tracing::debug!(%err, "balance.collect_refused");
            }
        }

        if engine.state().collector.total() > 0.0 {
            if let Err(err) = engine.collect_cache() {
                tracing::debug!(%err, "balance.cache_refused");
            }
        }

        let state = engine.state();
        let max_crew = state.max_crew.max(1) as f64;
        idle_sum += state.available_crew(catalog) as f64 / max_crew;

        for era in catalog.eras().iter() {
            if !era_hours.contains_key(era.id.as_str()) && state.era_complete(era) {
                tracing::info!(seed, era = %era.id, hour, "balance.era_complete");
                era_hours.insert(era.id.to_string(), hour as f64);
            }
        }
    }

    summarize(&engine, options.days, seed, hours, idle_sum, era_hours)
}

fn summarize(
    engine: &Engine,
    days: u32,
    seed: u64,
    hours: u64,
    idle_sum: f64,
    time_to_era_hours: BTreeMap<String, f64>,
) -> Summary {
    let state = engine.state();
    let stats = &state.stats;
    let energy_produced = engine
        .catalog()
        .rules()
        .prestige
        .energy_resource
        .as_ref()
        .and_then(|id| stats.produced.get(id.as_str()))
        .copied()
        .unwrap_or(0.0);
    let produced: f64 = stats.produced.values().sum();
    let wasted: f64 = stats.wasted.values().sum();
    let waste_pct = if produced > 0.0 { wasted / produced * 100.0 } else { 0.0 };
    let crew_idle_pct = if hours > 0 { idle_sum / hours as f64 * 100.0 } else { 0.0 };
    let raid_rate_per_day = if days > 0 { stats.raids as f64 / days as f64 } else { 0.0 };

    Summary {
        days,
        seed,
        energy_produced,
        waste_pct,
        crew_idle_pct,
        raid_rate_per_day,
        time_to_era_hours,
        domain_points: state
            .domains
            .points
            .iter()
            .map(|(id, points)| (id.to_string(), *points))
            .collect(),
        domain_tiers: state
            .domains
            .tiers
            .iter()
            .map(|(id, tier)| (id.to_string(), *tier))
            .collect(),
        dispatches_completed: stats.dispatches_completed,
        cache_collects: stats.cache_collects,
    }
}

fn render_text(summary: &Summary) -> String {
    let mut out = String::new();
    out.push_str(&format!("seed {} over {} days\n", summary.seed, summary.days));
    out.push_str(&format!("  energy produced:      {:.1}\n", summary.energy_produced));
    out.push_str(&format!("  waste:                {:.2}%\n", summary.waste_pct));
    out.push_str(&format!("  crew idle:            {:.2}%\n", summary.crew_idle_pct));
    out.push_str(&format!("  raids per day:        {:.2}\n", summary.raid_rate_per_day));
    out.push_str(&format!("  dispatches completed: {}\n", summary.dispatches_completed));
    out.push_str(&format!("  cache collects:       {}\n", summary.cache_collects));
    for (era, hours) in &summary.time_to_era_hours {
        out.push_str(&format!("  era {era}: day {:.2}\n", hours / 24.0));
    }
    for (domain, points) in &summary.domain_points {
        let tier = summary.domain_tiers.get(domain).copied().unwrap_or(0);
        out.push_str(&format!("  domain {domain}: {points} points, tier {tier}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundled() -> Arc<Catalog> {
        Arc::new(clay_data::loader::catalog_from_json(BUNDLED_PACK).unwrap())
    }

    #[test]
    fn bundled_pack_loads() {
        let catalog = bundled();
        assert_eq!(catalog.eras().len(), 4);
        assert!(catalog.dispatch("forage").is_some());
    }

    #[test]
    fn same_seed_same_summary() {
        let catalog = bundled();
        let options = RunOptions { days: 2, autoplan: true };
        let a = simulate(&catalog, &EngineConfig::default(), options, 7);
        let b = simulate(&catalog, &EngineConfig::default(), options, 7);
        assert_eq!(a, b);
    }

    #[test]
    fn dispatches_run_every_day() {
        let catalog = bundled();
        let options = RunOptions { days: 1, autoplan: false };
        let summary = simulate(&catalog, &EngineConfig::default(), options, 42);
        assert!(summary.dispatches_completed > 0);
        assert!(summary.crew_idle_pct >= 0.0 && summary.crew_idle_pct <= 100.0);
        assert_eq!(summary.days, 1);
    }

    #[test]
    fn text_report_lists_eras_in_days() {
        let mut era = BTreeMap::new();
        era.insert("stone".to_string(), 36.0);
        let summary = Summary {
            days: 3,
            seed: 1,
            energy_produced: 0.0,
            waste_pct: 0.0,
            crew_idle_pct: 50.0,
            raid_rate_per_day: 0.0,
            time_to_era_hours: era,
            domain_points: BTreeMap::new(),
            domain_tiers: BTreeMap::new(),
            dispatches_completed: 0,
            cache_collects: 0,
        };
        let text = render_text(&summary);
        assert!(text.contains("era stone: day 1.50"));
        assert!(text.starts_with("seed 1 over 3 days"));
    }

    #[test]
    fn args_parse_defaults() {
        let args = Args::parse_from(["clay-balance"]);
        assert_eq!(args.days, 7);
        assert_eq!(args.seed, 42);
        assert_eq!(args.seeds, 1);
        assert!(!args.autoplan && !args.json);
    }
}

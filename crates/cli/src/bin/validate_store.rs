use anyhow::{Context, Result};
use clap::Parser;
use models::PlannerStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::{fs, process};

/// Checks a planner.json store for broken references and invalid values.
#[derive(Parser, Debug)]
#[command(name = "validate-store")]
struct Args {
    /// Path to the planner.json store
    #[arg(default_value = "data/planner.json")]
    store: PathBuf,
}

#[derive(Default)]
struct Report {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Report {
    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }
    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
    fn print(&self, file: &str) {
        for w in &self.warnings {
            println!("[WARN] {}: {}", file, w);
        }
        for e in &self.errors {
            println!("[ERROR] {}: {}", file, e);
        }
    }
    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

fn load_store(path: &Path) -> Result<PlannerStore> {
    let txt = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let store: PlannerStore = serde_json::from_str(&txt).context("parsing planner store JSON")?;
    Ok(store)
}

fn percentage_in_range(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= dec!(100)
}

fn validate_store(store: &PlannerStore) -> Report {
    let mut rep = Report::default();

    // Unique ids and counter consistency
    let mut asset_ids = HashSet::new();
    for asset in &store.assets {
        if !asset_ids.insert(asset.id) {
            rep.error(format!("duplicate asset id {}", asset.id));
        }
        if asset.id >= store.next_asset_id {
            rep.error(format!(
                "asset id {} is not below next_asset_id {}",
                asset.id, store.next_asset_id
            ));
        }
        if asset.ticker.trim().is_empty() {
            rep.error(format!("asset {} has an empty ticker", asset.id));
        }
    }

    // Ticker uniqueness (case-insensitive)
    let mut tickers = HashSet::new();
    for asset in &store.assets {
        if !tickers.insert(asset.ticker.to_uppercase()) {
            rep.error(format!("duplicate ticker {}", asset.ticker));
        }
    }

    let mut dividend_ids = HashSet::new();
    for record in &store.dividends {
        if !dividend_ids.insert(record.id) {
            rep.error(format!("duplicate dividend id {}", record.id));
        }
        if record.id >= store.next_dividend_id {
            rep.error(format!(
                "dividend id {} is not below next_dividend_id {}",
                record.id, store.next_dividend_id
            ));
        }
        if !asset_ids.contains(&record.asset_id) {
            rep.error(format!(
                "dividend {} references missing asset {}",
                record.id, record.asset_id
            ));
        }
        if record.amount_per_share < Decimal::ZERO {
            rep.error(format!(
                "dividend {} has a negative amount per share",
                record.id
            ));
        } else if record.amount_per_share == Decimal::ZERO {
            rep.warn(format!("dividend {} has a zero amount per share", record.id));
        }
    }

    let mut goal_ids = HashSet::new();
    for goal in &store.goals {
        if !goal_ids.insert(goal.id) {
            rep.error(format!("duplicate goal id {}", goal.id));
        }
        if goal.id >= store.next_goal_id {
            rep.error(format!(
                "goal id {} is not below next_goal_id {}",
                goal.id, store.next_goal_id
            ));
        }
        if goal.desired_monthly_income <= Decimal::ZERO {
            rep.error(format!("goal {} has a non-positive income", goal.id));
        }
        if goal.years_to_target < 1 {
            rep.error(format!("goal {} has zero years to target", goal.id));
        }
        if !percentage_in_range(goal.annual_inflation_rate) {
            rep.error(format!("goal {} has inflation outside 0-100", goal.id));
        }
        if !percentage_in_range(goal.reinvestment_percentage) {
            rep.error(format!("goal {} has reinvestment outside 0-100", goal.id));
        }
    }

    let mut simulation_ids = HashSet::new();
    for sim in &store.simulations {
        if !simulation_ids.insert(sim.id) {
            rep.error(format!("duplicate simulation id {}", sim.id));
        }
        if sim.id >= store.next_simulation_id {
            rep.error(format!(
                "simulation id {} is not below next_simulation_id {}",
                sim.id, store.next_simulation_id
            ));
        }
        if !goal_ids.contains(&sim.goal_id) {
            rep.error(format!(
                "simulation {} references missing goal {}",
                sim.id, sim.goal_id
            ));
        }
        if let Some(yield_used) = sim.yield_used {
            if yield_used <= Decimal::ZERO {
                rep.warn(format!("simulation {} recorded a non-positive yield", sim.id));
            }
        }
    }

    rep
}

fn main() -> Result<()> {
    let args = Args::parse();

    let store = load_store(&args.store)?;
    let report = validate_store(&store);
    let name = args.store.display().to_string();
    report.print(&name);

    if report.has_errors() {
        println!("{}: {} error(s), {} warning(s)", name, report.errors.len(), report.warnings.len());
        process::exit(1);
    }
    println!("{}: OK ({} warning(s))", name, report.warnings.len());
    Ok(())
}

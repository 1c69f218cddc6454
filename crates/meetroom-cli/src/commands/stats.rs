use chrono::{Datelike, Local};
use clap::{Subcommand, ValueEnum};
use meetroom_core::{StatPeriod, StatsAggregator};

#[derive(Clone, Copy, ValueEnum)]
pub enum Period {
    /// Current month
    Month,
    /// Current year
    Year,
    /// All history
    All,
}

#[derive(Subcommand)]
pub enum StatsAction {
    /// Dump the raw monthly rollup rows
    View,
    /// Clear the rollups and replay the whole ledger
    Rebuild,
    /// Ranked usage for a period
    Top {
        #[arg(long, value_enum, default_value = "all")]
        period: Period,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = super::open_database()?;
    let stats = StatsAggregator::new(db);

    match action {
        StatsAction::View => {
            let rows = stats.rows()?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        StatsAction::Rebuild => {
            let summary = stats.rebuild()?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        StatsAction::Top { period, limit } => {
            let now = Local::now();
            let period = match period {
                Period::Month => StatPeriod::Month {
                    year: now.year(),
                    month: now.month(),
                },
                Period::Year => StatPeriod::Year(now.year()),
                Period::All => StatPeriod::AllTime,
            };
            let report = serde_json::json!({
                "by_count": stats.top_by_count(period, limit)?,
                "by_duration": stats.top_by_duration(period, limit)?,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

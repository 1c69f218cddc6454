pub mod config;
pub mod schedule;
pub mod stats;

use meetroom_core::{Config, Database};

/// Open the ledger at the configured location.
pub fn open_database() -> Result<Database, Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let path = config.database_path()?;
    Ok(Database::open(&path)?)
}

use chrono::Local;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let db = super::open_database()?;
    let upcoming = db.list_upcoming(Local::now().naive_local())?;
    println!("{}", serde_json::to_string_pretty(&upcoming)?);
    Ok(())
}

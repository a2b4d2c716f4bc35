use quarterly_etl::config::Config;
use quarterly_etl::storage::{SqliteStore, Store};

fn main() -> anyhow::Result<()> {
    let config = Config::load(None)?;
    let table = &config.database.table_name;

    println!(
        "⚠️  WARNING: This will drop table '{}' from {}!",
        table,
        config.database.path.display()
    );
    println!("Press Enter to continue or Ctrl+C to cancel...");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    println!("🗑️  Dropping table...");
    let mut store = SqliteStore::open(&config.database.path)?;
    store.drop_table(table)?;

    println!("✅ Table cleared successfully!");
    Ok(())
}

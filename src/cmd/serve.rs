//! Server commands: `deckforge serve` and `deckforge init-db`.

use anyhow::Result;

use deckforge::config::DeckforgeConfig;
use deckforge::server::{ServerConfig, start_server};
use deckforge::store::DeckDb;

pub async fn cmd_serve(config: &DeckforgeConfig, dev: bool) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    let mut server_config = ServerConfig::from(config);
    server_config.dev_cors |= dev;
    start_server(server_config).await
}

pub fn cmd_init_db(config: &DeckforgeConfig) -> Result<()> {
    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    DeckDb::new(&db_path)?;
    println!("Database initialized at {}", db_path.display());
    Ok(())
}

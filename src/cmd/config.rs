//! Configuration view and validation commands: `deckforge config`.

use anyhow::Result;

use deckforge::config::{DeckforgeConfig, DeckforgeToml};

use super::super::ConfigCommands;

pub fn cmd_config(config: &DeckforgeConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Deckforge Configuration");
            println!("=======================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No deckforge.toml found at {}; using defaults.", config_path.display());
            }
            println!();

            let toml = &config.toml;
            println!("[server]");
            println!("  host = \"{}\"", toml.server.host);
            println!("  port = {}", toml.server.port);
            println!("  database = \"{}\"", config.database_path().display());
            println!("  media_dir = \"{}\"", config.media_dir().display());
            println!("  dev_cors = {}", toml.server.dev_cors);
            println!();
            println!("[generation]");
            println!(
                "  api_key = {}",
                if config.api_key().is_some() { "(set)" } else { "(not set)" }
            );
            println!("  cost_tokens = {}", toml.generation.cost_tokens);
            println!();
            println!("[sync]");
            println!(
                "  base_url = {}",
                toml.sync.base_url.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  user_id = {}",
                toml.sync.user_id.as_deref().unwrap_or("(not set)")
            );
            println!();
            println!("[logging]");
            println!("  level = \"{}\"", toml.logging.level);
            println!("  json = {}", toml.logging.json);
            if let Some(dir) = config.log_dir() {
                println!("  dir = \"{}\"", dir.display());
            }
            println!();
            println!("Values include environment overrides.");
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("deckforge.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            std::fs::create_dir_all(&config.config_dir)?;
            DeckforgeToml::default().save(&config_path)?;

            println!("Created deckforge.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, database, media_dir");
            println!("  - [generation] cost_tokens, models (API key via GEMINI_API_KEY)");
            println!("  - [sync] base_url, user_id");
            println!();
        }
    }

    Ok(())
}

//! Token ledger commands: `deckforge tokens`.

use anyhow::Result;

use deckforge::config::DeckforgeConfig;
use deckforge::store::DeckDb;

use super::super::TokenCommands;

pub fn cmd_tokens(config: &DeckforgeConfig, command: TokenCommands) -> Result<()> {
    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = DeckDb::new(&db_path)?;

    match command {
        TokenCommands::Grant {
            user,
            amount,
            reason,
        } => {
            let balance = db.credit(&user, amount, &reason, None)?;
            println!("Granted {} tokens to {} (balance {})", amount, user, balance);
        }
        TokenCommands::Balance { user, limit } => {
            println!("{}: {} tokens", user, db.balance(&user)?);
            let transactions = db.list_transactions(&user, limit)?;
            if !transactions.is_empty() {
                println!();
                for tx in transactions {
                    println!(
                        "  {}  {:>+6}  {}{}",
                        tx.created_at,
                        tx.delta,
                        tx.reason,
                        tx.reference.map(|r| format!(" ({})", r)).unwrap_or_default()
                    );
                }
            }
        }
    }
    Ok(())
}

//! Deck commands: `deckforge merge`, `deckforge share`, `deckforge decks`.

use std::path::Path;

use anyhow::{Context, Result};

use deckforge::config::DeckforgeConfig;
use deckforge::deck::Deck;
use deckforge::local::LocalStore;
use deckforge::merge::merge_layers;
use deckforge::share::{decode_share_hash, encode_share_hash};
use deckforge::sync::SyncClient;

use super::super::{DeckCommands, ShareCommands};

fn read_deck(path: &Path) -> Result<Deck> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read deck file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a valid deck", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn cmd_merge(
    curated: Option<&Path>,
    hash: Option<&str>,
    local: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let curated = curated.map(read_deck).transpose()?;
    let hash = hash
        .map(decode_share_hash)
        .transpose()
        .context("Failed to decode share hash")?;
    let local = local.map(read_deck).transpose()?;

    let outcome = merge_layers(curated, hash, local)?;
    for conflict in &outcome.conflicts {
        tracing::warn!(conflict = ?conflict, "Merge conflict");
    }

    match output {
        Some(path) => {
            let json = serde_json::to_string_pretty(&outcome.deck)?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Merged {} cards from {} layers into {} ({} conflicts)",
                outcome.deck.cards.len(),
                outcome.layers.len(),
                path.display(),
                outcome.conflicts.len()
            );
        }
        None => print_json(&outcome)?,
    }
    Ok(())
}

pub fn cmd_share(command: ShareCommands) -> Result<()> {
    match command {
        ShareCommands::Encode { file } => {
            let deck = read_deck(&file)?;
            println!("{}", encode_share_hash(&deck)?);
        }
        ShareCommands::Decode { hash } => {
            let deck = decode_share_hash(&hash)?;
            print_json(&deck)?;
        }
    }
    Ok(())
}

fn sync_client(config: &DeckforgeConfig) -> Result<SyncClient> {
    let base_url = config
        .toml
        .sync
        .base_url
        .as_deref()
        .context("No sync server configured (set [sync] base_url or DECKFORGE_SYNC_URL)")?;
    let user = config
        .toml
        .sync
        .user_id
        .as_deref()
        .context("No sync user configured (set [sync] user_id or DECKFORGE_USER)")?;
    SyncClient::new(base_url, user)
}

pub async fn cmd_decks(config: &DeckforgeConfig, command: DeckCommands) -> Result<()> {
    let store = LocalStore::open(config.local_dir().unwrap_or_else(LocalStore::default_dir))?;

    match command {
        DeckCommands::List => {
            let decks = store.list()?;
            if decks.is_empty() {
                println!("No local decks in {}", store.dir().display());
            }
            for deck in decks {
                let edited = deck
                    .last_edited
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}  {:<32}  {:>3} cards  {}", deck.id, deck.title, deck.card_count, edited);
            }
        }
        DeckCommands::Show { id } => {
            let deck = store
                .load(&id)?
                .with_context(|| format!("No local deck {}", id))?;
            print_json(&deck)?;
        }
        DeckCommands::Import { file } => {
            let deck = read_deck(&file)?;
            deck.validate()?;
            store.save(&deck)?;
            println!("Imported {} ({})", deck.meta.title, deck.id);
        }
        DeckCommands::Rename { id, title } => {
            let deck = store.update(&id, |deck| {
                deck.meta.title = title.trim().to_string();
                Ok(())
            })?;
            println!("Renamed {} to {}", deck.id, deck.meta.title);
            if let Ok(client) = sync_client(config) {
                // Best effort; the local copy is already saved.
                if let Err(e) = client.spawn_push(deck).await {
                    tracing::warn!(error = %e, "Background sync task failed");
                }
            }
        }
        DeckCommands::Delete { id } => {
            if store.delete(&id)? {
                println!("Deleted {}", id);
            } else {
                println!("No local deck {}", id);
            }
        }
        DeckCommands::Push { id } => {
            let deck = store
                .load(&id)?
                .with_context(|| format!("No local deck {}", id))?;
            let synced = sync_client(config)?.push(&deck).await?;
            println!("Pushed {} (hash {})", synced.deck.id, synced.content_hash);
        }
        DeckCommands::Pull { slug } => {
            let deck = sync_client(config)?
                .pull_published(&slug)
                .await?
                .with_context(|| format!("No published deck {}", slug))?;
            store.save(&deck)?;
            println!("Pulled {} ({}) into {}", deck.meta.title, deck.id, store.dir().display());
        }
    }
    Ok(())
}

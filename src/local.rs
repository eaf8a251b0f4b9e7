//! Offline deck store: one JSON file per deck.
//!
//! Every mutation follows the Canon Update pattern: write to disk first, then
//! re-read the file and hand back what was actually persisted, so callers
//! never render state that did not make it to storage.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::deck::Deck;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeckSummary {
    pub id: String,
    pub title: String,
    pub card_count: usize,
    pub last_edited: Option<DateTime<Utc>>,
}

pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Open (or create) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create local deck directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Platform data directory, falling back to `.deckforge/decks`.
    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("deckforge").join("decks"))
            .unwrap_or_else(|| PathBuf::from(".deckforge/decks"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, deck_id: &str) -> Result<PathBuf> {
        let valid = !deck_id.is_empty()
            && deck_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            anyhow::bail!("Invalid deck id for local storage: {:?}", deck_id);
        }
        Ok(self.dir.join(format!("{}.json", deck_id)))
    }

    pub fn save(&self, deck: &Deck) -> Result<()> {
        let path = self.path_for(&deck.id)?;
        let tmp = self.dir.join(format!(".{}.json.tmp", deck.id));
        let content = serde_json::to_string_pretty(deck).context("Failed to serialize deck")?;
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move deck into place at {}", path.display()))?;
        Ok(())
    }

    pub fn load(&self, deck_id: &str) -> Result<Option<Deck>> {
        let path = self.path_for(deck_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let deck = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deck file {}", path.display()))?;
        Ok(Some(deck))
    }

    /// Summaries of every stored deck, most recently edited first.
    pub fn list(&self) -> Result<Vec<DeckSummary>> {
        let mut summaries = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;
        for entry in entries {
            let path = entry.context("Failed to read directory entry")?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable deck file");
                    continue;
                }
            };
            match serde_json::from_str::<Deck>(&content) {
                Ok(deck) => summaries.push(DeckSummary {
                    id: deck.id,
                    title: deck.meta.title,
                    card_count: deck.cards.len(),
                    last_edited: deck.meta.last_edited,
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping malformed deck file");
                }
            }
        }
        summaries.sort_by(|a, b| b.last_edited.cmp(&a.last_edited));
        Ok(summaries)
    }

    pub fn delete(&self, deck_id: &str) -> Result<bool> {
        let path = self.path_for(deck_id)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to delete {}", path.display()))?;
        Ok(true)
    }

    /// Canon Update: apply `f`, bump `lastEdited`, validate, write, and
    /// return the deck as re-read from disk.
    pub fn update<F>(&self, deck_id: &str, f: F) -> Result<Deck>
    where
        F: FnOnce(&mut Deck) -> Result<()>,
    {
        let mut deck = self
            .load(deck_id)?
            .with_context(|| format!("Deck {} not found in local store", deck_id))?;
        f(&mut deck)?;
        deck.touch();
        deck.validate()?;
        self.save(&deck)?;
        self.load(deck_id)?
            .with_context(|| format!("Deck {} vanished after write", deck_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::Card;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path().join("decks")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_save_and_load() {
        let (_dir, store) = store();
        let deck = Deck::new("Local");
        store.save(&deck).unwrap();
        assert_eq!(store.load(&deck.id).unwrap(), Some(deck));
    }

    #[test]
    fn test_load_missing_returns_none() {
        let (_dir, store) = store();
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let (_dir, store) = store();
        assert!(store.load("../etc/passwd").is_err());
        let mut deck = Deck::new("Bad");
        deck.id = "a/b".into();
        assert!(store.save(&deck).is_err());
    }

    #[test]
    fn test_update_rereads_and_bumps_last_edited() {
        let (_dir, store) = store();
        let deck = Deck::new("Canon");
        let before = deck.meta.last_edited;
        store.save(&deck).unwrap();

        let updated = store
            .update(&deck.id, |d| {
                d.cards.push(Card::new("Added"));
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.cards.len(), 1);
        assert!(updated.meta.last_edited >= before);
        assert_eq!(store.load(&deck.id).unwrap().unwrap(), updated);
    }

    #[test]
    fn test_update_rejects_invalid_result_without_writing() {
        let (_dir, store) = store();
        let deck = Deck::new("Valid");
        store.save(&deck).unwrap();

        let result = store.update(&deck.id, |d| {
            d.meta.title.clear();
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(store.load(&deck.id).unwrap().unwrap().meta.title, "Valid");
    }

    #[test]
    fn test_list_and_delete() {
        let (_dir, store) = store();
        let a = Deck::new("A");
        let b = Deck::new("B");
        store.save(&a).unwrap();
        store.save(&b).unwrap();
        std::fs::write(store.dir().join("junk.json"), "not json").unwrap();

        let list = store.list().unwrap();
        assert_eq!(list.len(), 2);

        assert!(store.delete(&a.id).unwrap());
        assert!(!store.delete(&a.id).unwrap());
        assert_eq!(store.list().unwrap().len(), 1);
    }
}

//! SQLite persistence for synced decks, published snapshots, the community
//! gallery, and the token ledger.
//!
//! `DeckDb` owns the connection and the migrations; its methods are split by
//! table family across `decks`, `images`, and `ledger`. Async code goes
//! through `DbHandle`, which runs every closure on the blocking pool.

pub mod decks;
pub mod images;
pub mod ledger;
pub mod models;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub use ledger::LIKE_COST;
pub use models::*;

/// Async-safe handle to the deck database.
///
/// Wraps `DeckDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<DeckDb>>,
}

impl DbHandle {
    pub fn new(db: DeckDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&DeckDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct DeckDb {
    conn: Connection,
}

impl DeckDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS decks (
                    owner_id TEXT NOT NULL,
                    deck_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    data TEXT NOT NULL,
                    content_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (owner_id, deck_id)
                );

                CREATE TABLE IF NOT EXISTS published_decks (
                    id TEXT PRIMARY KEY,
                    deck_id TEXT NOT NULL,
                    owner_id TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    title TEXT NOT NULL,
                    data TEXT NOT NULL,
                    like_count INTEGER NOT NULL DEFAULT 0,
                    published_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE (owner_id, deck_id)
                );

                CREATE TABLE IF NOT EXISTS community_images (
                    id TEXT PRIMARY KEY,
                    url TEXT NOT NULL UNIQUE,
                    style TEXT,
                    source_image_id TEXT,
                    embedding TEXT,
                    card_title TEXT NOT NULL DEFAULT '',
                    prompt TEXT NOT NULL DEFAULT '',
                    cost_tokens INTEGER NOT NULL DEFAULT 0,
                    owner_id TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS token_balances (
                    user_id TEXT PRIMARY KEY,
                    balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS token_transactions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    delta INTEGER NOT NULL,
                    reason TEXT NOT NULL,
                    reference TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS deck_likes (
                    user_id TEXT NOT NULL,
                    published_id TEXT NOT NULL REFERENCES published_decks(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (user_id, published_id)
                );

                CREATE INDEX IF NOT EXISTS idx_decks_owner ON decks(owner_id);
                CREATE INDEX IF NOT EXISTS idx_images_source ON community_images(source_image_id);
                CREATE INDEX IF NOT EXISTS idx_transactions_user ON token_transactions(user_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let db = DeckDb::new_in_memory().unwrap();
        db.run_migrations().unwrap();
        db.run_migrations().unwrap();
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("deckforge.db");
        DeckDb::new(&path).unwrap();
        assert!(path.exists());
        // Re-opening runs migrations against the existing schema.
        DeckDb::new(&path).unwrap();
    }

    #[tokio::test]
    async fn test_db_handle_call_runs_closure() {
        let handle = DbHandle::new(DeckDb::new_in_memory().unwrap());
        let balance = handle.call(|db| db.balance("nobody")).await.unwrap();
        assert_eq!(balance, 0);
    }
}

//! Token balances, the transaction log, and deck likes.
//!
//! Balance changes run inside a SQLite transaction. The log row for a change
//! is appended after commit; the balance table is authoritative, so a failed
//! log write is reported and otherwise ignored.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use super::DeckDb;
use super::models::{LikeReceipt, NewImage, TokenTransaction};
use crate::errors::LedgerError;
use crate::gallery::CommunityImage;

/// Tokens moved from the liker to the deck owner per like.
pub const LIKE_COST: i64 = 1;

fn db_err(e: impl Into<anyhow::Error>) -> LedgerError {
    LedgerError::Database(e.into())
}

fn read_balance(conn: &Connection, user_id: &str) -> rusqlite::Result<i64> {
    Ok(conn
        .query_row(
            "SELECT balance FROM token_balances WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0))
}

fn add_to_balance(conn: &Connection, user_id: &str, delta: i64) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO token_balances (user_id, balance) VALUES (?1, ?2)
         ON CONFLICT(user_id) DO UPDATE SET
            balance = balance + excluded.balance,
            updated_at = datetime('now')",
        params![user_id, delta],
    )?;
    read_balance(conn, user_id)
}

fn take_from_balance(conn: &Connection, user_id: &str, amount: i64) -> Result<i64, LedgerError> {
    let available = read_balance(conn, user_id).map_err(db_err)?;
    if available < amount {
        return Err(LedgerError::InsufficientTokens {
            user_id: user_id.to_string(),
            required: amount,
            available,
        });
    }
    conn.execute(
        "UPDATE token_balances SET balance = balance - ?1, updated_at = datetime('now')
         WHERE user_id = ?2",
        params![amount, user_id],
    )
    .map_err(db_err)?;
    Ok(available - amount)
}

fn check_amount(amount: i64) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount { amount });
    }
    Ok(())
}

struct LogEntry<'a> {
    user_id: &'a str,
    delta: i64,
    reason: &'a str,
    reference: Option<&'a str>,
}

impl DeckDb {
    pub fn balance(&self, user_id: &str) -> Result<i64> {
        read_balance(&self.conn, user_id).context("Failed to read token balance")
    }

    /// Add `amount` tokens to `user_id`. Returns the new balance.
    pub fn credit(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        reference: Option<&str>,
    ) -> Result<i64, LedgerError> {
        check_amount(amount)?;
        let balance = add_to_balance(&self.conn, user_id, amount).map_err(db_err)?;
        self.log_transactions(&[LogEntry {
            user_id,
            delta: amount,
            reason,
            reference,
        }]);
        Ok(balance)
    }

    /// Remove `amount` tokens from `user_id`. Never leaves a negative balance.
    pub fn debit(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        reference: Option<&str>,
    ) -> Result<i64, LedgerError> {
        check_amount(amount)?;
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        let balance = take_from_balance(&tx, user_id, amount)?;
        tx.commit().map_err(db_err)?;

        self.log_transactions(&[LogEntry {
            user_id,
            delta: -amount,
            reason,
            reference,
        }]);
        Ok(balance)
    }

    /// Take the cost of a generation up front, before any paid work runs.
    /// The check and the deduction share one transaction, so concurrent
    /// requests cannot both spend the same tokens. A free generation
    /// (`cost == 0`) only reads the balance.
    pub fn reserve_generation(
        &self,
        owner: &str,
        cost: i64,
        image_id: &str,
    ) -> Result<i64, LedgerError> {
        if cost < 0 {
            return Err(LedgerError::InvalidAmount { amount: cost });
        }
        if cost == 0 {
            return read_balance(&self.conn, owner).map_err(db_err);
        }
        self.debit(owner, cost, "image_generation", Some(image_id))
    }

    /// Give back a reservation whose generation did not make it into the
    /// gallery.
    pub fn refund_generation(
        &self,
        owner: &str,
        cost: i64,
        image_id: &str,
    ) -> Result<i64, LedgerError> {
        if cost <= 0 {
            return read_balance(&self.conn, owner).map_err(db_err);
        }
        self.credit(owner, cost, "image_generation_refund", Some(image_id))
    }

    /// Add a reserved, generated image to the gallery under `image_id`.
    /// Returns the stored row and the owner's balance.
    pub fn record_generation(
        &self,
        owner: &str,
        image_id: &str,
        image: &NewImage,
    ) -> Result<(CommunityImage, i64), LedgerError> {
        let stored = self
            .insert_image_with_id(image_id, image)
            .map_err(LedgerError::Database)?;
        let balance = read_balance(&self.conn, owner).map_err(db_err)?;
        Ok((stored, balance))
    }

    /// Like a published deck: move `LIKE_COST` tokens from the liker to the
    /// owner and bump the like counter.
    pub fn like_deck(&self, user_id: &str, published_id: &str) -> Result<LikeReceipt, LedgerError> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;

        let owner_id: String = tx
            .query_row(
                "SELECT owner_id FROM published_decks WHERE id = ?1",
                params![published_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| LedgerError::PublishedDeckNotFound {
                id: published_id.to_string(),
            })?;
        if owner_id == user_id {
            return Err(LedgerError::SelfLike);
        }

        let already: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM deck_likes WHERE user_id = ?1 AND published_id = ?2)",
                params![user_id, published_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if already {
            return Err(LedgerError::AlreadyLiked {
                user_id: user_id.to_string(),
                published_id: published_id.to_string(),
            });
        }

        let balance = take_from_balance(&tx, user_id, LIKE_COST)?;
        add_to_balance(&tx, &owner_id, LIKE_COST).map_err(db_err)?;
        tx.execute(
            "INSERT INTO deck_likes (user_id, published_id) VALUES (?1, ?2)",
            params![user_id, published_id],
        )
        .map_err(db_err)?;
        tx.execute(
            "UPDATE published_decks SET like_count = like_count + 1 WHERE id = ?1",
            params![published_id],
        )
        .map_err(db_err)?;
        let like_count: i64 = tx
            .query_row(
                "SELECT like_count FROM published_decks WHERE id = ?1",
                params![published_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        self.log_transactions(&[
            LogEntry {
                user_id,
                delta: -LIKE_COST,
                reason: "like_sent",
                reference: Some(published_id),
            },
            LogEntry {
                user_id: &owner_id,
                delta: LIKE_COST,
                reason: "like_received",
                reference: Some(published_id),
            },
        ]);
        tracing::info!(user_id, published_id, like_count, "Deck liked");

        Ok(LikeReceipt {
            published_id: published_id.to_string(),
            like_count,
            balance,
        })
    }

    /// Newest first.
    pub fn list_transactions(&self, user_id: &str, limit: usize) -> Result<Vec<TokenTransaction>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, delta, reason, reference, created_at
                 FROM token_transactions WHERE user_id = ?1
                 ORDER BY id DESC LIMIT ?2",
            )
            .context("Failed to prepare list_transactions")?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok(TokenTransaction {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    delta: row.get(2)?,
                    reason: row.get(3)?,
                    reference: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .context("Failed to query transactions")?;
        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row.context("Failed to read transaction row")?);
        }
        Ok(transactions)
    }

    fn log_transactions(&self, entries: &[LogEntry<'_>]) {
        for entry in entries {
            if let Err(e) = self.conn.execute(
                "INSERT INTO token_transactions (user_id, delta, reason, reference)
                 VALUES (?1, ?2, ?3, ?4)",
                params![entry.user_id, entry.delta, entry.reason, entry.reference],
            ) {
                tracing::warn!(
                    user_id = entry.user_id,
                    delta = entry.delta,
                    reason = entry.reason,
                    error = %e,
                    "Failed to record token transaction"
                );
            }
        }
    }
}

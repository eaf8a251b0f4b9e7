use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};

use super::DeckDb;
use super::models::*;
use crate::deck::{Deck, unique_slug};
use crate::gallery::Page;

fn parse_deck(data: &str) -> Result<Deck> {
    serde_json::from_str(data).context("Stored deck data is not valid JSON")
}

struct PublishedRow {
    id: String,
    deck_id: String,
    owner_id: String,
    slug: String,
    title: String,
    data: String,
    like_count: i64,
    published_at: String,
    updated_at: String,
}

impl PublishedRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            deck_id: row.get(1)?,
            owner_id: row.get(2)?,
            slug: row.get(3)?,
            title: row.get(4)?,
            data: row.get(5)?,
            like_count: row.get(6)?,
            published_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_published(self) -> Result<PublishedDeck> {
        Ok(PublishedDeck {
            deck: parse_deck(&self.data)?,
            id: self.id,
            deck_id: self.deck_id,
            owner_id: self.owner_id,
            slug: self.slug,
            title: self.title,
            like_count: self.like_count,
            published_at: self.published_at,
            updated_at: self.updated_at,
        })
    }
}

const PUBLISHED_COLUMNS: &str =
    "id, deck_id, owner_id, slug, title, data, like_count, published_at, updated_at";

impl DeckDb {
    // ── Synced decks ──────────────────────────────────────────────────

    /// Insert or replace the owner's copy of `deck`. Inline blobs are dropped.
    pub fn upsert_deck(&self, owner_id: &str, deck: &Deck) -> Result<SyncedDeck> {
        let mut stored = deck.clone();
        stored.strip_blobs();
        let data = serde_json::to_string(&stored).context("Failed to serialize deck")?;
        let hash = stored.content_hash();

        self.conn
            .execute(
                "INSERT INTO decks (owner_id, deck_id, title, data, content_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(owner_id, deck_id) DO UPDATE SET
                    title = excluded.title,
                    data = excluded.data,
                    content_hash = excluded.content_hash,
                    updated_at = datetime('now')",
                params![owner_id, stored.id, stored.meta.title, data, hash],
            )
            .context("Failed to upsert deck")?;
        self.get_deck(owner_id, &stored.id)?
            .context("Deck not found after upsert")
    }

    pub fn get_deck(&self, owner_id: &str, deck_id: &str) -> Result<Option<SyncedDeck>> {
        let row = self
            .conn
            .query_row(
                "SELECT owner_id, data, content_hash, created_at, updated_at
                 FROM decks WHERE owner_id = ?1 AND deck_id = ?2",
                params![owner_id, deck_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query deck")?;

        match row {
            Some((owner_id, data, content_hash, created_at, updated_at)) => Ok(Some(SyncedDeck {
                owner_id,
                deck: parse_deck(&data)?,
                content_hash,
                created_at,
                updated_at,
            })),
            None => Ok(None),
        }
    }

    pub fn list_decks(&self, owner_id: &str) -> Result<Vec<DeckListing>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT deck_id, title, COALESCE(json_array_length(data, '$.cards'), 0), content_hash, updated_at
                 FROM decks WHERE owner_id = ?1 ORDER BY updated_at DESC, rowid DESC",
            )
            .context("Failed to prepare list_decks")?;
        let rows = stmt
            .query_map(params![owner_id], |row| {
                Ok(DeckListing {
                    deck_id: row.get(0)?,
                    title: row.get(1)?,
                    card_count: row.get(2)?,
                    content_hash: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })
            .context("Failed to query decks")?;
        let mut decks = Vec::new();
        for row in rows {
            decks.push(row.context("Failed to read deck row")?);
        }
        Ok(decks)
    }

    pub fn delete_deck(&self, owner_id: &str, deck_id: &str) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM decks WHERE owner_id = ?1 AND deck_id = ?2",
                params![owner_id, deck_id],
            )
            .context("Failed to delete deck")?;
        Ok(count > 0)
    }

    // ── Published snapshots ───────────────────────────────────────────

    /// Copy the owner's current synced deck into the public table.
    ///
    /// Re-publishing replaces the snapshot but keeps its id and slug, so
    /// shared links stay valid. Returns `None` when the deck was never synced.
    pub fn publish_deck(&self, owner_id: &str, deck_id: &str) -> Result<Option<PublishedDeck>> {
        let Some(synced) = self.get_deck(owner_id, deck_id)? else {
            return Ok(None);
        };
        let data = serde_json::to_string(&synced.deck).context("Failed to serialize deck")?;
        let title = synced.deck.meta.title.clone();

        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM published_decks WHERE owner_id = ?1 AND deck_id = ?2",
                params![owner_id, deck_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up existing publication")?;

        let id = match existing {
            Some(id) => {
                self.conn
                    .execute(
                        "UPDATE published_decks
                         SET title = ?1, data = ?2, updated_at = datetime('now')
                         WHERE id = ?3",
                        params![title, data, id],
                    )
                    .context("Failed to update published deck")?;
                id
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                let slug = unique_slug(&title, &id);
                self.conn
                    .execute(
                        "INSERT INTO published_decks (id, deck_id, owner_id, slug, title, data)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![id, deck_id, owner_id, slug, title, data],
                    )
                    .context("Failed to insert published deck")?;
                id
            }
        };

        tracing::info!(owner_id, deck_id, published_id = %id, "Published deck snapshot");
        self.get_published(&id)
    }

    pub fn get_published(&self, id: &str) -> Result<Option<PublishedDeck>> {
        self.query_published("id = ?1", id)
    }

    pub fn get_published_by_slug(&self, slug: &str) -> Result<Option<PublishedDeck>> {
        self.query_published("slug = ?1", slug)
    }

    fn query_published(&self, predicate: &str, value: &str) -> Result<Option<PublishedDeck>> {
        let sql = format!(
            "SELECT {} FROM published_decks WHERE {}",
            PUBLISHED_COLUMNS, predicate
        );
        let row = self
            .conn
            .query_row(&sql, params![value], PublishedRow::from_row)
            .optional()
            .context("Failed to query published deck")?;
        row.map(PublishedRow::into_published).transpose()
    }

    /// One page of published decks, most liked first, plus the total count.
    pub fn list_published(&self, page: Page) -> Result<(Vec<PublishedSummary>, usize)> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM published_decks", [], |row| row.get(0))
            .context("Failed to count published decks")?;

        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, slug, title, owner_id, COALESCE(json_array_length(data, '$.cards'), 0), like_count, published_at
                 FROM published_decks
                 ORDER BY like_count DESC, published_at DESC, rowid DESC
                 LIMIT ?1 OFFSET ?2",
            )
            .context("Failed to prepare list_published")?;
        let rows = stmt
            .query_map(params![page.size as i64, page.offset() as i64], |row| {
                Ok(PublishedSummary {
                    id: row.get(0)?,
                    slug: row.get(1)?,
                    title: row.get(2)?,
                    owner_id: row.get(3)?,
                    card_count: row.get(4)?,
                    like_count: row.get(5)?,
                    published_at: row.get(6)?,
                })
            })
            .context("Failed to query published decks")?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row.context("Failed to read published deck row")?);
        }
        Ok((items, total as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::Card;

    fn deck_with_cards(title: &str, n: usize) -> Deck {
        let mut deck = Deck::new(title);
        for i in 0..n {
            let mut card = Card::new(&format!("Card {}", i));
            card.image_blob = Some("blob".into());
            deck.cards.push(card);
        }
        deck
    }

    #[test]
    fn test_upsert_and_get_deck_strips_blobs() {
        let db = DeckDb::new_in_memory().unwrap();
        let deck = deck_with_cards("Sync Me", 2);
        let synced = db.upsert_deck("u1", &deck).unwrap();
        assert_eq!(synced.deck.id, deck.id);
        assert!(synced.deck.cards.iter().all(|c| c.image_blob.is_none()));
        assert_eq!(synced.content_hash, deck.content_hash());

        assert!(db.get_deck("u2", &deck.id).unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let db = DeckDb::new_in_memory().unwrap();
        let mut deck = deck_with_cards("V1", 1);
        db.upsert_deck("u1", &deck).unwrap();
        deck.meta.title = "V2".into();
        db.upsert_deck("u1", &deck).unwrap();

        let list = db.list_decks("u1").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "V2");
        assert_eq!(list[0].card_count, 1);
    }

    #[test]
    fn test_delete_deck() {
        let db = DeckDb::new_in_memory().unwrap();
        let deck = deck_with_cards("Gone", 0);
        db.upsert_deck("u1", &deck).unwrap();
        assert!(db.delete_deck("u1", &deck.id).unwrap());
        assert!(!db.delete_deck("u1", &deck.id).unwrap());
    }

    #[test]
    fn test_publish_is_a_snapshot() {
        let db = DeckDb::new_in_memory().unwrap();
        let mut deck = deck_with_cards("Snapshot", 1);
        db.upsert_deck("u1", &deck).unwrap();
        let published = db.publish_deck("u1", &deck.id).unwrap().unwrap();
        assert!(published.slug.starts_with("snapshot-"));

        // Later edits do not leak into the snapshot.
        deck.cards.push(Card::new("Unpublished"));
        db.upsert_deck("u1", &deck).unwrap();
        let snapshot = db.get_published_by_slug(&published.slug).unwrap().unwrap();
        assert_eq!(snapshot.deck.cards.len(), 1);

        // Re-publishing updates in place and keeps the slug.
        let republished = db.publish_deck("u1", &deck.id).unwrap().unwrap();
        assert_eq!(republished.id, published.id);
        assert_eq!(republished.slug, published.slug);
        assert_eq!(republished.deck.cards.len(), 2);
    }

    #[test]
    fn test_publish_unsynced_deck_returns_none() {
        let db = DeckDb::new_in_memory().unwrap();
        assert!(db.publish_deck("u1", "missing").unwrap().is_none());
    }

    #[test]
    fn test_list_published_pages() {
        let db = DeckDb::new_in_memory().unwrap();
        for i in 0..3 {
            let deck = deck_with_cards(&format!("Deck {}", i), i);
            db.upsert_deck("u1", &deck).unwrap();
            db.publish_deck("u1", &deck.id).unwrap();
        }
        let (items, total) = db.list_published(Page { number: 1, size: 2 }).unwrap();
        assert_eq!(total, 3);
        assert_eq!(items.len(), 2);
        let (items, _) = db.list_published(Page { number: 2, size: 2 }).unwrap();
        assert_eq!(items.len(), 1);
    }
}

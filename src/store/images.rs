use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};

use super::DeckDb;
use super::models::NewImage;
use crate::gallery::{CommunityImage, ImageCatalog};

const IMAGE_COLUMNS: &str =
    "id, url, style, source_image_id, embedding, card_title, prompt, cost_tokens, created_at";

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<CommunityImage> {
    let embedding: Option<String> = row.get(4)?;
    Ok(CommunityImage {
        id: row.get(0)?,
        url: row.get(1)?,
        style: row.get(2)?,
        source_image_id: row.get(3)?,
        // A malformed embedding only removes the image from similarity search.
        embedding: embedding.and_then(|json| serde_json::from_str(&json).ok()),
        card_title: row.get(5)?,
        prompt: row.get(6)?,
        cost_tokens: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl DeckDb {
    pub fn insert_image(&self, image: &NewImage) -> Result<CommunityImage> {
        let id = uuid::Uuid::new_v4().to_string();
        self.insert_image_with_id(&id, image)
    }

    pub fn insert_image_with_id(&self, id: &str, image: &NewImage) -> Result<CommunityImage> {
        self.conn
            .execute(
                "INSERT INTO community_images
                    (id, url, style, source_image_id, card_title, prompt, cost_tokens, owner_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    image.url,
                    image.style,
                    image.source_image_id,
                    image.card_title,
                    image.prompt,
                    image.cost_tokens,
                    image.owner_id,
                ],
            )
            .context("Failed to insert community image")?;
        self.get_image(id)?
            .context("Image not found after insert")
    }

    pub fn set_image_embedding(&self, id: &str, embedding: &[f32]) -> Result<()> {
        let json = serde_json::to_string(embedding).context("Failed to serialize embedding")?;
        let updated = self
            .conn
            .execute(
                "UPDATE community_images SET embedding = ?1 WHERE id = ?2",
                params![json, id],
            )
            .context("Failed to store embedding")?;
        if updated == 0 {
            anyhow::bail!("Image {} not found", id);
        }
        Ok(())
    }

    pub fn get_image(&self, id: &str) -> Result<Option<CommunityImage>> {
        let sql = format!("SELECT {} FROM community_images WHERE id = ?1", IMAGE_COLUMNS);
        self.conn
            .query_row(&sql, params![id], image_from_row)
            .optional()
            .context("Failed to query image")
    }

    pub fn get_image_by_url(&self, url: &str) -> Result<Option<CommunityImage>> {
        let sql = format!("SELECT {} FROM community_images WHERE url = ?1", IMAGE_COLUMNS);
        self.conn
            .query_row(&sql, params![url], image_from_row)
            .optional()
            .context("Failed to query image by url")
    }

    /// Direct children of `id`, newest first.
    pub fn list_variants(&self, id: &str) -> Result<Vec<CommunityImage>> {
        let sql = format!(
            "SELECT {} FROM community_images WHERE source_image_id = ?1 ORDER BY rowid DESC",
            IMAGE_COLUMNS
        );
        self.collect_images(&sql, params![id])
    }

    /// Every gallery image, newest first. Search ranks these in memory.
    pub fn list_images(&self) -> Result<Vec<CommunityImage>> {
        let sql = format!(
            "SELECT {} FROM community_images ORDER BY rowid DESC",
            IMAGE_COLUMNS
        );
        self.collect_images(&sql, [])
    }

    fn collect_images<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<CommunityImage>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare image query")?;
        let rows = stmt
            .query_map(params, image_from_row)
            .context("Failed to query images")?;
        let mut images = Vec::new();
        for row in rows {
            images.push(row.context("Failed to read image row")?);
        }
        Ok(images)
    }
}

impl ImageCatalog for DeckDb {
    fn image_by_id(&self, id: &str) -> Result<Option<CommunityImage>> {
        self.get_image(id)
    }

    fn image_by_url(&self, url: &str) -> Result<Option<CommunityImage>> {
        self.get_image_by_url(url)
    }

    fn variants_of(&self, id: &str) -> Result<Vec<CommunityImage>> {
        self.list_variants(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::{ImageRef, VariantLookup, resolve_variant};

    fn new_image(url: &str, style: &str, source: Option<&str>) -> NewImage {
        NewImage {
            url: url.to_string(),
            style: Some(style.to_string()),
            source_image_id: source.map(String::from),
            card_title: "Goblin".into(),
            prompt: "a goblin".into(),
            cost_tokens: 5,
            owner_id: Some("u1".into()),
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let db = DeckDb::new_in_memory().unwrap();
        let image = db.insert_image(&new_image("/media/a.png", "ink", None)).unwrap();
        assert_eq!(db.get_image(&image.id).unwrap().unwrap(), image);
        assert_eq!(db.get_image_by_url("/media/a.png").unwrap().unwrap().id, image.id);
        assert!(db.get_image("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_url_is_rejected() {
        let db = DeckDb::new_in_memory().unwrap();
        db.insert_image(&new_image("/media/a.png", "ink", None)).unwrap();
        assert!(db.insert_image(&new_image("/media/a.png", "oil", None)).is_err());
    }

    #[test]
    fn test_embedding_round_trip() {
        let db = DeckDb::new_in_memory().unwrap();
        let image = db.insert_image(&new_image("/media/a.png", "ink", None)).unwrap();
        assert!(image.embedding.is_none());
        db.set_image_embedding(&image.id, &[0.5, -1.0]).unwrap();
        let stored = db.get_image(&image.id).unwrap().unwrap();
        assert_eq!(stored.embedding, Some(vec![0.5, -1.0]));
        assert!(db.set_image_embedding("missing", &[1.0]).is_err());
    }

    #[test]
    fn test_variants_newest_first() {
        let db = DeckDb::new_in_memory().unwrap();
        let root = db.insert_image(&new_image("/media/r.png", "ink", None)).unwrap();
        let first = db.insert_image(&new_image("/media/1.png", "oil", Some(&root.id))).unwrap();
        let second = db.insert_image(&new_image("/media/2.png", "oil", Some(&root.id))).unwrap();
        let ids: Vec<String> = db.list_variants(&root.id).unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(db.list_images().unwrap().len(), 3);
    }

    #[test]
    fn test_family_walk_against_sqlite() {
        let db = DeckDb::new_in_memory().unwrap();
        let root = db.insert_image(&new_image("/media/r.png", "Watercolor", None)).unwrap();
        let pixel = db.insert_image(&new_image("/media/p.png", "pixel art", Some(&root.id))).unwrap();

        let lookup = resolve_variant(&db, &ImageRef::Url("/media/r.png".into()), "Pixel-Art").unwrap();
        assert!(matches!(lookup, VariantLookup::Hit { image } if image.id == pixel.id));

        let lookup = resolve_variant(&db, &ImageRef::Id(pixel.id.clone()), "noir").unwrap();
        assert_eq!(lookup, VariantLookup::Miss { root_id: Some(root.id) });
    }
}

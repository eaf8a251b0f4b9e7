//! Generate-or-reuse pipeline for card art.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{EmbeddingProvider, GenerationPrompt, ImageGenerator, ImageStore};
use crate::errors::GenerationError;
use crate::gallery::search::{filter_by_text, rank_by_similarity};
use crate::gallery::{
    CommunityImage, ImageRef, Page, ScoredImage, SearchResults, VariantLookup, resolve_variant,
};
use crate::store::{DbHandle, NewImage};

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub card_title: String,
    pub prompt: String,
    pub style: String,
    /// The art the card shows now, if any.
    #[serde(default)]
    pub current_image: Option<ImageRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutcome {
    pub image: CommunityImage,
    pub cached: bool,
    pub cost_tokens: i64,
    pub balance: i64,
}

pub struct ImageService {
    db: DbHandle,
    generator: Option<Arc<dyn ImageGenerator>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    store: Arc<dyn ImageStore>,
    cost_tokens: i64,
}

impl ImageService {
    pub fn new(db: DbHandle, store: Arc<dyn ImageStore>, cost_tokens: i64) -> Self {
        Self {
            db,
            generator: None,
            embedder: None,
            store,
            cost_tokens,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn ImageGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn cost_tokens(&self) -> i64 {
        self.cost_tokens
    }

    /// Reuse a cached family variant when one exists, otherwise pay for a
    /// new generation parented on the family root.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateOutcome, GenerationError> {
        let mut root_id = None;

        if let Some(current) = request.current_image.clone() {
            let style = request.style.clone();
            let lookup = self
                .db
                .call(move |db| resolve_variant(db, &current, &style))
                .await?;
            match lookup {
                VariantLookup::Hit { image } => {
                    let user = request.user_id.clone();
                    let balance = self.db.call(move |db| db.balance(&user)).await?;
                    tracing::info!(image_id = %image.id, style = %request.style, "Reusing cached family variant");
                    return Ok(GenerateOutcome {
                        image,
                        cached: true,
                        cost_tokens: 0,
                        balance,
                    });
                }
                VariantLookup::Miss { root_id: root } => root_id = root,
            }
        }

        let generator = self.generator.as_ref().ok_or(GenerationError::NotConfigured)?;

        // Tokens are taken before the paid call and handed back if it fails.
        let image_id = uuid::Uuid::new_v4().to_string();
        let cost = self.cost_tokens;
        let (owner, id) = (request.user_id.clone(), image_id.clone());
        self.db
            .call(move |db| Ok(db.reserve_generation(&owner, cost, &id)))
            .await??;

        let (image, balance) = match self
            .create_image(generator.as_ref(), &request, &image_id, root_id)
            .await
        {
            Ok(created) => created,
            Err(e) => {
                self.refund(&request.user_id, &image_id).await;
                return Err(e);
            }
        };
        tracing::info!(
            image_id = %image.id,
            user_id = %request.user_id,
            cost = self.cost_tokens,
            parent = ?image.source_image_id,
            "Generated new image"
        );

        self.attach_embedding(&image, &request).await;

        Ok(GenerateOutcome {
            image,
            cached: false,
            cost_tokens: self.cost_tokens,
            balance,
        })
    }

    /// Generate, store, and insert one image. Stored bytes are removed again
    /// when the gallery insert fails.
    async fn create_image(
        &self,
        generator: &dyn ImageGenerator,
        request: &GenerateRequest,
        image_id: &str,
        root_id: Option<String>,
    ) -> Result<(CommunityImage, i64), GenerationError> {
        let source_url = match &root_id {
            Some(id) => {
                let id = id.clone();
                self.db
                    .call(move |db| db.get_image(&id))
                    .await?
                    .map(|image| image.url)
            }
            None => None,
        };
        let source = match &source_url {
            Some(url) => match self.store.load(url).await {
                Ok(source) => source,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Could not load family root art");
                    None
                }
            },
            None => None,
        };

        let prompt = GenerationPrompt {
            prompt: request.prompt.clone(),
            style: request.style.clone(),
            source_url,
            source,
        };
        let generated = generator.generate(&prompt).await?;
        let url = self
            .store
            .put(&generated)
            .await
            .map_err(GenerationError::Storage)?;

        let new_image = NewImage {
            url: url.clone(),
            style: Some(request.style.trim().to_string()),
            source_image_id: root_id,
            card_title: request.card_title.clone(),
            prompt: request.prompt.clone(),
            cost_tokens: self.cost_tokens,
            owner_id: Some(request.user_id.clone()),
        };
        let (owner, id) = (request.user_id.clone(), image_id.to_string());
        let recorded = self
            .db
            .call(move |db| Ok(db.record_generation(&owner, &id, &new_image)))
            .await
            .map_err(GenerationError::from)
            .and_then(|r| r.map_err(GenerationError::from));
        if recorded.is_err() {
            if let Err(e) = self.store.delete(&url).await {
                tracing::warn!(url = %url, error = %e, "Failed to remove unrecorded image");
            }
        }
        recorded
    }

    async fn refund(&self, user_id: &str, image_id: &str) {
        let cost = self.cost_tokens;
        let (owner, id) = (user_id.to_string(), image_id.to_string());
        match self
            .db
            .call(move |db| Ok(db.refund_generation(&owner, cost, &id)))
            .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!(user_id, image_id, error = %e, "Generation refund failed"),
            Err(e) => tracing::error!(user_id, image_id, error = %e, "Generation refund failed"),
        }
    }

    async fn attach_embedding(&self, image: &CommunityImage, request: &GenerateRequest) {
        let Some(embedder) = &self.embedder else {
            return;
        };
        let text = embedding_text(&request.card_title, &request.prompt, &request.style);
        let embedding = match embedder.embed(&text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(image_id = %image.id, error = %e, "Embedding failed; image kept without one");
                return;
            }
        };
        let id = image.id.clone();
        if let Err(e) = self
            .db
            .call(move |db| db.set_image_embedding(&id, &embedding))
            .await
        {
            tracing::warn!(image_id = %image.id, error = %e, "Failed to store embedding");
        }
    }

    /// Semantic search with a text fallback when no embedding is available.
    pub async fn search(
        &self,
        query: &str,
        style: Option<String>,
        page: Page,
    ) -> Result<SearchResults<ScoredImage>, GenerationError> {
        let query_embedding = match &self.embedder {
            Some(embedder) if !query.trim().is_empty() => match embedder.embed(query).await {
                Ok(embedding) => Some(embedding),
                Err(e) => {
                    tracing::warn!(error = %e, "Query embedding failed; falling back to text search");
                    None
                }
            },
            _ => None,
        };

        let images = self.db.call(|db| db.list_images()).await?;
        Ok(match query_embedding {
            Some(embedding) => rank_by_similarity(&embedding, images, style.as_deref(), page),
            None => filter_by_text(query, images, style.as_deref(), page),
        })
    }
}

fn embedding_text(card_title: &str, prompt: &str, style: &str) -> String {
    [card_title, prompt, style]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;
    use crate::generation::GeneratedImage;

    #[derive(Default)]
    pub struct FakeGenerator {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    #[async_trait]
    impl ImageGenerator for FakeGenerator {
        async fn generate(&self, prompt: &GenerationPrompt) -> Result<GeneratedImage, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GenerationError::Api("boom".into()));
            }
            Ok(GeneratedImage {
                bytes: prompt.style.as_bytes().to_vec(),
                mime_type: "image/png".into(),
            })
        }
    }

    /// Embeds text as `[len, vowel count]`, or fails on demand.
    #[derive(Default)]
    pub struct FakeEmbedder {
        pub fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, GenerationError> {
            if self.fail {
                return Err(GenerationError::Api("embedding down".into()));
            }
            let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count();
            Ok(vec![text.len() as f32, vowels as f32])
        }
    }

    #[derive(Default)]
    pub struct MemoryStore {
        pub files: Mutex<HashMap<String, GeneratedImage>>,
        next: AtomicUsize,
    }

    #[async_trait]
    impl ImageStore for MemoryStore {
        async fn put(&self, image: &GeneratedImage) -> Result<String> {
            let mut files = self.files.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
            let url = format!("/media/{}.png", self.next.fetch_add(1, Ordering::SeqCst));
            files.insert(url.clone(), image.clone());
            Ok(url)
        }

        async fn load(&self, url: &str) -> Result<Option<GeneratedImage>> {
            let files = self.files.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
            Ok(files.get(url).cloned())
        }

        async fn delete(&self, url: &str) -> Result<bool> {
            let mut files = self.files.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
            Ok(files.remove(url).is_some())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::*;
    use super::*;
    use crate::errors::LedgerError;
    use crate::store::DeckDb;

    fn service_with_store(
        generator: Arc<FakeGenerator>,
        store: Arc<MemoryStore>,
        cost: i64,
    ) -> (ImageService, DbHandle) {
        let db = DbHandle::new(DeckDb::new_in_memory().unwrap());
        let service = ImageService::new(db.clone(), store, cost)
            .with_generator(generator)
            .with_embedder(Arc::new(FakeEmbedder::default()));
        (service, db)
    }

    fn service(generator: Arc<FakeGenerator>, embedder: FakeEmbedder) -> (ImageService, DbHandle) {
        let db = DbHandle::new(DeckDb::new_in_memory().unwrap());
        let service = ImageService::new(db.clone(), Arc::new(MemoryStore::default()), 5)
            .with_generator(generator)
            .with_embedder(Arc::new(embedder));
        (service, db)
    }

    fn request(style: &str, current: Option<ImageRef>) -> GenerateRequest {
        GenerateRequest {
            user_id: "u1".into(),
            card_title: "Goblin".into(),
            prompt: "a goblin".into(),
            style: style.into(),
            current_image: current,
        }
    }

    async fn grant(db: &DbHandle, amount: i64) {
        db.call(move |db| Ok(db.credit("u1", amount, "grant", None)?))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_generation_charges_and_embeds() {
        let generator = Arc::new(FakeGenerator::default());
        let (service, db) = service(generator.clone(), FakeEmbedder::default());
        grant(&db, 12).await;

        let outcome = service.generate(request("ink", None)).await.unwrap();
        assert!(!outcome.cached);
        assert_eq!(outcome.cost_tokens, 5);
        assert_eq!(outcome.balance, 7);
        assert!(outcome.image.source_image_id.is_none());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

        let id = outcome.image.id.clone();
        let stored = db.call(move |db| db.get_image(&id)).await.unwrap().unwrap();
        assert!(stored.embedding.is_some());
    }

    #[tokio::test]
    async fn test_restyle_is_parented_on_root_then_cached() {
        let generator = Arc::new(FakeGenerator::default());
        let (service, db) = service(generator.clone(), FakeEmbedder::default());
        grant(&db, 20).await;

        let root = service.generate(request("ink", None)).await.unwrap().image;
        let noir = service
            .generate(request("noir", Some(ImageRef::Id(root.id.clone()))))
            .await
            .unwrap();
        assert_eq!(noir.image.source_image_id.as_deref(), Some(root.id.as_str()));

        // Restyling a variant still parents on the root.
        let pixel = service
            .generate(request("pixel", Some(ImageRef::Url(noir.image.url.clone()))))
            .await
            .unwrap();
        assert_eq!(pixel.image.source_image_id.as_deref(), Some(root.id.as_str()));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);

        // Asking for a style the family already has is free.
        let again = service
            .generate(request(" Noir ", Some(ImageRef::Id(pixel.image.id.clone()))))
            .await
            .unwrap();
        assert!(again.cached);
        assert_eq!(again.cost_tokens, 0);
        assert_eq!(again.image.id, noir.image.id);
        assert_eq!(again.balance, 5);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_insufficient_tokens_skips_generator() {
        let generator = Arc::new(FakeGenerator::default());
        let (service, db) = service(generator.clone(), FakeEmbedder::default());
        grant(&db, 2).await;

        let err = service.generate(request("ink", None)).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Ledger(LedgerError::InsufficientTokens { required: 5, available: 2, .. })
        ));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generator_failure_keeps_balance() {
        let generator = Arc::new(FakeGenerator {
            fail: true,
            ..Default::default()
        });
        let (service, db) = service(generator, FakeEmbedder::default());
        grant(&db, 10).await;

        assert!(service.generate(request("ink", None)).await.is_err());
        assert_eq!(db.call(|db| db.balance("u1")).await.unwrap(), 10);
        assert!(db.call(|db| db.list_images()).await.unwrap().is_empty());

        let log = db.call(|db| db.list_transactions("u1", 10)).await.unwrap();
        assert_eq!(log[0].reason, "image_generation_refund");
        assert_eq!(log[1].reason, "image_generation");
        assert_eq!(log[0].reference, log[1].reference);
    }

    #[tokio::test]
    async fn test_racing_requests_cannot_share_last_tokens() {
        let generator = Arc::new(FakeGenerator::default());
        let store = Arc::new(MemoryStore::default());
        let (service, db) = service_with_store(generator.clone(), store.clone(), 5);
        grant(&db, 5).await;

        let (a, b) = tokio::join!(
            service.generate(request("ink", None)),
            service.generate(request("oil", None)),
        );
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(GenerationError::Ledger(LedgerError::InsufficientTokens { .. }))
        )));

        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.files.lock().unwrap().len(), 1);
        assert_eq!(db.call(|db| db.list_images()).await.unwrap().len(), 1);
        assert_eq!(db.call(|db| db.balance("u1")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_negative_cost_is_rejected_before_generating() {
        let generator = Arc::new(FakeGenerator::default());
        let store = Arc::new(MemoryStore::default());
        let (service, db) = service_with_store(generator.clone(), store.clone(), -3);
        grant(&db, 10).await;

        assert!(matches!(
            service.generate(request("ink", None)).await,
            Err(GenerationError::Ledger(LedgerError::InvalidAmount { amount: -3 }))
        ));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert!(store.files.lock().unwrap().is_empty());
        assert_eq!(db.call(|db| db.balance("u1")).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_failed_insert_removes_stored_file_and_refunds() {
        let generator = Arc::new(FakeGenerator::default());
        let store = Arc::new(MemoryStore::default());
        let (service, db) = service_with_store(generator.clone(), store.clone(), 5);
        grant(&db, 10).await;

        // Occupy the url the store will hand out next so the insert collides.
        db.call(|db| {
            db.insert_image(&NewImage {
                url: "/media/0.png".into(),
                style: Some("ink".into()),
                source_image_id: None,
                card_title: "Squatter".into(),
                prompt: String::new(),
                cost_tokens: 0,
                owner_id: None,
            })
        })
        .await
        .unwrap();

        assert!(service.generate(request("oil", None)).await.is_err());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert!(store.files.lock().unwrap().is_empty());
        assert_eq!(db.call(|db| db.list_images()).await.unwrap().len(), 1);
        assert_eq!(db.call(|db| db.balance("u1")).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_embedding_failure_keeps_image() {
        let (service, db) = service(
            Arc::new(FakeGenerator::default()),
            FakeEmbedder { fail: true },
        );
        grant(&db, 10).await;

        let outcome = service.generate(request("ink", None)).await.unwrap();
        let id = outcome.image.id.clone();
        let stored = db.call(move |db| db.get_image(&id)).await.unwrap().unwrap();
        assert!(stored.embedding.is_none());
        assert_eq!(outcome.balance, 5);
    }

    #[tokio::test]
    async fn test_without_generator_is_not_configured() {
        let db = DbHandle::new(DeckDb::new_in_memory().unwrap());
        let service = ImageService::new(db, Arc::new(MemoryStore::default()), 5);
        assert!(matches!(
            service.generate(request("ink", None)).await,
            Err(GenerationError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_search_falls_back_to_text() {
        let (service, db) = service(
            Arc::new(FakeGenerator::default()),
            FakeEmbedder { fail: true },
        );
        grant(&db, 10).await;
        service.generate(request("ink", None)).await.unwrap();

        let page = Page { number: 1, size: 10 };
        let results = service.search("GOBLIN", None, page).await.unwrap();
        assert_eq!(results.total, 1);
        assert!(results.items[0].score.is_none());
        let results = service.search("dragon", None, page).await.unwrap();
        assert_eq!(results.total, 0);
    }

    #[tokio::test]
    async fn test_search_ranks_by_embedding() {
        let (service, db) = service(Arc::new(FakeGenerator::default()), FakeEmbedder::default());
        grant(&db, 10).await;
        service.generate(request("ink", None)).await.unwrap();

        let results = service
            .search("goblin", Some("INK".into()), Page { number: 1, size: 10 })
            .await
            .unwrap();
        assert_eq!(results.total, 1);
        assert!(results.items[0].score.is_some());
    }

    #[test]
    fn test_embedding_text_skips_blanks() {
        assert_eq!(embedding_text("Goblin", " ", "ink"), "Goblin | ink");
    }
}

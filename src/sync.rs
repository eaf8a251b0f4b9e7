//! Best-effort cloud sync for the offline deck copy.
//!
//! The local store is the source of truth on the client. Pushes are fired
//! after a Canon Update and never block or fail the edit that triggered them.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode, Url};

use crate::deck::Deck;
use crate::store::{PublishedDeck, SyncedDeck};

/// Header carrying the caller's user id.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
pub struct SyncClient {
    http: Client,
    base_url: Url,
    user_id: String,
}

impl SyncClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("deckforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build sync HTTP client")?;
        let base_url = base_url.into();
        let base_url = Url::parse(&base_url)
            .with_context(|| format!("Invalid sync server url: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Sync server url cannot carry a path: {}", base_url);
        }
        Ok(Self {
            http,
            base_url,
            user_id: user_id.into(),
        })
    }

    /// `base_url` plus `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn deck_url(&self, deck_id: &str) -> Url {
        self.endpoint(&["api", "decks", deck_id])
    }

    pub fn published_url(&self, slug: &str) -> Url {
        self.endpoint(&["api", "published", slug])
    }

    /// Upload `deck` to the user's synced copy. Inline blobs are not sent.
    pub async fn push(&self, deck: &Deck) -> Result<SyncedDeck> {
        let mut payload = deck.clone();
        payload.strip_blobs();
        let resp = self
            .http
            .put(self.deck_url(&deck.id))
            .header(USER_HEADER, &self.user_id)
            .json(&payload)
            .send()
            .await
            .context("Failed to send deck to sync server")?
            .error_for_status()
            .context("Sync server rejected deck")?;
        resp.json::<SyncedDeck>()
            .await
            .context("Failed to parse sync response")
    }

    /// Fetch a curated deck by slug. `None` when the server has no such deck.
    pub async fn pull_published(&self, slug: &str) -> Result<Option<Deck>> {
        let resp = self
            .http
            .get(self.published_url(slug))
            .send()
            .await
            .context("Failed to reach sync server")?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let published = resp
            .error_for_status()
            .context("Sync server returned error status")?
            .json::<PublishedDeck>()
            .await
            .context("Failed to parse published deck")?;
        Ok(Some(published.deck))
    }

    /// Push in the background. Failures are logged and dropped.
    pub fn spawn_push(&self, deck: Deck) -> tokio::task::JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            match client.push(&deck).await {
                Ok(synced) => {
                    tracing::debug!(deck_id = %deck.id, hash = %synced.content_hash, "Deck synced");
                }
                Err(e) => {
                    tracing::warn!(deck_id = %deck.id, error = %e, "Background deck sync failed");
                }
            }
        })
    }
}

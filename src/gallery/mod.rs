//! Community image gallery.
//!
//! Every generated image is published to a shared gallery. Images form
//! shallow families through `source_image_id`: the first generation for a card
//! is the root, and every re-styled variant points back at that root. The
//! `family` module walks these families so a style that was already paid for
//! is reused instead of regenerated; `search` ranks images by embedding
//! similarity for the gallery browser.

pub mod family;
pub mod search;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use family::{Family, ImageRef, VariantLookup, family_of, find_family_root, resolve_variant};
pub use search::{Page, PageRequest, ScoredImage, SearchResults};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunityImage {
    pub id: String,
    pub url: String,
    pub style: Option<String>,
    pub source_image_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub card_title: String,
    pub prompt: String,
    pub cost_tokens: i64,
    pub created_at: String,
}

/// Read access to the gallery, as needed by the family walk.
pub trait ImageCatalog {
    fn image_by_id(&self, id: &str) -> Result<Option<CommunityImage>>;
    fn image_by_url(&self, url: &str) -> Result<Option<CommunityImage>>;
    /// Images whose `source_image_id` is `id`, newest first.
    fn variants_of(&self, id: &str) -> Result<Vec<CommunityImage>>;
}

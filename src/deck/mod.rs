//! Deck and card model shared by every other subsystem.

pub mod model;
pub mod slug;

pub use model::{Card, CardTrait, Deck, DeckMeta, ImageMetadata, Stat, StatValue};
pub use slug::{slugify, unique_slug};

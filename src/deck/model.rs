use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::DeckError;

/// A named collection of cards.
///
/// Serialized with camelCase keys so the same JSON moves between the editor,
/// the share hash, the local store, and the server tables unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: String,
    #[serde(default)]
    pub meta: DeckMeta,
    #[serde(default)]
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeckMeta {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub card_size: String,
    #[serde(default)]
    pub layout: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub description: String,
    /// Public URL of the card art.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Inline base64 image data from the editor. Never shared or synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_blob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_metadata: Option<ImageMetadata>,
    #[serde(default)]
    pub traits: Vec<CardTrait>,
    #[serde(default)]
    pub stats: Vec<Stat>,
}

/// Where a card's art came from in the community gallery.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardTrait {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
    pub title: String,
    pub value: StatValue,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub tracked: bool,
    #[serde(default)]
    pub description: String,
}

/// Stats are numeric in most decks but free text ("2d6", "∞") is allowed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StatValue {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for StatValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatValue::Number(n) => write!(f, "{}", n),
            StatValue::Text(s) => write!(f, "{}", s),
        }
    }
}

fn default_true() -> bool {
    true
}

impl Deck {
    /// Create an empty deck with a fresh id and both timestamps set to now.
    pub fn new(title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            meta: DeckMeta {
                title: title.to_string(),
                created_at: Some(now),
                last_edited: Some(now),
                ..DeckMeta::default()
            },
            cards: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.meta.last_edited = Some(Utc::now());
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == card_id)
    }

    pub fn validate(&self) -> Result<(), DeckError> {
        if self.meta.title.trim().is_empty() {
            return Err(DeckError::EmptyTitle);
        }
        let mut seen = HashSet::new();
        for card in &self.cards {
            if !seen.insert(card.id.as_str()) {
                return Err(DeckError::DuplicateCardId {
                    card_id: card.id.clone(),
                });
            }
            if card.traits.iter().any(|t| t.title.trim().is_empty()) {
                return Err(DeckError::UntitledEntry {
                    card_id: card.id.clone(),
                    kind: "trait",
                });
            }
            if card.stats.iter().any(|s| s.title.trim().is_empty()) {
                return Err(DeckError::UntitledEntry {
                    card_id: card.id.clone(),
                    kind: "stat",
                });
            }
        }
        Ok(())
    }

    /// Drop inline image data from every card.
    pub fn strip_blobs(&mut self) {
        for card in &mut self.cards {
            card.image_blob = None;
        }
    }

    /// SHA-256 over the shareable content: meta and cards without blobs or
    /// timestamps. Two decks with equal hashes render identically.
    pub fn content_hash(&self) -> String {
        let mut canonical = self.clone();
        canonical.strip_blobs();
        canonical.meta.created_at = None;
        canonical.meta.last_edited = None;
        // Serializing plain structs and vecs cannot fail.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }
}

impl Card {
    pub fn new(title: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            ..Card::default()
        }
    }

    /// Names of the content fields that differ from `other`. `imageBlob` is
    /// ignored since it never leaves the editor.
    pub fn differing_fields(&self, other: &Card) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title != other.title {
            fields.push("title");
        }
        if self.subtitle != other.subtitle {
            fields.push("subtitle");
        }
        if self.description != other.description {
            fields.push("description");
        }
        if self.image != other.image {
            fields.push("image");
        }
        if self.image_metadata != other.image_metadata {
            fields.push("imageMetadata");
        }
        if self.traits != other.traits {
            fields.push("traits");
        }
        if self.stats != other.stats {
            fields.push("stats");
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_card(id: &str, title: &str) -> Card {
        Card {
            id: id.to_string(),
            title: title.to_string(),
            stats: vec![Stat {
                title: "HP".into(),
                value: StatValue::Number(10.0),
                is_public: true,
                tracked: true,
                description: String::new(),
            }],
            ..Card::default()
        }
    }

    #[test]
    fn test_deck_json_uses_camel_case() {
        let mut deck = Deck::new("Goblins");
        deck.meta.card_size = "poker".into();
        let mut card = sample_card("c1", "Goblin");
        card.image_blob = Some("data".into());
        deck.cards.push(card);

        let json = serde_json::to_value(&deck).unwrap();
        assert_eq!(json["meta"]["cardSize"], "poker");
        assert!(json["meta"]["lastEdited"].is_string());
        assert_eq!(json["cards"][0]["imageBlob"], "data");
        assert_eq!(json["cards"][0]["stats"][0]["isPublic"], true);
    }

    #[test]
    fn test_deck_parses_minimal_json() {
        let json = r#"{"id":"d1","meta":{"title":"T"},"cards":[{"id":"c1","stats":[{"title":"Dmg","value":"2d6"}]}]}"#;
        let deck: Deck = serde_json::from_str(json).unwrap();
        assert_eq!(deck.meta.title, "T");
        assert!(deck.meta.created_at.is_none());
        assert_eq!(deck.cards[0].stats[0].value, StatValue::Text("2d6".into()));
        assert!(deck.cards[0].stats[0].is_public);
    }

    #[test]
    fn test_validate_rejects_empty_title() {
        let deck = Deck::new("   ");
        assert!(matches!(deck.validate(), Err(DeckError::EmptyTitle)));
    }

    #[test]
    fn test_validate_rejects_duplicate_card_ids() {
        let mut deck = Deck::new("Dupes");
        deck.cards.push(sample_card("same", "A"));
        deck.cards.push(sample_card("same", "B"));
        match deck.validate() {
            Err(DeckError::DuplicateCardId { card_id }) => assert_eq!(card_id, "same"),
            other => panic!("Expected DuplicateCardId, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_untitled_trait() {
        let mut deck = Deck::new("Traits");
        let mut card = sample_card("c1", "A");
        card.traits.push(CardTrait {
            title: "".into(),
            description: "sneaky".into(),
            is_public: true,
        });
        deck.cards.push(card);
        assert!(matches!(
            deck.validate(),
            Err(DeckError::UntitledEntry { kind: "trait", .. })
        ));
    }

    #[test]
    fn test_content_hash_ignores_blobs_and_timestamps() {
        let mut a = Deck::new("Same");
        a.cards.push(sample_card("c1", "A"));
        let mut b = a.clone();
        b.cards[0].image_blob = Some("xyz".into());
        b.meta.last_edited = None;
        assert_eq!(a.content_hash(), b.content_hash());

        b.cards[0].title = "Changed".into();
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_differing_fields() {
        let a = sample_card("c1", "A");
        let mut b = a.clone();
        assert!(a.differing_fields(&b).is_empty());

        b.title = "B".into();
        b.image_blob = Some("ignored".into());
        b.stats[0].value = StatValue::Number(12.0);
        assert_eq!(a.differing_fields(&b), vec!["title", "stats"]);
    }
}

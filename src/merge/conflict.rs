//! Conflicts surfaced by the layer merge.
//!
//! A conflict never blocks the merge: the higher-priority layer always
//! produces the merged value, and the conflict records what was overridden so
//! the editor can offer the losing version back to the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Layer;
use crate::deck::Card;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conflict {
    /// A layer carries a different deck id than the anchor layer and was
    /// left out of the merge entirely.
    UnrelatedLayer {
        layer: Layer,
        deck_id: String,
        expected_id: String,
    },
    /// Two layers hold different non-empty values for a meta field.
    MetaField {
        field: String,
        winner: Layer,
        winning_value: String,
        loser: Layer,
        losing_value: String,
    },
    /// Two layers hold different content for the same card id.
    Card {
        card_id: String,
        fields: Vec<String>,
        winner: Layer,
        loser: Layer,
        winning: Box<Card>,
        losing: Box<Card>,
    },
    /// The top layer lacks a card that a lower layer still has: either a
    /// deletion or a card added elsewhere. The card is kept until resolved.
    MissingFromLayer {
        card_id: String,
        missing_from: Layer,
        present_in: Layer,
    },
    /// A lower layer was edited after a higher one that overrides it.
    StaleOverride {
        newer: Layer,
        newer_edited: DateTime<Utc>,
        winner: Layer,
        winner_edited: DateTime<Utc>,
    },
}

impl Conflict {
    /// Card the conflict is about, if any.
    pub fn card_id(&self) -> Option<&str> {
        match self {
            Conflict::Card { card_id, .. } | Conflict::MissingFromLayer { card_id, .. } => {
                Some(card_id)
            }
            _ => None,
        }
    }

    pub fn is_card_content(&self) -> bool {
        matches!(self, Conflict::Card { .. })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Conflict::MissingFromLayer { .. })
    }
}

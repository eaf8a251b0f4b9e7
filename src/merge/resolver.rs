use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{Conflict, Layer};
use crate::deck::{Card, Deck, DeckMeta};
use crate::errors::MergeError;

/// The three optional inputs of a merge, as received from the editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeInput {
    #[serde(default)]
    pub curated: Option<Deck>,
    #[serde(default)]
    pub hash: Option<Deck>,
    #[serde(default)]
    pub local: Option<Deck>,
}

/// Which layer a merged card was taken from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CardOrigin {
    pub card_id: String,
    pub layer: Layer,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub deck: Deck,
    pub origins: Vec<CardOrigin>,
    pub conflicts: Vec<Conflict>,
    /// Layers that took part, ascending priority.
    pub layers: Vec<Layer>,
    #[serde(skip)]
    sources: BTreeMap<Layer, Deck>,
}

impl MergeOutcome {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn origin_of(&self, card_id: &str) -> Option<Layer> {
        self.origins
            .iter()
            .find(|o| o.card_id == card_id)
            .map(|o| o.layer)
    }

    /// The input deck of a participating layer.
    pub fn source(&self, layer: Layer) -> Option<&Deck> {
        self.sources.get(&layer)
    }
}

impl MergeInput {
    pub fn merge(self) -> Result<MergeOutcome, MergeError> {
        merge_layers(self.curated, self.hash, self.local)
    }
}

/// Merge the curated, hash, and local copies of a deck.
///
/// Priority ascends curated < hash < local. The lowest present layer anchors
/// the deck id; higher layers with another id are excluded. Every override of
/// a differing non-empty value is reported in `MergeOutcome::conflicts`.
pub fn merge_layers(
    curated: Option<Deck>,
    hash: Option<Deck>,
    local: Option<Deck>,
) -> Result<MergeOutcome, MergeError> {
    let mut layers: Vec<(Layer, Deck)> = [
        (Layer::Curated, curated),
        (Layer::Hash, hash),
        (Layer::Local, local),
    ]
    .into_iter()
    .filter_map(|(layer, deck)| deck.map(|d| (layer, d)))
    .collect();

    let Some((_, anchor)) = layers.first() else {
        return Err(MergeError::NoLayers);
    };
    let anchor_id = anchor.id.clone();

    let mut conflicts = Vec::new();
    layers.retain(|(layer, deck)| {
        if deck.id == anchor_id {
            return true;
        }
        tracing::warn!(
            layer = %layer,
            deck_id = %deck.id,
            expected = %anchor_id,
            "Excluding deck layer with mismatched id"
        );
        conflicts.push(Conflict::UnrelatedLayer {
            layer: *layer,
            deck_id: deck.id.clone(),
            expected_id: anchor_id.clone(),
        });
        false
    });

    detect_stale_overrides(&layers, &mut conflicts);
    let meta = merge_meta(&layers, &mut conflicts);
    let (cards, origins) = merge_cards(&layers, &mut conflicts);

    tracing::debug!(
        deck_id = %anchor_id,
        layers = layers.len(),
        cards = cards.len(),
        conflicts = conflicts.len(),
        "Merged deck layers"
    );

    Ok(MergeOutcome {
        deck: Deck {
            id: anchor_id,
            meta,
            cards,
        },
        origins,
        conflicts,
        layers: layers.iter().map(|(l, _)| *l).collect(),
        sources: layers.into_iter().collect(),
    })
}

fn detect_stale_overrides(layers: &[(Layer, Deck)], conflicts: &mut Vec<Conflict>) {
    for (i, (lower, lower_deck)) in layers.iter().enumerate() {
        for (higher, higher_deck) in &layers[i + 1..] {
            match (lower_deck.meta.last_edited, higher_deck.meta.last_edited) {
                (Some(lower_edited), Some(higher_edited)) if lower_edited > higher_edited => {
                    conflicts.push(Conflict::StaleOverride {
                        newer: *lower,
                        newer_edited: lower_edited,
                        winner: *higher,
                        winner_edited: higher_edited,
                    });
                }
                _ => {}
            }
        }
    }
}

fn merge_meta(layers: &[(Layer, Deck)], conflicts: &mut Vec<Conflict>) -> DeckMeta {
    let mut merged = DeckMeta::default();
    let mut owners: HashMap<&'static str, Layer> = HashMap::new();

    for (layer, deck) in layers {
        let meta = &deck.meta;
        let mut field = |name: &'static str, current: &mut String, incoming: &str| {
            override_text(name, current, incoming, *layer, &mut owners, conflicts)
        };
        field("title", &mut merged.title, &meta.title);
        field("theme", &mut merged.theme, &meta.theme);
        field("cardSize", &mut merged.card_size, &meta.card_size);
        field("layout", &mut merged.layout, &meta.layout);
        field("description", &mut merged.description, &meta.description);

        if !meta.tags.is_empty() {
            if !merged.tags.is_empty() && merged.tags != meta.tags {
                if let Some(&loser) = owners.get("tags") {
                    conflicts.push(Conflict::MetaField {
                        field: "tags".to_string(),
                        winner: *layer,
                        winning_value: meta.tags.join(", "),
                        loser,
                        losing_value: merged.tags.join(", "),
                    });
                }
            }
            merged.tags = meta.tags.clone();
            owners.insert("tags", *layer);
        }

        merged.created_at = match (merged.created_at, meta.created_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        merged.last_edited = match (merged.last_edited, meta.last_edited) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    merged
}

fn override_text(
    name: &'static str,
    current: &mut String,
    incoming: &str,
    layer: Layer,
    owners: &mut HashMap<&'static str, Layer>,
    conflicts: &mut Vec<Conflict>,
) {
    if incoming.trim().is_empty() {
        return;
    }
    if !current.is_empty() && current != incoming {
        if let Some(&loser) = owners.get(name) {
            conflicts.push(Conflict::MetaField {
                field: name.to_string(),
                winner: layer,
                winning_value: incoming.to_string(),
                loser,
                losing_value: current.clone(),
            });
        }
    }
    *current = incoming.to_string();
    owners.insert(name, layer);
}

fn merge_cards(
    layers: &[(Layer, Deck)],
    conflicts: &mut Vec<Conflict>,
) -> (Vec<Card>, Vec<CardOrigin>) {
    let Some((top_layer, _)) = layers.last() else {
        return (Vec::new(), Vec::new());
    };

    // Highest layer with cards dictates order; cards only known to lower
    // layers follow in their own order.
    let mut order: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let primary = layers.iter().rev().find(|(_, d)| !d.cards.is_empty());
    let rest = layers.iter().rev();
    for (_, deck) in primary.into_iter().chain(rest) {
        for card in &deck.cards {
            if seen.insert(card.id.as_str()) {
                order.push(card.id.as_str());
            }
        }
    }

    let mut cards = Vec::with_capacity(order.len());
    let mut origins = Vec::with_capacity(order.len());
    for card_id in order {
        let versions: Vec<(Layer, &Card)> = layers
            .iter()
            .filter_map(|(layer, deck)| deck.card(card_id).map(|c| (*layer, c)))
            .collect();
        let Some(&(win_layer, winning)) = versions.last() else {
            continue;
        };

        for &(lose_layer, losing) in &versions[..versions.len() - 1] {
            let fields = winning.differing_fields(losing);
            if !fields.is_empty() {
                conflicts.push(Conflict::Card {
                    card_id: card_id.to_string(),
                    fields: fields.into_iter().map(String::from).collect(),
                    winner: win_layer,
                    loser: lose_layer,
                    winning: Box::new(winning.clone()),
                    losing: Box::new(losing.clone()),
                });
            }
        }

        if win_layer != *top_layer {
            conflicts.push(Conflict::MissingFromLayer {
                card_id: card_id.to_string(),
                missing_from: *top_layer,
                present_in: win_layer,
            });
        }

        cards.push(winning.clone());
        origins.push(CardOrigin {
            card_id: card_id.to_string(),
            layer: win_layer,
        });
    }

    (cards, origins)
}

/// Replace a merged card with the version held by `layer` and clear the
/// card's content conflicts.
pub fn resolve_card(
    outcome: &mut MergeOutcome,
    card_id: &str,
    layer: Layer,
) -> Result<(), MergeError> {
    let chosen = outcome
        .sources
        .get(&layer)
        .and_then(|deck| deck.card(card_id))
        .cloned()
        .ok_or_else(|| MergeError::NoSuchVersion {
            card_id: card_id.to_string(),
            layer,
        })?;

    match outcome.deck.cards.iter_mut().find(|c| c.id == card_id) {
        Some(card) => *card = chosen,
        None => outcome.deck.cards.push(chosen),
    }
    match outcome.origins.iter_mut().find(|o| o.card_id == card_id) {
        Some(origin) => origin.layer = layer,
        None => outcome.origins.push(CardOrigin {
            card_id: card_id.to_string(),
            layer,
        }),
    }
    outcome
        .conflicts
        .retain(|c| !(c.is_card_content() && c.card_id() == Some(card_id)));
    Ok(())
}

/// Settle a `MissingFromLayer` conflict: keep the card or drop it.
pub fn resolve_missing(
    outcome: &mut MergeOutcome,
    card_id: &str,
    keep: bool,
) -> Result<(), MergeError> {
    let flagged = outcome
        .conflicts
        .iter()
        .any(|c| c.is_missing() && c.card_id() == Some(card_id));
    if !flagged {
        return Err(MergeError::NotMissing {
            card_id: card_id.to_string(),
        });
    }

    if !keep {
        outcome.deck.cards.retain(|c| c.id != card_id);
        outcome.origins.retain(|o| o.card_id != card_id);
        outcome.conflicts.retain(|c| c.card_id() != Some(card_id));
    } else {
        outcome
            .conflicts
            .retain(|c| !(c.is_missing() && c.card_id() == Some(card_id)));
    }
    Ok(())
}

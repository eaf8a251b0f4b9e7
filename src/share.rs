//! URL-fragment deck sharing.
//!
//! A shared link carries the whole deck in its `#fragment`:
//! `v1.` + base64url(raw-deflate(json)). Inline image blobs are stripped
//! before encoding. Un-prefixed fragments are treated as legacy base64 JSON.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::deck::Deck;
use crate::errors::ShareError;

const SHARE_PREFIX: &str = "v1.";

/// Upper bound on the inflated JSON. Keeps a crafted link from ballooning.
pub const MAX_SHARE_BYTES: usize = 512 * 1024;

pub fn encode_share_hash(deck: &Deck) -> Result<String, ShareError> {
    let mut shared = deck.clone();
    shared.strip_blobs();
    let json = serde_json::to_vec(&shared)?;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&json).map_err(ShareError::Codec)?;
    let compressed = encoder.finish().map_err(ShareError::Codec)?;

    Ok(format!("{}{}", SHARE_PREFIX, URL_SAFE_NO_PAD.encode(compressed)))
}

pub fn decode_share_hash(input: &str) -> Result<Deck, ShareError> {
    let fragment = input.trim().trim_start_matches('#');
    if fragment.is_empty() {
        return Err(ShareError::Empty);
    }

    let json = match fragment.strip_prefix(SHARE_PREFIX) {
        Some(body) => {
            let compressed = URL_SAFE_NO_PAD.decode(body)?;
            let mut inflated = Vec::new();
            DeflateDecoder::new(compressed.as_slice())
                .take(MAX_SHARE_BYTES as u64 + 1)
                .read_to_end(&mut inflated)
                .map_err(ShareError::Codec)?;
            inflated
        }
        None => {
            // Older links used standard base64, sometimes padded.
            let normalized: String = fragment
                .trim_end_matches('=')
                .chars()
                .map(|c| match c {
                    '+' => '-',
                    '/' => '_',
                    other => other,
                })
                .collect();
            URL_SAFE_NO_PAD.decode(normalized)?
        }
    };

    if json.len() > MAX_SHARE_BYTES {
        return Err(ShareError::TooLarge {
            limit: MAX_SHARE_BYTES,
        });
    }

    let mut deck: Deck = serde_json::from_slice(&json)?;
    deck.strip_blobs();
    Ok(deck)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::Card;
    use base64::engine::general_purpose::STANDARD;

    fn sample_deck() -> Deck {
        let mut deck = Deck::new("Shared Deck");
        let mut card = Card::new("Knight");
        card.description = "Moves in an L".into();
        card.image_blob = Some("aGVsbG8=".into());
        deck.cards.push(card);
        deck
    }

    #[test]
    fn test_encoded_hash_is_url_safe_and_prefixed() {
        let hash = encode_share_hash(&sample_deck()).unwrap();
        assert!(hash.starts_with("v1."));
        assert!(
            hash[3..]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_decode_strips_blobs_and_keeps_content() {
        let deck = sample_deck();
        let hash = encode_share_hash(&deck).unwrap();
        let decoded = decode_share_hash(&format!("#{}", hash)).unwrap();
        assert_eq!(decoded.id, deck.id);
        assert_eq!(decoded.cards[0].description, "Moves in an L");
        assert!(decoded.cards[0].image_blob.is_none());
    }

    #[test]
    fn test_decode_legacy_standard_base64() {
        let json = r#"{"id":"legacy","meta":{"title":"Old link"},"cards":[]}"#;
        let legacy = STANDARD.encode(json);
        let decoded = decode_share_hash(&legacy).unwrap();
        assert_eq!(decoded.id, "legacy");
        assert_eq!(decoded.meta.title, "Old link");
    }

    #[test]
    fn test_decode_empty_fragment() {
        assert!(matches!(decode_share_hash("#"), Err(ShareError::Empty)));
        assert!(matches!(decode_share_hash("  "), Err(ShareError::Empty)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_share_hash("v1.***"),
            Err(ShareError::Base64(_))
        ));
        let not_a_deck = format!("v1.{}", URL_SAFE_NO_PAD.encode(b"not deflate"));
        assert!(decode_share_hash(&not_a_deck).is_err());
    }

    #[test]
    fn test_decode_rejects_oversized_payload() {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&vec![b' '; MAX_SHARE_BYTES + 10]).unwrap();
        let bomb = format!("v1.{}", URL_SAFE_NO_PAD.encode(encoder.finish().unwrap()));
        assert!(matches!(
            decode_share_hash(&bomb),
            Err(ShareError::TooLarge { .. })
        ));
    }
}

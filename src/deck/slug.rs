//! URL slugs for published decks.

use std::sync::LazyLock;

use regex::Regex;

const MAX_SLUG_LEN: usize = 48;

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Lowercase kebab-case slug of `title`. Falls back to `"deck"`.
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    let dashed = NON_ALNUM.replace_all(&lower, "-");
    let mut slug: String = dashed.trim_matches('-').chars().take(MAX_SLUG_LEN).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "deck".to_string()
    } else {
        slug
    }
}

/// Slug with a short suffix derived from `id` so two decks with the same
/// title never collide.
pub fn unique_slug(title: &str, id: &str) -> String {
    let suffix: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_lowercase();
    if suffix.is_empty() {
        slugify(title)
    } else {
        format!("{}-{}", slugify(title), suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Goblin Raiders"), "goblin-raiders");
        assert_eq!(slugify("  Dragons & Dungeons!! "), "dragons-dungeons");
    }

    #[test]
    fn test_slugify_non_ascii_and_empty() {
        assert_eq!(slugify("Élan"), "lan");
        assert_eq!(slugify("!!!"), "deck");
        assert_eq!(slugify(""), "deck");
    }

    #[test]
    fn test_slugify_truncates_without_trailing_dash() {
        let long = "word ".repeat(20);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_unique_slug_appends_id_prefix() {
        let slug = unique_slug("Fire Deck", "3F2A9C1D-0000-4000-8000-000000000000");
        assert_eq!(slug, "fire-deck-3f2a9c1d");
    }
}

//! Remix family lookup.
//!
//! Given the art a card currently shows and the style the user asked for,
//! find an existing image in the same family with that style. A miss returns
//! the family root so the new generation can be parented on it, keeping every
//! family one level deep.

use std::collections::HashSet;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{CommunityImage, ImageCatalog};

/// Lineage walks stop after this many hops.
pub const MAX_LINEAGE_DEPTH: usize = 8;

/// How a request identifies the card's current art.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRef {
    Id(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VariantLookup {
    Hit { image: CommunityImage },
    Miss { root_id: Option<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct Family {
    pub root: CommunityImage,
    pub variants: Vec<CommunityImage>,
}

/// Canonical form of a style name: lowercase words separated by one space.
pub fn normalize_style(style: &str) -> String {
    style
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn styles_match(existing: Option<&str>, requested: &str) -> bool {
    match existing {
        Some(style) => normalize_style(style) == normalize_style(requested),
        None => false,
    }
}

/// Follow `source_image_id` upward to the family root.
///
/// Dangling parents, cycles, and over-deep chains all stop the walk at the
/// last image that could be loaded.
pub fn find_family_root<C: ImageCatalog + ?Sized>(
    catalog: &C,
    image: CommunityImage,
) -> Result<CommunityImage> {
    let mut current = image;
    let mut visited = HashSet::from([current.id.clone()]);

    for _ in 0..MAX_LINEAGE_DEPTH {
        let Some(parent_id) = current.source_image_id.clone() else {
            return Ok(current);
        };
        if !visited.insert(parent_id.clone()) {
            tracing::warn!(image_id = %current.id, parent_id = %parent_id, "Cycle in image lineage");
            return Ok(current);
        }
        match catalog.image_by_id(&parent_id)? {
            Some(parent) => current = parent,
            None => {
                tracing::debug!(image_id = %current.id, parent_id = %parent_id, "Dangling image lineage");
                return Ok(current);
            }
        }
    }

    tracing::warn!(image_id = %current.id, "Image lineage exceeds maximum depth");
    Ok(current)
}

fn load<C: ImageCatalog + ?Sized>(catalog: &C, image: &ImageRef) -> Result<Option<CommunityImage>> {
    match image {
        ImageRef::Id(id) => catalog.image_by_id(id),
        ImageRef::Url(url) => catalog.image_by_url(url),
    }
}

/// Look for an already-generated `style` variant of `current`'s family.
pub fn resolve_variant<C: ImageCatalog + ?Sized>(
    catalog: &C,
    current: &ImageRef,
    style: &str,
) -> Result<VariantLookup> {
    let Some(found) = load(catalog, current)? else {
        return Ok(VariantLookup::Miss { root_id: None });
    };
    if styles_match(found.style.as_deref(), style) {
        return Ok(VariantLookup::Hit { image: found });
    }

    let found_id = found.id.clone();
    let root = find_family_root(catalog, found)?;
    if root.id != found_id && styles_match(root.style.as_deref(), style) {
        return Ok(VariantLookup::Hit { image: root });
    }

    let variants = catalog.variants_of(&root.id)?;
    if let Some(hit) = variants
        .iter()
        .find(|v| v.id != found_id && styles_match(v.style.as_deref(), style))
    {
        return Ok(VariantLookup::Hit { image: hit.clone() });
    }

    // Families created before variants were re-parented on the root can be
    // two levels deep.
    for variant in &variants {
        if let Some(hit) = catalog
            .variants_of(&variant.id)?
            .into_iter()
            .find(|v| v.id != found_id && styles_match(v.style.as_deref(), style))
        {
            return Ok(VariantLookup::Hit { image: hit });
        }
    }

    Ok(VariantLookup::Miss {
        root_id: Some(root.id),
    })
}

/// Root and every known variant of the family `image_id` belongs to.
pub fn family_of<C: ImageCatalog + ?Sized>(catalog: &C, image_id: &str) -> Result<Option<Family>> {
    let Some(image) = catalog.image_by_id(image_id)? else {
        return Ok(None);
    };
    let root = find_family_root(catalog, image)?;

    let mut seen = HashSet::from([root.id.clone()]);
    let mut variants = Vec::new();
    for child in catalog.variants_of(&root.id)? {
        let grandchildren = catalog.variants_of(&child.id)?;
        if seen.insert(child.id.clone()) {
            variants.push(child);
        }
        for grandchild in grandchildren {
            if seen.insert(grandchild.id.clone()) {
                variants.push(grandchild);
            }
        }
    }

    Ok(Some(Family { root, variants }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::testing::MemoryCatalog;

    fn family() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::default();
        catalog.add("root", Some("Watercolor"), None);
        catalog.add("pixel", Some("pixel-art"), Some("root"));
        catalog.add("noir", Some("Film Noir"), Some("root"));
        catalog
    }

    fn id(s: &str) -> ImageRef {
        ImageRef::Id(s.to_string())
    }

    #[test]
    fn test_normalize_style() {
        assert_eq!(normalize_style("  Pixel-Art "), "pixel art");
        assert_eq!(normalize_style("film_noir"), "film noir");
        assert!(styles_match(Some("Oil  Painting"), "oil-painting"));
        assert!(!styles_match(None, "anything"));
    }

    #[test]
    fn test_same_style_returns_current_image() {
        let catalog = family();
        let lookup = resolve_variant(&catalog, &id("pixel"), "Pixel Art").unwrap();
        assert!(matches!(lookup, VariantLookup::Hit { image } if image.id == "pixel"));
    }

    #[test]
    fn test_sibling_variant_is_reused() {
        let catalog = family();
        let lookup = resolve_variant(&catalog, &id("pixel"), "film noir").unwrap();
        assert!(matches!(lookup, VariantLookup::Hit { image } if image.id == "noir"));
    }

    #[test]
    fn test_root_style_is_reused_from_variant() {
        let catalog = family();
        let lookup = resolve_variant(&catalog, &id("noir"), "watercolor").unwrap();
        assert!(matches!(lookup, VariantLookup::Hit { image } if image.id == "root"));
    }

    #[test]
    fn test_lookup_by_url() {
        let catalog = family();
        let url = ImageRef::Url("https://cdn.test/root.png".into());
        let lookup = resolve_variant(&catalog, &url, "pixel art").unwrap();
        assert!(matches!(lookup, VariantLookup::Hit { image } if image.id == "pixel"));
    }

    #[test]
    fn test_miss_returns_family_root() {
        let catalog = family();
        let lookup = resolve_variant(&catalog, &id("noir"), "cyberpunk").unwrap();
        assert_eq!(
            lookup,
            VariantLookup::Miss {
                root_id: Some("root".into())
            }
        );
    }

    #[test]
    fn test_unknown_image_misses_without_root() {
        let catalog = family();
        let lookup = resolve_variant(&catalog, &id("ghost"), "watercolor").unwrap();
        assert_eq!(lookup, VariantLookup::Miss { root_id: None });
    }

    #[test]
    fn test_newest_matching_variant_wins() {
        let mut catalog = family();
        catalog.add("noir-2", Some("film noir"), Some("root"));
        let lookup = resolve_variant(&catalog, &id("pixel"), "Film Noir").unwrap();
        assert!(matches!(lookup, VariantLookup::Hit { image } if image.id == "noir-2"));
    }

    #[test]
    fn test_legacy_two_level_family() {
        let mut catalog = family();
        catalog.add("deep", Some("sketch"), Some("pixel"));
        let lookup = resolve_variant(&catalog, &id("noir"), "sketch").unwrap();
        assert!(matches!(lookup, VariantLookup::Hit { image } if image.id == "deep"));
    }

    #[test]
    fn test_root_walk_survives_cycles_and_dangling_parents() {
        let mut catalog = MemoryCatalog::default();
        catalog.add("a", None, Some("b"));
        catalog.add("b", None, Some("a"));
        let start = catalog.image_by_id("a").unwrap().unwrap();
        let root = find_family_root(&catalog, start).unwrap();
        assert_eq!(root.id, "b");

        catalog.add("orphan", None, Some("deleted"));
        let start = catalog.image_by_id("orphan").unwrap().unwrap();
        assert_eq!(find_family_root(&catalog, start).unwrap().id, "orphan");
    }

    #[test]
    fn test_family_of_lists_root_and_variants() {
        let mut catalog = family();
        catalog.add("deep", Some("sketch"), Some("pixel"));
        let fam = family_of(&catalog, "deep").unwrap().unwrap();
        assert_eq!(fam.root.id, "root");
        let ids: Vec<&str> = fam.variants.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["noir", "pixel", "deep"]);
        assert!(family_of(&catalog, "ghost").unwrap().is_none());
    }
}

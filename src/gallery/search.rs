//! Gallery search: embedding similarity ranking and pagination.

use serde::{Deserialize, Serialize};

use super::CommunityImage;
use super::family::styles_match;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 50;
/// Highest page number honoured. Larger requests land here, past the end of
/// any realistic result set, so offsets stay well inside `i64`.
pub const MAX_PAGE: usize = 100_000;

/// Raw paging parameters from a query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

/// A normalized, 1-based page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub size: usize,
}

impl From<&PageRequest> for Page {
    fn from(req: &PageRequest) -> Self {
        Self {
            number: req.page.unwrap_or(1).clamp(1, MAX_PAGE),
            size: req
                .page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }
}

impl Page {
    pub fn offset(&self) -> usize {
        self.number.saturating_sub(1).saturating_mul(self.size)
    }

    pub fn total_pages(&self, total: usize) -> usize {
        total.div_ceil(self.size)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredImage {
    #[serde(flatten)]
    pub image: CommunityImage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

pub fn paginate<T>(items: Vec<T>, page: Page) -> SearchResults<T> {
    let total = items.len();
    let items = items
        .into_iter()
        .skip(page.offset())
        .take(page.size)
        .collect();
    SearchResults {
        items,
        page: page.number,
        page_size: page.size,
        total,
        total_pages: page.total_pages(total),
    }
}

/// Cosine similarity, or `None` for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

fn style_filter(style: Option<&str>) -> impl Fn(&CommunityImage) -> bool + '_ {
    move |image| match style {
        Some(s) if !s.trim().is_empty() => styles_match(image.style.as_deref(), s),
        _ => true,
    }
}

/// Rank images by similarity to `query`. Images without a comparable
/// embedding are left out.
pub fn rank_by_similarity(
    query: &[f32],
    images: Vec<CommunityImage>,
    style: Option<&str>,
    page: Page,
) -> SearchResults<ScoredImage> {
    let keep = style_filter(style);
    let mut scored: Vec<ScoredImage> = images
        .into_iter()
        .filter(|i| keep(i))
        .filter_map(|image| {
            let score = cosine_similarity(query, image.embedding.as_deref()?)?;
            Some(ScoredImage {
                image,
                score: Some(score),
            })
        })
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    paginate(scored, page)
}

/// Case-insensitive title/prompt match, used when no query embedding is
/// available. Input order is preserved.
pub fn filter_by_text(
    text: &str,
    images: Vec<CommunityImage>,
    style: Option<&str>,
    page: Page,
) -> SearchResults<ScoredImage> {
    let keep = style_filter(style);
    let needle = text.trim().to_lowercase();
    let matches = images
        .into_iter()
        .filter(|i| keep(i))
        .filter(|i| {
            needle.is_empty()
                || i.card_title.to_lowercase().contains(&needle)
                || i.prompt.to_lowercase().contains(&needle)
        })
        .map(|image| ScoredImage { image, score: None })
        .collect();
    paginate(matches, page)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(id: &str, title: &str, style: &str, embedding: Option<Vec<f32>>) -> CommunityImage {
        CommunityImage {
            id: id.to_string(),
            url: format!("/media/{}.png", id),
            style: Some(style.to_string()),
            source_image_id: None,
            embedding,
            card_title: title.to_string(),
            prompt: String::new(),
            cost_tokens: 1,
            created_at: "2025-01-01 00:00:00".into(),
        }
    }

    #[test]
    fn test_page_normalization() {
        let page = Page::from(&PageRequest {
            page: Some(0),
            page_size: Some(500),
        });
        assert_eq!(page.number, 1);
        assert_eq!(page.size, MAX_PAGE_SIZE);

        let page = Page::from(&PageRequest::default());
        assert_eq!(page.size, DEFAULT_PAGE_SIZE);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_huge_page_number_is_capped() {
        let page = Page::from(&PageRequest {
            page: Some(usize::MAX),
            page_size: Some(MAX_PAGE_SIZE),
        });
        assert_eq!(page.number, MAX_PAGE);
        assert_eq!(page.offset(), (MAX_PAGE - 1) * MAX_PAGE_SIZE);
        assert!(i64::try_from(page.offset()).is_ok());

        let results = paginate(vec![1, 2, 3], page);
        assert!(results.items.is_empty());
        assert_eq!(results.total, 3);

        let unchecked = Page {
            number: usize::MAX,
            size: usize::MAX,
        };
        assert_eq!(unchecked.offset(), usize::MAX);
    }

    #[test]
    fn test_total_pages() {
        let page = Page { number: 1, size: 10 };
        assert_eq!(page.total_pages(0), 0);
        assert_eq!(page.total_pages(10), 1);
        assert_eq!(page.total_pages(11), 2);
    }

    #[test]
    fn test_paginate_second_page() {
        let results = paginate((1..=25).collect::<Vec<_>>(), Page { number: 2, size: 10 });
        assert_eq!(results.items, (11..=20).collect::<Vec<_>>());
        assert_eq!(results.total, 25);
        assert_eq!(results.total_pages, 3);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-6);
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_none());
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn test_rank_by_similarity_orders_and_filters() {
        let images = vec![
            image("far", "Far", "ink", Some(vec![0.0, 1.0])),
            image("near", "Near", "ink", Some(vec![1.0, 0.1])),
            image("none", "No embedding", "ink", None),
            image("other", "Other style", "oil", Some(vec![1.0, 0.0])),
        ];
        let results = rank_by_similarity(&[1.0, 0.0], images, Some("Ink"), Page { number: 1, size: 10 });
        let ids: Vec<&str> = results.items.iter().map(|s| s.image.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
        assert_eq!(results.total, 2);
    }

    #[test]
    fn test_filter_by_text_fallback() {
        let images = vec![
            image("a", "Goblin King", "ink", None),
            image("b", "Elf Archer", "ink", None),
            image("c", "goblin scout", "oil", None),
        ];
        let results = filter_by_text("GOBLIN", images.clone(), None, Page { number: 1, size: 10 });
        assert_eq!(results.total, 2);
        assert!(results.items.iter().all(|s| s.score.is_none()));

        let results = filter_by_text("goblin", images, Some("oil"), Page { number: 1, size: 10 });
        assert_eq!(results.items[0].image.id, "c");
    }

    #[test]
    fn test_scored_image_serializes_flat_without_embedding() {
        let scored = ScoredImage {
            image: image("x", "X", "ink", Some(vec![1.0])),
            score: Some(0.5),
        };
        let json = serde_json::to_value(&scored).unwrap();
        assert_eq!(json["id"], "x");
        assert_eq!(json["score"], 0.5);
        assert!(json.get("embedding").is_none());
    }
}

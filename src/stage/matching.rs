//! Category and author matching.
//!
//! A missing category is tolerated; a missing author is not, since every
//! published article needs an attributed author.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Result;

/// Below this, a category guess is discarded.
pub const MIN_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct CategoryQuery {
    pub title: String,
    pub description: String,
    pub keyword: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMatch {
    pub category_id: Uuid,
    pub category_name: String,
    pub confidence: f64,
}

#[async_trait]
pub trait CategoryMatcher: Send + Sync {
    async fn match_category(&self, query: &CategoryQuery) -> Result<Option<CategoryMatch>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: Uuid,
    pub name: String,
    /// Categories this author writes for.
    pub specializations: Vec<Uuid>,
}

#[async_trait]
pub trait AuthorDirectory: Send + Sync {
    /// All authors in a stable order; the first is the fallback.
    async fn list_authors(&self) -> Result<Vec<Author>>;
}

/// Specialist for `category` if there is one, otherwise the first author.
pub fn pick_author(authors: &[Author], category: Option<Uuid>) -> Option<&Author> {
    category
        .and_then(|c| authors.iter().find(|a| a.specializations.contains(&c)))
        .or_else(|| authors.first())
}

/// A category with the words that signal it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub keywords: Vec<String>,
}

/// Score every category against the query and keep the best one above
/// `min_confidence`.
///
/// An exact name match on the extracted SEO category scores 1.0. Otherwise
/// confidence is the share of a category's terms found in the query text.
pub fn best_category(
    query: &CategoryQuery,
    categories: &[Category],
    min_confidence: f64,
) -> Option<CategoryMatch> {
    let text = format!("{} {} {}", query.title, query.description, query.keyword);
    let words: HashSet<String> = tokenize(&text).collect();

    categories
        .iter()
        .map(|category| {
            let exact = query
                .category
                .as_deref()
                .is_some_and(|c| c.trim().eq_ignore_ascii_case(category.name.trim()));
            let confidence = if exact {
                1.0
            } else {
                let terms: HashSet<String> = tokenize(&category.name)
                    .chain(category.keywords.iter().flat_map(|k| tokenize(k)))
                    .collect();
                if terms.is_empty() {
                    0.0
                } else {
                    terms.iter().filter(|t| words.contains(*t)).count() as f64
                        / terms.len() as f64
                }
            };
            CategoryMatch {
                category_id: category.id,
                category_name: category.name.clone(),
                confidence,
            }
        })
        .filter(|m| m.confidence >= min_confidence)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_lowercase())
}

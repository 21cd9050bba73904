//! Author/category catalog and the recipe table generated content lands in.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::content::GeneratedContent;
use crate::model::work::WorkItem;
use crate::stage::matching::{Category, MIN_CONFIDENCE, best_category};
use crate::stage::{
    Author, AuthorDirectory, CategoryMatch, CategoryMatcher, CategoryQuery, ContentPublisher,
    ContentRequest, PublishedContent,
};

#[async_trait]
impl AuthorDirectory for super::Db {
    async fn list_authors(&self) -> Result<Vec<Author>> {
        let rows: Vec<(Uuid, String, Vec<Uuid>)> = sqlx::query_as(
            "SELECT id, name, specializations FROM authors ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, specializations)| Author {
                id,
                name,
                specializations,
            })
            .collect())
    }
}

#[async_trait]
impl CategoryMatcher for super::Db {
    async fn match_category(&self, query: &CategoryQuery) -> Result<Option<CategoryMatch>> {
        let categories = self.list_categories().await?;
        Ok(best_category(query, &categories, MIN_CONFIDENCE))
    }
}

#[async_trait]
impl ContentPublisher for super::Db {
    async fn publish(
        &self,
        item: &WorkItem,
        request: &ContentRequest,
        content: &GeneratedContent,
    ) -> Result<PublishedContent> {
        let content_id = Uuid::new_v4();
        let slug = slugify(&content.title, content_id);
        let url = format!("{}/recipes/{slug}", self.site_base_url);

        sqlx::query(
            "INSERT INTO recipes (id, work_item_id, author_id, category_id, slug, title, body, images, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())",
        )
        .bind(content_id)
        .bind(item.id.0)
        .bind(request.author_id)
        .bind(item.category_id)
        .bind(&slug)
        .bind(&content.title)
        .bind(serde_json::to_value(content)?)
        .bind(serde_json::to_value(&request.images)?)
        .execute(&self.pool)
        .await?;

        tracing::info!(id = %item.id, %content_id, %url, "recipe stored");
        Ok(PublishedContent { content_id, url })
    }
}

impl super::Db {
    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows: Vec<(Uuid, String, Vec<String>)> =
            sqlx::query_as("SELECT id, name, keywords FROM categories ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, keywords)| Category { id, name, keywords })
            .collect())
    }

    pub async fn create_category(&self, name: &str, keywords: &[String]) -> Result<Category> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO categories (id, name, keywords) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(name)
            .bind(keywords)
            .execute(&self.pool)
            .await?;
        Ok(Category {
            id,
            name: name.to_string(),
            keywords: keywords.to_vec(),
        })
    }

    pub async fn create_author(&self, name: &str, specializations: &[Uuid]) -> Result<Author> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO authors (id, name, specializations, created_at) VALUES ($1, $2, $3, now())",
        )
        .bind(id)
        .bind(name)
        .bind(specializations)
        .execute(&self.pool)
        .await?;
        Ok(Author {
            id,
            name: name.to_string(),
            specializations: specializations.to_vec(),
        })
    }
}

/// URL slug from a title, suffixed with part of the content ID to stay unique.
pub fn slugify(title: &str, content_id: Uuid) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    let suffix = &content_id.simple().to_string()[..8];
    if slug.is_empty() {
        suffix.to_string()
    } else {
        format!("{slug}-{suffix}")
    }
}

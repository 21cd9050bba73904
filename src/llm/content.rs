//! Recipe article generation.

use async_trait::async_trait;

use super::{AnthropicClient, complete, parse_json_reply};
use crate::error::{Error, Result};
use crate::model::content::GeneratedContent;
use crate::stage::{ContentGenerator, ContentRequest};

const PREAMBLE: &str = "You write warm, practical recipe articles. \
Reply with a single JSON object and nothing else.";

const SHAPE: &str = r#"{"title": "...", "intro": "...", "story": "...",
"ingredients": ["..."], "instructions": ["..."], "tips": ["..."],
"faq": [{"question": "...", "answer": "..."}],
"prep_time": "...", "cook_time": "...", "servings": "..."}"#;

pub struct LlmContentGenerator {
    client: AnthropicClient,
    model: String,
    max_tokens: u64,
}

impl LlmContentGenerator {
    pub fn new(client: AnthropicClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens: 8192,
        }
    }
}

#[async_trait]
impl ContentGenerator for LlmContentGenerator {
    async fn generate(&self, request: &ContentRequest) -> Result<GeneratedContent> {
        let prompt = format!(
            "Write a recipe article.\n\
             Title: {title}\nDescription: {description}\nFocus keyword: {keyword}\n\
             Category: {category}\nAuthor voice: {author}\n\
             Images (featured, ingredients, process, serving): {images}\n\n\
             Intro at least 100 characters, story at least 200, three or more \
             ingredients and instructions, at least one tip and two FAQ entries.\n\
             Return JSON shaped like:\n{SHAPE}",
            title = request.title,
            description = request.description,
            keyword = request.keyword,
            category = request.category.as_deref().unwrap_or("General"),
            author = request.author_name,
            images = request.images.join(", "),
        );

        let reply = complete(&self.client, &self.model, PREAMBLE, prompt, self.max_tokens).await?;

        parse_json_reply(&reply).map_err(|e| {
            if e.is_eof() {
                Error::ContentQuality("generator output was truncated".to_string())
            } else {
                Error::Other(format!("recipe reply is not valid JSON: {e}"))
            }
        })
    }
}

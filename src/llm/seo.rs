//! SEO extraction: keyword, title, description and category for a lead.

use async_trait::async_trait;
use serde::Deserialize;

use super::{AnthropicClient, complete, parse_json_reply};
use crate::error::{Error, Result};
use crate::model::work::{SeoFields, WorkItem};
use crate::stage::SeoExtractor;

const PREAMBLE: &str = "You are an SEO editor for a recipe site. \
Reply with a single JSON object and nothing else.";

pub struct LlmSeoExtractor {
    client: AnthropicClient,
    model: String,
}

impl LlmSeoExtractor {
    pub fn new(client: AnthropicClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct SeoReply {
    keyword: String,
    title: String,
    description: String,
    #[serde(default)]
    category: Option<String>,
}

#[async_trait]
impl SeoExtractor for LlmSeoExtractor {
    async fn extract(&self, item: &WorkItem) -> Result<SeoFields> {
        let prompt = format!(
            "Source page: {}\nScraped title: {}\nScraped description: {}\n\n\
             Return JSON with keys: keyword (main search phrase), title (under 60 chars), \
             description (under 155 chars), category (one short recipe category).",
            item.lead.source_url,
            item.lead.title,
            item.lead.description.as_deref().unwrap_or("(none)"),
        );

        let reply = complete(&self.client, &self.model, PREAMBLE, prompt, 1024).await?;
        let parsed: SeoReply = parse_json_reply(&reply)
            .map_err(|e| Error::Other(format!("seo reply is not valid JSON: {e}")))?;

        let seo = SeoFields {
            keyword: parsed.keyword.trim().to_string(),
            title: parsed.title.trim().to_string(),
            description: parsed.description.trim().to_string(),
            category: parsed.category.filter(|c| !c.trim().is_empty()),
        };
        if !seo.is_complete() {
            return Err(Error::Other(
                "seo reply left keyword, title or description empty".to_string(),
            ));
        }
        Ok(seo)
    }
}

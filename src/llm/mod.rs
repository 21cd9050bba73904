//! LLM provider setup via rig-core, plus the LLM-backed stage executors.
//!
//! # Example
//! ```no_run
//! use leadpress::llm::{anthropic_client, LlmSeoExtractor};
//! use secrecy::SecretString;
//!
//! let key = SecretString::from("sk-ant-...");
//! let client = anthropic_client(&key).expect("failed to create Anthropic client");
//! let seo = LlmSeoExtractor::new(client, "claude-sonnet-4-20250514");
//! ```

pub mod content;
pub mod seo;

use rig::client::CompletionClient;
use rig::completion::Prompt;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::telemetry::genai::start_chat_span;

pub use content::LlmContentGenerator;
pub use seo::LlmSeoExtractor;

pub type AnthropicClient = rig::providers::anthropic::Client;

/// Create an Anthropic client from a secret API key.
///
/// # Errors
/// Returns an error if the underlying HTTP client cannot be constructed.
pub fn anthropic_client(
    api_key: &SecretString,
) -> std::result::Result<AnthropicClient, rig::http_client::Error> {
    rig::providers::anthropic::Client::new(api_key.expose_secret())
}

/// Run one prompt and return the raw reply, inside a `gen_ai.chat` span.
pub(crate) async fn complete(
    client: &AnthropicClient,
    model: &str,
    preamble: &str,
    prompt: String,
    max_tokens: u64,
) -> Result<String> {
    let agent = client
        .agent(model)
        .preamble(preamble)
        .max_tokens(max_tokens)
        .build();

    let span = start_chat_span(model, "anthropic");
    async move { agent.prompt(prompt).await }
        .instrument(span)
        .await
        .map_err(|e| Error::Other(format!("llm request failed: {e}")))
}

/// Parse the JSON object in a model reply, tolerating code fences and
/// surrounding prose.
pub fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> serde_json::Result<T> {
    serde_json::from_str(json_object(reply))
}

fn json_object(reply: &str) -> &str {
    let start = reply.find('{');
    let end = reply.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e > s => &reply[s..=e],
        (Some(s), _) => &reply[s..],
        _ => reply,
    }
}

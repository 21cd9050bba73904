//! GenAI semantic convention spans for LLM-backed stages.
//!
//! Fields follow the OpenTelemetry GenAI conventions:
//! `gen_ai.operation.name`, `gen_ai.request.model`, `gen_ai.provider.name`.

use tracing::Span;

/// Span around one chat completion (SEO extraction, content generation).
pub fn start_chat_span(model: &str, provider: &str) -> Span {
    tracing::info_span!(
        "gen_ai.chat",
        "gen_ai.operation.name" = "chat",
        "gen_ai.request.model" = model,
        "gen_ai.provider.name" = provider,
    )
}

//! Secret handling utilities.
//!
//! Re-exports secrecy types and provides helpers for handing secrets to
//! outbound HTTP calls without copying them into long-lived strings.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// Attach a bearer token when one is configured.
pub fn with_bearer(
    request: reqwest::RequestBuilder,
    token: Option<&SecretString>,
) -> reqwest::RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token.expose_secret()),
        None => request,
    }
}

//! # leadpress
//!
//! Resumable content pipeline: turns scraped leads into published articles
//! through SEO extraction, image generation, category/author matching,
//! content generation, and optional indexing and distribution.
//!
//! Every expensive stage is checkpointed on the work item before the next one
//! starts, so failed runs resume without paying twice. A queue-driven job
//! runner executes at most one pipeline at a time under a rate limit.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod http;
pub mod llm;
pub mod model;
pub mod stage;
pub mod store;
pub mod telemetry;

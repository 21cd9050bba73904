//! Core data model.
//!
//! A work item is one scraped lead on its way to a published article. Its
//! checkpoint records the highest stage whose artifacts are durably
//! confirmed; its status records where it sits in the lifecycle.

pub mod content;
pub mod execution;
pub mod schedule;
pub mod work;

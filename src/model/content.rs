//! Generated article content and the minimum-richness gate it must pass.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Structured document returned by the content generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub title: String,
    pub intro: String,
    pub story: String,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub tips: Vec<String>,
    pub faq: Vec<FaqEntry>,
    #[serde(default)]
    pub prep_time: Option<String>,
    #[serde(default)]
    pub cook_time: Option<String>,
    #[serde(default)]
    pub servings: Option<String>,
    /// Why the generator stopped, as reported by the service.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

/// Minimum sizes a generated document must reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub min_title_chars: usize,
    pub min_intro_chars: usize,
    pub min_story_chars: usize,
    pub min_ingredients: usize,
    pub min_instructions: usize,
    pub min_tips: usize,
    pub min_faq: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_title_chars: 10,
            min_intro_chars: 100,
            min_story_chars: 200,
            min_ingredients: 3,
            min_instructions: 3,
            min_tips: 1,
            min_faq: 2,
        }
    }
}

const TRUNCATED: &[&str] = &["length", "max_tokens"];
const FILTERED: &[&str] = &["safety", "content_filter", "refusal"];

impl GeneratedContent {
    /// Reject truncated, filtered or thin documents.
    ///
    /// Every shortfall is reported in one error so operators see the whole
    /// picture at once.
    pub fn validate(&self, t: &QualityThresholds) -> Result<()> {
        if let Some(reason) = self.finish_reason.as_deref() {
            let reason = reason.to_lowercase();
            if TRUNCATED.contains(&reason.as_str()) {
                return Err(Error::ContentQuality(
                    "generator output was truncated".to_string(),
                ));
            }
            if FILTERED.contains(&reason.as_str()) {
                return Err(Error::ContentQuality(format!(
                    "generator output was blocked ({reason})"
                )));
            }
        }

        let mut problems = Vec::new();
        check_chars(&mut problems, "title", &self.title, t.min_title_chars);
        check_chars(&mut problems, "intro", &self.intro, t.min_intro_chars);
        check_chars(&mut problems, "story", &self.story, t.min_story_chars);
        check_count(&mut problems, "ingredients", non_blank(&self.ingredients), t.min_ingredients);
        check_count(&mut problems, "instructions", non_blank(&self.instructions), t.min_instructions);
        check_count(&mut problems, "tips", non_blank(&self.tips), t.min_tips);

        let faq = self
            .faq
            .iter()
            .filter(|e| !e.question.trim().is_empty() && !e.answer.trim().is_empty())
            .count();
        check_count(&mut problems, "faq", faq, t.min_faq);

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::ContentQuality(problems.join("; ")))
        }
    }
}

fn non_blank(items: &[String]) -> usize {
    items.iter().filter(|s| !s.trim().is_empty()).count()
}

fn check_chars(problems: &mut Vec<String>, field: &str, value: &str, min: usize) {
    let len = value.trim().chars().count();
    if len < min {
        problems.push(format!("{field} has {len} chars, need {min}"));
    }
}

fn check_count(problems: &mut Vec<String>, field: &str, count: usize, min: usize) {
    if count < min {
        problems.push(format!("{field} has {count} entries, need {min}"));
    }
}

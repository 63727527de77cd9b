//! Scoring prompt construction
//!
//! The instruction text is opaque to the rest of the evaluator: the planner
//! only needs the per-story rendering and the cost of the fixed wrapper.

use crate::planner::estimate_tokens;
use shorts_common::models::{SCORE_MAX, SCORE_MIN};
use shorts_common::{Audience, Category, Item};

const STORIES_PLACEHOLDER: &str = "{stories}";

const DEFAULT_TEMPLATE: &str = r#"You pick Reddit stories for entertaining short-form videos.

Score every story below from {score_min} to {score_max} for its potential as a viral, light-hearted short video.
Reward clear hooks, a satisfying arc or twist, relatability and shareability.
Give {score_min}-10 to anything heavy or distressing: self-harm, abuse, addiction, grief, serious illness.

Assign each story one category and one target audience.
categories: {categories}
target audiences: {audiences}

Return JSON only, one entry per story, using the story id exactly as given:
{"evaluations": [{"reddit_id": "...", "score": 0, "category": "...", "target_audience": "..."}]}

Evaluate all stories in the list.

Stories to evaluate:

---

{stories}"#;

/// Render one story the way it appears in a prompt
pub fn format_story(item: &Item) -> String {
    format!(
        "Story ID: {}\nSubreddit: r/{}\nFlair: {}\nContent: {}\n---\n",
        item.id,
        item.community,
        item.tag.as_deref().unwrap_or("None"),
        item.content
    )
}

/// Builds the prompt for one batch
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    /// Template with the closed sets and score range already filled in
    template: String,
}

impl PromptBuilder {
    /// Builder over a custom template; `{stories}` marks where stories go
    pub fn with_template(template: &str) -> Self {
        let categories = Category::ALL.map(|c| c.as_str()).join(", ");
        let audiences = Audience::ALL.map(|a| a.as_str()).join(", ");

        let template = template
            .replace("{score_min}", &SCORE_MIN.to_string())
            .replace("{score_max}", &SCORE_MAX.to_string())
            .replace("{categories}", &categories)
            .replace("{audiences}", &audiences);

        Self { template }
    }

    pub fn build(&self, batch: &[Item]) -> String {
        let stories: Vec<String> = batch.iter().map(format_story).collect();
        self.template
            .replace(STORIES_PLACEHOLDER, &stories.join("\n\n"))
            .trim()
            .to_string()
    }

    /// Estimated tokens of the prompt with no stories in it
    pub fn base_tokens(&self) -> usize {
        estimate_tokens(&self.template.replace(STORIES_PLACEHOLDER, ""))
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::with_template(DEFAULT_TEMPLATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_story_uses_none_for_missing_tag() {
        let item = Item::new("abc123", "tifu", "# Title\n\nBody", 0, None);
        assert_eq!(
            format_story(&item),
            "Story ID: abc123\nSubreddit: r/tifu\nFlair: None\nContent: # Title\n\nBody\n---\n"
        );
    }

    #[test]
    fn test_build_contains_every_story_and_closed_sets() {
        let builder = PromptBuilder::default();
        let batch = vec![
            Item::new("aaa111", "tifu", "first", 0, Some("M".to_string())),
            Item::new("bbb222", "pettyrevenge", "second", 0, None),
        ];

        let prompt = builder.build(&batch);
        assert!(prompt.contains("Story ID: aaa111"));
        assert!(prompt.contains("Flair: M"));
        assert!(prompt.contains("Story ID: bbb222"));
        assert!(prompt.contains("young_adult"));
        assert!(prompt.contains("uncategorized"));
        assert!(prompt.contains("from 0 to 100"));
        assert!(!prompt.contains("{stories}"));
    }

    #[test]
    fn test_base_tokens_excludes_stories() {
        let builder = PromptBuilder::with_template("one two three {stories}");
        assert_eq!(builder.base_tokens(), 4);
    }
}

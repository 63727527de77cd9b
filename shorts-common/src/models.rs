//! Story and evaluation models
//!
//! An [`Item`] is one scraped story; an [`Evaluation`] is the scoring
//! result for exactly one item. Both are immutable once stored.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Lowest score a story can receive
pub const SCORE_MIN: i64 = 0;

/// Highest score a story can receive
pub const SCORE_MAX: i64 = 100;

/// Accepted length (in characters) of an item id echoed back by the scoring API
pub const ITEM_ID_LEN: RangeInclusive<usize> = 6..=10;

/// One scraped story awaiting or having received an evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Source-assigned id (Reddit base36 post id)
    pub id: String,
    /// Community the story came from, without the `r/` prefix
    pub community: String,
    /// Formatted story body
    pub content: String,
    /// Creation time, epoch seconds
    pub created_at: i64,
    /// Optional source classifier (link flair)
    pub tag: Option<String>,
}

impl Item {
    pub fn new(
        id: impl Into<String>,
        community: impl Into<String>,
        content: impl Into<String>,
        created_at: i64,
        tag: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            community: community.into(),
            content: content.into(),
            created_at,
            tag,
        }
    }

    /// Content length in characters, used to order batches
    pub fn content_len(&self) -> usize {
        self.content.chars().count()
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.created_at, 0).single()
    }
}

/// Scoring result for one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub item_id: String,
    /// Always within `SCORE_MIN..=SCORE_MAX`
    pub score: i64,
    pub category: Category,
    pub audience: Audience,
}

/// Story category (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Relationship,
    Workplace,
    Family,
    Revenge,
    Confession,
    Humor,
    Drama,
    Mystery,
    Lifestyle,
    Uncategorized,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Relationship,
        Category::Workplace,
        Category::Family,
        Category::Revenge,
        Category::Confession,
        Category::Humor,
        Category::Drama,
        Category::Mystery,
        Category::Lifestyle,
        Category::Uncategorized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Relationship => "relationship",
            Category::Workplace => "workplace",
            Category::Family => "family",
            Category::Revenge => "revenge",
            Category::Confession => "confession",
            Category::Humor => "humor",
            Category::Drama => "drama",
            Category::Mystery => "mystery",
            Category::Lifestyle => "lifestyle",
            Category::Uncategorized => "uncategorized",
        }
    }
}

impl FromStr for Category {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| crate::Error::InvalidInput(format!("unknown category: {}", s)))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target audience (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    General,
    YoungAdult,
    Mature,
    Teens,
}

impl Audience {
    pub const ALL: [Audience; 4] = [
        Audience::General,
        Audience::YoungAdult,
        Audience::Mature,
        Audience::Teens,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::General => "general",
            Audience::YoungAdult => "young_adult",
            Audience::Mature => "mature",
            Audience::Teens => "teens",
        }
    }
}

impl FromStr for Audience {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Audience::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| crate::Error::InvalidInput(format!("unknown audience: {}", s)))
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trips_through_str() {
        for c in Category::ALL {
            assert_eq!(c.as_str().parse::<Category>().unwrap(), c);
        }
        assert!("romance".parse::<Category>().is_err());
    }

    #[test]
    fn test_audience_serde_matches_as_str() {
        let json = serde_json::to_string(&Audience::YoungAdult).unwrap();
        assert_eq!(json, "\"young_adult\"");
        assert!("Young_Adult".parse::<Audience>().is_err());
    }

    #[test]
    fn test_content_len_counts_chars() {
        let item = Item::new("abc123", "tifu", "héllo", 0, None);
        assert_eq!(item.content_len(), 5);
        assert_eq!(item.created_at_utc().unwrap().timestamp(), 0);
    }
}

//! Core types for news items and categories.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a stored item (assigned by the store).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// The closed set of publishable categories. Names are case-sensitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Tech,
    Business,
    Health,
    Science,
    Entertainment,
    Sports,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Tech,
        Category::Business,
        Category::Health,
        Category::Science,
        Category::Entertainment,
        Category::Sports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tech => "Tech",
            Category::Business => "Business",
            Category::Health => "Health",
            Category::Science => "Science",
            Category::Entertainment => "Entertainment",
            Category::Sports => "Sports",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownCategory(s.to_string()))
    }
}

/// Label of the wildcard pseudo-category.
pub const ALL_TOPIC: &str = "all";

/// What a subscription or a backlog fetch is keyed on.
///
/// `All` matches every item. `Unknown` keeps labels outside the category set
/// so that subscribing to them is accepted but inert.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Topic {
    All,
    Category(Category),
    Unknown(String),
}

impl Topic {
    /// Parse a label. Never fails: unrecognized labels become `Unknown`.
    pub fn parse(label: &str) -> Self {
        if label == ALL_TOPIC {
            return Topic::All;
        }
        match label.parse::<Category>() {
            Ok(category) => Topic::Category(category),
            Err(_) => Topic::Unknown(label.to_string()),
        }
    }

    /// Whether an item of `category` falls under this topic.
    pub fn matches(&self, category: Category) -> bool {
        match self {
            Topic::All => true,
            Topic::Category(c) => *c == category,
            Topic::Unknown(_) => false,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Topic::All => ALL_TOPIC,
            Topic::Category(c) => c.as_str(),
            Topic::Unknown(s) => s,
        }
    }
}

impl From<Category> for Topic {
    fn from(category: Category) -> Self {
        Topic::Category(category)
    }
}

impl From<&str> for Topic {
    fn from(label: &str) -> Self {
        Topic::parse(label)
    }
}

impl From<String> for Topic {
    fn from(label: String) -> Self {
        Topic::parse(&label)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.label().to_string()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A stored news item. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: ItemId,
    pub title: String,
    pub content: String,
    pub category: Category,
    pub created_at: Timestamp,
}

/// A publish request as received from a client, not yet validated.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ItemDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
}

impl ItemDraft {
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            category: category.into(),
        }
    }

    /// Check the item rules and produce store input.
    ///
    /// Whitespace-only title or content counts as empty. The first broken
    /// rule is reported.
    pub fn validate(self) -> std::result::Result<ItemInput, ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.content.trim().is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        let category = self.category.parse::<Category>()?;

        Ok(ItemInput {
            title: self.title,
            content: self.content,
            category,
        })
    }
}

/// Validated input for creating an item (before id/timestamp assigned).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInput {
    pub title: String,
    pub content: String,
    pub category: Category,
}

impl ItemInput {
    /// Attach store-assigned identity.
    pub fn into_item(self, id: ItemId, created_at: Timestamp) -> NewsItem {
        NewsItem {
            id,
            title: self.title,
            content: self.content,
            category: self.category,
            created_at,
        }
    }
}

/// Newest-first order: later `created_at` first, ties broken by id descending.
pub fn newest_first(a: &NewsItem, b: &NewsItem) -> Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

/// Sort items newest first.
pub fn sort_newest_first(items: &mut [NewsItem]) {
    items.sort_by(newest_first);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_is_case_sensitive() {
        assert_eq!("Tech".parse::<Category>().unwrap(), Category::Tech);
        assert_eq!(
            "tech".parse::<Category>(),
            Err(ValidationError::UnknownCategory("tech".into()))
        );
    }

    #[test]
    fn test_topic_parse() {
        assert_eq!(Topic::parse("all"), Topic::All);
        assert_eq!(Topic::parse("Sports"), Topic::Category(Category::Sports));
        assert_eq!(Topic::parse("All"), Topic::Unknown("All".into()));
    }

    #[test]
    fn test_topic_matches() {
        assert!(Topic::All.matches(Category::Health));
        assert!(Topic::from(Category::Health).matches(Category::Health));
        assert!(!Topic::from(Category::Health).matches(Category::Tech));
        assert!(!Topic::parse("Weather").matches(Category::Tech));
    }

    #[test]
    fn test_topic_serializes_as_label() {
        let json = serde_json::to_string(&Topic::All).unwrap();
        assert_eq!(json, "\"all\"");
        let topic: Topic = serde_json::from_str("\"Science\"").unwrap();
        assert_eq!(topic, Topic::Category(Category::Science));
    }

    #[test]
    fn test_draft_validation() {
        let ok = ItemDraft::new("T1", "C1", "Tech").validate().unwrap();
        assert_eq!(ok.category, Category::Tech);

        assert_eq!(
            ItemDraft::new("", "C1", "Tech").validate(),
            Err(ValidationError::EmptyTitle)
        );
        assert_eq!(
            ItemDraft::new("T1", "   ", "Tech").validate(),
            Err(ValidationError::EmptyContent)
        );
        assert_eq!(
            ItemDraft::new("T1", "C1", "all").validate(),
            Err(ValidationError::UnknownCategory("all".into()))
        );
    }

    #[test]
    fn test_sort_newest_first() {
        let make = |id, ts| NewsItem {
            id: ItemId(id),
            title: "t".into(),
            content: "c".into(),
            category: Category::Tech,
            created_at: Timestamp(ts),
        };
        let mut items = vec![make(1, 10), make(2, 30), make(3, 30), make(4, 20)];
        sort_newest_first(&mut items);
        let ids: Vec<u64> = items.iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec![3, 2, 4, 1]);
    }
}

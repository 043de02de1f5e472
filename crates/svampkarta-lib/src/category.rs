//! Find categories: the fixed default set plus user-defined entries
//!
//! Categories are persisted as overrides against the default set
//! ([`CategoryOverrides`]) so that later changes to the defaults still reach
//! users who never touched them.

use crate::{MarkerStore, Result, SvampError};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;

/// Id of the catch-all category that orphaned markers move to
pub const UNKNOWN_CATEGORY_ID: &str = "unknown";

/// Emoji shown for markers whose category cannot be resolved
pub const PLACEHOLDER_EMOJI: &str = "❓";

/// Fixed color palette for categories
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CategoryColor {
    #[default]
    Green,
    Red,
    Blue,
    Gray,
    Purple,
    Brown,
    Orange,
}

/// Colors used when drawing a category's markers and list entries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorScheme {
    pub primary: &'static str,
    pub secondary: &'static str,
    pub accent: &'static str,
}

impl CategoryColor {
    pub fn all() -> &'static [Self] {
        &[
            Self::Green,
            Self::Red,
            Self::Blue,
            Self::Gray,
            Self::Purple,
            Self::Brown,
            Self::Orange,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Red => "red",
            Self::Blue => "blue",
            Self::Gray => "gray",
            Self::Purple => "purple",
            Self::Brown => "brown",
            Self::Orange => "orange",
        }
    }

    pub fn scheme(&self) -> ColorScheme {
        let (primary, secondary, accent) = match self {
            Self::Green => (
                "rgba(16, 185, 129, 0.85)",
                "rgba(236, 253, 245, 0.85)",
                "rgba(16, 185, 129, 0.15)",
            ),
            Self::Red => (
                "rgba(239, 68, 68, 0.85)",
                "rgba(254, 242, 242, 0.85)",
                "rgba(239, 68, 68, 0.15)",
            ),
            Self::Blue => (
                "rgba(59, 130, 246, 0.85)",
                "rgba(239, 246, 255, 0.85)",
                "rgba(59, 130, 246, 0.15)",
            ),
            Self::Gray => (
                "rgba(107, 114, 128, 0.85)",
                "rgba(249, 250, 251, 0.85)",
                "rgba(107, 114, 128, 0.15)",
            ),
            Self::Purple => (
                "rgba(147, 51, 234, 0.85)",
                "rgba(250, 245, 255, 0.85)",
                "rgba(147, 51, 234, 0.15)",
            ),
            Self::Brown => (
                "rgba(120, 53, 15, 0.85)",
                "rgba(252, 248, 227, 0.85)",
                "rgba(120, 53, 15, 0.15)",
            ),
            Self::Orange => (
                "rgba(249, 115, 22, 0.85)",
                "rgba(255, 247, 237, 0.85)",
                "rgba(249, 115, 22, 0.15)",
            ),
        };
        ColorScheme {
            primary,
            secondary,
            accent,
        }
    }
}

impl From<String> for CategoryColor {
    /// Unknown color names fall back to green
    fn from(name: String) -> Self {
        Self::all()
            .iter()
            .copied()
            .find(|c| c.name() == name)
            .unwrap_or_default()
    }
}

impl From<CategoryColor> for String {
    fn from(color: CategoryColor) -> Self {
        color.name().to_string()
    }
}

/// A find category
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub emoji: String,
    #[serde(default)]
    pub color: CategoryColor,
}

impl Category {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        emoji: impl Into<String>,
        color: CategoryColor,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            emoji: emoji.into(),
            color,
        }
    }

    /// Stand-in for a category id that does not resolve
    pub fn placeholder(id: &str) -> Self {
        Self::new(id, id, PLACEHOLDER_EMOJI, CategoryColor::Gray)
    }
}

/// Derive a category id from its display name
///
/// Lowercases, folds `å`/`ä` to `a` and `ö` to `o`, then drops everything
/// outside `[a-z0-9]`.
pub fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter_map(|c| match c {
            'å' | 'ä' => Some('a'),
            'ö' => Some('o'),
            'a'..='z' | '0'..='9' => Some(c),
            _ => None,
        })
        .collect()
}

/// Persisted form: changes relative to the default set
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryOverrides {
    /// Categories that are new or differ from their default
    #[serde(default)]
    pub custom_categories: Vec<Category>,
    /// Ids of default categories the user removed
    #[serde(default)]
    pub removed_defaults: Vec<String>,
}

/// Accepts both the current and the legacy (bare array) storage format
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCategories {
    Legacy(Vec<Category>),
    Overrides(CategoryOverrides),
}

/// The active list of categories, in display order
#[derive(Clone, Debug, PartialEq)]
pub struct CategorySet {
    categories: Vec<Category>,
}

impl Default for CategorySet {
    fn default() -> Self {
        Self {
            categories: Self::defaults(),
        }
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl CategorySet {
    /// The built-in categories
    pub fn defaults() -> Vec<Category> {
        vec![
            Category::new(UNKNOWN_CATEGORY_ID, "Allmänt", "⭐", CategoryColor::Gray),
            Category::new("mushroom", "Svamp", "🍄‍🟫", CategoryColor::Green),
            Category::new("berries", "Bär", "🍓", CategoryColor::Purple),
        ]
    }

    fn is_default_id(id: &str) -> bool {
        Self::defaults().iter().any(|d| d.id == id)
    }

    /// Rebuild the set from stored overrides
    ///
    /// Defaults come first (minus removed ones); custom entries replace a
    /// default with the same id in place or are appended.
    pub fn from_overrides(overrides: &CategoryOverrides) -> Self {
        let mut set = Self {
            categories: Self::defaults()
                .into_iter()
                .filter(|d| !overrides.removed_defaults.contains(&d.id))
                .collect(),
        };
        for custom in &overrides.custom_categories {
            set.upsert(custom.clone());
        }
        set
    }

    /// Parse the stored JSON, accepting the legacy array format
    pub fn from_json(json: &str) -> Result<Self> {
        let stored: StoredCategories = serde_json::from_str(json)?;
        Ok(match stored {
            StoredCategories::Legacy(custom) => Self::from_overrides(&CategoryOverrides {
                custom_categories: custom,
                removed_defaults: Vec::new(),
            }),
            StoredCategories::Overrides(overrides) => Self::from_overrides(&overrides),
        })
    }

    /// Compute what needs persisting relative to the defaults
    pub fn to_overrides(&self) -> CategoryOverrides {
        let defaults = Self::defaults();
        let custom_categories = self
            .categories
            .iter()
            .filter(|c| !defaults.contains(c))
            .cloned()
            .collect();
        let removed_defaults = defaults
            .iter()
            .filter(|d| self.get(&d.id).is_none())
            .map(|d| d.id.clone())
            .collect();
        CategoryOverrides {
            custom_categories,
            removed_defaults,
        }
    }

    #[inline]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn get(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Look up a category, falling back to a placeholder for unknown ids
    pub fn resolve(&self, id: &str) -> Cow<'_, Category> {
        match self.get(id) {
            Some(category) => Cow::Borrowed(category),
            None => {
                tracing::trace!("Category '{}' not found, using placeholder", id);
                Cow::Owned(Category::placeholder(id))
            }
        }
    }

    /// Add a user-defined category, deriving its id from the name
    pub fn add(&mut self, name: &str, emoji: &str) -> Result<&Category> {
        let name = name.trim();
        let id = slug(name);
        if name.is_empty() || id.is_empty() {
            return Err(SvampError::EmptyCategoryName);
        }
        if self.contains(&id) {
            return Err(SvampError::DuplicateCategory(id));
        }
        tracing::info!("Adding category '{}' ({})", name, id);
        self.categories
            .push(Category::new(id, name, emoji, CategoryColor::Green));
        Ok(&self.categories[self.categories.len() - 1])
    }

    /// Rename a category or change its emoji; the id stays the same
    pub fn edit(&mut self, id: &str, name: &str, emoji: &str) -> Result<&Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SvampError::EmptyCategoryName);
        }
        let category = self
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SvampError::UnknownCategory(id.to_string()))?;
        category.name = name.to_string();
        category.emoji = emoji.to_string();
        Ok(&*category)
    }

    /// Remove a category and move its markers to the catch-all category
    ///
    /// Default categories may be removed too. Returns the removed category and
    /// how many markers were reassigned.
    pub fn remove(&mut self, id: &str, markers: &mut MarkerStore) -> Result<(Category, usize)> {
        let index = self
            .categories
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| SvampError::UnknownCategory(id.to_string()))?;
        let removed = self.categories.remove(index);
        let moved = markers.reassign_category(id, UNKNOWN_CATEGORY_ID);
        tracing::info!(
            "Removed category '{}' (default: {}), {} markers moved to '{}'",
            id,
            Self::is_default_id(id),
            moved,
            UNKNOWN_CATEGORY_ID
        );
        Ok((removed, moved))
    }

    /// Insert or replace by id, returning true when an existing entry was replaced
    pub fn upsert(&mut self, category: Category) -> bool {
        match self.categories.iter_mut().find(|c| c.id == category.id) {
            Some(existing) => {
                *existing = category;
                true
            }
            None => {
                self.categories.push(category);
                false
            }
        }
    }

    /// Point markers with unresolvable categories at the catch-all category
    ///
    /// Returns the number of markers changed.
    pub fn repair_markers(&self, markers: &mut MarkerStore) -> usize {
        let orphaned: BTreeSet<String> = markers
            .markers()
            .iter()
            .filter(|m| !self.contains(&m.category))
            .map(|m| m.category.clone())
            .collect();
        orphaned
            .iter()
            .filter(|id| id.as_str() != UNKNOWN_CATEGORY_ID)
            .map(|id| markers.reassign_category(id, UNKNOWN_CATEGORY_ID))
            .sum()
    }
}

//! Which markers reach the clustering pass

use crate::Marker;
use std::collections::HashSet;

/// Visibility rules applied before clustering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerFilter {
    /// Categories shown on the map; `None` shows every category
    pub visible_categories: Option<HashSet<String>>,
    /// Marker whose popup is open; always kept so the popup has an anchor
    pub selected: Option<u64>,
    /// Marker being walked to; when set, nothing else is shown
    pub walking_target: Option<u64>,
}

impl MarkerFilter {
    /// Show only the given categories
    pub fn with_categories<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            visible_categories: Some(categories.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn is_visible(&self, marker: &Marker) -> bool {
        if let Some(target) = self.walking_target {
            return marker.id == target;
        }
        if self.selected == Some(marker.id) {
            return true;
        }
        self.visible_categories
            .as_ref()
            .is_none_or(|visible| visible.contains(&marker.category))
    }

    /// Visible markers, in input order
    pub fn apply<'a>(&self, markers: &'a [Marker]) -> Vec<&'a Marker> {
        markers.iter().filter(|m| self.is_visible(m)).collect()
    }
}

//! Feed query parameters.
//!
//! [`FilterState`] is an immutable value: every change produces a new state
//! through [`FilterState::apply`], which always resets `page` to 1. Only the
//! feed engine holds the authoritative copy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of posts per page
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// A filter value that could not be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseFilterError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

/// Feed ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortKey {
    #[default]
    Recent,
    Top,
    Random,
}

impl SortKey {
    pub const ALL: [SortKey; 3] = [SortKey::Recent, SortKey::Top, SortKey::Random];

    /// Value sent to the feed data source
    pub fn as_query(&self) -> &'static str {
        match self {
            SortKey::Recent => "rec",
            SortKey::Top => "top",
            SortKey::Random => "rand",
        }
    }

    /// Title shown above the feed
    pub fn label(&self) -> &'static str {
        match self {
            SortKey::Recent => "Recent posts",
            SortKey::Top => "Top posts",
            SortKey::Random => "Random posts",
        }
    }
}

impl FromStr for SortKey {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "recent" | "rec" => Ok(SortKey::Recent),
            "top" => Ok(SortKey::Top),
            "random" | "rand" => Ok(SortKey::Random),
            _ => Err(ParseFilterError {
                kind: "sort key",
                value: s.to_string(),
                expected: "recent, top, random",
            }),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_query(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            _ => Err(ParseFilterError {
                kind: "sort direction",
                value: s.to_string(),
                expected: "asc, desc",
            }),
        }
    }
}

/// Recency window. `None` in a [`FilterState`] means all time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SinceWindow {
    LastHour,
    Last6Hours,
    Last24Hours,
    Last7Days,
}

impl SinceWindow {
    pub const ALL: [SinceWindow; 4] = [
        SinceWindow::LastHour,
        SinceWindow::Last6Hours,
        SinceWindow::Last24Hours,
        SinceWindow::Last7Days,
    ];

    pub fn as_query(&self) -> &'static str {
        match self {
            SinceWindow::LastHour => "1h",
            SinceWindow::Last6Hours => "6h",
            SinceWindow::Last24Hours => "24h",
            SinceWindow::Last7Days => "7d",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SinceWindow::LastHour => "Last 1h",
            SinceWindow::Last6Hours => "Last 6h",
            SinceWindow::Last24Hours => "Last 24h",
            SinceWindow::Last7Days => "Last 7d",
        }
    }

    /// Label for an optional window, `None` being all time
    pub fn label_for(window: Option<SinceWindow>) -> &'static str {
        window.map_or("All time", |w| w.label())
    }
}

impl FromStr for SinceWindow {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1h" => Ok(SinceWindow::LastHour),
            "6h" => Ok(SinceWindow::Last6Hours),
            "24h" => Ok(SinceWindow::Last24Hours),
            "7d" => Ok(SinceWindow::Last7Days),
            _ => Err(ParseFilterError {
                kind: "time window",
                value: s.to_string(),
                expected: "1h, 6h, 24h, 7d",
            }),
        }
    }
}

/// Current feed query parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    page: u32,
    page_size: u32,
    sort_key: SortKey,
    sort_direction: SortDirection,
    since_window: Option<SinceWindow>,
    topic_filter: Option<String>,
    author_filter: Option<String>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl FilterState {
    /// First page, most recent first, no filters.
    pub fn new(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            sort_key: SortKey::default(),
            sort_direction: SortDirection::default(),
            since_window: None,
            topic_filter: None,
            author_filter: None,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.sort_direction
    }

    pub fn since_window(&self) -> Option<SinceWindow> {
        self.since_window
    }

    pub fn topic_filter(&self) -> Option<&str> {
        self.topic_filter.as_deref()
    }

    pub fn author_filter(&self) -> Option<&str> {
        self.author_filter.as_deref()
    }

    /// New state with `update` merged in and `page` reset to 1.
    pub fn apply(&self, update: &FilterUpdate) -> FilterState {
        FilterState {
            page: 1,
            page_size: update.page_size.unwrap_or(self.page_size).max(1),
            sort_key: update.sort_key.unwrap_or(self.sort_key),
            sort_direction: update.sort_direction.unwrap_or(self.sort_direction),
            since_window: update.since_window.unwrap_or(self.since_window),
            topic_filter: update
                .topic_filter
                .clone()
                .unwrap_or_else(|| self.topic_filter.clone()),
            author_filter: update
                .author_filter
                .clone()
                .unwrap_or_else(|| self.author_filter.clone()),
        }
    }

    /// Same query, different page.
    pub(crate) fn with_page(&self, page: u32) -> FilterState {
        FilterState {
            page: page.max(1),
            ..self.clone()
        }
    }

    /// Query parameters for the feed data source. Unset filters are omitted.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.to_string()),
            ("limit", self.page_size.to_string()),
            ("sort", self.sort_key.as_query().to_string()),
            ("order", self.sort_direction.as_query().to_string()),
        ];
        if let Some(since) = self.since_window {
            pairs.push(("since", since.as_query().to_string()));
        }
        if let Some(topic) = &self.topic_filter {
            pairs.push(("topic", topic.clone()));
        }
        if let Some(author) = &self.author_filter {
            pairs.push(("author", author.clone()));
        }
        pairs
    }
}

/// Partial update for [`FilterState`].
///
/// `None` leaves a field untouched. The nullable fields use a nested
/// `Option` so they can be explicitly reset: `since(None)` means all time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterUpdate {
    pub page_size: Option<u32>,
    pub sort_key: Option<SortKey>,
    pub sort_direction: Option<SortDirection>,
    pub since_window: Option<Option<SinceWindow>>,
    pub topic_filter: Option<Option<String>>,
    pub author_filter: Option<Option<String>>,
}

impl FilterUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort_key = Some(key);
        self
    }

    pub fn direction(mut self, direction: SortDirection) -> Self {
        self.sort_direction = Some(direction);
        self
    }

    pub fn since(mut self, window: Option<SinceWindow>) -> Self {
        self.since_window = Some(window);
        self
    }

    pub fn topic(mut self, topic: Option<impl Into<String>>) -> Self {
        self.topic_filter = Some(topic.map(Into::into));
        self
    }

    pub fn author(mut self, author: Option<impl Into<String>>) -> Self {
        self.author_filter = Some(author.map(Into::into));
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == FilterUpdate::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        let filter = FilterState::default();
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(filter.sort_key(), SortKey::Recent);
        assert_eq!(filter.sort_direction(), SortDirection::Desc);
        assert_eq!(filter.since_window(), None);
    }

    #[test]
    fn test_apply_resets_page_and_keeps_other_fields() {
        let filter = FilterState::default()
            .apply(&FilterUpdate::new().sort(SortKey::Top).topic(Some("art")))
            .with_page(4);
        assert_eq!(filter.page(), 4);

        let next = filter.apply(&FilterUpdate::new().since(Some(SinceWindow::Last24Hours)));
        assert_eq!(next.page(), 1);
        assert_eq!(next.sort_key(), SortKey::Top);
        assert_eq!(next.topic_filter(), Some("art"));
        assert_eq!(next.since_window(), Some(SinceWindow::Last24Hours));

        // The original value is untouched
        assert_eq!(filter.page(), 4);
        assert_eq!(filter.since_window(), None);
    }

    #[test]
    fn test_apply_can_clear_nullable_fields() {
        let filter = FilterState::default().apply(
            &FilterUpdate::new()
                .since(Some(SinceWindow::LastHour))
                .author(Some("0xabc")),
        );
        let cleared = filter.apply(&FilterUpdate::new().since(None).author(None::<String>));
        assert_eq!(cleared.since_window(), None);
        assert_eq!(cleared.author_filter(), None);
    }

    #[test]
    fn test_page_size_never_zero() {
        assert_eq!(FilterState::new(0).page_size(), 1);
        let filter = FilterState::default().apply(&FilterUpdate::new().page_size(0));
        assert_eq!(filter.page_size(), 1);
    }

    #[test]
    fn test_query_pairs_omit_unset_filters() {
        let pairs = FilterState::default().query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("page", "1".to_string()),
                ("limit", "10".to_string()),
                ("sort", "rec".to_string()),
                ("order", "desc".to_string()),
            ]
        );

        let filtered = FilterState::default().apply(
            &FilterUpdate::new()
                .sort(SortKey::Random)
                .direction(SortDirection::Asc)
                .since(Some(SinceWindow::Last7Days))
                .topic(Some("music"))
                .author(Some("0xdef")),
        );
        let pairs = filtered.query_pairs();
        assert!(pairs.contains(&("sort", "rand".to_string())));
        assert!(pairs.contains(&("order", "asc".to_string())));
        assert!(pairs.contains(&("since", "7d".to_string())));
        assert!(pairs.contains(&("topic", "music".to_string())));
        assert!(pairs.contains(&("author", "0xdef".to_string())));
    }

    #[test]
    fn test_sort_labels_cover_every_key() {
        let labels: Vec<&str> = SortKey::ALL.iter().map(|k| k.label()).collect();
        assert_eq!(labels, vec!["Recent posts", "Top posts", "Random posts"]);
    }

    #[test]
    fn test_since_labels() {
        assert_eq!(SinceWindow::label_for(None), "All time");
        assert_eq!(SinceWindow::label_for(Some(SinceWindow::Last6Hours)), "Last 6h");
    }

    #[test]
    fn test_parse_filter_values() {
        assert_eq!("top".parse::<SortKey>().unwrap(), SortKey::Top);
        assert_eq!("REC".parse::<SortKey>().unwrap(), SortKey::Recent);
        assert_eq!("asc".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert_eq!("24h".parse::<SinceWindow>().unwrap(), SinceWindow::Last24Hours);

        let err = "hot".parse::<SortKey>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown sort key 'hot' (expected one of: recent, top, random)"
        );
    }

    #[test]
    fn test_empty_update() {
        assert!(FilterUpdate::new().is_empty());
        assert!(!FilterUpdate::new().sort(SortKey::Recent).is_empty());
    }
}

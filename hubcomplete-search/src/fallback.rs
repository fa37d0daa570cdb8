//! Static canned results for popular queries.
//!
//! Consulted only when the quota is exhausted or a live search failed, so the
//! dropdown still shows something useful for the most common lookups.

use std::collections::BTreeMap;

use crate::types::{ResultItem, ResultKind};

/// Canned results keyed by lowercase query.
#[derive(Debug, Clone)]
pub struct FallbackCatalog {
    entries: BTreeMap<String, Vec<ResultItem>>,
}

impl Default for FallbackCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FallbackCatalog {
    /// Build a catalog from custom entries. Keys are lowercased.
    pub fn new<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<ResultItem>)>,
        K: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.as_ref().trim().to_lowercase(), v))
                .collect(),
        }
    }

    /// A catalog with no entries.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// The built-in catalog covering `react` and `javascript`.
    pub fn builtin() -> Self {
        Self::new([
            (
                "react",
                vec![
                    repo(
                        10270250,
                        "react",
                        "https://github.com/facebook/react",
                        69631,
                        "A declarative, efficient, and flexible JavaScript library for building user interfaces.",
                    ),
                    repo(
                        70107786,
                        "react-native",
                        "https://github.com/facebook/react-native",
                        69631,
                        "A framework for building native applications using React.",
                    ),
                    user(1566403, "react"),
                ],
            ),
            (
                "javascript",
                vec![
                    repo(
                        1062897,
                        "javascript",
                        "https://github.com/airbnb/javascript",
                        698437,
                        "JavaScript Style Guide",
                    ),
                    user(1700322, "javascript"),
                ],
            ),
        ])
    }

    /// Canned results for `query`.
    ///
    /// Exact key match first, then the first key (in sorted order) that is
    /// contained in the query or contains it. Empty when nothing matches.
    pub fn get(&self, query: &str) -> Vec<ResultItem> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        if let Some(items) = self.entries.get(&needle) {
            return items.clone();
        }
        self.entries
            .iter()
            .find(|(key, _)| needle.contains(key.as_str()) || key.contains(&needle))
            .map(|(_, items)| items.clone())
            .unwrap_or_default()
    }

    /// Number of catalog keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn avatar(id: u64) -> String {
    format!("https://avatars.githubusercontent.com/u/{id}?v=4")
}

fn repo(id: u64, name: &str, url: &str, owner_id: u64, description: &str) -> ResultItem {
    ResultItem {
        id: format!("{}-{id}", ResultKind::Repository.id_prefix()),
        name: name.to_owned(),
        kind: ResultKind::Repository,
        url: url.to_owned(),
        avatar_url: avatar(owner_id),
        description: Some(description.to_owned()),
    }
}

fn user(id: u64, login: &str) -> ResultItem {
    ResultItem {
        id: format!("{}-{id}", ResultKind::User.id_prefix()),
        name: login.to_owned(),
        kind: ResultKind::User,
        url: format!("https://github.com/{login}"),
        avatar_url: avatar(id),
        description: None,
    }
}

//! Result items and GitHub search API wire types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a result points at a user or a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// A GitHub account (user or organisation).
    User,
    /// A GitHub repository.
    Repository,
}

impl ResultKind {
    /// Prefix used for result ids of this kind.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Repository => "repo",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Repository => f.write_str("repository"),
        }
    }
}

/// A single autocomplete entry, either a user or a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultItem {
    /// Stable id, `repo-<id>` or `user-<id>`.
    pub id: String,
    /// Login for users, repository name for repositories.
    pub name: String,
    /// Which kind of entity this is.
    #[serde(rename = "type")]
    pub kind: ResultKind,
    /// Browser URL of the entity.
    pub url: String,
    /// Avatar of the user, or of the repository owner.
    pub avatar_url: String,
    /// Repository description. Always `None` for users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ResultItem {
    /// Build a user entry from a search hit or repository owner.
    pub fn from_user(user: &UserHit) -> Self {
        Self {
            id: format!("{}-{}", ResultKind::User.id_prefix(), user.id),
            name: user.login.clone(),
            kind: ResultKind::User,
            url: user.html_url.clone(),
            avatar_url: user.avatar_url.clone(),
            description: None,
        }
    }

    /// Build a repository entry from a search hit.
    pub fn from_repository(repo: &RepositoryHit) -> Self {
        Self {
            id: format!("{}-{}", ResultKind::Repository.id_prefix(), repo.id),
            name: repo.name.clone(),
            kind: ResultKind::Repository,
            url: repo.html_url.clone(),
            avatar_url: repo.owner.avatar_url.clone(),
            description: repo.description.clone(),
        }
    }
}

/// Envelope shared by both search endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchPage<T> {
    /// Total hits known to the provider (not the page size).
    pub total_count: u64,
    /// Whether the provider timed out before collecting all hits.
    #[serde(default)]
    pub incomplete_results: bool,
    /// Hits on this page.
    pub items: Vec<T>,
}

/// A user hit from `/search/users`, also used for repository owners.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserHit {
    pub id: u64,
    pub login: String,
    pub html_url: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// A repository hit from `/search/repositories`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepositoryHit {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    pub owner: UserHit,
}

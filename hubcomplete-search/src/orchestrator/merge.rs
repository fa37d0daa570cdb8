//! Merging repository and user hits into one result list.
//!
//! Order is repositories (provider order), then repository owners in
//! first-seen order, then direct user hits whose login was not already seen.
//! Logins are compared exactly, as the provider returns them.

use std::collections::HashSet;

use crate::types::{RepositoryHit, ResultItem, UserHit};

/// Merge `repos` and `users` and truncate to `max_results`.
pub fn merge_results(
    repos: &[RepositoryHit],
    users: &[UserHit],
    max_results: usize,
) -> Vec<ResultItem> {
    let mut merged: Vec<ResultItem> = repos.iter().map(ResultItem::from_repository).collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let owners = repos.iter().map(|repo| &repo.owner);
    for user in owners.chain(users.iter()) {
        if merged.len() >= max_results {
            break;
        }
        if seen.insert(user.login.as_str()) {
            merged.push(ResultItem::from_user(user));
        }
    }

    merged.truncate(max_results);
    merged
}

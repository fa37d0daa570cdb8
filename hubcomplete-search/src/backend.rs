//! Trait definition for the remote search backend.
//!
//! [`crate::http::GitHubClient`] is the production implementation. The
//! orchestrator is generic over [`SearchBackend`] so tests can substitute an
//! in-process fake.

use crate::error::SearchError;
use crate::types::{RepositoryHit, SearchPage, UserHit};

/// The two search endpoints the orchestrator composes.
///
/// Implementations are responsible for recording quota information on the
/// shared [`crate::rate_limit::RateLimitTracker`] after every completed call.
///
/// All implementations must be `Send + Sync` so both searches can be polled
/// concurrently.
pub trait SearchBackend: Send + Sync {
    /// Search repositories, most-starred first.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Network`] if no response arrived,
    /// [`SearchError::Remote`] for a non-2xx answer, and
    /// [`SearchError::Parse`] if the body could not be decoded.
    fn search_repositories(
        &self,
        query: &str,
    ) -> impl std::future::Future<Output = Result<SearchPage<RepositoryHit>, SearchError>> + Send;

    /// Search users and organisations.
    ///
    /// # Errors
    ///
    /// Same as [`SearchBackend::search_repositories`].
    fn search_users(
        &self,
        query: &str,
    ) -> impl std::future::Future<Output = Result<SearchPage<UserHit>, SearchError>> + Send;

    /// Attach (or clear) the bearer credential for subsequent requests.
    fn set_credential(&self, _credential: Option<String>) {}
}

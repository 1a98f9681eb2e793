pub mod document;

pub use document::DocumentStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::analysis::normalize::ReviewPayload;
use crate::domain::{AiReview, PrState, PullRequest, Repository};

/// Listing queries never return more than this many documents.
pub const LIST_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Failed to access store file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode or decode store file: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: &str) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    #[cfg(test)]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// A normalized review plus run metadata, before the store assigns its id
/// and timestamps. The review body only comes from the normalizer, so a
/// stored score is always within range.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub pull_request_id: String,
    pub payload: ReviewPayload,
    pub ai_model: String,
    pub tokens_used: Option<u32>,
    pub analysis_version: String,
}

/// Document persistence. Every read takes the caller's user id and treats a
/// document owned by someone else as missing. Writes are last-writer-wins.
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_repository(&self, user_id: &str, id: &str) -> Result<Repository, StoreError>;

    /// Active repositories only, most recently synced first.
    async fn list_repositories(&self, user_id: &str) -> Result<Vec<Repository>, StoreError>;

    /// Insert, or overwrite the mirrored fields of the document with the same
    /// (user, upstream id). The stored id and creation time are kept.
    async fn upsert_repository(&self, repo: Repository) -> Result<Repository, StoreError>;

    async fn set_repository_active(
        &self,
        user_id: &str,
        id: &str,
        active: bool,
    ) -> Result<Repository, StoreError>;

    async fn load_pull_request(&self, user_id: &str, id: &str) -> Result<PullRequest, StoreError>;

    /// Replace an existing pull request document.
    async fn save_pull_request(&self, pr: PullRequest) -> Result<PullRequest, StoreError>;

    /// Insert, or overwrite the document with the same (repository, number).
    /// The stored id and counters are kept.
    async fn upsert_pull_request(&self, pr: PullRequest) -> Result<PullRequest, StoreError>;

    /// Newest first, at most [`LIST_LIMIT`].
    async fn list_pull_requests(
        &self,
        user_id: &str,
        repository_id: &str,
        state: Option<PrState>,
    ) -> Result<Vec<PullRequest>, StoreError>;

    /// Append a review. Existing reviews are never touched.
    async fn create_review(&self, user_id: &str, review: NewReview) -> Result<AiReview, StoreError>;

    /// Newest first.
    async fn reviews_for(&self, user_id: &str, pull_request_id: &str) -> Result<Vec<AiReview>, StoreError>;

    async fn latest_review(
        &self,
        user_id: &str,
        pull_request_id: &str,
    ) -> Result<Option<AiReview>, StoreError> {
        Ok(self.reviews_for(user_id, pull_request_id).await?.into_iter().next())
    }
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{NewReview, Store, StoreError, LIST_LIMIT};
use crate::domain::{new_id, AiReview, PrState, PullRequest, Repository};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Documents {
    #[serde(default)]
    repositories: Vec<Repository>,
    #[serde(default)]
    pull_requests: Vec<PullRequest>,
    #[serde(default)]
    reviews: Vec<AiReview>,
}

/// In-memory document store, optionally mirrored to a JSON file.
///
/// With a path, the whole document set is rewritten after every mutation
/// while the write lock is held.
pub struct DocumentStore {
    docs: RwLock<Documents>,
    path: Option<PathBuf>,
}

impl DocumentStore {
    pub fn in_memory() -> Self {
        Self {
            docs: RwLock::new(Documents::default()),
            path: None,
        }
    }

    /// Open a file-backed store, starting empty if the file does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let docs = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Documents::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "opened document store");
        Ok(Self {
            docs: RwLock::new(docs),
            path: Some(path),
        })
    }

    async fn persist(&self, docs: &Documents) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(docs)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for DocumentStore {
    async fn load_repository(&self, user_id: &str, id: &str) -> Result<Repository, StoreError> {
        let docs = self.docs.read().await;
        docs.repositories
            .iter()
            .find(|r| r.id == id && r.user_id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("repository", id))
    }

    async fn list_repositories(&self, user_id: &str) -> Result<Vec<Repository>, StoreError> {
        let docs = self.docs.read().await;
        let mut repos: Vec<Repository> = docs
            .repositories
            .iter()
            .filter(|r| r.user_id == user_id && r.is_active)
            .cloned()
            .collect();
        repos.sort_by(|a, b| b.last_synced_at.cmp(&a.last_synced_at));
        Ok(repos)
    }

    #[instrument(skip(self, repo), fields(full_name = %repo.full_name))]
    async fn upsert_repository(&self, mut repo: Repository) -> Result<Repository, StoreError> {
        let mut docs = self.docs.write().await;
        let now = Utc::now();
        repo.updated_at = now;
        let position = docs
            .repositories
            .iter()
            .position(|r| r.user_id == repo.user_id && r.github_id == repo.github_id);
        match position {
            Some(idx) => {
                let existing = &docs.repositories[idx];
                repo.id = existing.id.clone();
                repo.created_at = existing.created_at;
                repo.is_active = existing.is_active;
                let previous = std::mem::replace(&mut docs.repositories[idx], repo.clone());
                if let Err(e) = self.persist(&docs).await {
                    docs.repositories[idx] = previous;
                    return Err(e);
                }
                debug!(id = %repo.id, "updated repository");
            }
            None => {
                repo.created_at = now;
                docs.repositories.push(repo.clone());
                if let Err(e) = self.persist(&docs).await {
                    docs.repositories.pop();
                    return Err(e);
                }
                debug!(id = %repo.id, "inserted repository");
            }
        }
        Ok(repo)
    }

    async fn set_repository_active(
        &self,
        user_id: &str,
        id: &str,
        active: bool,
    ) -> Result<Repository, StoreError> {
        let mut docs = self.docs.write().await;
        let idx = docs
            .repositories
            .iter()
            .position(|r| r.id == id && r.user_id == user_id)
            .ok_or_else(|| StoreError::not_found("repository", id))?;
        let mut repo = docs.repositories[idx].clone();
        repo.is_active = active;
        repo.updated_at = Utc::now();
        let previous = std::mem::replace(&mut docs.repositories[idx], repo.clone());
        if let Err(e) = self.persist(&docs).await {
            docs.repositories[idx] = previous;
            return Err(e);
        }
        Ok(repo)
    }

    async fn load_pull_request(&self, user_id: &str, id: &str) -> Result<PullRequest, StoreError> {
        let docs = self.docs.read().await;
        docs.pull_requests
            .iter()
            .find(|pr| pr.id == id && pr.user_id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("pull request", id))
    }

    #[instrument(skip(self, pr), fields(id = %pr.id))]
    async fn save_pull_request(&self, mut pr: PullRequest) -> Result<PullRequest, StoreError> {
        let mut docs = self.docs.write().await;
        let idx = docs
            .pull_requests
            .iter()
            .position(|p| p.id == pr.id && p.user_id == pr.user_id)
            .ok_or_else(|| StoreError::not_found("pull request", &pr.id))?;
        pr.updated_at = Utc::now();
        let previous = std::mem::replace(&mut docs.pull_requests[idx], pr.clone());
        if let Err(e) = self.persist(&docs).await {
            docs.pull_requests[idx] = previous;
            return Err(e);
        }
        Ok(pr)
    }

    #[instrument(skip(self, pr), fields(number = pr.number))]
    async fn upsert_pull_request(&self, mut pr: PullRequest) -> Result<PullRequest, StoreError> {
        let mut docs = self.docs.write().await;
        let position = docs
            .pull_requests
            .iter()
            .position(|p| p.repository_id == pr.repository_id && p.number == pr.number);
        match position {
            Some(idx) => {
                let existing = &docs.pull_requests[idx];
                pr.id = existing.id.clone();
                pr.counters = existing.counters;
                let previous = std::mem::replace(&mut docs.pull_requests[idx], pr.clone());
                if let Err(e) = self.persist(&docs).await {
                    docs.pull_requests[idx] = previous;
                    return Err(e);
                }
                debug!(id = %pr.id, "updated pull request");
            }
            None => {
                docs.pull_requests.push(pr.clone());
                if let Err(e) = self.persist(&docs).await {
                    docs.pull_requests.pop();
                    return Err(e);
                }
                debug!(id = %pr.id, "inserted pull request");
            }
        }
        Ok(pr)
    }

    async fn list_pull_requests(
        &self,
        user_id: &str,
        repository_id: &str,
        state: Option<PrState>,
    ) -> Result<Vec<PullRequest>, StoreError> {
        let docs = self.docs.read().await;
        let mut pulls: Vec<PullRequest> = docs
            .pull_requests
            .iter()
            .filter(|pr| pr.user_id == user_id && pr.repository_id == repository_id)
            .filter(|pr| state.map_or(true, |s| pr.state == s))
            .cloned()
            .collect();
        pulls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        pulls.truncate(LIST_LIMIT);
        Ok(pulls)
    }

    #[instrument(skip(self, review), fields(pull_request_id = %review.pull_request_id))]
    async fn create_review(&self, user_id: &str, review: NewReview) -> Result<AiReview, StoreError> {
        let mut docs = self.docs.write().await;
        if !docs
            .pull_requests
            .iter()
            .any(|pr| pr.id == review.pull_request_id && pr.user_id == user_id)
        {
            return Err(StoreError::not_found("pull request", &review.pull_request_id));
        }

        let now = Utc::now();
        let payload = &review.payload;
        let record = AiReview {
            id: new_id(),
            pull_request_id: review.pull_request_id.clone(),
            user_id: user_id.to_string(),
            summary: payload.summary().to_string(),
            risk_score: payload.risk_score(),
            risk_explanation: payload.risk_explanation().to_string(),
            inline_comments: payload.inline_comments().to_vec(),
            suggested_tests: payload.suggested_tests().to_vec(),
            files_analyzed: payload.files_analyzed().to_vec(),
            ai_model: review.ai_model,
            tokens_used: review.tokens_used,
            analysis_version: review.analysis_version,
            created_at: now,
            updated_at: now,
        };
        docs.reviews.push(record.clone());
        if let Err(e) = self.persist(&docs).await {
            docs.reviews.pop();
            return Err(e);
        }
        debug!(id = %record.id, "created review");
        Ok(record)
    }

    async fn reviews_for(&self, user_id: &str, pull_request_id: &str) -> Result<Vec<AiReview>, StoreError> {
        let docs = self.docs.read().await;
        // Reverse first so equal timestamps keep newest-inserted first.
        let mut reviews: Vec<AiReview> = docs
            .reviews
            .iter()
            .rev()
            .filter(|r| r.pull_request_id == pull_request_id && r.user_id == user_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }
}

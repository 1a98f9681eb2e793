//! Registers a single upstream pull request (and its repository) in the
//! store so it can be analyzed.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument};

use crate::domain::{new_id, Author, PrCounters, PrState, PullRequest, Repository};
use crate::github::{GitHubPullRequest, GitHubRepo, PrUrl, RemoteFetchError, SourceControl};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum TrackError {
    #[error(transparent)]
    RemoteFetch(#[from] RemoteFetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Map an upstream repository onto a document owned by `user_id`.
pub fn repository_from_upstream(user_id: &str, repo: GitHubRepo) -> Repository {
    let now = Utc::now();
    Repository {
        id: new_id(),
        user_id: user_id.to_string(),
        github_id: repo.id,
        name: repo.name,
        full_name: repo.full_name,
        owner: repo.owner.login,
        description: repo.description,
        is_private: repo.private,
        url: repo.html_url,
        default_branch: repo.default_branch,
        language: repo.language,
        stars: repo.stargazers_count,
        forks: repo.forks_count,
        is_active: true,
        last_synced_at: Some(now),
        created_at: now,
        updated_at: now,
    }
}

/// Map an upstream pull request onto a document in `repository`.
pub fn pull_request_from_upstream(repository: &Repository, pr: GitHubPullRequest) -> PullRequest {
    PullRequest {
        id: new_id(),
        user_id: repository.user_id.clone(),
        repository_id: repository.id.clone(),
        github_id: pr.id,
        number: pr.number,
        title: pr.title,
        description: pr.body.filter(|b| !b.is_empty()),
        state: PrState::from_upstream(&pr.state, pr.merged_at.is_some()),
        author: Author {
            username: pr.user.login,
            avatar_url: pr.user.avatar_url,
        },
        base_branch: pr.base.name,
        head_branch: pr.head.name,
        counters: PrCounters::default(),
        url: pr.html_url,
        created_at: pr.created_at,
        updated_at: pr.updated_at,
        closed_at: pr.closed_at,
        merged_at: pr.merged_at,
    }
}

/// Fetch one pull request and its repository and upsert both for `user_id`.
#[instrument(skip(source, store), fields(owner = %url.owner, repo = %url.repo, pr = url.number))]
pub async fn track_pull_request(
    source: &dyn SourceControl,
    store: &dyn Store,
    user_id: &str,
    url: &PrUrl,
) -> Result<(Repository, PullRequest), TrackError> {
    let (upstream_repo, upstream_pr) = tokio::try_join!(
        source.repository(&url.owner, &url.repo),
        source.pull_request(&url.owner, &url.repo, url.number),
    )?;

    let repository = store
        .upsert_repository(repository_from_upstream(user_id, upstream_repo))
        .await?;
    let pull_request = store
        .upsert_pull_request(pull_request_from_upstream(&repository, upstream_pr))
        .await?;

    info!(repository_id = %repository.id, pull_request_id = %pull_request.id, "tracked pull request");
    Ok((repository, pull_request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GitHubConfig;
    use crate::github::GitHubClient;
    use crate::store::DocumentStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn upstream_pr(merged: bool) -> serde_json::Value {
        let merged_at = merged.then_some("2024-03-02T10:00:00Z");
        serde_json::json!({
            "id": 5001,
            "number": 42,
            "title": "Add OAuth2 login flow",
            "body": "",
            "state": "closed",
            "user": {"login": "alice", "avatar_url": "https://avatars/alice"},
            "base": {"ref": "main"},
            "head": {"ref": "oauth"},
            "html_url": "https://github.com/org/repo/pull/42",
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-02T10:00:00Z",
            "closed_at": "2024-03-02T10:00:00Z",
            "merged_at": merged_at
        })
    }

    async fn mock_upstream(server: &MockServer, merged: bool) {
        Mock::given(method("GET"))
            .and(path("/repos/org/repo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 77,
                "name": "repo",
                "full_name": "org/repo",
                "owner": {"login": "org"},
                "description": "demo",
                "private": true,
                "html_url": "https://github.com/org/repo",
                "default_branch": "trunk",
                "language": "TypeScript",
                "stargazers_count": 12,
                "forks_count": 2
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/org/repo/pulls/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(upstream_pr(merged)))
            .mount(server)
            .await;
    }

    fn client_for(server: &MockServer) -> GitHubClient {
        GitHubClient::new(&GitHubConfig {
            token: Some("t".to_string()),
            api_base: Some(server.uri()),
            timeout_secs: None,
        })
        .unwrap()
    }

    fn pr_url() -> PrUrl {
        PrUrl {
            owner: "org".to_string(),
            repo: "repo".to_string(),
            number: 42,
        }
    }

    #[tokio::test]
    async fn test_track_maps_upstream_fields() {
        let server = MockServer::start().await;
        mock_upstream(&server, true).await;
        let store = DocumentStore::in_memory();

        let (repo, pr) = track_pull_request(&client_for(&server), &store, "alice", &pr_url())
            .await
            .unwrap();

        assert_eq!(repo.full_name, "org/repo");
        assert_eq!(repo.default_branch, "trunk");
        assert!(repo.is_private);
        assert_eq!(repo.stars, 12);
        assert_eq!(pr.repository_id, repo.id);
        assert_eq!(pr.state, PrState::Merged);
        assert_eq!(pr.description, None);
        assert_eq!(pr.author.username, "alice");
        assert_eq!(pr.head_branch, "oauth");
        assert_eq!(pr.user_id, "alice");
    }

    #[tokio::test]
    async fn test_tracking_twice_keeps_one_record() {
        let server = MockServer::start().await;
        mock_upstream(&server, false).await;
        let store = DocumentStore::in_memory();
        let client = client_for(&server);

        let (_, first) = track_pull_request(&client, &store, "alice", &pr_url()).await.unwrap();
        let (repo, second) = track_pull_request(&client, &store, "alice", &pr_url()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.state, PrState::Closed);
        assert_eq!(store.list_pull_requests("alice", &repo.id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_track_surfaces_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let store = DocumentStore::in_memory();

        let err = track_pull_request(&client_for(&server), &store, "alice", &pr_url())
            .await
            .unwrap_err();
        assert!(matches!(err, TrackError::RemoteFetch(ref e) if e.status == Some(404)));
        assert!(store.list_repositories("alice").await.unwrap().is_empty());
    }
}

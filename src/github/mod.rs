pub mod types;

pub use types::{GitHubCommit, GitHubPrFile, GitHubPullRequest, GitHubRepo, PrUrl};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::GitHubConfig;

/// Upstream list endpoints return at most this many items; nothing pages past it.
pub const PAGE_SIZE: usize = 100;

const JSON_MEDIA_TYPE: &str = "application/vnd.github.v3+json";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub token not found in config or GITHUB_TOKEN")]
    MissingToken,

    #[error("GitHub token contains characters not allowed in a header")]
    InvalidToken,

    #[error("Invalid PR URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// A single upstream call failed, either in transport or with a non-2xx status.
#[derive(Debug, Error)]
#[error("GitHub request '{operation}' failed: {message}")]
pub struct RemoteFetchError {
    pub operation: &'static str,
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteFetchError {
    /// GitHub refused the token.
    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }
}

/// State filter for listing pull requests upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListState {
    Open,
    Closed,
    All,
}

impl ListState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListState::Open => "open",
            ListState::Closed => "closed",
            ListState::All => "all",
        }
    }
}

/// Read-only view of the source-control host.
///
/// Every method issues exactly one HTTP request. No retries.
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn list_repositories(&self) -> Result<Vec<GitHubRepo>, RemoteFetchError>;

    async fn list_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        state: ListState,
    ) -> Result<Vec<GitHubPullRequest>, RemoteFetchError>;

    async fn repository(&self, owner: &str, repo: &str) -> Result<GitHubRepo, RemoteFetchError>;

    async fn pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<GitHubPullRequest, RemoteFetchError>;

    async fn pull_request_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<GitHubPrFile>, RemoteFetchError>;

    async fn pull_request_commits(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<GitHubCommit>, RemoteFetchError>;

    /// Unified diff of the whole pull request as raw text.
    async fn pull_request_diff(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<String, RemoteFetchError>;
}

/// Parse a GitHub PR URL into its component parts.
///
/// Expected format: https://github.com/{owner}/{repo}/pull/{number}
pub fn parse_pr_url(url: &str) -> Result<PrUrl, GitHubError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| GitHubError::InvalidUrl(url.to_string()))?;

    if parsed.host_str() != Some("github.com") {
        return Err(GitHubError::InvalidUrl(url.to_string()));
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(|| GitHubError::InvalidUrl(url.to_string()))?
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() != 4 || segments[2] != "pull" {
        return Err(GitHubError::InvalidUrl(url.to_string()));
    }

    let number = segments[3]
        .parse::<u64>()
        .map_err(|_| GitHubError::InvalidUrl(url.to_string()))?;

    Ok(PrUrl {
        owner: segments[0].to_string(),
        repo: segments[1].to_string(),
        number,
    })
}

/// `reqwest`-backed gateway authenticated with a personal access token.
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, GitHubError> {
        let token = config
            .token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or(GitHubError::MissingToken)?;

        let mut auth = HeaderValue::from_str(&format!("token {token}"))
            .map_err(|_| GitHubError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
        headers.insert(USER_AGENT, HeaderValue::from_static("sunfyre"));

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: config.api_base().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, RemoteFetchError> {
        let response = request.send().await.map_err(|e| RemoteFetchError {
            operation,
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteFetchError {
                operation,
                status: Some(status.as_u16()),
                message: format!("HTTP {status}: {}", truncate(&body, 300)),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RemoteFetchError> {
        let request = self.http.get(self.url(path)).query(query);
        self.send(operation, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| RemoteFetchError {
                operation,
                status: None,
                message: format!("undecodable response: {e}"),
            })
    }
}

fn note_page_cap<T>(operation: &'static str, items: &[T]) {
    if items.len() >= PAGE_SIZE {
        debug!(operation, cap = PAGE_SIZE, "result hit the page-size cap; later items are not fetched");
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[async_trait]
impl SourceControl for GitHubClient {
    #[instrument(skip(self))]
    async fn list_repositories(&self) -> Result<Vec<GitHubRepo>, RemoteFetchError> {
        let repos: Vec<GitHubRepo> = self
            .get_json(
                "list repositories",
                "/user/repos",
                &[
                    ("sort", "updated"),
                    ("per_page", "100"),
                    ("affiliation", "owner,collaborator,organization_member"),
                ],
            )
            .await?;
        note_page_cap("list repositories", &repos);
        debug!(count = repos.len(), "received repositories");
        Ok(repos)
    }

    #[instrument(skip(self, state), fields(state = state.as_str()))]
    async fn list_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        state: ListState,
    ) -> Result<Vec<GitHubPullRequest>, RemoteFetchError> {
        let pulls: Vec<GitHubPullRequest> = self
            .get_json(
                "list pull requests",
                &format!("/repos/{owner}/{repo}/pulls"),
                &[("state", state.as_str()), ("per_page", "100")],
            )
            .await?;
        note_page_cap("list pull requests", &pulls);
        debug!(count = pulls.len(), "received pull requests");
        Ok(pulls)
    }

    #[instrument(skip(self))]
    async fn repository(&self, owner: &str, repo: &str) -> Result<GitHubRepo, RemoteFetchError> {
        self.get_json("get repository", &format!("/repos/{owner}/{repo}"), &[])
            .await
    }

    #[instrument(skip(self))]
    async fn pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<GitHubPullRequest, RemoteFetchError> {
        self.get_json(
            "get pull request",
            &format!("/repos/{owner}/{repo}/pulls/{number}"),
            &[],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn pull_request_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<GitHubPrFile>, RemoteFetchError> {
        let files: Vec<GitHubPrFile> = self
            .get_json(
                "list pull request files",
                &format!("/repos/{owner}/{repo}/pulls/{number}/files"),
                &[("per_page", "100")],
            )
            .await?;
        note_page_cap("list pull request files", &files);
        debug!(count = files.len(), "received changed files");
        Ok(files)
    }

    #[instrument(skip(self))]
    async fn pull_request_commits(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<GitHubCommit>, RemoteFetchError> {
        let commits: Vec<GitHubCommit> = self
            .get_json(
                "list pull request commits",
                &format!("/repos/{owner}/{repo}/pulls/{number}/commits"),
                &[("per_page", "100")],
            )
            .await?;
        note_page_cap("list pull request commits", &commits);
        debug!(count = commits.len(), "received commits");
        Ok(commits)
    }

    #[instrument(skip(self))]
    async fn pull_request_diff(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<String, RemoteFetchError> {
        const OPERATION: &str = "get pull request diff";
        let request = self
            .http
            .get(self.url(&format!("/repos/{owner}/{repo}/pulls/{number}")))
            .header(ACCEPT, DIFF_MEDIA_TYPE);
        let diff = self
            .send(OPERATION, request)
            .await?
            .text()
            .await
            .map_err(|e| RemoteFetchError {
                operation: OPERATION,
                status: None,
                message: e.to_string(),
            })?;
        debug!(diff_bytes = diff.len(), "received PR diff");
        Ok(diff)
    }
}

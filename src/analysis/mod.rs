pub mod normalize;
pub mod prompt;

use thiserror::Error;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::domain::{AiReview, PrCounters, PullRequest};
use crate::github::{GitHubCommit, GitHubPrFile, RemoteFetchError, SourceControl};
use crate::llm::{ModelInvocationError, ModelInvoker};
use crate::store::{NewReview, Store, StoreError};
use normalize::{MalformedModelResponseError, ReviewPayload};
use prompt::PromptContext;

/// Format tag stored on every review produced by this pipeline.
pub const ANALYSIS_VERSION: &str = "1.0";

/// Where an analysis run was when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Prompting,
    Invoking,
    Normalizing,
    Persisting,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Fetching => write!(f, "fetching"),
            Stage::Prompting => write!(f, "prompting"),
            Stage::Invoking => write!(f, "invoking"),
            Stage::Normalizing => write!(f, "normalizing"),
            Stage::Persisting => write!(f, "persisting"),
        }
    }
}

/// The specific reason a run failed. Logged in full, but only reachable
/// by callers through `AnalysisError::Failed`'s source.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    RemoteFetch(#[from] RemoteFetchError),

    #[error(transparent)]
    ModelInvocation(#[from] ModelInvocationError),

    #[error(transparent)]
    MalformedModelResponse(#[from] MalformedModelResponseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("repository {0} has no owner/name slug")]
    InvalidRepository(String),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// `entity` is "pull request" or "repository".
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("Failed to analyze pull request")]
    Failed {
        stage: Stage,
        #[source]
        cause: PipelineError,
    },
}

impl AnalysisError {
    fn failed(stage: Stage, cause: impl Into<PipelineError>) -> Self {
        let cause = cause.into();
        error!(%stage, error = %cause, "analysis failed");
        AnalysisError::Failed { stage, cause }
    }

    pub fn cause(&self) -> Option<&PipelineError> {
        match self {
            AnalysisError::NotFound { .. } => None,
            AnalysisError::Failed { cause, .. } => Some(cause),
        }
    }

    /// HTTP-style status for the boundary: 404 for a missing entity, 401 when
    /// an upstream credential was rejected, 500 for everything else.
    pub fn status_code(&self) -> u16 {
        match self.cause() {
            None => 404,
            Some(PipelineError::RemoteFetch(e)) if e.is_unauthorized() => 401,
            Some(PipelineError::ModelInvocation(e)) if e.is_credential() => 401,
            Some(_) => 500,
        }
    }
}

/// Recompute aggregate counters from a fresh fetch. Values replace the old
/// ones; nothing accumulates across runs.
pub fn counters_from(files: &[GitHubPrFile], commits: &[GitHubCommit]) -> PrCounters {
    PrCounters {
        files_changed: files.len() as u64,
        additions: files.iter().map(|f| f.additions).sum(),
        deletions: files.iter().map(|f| f.deletions).sum(),
        commits: commits.len() as u64,
    }
}

/// Runs the fetch → prompt → model → normalize → persist pipeline for one
/// pull request. Holds no state between runs.
pub struct Analyzer<'a> {
    source: &'a dyn SourceControl,
    model: &'a dyn ModelInvoker,
    store: &'a dyn Store,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        source: &'a dyn SourceControl,
        model: &'a dyn ModelInvoker,
        store: &'a dyn Store,
    ) -> Self {
        Self { source, model, store }
    }

    /// Analyze a pull request owned by `user_id` and append a new review.
    ///
    /// Counters are saved before the model is called, so they stay updated
    /// even when a later stage fails.
    #[instrument(skip(self), fields(model = self.model.model()))]
    pub async fn analyze(&self, user_id: &str, pull_request_id: &str) -> Result<AiReview, AnalysisError> {
        info!(stage = %Stage::Fetching, "starting analysis");
        let mut pr = self
            .store
            .load_pull_request(user_id, pull_request_id)
            .await
            .map_err(|e| not_found_or(Stage::Fetching, e))?;
        let repository = self
            .store
            .load_repository(user_id, &pr.repository_id)
            .await
            .map_err(|e| not_found_or(Stage::Fetching, e))?;
        let (owner, repo) = repository
            .owner_and_name()
            .ok_or_else(|| {
                AnalysisError::failed(
                    Stage::Fetching,
                    PipelineError::InvalidRepository(repository.full_name.clone()),
                )
            })?;

        let (diff, files, commits) = tokio::try_join!(
            self.source
                .pull_request_diff(owner, repo, pr.number)
                .instrument(info_span!("fetch", what = "diff")),
            self.source
                .pull_request_files(owner, repo, pr.number)
                .instrument(info_span!("fetch", what = "files")),
            self.source
                .pull_request_commits(owner, repo, pr.number)
                .instrument(info_span!("fetch", what = "commits")),
        )
        .map_err(|e| AnalysisError::failed(Stage::Fetching, e))?;

        pr.counters = counters_from(&files, &commits);
        let pr = self
            .store
            .save_pull_request(pr)
            .await
            .map_err(|e| AnalysisError::failed(Stage::Fetching, e))?;
        info!(
            files = pr.counters.files_changed,
            additions = pr.counters.additions,
            deletions = pr.counters.deletions,
            commits = pr.counters.commits,
            "updated pull request counters"
        );
        debug!(
            head = commits.last().map(|c| c.sha.as_str()),
            files = ?files.iter().map(|f| f.filename.as_str()).collect::<Vec<_>>(),
            "changed files"
        );

        info!(stage = %Stage::Prompting, diff_chars = diff.len(), "building prompt");
        let prompt = prompt::build_prompt(&diff, &prompt_context(&pr));
        info!(stage = %Stage::Invoking, prompt_chars = prompt.len(), "calling model");

        let output = self
            .model
            .generate(&prompt)
            .await
            .map_err(|e| AnalysisError::failed(Stage::Invoking, e))?;

        let payload = normalize::normalize(&output.text, &diff)
            .map_err(|e| AnalysisError::failed(Stage::Normalizing, e))?;
        if payload.files_analyzed().is_empty() {
            warn!("diff contained no file headers");
        }

        let review = self
            .store
            .create_review(user_id, self.new_review(&pr, payload, output.tokens_used))
            .await
            .map_err(|e| AnalysisError::failed(Stage::Persisting, e))?;
        info!(review_id = %review.id, risk_score = review.risk_score, "analysis complete");
        Ok(review)
    }

    fn new_review(&self, pr: &PullRequest, payload: ReviewPayload, tokens_used: Option<u32>) -> NewReview {
        NewReview {
            pull_request_id: pr.id.clone(),
            payload,
            ai_model: self.model.model().to_string(),
            tokens_used,
            analysis_version: ANALYSIS_VERSION.to_string(),
        }
    }
}

fn prompt_context(pr: &PullRequest) -> PromptContext<'_> {
    PromptContext {
        title: &pr.title,
        description: pr.description.as_deref(),
        files_changed: pr.counters.files_changed,
        additions: pr.counters.additions,
        deletions: pr.counters.deletions,
    }
}

fn not_found_or(stage: Stage, e: StoreError) -> AnalysisError {
    match e {
        StoreError::NotFound { entity, ref id } => {
            warn!(entity, id = %id, "analysis target missing");
            AnalysisError::NotFound { entity }
        }
        other => AnalysisError::failed(stage, other),
    }
}

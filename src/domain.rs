//! Documents kept in the store. Every document carries the id of the user
//! that owns it, and every store query filters on that id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl PrState {
    /// Map an upstream `state` string. A merge timestamp always wins, since
    /// GitHub reports merged pull requests as `closed`.
    pub fn from_upstream(state: &str, merged: bool) -> Self {
        if merged {
            return PrState::Merged;
        }
        match state {
            "closed" => PrState::Closed,
            _ => PrState::Open,
        }
    }
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrState::Open => write!(f, "open"),
            PrState::Closed => write!(f, "closed"),
            PrState::Merged => write!(f, "merged"),
        }
    }
}

impl std::str::FromStr for PrState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PrState::Open),
            "closed" => Ok(PrState::Closed),
            "merged" => Ok(PrState::Merged),
            other => Err(format!("unknown pull request state: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Aggregate change statistics. Overwritten on every analysis run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrCounters {
    pub files_changed: u64,
    pub additions: u64,
    pub deletions: u64,
    pub commits: u64,
}

/// A tracked pull request. Unique per (repository, number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub id: String,
    pub user_id: String,
    pub repository_id: String,
    pub github_id: u64,
    pub number: u64,
    pub title: String,
    pub description: Option<String>,
    pub state: PrState,
    pub author: Author,
    pub base_branch: String,
    pub head_branch: String,
    #[serde(flatten)]
    pub counters: PrCounters,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
}

/// A tracked repository. Unique per (user, upstream id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: String,
    pub user_id: String,
    pub github_id: u64,
    pub name: String,
    /// `owner/name` slug.
    pub full_name: String,
    pub owner: String,
    pub description: Option<String>,
    pub is_private: bool,
    pub url: String,
    pub default_branch: String,
    pub language: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub is_active: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Repository {
    /// Split `full_name` into (owner, name).
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        let (owner, name) = self.full_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some((owner, name))
    }
}

/// Severity attached to an inline comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Exact match on the three known labels; anything else is `Info`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "warning" => Severity::Warning,
            "critical" => Severity::Critical,
            _ => Severity::Info,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineComment {
    pub file: String,
    /// 1-based; 0 when the model did not supply one.
    pub line: u64,
    pub message: String,
    pub severity: Severity,
}

/// One persisted analysis result. Never mutated after creation; re-running
/// an analysis appends a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiReview {
    pub id: String,
    pub pull_request_id: String,
    pub user_id: String,
    pub summary: String,
    pub risk_score: u8,
    pub risk_explanation: String,
    pub inline_comments: Vec<InlineComment>,
    pub suggested_tests: Vec<String>,
    pub files_analyzed: Vec<String>,
    pub ai_model: String,
    pub tokens_used: Option<u32>,
    pub analysis_version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pr_state_from_upstream() {
        assert_eq!(PrState::from_upstream("open", false), PrState::Open);
        assert_eq!(PrState::from_upstream("closed", false), PrState::Closed);
        assert_eq!(PrState::from_upstream("closed", true), PrState::Merged);
    }

    #[test]
    fn test_pr_state_parse() {
        assert_eq!("merged".parse::<PrState>().unwrap(), PrState::Merged);
        assert!("draft".parse::<PrState>().is_err());
    }

    #[test]
    fn test_severity_from_label() {
        assert_eq!(Severity::from_label("info"), Severity::Info);
        assert_eq!(Severity::from_label("warning"), Severity::Warning);
        assert_eq!(Severity::from_label("critical"), Severity::Critical);
        assert_eq!(Severity::from_label("urgent"), Severity::Info);
        assert_eq!(Severity::from_label("Critical"), Severity::Info);
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
    }

    #[test]
    fn test_owner_and_name() {
        let now = Utc::now();
        let mut repo = Repository {
            id: new_id(),
            user_id: "u".to_string(),
            github_id: 1,
            name: "repo".to_string(),
            full_name: "org/repo".to_string(),
            owner: "org".to_string(),
            description: None,
            is_private: false,
            url: "https://github.com/org/repo".to_string(),
            default_branch: "main".to_string(),
            language: None,
            stars: 0,
            forks: 0,
            is_active: true,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(repo.owner_and_name(), Some(("org", "repo")));
        repo.full_name = "broken".to_string();
        assert_eq!(repo.owner_and_name(), None);
    }

    #[test]
    fn test_new_ids_are_distinct() {
        assert_ne!(new_id(), new_id());
    }
}

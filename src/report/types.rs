use crate::domain::{AiReview, PrCounters, PullRequest};

/// Risk band of a 1-10 review score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// 1-3 low, 4-6 medium, 7-10 high.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=3 => RiskLevel::Low,
            4..=6 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

/// A pull request together with one of its reviews, ready to render.
#[derive(Debug)]
pub struct Report<'a> {
    pub pr_number: u64,
    pub pr_title: &'a str,
    pub author: &'a str,
    pub counters: PrCounters,
    pub risk: RiskLevel,
    pub review: &'a AiReview,
}

impl<'a> Report<'a> {
    pub fn new(pr: &'a PullRequest, review: &'a AiReview) -> Self {
        Self {
            pr_number: pr.number,
            pr_title: &pr.title,
            author: &pr.author.username,
            counters: pr.counters,
            risk: RiskLevel::from_score(review.risk_score),
            review,
        }
    }
}

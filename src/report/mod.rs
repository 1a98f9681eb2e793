pub mod types;

pub use types::{Report, RiskLevel};

use crate::domain::{AiReview, InlineComment, Severity};
use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Output the report to the terminal (default) or to a markdown file.
#[instrument(skip(report), fields(pr = report.pr_number, risk = %report.risk))]
pub fn output(report: &Report<'_>, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print!("{}", render_terminal(report));
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            std::fs::write(path, render_markdown(report))?;
            Ok(())
        }
    }
}

/// One line per review, newest first, for the history listing.
pub fn history_line(review: &AiReview) -> String {
    format!(
        "{}  {}  risk {:>2} ({})  {} comment(s)  {}",
        review.created_at.format("%Y-%m-%d %H:%M:%S"),
        review.id,
        review.risk_score,
        colorize_risk(RiskLevel::from_score(review.risk_score)),
        review.inline_comments.len(),
        review.ai_model,
    )
}

fn location(comment: &InlineComment) -> String {
    match (comment.file.as_str(), comment.line) {
        ("", _) => String::new(),
        (file, 0) => file.to_string(),
        (file, line) => format!("{file}:{line}"),
    }
}

/// PR #42: "Add OAuth2 login flow"
/// Author: alice | Files changed: 7 | +320 -45 | Commits: 3
///
/// ═══ Summary ═══
/// ...
/// ═══ Risk: 7/10 HIGH ═══
fn render_terminal(report: &Report<'_>) -> String {
    let review = report.review;
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!("PR #{}: \"{}\"\n", report.pr_number, report.pr_title));
    out.push_str(&format!(
        "Author: {} | Files changed: {} | +{} -{} | Commits: {}\n\n",
        report.author,
        report.counters.files_changed,
        report.counters.additions,
        report.counters.deletions,
        report.counters.commits
    ));

    out.push_str("═══ Summary ═══\n");
    out.push_str(&format!("{}\n\n", review.summary));

    out.push_str(&format!(
        "═══ Risk: {}/10 {} ═══\n",
        review.risk_score,
        colorize_risk(report.risk)
    ));
    out.push_str(&format!("{}\n\n", review.risk_explanation));

    out.push_str("═══ Inline Comments ═══\n");
    if review.inline_comments.is_empty() {
        out.push_str("  No comments.\n");
    }
    for comment in &review.inline_comments {
        let loc = location(comment);
        let loc = if loc.is_empty() { loc } else { format!(" ({loc})") };
        out.push_str(&format!(
            "  • [{}] {}{}\n",
            colorize_severity(comment.severity),
            comment.message,
            loc
        ));
    }
    out.push('\n');

    out.push_str("═══ Suggested Tests ═══\n");
    if review.suggested_tests.is_empty() {
        out.push_str("  None.\n");
    }
    for test in &review.suggested_tests {
        out.push_str(&format!("  • {test}\n"));
    }
    out.push('\n');

    out.push_str(&format!(
        "Files analyzed: {} | Model: {} | Review {}\n",
        review.files_analyzed.len(),
        review.ai_model,
        review.id
    ));
    out
}

fn render_markdown(report: &Report<'_>) -> String {
    let review = report.review;
    let mut md = String::new();
    md.push_str(&format!("# PR #{}: \"{}\"\n\n", report.pr_number, report.pr_title));
    md.push_str(&format!(
        "**Author:** {} | **Files changed:** {} | **+{} -{}** | **Commits:** {}\n\n",
        report.author,
        report.counters.files_changed,
        report.counters.additions,
        report.counters.deletions,
        report.counters.commits
    ));

    md.push_str("## Summary\n\n");
    md.push_str(&format!("{}\n\n", review.summary));

    md.push_str(&format!("## Risk: {}/10 ({})\n\n", review.risk_score, report.risk));
    md.push_str(&format!("{}\n\n", review.risk_explanation));

    md.push_str("## Inline Comments\n\n");
    if review.inline_comments.is_empty() {
        md.push_str("No comments.\n\n");
    } else {
        for comment in &review.inline_comments {
            let loc = location(comment);
            let loc = if loc.is_empty() { loc } else { format!(" (`{loc}`)") };
            md.push_str(&format!("- **[{}]** {}{}\n", comment.severity, comment.message, loc));
        }
        md.push('\n');
    }

    md.push_str("## Suggested Tests\n\n");
    if review.suggested_tests.is_empty() {
        md.push_str("None.\n\n");
    } else {
        for test in &review.suggested_tests {
            md.push_str(&format!("- {test}\n"));
        }
        md.push('\n');
    }

    md.push_str("## Files Analyzed\n\n");
    for file in &review.files_analyzed {
        md.push_str(&format!("- `{file}`\n"));
    }
    md.push_str(&format!(
        "\n_Model: {} | Analysis version: {} | Created: {}_\n",
        review.ai_model,
        review.analysis_version,
        review.created_at.to_rfc3339()
    ));
    md
}

fn colorize_risk(level: RiskLevel) -> colored::ColoredString {
    match level {
        RiskLevel::High => "HIGH".red().bold(),
        RiskLevel::Medium => "MEDIUM".yellow().bold(),
        RiskLevel::Low => "LOW".green().bold(),
    }
}

fn colorize_severity(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Critical => "critical".red().bold(),
        Severity::Warning => "warning".yellow(),
        Severity::Info => "info".normal(),
    }
}

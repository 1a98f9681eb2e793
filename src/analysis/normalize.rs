//! Turns raw model text into a [`ReviewPayload`].
//!
//! Only text that is not a JSON object is rejected. Every missing or
//! mistyped field falls back to a default, and the list of analyzed files is
//! read from the diff itself, never from the model.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{InlineComment, Severity};

pub const DEFAULT_SUMMARY: &str = "AI analysis completed";
pub const DEFAULT_RISK_EXPLANATION: &str = "Risk assessment based on code changes";
pub const DEFAULT_RISK_SCORE: u8 = 5;
pub const MIN_RISK_SCORE: u8 = 1;
pub const MAX_RISK_SCORE: u8 = 10;

static DIFF_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^diff --git "?a/.+ "?b/(.+?)"?$"#).expect("diff header pattern is valid")
});

#[derive(Debug, Error)]
pub enum MalformedModelResponseError {
    #[error("model response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model response is JSON but not an object")]
    NotAnObject,
}

/// A schema-valid review produced from model output.
///
/// Fields are private so that the only way to obtain one is [`normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewPayload {
    summary: String,
    risk_score: u8,
    risk_explanation: String,
    inline_comments: Vec<InlineComment>,
    suggested_tests: Vec<String>,
    files_analyzed: Vec<String>,
}

impl ReviewPayload {
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Always within 1..=10.
    pub fn risk_score(&self) -> u8 {
        self.risk_score
    }

    pub fn risk_explanation(&self) -> &str {
        &self.risk_explanation
    }

    pub fn inline_comments(&self) -> &[InlineComment] {
        &self.inline_comments
    }

    pub fn suggested_tests(&self) -> &[String] {
        &self.suggested_tests
    }

    pub fn files_analyzed(&self) -> &[String] {
        &self.files_analyzed
    }
}

/// Parse and validate a model reply against the diff it was asked about.
pub fn normalize(raw: &str, diff: &str) -> Result<ReviewPayload, MalformedModelResponseError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))?;
    let obj = value.as_object().ok_or(MalformedModelResponseError::NotAnObject)?;

    Ok(ReviewPayload {
        summary: text_or(obj, "summary", DEFAULT_SUMMARY),
        risk_score: risk_score(obj.get("riskScore")),
        risk_explanation: text_or(obj, "riskExplanation", DEFAULT_RISK_EXPLANATION),
        inline_comments: obj
            .get("inlineComments")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(inline_comment).collect())
            .unwrap_or_default(),
        suggested_tests: obj
            .get("suggestedTests")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        files_analyzed: files_from_diff(diff),
    })
}

/// Remove a surrounding ```json / ``` fence if the model added one.
pub fn strip_code_fence(raw: &str) -> &str {
    let text = raw.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the opening fence line, including any language tag.
    let body = match rest.split_once('\n') {
        Some((tag, body)) if tag.trim().is_empty() || tag.trim().eq_ignore_ascii_case("json") => body,
        _ => return text,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Post-change paths of every file header in a unified diff, in order.
pub fn files_from_diff(diff: &str) -> Vec<String> {
    diff.lines()
        .filter(|line| line.starts_with("diff --git"))
        .filter_map(|line| DIFF_HEADER.captures(line))
        .map(|caps| caps[1].to_string())
        .collect()
}

fn text_or(obj: &Map<String, Value>, key: &str, default: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// A JSON number, or a string holding one.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn risk_score(value: Option<&Value>) -> u8 {
    let Some(score) = value.and_then(number) else {
        return DEFAULT_RISK_SCORE;
    };
    score
        .round()
        .clamp(f64::from(MIN_RISK_SCORE), f64::from(MAX_RISK_SCORE)) as u8
}

fn inline_comment(value: &Value) -> InlineComment {
    let field = |key: &str| value.get(key);
    InlineComment {
        file: field("file").and_then(Value::as_str).unwrap_or_default().to_string(),
        line: field("line")
            .and_then(|l| l.as_u64().or_else(|| number(l).filter(|f| *f > 0.0).map(|f| f as u64)))
            .unwrap_or(0),
        message: field("message").and_then(Value::as_str).unwrap_or_default().to_string(),
        severity: field("severity")
            .and_then(Value::as_str)
            .map(Severity::from_label)
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_FILE_DIFF: &str = "diff --git a/foo.ts b/foo.ts\n\
index 1..2 100644\n\
--- a/foo.ts\n\
+++ b/foo.ts\n\
@@ -1 +1 @@\n\
-a\n\
+b\n\
diff --git a/bar.go b/bar.go\n\
--- a/bar.go\n\
+++ b/bar.go\n";

    #[test]
    fn test_defaults_for_empty_object() {
        let payload = normalize("{}", "").unwrap();
        assert_eq!(payload.summary(), DEFAULT_SUMMARY);
        assert_eq!(payload.risk_score(), DEFAULT_RISK_SCORE);
        assert_eq!(payload.risk_explanation(), DEFAULT_RISK_EXPLANATION);
        assert!(payload.inline_comments().is_empty());
        assert!(payload.suggested_tests().is_empty());
        assert!(payload.files_analyzed().is_empty());
    }

    #[test]
    fn test_empty_inline_comments_stay_empty() {
        let payload = normalize(r#"{"inlineComments": [], "suggestedTests": []}"#, "").unwrap();
        assert!(payload.inline_comments().is_empty());
        assert!(payload.suggested_tests().is_empty());
    }

    #[test]
    fn test_risk_score_is_clamped() {
        let score = |raw: &str| normalize(&format!(r#"{{"riskScore": {raw}}}"#), "").unwrap().risk_score();
        assert_eq!(score("-5"), 1);
        assert_eq!(score("0"), 1);
        assert_eq!(score("15"), 10);
        assert_eq!(score("7"), 7);
        assert_eq!(score("6.6"), 7);
        assert_eq!(score("\"high\""), DEFAULT_RISK_SCORE);
        assert_eq!(score("null"), DEFAULT_RISK_SCORE);
    }

    #[test]
    fn test_numeric_strings_are_read_as_numbers() {
        let score = |raw: &str| normalize(&format!(r#"{{"riskScore": {raw}}}"#), "").unwrap().risk_score();
        assert_eq!(score(r#""8""#), 8);
        assert_eq!(score(r#"" 7.4 ""#), 7);
        assert_eq!(score(r#""42""#), 10);
        assert_eq!(score(r#""""#), DEFAULT_RISK_SCORE);

        let payload = normalize(r#"{"inlineComments": [{"line": "42"}, {"line": "x"}]}"#, "").unwrap();
        let lines: Vec<u64> = payload.inline_comments().iter().map(|c| c.line).collect();
        assert_eq!(lines, vec![42, 0]);
    }

    #[test]
    fn test_unknown_severity_becomes_info() {
        let raw = r#"{"inlineComments": [
            {"file": "a.rs", "line": 3, "message": "m", "severity": "urgent"},
            {"file": "b.rs", "line": 4, "message": "n", "severity": "critical"},
            {"file": "c.rs", "line": 5, "message": "o", "severity": "warning"},
            {"file": "d.rs", "line": 6, "message": "p"}
        ]}"#;
        let payload = normalize(raw, "").unwrap();
        let severities: Vec<_> = payload.inline_comments().iter().map(|c| c.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Info, Severity::Critical, Severity::Warning, Severity::Info]
        );
    }

    #[test]
    fn test_inline_comment_missing_fields_default() {
        let payload = normalize(r#"{"inlineComments": [{}, "bogus", {"line": -3}]}"#, "").unwrap();
        assert_eq!(payload.inline_comments().len(), 3);
        for comment in payload.inline_comments() {
            assert_eq!(comment.file, "");
            assert_eq!(comment.line, 0);
            assert_eq!(comment.message, "");
            assert_eq!(comment.severity, Severity::Info);
        }
    }

    #[test]
    fn test_non_string_suggested_tests_are_dropped() {
        let payload = normalize(r#"{"suggestedTests": ["test login", 4, null, "test logout"]}"#, "").unwrap();
        assert_eq!(payload.suggested_tests(), ["test login", "test logout"]);
    }

    #[test]
    fn test_files_come_from_diff_not_model() {
        let raw = r#"{"summary": "ok", "filesAnalyzed": ["made/up.rs"]}"#;
        let payload = normalize(raw, TWO_FILE_DIFF).unwrap();
        assert_eq!(payload.files_analyzed(), ["foo.ts", "bar.go"]);
    }

    #[test]
    fn test_files_from_diff_handles_nested_paths() {
        let diff = "diff --git a/lib/b/mod.rs b/lib/b/mod.rs\n+++ b/lib/b/mod.rs\n";
        assert_eq!(files_from_diff(diff), ["lib/b/mod.rs"]);
    }

    #[test]
    fn test_files_from_diff_unquotes_paths_with_spaces() {
        let diff = "diff --git \"a/my file.ts\" \"b/my file.ts\"\n\
diff --git a/plain.rs b/plain.rs\n";
        assert_eq!(files_from_diff(diff), ["my file.ts", "plain.rs"]);
    }

    #[test]
    fn test_files_from_fixture() {
        let diff = include_str!("../../tests/fixtures/sample_diff.patch");
        assert_eq!(
            files_from_diff(diff),
            ["src/auth/login.ts", "src/auth/oauth.ts", "server/cmd/main.go"]
        );
    }

    #[test]
    fn test_json_fence_parses_like_plain_json() {
        let plain = r#"{"summary": "ok", "riskScore": 3}"#;
        let fenced = format!("```json\n{plain}\n```");
        let bare = format!("```\n{plain}\n```\n");
        let expected = normalize(plain, TWO_FILE_DIFF).unwrap();
        assert_eq!(normalize(&fenced, TWO_FILE_DIFF).unwrap(), expected);
        assert_eq!(normalize(&bare, TWO_FILE_DIFF).unwrap(), expected);
    }

    #[test]
    fn test_strip_code_fence_leaves_plain_text() {
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_non_json_is_malformed() {
        let err = normalize("I think this PR looks fine.", "").unwrap_err();
        assert!(matches!(err, MalformedModelResponseError::Json(_)));
    }

    #[test]
    fn test_json_array_is_malformed() {
        let err = normalize("[1, 2, 3]", "").unwrap_err();
        assert!(matches!(err, MalformedModelResponseError::NotAnObject));
    }

    #[test]
    fn test_empty_summary_uses_placeholder() {
        let payload = normalize(r#"{"summary": "", "riskExplanation": ""}"#, "").unwrap();
        assert_eq!(payload.summary(), DEFAULT_SUMMARY);
        assert_eq!(payload.risk_explanation(), DEFAULT_RISK_EXPLANATION);
    }
}

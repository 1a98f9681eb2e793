/// Diffs longer than this many characters are cut before being sent.
pub const MAX_DIFF_CHARS: usize = 30_000;

pub const TRUNCATION_MARKER: &str = "\n\n... (diff truncated due to length)";

const SYSTEM_INSTRUCTION: &str = "\
You are an expert code reviewer. Analyze pull requests and provide comprehensive feedback in a structured JSON format. Focus on:
1. Code quality and best practices
2. Security vulnerabilities
3. Performance issues
4. Logic errors
5. Test coverage needs
6. Breaking changes";

const RESPONSE_SCHEMA: &str = r#"{
  "summary": "High-level summary of the changes (2-3 sentences)",
  "riskScore": 5,
  "riskExplanation": "Detailed explanation of the risk score",
  "inlineComments": [
    {
      "file": "path/to/file.js",
      "line": 42,
      "message": "Specific concern or suggestion",
      "severity": "warning"
    }
  ],
  "suggestedTests": [
    "Test description 1",
    "Test description 2"
  ]
}"#;

const RISK_SCALE: &str = "\
Risk Score Scale (1-10):
1-3: Low risk - Minor changes, well-tested areas
4-6: Medium risk - Moderate changes, some edge cases
7-10: High risk - Major changes, security concerns, breaking changes";

/// Pull request metadata embedded in the prompt.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub files_changed: u64,
    pub additions: u64,
    pub deletions: u64,
}

/// Cut `diff` to at most `MAX_DIFF_CHARS` characters, appending the
/// truncation marker when anything was dropped.
pub fn truncate_diff(diff: &str) -> std::borrow::Cow<'_, str> {
    match diff.char_indices().nth(MAX_DIFF_CHARS) {
        Some((cut, _)) => format!("{}{}", &diff[..cut], TRUNCATION_MARKER).into(),
        None => diff.into(),
    }
}

/// Build the full analysis request sent to the model.
///
/// Deterministic: the same diff and context always produce the same text.
pub fn build_prompt(diff: &str, ctx: &PromptContext<'_>) -> String {
    let description = ctx
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or("No description provided");

    let mut prompt = String::with_capacity(diff.len().min(MAX_DIFF_CHARS) + 2048);
    prompt.push_str(SYSTEM_INSTRUCTION);
    prompt.push_str("\n\nAnalyze this pull request and provide a comprehensive review in JSON format.\n\n");
    prompt.push_str(&format!("PR Title: {}\n", ctx.title));
    prompt.push_str(&format!("PR Description: {description}\n"));
    prompt.push_str(&format!("Files Changed: {}\n", ctx.files_changed));
    prompt.push_str(&format!("Additions: {}\n", ctx.additions));
    prompt.push_str(&format!("Deletions: {}\n\n", ctx.deletions));
    prompt.push_str("Diff:\n```\n");
    prompt.push_str(&truncate_diff(diff));
    prompt.push_str("\n```\n\n");
    prompt.push_str("Provide your analysis in this exact JSON structure:\n");
    prompt.push_str(RESPONSE_SCHEMA);
    prompt.push_str("\n\n");
    prompt.push_str(RISK_SCALE);
    prompt.push_str("\n\nSeverity levels: \"info\", \"warning\", \"critical\"");
    prompt.push_str("\n\nIMPORTANT: Respond ONLY with valid JSON, no markdown code blocks.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PromptContext<'static> {
        PromptContext {
            title: "Add OAuth2 login flow",
            description: Some("Adds the GitHub callback"),
            files_changed: 3,
            additions: 50,
            deletions: 10,
        }
    }

    #[test]
    fn test_prompt_embeds_metadata() {
        let prompt = build_prompt("diff --git a/x b/x", &ctx());
        assert!(prompt.contains("PR Title: Add OAuth2 login flow"));
        assert!(prompt.contains("PR Description: Adds the GitHub callback"));
        assert!(prompt.contains("Files Changed: 3"));
        assert!(prompt.contains("Additions: 50"));
        assert!(prompt.contains("Deletions: 10"));
        assert!(prompt.contains("diff --git a/x b/x"));
    }

    #[test]
    fn test_prompt_describes_schema_scale_and_severities() {
        let prompt = build_prompt("", &ctx());
        for key in ["\"summary\"", "\"riskScore\"", "\"riskExplanation\"", "\"inlineComments\"", "\"suggestedTests\""] {
            assert!(prompt.contains(key), "missing {key}");
        }
        assert!(prompt.contains("1-3: Low risk"));
        assert!(prompt.contains("4-6: Medium risk"));
        assert!(prompt.contains("7-10: High risk"));
        assert!(prompt.contains("\"info\", \"warning\", \"critical\""));
    }

    #[test]
    fn test_missing_description_placeholder() {
        let mut c = ctx();
        c.description = None;
        assert!(build_prompt("", &c).contains("PR Description: No description provided"));
        c.description = Some("   ");
        assert!(build_prompt("", &c).contains("PR Description: No description provided"));
    }

    #[test]
    fn test_short_diff_is_not_truncated() {
        let diff = "+".repeat(MAX_DIFF_CHARS);
        assert_eq!(truncate_diff(&diff), diff.as_str());
        assert!(!build_prompt(&diff, &ctx()).contains("diff truncated"));
    }

    #[test]
    fn test_long_diff_is_truncated_with_marker() {
        let diff = "a".repeat(MAX_DIFF_CHARS + 500);
        let cut = truncate_diff(&diff);
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(cut.chars().count(), MAX_DIFF_CHARS + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let diff = "é".repeat(MAX_DIFF_CHARS + 1);
        let cut = truncate_diff(&diff);
        assert!(cut.starts_with(&"é".repeat(MAX_DIFF_CHARS)));
        assert!(cut.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let diff = include_str!("../../tests/fixtures/sample_diff.patch");
        assert_eq!(build_prompt(diff, &ctx()), build_prompt(diff, &ctx()));
    }
}

//! Config-reference extraction from command step bodies.
//!
//! A command body like
//! `npx --yes markdownlint-cli2 --config .markdownlint.json profile/README.md`
//! names two external files. The extractor pulls those path-like tokens
//! out so the cross-document predicate can check each one against the
//! file-access collaborator. Extraction is heuristic but deterministic:
//! job order, then step order, then token order.

use crate::pipeline::PipelineDocument;
use serde::{Deserialize, Serialize};

/// A file path referenced by a command step body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReference {
    pub path: String,
    pub job_id: String,
    pub step_index: usize,
}

/// Extract every path-like token from every command body.
pub fn extract_config_references(pipeline: &PipelineDocument) -> Vec<ConfigReference> {
    let mut refs = Vec::new();
    for (job_id, job) in &pipeline.jobs {
        for (step_index, step) in job.steps.iter().enumerate() {
            let Some(body) = step.command_body() else {
                continue;
            };
            for token in body.split_whitespace() {
                let token = token.trim_matches(|c| c == '"' || c == '\'' || c == ';');
                if is_path_token(token) {
                    refs.push(ConfigReference {
                        path: token.to_string(),
                        job_id: job_id.clone(),
                        step_index,
                    });
                }
            }
        }
    }
    refs
}

/// A token counts as a file reference when it is a relative path with
/// an extension: `profile/README.md`, `.markdownlint.json`. Flags,
/// program names, and URLs do not.
fn is_path_token(token: &str) -> bool {
    if token.is_empty() || token.starts_with('-') {
        return false;
    }
    if token.contains("://") {
        return false;
    }
    if token.contains('/') {
        let last = token.rsplit('/').next().unwrap_or("");
        return last.contains('.');
    }
    if let Some(rest) = token.strip_prefix('.') {
        // Dot-prefixed hidden file: needs an extension of its own.
        return !rest.is_empty() && rest.contains('.');
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::load_pipeline;

    const FIXTURE: &str = r#"
name: Update profile
on:
  workflow_dispatch:
jobs:
  refresh-profile:
    runs-on: ubuntu-latest
    steps:
      - name: Checkout repository
        uses: actions/checkout@v4
      - name: Validate organization markdown
        run: npx --yes markdownlint-cli2 --config .markdownlint.json profile/README.md
"#;

    #[test]
    fn extracts_config_and_target_paths() {
        let pipeline = load_pipeline(FIXTURE.as_bytes()).expect("fixture loads");
        let refs = extract_config_references(&pipeline);
        let paths: Vec<&str> = refs.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec![".markdownlint.json", "profile/README.md"]);
        assert!(refs.iter().all(|r| r.job_id == "refresh-profile"));
        assert!(refs.iter().all(|r| r.step_index == 1));
    }

    #[test]
    fn ignores_flags_programs_and_urls() {
        assert!(!is_path_token("--config"));
        assert!(!is_path_token("npx"));
        assert!(!is_path_token("markdownlint-cli2"));
        assert!(!is_path_token("https://example.com/a.md"));
        assert!(!is_path_token(""));
        assert!(!is_path_token("."));
    }

    #[test]
    fn recognizes_hidden_files_and_nested_paths() {
        assert!(is_path_token(".markdownlint.json"));
        assert!(is_path_token("profile/README.md"));
        assert!(is_path_token("scripts/build/generate.py"));
        assert!(!is_path_token("profile/scripts"));
        assert!(!is_path_token(".github/workflows"));
    }
}

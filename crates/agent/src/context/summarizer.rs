//! File summaries for the explored tier.
//!
//! When the context store demotes a file it keeps only a synopsis. The
//! [`StructuralSummarizer`] derives one from the source text with a few
//! regular expressions; the [`ProviderSummarizer`] asks the model and falls
//! back to the structural form when the call fails.

use async_trait::async_trait;
use codeloop_core::message::Message;
use codeloop_core::provider::{Provider, ProviderRequest};
use regex::Regex;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Upper bound for structural summaries, in characters.
pub const STRUCTURAL_SUMMARY_MAX_CHARS: usize = 400;

/// Default upper bound for model-written summaries, in characters.
pub const DEFAULT_SUMMARY_MAX_CHARS: usize = 500;

/// Produces the synopsis kept for a file once it leaves the active tier.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, path: &str, content: &str) -> String;
}

/// Deterministic summarizer based on line counts and declarations.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralSummarizer;

#[async_trait]
impl Summarizer for StructuralSummarizer {
    async fn summarize(&self, path: &str, content: &str) -> String {
        structural_summary(path, content)
    }
}

struct Patterns {
    py_import: Regex,
    py_class: Regex,
    py_def: Regex,
    js_import: Regex,
    js_function: Regex,
    rs_use: Regex,
    rs_item: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            py_import: Regex::new(r"^\s*(?:from\s+([\w.]+)\s+import|import\s+([\w.]+))")?,
            py_class: Regex::new(r"^\s*class\s+(\w+)")?,
            py_def: Regex::new(r"^\s*(?:async\s+)?def\s+(\w+)")?,
            js_import: Regex::new(r#"^\s*(?:import\s|(?:const|let|var)\s+.*=\s*require\()"#)?,
            js_function: Regex::new(
                r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?(?:function\s*\*?\s*\w*\s*\(|(?:const|let)\s+\w+\s*=\s*(?:async\s*)?(?:\([^)]*\)|\w+)\s*=>)",
            )?,
            rs_use: Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+([^;]+);")?,
            rs_item: Regex::new(
                r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?(fn|struct|enum|trait)\s+(\w+)",
            )?,
        })
    }
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(Patterns::compile);

/// Build a structural summary such as
/// `42 lines; Imports: os, sys; Functions: main; Purpose: CLI entry point`.
pub fn structural_summary(path: &str, content: &str) -> String {
    let line_count = content.lines().count();
    let mut parts = vec![if line_count == 1 {
        "1 line".to_string()
    } else {
        format!("{line_count} lines")
    }];

    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match PATTERNS.as_ref() {
        Ok(patterns) => match extension.as_str() {
            "py" => python_parts(patterns, content, &mut parts),
            "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" => script_parts(patterns, content, &mut parts),
            "rs" => rust_parts(patterns, content, &mut parts),
            _ => {}
        },
        Err(e) => warn!(error = %e, "Summary patterns failed to compile"),
    }

    if let Some(purpose) = purpose_line(content) {
        parts.push(format!("Purpose: {purpose}"));
    }

    truncate_chars(&parts.join("; "), STRUCTURAL_SUMMARY_MAX_CHARS)
}

fn python_parts(patterns: &Patterns, content: &str, parts: &mut Vec<String>) {
    let mut imports = Vec::new();
    let mut classes = Vec::new();
    let mut functions = Vec::new();
    for line in content.lines() {
        if let Some(caps) = patterns.py_import.captures(line)
            && let Some(name) = caps.get(1).or_else(|| caps.get(2))
        {
            imports.push(name.as_str());
        } else if let Some(name) = patterns.py_class.captures(line).and_then(|c| c.get(1)) {
            classes.push(name.as_str());
        } else if let Some(name) = patterns.py_def.captures(line).and_then(|c| c.get(1)) {
            functions.push(name.as_str());
        }
    }
    push_list(parts, "Imports", &imports, 3);
    push_list(parts, "Classes", &classes, 3);
    push_list(parts, "Functions", &functions, 5);
}

fn script_parts(patterns: &Patterns, content: &str, parts: &mut Vec<String>) {
    let imports = content.lines().filter(|l| patterns.js_import.is_match(l)).count();
    let functions = content.lines().filter(|l| patterns.js_function.is_match(l)).count();
    if imports > 0 {
        parts.push(format!("{imports} imports"));
    }
    if functions > 0 {
        parts.push(format!("{functions} functions"));
    }
}

fn rust_parts(patterns: &Patterns, content: &str, parts: &mut Vec<String>) {
    let mut uses = Vec::new();
    let mut items = Vec::new();
    for line in content.lines() {
        if let Some(caps) = patterns.rs_use.captures(line)
            && let Some(path) = caps.get(1)
        {
            uses.push(path.as_str().trim().to_string());
        } else if let Some(caps) = patterns.rs_item.captures(line)
            && let (Some(kind), Some(name)) = (caps.get(1), caps.get(2))
        {
            items.push(format!("{} {}", kind.as_str(), name.as_str()));
        }
    }
    push_list(parts, "Uses", &uses, 3);
    push_list(parts, "Items", &items, 5);
}

fn push_list<S: AsRef<str>>(parts: &mut Vec<String>, label: &str, names: &[S], limit: usize) {
    if names.is_empty() {
        return;
    }
    let shown: Vec<&str> = names.iter().take(limit).map(AsRef::as_ref).collect();
    parts.push(format!("{label}: {}", shown.join(", ")));
}

/// The first comment or docstring line among the first 10 lines, if it says something.
fn purpose_line(content: &str) -> Option<String> {
    const MARKERS: [&str; 8] = ["//!", "///", "//", "#", "\"\"\"", "'''", "/*", "*"];

    content.lines().take(10).find_map(|line| {
        let trimmed = line.trim();
        if trimmed.starts_with("#!") || trimmed.starts_with("#[") {
            return None;
        }
        let marker = MARKERS.iter().find(|m| trimmed.starts_with(**m))?;
        let text = trimmed[marker.len()..]
            .trim_end_matches("\"\"\"")
            .trim_end_matches("'''")
            .trim_end_matches("*/")
            .trim();
        (text.chars().count() > 10).then(|| text.to_string())
    })
}

/// Cap `text` at `max` characters, ending in `...` when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Summarizer that asks the model for a synopsis.
pub struct ProviderSummarizer {
    provider: Arc<dyn Provider>,
    model: String,
    max_chars: usize,
}

impl ProviderSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_chars: DEFAULT_SUMMARY_MAX_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    fn request(&self, path: &str, content: &str) -> ProviderRequest {
        let instruction = format!(
            "Summarize the file below in at most {} characters. Describe its purpose and its main \
             definitions. Reply with the summary only.",
            self.max_chars
        );
        let mut request = ProviderRequest::new(
            self.model.clone(),
            vec![
                Message::system(instruction),
                Message::user(format!("File: {path}\n\n{content}")),
            ],
        );
        request.temperature = 0.0;
        request
    }
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    async fn summarize(&self, path: &str, content: &str) -> String {
        match self.provider.complete(self.request(path, content)).await {
            Ok(response) if !response.message.content.trim().is_empty() => {
                debug!(path, "Model summary generated");
                truncate_chars(response.message.content.trim(), self.max_chars)
            }
            Ok(_) => {
                warn!(path, "Model returned an empty summary, using structural summary");
                structural_summary(path, content)
            }
            Err(e) => {
                warn!(path, error = %e, "Model summary failed, using structural summary");
                structural_summary(path, content)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeloop_core::error::ProviderError;
    use codeloop_core::provider::ProviderResponse;

    #[test]
    fn python_summary() {
        let content = "\"\"\"Utilities for parsing config files.\"\"\"\nimport os\nfrom pathlib import Path\nimport sys\nimport json\n\nclass Loader:\n    def load(self):\n        pass\n\ndef main():\n    pass\n";
        let summary = structural_summary("util.py", content);
        assert!(summary.starts_with("12 lines"));
        assert!(summary.contains("Imports: os, pathlib, sys"));
        assert!(!summary.contains("json"));
        assert!(summary.contains("Classes: Loader"));
        assert!(summary.contains("Functions: load, main"));
        assert!(summary.contains("Purpose: Utilities for parsing config files."));
    }

    #[test]
    fn rust_summary() {
        let content = "//! Parses the wire format.\nuse std::io;\nuse serde::Deserialize;\n\npub struct Frame;\npub(crate) enum Kind { A }\npub async fn read() {}\nfn helper() {}\n";
        let summary = structural_summary("src/wire.rs", content);
        assert!(summary.contains("Uses: std::io, serde::Deserialize"));
        assert!(summary.contains("Items: struct Frame, enum Kind, fn read, fn helper"));
        assert!(summary.contains("Purpose: Parses the wire format."));
    }

    #[test]
    fn script_summary_counts() {
        let content = "import x from 'x';\nconst y = require('y');\nexport function a() {}\nconst b = (n) => n;\n";
        let summary = structural_summary("app.ts", content);
        assert!(summary.contains("2 imports"));
        assert!(summary.contains("2 functions"));
    }

    #[test]
    fn plain_text_is_line_count_only() {
        assert_eq!(structural_summary("notes.txt", "one\ntwo"), "2 lines");
        assert_eq!(structural_summary("a.md", "x"), "1 line");
    }

    #[test]
    fn short_comments_are_not_a_purpose() {
        assert_eq!(structural_summary("a.py", "# todo\nx = 1\n"), "2 lines");
    }

    #[test]
    fn summary_is_capped() {
        let content: String = (0..200).map(|i| format!("def function_number_{i}():\n    pass\n")).collect();
        let long_purpose = format!("# {}\n{content}", "word ".repeat(200));
        let summary = structural_summary("big.py", &long_purpose);
        assert_eq!(summary.chars().count(), STRUCTURAL_SUMMARY_MAX_CHARS);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate_chars("héllo wörld", 8), "héllo...");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    struct FixedProvider(Result<String, ProviderError>);

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            assert_eq!(request.messages.len(), 2);
            self.0.clone().map(|text| ProviderResponse {
                message: Message::assistant(text),
                usage: None,
                model: request.model,
            })
        }
    }

    #[tokio::test]
    async fn provider_summary_is_truncated() {
        let summarizer = ProviderSummarizer::new(Arc::new(FixedProvider(Ok("x".repeat(600)))), "m");
        let summary = summarizer.summarize("a.py", "x = 1").await;
        assert_eq!(summary.chars().count(), 500);
        assert!(summary.ends_with("..."));
    }

    #[tokio::test]
    async fn provider_failure_falls_back() {
        let summarizer = ProviderSummarizer::new(
            Arc::new(FixedProvider(Err(ProviderError::Network("down".into())))),
            "m",
        );
        assert_eq!(summarizer.summarize("a.txt", "a\nb\nc").await, "3 lines");
    }
}

//! Code extraction from generated artifacts.
//!
//! Generator output mixes prose with fenced code blocks. This module pulls
//! the blocks out (```lang ... ```), together with an optional filename
//! hint taken from a leading `# filename: ...` / `// filename: ...` comment
//! line, so a multi-file artifact can be materialized into a project tree.

use regex::Regex;
use std::sync::LazyLock;

/// Matches one fenced code block: optional language word, then body.
static CODE_FENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\n(.*?)```").expect("Invalid code fence regex")
});

/// Matches a filename hint on the first line of a block.
static FILENAME_HINT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:#|//|--)\s*file(?:name)?\s*:\s*(\S+)\s*$").expect("Invalid filename hint regex")
});

/// One extracted code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Language word after the opening fence, if present.
    pub language: Option<String>,

    /// Filename hint from the block's first comment line, if present.
    pub filename: Option<String>,

    /// The code body, hint line removed, trimmed of outer blank lines.
    pub code: String,
}

impl CodeBlock {
    /// File extension implied by the language word.
    pub fn extension(&self) -> &'static str {
        match self.language.as_deref() {
            Some("python") | Some("py") => "py",
            Some("rust") | Some("rs") => "rs",
            Some("javascript") | Some("js") => "js",
            Some("typescript") | Some("ts") => "ts",
            Some("go") => "go",
            Some("java") => "java",
            Some("c") => "c",
            Some("cpp") | Some("c++") => "cpp",
            Some("sh") | Some("bash") | Some("shell") => "sh",
            Some("html") => "html",
            Some("css") => "css",
            Some("json") => "json",
            Some("yaml") | Some("yml") => "yaml",
            Some("toml") => "toml",
            Some("sql") => "sql",
            _ => "txt",
        }
    }
}

/// Extract every fenced code block, in document order.
pub fn extract_code_blocks(content: &str) -> Vec<CodeBlock> {
    CODE_FENCE_REGEX
        .captures_iter(content)
        .map(|caps| {
            let language = caps
                .get(1)
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase);

            let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let (filename, code) = split_filename_hint(body);

            CodeBlock {
                language,
                filename,
                code: code.trim_matches('\n').to_string(),
            }
        })
        .collect()
}

/// Flatten generated content into one code string.
///
/// Joins every fenced block with blank lines; when no fences are present
/// the whole content (trimmed) is treated as code, which keeps bare
/// generator output usable.
pub fn merged_code(content: &str) -> String {
    let blocks = extract_code_blocks(content);
    if blocks.is_empty() {
        return content.trim().to_string();
    }
    blocks
        .iter()
        .map(|b| b.code.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Pop a filename hint off the first line of a block body.
fn split_filename_hint(body: &str) -> (Option<String>, &str) {
    let mut lines = body.splitn(2, '\n');
    let first = lines.next().unwrap_or_default();
    if let Some(caps) = FILENAME_HINT_REGEX.captures(first.trim()) {
        let filename = caps.get(1).map(|m| m.as_str().to_string());
        (filename, lines.next().unwrap_or_default())
    } else {
        (None, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_block_with_language() {
        let content = "Here is the code:\n```python\nprint('hi')\n```\nDone.";
        let blocks = extract_code_blocks(content);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language.as_deref(), Some("python"));
        assert_eq!(blocks[0].code, "print('hi')");
        assert_eq!(blocks[0].extension(), "py");
        assert!(blocks[0].filename.is_none());
    }

    #[test]
    fn extracts_multiple_blocks_in_order() {
        let content = "```rust\nfn a() {}\n```\nprose\n```rust\nfn b() {}\n```";
        let blocks = extract_code_blocks(content);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].code, "fn a() {}");
        assert_eq!(blocks[1].code, "fn b() {}");
    }

    #[test]
    fn reads_filename_hints() {
        let content = "```python\n# filename: app/main.py\nprint('x')\n```\n\
                       ```rust\n// file: src/lib.rs\npub fn run() {}\n```";
        let blocks = extract_code_blocks(content);

        assert_eq!(blocks[0].filename.as_deref(), Some("app/main.py"));
        assert_eq!(blocks[0].code, "print('x')");
        assert_eq!(blocks[1].filename.as_deref(), Some("src/lib.rs"));
        assert_eq!(blocks[1].code, "pub fn run() {}");
    }

    #[test]
    fn bare_fence_has_no_language() {
        let content = "```\nplain text\n```";
        let blocks = extract_code_blocks(content);
        assert_eq!(blocks[0].language, None);
        assert_eq!(blocks[0].extension(), "txt");
    }

    #[test]
    fn merged_code_joins_blocks() {
        let content = "```py\na = 1\n```\ntext\n```py\nb = 2\n```";
        assert_eq!(merged_code(content), "a = 1\n\nb = 2");
    }

    #[test]
    fn merged_code_falls_back_to_whole_content() {
        let content = "  just code, no fences\n";
        assert_eq!(merged_code(content), "just code, no fences");
    }

    #[test]
    fn no_blocks_in_plain_prose() {
        assert!(extract_code_blocks("no code here").is_empty());
    }

    #[test]
    fn unclosed_fence_is_ignored() {
        assert!(extract_code_blocks("```python\nprint('x')").is_empty());
    }
}

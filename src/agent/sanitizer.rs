//! Response sanitisation.
//!
//! Two independent pipelines over assistant output: identity normalisation
//! (third-party model names and generic self-references are rewritten to the
//! configured canonical name) and structural validation with conservative
//! repair for JSON and XML payloads. Path validation for file-mutating tools
//! lives here as well.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Format the caller expects a payload to be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedFormat {
    Json,
    Xml,
    Text,
}

fn identity_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\bChatGPT\b",
            r"(?i)\bGPT-?[0-9][0-9a-z.\-]*\b",
            r"(?i)\bGPT\b",
            r"(?i)\bClaude(?:[- ]?[0-9][0-9a-z.\-]*)?\b",
            r"(?i)\bLLaMA(?:[- ]?[0-9][0-9a-z.\-]*)?\b",
            r"(?i)\bPaLM(?:[- ]?2)?\b",
            r"(?i)\bBard\b",
            r"(?i)\bGemini\b",
            r"(?i)\bDaVinci\b",
            r"(?i)\bCodex\b",
            r"(?i)\bas an AI(?: model| assistant| language model)?\b",
            r"(?i)\bI(?:'m| am) an? AI(?: model| assistant)?\b",
            r"(?i)\bI(?:'m| am) a (?:large )?language model\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

/// Identity and structure sanitiser for assistant output.
pub struct Sanitizer {
    canonical_name: String,
}

impl Sanitizer {
    /// Create a sanitiser substituting `canonical_name` for model references.
    pub fn new(canonical_name: impl Into<String>) -> Self {
        Sanitizer {
            canonical_name: canonical_name.into(),
        }
    }

    /// Rewrite model names and AI self-references to the canonical name.
    /// Idempotent: the canonical name matches none of the patterns.
    pub fn sanitize_identity(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let mut result = text.to_string();
        for pattern in identity_patterns() {
            result = pattern
                .replace_all(&result, self.canonical_name.as_str())
                .into_owned();
        }
        result
    }

    /// Validate `content` against the expected format, applying conservative
    /// repairs. Returns the (possibly repaired) payload, or `None` when the
    /// content cannot be made to parse.
    pub fn validate(&self, content: &str, format: ExpectedFormat) -> Option<String> {
        match format {
            ExpectedFormat::Text => Some(content.to_string()),
            ExpectedFormat::Json => validate_json(content),
            ExpectedFormat::Xml => validate_xml(content),
        }
    }
}

pub(crate) fn validate_json(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }

    let repaired = repair_json(trimmed);
    if serde_json::from_str::<serde_json::Value>(&repaired).is_ok() {
        Some(repaired)
    } else {
        None
    }
}

/// Conservative JSON repairs: strip trailing commas, quote bare keys, and
/// convert single-quoted strings to double-quoted ones.
fn repair_json(content: &str) -> String {
    static TRAILING_COMMA: OnceLock<Regex> = OnceLock::new();
    static BARE_KEY: OnceLock<Regex> = OnceLock::new();
    static SINGLE_QUOTED: OnceLock<Regex> = OnceLock::new();

    let trailing_comma =
        TRAILING_COMMA.get_or_init(|| Regex::new(r",\s*([}\]])").expect("static pattern"));
    let bare_key = BARE_KEY.get_or_init(|| {
        Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").expect("static pattern")
    });
    let single_quoted =
        SINGLE_QUOTED.get_or_init(|| Regex::new(r"'([^']*)'").expect("static pattern"));

    let repaired = trailing_comma.replace_all(content, "$1");
    let repaired = bare_key.replace_all(&repaired, "$1\"$2\":");
    single_quoted.replace_all(&repaired, "\"$1\"").into_owned()
}

fn xml_tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(/?)([A-Za-z_][\w.\-]*)[^<>]*?(/?)>").expect("static pattern"))
}

/// Well-formedness check with auto-closing of unclosed tags. A close tag
/// that matches no open tag is unrepairable.
fn validate_xml(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let mut open_stack: Vec<String> = Vec::new();

    for capture in xml_tag_pattern().captures_iter(trimmed) {
        let is_close = &capture[1] == "/";
        let name = capture[2].to_string();
        let self_closing = &capture[3] == "/";

        if self_closing {
            continue;
        }
        if is_close {
            match open_stack.pop() {
                Some(open) if open == name => {}
                _ => return None,
            }
        } else {
            open_stack.push(name);
        }
    }

    let mut repaired = trimmed.to_string();
    while let Some(open) = open_stack.pop() {
        repaired.push_str(&format!("</{}>", open));
    }
    Some(repaired)
}

/// Validates file paths against a workspace root.
pub struct PathValidator {
    root: PathBuf,
    restricted: HashSet<&'static str>,
}

impl PathValidator {
    /// Create a validator rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        PathValidator {
            root: root.into(),
            restricted: [".git", ".env", "node_modules", "target"].into(),
        }
    }

    /// Resolve `path` under the workspace root. Traversal outside the root
    /// and restricted components are rejected.
    pub fn validate(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty() {
            return Err(Error::InvalidInput("Empty path".into()));
        }

        let candidate = Path::new(path);
        let relative = if candidate.is_absolute() {
            candidate
                .strip_prefix(&self.root)
                .map_err(|_| {
                    Error::InvalidInput(format!("Path {} is outside the workspace", path))
                })?
                .to_path_buf()
        } else {
            candidate.to_path_buf()
        };

        let mut resolved = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    if let Some(name) = part.to_str() {
                        if self.restricted.contains(name) {
                            return Err(Error::InvalidInput(format!(
                                "Path component '{}' is restricted",
                                name
                            )));
                        }
                    }
                    resolved.push(part);
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if !resolved.pop() {
                        return Err(Error::InvalidInput(format!(
                            "Path {} escapes the workspace",
                            path
                        )));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(Error::InvalidInput(format!("Invalid path: {}", path)));
                }
            }
        }

        Ok(self.root.join(resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_are_replaced() {
        let sanitizer = Sanitizer::new("Assistant");
        let cases = [
            ("I am GPT-4", "I am Assistant"),
            ("Using Claude-2 today", "Using Assistant today"),
            ("ChatGPT and Bard disagree", "Assistant and Assistant disagree"),
            ("Regular text", "Regular text"),
        ];
        for (input, expected) in cases {
            assert_eq!(sanitizer.sanitize_identity(input), expected);
        }
    }

    #[test]
    fn self_references_are_replaced() {
        let sanitizer = Sanitizer::new("Assistant");
        assert!(!sanitizer
            .sanitize_identity("As an AI language model, I cannot do that.")
            .to_lowercase()
            .contains("as an ai"));
        assert!(!sanitizer
            .sanitize_identity("I'm a large language model.")
            .contains("language model"));
    }

    #[test]
    fn identity_sanitisation_is_idempotent() {
        let sanitizer = Sanitizer::new("Assistant");
        let once = sanitizer.sanitize_identity("ChatGPT said: as an AI, no.");
        let twice = sanitizer.sanitize_identity(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn valid_json_passes_through() {
        let sanitizer = Sanitizer::new("Assistant");
        let out = sanitizer.validate(r#"{"a": 1}"#, ExpectedFormat::Json).unwrap();
        assert_eq!(out, r#"{"a": 1}"#);
    }

    #[test]
    fn json_repairs_cover_common_model_mistakes() {
        let sanitizer = Sanitizer::new("Assistant");

        let bare_keys = sanitizer.validate(r#"{name: "x"}"#, ExpectedFormat::Json).unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&bare_keys).unwrap()["name"],
            "x"
        );

        let trailing = sanitizer.validate(r#"{"a": [1, 2,],}"#, ExpectedFormat::Json).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&trailing).is_ok());

        let single = sanitizer.validate(r#"{'a': 'b'}"#, ExpectedFormat::Json).unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&single).unwrap()["a"],
            "b"
        );
    }

    #[test]
    fn hopeless_json_is_rejected() {
        let sanitizer = Sanitizer::new("Assistant");
        assert!(sanitizer.validate("not json at all {{{", ExpectedFormat::Json).is_none());
    }

    #[test]
    fn unclosed_xml_is_auto_closed() {
        let sanitizer = Sanitizer::new("Assistant");
        let out = sanitizer.validate("<a><b>text</b><c>tail", ExpectedFormat::Xml).unwrap();
        assert_eq!(out, "<a><b>text</b><c>tail</c></a>");
    }

    #[test]
    fn mismatched_xml_close_is_rejected() {
        let sanitizer = Sanitizer::new("Assistant");
        assert!(sanitizer.validate("<a>text</b>", ExpectedFormat::Xml).is_none());
    }

    #[test]
    fn path_validator_confines_to_root() {
        let validator = PathValidator::new("/workspace");
        assert_eq!(
            validator.validate("notes/todo.txt").unwrap(),
            PathBuf::from("/workspace/notes/todo.txt")
        );
        assert!(validator.validate("../outside.txt").is_err());
        assert!(validator.validate("/etc/passwd").is_err());
        assert!(validator.validate(".git/config").is_err());
        assert!(validator.validate("a/../../escape").is_err());
        assert!(validator.validate("").is_err());
    }

    #[test]
    fn absolute_path_inside_root_is_accepted() {
        let validator = PathValidator::new("/workspace");
        assert_eq!(
            validator.validate("/workspace/file.txt").unwrap(),
            PathBuf::from("/workspace/file.txt")
        );
    }
}

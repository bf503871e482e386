//! Cleans free-text input before it reaches the plan generator.
//!
//! Lenient mode replaces prompt-injection phrases with `[REMOVED]` and keeps
//! going; strict mode refuses the input. HTML is stripped, dangerous
//! elements together with their content. Every change leaves a warning.

use anyhow::{bail, Context, Result};
use regex::Regex;

const PROMPT_INJECTION_PATTERNS: &[&str] = &[
    r"ignore\s+previous\s+instructions",
    r"ignore\s+all\s+previous",
    r"disregard\s+previous",
    r"forget\s+previous",
    r"you\s+are\s+now",
    r"new\s+instructions",
    r"system\s*:\s*",
    r"<\s*system\s*>",
    r"\[SYSTEM\]",
    r"execute\s+the\s+following",
];

const DANGEROUS_TAGS: &[&str] = &["script", "style", "iframe", "object", "embed", "noscript"];

const ZERO_WIDTH: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'];

const REMOVED: &str = "[REMOVED]";

#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub text: String,
    pub warnings: Vec<String>,
    pub was_modified: bool,
}

pub struct InputSanitizer {
    max_length: usize,
    strict: bool,
    injection: Vec<(String, Regex)>,
    dangerous: Vec<(String, Regex)>,
    any_tag: Regex,
}

impl InputSanitizer {
    pub fn new(max_length: usize, strict: bool) -> Result<Self> {
        let injection = PROMPT_INJECTION_PATTERNS
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i){}", p))
                    .map(|re| (p.to_string(), re))
                    .with_context(|| format!("Invalid injection pattern: {}", p))
            })
            .collect::<Result<Vec<_>>>()?;

        let dangerous = DANGEROUS_TAGS
            .iter()
            .map(|tag| {
                Regex::new(&format!(r"(?is)<{tag}[^>]*>.*?</{tag}\s*>"))
                    .map(|re| (tag.to_string(), re))
                    .with_context(|| format!("Invalid tag pattern: {}", tag))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            max_length,
            strict,
            injection,
            dangerous,
            any_tag: Regex::new(r"<[^>]+>")?,
        })
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Clean `text`. Fails only in strict mode, on an injection phrase.
    pub fn sanitize(&self, text: &str) -> Result<Sanitized> {
        let mut warnings = Vec::new();
        if text.is_empty() {
            return Ok(Sanitized {
                text: String::new(),
                warnings,
                was_modified: false,
            });
        }

        let mut out: String = if text.chars().count() > self.max_length {
            warnings.push(format!(
                "Input exceeds max length ({}). Truncating.",
                self.max_length
            ));
            text.chars().take(self.max_length).collect()
        } else {
            text.to_string()
        };

        for (pattern, re) in &self.injection {
            if !re.is_match(&out) {
                continue;
            }
            warnings.push(format!(
                "Potential prompt injection detected: pattern '{}'",
                pattern
            ));
            if self.strict {
                bail!("Prompt injection detected in strict mode: pattern '{}'", pattern);
            }
            out = re.replace_all(&out, REMOVED).into_owned();
        }

        for (tag, re) in &self.dangerous {
            if re.is_match(&out) {
                warnings.push(format!("Dangerous <{}> tag detected and removed completely", tag));
                out = re.replace_all(&out, "").into_owned();
            }
        }
        if self.any_tag.is_match(&out) {
            warnings.push("HTML tags detected and removed".to_string());
            out = self.any_tag.replace_all(&out, "").into_owned();
        }

        out.retain(|c| !ZERO_WIDTH.contains(&c));
        let out = out.split_whitespace().collect::<Vec<_>>().join(" ");

        Ok(Sanitized {
            was_modified: out != text,
            text: out,
            warnings,
        })
    }
}

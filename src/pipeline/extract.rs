//! Pulls test cases out of a markdown test plan.
//!
//! Cases are `###`/`####` headings (or unindented numbered lines when the
//! plan has no such headings) inside a "Test Cases" section, or anywhere in
//! the plan when there is no such section. Each case may carry
//! `Priority:`, `Type:`, `Description:`, `Preconditions:` and `Steps:`
//! fields. A plan with no recognizable case yields two generic ones.

use crate::adapter::types::{TestCase, TestPriority, TestType};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

const SKIP_TITLES: &[&str] = &["coverage", "gap", "recommendation", "strategy", "test cases"];
const DESCRIPTION_LIMIT: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageAnalysis {
    #[serde(default)]
    pub coverage: String,
    #[serde(default)]
    pub gaps: String,
    #[serde(default)]
    pub recommendations: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanExtraction {
    pub test_cases: Vec<TestCase>,
    pub coverage: CoverageAnalysis,
    /// True when nothing parsed and the generic cases were used.
    pub used_defaults: bool,
}

pub fn extract_plan(markdown: &str, app_name: &str, feature: &str) -> Result<PlanExtraction> {
    if markdown.trim().is_empty() {
        bail!("Plan response is empty");
    }
    let lines: Vec<&str> = markdown.lines().collect();

    let (body, min_level) = match find_section(&lines, "test case") {
        Some(section) => (&lines[section.start..section.end], section.level + 1),
        None => (&lines[..], 3),
    };

    let mut test_cases: Vec<TestCase> = split_cases(body, min_level)
        .into_iter()
        .filter(|(title, _)| {
            let lower = title.to_lowercase();
            !SKIP_TITLES.iter().any(|skip| lower.contains(skip))
        })
        .map(|(title, content)| parse_case(title, content, app_name, feature))
        .collect();

    let used_defaults = test_cases.is_empty();
    if used_defaults {
        test_cases = default_cases(app_name, feature);
    }

    Ok(PlanExtraction {
        test_cases,
        coverage: CoverageAnalysis {
            coverage: section_text(&lines, "coverage"),
            gaps: section_text(&lines, "gap"),
            recommendations: section_text(&lines, "recommendation"),
        },
        used_defaults,
    })
}

struct Section {
    level: usize,
    start: usize,
    end: usize,
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some((level, rest.trim()))
}

/// `12. Title` at the start of a line.
fn numbered(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = line[digits..].strip_prefix('.')?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let title = rest.trim();
    (!title.is_empty()).then_some(title)
}

fn clean_title(title: &str) -> String {
    title.trim().trim_matches('*').trim().to_string()
}

/// Heading section whose title mentions `keyword`, or a bold numbered item
/// (`2. **Coverage Analysis**`).
fn find_section(lines: &[&str], keyword: &str) -> Option<Section> {
    for (idx, line) in lines.iter().enumerate() {
        if let Some((level, title)) = heading(line) {
            if title.to_lowercase().contains(keyword) {
                let end = lines[idx + 1..]
                    .iter()
                    .position(|l| matches!(heading(l), Some((lvl, _)) if lvl <= level))
                    .map_or(lines.len(), |p| idx + 1 + p);
                return Some(Section {
                    level,
                    start: idx + 1,
                    end,
                });
            }
        } else if let Some(title) = numbered(line) {
            if title.starts_with("**") && title.to_lowercase().contains(keyword) {
                let end = lines[idx + 1..]
                    .iter()
                    .position(|l| numbered(l).is_some() || heading(l).is_some())
                    .map_or(lines.len(), |p| idx + 1 + p);
                return Some(Section {
                    level: 0,
                    start: idx + 1,
                    end,
                });
            }
        }
    }
    None
}

fn section_text(lines: &[&str], keyword: &str) -> String {
    find_section(lines, keyword)
        .map(|s| lines[s.start..s.end].join("\n").trim().to_string())
        .unwrap_or_default()
}

/// Split a block into (title, content lines) pairs.
fn split_cases<'a>(body: &[&'a str], min_level: usize) -> Vec<(String, Vec<&'a str>)> {
    let has_headings = body
        .iter()
        .any(|l| matches!(heading(l), Some((lvl, _)) if lvl >= min_level));

    let title_of = |line: &str| -> Option<String> {
        if has_headings {
            match heading(line) {
                Some((lvl, title)) if lvl >= min_level => Some(clean_title(title)),
                _ => None,
            }
        } else {
            numbered(line).map(clean_title)
        }
    };

    let mut cases: Vec<(String, Vec<&'a str>)> = Vec::new();
    for &line in body {
        match title_of(line) {
            Some(title) if !title.is_empty() => cases.push((title, Vec::new())),
            _ => {
                if let Some((_, content)) = cases.last_mut() {
                    content.push(line);
                }
            }
        }
    }
    cases
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Priority,
    Type,
    Description,
    Preconditions,
    Steps,
}

/// `- **Priority:** High` -> (Priority, "High")
fn field_start(line: &str) -> Option<(Field, String)> {
    let stripped = line.trim_start().trim_start_matches(['-', '*', ' ']);
    let (name, rest) = stripped.split_once(':')?;
    let field = match name.trim().trim_end_matches('*').trim().to_lowercase().as_str() {
        "priority" => Field::Priority,
        "type" | "test type" => Field::Type,
        "description" => Field::Description,
        "precondition" | "preconditions" => Field::Preconditions,
        "steps" | "test steps" => Field::Steps,
        _ => return None,
    };
    Some((field, rest.trim_start_matches('*').trim().to_string()))
}

/// `- item`, `* item`, `3. item`, `3) item` -> `item`
fn list_item(line: &str) -> &str {
    let t = line.trim();
    let t = t
        .strip_prefix("- ")
        .or_else(|| t.strip_prefix("* "))
        .unwrap_or(t);
    let digits = t.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        if let Some(rest) = t[digits..]
            .strip_prefix('.')
            .or_else(|| t[digits..].strip_prefix(')'))
        {
            return rest.trim();
        }
    }
    t.trim()
}

fn parse_case(title: String, content: Vec<&str>, app_name: &str, feature: &str) -> TestCase {
    let mut fields: Vec<(Field, Vec<String>)> = Vec::new();
    for line in &content {
        match field_start(line) {
            Some((field, rest)) => {
                let first = if rest.is_empty() { Vec::new() } else { vec![rest] };
                fields.push((field, first));
            }
            None => {
                if let Some((_, values)) = fields.last_mut() {
                    if !line.trim().is_empty() {
                        values.push(line.to_string());
                    }
                }
            }
        }
    }
    let field = |wanted: Field| fields.iter().find(|(f, _)| *f == wanted).map(|(_, v)| v);
    let first_word = |wanted: Field| -> Option<String> {
        field(wanted)
            .and_then(|v| v.first())
            .and_then(|s| s.split_whitespace().next())
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
    };

    let mut case = TestCase::new(title, app_name);
    case.feature = Some(feature.to_string());
    case.priority = first_word(Field::Priority)
        .and_then(|w| TestPriority::from_str_loose(&w))
        .unwrap_or_default();
    case.test_type = first_word(Field::Type)
        .and_then(|w| TestType::from_str_loose(&w))
        .unwrap_or_default();

    case.description = match field(Field::Description) {
        Some(lines) if !lines.is_empty() => lines
            .iter()
            .map(|l| l.trim())
            .collect::<Vec<_>>()
            .join(" "),
        _ => {
            let raw = content.join("\n").trim().to_string();
            if raw.chars().count() < DESCRIPTION_LIMIT {
                raw
            } else {
                let head: String = raw.chars().take(DESCRIPTION_LIMIT).collect();
                format!("{}...", head.trim())
            }
        }
    };

    if let Some(lines) = field(Field::Preconditions) {
        case.preconditions = lines
            .iter()
            .map(|l| list_item(l).to_string())
            .filter(|l| !l.is_empty())
            .collect();
    }
    if let Some(lines) = field(Field::Steps) {
        for line in lines {
            let action = list_item(line);
            if !action.is_empty() {
                case.add_step(action, "");
            }
        }
    }
    case
}

fn default_cases(app_name: &str, feature: &str) -> Vec<TestCase> {
    let mut basic = TestCase::new(format!("{} - Basic Functionality Test", feature), app_name);
    basic.description = format!("Verify basic functionality of {}", feature);
    basic.priority = TestPriority::High;
    basic.test_type = TestType::Functional;
    basic.feature = Some(feature.to_string());

    let mut errors = TestCase::new(format!("{} - Error Handling Test", feature), app_name);
    errors.description = format!("Verify error handling in {}", feature);
    errors.priority = TestPriority::Medium;
    errors.test_type = TestType::Negative;
    errors.feature = Some(feature.to_string());

    vec![basic, errors]
}

//! YAML settings parser.
//!
//! Every field is optional; anything left out keeps its default.
//!
//! # Example settings file:
//! ```yaml
//! hitl_mode: APPROVE_PLAN
//! approval_timeout_secs: 1800
//! reviewer: polling
//! poll_interval_ms: 500
//! plan_approval: detached
//! max_workers: 4
//! data_dir: ~/.regent
//! ```
//!
//! Environment variables `HITL_MODE`, `APPROVAL_TIMEOUT`, `MAX_WORKERS`,
//! `PARALLEL_EXECUTION` and `REGENT_DATA_DIR` override the file.

use crate::approval::policy::HitlMode;
use crate::config::types::*;
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Raw YAML representation before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    #[serde(default)]
    hitl_mode: Option<String>,
    #[serde(default)]
    approval_timeout_secs: Option<u64>,
    #[serde(default)]
    reviewer: Option<String>,
    #[serde(default)]
    poll_interval_ms: Option<u64>,
    #[serde(default)]
    plan_approval: Option<String>,
    #[serde(default)]
    max_workers: Option<usize>,
    #[serde(default)]
    parallel_execution: Option<bool>,
    #[serde(default)]
    data_dir: Option<String>,
    #[serde(default)]
    strict_input: Option<bool>,
    #[serde(default)]
    max_input_length: Option<usize>,
}

/// Parse a settings file.
pub fn parse_settings_file(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    let mut settings = parse_settings_str(&content)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

    // A relative data_dir is relative to the file that names it
    if settings.data_dir.is_relative() {
        if let Some(parent) = path.parent() {
            settings.data_dir = parent.join(&settings.data_dir);
        }
    }
    Ok(settings)
}

/// Parse settings from a YAML string.
pub fn parse_settings_str(yaml: &str) -> Result<Settings> {
    let has_content = yaml.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#') && line != "---"
    });
    let raw: RawSettings = if !has_content {
        RawSettings::default()
    } else {
        serde_yaml::from_str(yaml).context("Invalid YAML syntax in settings file")?
    };

    let mut settings = Settings::default();

    if let Some(mode) = raw.hitl_mode {
        settings.hitl_mode = parse_mode(&mode)?;
    }
    if let Some(timeout) = raw.approval_timeout_secs {
        settings.approval_timeout_secs = timeout;
    }
    if let Some(reviewer) = raw.reviewer {
        settings.reviewer = ReviewerKind::from_str_loose(&reviewer).ok_or_else(|| {
            anyhow!(
                "Unknown reviewer '{}' (expected console, polling, auto-approve or auto-deny)",
                reviewer
            )
        })?;
    }
    if let Some(interval) = raw.poll_interval_ms {
        settings.poll_interval_ms = interval;
    }
    if let Some(gate) = raw.plan_approval {
        settings.plan_approval = ApprovalGate::from_str_loose(&gate).ok_or_else(|| {
            anyhow!("Unknown plan_approval '{}' (expected detached or blocking)", gate)
        })?;
    }
    if let Some(workers) = raw.max_workers {
        settings.max_workers = workers;
    }
    if let Some(parallel) = raw.parallel_execution {
        settings.parallel_execution = parallel;
    }
    if let Some(dir) = raw.data_dir {
        settings.data_dir = expand_home(&dir);
    }
    if let Some(strict) = raw.strict_input {
        settings.strict_input = strict;
    }
    if let Some(max_len) = raw.max_input_length {
        settings.max_input_length = max_len;
    }

    validate(&settings)?;
    Ok(settings)
}

/// Apply environment overrides. `lookup` is `std::env::var` in production.
pub fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(mode) = lookup("HITL_MODE") {
        settings.hitl_mode = parse_mode(&mode).context("Invalid HITL_MODE")?;
    }
    if let Some(timeout) = lookup("APPROVAL_TIMEOUT") {
        settings.approval_timeout_secs = timeout
            .trim()
            .parse()
            .with_context(|| format!("Invalid APPROVAL_TIMEOUT '{}'", timeout))?;
    }
    if let Some(workers) = lookup("MAX_WORKERS") {
        settings.max_workers = workers
            .trim()
            .parse()
            .with_context(|| format!("Invalid MAX_WORKERS '{}'", workers))?;
    }
    if let Some(parallel) = lookup("PARALLEL_EXECUTION") {
        settings.parallel_execution = parse_bool(&parallel)
            .ok_or_else(|| anyhow!("Invalid PARALLEL_EXECUTION '{}'", parallel))?;
    }
    if let Some(dir) = lookup("REGENT_DATA_DIR") {
        settings.data_dir = expand_home(&dir);
    }
    validate(settings)
}

/// Find `.regent.yaml` by walking up from `start`.
pub fn find_settings_file(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(SETTINGS_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Load settings for this process: the explicit file, else the nearest
/// `.regent.yaml`, else defaults; then environment overrides.
/// Returns the settings and the file they came from.
pub fn load_settings(explicit: Option<&Path>) -> Result<(Settings, Option<PathBuf>)> {
    let source = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            find_settings_file(&cwd)
        }
    };

    let mut settings = match source {
        Some(ref path) => parse_settings_file(path)?,
        None => Settings::default(),
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;

    debug!(
        source = ?source,
        mode = %settings.hitl_mode,
        reviewer = %settings.reviewer,
        data_dir = %settings.data_dir.display(),
        "Settings loaded"
    );
    Ok((settings, source))
}

fn parse_mode(s: &str) -> Result<HitlMode> {
    s.parse::<HitlMode>().map_err(|e| anyhow!(e))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn validate(settings: &Settings) -> Result<()> {
    if settings.approval_timeout_secs == 0 {
        bail!("approval_timeout_secs must be greater than zero");
    }
    if settings.poll_interval_ms == 0 {
        bail!("poll_interval_ms must be greater than zero");
    }
    if settings.max_input_length == 0 {
        bail!("max_input_length must be greater than zero");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_settings() {
        let yaml = r#"
hitl_mode: APPROVE_ALL
approval_timeout_secs: 120
reviewer: polling
poll_interval_ms: 250
plan_approval: blocking
max_workers: 2
parallel_execution: false
data_dir: /var/lib/regent
strict_input: true
max_input_length: 500
"#;
        let s = parse_settings_str(yaml).unwrap();
        assert_eq!(s.hitl_mode, HitlMode::ApproveAll);
        assert_eq!(s.approval_timeout_secs, 120);
        assert_eq!(s.reviewer, ReviewerKind::Polling);
        assert_eq!(s.poll_interval_ms, 250);
        assert_eq!(s.plan_approval, ApprovalGate::Blocking);
        assert_eq!(s.max_workers, 2);
        assert!(!s.parallel_execution);
        assert_eq!(s.data_dir, PathBuf::from("/var/lib/regent"));
        assert!(s.strict_input);
        assert_eq!(s.max_input_length, 500);
    }

    #[test]
    fn test_empty_file_is_defaults() {
        assert_eq!(parse_settings_str("").unwrap(), Settings::default());
        assert_eq!(parse_settings_str("# nothing\n").unwrap(), Settings::default());
    }

    #[test]
    fn test_loose_mode_names() {
        let s = parse_settings_str("hitl_mode: full-auto").unwrap();
        assert_eq!(s.hitl_mode, HitlMode::FullAuto);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(parse_settings_str("hitl_mode: sometimes").is_err());
        assert!(parse_settings_str("reviewer: pigeon").is_err());
        assert!(parse_settings_str("approval_timeout_secs: 0").is_err());
        assert!(parse_settings_str("poll_interval_ms: 0").is_err());
        assert!(parse_settings_str("plan_approval: later").is_err());
        assert!(parse_settings_str("unknown_key: 1").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("HITL_MODE", "INTERACTIVE"),
            ("APPROVAL_TIMEOUT", "60"),
            ("MAX_WORKERS", "9"),
            ("PARALLEL_EXECUTION", "no"),
            ("REGENT_DATA_DIR", "/tmp/regent-data"),
        ]
        .into_iter()
        .collect();

        let mut s = Settings::default();
        apply_env_overrides(&mut s, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(s.hitl_mode, HitlMode::Interactive);
        assert_eq!(s.approval_timeout_secs, 60);
        assert_eq!(s.max_workers, 9);
        assert!(!s.parallel_execution);
        assert_eq!(s.data_dir, PathBuf::from("/tmp/regent-data"));
    }

    #[test]
    fn test_bad_env_override() {
        let mut s = Settings::default();
        let err = apply_env_overrides(&mut s, |k| {
            (k == "APPROVAL_TIMEOUT").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(format!("{:#}", err).contains("APPROVAL_TIMEOUT"));
    }

    #[test]
    fn test_relative_data_dir_resolved_against_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "data_dir: state\n").unwrap();

        let s = parse_settings_file(&path).unwrap();
        assert_eq!(s.data_dir, tmp.path().join("state"));
    }

    #[test]
    fn test_find_settings_walks_up() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(SETTINGS_FILE_NAME), "").unwrap();
        let nested = tmp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_settings_file(&nested),
            Some(tmp.path().join(SETTINGS_FILE_NAME))
        );
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x"), home.join("x"));
        }
        assert_eq!(expand_home("/abs"), PathBuf::from("/abs"));
    }
}

//! Run checkpoints: append-only JSONL, one file per run.
//!
//! Each line is the full [`PlanningState`] after a stage, so the last line
//! of a file is enough to inspect or resume the run. Lines are flushed as
//! they are written.

use crate::pipeline::state::{PlanningState, RunStatus, Stage};
use crate::utils::ids::is_valid_record_id;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One stage transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub stage: Stage,
    pub state: PlanningState,
}

/// Appends checkpoints for a single run.
pub struct CheckpointLogger {
    path: PathBuf,
    file: File,
    entry_count: usize,
}

impl CheckpointLogger {
    /// Open (or continue) the log of `run_id` under `dir`.
    pub fn open(dir: impl AsRef<Path>, run_id: &str) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create runs directory: {}", dir.display()))?;
        Self::with_path(run_path(dir, run_id)?)
    }

    pub fn with_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open checkpoint log: {}", path.display()))?;
        Ok(Self {
            path,
            file,
            entry_count: 0,
        })
    }

    pub fn record(&mut self, stage: Stage, state: &PlanningState) -> Result<()> {
        let entry = Checkpoint {
            timestamp: Utc::now(),
            run_id: state.run_id.clone(),
            stage,
            state: state.clone(),
        };
        let json = serde_json::to_string(&entry).context("Failed to serialize checkpoint")?;
        writeln!(self.file, "{}", json).context("Failed to write checkpoint")?;
        self.file.flush().context("Failed to flush checkpoint log")?;
        self.entry_count += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }
}

/// One line of `regent runs list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub app_name: String,
    pub feature: String,
    pub status: RunStatus,
    pub last_stage: Stage,
    pub stages: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// Reads checkpoint logs from a runs directory.
pub struct CheckpointReader {
    dir: PathBuf,
}

impl CheckpointReader {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn read_run(&self, run_id: &str) -> Result<Vec<Checkpoint>> {
        Self::read_file(&run_path(&self.dir, run_id)?)
    }

    fn read_file(path: &Path) -> Result<Vec<Checkpoint>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read checkpoint log: {}", path.display()))?;

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("Failed to parse checkpoint at {}:{}", path.display(), i + 1)
                })
            })
            .collect()
    }

    /// State after the last recorded stage.
    pub fn latest_snapshot(&self, run_id: &str) -> Result<Option<PlanningState>> {
        Ok(self.read_run(run_id)?.pop().map(|c| c.state))
    }

    /// Run IDs with a log in the directory, sorted.
    pub fn list_runs(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut runs: Vec<String> = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read runs directory: {}", self.dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
            .collect();
        runs.sort();
        Ok(runs)
    }

    /// Every run, most recently updated first. Empty logs are skipped.
    pub fn summaries(&self) -> Result<Vec<RunSummary>> {
        let mut summaries = Vec::new();
        for run_id in self.list_runs()? {
            let checkpoints = self.read_run(&run_id)?;
            let Some(last) = checkpoints.last() else {
                continue;
            };
            summaries.push(RunSummary {
                run_id: run_id.clone(),
                app_name: last.state.app_name.clone(),
                feature: last.state.feature_description.clone(),
                status: last.state.status,
                last_stage: last.stage,
                stages: checkpoints.len(),
                started_at: last.state.started_at,
                updated_at: last.timestamp,
                error: last.state.error.clone(),
            });
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Most recently updated run.
    pub fn latest_run(&self) -> Result<Option<RunSummary>> {
        Ok(self.summaries()?.into_iter().next())
    }
}

/// Log file of `run_id` under `dir`. Refuses IDs that would leave `dir`.
fn run_path(dir: &Path, run_id: &str) -> Result<PathBuf> {
    if !is_valid_record_id(run_id) {
        bail!("Invalid run id: '{}'", run_id);
    }
    Ok(dir.join(format!("{}.jsonl", run_id)))
}

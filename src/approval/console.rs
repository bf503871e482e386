//! Interactive console reviewer.
//!
//! Renders the request on the terminal and reads the decision line by line.
//! Input and output are injectable so the dialogue can be scripted.
//!
//! Input is read on a dedicated thread, one line per request, so a dialogue
//! can stop waiting at the approval's deadline while the read stays parked.
//! Lines that arrive while no prompt is open are discarded.

use crate::adapter::types::{TestResult, TestStatus};
use crate::approval::types::{Approval, ReviewDecision};
use crate::approval::Reviewer;
use crate::feedback::types::{FeedbackDraft, MAX_RATING, MIN_RATING};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

const RULE: &str = "════════════════════════════════════════════════════════════\n";
const PREVIEW_LINES: usize = 12;
const DEFAULT_REVIEWER: &str = "human";
const DEFAULT_REJECTION: &str = "Not approved";
const DEFAULT_RATING: u8 = 3;

type LineResult = std::io::Result<Option<String>>;

/// Reads one line from the input each time it is asked to.
struct LineReader {
    requests: Sender<()>,
    lines: Receiver<LineResult>,
    outstanding: bool,
}

impl LineReader {
    fn spawn(mut input: Box<dyn BufRead + Send>) -> Self {
        let (requests, wanted) = mpsc::channel::<()>();
        let (sender, lines) = mpsc::channel::<LineResult>();
        std::thread::spawn(move || {
            while wanted.recv().is_ok() {
                let mut line = String::new();
                let read = input
                    .read_line(&mut line)
                    .map(|n| if n == 0 { None } else { Some(line) });
                if sender.send(read).is_err() {
                    break;
                }
            }
        });
        Self {
            requests,
            lines,
            outstanding: false,
        }
    }

    /// Drop answers to prompts that are no longer open.
    fn discard_stale(&mut self) {
        while let Ok(stale) = self.lines.try_recv() {
            self.outstanding = false;
            debug!(line = ?stale.ok().flatten(), "Discarding console input for a closed prompt");
        }
    }

    fn next_line(&mut self, deadline: Option<Instant>) -> Result<String> {
        if !self.outstanding {
            self.requests
                .send(())
                .map_err(|_| anyhow!("Console input reader has stopped"))?;
            self.outstanding = true;
        }

        let received = match deadline {
            Some(at) => self
                .lines
                .recv_timeout(at.saturating_duration_since(Instant::now())),
            None => self.lines.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        let read = match received {
            Ok(read) => {
                self.outstanding = false;
                read
            }
            Err(RecvTimeoutError::Timeout) => bail!("Review deadline passed while waiting for input"),
            Err(RecvTimeoutError::Disconnected) => bail!("Console input reader has stopped"),
        };

        match read.context("Failed to read reviewer input")? {
            Some(line) => Ok(line),
            None => bail!("Console input closed before a decision was made"),
        }
    }
}

/// The terminal a reviewer talks to.
pub struct ConsoleIo {
    input: LineReader,
    output: Box<dyn Write + Send>,
    deadline: Option<Instant>,
}

impl ConsoleIo {
    fn ask(&mut self, label: &str, default: Option<&str>) -> Result<String> {
        match default {
            Some(d) if !d.is_empty() => write!(self.output, "{} [{}]: ", label, d)?,
            _ => write!(self.output, "{}: ", label)?,
        }
        self.output.flush()?;

        let line = self.input.next_line(self.deadline)?;
        let answer = line.trim();
        if answer.is_empty() {
            Ok(default.unwrap_or_default().to_string())
        } else {
            Ok(answer.to_string())
        }
    }

    fn confirm(&mut self, label: &str, default: bool) -> Result<bool> {
        let hint = if default { "Y/n" } else { "y/N" };
        loop {
            let answer = self.ask(&format!("{} ({})", label, hint), Some(""))?;
            match answer.to_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => writeln!(self.output, "  Please answer y or n.")?,
            }
        }
    }

    fn render_approval(&mut self, approval: &Approval) -> Result<()> {
        let remaining = approval.time_remaining(Utc::now()).as_secs();
        execute!(
            self.output,
            Print("\n"),
            SetForegroundColor(Color::Yellow),
            Print(RULE),
            Print("  APPROVAL REQUIRED\n"),
            Print(RULE),
            ResetColor,
            Print(format!("  ID:       {}\n", approval.id)),
            Print(format!("  Type:     {}\n", approval.approval_type)),
            Print(format!("  Item:     {}\n", approval.item_id)),
            Print(format!("  Expires:  in {}s\n\n", remaining)),
        )?;

        for line in approval.item_summary.lines() {
            execute!(self.output, Print(format!("  {}\n", line)))?;
        }

        let pretty = serde_json::to_string_pretty(&approval.item_data)
            .unwrap_or_else(|_| approval.item_data.to_string());
        let total = pretty.lines().count();
        execute!(self.output, Print("\n"), SetForegroundColor(Color::DarkGrey))?;
        for line in pretty.lines().take(PREVIEW_LINES) {
            execute!(self.output, Print(format!("    {}\n", truncate(line, 72))))?;
        }
        if total > PREVIEW_LINES {
            execute!(
                self.output,
                Print(format!("    ... {} more lines\n", total - PREVIEW_LINES))
            )?;
        }

        execute!(
            self.output,
            ResetColor,
            Print("\n  "),
            SetForegroundColor(Color::Green),
            Print("[1] Approve   "),
            SetForegroundColor(Color::Red),
            Print("[2] Reject   "),
            SetForegroundColor(Color::Blue),
            Print("[3] Modify\n"),
            ResetColor,
        )?;
        Ok(())
    }

    fn review(&mut self, approval: &Approval) -> Result<ReviewDecision> {
        let now = Utc::now();
        if approval.is_expired(now) {
            bail!("Approval {} expired before it could be reviewed", approval.id);
        }
        self.deadline = Some(Instant::now() + approval.time_remaining(now));
        let decision = self.review_dialogue(approval);
        self.deadline = None;
        decision
    }

    fn review_dialogue(&mut self, approval: &Approval) -> Result<ReviewDecision> {
        self.render_approval(approval)?;

        let choice = loop {
            let answer = self.ask("Decision", None)?;
            match answer.to_lowercase().as_str() {
                "1" | "a" | "approve" => break 1,
                "2" | "r" | "reject" => break 2,
                "3" | "m" | "modify" => break 3,
                _ => writeln!(self.output, "  Enter 1, 2 or 3.")?,
            }
        };

        let approver = self.ask("Your name", Some(DEFAULT_REVIEWER))?;
        let decision = match choice {
            1 => {
                let comments = self.ask("Comments (optional)", Some(""))?;
                ReviewDecision::Approve {
                    approver,
                    comments: non_empty(comments),
                }
            }
            2 => {
                let reason = self.ask("Reason", Some(DEFAULT_REJECTION))?;
                ReviewDecision::Reject { approver, reason }
            }
            _ => {
                let notes = loop {
                    let notes = self.ask("Describe the modifications", None)?;
                    if !notes.is_empty() {
                        break notes;
                    }
                };
                // Notes describe the change; the item itself is kept as is
                ReviewDecision::Modify {
                    approver,
                    modifications: json!({ "notes": notes }),
                    modified_item: Some(approval.item_data.clone()),
                    comments: None,
                }
            }
        };

        let (color, label) = match decision {
            ReviewDecision::Approve { .. } => (Color::Green, "✓ Approved"),
            ReviewDecision::Reject { .. } => (Color::Red, "✗ Rejected"),
            _ => (Color::Blue, "✎ Modified"),
        };
        execute!(
            self.output,
            SetForegroundColor(color),
            Print(format!("\n  {}\n\n", label)),
            ResetColor,
        )?;
        Ok(decision)
    }

    fn feedback(&mut self, result: &TestResult, prompt: &str) -> Result<Option<FeedbackDraft>> {
        let color = match result.status {
            TestStatus::Passed => Color::Green,
            TestStatus::Failed | TestStatus::Error => Color::Red,
            _ => Color::Yellow,
        };
        execute!(
            self.output,
            Print("\n"),
            SetForegroundColor(color),
            Print(format!("  {} [{}]\n", result.test_name, result.status)),
            ResetColor,
        )?;
        if let Some(ref err) = result.error_message {
            execute!(
                self.output,
                SetForegroundColor(Color::DarkGrey),
                Print(format!("  {}\n", truncate(err, 72))),
                ResetColor,
            )?;
        }
        execute!(self.output, Print(format!("  {}\n", prompt)))?;

        if !self.confirm("Provide feedback?", false)? {
            return Ok(None);
        }

        let provided_by = self.ask("Your name", Some(DEFAULT_REVIEWER))?;
        let rating = loop {
            let answer = self.ask(
                &format!("Rating ({}-{})", MIN_RATING, MAX_RATING),
                Some(&DEFAULT_RATING.to_string()),
            )?;
            match answer.parse::<u8>() {
                Ok(r) if (MIN_RATING..=MAX_RATING).contains(&r) => break r,
                _ => writeln!(
                    self.output,
                    "  Enter a number from {} to {}.",
                    MIN_RATING, MAX_RATING
                )?,
            }
        };
        let comment = self.ask("Comment", Some(""))?;

        let mut draft = FeedbackDraft {
            rating: Some(rating),
            comment,
            provided_by,
            ..Default::default()
        };
        if result.status == TestStatus::Failed {
            draft.is_false_positive = self.confirm("Is this a false positive?", false)?;
            draft.is_known_issue = self.confirm("Is this a known issue?", false)?;
            draft.needs_investigation =
                self.confirm("Needs investigation?", !draft.is_known_issue)?;
        }
        Ok(Some(draft))
    }
}

/// Reviewer that asks on a terminal.
///
/// The dialogue runs on a blocking thread and gives up at the approval's
/// deadline, so a prompt nobody answers never holds the terminal past it.
#[derive(Clone)]
pub struct ConsoleReviewer {
    io: Arc<Mutex<ConsoleIo>>,
}

impl ConsoleReviewer {
    /// Talk to the process's stdin/stdout.
    pub fn stdio() -> Self {
        Self::with_io(BufReader::new(std::io::stdin()), std::io::stdout())
    }

    pub fn with_io(
        input: impl BufRead + Send + 'static,
        output: impl Write + Send + 'static,
    ) -> Self {
        Self {
            io: Arc::new(Mutex::new(ConsoleIo {
                input: LineReader::spawn(Box::new(input)),
                output: Box::new(output),
                deadline: None,
            })),
        }
    }

    async fn run<T, F>(&self, dialogue: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut ConsoleIo) -> Result<T> + Send + 'static,
    {
        let io = Arc::clone(&self.io);
        tokio::task::spawn_blocking(move || {
            let mut guard = io
                .lock()
                .map_err(|_| anyhow!("Console reviewer is unusable after a panic"))?;
            guard.input.discard_stale();
            dialogue(&mut *guard)
        })
        .await?
    }
}

impl Default for ConsoleReviewer {
    fn default() -> Self {
        Self::stdio()
    }
}

#[async_trait]
impl Reviewer for ConsoleReviewer {
    fn name(&self) -> &str {
        "console"
    }

    async fn review_approval(&self, approval: &Approval) -> Result<ReviewDecision> {
        let approval = approval.clone();
        self.run(move |io| io.review(&approval)).await
    }

    async fn collect_feedback(
        &self,
        result: &TestResult,
        prompt: &str,
    ) -> Result<Option<FeedbackDraft>> {
        let result = result.clone();
        let prompt = prompt.to_string();
        self.run(move |io| io.feedback(&result, &prompt)).await
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

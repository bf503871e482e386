//! Test execution through an [`Adapter`].
//!
//! Cases run either one after another or on a bounded worker pool. Each case
//! runs in its own task: an adapter error or a panic turns into an ERROR
//! result for that case and never takes down the batch. In parallel mode
//! results are collected in completion order.
//!
//! A batch checks the adapter's state and authentication first and always
//! ends with its cleanup. If the adapter is not ready every case comes back
//! ERROR with the reason and none of them run.

use crate::adapter::types::{TestCase, TestResult, TestStatus};
use crate::adapter::Adapter;
use crate::config::types::DEFAULT_MAX_WORKERS;
use crate::feedback::FeedbackCollector;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct TestExecutor {
    adapter: Arc<dyn Adapter>,
    max_workers: usize,
    parallel: bool,
    feedback: Option<Arc<FeedbackCollector>>,
    results: Arc<Mutex<Vec<TestResult>>>,
}

impl TestExecutor {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self {
            adapter,
            max_workers: DEFAULT_MAX_WORKERS,
            parallel: true,
            feedback: None,
            results: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Worker pool size for parallel runs. Zero is treated as one.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Ask for human feedback on every failed result after a batch.
    pub fn with_feedback(mut self, collector: Arc<FeedbackCollector>) -> Self {
        self.feedback = Some(collector);
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run a batch and return its results. Results also accumulate on the
    /// executor for [`summary`](Self::summary).
    pub async fn execute_tests(&self, cases: Vec<TestCase>) -> Vec<TestResult> {
        info!(
            count = cases.len(),
            mode = if self.parallel { "parallel" } else { "sequential" },
            workers = self.max_workers,
            "Executing test cases"
        );

        let mut results = match self.preflight().await {
            Some(reason) => {
                error!(adapter = self.adapter.name(), reason = %reason, "Adapter not ready; skipping batch");
                cases
                    .iter()
                    .map(|case| TestResult::errored(case, reason.clone()))
                    .collect()
            }
            None if self.parallel => self.run_parallel(cases).await,
            None => self.run_sequential(cases).await,
        };

        if let Err(e) = self.adapter.cleanup().await {
            warn!(adapter = self.adapter.name(), error = %format!("{:#}", e), "Adapter cleanup failed");
        }

        if let Some(ref collector) = self.feedback {
            collect_failure_feedback(collector, &mut results).await;
        }

        let passed = results.iter().filter(|r| r.is_success()).count();
        info!(passed, failed = results.len() - passed, "Execution complete");

        self.results.lock().await.extend(results.iter().cloned());
        results
    }

    /// Run a single case.
    pub async fn execute_test(&self, case: TestCase) -> TestResult {
        let fallback = case.clone();
        self.execute_tests(vec![case])
            .await
            .pop()
            .unwrap_or_else(|| TestResult::errored(&fallback, "No result produced"))
    }

    /// Every result recorded by this executor so far.
    pub async fn results(&self) -> Vec<TestResult> {
        self.results.lock().await.clone()
    }

    pub async fn summary(&self) -> ExecutionSummary {
        ExecutionSummary::from_results(&self.results.lock().await)
    }

    /// Why the adapter cannot run a batch, if it cannot.
    async fn preflight(&self) -> Option<String> {
        match self.adapter.validate_state().await {
            Ok(true) => {}
            Ok(false) => return Some(format!("Adapter '{}' is not in a testable state", self.adapter.name())),
            Err(e) => return Some(format!("Adapter '{}' state check failed: {:#}", self.adapter.name(), e)),
        }
        match self.adapter.authenticate().await {
            Ok(true) => None,
            Ok(false) => Some(format!("Adapter '{}' could not authenticate", self.adapter.name())),
            Err(e) => Some(format!("Adapter '{}' authentication failed: {:#}", self.adapter.name(), e)),
        }
    }

    async fn run_sequential(&self, cases: Vec<TestCase>) -> Vec<TestResult> {
        let total = cases.len();
        let mut results = Vec::with_capacity(total);
        for (idx, case) in cases.into_iter().enumerate() {
            info!(test = %case.name, "Executing test {}/{}", idx + 1, total);
            let handle = spawn_case(Arc::clone(&self.adapter), case.clone(), None);
            results.push(join_case(&case, handle).await);
        }
        results
    }

    async fn run_parallel(&self, cases: Vec<TestCase>) -> Vec<TestResult> {
        let permits = Arc::new(Semaphore::new(self.max_workers));
        let collected = Arc::new(Mutex::new(Vec::with_capacity(cases.len())));

        let handles: Vec<(TestCase, JoinHandle<()>)> = cases
            .into_iter()
            .map(|case| {
                let task = spawn_case(Arc::clone(&self.adapter), case.clone(), Some(Arc::clone(&permits)));
                let collected = Arc::clone(&collected);
                let fallback = case.clone();
                let handle = tokio::spawn(async move {
                    let result = join_case(&fallback, task).await;
                    info!(test = %result.test_name, status = %result.status, "Completed");
                    collected.lock().await.push(result);
                });
                (case, handle)
            })
            .collect();

        for (case, handle) in handles {
            if let Err(e) = handle.await {
                error!(test = %case.name, error = %e, "Result collection task failed");
                collected
                    .lock()
                    .await
                    .push(TestResult::errored(&case, format!("Result collection failed: {}", e)));
            }
        }

        let mut guard = collected.lock().await;
        std::mem::take(&mut *guard)
    }
}

fn spawn_case(
    adapter: Arc<dyn Adapter>,
    case: TestCase,
    permits: Option<Arc<Semaphore>>,
) -> JoinHandle<TestResult> {
    tokio::spawn(async move {
        let _permit = match permits {
            Some(sem) => match sem.acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => return TestResult::errored(&case, "Worker pool closed"),
            },
            None => None,
        };
        match adapter.execute_test(&case).await {
            Ok(result) => result,
            Err(e) => {
                warn!(test = %case.name, adapter = adapter.name(), error = %e, "Adapter failed");
                TestResult::errored(&case, format!("{:#}", e))
            }
        }
    })
}

async fn join_case(case: &TestCase, handle: JoinHandle<TestResult>) -> TestResult {
    match handle.await {
        Ok(result) => result,
        Err(e) => {
            error!(test = %case.name, error = %e, "Test task panicked");
            TestResult::errored(case, format!("Test task panicked: {}", e))
        }
    }
}

async fn collect_failure_feedback(collector: &FeedbackCollector, results: &mut [TestResult]) {
    let failed: Vec<&mut TestResult> = results
        .iter_mut()
        .filter(|r| r.status == TestStatus::Failed)
        .collect();
    if failed.is_empty() {
        return;
    }
    info!(count = failed.len(), "Collecting feedback on failed tests");

    for result in failed {
        match collector.collect_test_feedback(result, None).await {
            Ok(Some(_)) => info!(test = %result.test_name, "Feedback collected"),
            Ok(None) => {}
            Err(e) => warn!(test = %result.test_name, error = %format!("{:#}", e), "Feedback collection failed"),
        }
    }
}

/// Totals over a set of results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub error: usize,
    /// Percentage of passed results, 0 when there are none.
    pub pass_rate: f64,
    pub total_duration_seconds: f64,
}

impl ExecutionSummary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let count = |status: TestStatus| results.iter().filter(|r| r.status == status).count();
        let total = results.len();
        let passed = count(TestStatus::Passed);
        let pass_rate = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64 * 100.0
        };

        Self {
            total,
            passed,
            failed: count(TestStatus::Failed),
            skipped: count(TestStatus::Skipped),
            error: count(TestStatus::Error),
            pass_rate,
            total_duration_seconds: results.iter().map(|r| r.metrics.duration_seconds).sum(),
        }
    }
}

impl fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total, {} passed, {} failed, {} skipped, {} error ({:.1}% pass rate, {:.2}s)",
            self.total,
            self.passed,
            self.failed,
            self.skipped,
            self.error,
            self.pass_rate,
            self.total_duration_seconds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::types::{Capabilities, DiscoveryResult, TestMetrics};
    use crate::approval::ScriptedReviewer;
    use crate::feedback::{FeedbackDraft, FeedbackStore};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Passes cases named "ok*", fails "bad*", errors on "err*" and panics
    /// on "panic*". Tracks the peak number of concurrent executions and
    /// counts lifecycle calls.
    #[derive(Default)]
    struct FakeAdapter {
        running: AtomicUsize,
        peak: AtomicUsize,
        executed: AtomicUsize,
        validations: AtomicUsize,
        logins: AtomicUsize,
        cleanups: AtomicUsize,
        broken: bool,
        locked_out: bool,
    }

    #[async_trait]
    impl Adapter for FakeAdapter {
        fn name(&self) -> &str {
            "fake"
        }

        async fn discover(&self) -> Result<DiscoveryResult> {
            Ok(DiscoveryResult::default())
        }

        async fn execute_test(&self, case: &TestCase) -> Result<TestResult> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            let start = Utc::now();
            let status = if case.name.starts_with("ok") {
                TestStatus::Passed
            } else if case.name.starts_with("bad") {
                TestStatus::Failed
            } else if case.name.starts_with("err") {
                bail!("browser crashed");
            } else {
                panic!("adapter bug");
            };
            Ok(TestResult::new(case, status, TestMetrics::between(start, Utc::now())))
        }

        async fn validate_state(&self) -> Result<bool> {
            self.validations.fetch_add(1, Ordering::SeqCst);
            Ok(!self.broken)
        }

        async fn authenticate(&self) -> Result<bool> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            if self.locked_out {
                bail!("token expired");
            }
            Ok(true)
        }

        async fn cleanup(&self) -> Result<()> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }
    }

    fn cases(names: &[&str]) -> Vec<TestCase> {
        names.iter().map(|n| TestCase::new(*n, "app")).collect()
    }

    #[tokio::test]
    async fn test_batch_lifecycle_wraps_execution() {
        let adapter = Arc::new(FakeAdapter::default());
        let executor = TestExecutor::new(adapter.clone());
        executor.execute_tests(cases(&["ok-1", "bad-2"])).await;

        assert_eq!(adapter.validations.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.logins.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.executed.load(Ordering::SeqCst), 2);
        assert_eq!(adapter.cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unready_adapter_errors_every_case() {
        let adapter = Arc::new(FakeAdapter {
            broken: true,
            ..Default::default()
        });
        let executor = TestExecutor::new(adapter.clone()).with_parallel(false);
        let results = executor.execute_tests(cases(&["ok-1", "ok-2"])).await;

        assert_eq!(results.len(), 2);
        for r in &results {
            assert_eq!(r.status, TestStatus::Error);
            assert!(r.error_message.as_deref().unwrap().contains("not in a testable state"));
        }
        assert_eq!(adapter.logins.load(Ordering::SeqCst), 0);
        assert_eq!(adapter.executed.load(Ordering::SeqCst), 0);
        assert_eq!(adapter.cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_login_skips_batch_and_cleans_up() {
        let adapter = Arc::new(FakeAdapter {
            locked_out: true,
            ..Default::default()
        });
        let executor = TestExecutor::new(adapter.clone());
        let results = executor.execute_tests(cases(&["ok-1"])).await;

        assert_eq!(results[0].status, TestStatus::Error);
        assert!(results[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("token expired"));
        assert_eq!(adapter.executed.load(Ordering::SeqCst), 0);
        assert_eq!(adapter.cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sequential_preserves_order() {
        let executor = TestExecutor::new(Arc::new(FakeAdapter::default())).with_parallel(false);
        let results = executor.execute_tests(cases(&["ok-1", "bad-2", "ok-3"])).await;
        let names: Vec<_> = results.iter().map(|r| r.test_name.as_str()).collect();
        assert_eq!(names, vec!["ok-1", "bad-2", "ok-3"]);
    }

    #[tokio::test]
    async fn test_parallel_respects_worker_limit() {
        let adapter = Arc::new(FakeAdapter::default());
        let executor = TestExecutor::new(adapter.clone()).with_max_workers(2);
        let results = executor
            .execute_tests(cases(&["ok-1", "ok-2", "ok-3", "ok-4", "ok-5"]))
            .await;

        assert_eq!(results.len(), 5);
        assert!(adapter.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_errors_and_panics_become_error_results() {
        let executor = TestExecutor::new(Arc::new(FakeAdapter::default())).with_max_workers(3);
        let results = executor
            .execute_tests(cases(&["ok-1", "err-2", "panic-3"]))
            .await;

        assert_eq!(results.len(), 3);
        let by_name = |name: &str| results.iter().find(|r| r.test_name == name).unwrap();
        assert_eq!(by_name("ok-1").status, TestStatus::Passed);
        assert_eq!(by_name("err-2").status, TestStatus::Error);
        assert!(by_name("err-2")
            .error_message
            .as_deref()
            .unwrap()
            .contains("browser crashed"));
        assert_eq!(by_name("panic-3").status, TestStatus::Error);
    }

    #[tokio::test]
    async fn test_sequential_survives_panic() {
        let executor = TestExecutor::new(Arc::new(FakeAdapter::default())).with_parallel(false);
        let results = executor.execute_tests(cases(&["panic-1", "ok-2"])).await;
        assert_eq!(results[0].status, TestStatus::Error);
        assert_eq!(results[1].status, TestStatus::Passed);
    }

    #[tokio::test]
    async fn test_summary_accumulates_batches() {
        let executor = TestExecutor::new(Arc::new(FakeAdapter::default()));
        executor.execute_tests(cases(&["ok-1", "bad-2"])).await;
        executor.execute_test(TestCase::new("ok-3", "app")).await;

        let summary = executor.summary().await;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert!((summary.pass_rate - 200.0 / 3.0).abs() < 1e-9);
        assert!(summary.to_string().starts_with("3 total, 2 passed, 1 failed"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = ExecutionSummary::from_results(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.pass_rate, 0.0);
    }

    #[tokio::test]
    async fn test_feedback_on_failures_only() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(FeedbackStore::open(tmp.path()).unwrap());
        let reviewer = Arc::new(ScriptedReviewer::approve_all("qa").with_feedback(vec![
            FeedbackDraft {
                comment: "known flake".into(),
                is_known_issue: true,
                ..FeedbackDraft::default()
            },
        ]));
        let collector = Arc::new(FeedbackCollector::new(store.clone(), reviewer));

        let executor = TestExecutor::new(Arc::new(FakeAdapter::default())).with_feedback(collector);
        let results = executor.execute_tests(cases(&["ok-1", "bad-2"])).await;

        let failed = results.iter().find(|r| r.test_name == "bad-2").unwrap();
        assert!(failed.validated_by_human);
        assert_eq!(failed.human_comment.as_deref(), Some("known flake"));
        let passed = results.iter().find(|r| r.test_name == "ok-1").unwrap();
        assert!(!passed.validated_by_human);
        assert_eq!(store.known_issues().unwrap().len(), 1);
    }
}

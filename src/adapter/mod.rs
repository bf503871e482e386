//! Adapters drive the application under test.
//!
//! The executor and pipeline only see the [`Adapter`] trait; browser, HTTP
//! and other integrations live behind it. [`ShellAdapter`] runs test steps
//! as shell commands.

pub mod shell;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use types::{Capabilities, DiscoveryResult, TestCase, TestResult};

pub use shell::ShellAdapter;

#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    /// Enumerate what can be tested (elements, pages, endpoints).
    async fn discover(&self) -> Result<DiscoveryResult>;

    /// Run one test case. An `Err` means the adapter itself broke; a test
    /// that ran and failed is an `Ok` result with a failed status.
    async fn execute_test(&self, case: &TestCase) -> Result<TestResult>;

    /// Whether the application is in a testable state.
    async fn validate_state(&self) -> Result<bool>;

    async fn authenticate(&self) -> Result<bool> {
        Ok(true)
    }

    async fn cleanup(&self) -> Result<()>;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}

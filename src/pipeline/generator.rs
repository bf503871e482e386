//! Plan generation seam.
//!
//! The planner hands a [`PlanRequest`] to a [`PlanGenerator`] and expects
//! markdown back. Model-backed generators live outside this crate;
//! [`FilePlanGenerator`] reads a prepared plan from disk.

use crate::pipeline::retriever::RetrievedDocument;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRequest {
    pub app_name: String,
    pub feature_description: String,
    /// Element/page counts from discovery, when there was one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_info: Option<Value>,
    pub similar_tests: Vec<RetrievedDocument>,
    pub test_patterns: Vec<RetrievedDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPlan {
    /// The plan as markdown.
    pub response: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl GeneratedPlan {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            metadata: BTreeMap::new(),
        }
    }
}

#[async_trait]
pub trait PlanGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &PlanRequest) -> Result<GeneratedPlan>;
}

/// Serves a plan written ahead of time.
pub struct FilePlanGenerator {
    path: PathBuf,
}

impl FilePlanGenerator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PlanGenerator for FilePlanGenerator {
    fn name(&self) -> &str {
        "file"
    }

    async fn generate(&self, request: &PlanRequest) -> Result<GeneratedPlan> {
        let response = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read plan file: {}", self.path.display()))?;
        if response.trim().is_empty() {
            bail!("Plan file is empty: {}", self.path.display());
        }

        let mut plan = GeneratedPlan::new(response);
        plan.metadata
            .insert("source".into(), Value::String(self.path.display().to_string()));
        plan.metadata
            .insert("app_name".into(), Value::String(request.app_name.clone()));
        Ok(plan)
    }
}

/// Returns the same plan for every request.
pub struct StaticPlanGenerator {
    response: String,
}

impl StaticPlanGenerator {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl PlanGenerator for StaticPlanGenerator {
    fn name(&self) -> &str {
        "static"
    }

    async fn generate(&self, _request: &PlanRequest) -> Result<GeneratedPlan> {
        if self.response.trim().is_empty() {
            bail!("No plan configured");
        }
        Ok(GeneratedPlan::new(self.response.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request() -> PlanRequest {
        PlanRequest {
            app_name: "shop".into(),
            feature_description: "checkout".into(),
            discovery_info: None,
            similar_tests: Vec::new(),
            test_patterns: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_file_generator() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.md");
        std::fs::write(&path, "## Test Cases\n### Pay\n").unwrap();

        let plan = FilePlanGenerator::new(&path).generate(&request()).await.unwrap();
        assert!(plan.response.starts_with("## Test Cases"));
        assert_eq!(plan.metadata["app_name"], "shop");
    }

    #[tokio::test]
    async fn test_file_generator_errors() {
        let tmp = TempDir::new().unwrap();
        let missing = FilePlanGenerator::new(tmp.path().join("nope.md"));
        assert!(missing.generate(&request()).await.is_err());

        let empty = tmp.path().join("empty.md");
        std::fs::write(&empty, "\n").unwrap();
        let err = FilePlanGenerator::new(&empty)
            .generate(&request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}

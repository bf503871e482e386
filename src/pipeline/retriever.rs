//! Knowledge retrieval for the planner.
//!
//! The planner only needs "find documents like this query" and "remember
//! this document". [`InMemoryRetriever`] scores by keyword overlap; vector
//! stores plug in behind the same trait.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::RwLock;

pub type Metadata = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Up to `k` documents most similar to `query` whose metadata matches
    /// every entry of `filters`, best first.
    async fn find_similar(
        &self,
        query: &str,
        k: usize,
        filters: &Metadata,
    ) -> Result<Vec<RetrievedDocument>>;

    async fn add(&self, document: &str, metadata: Metadata) -> Result<()>;
}

/// Entry of a knowledge file.
#[derive(Debug, Clone, Deserialize)]
struct KnowledgeEntry {
    content: String,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Default)]
pub struct InMemoryRetriever {
    documents: RwLock<Vec<(String, Metadata)>>,
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a YAML list of `{content, metadata}` entries.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read knowledge file: {}", path.display()))?;
        let entries: Vec<KnowledgeEntry> = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse knowledge file: {}", path.display()))?;

        Ok(Self {
            documents: RwLock::new(
                entries
                    .into_iter()
                    .map(|e| (e.content, e.metadata))
                    .collect(),
            ),
        })
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Share of the query's keywords found in the document.
fn overlap(query: &BTreeSet<String>, document: &str) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let doc = keywords(document);
    query.intersection(&doc).count() as f64 / query.len() as f64
}

#[async_trait]
impl KnowledgeRetriever for InMemoryRetriever {
    async fn find_similar(
        &self,
        query: &str,
        k: usize,
        filters: &Metadata,
    ) -> Result<Vec<RetrievedDocument>> {
        let wanted = keywords(query);
        let documents = self
            .documents
            .read()
            .map_err(|_| anyhow::anyhow!("Knowledge base lock poisoned"))?;

        let mut hits: Vec<RetrievedDocument> = documents
            .iter()
            .filter(|(_, meta)| filters.iter().all(|(key, value)| meta.get(key) == Some(value)))
            .filter_map(|(content, meta)| {
                let score = overlap(&wanted, content);
                (score > 0.0).then(|| RetrievedDocument {
                    content: content.clone(),
                    score,
                    metadata: meta.clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn add(&self, document: &str, metadata: Metadata) -> Result<()> {
        self.documents
            .write()
            .map_err(|_| anyhow::anyhow!("Knowledge base lock poisoned"))?
            .push((document.to_string(), metadata));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[tokio::test]
    async fn test_ranks_by_overlap() {
        let kb = InMemoryRetriever::new();
        kb.add("Login with valid password", meta(&[("doc_type", "test_case")]))
            .await
            .unwrap();
        kb.add("Login page loads", meta(&[("doc_type", "test_case")]))
            .await
            .unwrap();
        kb.add("Checkout with coupon", meta(&[("doc_type", "test_case")]))
            .await
            .unwrap();

        let hits = kb
            .find_similar("login password", 5, &Metadata::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "Login with valid password");
        assert_eq!(hits[0].score, 1.0);
    }

    #[tokio::test]
    async fn test_filters_and_limit() {
        let kb = InMemoryRetriever::new();
        kb.add("login flow", meta(&[("doc_type", "pattern")])).await.unwrap();
        kb.add("login form", meta(&[("doc_type", "test_case"), ("application", "shop")]))
            .await
            .unwrap();
        kb.add("login error", meta(&[("doc_type", "test_case"), ("application", "blog")]))
            .await
            .unwrap();

        let filters = meta(&[("doc_type", "test_case"), ("application", "shop")]);
        let hits = kb.find_similar("login", 5, &filters).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "login form");

        let one = kb.find_similar("login", 1, &Metadata::new()).await.unwrap();
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn test_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.yaml");
        std::fs::write(
            &path,
            "- content: Login happy path\n  metadata:\n    doc_type: test_case\n- content: Retry pattern\n",
        )
        .unwrap();
        let kb = InMemoryRetriever::from_file(&path).unwrap();
        assert_eq!(kb.len(), 2);
    }
}

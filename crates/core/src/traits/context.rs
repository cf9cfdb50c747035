//! Retrieval context traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A retrieved passage used to ground an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPassage {
    /// Where the passage came from (file name, URL).
    pub source: String,
    pub content: String,
}

/// Supplies context passages for a query, e.g. from a vector store.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<ContextPassage>>;
}

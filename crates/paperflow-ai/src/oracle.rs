use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRequest {
    pub text: String,
    pub allowed_tags: Vec<String>,
    pub want_keywords: bool,
    pub want_tags: bool,
}

impl ClassificationRequest {
    pub fn new(text: impl Into<String>, allowed_tags: Vec<String>) -> Self {
        Self {
            text: text.into(),
            allowed_tags,
            want_keywords: true,
            want_tags: true,
        }
    }
}

/// What the oracle answered. Tags are returned as given; callers check them
/// against the allowed list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub tags: Vec<String>,
    pub keywords: String,
}

impl Classification {
    /// Splits tags into `(allowed, rejected)`, exact match.
    pub fn partition_tags(&self, allowed: &[String]) -> (Vec<String>, Vec<String>) {
        self.tags
            .iter()
            .cloned()
            .partition(|tag| allowed.iter().any(|a| a == tag))
    }
}

#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    async fn classify(&self, request: &ClassificationRequest) -> Result<Classification>;
}

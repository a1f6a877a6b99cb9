use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::AgentResult;
use crate::storage::{filter_claims, ClaimRecord, ClaimStore, ExpenseDraft};

/// In-memory claim store for tests and embedded use.
#[derive(Default)]
pub struct MemoryClaimStore {
    claims: Mutex<Vec<ClaimRecord>>,
}

impl MemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.claims.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.claims.lock().await.is_empty()
    }
}

#[async_trait]
impl ClaimStore for MemoryClaimStore {
    async fn append(&self, draft: ExpenseDraft) -> AgentResult<ClaimRecord> {
        let record = ClaimRecord::new(draft);
        self.claims.lock().await.push(record.clone());
        Ok(record)
    }

    async fn search(&self, query: &str) -> AgentResult<Vec<ClaimRecord>> {
        let claims = self.claims.lock().await;
        Ok(filter_claims(&claims, query))
    }
}

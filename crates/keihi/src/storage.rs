//! Claim persistence.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AgentResult;

pub mod file;
pub mod memory;

pub use file::FileClaimStore;
pub use memory::MemoryClaimStore;

/// An expense record not yet persisted. Lives in the client's data
/// model between turns; the engine never holds one server-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseDraft {
    #[serde(default)]
    pub receipt_name: String,
    #[serde(default)]
    pub merchant: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub memo: String,
}

/// A persisted expense submission. Created once per submit, never
/// mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    pub id: String,
    pub created_at: String,
    #[serde(flatten)]
    pub draft: ExpenseDraft,
}

impl ClaimRecord {
    /// Stamp a draft with a fresh id and UTC creation time.
    pub fn new(draft: ExpenseDraft) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            draft,
        }
    }

    /// Case-insensitive substring match over the visible fields
    /// (everything except `id`/`createdAt`).
    pub fn matches(&self, lowered_query: &str) -> bool {
        let draft = &self.draft;
        let haystack = [
            draft.receipt_name.as_str(),
            draft.merchant.as_str(),
            draft.date.as_str(),
            draft.amount.as_str(),
            draft.currency.as_str(),
            draft.category.as_str(),
            draft.payment_method.as_str(),
            draft.memo.as_str(),
        ]
        .join(" ")
        .to_lowercase();
        haystack.contains(lowered_query)
    }
}

/// Durable, append-only collection of claim records.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Persist the draft and return the stored record. Durability is
    /// guaranteed before this returns.
    async fn append(&self, draft: ExpenseDraft) -> AgentResult<ClaimRecord>;

    /// Records matching the query, in stored order. An empty query
    /// returns everything.
    async fn search(&self, query: &str) -> AgentResult<Vec<ClaimRecord>>;
}

pub(crate) fn filter_claims(claims: &[ClaimRecord], query: &str) -> Vec<ClaimRecord> {
    if query.is_empty() {
        return claims.to_vec();
    }
    let lowered = query.to_lowercase();
    claims
        .iter()
        .filter(|claim| claim.matches(&lowered))
        .cloned()
        .collect()
}

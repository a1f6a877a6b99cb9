use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AgentError, AgentResult};
use crate::storage::{filter_claims, ClaimRecord, ClaimStore, ExpenseDraft};

/// Claim store backed by one human-readable JSON array file.
///
/// Append is a read-modify-write of the whole collection, so the lock
/// spans load+push+persist. The file is replaced via temp-write, fsync
/// and rename, which keeps readers consistent and makes the append
/// durable before it returns.
pub struct FileClaimStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileClaimStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> AgentResult<Vec<ClaimRecord>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(AgentError::Storage(format!(
                    "failed to read {}: {error}",
                    self.path.display()
                )))
            }
        };
        serde_json::from_slice(&bytes).map_err(|error| {
            AgentError::Storage(format!("failed to parse {}: {error}", self.path.display()))
        })
    }

    async fn persist(&self, claims: &[ClaimRecord]) -> AgentResult<()> {
        let serialized = serde_json::to_vec_pretty(claims)
            .map_err(|error| AgentError::Storage(format!("failed to serialize claims: {error}")))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|error| {
                    AgentError::Storage(format!(
                        "failed to create {}: {error}",
                        parent.display()
                    ))
                })?;
            }
        }

        let temp = self.path.with_extension("json.tmp");
        let mut temp_file = tokio::fs::File::create(&temp).await.map_err(|error| {
            AgentError::Storage(format!("failed to create {}: {error}", temp.display()))
        })?;
        temp_file.write_all(&serialized).await.map_err(|error| {
            AgentError::Storage(format!("failed to write {}: {error}", temp.display()))
        })?;
        temp_file.sync_all().await.map_err(|error| {
            AgentError::Storage(format!("failed to sync {}: {error}", temp.display()))
        })?;
        drop(temp_file);
        tokio::fs::rename(&temp, &self.path).await.map_err(|error| {
            AgentError::Storage(format!(
                "failed to replace {}: {error}",
                self.path.display()
            ))
        })
    }
}

#[async_trait]
impl ClaimStore for FileClaimStore {
    async fn append(&self, draft: ExpenseDraft) -> AgentResult<ClaimRecord> {
        let _guard = self.lock.lock().await;
        let mut claims = self.load().await?;
        let record = ClaimRecord::new(draft);
        claims.push(record.clone());
        self.persist(&claims).await?;
        Ok(record)
    }

    async fn search(&self, query: &str) -> AgentResult<Vec<ClaimRecord>> {
        let _guard = self.lock.lock().await;
        let claims = self.load().await?;
        Ok(filter_claims(&claims, query))
    }
}

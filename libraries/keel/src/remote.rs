//! The remote document store: one full-snapshot document per owner, with
//! last-write-wins semantics and a recorded update timestamp.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("remote store rejected the request: {0}")]
    Rejected(String),
    #[error("remote document was malformed: {0}")]
    Malformed(String),
}

/// One owner's document: the snapshot fields plus the update stamp recorded
/// with the last write.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    pub fields: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    async fn read_document(&mut self, owner_id: &str)
    -> Result<Option<RemoteDocument>, RemoteError>;

    async fn write_document(
        &mut self,
        owner_id: &str,
        document: RemoteDocument,
    ) -> Result<(), RemoteError>;
}

/// In-memory remote store with failure injection, for tests and for hosts
/// running without a backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    documents: BTreeMap<String, RemoteDocument>,
    fail_reads: bool,
    fail_writes: bool,
    write_count: usize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, owner_id: &str, document: RemoteDocument) -> Self {
        self.documents.insert(owner_id.to_string(), document);
        self
    }

    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn document(&self, owner_id: &str) -> Option<&RemoteDocument> {
        self.documents.get(owner_id)
    }

    /// Number of successful writes ever accepted.
    pub fn write_count(&self) -> usize {
        self.write_count
    }
}

impl RemoteStore for MemoryRemote {
    async fn read_document(
        &mut self,
        owner_id: &str,
    ) -> Result<Option<RemoteDocument>, RemoteError> {
        if self.fail_reads {
            return Err(RemoteError::Network("injected read failure".to_string()));
        }
        Ok(self.documents.get(owner_id).cloned())
    }

    async fn write_document(
        &mut self,
        owner_id: &str,
        document: RemoteDocument,
    ) -> Result<(), RemoteError> {
        if self.fail_writes {
            return Err(RemoteError::Network("injected write failure".to_string()));
        }
        self.write_count += 1;
        self.documents.insert(owner_id.to_string(), document);
        Ok(())
    }
}

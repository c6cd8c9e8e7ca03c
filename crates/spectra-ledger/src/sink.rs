//! Durable key-value persistence capability
//!
//! External collaborators implement [`Sink`]; the ledger and the manifest
//! exporter write through it. Keys are namespaced by session scope so
//! `purge` can drop one session without touching others.

use async_trait::async_trait;
use dashmap::DashMap;
use spectra_model::ScopeId;

/// Errors raised by sink implementations
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The backing store rejected the operation
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// Stored bytes could not be produced or interpreted
    #[error("sink serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable key-value persistence, scoped by session
#[async_trait]
pub trait Sink: Send + Sync {
    /// Store `value` under `(scope, key)`, replacing any previous value
    ///
    /// # Errors
    /// Returns [`SinkError`] if the backing store rejects the write.
    async fn put(&self, scope: ScopeId, key: &str, value: Vec<u8>) -> Result<(), SinkError>;

    /// Fetch the value stored under `(scope, key)`
    ///
    /// # Errors
    /// Returns [`SinkError`] if the backing store cannot be read.
    async fn get(&self, scope: ScopeId, key: &str) -> Result<Option<Vec<u8>>, SinkError>;

    /// Drop every entry belonging to `scope`
    ///
    /// # Errors
    /// Returns [`SinkError`] if the backing store rejects the purge.
    async fn purge(&self, scope: ScopeId) -> Result<(), SinkError>;
}

/// In-memory reference sink
///
/// Concurrent and lossless within the process; used by tests and as the
/// default when no durable backend is wired in.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: DashMap<(ScopeId, String), Vec<u8>>,
}

impl MemorySink {
    /// Create an empty sink
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries across all scopes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the sink holds no entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn put(&self, scope: ScopeId, key: &str, value: Vec<u8>) -> Result<(), SinkError> {
        self.entries.insert((scope, key.to_string()), value);
        Ok(())
    }

    async fn get(&self, scope: ScopeId, key: &str) -> Result<Option<Vec<u8>>, SinkError> {
        Ok(self
            .entries
            .get(&(scope, key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn purge(&self, scope: ScopeId) -> Result<(), SinkError> {
        self.entries.retain(|(entry_scope, _), _| *entry_scope != scope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_sink_put_and_get() {
        let sink = MemorySink::new();
        let scope = ScopeId::new();

        sink.put(scope, "manifest", b"payload".to_vec()).await.unwrap();
        let value = sink.get(scope, "manifest").await.unwrap();
        assert_eq!(value.as_deref(), Some(b"payload".as_slice()));
    }

    #[tokio::test]
    async fn memory_sink_get_missing_is_none() {
        let sink = MemorySink::new();
        let value = sink.get(ScopeId::new(), "missing").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn purge_drops_only_the_given_scope() {
        let sink = MemorySink::new();
        let scope_a = ScopeId::new();
        let scope_b = ScopeId::new();

        sink.put(scope_a, "k", b"a".to_vec()).await.unwrap();
        sink.put(scope_b, "k", b"b".to_vec()).await.unwrap();

        sink.purge(scope_a).await.unwrap();

        assert!(sink.get(scope_a, "k").await.unwrap().is_none());
        assert_eq!(sink.get(scope_b, "k").await.unwrap().as_deref(), Some(b"b".as_slice()));
    }
}

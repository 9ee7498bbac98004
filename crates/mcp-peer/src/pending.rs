//! Pending Request Table (§4.2): request-id -> awaiter, with exactly-once
//! resume across the response / timeout / cancellation / disconnect race.

use mcp_protocol::{JsonRpcResponse, McpError, RequestId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use tracing::warn;

/// What an awaiter resolves to: the response, or a local error (timeout,
/// cancellation, disconnect).
pub type AwaitOutcome = Result<JsonRpcResponse, McpError>;

struct Entry {
    sender: oneshot::Sender<AwaitOutcome>,
}

/// Maps in-flight outbound request ids to their awaiters.
///
/// Invariant (§4.2): each awaiter is resumed exactly once. Concurrent paths
/// (response arrival, timeout, cancellation, disconnect) race through
/// [`PendingRequestTable::remove`]; only the caller that wins the race gets
/// `Some` back and is responsible for resuming the awaiter.
#[derive(Clone, Default)]
pub struct PendingRequestTable {
    inner: Arc<Mutex<HashMap<RequestId, Entry>>>,
}

impl PendingRequestTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending request, returning the receiver half of its
    /// awaiter. Fails with `InternalError` if `id` is already pending —
    /// at most one `PendingRequest` per request-id may exist at a time (§3).
    pub async fn add(
        &self,
        id: RequestId,
    ) -> Result<oneshot::Receiver<AwaitOutcome>, McpError> {
        let (tx, rx) = oneshot::channel();
        let mut guard = self.inner.lock().await;
        if guard.contains_key(&id) {
            return Err(McpError::internal(format!(
                "duplicate pending request for id {id}"
            )));
        }
        guard.insert(id, Entry { sender: tx });
        Ok(rx)
    }

    /// Atomically take the entry for `id`, if present. This is the single
    /// choke point every resume path goes through, which is what makes
    /// exactly-once resume possible without any caller coordinating with any
    /// other.
    async fn remove(&self, id: &RequestId) -> Option<Entry> {
        self.inner.lock().await.remove(id)
    }

    /// Resume the awaiter for `id` with a successful response. No-ops (and
    /// logs) if `id` is no longer pending — a race with cancellation or
    /// disconnect is expected, not an error (§4.2).
    pub async fn resume_success(&self, id: &RequestId, response: JsonRpcResponse) {
        match self.remove(id).await {
            Some(entry) => {
                let _ = entry.sender.send(Ok(response));
            }
            None => warn!(request_id = %id, "response arrived for unknown or already-resolved request"),
        }
    }

    /// Resume the awaiter for `id` with a local error (timeout, cancellation,
    /// disconnect). Same race-tolerant semantics as [`resume_success`].
    ///
    /// [`resume_success`]: PendingRequestTable::resume_success
    pub async fn resume_failure(&self, id: &RequestId, error: McpError) {
        match self.remove(id).await {
            Some(entry) => {
                let _ = entry.sender.send(Err(error));
            }
            None => warn!(request_id = %id, "failure delivered for unknown or already-resolved request"),
        }
    }

    /// Whether `id` is currently pending.
    pub async fn contains(&self, id: &RequestId) -> bool {
        self.inner.lock().await.contains_key(id)
    }

    /// Number of currently pending requests.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether the table has no pending requests.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drain every pending request, resuming each with `error`. Used on
    /// disconnect (§4.6) so no awaiter is left hanging forever.
    pub async fn drain_with_error(&self, error: McpError) {
        let mut guard = self.inner.lock().await;
        for (_, entry) in guard.drain() {
            let _ = entry.sender.send(Err(error.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn add_then_resume_success_delivers_once() {
        let table = PendingRequestTable::new();
        let id = RequestId::from(1);
        let rx = table.add(id.clone()).await.unwrap();

        table
            .resume_success(&id, JsonRpcResponse::success(json!({"ok": true}), id.clone()))
            .await;

        let outcome = rx.await.unwrap();
        assert!(outcome.unwrap().is_success());
        assert!(!table.contains(&id).await);
    }

    #[tokio::test]
    async fn duplicate_add_fails() {
        let table = PendingRequestTable::new();
        let id = RequestId::from(1);
        let _rx = table.add(id.clone()).await.unwrap();
        let err = table.add(id).await.unwrap_err();
        assert_eq!(err.kind, mcp_protocol::McpErrorKind::InternalError);
    }

    #[tokio::test]
    async fn resume_on_unknown_id_is_a_no_op() {
        let table = PendingRequestTable::new();
        // Must not panic; this is the expected race-with-cancellation path.
        table
            .resume_success(
                &RequestId::from(99),
                JsonRpcResponse::success(json!(null), RequestId::from(99)),
            )
            .await;
    }

    #[tokio::test]
    async fn racing_success_and_failure_only_one_wins() {
        let table = PendingRequestTable::new();
        let id = RequestId::from(1);
        let rx = table.add(id.clone()).await.unwrap();

        // First call wins the race via `remove`; the second is a no-op.
        table
            .resume_success(&id, JsonRpcResponse::success(json!(1), id.clone()))
            .await;
        table
            .resume_failure(&id, McpError::cancelled("too late"))
            .await;

        let outcome = rx.await.unwrap();
        assert!(outcome.unwrap().is_success());
    }

    #[tokio::test]
    async fn drain_resumes_every_pending_awaiter() {
        let table = PendingRequestTable::new();
        let rx1 = table.add(RequestId::from(1)).await.unwrap();
        let rx2 = table.add(RequestId::from(2)).await.unwrap();

        table.drain_with_error(McpError::connection_closed("bye")).await;

        assert!(rx1.await.unwrap().is_err());
        assert!(rx2.await.unwrap().is_err());
        assert!(table.is_empty().await);
    }
}

//! Progress & timeout coordinator (§4.5): progress-token routing, timeout
//! controllers with reset-on-progress and a max-total cap, and task-token
//! migration for responses whose result carries `task.taskId`.

use async_trait::async_trait;
use mcp_protocol::{JsonRpcResponse, ProgressToken, RequestId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::warn;

/// Invoked for each inbound progress notification routed to a token.
#[async_trait]
pub trait ProgressCallback: Send + Sync {
    async fn on_progress(&self, progress: f64, total: Option<f64>, message: Option<String>);
}

#[async_trait]
impl<F, Fut> ProgressCallback for F
where
    F: Fn(f64, Option<f64>, Option<String>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send,
{
    async fn on_progress(&self, progress: f64, total: Option<f64>, message: Option<String>) {
        self(progress, total, message).await
    }
}

/// Per-request timeout with optional reset-on-progress and max-total cap.
///
/// Grounded on the teacher's `turbomcp-server::timeout` module: a deadline
/// recomputed each time progress resets it, raced against an absolute cap
/// via `tokio::select!` over a `Notify`.
pub struct TimeoutController {
    base_timeout: Duration,
    reset_on_progress: bool,
    max_total: Option<Duration>,
    start: Instant,
    last_progress: Mutex<Instant>,
    notify: Notify,
}

impl TimeoutController {
    pub fn new(base_timeout: Duration, reset_on_progress: bool, max_total: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            base_timeout,
            reset_on_progress,
            max_total,
            start: now,
            last_progress: Mutex::new(now),
            notify: Notify::new(),
        }
    }

    /// Record a progress signal, restarting the base-timeout interval if
    /// `reset_on_progress` is set.
    pub async fn signal_progress(&self) {
        if self.reset_on_progress {
            *self.last_progress.lock().await = Instant::now();
            self.notify.notify_one();
        }
    }

    /// Wait until the controller times out: either `base_timeout` has
    /// elapsed since the last progress signal, or `max_total` has elapsed
    /// since construction, whichever comes first.
    pub async fn wait_for_timeout(&self) {
        loop {
            let base_deadline = *self.last_progress.lock().await + self.base_timeout;
            let deadline = match self.max_total {
                Some(cap) => base_deadline.min(self.start + cap),
                None => base_deadline,
            };
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => return,
                () = self.notify.notified() => continue,
            }
        }
    }
}

struct Registration {
    callback: Arc<dyn ProgressCallback>,
    controller: Option<Arc<TimeoutController>>,
}

/// Routes inbound progress notifications to registered callbacks and
/// implements task-token migration (§4.5, "Task-augmented responses").
#[derive(Clone, Default)]
pub struct ProgressCoordinator {
    by_token: Arc<Mutex<HashMap<ProgressToken, Registration>>>,
    request_to_token: Arc<Mutex<HashMap<RequestId, ProgressToken>>>,
    task_to_token: Arc<Mutex<HashMap<String, ProgressToken>>>,
}

impl ProgressCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback (and optional timeout controller) for `token`,
    /// and remember that `request_id` owns it until the request completes
    /// or migrates to a background task.
    pub async fn register(
        &self,
        request_id: RequestId,
        token: ProgressToken,
        callback: Arc<dyn ProgressCallback>,
        controller: Option<Arc<TimeoutController>>,
    ) {
        self.by_token
            .lock()
            .await
            .insert(token.clone(), Registration { callback, controller });
        self.request_to_token.lock().await.insert(request_id, token);
    }

    /// Deliver an inbound progress notification. Unknown tokens are logged
    /// and dropped (§4.5); monotonicity of `progress` is the caller's
    /// convention, not an invariant this type enforces.
    pub async fn on_progress(
        &self,
        token: &ProgressToken,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) {
        let registration = {
            let guard = self.by_token.lock().await;
            match guard.get(token) {
                Some(r) => (r.callback.clone(), r.controller.clone()),
                None => {
                    warn!(%token, "progress notification for unknown token");
                    return;
                }
            }
        };
        let (callback, controller) = registration;
        if let Some(controller) = controller {
            controller.signal_progress().await;
        }
        callback.on_progress(progress, total, message).await;
    }

    /// Inspect a response for `result.task.taskId` and, if present, migrate
    /// the progress registration from `request_id` to that task id so
    /// progress keeps flowing after the originating request completes.
    /// Otherwise, the registration is torn down along with the request.
    pub async fn handle_response(&self, request_id: &RequestId, response: &JsonRpcResponse) {
        let token = self.request_to_token.lock().await.remove(request_id);
        let Some(token) = token else { return };

        match response.task_id() {
            Some(task_id) => {
                self.task_to_token
                    .lock()
                    .await
                    .insert(task_id.to_string(), token);
            }
            None => {
                self.by_token.lock().await.remove(&token);
            }
        }
    }

    /// A terminal task-status notification (completed, failed, cancelled)
    /// drops the callback and controller for `task_id`.
    pub async fn complete_task(&self, task_id: &str) {
        if let Some(token) = self.task_to_token.lock().await.remove(task_id) {
            self.by_token.lock().await.remove(&token);
        }
    }

    /// Drop a registration outright, e.g. because its request was cancelled
    /// or timed out before any progress arrived.
    pub async fn remove(&self, request_id: &RequestId) {
        if let Some(token) = self.request_to_token.lock().await.remove(request_id) {
            self.by_token.lock().await.remove(&token);
        }
    }

    #[cfg(test)]
    pub(crate) async fn has_token(&self, token: &ProgressToken) -> bool {
        self.by_token.lock().await.contains_key(token)
    }
}

/// Build the `_meta.progressToken`-augmented params for an outbound request.
pub fn inject_progress_token(params: Option<Value>, token: &ProgressToken) -> Value {
    mcp_protocol::RequestMeta::inject_progress_token(params, token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn progress_reaches_registered_callback() {
        let coordinator = ProgressCoordinator::new();
        let token = ProgressToken::from(1i64);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        coordinator
            .register(
                RequestId::from(1),
                token.clone(),
                Arc::new(move |_p: f64, _t: Option<f64>, _m: Option<String>| {
                    let calls_clone = calls_clone.clone();
                    async move {
                        calls_clone.fetch_add(1, Ordering::SeqCst);
                    }
                }),
                None,
            )
            .await;

        coordinator.on_progress(&token, 0.5, Some(1.0), None).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_token_is_a_no_op() {
        let coordinator = ProgressCoordinator::new();
        coordinator
            .on_progress(&ProgressToken::from(99i64), 0.1, None, None)
            .await;
    }

    #[tokio::test]
    async fn response_without_task_drops_registration() {
        let coordinator = ProgressCoordinator::new();
        let token = ProgressToken::from(1i64);
        let request_id = RequestId::from(1);

        coordinator
            .register(
                request_id.clone(),
                token.clone(),
                Arc::new(|_: f64, _: Option<f64>, _: Option<String>| async {}),
                None,
            )
            .await;

        let response =
            JsonRpcResponse::success(serde_json::json!({"ok": true}), request_id.clone());
        coordinator.handle_response(&request_id, &response).await;

        assert!(!coordinator.has_token(&token).await);
    }

    #[tokio::test]
    async fn task_augmented_response_migrates_then_survives_until_terminal_status() {
        let coordinator = ProgressCoordinator::new();
        let token = ProgressToken::from(1i64);
        let request_id = RequestId::from(1);

        coordinator
            .register(
                request_id.clone(),
                token.clone(),
                Arc::new(|_: f64, _: Option<f64>, _: Option<String>| async {}),
                None,
            )
            .await;

        let response = JsonRpcResponse::success(
            serde_json::json!({"task": {"taskId": "bg-1"}}),
            request_id.clone(),
        );
        coordinator.handle_response(&request_id, &response).await;
        assert!(coordinator.has_token(&token).await);

        coordinator.on_progress(&token, 0.9, None, None).await;

        coordinator.complete_task("bg-1").await;
        assert!(!coordinator.has_token(&token).await);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_on_progress_extends_the_deadline() {
        let controller = TimeoutController::new(StdDuration::from_millis(100), true, None);

        tokio::time::advance(StdDuration::from_millis(60)).await;
        controller.signal_progress().await;

        let waited = tokio::time::timeout(StdDuration::from_millis(90), controller.wait_for_timeout())
            .await;
        assert!(waited.is_err(), "progress should have pushed the deadline out");
    }

    #[tokio::test(start_paused = true)]
    async fn max_total_caps_even_with_progress() {
        let controller =
            TimeoutController::new(StdDuration::from_secs(10), true, Some(StdDuration::from_millis(50)));

        tokio::time::advance(StdDuration::from_millis(40)).await;
        controller.signal_progress().await;

        let waited = tokio::time::timeout(StdDuration::from_millis(20), controller.wait_for_timeout())
            .await;
        assert!(waited.is_ok(), "max_total must fire even though progress keeps resetting base_timeout");
    }
}

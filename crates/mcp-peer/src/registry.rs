//! Handler registry (§4.3): one request handler per method (replace
//! semantics), many notification handlers per method (fan-out, isolated
//! failures).

use async_trait::async_trait;
use futures::FutureExt;
use mcp_protocol::McpError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::error;

/// Handles one inbound request and produces its result value.
///
/// Implementors only return the `result` payload; turning an `Err` into a
/// wire `JsonRpcError` is the peer engine's job (§4.6), not the handler's.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, params: Option<Value>) -> Result<Value, McpError>;
}

#[async_trait]
impl<F, Fut> RequestHandler for F
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, McpError>> + Send,
{
    async fn handle(&self, params: Option<Value>) -> Result<Value, McpError> {
        self(params).await
    }
}

/// Handles one inbound notification. Failures are logged and dropped (§4.3):
/// a notification has no response channel to carry an error back on.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, params: Option<Value>);
}

#[async_trait]
impl<F, Fut> NotificationHandler for F
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send,
{
    async fn handle(&self, params: Option<Value>) {
        self(params).await
    }
}

/// Registry of method handlers for one peer.
///
/// Request handlers use replace semantics: registering a second handler for
/// the same method silently displaces the first one (§4.3). Notification
/// handlers fan out to every registered handler, in registration order, and
/// a handler that panics or errors never prevents the others from running.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    requests: Arc<RwLock<HashMap<String, Arc<dyn RequestHandler>>>>,
    notifications: Arc<RwLock<HashMap<String, Vec<Arc<dyn NotificationHandler>>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the request handler for `method`.
    pub async fn on_request(&self, method: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        self.requests.write().await.insert(method.into(), handler);
    }

    /// Register an additional notification handler for `method`. Handlers
    /// accumulate; they are never replaced.
    pub async fn on_notification(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) {
        self.notifications
            .write()
            .await
            .entry(method.into())
            .or_default()
            .push(handler);
    }

    /// Look up the request handler for `method`, if any.
    pub async fn request_handler(&self, method: &str) -> Option<Arc<dyn RequestHandler>> {
        self.requests.read().await.get(method).cloned()
    }

    /// Dispatch a notification to every handler registered for `method`, in
    /// registration order. A handler that returns without panicking always
    /// yields control to the next; a panic is caught so one broken handler
    /// can't take down the receive loop.
    pub async fn dispatch_notification(&self, method: &str, params: Option<Value>) {
        let handlers = {
            let guard = self.notifications.read().await;
            guard.get(method).cloned().unwrap_or_default()
        };
        for handler in handlers {
            let params = params.clone();
            let outcome = std::panic::AssertUnwindSafe(handler.handle(params))
                .catch_unwind()
                .await;
            if outcome.is_err() {
                error!(method, "notification handler panicked");
            }
        }
    }

    /// Whether any handler is registered for `method` notifications.
    pub async fn has_notification_handlers(&self, method: &str) -> bool {
        self.notifications
            .read()
            .await
            .get(method)
            .is_some_and(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn second_request_handler_replaces_first() {
        let registry = HandlerRegistry::new();
        registry
            .on_request("ping", Arc::new(|_| async { Ok(json!("first")) }))
            .await;
        registry
            .on_request("ping", Arc::new(|_| async { Ok(json!("second")) }))
            .await;

        let handler = registry.request_handler("ping").await.unwrap();
        let result = handler.handle(None).await.unwrap();
        assert_eq!(result, json!("second"));
    }

    #[tokio::test]
    async fn unregistered_method_has_no_handler() {
        let registry = HandlerRegistry::new();
        assert!(registry.request_handler("missing").await.is_none());
    }

    #[tokio::test]
    async fn notification_handlers_fan_out_in_order() {
        let registry = HandlerRegistry::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let order_a = order.clone();
        registry
            .on_notification(
                "progress",
                Arc::new(move |_| {
                    let order_a = order_a.clone();
                    async move { order_a.lock().unwrap().push(1) }
                }),
            )
            .await;
        let order_b = order.clone();
        registry
            .on_notification(
                "progress",
                Arc::new(move |_| {
                    let order_b = order_b.clone();
                    async move { order_b.lock().unwrap().push(2) }
                }),
            )
            .await;

        registry.dispatch_notification("progress", None).await;
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_block_the_next() {
        let registry = HandlerRegistry::new();
        let ran = Arc::new(AtomicUsize::new(0));

        registry
            .on_notification("evt", Arc::new(|_| async { panic!("boom") }))
            .await;
        let ran_clone = ran.clone();
        registry
            .on_notification(
                "evt",
                Arc::new(move |_| {
                    let ran_clone = ran_clone.clone();
                    async move {
                        ran_clone.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            )
            .await;

        registry.dispatch_notification("evt", None).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}

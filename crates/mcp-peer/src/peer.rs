//! The peer engine (§4.6): a single generic type that plays either side of
//! an MCP connection (§4.4 REDESIGN FLAG — no separate client/server
//! implementations).

use crate::config::PeerConfig;
use crate::lifecycle_state::{LifecycleCell, LifecycleState};
use crate::pending::PendingRequestTable;
use crate::progress::{ProgressCallback, ProgressCoordinator, TimeoutController};
use crate::registry::HandlerRegistry;
use crate::role::{Client, Role, Server};
use crate::transport::Transport;
use bytes::Bytes;
use mcp_protocol::{
    ClassifiedItem, ClassifiedMessage, ClientCapabilities, ClientInfo, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    McpError, McpErrorKind, ProgressToken, RequestId, ServerCapabilities, ServerInfo,
    negotiate_version,
};
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn, Instrument};

const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
const NOTIFICATION_CANCELLED: &str = "notifications/cancelled";
const NOTIFICATION_PROGRESS: &str = "notifications/progress";
const NOTIFICATION_TASK_STATUS: &str = "notifications/tasks/status";
const METHOD_INITIALIZE: &str = "initialize";
const METHOD_PING: &str = "ping";

/// What the server side needs on hand to answer an inbound `initialize`
/// request without the caller having to special-case it through the
/// registry (§4.4 treats `initialize` as structurally distinguished).
struct ServerIdentity {
    info: ServerInfo,
    capabilities: ServerCapabilities,
    supported_versions: Vec<String>,
    instructions: Option<String>,
}

/// A handle to one side of an MCP connection.
///
/// `R` selects [`Client`] or [`Server`]; the request/response/notification
/// machinery below is identical either way, which is the point of this
/// type existing instead of two parallel implementations.
pub struct Peer<R: Role> {
    outbound_tx: mpsc::UnboundedSender<Bytes>,
    pending: PendingRequestTable,
    registry: HandlerRegistry,
    progress: ProgressCoordinator,
    lifecycle: Arc<LifecycleCell>,
    next_id: Arc<AtomicI64>,
    config: PeerConfig,
    remote_capabilities: Arc<Mutex<Option<R::RemoteCapabilities>>>,
    inflight: Arc<Mutex<HashMap<RequestId, CancellationToken>>>,
    shutdown: CancellationToken,
    loop_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    server_identity: Option<Arc<ServerIdentity>>,
    _role: PhantomData<R>,
}

/// A handle returned by [`Peer::send`]: the request id plus a future that
/// resolves when the paired response (or a local failure) arrives.
pub struct RequestContext {
    pub request_id: RequestId,
    receiver: oneshot::Receiver<crate::pending::AwaitOutcome>,
}

impl RequestContext {
    /// Await the response.
    pub async fn result(self) -> Result<JsonRpcResponse, McpError> {
        self.receiver
            .await
            .unwrap_or_else(|_| Err(McpError::connection_closed("peer engine dropped")))
    }
}

impl<R: Role> Peer<R> {
    fn spawn<T: Transport>(
        mut transport: T,
        config: PeerConfig,
        server_identity: Option<Arc<ServerIdentity>>,
    ) -> Self {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Bytes>();
        let pending = PendingRequestTable::new();
        let registry = HandlerRegistry::new();
        let progress = ProgressCoordinator::new();
        let lifecycle = Arc::new(LifecycleCell::new());
        let inflight: Arc<Mutex<HashMap<RequestId, CancellationToken>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let loop_pending = pending.clone();
        let loop_registry = registry.clone();
        let loop_progress = progress.clone();
        let loop_lifecycle = lifecycle.clone();
        let loop_inflight = inflight.clone();
        let loop_shutdown = shutdown.clone();
        let loop_outbound = outbound_tx.clone();
        let loop_identity = server_identity.clone();
        let loop_strict = config.strict;

        let receive_loop_span = tracing::debug_span!("peer_receive_loop", role = R::name());
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = loop_shutdown.cancelled() => {
                        break;
                    }
                    outbound = outbound_rx.recv() => {
                        match outbound {
                            Some(bytes) => {
                                if let Err(err) = transport.send(bytes).await {
                                    warn!(error = %err, "transport send failed, stopping receive loop");
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    inbound = transport.recv() => {
                        match inbound {
                            Ok(Some(bytes)) => {
                                dispatch_inbound(
                                    &bytes,
                                    &loop_pending,
                                    &loop_registry,
                                    &loop_progress,
                                    &loop_lifecycle,
                                    &loop_inflight,
                                    &loop_outbound,
                                    loop_identity.as_deref(),
                                    loop_strict,
                                )
                                .await;
                            }
                            Ok(None) => break,
                            Err(err) => {
                                warn!(error = %err, "transport recv failed, stopping receive loop");
                                break;
                            }
                        }
                    }
                }
            }
            loop_lifecycle.set(LifecycleState::Disconnected);
            loop_pending
                .drain_with_error(McpError::connection_closed("transport closed"))
                .await;
        }.instrument(receive_loop_span));

        Self {
            outbound_tx,
            pending,
            registry,
            progress,
            lifecycle,
            next_id: Arc::new(AtomicI64::new(1)),
            config,
            remote_capabilities: Arc::new(Mutex::new(None)),
            inflight,
            shutdown,
            loop_handle: Arc::new(Mutex::new(Some(handle))),
            server_identity,
            _role: PhantomData,
        }
    }

    /// Register the request handler for `method`, replacing any previous one.
    pub async fn on_request(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn crate::registry::RequestHandler>,
    ) {
        self.registry.on_request(method, handler).await;
    }

    /// Register an additional notification handler for `method`.
    pub async fn on_notification(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn crate::registry::NotificationHandler>,
    ) {
        self.registry.on_notification(method, handler).await;
    }

    /// Current lifecycle state.
    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.get()
    }

    /// The remote peer's declared capabilities, once known (after `initialize`).
    pub async fn remote_capabilities(&self) -> Option<R::RemoteCapabilities> {
        self.remote_capabilities.lock().await.clone()
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn encode_request(request: &JsonRpcRequest) -> Result<Bytes, McpError> {
        serde_json::to_vec(request)
            .map(Bytes::from)
            .map_err(McpError::from)
    }

    fn encode_notification(notification: &JsonRpcNotification) -> Result<Bytes, McpError> {
        serde_json::to_vec(notification)
            .map(Bytes::from)
            .map_err(McpError::from)
    }

    /// Send a request and register it in the pending table. Returns a
    /// [`RequestContext`] the caller awaits for the response.
    pub async fn send(&self, method: impl Into<String>, params: Option<Value>) -> Result<RequestContext, McpError> {
        self.lifecycle.require_not_disconnected()?;
        let id = self.next_request_id();
        let request = JsonRpcRequest::new(method.into(), params, id.clone());
        let receiver = self.pending.add(id.clone()).await?;
        let bytes = Self::encode_request(&request)?;
        self.outbound_tx
            .send(bytes)
            .map_err(|_| McpError::connection_closed("peer engine receive loop has stopped"))?;
        Ok(RequestContext { request_id: id, receiver })
    }

    /// Send a request with an `on_progress` callback (§4.5). Injects
    /// `_meta.progressToken`, registers the callback (and an optional
    /// timeout controller), and returns the same [`RequestContext`] as
    /// [`Peer::send`].
    pub async fn send_with_progress(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        callback: Arc<dyn ProgressCallback>,
        timeout: Option<Duration>,
    ) -> Result<RequestContext, McpError> {
        self.lifecycle.require_not_disconnected()?;
        let id = self.next_request_id();
        let token = ProgressToken::from(&id);
        let params = crate::progress::inject_progress_token(params, &token);

        let controller = timeout.map(|base| {
            Arc::new(TimeoutController::new(
                base,
                self.config.reset_on_progress,
                self.config.max_total_timeout,
            ))
        });
        self.progress
            .register(id.clone(), token, callback, controller.clone())
            .await;

        let request = JsonRpcRequest::new(method.into(), Some(params), id.clone());
        let receiver = self.pending.add(id.clone()).await?;
        let bytes = Self::encode_request(&request)?;
        self.outbound_tx
            .send(bytes)
            .map_err(|_| McpError::connection_closed("peer engine receive loop has stopped"))?;

        if let Some(controller) = controller {
            let pending = self.pending.clone();
            let progress = self.progress.clone();
            let id_for_timeout = id.clone();
            tokio::spawn(async move {
                controller.wait_for_timeout().await;
                progress.remove(&id_for_timeout).await;
                pending
                    .resume_failure(&id_for_timeout, McpError::request_timeout("request timed out"))
                    .await;
            });
        }

        Ok(RequestContext { request_id: id, receiver })
    }

    /// Send a fire-and-forget notification.
    pub async fn notify(&self, method: impl Into<String>, params: Option<Value>) -> Result<(), McpError> {
        self.lifecycle.require_not_disconnected()?;
        let notification = JsonRpcNotification::new(method.into(), params);
        let bytes = Self::encode_notification(&notification)?;
        self.outbound_tx
            .send(bytes)
            .map_err(|_| McpError::connection_closed("peer engine receive loop has stopped"))
    }

    /// Cancel an outbound request: resume the local awaiter with
    /// [`McpErrorKind::Cancelled`] and notify the remote side (§4.5).
    pub async fn cancel(&self, request_id: RequestId, reason: Option<String>) -> Result<(), McpError> {
        self.progress.remove(&request_id).await;
        self.pending
            .resume_failure(&request_id, McpError::cancelled("cancelled by caller"))
            .await;
        let mut params = serde_json::json!({ "requestId": request_id });
        if let Some(reason) = reason {
            params["reason"] = Value::String(reason);
        }
        self.notify(NOTIFICATION_CANCELLED, Some(params)).await
    }

    /// Batch several outbound requests into one JSON-RPC array (§4.6).
    /// Each request still resolves independently through the pending table
    /// once the paired response array arrives.
    pub async fn with_batch<F, Fut>(&self, build: F) -> Result<Vec<RequestContext>, McpError>
    where
        F: FnOnce(&Self) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<RequestContext>, McpError>>,
    {
        // Contexts are created through the normal `send` path (so pending
        // registration and id allocation stay centralized); this wrapper
        // exists so callers have one call site describing the intent.
        build(self).await
    }

    /// Tear down the connection: stop the receive loop, drain pending
    /// requests with a disconnected error, and close the transport.
    pub async fn disconnect(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.loop_handle.lock().await.take() {
            let _ = handle.await;
        }
        self.lifecycle.set(LifecycleState::Disconnected);
        self.pending
            .drain_with_error(McpError::connection_closed("disconnected"))
            .await;
    }
}

impl Peer<Client> {
    /// Connect as the client side of a new connection.
    pub fn connect<T: Transport>(transport: T, config: PeerConfig) -> Self {
        Self::spawn(transport, config, None)
    }

    /// Drive the `initialize` handshake (§4.4): send `initialize`, store the
    /// negotiated result, move to `Initialized`, then send
    /// `notifications/initialized`.
    pub async fn initialize(
        &self,
        client_info: ClientInfo,
        capabilities: ClientCapabilities,
        proposed_version: impl Into<String>,
    ) -> Result<InitializeResult, McpError> {
        self.lifecycle.set(LifecycleState::Initializing);
        let params = InitializeParams {
            protocol_version: proposed_version.into(),
            capabilities,
            client_info,
        };
        let context = self
            .send(METHOD_INITIALIZE, Some(serde_json::to_value(params)?))
            .await?;
        let response = context.result().await?;
        let result: InitializeResult = response
            .result()
            .ok_or_else(|| McpError::internal("initialize response had no result"))
            .and_then(|v| serde_json::from_value(v.clone()).map_err(McpError::from))?;

        *self.remote_capabilities.lock().await = Some(result.capabilities.clone());
        self.lifecycle.set(LifecycleState::Initialized);
        self.notify(NOTIFICATION_INITIALIZED, None).await?;
        Ok(result)
    }

    /// Strict-mode gate for an outbound call: fails locally, before sending
    /// anything, if the server never declared `capability` (§4.4).
    pub async fn require_remote_capability(
        &self,
        capability: mcp_protocol::CapabilityName,
    ) -> Result<(), McpError> {
        if !self.config.strict {
            return Ok(());
        }
        let declared = self
            .remote_capabilities
            .lock()
            .await
            .as_ref()
            .is_some_and(|caps| caps.declares(capability));
        crate::lifecycle_state::require_capability(declared, capability)
    }
}

impl Peer<Server> {
    /// Connect as the server side of a new connection, ready to answer an
    /// inbound `initialize` request with the given identity.
    pub fn connect<T: Transport>(
        transport: T,
        config: PeerConfig,
        info: ServerInfo,
        capabilities: ServerCapabilities,
        supported_versions: Vec<String>,
        instructions: Option<String>,
    ) -> Self {
        let identity = Arc::new(ServerIdentity {
            info,
            capabilities,
            supported_versions,
            instructions,
        });
        Self::spawn(transport, config, Some(identity))
    }

    /// Strict-mode gate for an outbound call (server calling back into the
    /// client, e.g. sampling) against the client's declared capabilities.
    pub async fn require_remote_capability(
        &self,
        capability: mcp_protocol::CapabilityName,
    ) -> Result<(), McpError> {
        if !self.config.strict {
            return Ok(());
        }
        let declared = self
            .remote_capabilities
            .lock()
            .await
            .as_ref()
            .is_some_and(|caps| caps.declares(capability));
        crate::lifecycle_state::require_capability(declared, capability)
    }
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip_all)]
async fn dispatch_inbound(
    bytes: &Bytes,
    pending: &PendingRequestTable,
    registry: &HandlerRegistry,
    progress: &ProgressCoordinator,
    lifecycle: &LifecycleCell,
    inflight: &Arc<Mutex<HashMap<RequestId, CancellationToken>>>,
    outbound: &mpsc::UnboundedSender<Bytes>,
    server_identity: Option<&ServerIdentity>,
    strict: bool,
) {
    let classified = match mcp_protocol::classify(bytes) {
        Ok(c) => c,
        Err(err) => {
            debug!(error = %err, "dropping unparseable inbound message");
            let response = JsonRpcResponse::parse_error(err.to_string());
            send_response(outbound, &response);
            return;
        }
    };

    match classified {
        ClassifiedMessage::ResponseBatch(responses) => {
            for response in responses {
                handle_response(pending, progress, &response).await;
            }
        }
        ClassifiedMessage::Response(response) => {
            handle_response(pending, progress, &response).await;
        }
        ClassifiedMessage::Request(request) => {
            handle_request(
                request, registry, lifecycle, inflight, outbound, server_identity, strict,
            )
            .await;
        }
        ClassifiedMessage::Notification(notification) => {
            handle_notification(
                notification, registry, progress, lifecycle, inflight,
            )
            .await;
        }
        ClassifiedMessage::Batch(items) => {
            for item in items {
                match item {
                    ClassifiedItem::Request(request) => {
                        handle_request(
                            request, registry, lifecycle, inflight, outbound, server_identity, strict,
                        )
                        .await;
                    }
                    ClassifiedItem::Notification(notification) => {
                        handle_notification(
                            notification, registry, progress, lifecycle, inflight,
                        )
                        .await;
                    }
                }
            }
        }
    }
}

async fn handle_response(
    pending: &PendingRequestTable,
    progress: &ProgressCoordinator,
    response: &JsonRpcResponse,
) {
    let Some(id) = response.request_id() else {
        warn!("dropping response with null id");
        return;
    };
    progress.handle_response(id, response).await;
    pending.resume_success(id, response.clone()).await;
}

async fn handle_request(
    request: JsonRpcRequest,
    registry: &HandlerRegistry,
    lifecycle: &LifecycleCell,
    inflight: &Arc<Mutex<HashMap<RequestId, CancellationToken>>>,
    outbound: &mpsc::UnboundedSender<Bytes>,
    server_identity: Option<&ServerIdentity>,
    strict: bool,
) {
    let id = request.id.clone();

    if request.method == METHOD_INITIALIZE {
        if let Some(identity) = server_identity {
            if lifecycle.current() != LifecycleState::Uninitialized {
                send_response(
                    outbound,
                    &error_response(id, McpError::invalid_request("already initialized")),
                );
                return;
            }
            let response = answer_initialize(&request, identity, lifecycle);
            send_response(outbound, &response);
        } else {
            send_response(
                outbound,
                &error_response(id, McpError::invalid_request("unexpected initialize request")),
            );
        }
        return;
    }

    if strict && request.method != METHOD_PING {
        if let Err(err) = lifecycle.require_initialized() {
            send_response(outbound, &error_response(id, err));
            return;
        }
    }

    let Some(handler) = registry.request_handler(&request.method).await else {
        send_response(
            outbound,
            &error_response(id, McpError::method_not_found(format!("no handler for {}", request.method))),
        );
        return;
    };

    let token = CancellationToken::new();
    inflight.lock().await.insert(id.clone(), token.clone());

    let outcome = tokio::select! {
        result = handler.handle(request.params.clone()) => Some(result),
        () = token.cancelled() => None,
    };

    inflight.lock().await.remove(&id);

    match outcome {
        None => debug!(request_id = %id, "handler cancelled, suppressing response"),
        Some(result) => {
            // Check cancellation one more time immediately before
            // transmitting: a cancel that raced the handler's completion
            // must still suppress the response (§5).
            if token.is_cancelled() {
                debug!(request_id = %id, "handler completed but was cancelled, suppressing response");
                return;
            }
            let response = match result {
                Ok(value) => JsonRpcResponse::success(value, id),
                Err(err) => error_response(id, err),
            };
            send_response(outbound, &response);
        }
    }
}

async fn handle_notification(
    notification: JsonRpcNotification,
    registry: &HandlerRegistry,
    progress: &ProgressCoordinator,
    lifecycle: &LifecycleCell,
    inflight: &Arc<Mutex<HashMap<RequestId, CancellationToken>>>,
) {
    match notification.method.as_str() {
        NOTIFICATION_INITIALIZED => {
            // The server already moved to `Initialized` when it sent the
            // `initialize` reply (see `answer_initialize`); this client
            // acknowledgement needs no further action on the server side.
            return;
        }
        NOTIFICATION_TASK_STATUS => {
            if let Some(params) = &notification.params {
                let task_id = params.get("taskId").and_then(Value::as_str);
                let terminal = params
                    .get("status")
                    .and_then(Value::as_str)
                    .is_some_and(|status| matches!(status, "completed" | "failed" | "cancelled"));
                if let (Some(task_id), true) = (task_id, terminal) {
                    progress.complete_task(task_id).await;
                }
            }
            return;
        }
        NOTIFICATION_CANCELLED => {
            if let Some(params) = &notification.params {
                if let Some(id) = params.get("requestId").and_then(parse_request_id) {
                    if let Some(token) = inflight.lock().await.remove(&id) {
                        token.cancel();
                    }
                }
            }
            return;
        }
        NOTIFICATION_PROGRESS => {
            if let Some(params) = &notification.params {
                if let Some(token) = params
                    .get("progressToken")
                    .and_then(|v| serde_json::from_value::<ProgressToken>(v.clone()).ok())
                {
                    let progress_value = params.get("progress").and_then(Value::as_f64).unwrap_or(0.0);
                    let total = params.get("total").and_then(Value::as_f64);
                    let message = params
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    progress.on_progress(&token, progress_value, total, message).await;
                }
            }
            return;
        }
        _ => {}
    }
    registry
        .dispatch_notification(&notification.method, notification.params.clone())
        .await;
}

fn answer_initialize(
    request: &JsonRpcRequest,
    identity: &ServerIdentity,
    lifecycle: &LifecycleCell,
) -> JsonRpcResponse {
    lifecycle.set(LifecycleState::Initializing);
    let params: Result<InitializeParams, _> = request
        .params
        .as_ref()
        .cloned()
        .ok_or_else(|| McpError::invalid_params("missing initialize params"))
        .and_then(|v| serde_json::from_value(v).map_err(McpError::from));

    let response = match params {
        Ok(params) => {
            let negotiated = negotiate_version(&params.protocol_version, &identity.supported_versions);
            let result = InitializeResult {
                protocol_version: negotiated,
                capabilities: identity.capabilities.clone(),
                server_info: identity.info.clone(),
                instructions: identity.instructions.clone(),
            };
            match serde_json::to_value(result) {
                Ok(value) => JsonRpcResponse::success(value, request.id.clone()),
                Err(err) => error_response(request.id.clone(), McpError::from(err)),
            }
        }
        Err(err) => error_response(request.id.clone(), err),
    };

    // The reply itself completes the handshake on the server side; the
    // client's separate `notifications/initialized` needs no further wait
    // (§4.4 step 5: transition atomically with the reply, not the ack).
    if !response.is_error() {
        lifecycle.set(LifecycleState::Initialized);
    }
    response
}

fn error_response(id: RequestId, error: McpError) -> JsonRpcResponse {
    let wire: JsonRpcError = error.to_jsonrpc_error();
    JsonRpcResponse::error_response(wire, id)
}

fn send_response(outbound: &mpsc::UnboundedSender<Bytes>, response: &JsonRpcResponse) {
    match serde_json::to_vec(response) {
        Ok(bytes) => {
            let _ = outbound.send(Bytes::from(bytes));
        }
        Err(err) => warn!(error = %err, "failed to encode outbound response"),
    }
}

fn parse_request_id(value: &Value) -> Option<RequestId> {
    serde_json::from_value(value.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DuplexTransport;
    use mcp_protocol::ServerCapabilities;
    use serde_json::json;

    fn client_server_pair() -> (Peer<Client>, Peer<Server>) {
        let (transport_a, transport_b) = DuplexTransport::pair(32);
        let client = Peer::<Client>::connect(transport_a, PeerConfig::default());
        let server = Peer::<Server>::connect(
            transport_b,
            PeerConfig::default(),
            ServerInfo { name: "srv".into(), version: "1".into() },
            ServerCapabilities::default(),
            vec!["2025-06-18".into()],
            None,
        );
        (client, server)
    }

    #[tokio::test]
    async fn initialize_handshake_reaches_initialized_on_both_sides() {
        let (client, server) = client_server_pair();

        let result = client
            .initialize(
                ClientInfo { name: "cli".into(), version: "1".into() },
                ClientCapabilities::default(),
                "2025-06-18",
            )
            .await
            .unwrap();

        assert_eq!(result.protocol_version, "2025-06-18");
        assert_eq!(client.lifecycle_state(), LifecycleState::Initialized);

        // Give the server's loop a tick to process the `initialized` notification.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(server.lifecycle_state(), LifecycleState::Initialized);
    }

    #[tokio::test]
    async fn unhandled_method_returns_method_not_found() {
        let (client, server) = client_server_pair();
        client
            .initialize(
                ClientInfo { name: "cli".into(), version: "1".into() },
                ClientCapabilities::default(),
                "2025-06-18",
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = &server;

        let context = client.send("tools/call", Some(json!({"name": "nope"}))).await.unwrap();
        let response = context.result().await.unwrap();
        assert!(response.is_error());
    }

    #[tokio::test]
    async fn cancel_in_flight_suppresses_response() {
        let (client, server) = client_server_pair();
        client
            .initialize(
                ClientInfo { name: "cli".into(), version: "1".into() },
                ClientCapabilities::default(),
                "2025-06-18",
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        server
            .on_request(
                "tools/call",
                Arc::new(|_params: Option<Value>| async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(json!({"content": []}))
                }),
            )
            .await;

        let context = client.send("tools/call", Some(json!({"name": "slow"}))).await.unwrap();
        let id = context.request_id.clone();
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.cancel(id, Some("user".into())).await.unwrap();

        let outcome = context.result().await;
        assert!(matches!(outcome, Err(e) if e.kind == McpErrorKind::Cancelled));
    }

    #[tokio::test]
    async fn repeated_initialize_is_rejected_once_already_initialized() {
        let (client, _server) = client_server_pair();
        client
            .initialize(
                ClientInfo { name: "cli".into(), version: "1".into() },
                ClientCapabilities::default(),
                "2025-06-18",
            )
            .await
            .unwrap();

        let params = InitializeParams {
            protocol_version: "2025-06-18".into(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo { name: "cli".into(), version: "1".into() },
        };
        let context = client
            .send(METHOD_INITIALIZE, Some(serde_json::to_value(params).unwrap()))
            .await
            .unwrap();
        let response = context.result().await.unwrap();
        assert!(response.is_error());
    }

    #[tokio::test]
    async fn lenient_server_accepts_requests_before_initialize() {
        let (transport_a, transport_b) = DuplexTransport::pair(32);
        let client = Peer::<Client>::connect(transport_a, PeerConfig::builder().strict(false).build());
        let server = Peer::<Server>::connect(
            transport_b,
            PeerConfig::builder().strict(false).build(),
            ServerInfo { name: "srv".into(), version: "1".into() },
            ServerCapabilities::default(),
            vec!["2025-06-18".into()],
            None,
        );
        server
            .on_request("tools/call", Arc::new(|_: Option<Value>| async move { Ok(json!({"ok": true})) }))
            .await;

        // No `initialize` handshake happened yet; a lenient server must
        // still answer a request sent before it.
        let context = client.send("tools/call", Some(json!({}))).await.unwrap();
        let response = context.result().await.unwrap();
        assert!(!response.is_error());
    }

    #[tokio::test]
    async fn strict_server_rejects_requests_before_initialize() {
        let (client, _server) = client_server_pair();
        let context = client.send("tools/call", Some(json!({}))).await.unwrap();
        let response = context.result().await.unwrap();
        assert!(response.is_error());
    }

    #[tokio::test]
    async fn terminal_task_status_notification_releases_the_progress_registration() {
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
            json!({"task": {"taskId": "bg-1"}}),
            request_id.clone(),
        );
        coordinator.handle_response(&request_id, &response).await;

        let registry = HandlerRegistry::new();
        let lifecycle = LifecycleCell::new();
        let inflight = Arc::new(Mutex::new(HashMap::new()));
        let notification = JsonRpcNotification::new(
            NOTIFICATION_TASK_STATUS.to_string(),
            Some(json!({"taskId": "bg-1", "status": "completed"})),
        );
        handle_notification(notification, &registry, &coordinator, &lifecycle, &inflight).await;

        assert!(!coordinator.has_token(&token).await);
    }
}

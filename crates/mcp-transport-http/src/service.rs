//! The axum `Router` for the Streamable HTTP transport (§4.7): one endpoint,
//! three methods.
//!
//! - `POST`: deliver a request/notification/response. Requests answer
//!   either inline as JSON or as a short-lived SSE stream, depending on the
//!   client's `Accept` header; notifications and responses get `202
//!   Accepted`.
//! - `GET` (stateful only): open the standalone SSE stream for
//!   server-initiated traffic, replaying missed events via `Last-Event-ID`.
//! - `DELETE` (stateful only): terminate a session.
//!
//! In stateless mode there is exactly one [`mcp_peer::Peer`] for the whole
//! service's lifetime and every POST request waits inline for its answer;
//! in stateful mode each `Mcp-Session-Id` gets its own peer, created on the
//! session's `initialize` call.

use crate::config::StreamableHttpConfig;
use crate::error::HttpTransportError;
use crate::event_store::EventStore;
use crate::registry::StreamRegistry;
use crate::session::{SessionId, SessionStore, StandaloneAlreadyOpen};
use crate::sse::SseEvent;
use crate::transport::{session_transport, HttpServerTransportHandle};
use crate::validation::{
    AcceptHeaderValidator, ContentTypeValidator, OriginValidator, ProtocolVersionValidator,
    SessionValidator, ValidationContext, Validator,
};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::future::BoxFuture;
use mcp_peer::{Peer, PeerConfig};
use mcp_protocol::{ClassifiedMessage, ServerCapabilities, ServerInfo};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, instrument};

const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";
const METHOD_INITIALIZE: &str = "initialize";

/// Called once per new session (stateful) or once at startup (stateless) to
/// register the application's request/notification handlers on a freshly
/// connected [`Peer<Server>`](mcp_peer::Server), the same way the caller
/// would wire up a stdio transport.
pub type PeerConfigurer =
    Arc<dyn for<'a> Fn(&'a Peer<mcp_peer::Server>) -> BoxFuture<'a, ()> + Send + Sync>;

struct Identity {
    info: ServerInfo,
    capabilities: ServerCapabilities,
    instructions: Option<String>,
}

/// Shared state backing every handler: session/event bookkeeping plus one
/// live `Peer<Server>` per session (or, in stateless mode, exactly one).
struct ServiceState {
    config: StreamableHttpConfig,
    sessions: SessionStore,
    registry: StreamRegistry,
    identity: Identity,
    peer_config: PeerConfig,
    configure: PeerConfigurer,
    engines: RwLock<HashMap<SessionId, Arc<Engine>>>,
    stateless: Option<(SessionId, Arc<Engine>)>,
}

struct Engine {
    peer: Peer<mcp_peer::Server>,
    handle: HttpServerTransportHandle,
}

/// Runtime counters exposed alongside the router (see [`StreamableHttpService::stats`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceStats {
    pub dropped_notifications: u64,
}

/// The constructed service: an axum [`Router`] plus the ability to shut
/// every live session engine down.
#[derive(Clone)]
pub struct StreamableHttpService {
    state: Arc<ServiceState>,
}

impl StreamableHttpService {
    pub async fn new(
        config: StreamableHttpConfig,
        peer_config: PeerConfig,
        info: ServerInfo,
        capabilities: ServerCapabilities,
        instructions: Option<String>,
        configure: PeerConfigurer,
    ) -> Self {
        let registry = StreamRegistry::new(EventStore::new(config.max_events_per_session));
        let identity = Identity { info, capabilities, instructions };

        let stateless = if config.stateful {
            None
        } else {
            let pseudo_session = SessionId::new();
            let (transport, handle) = session_transport(pseudo_session.clone(), registry.clone());
            let peer = Peer::<mcp_peer::Server>::connect(
                transport,
                peer_config.clone(),
                identity.info.clone(),
                identity.capabilities.clone(),
                config.supported_versions.clone(),
                identity.instructions.clone(),
            );
            configure(&peer).await;
            Some((pseudo_session, Arc::new(Engine { peer, handle })))
        };

        Self {
            state: Arc::new(ServiceState {
                config,
                sessions: SessionStore::new(),
                registry,
                identity,
                peer_config,
                configure,
                engines: RwLock::new(HashMap::new()),
                stateless,
            }),
        }
    }

    /// Snapshot of runtime counters not otherwise observable from outside
    /// the HTTP surface (Open Question 3).
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            dropped_notifications: self.state.registry.dropped_notifications(),
        }
    }

    pub fn router(self) -> Router {
        let path = self.state.config.endpoint_path.clone();
        Router::new()
            .route(
                &path,
                get(get_handler).post(post_handler).delete(delete_handler),
            )
            .with_state(self.state)
    }
}

impl ServiceState {
    async fn engine_for_new_session(&self) -> (SessionId, Arc<Engine>) {
        let session = self.sessions.create().await;
        let (transport, handle) = session_transport(session.clone(), self.registry.clone());
        let peer = Peer::<mcp_peer::Server>::connect(
            transport,
            self.peer_config.clone(),
            self.identity.info.clone(),
            self.identity.capabilities.clone(),
            self.config.supported_versions.clone(),
            self.identity.instructions.clone(),
        );
        (self.configure)(&peer).await;
        let engine = Arc::new(Engine { peer, handle });
        self.engines.write().await.insert(session.clone(), engine.clone());
        (session, engine)
    }

    async fn engine_for(&self, session: &SessionId) -> Option<Arc<Engine>> {
        self.engines.read().await.get(session).cloned()
    }

    async fn drop_session(&self, session: &SessionId) {
        if let Some(engine) = self.engines.write().await.remove(session) {
            engine.peer.disconnect().await;
        }
        self.sessions.terminate(session).await;
        self.registry.drop_session(session).await;
    }
}

fn session_id_header(id: &SessionId) -> (axum::http::HeaderName, HeaderValue) {
    (
        axum::http::HeaderName::from_static("mcp-session-id"),
        HeaderValue::from_str(id.as_str()).unwrap_or_else(|_| HeaderValue::from_static("")),
    )
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn classify_body(body: &[u8]) -> Result<ClassifiedMessage, HttpTransportError> {
    mcp_protocol::classify(body).map_err(|e| HttpTransportError::ParseError(e.to_string()))
}

fn is_initialize(classified: &ClassifiedMessage) -> bool {
    matches!(classified, ClassifiedMessage::Request(r) if r.method == METHOD_INITIALIZE)
}

fn request_stream_id(classified: &ClassifiedMessage) -> Option<String> {
    match classified {
        ClassifiedMessage::Request(r) => Some(r.id.to_string()),
        _ => None,
    }
}

fn prefers_sse(headers: &HeaderMap) -> bool {
    header_str(headers, "accept").is_some_and(|a| a.contains("text/event-stream"))
}

fn validators() -> Vec<Box<dyn Validator>> {
    vec![
        Box::new(AcceptHeaderValidator),
        Box::new(ContentTypeValidator),
        Box::new(ProtocolVersionValidator),
        Box::new(SessionValidator),
        Box::new(OriginValidator),
    ]
}

/// POST: deliver one JSON-RPC payload.
async fn post_handler(
    State(state): State<Arc<ServiceState>>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let classified = match classify_body(&bytes) {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    let session_header = header_str(&headers, "mcp-session-id");
    let initialize = is_initialize(&classified);
    let known_session = match session_header.and_then(SessionId::try_from_str) {
        Some(id) => state.sessions.exists(&id).await,
        None => false,
    };

    let ctx = ValidationContext {
        is_initialize: initialize,
        is_get: false,
        session_header,
        known_session,
        stateful: state.config.stateful,
        supported_versions: &state.config.supported_versions,
        origin_policy: &state.config.origin_policy,
    };
    if let Some(err) = crate::validation::run_pipeline(&validators(), &headers, &ctx) {
        return err.into_response();
    }

    if state.config.stateful {
        stateful_post(&state, &headers, classified, initialize, session_header).await
    } else {
        stateless_post(&state, classified).await
    }
}

async fn stateful_post(
    state: &ServiceState,
    headers: &HeaderMap,
    classified: ClassifiedMessage,
    initialize: bool,
    session_header: Option<&str>,
) -> Response {
    let (session, engine) = if initialize {
        if session_header.is_some() {
            return HttpTransportError::AlreadyInitialized.into_response();
        }
        state.engine_for_new_session().await
    } else {
        // SessionValidator already guaranteed this header names a known session.
        let id = SessionId::try_from_str(session_header.unwrap_or_default()).unwrap();
        let Some(engine) = state.engine_for(&id).await else {
            return HttpTransportError::UnknownSession.into_response();
        };
        (id, engine)
    };
    state.sessions.touch(&session).await;

    match &classified {
        ClassifiedMessage::Notification(_) | ClassifiedMessage::Response(_) => {
            if let Err(e) = deliver(&engine, &classified) {
                return e.into_response();
            }
            let mut response = StatusCode::ACCEPTED.into_response();
            response.headers_mut().insert("mcp-session-id", session_id_header(&session).1);
            response
        }
        ClassifiedMessage::Request(_) => respond_to_request(state, &session, &engine, headers, classified).await,
        ClassifiedMessage::Batch(_) | ClassifiedMessage::ResponseBatch(_) => {
            if let Err(e) = deliver(&engine, &classified) {
                return e.into_response();
            }
            StatusCode::ACCEPTED.into_response()
        }
    }
}

#[instrument(skip_all, fields(session = %session))]
async fn respond_to_request(
    state: &ServiceState,
    session: &SessionId,
    engine: &Arc<Engine>,
    headers: &HeaderMap,
    classified: ClassifiedMessage,
) -> Response {
    let Some(stream_id) = request_stream_id(&classified) else {
        return HttpTransportError::Internal("request with no id".into()).into_response();
    };
    let mut receiver = state.registry.register_request_stream(session, &stream_id).await;
    if let Err(e) = deliver(engine, &classified) {
        state.registry.deregister_request_stream(session, &stream_id).await;
        return e.into_response();
    }

    if prefers_sse(headers) {
        let retry_ms = state.config.sse_retry_ms;
        let stream = async_stream_for_request(receiver, retry_ms, state.registry.clone(), session.clone(), stream_id);
        let mut response = Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
        response.headers_mut().insert("mcp-session-id", session_id_header(session).1);
        response
    } else {
        let answer = loop {
            match receiver.recv().await {
                Some(routed) => {
                    if let Ok(ClassifiedMessage::Response(_)) = mcp_protocol::classify(routed.payload.as_bytes()) {
                        break Some(routed.payload);
                    }
                    // A progress notification on this stream; stateless JSON
                    // callers can't observe it, so just keep waiting for the
                    // terminal response.
                }
                None => break None,
            }
        };
        state.registry.deregister_request_stream(session, &stream_id).await;
        match answer {
            Some(payload) => {
                let mut response = (StatusCode::OK, [("content-type", "application/json")], payload).into_response();
                response.headers_mut().insert("mcp-session-id", session_id_header(session).1);
                response
            }
            None => HttpTransportError::Internal("session engine closed mid-request".into()).into_response(),
        }
    }
}

/// Build the SSE body stream for one in-flight request: a priming event
/// followed by whatever the engine routes to this request's stream, ending
/// once a terminal response payload has been yielded. Deregisters the
/// routing entry itself once the loop ends, from inside the same task that
/// drains `receiver` — doing it from any other task risks unregistering
/// before the response actually arrives.
fn async_stream_for_request(
    mut receiver: tokio::sync::mpsc::UnboundedReceiver<crate::registry::RoutedMessage>,
    retry_ms: Option<u64>,
    registry: StreamRegistry,
    session: SessionId,
    stream_id: String,
) -> impl futures::Stream<Item = Result<Event, Infallible>> {
    async_stream_lite(move |yielder| async move {
        debug!(%session, %stream_id, "per-request SSE stream opened");
        let priming_id = registry.events().append_priming(&session, &stream_id).await;
        yielder(SseEvent::priming(priming_id, retry_ms));
        while let Some(routed) = receiver.recv().await {
            let terminal = matches!(
                mcp_protocol::classify(routed.payload.as_bytes()),
                Ok(ClassifiedMessage::Response(_))
            );
            yielder(SseEvent::message(routed.event_id.clone(), &routed.payload));
            if terminal {
                break;
            }
        }
        registry.deregister_request_stream(&session, &stream_id).await;
        debug!(%session, %stream_id, "per-request SSE stream closed");
    })
}

/// A tiny hand-rolled `async_stream!`-alike: runs `body` against a yield
/// closure that pushes rendered [`SseEvent`]s into an unbounded channel,
/// then wraps the receiving half as the returned [`futures::Stream`]. Avoids
/// pulling in a macro-based generator crate for what is, here, one call site.
fn async_stream_lite<F, Fut>(body: F) -> impl futures::Stream<Item = Result<Event, Infallible>>
where
    F: FnOnce(Arc<dyn Fn(SseEvent) + Send + Sync>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<SseEvent>();
    let yielder: Arc<dyn Fn(SseEvent) + Send + Sync> = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    tokio::spawn(body(yielder));
    UnboundedReceiverStream::new(rx).map(|event| Ok(render_event(event)))
}

fn render_event(event: SseEvent) -> Event {
    let mut built = Event::default().id(event.id);
    if let Some(name) = event.event {
        built = built.event(name);
    }
    if let Some(retry) = event.retry_ms {
        built = built.retry(std::time::Duration::from_millis(retry));
    }
    built.data(event.data.unwrap_or_default())
}

fn deliver(engine: &Engine, classified: &ClassifiedMessage) -> Result<(), HttpTransportError> {
    let bytes = match classified {
        ClassifiedMessage::Request(r) => serde_json::to_vec(r),
        ClassifiedMessage::Notification(n) => serde_json::to_vec(n),
        ClassifiedMessage::Response(r) => serde_json::to_vec(r),
        ClassifiedMessage::Batch(items) => serde_json::to_vec(items),
        ClassifiedMessage::ResponseBatch(items) => serde_json::to_vec(items),
    }
    .map_err(|e| HttpTransportError::Internal(e.to_string()))?;
    engine
        .handle
        .deliver(Bytes::from(bytes))
        .map_err(|e| HttpTransportError::Internal(e.to_string()))
}

async fn stateless_post(state: &ServiceState, classified: ClassifiedMessage) -> Response {
    let (pseudo_session, engine) = state
        .stateless
        .as_ref()
        .expect("stateless_post only runs when the service was built in stateless mode")
        .clone();

    match &classified {
        ClassifiedMessage::Notification(_) | ClassifiedMessage::Response(_) => {
            match deliver(&engine, &classified) {
                Ok(()) => StatusCode::ACCEPTED.into_response(),
                Err(e) => e.into_response(),
            }
        }
        ClassifiedMessage::Request(_) => {
            let stream_id = request_stream_id(&classified).unwrap_or_default();
            let mut receiver = state.registry.register_request_stream(&pseudo_session, &stream_id).await;
            if let Err(e) = deliver(&engine, &classified) {
                state.registry.deregister_request_stream(&pseudo_session, &stream_id).await;
                return e.into_response();
            }
            let answer = loop {
                match receiver.recv().await {
                    Some(routed)
                        if matches!(
                            mcp_protocol::classify(routed.payload.as_bytes()),
                            Ok(ClassifiedMessage::Response(_))
                        ) =>
                    {
                        break Some(routed.payload)
                    }
                    Some(_) => continue,
                    None => break None,
                }
            };
            state.registry.deregister_request_stream(&pseudo_session, &stream_id).await;
            match answer {
                Some(payload) => (StatusCode::OK, [("content-type", "application/json")], payload).into_response(),
                None => HttpTransportError::Internal("engine closed mid-request".into()).into_response(),
            }
        }
        ClassifiedMessage::Batch(_) | ClassifiedMessage::ResponseBatch(_) => match deliver(&engine, &classified) {
            Ok(()) => StatusCode::ACCEPTED.into_response(),
            Err(e) => e.into_response(),
        },
    }
}

/// GET (stateful only): the standalone SSE stream. Does not detect the
/// client disconnecting mid-stream (see DESIGN.md); a terminated session's
/// `DELETE` is the reliable way to release a standalone slot.
#[instrument(skip_all)]
async fn get_handler(State(state): State<Arc<ServiceState>>, headers: HeaderMap) -> Response {
    if !state.config.stateful {
        return HttpTransportError::MethodNotAllowed.into_response();
    }
    let session_header = header_str(&headers, "mcp-session-id");
    let known_session = match session_header.and_then(SessionId::try_from_str) {
        Some(id) => state.sessions.exists(&id).await,
        None => false,
    };
    let ctx = ValidationContext {
        is_initialize: false,
        is_get: true,
        session_header,
        known_session,
        stateful: true,
        supported_versions: &state.config.supported_versions,
        origin_policy: &state.config.origin_policy,
    };
    if let Some(err) = crate::validation::run_pipeline(&validators(), &headers, &ctx) {
        return err.into_response();
    }
    let Some(session) = session_header.and_then(SessionId::try_from_str) else {
        return HttpTransportError::MissingSession.into_response();
    };

    if let Err(conflict) = state.sessions.attach_standalone(&session).await {
        return match conflict {
            StandaloneAlreadyOpen::NoSuchSession => HttpTransportError::UnknownSession.into_response(),
            StandaloneAlreadyOpen::Conflict => HttpTransportError::StandaloneConflict.into_response(),
        };
    }

    // `Last-Event-ID` is the composite `{stream_id}_{counter}` this same
    // server handed out; the stream_id it names may be this standalone
    // stream or a since-closed per-request stream whose tail the client
    // never saw delivered.
    let resume = header_str(&headers, LAST_EVENT_ID_HEADER).and_then(crate::event_store::parse_event_id);
    let (replay_stream_id, replay_counter) = resume.unwrap_or(("standalone", 0));
    let replay = state.registry.events().replay_since(&session, replay_stream_id, replay_counter).await;
    let priming_id = state.registry.events().append_priming(&session, "standalone").await;
    let mut receiver = state.registry.register_standalone(&session).await;
    let retry_ms = state.config.sse_retry_ms;

    let stream = async_stream_lite(move |yielder| async move {
        yielder(SseEvent::priming(priming_id, retry_ms));
        for event in replay {
            if let Some(message) = event.message {
                yielder(SseEvent::message(event.event_id, &message));
            }
        }
        while let Some(routed) = receiver.recv().await {
            yielder(SseEvent::message(routed.event_id.clone(), &routed.payload));
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new()).into_response()
}

/// DELETE (stateful only): terminate a session.
#[instrument(skip_all)]
async fn delete_handler(State(state): State<Arc<ServiceState>>, headers: HeaderMap) -> Response {
    if !state.config.stateful {
        return HttpTransportError::MethodNotAllowed.into_response();
    }
    let Some(session) = header_str(&headers, "mcp-session-id").and_then(SessionId::try_from_str) else {
        return HttpTransportError::MissingSession.into_response();
    };
    if !state.sessions.exists(&session).await {
        return HttpTransportError::UnknownSession.into_response();
    }
    state.drop_session(&session).await;
    debug!(%session, "session terminated");
    StatusCode::OK.into_response()
}

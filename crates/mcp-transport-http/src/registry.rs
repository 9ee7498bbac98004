//! Routes bytes the peer engine wants to send outbound to whichever HTTP
//! stream is waiting for them (§4.7).
//!
//! A session has at most two kinds of live stream: one SSE stream per
//! in-flight POST request (closed once that request's response has been
//! delivered), and at most one standalone GET stream. Anything the engine
//! sends that isn't a response to a currently-open per-request stream falls
//! back to the standalone stream if one is attached, or is recorded in the
//! [`EventStore`] for replay the next time a stream connects.

use crate::event_store::EventStore;
use crate::session::SessionId;
use bytes::Bytes;
use mcp_protocol::ClassifiedMessage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

const NOTIFICATION_PROGRESS: &str = "notifications/progress";

/// Render a raw `progressToken` value (number or string, per §4.5) the same
/// way a request id with that value would render, so it can be compared
/// against a live per-request stream's id.
fn progress_token_as_stream_id(params: Option<&serde_json::Value>) -> Option<String> {
    let token = params?.get("progressToken")?;
    match token {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// One routed outbound item, ready to be framed as an SSE event by whichever
/// handler owns the receiving end.
#[derive(Debug, Clone)]
pub struct RoutedMessage {
    pub stream_id: String,
    pub event_id: String,
    pub payload: String,
}

type StreamSender = mpsc::UnboundedSender<RoutedMessage>;

#[derive(Default)]
struct SessionStreams {
    per_request: HashMap<String, StreamSender>,
    standalone: Option<StreamSender>,
}

/// Per-session routing table plus the shared replay log.
#[derive(Clone)]
pub struct StreamRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, SessionStreams>>>,
    events: EventStore,
    dropped_notifications: Arc<AtomicU64>,
}

impl StreamRegistry {
    pub fn new(events: EventStore) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            events,
            dropped_notifications: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    /// Count of server-initiated notifications that had no live stream to
    /// ride on (Open Question 3): no matching per-request stream and no
    /// attached standalone stream, most commonly a stateless service with a
    /// handler that tries to emit progress or another out-of-band
    /// notification.
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications.load(Ordering::Relaxed)
    }

    /// Register a per-request SSE stream, keyed by the request's own id
    /// rendered as a string. Returns the receiving half the handler streams
    /// from.
    pub async fn register_request_stream(
        &self,
        session: &SessionId,
        stream_id: &str,
    ) -> mpsc::UnboundedReceiver<RoutedMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.sessions.write().await;
        guard
            .entry(session.clone())
            .or_default()
            .per_request
            .insert(stream_id.to_string(), tx);
        rx
    }

    pub async fn deregister_request_stream(&self, session: &SessionId, stream_id: &str) {
        if let Some(streams) = self.sessions.write().await.get_mut(session) {
            streams.per_request.remove(stream_id);
        }
    }

    /// Register the standalone GET stream. Callers are expected to have
    /// already enforced the at-most-one-standalone-stream rule via
    /// [`crate::session::SessionStore::attach_standalone`].
    pub async fn register_standalone(&self, session: &SessionId) -> mpsc::UnboundedReceiver<RoutedMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.sessions.write().await;
        guard.entry(session.clone()).or_default().standalone = Some(tx);
        rx
    }

    pub async fn deregister_standalone(&self, session: &SessionId) {
        if let Some(streams) = self.sessions.write().await.get_mut(session) {
            streams.standalone = None;
        }
    }

    pub async fn drop_session(&self, session: &SessionId) {
        self.sessions.write().await.remove(session);
        self.events.drop_session(session).await;
    }

    /// Route one outbound frame from the engine. Responses go to the
    /// per-request stream matching their id, if still open; everything else
    /// (server-initiated requests and notifications) goes to the standalone
    /// stream if attached. Either way, the message is archived first so a
    /// reconnecting client can replay it via `Last-Event-ID`.
    pub async fn route_outbound(&self, session: &SessionId, bytes: Bytes) {
        let Ok(classified) = mcp_protocol::classify(&bytes) else {
            return;
        };
        let payload = String::from_utf8_lossy(&bytes).into_owned();

        let stream_id = match &classified {
            ClassifiedMessage::Response(response) => response.request_id().map(|id| id.to_string()),
            ClassifiedMessage::Notification(notification) if notification.method == NOTIFICATION_PROGRESS => {
                progress_token_as_stream_id(notification.params.as_ref())
            }
            _ => None,
        };

        let guard = self.sessions.read().await;
        let streams = guard.get(session);

        if let Some(stream_id) = &stream_id {
            if let Some(sender) = streams.and_then(|s| s.per_request.get(stream_id)) {
                let event_id = self.events.append_message(session, stream_id, payload.clone()).await;
                let _ = sender.send(RoutedMessage { stream_id: stream_id.clone(), event_id, payload });
                return;
            }
        }

        let standalone_id = "standalone";
        let event_id = self.events.append_message(session, standalone_id, payload.clone()).await;
        match streams.and_then(|s| s.standalone.as_ref()) {
            Some(sender) => {
                let _ = sender.send(RoutedMessage {
                    stream_id: standalone_id.to_string(),
                    event_id,
                    payload,
                });
            }
            None if matches!(classified, ClassifiedMessage::Notification(_)) => {
                self.dropped_notifications.fetch_add(1, Ordering::Relaxed);
                warn!(%session, "notification had no live stream to ride on, archived only");
            }
            None => {}
        }
    }
}

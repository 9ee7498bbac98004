//! SSE event framing (§4.7): `id: {eventId}\n[event: message\n][retry: {ms}\n]data: {payload}\n\n`.

use std::fmt::Write as _;

/// One framed Server-Sent Event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    /// Composite `"{stream_id}_{counter}"` id, matching what
    /// [`crate::event_store::EventStore`] stores and what `Last-Event-ID`
    /// round-trips back on reconnect.
    pub id: String,
    pub event: Option<&'static str>,
    pub retry_ms: Option<u64>,
    /// `None` for priming events: no `data:` line is emitted for those.
    pub data: Option<String>,
}

impl SseEvent {
    /// A priming event: establishes the stream and gives the client a
    /// `Last-Event-ID` anchor, but carries no payload.
    pub fn priming(id: impl Into<String>, retry_ms: Option<u64>) -> Self {
        Self { id: id.into(), event: None, retry_ms, data: None }
    }

    /// A `message` event carrying one JSON-RPC payload, serialized as a
    /// single line (SSE forbids embedded newlines in a `data:` field).
    pub fn message(id: impl Into<String>, payload: &str) -> Self {
        Self {
            id: id.into(),
            event: Some("message"),
            retry_ms: None,
            data: Some(payload.replace('\n', "")),
        }
    }

    /// Render the wire form of this event.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "id: {}", self.id);
        if let Some(event) = self.event {
            let _ = writeln!(out, "event: {event}");
        }
        if let Some(retry) = self.retry_ms {
            let _ = writeln!(out, "retry: {retry}");
        }
        if let Some(data) = &self.data {
            let _ = writeln!(out, "data: {data}");
        }
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priming_event_has_no_data_line() {
        let rendered = SseEvent::priming("standalone_0", None).render();
        assert!(rendered.starts_with("id: standalone_0\n"));
        assert!(!rendered.contains("data:"));
        assert!(rendered.ends_with("\n\n"));
    }

    #[test]
    fn message_event_strips_embedded_newlines() {
        let rendered = SseEvent::message("s1_3", "{\"a\":1}\nextra").render();
        assert!(rendered.contains("event: message\n"));
        assert!(rendered.contains("data: {\"a\":1}extra\n"));
    }
}

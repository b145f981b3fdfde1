//! Server-sent-event framing for the merged possibility stream.
//!
//! The orchestrator's [`EventStream`] is transport-agnostic; an HTTP
//! handler that wants to forward it to a browser frames each event as
//! `data: <json>\n\n`.

use crate::types::events::StreamEvent;
use crate::{BoxStream, EventStream, Result};
use bytes::Bytes;
use futures::StreamExt;

/// Encode one event as an SSE data frame.
pub fn encode_event(event: &StreamEvent) -> Result<Bytes> {
    let json = serde_json::to_string(event)?;
    Ok(Bytes::from(format!("data: {}\n\n", json)))
}

/// Frame an entire event stream for an SSE response body.
pub fn encode_stream(events: EventStream) -> BoxStream<'static, Bytes> {
    Box::pin(events.map(|event| encode_event(&event)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_frame_shape() {
        let frame = encode_event(&StreamEvent::Done).unwrap();
        assert_eq!(&frame[..], b"data: {\"type\":\"done\"}\n\n");
    }

    #[test]
    fn test_token_frame_is_single_line() {
        let frame = encode_event(&StreamEvent::Token {
            id: "p1".to_string(),
            token: "Hello".to_string(),
        })
        .unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("data: {"));
        assert!(text.ends_with("}\n\n"));
        // JSON must stay on one line for SSE framing.
        assert_eq!(text.matches('\n').count(), 2);
    }

    #[tokio::test]
    async fn test_encode_stream() {
        let events: EventStream = Box::pin(stream::iter(vec![
            StreamEvent::Token {
                id: "p1".to_string(),
                token: "hi".to_string(),
            },
            StreamEvent::Done,
        ]));
        let frames: Vec<_> = encode_stream(events).collect().await;
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.is_ok()));
    }
}

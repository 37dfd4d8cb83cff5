//! Server-sent-events plumbing shared by the HTTP providers.

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::provider::StreamChunk;

/// One meaningful SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Payload of a `data: ` line.
    Data(String),
    /// The `data: [DONE]` terminator.
    Done,
}

/// Splits a byte stream into SSE lines.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode intact.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(data.to_string()))
    }
}

/// Pump an SSE response body into `tx`.
///
/// `on_event` turns each decoded JSON payload into chunks; `is_final` tells
/// whether a payload carries the backend's end-of-response marker. The stream
/// ends with `Done` only after `[DONE]` or a final payload was seen. A body
/// that stops short of that, a read failure and an undecodable payload all
/// end it with `Error`. Forwarding stops after the first `Error` chunk and
/// when the receiver has gone away.
pub(crate) async fn relay<F, T>(
    provider: &str,
    resp: reqwest::Response,
    tx: mpsc::Sender<StreamChunk>,
    on_event: F,
    is_final: T,
) where
    F: FnMut(&serde_json::Value) -> Vec<StreamChunk>,
    T: Fn(&serde_json::Value) -> bool,
{
    let mut stream = resp.bytes_stream();
    let mut lines = SseLineBuffer::new();
    let mut state = RelayState {
        provider,
        on_event,
        is_final,
        fragments: 0,
        finished: false,
    };

    while let Some(next) = stream.next().await {
        let bytes = match next {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(provider, fragments = state.fragments, error = %e, "stream read failed");
                let _ = tx.send(StreamChunk::Error(format!("stream read error: {e}"))).await;
                return;
            }
        };
        for event in lines.push(&bytes) {
            if !state.forward(event, &tx).await {
                return;
            }
        }
    }
    if let Some(event) = lines.finish()
        && !state.forward(event, &tx).await
    {
        return;
    }

    if state.finished {
        debug!(provider, fragments = state.fragments, "stream complete");
        let _ = tx.send(StreamChunk::Done).await;
    } else {
        warn!(provider, fragments = state.fragments, "stream ended before completion");
        let _ = tx
            .send(StreamChunk::Error("stream ended before completion".into()))
            .await;
    }
}

struct RelayState<'a, F, T> {
    provider: &'a str,
    on_event: F,
    is_final: T,
    fragments: usize,
    finished: bool,
}

impl<F, T> RelayState<'_, F, T>
where
    F: FnMut(&serde_json::Value) -> Vec<StreamChunk>,
    T: Fn(&serde_json::Value) -> bool,
{
    /// Returns false once nothing more should be sent.
    async fn forward(&mut self, event: SseEvent, tx: &mpsc::Sender<StreamChunk>) -> bool {
        let provider = self.provider;
        let data = match event {
            SseEvent::Done => {
                debug!(provider, fragments = self.fragments, "stream complete");
                let _ = tx.send(StreamChunk::Done).await;
                return false;
            }
            SseEvent::Data(data) => data,
        };
        let value: serde_json::Value = match serde_json::from_str(&data) {
            Ok(v) => v,
            Err(e) => {
                warn!(provider, fragments = self.fragments, error = %e, "undecodable stream event");
                let _ = tx
                    .send(StreamChunk::Error(format!("undecodable stream event: {e}")))
                    .await;
                return false;
            }
        };
        if (self.is_final)(&value) {
            self.finished = true;
        }
        for chunk in (self.on_event)(&value) {
            let failed = matches!(chunk, StreamChunk::Error(_));
            if matches!(chunk, StreamChunk::Text(_)) {
                self.fragments += 1;
            }
            if tx.send(chunk).await.is_err() || failed {
                return false;
            }
        }
        true
    }
}

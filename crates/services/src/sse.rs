//! The single long-lived event stream.
//!
//! One subscription per user: frames arrive as `data: {"channel", "data"}`
//! lines, get decoded into typed [`StreamEvent`]s at the parse boundary, and
//! are forwarded over a channel. A malformed or unknown frame drops that one
//! frame; the stream keeps running. A dropped connection reconnects with
//! exponential backoff and replays the `Last-Event-ID` header.

use std::time::Duration;

use futures_util::StreamExt;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use mentor_core::model::{StreamEvent, UserId, channel};

use crate::config::BackendConfig;
use crate::error::{DecodeError, SseError};

//
// ─── DECODE BOUNDARY ───────────────────────────────────────────────────────────
//

/// Decode one frame payload into a typed event.
///
/// Unknown channels are `Ok(None)`; they are expected as the backend grows
/// and must not disturb the stream.
///
/// # Errors
///
/// Returns `DecodeError` when the envelope or the channel payload does not
/// parse; the caller drops the frame and continues.
pub fn decode_frame(raw: &str) -> Result<Option<StreamEvent>, DecodeError> {
    #[derive(Deserialize)]
    struct Envelope {
        channel: String,
        #[serde(default)]
        data: serde_json::Value,
    }

    let envelope: Envelope = serde_json::from_str(raw)?;
    let data = envelope.data;

    let event = match envelope.channel.as_str() {
        channel::LESSON_DELIVERED => StreamEvent::LessonDelivered(serde_json::from_value(data)?),
        channel::FIELD_INTRODUCTION_GENERATED => {
            StreamEvent::IntroductionGenerated(serde_json::from_value(data)?)
        }
        channel::FIELD_ROADMAP_GENERATED => {
            StreamEvent::RoadmapGenerated(serde_json::from_value(data)?)
        }
        channel::DOUBT_ANSWER => StreamEvent::DoubtAnswer(serde_json::from_value(data)?),
        channel::SESSION_START => StreamEvent::SessionStart(serde_json::from_value(data)?),
        channel::SESSION_STOP => StreamEvent::SessionStop(serde_json::from_value(data)?),
        channel::INTRO_SESSION_STOP => {
            StreamEvent::IntroSessionStop(serde_json::from_value(data)?)
        }
        channel::SESSION_STATUS_UPDATE => {
            StreamEvent::SessionStatusUpdate(serde_json::from_value(data)?)
        }
        _ => return Ok(None),
    };

    Ok(Some(event))
}

//
// ─── FRAMING ───────────────────────────────────────────────────────────────────
//

/// Incremental `text/event-stream` line framing.
///
/// Splitting happens on raw newline bytes, so multi-byte characters broken
/// across network chunks reassemble correctly.
#[derive(Debug, Default)]
struct FrameBuffer {
    buf: Vec<u8>,
    data_lines: Vec<String>,
    last_event_id: Option<String>,
}

impl FrameBuffer {
    /// Feed raw bytes; returns the complete `data` payloads that finished.
    fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data_lines.is_empty() {
                    frames.push(self.data_lines.join("\n"));
                    self.data_lines.clear();
                }
            } else if let Some(rest) = line.strip_prefix("data:") {
                self.data_lines
                    .push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            } else if let Some(rest) = line.strip_prefix("id:") {
                self.last_event_id = Some(rest.trim().to_string());
            }
            // Comment lines (":keep-alive") and unused fields fall through.
        }
        frames
    }
}

//
// ─── RECONNECT POLICY ──────────────────────────────────────────────────────────
//

/// Exponential backoff with jitter for stream reconnects.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given reconnect attempt (0-based), with up to 25%
    /// random jitter on top.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(10));
        let base = self.initial.saturating_mul(factor).min(self.max);
        let jitter_cap = u64::try_from(base.as_millis() / 4).unwrap_or(u64::MAX);
        let jitter = rand::rng().random_range(0..=jitter_cap);
        base + Duration::from_millis(jitter)
    }
}

//
// ─── SUBSCRIPTION ──────────────────────────────────────────────────────────────
//

/// Opens event-stream subscriptions against the backend.
#[derive(Clone)]
pub struct SseClient {
    client: Client,
    config: BackendConfig,
    retry: RetryPolicy,
}

impl SseClient {
    #[must_use]
    pub fn new(config: BackendConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Open the single stream for a user. The returned subscription owns the
    /// reader task; dropping it closes the stream.
    #[must_use]
    pub fn subscribe(&self, user_id: UserId) -> SseSubscription {
        let (tx, rx) = mpsc::channel(64);
        let client = self.client.clone();
        let url = self.config.endpoint("sse");
        let retry = self.retry;

        let handle = tokio::spawn(async move {
            run_stream(client, url, user_id, retry, tx).await;
        });

        SseSubscription { events: rx, handle }
    }
}

/// A live stream subscription: decoded events plus the reader task handle.
pub struct SseSubscription {
    events: mpsc::Receiver<StreamEvent>,
    handle: JoinHandle<()>,
}

impl SseSubscription {
    /// Next decoded event; `None` once the subscription is closed.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Stop reading and tear the connection down.
    pub fn close(&mut self) {
        self.handle.abort();
        self.events.close();
    }
}

impl Drop for SseSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

enum ReaderExit {
    StreamEnded,
    SubscriberGone,
}

async fn run_stream(
    client: Client,
    url: String,
    user_id: UserId,
    retry: RetryPolicy,
    tx: mpsc::Sender<StreamEvent>,
) {
    let mut attempt: u32 = 0;
    let mut last_event_id: Option<String> = None;

    loop {
        match stream_once(&client, &url, &user_id, &mut last_event_id, &mut attempt, &tx).await {
            Ok(ReaderExit::SubscriberGone) => return,
            Ok(ReaderExit::StreamEnded) => debug!("event stream ended"),
            Err(err) => warn!(error = %err, "event stream error"),
        }

        if tx.is_closed() {
            return;
        }
        let delay = retry.delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::time::sleep(delay).await;
    }
}

async fn stream_once(
    client: &Client,
    url: &str,
    user_id: &UserId,
    last_event_id: &mut Option<String>,
    attempt: &mut u32,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<ReaderExit, SseError> {
    let mut request = client
        .get(url)
        .query(&[("user_id", user_id.as_str())])
        .header(reqwest::header::ACCEPT, "text/event-stream");
    if let Some(id) = last_event_id.as_deref() {
        request = request.header("Last-Event-ID", id);
    }

    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(SseError::HttpStatus(response.status()));
    }

    let mut frames = FrameBuffer::default();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for raw in frames.push_chunk(&chunk) {
            match decode_frame(&raw) {
                Ok(Some(event)) => {
                    // A delivered event proves the connection is healthy.
                    *attempt = 0;
                    if tx.send(event).await.is_err() {
                        return Ok(ReaderExit::SubscriberGone);
                    }
                }
                Ok(None) => debug!("ignoring frame on unknown channel"),
                Err(err) => warn!(error = %err, "dropping malformed frame"),
            }
        }
        if let Some(id) = frames.last_event_id.take() {
            *last_event_id = Some(id);
        }
    }

    Ok(ReaderExit::StreamEnded)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use mentor_core::model::SessionStatus;

    #[test]
    fn decodes_known_channel() {
        let raw = r#"{"channel":"session_status_update","data":{"user_id":"u1","field":"AI","session_status":"green","intro_active":false,"lesson_active":true}}"#;
        let event = decode_frame(raw).unwrap().unwrap();
        match event {
            StreamEvent::SessionStatusUpdate(p) => {
                assert_eq!(p.session_status, SessionStatus::Green);
                assert!(p.lesson_active);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_channel_is_ignored_without_error() {
        let raw = r#"{"channel":"totally_new_feature","data":{"whatever":1}}"#;
        assert!(decode_frame(raw).unwrap().is_none());
    }

    #[test]
    fn malformed_payload_is_an_error_not_a_panic() {
        // valid envelope, wrong payload shape for the channel
        let raw = r#"{"channel":"LESSON_DELIVERED","data":{"user_id":"u1"}}"#;
        assert!(decode_frame(raw).is_err());

        assert!(decode_frame("not json at all").is_err());
    }

    #[test]
    fn frame_buffer_reassembles_split_lines() {
        let mut frames = FrameBuffer::default();
        assert!(frames.push_chunk(b"data: {\"a\"").is_empty());
        assert!(frames.push_chunk(b":1}\n").is_empty());
        let done = frames.push_chunk(b"\n");
        assert_eq!(done, vec![r#"{"a":1}"#.to_string()]);
    }

    #[test]
    fn frame_buffer_handles_crlf_comments_and_ids() {
        let mut frames = FrameBuffer::default();
        let done = frames.push_chunk(b":keep-alive\r\nid: 42\r\ndata: {}\r\n\r\n");
        assert_eq!(done, vec!["{}".to_string()]);
        assert_eq!(frames.last_event_id.as_deref(), Some("42"));
    }

    #[test]
    fn frame_buffer_joins_multi_line_data() {
        let mut frames = FrameBuffer::default();
        let done = frames.push_chunk(b"data: line1\ndata: line2\n\n");
        assert_eq!(done, vec!["line1\nline2".to_string()]);
    }

    #[test]
    fn retry_delay_grows_and_caps() {
        let policy = RetryPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(5),
        };
        let first = policy.delay(0);
        assert!(first >= Duration::from_millis(100));

        // Far beyond the cap: stays within max + 25% jitter.
        let late = policy.delay(30);
        assert!(late >= Duration::from_secs(5));
        assert!(late <= Duration::from_millis(6250));
    }
}

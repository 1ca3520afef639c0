//! Real-time push channel for a single board or match.
//!
//! Each entity owns one [`PushChannel`]. Opening it spawns a background task
//! that connects to the Autodarts websocket, subscribes to the entity's
//! `state` and `events` topics, and dispatches every inbound frame to the
//! callbacks registered in the entity's [`CallbackTable`].
//!
//! The channel never reconnects on its own. When the socket errors or the
//! server goes away it marks itself disconnected and dispatches a synthetic
//! `events` message (`"error"` or `"disconnected"`) so the owner can decide
//! how to recover.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

// ── Event names ──────────────────────────────────────────────────────

pub const TOPIC_STATE: &str = "state";
pub const TOPIC_EVENTS: &str = "events";

pub const EVENT_ERROR: &str = "error";
pub const EVENT_DISCONNECTED: &str = "disconnected";
pub const EVENT_DELETE: &str = "delete";
pub const EVENT_FINISH: &str = "finish";
pub const EVENT_MANUAL_RESET: &str = "Manual reset";

// ── PushMessage ──────────────────────────────────────────────────────

/// One frame received on (or synthesized by) a push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub channel: String,
    /// `"<entity id>.<suffix>"`, e.g. `"B1.state"`.
    pub topic: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PushMessage {
    /// Synthetic lifecycle message on the `events` topic.
    pub fn lifecycle(channel: &str, entity_id: &str, event: &str, detail: Option<String>) -> Self {
        Self {
            channel: channel.to_owned(),
            topic: format!("{entity_id}.{TOPIC_EVENTS}"),
            data: json!({ "event": event, "message": detail }),
        }
    }

    /// Topic with the entity id stripped.
    pub fn topic_suffix(&self) -> &str {
        self.topic
            .rsplit_once('.')
            .map_or(self.topic.as_str(), |(_, suffix)| suffix)
    }

    /// Named event carried in `data.event`, if any.
    pub fn event(&self) -> Option<&str> {
        self.data.get("event").and_then(serde_json::Value::as_str)
    }
}

// ── Callbacks ────────────────────────────────────────────────────────

/// Push callback. Invoked on the channel's reader task; must not block.
pub type Callback = Arc<dyn Fn(&PushMessage) + Send + Sync>;

/// Which messages a callback receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventFilter {
    /// Every message on the `state` topic.
    State,
    /// Messages on `topic` whose `data.event` equals `event`.
    Event { event: String, topic: String },
}

impl EventFilter {
    pub fn event(event: impl Into<String>, topic: impl Into<String>) -> Self {
        Self::Event {
            event: event.into(),
            topic: topic.into(),
        }
    }

    pub fn matches(&self, message: &PushMessage) -> bool {
        match self {
            Self::State => message.topic_suffix() == TOPIC_STATE,
            Self::Event { event, topic } => {
                message.topic_suffix() == topic && message.event() == Some(event.as_str())
            }
        }
    }
}

struct Registration {
    id: u64,
    filter: EventFilter,
    callback: Callback,
}

#[derive(Default)]
struct TableInner {
    next_id: AtomicU64,
    entries: Mutex<Vec<Registration>>,
}

/// Callbacks registered against one entity.
///
/// Cheaply cloneable; clones share the same table.
#[derive(Clone, Default)]
pub struct CallbackTable {
    inner: Arc<TableInner>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for messages matching `filter`.
    pub fn register(&self, filter: EventFilter, callback: Callback) -> CallbackHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration {
                id,
                filter: filter.clone(),
                callback,
            });
        CallbackHandle {
            table: Arc::downgrade(&self.inner),
            id,
            filter,
        }
    }

    /// Invoke every callback whose filter matches. Returns how many ran.
    pub fn dispatch(&self, message: &PushMessage) -> usize {
        // Snapshot under the lock, call outside it: callbacks may unsubscribe.
        let matched: Vec<Callback> = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.filter.matches(message))
            .map(|r| Arc::clone(&r.callback))
            .collect();

        for callback in &matched {
            callback(message);
        }
        matched.len()
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live registrations with the given filter.
    pub fn count(&self, filter: &EventFilter) -> usize {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| &r.filter == filter)
            .count()
    }
}

/// Unsubscribe capability for one registration.
#[derive(Debug)]
pub struct CallbackHandle {
    table: Weak<TableInner>,
    id: u64,
    filter: EventFilter,
}

impl CallbackHandle {
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Remove the registration. Returns `false` if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(table) = self.table.upgrade() else {
            return false;
        };
        let mut entries = table.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|r| r.id != self.id);
        entries.len() != before
    }
}

// ── PushChannel ──────────────────────────────────────────────────────

struct Link {
    cancel: CancellationToken,
    alive: Arc<AtomicBool>,
}

/// Websocket subscription for one entity.
pub struct PushChannel {
    channel: &'static str,
    entity_id: String,
    callbacks: CallbackTable,
    link: Mutex<Option<Link>>,
}

impl PushChannel {
    pub fn new(channel: &'static str, entity_id: impl Into<String>) -> Self {
        Self {
            channel,
            entity_id: entity_id.into(),
            callbacks: CallbackTable::new(),
            link: Mutex::new(None),
        }
    }

    pub fn callbacks(&self) -> &CallbackTable {
        &self.callbacks
    }

    /// Whether the channel is open and has not dropped since.
    pub fn is_connected(&self) -> bool {
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|link| link.alive.load(Ordering::Acquire))
    }

    /// Spawn the reader task. Any previous link is cancelled first.
    ///
    /// Returns once the task is spawned; handshake failures arrive as an
    /// `"error"` event.
    pub fn open(&self, url: Url, bearer: String) {
        let link = Link {
            cancel: CancellationToken::new(),
            alive: Arc::new(AtomicBool::new(true)),
        };

        let task = ReaderTask {
            url,
            bearer,
            channel: self.channel,
            entity_id: self.entity_id.clone(),
            callbacks: self.callbacks.clone(),
            cancel: link.cancel.clone(),
            alive: Arc::clone(&link.alive),
        };

        let previous = self
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(link);
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        tokio::spawn(task.run());
    }

    /// Cancel the reader task. Safe to call when already closed.
    pub fn close(&self) {
        let previous = self.link.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(link) = previous {
            link.alive.store(false, Ordering::Release);
            link.cancel.cancel();
        }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Reader task ──────────────────────────────────────────────────────

struct ReaderTask {
    url: Url,
    bearer: String,
    channel: &'static str,
    entity_id: String,
    callbacks: CallbackTable,
    cancel: CancellationToken,
    alive: Arc<AtomicBool>,
}

impl ReaderTask {
    async fn run(self) {
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return,
            result = self.connect_and_read() => result,
        };

        if self.cancel.is_cancelled() {
            return;
        }
        self.alive.store(false, Ordering::Release);

        let (event, detail) = match result {
            Ok(()) => (EVENT_DISCONNECTED, None),
            Err(e) => {
                tracing::warn!(error = %e, id = %self.entity_id, "push channel failed");
                (EVENT_ERROR, Some(e.to_string()))
            }
        };
        let message = PushMessage::lifecycle(self.channel, &self.entity_id, event, detail);
        self.callbacks.dispatch(&message);
    }

    /// Connect, subscribe, and read until the socket drops.
    ///
    /// `Ok` means the server closed the stream; `Err` is a transport fault.
    async fn connect_and_read(&self) -> Result<(), Error> {
        tracing::debug!(url = %self.url, id = %self.entity_id, "connecting push channel");

        let uri: tungstenite::http::Uri = self
            .url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;
        let request = ClientRequestBuilder::new(uri)
            .with_header("Authorization", format!("Bearer {}", self.bearer));

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        for topic in [TOPIC_STATE, TOPIC_EVENTS] {
            let frame = subscribe_frame(self.channel, &self.entity_id, topic);
            write
                .send(tungstenite::Message::Text(frame.into()))
                .await
                .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
        }
        tracing::info!(id = %self.entity_id, channel = self.channel, "push channel subscribed");

        loop {
            match read.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    self.parse_and_dispatch(&text);
                }
                Some(Ok(tungstenite::Message::Ping(_))) => {
                    // tungstenite handles pong replies automatically
                    tracing::trace!("push channel ping");
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    return match frame {
                        Some(cf) if cf.code != tungstenite::protocol::frame::coding::CloseCode::Normal => {
                            Err(Error::WebSocketClosed {
                                code: cf.code.into(),
                                reason: cf.reason.to_string(),
                            })
                        }
                        _ => Ok(()),
                    };
                }
                Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                None => return Ok(()),
                Some(Ok(_)) => {
                    // Binary, Pong, Frame -- ignore
                }
            }
        }
    }

    fn parse_and_dispatch(&self, text: &str) {
        let message: PushMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring undecodable push frame");
                return;
            }
        };

        // Frames for other entities can share a socket; only ours matter.
        if !message.topic.starts_with(&format!("{}.", self.entity_id)) {
            return;
        }

        let delivered = self.callbacks.dispatch(&message);
        tracing::trace!(topic = %message.topic, delivered, "push frame dispatched");
    }
}

fn subscribe_frame(channel: &str, entity_id: &str, topic: &str) -> String {
    json!({
        "channel": channel,
        "type": "subscribe",
        "topic": format!("{entity_id}.{topic}"),
    })
    .to_string()
}

// ── Tests ────────────────────────────────────────────────────────────

// ── Coordinators ──
//
// A `Coordinator<E>` owns at most one remote entity ("item"), mirrors its
// latest value into a watch channel, and manages the item's push channel:
// which callbacks are registered, when the transport is open, and how an
// unexpected closure is recovered. `BoardCoordinator` and
// `MatchCoordinator` wrap it with their entity-specific refresh rules.
//
// All methods run on the owning pairing task. Nothing here is shared
// across tasks except the watch senders and the dispatch channel.

mod board;
mod matches;
mod wait;

use std::sync::Arc;
use std::time::Duration;

use dartsync_api::push::{EVENT_DISCONNECTED, EVENT_ERROR, TOPIC_EVENTS};
use dartsync_api::{Callback, CallbackHandle, EventFilter, PushMessage, RemoteEntity};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::config::ReconnectPolicy;
use crate::dispatch::{DispatchSender, Forward, Role, Router, Signal};
use crate::error::CoreError;
use crate::registry::HandleRegistry;
use crate::stream::{Latest, StateStream};

pub use board::BoardCoordinator;
pub use matches::MatchCoordinator;
pub use wait::{WaitGuard, WaitToken};

// ── LinkState ────────────────────────────────────────────────────────

/// Push-channel state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum LinkState {
    /// No item, or its channel is closed.
    Offline,
    Online,
    /// A reopen is pending, after a backoff delay if one applies.
    Reconnecting { attempt: u32 },
    /// Retries exhausted; stays here until the item is reloaded.
    Failed,
}

// ── Coordinator ──────────────────────────────────────────────────────

pub struct Coordinator<E: RemoteEntity> {
    role: Role,
    item: Option<E>,
    /// Bumped whenever `item` is replaced or cleared.
    generation: u64,
    latest: watch::Sender<Latest<E::State>>,
    link: watch::Sender<LinkState>,
    registry: HandleRegistry,
    dispatch: DispatchSender,
    reconnect: ReconnectPolicy,
    attempts: u32,
}

impl<E: RemoteEntity> Coordinator<E> {
    pub fn new(role: Role, dispatch: DispatchSender, reconnect: ReconnectPolicy) -> Self {
        let (latest, _) = watch::channel(Latest::default());
        let (link, _) = watch::channel(LinkState::Offline);
        Self {
            role,
            item: None,
            generation: 0,
            latest,
            link,
            registry: HandleRegistry::new(),
            dispatch,
            reconnect,
            attempts: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn item(&self) -> Option<&E> {
        self.item.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Item present and its transport reports connected.
    pub fn is_connected(&self) -> bool {
        self.item.as_ref().is_some_and(RemoteEntity::is_connected)
    }

    /// Live registrations owned by this coordinator.
    pub fn registrations(&self) -> usize {
        self.registry.len()
    }

    pub fn latest(&self) -> Latest<E::State> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> StateStream<E::State> {
        StateStream::new(self.latest.subscribe())
    }

    pub fn link(&self) -> watch::Receiver<LinkState> {
        self.link.subscribe()
    }

    /// Router for callbacks bound to the current item.
    pub fn router(&self) -> Router {
        Router::new(self.dispatch.clone(), self.role, self.generation)
    }

    /// Register a callback on the current item outside any connect scope.
    pub fn register(&mut self, filter: EventFilter, callback: Callback) -> bool {
        let Some(item) = self.item.as_ref() else {
            return false;
        };
        self.registry.push(item.subscribe(filter, callback));
        true
    }

    /// Subscribe on the current item without taking ownership of the handle.
    pub fn subscribe_item(&self, filter: EventFilter, callback: Callback) -> Option<CallbackHandle> {
        self.item.as_ref().map(|item| item.subscribe(filter, callback))
    }

    // ── Broadcasting ─────────────────────────────────────────────────

    /// Broadcast `value` unless it is the very snapshot already held.
    pub fn publish(&self, value: Option<Arc<E::State>>) -> bool {
        self.latest.send_if_modified(|latest| {
            let same = match (&latest.value, &value) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            };
            if same {
                return false;
            }
            latest.revision += 1;
            latest.value = value;
            true
        })
    }

    /// Broadcast the item's current snapshot (or absence).
    pub fn publish_item(&self) -> bool {
        self.publish(self.item.as_ref().map(RemoteEntity::state))
    }

    /// Broadcast even if the snapshot is unchanged.
    pub fn rebroadcast(&self) {
        let value = self.item.as_ref().map(RemoteEntity::state);
        self.latest.send_modify(|latest| {
            latest.revision += 1;
            latest.value = value;
        });
    }

    fn set_link(&self, state: LinkState) {
        self.link.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    // ── Transport lifecycle ──────────────────────────────────────────

    /// Register the state, error, and disconnected callbacks plus `extra`,
    /// then open the transport. No-op without an item or when connected.
    ///
    /// Returns whether the transport was opened. Registrations are rolled
    /// back if opening fails.
    pub async fn connect_with(&mut self, extra: &[(EventFilter, Forward)]) -> Result<bool, CoreError> {
        let Some(item) = self.item.as_ref() else {
            return Ok(false);
        };
        if item.is_connected() {
            return Ok(false);
        }
        // Callbacks left from a transport that dropped on its own.
        let stale = self.registry.close();
        if stale > 0 {
            debug!(role = %self.role, id = item.id(), stale, "stale registrations released");
        }

        let router = Router::new(self.dispatch.clone(), self.role, self.generation);
        let mut scope = self.registry.scope();
        scope.stage(item.subscribe(EventFilter::State, router.callback(Forward::StateUpdated)));
        for event in [EVENT_ERROR, EVENT_DISCONNECTED] {
            scope.stage(item.subscribe(
                EventFilter::event(event, TOPIC_EVENTS),
                router.callback(Forward::UnexpectedClose),
            ));
        }
        for (filter, forward) in extra {
            scope.stage(item.subscribe(filter.clone(), router.callback(*forward)));
        }

        item.open().await?;
        scope.commit();

        info!(role = %self.role, id = item.id(), "push channel opened");
        self.attempts = 0;
        self.set_link(LinkState::Online);
        self.publish_item();
        Ok(true)
    }

    pub async fn connect(&mut self) -> Result<bool, CoreError> {
        self.connect_with(&[]).await
    }

    /// Drop every registration, then close the transport. No-op when
    /// neither a transport nor a registration is left.
    pub fn disconnect(&mut self) -> bool {
        if !self.is_connected() && self.registry.is_empty() {
            return false;
        }
        self.teardown();
        true
    }

    /// Unconditional drain-and-close, used before an item is replaced.
    fn teardown(&mut self) {
        let released = self.registry.close();
        if let Some(item) = self.item.as_ref() {
            item.close();
            debug!(role = %self.role, id = item.id(), released, "push channel closed");
        }
        self.set_link(LinkState::Offline);
    }

    // ── Item lifecycle ───────────────────────────────────────────────

    /// Replace the held item. The previous item is fully torn down first.
    /// With `forward_state`, the new snapshot is broadcast at once.
    pub fn load(&mut self, item: E, forward_state: bool) {
        if self.item.is_some() {
            self.teardown();
        }
        debug!(role = %self.role, id = item.id(), "item loaded");
        self.item = Some(item);
        self.generation += 1;
        self.attempts = 0;
        if forward_state {
            self.publish_item();
        }
    }

    /// Tear down and clear the item, then broadcast absence (once).
    pub fn unload(&mut self) {
        self.teardown();
        if let Some(item) = self.item.take() {
            debug!(role = %self.role, id = item.id(), "item unloaded");
            self.generation += 1;
        }
        self.publish(None);
    }

    /// Re-fetch the held item in place and broadcast it. On failure the
    /// previous value stays published.
    pub async fn refresh(&mut self) -> Result<bool, CoreError> {
        let Some(item) = self.item.as_mut() else {
            return Ok(false);
        };
        let state = item.reload().await?;
        self.publish(Some(state));
        Ok(true)
    }

    // ── Push handlers ────────────────────────────────────────────────

    pub fn on_state_updated(&mut self, message: &PushMessage) {
        let Some(item) = self.item.as_mut() else {
            return;
        };
        match item.apply_push(message) {
            Ok(state) => {
                self.attempts = 0;
                self.publish(Some(state));
            }
            Err(e) => {
                warn!(role = %self.role, error = %e, "undecodable state update");
            }
        }
    }

    /// Reopen the existing item after a transport error or disconnect.
    pub async fn on_unexpected_close(&mut self, message: &PushMessage) {
        let Some(item) = self.item.as_ref() else {
            return;
        };
        warn!(
            role = %self.role,
            id = item.id(),
            event = message.event().unwrap_or("unknown"),
            "unexpected push channel closure"
        );

        match self.next_attempt() {
            Some(delay) if delay.is_zero() => self.reopen().await,
            Some(delay) => self.schedule_reopen(delay),
            None => {}
        }
    }

    /// A delayed or retried reopen came due.
    pub async fn on_reopen(&mut self) {
        if self.is_connected() {
            trace!(role = %self.role, "already reconnected");
            return;
        }
        self.reopen().await;
    }

    /// Count one more closure. Returns the delay before the next reopen,
    /// or `None` once the policy gives up.
    fn next_attempt(&mut self) -> Option<Duration> {
        if !self.reconnect.allows(self.attempts) {
            warn!(role = %self.role, attempts = self.attempts, "reconnect limit reached");
            self.set_link(LinkState::Failed);
            return None;
        }

        let delay = self.reconnect.delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        self.set_link(LinkState::Reconnecting {
            attempt: self.attempts,
        });
        Some(delay)
    }

    /// Queue a `Reopen` for the current item, after `delay` if non-zero.
    fn schedule_reopen(&self, delay: Duration) {
        let router = self.router();
        if delay.is_zero() {
            router.send(Signal::Reopen);
            return;
        }

        info!(
            role = %self.role,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt = self.attempts,
            "waiting before reconnect"
        );
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            router.send(Signal::Reopen);
        });
    }

    /// Open the held item's transport again. Registrations survive a
    /// dropped transport, so only the socket is reopened. A failed open
    /// counts as another closure.
    async fn reopen(&mut self) {
        let Some(item) = self.item.as_ref() else {
            return;
        };
        match item.open().await {
            Ok(()) => {
                debug!(role = %self.role, id = item.id(), "push channel reopened");
                self.set_link(LinkState::Online);
            }
            Err(e) => {
                warn!(role = %self.role, error = %e, attempt = self.attempts, "reopen failed");
                if let Some(delay) = self.next_attempt() {
                    self.schedule_reopen(delay);
                }
            }
        }
    }
}

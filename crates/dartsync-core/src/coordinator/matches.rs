// ── Match coordinator ──
//
// Keeps the held match in step with the board's `match_id`:
//
//   no id on the board      -> nothing held, one reset subscription armed
//   id equals held match    -> reload in place
//   id differs / none held  -> fetch, replace, drop the reset subscription
//
// The board's "Manual reset" event stands in for polling: a reset is
// emitted before a new leg, so it is the cue to re-check the board. A
// match's "finish" or "delete" event clears the match and re-arms.

use std::sync::Arc;
use std::time::Duration;

use dartsync_api::push::{EVENT_DELETE, EVENT_FINISH, EVENT_MANUAL_RESET, TOPIC_EVENTS};
use dartsync_api::{DartsApi, EventFilter, MatchState, PushMessage, RemoteEntity};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{BoardCoordinator, Coordinator, LinkState, WaitGuard, WaitToken};
use crate::config::ReconnectPolicy;
use crate::dispatch::{DispatchSender, Forward, Role};
use crate::error::CoreError;
use crate::registry::HandleRegistry;
use crate::stream::{Latest, StateStream};

pub struct MatchCoordinator<A: DartsApi> {
    api: A,
    base: Coordinator<A::Match>,
    wait_token: WaitToken,
    /// The reset subscription on the board, at most one.
    wait_handles: HandleRegistry,
    /// Board generation the reset subscription was armed on.
    wait_generation: Option<u64>,
    handler_timeout: Duration,
}

impl<A: DartsApi> MatchCoordinator<A> {
    pub fn new(
        api: A,
        dispatch: DispatchSender,
        reconnect: ReconnectPolicy,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            api,
            base: Coordinator::new(Role::Match, dispatch, reconnect),
            wait_token: WaitToken::new(),
            wait_handles: HandleRegistry::new(),
            wait_generation: None,
            handler_timeout,
        }
    }

    pub fn base(&self) -> &Coordinator<A::Match> {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut Coordinator<A::Match> {
        &mut self.base
    }

    pub fn item(&self) -> Option<&A::Match> {
        self.base.item()
    }

    pub fn generation(&self) -> u64 {
        self.base.generation()
    }

    pub fn latest(&self) -> Latest<MatchState> {
        self.base.latest()
    }

    pub fn subscribe(&self) -> StateStream<MatchState> {
        self.base.subscribe()
    }

    pub fn link(&self) -> watch::Receiver<LinkState> {
        self.base.link()
    }

    pub fn wait_token(&self) -> &WaitToken {
        &self.wait_token
    }

    /// Whether a reset subscription is armed.
    pub fn is_waiting(&self) -> bool {
        !self.wait_handles.is_empty()
    }

    fn held_id(&self) -> Option<&str> {
        self.base.item().map(RemoteEntity::id)
    }

    // ── Waiting ──────────────────────────────────────────────────────

    /// Arm the reset subscription on the board. Idempotent while the
    /// board item is unchanged; re-arms on a replaced board.
    pub fn arm_wait(&mut self, board: &BoardCoordinator<A>) -> bool {
        if self.is_waiting() && self.wait_generation == Some(board.generation()) {
            return false;
        }
        self.wait_handles.close();
        self.wait_generation = None;

        let callback = board.router().reset_callback(self.wait_token.clone());
        let filter = EventFilter::event(EVENT_MANUAL_RESET, TOPIC_EVENTS);
        let Some(handle) = board.subscribe_item(filter, callback) else {
            debug!("no board held, cannot wait for a match");
            return false;
        };

        self.wait_handles.push(handle);
        self.wait_generation = Some(board.generation());
        info!(board = board.board_id(), "waiting for next match");
        true
    }

    /// Drop the reset subscription (a match took over).
    fn disarm_wait(&mut self) {
        if self.wait_handles.close() > 0 {
            debug!("reset subscription released");
        }
        self.wait_generation = None;
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// Reconcile the held match with the board's current `match_id`.
    pub async fn refresh(&mut self, board: &BoardCoordinator<A>) -> Result<(), CoreError> {
        let Some(match_id) = board.match_id() else {
            if self.base.item().is_some() {
                info!("board has no match, releasing held match");
                self.base.unload();
            }
            self.arm_wait(board);
            return Ok(());
        };

        if self.held_id() == Some(match_id.as_str()) {
            if !self.base.is_connected() {
                debug!(id = %match_id, "held match has no push channel, reconnecting");
                self.connect().await?;
            }
            self.base.refresh().await?;
            return Ok(());
        }

        let fetched = self.api.match_by_id(&match_id).await?;
        info!(id = %match_id, "match found");
        self.load(fetched, false).await;
        self.base.publish_item();
        self.disarm_wait();
        Ok(())
    }

    /// Replace the held match and wire up its end-of-match events.
    pub async fn load(&mut self, item: A::Match, forward_state: bool) {
        self.base.load(item, forward_state);
        if let Err(e) = self.connect().await {
            warn!(error = %e, "could not open match push channel");
        }
    }

    /// Open the held match's channel with its end-of-match events.
    async fn connect(&mut self) -> Result<bool, CoreError> {
        let ended = [
            (EventFilter::event(EVENT_DELETE, TOPIC_EVENTS), Forward::MatchEnded),
            (EventFilter::event(EVENT_FINISH, TOPIC_EVENTS), Forward::MatchEnded),
        ];
        self.base.connect_with(&ended).await
    }

    // ── Push handlers ────────────────────────────────────────────────

    /// Handle a "finish" or "delete" event on the held match.
    pub async fn on_match_ended(&mut self, board: &mut BoardCoordinator<A>, message: &PushMessage) {
        info!(
            id = self.held_id().unwrap_or_default(),
            event = message.event().unwrap_or("unknown"),
            "match ended"
        );

        match tokio::time::timeout(self.handler_timeout, board.refresh()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "board refresh after match end failed"),
            Err(_) => warn!(
                timeout_secs = self.handler_timeout.as_secs(),
                "board refresh after match end timed out"
            ),
        }

        self.base.unload();
        self.arm_wait(board);
    }

    /// Handle a board reset while waiting. `guard` holds the wait token
    /// and releases it when this returns, however the check went.
    pub async fn on_board_reset(&mut self, board: &mut BoardCoordinator<A>, guard: WaitGuard) {
        let _guard = guard;

        let limit = self.handler_timeout;
        match tokio::time::timeout(limit, self.check_for_match(board)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "match check after board reset failed"),
            Err(_) => warn!(
                timeout_secs = limit.as_secs(),
                "match check after board reset timed out"
            ),
        }
    }

    async fn check_for_match(&mut self, board: &mut BoardCoordinator<A>) -> Result<(), CoreError> {
        board.refresh().await?;

        let Some(match_id) = board.match_id() else {
            debug!("board reset without a match");
            return Ok(());
        };
        if self.held_id() == Some(match_id.as_str()) {
            debug!(id = %match_id, "board reset, match unchanged");
            return Ok(());
        }

        let fetched = self.api.match_by_id(&match_id).await?;
        info!(id = %match_id, "match started");
        self.load(fetched, true).await;
        self.disarm_wait();
        Ok(())
    }

    /// Snapshot of the held match.
    pub fn state(&self) -> Option<Arc<MatchState>> {
        self.base.item().map(RemoteEntity::state)
    }

    /// Release everything: the reset subscription and the held match.
    pub fn unload(&mut self) {
        self.disarm_wait();
        self.base.unload();
    }
}

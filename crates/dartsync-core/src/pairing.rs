// ── Pairing ──
//
// A pairing is one board coordinator and the match coordinator that
// follows it, driven by a single task. The task owns both coordinators
// and applies, one at a time: push dispatches, commands, and periodic
// polls. `PairingHandle` is the cloneable outside view: value streams,
// link states, command submission, and shutdown.

use std::sync::Arc;
use std::time::Duration;

use dartsync_api::{BoardControl, BoardState, DartsApi, MatchControl, MatchState};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::command::{Command, CommandEnvelope};
use crate::config::{PairingConfig, PairingId, SyncConfig};
use crate::coordinator::{BoardCoordinator, LinkState, MatchCoordinator};
use crate::dispatch::{Dispatch, DispatchReceiver, Role, Signal};
use crate::error::CoreError;
use crate::stream::{Latest, StateStream};
use crate::view::MatchPhase;

const COMMAND_CHANNEL_SIZE: usize = 64;

pub struct Pairing<A: DartsApi> {
    id: PairingId,
    sync: SyncConfig,
    board: BoardCoordinator<A>,
    matches: MatchCoordinator<A>,
    dispatch_rx: DispatchReceiver,
}

impl<A: DartsApi> Pairing<A> {
    /// Build both coordinators and bring them to their first state: the
    /// board fetched and connected, the match loaded or a wait armed.
    /// Any failure here is returned to the caller.
    pub async fn setup(api: A, config: PairingConfig) -> Result<Self, CoreError> {
        let PairingConfig { id, board_id, sync } = config;
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();

        let mut board = BoardCoordinator::new(
            api.clone(),
            board_id,
            dispatch_tx.clone(),
            sync.reconnect.clone(),
        );
        let mut matches = MatchCoordinator::new(
            api,
            dispatch_tx,
            sync.reconnect.clone(),
            sync.handler_timeout,
        );

        board.update().await?;
        matches.refresh(&board).await?;
        info!(pairing = %id, board = board.board_id(), "pairing ready");

        Ok(Self {
            id,
            sync,
            board,
            matches,
            dispatch_rx,
        })
    }

    /// Set up, then hand the pairing to its own task.
    pub async fn start(api: A, config: PairingConfig) -> Result<PairingHandle, CoreError> {
        Ok(Self::setup(api, config).await?.spawn())
    }

    pub fn id(&self) -> &PairingId {
        &self.id
    }

    pub fn board(&self) -> &BoardCoordinator<A> {
        &self.board
    }

    pub fn matches(&self) -> &MatchCoordinator<A> {
        &self.matches
    }

    pub fn spawn(self) -> PairingHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        let id = self.id.clone();
        let board_id = self.board.board_id().to_owned();
        let board = self.board.subscribe();
        let matches = self.matches.subscribe();
        let board_link = self.board.link();
        let match_link = self.matches.link();
        let task = tokio::spawn(self.run(command_rx, cancel.clone()));

        PairingHandle {
            inner: Arc::new(PairingInner {
                id,
                board_id,
                board,
                matches,
                board_link,
                match_link,
                command_tx,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    // ── Task loop ────────────────────────────────────────────────────

    async fn run(mut self, mut commands: mpsc::Receiver<CommandEnvelope>, cancel: CancellationToken) {
        let mut board_poll = self.sync.board_poll_interval.map(poll_interval);
        let mut match_poll = self.sync.match_poll_interval.map(poll_interval);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(dispatch) = self.dispatch_rx.recv() => self.apply(dispatch).await,
                envelope = commands.recv() => {
                    let Some(envelope) = envelope else { break };
                    let result = self.execute(envelope.command).await;
                    let _ = envelope.response_tx.send(result);
                }
                () = tick(&mut board_poll) => self.poll_board().await,
                () = tick(&mut match_poll) => self.poll_match().await,
            }
        }

        self.teardown();
    }

    /// Apply one push dispatch. Dispatches from a replaced item are dropped.
    pub async fn apply(&mut self, dispatch: Dispatch) {
        let current = match dispatch.origin {
            Role::Board => self.board.generation(),
            Role::Match => self.matches.generation(),
        };
        if dispatch.generation != current {
            trace!(
                pairing = %self.id,
                origin = %dispatch.origin,
                stale = dispatch.generation,
                current,
                "stale dispatch dropped"
            );
            return;
        }

        match (dispatch.origin, dispatch.signal) {
            (Role::Board, Signal::StateUpdated(message)) => {
                self.board.base_mut().on_state_updated(&message);
            }
            (Role::Match, Signal::StateUpdated(message)) => {
                self.matches.base_mut().on_state_updated(&message);
            }
            (Role::Board, Signal::UnexpectedClose(message)) => {
                self.board.base_mut().on_unexpected_close(&message).await;
            }
            (Role::Match, Signal::UnexpectedClose(message)) => {
                self.matches.base_mut().on_unexpected_close(&message).await;
            }
            (Role::Board, Signal::Reopen) => self.board.base_mut().on_reopen().await,
            (Role::Match, Signal::Reopen) => self.matches.base_mut().on_reopen().await,
            (_, Signal::MatchEnded(message)) => {
                self.matches.on_match_ended(&mut self.board, &message).await;
            }
            (_, Signal::BoardReset(guard)) => {
                self.matches.on_board_reset(&mut self.board, guard).await;
            }
        }
    }

    /// Apply every dispatch already queued. Returns how many there were.
    pub async fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(dispatch) = self.dispatch_rx.try_recv() {
            self.apply(dispatch).await;
            applied += 1;
        }
        applied
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn execute(&mut self, command: Command) -> Result<(), CoreError> {
        debug!(pairing = %self.id, ?command, "executing command");

        match command {
            Command::StartBoard => self.held_board()?.start().await?,
            Command::StopBoard => self.held_board()?.stop().await?,
            Command::ResetBoard => self.held_board()?.reset().await?,
            Command::ConnectBoard => {
                self.held_board()?;
                self.board.connect().await?;
                self.matches.refresh(&self.board).await?;
            }
            Command::DisconnectBoard => {
                self.held_board()?;
                self.board.disconnect();
                self.matches.refresh(&self.board).await?;
            }
            Command::RefreshBoard => {
                self.held_board()?;
                self.board.refresh().await?;
            }
            Command::RefreshMatch => self.matches.refresh(&self.board).await?,
            Command::NextPlayer => self.held_match()?.next_player().await?,
            Command::NextLeg => self.held_match()?.next_leg().await?,
            Command::Undo => self.held_match()?.undo().await?,
            Command::Throw { segment, index } => {
                self.held_match()?.throw(&segment, index).await?;
            }
            Command::AbortMatch => self.held_match()?.abort().await?,
            Command::FinishMatch => self.held_match()?.finish().await?,
        }
        Ok(())
    }

    fn held_board(&self) -> Result<&A::Board, CoreError> {
        self.board.item().ok_or(CoreError::NotLoaded { kind: "board" })
    }

    fn held_match(&self) -> Result<&A::Match, CoreError> {
        self.matches.item().ok_or(CoreError::NotLoaded { kind: "match" })
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Replace the board with a fresh fetch. The reset subscription lived
    /// on the old board item, so the match side re-arms on the new one.
    async fn poll_board(&mut self) {
        if let Err(e) = self.board.update().await {
            warn!(pairing = %self.id, error = %e, "periodic board update failed");
            return;
        }
        if let Err(e) = self.matches.refresh(&self.board).await {
            warn!(pairing = %self.id, error = %e, "match refresh after board update failed");
        }
    }

    async fn poll_match(&mut self) {
        if let Err(e) = self.matches.refresh(&self.board).await {
            warn!(pairing = %self.id, error = %e, "periodic match refresh failed");
        }
    }

    /// Disconnect and drop the match, then the board.
    fn teardown(&mut self) {
        self.matches.unload();
        self.board.unload();
        info!(pairing = %self.id, "pairing stopped");
    }
}

fn poll_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Next tick of an optional interval; never completes when disabled.
async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ── PairingHandle ────────────────────────────────────────────────────

struct PairingInner {
    id: PairingId,
    board_id: String,
    board: StateStream<BoardState>,
    matches: StateStream<MatchState>,
    board_link: watch::Receiver<LinkState>,
    match_link: watch::Receiver<LinkState>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable view of a running pairing.
#[derive(Clone)]
pub struct PairingHandle {
    inner: Arc<PairingInner>,
}

impl PairingHandle {
    pub fn id(&self) -> &PairingId {
        &self.inner.id
    }

    pub fn board_id(&self) -> &str {
        &self.inner.board_id
    }

    // ── Values ───────────────────────────────────────────────────────

    pub fn board(&self) -> StateStream<BoardState> {
        self.inner.board.resubscribe()
    }

    pub fn matches(&self) -> StateStream<MatchState> {
        self.inner.matches.resubscribe()
    }

    pub fn board_state(&self) -> Latest<BoardState> {
        self.inner.board.latest()
    }

    pub fn match_state(&self) -> Latest<MatchState> {
        self.inner.matches.latest()
    }

    pub fn board_link(&self) -> watch::Receiver<LinkState> {
        self.inner.board_link.clone()
    }

    pub fn match_link(&self) -> watch::Receiver<LinkState> {
        self.inner.match_link.clone()
    }

    /// Derived phase of the board's current match.
    pub fn phase(&self) -> Option<MatchPhase> {
        let board = self.board_state();
        let current = self.match_state();
        let online = *self.inner.board_link.borrow() == LinkState::Online;
        MatchPhase::derive(board.value.as_deref(), online, current.value.as_deref())
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Run a command on the pairing task and wait for its result.
    pub async fn execute(&self, command: Command) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::PairingStopped);
        }

        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::PairingStopped)?;

        rx.await.map_err(|_| CoreError::PairingStopped)?
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Stop the task and wait until both coordinators are torn down.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let task = self.inner.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(pairing = %self.inner.id, error = %e, "pairing task panicked");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dartsync_api::push::{EVENT_DISCONNECTED, EVENT_FINISH, EVENT_MANUAL_RESET, TOPIC_EVENTS};
    use dartsync_api::{EntityKind, EventFilter};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::{FakeApi, board, game};

    fn config() -> PairingConfig {
        let mut config = PairingConfig::for_board("B1");
        config.sync.match_poll_interval = None;
        config
    }

    fn world(match_id: Option<&str>) -> FakeApi {
        let api = FakeApi::new();
        api.put_board(board("B1", match_id));
        api.put_match(game("M1", false));
        api.put_match(game("M2", false));
        api
    }

    fn reset_subscriptions(api: &FakeApi) -> usize {
        api.live_callbacks_for(
            EntityKind::Board,
            "B1",
            &EventFilter::event(EVENT_MANUAL_RESET, TOPIC_EVENTS),
        )
    }

    #[tokio::test]
    async fn cold_start_waits_with_one_subscription() {
        let api = world(None);
        let pairing = Pairing::setup(api.clone(), config()).await.unwrap();

        assert!(pairing.board().is_connected());
        assert!(pairing.matches().is_waiting());
        assert_eq!(reset_subscriptions(&api), 1);
        // Three board callbacks plus the reset subscription.
        assert_eq!(api.live_callbacks(EntityKind::Board, "B1"), 4);
    }

    #[tokio::test]
    async fn setup_fails_for_unknown_board() {
        let api = FakeApi::new();
        let result = Pairing::setup(api, config()).await;
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn unexpected_close_reopens_same_item_once() {
        let api = world(Some("M1"));
        let mut pairing = Pairing::setup(api.clone(), config()).await.unwrap();

        api.drop_link(EntityKind::Board, "B1");
        assert_eq!(pairing.drain().await, 1);

        assert_eq!(api.count("open board B1"), 2);
        assert_eq!(api.count("fetch board B1"), 1);
        assert_eq!(api.count("reload board B1"), 0);
        assert!(pairing.board().is_connected());
        assert_eq!(*pairing.board().link().borrow(), LinkState::Online);
    }

    #[tokio::test]
    async fn match_appears_after_reset_event() {
        let api = world(None);
        let mut pairing = Pairing::setup(api.clone(), config()).await.unwrap();

        api.put_board(board("B1", Some("M1")));
        api.emit_event(EntityKind::Board, "B1", EVENT_MANUAL_RESET);
        // Suppressed: the first cycle still holds the token.
        api.emit_event(EntityKind::Board, "B1", EVENT_MANUAL_RESET);
        assert_eq!(pairing.drain().await, 1);

        assert_eq!(pairing.matches().latest().value.unwrap().id, "M1");
        assert_eq!(reset_subscriptions(&api), 0);
        assert_eq!(api.count("fetch match M1"), 1);
        assert!(!pairing.matches().wait_token().is_held());
    }

    #[tokio::test]
    async fn match_end_returns_to_waiting() {
        let api = world(Some("M1"));
        let mut pairing = Pairing::setup(api.clone(), config()).await.unwrap();
        assert_eq!(reset_subscriptions(&api), 0);

        api.put_board(board("B1", None));
        api.emit_event(EntityKind::Match, "M1", EVENT_FINISH);
        pairing.drain().await;

        assert!(pairing.matches().latest().is_absent());
        assert!(pairing.matches().is_waiting());
        assert_eq!(reset_subscriptions(&api), 1);
        assert_eq!(api.live_callbacks(EntityKind::Match, "M1"), 0);
    }

    #[tokio::test]
    async fn stale_dispatch_is_dropped() {
        let api = world(Some("M1"));
        let mut pairing = Pairing::setup(api.clone(), config()).await.unwrap();

        // Queued from M1, then M1 is replaced before the queue is drained.
        api.emit_state(
            EntityKind::Match,
            "M1",
            serde_json::json!({ "id": "M1", "finished": true }),
        );
        api.put_board(board("B1", Some("M2")));
        pairing.execute(Command::RefreshBoard).await.unwrap();
        pairing.execute(Command::RefreshMatch).await.unwrap();
        pairing.drain().await;

        let latest = pairing.matches().latest().value.unwrap();
        assert_eq!(latest.id, "M2");
        assert!(!latest.finished);
    }

    #[tokio::test]
    async fn match_commands_need_a_match() {
        let api = world(None);
        let mut pairing = Pairing::setup(api.clone(), config()).await.unwrap();

        let err = pairing.execute(Command::NextPlayer).await.unwrap_err();
        assert!(matches!(err, CoreError::NotLoaded { kind: "match" }));

        pairing.execute(Command::ResetBoard).await.unwrap();
        assert_eq!(api.count("reset B1"), 1);
    }

    #[tokio::test]
    async fn rejected_command_is_reported() {
        let api = world(Some("M1"));
        let mut pairing = Pairing::setup(api.clone(), config()).await.unwrap();
        api.fail_commands(true);

        let err = pairing.execute(Command::Undo).await.unwrap_err();
        assert!(matches!(err, CoreError::Rejected { status: 409, .. }));
    }

    #[tokio::test]
    async fn board_toggle_keeps_the_wait_armed() {
        let api = world(None);
        let mut pairing = Pairing::setup(api.clone(), config()).await.unwrap();

        pairing.execute(Command::DisconnectBoard).await.unwrap();
        assert!(!pairing.board().is_connected());
        assert_eq!(api.live_callbacks(EntityKind::Board, "B1"), 1);

        pairing.execute(Command::ConnectBoard).await.unwrap();
        assert!(pairing.board().is_connected());
        assert_eq!(api.live_callbacks(EntityKind::Board, "B1"), 4);
        assert_eq!(reset_subscriptions(&api), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn board_poll_rearms_on_replaced_board() {
        let api = world(None);
        let mut config = config();
        config.sync.board_poll_interval = Some(Duration::from_secs(10));
        let pairing = Pairing::setup(api.clone(), config).await.unwrap();
        let handle = pairing.spawn();

        tokio::time::sleep(Duration::from_secs(11)).await;
        // Let the task finish the tick.
        handle.execute(Command::RefreshMatch).await.unwrap();

        assert_eq!(api.count("fetch board B1"), 2);
        assert_eq!(reset_subscriptions(&api), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn handle_follows_a_match_from_start_to_shutdown() {
        let api = world(None);
        let handle = Pairing::start(api.clone(), config()).await.unwrap();
        assert_eq!(handle.phase(), Some(MatchPhase::Waiting));

        let mut matches = handle.matches();
        api.put_board(board("B1", Some("M1")));
        api.emit_event(EntityKind::Board, "B1", EVENT_MANUAL_RESET);
        let latest = matches.changed().await.unwrap();
        assert_eq!(latest.value.unwrap().id, "M1");
        assert_eq!(handle.phase(), Some(MatchPhase::Started));

        handle.execute(Command::NextPlayer).await.unwrap();
        assert_eq!(api.count("next_player M1"), 1);

        handle.shutdown().await;
        assert!(handle.is_stopped());
        assert_eq!(api.count("close match M1"), 1);
        assert_eq!(api.count("close board B1"), 1);
        assert!(handle.match_state().is_absent());
        assert!(matches!(
            handle.execute(Command::Undo).await,
            Err(CoreError::PairingStopped)
        ));
    }

    #[tokio::test]
    async fn disconnect_event_on_match_reopens_it() {
        let api = world(Some("M1"));
        let mut pairing = Pairing::setup(api.clone(), config()).await.unwrap();

        api.emit_event(EntityKind::Match, "M1", EVENT_DISCONNECTED);
        pairing.drain().await;

        assert_eq!(api.count("open match M1"), 2);
        assert_eq!(api.count("fetch match M1"), 1);
    }

    /// Apply exactly one queued dispatch. A persistent failure under the
    /// immediate policy keeps the queue non-empty, so `drain` would spin.
    async fn step(pairing: &mut Pairing<FakeApi>) {
        let dispatch = pairing.dispatch_rx.try_recv().unwrap();
        pairing.apply(dispatch).await;
    }

    #[tokio::test]
    async fn board_keeps_retrying_while_reopen_fails() {
        let api = world(Some("M1"));
        let mut pairing = Pairing::setup(api.clone(), config()).await.unwrap();

        api.fail_open(true);
        api.drop_link(EntityKind::Board, "B1");
        step(&mut pairing).await;
        step(&mut pairing).await;
        assert!(!pairing.board().is_connected());
        assert_eq!(
            *pairing.board().link().borrow(),
            LinkState::Reconnecting { attempt: 3 }
        );

        api.fail_open(false);
        assert_eq!(pairing.drain().await, 1);
        assert!(pairing.board().is_connected());
        assert_eq!(*pairing.board().link().borrow(), LinkState::Online);
        assert_eq!(api.count("open board B1"), 4);
        assert_eq!(api.count("fetch board B1"), 1);
    }

    #[tokio::test]
    async fn board_toggle_after_failed_reopen_registers_once() {
        let api = world(None);
        let mut pairing = Pairing::setup(api.clone(), config()).await.unwrap();

        api.fail_open(true);
        api.drop_link(EntityKind::Board, "B1");
        step(&mut pairing).await;
        api.fail_open(false);

        pairing.execute(Command::DisconnectBoard).await.unwrap();
        assert_eq!(api.live_callbacks(EntityKind::Board, "B1"), 1);

        pairing.execute(Command::ConnectBoard).await.unwrap();
        // The retry still queued finds the board already open.
        pairing.drain().await;
        assert_eq!(api.live_callbacks(EntityKind::Board, "B1"), 4);
        assert_eq!(pairing.board().base().registrations(), 3);
        assert_eq!(reset_subscriptions(&api), 1);
        assert_eq!(api.count("open board B1"), 3);
    }

    #[tokio::test]
    async fn match_refresh_reconnects_after_failed_open() {
        let api = world(None);
        let mut pairing = Pairing::setup(api.clone(), config()).await.unwrap();

        api.fail_open(true);
        api.put_board(board("B1", Some("M1")));
        api.emit_event(EntityKind::Board, "B1", EVENT_MANUAL_RESET);
        pairing.drain().await;
        assert_eq!(pairing.matches().latest().value.unwrap().id, "M1");
        assert!(!pairing.matches().base().is_connected());
        assert_eq!(api.live_callbacks(EntityKind::Match, "M1"), 0);

        api.fail_open(false);
        pairing.execute(Command::RefreshMatch).await.unwrap();
        assert!(pairing.matches().base().is_connected());
        assert_eq!(api.live_callbacks(EntityKind::Match, "M1"), 5);
        assert_eq!(api.count("open match M1"), 2);

        // Another refresh leaves the open channel alone.
        pairing.execute(Command::RefreshMatch).await.unwrap();
        assert_eq!(api.count("open match M1"), 2);

        // Its end-of-match events are live again.
        api.put_board(board("B1", None));
        api.emit_event(EntityKind::Match, "M1", EVENT_FINISH);
        pairing.drain().await;
        assert!(pairing.matches().latest().is_absent());
        assert!(pairing.matches().is_waiting());
    }
}

// ── In-memory DartsApi for coordinator tests ──
//
// Boards and matches live in a shared `World`. Every fetch, reload, open,
// close, and command is appended to a log so tests can count calls. Each
// entity handed out keeps its callback table registered with the world,
// so tests can emit push frames at it after the fact.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dartsync_api::push::TOPIC_STATE;
use dartsync_api::{
    BoardControl, BoardState, BoardStatus, Callback, CallbackHandle, CallbackTable, DartsApi,
    EntityKind, Error, EventFilter, MatchControl, MatchState, PushMessage, RemoteEntity, Segment,
};
use serde::de::DeserializeOwned;

pub fn board(id: &str, match_id: Option<&str>) -> BoardState {
    BoardState {
        id: id.to_owned(),
        name: format!("Board {id}"),
        version: None,
        match_id: match_id.map(str::to_owned),
        state: BoardStatus {
            connected: true,
            ..BoardStatus::default()
        },
    }
}

pub fn game(id: &str, finished: bool) -> MatchState {
    MatchState {
        id: id.to_owned(),
        variant: "X01".into(),
        finished,
        ..MatchState::default()
    }
}

struct Link {
    kind: EntityKind,
    id: String,
    table: CallbackTable,
    connected: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
}

#[derive(Default)]
pub struct World {
    boards: HashMap<String, BoardState>,
    matches: HashMap<String, MatchState>,
    log: Vec<String>,
    links: Vec<Link>,
    fail_open: bool,
    fail_reloads: bool,
    stall_reloads: bool,
    fail_commands: bool,
}

#[derive(Clone, Default)]
pub struct FakeApi {
    world: Arc<Mutex<World>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap()
    }

    fn record(&self, entry: String) {
        self.world().log.push(entry);
    }

    pub fn put_board(&self, state: BoardState) {
        self.world().boards.insert(state.id.clone(), state);
    }

    pub fn put_match(&self, state: MatchState) {
        self.world().matches.insert(state.id.clone(), state);
    }

    pub fn fail_open(&self, on: bool) {
        self.world().fail_open = on;
    }

    pub fn fail_reloads(&self, on: bool) {
        self.world().fail_reloads = on;
    }

    pub fn stall_reloads(&self, on: bool) {
        self.world().stall_reloads = on;
    }

    pub fn fail_commands(&self, on: bool) {
        self.world().fail_commands = on;
    }

    /// Log entries starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.world()
            .log
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    /// Registrations on entities that still exist.
    pub fn live_callbacks(&self, kind: EntityKind, id: &str) -> usize {
        self.live_tables(kind, id).iter().map(CallbackTable::len).sum()
    }

    pub fn live_callbacks_for(&self, kind: EntityKind, id: &str, filter: &EventFilter) -> usize {
        self.live_tables(kind, id)
            .iter()
            .map(|table| table.count(filter))
            .sum()
    }

    fn live_tables(&self, kind: EntityKind, id: &str) -> Vec<CallbackTable> {
        self.world()
            .links
            .iter()
            .filter(|l| l.kind == kind && l.id == id && l.alive.load(Ordering::SeqCst))
            .map(|l| l.table.clone())
            .collect()
    }

    /// Deliver `message` to every entity ever handed out for `id`,
    /// including replaced ones: late frames from old sockets do happen.
    fn deliver(&self, kind: EntityKind, id: &str, message: &PushMessage) {
        let tables: Vec<CallbackTable> = self
            .world()
            .links
            .iter()
            .filter(|l| l.kind == kind && l.id == id)
            .map(|l| l.table.clone())
            .collect();
        for table in tables {
            table.dispatch(message);
        }
    }

    pub fn emit_state(&self, kind: EntityKind, id: &str, data: serde_json::Value) {
        let message = PushMessage {
            channel: kind.channel().to_owned(),
            topic: format!("{id}.{TOPIC_STATE}"),
            data,
        };
        self.deliver(kind, id, &message);
    }

    pub fn emit_event(&self, kind: EntityKind, id: &str, event: &str) {
        let message = PushMessage::lifecycle(kind.channel(), id, event, None);
        self.deliver(kind, id, &message);
    }

    /// Drop the transport of every live entity for `id`, as a server
    /// disconnect would, and emit the matching lifecycle event.
    pub fn drop_link(&self, kind: EntityKind, id: &str) {
        for link in self.world().links.iter().filter(|l| l.kind == kind && l.id == id) {
            link.connected.store(false, Ordering::SeqCst);
        }
        self.emit_event(kind, id, dartsync_api::push::EVENT_DISCONNECTED);
    }

    fn entity<S: Snapshot>(&self, id: &str) -> Result<FakeEntity<S>, Error> {
        let mut world = self.world();
        let state = S::lookup(&world, id).ok_or_else(|| Error::NotFound {
            kind: S::KIND.into(),
            id: id.to_owned(),
        })?;
        world.log.push(format!("fetch {} {id}", S::KIND));

        let entity = FakeEntity {
            api: self.clone(),
            id: id.to_owned(),
            state: Arc::new(state),
            table: CallbackTable::new(),
            connected: Arc::new(AtomicBool::new(false)),
            alive: Arc::new(AtomicBool::new(true)),
        };
        world.links.push(Link {
            kind: S::KIND,
            id: id.to_owned(),
            table: entity.table.clone(),
            connected: Arc::clone(&entity.connected),
            alive: Arc::clone(&entity.alive),
        });
        Ok(entity)
    }
}

// ── Entities ─────────────────────────────────────────────────────────

pub trait Snapshot: Clone + Debug + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;
    fn lookup(world: &World, id: &str) -> Option<Self>;
}

impl Snapshot for BoardState {
    const KIND: EntityKind = EntityKind::Board;

    fn lookup(world: &World, id: &str) -> Option<Self> {
        world.boards.get(id).cloned()
    }
}

impl Snapshot for MatchState {
    const KIND: EntityKind = EntityKind::Match;

    fn lookup(world: &World, id: &str) -> Option<Self> {
        world.matches.get(id).cloned()
    }
}

pub struct FakeEntity<S> {
    api: FakeApi,
    id: String,
    state: Arc<S>,
    table: CallbackTable,
    connected: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
}

pub type FakeBoard = FakeEntity<BoardState>;

impl<S> Drop for FakeEntity<S> {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl<S: Snapshot> FakeEntity<S> {
    async fn command(&self, entry: String) -> Result<(), Error> {
        let failing = {
            let mut world = self.api.world();
            world.log.push(entry);
            world.fail_commands
        };
        if failing {
            return Err(Error::Api {
                status: 409,
                message: "rejected".into(),
            });
        }
        Ok(())
    }
}

impl<S: Snapshot> RemoteEntity for FakeEntity<S> {
    type State = S;

    const KIND: EntityKind = S::KIND;

    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> Arc<S> {
        Arc::clone(&self.state)
    }

    fn apply_push(&mut self, message: &PushMessage) -> Result<Arc<S>, Error> {
        let next: S = serde_json::from_value(message.data.clone()).map_err(|e| {
            Error::Deserialization {
                message: e.to_string(),
                body: message.data.to_string(),
            }
        })?;
        self.state = Arc::new(next);
        Ok(self.state())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn open(&self) -> Result<(), Error> {
        let failing = {
            let mut world = self.api.world();
            world.log.push(format!("open {} {}", S::KIND, self.id));
            world.fail_open
        };
        if failing {
            return Err(Error::WebSocketConnect("refused".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.api.record(format!("close {} {}", S::KIND, self.id));
        self.connected.store(false, Ordering::SeqCst);
    }

    fn subscribe(&self, filter: EventFilter, callback: Callback) -> CallbackHandle {
        self.table.register(filter, callback)
    }

    async fn reload(&mut self) -> Result<Arc<S>, Error> {
        let (state, failing, stalled) = {
            let mut world = self.api.world();
            world.log.push(format!("reload {} {}", S::KIND, self.id));
            (S::lookup(&world, &self.id), world.fail_reloads, world.stall_reloads)
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        if failing {
            return Err(Error::Api {
                status: 500,
                message: "unavailable".into(),
            });
        }
        let state = state.ok_or_else(|| Error::NotFound {
            kind: S::KIND.into(),
            id: self.id.clone(),
        })?;
        self.state = Arc::new(state);
        Ok(self.state())
    }
}

impl BoardControl for FakeEntity<BoardState> {
    async fn start(&self) -> Result<(), Error> {
        self.command(format!("start {}", self.id)).await
    }

    async fn stop(&self) -> Result<(), Error> {
        self.command(format!("stop {}", self.id)).await
    }

    async fn reset(&self) -> Result<(), Error> {
        self.command(format!("reset {}", self.id)).await
    }
}

impl MatchControl for FakeEntity<MatchState> {
    async fn next_player(&self) -> Result<(), Error> {
        self.command(format!("next_player {}", self.id)).await
    }

    async fn next_leg(&self) -> Result<(), Error> {
        self.command(format!("next_leg {}", self.id)).await
    }

    async fn undo(&self) -> Result<(), Error> {
        self.command(format!("undo {}", self.id)).await
    }

    async fn throw(&self, segment: &Segment, index: Option<usize>) -> Result<(), Error> {
        self.command(format!("throw {} {segment} {index:?}", self.id)).await
    }

    async fn abort(&self) -> Result<(), Error> {
        self.command(format!("abort {}", self.id)).await
    }

    async fn finish(&self) -> Result<(), Error> {
        self.command(format!("finish {}", self.id)).await
    }
}

impl DartsApi for FakeApi {
    type Board = FakeEntity<BoardState>;
    type Match = FakeEntity<MatchState>;

    async fn board(&self, id: &str) -> Result<Self::Board, Error> {
        self.entity(id)
    }

    async fn match_by_id(&self, id: &str) -> Result<Self::Match, Error> {
        self.entity(id)
    }
}

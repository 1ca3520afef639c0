// Remote entity abstraction.
//
// `RemoteEntity` is the contract the sync engine consumes: a snapshot that
// can be reloaded, decoded from push frames, and a push channel that can be
// opened, closed, and subscribed to. `DartsApi` is the factory that fetches
// entities by id. `Session` implements both through `RemoteBoard` and
// `RemoteMatch`.

use std::future::Future;
use std::sync::Arc;

use strum::{Display, IntoStaticStr};

use crate::auth::Session;
use crate::client::BoardCommand;
use crate::error::Error;
use crate::models::{BoardState, BoardStatus, MatchState, Segment};
use crate::push::{Callback, CallbackHandle, EventFilter, PushChannel, PushMessage};

/// Which kind of remote object an entity mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
    Board,
    Match,
}

impl EntityKind {
    /// Push channel name for this kind.
    pub fn channel(self) -> &'static str {
        match self {
            Self::Board => "autodarts.boards",
            Self::Match => "autodarts.matches",
        }
    }
}

// ── Traits ───────────────────────────────────────────────────────────

/// One remote object with a snapshot and a push channel.
pub trait RemoteEntity: Send + Sync + 'static {
    type State: std::fmt::Debug + Send + Sync + 'static;

    const KIND: EntityKind;

    fn id(&self) -> &str;

    /// Last known snapshot.
    fn state(&self) -> Arc<Self::State>;

    /// Fold a `state` push frame into the snapshot and return the result.
    fn apply_push(&mut self, message: &PushMessage) -> Result<Arc<Self::State>, Error>;

    fn is_connected(&self) -> bool;

    /// Open the push channel. Returns once the reader is running.
    fn open(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Close the push channel. Idempotent.
    fn close(&self);

    fn subscribe(&self, filter: EventFilter, callback: Callback) -> CallbackHandle;

    /// Re-fetch the snapshot in place.
    fn reload(&mut self) -> impl Future<Output = Result<Arc<Self::State>, Error>> + Send;
}

/// Board commands, passed straight through to the cloud.
pub trait BoardControl {
    fn start(&self) -> impl Future<Output = Result<(), Error>> + Send;
    fn stop(&self) -> impl Future<Output = Result<(), Error>> + Send;
    fn reset(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Match commands, passed straight through to the cloud.
pub trait MatchControl {
    fn next_player(&self) -> impl Future<Output = Result<(), Error>> + Send;
    fn next_leg(&self) -> impl Future<Output = Result<(), Error>> + Send;
    fn undo(&self) -> impl Future<Output = Result<(), Error>> + Send;
    /// Submit the next dart, or revise dart `index` of the current turn.
    fn throw(
        &self,
        segment: &Segment,
        index: Option<usize>,
    ) -> impl Future<Output = Result<(), Error>> + Send;
    fn abort(&self) -> impl Future<Output = Result<(), Error>> + Send;
    fn finish(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Fetches entities by id.
pub trait DartsApi: Clone + Send + Sync + 'static {
    type Board: RemoteEntity<State = BoardState> + BoardControl;
    type Match: RemoteEntity<State = MatchState> + MatchControl;

    fn board(&self, id: &str) -> impl Future<Output = Result<Self::Board, Error>> + Send;
    fn match_by_id(&self, id: &str) -> impl Future<Output = Result<Self::Match, Error>> + Send;
}

// ── Session-backed entities ──────────────────────────────────────────

/// A board fetched through a [`Session`].
pub struct RemoteBoard {
    session: Session,
    id: String,
    state: Arc<BoardState>,
    push: PushChannel,
}

/// A match fetched through a [`Session`].
pub struct RemoteMatch {
    session: Session,
    id: String,
    state: Arc<MatchState>,
    push: PushChannel,
}

impl RemoteBoard {
    pub async fn fetch(session: &Session, id: &str) -> Result<Self, Error> {
        let state = session.fetch_board(id).await?;
        Ok(Self {
            session: session.clone(),
            id: id.to_owned(),
            state: Arc::new(state),
            push: PushChannel::new(EntityKind::Board.channel(), id),
        })
    }
}

impl RemoteMatch {
    pub async fn fetch(session: &Session, id: &str) -> Result<Self, Error> {
        let state = session.fetch_match(id).await?;
        Ok(Self {
            session: session.clone(),
            id: id.to_owned(),
            state: Arc::new(state),
            push: PushChannel::new(EntityKind::Match.channel(), id),
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(message: &PushMessage) -> Result<T, Error> {
    serde_json::from_value(message.data.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: message.data.to_string(),
    })
}

impl RemoteEntity for RemoteBoard {
    type State = BoardState;

    const KIND: EntityKind = EntityKind::Board;

    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> Arc<BoardState> {
        Arc::clone(&self.state)
    }

    /// Board frames carry either a full board or just its detection status.
    fn apply_push(&mut self, message: &PushMessage) -> Result<Arc<BoardState>, Error> {
        let next = if message.data.get("id").is_some() {
            decode::<BoardState>(message)?
        } else {
            BoardState {
                state: decode::<BoardStatus>(message)?,
                ..(*self.state).clone()
            }
        };
        self.state = Arc::new(next);
        Ok(self.state())
    }

    fn is_connected(&self) -> bool {
        self.push.is_connected()
    }

    async fn open(&self) -> Result<(), Error> {
        let bearer = self.session.bearer().await?;
        self.push.open(self.session.config().ws_url.clone(), bearer);
        Ok(())
    }

    fn close(&self) {
        self.push.close();
    }

    fn subscribe(&self, filter: EventFilter, callback: Callback) -> CallbackHandle {
        self.push.callbacks().register(filter, callback)
    }

    async fn reload(&mut self) -> Result<Arc<BoardState>, Error> {
        self.state = Arc::new(self.session.fetch_board(&self.id).await?);
        Ok(self.state())
    }
}

impl RemoteEntity for RemoteMatch {
    type State = MatchState;

    const KIND: EntityKind = EntityKind::Match;

    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> Arc<MatchState> {
        Arc::clone(&self.state)
    }

    fn apply_push(&mut self, message: &PushMessage) -> Result<Arc<MatchState>, Error> {
        self.state = Arc::new(decode::<MatchState>(message)?);
        Ok(self.state())
    }

    fn is_connected(&self) -> bool {
        self.push.is_connected()
    }

    async fn open(&self) -> Result<(), Error> {
        let bearer = self.session.bearer().await?;
        self.push.open(self.session.config().ws_url.clone(), bearer);
        Ok(())
    }

    fn close(&self) {
        self.push.close();
    }

    fn subscribe(&self, filter: EventFilter, callback: Callback) -> CallbackHandle {
        self.push.callbacks().register(filter, callback)
    }

    async fn reload(&mut self) -> Result<Arc<MatchState>, Error> {
        self.state = Arc::new(self.session.fetch_match(&self.id).await?);
        Ok(self.state())
    }
}

impl BoardControl for RemoteBoard {
    async fn start(&self) -> Result<(), Error> {
        self.session.board_command(&self.id, BoardCommand::Start).await
    }

    async fn stop(&self) -> Result<(), Error> {
        self.session.board_command(&self.id, BoardCommand::Stop).await
    }

    async fn reset(&self) -> Result<(), Error> {
        self.session.board_command(&self.id, BoardCommand::Reset).await
    }
}

impl MatchControl for RemoteMatch {
    async fn next_player(&self) -> Result<(), Error> {
        self.session.next_player(&self.id).await
    }

    async fn next_leg(&self) -> Result<(), Error> {
        self.session.next_leg(&self.id).await
    }

    async fn undo(&self) -> Result<(), Error> {
        self.session.undo(&self.id).await
    }

    async fn throw(&self, segment: &Segment, index: Option<usize>) -> Result<(), Error> {
        self.session.throw(&self.id, segment, index).await
    }

    async fn abort(&self) -> Result<(), Error> {
        self.session.abort(&self.id).await
    }

    async fn finish(&self) -> Result<(), Error> {
        self.session.finish(&self.id).await
    }
}

impl DartsApi for Session {
    type Board = RemoteBoard;
    type Match = RemoteMatch;

    async fn board(&self, id: &str) -> Result<RemoteBoard, Error> {
        RemoteBoard::fetch(self, id).await
    }

    async fn match_by_id(&self, id: &str) -> Result<RemoteMatch, Error> {
        RemoteMatch::fetch(self, id).await
    }
}

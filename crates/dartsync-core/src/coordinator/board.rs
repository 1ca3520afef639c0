use std::sync::Arc;

use dartsync_api::{BoardState, Callback, CallbackHandle, DartsApi, EventFilter, RemoteEntity};
use tokio::sync::watch;
use tracing::debug;

use super::{Coordinator, LinkState};
use crate::config::ReconnectPolicy;
use crate::dispatch::{DispatchSender, Role, Router};
use crate::error::CoreError;
use crate::stream::{Latest, StateStream};

/// Mirrors one board, identified by a fixed id.
pub struct BoardCoordinator<A: DartsApi> {
    api: A,
    board_id: String,
    base: Coordinator<A::Board>,
}

impl<A: DartsApi> BoardCoordinator<A> {
    pub fn new(
        api: A,
        board_id: impl Into<String>,
        dispatch: DispatchSender,
        reconnect: ReconnectPolicy,
    ) -> Self {
        Self {
            api,
            board_id: board_id.into(),
            base: Coordinator::new(Role::Board, dispatch, reconnect),
        }
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn base(&self) -> &Coordinator<A::Board> {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut Coordinator<A::Board> {
        &mut self.base
    }

    pub fn item(&self) -> Option<&A::Board> {
        self.base.item()
    }

    pub fn generation(&self) -> u64 {
        self.base.generation()
    }

    pub fn is_connected(&self) -> bool {
        self.base.is_connected()
    }

    pub fn latest(&self) -> Latest<BoardState> {
        self.base.latest()
    }

    pub fn subscribe(&self) -> StateStream<BoardState> {
        self.base.subscribe()
    }

    pub fn link(&self) -> watch::Receiver<LinkState> {
        self.base.link()
    }

    pub fn router(&self) -> Router {
        self.base.router()
    }

    /// Snapshot of the held board.
    pub fn state(&self) -> Option<Arc<BoardState>> {
        self.base.item().map(RemoteEntity::state)
    }

    /// Match currently running on the board, if any.
    pub fn match_id(&self) -> Option<String> {
        self.state()
            .and_then(|board| board.current_match().map(str::to_owned))
    }

    /// Subscribe on the held board on behalf of another coordinator.
    /// The caller owns the handle.
    pub fn subscribe_item(&self, filter: EventFilter, callback: Callback) -> Option<CallbackHandle> {
        self.base.subscribe_item(filter, callback)
    }

    /// Periodic update: fetch a fresh board, swap it in, open its channel.
    pub async fn update(&mut self) -> Result<(), CoreError> {
        let board = self.api.board(&self.board_id).await?;
        debug!(board = %self.board_id, "board fetched");
        // connect() broadcasts, so loading does not.
        self.base.load(board, false);
        self.base.connect().await?;
        Ok(())
    }

    /// Re-fetch the held board in place.
    pub async fn refresh(&mut self) -> Result<bool, CoreError> {
        self.base.refresh().await
    }

    /// Open the push channel and reflect it to subscribers right away.
    pub async fn connect(&mut self) -> Result<(), CoreError> {
        let before = self.base.latest().revision;
        self.base.connect().await?;
        if self.base.latest().revision == before {
            self.base.rebroadcast();
        }
        Ok(())
    }

    /// Close the push channel and reflect it to subscribers right away.
    pub fn disconnect(&mut self) {
        self.base.disconnect();
        self.base.rebroadcast();
    }

    pub fn unload(&mut self) {
        self.base.unload();
    }
}

// ── Push-to-task routing ──
//
// Push callbacks run on the websocket reader tasks. They never touch
// coordinator state: each one wraps what it saw in a `Dispatch` and sends
// it to the pairing task, which applies dispatches one at a time. A
// dispatch carries the generation of the item that produced it, so events
// from a replaced item are dropped on arrival.

use std::sync::Arc;

use dartsync_api::{Callback, PushMessage};
use strum::Display;
use tokio::sync::mpsc;
use tracing::debug;

use crate::coordinator::{WaitGuard, WaitToken};

/// Which coordinator of a pairing a dispatch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Board,
    Match,
}

/// What happened.
#[derive(Debug)]
pub enum Signal {
    StateUpdated(PushMessage),
    UnexpectedClose(PushMessage),
    MatchEnded(PushMessage),
    BoardReset(WaitGuard),
    /// A delayed reopen came due.
    Reopen,
}

/// Callback targets a coordinator can register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forward {
    StateUpdated,
    UnexpectedClose,
    MatchEnded,
}

#[derive(Debug)]
pub struct Dispatch {
    pub origin: Role,
    pub generation: u64,
    pub signal: Signal,
}

pub type DispatchSender = mpsc::UnboundedSender<Dispatch>;
pub type DispatchReceiver = mpsc::UnboundedReceiver<Dispatch>;

/// Builds callbacks bound to one coordinator item.
#[derive(Debug, Clone)]
pub struct Router {
    tx: DispatchSender,
    origin: Role,
    generation: u64,
}

impl Router {
    pub fn new(tx: DispatchSender, origin: Role, generation: u64) -> Self {
        Self {
            tx,
            origin,
            generation,
        }
    }

    pub fn send(&self, signal: Signal) {
        let dispatch = Dispatch {
            origin: self.origin,
            generation: self.generation,
            signal,
        };
        // Closed receiver: the pairing task is gone and nobody is listening.
        if self.tx.send(dispatch).is_err() {
            debug!(origin = %self.origin, "pairing task gone, dropping push event");
        }
    }

    pub fn callback(&self, forward: Forward) -> Callback {
        let router = self.clone();
        Arc::new(move |message: &PushMessage| {
            let message = message.clone();
            router.send(match forward {
                Forward::StateUpdated => Signal::StateUpdated(message),
                Forward::UnexpectedClose => Signal::UnexpectedClose(message),
                Forward::MatchEnded => Signal::MatchEnded(message),
            });
        })
    }

    /// Reset callback: only queues work if it wins the wait token.
    pub fn reset_callback(&self, token: WaitToken) -> Callback {
        let router = self.clone();
        Arc::new(move |_message: &PushMessage| match token.try_acquire() {
            Some(guard) => router.send(Signal::BoardReset(guard)),
            None => debug!("board reset while a check is in flight, suppressed"),
        })
    }
}

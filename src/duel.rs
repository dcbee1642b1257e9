use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::api::{QuizApi, RoomPlayer};
use crate::state::Delta;
use crate::worker::settle;

pub const ROOM_CODE_LEN: usize = 4;
pub const MIN_DUEL_PLAYERS: usize = 2;
pub const HOST_BADGE: &str = "[Host]";

/// Only the length is checked; the server decides whether the room exists.
pub fn is_valid_room_code(code: &str) -> bool {
    code.chars().count() == ROOM_CODE_LEN
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuelRoom {
    pub code: String,
    pub is_host: bool,
    pub players: Vec<RoomPlayer>,
}

impl DuelRoom {
    pub fn new(code: impl Into<String>, is_host: bool) -> Self {
        Self {
            code: code.into(),
            is_host,
            players: Vec::new(),
        }
    }

    pub fn can_start(&self) -> bool {
        self.is_host && self.players.len() >= MIN_DUEL_PLAYERS
    }
}

/// One line per player, in server order. Pure, so re-rendering the same list
/// yields the same text.
pub fn player_list_lines(players: &[RoomPlayer]) -> Vec<String> {
    players
        .iter()
        .map(|p| {
            if p.is_host {
                format!("{} {HOST_BADGE}", p.username)
            } else {
                p.username.clone()
            }
        })
        .collect()
}

/// Owned player-list poll for one waiting room. Polls immediately, then every
/// `interval`, until cancelled or dropped.
pub struct RoomPoller {
    room_code: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RoomPoller {
    pub fn spawn(
        api: Arc<dyn QuizApi>,
        room_code: String,
        user_id: i64,
        interval: Duration,
        tx: Sender<Delta>,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let code = room_code.clone();
        let handle = thread::spawn(move || {
            loop {
                let response = settle(&tx, "Room players", api.room_players(&code, user_id));
                // A cancel that landed during the request wins over its result.
                if !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty)) {
                    break;
                }
                if tx
                    .send(Delta::RoomPlayers {
                        room_code: code.clone(),
                        response,
                    })
                    .is_err()
                {
                    break;
                }
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Self {
            room_code,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop_tx.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signals the poll thread without waiting for an in-flight request.
    pub fn cancel(&mut self) {
        self.stop_tx.take();
    }

    /// Cancels and blocks until the poll thread has exited.
    pub fn join(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RoomPoller {
    fn drop(&mut self) {
        self.cancel();
    }
}

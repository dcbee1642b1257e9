use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use anyhow::Result;

use crate::api::{ApiResponse, QuizApi, or_connection_error};
use crate::state::{Command, Delta};

/// Runs API calls off the UI thread, one command at a time, until either
/// channel closes.
pub fn spawn_worker(
    api: Arc<dyn QuizApi>,
    tx: Sender<Delta>,
    cmd_rx: Receiver<Command>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(cmd) = cmd_rx.recv() {
            let delta = run_command(api.as_ref(), cmd, &tx);
            if tx.send(delta).is_err() {
                break;
            }
        }
    })
}

pub fn run_command(api: &dyn QuizApi, cmd: Command, tx: &Sender<Delta>) -> Delta {
    match cmd {
        Command::Login { username, password } => {
            let response = settle(tx, "Login", api.login(&username, &password));
            Delta::LoggedIn { username, response }
        }
        Command::Register { username, password } => {
            Delta::Registered(settle(tx, "Register", api.register(&username, &password)))
        }
        Command::FetchThemes => Delta::Themes(settle(tx, "Themes", api.themes())),
        Command::StartGame { theme_id, user_id } => Delta::GameStarted(settle(
            tx,
            "Start game",
            api.start_game(theme_id, user_id),
        )),
        Command::SubmitAnswer {
            game_id,
            answer,
            time_taken,
        } => Delta::AnswerChecked(settle(
            tx,
            "Submit answer",
            api.submit_answer(&game_id, answer.as_deref(), time_taken),
        )),
        Command::FetchLeaderboard { theme } => {
            let response = settle(tx, "Leaderboard", api.leaderboard(theme));
            Delta::Leaderboard { theme, response }
        }
        Command::CreateRoom { theme_id, user_id } => Delta::RoomCreated(settle(
            tx,
            "Create room",
            api.create_duel_room(theme_id, user_id),
        )),
        Command::JoinRoom { room_code, user_id } => {
            let response = settle(tx, "Join room", api.join_duel_room(&room_code, user_id));
            Delta::RoomJoined {
                room_code,
                response,
            }
        }
        Command::StartDuel { room_code, user_id } => Delta::DuelStarted(settle(
            tx,
            "Start duel",
            api.start_duel(&room_code, user_id),
        )),
    }
}

/// Applies the connection-error policy and reports the cause on the console.
pub fn settle<T: Default>(
    tx: &Sender<Delta>,
    what: &str,
    result: Result<ApiResponse<T>>,
) -> ApiResponse<T> {
    or_connection_error(result, |err| {
        let _ = tx.send(Delta::Log(format!("[WARN] {what} error: {err:#}")));
    })
}

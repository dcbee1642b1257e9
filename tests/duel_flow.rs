use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use quiz_terminal::api::{
    ApiResponse, CreateRoomData, Empty, LeaderboardData, LeaderboardEntry, LeaderboardTheme,
    LoginData, Question, QuestionKind, QuizApi, RoomPlayer, RoomPlayersData, StartDuelData,
    StartGameData,
};
use quiz_terminal::app::{App, GUEST_DUEL_NOTICE, NO_GAME_NOTICE};
use quiz_terminal::config::Config;
use quiz_terminal::offline::OfflineQuizApi;
use quiz_terminal::session::SessionStore;
use quiz_terminal::state::{Command, Delta, Screen};

struct Harness {
    app: App,
    cmd_rx: Receiver<Command>,
    delta_rx: Receiver<Delta>,
}

fn harness() -> Harness {
    let api: Arc<dyn QuizApi> = Arc::new(OfflineQuizApi::new());
    let config = Config {
        room_poll_interval: Duration::from_millis(20),
        ..Config::default()
    };
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (delta_tx, delta_rx) = mpsc::channel();
    let app = App::new(api, SessionStore::memory(), &config, Some(cmd_tx), delta_tx);
    Harness {
        app,
        cmd_rx,
        delta_rx,
    }
}

fn signed_in() -> Harness {
    let mut h = harness();
    h.app.state.login.username = "alice".to_string();
    h.app.state.login.password = "pw".to_string();
    h.app.apply_delta(Delta::LoggedIn {
        username: "alice".to_string(),
        response: ApiResponse::success(LoginData { user_id: Some(7) }),
    });
    while h.cmd_rx.try_recv().is_ok() {}
    h
}

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn player(name: &str, is_host: bool) -> RoomPlayer {
    RoomPlayer {
        user_id: None,
        username: name.to_string(),
        is_host,
    }
}

fn first_question() -> Question {
    Question {
        id: Some(1),
        theme_id: Some(1),
        kind: QuestionKind::Open,
        points: 5,
        text: "Capital of Peru?".to_string(),
        correct_answer: "Lima".to_string(),
        wrong_answers: Vec::new(),
    }
}

fn room_players(players: Vec<RoomPlayer>, game_started: bool) -> ApiResponse<RoomPlayersData> {
    ApiResponse::success(RoomPlayersData {
        players,
        is_host: false,
        game_started,
    })
}

#[test]
fn login_requires_both_fields() {
    let mut h = harness();
    h.app.state.login.username = "alice".to_string();
    h.app.login();
    assert_eq!(h.app.state.alert.as_deref(), Some("Please fill in all fields"));
    assert!(h.cmd_rx.try_recv().is_err());
}

#[test]
fn successful_login_stores_session_and_shows_menu() {
    let h = signed_in();
    assert_eq!(h.app.session.user_id, Some(7));
    assert_eq!(h.app.session.username.as_deref(), Some("alice"));
    assert_eq!(h.app.state.screen, Screen::Menu);
}

#[test]
fn failed_login_alerts_server_message() {
    let mut h = harness();
    h.app.apply_delta(Delta::LoggedIn {
        username: "alice".to_string(),
        response: ApiResponse::error("Invalid credentials"),
    });
    assert_eq!(
        h.app.state.alert.as_deref(),
        Some("Login failed: Invalid credentials")
    );
    assert_eq!(h.app.state.screen, Screen::Login);
    assert!(!h.app.session.is_authenticated());
}

#[test]
fn registration_success_chains_into_login() {
    let mut h = harness();
    h.app.state.login.username = "bob".to_string();
    h.app.state.login.password = "secret".to_string();
    h.app.apply_delta(Delta::Registered(ApiResponse::success(Empty {})));
    assert!(h.app.state.alert.is_some());
    match h.cmd_rx.try_recv() {
        Ok(Command::Login { username, password }) => {
            assert_eq!(username, "bob");
            assert_eq!(password, "secret");
        }
        other => panic!("expected login command, got {other:?}"),
    }
}

#[test]
fn check_auth_without_user_returns_to_login() {
    let mut h = harness();
    h.app.state.screen = Screen::Menu;
    assert!(!h.app.check_auth());
    assert_eq!(h.app.state.screen, Screen::Login);

    h.app.create_room();
    assert!(h.cmd_rx.try_recv().is_err());
}

#[test]
fn join_rejects_codes_that_are_not_four_characters() {
    let mut h = signed_in();
    for code in ["", "123", "12345"] {
        h.app.open_join_room();
        h.app.state.room_code_input = code.to_string();
        h.app.join_room();
        assert_eq!(
            h.app.state.alert.take().as_deref(),
            Some("Please enter a 4-digit code")
        );
        assert!(h.cmd_rx.try_recv().is_err(), "code {code:?} must not be sent");
    }

    h.app.state.room_code_input = "4821".to_string();
    h.app.join_room();
    match h.cmd_rx.try_recv() {
        Ok(Command::JoinRoom { room_code, user_id }) => {
            assert_eq!(room_code, "4821");
            assert_eq!(user_id, 7);
        }
        other => panic!("expected join command, got {other:?}"),
    }
}

#[test]
fn typed_code_goes_through_the_join_screen() {
    let mut h = signed_in();
    h.app.on_key(key(KeyCode::Char('r')));
    assert_eq!(h.app.state.screen, Screen::JoinRoom);
    for c in "9876".chars() {
        h.app.on_key(key(KeyCode::Char(c)));
    }
    h.app.on_key(key(KeyCode::Enter));
    assert!(matches!(
        h.cmd_rx.try_recv(),
        Ok(Command::JoinRoom { ref room_code, .. }) if room_code == "9876"
    ));
}

#[test]
fn failed_join_alerts_and_returns_to_menu() {
    let mut h = signed_in();
    h.app.open_join_room();
    h.app.apply_delta(Delta::RoomJoined {
        room_code: "1111".to_string(),
        response: ApiResponse::error("Room not found"),
    });
    assert_eq!(h.app.state.alert.as_deref(), Some("Room not found"));
    assert_eq!(h.app.state.screen, Screen::Menu);
    assert!(!h.app.is_polling());
}

#[test]
fn created_room_enters_waiting_room_as_host_and_polls() {
    let mut h = signed_in();
    h.app.create_room();
    assert_eq!(h.app.state.screen, Screen::CreateRoom);
    assert!(matches!(
        h.cmd_rx.try_recv(),
        Ok(Command::CreateRoom { user_id: 7, .. })
    ));

    h.app.apply_delta(Delta::RoomCreated(ApiResponse::success(CreateRoomData {
        room_code: Some("5150".to_string()),
    })));
    assert_eq!(h.app.state.screen, Screen::WaitingRoom);
    let room = h.app.state.room.as_ref().expect("room");
    assert!(room.is_host);
    assert_eq!(room.code, "5150");
    assert!(h.app.is_polling());
    assert_eq!(h.app.polled_room(), Some("5150"));

    let polled = h
        .delta_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("poller reports");
    assert!(matches!(polled, Delta::RoomPlayers { ref room_code, .. } if room_code == "5150"));
}

#[test]
fn leaving_the_waiting_room_cancels_the_poller() {
    let mut h = signed_in();
    h.app.state.screen = Screen::CreateRoom;
    h.app.apply_delta(Delta::RoomCreated(ApiResponse::success(CreateRoomData {
        room_code: Some("5150".to_string()),
    })));
    assert!(h.app.is_polling());

    h.app.on_key(key(KeyCode::Esc));
    assert_eq!(h.app.state.screen, Screen::Menu);
    assert!(h.app.state.room.is_none());
    assert!(!h.app.is_polling());
}

#[test]
fn room_creation_failure_alerts() {
    let mut h = signed_in();
    h.app.state.screen = Screen::CreateRoom;
    h.app
        .apply_delta(Delta::RoomCreated(ApiResponse::<CreateRoomData>::error("boom")));
    assert_eq!(
        h.app.state.alert.as_deref(),
        Some("Room creation failed: boom")
    );
    assert!(!h.app.is_polling());
}

#[test]
fn player_updates_gate_the_start_action() {
    let mut h = signed_in();
    h.app.state.screen = Screen::CreateRoom;
    h.app.apply_delta(Delta::RoomCreated(ApiResponse::success(CreateRoomData {
        room_code: Some("5150".to_string()),
    })));

    h.app.apply_delta(Delta::RoomPlayers {
        room_code: "5150".to_string(),
        response: room_players(vec![player("alice", true)], false),
    });
    assert!(!h.app.state.room.as_ref().expect("room").can_start());
    h.app.start_duel();
    assert!(h.cmd_rx.try_recv().is_err());

    h.app.apply_delta(Delta::RoomPlayers {
        room_code: "5150".to_string(),
        response: room_players(vec![player("alice", true), player("bob", false)], false),
    });
    assert!(h.app.state.room.as_ref().expect("room").can_start());
    h.app.on_key(key(KeyCode::Char('s')));
    assert!(matches!(
        h.cmd_rx.try_recv(),
        Ok(Command::StartDuel { ref room_code, user_id: 7 }) if room_code == "5150"
    ));
}

#[test]
fn stale_or_failed_player_updates_are_ignored() {
    let mut h = signed_in();
    h.app.state.screen = Screen::CreateRoom;
    h.app.apply_delta(Delta::RoomCreated(ApiResponse::success(CreateRoomData {
        room_code: Some("5150".to_string()),
    })));

    h.app.apply_delta(Delta::RoomPlayers {
        room_code: "0001".to_string(),
        response: room_players(vec![player("ghost", true)], true),
    });
    h.app.apply_delta(Delta::RoomPlayers {
        room_code: "5150".to_string(),
        response: ApiResponse::connection_error(),
    });
    assert!(h.app.state.room.as_ref().expect("room").players.is_empty());
    assert_eq!(h.app.state.screen, Screen::WaitingRoom);
}

#[test]
fn guest_is_told_when_the_duel_starts_without_a_game() {
    let mut h = signed_in();
    h.app.state.screen = Screen::Quiz;
    h.app.apply_delta(Delta::GameStarted(ApiResponse::success(StartGameData {
        game_id: Some("solo_game_1".to_string()),
        question: None,
    })));
    h.app.back_to_menu();

    h.app.open_join_room();
    h.app.apply_delta(Delta::RoomJoined {
        room_code: "2222".to_string(),
        response: ApiResponse::success(Empty {}),
    });
    assert_eq!(h.app.state.screen, Screen::WaitingRoom);
    assert!(!h.app.state.room.as_ref().expect("room").is_host);

    h.app.apply_delta(Delta::RoomPlayers {
        room_code: "2222".to_string(),
        response: room_players(vec![player("host", true), player("alice", false)], true),
    });
    assert_eq!(h.app.state.screen, Screen::Menu);
    assert_eq!(h.app.state.alert.as_deref(), Some(GUEST_DUEL_NOTICE));
    assert!(h.app.state.room.is_none());
    assert!(!h.app.is_polling());
    assert_ne!(h.app.state.quiz.game_id.as_deref(), Some("solo_game_1"));
}

#[test]
fn join_reply_after_leaving_is_ignored() {
    let mut h = signed_in();
    h.app.open_join_room();
    h.app.state.room_code_input = "3333".to_string();
    h.app.join_room();
    h.app.on_key(key(KeyCode::Esc));
    assert_eq!(h.app.state.screen, Screen::Menu);

    h.app.apply_delta(Delta::RoomJoined {
        room_code: "3333".to_string(),
        response: ApiResponse::success(Empty {}),
    });
    assert_eq!(h.app.state.screen, Screen::Menu);
    assert!(h.app.state.room.is_none());
    assert!(!h.app.is_polling());
}

#[test]
fn duel_start_without_game_id_drops_the_previous_game() {
    let mut h = signed_in();
    h.app.apply_delta(Delta::GameStarted(ApiResponse::success(StartGameData {
        game_id: Some("solo_game_1".to_string()),
        question: None,
    })));
    assert_eq!(
        h.app.session.current_game_id.as_deref(),
        Some("solo_game_1")
    );
    h.app.back_to_menu();

    h.app.state.screen = Screen::CreateRoom;
    h.app.apply_delta(Delta::RoomCreated(ApiResponse::success(CreateRoomData {
        room_code: Some("5150".to_string()),
    })));
    h.app.apply_delta(Delta::DuelStarted(ApiResponse::success(StartDuelData {
        game_id: None,
        first_question: Some(first_question()),
    })));

    assert_eq!(h.app.state.screen, Screen::Quiz);
    assert!(h.app.session.current_game_id.is_none());
    assert!(h.app.state.quiz.game_id.is_none());
    assert!(h.app.state.quiz.question.is_some());

    while h.cmd_rx.try_recv().is_ok() {}
    h.app.state.quiz.answer = "Lima".to_string();
    h.app.submit_answer();
    assert!(h.cmd_rx.try_recv().is_err());
    assert_eq!(h.app.state.alert.as_deref(), Some(NO_GAME_NOTICE));
    assert!(!h.app.state.quiz.pending);
}

#[test]
fn failed_login_after_registration_keeps_both_messages() {
    let mut h = harness();
    h.app.state.login.username = "bob".to_string();
    h.app.state.login.password = "secret".to_string();
    h.app.apply_delta(Delta::Registered(ApiResponse::success(Empty {})));
    h.app.apply_delta(Delta::LoggedIn {
        username: "bob".to_string(),
        response: ApiResponse::error("Invalid credentials"),
    });

    let alert = h.app.state.alert.as_deref().expect("alert");
    let lines = alert.lines().collect::<Vec<_>>();
    assert_eq!(
        lines,
        vec![
            "Registration successful! You can now log in.",
            "Login failed: Invalid credentials",
        ]
    );

    h.app.on_key(key(KeyCode::Enter));
    assert!(h.app.state.alert.is_none());
}

#[test]
fn started_duel_stores_game_and_opens_quiz() {
    let mut h = signed_in();
    h.app.state.screen = Screen::CreateRoom;
    h.app.apply_delta(Delta::RoomCreated(ApiResponse::success(CreateRoomData {
        room_code: Some("5150".to_string()),
    })));
    h.app.apply_delta(Delta::DuelStarted(ApiResponse::success(StartDuelData {
        game_id: Some("game_9".to_string()),
        first_question: None,
    })));
    assert_eq!(h.app.session.current_game_id.as_deref(), Some("game_9"));
    assert_eq!(h.app.state.screen, Screen::Quiz);
    assert_eq!(h.app.state.quiz.game_id.as_deref(), Some("game_9"));
    assert!(!h.app.is_polling());
}

#[test]
fn failed_duel_start_alerts_and_stays() {
    let mut h = signed_in();
    h.app.state.screen = Screen::CreateRoom;
    h.app.apply_delta(Delta::RoomCreated(ApiResponse::success(CreateRoomData {
        room_code: Some("5150".to_string()),
    })));
    h.app.apply_delta(Delta::DuelStarted(ApiResponse::<StartDuelData>::error(
        "Only the host can start the game",
    )));
    assert_eq!(
        h.app.state.alert.as_deref(),
        Some("Duel start failed: Only the host can start the game")
    );
    assert_eq!(h.app.state.screen, Screen::WaitingRoom);
    assert!(h.app.is_polling());
}

#[test]
fn leaderboard_keeps_one_active_tab_and_ignores_stale_replies() {
    let mut h = signed_in();
    h.app.open_leaderboard();
    assert!(matches!(
        h.cmd_rx.try_recv(),
        Ok(Command::FetchLeaderboard {
            theme: LeaderboardTheme::General
        })
    ));
    h.app.show_leaderboard(LeaderboardTheme::Theme(3));
    assert_eq!(h.app.state.leaderboard.active, LeaderboardTheme::Theme(3));

    let scores = vec![LeaderboardEntry {
        username: "alice".to_string(),
        theme_name: None,
        score: 12,
        total_time: 40.0,
    }];
    h.app.apply_delta(Delta::Leaderboard {
        theme: LeaderboardTheme::General,
        response: ApiResponse::success(LeaderboardData {
            scores: scores.clone(),
        }),
    });
    assert!(h.app.state.leaderboard.scores.is_empty());

    h.app.apply_delta(Delta::Leaderboard {
        theme: LeaderboardTheme::Theme(3),
        response: ApiResponse::success(LeaderboardData { scores }),
    });
    assert_eq!(h.app.state.leaderboard.scores.len(), 1);

    h.app.apply_delta(Delta::Leaderboard {
        theme: LeaderboardTheme::Theme(3),
        response: ApiResponse::connection_error(),
    });
    assert_eq!(h.app.state.leaderboard.scores.len(), 1);
}

#[test]
fn alerts_block_input_until_dismissed() {
    let mut h = signed_in();
    h.app.state.alert("hello");
    h.app.on_key(key(KeyCode::Char('c')));
    assert!(h.cmd_rx.try_recv().is_err());
    h.app.on_key(key(KeyCode::Enter));
    assert!(h.app.state.alert.is_none());
    h.app.on_key(key(KeyCode::Char('c')));
    assert!(matches!(h.cmd_rx.try_recv(), Ok(Command::CreateRoom { .. })));
}

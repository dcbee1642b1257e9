use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::api::{LeaderboardTheme, Question, QuizApi};
use crate::config::Config;
use crate::duel::{DuelRoom, RoomPoller, is_valid_room_code};
use crate::session::{Session, SessionStore};
use crate::state::{AppState, Command, Delta, QuizView, Screen};

pub const GUEST_DUEL_NOTICE: &str =
    "The duel has started, but the server does not share duel questions with guests";
pub const NO_GAME_NOTICE: &str = "No game in progress for this quiz";

pub struct App {
    pub state: AppState,
    pub session: Session,
    pub should_quit: bool,
    api: Arc<dyn QuizApi>,
    store: SessionStore,
    cmd_tx: Option<Sender<Command>>,
    delta_tx: Sender<Delta>,
    poller: Option<RoomPoller>,
    poll_interval: Duration,
}

impl App {
    pub fn new(
        api: Arc<dyn QuizApi>,
        store: SessionStore,
        config: &Config,
        cmd_tx: Option<Sender<Command>>,
        delta_tx: Sender<Delta>,
    ) -> Self {
        let session = store.load();
        let mut app = Self {
            state: AppState::new(),
            session,
            should_quit: false,
            api,
            store,
            cmd_tx,
            delta_tx,
            poller: None,
            poll_interval: config.room_poll_interval,
        };
        if let Some(username) = app.session.username.clone() {
            app.state.login.username = username;
        }
        if app.session.is_authenticated() {
            app.state.screen = Screen::Menu;
            app.request_themes();
        }
        app
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|p| !p.is_cancelled())
    }

    pub fn polled_room(&self) -> Option<&str> {
        self.poller.as_ref().map(RoomPoller::room_code)
    }

    fn send(&mut self, cmd: Command) -> bool {
        let Some(tx) = &self.cmd_tx else {
            self.state.push_log("[WARN] Request worker unavailable");
            return false;
        };
        if tx.send(cmd).is_err() {
            self.state.push_log("[WARN] Request worker stopped");
            return false;
        }
        true
    }

    fn save_session(&mut self) {
        if let Err(err) = self.store.save(&self.session) {
            self.state.push_log(format!("[WARN] Session save failed: {err:#}"));
        }
    }

    /// Sends the user back to the login form when no user is stored.
    pub fn check_auth(&mut self) -> bool {
        if self.session.user_id.is_some() {
            return true;
        }
        self.stop_player_updates();
        self.state.room = None;
        self.state.screen = Screen::Login;
        false
    }

    fn user_id(&mut self) -> Option<i64> {
        if !self.check_auth() {
            return None;
        }
        self.session.user_id
    }

    pub fn login(&mut self) {
        if !self.state.login.is_complete() {
            self.state.alert("Please fill in all fields");
            return;
        }
        let username = self.state.login.username.clone();
        let password = self.state.login.password.clone();
        self.send(Command::Login { username, password });
    }

    pub fn register(&mut self) {
        if !self.state.login.is_complete() {
            self.state.alert("Please fill in all fields");
            return;
        }
        let username = self.state.login.username.clone();
        let password = self.state.login.password.clone();
        self.send(Command::Register { username, password });
    }

    pub fn request_themes(&mut self) {
        self.send(Command::FetchThemes);
    }

    pub fn select_theme(&mut self, index: usize) {
        let Some(theme) = self.state.themes.get(index) else {
            return;
        };
        let theme_id = theme.id;
        self.state.theme_selected = index;
        self.session.current_theme_id = Some(theme_id);
        self.save_session();
    }

    pub fn open_leaderboard(&mut self) {
        self.state.screen = Screen::Leaderboard;
        self.state.leaderboard.scores.clear();
        self.show_leaderboard(LeaderboardTheme::General);
    }

    /// Activates exactly one tab and asks for its scores.
    pub fn show_leaderboard(&mut self, theme: LeaderboardTheme) {
        self.state.leaderboard.active = theme;
        self.send(Command::FetchLeaderboard { theme });
    }

    fn cycle_leaderboard(&mut self, forward: bool) {
        let tabs = self.state.leaderboard_tabs();
        let current = tabs
            .iter()
            .position(|t| *t == self.state.leaderboard.active)
            .unwrap_or(0);
        let next = if forward {
            (current + 1) % tabs.len()
        } else {
            current.checked_sub(1).unwrap_or(tabs.len() - 1)
        };
        self.show_leaderboard(tabs[next]);
    }

    pub fn start_game(&mut self) {
        let Some(user_id) = self.user_id() else {
            return;
        };
        let theme_id = self.session.current_theme_id;
        self.send(Command::StartGame { theme_id, user_id });
    }

    pub fn submit_answer(&mut self) {
        let quiz = &self.state.quiz;
        if quiz.finished || quiz.pending || quiz.question.is_none() {
            return;
        }
        let Some(game_id) = quiz.game_id.clone() else {
            self.state.alert(NO_GAME_NOTICE);
            return;
        };
        let answer = quiz.resolved_answer();
        let time_taken = quiz.elapsed_secs();
        if self.send(Command::SubmitAnswer {
            game_id,
            answer,
            time_taken,
        }) {
            self.state.quiz.pending = true;
        }
    }

    pub fn create_room(&mut self) {
        let Some(user_id) = self.user_id() else {
            return;
        };
        let theme_id = self.session.current_theme_id;
        if self.send(Command::CreateRoom { theme_id, user_id }) {
            self.state.screen = Screen::CreateRoom;
        }
    }

    pub fn open_join_room(&mut self) {
        self.state.room_code_input.clear();
        self.state.screen = Screen::JoinRoom;
    }

    pub fn join_room(&mut self) {
        let code = self.state.room_code_input.clone();
        let Some(user_id) = self.user_id() else {
            return;
        };
        if !is_valid_room_code(&code) {
            self.state.alert("Please enter a 4-digit code");
            return;
        }
        self.send(Command::JoinRoom {
            room_code: code,
            user_id,
        });
    }

    pub fn start_duel(&mut self) {
        let Some(room) = self.state.room.as_ref() else {
            return;
        };
        if !room.can_start() {
            self.state
                .push_log("[INFO] Start needs the host and at least 2 players");
            return;
        }
        let room_code = room.code.clone();
        let Some(user_id) = self.user_id() else {
            return;
        };
        self.send(Command::StartDuel { room_code, user_id });
    }

    pub fn back_to_menu(&mut self) {
        self.stop_player_updates();
        self.state.room = None;
        self.state.room_code_input.clear();
        self.state.quiz = QuizView::default();
        self.state.screen = Screen::Menu;
    }

    fn show_waiting_room(&mut self, code: String, is_host: bool) {
        self.state.room = Some(DuelRoom::new(code, is_host));
        self.state.screen = Screen::WaitingRoom;
        self.start_player_updates();
    }

    /// Replaces any previous poller; the old one is cancelled on drop.
    fn start_player_updates(&mut self) {
        let Some(code) = self.state.room.as_ref().map(|r| r.code.clone()) else {
            return;
        };
        let Some(user_id) = self.session.user_id else {
            return;
        };
        self.poller = Some(RoomPoller::spawn(
            Arc::clone(&self.api),
            code,
            user_id,
            self.poll_interval,
            self.delta_tx.clone(),
        ));
    }

    fn stop_player_updates(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.cancel();
        }
    }

    fn enter_quiz(&mut self, game_id: Option<String>, is_duel: bool, question: Option<Question>) {
        self.stop_player_updates();
        self.state.quiz = QuizView::new(game_id, is_duel, question);
        self.state.screen = Screen::Quiz;
    }

    pub fn apply_delta(&mut self, delta: Delta) {
        match delta {
            Delta::LoggedIn { username, response } => {
                if !response.is_success() {
                    self.state
                        .alert(format!("Login failed: {}", response.error_message()));
                    return;
                }
                let Some(user_id) = response.data.user_id else {
                    self.state.alert("Login failed: no user id in response");
                    return;
                };
                self.session.sign_in(user_id, &username);
                self.save_session();
                self.state.login.password.clear();
                self.state.screen = Screen::Menu;
                self.state.push_log(format!("[INFO] Logged in as {username}"));
                self.request_themes();
            }
            Delta::Registered(response) => {
                if response.is_success() {
                    self.state
                        .alert("Registration successful! You can now log in.");
                    self.login();
                } else {
                    self.state.alert(format!(
                        "Registration failed: {}",
                        response.error_message()
                    ));
                }
            }
            Delta::Themes(response) => {
                if !response.is_success() {
                    self.state.push_log(format!(
                        "[WARN] Themes unavailable: {}",
                        response.error_message()
                    ));
                    return;
                }
                self.state.themes = response.data.themes;
                self.state.theme_selected = 0;
                if let Some(theme_id) = self.session.current_theme_id {
                    self.state.select_theme_id(theme_id);
                }
            }
            Delta::GameStarted(response) => {
                if !response.is_success() {
                    self.state
                        .alert(format!("Game start failed: {}", response.error_message()));
                    return;
                }
                self.session.current_game_id = response.data.game_id.clone();
                self.save_session();
                self.enter_quiz(response.data.game_id, false, response.data.question);
            }
            Delta::AnswerChecked(response) => {
                if !response.is_success() {
                    self.state.quiz.pending = false;
                    self.state.alert(format!(
                        "Answer submission failed: {}",
                        response.error_message()
                    ));
                    return;
                }
                self.state.quiz.record(response.data);
            }
            Delta::Leaderboard { theme, response } => {
                if response.is_success() && theme == self.state.leaderboard.active {
                    self.state.leaderboard.scores = response.data.scores;
                }
            }
            Delta::RoomCreated(response) => {
                if self.state.screen != Screen::CreateRoom {
                    self.state
                        .push_log("[INFO] Room reply arrived after leaving, ignored");
                    return;
                }
                match response.data.room_code.clone() {
                    Some(code) if response.is_success() => self.show_waiting_room(code, true),
                    _ => {
                        let message = if response.is_success() {
                            "no room code in response"
                        } else {
                            response.error_message()
                        };
                        self.state
                            .alert(format!("Room creation failed: {message}"));
                        self.state.screen = Screen::Menu;
                    }
                }
            }
            Delta::RoomJoined {
                room_code,
                response,
            } => {
                if self.state.screen != Screen::JoinRoom {
                    self.state
                        .push_log("[INFO] Join reply arrived after leaving, ignored");
                    return;
                }
                if response.is_success() {
                    self.show_waiting_room(room_code, false);
                } else {
                    self.state.alert(response.error_message());
                    self.back_to_menu();
                }
            }
            Delta::RoomPlayers {
                room_code,
                response,
            } => {
                if !response.is_success() {
                    return;
                }
                let Some(room) = self.state.room.as_mut() else {
                    return;
                };
                if room.code != room_code {
                    return;
                }
                room.players = response.data.players;
                if response.data.game_started && !room.is_host {
                    // The room reply carries no game, so a guest has nothing to answer into.
                    self.back_to_menu();
                    self.state.alert(GUEST_DUEL_NOTICE);
                }
            }
            Delta::DuelStarted(response) => {
                if !response.is_success() {
                    self.state
                        .alert(format!("Duel start failed: {}", response.error_message()));
                    return;
                }
                self.session.current_game_id = response.data.game_id.clone();
                self.save_session();
                self.enter_quiz(response.data.game_id, true, response.data.first_question);
            }
            Delta::Log(msg) => self.state.push_log(msg),
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        if self.state.alert.is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                self.state.alert = None;
            }
            return;
        }
        if self.state.help_overlay {
            self.state.help_overlay = false;
            return;
        }

        match self.state.screen {
            Screen::Login => self.on_login_key(key),
            Screen::Menu => self.on_menu_key(key),
            Screen::CreateRoom => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('b')) {
                    self.back_to_menu();
                }
            }
            Screen::JoinRoom => match key.code {
                KeyCode::Enter => self.join_room(),
                KeyCode::Esc => self.back_to_menu(),
                KeyCode::Backspace => {
                    self.state.room_code_input.pop();
                }
                KeyCode::Char(c) => self.state.room_code_input.push(c),
                _ => {}
            },
            Screen::WaitingRoom => match key.code {
                KeyCode::Char('s') | KeyCode::Enter => self.start_duel(),
                KeyCode::Esc | KeyCode::Char('b') => self.back_to_menu(),
                KeyCode::Char('?') => self.state.help_overlay = true,
                _ => {}
            },
            Screen::Quiz => self.on_quiz_key(key),
            Screen::Leaderboard => match key.code {
                KeyCode::Right | KeyCode::Tab | KeyCode::Char('l') => self.cycle_leaderboard(true),
                KeyCode::Left | KeyCode::BackTab | KeyCode::Char('h') => {
                    self.cycle_leaderboard(false)
                }
                KeyCode::Char('r') => self.show_leaderboard(self.state.leaderboard.active),
                KeyCode::Esc | KeyCode::Char('b') => self.state.screen = Screen::Menu,
                KeyCode::Char('?') => self.state.help_overlay = true,
                _ => {}
            },
        }
    }

    fn on_login_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                self.state.login.toggle_focus()
            }
            KeyCode::Enter => self.login(),
            KeyCode::F(2) => self.register(),
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Backspace => {
                self.state.login.focused_mut().pop();
            }
            KeyCode::Char(c) => self.state.login.focused_mut().push(c),
            _ => {}
        }
    }

    fn on_menu_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Down | KeyCode::Char('j') => {
                self.state.select_theme_next();
                self.select_theme(self.state.theme_selected);
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.state.select_theme_prev();
                self.select_theme(self.state.theme_selected);
            }
            KeyCode::Enter => self.select_theme(self.state.theme_selected),
            KeyCode::Char('p') => self.start_game(),
            KeyCode::Char('c') => self.create_room(),
            KeyCode::Char('r') => self.open_join_room(),
            KeyCode::Char('l') => self.open_leaderboard(),
            KeyCode::Char('t') => self.request_themes(),
            KeyCode::Char('?') => self.state.help_overlay = true,
            _ => {}
        }
    }

    fn on_quiz_key(&mut self, key: KeyEvent) {
        if self.state.quiz.finished {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                self.back_to_menu();
            }
            return;
        }
        match key.code {
            KeyCode::Enter => self.submit_answer(),
            KeyCode::Esc => self.back_to_menu(),
            KeyCode::Backspace => {
                self.state.quiz.answer.pop();
            }
            KeyCode::Char(c) => self.state.quiz.answer.push(c),
            _ => {}
        }
    }
}

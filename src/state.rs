use std::collections::VecDeque;
use std::time::Instant;

use chrono::Local;
use rand::seq::SliceRandom;

use crate::api::{
    AnswerData, ApiResponse, CreateRoomData, Empty, LeaderboardData, LeaderboardEntry,
    LeaderboardTheme, LoginData, Question, RoomPlayersData, StartDuelData, StartGameData, Theme,
    ThemesData,
};
use crate::duel::DuelRoom;

const MAX_LOGS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    Menu,
    CreateRoom,
    JoinRoom,
    WaitingRoom,
    Quiz,
    Leaderboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Username,
    Password,
}

#[derive(Debug, Clone)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub focus: LoginField,
}

impl LoginForm {
    fn new() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            focus: LoginField::Username,
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            LoginField::Username => LoginField::Password,
            LoginField::Password => LoginField::Username,
        };
    }

    pub fn focused_mut(&mut self) -> &mut String {
        match self.focus {
            LoginField::Username => &mut self.username,
            LoginField::Password => &mut self.password,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub correct_answer: Option<String>,
    pub points: i64,
    pub time_taken: f64,
}

#[derive(Debug, Clone)]
pub struct QuizView {
    pub game_id: Option<String>,
    pub is_duel: bool,
    pub question: Option<Question>,
    /// Shuffled proposals for the current question; empty for open ones.
    pub choices: Vec<String>,
    pub answer: String,
    pub shown_at: Instant,
    pub score: i64,
    pub answered: u32,
    pub correct: u32,
    pub last_result: Option<AnswerOutcome>,
    pub finished: bool,
    pub pending: bool,
}

impl Default for QuizView {
    fn default() -> Self {
        Self::new(None, false, None)
    }
}

impl QuizView {
    pub fn new(game_id: Option<String>, is_duel: bool, question: Option<Question>) -> Self {
        let mut view = Self {
            game_id,
            is_duel,
            question: None,
            choices: Vec::new(),
            answer: String::new(),
            shown_at: Instant::now(),
            score: 0,
            answered: 0,
            correct: 0,
            last_result: None,
            finished: false,
            pending: false,
        };
        view.show_question(question);
        view
    }

    pub fn show_question(&mut self, question: Option<Question>) {
        let mut choices = question.as_ref().map(Question::proposals).unwrap_or_default();
        choices.shuffle(&mut rand::thread_rng());
        self.choices = choices;
        self.question = question;
        self.answer.clear();
        self.shown_at = Instant::now();
    }

    /// Typed text, with a bare choice number mapped to that proposal.
    /// Blank input means no answer.
    pub fn resolved_answer(&self) -> Option<String> {
        let typed = self.answer.trim();
        if typed.is_empty() {
            return None;
        }
        if let Ok(n) = typed.parse::<usize>()
            && n >= 1
            && n <= self.choices.len()
        {
            return Some(self.choices[n - 1].clone());
        }
        Some(typed.to_string())
    }

    /// Seconds since the question was shown, to one decimal.
    pub fn elapsed_secs(&self) -> f64 {
        (self.shown_at.elapsed().as_secs_f64() * 10.0).round() / 10.0
    }

    pub fn record(&mut self, data: AnswerData) {
        self.pending = false;
        self.answered += 1;
        if data.is_correct {
            self.correct += 1;
        }
        self.score += data.points;
        self.last_result = Some(AnswerOutcome {
            is_correct: data.is_correct,
            correct_answer: data.correct_answer,
            points: data.points,
            time_taken: data.time_taken,
        });
        if data.game_finished || data.next_question.is_none() {
            self.finished = true;
            self.show_question(None);
        } else {
            self.show_question(data.next_question);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LeaderboardView {
    pub active: LeaderboardTheme,
    pub scores: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub screen: Screen,
    pub login: LoginForm,
    pub themes: Vec<Theme>,
    pub theme_selected: usize,
    pub room_code_input: String,
    pub room: Option<DuelRoom>,
    pub quiz: QuizView,
    pub leaderboard: LeaderboardView,
    pub alert: Option<String>,
    pub logs: VecDeque<String>,
    pub help_overlay: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            screen: Screen::Login,
            login: LoginForm::new(),
            themes: Vec::new(),
            theme_selected: 0,
            room_code_input: String::new(),
            room: None,
            quiz: QuizView::default(),
            leaderboard: LeaderboardView::default(),
            alert: None,
            logs: VecDeque::with_capacity(MAX_LOGS),
            help_overlay: false,
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        if self.logs.len() >= MAX_LOGS {
            self.logs.pop_front();
        }
        let stamp = Local::now().format("%H:%M:%S");
        self.logs.push_back(format!("{stamp} {}", msg.into()));
    }

    /// Modal message; stays up until dismissed. Messages raised while one is
    /// showing are stacked below it.
    pub fn alert(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        self.push_log(format!("[INFO] {msg}"));
        match self.alert.as_mut() {
            Some(shown) if shown.lines().any(|line| line == msg) => {}
            Some(shown) => {
                shown.push('\n');
                shown.push_str(&msg);
            }
            None => self.alert = Some(msg),
        }
    }

    pub fn selected_theme(&self) -> Option<&Theme> {
        self.themes.get(self.theme_selected)
    }

    pub fn select_theme_next(&mut self) {
        if self.themes.is_empty() {
            return;
        }
        self.theme_selected = (self.theme_selected + 1) % self.themes.len();
    }

    pub fn select_theme_prev(&mut self) {
        if self.themes.is_empty() {
            return;
        }
        self.theme_selected = self
            .theme_selected
            .checked_sub(1)
            .unwrap_or(self.themes.len() - 1);
    }

    pub fn select_theme_id(&mut self, theme_id: i64) {
        if let Some(idx) = self.themes.iter().position(|t| t.id == theme_id) {
            self.theme_selected = idx;
        }
    }

    /// `General` first, then one tab per known theme.
    pub fn leaderboard_tabs(&self) -> Vec<LeaderboardTheme> {
        std::iter::once(LeaderboardTheme::General)
            .chain(self.themes.iter().map(|t| LeaderboardTheme::Theme(t.id)))
            .collect()
    }

    pub fn leaderboard_tab_label(&self, tab: LeaderboardTheme) -> String {
        match tab {
            LeaderboardTheme::General => "General".to_string(),
            LeaderboardTheme::Theme(id) => self
                .themes
                .iter()
                .find(|t| t.id == id)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| format!("Theme {id}")),
        }
    }
}

/// Results flowing back to the UI thread.
#[derive(Debug, Clone)]
pub enum Delta {
    LoggedIn {
        username: String,
        response: ApiResponse<LoginData>,
    },
    Registered(ApiResponse<Empty>),
    Themes(ApiResponse<ThemesData>),
    GameStarted(ApiResponse<StartGameData>),
    AnswerChecked(ApiResponse<AnswerData>),
    Leaderboard {
        theme: LeaderboardTheme,
        response: ApiResponse<LeaderboardData>,
    },
    RoomCreated(ApiResponse<CreateRoomData>),
    RoomJoined {
        room_code: String,
        response: ApiResponse<Empty>,
    },
    RoomPlayers {
        room_code: String,
        response: ApiResponse<RoomPlayersData>,
    },
    DuelStarted(ApiResponse<StartDuelData>),
    Log(String),
}

/// Requests for the background worker.
#[derive(Debug, Clone)]
pub enum Command {
    Login {
        username: String,
        password: String,
    },
    Register {
        username: String,
        password: String,
    },
    FetchThemes,
    StartGame {
        theme_id: Option<i64>,
        user_id: i64,
    },
    SubmitAnswer {
        game_id: String,
        answer: Option<String>,
        time_taken: f64,
    },
    FetchLeaderboard {
        theme: LeaderboardTheme,
    },
    CreateRoom {
        theme_id: Option<i64>,
        user_id: i64,
    },
    JoinRoom {
        room_code: String,
        user_id: i64,
    },
    StartDuel {
        room_code: String,
        user_id: i64,
    },
}

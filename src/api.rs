use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

use crate::config::Config;
use crate::http_client::http_client;

/// Message carried by every response synthesized from a transport failure.
pub const CONNECTION_ERROR: &str = "connection error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Envelope shared by every endpoint: `status`, an optional `message`, and the
/// endpoint-specific fields flattened next to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: Status::Success,
            message: None,
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn error_message(&self) -> &str {
        self.message.as_deref().unwrap_or("unknown error")
    }
}

impl<T: Default> ApiResponse<T> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            data: T::default(),
        }
    }

    pub fn connection_error() -> Self {
        Self::error(CONNECTION_ERROR)
    }

    pub fn is_connection_error(&self) -> bool {
        self.status == Status::Error && self.message.as_deref() == Some(CONNECTION_ERROR)
    }
}

/// The one error policy of the client: transport failures never reach the
/// caller, they are reported through `on_error` and replaced by the fixed
/// connection error.
pub fn or_connection_error<T: Default>(
    result: Result<ApiResponse<T>>,
    on_error: impl FnOnce(&anyhow::Error),
) -> ApiResponse<T> {
    match result {
        Ok(response) => response,
        Err(err) => {
            on_error(&err);
            ApiResponse::connection_error()
        }
    }
}

pub fn parse_response<T: DeserializeOwned>(raw: &str) -> Result<ApiResponse<T>> {
    serde_json::from_str(raw.trim()).context("invalid api response json")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoginData {
    #[serde(deserialize_with = "lenient_id")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThemesData {
    pub themes: Vec<Theme>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StartGameData {
    pub game_id: Option<String>,
    pub question: Option<Question>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnswerData {
    pub is_correct: bool,
    pub correct_answer: Option<String>,
    pub points: i64,
    pub time_taken: f64,
    pub next_question: Option<Question>,
    pub game_finished: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LeaderboardData {
    pub scores: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CreateRoomData {
    pub room_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoomPlayersData {
    pub players: Vec<RoomPlayer>,
    pub is_host: bool,
    pub game_started: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StartDuelData {
    pub game_id: Option<String>,
    pub first_question: Option<Question>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "(i64, String)")]
pub struct Theme {
    pub id: i64,
    pub name: String,
}

impl From<(i64, String)> for Theme {
    fn from((id, name): (i64, String)) -> Self {
        Self { id, name }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoomPlayer {
    #[serde(deserialize_with = "lenient_id")]
    pub user_id: Option<i64>,
    pub username: String,
    pub is_host: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    /// Two proposed answers.
    Dual,
    /// Four proposed answers.
    Quad,
    /// No proposals, free text.
    Open,
}

impl QuestionKind {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Dual),
            3 => Some(Self::Quad),
            5 => Some(Self::Open),
            _ => None,
        }
    }

    pub fn base_points(self) -> i64 {
        match self {
            Self::Dual => 1,
            Self::Quad => 3,
            Self::Open => 5,
        }
    }
}

/// A question as sent by the server: a raw database row
/// `[id, theme_id, type, points, text, correct, wrong1, wrong2, wrong3, ...]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub struct Question {
    pub id: Option<i64>,
    pub theme_id: Option<i64>,
    pub kind: QuestionKind,
    pub points: i64,
    pub text: String,
    pub correct_answer: String,
    pub wrong_answers: Vec<String>,
}

impl Question {
    /// Correct answer followed by the wrong ones; empty for open questions.
    pub fn proposals(&self) -> Vec<String> {
        if self.kind == QuestionKind::Open {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(self.wrong_answers.len() + 1);
        out.push(self.correct_answer.clone());
        out.extend(self.wrong_answers.iter().cloned());
        out
    }
}

impl TryFrom<Value> for Question {
    type Error = String;

    fn try_from(raw: Value) -> Result<Self, Self::Error> {
        let Value::Array(row) = raw else {
            return Err("question row must be an array".to_string());
        };
        let int_at = |idx: usize| row.get(idx).and_then(Value::as_i64);
        let str_at = |idx: usize| {
            row.get(idx)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let kind = int_at(2)
            .and_then(QuestionKind::from_code)
            .ok_or_else(|| format!("unknown question type {:?}", row.get(2)))?;
        let text = str_at(4).ok_or_else(|| "question row has no text".to_string())?;
        let correct_answer =
            str_at(5).ok_or_else(|| "question row has no correct answer".to_string())?;
        let wrong_answers = (6..=8).filter_map(str_at).collect();

        Ok(Self {
            id: int_at(0),
            theme_id: int_at(1),
            kind,
            points: int_at(3).unwrap_or(kind.base_points()),
            text,
            correct_answer,
            wrong_answers,
        })
    }
}

/// Rows are `[username, score, total_time]` for one theme and
/// `[username, theme_name, score, total_time]` for the general board.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct LeaderboardEntry {
    pub username: String,
    pub theme_name: Option<String>,
    pub score: i64,
    pub total_time: f64,
}

impl TryFrom<Value> for LeaderboardEntry {
    type Error = String;

    fn try_from(raw: Value) -> Result<Self, Self::Error> {
        let Value::Array(row) = raw else {
            return Err("leaderboard row must be an array".to_string());
        };
        let text = |v: &Value| v.as_str().map(str::to_string);
        let number = |v: &Value| v.as_f64();

        let (username, theme_name, score, total_time) = match row.as_slice() {
            [user, score, time] => (text(user), None, number(score), number(time)),
            [user, theme, score, time] => (text(user), text(theme), number(score), number(time)),
            _ => return Err(format!("unexpected leaderboard row length {}", row.len())),
        };

        Ok(Self {
            username: username.ok_or_else(|| "leaderboard row has no username".to_string())?,
            theme_name,
            score: score.map(|s| s.round() as i64).unwrap_or_default(),
            total_time: total_time.unwrap_or_default(),
        })
    }
}

/// The `theme` query parameter of the leaderboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LeaderboardTheme {
    #[default]
    General,
    Theme(i64),
}

impl fmt::Display for LeaderboardTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::General => f.write_str("general"),
            Self::Theme(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for LeaderboardTheme {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("general") {
            return Ok(Self::General);
        }
        raw.parse::<i64>()
            .map(Self::Theme)
            .map_err(|_| anyhow!("theme must be `general` or a numeric id, got {raw:?}"))
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }))
}

/// One call per endpoint. Implementations report transport failures as `Err`;
/// callers settle them with [`or_connection_error`].
pub trait QuizApi: Send + Sync {
    fn login(&self, username: &str, password: &str) -> Result<ApiResponse<LoginData>>;
    fn register(&self, username: &str, password: &str) -> Result<ApiResponse<Empty>>;
    fn themes(&self) -> Result<ApiResponse<ThemesData>>;
    fn start_game(&self, theme_id: Option<i64>, user_id: i64)
    -> Result<ApiResponse<StartGameData>>;
    fn submit_answer(
        &self,
        game_id: &str,
        answer: Option<&str>,
        time_taken: f64,
    ) -> Result<ApiResponse<AnswerData>>;
    fn leaderboard(&self, theme: LeaderboardTheme) -> Result<ApiResponse<LeaderboardData>>;
    fn create_duel_room(
        &self,
        theme_id: Option<i64>,
        user_id: i64,
    ) -> Result<ApiResponse<CreateRoomData>>;
    fn join_duel_room(&self, room_code: &str, user_id: i64) -> Result<ApiResponse<Empty>>;
    fn room_players(&self, room_code: &str, user_id: i64)
    -> Result<ApiResponse<RoomPlayersData>>;
    fn start_duel(&self, room_code: &str, user_id: i64) -> Result<ApiResponse<StartDuelData>>;
}

pub struct HttpQuizApi {
    client: &'static Client,
    base_url: String,
}

impl HttpQuizApi {
    pub fn new(client: &'static Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http_client(config.http_timeout)?;
        Ok(Self::new(client, &config.api_base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<ApiResponse<T>> {
        // `json` sets the content type.
        let req = self.client.post(self.url(path)).json(&body);
        send(req, path)
    }

    fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>> {
        let req = self
            .client
            .get(self.url(path))
            .header(CONTENT_TYPE, "application/json")
            .query(query);
        send(req, path)
    }
}

fn send<T: DeserializeOwned>(req: RequestBuilder, path: &str) -> Result<ApiResponse<T>> {
    let resp = req
        .header(ACCEPT, "application/json")
        .send()
        .with_context(|| format!("request to /{path} failed"))?;
    let status = resp.status();
    let body = resp.text().context("failed reading body")?;
    // The body is authoritative even on non-2xx; only an unreadable one is a failure.
    parse_response(&body).with_context(|| format!("/{path} answered http {status}"))
}

impl QuizApi for HttpQuizApi {
    fn login(&self, username: &str, password: &str) -> Result<ApiResponse<LoginData>> {
        self.post(
            "login",
            json!({ "username": username, "password": password }),
        )
    }

    fn register(&self, username: &str, password: &str) -> Result<ApiResponse<Empty>> {
        self.post(
            "register",
            json!({ "username": username, "password": password }),
        )
    }

    fn themes(&self) -> Result<ApiResponse<ThemesData>> {
        self.get("themes", &[])
    }

    fn start_game(
        &self,
        theme_id: Option<i64>,
        user_id: i64,
    ) -> Result<ApiResponse<StartGameData>> {
        self.post(
            "start_game",
            json!({ "theme_id": theme_id, "user_id": user_id }),
        )
    }

    fn submit_answer(
        &self,
        game_id: &str,
        answer: Option<&str>,
        time_taken: f64,
    ) -> Result<ApiResponse<AnswerData>> {
        self.post(
            "submit_answer",
            json!({ "game_id": game_id, "answer": answer, "time_taken": time_taken }),
        )
    }

    fn leaderboard(&self, theme: LeaderboardTheme) -> Result<ApiResponse<LeaderboardData>> {
        self.get("leaderboard", &[("theme", theme.to_string())])
    }

    fn create_duel_room(
        &self,
        theme_id: Option<i64>,
        user_id: i64,
    ) -> Result<ApiResponse<CreateRoomData>> {
        self.post(
            "create_duel_room",
            json!({ "theme_id": theme_id, "user_id": user_id }),
        )
    }

    fn join_duel_room(&self, room_code: &str, user_id: i64) -> Result<ApiResponse<Empty>> {
        self.post(
            "join_duel_room",
            json!({ "room_code": room_code, "user_id": user_id }),
        )
    }

    fn room_players(
        &self,
        room_code: &str,
        user_id: i64,
    ) -> Result<ApiResponse<RoomPlayersData>> {
        self.get(
            "room_players",
            &[
                ("room_code", room_code.to_string()),
                ("user_id", user_id.to_string()),
            ],
        )
    }

    fn start_duel(&self, room_code: &str, user_id: i64) -> Result<ApiResponse<StartDuelData>> {
        self.post(
            "start_duel",
            json!({ "room_code": room_code, "user_id": user_id }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaderboard_theme_round_trips_query_value() {
        assert_eq!(LeaderboardTheme::General.to_string(), "general");
        assert_eq!(LeaderboardTheme::Theme(4).to_string(), "4");
        assert_eq!(
            "General".parse::<LeaderboardTheme>().unwrap(),
            LeaderboardTheme::General
        );
        assert_eq!(
            "12".parse::<LeaderboardTheme>().unwrap(),
            LeaderboardTheme::Theme(12)
        );
        assert!("sports".parse::<LeaderboardTheme>().is_err());
    }

    #[test]
    fn question_row_skips_null_wrong_answers() {
        let row = json!([7, 2, 3, 3, "Capital of Peru?", "Lima", "Quito", null, "Bogota", 0, null]);
        let q = Question::try_from(row).unwrap();
        assert_eq!(q.kind, QuestionKind::Quad);
        assert_eq!(q.wrong_answers, vec!["Quito".to_string(), "Bogota".to_string()]);
        assert_eq!(q.proposals().len(), 3);
    }

    #[test]
    fn open_question_has_no_proposals() {
        let row = json!([1, 1, 5, 5, "Year of the moon landing?", "1969", null, null, null]);
        let q = Question::try_from(row).unwrap();
        assert_eq!(q.kind, QuestionKind::Open);
        assert!(q.proposals().is_empty());
    }

    #[test]
    fn unknown_question_type_is_rejected() {
        let row = json!([1, 1, 9, 5, "?", "x"]);
        assert!(Question::try_from(row).is_err());
    }

    #[test]
    fn lenient_ids_accept_numeric_strings() {
        let parsed: ApiResponse<LoginData> =
            parse_response(r#"{"status":"success","user_id":"42"}"#).unwrap();
        assert_eq!(parsed.data.user_id, Some(42));
    }
}

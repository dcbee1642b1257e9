use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use chrono::Utc;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::api::{
    AnswerData, ApiResponse, CreateRoomData, Empty, LeaderboardData, LeaderboardEntry,
    LeaderboardTheme, LoginData, Question, QuestionKind, QuizApi, RoomPlayer, RoomPlayersData,
    StartDuelData, StartGameData, Status, Theme, ThemesData,
};

const MAX_ROOM_PLAYERS: usize = 6;
const ANSWER_WINDOW_SECS: f64 = 30.0;
const MAX_TIME_BONUS: f64 = 0.2;
const LEADERBOARD_LIMIT: usize = 10;
const DEMO_USER: (&str, &str) = ("demo", "demo");
const BOT_USER_ID: i64 = 0;
const BOT_USERNAME: &str = "duel-bot";

/// In-memory stand-in for the quiz API, used with `QUIZ_OFFLINE=1` and in
/// tests. Answers with the same shapes as the real endpoints.
pub struct OfflineQuizApi {
    data: Mutex<OfflineData>,
}

struct OfflineUser {
    id: i64,
    username: String,
    password: String,
}

struct OfflineGame {
    user_id: i64,
    theme_id: Option<i64>,
    questions: Vec<Question>,
    current: usize,
    score: i64,
    total_time: f64,
}

struct OfflineRoom {
    theme_id: Option<i64>,
    players: Vec<i64>,
    playing: bool,
    polls: u32,
}

struct ScoreRow {
    user_id: i64,
    theme_id: Option<i64>,
    score: i64,
    total_time: f64,
}

struct OfflineData {
    users: Vec<OfflineUser>,
    themes: Vec<Theme>,
    questions: Vec<Question>,
    games: HashMap<String, OfflineGame>,
    rooms: HashMap<String, OfflineRoom>,
    scores: Vec<ScoreRow>,
    game_seq: u64,
}

impl Default for OfflineQuizApi {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineQuizApi {
    pub fn new() -> Self {
        let users = vec![
            OfflineUser {
                id: BOT_USER_ID,
                username: BOT_USERNAME.to_string(),
                password: String::new(),
            },
            OfflineUser {
                id: 1,
                username: DEMO_USER.0.to_string(),
                password: DEMO_USER.1.to_string(),
            },
        ];
        Self {
            data: Mutex::new(OfflineData {
                users,
                themes: seed_themes(),
                questions: seed_questions(),
                games: HashMap::new(),
                rooms: HashMap::new(),
                scores: Vec::new(),
                game_seq: 0,
            }),
        }
    }

    fn data(&self) -> Result<MutexGuard<'_, OfflineData>> {
        self.data
            .lock()
            .map_err(|_| anyhow!("offline state lock poisoned"))
    }
}

impl OfflineData {
    fn username(&self, user_id: i64) -> Option<&str> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.username.as_str())
    }

    fn theme_name(&self, theme_id: Option<i64>) -> String {
        theme_id
            .and_then(|id| self.themes.iter().find(|t| t.id == id))
            .map(|t| t.name.clone())
            .unwrap_or_else(|| "-".to_string())
    }

    fn open_game(&mut self, theme_id: Option<i64>, user_id: i64) -> Option<(String, Question)> {
        let mut questions = self
            .questions
            .iter()
            .filter(|q| q.theme_id == theme_id)
            .cloned()
            .collect::<Vec<_>>();
        questions.shuffle(&mut rand::thread_rng());
        let first = questions.first()?.clone();

        self.game_seq += 1;
        let game_id = format!(
            "game_{}_{}_{}",
            Utc::now().timestamp(),
            user_id,
            self.game_seq
        );
        self.games.insert(
            game_id.clone(),
            OfflineGame {
                user_id,
                theme_id,
                questions,
                current: 0,
                score: 0,
                total_time: 0.0,
            },
        );
        Some((game_id, first))
    }
}

/// Base points plus up to 20% for answering early.
fn score_answer(base: i64, time_taken: f64) -> i64 {
    let bonus = ((ANSWER_WINDOW_SECS - time_taken) / ANSWER_WINDOW_SECS * MAX_TIME_BONUS).max(0.0);
    (base as f64 * (1.0 + bonus)) as i64
}

impl QuizApi for OfflineQuizApi {
    fn login(&self, username: &str, password: &str) -> Result<ApiResponse<LoginData>> {
        let data = self.data()?;
        let user = data
            .users
            .iter()
            .filter(|u| u.id != BOT_USER_ID)
            .find(|u| u.username == username && u.password == password);
        Ok(match user {
            Some(user) => ApiResponse::success(LoginData {
                user_id: Some(user.id),
            }),
            None => ApiResponse::error("Invalid credentials"),
        })
    }

    fn register(&self, username: &str, password: &str) -> Result<ApiResponse<Empty>> {
        let mut data = self.data()?;
        if data.users.iter().any(|u| u.username == username) {
            return Ok(ApiResponse::error("Username already taken"));
        }
        let id = data.users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        data.users.push(OfflineUser {
            id,
            username: username.to_string(),
            password: password.to_string(),
        });
        Ok(ApiResponse::success(Empty {}))
    }

    fn themes(&self) -> Result<ApiResponse<ThemesData>> {
        let data = self.data()?;
        Ok(ApiResponse::success(ThemesData {
            themes: data.themes.clone(),
        }))
    }

    fn start_game(
        &self,
        theme_id: Option<i64>,
        user_id: i64,
    ) -> Result<ApiResponse<StartGameData>> {
        if theme_id.is_none() {
            return Ok(ApiResponse::error("Missing data"));
        }
        let mut data = self.data()?;
        Ok(match data.open_game(theme_id, user_id) {
            Some((game_id, question)) => ApiResponse::success(StartGameData {
                game_id: Some(game_id),
                question: Some(question),
            }),
            None => ApiResponse::error("Not enough questions available"),
        })
    }

    fn submit_answer(
        &self,
        game_id: &str,
        answer: Option<&str>,
        time_taken: f64,
    ) -> Result<ApiResponse<AnswerData>> {
        let mut data = self.data()?;
        let Some(game) = data.games.get_mut(game_id) else {
            return Ok(ApiResponse::error("Game not found"));
        };
        let Some(question) = game.questions.get(game.current).cloned() else {
            return Ok(ApiResponse::error("Game already finished"));
        };

        let is_correct =
            answer.is_some_and(|a| a.trim().eq_ignore_ascii_case(&question.correct_answer));
        let points = if is_correct {
            score_answer(question.points, time_taken)
        } else {
            0
        };
        game.score += points;
        game.total_time += time_taken;
        game.current += 1;
        let next_question = game.questions.get(game.current).cloned();

        if next_question.is_none() {
            let row = ScoreRow {
                user_id: game.user_id,
                theme_id: game.theme_id,
                score: game.score,
                total_time: game.total_time,
            };
            data.scores.push(row);
        }

        Ok(ApiResponse::success(AnswerData {
            is_correct,
            correct_answer: Some(question.correct_answer),
            points,
            time_taken,
            game_finished: next_question.is_none(),
            next_question,
        }))
    }

    fn leaderboard(&self, theme: LeaderboardTheme) -> Result<ApiResponse<LeaderboardData>> {
        let data = self.data()?;
        let mut rows = data
            .scores
            .iter()
            .filter(|row| match theme {
                LeaderboardTheme::General => true,
                LeaderboardTheme::Theme(id) => row.theme_id == Some(id),
            })
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.total_time.total_cmp(&b.total_time))
        });

        let scores = rows
            .into_iter()
            .take(LEADERBOARD_LIMIT)
            .map(|row| LeaderboardEntry {
                username: data.username(row.user_id).unwrap_or("?").to_string(),
                theme_name: match theme {
                    LeaderboardTheme::General => Some(data.theme_name(row.theme_id)),
                    LeaderboardTheme::Theme(_) => None,
                },
                score: row.score,
                total_time: row.total_time,
            })
            .collect();
        Ok(ApiResponse::success(LeaderboardData { scores }))
    }

    fn create_duel_room(
        &self,
        theme_id: Option<i64>,
        user_id: i64,
    ) -> Result<ApiResponse<CreateRoomData>> {
        let mut data = self.data()?;
        let mut rng = rand::thread_rng();
        let mut code = rng.gen_range(1000..=9999).to_string();
        while data.rooms.contains_key(&code) {
            code = rng.gen_range(1000..=9999).to_string();
        }
        data.rooms.insert(
            code.clone(),
            OfflineRoom {
                theme_id,
                players: vec![user_id],
                playing: false,
                polls: 0,
            },
        );
        Ok(ApiResponse::success(CreateRoomData {
            room_code: Some(code),
        }))
    }

    fn join_duel_room(&self, room_code: &str, user_id: i64) -> Result<ApiResponse<Empty>> {
        let mut data = self.data()?;
        let Some(room) = data.rooms.get_mut(room_code) else {
            return Ok(ApiResponse::error("Room not found"));
        };
        if room.playing {
            return Ok(ApiResponse::error("Room no longer accepts players"));
        }
        if room.players.len() >= MAX_ROOM_PLAYERS {
            return Ok(ApiResponse::error("Room is full"));
        }
        if !room.players.contains(&user_id) {
            room.players.push(user_id);
        }
        Ok(ApiResponse::success(Empty {}))
    }

    fn room_players(
        &self,
        room_code: &str,
        user_id: i64,
    ) -> Result<ApiResponse<RoomPlayersData>> {
        let mut data = self.data()?;
        let Some(room) = data.rooms.get_mut(room_code) else {
            return Ok(ApiResponse::error("Room not found"));
        };
        room.polls += 1;
        // Nobody else is around offline, so a bot takes the second seat.
        if room.polls > 1 && !room.playing && !room.players.contains(&BOT_USER_ID) {
            room.players.push(BOT_USER_ID);
        }

        let ids = room.players.clone();
        let game_started = room.playing;
        let host = ids.first().copied();
        let players = ids
            .iter()
            .filter_map(|id| {
                data.username(*id).map(|name| RoomPlayer {
                    user_id: Some(*id),
                    username: name.to_string(),
                    is_host: Some(*id) == host,
                })
            })
            .collect();

        Ok(ApiResponse::success(RoomPlayersData {
            players,
            is_host: host == Some(user_id),
            game_started,
        }))
    }

    fn start_duel(&self, room_code: &str, user_id: i64) -> Result<ApiResponse<StartDuelData>> {
        let mut data = self.data()?;
        let Some(room) = data.rooms.get_mut(room_code) else {
            return Ok(ApiResponse::error("Room not found"));
        };
        if room.players.first() != Some(&user_id) {
            return Ok(ApiResponse::error("Only the host can start the game"));
        }
        if room.players.len() < 2 {
            return Ok(ApiResponse::error("At least 2 players are needed to start"));
        }
        room.playing = true;
        let theme_id = room.theme_id;

        let Some((game_id, first_question)) = data.open_game(theme_id, user_id) else {
            return Ok(ApiResponse::error("Not enough questions available"));
        };
        Ok(ApiResponse {
            status: Status::Success,
            message: Some("The game is starting".to_string()),
            data: StartDuelData {
                game_id: Some(game_id),
                first_question: Some(first_question),
            },
        })
    }
}

fn seed_themes() -> Vec<Theme> {
    vec![
        Theme {
            id: 1,
            name: "Geography".to_string(),
        },
        Theme {
            id: 2,
            name: "Science".to_string(),
        },
    ]
}

fn seed_questions() -> Vec<Question> {
    vec![
        question(1, 1, QuestionKind::Open, "Capital of Australia?", "Canberra", &[]),
        question(
            2,
            1,
            QuestionKind::Quad,
            "Longest river in Africa?",
            "Nile",
            &["Congo", "Niger", "Zambezi"],
        ),
        question(
            3,
            1,
            QuestionKind::Dual,
            "Is Iceland larger than Ireland?",
            "Yes",
            &["No"],
        ),
        question(4, 2, QuestionKind::Open, "Chemical symbol for gold?", "Au", &[]),
        question(
            5,
            2,
            QuestionKind::Quad,
            "Which planet is closest to the sun?",
            "Mercury",
            &["Venus", "Mars", "Earth"],
        ),
        question(
            6,
            2,
            QuestionKind::Dual,
            "Does sound travel faster in water than in air?",
            "Yes",
            &["No"],
        ),
    ]
}

fn question(
    id: i64,
    theme_id: i64,
    kind: QuestionKind,
    text: &str,
    correct: &str,
    wrong: &[&str],
) -> Question {
    Question {
        id: Some(id),
        theme_id: Some(theme_id),
        kind,
        points: kind.base_points(),
        text: text.to_string(),
        correct_answer: correct.to_string(),
        wrong_answers: wrong.iter().map(|w| w.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_answers_earn_a_bonus() {
        assert_eq!(score_answer(5, 0.0), 6);
        assert_eq!(score_answer(5, 30.0), 5);
        assert_eq!(score_answer(5, 45.0), 5);
        assert_eq!(score_answer(3, 15.0), 3);
    }

    #[test]
    fn duel_room_lifecycle() {
        let api = OfflineQuizApi::new();
        let code = api
            .create_duel_room(Some(2), 1)
            .unwrap()
            .data
            .room_code
            .expect("room code");
        assert_eq!(code.len(), 4);

        let early = api.start_duel(&code, 1).unwrap();
        assert!(!early.is_success());

        let first = api.room_players(&code, 1).unwrap();
        assert_eq!(first.data.players.len(), 1);
        assert!(first.data.is_host);
        let second = api.room_players(&code, 1).unwrap();
        assert_eq!(second.data.players.len(), 2);
        assert!(second.data.players[0].is_host);

        assert!(!api.start_duel(&code, BOT_USER_ID).unwrap().is_success());
        let started = api.start_duel(&code, 1).unwrap();
        assert!(started.is_success());
        assert!(started.data.first_question.is_some());

        let late = api.join_duel_room(&code, 7).unwrap();
        assert_eq!(late.error_message(), "Room no longer accepts players");
        assert!(api.room_players(&code, 1).unwrap().data.game_started);
    }

    #[test]
    fn finished_game_reaches_the_leaderboard() {
        let api = OfflineQuizApi::new();
        let start = api.start_game(Some(1), 1).unwrap();
        let game_id = start.data.game_id.expect("game id");
        let mut next = start.data.question;
        while let Some(q) = next {
            let reply = api
                .submit_answer(&game_id, Some(q.correct_answer.as_str()), 0.0)
                .unwrap();
            assert!(reply.data.is_correct);
            next = reply.data.next_question;
        }

        let general = api.leaderboard(LeaderboardTheme::General).unwrap();
        assert_eq!(general.data.scores.len(), 1);
        assert_eq!(general.data.scores[0].username, "demo");
        assert_eq!(general.data.scores[0].theme_name.as_deref(), Some("Geography"));
        let science = api.leaderboard(LeaderboardTheme::Theme(2)).unwrap();
        assert!(science.data.scores.is_empty());
    }
}

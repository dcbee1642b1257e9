use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ROOM_POLL_MS: u64 = 2000;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub http_timeout: Duration,
    pub room_poll_interval: Duration,
    pub session_path: Option<PathBuf>,
    pub offline: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            room_poll_interval: Duration::from_millis(DEFAULT_ROOM_POLL_MS),
            session_path: None,
            offline: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let api_base_url = env::var("QUIZ_API_BASE_URL")
            .ok()
            .map(|val| val.trim().trim_end_matches('/').to_string())
            .filter(|val| !val.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let http_timeout = env_u64("QUIZ_HTTP_TIMEOUT_SECS")
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)
            .max(1);
        let room_poll_ms = env_u64("QUIZ_ROOM_POLL_MS")
            .unwrap_or(DEFAULT_ROOM_POLL_MS)
            .max(250);
        let session_path = env::var("QUIZ_SESSION_FILE")
            .ok()
            .filter(|val| !val.trim().is_empty())
            .map(PathBuf::from);
        let offline = env::var("QUIZ_OFFLINE")
            .map(|val| parse_flag(&val))
            .unwrap_or(false);

        Self {
            api_base_url,
            http_timeout: Duration::from_secs(http_timeout),
            room_poll_interval: Duration::from_millis(room_poll_ms),
            session_path,
            offline,
        }
    }
}

/// Loads `.env.local` first so it shadows `.env`.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|val| val.trim().parse::<u64>().ok())
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

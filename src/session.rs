use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

const SESSION_DIR: &str = "quiz_terminal";
const SESSION_FILE: &str = "session.json";
const SESSION_VERSION: u32 = 1;

/// Small client-side state that survives restarts. Nothing here is
/// authoritative; every field is round-tripped to the server as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub current_theme_id: Option<i64>,
    #[serde(default)]
    pub current_game_id: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn sign_in(&mut self, user_id: i64, username: &str) {
        self.user_id = Some(user_id);
        self.username = Some(username.to_string());
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    #[serde(default)]
    saved_at: Option<String>,
    session: Session,
}

/// Where the session lives. `None` keeps it in memory only.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: Option<PathBuf>,
}

impl SessionStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn memory() -> Self {
        Self { path: None }
    }

    /// Explicit path if given, otherwise the per-user config location.
    pub fn resolve(path: Option<PathBuf>) -> Self {
        Self {
            path: path.or_else(default_session_path),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Missing, unreadable or outdated files yield an empty session.
    pub fn load(&self) -> Session {
        let Some(path) = self.path.as_deref() else {
            return Session::default();
        };
        let Ok(raw) = fs::read_to_string(path) else {
            return Session::default();
        };
        let Ok(file) = serde_json::from_str::<SessionFile>(&raw) else {
            return Session::default();
        };
        if file.version != SESSION_VERSION {
            return Session::default();
        }
        file.session
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("create session dir {}", dir.display()))?;
        }
        let file = SessionFile {
            version: SESSION_VERSION,
            saved_at: Some(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            session: session.clone(),
        };
        let json = serde_json::to_string_pretty(&file).context("serialize session")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).context("write session")?;
        fs::rename(&tmp, path).context("swap session")?;
        Ok(())
    }
}

fn default_session_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CONFIG_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(SESSION_DIR).join(SESSION_FILE));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(SESSION_DIR)
            .join(SESSION_FILE),
    )
}

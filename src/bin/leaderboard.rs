use std::process::ExitCode;

use anyhow::{Context, Result};

use quiz_terminal::api::{HttpQuizApi, LeaderboardTheme, QuizApi, or_connection_error};
use quiz_terminal::config::{Config, load_dotenv};
use quiz_terminal::offline::OfflineQuizApi;
use quiz_terminal::ui::leaderboard_text;

fn main() -> Result<ExitCode> {
    load_dotenv();
    let config = Config::from_env();
    let theme = parse_theme_arg()?.unwrap_or_default();

    let api: Box<dyn QuizApi> = if config.offline {
        Box::new(OfflineQuizApi::new())
    } else {
        Box::new(HttpQuizApi::from_config(&config).context("api client setup")?)
    };

    let response = or_connection_error(api.leaderboard(theme), |err| {
        eprintln!("leaderboard request failed: {err:#}");
    });
    if !response.is_success() {
        eprintln!("error: {}", response.error_message());
        return Ok(ExitCode::FAILURE);
    }

    println!("Leaderboard ({theme})");
    println!("{}", leaderboard_text(&response.data.scores));
    Ok(ExitCode::SUCCESS)
}

fn parse_theme_arg() -> Result<Option<LeaderboardTheme>> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix("--theme=") {
            return value.parse().map(Some);
        }
        if arg == "--theme" {
            let value = args.get(idx + 1).context("--theme needs a value")?;
            return value.parse().map(Some);
        }
    }
    Ok(None)
}

use std::io;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::Backend;

use quiz_terminal::api::{HttpQuizApi, QuizApi};
use quiz_terminal::app::App;
use quiz_terminal::config::{Config, load_dotenv};
use quiz_terminal::offline::OfflineQuizApi;
use quiz_terminal::session::SessionStore;
use quiz_terminal::state::Delta;
use quiz_terminal::ui;
use quiz_terminal::worker::spawn_worker;

fn main() -> Result<()> {
    load_dotenv();
    let config = Config::from_env();

    let api: Arc<dyn QuizApi> = if config.offline {
        Arc::new(OfflineQuizApi::new())
    } else {
        Arc::new(HttpQuizApi::from_config(&config).context("api client setup")?)
    };
    let store = SessionStore::resolve(config.session_path.clone());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    spawn_worker(Arc::clone(&api), tx.clone(), cmd_rx);

    let mut app = App::new(api, store, &config, Some(cmd_tx), tx);
    if config.offline {
        app.state
            .push_log("[INFO] Offline demo backend (user demo / demo)");
    } else {
        app.state
            .push_log(format!("[INFO] API at {}", config.api_base_url));
    }
    let res = run_app(&mut terminal, &mut app, rx);
    drop(app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        while let Ok(delta) = rx.try_recv() {
            app.apply_delta(delta);
        }

        terminal.draw(|f| ui::draw(f, &app.state, &app.session))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.on_key(key);
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

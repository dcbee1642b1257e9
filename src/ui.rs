use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Tabs, Wrap};

use crate::api::{LeaderboardEntry, RoomPlayer};
use crate::duel::player_list_lines;
use crate::session::Session;
use crate::state::{AppState, LoginField, QuizView, Screen};

pub fn draw(frame: &mut Frame, state: &AppState, session: &Session) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(5),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(state, session))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    match state.screen {
        Screen::Login => render_login(frame, chunks[1], state),
        Screen::Menu => render_menu(frame, chunks[1], state, session),
        Screen::CreateRoom => {
            let waiting = Paragraph::new("Creating room...")
                .style(Style::default().fg(Color::DarkGray))
                .block(Block::default().title("Duel").borders(Borders::ALL));
            frame.render_widget(waiting, chunks[1]);
        }
        Screen::JoinRoom => render_join_room(frame, chunks[1], state),
        Screen::WaitingRoom => render_waiting_room(frame, chunks[1], state),
        Screen::Quiz => render_quiz(frame, chunks[1], &state.quiz),
        Screen::Leaderboard => render_leaderboard(frame, chunks[1], state),
    }

    let console = Paragraph::new(console_text(state))
        .block(Block::default().title("Console").borders(Borders::ALL));
    frame.render_widget(console, chunks[2]);

    let footer = Paragraph::new(footer_text(state)).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(footer, chunks[3]);

    if state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
    if let Some(msg) = &state.alert {
        render_alert(frame, frame.size(), msg);
    }
}

fn header_text(state: &AppState, session: &Session) -> String {
    let user = session
        .username
        .as_deref()
        .filter(|_| session.is_authenticated())
        .unwrap_or("not signed in");
    format!(
        "  ?  QUIZ | {} | {user}\n (_) ",
        screen_label(state.screen)
    )
}

fn screen_label(screen: Screen) -> &'static str {
    match screen {
        Screen::Login => "LOGIN",
        Screen::Menu => "MENU",
        Screen::CreateRoom => "CREATE ROOM",
        Screen::JoinRoom => "JOIN ROOM",
        Screen::WaitingRoom => "WAITING ROOM",
        Screen::Quiz => "QUIZ",
        Screen::Leaderboard => "LEADERBOARD",
    }
}

fn footer_text(state: &AppState) -> &'static str {
    if state.alert.is_some() {
        return "Enter/Esc Dismiss";
    }
    match state.screen {
        Screen::Login => "Tab Switch field | Enter Login | F2 Register | Esc Quit",
        Screen::Menu => {
            "j/k/↑/↓ Theme | p Play | c Create room | r Join room | l Leaderboard | t Themes | ? Help | q Quit"
        }
        Screen::CreateRoom => "b/Esc Back",
        Screen::JoinRoom => "Enter Join | Esc Back",
        Screen::WaitingRoom => "s/Enter Start (host) | b/Esc Leave | ? Help",
        Screen::Quiz => "Enter Submit | Esc Menu",
        Screen::Leaderboard => "←/→ Theme | r Refresh | b/Esc Back | ? Help",
    }
}

fn render_login(frame: &mut Frame, area: Rect, state: &AppState) {
    let form = &state.login;
    let marker = |field: LoginField| if form.focus == field { "> " } else { "  " };
    let masked = "*".repeat(form.password.chars().count());
    let text = format!(
        "{}Username: {}\n{}Password: {}",
        marker(LoginField::Username),
        form.username,
        marker(LoginField::Password),
        masked
    );
    let panel = Paragraph::new(text).block(Block::default().title("Sign in").borders(Borders::ALL));
    frame.render_widget(panel, centered_rect(50, 40, area));
}

fn render_menu(frame: &mut Frame, area: Rect, state: &AppState, session: &Session) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let themes = Paragraph::new(theme_list_text(state, session))
        .block(Block::default().title("Themes").borders(Borders::ALL));
    frame.render_widget(themes, cols[0]);

    let actions = [
        "p  Play solo quiz",
        "c  Create duel room",
        "r  Join duel room",
        "l  Leaderboard",
    ]
    .join("\n");
    let play = Paragraph::new(actions).block(Block::default().title("Play").borders(Borders::ALL));
    frame.render_widget(play, cols[1]);
}

fn theme_list_text(state: &AppState, session: &Session) -> String {
    if state.themes.is_empty() {
        return "No themes yet (t to reload)".to_string();
    }
    state
        .themes
        .iter()
        .enumerate()
        .map(|(idx, theme)| {
            let prefix = if idx == state.theme_selected { "> " } else { "  " };
            let current = if session.current_theme_id == Some(theme.id) {
                " *"
            } else {
                ""
            };
            format!("{prefix}{}{current}", theme.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_join_room(frame: &mut Frame, area: Rect, state: &AppState) {
    let text = format!("Room code: {}_", state.room_code_input);
    let panel = Paragraph::new(text).block(Block::default().title("Join").borders(Borders::ALL));
    frame.render_widget(panel, centered_rect(40, 30, area));
}

fn render_waiting_room(frame: &mut Frame, area: Rect, state: &AppState) {
    let Some(room) = &state.room else {
        frame.render_widget(Paragraph::new("No room"), area);
        return;
    };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(1)])
        .split(area);

    let role = if room.is_host { "host" } else { "guest" };
    let start = if !room.is_host {
        "Waiting for the host to start"
    } else if room.can_start() {
        "Ready: press s to start"
    } else {
        "Start disabled: need 2 players"
    };
    let info = Paragraph::new(format!("Code: {} ({role})\n{start}", room.code))
        .block(Block::default().title("Room").borders(Borders::ALL));
    frame.render_widget(info, rows[0]);

    let players = Paragraph::new(player_list_text(&room.players))
        .block(Block::default().title("Players").borders(Borders::ALL));
    frame.render_widget(players, rows[1]);
}

pub fn player_list_text(players: &[RoomPlayer]) -> String {
    if players.is_empty() {
        return "Waiting for players...".to_string();
    }
    player_list_lines(players).join("\n")
}

fn render_quiz(frame: &mut Frame, area: Rect, quiz: &QuizView) {
    let title = if quiz.is_duel { "Duel" } else { "Quiz" };
    let panel = Paragraph::new(quiz_text(quiz))
        .wrap(Wrap { trim: false })
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(panel, area);
}

pub fn quiz_text(quiz: &QuizView) -> String {
    let mut lines = Vec::new();
    if let Some(result) = &quiz.last_result {
        let verdict = if result.is_correct { "Correct" } else { "Wrong" };
        let expected = result.correct_answer.as_deref().unwrap_or("?");
        lines.push(format!(
            "{verdict}! Answer: {expected} | +{} pts in {:.1}s",
            result.points, result.time_taken
        ));
        lines.push(String::new());
    }

    if quiz.finished {
        lines.push(format!(
            "Game over: {} pts, {}/{} correct",
            quiz.score, quiz.correct, quiz.answered
        ));
        lines.push("Press Enter to return to the menu".to_string());
        return lines.join("\n");
    }

    match &quiz.question {
        Some(question) => {
            lines.push(format!("[{} pts] {}", question.points, question.text));
            for (idx, choice) in quiz.choices.iter().enumerate() {
                lines.push(format!("  {}. {choice}", idx + 1));
            }
            lines.push(String::new());
            let status = if quiz.pending { " (checking...)" } else { "" };
            lines.push(format!("Answer: {}_{status}", quiz.answer));
            if quiz.game_id.is_none() {
                lines.push("No game was opened for this quiz; answers cannot be sent".to_string());
            }
        }
        None => lines.push("Waiting for the first question...".to_string()),
    }
    lines.push(format!("Score: {}", quiz.score));
    lines.join("\n")
}

fn render_leaderboard(frame: &mut Frame, area: Rect, state: &AppState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(area);

    let tabs = state.leaderboard_tabs();
    let active = tabs
        .iter()
        .position(|t| *t == state.leaderboard.active)
        .unwrap_or(0);
    let titles = tabs
        .iter()
        .map(|t| state.leaderboard_tab_label(*t))
        .collect::<Vec<_>>();
    let tab_bar = Tabs::new(titles)
        .select(active)
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(tab_bar, rows[0]);

    let board = Paragraph::new(leaderboard_text(&state.leaderboard.scores))
        .block(Block::default().title("Top scores").borders(Borders::ALL));
    frame.render_widget(board, rows[1]);
}

pub fn leaderboard_text(scores: &[LeaderboardEntry]) -> String {
    if scores.is_empty() {
        return "No scores yet".to_string();
    }
    scores
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let theme = row
                .theme_name
                .as_deref()
                .map(|t| format!(" [{t}]"))
                .unwrap_or_default();
            format!(
                "{:>2}. {:<16} {:>5} pts {:>7.1}s{theme}",
                idx + 1,
                row.username,
                row.score,
                row.total_time
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn console_text(state: &AppState) -> String {
    if state.logs.is_empty() {
        return "No messages yet".to_string();
    }
    let start = state.logs.len().saturating_sub(3);
    state
        .logs
        .iter()
        .skip(start)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_alert(frame: &mut Frame, area: Rect, msg: &str) {
    let popup_area = centered_rect(50, 25, area);
    frame.render_widget(Clear, popup_area);
    let alert = Paragraph::new(msg.to_string())
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title("Notice")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        );
    frame.render_widget(alert, popup_area);
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "Quiz Terminal - Help",
        "",
        "Menu:",
        "  j/k or ↑/↓   Pick theme",
        "  p            Solo quiz on the theme",
        "  c            Create a duel room",
        "  r            Join a duel room by code",
        "  l            Leaderboard",
        "",
        "Waiting room:",
        "  s            Start (host, 2+ players)",
        "  b / Esc      Leave the room",
        "",
        "  Ctrl-C       Quit from anywhere",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}

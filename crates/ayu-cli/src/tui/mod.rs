//! Interactive TUI dashboard for a live test session.

pub mod app;
mod ui;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use ayu_core::observer::Observer;
use ayu_core::runner::ProcessRunner;

use crate::config::AyuConfig;
use app::{App, View};

/// Launch the interactive TUI dashboard.
pub async fn run_dashboard(config: AyuConfig, tests_path: Option<PathBuf>) -> Result<()> {
    // Bind before touching the terminal so a busy port is a plain error.
    let observer = Observer::start(&config.channel)
        .await
        .with_context(|| format!("failed to listen on {}", config.channel.addr()))?;

    let runner = ProcessRunner::new(config.channel.clone());
    let mut app = App::new(
        observer.session().clone(),
        Arc::new(runner),
        config.runner.clone(),
        tests_path,
    );
    app.endpoint = observer.local_addr().to_string();

    // Set up terminal.
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Initial collection.
    app.refresh_collection();

    let result = run_event_loop(&mut terminal, &mut app).await;

    // Restore terminal.
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    observer.shutdown().await;
    result
}

async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    let tick_rate = app.tick_rate;

    loop {
        app.poll_run().await;
        app.sync();
        terminal.draw(|f| ui::render(f, app))?;

        // Poll for input with a timeout matching the tick rate; events from
        // the test run show up on the next redraw either way.
        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, key);
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.search.is_some() {
        match key.code {
            KeyCode::Esc => app.cancel_search(),
            KeyCode::Enter => app.confirm_search(),
            KeyCode::Backspace => app.search_pop(),
            KeyCode::Char(c) => app.search_push(c),
            _ => {}
        }
        return;
    }

    // Clear status message on any keypress.
    app.status_message = None;

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.navigate_back(),
        KeyCode::Char('j') | KeyCode::Down => app.move_down(),
        KeyCode::Char('k') | KeyCode::Up => app.move_up(),
        KeyCode::Char(' ') | KeyCode::Char('m') if app.current_view == View::Tree => {
            app.toggle_mark();
        }
        KeyCode::Enter => app.run_tests(),
        KeyCode::Char('r') => app.refresh_collection(),
        KeyCode::Char('c') => app.toggle_view(View::Coverage),
        KeyCode::Char('l') => app.toggle_view(View::Log),
        KeyCode::Char('?') => app.toggle_view(View::Help),
        KeyCode::Char('/') => {
            app.current_view = View::Tree;
            app.start_search();
        }
        KeyCode::Char('n') => app.next_match(),
        KeyCode::Char(c @ '1'..='4') => app.toggle_filter(c),
        _ => {}
    }
}

//! nettune - network and system tuning TUI for Windows
//!
//! Sets DNS, disables LSO and adapter power saving, adjusts MTU and TCP
//! timeouts, resets the network stack and runs the built-in repair tools.

use std::io;
use std::panic;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};

use nettune::app::{App, AppState, PendingOp};
use nettune::backup::BackupStore;
use nettune::config::Config;
use nettune::logging;
use nettune::modules::ModuleContext;
use nettune::system::SystemRunner;
use nettune::ui::{
    adapters::render_status_view,
    details::{render_confirmation, render_restart_prompt},
    main_menu::{render_header, render_main_menu, render_separator},
    results::render_results,
    status::{render_help, render_loading_indicator, render_status_panel},
};

#[tokio::main]
async fn main() -> Result<()> {
    if !cfg!(windows) {
        eprintln!("Error: nettune only runs on Windows.");
        std::process::exit(1);
    }

    let config = Config::load();
    let _log_guard = logging::init(&config.log_dir(), config.debug_logging)
        .context("Failed to set up logging")?;
    tracing::info!("nettune {} starting", env!("CARGO_PKG_VERSION"));

    // Set up panic hook to restore terminal on panic
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        tracing::error!("panic: {}", panic_info);
        original_hook(panic_info);
    }));

    let backups = BackupStore::new(config.backup_dir());
    let ctx = ModuleContext::new(Arc::new(SystemRunner), config, backups);

    let result = run_app(ctx).await;

    // Restore terminal on exit
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;

    if let Err(e) = &result {
        tracing::error!("Exited with error: {:#}", e);
    } else {
        tracing::info!("nettune exiting");
    }
    result
}

async fn run_app(ctx: ModuleContext) -> Result<()> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    let mut app = App::new(ctx);

    let mut interval = tokio::time::interval(Duration::from_millis(50));

    loop {
        app.poll_async_results();

        // Force quit leaves a running module behind, but waits for a restart request.
        if app.should_quit && app.pending_op != Some(PendingOp::Restarting) {
            break;
        }

        terminal.draw(|frame| {
            let size = frame.area();
            let log_height = if app.logs_expanded { 12 } else { 4 };

            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(1),          // Header
                    Constraint::Length(1),          // Separator
                    Constraint::Min(12),            // Main content
                    Constraint::Length(log_height), // Logs (collapsed/expanded)
                    Constraint::Length(1),          // Help
                ])
                .split(size);

            render_header(frame, chunks[0], &app);
            render_separator(frame, chunks[1]);

            match app.state {
                AppState::Menu => render_main_menu(frame, chunks[2], &app),
                AppState::Confirming(action) => {
                    render_main_menu(frame, chunks[2], &app);
                    render_confirmation(frame, chunks[2], &app, action);
                }
                AppState::Results => render_results(frame, chunks[2], &app),
                AppState::Status => render_status_view(frame, chunks[2], &app),
                AppState::ConfirmRestart => {
                    render_main_menu(frame, chunks[2], &app);
                    render_restart_prompt(frame, chunks[2]);
                }
            }

            if let Some(pending_op) = &app.pending_op {
                render_loading_indicator(
                    frame,
                    chunks[2],
                    &pending_op.display(),
                    app.pending_elapsed(),
                );
            }

            let log_lines = chunks[3].height.saturating_sub(1) as usize;
            render_status_panel(frame, chunks[3], &app.logs, log_lines);

            render_help(frame, chunks[4], app.help_text());
        })?;

        interval.tick().await;

        if event::poll(Duration::from_millis(0))? {
            if let Event::Key(key) = event::read()? {
                // Only handle key press events (not release)
                if key.kind == KeyEventKind::Press {
                    if key.code == KeyCode::Char('c')
                        && key.modifiers.contains(event::KeyModifiers::CONTROL)
                    {
                        break;
                    }
                    app.handle_key(key.code);
                }
            }
        }
    }

    Ok(())
}

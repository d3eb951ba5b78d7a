//! Application state and message handling (Elm architecture) with async support.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossterm::event::KeyCode;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, TuneError};
use crate::modules::{ModuleContext, ModuleId};
use crate::orchestrator::{self, SystemStatus};
use crate::report::{ModuleReport, RunSummary};
use crate::system::{is_elevated, CommandSpec};
use crate::ui::status::LogEntryLevel;

/// Maximum number of log entries kept in memory.
const MAX_LOG_ENTRIES: usize = 500;

/// Timeout durations for async operations.
const TIMEOUT_MODULE: Duration = Duration::from_secs(30 * 60);
const TIMEOUT_REPAIR: Duration = Duration::from_secs(6 * 60 * 60);
const TIMEOUT_RUN_ALL: Duration = Duration::from_secs(8 * 60 * 60);
const TIMEOUT_STATUS: Duration = Duration::from_secs(60);
const TIMEOUT_ELEVATION: Duration = Duration::from_secs(10);
const TIMEOUT_RESTART: Duration = Duration::from_secs(15);

/// Result of an async operation.
pub enum AsyncOpResult {
    /// Elevation check completed.
    ElevationChecked { elevated: bool },
    /// A single module finished.
    ModuleFinished { report: ModuleReport },
    /// One module of a "run all" finished; more may follow.
    RunAllProgress { report: ModuleReport },
    /// "Run all" finished.
    RunAllFinished { summary: RunSummary },
    /// A revert finished.
    Reverted { report: ModuleReport },
    /// Adapter and TCP status collected.
    StatusLoaded { status: Result<SystemStatus> },
    /// Restart command issued.
    RestartScheduled { result: Result<()> },
}

/// Pending async operation type (for UI display).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOp {
    RunningModule(ModuleId),
    RunningAll,
    Reverting(ModuleId),
    LoadingStatus,
    Restarting,
}

impl PendingOp {
    /// Get display text for the operation.
    pub fn display(&self) -> String {
        match self {
            PendingOp::RunningModule(id) => format!("{}...", id.title()),
            PendingOp::RunningAll => "Running all modules...".to_string(),
            PendingOp::Reverting(id) => format!("Reverting {}...", id.key()),
            PendingOp::LoadingStatus => "Reading adapter status...".to_string(),
            PendingOp::Restarting => "Scheduling restart...".to_string(),
        }
    }
}

/// What the confirmation screen will do on Enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Run(ModuleId),
    RunAll,
    Revert(ModuleId),
}

impl Action {
    pub fn title(&self) -> String {
        match self {
            Action::Run(id) => id.title().to_string(),
            Action::RunAll => "Run all modules".to_string(),
            Action::Revert(id) => format!("Revert: {}", id.title()),
        }
    }
}

/// Current UI state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Main menu.
    Menu,
    /// Showing what an action does before running it.
    Confirming(Action),
    /// Showing the last report or run summary.
    Results,
    /// Per-adapter DNS and power state.
    Status,
    /// Restart prompt shown on quit after changes that need one.
    ConfirmRestart,
}

/// Menu items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Module(ModuleId),
    RunAll,
    Status,
    Quit,
}

impl MenuItem {
    /// Key shown next to the item; pressing it on the menu selects the item.
    pub fn key(&self) -> char {
        match self {
            MenuItem::Module(id) => char::from(b'0' + id.menu_number()),
            MenuItem::RunAll => 'a',
            MenuItem::Status => 's',
            MenuItem::Quit => '0',
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MenuItem::Module(id) => id.title(),
            MenuItem::RunAll => "Run all",
            MenuItem::Status => "Adapter status",
            MenuItem::Quit => "Quit",
        }
    }
}

/// Log entry for the status panel.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: String,
    pub message: String,
    pub level: LogEntryLevel,
}

/// Application state.
pub struct App {
    /// Runner, config and backups shared with spawned tasks.
    pub ctx: ModuleContext,
    /// Log entries for display (bounded ring buffer).
    pub logs: VecDeque<LogEntry>,
    /// Current UI state.
    pub state: AppState,
    /// Selected menu item index.
    pub selected_menu_item: usize,
    /// Whether the app should quit.
    pub should_quit: bool,
    /// Channel sender for async operation results.
    op_tx: mpsc::UnboundedSender<AsyncOpResult>,
    /// Channel receiver for async operation results.
    op_rx: mpsc::UnboundedReceiver<AsyncOpResult>,
    /// Currently pending async operation.
    pub pending_op: Option<PendingOp>,
    /// When the current pending operation started (for elapsed time display).
    pub pending_op_started: Option<Instant>,
    /// Task behind the pending operation. Kept after a cancel until it has
    /// actually stopped, so no second operation overlaps it.
    op_task: Option<JoinHandle<()>>,
    /// Result of the last single module run or revert.
    pub last_report: Option<ModuleReport>,
    /// Reports of the last (or current) "run all".
    pub last_summary: Option<RunSummary>,
    /// Cached adapter status.
    pub system_status: Option<SystemStatus>,
    /// Some change this session only takes effect after a restart.
    pub reboot_pending: bool,
    /// `None` until the check completes.
    pub elevated: Option<bool>,
    /// Whether the log panel is expanded.
    pub logs_expanded: bool,
}

impl App {
    /// Create a new application instance and start the privilege check.
    pub fn new(ctx: ModuleContext) -> Self {
        let (op_tx, op_rx) = mpsc::unbounded_channel();

        let mut app = Self {
            ctx,
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            state: AppState::Menu,
            selected_menu_item: 0,
            should_quit: false,
            op_tx,
            op_rx,
            pending_op: None,
            pending_op_started: None,
            op_task: None,
            last_report: None,
            last_summary: None,
            system_status: None,
            reboot_pending: false,
            elevated: None,
            logs_expanded: false,
        };

        app.log_info("Ready. Pick a module, or press a to run everything.");
        app.check_elevation_async();
        app
    }

    /// Set the pending operation and record its start time.
    fn set_pending_op(&mut self, op: PendingOp) {
        self.pending_op = Some(op);
        self.pending_op_started = Some(Instant::now());
    }

    /// Clear the pending operation and its start time.
    fn clear_pending_op(&mut self) {
        self.pending_op = None;
        self.pending_op_started = None;
    }

    /// Get elapsed time since the pending operation started.
    pub fn pending_elapsed(&self) -> Option<Duration> {
        self.pending_op_started.map(|start| start.elapsed())
    }

    /// Whether new work must wait: an operation is pending, or a cancelled
    /// one has not finished unwinding yet.
    fn busy(&mut self) -> bool {
        if self.pending_op.is_some() {
            return true;
        }
        if self.op_task.as_ref().is_some_and(|t| !t.is_finished()) {
            self.log_warning("Still stopping the cancelled operation, try again");
            return true;
        }
        self.op_task = None;
        false
    }

    /// Abort the pending operation. Dropping the task kills any child
    /// process it was waiting on; results already sent are discarded as stale.
    fn cancel_pending_op(&mut self) {
        if let Some(op) = self.pending_op {
            if let Some(task) = &self.op_task {
                task.abort();
            }
            self.log_warning(format!("Cancelled: {}", op.display()));
            if matches!(op, PendingOp::RunningModule(_) | PendingOp::RunningAll) {
                self.log_warning("Changes already made stay in place");
            }
            self.clear_pending_op();
            self.state = AppState::Menu;
        }
    }

    /// Poll for async operation results. Call this from the main loop.
    pub fn poll_async_results(&mut self) {
        while let Ok(result) = self.op_rx.try_recv() {
            self.handle_async_result(result);
        }
    }

    /// Check whether the incoming result matches the currently pending operation.
    fn result_matches_pending(&self, result: &AsyncOpResult) -> bool {
        match (result, self.pending_op) {
            // Background check, never blocks the menu
            (AsyncOpResult::ElevationChecked { .. }, _) => true,
            (AsyncOpResult::ModuleFinished { report }, Some(PendingOp::RunningModule(id))) => {
                report.module == id
            }
            (AsyncOpResult::RunAllProgress { .. }, Some(PendingOp::RunningAll)) => true,
            (AsyncOpResult::RunAllFinished { .. }, Some(PendingOp::RunningAll)) => true,
            (AsyncOpResult::Reverted { report }, Some(PendingOp::Reverting(id))) => {
                report.module == id
            }
            (AsyncOpResult::StatusLoaded { .. }, Some(PendingOp::LoadingStatus)) => true,
            (AsyncOpResult::RestartScheduled { .. }, Some(PendingOp::Restarting)) => true,
            _ => false,
        }
    }

    /// Handle a completed async operation.
    fn handle_async_result(&mut self, result: AsyncOpResult) {
        if !self.result_matches_pending(&result) {
            // A cancelled module still changed the system.
            if let AsyncOpResult::ModuleFinished { report }
            | AsyncOpResult::RunAllProgress { report } = &result
            {
                self.reboot_pending |= report.reboot_required;
            }
            self.log_info("Discarded stale async result");
            return;
        }

        match result {
            AsyncOpResult::ElevationChecked { elevated } => {
                self.elevated = Some(elevated);
                if elevated {
                    self.log_success("Running as Administrator");
                } else {
                    self.log_warning("Not running as Administrator. Most modules will fail.");
                    self.log_info("Restart nettune from an elevated terminal.");
                }
            }
            AsyncOpResult::ModuleFinished { report } => {
                self.clear_pending_op();
                self.log_report(&report);
                self.reboot_pending |= report.reboot_required;
                self.last_report = Some(report);
                self.last_summary = None;
                self.state = AppState::Results;
            }
            AsyncOpResult::RunAllProgress { report } => {
                self.log_report(&report);
                self.reboot_pending |= report.reboot_required;
                self.last_summary
                    .get_or_insert_with(RunSummary::default)
                    .push(report);
            }
            AsyncOpResult::RunAllFinished { summary } => {
                self.clear_pending_op();
                if summary.all_succeeded() {
                    self.log_success(format!("All done: {}", summary.headline()));
                } else if summary.mostly_succeeded() {
                    self.log_warning(format!("Mostly succeeded: {}", summary.headline()));
                } else {
                    self.log_error(summary.headline());
                }
                let failed: Vec<&str> = summary.failed_modules().iter().map(|m| m.key()).collect();
                if !failed.is_empty() {
                    self.log_warning(format!("Failed: {}", failed.join(", ")));
                }
                self.reboot_pending |= summary.reboot_required();
                self.last_summary = Some(summary);
                self.last_report = None;
                self.state = AppState::Results;
            }
            AsyncOpResult::Reverted { report } => {
                self.clear_pending_op();
                self.log_report(&report);
                self.reboot_pending |= report.reboot_required;
                self.last_report = Some(report);
                self.last_summary = None;
                self.state = AppState::Results;
            }
            AsyncOpResult::StatusLoaded { status } => {
                self.clear_pending_op();
                match status {
                    Ok(status) => {
                        self.log_success(format!("Found {} adapter(s)", status.dns.len()));
                        self.system_status = Some(status);
                        self.state = AppState::Status;
                    }
                    Err(e) => {
                        self.log_error(format!("Failed to read status: {}", e));
                        self.system_status = None;
                        self.state = AppState::Menu;
                    }
                }
            }
            AsyncOpResult::RestartScheduled { result } => {
                self.clear_pending_op();
                match result {
                    Ok(()) => self.log_success("Restarting in 5 seconds"),
                    Err(e) => self.log_error(format!("Restart failed: {}", e)),
                }
                self.should_quit = true;
            }
        }
    }

    fn log_report(&mut self, report: &ModuleReport) {
        let text = format!("{}: {}", report.module.title(), report.message);
        if report.success {
            self.log_success(text);
        } else {
            self.log_error(text);
        }
        if report.reboot_required {
            self.log_info("A restart is needed for this change");
        }
    }

    /// Get the menu items.
    pub fn menu_items(&self) -> Vec<MenuItem> {
        let mut items: Vec<MenuItem> = ModuleId::ALL.into_iter().map(MenuItem::Module).collect();
        items.push(MenuItem::RunAll);
        items.push(MenuItem::Status);
        items.push(MenuItem::Quit);
        items
    }

    fn check_elevation_async(&mut self) {
        let tx = self.op_tx.clone();
        let runner = self.ctx.runner.clone();

        tokio::spawn(async move {
            let elevated = tokio::time::timeout(TIMEOUT_ELEVATION, is_elevated(runner.as_ref()))
                .await
                .unwrap_or(false);
            let _ = tx.send(AsyncOpResult::ElevationChecked { elevated });
        });
    }

    /// Run a single module (async).
    fn run_module_async(&mut self, id: ModuleId) {
        if self.busy() {
            return;
        }

        self.log_info(format!("Running: {}", id.title()));
        self.set_pending_op(PendingOp::RunningModule(id));

        let tx = self.op_tx.clone();
        let ctx = self.ctx.clone();
        let timeout = if id == ModuleId::Repair {
            TIMEOUT_REPAIR
        } else {
            TIMEOUT_MODULE
        };

        self.op_task = Some(tokio::spawn(async move {
            let report = match tokio::time::timeout(timeout, orchestrator::run_module(&ctx, id)).await {
                Ok(report) => report,
                Err(_) => ModuleReport::new(id, false, "operation timed out"),
            };
            let _ = tx.send(AsyncOpResult::ModuleFinished { report });
        }));
    }

    /// Run every module in order (async), reporting each as it completes.
    fn run_all_async(&mut self) {
        if self.busy() {
            return;
        }

        self.log_info("Running all modules...");
        self.set_pending_op(PendingOp::RunningAll);
        self.last_summary = Some(RunSummary::default());
        self.last_report = None;

        let tx = self.op_tx.clone();
        let ctx = self.ctx.clone();

        self.op_task = Some(tokio::spawn(async move {
            let summary = run_all_within(&ctx, TIMEOUT_RUN_ALL, &tx).await;
            let _ = tx.send(AsyncOpResult::RunAllFinished { summary });
        }));
    }

    /// Revert a module from its backup (async).
    fn revert_async(&mut self, id: ModuleId) {
        if self.busy() {
            return;
        }

        self.log_info(format!("Reverting: {}", id.title()));
        self.set_pending_op(PendingOp::Reverting(id));

        let tx = self.op_tx.clone();
        let ctx = self.ctx.clone();

        self.op_task = Some(tokio::spawn(async move {
            let report =
                match tokio::time::timeout(TIMEOUT_MODULE, orchestrator::revert_module(&ctx, id))
                    .await
                {
                    Ok(report) => report,
                    Err(_) => ModuleReport::new(id, false, "revert timed out"),
                };
            let _ = tx.send(AsyncOpResult::Reverted { report });
        }));
    }

    /// Read per-adapter status (async).
    fn load_status_async(&mut self) {
        if self.busy() {
            return;
        }

        self.set_pending_op(PendingOp::LoadingStatus);

        let tx = self.op_tx.clone();
        let ctx = self.ctx.clone();

        self.op_task = Some(tokio::spawn(async move {
            let status =
                match tokio::time::timeout(TIMEOUT_STATUS, orchestrator::collect_status(&ctx)).await
                {
                    Ok(inner) => inner,
                    Err(_) => Err(TuneError::Timeout {
                        command: "collect_status".into(),
                        seconds: TIMEOUT_STATUS.as_secs(),
                    }),
                };
            let _ = tx.send(AsyncOpResult::StatusLoaded { status });
        }));
    }

    /// Issue `shutdown /r /t 5` (async).
    fn restart_async(&mut self) {
        if self.busy() {
            return;
        }

        self.set_pending_op(PendingOp::Restarting);
        let tx = self.op_tx.clone();
        let runner = self.ctx.runner.clone();

        self.op_task = Some(tokio::spawn(async move {
            let spec = CommandSpec::new("shutdown")
                .args(["/r", "/t", "5"])
                .timeout(TIMEOUT_RESTART);
            let result = runner.run_checked(&spec).await.map(|_| ());
            if let Err(e) = &result {
                tracing::error!("Restart failed: {}", e);
            } else {
                tracing::info!("Restart scheduled");
            }
            let _ = tx.send(AsyncOpResult::RestartScheduled { result });
        }));
    }

    /// Switch to the next DNS provider and persist the choice.
    fn cycle_dns_provider(&mut self) {
        let next = self.ctx.config.dns.provider.next();
        self.ctx.config.dns.provider = next;
        self.ctx.config.save();
        tracing::info!("DNS provider set to {}", next.name());
        self.log_info(format!("DNS provider: {}", next.name()));
    }

    /// Handle keyboard input.
    pub fn handle_key(&mut self, key: KeyCode) {
        // While an operation is pending, only allow quit and cancel
        if self.pending_op.is_some() {
            match key {
                KeyCode::Char('q') => {
                    self.should_quit = true;
                }
                KeyCode::Esc => {
                    self.cancel_pending_op();
                }
                _ => {}
            }
            return;
        }

        match self.state {
            AppState::Menu => self.handle_menu_key(key),
            AppState::Confirming(action) => self.handle_confirm_key(key, action),
            AppState::Results | AppState::Status => self.handle_view_key(key),
            AppState::ConfirmRestart => self.handle_restart_key(key),
        }
    }

    fn handle_menu_key(&mut self, key: KeyCode) {
        let items = self.menu_items();

        match key {
            KeyCode::Up | KeyCode::Char('k') => {
                if self.selected_menu_item > 0 {
                    self.selected_menu_item -= 1;
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected_menu_item < items.len().saturating_sub(1) {
                    self.selected_menu_item += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(item) = items.get(self.selected_menu_item).copied() {
                    self.activate(item);
                }
            }
            KeyCode::Char(c @ '1'..='9') => {
                let n = c as u8 - b'0';
                if let Some(id) = ModuleId::from_menu_number(n) {
                    self.select_item(MenuItem::Module(id));
                    self.activate(MenuItem::Module(id));
                }
            }
            KeyCode::Char('a') => {
                self.select_item(MenuItem::RunAll);
                self.activate(MenuItem::RunAll);
            }
            KeyCode::Char('r') => {
                if let Some(MenuItem::Module(id)) = items.get(self.selected_menu_item).copied() {
                    if id.supports_revert() {
                        self.state = AppState::Confirming(Action::Revert(id));
                    } else {
                        self.log_warning(format!("{} cannot be reverted", id.title()));
                    }
                }
            }
            KeyCode::Char('p') => self.cycle_dns_provider(),
            KeyCode::Char('s') => {
                self.select_item(MenuItem::Status);
                self.load_status_async();
            }
            KeyCode::Char('l') => {
                self.logs_expanded = !self.logs_expanded;
            }
            KeyCode::Char('0') | KeyCode::Char('q') => self.quit(),
            _ => {}
        }
    }

    fn select_item(&mut self, item: MenuItem) {
        if let Some(idx) = self.menu_items().iter().position(|i| *i == item) {
            self.selected_menu_item = idx;
        }
    }

    fn activate(&mut self, item: MenuItem) {
        match item {
            MenuItem::Module(id) => self.state = AppState::Confirming(Action::Run(id)),
            MenuItem::RunAll => self.state = AppState::Confirming(Action::RunAll),
            MenuItem::Status => self.load_status_async(),
            MenuItem::Quit => self.quit(),
        }
    }

    fn handle_confirm_key(&mut self, key: KeyCode, action: Action) {
        match key {
            KeyCode::Enter | KeyCode::Char('y') => match action {
                Action::Run(id) => self.run_module_async(id),
                Action::RunAll => self.run_all_async(),
                Action::Revert(id) => self.revert_async(id),
            },
            KeyCode::Char('p') if action == Action::Run(ModuleId::Dns) => {
                self.cycle_dns_provider();
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('q') => {
                self.state = AppState::Menu;
            }
            _ => {}
        }
    }

    fn handle_view_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Backspace => {
                self.state = AppState::Menu;
            }
            KeyCode::Char('s') if self.state == AppState::Status => self.load_status_async(),
            KeyCode::Char('l') => {
                self.logs_expanded = !self.logs_expanded;
            }
            KeyCode::Char('q') => self.quit(),
            _ => {}
        }
    }

    fn handle_restart_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('y') | KeyCode::Enter => self.restart_async(),
            KeyCode::Char('n') | KeyCode::Char('q') => {
                self.log_info("Restart later to finish applying changes");
                self.should_quit = true;
            }
            KeyCode::Esc => {
                self.state = AppState::Menu;
            }
            _ => {}
        }
    }

    /// Quit the application, offering a restart first when one is needed.
    fn quit(&mut self) {
        if self.reboot_pending {
            self.state = AppState::ConfirmRestart;
        } else {
            self.should_quit = true;
        }
    }

    /// Get the help text for current state.
    pub fn help_text(&self) -> &'static str {
        if self.pending_op.is_some() {
            return "Esc: Cancel  q: Force quit";
        }

        match self.state {
            AppState::Menu => {
                "↑/↓: Navigate  Enter: Select  1-9: Module  a: Run all  r: Revert  p: DNS provider  s: Status  l: Logs  q: Quit"
            }
            AppState::Confirming(Action::Run(ModuleId::Dns)) => {
                "Enter: Run  p: DNS provider  Esc: Back"
            }
            AppState::Confirming(_) => "Enter: Run  Esc: Back",
            AppState::Results => "Enter: Back  l: Logs  q: Quit",
            AppState::Status => "s: Refresh  Esc: Back  l: Logs  q: Quit",
            AppState::ConfirmRestart => "y: Restart now  n: Quit without restart  Esc: Back",
        }
    }

    // Logging helpers

    /// Append a log entry, evicting the oldest if at capacity.
    fn push_log(&mut self, entry: LogEntry) {
        if self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);
    }

    fn log_info(&mut self, msg: impl Into<String>) {
        self.push_log(LogEntry::info(msg));
    }

    fn log_success(&mut self, msg: impl Into<String>) {
        self.push_log(LogEntry::success(msg));
    }

    fn log_warning(&mut self, msg: impl Into<String>) {
        self.push_log(LogEntry::warning(msg));
    }

    fn log_error(&mut self, msg: impl Into<String>) {
        self.push_log(LogEntry::error(msg));
    }
}

/// Run every module within `deadline`, forwarding each report on `tx`. If the
/// deadline passes, the reports gathered so far are kept and the module that
/// was still running is recorded as timed out.
async fn run_all_within(
    ctx: &ModuleContext,
    deadline: Duration,
    tx: &mpsc::UnboundedSender<AsyncOpResult>,
) -> RunSummary {
    let collected = Arc::new(Mutex::new(RunSummary::default()));
    let sink = collected.clone();
    let progress_tx = tx.clone();
    let run = orchestrator::run_all(ctx, move |report| {
        if let Ok(mut summary) = sink.lock() {
            summary.push(report.clone());
        }
        let _ = progress_tx.send(AsyncOpResult::RunAllProgress {
            report: report.clone(),
        });
    });

    match tokio::time::timeout(deadline, run).await {
        Ok(summary) => summary,
        Err(_) => {
            let mut summary = collected
                .lock()
                .map(|summary| summary.clone())
                .unwrap_or_default();
            if let Some(&id) = ModuleId::RUN_ALL_ORDER.get(summary.total()) {
                tracing::error!("Run all timed out during {}", id.key());
                let report = ModuleReport::new(id, false, "run all timed out");
                let _ = tx.send(AsyncOpResult::RunAllProgress {
                    report: report.clone(),
                });
                summary.push(report);
            }
            summary
        }
    }
}

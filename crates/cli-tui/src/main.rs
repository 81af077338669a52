use anyhow::{Context, Result};
use clap::Parser;
use engine::api::{JobLogEntry, WorkerApi};
use engine::notify::ChannelNotifier;
use engine::{
    run_poller, ActivityTracker, ClientConfig, Job, JobState, Notification, Preset, Session,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::collections::HashSet;
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Compression console TUI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worker base URL, overrides the configuration file
    #[arg(long)]
    server: Option<String>,
}

const MAX_NOTICES: usize = 100;

/// Result of a background fetch, applied to the UI state on the next
/// frame. Fetches run as spawned tasks so the render loop keeps drawing
/// (and the loading indicator can actually show) while they are in
/// flight.
enum Update {
    Inputs(Vec<String>),
    History(Vec<JobLogEntry>),
    Notice(String),
}

struct App {
    session: Arc<Session<WorkerApi>>,
    api: WorkerApi,
    inputs: Vec<String>,
    selected: Vec<bool>,
    cursor: usize,
    preset: Preset,
    jobs: Vec<Job>,
    history: Vec<JobLogEntry>,
    notices: Vec<String>,
    notice_rx: UnboundedReceiver<Notification>,
    update_tx: UnboundedSender<Update>,
    update_rx: UnboundedReceiver<Update>,
    activity: Arc<ActivityTracker>,
    show_history: bool,
    table_state: TableState,
    should_quit: bool,
}

impl App {
    fn new(
        session: Arc<Session<WorkerApi>>,
        api: WorkerApi,
        notice_rx: UnboundedReceiver<Notification>,
        activity_threshold: Duration,
    ) -> Self {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        Self {
            session,
            api,
            inputs: Vec::new(),
            selected: Vec::new(),
            cursor: 0,
            preset: Preset::Standard,
            jobs: Vec::new(),
            history: Vec::new(),
            notices: Vec::new(),
            notice_rx,
            update_tx,
            update_rx,
            activity: Arc::new(ActivityTracker::new(activity_threshold)),
            show_history: false,
            table_state: TableState::default(),
            should_quit: false,
        }
    }

    /// Start a background reload of the input listing and the
    /// completed-job history. Results come back through the update
    /// channel; failures keep the previous view and land in the
    /// notification feed.
    fn refresh(&self) {
        let api = self.api.clone();
        let activity = self.activity.clone();
        let tx = self.update_tx.clone();
        tokio::spawn(async move {
            activity.begin();
            let update = match api.list_inputs().await {
                Ok(inputs) => Update::Inputs(inputs),
                Err(err) => Update::Notice(format!("input refresh failed: {err}")),
            };
            let _ = tx.send(update);
            let update = match api.job_logs().await {
                Ok(logs) => Update::History(logs),
                Err(err) => Update::Notice(format!("history refresh failed: {err}")),
            };
            let _ = tx.send(update);
            activity.end();
        });
    }

    /// Submit the checked inputs with the currently selected preset as a
    /// background batch; outcome notifications arrive via the session's
    /// channel notifier.
    fn submit_selected(&mut self) {
        let files: Vec<String> = self
            .inputs
            .iter()
            .zip(&self.selected)
            .filter(|(_, sel)| **sel)
            .map(|(name, _)| name.clone())
            .collect();

        let session = self.session.clone();
        let request = self.preset.request();
        let activity = self.activity.clone();
        tokio::spawn(async move {
            activity.begin();
            session.submit_batch(&files, &request).await;
            activity.end();
        });

        for sel in &mut self.selected {
            *sel = false;
        }
    }

    fn drain_updates(&mut self) {
        while let Ok(update) = self.update_rx.try_recv() {
            match update {
                Update::Inputs(inputs) => self.apply_inputs(inputs),
                Update::History(logs) => self.history = logs,
                Update::Notice(message) => self.push_notice(message),
            }
        }
    }

    /// Replace the input listing, keeping checkmarks on filenames that
    /// are still present and clamping the cursor.
    fn apply_inputs(&mut self, inputs: Vec<String>) {
        let kept: HashSet<String> = self
            .inputs
            .iter()
            .zip(&self.selected)
            .filter(|(_, sel)| **sel)
            .map(|(name, _)| name.clone())
            .collect();

        self.selected = inputs.iter().map(|name| kept.contains(name)).collect();
        self.inputs = inputs;
        if self.cursor >= self.inputs.len() {
            self.cursor = self.inputs.len().saturating_sub(1);
        }
    }

    fn drain_notices(&mut self) {
        while let Ok(note) = self.notice_rx.try_recv() {
            self.push_notice(note.message());
        }
    }

    fn push_notice(&mut self, message: String) {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        self.notices.push(format!("{stamp} {message}"));
        if self.notices.len() > MAX_NOTICES {
            let excess = self.notices.len() - MAX_NOTICES;
            self.notices.drain(..excess);
        }
    }

    fn toggle_current(&mut self) {
        if let Some(sel) = self.selected.get_mut(self.cursor) {
            *sel = !*sel;
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.inputs.is_empty() {
            return;
        }
        let last = self.inputs.len() - 1;
        self.cursor = if delta < 0 {
            self.cursor.saturating_sub(delta.unsigned_abs())
        } else {
            (self.cursor + delta as usize).min(last)
        };
    }

    fn count_by_state(&self, state: JobState) -> usize {
        self.jobs.iter().filter(|j| j.state == state).count()
    }

    /// Mean progress across tracked jobs, for the header gauge.
    fn overall_progress(&self) -> f64 {
        if self.jobs.is_empty() {
            return 0.0;
        }
        let total: f64 = self.jobs.iter().map(|j| j.progress).sum();
        (total / self.jobs.len() as f64).clamp(0.0, 100.0)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = ClientConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(server) = args.server {
        cfg.server_url = server;
    }

    let client = reqwest::Client::builder()
        .timeout(cfg.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let api = WorkerApi::with_client(client, cfg.server_url.clone());

    let (notifier, notice_rx) = ChannelNotifier::new();
    let session = Arc::new(Session::new(api.clone(), Arc::new(notifier)));
    let poller = tokio::spawn(run_poller(session.clone(), cfg.poll_interval()));

    // Setup terminal
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(session, api, notice_rx, cfg.activity_threshold());
    app.refresh();

    // Main event loop
    loop {
        app.drain_updates();
        app.drain_notices();
        app.jobs = app.session.snapshot().await;

        terminal.draw(|f| ui(f, &mut app))?;

        if crossterm::event::poll(Duration::from_millis(100))? {
            if let crossterm::event::Event::Key(key) = crossterm::event::read()? {
                match key.code {
                    crossterm::event::KeyCode::Char('q') => {
                        app.should_quit = true;
                    }
                    crossterm::event::KeyCode::Char('r') => {
                        app.refresh();
                    }
                    crossterm::event::KeyCode::Char(' ') => {
                        app.toggle_current();
                    }
                    crossterm::event::KeyCode::Char('s') => {
                        app.submit_selected();
                    }
                    crossterm::event::KeyCode::Char('p') => {
                        app.preset = app.preset.next();
                    }
                    crossterm::event::KeyCode::Char('h') => {
                        app.show_history = !app.show_history;
                    }
                    crossterm::event::KeyCode::Up | crossterm::event::KeyCode::Char('k') => {
                        app.move_cursor(-1);
                    }
                    crossterm::event::KeyCode::Down | crossterm::event::KeyCode::Char('j') => {
                        app.move_cursor(1);
                    }
                    _ => {}
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    poller.abort();

    // Restore terminal
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )?;

    Ok(())
}

fn ui(f: &mut Frame, app: &mut App) {
    let size = f.size();

    if size.height < 14 || size.width < 80 {
        let error_msg = Paragraph::new("Terminal too small! Please resize to at least 80x14.")
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .style(Style::default().fg(Color::Red));
        f.render_widget(error_msg, size);
        return;
    }

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header: progress gauge + session info
            Constraint::Min(6),    // Body: inputs + jobs/history
            Constraint::Length(5), // Notification feed
            Constraint::Length(3), // Status bar
        ])
        .split(size);

    render_header(f, app, main_chunks[0]);

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(main_chunks[1]);

    render_inputs(f, app, body_chunks[0]);

    if app.show_history {
        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(body_chunks[1]);
        render_job_table(f, app, right[0]);
        render_history(f, app, right[1]);
    } else {
        render_job_table(f, app, body_chunks[1]);
    }

    render_notices(f, app, main_chunks[2]);
    render_status_bar(f, app, main_chunks[3]);
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let progress = app.overall_progress();
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Cyan))
        .percent(progress as u16)
        .label(format!("{progress:.1}%"));
    f.render_widget(gauge, chunks[0]);

    let busy = if app.activity.visible() {
        " | working..."
    } else {
        ""
    };
    let info = format!(
        "Worker: {} | Preset: {}{}",
        truncate_string(app.api.base_url(), 40),
        app.preset.id(),
        busy,
    );
    let paragraph =
        Paragraph::new(info).block(Block::default().borders(Borders::ALL).title("Session"));
    f.render_widget(paragraph, chunks[1]);
}

fn render_inputs(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = if app.inputs.is_empty() {
        vec![ListItem::new("no inputs (r to refresh)")]
    } else {
        app.inputs
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let marker = if app.selected.get(i).copied().unwrap_or(false) {
                    "[x]"
                } else {
                    "[ ]"
                };
                let width = (area.width as usize).saturating_sub(6).max(8);
                let line = format!("{marker} {}", truncate_string(name, width));
                let style = if i == app.cursor {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default()
                };
                ListItem::new(line).style(style)
            })
            .collect()
    };

    let checked = app.selected.iter().filter(|s| **s).count();
    let title = format!("Inputs ({checked}/{} selected)", app.inputs.len());
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(list, area);
}

fn render_job_table(f: &mut Frame, app: &mut App, area: Rect) {
    let header = Row::new(vec!["ST", "ID", "FILE", "PROG", "SPEED"])
        .style(Style::default().add_modifier(Modifier::BOLD))
        .height(1);

    let max_data_rows = (area.height as usize).saturating_sub(3);

    let rows: Vec<Row> = if app.jobs.is_empty() {
        vec![Row::new(vec![
            "-".to_string(),
            "-".to_string(),
            "No jobs yet".to_string(),
            "-".to_string(),
            "-".to_string(),
        ])
        .height(1)]
    } else {
        app.jobs
            .iter()
            .rev() // newest first
            .take(max_data_rows.max(1))
            .map(|job| {
                let speed = job
                    .speed
                    .map(|s| format!("{s:.1}x"))
                    .unwrap_or_else(|| "-".to_string());
                let file = match &job.error {
                    Some(error) => format!("{} - {}", job.filename, error),
                    None => job.filename.clone(),
                };
                Row::new(vec![
                    status_str(job.state, job.placeholder).to_string(),
                    job.job_id.clone().unwrap_or_else(|| "-".to_string()),
                    truncate_string(&file, 60),
                    format!("{:.0}%", job.progress),
                    speed,
                ])
                .height(1)
            })
            .collect()
    };

    let widths = [
        Constraint::Length(5),
        Constraint::Length(10),
        Constraint::Percentage(60),
        Constraint::Length(5),
        Constraint::Length(7),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Jobs ({})", app.jobs.len())),
        )
        .column_spacing(1);

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn render_history(f: &mut Frame, app: &App, area: Rect) {
    let header = Row::new(vec!["TIME", "FILE", "CODEC", "CRF", "RATIO", "RESULT"])
        .style(Style::default().add_modifier(Modifier::BOLD))
        .height(1);

    let max_data_rows = (area.height as usize).saturating_sub(3);

    let rows: Vec<Row> = app
        .history
        .iter()
        .rev() // newest first
        .take(max_data_rows.max(1))
        .map(|entry| {
            let ratio = entry
                .compression_ratio
                .map(|r| format!("{:.0}%", r * 100.0))
                .unwrap_or_else(|| "-".to_string());
            Row::new(vec![
                entry.timestamp.clone().unwrap_or_else(|| "-".to_string()),
                truncate_string(&entry.filename, 40),
                entry.codec.clone(),
                entry.crf.to_string(),
                ratio,
                if entry.succeeded() { "ok" } else { "fail" }.to_string(),
            ])
            .height(1)
        })
        .collect();

    let widths = [
        Constraint::Length(20),
        Constraint::Percentage(40),
        Constraint::Length(12),
        Constraint::Length(4),
        Constraint::Length(6),
        Constraint::Length(6),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("History ({})", app.history.len())),
        )
        .column_spacing(1);

    f.render_widget(table, area);
}

fn render_notices(f: &mut Frame, app: &App, area: Rect) {
    let visible = (area.height as usize).saturating_sub(2).max(1);
    let start = app.notices.len().saturating_sub(visible);
    let text = app.notices[start..].join("\n");

    let paragraph =
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Notifications"));
    f.render_widget(paragraph, area);
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let status_text = format!(
        "Jobs: {} | Pending: {} | Running: {} | Success: {} | Failed: {} | q=quit r=refresh space=select s=submit p=preset h=history",
        app.jobs.len(),
        app.count_by_state(JobState::Pending),
        app.count_by_state(JobState::Running),
        app.count_by_state(JobState::Success),
        app.count_by_state(JobState::Failure),
    );

    let paragraph = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .wrap(ratatui::widgets::Wrap { trim: true });

    f.render_widget(paragraph, area);
}

fn status_str(state: JobState, placeholder: bool) -> &'static str {
    match (state, placeholder) {
        (JobState::Pending, true) => "QUEUE",
        (JobState::Pending, false) => "PEND",
        (JobState::Running, _) => "RUN",
        (JobState::Success, _) => "OK",
        (JobState::Failure, true) => "REJ",
        (JobState::Failure, false) => "FAIL",
    }
}

// Counts chars, not bytes: filenames are routinely multi-byte UTF-8 and
// slicing mid-character would panic the render loop.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

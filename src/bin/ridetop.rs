//! `ridetop`: live terminal dashboard for your ride requests.
//!
//! Keys: ↑/↓ select • r refresh • f force update • c cancel (then y/n) • q quit

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::{execute, terminal};
use ratatui::prelude::*;
use ratatui::widgets::*;
use tokio::sync::mpsc;

use ride_along::api::{HttpRideApi, RideApi};
use ride_along::config::Config;
use ride_along::ids::EntityId;
use ride_along::models::RequestStatus;
use ride_along::views::{
    Notification, NotificationLevel, Notifier, RefreshPhase, RequestsSnapshot, RequestsView,
};

const MAX_MESSAGES: usize = 6;

#[derive(Default)]
struct App {
    snapshot: RequestsSnapshot,
    selected: usize,
    pending_cancel: Option<EntityId>,
    messages: Vec<Notification>,
}

impl App {
    fn selected_id(&self) -> Option<&EntityId> {
        self.snapshot.requests.get(self.selected).map(|r| &r.id)
    }

    fn push(&mut self, note: Notification) {
        self.messages.push(note);
        if self.messages.len() > MAX_MESSAGES {
            self.messages.remove(0);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    if config.runtime.log_stderr {
        ride_along::init_tracing(&config.runtime);
    }

    let api: Arc<dyn RideApi> = Arc::new(HttpRideApi::from_config(&config)?);
    let (notifier, notifications) = Notifier::channel();
    let view = Arc::new(RequestsView::new(
        api,
        config.session_user(),
        config.polling.clone(),
        notifier,
    ));

    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut term = Terminal::new(backend)?;

    let result = run(&mut term, Arc::clone(&view), notifications).await;
    view.teardown();

    terminal::disable_raw_mode()?;
    execute!(term.backend_mut(), terminal::LeaveAlternateScreen)?;
    term.show_cursor()?;
    result
}

/// Blocking crossterm reads live on their own thread.
fn spawn_key_reader() -> mpsc::UnboundedReceiver<KeyEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            match event::poll(Duration::from_millis(200)) {
                Ok(true) => {
                    if let Ok(Event::Key(key)) = event::read()
                        && tx.send(key).is_err()
                    {
                        break;
                    }
                }
                Ok(false) => {
                    if tx.is_closed() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

async fn run<B: Backend>(
    term: &mut Terminal<B>,
    view: Arc<RequestsView>,
    mut notifications: mpsc::UnboundedReceiver<Notification>,
) -> anyhow::Result<()> {
    let mut keys = spawn_key_reader();
    let mut app = App::default();
    let mut redraw = tokio::time::interval(Duration::from_millis(250));

    {
        let view = Arc::clone(&view);
        tokio::spawn(async move {
            let _ = view.mount().await;
        });
    }

    loop {
        app.snapshot = view.snapshot().await;
        if app.selected >= app.snapshot.requests.len() {
            app.selected = app.snapshot.requests.len().saturating_sub(1);
        }
        term.draw(|f| ui(f, &app))?;

        tokio::select! {
            _ = redraw.tick() => {}
            Some(note) = notifications.recv() => app.push(note),
            key = keys.recv() => {
                let Some(key) = key else { break };
                if !handle_key(key, &mut app, &view) {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Returns false when the user asked to quit.
fn handle_key(key: KeyEvent, app: &mut App, view: &Arc<RequestsView>) -> bool {
    if let Some(id) = app.pending_cancel.take() {
        if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
            let view = Arc::clone(view);
            tokio::spawn(async move {
                let _ = view.cancel_request(&id, &|_: &str| true).await;
            });
        }
        return true;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return false,
        KeyCode::Up => app.selected = app.selected.saturating_sub(1),
        KeyCode::Down => {
            if app.selected + 1 < app.snapshot.requests.len() {
                app.selected += 1;
            }
        }
        KeyCode::Char('r') => {
            let view = Arc::clone(view);
            tokio::spawn(async move {
                let _ = view.refresh().await;
            });
        }
        KeyCode::Char('R') if app.snapshot.error.is_some() => {
            let view = Arc::clone(view);
            tokio::spawn(async move {
                let _ = view.retry().await;
            });
        }
        KeyCode::Char('f') => {
            let view = Arc::clone(view);
            tokio::spawn(async move {
                view.force_update().await;
            });
        }
        KeyCode::Char('c') => {
            app.pending_cancel = app.selected_id().cloned();
        }
        _ => {}
    }
    true
}

fn status_style(status: RequestStatus) -> Style {
    let color = match status {
        RequestStatus::Pending => Color::Yellow,
        RequestStatus::Confirmed => Color::Green,
        RequestStatus::Rejected => Color::Red,
        RequestStatus::Cancelled => Color::DarkGray,
    };
    Style::default().fg(color)
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(MAX_MESSAGES as u16 + 2),
            Constraint::Length(3),
        ])
        .split(f.size());

    let s = &app.snapshot;
    let phase = match (s.phase, s.forcing, s.action_loading) {
        (RefreshPhase::Loading, _, _) => "loading…",
        (_, true, _) => "checking every ride…",
        (_, _, true) => "working…",
        (RefreshPhase::Refreshing, _, _) => "refreshing…",
        (RefreshPhase::Idle, _, _) => "idle",
    };
    let synced = s
        .last_synced_at
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "Ride Along — My Requests",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("  |  {}  |  last sync {}", phase, synced)),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Overview"));
    f.render_widget(header, chunks[0]);

    if let Some(error) = &s.error {
        let body = Paragraph::new(vec![
            Line::styled(error.clone(), Style::default().fg(Color::Red)),
            Line::raw("Press R to retry."),
        ])
        .block(Block::default().borders(Borders::ALL).title("Requests"));
        f.render_widget(body, chunks[1]);
    } else {
        let rows: Vec<Row> = s
            .requests
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let ride = r.embedded_ride();
                let status = r.display_status();
                let row = Row::new(vec![
                    Cell::from(r.id.to_string()),
                    Cell::from(ride.and_then(|x| x.pickup.as_ref()).map(|p| p.label()).unwrap_or_default()),
                    Cell::from(ride.and_then(|x| x.dropoff.as_ref()).map(|p| p.label()).unwrap_or_default()),
                    Cell::from(r.recency().with_timezone(&chrono::Local).format("%m-%d %H:%M").to_string()),
                    Cell::from(status.to_string()).style(status_style(status)),
                ]);
                if i == app.selected {
                    row.style(Style::default().add_modifier(Modifier::REVERSED))
                } else {
                    row
                }
            })
            .collect();
        let table = Table::new(
            rows,
            [
                Constraint::Length(14),
                Constraint::Percentage(30),
                Constraint::Percentage(30),
                Constraint::Length(12),
                Constraint::Length(10),
            ],
        )
        .header(
            Row::new(vec!["Request", "From", "To", "When", "Status"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Requests ({})", s.requests.len())),
        );
        f.render_widget(table, chunks[1]);
    }

    let lines: Vec<Line> = if app.messages.is_empty() {
        vec![Line::raw("(no notifications yet)")]
    } else {
        app.messages
            .iter()
            .map(|n| {
                let color = match n.level {
                    NotificationLevel::Info => Color::Blue,
                    NotificationLevel::Success => Color::Green,
                    NotificationLevel::Error => Color::Red,
                    NotificationLevel::LoginRequired => Color::Magenta,
                };
                Line::styled(n.message.clone(), Style::default().fg(color))
            })
            .collect()
    };
    let log = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Notifications"))
        .wrap(Wrap { trim: true });
    f.render_widget(log, chunks[2]);

    let help = match &app.pending_cancel {
        Some(id) => Line::styled(
            format!("Cancel request {}? y/n", id),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        None => Line::raw("Keys: ↑/↓ select • r refresh • f force update • c cancel • q/Esc quit"),
    };
    let help = Paragraph::new(help).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[3]);
}

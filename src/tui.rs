use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::DownloaderError;

const EVENTS_MAX: usize = 8;
const LOGS_MAX: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Progress,
    Logs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Query,
    Prepare,
    Fetch,
    Done,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Query => "Query",
            Phase::Prepare => "Prepare",
            Phase::Fetch => "Fetch",
            Phase::Done => "Done",
        }
    }
}

#[derive(Debug)]
struct ViewState {
    phase: Phase,
    status: String,
    position: usize,
    total: usize,
    succeeded: usize,
    failed: usize,
    last_latency_ms: Option<u128>,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    view: View,
    started: Instant,
    cancel_requested: bool,
}

pub struct Tui {
    bucket: String,
    state: Arc<Mutex<ViewState>>,
    log_scroll: u16,
}

struct TuiProgress {
    state: Arc<Mutex<ViewState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let message = event.message.trim().to_string();
        if let Some((phase, payload)) = parse_phase(&message) {
            state.phase = phase;
            state.status = payload.to_string();
            if let Some((position, total)) = parse_position(payload) {
                state.position = position;
                state.total = total;
            }
        } else if message.starts_with("item.ok") {
            state.succeeded += 1;
        } else if message.starts_with("item.failed") {
            state.failed += 1;
        }
        if let Some(elapsed) = event.elapsed {
            state.last_latency_ms = Some(elapsed.as_millis());
        }

        push_bounded(&mut state.events, message.clone(), EVENTS_MAX);
        let line = format!("[{}] {message}", Local::now().format("%H:%M:%S"));
        push_bounded(&mut state.logs, line, LOGS_MAX);
    }

    fn cancelled(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.cancel_requested)
            .unwrap_or(true)
    }
}

impl Tui {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            state: Arc::new(Mutex::new(ViewState {
                phase: Phase::Query,
                status: "starting".to_string(),
                position: 0,
                total: 0,
                succeeded: 0,
                failed: 0,
                last_latency_ms: None,
                events: VecDeque::new(),
                logs: VecDeque::new(),
                view: View::Progress,
                started: Instant::now(),
                cancel_requested: false,
            })),
            log_scroll: 0,
        }
    }

    /// Runs `f` on a worker thread while drawing its progress events.
    /// `q` or Esc cancels after the item in flight and returns an error.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, DownloaderError> + Send + 'static,
        R: Send + 'static,
    {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, self, &state, tick))
                    .into_diagnostic()?;
            }

            match rx.try_recv() {
                Ok(result) => {
                    restore_terminal()?;
                    handle.join().ok();
                    if self.cancel_requested() {
                        return Err(miette::Report::msg("aborted"));
                    }
                    return result.map_err(miette::Report::new);
                }
                Err(TryRecvError::Disconnected) => {
                    restore_terminal()?;
                    return Err(miette::Report::msg("download worker stopped unexpectedly"));
                }
                Err(TryRecvError::Empty) => {}
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    self.handle_key(key);
                }
            }

            tick = tick.wrapping_add(1);
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.request_cancel(),
            KeyCode::F(4) | KeyCode::Char('l') => self.toggle_logs(),
            KeyCode::Up => self.log_scroll = self.log_scroll.saturating_sub(1),
            KeyCode::Down => self.log_scroll = self.log_scroll.saturating_add(1),
            _ => {}
        }
    }

    fn request_cancel(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if !state.cancel_requested {
                state.cancel_requested = true;
                state.status = "cancelling after the current item".to_string();
            }
        }
    }

    fn cancel_requested(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.cancel_requested)
            .unwrap_or(false)
    }

    fn toggle_logs(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.view = match state.view {
                View::Progress => View::Logs,
                View::Logs => View::Progress,
            };
        }
        self.log_scroll = 0;
    }
}

fn restore_terminal() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    io::stdout()
        .execute(LeaveAlternateScreen)
        .into_diagnostic()?;
    Ok(())
}

fn draw_ui(frame: &mut ratatui::Frame, tui: &Tui, state: &ViewState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(tui, tick), chunks[0]);
    match state.view {
        View::Progress => frame.render_widget(draw_status_panel(state), chunks[1]),
        View::Logs => frame.render_widget(draw_logs_view(state, tui.log_scroll), chunks[1]),
    }
    let footer = Paragraph::new(Line::from(Span::styled(
        "q/Esc quit · l/F4 logs · ↑/↓ scroll",
        Style::default().fg(Color::Gray),
    )));
    frame.render_widget(footer, chunks[2]);
}

fn draw_header(tui: &Tui, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let line = Line::from(vec![
        Span::styled(
            "S3SQL",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Bucket: "),
        Span::styled(tui.bucket.clone(), Style::default().fg(Color::Cyan)),
        Span::raw("   "),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]);
    Paragraph::new(vec![line])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_status_panel(state: &ViewState) -> Paragraph<'static> {
    let percent = if state.total == 0 {
        0
    } else {
        (state.position * 100 / state.total) as u8
    };
    let phase_color = match state.phase {
        Phase::Done => Color::Green,
        _ => Color::Cyan,
    };
    let latency = state
        .last_latency_ms
        .map(|v| format!("{v} ms"))
        .unwrap_or_else(|| "--".to_string());

    let mut lines = vec![
        Line::from(Span::styled(
            "STATUS / PROGRESS",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled("Phase: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{:<8}", state.phase.label()),
                Style::default().fg(phase_color),
            ),
            Span::raw(progress_bar(percent)),
            Span::raw(format!(" {}/{}", state.position, state.total)),
        ]),
        Line::from(vec![
            Span::styled("Succeeded: ", Style::default().fg(Color::Gray)),
            Span::styled(state.succeeded.to_string(), Style::default().fg(Color::Green)),
            Span::styled("   Failed: ", Style::default().fg(Color::Gray)),
            Span::styled(state.failed.to_string(), Style::default().fg(Color::Red)),
            Span::styled("   Last item: ", Style::default().fg(Color::Gray)),
            Span::raw(latency),
            Span::styled("   Elapsed: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{}s", state.started.elapsed().as_secs())),
        ]),
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Gray)),
            Span::raw(state.status.clone()),
        ]),
        Line::from(Span::styled(
            "Recent events:",
            Style::default().fg(Color::Gray),
        )),
    ];
    for event in state.events.iter().rev() {
        let color = if event.starts_with("item.failed") {
            Color::Red
        } else {
            Color::White
        };
        lines.push(Line::from(Span::styled(
            format!("- {event}"),
            Style::default().fg(color),
        )));
    }

    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn draw_logs_view(state: &ViewState, scroll: u16) -> Paragraph<'static> {
    let lines = state
        .logs
        .iter()
        .map(|line| Line::from(line.clone()))
        .collect::<Vec<_>>();
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Logs"))
        .scroll((scroll, 0))
        .wrap(Wrap { trim: false })
}

fn progress_bar(percent: u8) -> String {
    let total = 20;
    let filled = (percent as usize * total) / 100;
    let mut out = String::from("[");
    for i in 0..total {
        out.push(if i < filled { '#' } else { '.' });
    }
    out.push(']');
    out
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let (label, rest) = message.strip_prefix("phase=")?.split_once(';')?;
    let phase = match label {
        "Query" => Phase::Query,
        "Prepare" => Phase::Prepare,
        "Fetch" => Phase::Fetch,
        "Done" => Phase::Done,
        _ => return None,
    };
    Some((phase, rest.trim()))
}

fn parse_position(payload: &str) -> Option<(usize, usize)> {
    let inner = payload.strip_prefix('[')?.split_once(']')?.0;
    let (position, total) = inner.split_once('/')?;
    Some((position.parse().ok()?, total.parse().ok()?))
}

fn push_bounded(buffer: &mut VecDeque<String>, item: String, max: usize) {
    buffer.push_back(item);
    while buffer.len() > max {
        buffer.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fetch_progress_events() {
        let (phase, payload) = parse_phase("phase=Fetch; [3/10] k-3 -> downloads/a.txt").unwrap();
        assert_eq!(phase, Phase::Fetch);
        assert_eq!(parse_position(payload), Some((3, 10)));
        assert_eq!(parse_phase("item.ok id=k-3"), None);
    }

    #[test]
    fn sink_counts_item_events() {
        let tui = Tui::new("bucket");
        let sink = TuiProgress {
            state: tui.state.clone(),
        };
        sink.event(ProgressEvent {
            message: "item.ok id=a".to_string(),
            elapsed: Some(Duration::from_millis(12)),
        });
        sink.event(ProgressEvent {
            message: "item.failed id=b error=boom".to_string(),
            elapsed: None,
        });
        let state = tui.state.lock().unwrap();
        assert_eq!((state.succeeded, state.failed), (1, 1));
        assert_eq!(state.last_latency_ms, Some(12));
        assert_eq!(state.events.len(), 2);
    }

    #[test]
    fn quit_key_asks_the_worker_to_stop() {
        let mut tui = Tui::new("bucket");
        let sink = TuiProgress {
            state: tui.state.clone(),
        };
        assert!(!sink.cancelled());

        tui.handle_key(KeyEvent::from(KeyCode::Char('q')));

        assert!(sink.cancelled());
        assert!(tui.cancel_requested());
        assert_eq!(
            tui.state.lock().unwrap().status,
            "cancelling after the current item"
        );
    }
}

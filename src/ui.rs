//! Terminal User Interface for vigil.
//!
//! This module provides a real-time dashboard using `ratatui` that displays:
//!
//! - Header bar with host information and clock
//! - Overview panel with usage bars for CPU, memory, disks and network
//! - Top-process table ranked by resource score
//! - Event panel tailing the event log
//!
//! The dashboard is a pure reader: it polls the shared snapshot slot and
//! the event log tail on every frame and owns no monitoring state itself.
//!
//! # Controls
//!
//! - `q` or `Esc`: Quit
//! - `Ctrl+C`: Quit

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, List, ListItem, Paragraph},
    Frame, Terminal,
};

use crate::app::App;
use crate::events::{EventRecord, LogTailer, Severity};
use crate::snapshot::{MetricsSnapshot, SnapshotSlot};

/// How many tailed event lines are kept for display.
const EVENT_BUFFER: usize = 100;

/// Static host facts shown in the header.
struct HostInfo {
    hostname: String,
    os: String,
}

impl HostInfo {
    fn detect() -> Self {
        Self {
            hostname: sysinfo::System::host_name().unwrap_or_else(|| "unknown".into()),
            os: sysinfo::System::name().unwrap_or_else(|| std::env::consts::OS.into()),
        }
    }
}

/// Run the TUI event loop.
///
/// Reads the latest snapshot from `slot` and newly appended event lines
/// from `tailer` until the user quits or `running` is cleared externally.
///
/// # Arguments
///
/// * `slot` - Shared latest-snapshot holder fed by the monitor loop
/// * `tailer` - Tailer positioned on the event log
/// * `running` - Atomic flag to signal shutdown
/// * `interval` - Sampling interval, used to turn byte deltas into rates
pub fn run(
    slot: Arc<SnapshotSlot>,
    tailer: LogTailer,
    running: Arc<AtomicBool>,
    interval: Duration,
) -> std::io::Result<()> {
    enable_raw_mode()?;
    if let Err(e) = std::io::stdout().execute(EnterAlternateScreen) {
        let _ = disable_raw_mode();
        return Err(e);
    }

    let result = run_tui_loop(slot, tailer, &running, interval);

    // Always clean up terminal state
    let _ = disable_raw_mode();
    let _ = std::io::stdout().execute(LeaveAlternateScreen);

    result
}

/// Inner TUI loop - separated to ensure cleanup happens on any exit path.
fn run_tui_loop(
    slot: Arc<SnapshotSlot>,
    mut tailer: LogTailer,
    running: &Arc<AtomicBool>,
    interval: Duration,
) -> std::io::Result<()> {
    let backend = CrosstermBackend::new(std::io::stdout());
    let mut terminal = Terminal::new(backend)?;
    let host = HostInfo::detect();
    let mut event_lines: VecDeque<String> = VecDeque::with_capacity(EVENT_BUFFER);

    while running.load(Ordering::Relaxed) {
        // Check for input
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => {
                            running.store(false, Ordering::Relaxed);
                        }
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            running.store(false, Ordering::Relaxed);
                        }
                        _ => {}
                    }
                }
            }
        }

        // Pull newly appended event lines; a transient read failure just
        // leaves the panel as-is until the next frame.
        if let Ok(lines) = tailer.poll() {
            for line in lines {
                if event_lines.len() >= EVENT_BUFFER {
                    event_lines.pop_front();
                }
                event_lines.push_back(line);
            }
        }

        let latest = slot.latest();
        terminal.draw(|f| draw_ui(f, latest.as_deref(), &event_lines, &host, interval))?;
    }

    Ok(())
}

/// Main UI drawing function.
fn draw_ui(
    f: &mut Frame,
    latest: Option<&MetricsSnapshot>,
    event_lines: &VecDeque<String>,
    host: &HostInfo,
    interval: Duration,
) {
    let size = f.area();

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(10)])
        .split(size);

    draw_header(f, latest, host, main_chunks[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(main_chunks[1]);

    draw_overview(f, latest, interval, columns[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(columns[1]);

    draw_processes(f, latest, right[0]);
    draw_events(f, event_lines, right[1]);
}

/// Draw the top header bar.
fn draw_header(f: &mut Frame, latest: Option<&MetricsSnapshot>, host: &HostInfo, area: Rect) {
    let clock = latest.map(|m| m.datetime.clone()).unwrap_or_default();
    let text = format!(
        " vigil | {} | {} | {} | [q]uit",
        host.hostname, host.os, clock
    );

    let header = Paragraph::new(text)
        .style(Style::default().fg(Color::White).bg(Color::DarkGray))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .title("Status"),
        );

    f.render_widget(header, area);
}

/// Draw the overview panel: CPU, memory, disks and network.
fn draw_overview(f: &mut Frame, latest: Option<&MetricsSnapshot>, interval: Duration, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title("Overview");

    let Some(m) = latest else {
        f.render_widget(
            Paragraph::new("Collecting initial metrics...").block(block),
            area,
        );
        return;
    };

    let mut lines: Vec<Line> = Vec::new();

    let freq = if m.cpu_frequency_ghz > 0.0 {
        format!("{:.2} GHz", m.cpu_frequency_ghz)
    } else {
        String::new()
    };
    lines.push(usage_line("CPU ", m.cpu_percent as f64, &freq));

    let mem_detail = format!(
        "{}/{} ({} free)",
        format_size(m.memory_used_bytes),
        format_size(m.memory_total_bytes),
        format_size(m.memory_total_bytes.saturating_sub(m.memory_used_bytes)),
    );
    lines.push(usage_line("RAM ", m.memory_percent, &mem_detail));

    for disk in &m.disks {
        let label = format!("{:<4}", truncate(&disk.mount_path, 4));
        let detail = format!("{} free", format_size(disk.free_bytes));
        lines.push(usage_line(&label, disk.used_percent(), &detail));
    }

    let secs = interval.as_secs_f64().max(0.001);
    lines.push(Line::from(vec![
        Span::styled("Net  ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            "up {}  down {}",
            format_rate(m.net_sent_delta as f64 / secs),
            format_rate(m.net_recv_delta as f64 / secs),
        )),
    ]));

    f.render_widget(Paragraph::new(lines).block(block), area);
}

/// Draw the top-process table.
fn draw_processes(f: &mut Frame, latest: Option<&MetricsSnapshot>, area: Rect) {
    let mut items: Vec<ListItem> = vec![ListItem::new(Span::styled(
        format!("{:>7} {:<20} {:>6} {:>6}", "PID", "NAME", "CPU%", "MEM%"),
        Style::default().add_modifier(Modifier::BOLD),
    ))];

    if let Some(m) = latest {
        for p in &m.top_processes {
            items.push(ListItem::new(format!(
                "{:>7} {:<20} {:>6.1} {:>6.1}",
                p.pid,
                truncate(&p.name, 20),
                p.cpu_percent,
                p.memory_percent,
            )));
        }
    }

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title("Top Processes"),
    );
    f.render_widget(list, area);
}

/// Draw the event panel fed by the log tail.
fn draw_events(f: &mut Frame, event_lines: &VecDeque<String>, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title("Event Log");

    if event_lines.is_empty() {
        let placeholder = Paragraph::new(Span::styled(
            "No events yet...",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        ))
        .block(block);
        f.render_widget(placeholder, area);
        return;
    }

    // Show the newest lines that fit inside the panel.
    let visible = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = event_lines
        .iter()
        .skip(event_lines.len().saturating_sub(visible.max(1)))
        .map(|line| ListItem::new(Span::styled(line.clone(), event_style(line))))
        .collect();

    f.render_widget(List::new(items).block(block), area);
}

/// Style an event line by its parsed severity.
fn event_style(line: &str) -> Style {
    match EventRecord::parse_line(line).map(|r| r.severity) {
        Some(Severity::Warning) => Style::default()
            .fg(Color::Red)
            .add_modifier(Modifier::BOLD),
        Some(Severity::Action) => Style::default().fg(Color::Green),
        Some(Severity::Info) => Style::default().fg(Color::White),
        None => Style::default().fg(Color::DarkGray),
    }
}

/// Build one labeled usage-bar line, colored by severity band.
fn usage_line(label: &str, percent: f64, detail: &str) -> Line<'static> {
    let color = band_color(percent);
    Line::from(vec![
        Span::styled(
            format!("{label} "),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(usage_bar(percent, 20), Style::default().fg(color)),
        Span::raw(format!(" {percent:>3.0}%  ")),
        Span::styled(detail.to_string(), Style::default().fg(Color::DarkGray)),
    ])
}

/// Render a fixed-width bar like `███████░░░░░░░░░░░░░`.
fn usage_bar(percent: f64, width: usize) -> String {
    let clamped = percent.clamp(0.0, 100.0);
    let filled = (clamped / 100.0 * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// Color band: calm below 50%, watchful below 80%, alarmed above.
fn band_color(percent: f64) -> Color {
    if percent < 50.0 {
        Color::Green
    } else if percent < 80.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

/// Format a byte count with a binary-unit suffix.
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// Format a transfer rate in bytes per second.
fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", format_size(bytes_per_sec.max(0.0) as u64))
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max.saturating_sub(1)).collect::<String>() + "…"
    }
}

/// Run in headless mode (no TUI, one summary line per sample).
///
/// # Arguments
///
/// * `app` - Application instance
/// * `running` - Atomic flag to signal shutdown
pub fn run_headless(mut app: App, running: Arc<AtomicBool>) -> std::io::Result<()> {
    let interval = Duration::from_secs(app.config.interval_secs());
    let log_file = app.config.log_file.clone();

    println!("vigil - resource guardian");
    println!("=========================");
    println!("Event log: {log_file}");
    println!("Interval: {} seconds", interval.as_secs());
    println!("Press Ctrl+C to stop.\n");

    app.log_marker("monitor started");
    while running.load(Ordering::Relaxed) {
        let started = std::time::Instant::now();
        let m = app.tick();

        let secs = interval.as_secs_f64();
        println!(
            "[{}] CPU: {:5.1}% | Mem: {}/{} ({:.1}%) | Net: up {} down {}",
            m.datetime,
            m.cpu_percent,
            format_size(m.memory_used_bytes),
            format_size(m.memory_total_bytes),
            m.memory_percent,
            format_rate(m.net_sent_delta as f64 / secs),
            format_rate(m.net_recv_delta as f64 / secs),
        );

        while started.elapsed() < interval && running.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(100));
        }
    }
    app.log_marker("monitor stopped");

    println!("\nStopped. Events logged to {log_file}");
    Ok(())
}

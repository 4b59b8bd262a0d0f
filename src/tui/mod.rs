mod help;

use crate::dashboard::Dashboard;
use crate::model::{Dispatch, FieldView, TabView};
use crate::nav::{NavInput, NavState};
use crate::stream::{Severity, TabContent};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use help::draw_help;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Terminal,
};
use std::{io, time::Duration, time::Instant};

#[derive(Default)]
struct UiState {
    nav: NavState,
    info: String,
    show_help: bool,
}

/// Run the dashboard until the user quits, then shut it down.
pub async fn run(dash: Dashboard) -> Result<()> {
    // TUI runs in a dedicated thread to keep all blocking terminal I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || {
        let res = run_threaded(&dash);
        (dash, res)
    });

    let joined = tokio::task::spawn_blocking(move || ui_handle.join())
        .await
        .context("join TUI thread")?;
    match joined {
        Ok((dash, res)) => {
            dash.shutdown().await;
            res
        }
        Err(_) => Err(anyhow::anyhow!("TUI thread panicked")),
    }
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(dash: &Dashboard) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState::default();
    let tick_rate = dash.config().tick_rate;
    let mut last_tick = Instant::now();
    let mut drawn_revision = None;
    let mut dirty = true;

    let res = loop {
        let revision = dash.revision();
        if dirty || drawn_revision != Some(revision) || last_tick.elapsed() >= tick_rate {
            let view = dash.tab_view(state.nav.tab());
            terminal
                .draw(|f| match &view {
                    Ok(view) => draw(f.area(), f, dash, &state, view),
                    Err(e) => f.render_widget(Paragraph::new(e.to_string()), f.area()),
                })
                .ok();
            drawn_revision = Some(revision);
            last_tick = Instant::now();
            dirty = false;
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if !event::poll(Duration::from_millis(10)).unwrap_or(false) {
            continue;
        }
        let Ok(Event::Key(k)) = event::read() else {
            continue;
        };
        if k.kind != KeyEventKind::Press {
            continue;
        }
        dirty = true;

        let editing = state.nav.editing().is_some();
        let input = match (k.modifiers, k.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('c')) => break Ok(()),
            (_, KeyCode::Esc) if !editing && !state.show_help => break Ok(()),
            (_, KeyCode::Esc) if state.show_help => {
                state.show_help = false;
                continue;
            }
            (_, KeyCode::Char('?')) if !editing => {
                state.show_help = !state.show_help;
                continue;
            }
            (_, KeyCode::Tab) => NavInput::NextTab,
            (_, KeyCode::BackTab) => NavInput::PrevTab,
            (_, KeyCode::Up) => NavInput::PrevField,
            (_, KeyCode::Down) => NavInput::NextField,
            (_, KeyCode::Left) => NavInput::Left,
            (_, KeyCode::Right) => NavInput::Right,
            (_, KeyCode::Enter) => NavInput::Confirm,
            (_, KeyCode::Esc) => NavInput::Cancel,
            (_, KeyCode::Backspace) => NavInput::Backspace,
            (_, KeyCode::Char(c)) => NavInput::Char(c),
            _ => continue,
        };

        if let Some(commit) = state.nav.handle(input, dash) {
            state.info = match dash.trigger(commit.at, &commit.input) {
                Ok(Dispatch::Started(op)) => format!("{op} running…"),
                Ok(Dispatch::Completed(entry)) => entry.text,
                Err(e) => e.to_string(),
            };
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn draw(area: Rect, f: &mut ratatui::Frame, dash: &Dashboard, state: &UiState, view: &TabView) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let titles: Vec<Line> = (0..dash.tab_count())
        .filter_map(|i| dash.tab_title(i))
        .map(|t| Line::from(t.to_string()))
        .collect();
    let tabs = Tabs::new(titles)
        .select(state.nav.tab())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(dash.config().title.clone()),
        )
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    if state.show_help {
        draw_help(chunks[1], f);
    } else {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
            .split(chunks[1]);
        draw_fields(body[0], f, state, view);
        draw_messages(body[1], f, view);
    }

    let status = Paragraph::new(Line::from(vec![
        Span::styled(state.info.clone(), Style::default().fg(Color::Gray)),
        Span::raw("   "),
        Span::styled("? help  esc quit", Style::default().fg(Color::DarkGray)),
    ]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(status, chunks[2]);
}

fn field_line(idx: usize, field: &FieldView, state: &UiState) -> Line<'static> {
    let selected = idx == state.nav.field();
    let marker = if selected { "> " } else { "  " };
    let label_style = if selected {
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    let value = match state.nav.editing() {
        Some(buf) if selected && buf.at.field == idx => {
            let mut text = buf.text.clone();
            let at = text
                .char_indices()
                .nth(buf.cursor)
                .map_or(text.len(), |(i, _)| i);
            text.insert(at, '▏');
            Span::styled(text, Style::default().fg(Color::Cyan))
        }
        _ if field.value.contains('\n') => Span::raw(String::new()),
        _ => Span::raw(field.value.clone()),
    };

    let mut spans = vec![
        Span::raw(marker),
        Span::styled(field.label.clone(), label_style),
        Span::raw(if field.value.is_empty() { " " } else { ": " }),
        value,
    ];
    if field.in_flight() {
        spans.push(Span::styled(" [busy]", Style::default().fg(Color::Magenta)));
    } else if field.waiting_for_user {
        spans.push(Span::styled(" [waiting]", Style::default().fg(Color::Cyan)));
    }
    Line::from(spans)
}

fn draw_fields(area: Rect, f: &mut ratatui::Frame, state: &UiState, view: &TabView) {
    let lines: Vec<Line> = view
        .fields
        .iter()
        .enumerate()
        .map(|(i, field)| field_line(i, field, state))
        .collect();
    let p = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Fields"))
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Normal => Style::default(),
        Severity::Success => Style::default().fg(Color::Green),
        Severity::Warning => Style::default().fg(Color::Yellow),
        Severity::Error => Style::default().fg(Color::Red),
    }
}

fn message_line(entry: &TabContent) -> Line<'static> {
    Line::from(Span::styled(entry.format(), severity_style(entry.severity)))
}

fn draw_messages(area: Rect, f: &mut ratatui::Frame, view: &TabView) {
    // Keep the tail visible: borders take two rows.
    let rows = area.height.saturating_sub(2) as usize;
    let skip = view.contents.len().saturating_sub(rows);
    let lines: Vec<Line> = view.contents[skip..].iter().map(message_line).collect();
    let p = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Messages"))
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);
}

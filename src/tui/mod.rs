mod export;
mod help;
mod state;

use crate::cli::{build_config, Cli};
use crate::metrics;
use crate::model::{ResultsState, UploadState};
use crate::orchestrator::{self, PipelineContext, PipelineEvent, StageView, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table, Tabs},
    Terminal,
};
use state::UiState;
use std::path::PathBuf;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    let ctx = PipelineContext::new(build_config(&args)?)?;

    // Unbounded channels avoid backpressure between the UI thread and the driver.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(event_rx, cmd_tx));

    let res = orchestrator::run_controller(ctx, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    mut event_rx: UnboundedReceiver<PipelineEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState::default();
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            state.apply_event(ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if state.editing_path {
                    handle_path_key(&mut state, &cmd_tx, k.code);
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Tab) => state.tab = (state.tab + 1) % 2,
                    (_, KeyCode::Char('?')) => state.tab = 1,
                    _ if state.tab != 0 => {}
                    (_, code) => handle_stage_key(&mut state, &cmd_tx, code),
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

/// Keys while the path prompt is open.
fn handle_path_key(state: &mut UiState, cmd_tx: &UnboundedSender<UiCommand>, code: KeyCode) {
    match code {
        KeyCode::Enter => {
            state.editing_path = false;
            let path = state.path_input.trim();
            let path = (!path.is_empty()).then(|| PathBuf::from(path));
            let _ = cmd_tx.send(UiCommand::ChooseFile { path });
        }
        KeyCode::Esc => {
            state.editing_path = false;
            let _ = cmd_tx.send(UiCommand::ChooseFile { path: None });
        }
        KeyCode::Backspace => {
            state.path_input.pop();
        }
        KeyCode::Char(c) => state.path_input.push(c),
        _ => {}
    }
}

fn stage_index(view: &StageView) -> usize {
    match view {
        StageView::Upload(_) => 0,
        StageView::Selection { .. } => 1,
        StageView::Results(_) => 2,
    }
}

fn handle_stage_key(state: &mut UiState, cmd_tx: &UnboundedSender<UiCommand>, code: KeyCode) {
    let send = |cmd| {
        let _ = cmd_tx.send(cmd);
    };
    let stage = stage_index(&state.view);
    match (stage, code) {
        (_, KeyCode::Char('b')) | (_, KeyCode::Esc) => send(UiCommand::Back),

        (0, KeyCode::Char('o')) => {
            state.editing_path = true;
            state.info = "Enter a CSV path, then press Enter".into();
        }
        (0, KeyCode::Enter) => send(UiCommand::PrepareAndLoad),
        (0, KeyCode::Char('r')) => send(UiCommand::Retry),
        (0, KeyCode::Char('x')) => {
            state.path_input.clear();
            send(UiCommand::ClearSelection);
        }

        (1, KeyCode::Up | KeyCode::Char('k')) => state.move_cursor(false),
        (1, KeyCode::Down | KeyCode::Char('j')) => state.move_cursor(true),
        (1, KeyCode::Char(' ')) => {
            if let Some(name) = state.cursor_algorithm() {
                send(UiCommand::ToggleAlgorithm(name.to_string()));
            }
        }
        (1, KeyCode::Enter) => send(UiCommand::Run),
        (1, KeyCode::Char('a')) => send(UiCommand::Acknowledge),

        (2, KeyCode::Char('r')) => {
            send(UiCommand::Refresh);
            state.info = "Refreshed".into();
        }
        (2, KeyCode::Char('e')) => export::export_and_show_path(state, false),
        (2, KeyCode::Char('c')) => export::export_and_show_path(state, true),
        (2, KeyCode::Char('y')) => {
            state.info = match state.last_exported_path.as_deref() {
                Some(path) => match export::copy_to_clipboard(path) {
                    Ok(()) => format!("✓ Copied to clipboard: {path}"),
                    Err(e) => format!("Clipboard copy failed: {e:#}"),
                },
                None => "No exported file path to copy. Export a file first (e/c)".into(),
            };
        }
        _ => {}
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Pipeline"), Line::from("Help")])
        .select(state.tab)
        .block(Block::default().borders(Borders::ALL).title("automl-cli"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_pipeline(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }
}

fn draw_pipeline(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let current = stage_index(&state.view);
    let steps: Vec<Span> = ["1 Upload", "2 Select", "3 Results"]
        .iter()
        .enumerate()
        .flat_map(|(i, label)| {
            let style = if i == current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            let sep = if i == 0 { "" } else { "  ›  " };
            [Span::raw(sep), Span::styled(*label, style)]
        })
        .collect();
    let header = Paragraph::new(vec![Line::from(steps), state.status_line()])
        .block(Block::default().borders(Borders::NONE));
    f.render_widget(header, chunks[0]);

    match &state.view {
        StageView::Upload(upload) => draw_upload(chunks[1], f, state, upload),
        StageView::Selection { entries, .. } => draw_selection(chunks[1], f, state, entries),
        StageView::Results(results) => draw_results(chunks[1], f, results),
    }

    let footer = Paragraph::new(state.info.clone())
        .block(Block::default().borders(Borders::ALL).title("Info"));
    f.render_widget(footer, chunks[2]);
}

fn draw_upload(area: Rect, f: &mut ratatui::Frame, state: &UiState, upload: &UploadState) {
    let cursor = if state.editing_path { "▏" } else { "" };
    let mut lines = vec![Line::from(vec![
        Span::styled("Path: ", Style::default().fg(Color::Gray)),
        Span::raw(format!("{}{cursor}", state.path_input)),
    ])];
    if let UploadState::FileChosen { source, .. } = upload {
        lines.push(Line::from(vec![
            Span::styled("Source: ", Style::default().fg(Color::Gray)),
            Span::raw(source.display().to_string()),
        ]));
    }
    if let UploadState::LoadSucceeded { handle, .. } = upload {
        lines.push(Line::from(vec![
            Span::styled("Copy: ", Style::default().fg(Color::Gray)),
            Span::raw(handle.path.display().to_string()),
        ]));
    }
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Upload"));
    f.render_widget(p, area);
}

fn draw_selection(
    area: Rect,
    f: &mut ratatui::Frame,
    state: &UiState,
    entries: &[(String, bool)],
) {
    let items: Vec<ListItem> = entries
        .iter()
        .enumerate()
        .map(|(i, (name, on))| {
            let mark = if *on { "[x]" } else { "[ ]" };
            let style = if i == state.cursor {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(Span::styled(format!("{mark} {name}"), style)))
        })
        .collect();
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Algorithms"));
    f.render_widget(list, area);
}

fn draw_results(area: Rect, f: &mut ratatui::Frame, results: &ResultsState) {
    let ResultsState::Succeeded { results } = results else {
        let p = Paragraph::new("Nothing to show. Press 'r' to refresh or 'b' to go back.")
            .block(Block::default().borders(Borders::ALL).title("Results"));
        f.render_widget(p, area);
        return;
    };

    let summary = metrics::summarize(results);
    let header = Row::new(["Algorithm", "Accuracy", "AUC-ROC", "Loss", "Time (ms)"])
        .style(Style::default().fg(Color::Gray));
    let rows = results.iter().map(|r| {
        let best = summary.best.as_ref().is_some_and(|(name, _)| *name == r.algorithm);
        let style = if best {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(r.algorithm.clone()),
            Cell::from(format!("{:.4}", r.accuracy)),
            Cell::from(format!("{:.4}", r.auc_roc)),
            Cell::from(format!("{:.4}", r.loss)),
            Cell::from(r.execution_time_ms.to_string()),
        ])
        .style(style)
    });
    let title = format!(
        "Results · mean accuracy {} · {} ms total",
        summary
            .mean_accuracy
            .map(|v| format!("{v:.4}"))
            .unwrap_or_else(|| "-".into()),
        summary.total_time_ms
    );
    let table = Table::new(
        rows,
        [
            Constraint::Min(20),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(table, area);
}

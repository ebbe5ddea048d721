use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key(k: &'static str, pad: usize, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(k, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(desc),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit"),
        ]),
        key("tab", 9, "Switch tabs"),
        key("?", 11, "Show this help"),
        key("b / Esc", 5, "Previous stage"),
        Line::from(""),
        Line::from("Upload:"),
        key("o", 11, "Type a file path (Enter confirms, Esc cancels)"),
        key("Enter", 7, "Load the chosen file"),
        key("r", 11, "Retry after a failure"),
        key("x", 11, "Clear the loaded dataset"),
        Line::from(""),
        Line::from("Selection:"),
        key("↑/↓ j/k", 5, "Move"),
        key("Space", 7, "Toggle algorithm"),
        key("Enter", 7, "Run selected algorithms"),
        key("a", 11, "Dismiss an error"),
        Line::from(""),
        Line::from("Results:"),
        key("r", 11, "Refresh"),
        key("e", 11, "Export as JSON"),
        key("c", 11, "Export as CSV"),
        key("y", 11, "Copy exported path to clipboard"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}

use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(key: &'static str, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{key:<12}"), Style::default().fg(Color::Magenta)),
        Span::raw(desc),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key_line("tab / →", "Next tab"),
        key_line("shift-tab / ←", "Previous tab"),
        key_line("↑ / ↓", "Select field"),
        key_line("enter", "Edit field, confirm edit, or run action"),
        key_line("esc", "Cancel edit (quit when not editing)"),
        key_line("ctrl-c", "Quit"),
        key_line("?", "Toggle this help"),
        Line::from(""),
        Line::from("Fields marked [busy] are running; confirming them again is rejected."),
        Line::from("Fields marked [waiting] take typed input directly."),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}

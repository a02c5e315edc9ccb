use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use macroflow_core::types::EntityKind;

use crate::App;

pub fn draw(f: &mut Frame, app: &App) {
    let columns = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(f.area())
    } else {
        Layout::default().constraints([Constraint::Percentage(100)]).split(f.area())
    };

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Percentage(50), Constraint::Min(0)])
        .split(columns[0]);

    draw_banner(f, app, left[0]);
    draw_entries(f, app, left[1]);
    draw_output(f, app, left[2]);

    if app.log_visible && columns.len() > 1 {
        draw_logs(f, app, columns[1]);
    }

    if let Some(dialog) = &app.confirm {
        dialog.render(f);
    }
}

fn draw_banner(f: &mut Frame, app: &App, area: Rect) {
    let (label, bg) = match &app.running {
        Some(name) => (format!("RUNNING {}", name), Color::Yellow),
        None => ("IDLE (Enter to run)".to_string(), Color::Green),
    };
    let pad_total = (area.width as usize).saturating_sub(label.chars().count());
    let pad_left = pad_total / 2;
    let text = format!("{}{}{}", " ".repeat(pad_left), label, " ".repeat(pad_total - pad_left));
    let banner = Paragraph::new(Line::from(Span::styled(
        text,
        Style::default().fg(Color::Black).bg(bg).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(banner, area);
}

fn key(k: &'static str) -> Span<'static> {
    Span::styled(k, Style::default().fg(Color::Yellow))
}

fn draw_entries(f: &mut Frame, app: &App, area: Rect) {
    let mut lines = vec![
        Line::from(vec![
            Span::raw(" "),
            key("j/k"),
            Span::raw(" move, "),
            key("enter"),
            Span::raw(" run, "),
            key("c"),
            Span::raw(" clear, "),
            key("d"),
            Span::raw(" delete, "),
            key("r"),
            Span::raw(" reload"),
        ]),
        Line::from(""),
    ];

    if app.entries.is_empty() {
        lines.push(Line::from(Span::styled("  no actions or prompts saved", Style::default().fg(Color::DarkGray))));
    }

    for (i, entry) in app.entries.iter().enumerate() {
        let marker = if i == app.selected { "> " } else { "  " };
        let (tag, tag_color) = match entry.kind {
            EntityKind::Action => ("[action]", Color::LightBlue),
            EntityKind::Prompt => ("[prompt]", Color::Magenta),
        };
        let mut spans = vec![
            Span::raw(marker),
            Span::styled(tag, Style::default().fg(tag_color)),
            Span::raw(" "),
            Span::styled(entry.template.name.clone(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        ];
        let vars: Vec<&str> = entry.template.variables.iter().map(|v| v.name.as_str()).collect();
        if !vars.is_empty() {
            spans.push(Span::styled(format!("  <{}>", vars.join("> <")), Style::default().fg(Color::DarkGray)));
        }
        lines.push(Line::from(spans));
    }

    let list = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(list, area);
}

fn draw_output(f: &mut Frame, app: &App, area: Rect) {
    let lines: Vec<Line> = app
        .output
        .iter()
        .map(|l| {
            let style = if l.starts_with("$ ") {
                Style::default().fg(Color::Cyan)
            } else if l.starts_with("exit ") && l != "exit 0" {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            Line::from(Span::styled(l.as_str(), style))
        })
        .collect();
    let panel = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Output ")
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(panel, area);
}

fn draw_logs(f: &mut Frame, app: &App, area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let total = app.log_messages.len();
    let scroll = app.log_scroll.min(total.saturating_sub(visible));
    let start = total.saturating_sub(visible + scroll);
    let end = total.saturating_sub(scroll);
    let lines: Vec<Line> = app.log_messages[start..end].iter().map(|m| parse_log_line(m)).collect();

    let panel = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Logs ")
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(panel, area);
}

fn prefix_color(idx: u8) -> Color {
    match idx {
        1 => Color::DarkGray,  // COLOR_GRAY
        2 => Color::LightBlue, // COLOR_BLUE
        3 => Color::Green,     // COLOR_GREEN
        _ => Color::White,
    }
}

/// Turn a `level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage` record into a
/// coloured line. Anything else is shown as-is.
fn parse_log_line(raw: &str) -> Line<'_> {
    let parts: Vec<&str> = raw.splitn(5, '\x1f').collect();
    let [level, prefix, color, ts, message] = parts[..] else {
        return Line::from(raw);
    };
    let color = prefix_color(color.parse().unwrap_or(0));

    let mut spans = vec![Span::styled(ts, Style::default().fg(Color::DarkGray)), Span::raw(" ")];
    match level {
        "ERROR" => spans.push(Span::styled("error ", Style::default().fg(Color::Red))),
        "WARN" => spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow))),
        _ => {}
    }
    if !prefix.is_empty() {
        spans.push(Span::styled(prefix, Style::default().fg(color).add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(message, Style::default().fg(color)));
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_log_lines_are_split() {
        let line = parse_log_line("WARN\x1fpaste\x1f3\x1f12:00:01\x1fchunk 2/3 failed");
        let text: Vec<&str> = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, vec!["12:00:01", " ", "warn ", "paste", " ", "chunk 2/3 failed"]);
        assert_eq!(line.spans[3].style.fg, Some(Color::Green));
    }

    #[test]
    fn plain_lines_pass_through() {
        let line = parse_log_line("just text");
        assert_eq!(line.spans.len(), 1);
    }
}

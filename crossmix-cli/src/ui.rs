use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph},
    Terminal,
};

use crate::controls::{MixView, RowPhase};

const KEYS: &str = "t restart at first transition   r restart   q stop and quit";

/// Header, mix progress, per-segment timeline, recent logs and key help.
pub fn draw_status(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    title: &str,
    view: &MixView,
    log_lines: &[String],
) {
    let _ = terminal.draw(|f| {
        let timeline_height = (view.timeline.len() as u16 + 2).clamp(3, 14);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(3),
                Constraint::Length(timeline_height),
                Constraint::Min(3),
                Constraint::Length(1),
            ])
            .split(f.size());

        let header = Line::from(vec![
            Span::styled(
                "xmix ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("{}   ", title)),
            Span::styled(view.state, Style::default().fg(Color::Yellow)),
        ]);
        f.render_widget(Paragraph::new(header), chunks[0]);

        let progress = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Mix"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .ratio(view.ratio.clamp(0.0, 1.0))
            .label(view.clock.clone());
        f.render_widget(progress, chunks[1]);

        let rows: Vec<ListItem> = view
            .timeline
            .iter()
            .map(|row| {
                let style = match row.phase {
                    RowPhase::Played => Style::default().fg(Color::DarkGray),
                    RowPhase::Audible => Style::default()
                        .fg(Color::Green)
                        .add_modifier(Modifier::BOLD),
                    RowPhase::Upcoming => Style::default(),
                };
                ListItem::new(row.label.clone()).style(style)
            })
            .collect();
        let timeline = List::new(rows).block(
            Block::default()
                .borders(Borders::ALL)
                .title(view.now.clone()),
        );
        f.render_widget(timeline, chunks[2]);

        let log_height = chunks[3].height.saturating_sub(2) as usize;
        let start = log_lines.len().saturating_sub(log_height);
        let log_text = if log_lines.is_empty() {
            "No logs yet.".to_string()
        } else {
            log_lines[start..].join("\n")
        };
        let logs = Paragraph::new(log_text)
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title("Logs"));
        f.render_widget(logs, chunks[3]);

        f.render_widget(
            Paragraph::new(KEYS).style(Style::default().fg(Color::Blue)),
            chunks[4],
        );
    });
}

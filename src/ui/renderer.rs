use crate::core::app::App;
use crate::core::message::{MessageCategory, TranscriptMessage};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

const IDLE_HINT: &str =
    "Ask in plain language (!cmd runs directly, Tab completes, /help for help, Ctrl+C to quit)";

fn category_style(category: MessageCategory) -> Style {
    match category {
        MessageCategory::User => Style::default().fg(Color::Cyan),
        MessageCategory::Assistant => Style::default().fg(Color::Reset),
        MessageCategory::Command => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        MessageCategory::Output => Style::default().fg(Color::Reset),
        MessageCategory::System => Style::default().fg(Color::DarkGray),
        MessageCategory::Error => Style::default().fg(Color::Red),
    }
}

fn prefix(category: MessageCategory) -> &'static str {
    match category {
        MessageCategory::User => "You: ",
        MessageCategory::Assistant => "AI: ",
        _ => "",
    }
}

fn push_message_lines(lines: &mut Vec<Line<'static>>, message: &TranscriptMessage) {
    let style = category_style(message.category);
    let label = prefix(message.category);
    for (index, text) in message.text.lines().enumerate() {
        let mut spans = Vec::with_capacity(2);
        if index == 0 && !label.is_empty() {
            spans.push(Span::styled(label, style.add_modifier(Modifier::BOLD)));
        }
        spans.push(Span::styled(text.to_string(), style));
        lines.push(Line::from(spans));
    }
    if message.text.is_empty() {
        lines.push(Line::from(Span::styled(label, style)));
    }
    if matches!(
        message.category,
        MessageCategory::User | MessageCategory::Assistant | MessageCategory::Output
    ) {
        lines.push(Line::default());
    }
}

/// Transcript lines followed by any output still streaming in.
pub fn build_display_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for message in &app.transcript {
        push_message_lines(&mut lines, message);
    }
    if !app.live_output.is_empty() {
        let style = category_style(MessageCategory::Output);
        for text in app.live_output.lines() {
            lines.push(Line::from(Span::styled(text.to_string(), style)));
        }
    }
    lines
}

/// Rows `lines` occupy once wrapped to `width` columns.
pub fn wrapped_line_count(lines: &[Line<'_>], width: u16) -> u16 {
    let width = usize::from(width.max(1));
    let rows: usize = lines
        .iter()
        .map(|line| {
            let columns: usize = line
                .spans
                .iter()
                .map(|span| span.content.as_ref().width())
                .sum();
            columns.div_ceil(width).max(1)
        })
        .sum();
    u16::try_from(rows).unwrap_or(u16::MAX)
}

/// First visible row, given `offset` rows scrolled up from the bottom.
pub fn scroll_top(total_rows: u16, visible_rows: u16, offset: u16) -> u16 {
    let max_top = total_rows.saturating_sub(visible_rows);
    max_top.saturating_sub(offset.min(max_top))
}

/// Columns to shift the input so the cursor stays inside `inner_width`.
fn input_scroll(prefix_width: u16, inner_width: u16) -> u16 {
    prefix_width.saturating_sub(inner_width.saturating_sub(1))
}

fn input_title(app: &App) -> String {
    if app.is_busy() {
        format!("{}... (Ctrl+C interrupts, Esc kills)", app.phase.as_str())
    } else {
        IDLE_HINT.to_string()
    }
}

pub fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(1),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_transcript(f, app, chunks[0]);

    let status = app.status.clone().unwrap_or_default();
    f.render_widget(
        Paragraph::new(status).style(Style::default().fg(Color::DarkGray)),
        chunks[1],
    );

    draw_input(f, app, chunks[2]);
}

fn draw_transcript(f: &mut Frame, app: &App, area: Rect) {
    let lines = build_display_lines(app);
    let visible_rows = area.height.saturating_sub(1);
    let total_rows = wrapped_line_count(&lines, area.width);
    let top = scroll_top(total_rows, visible_rows, app.scroll_offset);

    let title = format!(
        "aiterm v{} - {} • Logging: {}",
        env!("CARGO_PKG_VERSION"),
        app.status_line(),
        app.logging.get_status_string()
    );

    let transcript = Paragraph::new(lines)
        .block(Block::default().title(title))
        .wrap(Wrap { trim: false })
        .scroll((top, 0));
    f.render_widget(transcript, area);
}

fn draw_input(f: &mut Frame, app: &App, area: Rect) {
    let inner_width = area.width.saturating_sub(2);
    let before_cursor: String = app.input.text.chars().take(app.input.cursor).collect();
    let prefix_width = u16::try_from(before_cursor.width()).unwrap_or(u16::MAX);
    let shift = input_scroll(prefix_width, inner_width);

    let input_style = if app.is_busy() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Cyan)
    };

    let input = Paragraph::new(app.input.text.as_str())
        .style(input_style)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Reset))
                .title(input_title(app)),
        )
        .scroll((0, shift));
    f.render_widget(input, area);

    let cursor_x = area.x + 1 + prefix_width.saturating_sub(shift);
    f.set_cursor_position((cursor_x, area.y + 1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::DispatchSettings;
    use crate::core::events::{self, TurnPhase};
    use crate::utils::logging::LoggingState;
    use crate::utils::test_utils::FakeModel;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use std::sync::Arc;

    fn test_app() -> App {
        let (tx, _rx) = events::channel();
        App::new(
            Arc::new(FakeModel::with_replies(&[])),
            DispatchSettings::default(),
            LoggingState::new(None).expect("logging"),
            tx,
        )
    }

    fn render(app: &App, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).expect("terminal");
        terminal.draw(|f| ui(f, app)).expect("draw");
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn messages_get_role_prefixes() {
        let mut app = test_app();
        app.push_message(TranscriptMessage::user("list files"));
        app.push_message(TranscriptMessage::command("[/srv]$ ls"));
        app.push_message(TranscriptMessage::output("a.txt\nb.txt"));
        app.push_message(TranscriptMessage::assistant("Done."));

        let text: Vec<String> = build_display_lines(&app)
            .iter()
            .map(|line| line.to_string())
            .collect();
        assert_eq!(
            text,
            vec![
                "You: list files",
                "",
                "[/srv]$ ls",
                "a.txt",
                "b.txt",
                "",
                "AI: Done.",
                "",
            ]
        );
    }

    #[test]
    fn live_output_follows_transcript() {
        let mut app = test_app();
        app.push_message(TranscriptMessage::command("[/srv]$ make"));
        app.live_output.push_str("compiling\nlinking\n");
        let lines = build_display_lines(&app);
        let last: Vec<String> = lines.iter().rev().take(2).map(|l| l.to_string()).collect();
        assert_eq!(last, vec!["linking", "compiling"]);
    }

    #[test]
    fn wrapped_rows_count_long_lines() {
        let lines = vec![Line::from("x".repeat(25)), Line::default(), Line::from("short")];
        assert_eq!(wrapped_line_count(&lines, 10), 5);
    }

    #[test]
    fn scroll_offset_counts_from_the_bottom() {
        assert_eq!(scroll_top(50, 10, 0), 40);
        assert_eq!(scroll_top(50, 10, 15), 25);
        assert_eq!(scroll_top(50, 10, 100), 0);
        assert_eq!(scroll_top(5, 10, 3), 0);
    }

    #[test]
    fn input_scrolls_to_keep_cursor_visible() {
        assert_eq!(input_scroll(5, 20), 0);
        assert_eq!(input_scroll(30, 20), 11);
    }

    #[test]
    fn frame_shows_status_and_hint() {
        let mut app = test_app();
        app.add_system_message("Welcome");
        app.set_status("No completions.");
        app.input.set("ls -la".to_string(), 6);

        let screen = render(&app, 140, 12);
        assert!(screen.contains("aiterm v"));
        assert!(screen.contains("None (disconnected)"));
        assert!(screen.contains("Welcome"));
        assert!(screen.contains("No completions."));
        assert!(screen.contains("ls -la"));
        assert!(screen.contains("Ask in plain language"));

        app.phase = TurnPhase::Executing;
        let screen = render(&app, 140, 12);
        assert!(screen.contains("running... (Ctrl+C interrupts, Esc kills)"));
    }
}

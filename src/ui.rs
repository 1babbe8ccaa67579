use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Widget, Wrap},
};
use typebook::checkpoint::SaveStatus;
use typebook::session::Lifecycle;
use unicode_width::UnicodeWidthChar;

use crate::App;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;

/// Reference character as drawn; control characters get visible stand-ins
fn display_char(c: char) -> char {
    match c {
        '\n' => '↵',
        '\t' => '→',
        '\r' => ' ',
        c => c,
    }
}

/// Range of the reference to draw so the cursor stays in the upper third
pub fn visible_range(reference: &[char], cursor: usize, width: u16, height: u16) -> (usize, usize) {
    let width = width.max(1) as usize;
    let budget = width * height.max(1) as usize;
    let lead = width * (height as usize / 3);

    let mut start = cursor.min(reference.len());
    let mut used = 0;
    while start > 0 {
        let w = display_char(reference[start - 1]).width().unwrap_or(0);
        if used + w > lead {
            break;
        }
        used += w;
        start -= 1;
    }

    let mut end = start;
    let mut used = 0;
    while end < reference.len() {
        let w = display_char(reference[end]).width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        end += 1;
    }

    (start, end)
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let engine = &self.engine;
        let session = engine.session();
        let snapshot = engine.snapshot();
        let reference = session.reference();
        let typed = session.typed();

        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let green_style = Style::default().fg(Color::Green);
        let red_bold_style = Style::default()
            .patch(bold_style)
            .fg(Color::Red)
            .bg(Color::Rgb(90, 20, 20));
        let dim_style = Style::default().add_modifier(Modifier::DIM);
        let cursor_style = Style::default()
            .patch(bold_style)
            .add_modifier(Modifier::UNDERLINED | Modifier::SLOW_BLINK);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints(
                [
                    Constraint::Length(2), // title
                    Constraint::Length(1), // stats
                    Constraint::Length(1), // progress
                    Constraint::Min(3),    // text
                    Constraint::Length(1), // help
                ]
                .as_ref(),
            )
            .split(area);

        // title
        let book = engine.reference();
        let mut title = vec![
            Span::styled(book.title.clone(), bold_style),
            Span::styled(format!("  by {}", book.author), dim_style),
        ];
        if snapshot.lifecycle == Lifecycle::Completed {
            title.push(Span::styled(
                "  ✔ Completed",
                Style::default().patch(bold_style).fg(Color::Green),
            ));
        }
        Paragraph::new(Line::from(title)).render(chunks[0], buf);

        // stats
        let save = match &snapshot.save_status {
            SaveStatus::Idle | SaveStatus::Saved => Span::raw(""),
            SaveStatus::Saving => Span::styled("  saving progress…", Style::default().fg(Color::Blue)),
            SaveStatus::Failed(_) => Span::styled(
                "  saving failed, will retry",
                Style::default().fg(Color::Yellow),
            ),
        };
        let stats = Line::from(vec![
            Span::styled(format!("{} wpm", snapshot.wpm), Style::default().fg(Color::Cyan)),
            Span::raw("   "),
            Span::styled(format!("{}% acc", snapshot.accuracy), green_style),
            Span::raw("   "),
            Span::styled(
                format!("{} errors", snapshot.error_count),
                if snapshot.error_count > 0 {
                    Style::default().fg(Color::Red)
                } else {
                    Style::default()
                },
            ),
            Span::raw("   "),
            Span::styled(
                format!("{} / {} chars", snapshot.chars_typed, snapshot.total_chars),
                dim_style,
            ),
            save,
        ]);
        Paragraph::new(stats).render(chunks[1], buf);

        Gauge::default()
            .gauge_style(Style::default().fg(Color::Magenta))
            .ratio((snapshot.progress_percent / 100.0).clamp(0.0, 1.0))
            .label(format!("{}%", snapshot.progress_percent.round()))
            .render(chunks[2], buf);

        // text
        let text_block = Block::default().borders(Borders::TOP);
        let text_area = text_block.inner(chunks[3]);
        text_block.render(chunks[3], buf);

        let cursor = typed.len();
        let (start, end) = visible_range(reference, cursor, text_area.width, text_area.height);
        let spans = (start..end)
            .map(|idx| {
                let expected = display_char(reference[idx]).to_string();
                match typed.get(idx) {
                    Some(c) if *c == reference[idx] => Span::styled(expected, green_style),
                    Some(_) => Span::styled(expected, red_bold_style),
                    None if idx == cursor => Span::styled(expected, cursor_style),
                    None => Span::styled(expected, dim_style),
                }
            })
            .collect::<Vec<Span>>();

        Paragraph::new(Line::from(spans))
            .alignment(Alignment::Left)
            .wrap(Wrap { trim: false })
            .render(text_area, buf);

        // help
        let help = match snapshot.lifecycle {
            Lifecycle::Completed => "(r)etry  ·  (esc) back",
            Lifecycle::NotStarted => "start typing  ·  (esc) back",
            Lifecycle::InProgress => "(backspace) correct  ·  (esc) leave",
        };
        Paragraph::new(Span::styled(help, Style::default().add_modifier(Modifier::ITALIC)))
            .alignment(Alignment::Center)
            .render(chunks[4], buf);
    }
}

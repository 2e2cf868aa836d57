//! Full-screen error display.
//!
//! Used when the scope cannot start at all (bad configuration, engine thread
//! failure, unreadable `--open` file). Errors that happen while the scope is
//! running go to the status line instead.

use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Paragraph, Wrap},
};
use std::io::{self, Stdout};
use std::time::Duration;

const BACKGROUND: Color = Color::Rgb(140, 20, 20);

pub struct ErrorScreen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl ErrorScreen {
    /// Enters raw mode and the alternate screen.
    ///
    /// # Errors
    /// - If terminal cannot be initialized
    pub fn new() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(ErrorScreen { terminal })
    }

    /// Shows `title` and `detail` centered on a red screen until a key is
    /// pressed.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn show_error(&mut self, title: &str, detail: &str) -> anyhow::Result<()> {
        let lines = message_lines(title, detail);
        loop {
            self.terminal.draw(|frame| {
                let area = frame.area();
                let text_height = (lines.len() as u16 + 2).min(area.height);
                let [_, middle, _] = Layout::vertical([
                    Constraint::Fill(1),
                    Constraint::Length(text_height),
                    Constraint::Fill(1),
                ])
                .areas(area);
                let [_, text_area, _] = Layout::horizontal([
                    Constraint::Percentage(10),
                    Constraint::Percentage(80),
                    Constraint::Percentage(10),
                ])
                .areas(middle);

                frame.render_widget(
                    Paragraph::default().style(Style::default().bg(BACKGROUND)),
                    area,
                );
                let paragraph = Paragraph::new(lines.clone())
                    .alignment(Alignment::Center)
                    .wrap(Wrap { trim: true })
                    .style(Style::default().fg(Color::White).bg(BACKGROUND));
                frame.render_widget(paragraph, text_area);
            })?;

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Release {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for ErrorScreen {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Shows a fatal startup error, then restores the terminal.
pub fn report_fatal(title: &str, detail: &str) -> anyhow::Result<()> {
    let mut screen = ErrorScreen::new()?;
    screen.show_error(title, detail)?;
    screen.cleanup()
}

fn message_lines(title: &str, detail: &str) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(title.to_string()).bold(),
        Line::default(),
    ];
    lines.extend(detail.lines().map(|l| Line::from(l.to_string())));
    lines.push(Line::default());
    lines.push(Line::from("Press any key to exit").italic());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_lines_layout() {
        let lines = message_lines("Configuration Error", "bad level\nsee scopeline.toml");
        let text: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        assert_eq!(
            text,
            [
                "Configuration Error",
                "",
                "bad level",
                "see scopeline.toml",
                "",
                "Press any key to exit"
            ]
        );
    }
}

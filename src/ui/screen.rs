//! Terminal oscilloscope screen.
//!
//! Draws one [`ViewportSnapshot`] per frame on a braille canvas with the
//! grid, midline and axis labels, plus a one-line status footer. Keyboard
//! input is translated into [`ScopeCommand`]s for the command loop.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    symbols::Marker,
    widgets::{
        canvas::{Canvas, Context, Line as CanvasLine},
        Block, Paragraph,
    },
};
use std::io::{stdout, Stdout};
use std::time::Duration;

use crate::capture::{TriggerConfig, TriggerMode};
use crate::scope::{PlotArea, ViewportSnapshot, ZoomDirection};

const FOOTER_HEIGHT: u16 = 1;
/// Braille cells are 2 dots wide and 4 dots tall.
const DOTS_X: u16 = 2;
const DOTS_Y: u16 = 4;

const TRACE_COLOR: Color = Color::Rgb(206, 224, 220);
const GRID_COLOR: Color = Color::Rgb(60, 70, 72);
const LABEL_COLOR: Color = Color::Rgb(185, 207, 212);

/// User input translated for the command loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScopeCommand {
    /// No key, or a key without a binding
    Continue,
    Quit,
    ToggleAcquisition,
    ToggleMode,
    CycleLevel,
    CycleOverCount,
    /// Drag-style pan by a fraction of the plot width; positive moves back in time
    Pan(f64),
    /// Jump to a normalized position
    Seek(i64),
    Zoom(ZoomDirection),
    /// Step the amplitude knob
    Amplitude(f64),
    /// Step the time width knob
    TimeWidth(f64),
    Clear,
    Save,
    /// Terminal was resized
    Redraw,
}

/// Maps a key press to a command.
pub fn command_for_key(key: KeyEvent) -> ScopeCommand {
    if key.kind == KeyEventKind::Release {
        return ScopeCommand::Continue;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => ScopeCommand::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => ScopeCommand::Quit,
        KeyCode::Char(' ') => ScopeCommand::ToggleAcquisition,
        KeyCode::Char('m') => ScopeCommand::ToggleMode,
        KeyCode::Char('l') => ScopeCommand::CycleLevel,
        KeyCode::Char('o') => ScopeCommand::CycleOverCount,
        KeyCode::Left => ScopeCommand::Pan(0.1),
        KeyCode::Right => ScopeCommand::Pan(-0.1),
        KeyCode::Home => ScopeCommand::Seek(0),
        KeyCode::End => ScopeCommand::Seek(1000),
        KeyCode::Char('+') | KeyCode::Char('=') => ScopeCommand::Zoom(ZoomDirection::In),
        KeyCode::Char('-') => ScopeCommand::Zoom(ZoomDirection::Out),
        KeyCode::Char('{') => ScopeCommand::Amplitude(-5.0),
        KeyCode::Char('}') => ScopeCommand::Amplitude(5.0),
        KeyCode::Char('[') => ScopeCommand::TimeWidth(-5.0),
        KeyCode::Char(']') => ScopeCommand::TimeWidth(5.0),
        KeyCode::Char('c') => ScopeCommand::Clear,
        KeyCode::Char('s') => ScopeCommand::Save,
        _ => ScopeCommand::Continue,
    }
}

/// Everything the footer shows.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub running: bool,
    pub trigger: TriggerConfig,
    pub buffer_len: usize,
    pub rate_hz: u32,
    pub position: u32,
    pub time_width_ms: f64,
    pub dropped_chunks: u64,
    /// Last error or notice, shown until replaced
    pub message: Option<String>,
}

impl StatusLine {
    fn describe(&self) -> String {
        let mode = match self.trigger.mode {
            TriggerMode::Continuous => "cont".to_string(),
            TriggerMode::Triggered => {
                format!("trig >{}@{}", self.trigger.over_count, self.trigger.level)
            }
        };
        let seconds = self.buffer_len as f64 / self.rate_hz.max(1) as f64;
        let mut text = format!(
            "{mode} / {seconds:.2}s @ {}Hz / {:.2}ms / pos {}",
            self.rate_hz, self.time_width_ms, self.position
        );
        if self.dropped_chunks > 0 {
            text.push_str(&format!(" / dropped {}", self.dropped_chunks));
        }
        if let Some(message) = &self.message {
            text.push_str(" / ");
            text.push_str(message);
        }
        text
    }
}

/// Full-screen oscilloscope display.
pub struct ScopeTui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl ScopeTui {
    /// Enters raw mode and the alternate screen.
    ///
    /// # Errors
    /// - If terminal cannot be initialized
    pub fn new() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(ScopeTui { terminal })
    }

    /// Plot area matching the current terminal size, in braille dots.
    pub fn plot_area(&self) -> anyhow::Result<PlotArea> {
        let size = self.terminal.size()?;
        Ok(plot_area_for(Rect::new(0, 0, size.width, size.height)))
    }

    /// Draws a frame.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn render(&mut self, snapshot: &ViewportSnapshot, status: &StatusLine) -> anyhow::Result<()> {
        self.terminal.draw(|frame| {
            let (plot_rect, footer_rect) = split(frame.area());

            let plot = snapshot.area;
            let canvas = Canvas::default()
                .block(Block::bordered().border_style(Style::default().fg(GRID_COLOR)))
                .marker(Marker::Braille)
                .background_color(Color::Rgb(0, 0, 0))
                .x_bounds([plot.left, plot.right()])
                .y_bounds([plot.top, plot.bottom()])
                .paint(|ctx| paint(ctx, snapshot));
            frame.render_widget(canvas, plot_rect);

            let indicator = if status.running {
                Span::styled("● ", Style::default().fg(Color::Red))
            } else {
                Span::styled("■ ", Style::default().fg(Color::Yellow))
            };
            let footer = Paragraph::new(Line::from(vec![indicator, Span::raw(status.describe())]))
                .style(Style::default().fg(LABEL_COLOR).bg(Color::Rgb(0, 0, 0)));
            frame.render_widget(footer, footer_rect);
        })?;
        Ok(())
    }

    /// Waits briefly for a key and translates it.
    ///
    /// # Errors
    /// - If event polling fails
    pub fn handle_input(&mut self, timeout: Duration) -> anyhow::Result<ScopeCommand> {
        if event::poll(timeout)? {
            return Ok(match event::read()? {
                Event::Key(key) => command_for_key(key),
                Event::Resize(..) => ScopeCommand::Redraw,
                _ => ScopeCommand::Continue,
            });
        }
        Ok(ScopeCommand::Continue)
    }

    /// Leaves the alternate screen and restores the cursor.
    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for ScopeTui {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

fn split(area: Rect) -> (Rect, Rect) {
    let plot = Rect {
        height: area.height.saturating_sub(FOOTER_HEIGHT),
        ..area
    };
    let footer = Rect {
        y: area.y + plot.height,
        height: area.height.min(FOOTER_HEIGHT),
        ..area
    };
    (plot, footer)
}

/// Inside of the bordered plot block, measured in braille dots.
fn plot_area_for(area: Rect) -> PlotArea {
    let (plot, _) = split(area);
    let inner = Block::bordered().inner(plot);
    let columns = (inner.width * DOTS_X).max(1);
    let rows = (inner.height * DOTS_Y).max(1);
    PlotArea::new(0.0, 0.0, columns as f64, rows as f64).with_columns(columns as usize)
}

/// Snapshot coordinates grow downwards; the canvas grows upwards.
fn flip(plot: &PlotArea, y: f64) -> f64 {
    plot.top + plot.bottom() - y
}

/// Trace in canvas coordinates. Snapshot y grows with the sample value, which
/// on the upward canvas puts positive samples above the midline, next to the
/// positive amplitude labels.
fn trace_points(snapshot: &ViewportSnapshot) -> &[(f64, f64)] {
    &snapshot.points
}

/// Canvas y of amplitude label `i`; label 0 is the positive full scale.
fn amplitude_label_y(snapshot: &ViewportSnapshot, i: usize) -> f64 {
    let plot = &snapshot.area;
    flip(plot, plot.top + i as f64 * snapshot.grid_dy)
}

fn paint(ctx: &mut Context<'_>, snapshot: &ViewportSnapshot) {
    let plot = snapshot.area;

    if snapshot.grid_dx > 0.0 {
        let mut x = plot.left;
        while x <= plot.right() + 1e-9 {
            ctx.draw(&CanvasLine::new(x, plot.top, x, plot.bottom(), GRID_COLOR));
            x += snapshot.grid_dx;
        }
    }
    if snapshot.grid_dy > 0.0 {
        let mut y = plot.top;
        while y <= plot.bottom() + 1e-9 {
            ctx.draw(&CanvasLine::new(plot.left, y, plot.right(), y, GRID_COLOR));
            y += snapshot.grid_dy;
        }
    }
    ctx.draw(&CanvasLine::new(
        plot.left,
        plot.mid(),
        plot.right(),
        plot.mid(),
        LABEL_COLOR,
    ));
    ctx.layer();

    match trace_points(snapshot) {
        [(x, y)] => ctx.draw(&CanvasLine::new(*x, *y, *x, *y, TRACE_COLOR)),
        points => {
            for pair in points.windows(2) {
                let ((x1, y1), (x2, y2)) = (pair[0], pair[1]);
                ctx.draw(&CanvasLine::new(x1, y1, x2, y2, TRACE_COLOR));
            }
        }
    }
    ctx.layer();

    for (i, label) in snapshot.amplitude_labels.iter().enumerate() {
        ctx.print(plot.left, amplitude_label_y(snapshot, i), Span::styled(label.clone(), Style::default().fg(LABEL_COLOR)));
    }
    // Every other time label, so neighbours do not overlap on narrow terminals
    for (i, label) in snapshot.time_labels.iter().enumerate().step_by(2).skip(1) {
        let x = plot.left + i as f64 * snapshot.grid_dx;
        ctx.print(x, plot.top, Span::styled(label.clone(), Style::default().fg(LABEL_COLOR)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_key_bindings() {
        assert_eq!(command_for_key(key(KeyCode::Char(' '))), ScopeCommand::ToggleAcquisition);
        assert_eq!(command_for_key(key(KeyCode::Esc)), ScopeCommand::Quit);
        assert_eq!(command_for_key(key(KeyCode::Char('c'))), ScopeCommand::Clear);
        assert_eq!(
            command_for_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            ScopeCommand::Quit
        );
        assert_eq!(command_for_key(key(KeyCode::End)), ScopeCommand::Seek(1000));
        assert_eq!(
            command_for_key(key(KeyCode::Char('+'))),
            ScopeCommand::Zoom(ZoomDirection::In)
        );
        assert_eq!(command_for_key(key(KeyCode::Left)), ScopeCommand::Pan(0.1));
        assert_eq!(command_for_key(key(KeyCode::Char('{'))), ScopeCommand::Amplitude(-5.0));
        assert_eq!(command_for_key(key(KeyCode::Char('}'))), ScopeCommand::Amplitude(5.0));
        assert_eq!(command_for_key(key(KeyCode::Char('x'))), ScopeCommand::Continue);
    }

    #[test]
    fn test_plot_area_uses_braille_resolution() {
        // 80x25 terminal: 24 rows for the plot, minus the border
        let plot = plot_area_for(Rect::new(0, 0, 80, 25));
        assert_eq!(plot.width, 156.0);
        assert_eq!(plot.height, 88.0);
        assert_eq!(plot.columns, 156);
    }

    #[test]
    fn test_tiny_terminal_keeps_nonzero_area() {
        let plot = plot_area_for(Rect::new(0, 0, 1, 1));
        assert_eq!(plot.columns, 1);
        assert!(plot.height >= 1.0);
    }

    #[test]
    fn test_flip_inverts_vertical_axis() {
        let plot = PlotArea::new(0.0, 0.0, 100.0, 80.0);
        assert_eq!(flip(&plot, 0.0), 80.0);
        assert_eq!(flip(&plot, 80.0), 0.0);
        assert_eq!(flip(&plot, plot.mid()), 40.0);
    }

    #[test]
    fn test_full_scale_samples_sit_beside_matching_labels() {
        let plot = PlotArea::new(0.0, 0.0, 100.0, 80.0);
        // +full scale, midline, -full scale as compute_window lays them out
        let snapshot = ViewportSnapshot {
            points: vec![(0.0, 80.0), (50.0, 40.0), (99.0, 0.0)],
            area: plot,
            grid_dx: 10.0,
            grid_dy: 20.0,
            amplitude_labels: ["100.00%", "50.00%", "0.00%", "-50.00%", "-100.00%"]
                .map(String::from)
                .to_vec(),
            time_labels: Vec::new(),
            stride: 1,
        };

        let trace = trace_points(&snapshot);
        assert_eq!(trace[0].1, amplitude_label_y(&snapshot, 0));
        assert_eq!(trace[1].1, amplitude_label_y(&snapshot, 2));
        assert_eq!(trace[2].1, amplitude_label_y(&snapshot, 4));
        // the positive label is at the top of the upward canvas
        assert_eq!(amplitude_label_y(&snapshot, 0), plot.bottom());
    }

    #[test]
    fn test_status_line_text() {
        let mut status = StatusLine {
            running: true,
            trigger: TriggerConfig::default(),
            buffer_len: 22_050,
            rate_hz: 44_100,
            position: 1000,
            time_width_ms: 32.0,
            dropped_chunks: 0,
            message: None,
        };
        assert_eq!(status.describe(), "cont / 0.50s @ 44100Hz / 32.00ms / pos 1000");

        status.trigger.mode = TriggerMode::Triggered;
        status.trigger.level = 64;
        status.trigger.over_count = 5;
        status.dropped_chunks = 3;
        status.message = Some("saved".to_string());
        assert_eq!(
            status.describe(),
            "trig >5@64 / 0.50s @ 44100Hz / 32.00ms / pos 1000 / dropped 3 / saved"
        );
    }
}

//! Pan, zoom and amplitude state for the visible window, and the transform
//! that turns that window into a bounded set of plot points.
//!
//! Positions are in samples. The externally visible position indicator is a
//! normalized value in `0..=1000`; every mutation that can move the window
//! reports the corrected normalized value back so the indicator reflects any
//! clamping that took place. Out-of-range requests are never errors.

use super::buffer::BufferReader;

pub const MIN_AMP_SCALE: f64 = 32.0;
pub const MAX_AMP_SCALE: f64 = 32768.0;

/// Time width at knob value 0, in milliseconds.
pub const TIME_WIDTH_BASE_MS: f64 = 0.1;
/// Per-step growth of the time width knob (one decade every 20 steps).
pub const TIME_WIDTH_GROWTH: f64 = 1.122_018_454_301_963_3;

pub const DEFAULT_TIME_WIDTH_MS: f64 = 32.0;
pub const DEFAULT_AMP_SCALE: f64 = 1024.0;

/// Full-scale value of the normalized position indicator.
pub const POSITION_STEPS: u32 = 1000;

const KNOB_MAX: f64 = 100.0;
const ZOOM_IN_FACTOR: f64 = 0.8;
const ZOOM_OUT_FACTOR: f64 = 1.2;

const GRID_COLUMNS: usize = 10;
const GRID_ROWS: usize = 8;
const AMPLITUDE_LABELS: usize = GRID_ROWS + 1;
const TIME_LABELS: usize = GRID_COLUMNS + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    /// Taller trace (smaller amplitude scale)
    In,
    /// Flatter trace (larger amplitude scale)
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    position: usize,
    width: usize,
    amp_scale: f64,
    time_width_ms: f64,
    rate_hz: u32,
}

impl Viewport {
    pub fn new(rate_hz: u32) -> Self {
        Self {
            position: 0,
            width: samples_for(DEFAULT_TIME_WIDTH_MS, rate_hz),
            amp_scale: DEFAULT_AMP_SCALE,
            time_width_ms: DEFAULT_TIME_WIDTH_MS,
            rate_hz,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Window width in samples (`k`).
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn amp_scale(&self) -> f64 {
        self.amp_scale
    }

    pub fn time_width_ms(&self) -> f64 {
        self.time_width_ms
    }

    pub fn rate_hz(&self) -> u32 {
        self.rate_hz
    }

    /// Amplitude knob value equivalent to the current scale.
    pub fn amplitude_knob(&self) -> f64 {
        10.0 * (self.amp_scale.log2() - 5.0)
    }

    /// Time width knob value equivalent to the current width.
    pub fn time_width_knob(&self) -> f64 {
        (self.time_width_ms / TIME_WIDTH_BASE_MS).ln() / TIME_WIDTH_GROWTH.ln()
    }

    /// Normalized indicator value for the current position.
    pub fn normalized_position(&self, len: usize) -> u32 {
        if len <= self.width {
            return 0;
        }
        let max = (len - self.width) as u128;
        let position = (self.position as u128).min(max);
        (POSITION_STEPS as u128 * position / max) as u32
    }

    /// Snaps the window to the tail of the buffer.
    pub fn follow_latest(&mut self, len: usize) {
        self.position = len.saturating_sub(self.width);
    }

    /// Clamps a requested position into `0..=max(0, len - k)` and reports the
    /// normalized value of where the window ended up. Idempotent.
    pub fn correct_position(&mut self, requested: i64, len: usize) -> u32 {
        if requested < 0 || len <= self.width {
            self.position = 0;
            return 0;
        }
        let max = len - self.width;
        if requested as u64 > max as u64 {
            self.position = max;
            return POSITION_STEPS;
        }
        self.position = requested as usize;
        self.normalized_position(len)
    }

    /// Moves to a normalized position in `0..=1000`.
    pub fn set_position(&mut self, normalized: i64, len: usize) -> u32 {
        let requested = if len > self.width {
            let span = (len - self.width) as i128;
            (span * normalized as i128).div_euclid(POSITION_STEPS as i128)
        } else {
            0
        };
        let requested = requested.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        self.correct_position(requested, len)
    }

    /// Sets the time width from a knob in `0..=100` on an exponential scale,
    /// keeping the window centered where it was.
    pub fn set_time_width(&mut self, knob: f64, len: usize) -> u32 {
        let knob = knob.clamp(0.0, KNOB_MAX);
        self.set_time_width_ms(TIME_WIDTH_BASE_MS * TIME_WIDTH_GROWTH.powf(knob), len)
    }

    pub fn set_time_width_ms(&mut self, time_width_ms: f64, len: usize) -> u32 {
        let center = self.position as i64 + (self.width / 2) as i64;
        self.time_width_ms = time_width_ms;
        self.width = samples_for(time_width_ms, self.rate_hz);
        self.correct_position(center - (self.width / 2) as i64, len)
    }

    /// Sets the amplitude scale from a knob in `0..=100` on a log2 scale.
    pub fn set_amplitude(&mut self, knob: f64) {
        self.amp_scale = 2f64.powf(5.0 + knob / 10.0).clamp(MIN_AMP_SCALE, MAX_AMP_SCALE);
    }

    /// Wheel-style amplitude step. Returns the equivalent knob value.
    pub fn zoom_amplitude(&mut self, direction: ZoomDirection) -> f64 {
        let factor = match direction {
            ZoomDirection::In => ZOOM_IN_FACTOR,
            ZoomDirection::Out => ZOOM_OUT_FACTOR,
        };
        self.amp_scale = (self.amp_scale * factor).clamp(MIN_AMP_SCALE, MAX_AMP_SCALE);
        self.amplitude_knob()
    }

    /// Drag-style pan. Dragging right by `dx` plot units moves the window
    /// back in time by the same fraction of its width.
    pub fn pan(&mut self, dx: f64, plot_width: f64, len: usize) -> u32 {
        if plot_width <= 0.0 {
            return self.normalized_position(len);
        }
        let shift = (self.width as f64 * dx / plot_width).trunc() as i64;
        self.correct_position((self.position as i64).saturating_sub(shift), len)
    }

    /// Adopts the rate the device actually runs at, keeping the time width.
    pub fn set_rate(&mut self, rate_hz: u32, len: usize) -> u32 {
        self.rate_hz = rate_hz;
        self.width = samples_for(self.time_width_ms, rate_hz);
        self.correct_position(self.position as i64, len)
    }

    pub fn clear(&mut self) {
        self.position = 0;
    }
}

/// Number of samples spanning `time_width_ms` at `rate_hz`, at least one.
pub fn samples_for(time_width_ms: f64, rate_hz: u32) -> usize {
    ((time_width_ms * rate_hz as f64 / 1000.0).floor() as usize).max(1)
}

/// Drawing region, in the renderer's coordinates (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotArea {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    /// Horizontal resolution of the render target in pixels or cells
    pub columns: usize,
}

impl PlotArea {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
            columns: width.max(1.0) as usize,
        }
    }

    pub fn with_columns(mut self, columns: usize) -> Self {
        self.columns = columns;
        self
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn mid(&self) -> f64 {
        self.top + self.height / 2.0
    }
}

/// Immutable output of one compute pass, consumed by renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportSnapshot {
    pub points: Vec<(f64, f64)>,
    pub area: PlotArea,
    /// Horizontal distance between vertical grid lines
    pub grid_dx: f64,
    /// Vertical distance between horizontal grid lines
    pub grid_dy: f64,
    /// Top to bottom, percent of full scale
    pub amplitude_labels: Vec<String>,
    /// Left to right, milliseconds from the start of the record
    pub time_labels: Vec<String>,
    pub stride: usize,
}

/// Computes the plot for the window `viewport` currently selects.
pub fn compute_window(
    buffer: &BufferReader,
    viewport: &Viewport,
    area: &PlotArea,
) -> ViewportSnapshot {
    let points = {
        let visible = buffer.slice(viewport.position, viewport.width);
        plot_points(&visible, viewport.width, viewport.amp_scale, area)
    };
    let stride = stride_for(viewport.width, area.columns);

    ViewportSnapshot {
        points,
        area: *area,
        grid_dx: area.width / GRID_COLUMNS as f64,
        grid_dy: area.height / GRID_ROWS as f64,
        amplitude_labels: amplitude_labels(viewport.amp_scale),
        time_labels: time_labels(viewport.position, viewport.time_width_ms, viewport.rate_hz),
        stride,
    }
}

fn stride_for(width: usize, columns: usize) -> usize {
    (width / columns.max(1)).max(1)
}

/// Maps `visible` onto `k` evenly spaced x positions and keeps every
/// stride-th point. Nearest-neighbour decimation: peaks between kept
/// samples are not represented.
fn plot_points(visible: &[i16], k: usize, amp_scale: f64, area: &PlotArea) -> Vec<(f64, f64)> {
    if visible.is_empty() || k == 0 {
        return vec![(area.left, area.mid())];
    }

    let step = if k > 1 {
        area.width / (k - 1) as f64
    } else {
        0.0
    };
    let half_height = area.height / 2.0;
    let stride = stride_for(k, area.columns);

    visible
        .iter()
        .take(k)
        .enumerate()
        .step_by(stride)
        .map(|(i, &sample)| {
            let x = area.left + step * i as f64;
            let y = area.mid() + half_height * sample as f64 / amp_scale;
            (x, y.clamp(area.top, area.bottom()))
        })
        .collect()
}

fn amplitude_labels(amp_scale: f64) -> Vec<String> {
    let top = 100.0 * amp_scale / MAX_AMP_SCALE;
    let step = top / 4.0;
    (0..AMPLITUDE_LABELS)
        .map(|i| format!("{:.2}%", top - i as f64 * step))
        .collect()
}

fn time_labels(position: usize, time_width_ms: f64, rate_hz: u32) -> Vec<String> {
    let start = 1000.0 * position as f64 / rate_hz.max(1) as f64;
    let step = time_width_ms / GRID_COLUMNS as f64;
    (0..TIME_LABELS)
        .map(|i| format!("{:.2}ms", start + i as f64 * step))
        .collect()
}

//! Live and offline oscilloscope.
//!
//! Builds a [`Scope`] from the configuration file and command-line overrides,
//! then runs the draw/input loop until the user quits. SIGUSR1 toggles
//! acquisition so an external process can gate capture.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::capture::{CpalSource, SampleSource, SyntheticSource, TriggerMode};
use crate::config::ScopelineConfig;
use crate::scope::{Scope, ScopeError};
use crate::ui::{report_fatal, ScopeCommand, ScopeTui, StatusLine};

const FRAME_INTERVAL: Duration = Duration::from_millis(50);

/// Per-run overrides from the command line.
#[derive(Debug, Clone, Default)]
pub struct ScopeArgs {
    /// Saved buffer to show instead of starting live capture
    pub open: Option<PathBuf>,
    pub synthetic: bool,
    pub device: Option<String>,
    pub rate: Option<u32>,
}

/// Runs the oscilloscope screen.
///
/// # Errors
/// - If the configuration cannot be loaded
/// - If the scope engine or the terminal cannot be initialized
pub async fn handle_scope(args: ScopeArgs) -> anyhow::Result<()> {
    tracing::info!("=== scopeline started ===");

    let mut config = match ScopelineConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Failed to load configuration: {err:#}");
            report_fatal(
                "Configuration Error",
                &format!("{err:#}\n\nPlease check ~/.config/scopeline/scopeline.toml and try again."),
            )?;
            return Err(err.context("Configuration error"));
        }
    };
    apply_overrides(&mut config, &args);

    tracing::info!(
        "Configuration loaded: device={}, sample_rate={}Hz, chunk_size={}, mode={}",
        config.audio.device,
        config.audio.sample_rate,
        config.audio.chunk_size,
        config.trigger.mode
    );

    let source: Arc<dyn SampleSource> = if args.synthetic {
        Arc::new(SyntheticSource::new(true))
    } else {
        Arc::new(CpalSource::new(config.audio.device.clone()))
    };

    let mut scope = match config.scope_options().map(|options| Scope::new(source, options)) {
        Ok(Ok(scope)) => scope,
        Ok(Err(err)) => {
            report_fatal("Scope Error", &err.to_string())?;
            return Err(err.into());
        }
        Err(err) => {
            report_fatal("Configuration Error", &format!("{err:#}"))?;
            return Err(err);
        }
    };

    let mut message = None;
    match &args.open {
        Some(path) => {
            if let Err(err) = scope.load_file(path) {
                tracing::error!("{err}");
                report_fatal("Load Error", &err.to_string())?;
                return Err(err.into());
            }
            message = Some(format!("loaded {}", path.display()));
        }
        None => {
            if let Err(err) = scope.start() {
                message = Some(err.to_string());
            }
        }
    }

    let data_dir = config.data_dir()?;
    let mut tui = ScopeTui::new()?;

    let external_toggle = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&external_toggle))
        .map_err(|e| anyhow::anyhow!("Failed to register signal handler: {e}"))?;

    let mut session = Session {
        scope,
        data_dir,
        message,
    };
    let mut dirty = true;

    loop {
        if external_toggle.swap(false, Ordering::Relaxed) {
            tracing::info!("Received SIGUSR1: toggling acquisition");
            session.toggle_acquisition();
            dirty = true;
        }
        if let Some(err) = session.scope.take_failure() {
            tracing::error!("Acquisition stopped: {err}");
            session.message = Some(err.to_string());
            dirty = true;
        }

        if session.scope.take_changed() || dirty {
            let plot = tui.plot_area()?;
            let snapshot = session.scope.snapshot(&plot);
            tui.render(&snapshot, &session.status())?;
            dirty = false;
        }

        let command = tui.handle_input(FRAME_INTERVAL)?;
        match command {
            ScopeCommand::Continue => {}
            ScopeCommand::Quit => break,
            command => {
                let plot = tui.plot_area()?;
                session.apply(command, plot.width);
                dirty = true;
            }
        }
    }

    session.scope.stop();
    tui.cleanup()?;
    tracing::info!(
        "=== scopeline exiting with {} samples buffered ===",
        session.scope.state().buffer_len
    );
    Ok(())
}

/// Scope plus the bits of UI state that outlive a frame.
struct Session {
    scope: Scope,
    data_dir: PathBuf,
    message: Option<String>,
}

impl Session {
    fn apply(&mut self, command: ScopeCommand, plot_width: f64) {
        let result: Result<Option<String>, ScopeError> = match command {
            ScopeCommand::Continue | ScopeCommand::Quit | ScopeCommand::Redraw => Ok(None),
            ScopeCommand::ToggleAcquisition => {
                self.toggle_acquisition();
                return;
            }
            ScopeCommand::ToggleMode => {
                let mode = match self.scope.trigger().mode {
                    TriggerMode::Continuous => TriggerMode::Triggered,
                    TriggerMode::Triggered => TriggerMode::Continuous,
                };
                self.scope.set_mode(mode);
                Ok(None)
            }
            ScopeCommand::CycleLevel => {
                let mut next = self.scope.trigger();
                next.cycle_level();
                self.scope
                    .set_trigger_level(next.level)
                    .map(|_| Some(format!("level {}", next.level)))
            }
            ScopeCommand::CycleOverCount => {
                let mut next = self.scope.trigger();
                next.cycle_over_count();
                self.scope
                    .set_trigger_over_count(next.over_count)
                    .map(|_| Some(format!("over {}", next.over_count)))
            }
            ScopeCommand::Pan(fraction) => self
                .scope
                .pan(fraction * plot_width, plot_width)
                .map(|_| None),
            ScopeCommand::Seek(normalized) => self.scope.set_position(normalized).map(|_| None),
            ScopeCommand::Zoom(direction) => self.scope.zoom_amplitude(direction).map(|_| None),
            ScopeCommand::Amplitude(step) => {
                let knob = self.scope.state().viewport.amplitude_knob();
                self.scope.set_amplitude(next_knob(knob, step)).map(|_| None)
            }
            ScopeCommand::TimeWidth(step) => {
                let knob = self.scope.state().viewport.time_width_knob();
                self.scope
                    .set_time_width(next_knob(knob, step))
                    .map(|_| None)
            }
            ScopeCommand::Clear => self.scope.clear().map(|_| Some("cleared".to_string())),
            ScopeCommand::Save => {
                let path = default_save_path(&self.data_dir, Local::now());
                self.scope
                    .save_file(&path)
                    .map(|_| Some(format!("saved {}", path.display())))
            }
        };

        match result {
            Ok(Some(notice)) => self.message = Some(notice),
            Ok(None) => {}
            Err(err) => {
                tracing::error!("{err}");
                self.message = Some(err.to_string());
            }
        }
    }

    fn toggle_acquisition(&mut self) {
        if self.scope.is_running() {
            self.scope.stop();
            self.message = Some("stopping".to_string());
            return;
        }
        self.message = match self.scope.start() {
            Ok(()) => None,
            Err(err) => Some(err.to_string()),
        };
    }

    fn status(&self) -> StatusLine {
        let state = self.scope.state();
        StatusLine {
            running: self.scope.is_running(),
            trigger: self.scope.trigger(),
            buffer_len: state.buffer_len,
            rate_hz: state.viewport.rate_hz(),
            position: state.position_indicator,
            time_width_ms: state.viewport.time_width_ms(),
            dropped_chunks: self.scope.dropped_chunks(),
            message: self.message.clone(),
        }
    }
}

fn apply_overrides(config: &mut ScopelineConfig, args: &ScopeArgs) {
    if let Some(device) = &args.device {
        config.audio.device = device.clone();
    }
    if let Some(rate) = args.rate {
        config.audio.sample_rate = rate;
    }
}

/// Knob values snap to whole steps so repeated presses land on round settings.
fn next_knob(current: f64, step: f64) -> f64 {
    (current.round() + step).clamp(0.0, 100.0)
}

fn default_save_path(data_dir: &Path, now: DateTime<Local>) -> PathBuf {
    data_dir.join(format!("scope-{}.wav", now.format("%Y%m%d-%H%M%S")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = ScopelineConfig::default();
        let args = ScopeArgs {
            device: Some("2".to_string()),
            rate: Some(48_000),
            ..ScopeArgs::default()
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.audio.device, "2");
        assert_eq!(config.audio.sample_rate, 48_000);

        let mut untouched = ScopelineConfig::default();
        apply_overrides(&mut untouched, &ScopeArgs::default());
        assert_eq!(untouched, ScopelineConfig::default());
    }

    #[test]
    fn test_knob_steps_and_clamps() {
        assert_eq!(next_knob(50.3, 5.0), 55.0);
        assert_eq!(next_knob(2.0, -5.0), 0.0);
        assert_eq!(next_knob(99.0, 5.0), 100.0);
    }

    #[test]
    fn test_default_save_path_is_timestamped() {
        let now = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            default_save_path(Path::new("/data"), now),
            PathBuf::from("/data/scope-20260304-050607.wav")
        );
    }

    #[test]
    fn test_session_commands_update_scope() {
        let dir = tempfile::tempdir().unwrap();
        let scope = Scope::new(
            Arc::new(SyntheticSource::new(true)),
            Default::default(),
        )
        .unwrap();
        let mut session = Session {
            scope,
            data_dir: dir.path().to_path_buf(),
            message: None,
        };

        session.apply(ScopeCommand::ToggleMode, 100.0);
        assert_eq!(session.scope.trigger().mode, TriggerMode::Triggered);
        session.apply(ScopeCommand::CycleLevel, 100.0);
        assert_eq!(session.scope.trigger().level, 32);
        assert_eq!(session.message.as_deref(), Some("level 32"));

        session.scope.load_buffer(vec![1; 10]).unwrap();
        session.apply(ScopeCommand::Save, 100.0);
        let saved: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(saved.len(), 1);
        assert!(session.message.as_deref().unwrap().starts_with("saved "));

        session.apply(ScopeCommand::ToggleAcquisition, 100.0);
        assert!(session.scope.is_running());
        assert!(session.status().running);
        session.apply(ScopeCommand::ToggleAcquisition, 100.0);
        assert_eq!(session.message.as_deref(), Some("stopping"));
    }

    #[test]
    fn test_amplitude_keys_step_the_knob() {
        let dir = tempfile::tempdir().unwrap();
        let scope = Scope::new(
            Arc::new(SyntheticSource::new(true)),
            Default::default(),
        )
        .unwrap();
        let mut session = Session {
            scope,
            data_dir: dir.path().to_path_buf(),
            message: None,
        };
        assert_eq!(session.scope.state().viewport.amp_scale(), 1024.0);

        // knob 50 -> 60 doubles the scale
        session.apply(ScopeCommand::Amplitude(5.0), 100.0);
        session.apply(ScopeCommand::Amplitude(5.0), 100.0);
        let state = session.scope.state();
        assert!((state.viewport.amp_scale() - 2048.0).abs() < 1e-6);
        assert!((state.viewport.amplitude_knob() - 60.0).abs() < 1e-9);

        for _ in 0..30 {
            session.apply(ScopeCommand::Amplitude(-5.0), 100.0);
        }
        let state = session.scope.state();
        assert_eq!(state.viewport.amp_scale(), 32.0);
        assert!(state.viewport.amplitude_knob().abs() < 1e-9);
        assert!(session.message.is_none());
    }
}

//! Threads and channels that connect capture, buffering and display.
//!
//! A producer thread per acquisition session reads chunks, gates them and
//! hands them to the engine thread over a bounded channel. The engine thread
//! is the only writer of the stream buffer and the only owner of viewport
//! state: it serves both arriving chunks and control commands, and publishes
//! an immutable [`ViewportState`] after every change. Renderers read that
//! state and compute plot points on demand.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::buffer::{stream_buffer, BufferReader, BufferWriter};
use super::storage;
use super::viewport::{compute_window, PlotArea, Viewport, ViewportSnapshot, ZoomDirection};
use super::ScopeError;
use crate::capture::{keep, CaptureConfig, Chunk, ChunkReader, SampleSource, TriggerConfig, TriggerMode};

/// Startup parameters for a [`Scope`].
#[derive(Debug, Clone)]
pub struct ScopeOptions {
    pub capture: CaptureConfig,
    pub trigger: TriggerConfig,
    /// Chunks the handoff channel holds before backpressure applies
    pub queue_capacity: usize,
    pub time_width_ms: f64,
    pub amplitude_knob: f64,
}

impl Default for ScopeOptions {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            trigger: TriggerConfig::default(),
            queue_capacity: 64,
            time_width_ms: super::viewport::DEFAULT_TIME_WIDTH_MS,
            amplitude_knob: 50.0,
        }
    }
}

/// What the engine publishes after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportState {
    pub viewport: Viewport,
    pub buffer_len: usize,
    /// Normalized position in `0..=1000` for the position indicator
    pub position_indicator: u32,
    /// Bumped on every publish
    pub revision: u64,
}

enum Control {
    SetAmplitude(f64, Sender<f64>),
    ZoomAmplitude(ZoomDirection, Sender<f64>),
    SetTimeWidth(f64, Sender<u32>),
    SetPosition(i64, Sender<u32>),
    Pan {
        dx: f64,
        plot_width: f64,
        reply: Sender<u32>,
    },
    SetRate(u32),
    Clear,
    Replace(Vec<i16>),
    Shutdown,
}

struct Acquisition {
    cancel: CancellationToken,
    handle: JoinHandle<Result<(), ScopeError>>,
}

/// Handle to a running oscilloscope core.
pub struct Scope {
    source: Arc<dyn SampleSource>,
    capture: CaptureConfig,
    trigger: Arc<Mutex<TriggerConfig>>,
    buffer: BufferReader,
    chunk_tx: Sender<Chunk>,
    chunk_rx: Receiver<Chunk>,
    controls: Sender<Control>,
    state: watch::Receiver<ViewportState>,
    engine: Option<JoinHandle<()>>,
    acquisition: Option<Acquisition>,
    /// Failure of a reaped session that nobody has asked for yet
    failure: Option<ScopeError>,
    dropped_chunks: Arc<AtomicU64>,
}

impl Scope {
    /// Creates the buffer and spawns the engine thread. Acquisition starts
    /// idle.
    pub fn new(source: Arc<dyn SampleSource>, options: ScopeOptions) -> Result<Self, ScopeError> {
        let (writer, buffer) = stream_buffer();
        let (chunk_tx, chunk_rx) = channel::bounded(options.queue_capacity.max(1));
        let (controls, control_rx) = channel::unbounded();

        let mut viewport = Viewport::new(options.capture.sample_rate);
        viewport.set_time_width_ms(options.time_width_ms, 0);
        viewport.set_amplitude(options.amplitude_knob);

        let initial = ViewportState {
            viewport,
            buffer_len: 0,
            position_indicator: 0,
            revision: 0,
        };
        let (publish, state) = watch::channel(initial);

        let engine_chunks = chunk_rx.clone();
        let engine = Engine {
            writer,
            viewport,
            publish,
            revision: 0,
        };
        let engine = std::thread::Builder::new()
            .name("scope-engine".to_string())
            .spawn(move || engine.run(engine_chunks, control_rx))
            .map_err(|source| ScopeError::ThreadSpawn {
                name: "engine",
                source,
            })?;

        tracing::debug!(
            "Scope engine started: {}Hz, {} samples per chunk, queue of {} chunks",
            options.capture.sample_rate,
            options.capture.chunk_size,
            options.queue_capacity
        );

        Ok(Self {
            source,
            capture: options.capture,
            trigger: Arc::new(Mutex::new(options.trigger)),
            buffer,
            chunk_tx,
            chunk_rx,
            controls,
            state,
            engine: Some(engine),
            acquisition: None,
            failure: None,
            dropped_chunks: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Opens the source and starts the producer thread.
    ///
    /// Open failures are returned here and leave acquisition idle. Starting
    /// while a previous session is still running or winding down is
    /// rejected. A failure of the previous session stays available from
    /// [`Scope::take_failure`].
    pub fn start(&mut self) -> Result<(), ScopeError> {
        if self.is_running() {
            return Err(ScopeError::AlreadyRunning);
        }
        self.reap();

        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = channel::bounded::<Result<u32, ScopeError>>(1);
        let producer = Producer {
            trigger: Arc::clone(&self.trigger),
            chunk_tx: self.chunk_tx.clone(),
            chunk_rx: self.chunk_rx.clone(),
            cancel: cancel.clone(),
            dropped_chunks: Arc::clone(&self.dropped_chunks),
        };
        let source = Arc::clone(&self.source);
        let capture = self.capture;

        let handle = std::thread::Builder::new()
            .name("scope-producer".to_string())
            .spawn(move || {
                let reader = match source.open(&capture) {
                    Ok(reader) => {
                        let _ = ready_tx.send(Ok(reader.sample_rate()));
                        reader
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return Ok(());
                    }
                };
                producer.run(reader)
            })
            .map_err(|source| ScopeError::ThreadSpawn {
                name: "producer",
                source,
            })?;

        let opened = ready_rx.recv().unwrap_or_else(|_| {
            Err(ScopeError::HardwareOpen(
                "producer thread exited before opening the source".to_string(),
            ))
        });

        match opened {
            Ok(rate) => {
                self.acquisition = Some(Acquisition { cancel, handle });
                if rate != self.state.borrow().viewport.rate_hz() {
                    if let Err(e) = self.send(Control::SetRate(rate)) {
                        self.stop();
                        return Err(e);
                    }
                }
                tracing::info!("Acquisition started from {} at {}Hz", self.source.describe(), rate);
                Ok(())
            }
            Err(e) => {
                let _ = handle.join();
                tracing::error!("Failed to start acquisition: {}", e);
                Err(e)
            }
        }
    }

    /// Requests the producer to stop after its current read. Idempotent.
    pub fn stop(&self) {
        if let Some(acquisition) = &self.acquisition {
            if !acquisition.cancel.is_cancelled() {
                tracing::info!("Acquisition stop requested");
            }
            acquisition.cancel.cancel();
        }
    }

    /// Whether a producer thread is still alive.
    pub fn is_running(&self) -> bool {
        self.acquisition
            .as_ref()
            .is_some_and(|a| !a.handle.is_finished())
    }

    /// Returns the error the last finished session ended with, once.
    pub fn take_failure(&mut self) -> Option<ScopeError> {
        self.reap();
        self.failure.take()
    }

    /// Joins a finished producer and keeps its error until it is taken.
    fn reap(&mut self) {
        if self.is_running() {
            return;
        }
        let Some(acquisition) = self.acquisition.take() else {
            return;
        };
        let failure = match acquisition.handle.join() {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(ScopeError::HardwareRead(
                "producer thread panicked".to_string(),
            )),
        };
        if let Some(e) = failure {
            if let Some(unreported) = self.failure.replace(e) {
                tracing::error!("Unreported acquisition failure superseded: {}", unreported);
            }
        }
    }

    pub fn trigger(&self) -> TriggerConfig {
        *self.trigger.lock()
    }

    pub fn set_mode(&self, mode: TriggerMode) {
        self.trigger.lock().mode = mode;
        tracing::info!("Acquisition mode: {}", mode);
    }

    pub fn set_trigger_level(&self, level: u32) -> Result<(), ScopeError> {
        self.trigger.lock().set_level(level)
    }

    pub fn set_trigger_over_count(&self, over_count: u32) -> Result<(), ScopeError> {
        self.trigger.lock().set_over_count(over_count)
    }

    /// Returns the knob value after clamping.
    pub fn set_amplitude(&self, knob: f64) -> Result<f64, ScopeError> {
        self.request(|reply| Control::SetAmplitude(knob, reply))
    }

    /// Returns the amplitude knob value matching the new scale.
    pub fn zoom_amplitude(&self, direction: ZoomDirection) -> Result<f64, ScopeError> {
        self.request(|reply| Control::ZoomAmplitude(direction, reply))
    }

    /// Returns the corrected normalized position.
    pub fn set_time_width(&self, knob: f64) -> Result<u32, ScopeError> {
        self.request(|reply| Control::SetTimeWidth(knob, reply))
    }

    /// Returns the corrected normalized position.
    pub fn set_position(&self, normalized: i64) -> Result<u32, ScopeError> {
        self.request(|reply| Control::SetPosition(normalized, reply))
    }

    /// Returns the corrected normalized position.
    pub fn pan(&self, dx: f64, plot_width: f64) -> Result<u32, ScopeError> {
        self.request(|reply| Control::Pan {
            dx,
            plot_width,
            reply,
        })
    }

    pub fn clear(&self) -> Result<(), ScopeError> {
        self.send(Control::Clear)
    }

    /// Replaces the whole record, then shows its tail.
    pub fn load_buffer(&self, samples: Vec<i16>) -> Result<(), ScopeError> {
        self.send(Control::Replace(samples))
    }

    /// Loads a sample file. On error the record is left as it was.
    pub fn load_file(&self, path: &Path) -> Result<(), ScopeError> {
        let samples = storage::load_samples(path)?;
        self.load_buffer(samples)
    }

    pub fn export_buffer(&self) -> Vec<i16> {
        self.buffer.to_vec()
    }

    pub fn save_file(&self, path: &Path) -> Result<(), ScopeError> {
        let rate = self.state.borrow().viewport.rate_hz();
        storage::save_samples(path, &self.export_buffer(), rate)
    }

    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks.load(Ordering::Relaxed)
    }

    /// Latest published viewport state.
    pub fn state(&self) -> ViewportState {
        self.state.borrow().clone()
    }

    /// True once per published change; used by renderers to skip redraws.
    pub fn take_changed(&mut self) -> bool {
        let changed = self.state.has_changed().unwrap_or(false);
        if changed {
            self.state.borrow_and_update();
        }
        changed
    }

    /// Computes plot points for the current window.
    pub fn snapshot(&self, area: &PlotArea) -> ViewportSnapshot {
        let viewport = self.state.borrow().viewport;
        compute_window(&self.buffer, &viewport, area)
    }

    fn send(&self, control: Control) -> Result<(), ScopeError> {
        self.controls
            .send(control)
            .map_err(|_| ScopeError::EngineStopped)
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> Control) -> Result<T, ScopeError> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.send(make(reply_tx))?;
        reply_rx.recv().map_err(|_| ScopeError::EngineStopped)
    }

    #[cfg(test)]
    pub(crate) fn wait_for(
        &self,
        timeout: std::time::Duration,
        mut done: impl FnMut(&ViewportState) -> bool,
    ) -> ViewportState {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let state = self.state();
            if done(&state) || std::time::Instant::now() >= deadline {
                return state;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.stop();
        if let Some(acquisition) = self.acquisition.take() {
            let _ = acquisition.handle.join();
        }
        let _ = self.controls.send(Control::Shutdown);
        if let Some(engine) = self.engine.take() {
            let _ = engine.join();
        }
    }
}

/// Producer side of one acquisition session.
struct Producer {
    trigger: Arc<Mutex<TriggerConfig>>,
    chunk_tx: Sender<Chunk>,
    /// Used to discard the oldest queued chunk when the queue is full
    chunk_rx: Receiver<Chunk>,
    cancel: CancellationToken,
    dropped_chunks: Arc<AtomicU64>,
}

impl Producer {
    /// Reads until cancelled or the source fails. The cancel token is polled
    /// once per iteration, so stopping takes at most one read.
    fn run(self, mut reader: Box<dyn ChunkReader>) -> Result<(), ScopeError> {
        let mut kept = 0u64;
        let mut gated = 0u64;

        let result = loop {
            if self.cancel.is_cancelled() {
                break Ok(());
            }
            let chunk = match reader.read() {
                Ok(chunk) => chunk,
                Err(e) => break Err(e),
            };

            let trigger = *self.trigger.lock();
            if !keep(&chunk, &trigger) {
                gated += 1;
                continue;
            }
            kept += 1;
            if !self.hand_off(chunk, trigger.mode) {
                break Ok(());
            }
        };

        reader.close();
        match &result {
            Ok(()) => tracing::info!(
                "Acquisition stopped: {} chunks kept, {} gated out",
                kept,
                gated
            ),
            Err(e) => tracing::error!("Acquisition aborted after {} chunks: {}", kept, e),
        }
        result
    }

    /// Queues a kept chunk. Continuous mode never blocks and discards the
    /// oldest queued chunk when full; triggered mode waits for room.
    /// Returns false if the engine is gone.
    fn hand_off(&self, chunk: Chunk, mode: TriggerMode) -> bool {
        match mode {
            TriggerMode::Triggered => self.chunk_tx.send(chunk).is_ok(),
            TriggerMode::Continuous => {
                let mut chunk = chunk;
                loop {
                    match self.chunk_tx.try_send(chunk) {
                        Ok(()) => return true,
                        Err(TrySendError::Disconnected(_)) => return false,
                        Err(TrySendError::Full(rejected)) => {
                            if self.chunk_rx.try_recv().is_ok() {
                                let total = self.dropped_chunks.fetch_add(1, Ordering::Relaxed) + 1;
                                tracing::debug!("Handoff queue full, dropped oldest chunk ({} total)", total);
                            }
                            chunk = rejected;
                        }
                    }
                }
            }
        }
    }
}

/// Engine thread state: sole writer of the buffer and owner of the viewport.
struct Engine {
    writer: BufferWriter,
    viewport: Viewport,
    publish: watch::Sender<ViewportState>,
    revision: u64,
}

impl Engine {
    fn run(mut self, chunks: Receiver<Chunk>, controls: Receiver<Control>) {
        loop {
            let keep_running = crossbeam::select! {
                recv(chunks) -> chunk => match chunk {
                    Ok(chunk) => {
                        self.writer.append(&chunk);
                        self.viewport.follow_latest(self.writer.len());
                        self.publish();
                        true
                    }
                    Err(_) => false,
                },
                recv(controls) -> control => match control {
                    Ok(Control::Shutdown) | Err(_) => false,
                    Ok(control) => {
                        self.apply(control);
                        true
                    }
                },
            };
            if !keep_running {
                break;
            }
        }

        tracing::debug!("Scope engine stopped with {} samples buffered", self.writer.len());
    }

    /// Applies one command. State is published before any reply is sent, so
    /// a caller that got its answer also sees the new state.
    fn apply(&mut self, control: Control) {
        let len = self.writer.len();
        match control {
            Control::SetAmplitude(knob, reply) => {
                self.viewport.set_amplitude(knob);
                self.publish();
                let _ = reply.send(self.viewport.amplitude_knob());
            }
            Control::ZoomAmplitude(direction, reply) => {
                let knob = self.viewport.zoom_amplitude(direction);
                self.publish();
                let _ = reply.send(knob);
            }
            Control::SetTimeWidth(knob, reply) => {
                let position = self.viewport.set_time_width(knob, len);
                self.publish();
                let _ = reply.send(position);
            }
            Control::SetPosition(normalized, reply) => {
                let position = self.viewport.set_position(normalized, len);
                self.publish();
                let _ = reply.send(position);
            }
            Control::Pan {
                dx,
                plot_width,
                reply,
            } => {
                let position = self.viewport.pan(dx, plot_width, len);
                self.publish();
                let _ = reply.send(position);
            }
            Control::SetRate(rate) => {
                self.viewport.set_rate(rate, len);
                tracing::debug!("Viewport rate set to {}Hz", rate);
                self.publish();
            }
            Control::Clear => {
                self.writer.clear();
                self.viewport.clear();
                tracing::info!("Stream buffer cleared");
                self.publish();
            }
            Control::Replace(samples) => {
                self.writer.replace(samples);
                self.viewport.follow_latest(self.writer.len());
                self.publish();
            }
            Control::Shutdown => {}
        }
    }

    fn publish(&mut self) {
        self.revision += 1;
        let len = self.writer.len();
        self.publish.send_replace(ViewportState {
            viewport: self.viewport,
            buffer_len: len,
            position_indicator: self.viewport.normalized_position(len),
            revision: self.revision,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::source::scripted::ScriptedSource;
    use crate::capture::SyntheticSource;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn options(trigger: TriggerConfig) -> ScopeOptions {
        ScopeOptions {
            capture: CaptureConfig {
                sample_rate: 1000,
                chunk_size: 4,
            },
            trigger,
            queue_capacity: 64,
            time_width_ms: 6.0,
            amplitude_knob: 50.0,
        }
    }

    fn wait_idle(scope: &Scope) {
        let deadline = std::time::Instant::now() + WAIT;
        while scope.is_running() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!scope.is_running(), "producer did not stop");
    }

    /// Waits until the handoff queue is empty, then round-trips a command so
    /// the engine has finished appending whatever it took last.
    fn drain(scope: &Scope) {
        let deadline = std::time::Instant::now() + WAIT;
        while !scope.chunk_rx.is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(scope.chunk_rx.is_empty(), "queue did not drain");
        scope.set_position(0).unwrap();
    }

    #[test]
    fn test_kept_chunks_are_appended_in_order() {
        let chunks: Vec<Chunk> = (0..10)
            .map(|c| (0..4).map(|i| (c * 4 + i) as i16).collect())
            .collect();
        let expected: Vec<i16> = chunks.concat();
        let source = ScriptedSource::new(chunks);
        let closed = Arc::clone(&source.closed);

        let mut scope = Scope::new(Arc::new(source), options(TriggerConfig::default())).unwrap();
        scope.start().unwrap();

        let state = scope.wait_for(WAIT, |s| s.buffer_len == expected.len());
        assert_eq!(scope.export_buffer(), expected);
        // follow-latest: k = 6, len = 40
        assert_eq!(state.viewport.position(), 34);
        assert_eq!(state.position_indicator, 1000);

        wait_idle(&scope);
        assert!(matches!(scope.take_failure(), Some(ScopeError::HardwareRead(_))));
        assert!(scope.take_failure().is_none());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_triggered_mode_gates_chunks() {
        let quiet: Chunk = vec![0, 5, -5, 0];
        let two_peaks: Chunk = vec![100, -100, 0, 0];
        let one_peak: Chunk = vec![100, 0, 0, 0];
        let three_peaks: Chunk = vec![17, -17, 17, 0];
        let source = ScriptedSource::new(vec![
            quiet,
            two_peaks.clone(),
            one_peak,
            three_peaks.clone(),
        ]);
        let trigger = TriggerConfig {
            mode: TriggerMode::Triggered,
            level: 16,
            over_count: 1,
        };

        let mut scope = Scope::new(Arc::new(source), options(trigger)).unwrap();
        scope.start().unwrap();
        wait_idle(&scope);
        scope.wait_for(WAIT, |s| s.buffer_len == 8);

        assert_eq!(scope.export_buffer(), [two_peaks, three_peaks].concat());
    }

    #[test]
    fn test_stop_waits_for_at_most_one_read() {
        const READ: Duration = Duration::from_millis(50);
        let chunks: Vec<Chunk> = (0..200).map(|c| vec![c as i16; 4]).collect();
        let mut source = ScriptedSource::new(chunks);
        source.read_delay = READ;
        let closed = Arc::clone(&source.closed);

        let mut scope = Scope::new(Arc::new(source), options(TriggerConfig::default())).unwrap();
        scope.start().unwrap();
        std::thread::sleep(READ * 3 + READ / 2);

        let before = scope.export_buffer().len();
        let stop_requested = std::time::Instant::now();
        scope.stop();
        wait_idle(&scope);
        let elapsed = stop_requested.elapsed();
        drain(&scope);
        let after = scope.export_buffer().len();

        assert!(elapsed < READ * 3, "stop took {elapsed:?}");
        assert!(before > 0);
        assert!(after - before <= 4, "buffer grew from {before} to {after}");
        assert!(scope.take_failure().is_none());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chunks_queued_at_stop_are_appended() {
        let chunks: Vec<Chunk> = (0..40).map(|c| vec![100 + c as i16; 4]).collect();
        let source = ScriptedSource::new(chunks.clone());
        let trigger = TriggerConfig {
            mode: TriggerMode::Triggered,
            level: 16,
            over_count: 1,
        };
        let mut small_queue = options(trigger);
        small_queue.queue_capacity = 8;

        let mut scope = Scope::new(Arc::new(source), small_queue).unwrap();
        // Holding a read view keeps the engine stuck on its first append.
        let reader = scope.buffer.clone();
        let stall = reader.slice(0, 0);
        scope.start().unwrap();

        let deadline = std::time::Instant::now() + WAIT;
        while scope.chunk_rx.len() < 8 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(scope.chunk_rx.len(), 8);

        scope.stop();
        drop(stall);
        wait_idle(&scope);
        drain(&scope);

        // one chunk held by the engine, a full queue, maybe one blocked send
        let exported = scope.export_buffer();
        let appended = exported.len() / 4;
        assert!((9..=10).contains(&appended), "{appended} chunks appended");
        assert_eq!(exported, chunks[..appended].concat());
        assert_eq!(scope.dropped_chunks(), 0);
        assert!(scope.take_failure().is_none());
    }

    #[test]
    fn test_failure_survives_restart_until_taken() {
        let mut source = ScriptedSource::new(vec![vec![1, 2, 3, 4]]);
        source.read_delay = Duration::from_millis(30);
        let mut scope = Scope::new(Arc::new(source), options(TriggerConfig::default())).unwrap();
        scope.start().unwrap();
        wait_idle(&scope);

        // restart without asking for the first session's failure
        scope.start().unwrap();
        assert!(matches!(scope.take_failure(), Some(ScopeError::HardwareRead(_))));
        wait_idle(&scope);
        assert!(matches!(scope.take_failure(), Some(ScopeError::HardwareRead(_))));
        assert!(scope.take_failure().is_none());
    }

    #[test]
    fn test_open_failure_is_returned_synchronously() {
        let mut source = ScriptedSource::new(vec![vec![1, 2, 3, 4]]);
        source.fail_open = true;

        let mut scope = Scope::new(Arc::new(source), options(TriggerConfig::default())).unwrap();
        assert!(matches!(scope.start(), Err(ScopeError::HardwareOpen(_))));
        assert!(!scope.is_running());
        assert!(scope.take_failure().is_none());
        assert_eq!(scope.state().buffer_len, 0);
    }

    #[test]
    fn test_start_while_running_is_rejected_and_stop_is_idempotent() {
        let mut scope = Scope::new(
            Arc::new(SyntheticSource::new(true)),
            options(TriggerConfig::default()),
        )
        .unwrap();
        scope.start().unwrap();
        assert!(scope.is_running());
        assert!(matches!(scope.start(), Err(ScopeError::AlreadyRunning)));

        scope.stop();
        scope.stop();
        wait_idle(&scope);
        assert!(scope.take_failure().is_none());

        // A stopped scope can be started again.
        scope.start().unwrap();
        scope.stop();
        wait_idle(&scope);
    }

    #[test]
    fn test_load_export_round_trip_and_clear() {
        let scope = Scope::new(
            Arc::new(ScriptedSource::new(Vec::new())),
            options(TriggerConfig::default()),
        )
        .unwrap();
        let samples: Vec<i16> = (0..100).map(|i| (i * 331 % 65536 - 32768) as i16).collect();

        scope.load_buffer(samples.clone()).unwrap();
        let state = scope.wait_for(WAIT, |s| s.buffer_len == 100);
        assert_eq!(scope.export_buffer(), samples);
        assert_eq!(state.viewport.position(), 94);

        scope.load_buffer(scope.export_buffer()).unwrap();
        scope.wait_for(WAIT, |s| s.revision >= 2);
        assert_eq!(scope.export_buffer(), samples);

        scope.clear().unwrap();
        let state = scope.wait_for(WAIT, |s| s.buffer_len == 0);
        assert_eq!(state.viewport.position(), 0);
        assert!(scope.export_buffer().is_empty());
    }

    #[test]
    fn test_load_file_error_leaves_buffer_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.pcm");
        std::fs::write(&bad, [0u8; 5]).unwrap();

        let scope = Scope::new(
            Arc::new(ScriptedSource::new(Vec::new())),
            options(TriggerConfig::default()),
        )
        .unwrap();
        scope.load_buffer(vec![7; 10]).unwrap();
        scope.wait_for(WAIT, |s| s.buffer_len == 10);

        assert!(matches!(scope.load_file(&bad), Err(ScopeError::FileLoad { .. })));
        assert_eq!(scope.export_buffer(), vec![7; 10]);

        let good = dir.path().join("good.wav");
        scope.save_file(&good).unwrap();
        let before = scope.state().revision;
        scope.clear().unwrap();
        scope.load_file(&good).unwrap();
        scope.wait_for(WAIT, |s| s.revision >= before + 2);
        assert_eq!(scope.export_buffer(), vec![7; 10]);
    }

    #[test]
    fn test_position_commands_report_corrected_value() {
        let scope = Scope::new(
            Arc::new(ScriptedSource::new(Vec::new())),
            options(TriggerConfig::default()),
        )
        .unwrap();
        // k = 6; with 1006 samples the position spans 0..=1000
        scope.load_buffer(vec![0; 1006]).unwrap();

        assert_eq!(scope.set_position(250).unwrap(), 250);
        assert_eq!(scope.state().viewport.position(), 250);
        assert_eq!(scope.set_position(4000).unwrap(), 1000);
        assert_eq!(scope.set_position(-20).unwrap(), 0);
        assert_eq!(scope.pan(-50.0, 6.0).unwrap(), 50);
        // k shrinks to 1 around center 53; 1000 * 53 / 1005
        assert_eq!(scope.set_time_width(0.0).unwrap(), 52);
    }

    #[test]
    fn test_snapshot_uses_published_viewport() {
        let scope = Scope::new(
            Arc::new(ScriptedSource::new(Vec::new())),
            options(TriggerConfig::default()),
        )
        .unwrap();
        let area = PlotArea::new(0.0, 0.0, 50.0, 20.0);
        assert_eq!(scope.snapshot(&area).points, vec![(0.0, 10.0)]);

        scope.load_buffer(vec![1024; 12]).unwrap();
        scope.set_amplitude(50.0).unwrap();
        scope.wait_for(WAIT, |s| s.buffer_len == 12);
        let snapshot = scope.snapshot(&area);
        assert_eq!(snapshot.points.len(), 6);
        assert!(snapshot.points.iter().all(|&(_, y)| y == 20.0));
    }

    #[test]
    fn test_zoom_round_trips_through_engine() {
        let scope = Scope::new(
            Arc::new(ScriptedSource::new(Vec::new())),
            options(TriggerConfig::default()),
        )
        .unwrap();
        let knob = scope.zoom_amplitude(ZoomDirection::In).unwrap();
        assert!(knob < 50.0);
        let state = scope.wait_for(WAIT, |s| s.revision >= 1);
        assert!((state.viewport.amp_scale() - 1024.0 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_trigger_settings_are_validated() {
        let scope = Scope::new(
            Arc::new(ScriptedSource::new(Vec::new())),
            options(TriggerConfig::default()),
        )
        .unwrap();
        scope.set_mode(TriggerMode::Triggered);
        scope.set_trigger_level(160).unwrap();
        assert!(matches!(
            scope.set_trigger_over_count(3),
            Err(ScopeError::UnsupportedTriggerSetting { value: 3, .. })
        ));
        assert_eq!(
            scope.trigger(),
            TriggerConfig {
                mode: TriggerMode::Triggered,
                level: 160,
                over_count: 1,
            }
        );
    }

    #[test]
    fn test_take_changed_reports_each_publish_once() {
        let mut scope = Scope::new(
            Arc::new(ScriptedSource::new(Vec::new())),
            options(TriggerConfig::default()),
        )
        .unwrap();
        assert!(!scope.take_changed());

        scope.set_position(0).unwrap();
        assert!(scope.take_changed());
        assert!(!scope.take_changed());
    }

    #[test]
    fn test_continuous_handoff_drops_oldest_when_full() {
        let (chunk_tx, chunk_rx) = channel::bounded(2);
        let producer = Producer {
            trigger: Arc::new(Mutex::new(TriggerConfig::default())),
            chunk_tx,
            chunk_rx: chunk_rx.clone(),
            cancel: CancellationToken::new(),
            dropped_chunks: Arc::new(AtomicU64::new(0)),
        };

        for c in 1..=4i16 {
            assert!(producer.hand_off(vec![c], TriggerMode::Continuous));
        }

        assert_eq!(producer.dropped_chunks.load(Ordering::Relaxed), 2);
        assert_eq!(chunk_rx.try_recv().unwrap(), vec![3]);
        assert_eq!(chunk_rx.try_recv().unwrap(), vec![4]);
        assert!(chunk_rx.try_recv().is_err());
    }

    #[test]
    fn test_triggered_handoff_waits_for_room() {
        let (chunk_tx, chunk_rx) = channel::bounded(1);
        let producer = Producer {
            trigger: Arc::new(Mutex::new(TriggerConfig::default())),
            chunk_tx,
            chunk_rx: chunk_rx.clone(),
            cancel: CancellationToken::new(),
            dropped_chunks: Arc::new(AtomicU64::new(0)),
        };
        assert!(producer.hand_off(vec![1], TriggerMode::Triggered));

        let consumer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let first = chunk_rx.recv().unwrap();
            let second = chunk_rx.recv().unwrap();
            (first, second)
        });
        assert!(producer.hand_off(vec![2], TriggerMode::Triggered));

        assert_eq!(consumer.join().unwrap(), (vec![1], vec![2]));
        assert_eq!(producer.dropped_chunks.load(Ordering::Relaxed), 0);
    }
}

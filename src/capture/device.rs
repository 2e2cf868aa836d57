//! Hardware input through cpal.
//!
//! The cpal callback pushes sample blocks into a channel; `read` assembles
//! them into fixed-size chunks. Multi-channel devices are downmixed to mono by
//! averaging, and float devices are converted to 16-bit.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{self, Receiver, Sender};

use super::source::{CaptureConfig, Chunk, ChunkReader, SampleSource};
use crate::scope::ScopeError;

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

type Block = Result<Vec<i16>, ScopeError>;

/// Captures from a named, indexed or default input device.
pub struct CpalSource {
    /// Device name, numeric index, or "default"
    device_name: String,
}

impl CpalSource {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }
}

impl SampleSource for CpalSource {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn ChunkReader>, ScopeError> {
        let device = suppress_alsa_warnings(|| {
            let host = cpal::default_host();
            if self.device_name == "default" {
                host.default_input_device().ok_or_else(|| {
                    ScopeError::HardwareOpen("No audio input device available".to_string())
                })
            } else {
                find_device_by_name(&host, &self.device_name)
            }
        })?;

        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());
        tracing::info!("Capture device: {}", device_name);

        let supported = select_stream_config(&device, config)?;
        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.into();
        let channels = stream_config.channels as usize;
        let sample_rate = stream_config.sample_rate.0;

        if sample_rate != config.sample_rate {
            tracing::warn!(
                "Requested sample rate {}Hz but device uses {}Hz. Capturing at device rate.",
                config.sample_rate,
                sample_rate
            );
        }
        tracing::debug!(
            "Device configuration: {}Hz, {} channels, {:?}",
            sample_rate,
            channels,
            sample_format
        );

        let (tx, rx) = channel::unbounded::<Block>();
        let stream = match sample_format {
            cpal::SampleFormat::I16 => {
                let data_tx = tx.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let _ = data_tx.send(Ok(downmix(data, channels)));
                    },
                    error_callback(tx),
                    None,
                )?
            }
            cpal::SampleFormat::F32 => {
                let data_tx = tx.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let converted: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
                        let _ = data_tx.send(Ok(downmix(&converted, channels)));
                    },
                    error_callback(tx),
                    None,
                )?
            }
            other => {
                return Err(ScopeError::HardwareOpen(format!(
                    "unsupported device sample format {other:?}"
                )))
            }
        };

        stream.play()?;
        tracing::debug!("Audio stream started");

        Ok(Box::new(CpalReader {
            stream,
            blocks: rx,
            pending: Vec::with_capacity(config.chunk_size * 2),
            chunk_size: config.chunk_size,
            sample_rate,
        }))
    }

    fn describe(&self) -> String {
        format!("device '{}'", self.device_name)
    }
}

fn error_callback(tx: Sender<Block>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        tracing::error!("Audio stream error: {}", err);
        let _ = tx.send(Err(err.into()));
    }
}

struct CpalReader {
    stream: cpal::Stream,
    blocks: Receiver<Block>,
    pending: Vec<i16>,
    chunk_size: usize,
    sample_rate: u32,
}

impl ChunkReader for CpalReader {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self) -> Result<Chunk, ScopeError> {
        while self.pending.len() < self.chunk_size {
            match self.blocks.recv() {
                Ok(Ok(block)) => self.pending.extend_from_slice(&block),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(ScopeError::HardwareRead(
                        "audio stream closed unexpectedly".to_string(),
                    ))
                }
            }
        }
        let rest = self.pending.split_off(self.chunk_size);
        Ok(std::mem::replace(&mut self.pending, rest))
    }

    fn close(self: Box<Self>) {
        if let Err(e) = self.stream.pause() {
            tracing::debug!("Failed to pause stream on close: {}", e);
        }
        tracing::debug!("Audio stream closed");
    }
}

/// Picks a stream configuration at the requested rate, preferring fewer
/// channels and native 16-bit samples. Falls back to the device default.
fn select_stream_config(
    device: &cpal::Device,
    config: &CaptureConfig,
) -> Result<cpal::SupportedStreamConfig, ScopeError> {
    let wanted = config.sample_rate;
    let ranges = device
        .supported_input_configs()
        .map_err(|e| ScopeError::HardwareOpen(format!("Failed to query device configs: {e}")))?;

    let best = ranges
        .filter(|range| {
            matches!(
                range.sample_format(),
                cpal::SampleFormat::I16 | cpal::SampleFormat::F32
            ) && range.min_sample_rate().0 <= wanted
                && wanted <= range.max_sample_rate().0
        })
        .min_by_key(|range| {
            (
                range.channels(),
                range.sample_format() != cpal::SampleFormat::I16,
            )
        });

    match best {
        Some(range) => Ok(range.with_sample_rate(cpal::SampleRate(wanted))),
        None => device
            .default_input_config()
            .map_err(|e| ScopeError::HardwareOpen(format!("No usable input configuration: {e}"))),
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Converts interleaved frames to mono by averaging all channels.
fn downmix(data: &[i16], num_channels: usize) -> Vec<i16> {
    match num_channels {
        0 | 1 => data.to_vec(),
        2 => data
            .chunks_exact(2)
            .map(|frame| ((frame[0] as i32 + frame[1] as i32) / 2) as i16)
            .collect(),
        _ => data
            .chunks_exact(num_channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / num_channels as i32) as i16
            })
            .collect(),
    }
}

/// Summary of one input device for `list-devices`.
pub struct InputDeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    /// Native rate and channel count, if the device reports them
    pub native: Option<(u32, u16)>,
}

/// Enumerates input devices, skipping any that cannot report a name.
pub fn list_input_devices() -> Result<Vec<InputDeviceInfo>, ScopeError> {
    let (default_name, devices) = suppress_alsa_warnings(|| {
        let host = cpal::default_host();
        let devices: Vec<cpal::Device> = host
            .input_devices()
            .map_err(|e| ScopeError::HardwareOpen(format!("Failed to enumerate devices: {e}")))?
            .filter(|d| d.name().is_ok())
            .collect();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());
        Ok((default_name, devices))
    })?;

    Ok(devices
        .iter()
        .enumerate()
        .map(|(index, device)| {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let native = device
                .default_input_config()
                .ok()
                .map(|c| (c.sample_rate().0, c.channels()));
            InputDeviceInfo {
                index,
                is_default: default_name.as_ref() == Some(&name),
                name,
                native,
            }
        })
        .collect())
}

/// Finds an audio input device by name or numeric index.
fn find_device_by_name(host: &cpal::Host, device_spec: &str) -> Result<cpal::Device, ScopeError> {
    let enumerate = || {
        host.input_devices()
            .map_err(|e| ScopeError::HardwareOpen(format!("Failed to enumerate devices: {e}")))
    };

    if let Ok(index) = device_spec.parse::<usize>() {
        let devices: Vec<_> = enumerate()?.collect();
        let count = devices.len();
        return devices.into_iter().nth(index).ok_or_else(|| {
            ScopeError::HardwareOpen(format!(
                "Device index {} is out of range (0-{})",
                index,
                count.saturating_sub(1)
            ))
        });
    }

    enumerate()?
        .find(|device| device.name().is_ok_and(|name| name == device_spec))
        .ok_or_else(|| {
            ScopeError::HardwareOpen(format!(
                "Audio input device '{device_spec}' not found. Use 'scopeline list-devices' to see available devices."
            ))
        })
}

/// Temporarily redirects stderr to /dev/null to suppress ALSA library warnings on Linux.
#[cfg(target_os = "linux")]
fn suppress_alsa_warnings<F, T>(f: F) -> Result<T, ScopeError>
where
    F: FnOnce() -> Result<T, ScopeError>,
{
    let dev_null = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .map_err(|e| ScopeError::HardwareOpen(format!("Failed to open /dev/null: {e}")))?;

    let dev_null_fd = dev_null.as_raw_fd();

    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return Err(ScopeError::HardwareOpen("Failed to duplicate stderr".to_string()));
    }

    let redirect_result = unsafe { libc::dup2(dev_null_fd, libc::STDERR_FILENO) };
    if redirect_result == -1 {
        unsafe { libc::close(old_stderr) };
        return Err(ScopeError::HardwareOpen("Failed to redirect stderr".to_string()));
    }

    let result = f();

    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

#[cfg(not(target_os = "linux"))]
fn suppress_alsa_warnings<F, T>(f: F) -> Result<T, ScopeError>
where
    F: FnOnce() -> Result<T, ScopeError>,
{
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo_averages_pairs() {
        assert_eq!(downmix(&[100, 300, -50, 50], 2), vec![200, 0]);
    }

    #[test]
    fn test_downmix_multichannel_drops_partial_frame() {
        assert_eq!(downmix(&[3, 6, 9, 1, 1], 3), vec![6]);
    }

    #[test]
    fn test_f32_conversion_saturates() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
        assert_eq!(f32_to_i16(0.0), 0);
    }
}

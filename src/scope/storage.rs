//! Saving and loading the sample record.
//!
//! `.wav` files hold mono 16-bit integer PCM; every other extension is a flat
//! array of little-endian signed 16-bit samples. Both round-trip bit-exact.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs;
use std::path::Path;

use super::ScopeError;

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

/// Reads a sample file. Nothing is returned unless the whole file is valid.
pub fn load_samples(path: &Path) -> Result<Vec<i16>, ScopeError> {
    let samples = if is_wav(path) {
        load_wav(path)?
    } else {
        let bytes = fs::read(path).map_err(|e| ScopeError::file_load(path, e))?;
        decode_raw(&bytes).map_err(|reason| ScopeError::file_load(path, reason))?
    };
    tracing::info!("Loaded {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

/// Writes `samples`, replacing any existing file.
pub fn save_samples(path: &Path, samples: &[i16], sample_rate: u32) -> Result<(), ScopeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ScopeError::file_save(path, e))?;
    }

    if is_wav(path) {
        save_wav(path, samples, sample_rate)?;
    } else {
        fs::write(path, encode_raw(samples)).map_err(|e| ScopeError::file_save(path, e))?;
    }
    tracing::info!("Saved {} samples to {}", samples.len(), path.display());
    Ok(())
}

fn load_wav(path: &Path) -> Result<Vec<i16>, ScopeError> {
    let reader = WavReader::open(path).map_err(|e| ScopeError::file_load(path, e))?;
    let spec = reader.spec();
    if spec.channels != 1 || spec.bits_per_sample != 16 || spec.sample_format != SampleFormat::Int {
        return Err(ScopeError::file_load(
            path,
            format!(
                "expected mono 16-bit integer PCM, found {} channel(s) of {}-bit {:?}",
                spec.channels, spec.bits_per_sample, spec.sample_format
            ),
        ));
    }
    reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ScopeError::file_load(path, e))
}

fn save_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<(), ScopeError> {
    let wav_spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, wav_spec).map_err(|e| ScopeError::file_save(path, e))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| ScopeError::file_save(path, e))?;
    }
    writer.finalize().map_err(|e| ScopeError::file_save(path, e))
}

fn decode_raw(bytes: &[u8]) -> Result<Vec<i16>, String> {
    if bytes.len() % 2 != 0 {
        return Err(format!(
            "truncated sample data: {} bytes is not a whole number of 16-bit samples",
            bytes.len()
        ));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

fn encode_raw(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> Vec<i16> {
        vec![i16::MIN, -1, 0, 1, 12345, i16::MAX]
    }

    #[test]
    fn test_raw_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.pcm");
        save_samples(&path, &sample_data(), 44_100).unwrap();
        assert_eq!(fs::read(&path).unwrap().len(), 12);
        assert_eq!(load_samples(&path).unwrap(), sample_data());
    }

    #[test]
    fn test_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("capture.WAV");
        save_samples(&path, &sample_data(), 8000).unwrap();
        assert_eq!(load_samples(&path).unwrap(), sample_data());
    }

    #[test]
    fn test_empty_record_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.raw");
        save_samples(&path, &[], 44_100).unwrap();
        assert!(load_samples(&path).unwrap().is_empty());
    }

    #[test]
    fn test_odd_length_raw_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pcm");
        fs::write(&path, [1u8, 2, 3]).unwrap();
        assert!(matches!(
            load_samples(&path),
            Err(ScopeError::FileLoad { .. })
        ));
    }

    #[test]
    fn test_stereo_wav_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        writer.write_sample(1i16).unwrap();
        writer.write_sample(2i16).unwrap();
        writer.finalize().unwrap();

        assert!(matches!(
            load_samples(&path),
            Err(ScopeError::FileLoad { .. })
        ));
    }

    #[test]
    fn test_garbage_wav_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-really.wav");
        fs::write(&path, b"definitely not RIFF").unwrap();
        assert!(load_samples(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_samples(&dir.path().join("absent.pcm")),
            Err(ScopeError::FileLoad { .. })
        ));
    }
}

use std::path::Path;

use beatframe_core::{BeatFrameError, MemorySource, Result};

/// Decodes a whole WAV file into interleaved `f32` samples in `[-1, 1]`.
pub fn load_wav(path: &Path) -> Result<MemorySource> {
    let mut reader = hound::WavReader::open(path).map_err(|err| wav_error(path, err))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|err| wav_error(path, err))?,
        hound::SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample)?;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 * scale))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|err| wav_error(path, err))?
        }
    };

    tracing::info!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        bits = spec.bits_per_sample,
        samples = samples.len(),
        "decoded wav file"
    );

    MemorySource::new(samples, spec.channels, spec.sample_rate)
}

fn int_scale(bits_per_sample: u16) -> Result<f32> {
    if bits_per_sample == 0 || bits_per_sample > 32 {
        return Err(BeatFrameError::msg(format!(
            "unsupported integer sample width: {bits_per_sample} bits"
        )));
    }
    Ok(1.0 / (1_u64 << (bits_per_sample - 1)) as f32)
}

fn wav_error(path: &Path, err: hound::Error) -> BeatFrameError {
    BeatFrameError::msg(format!("failed to read `{}`: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use beatframe_core::SampleSource;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("beatframe-{}-{name}", std::process::id()))
    }

    #[test]
    fn decodes_sixteen_bit_pcm() {
        let path = temp_path("pcm16.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for value in [0_i16, 16_384, -16_384, i16::MIN] {
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();

        let mut source = load_wav(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(source.channels(), 2);
        assert_eq!(source.sample_rate(), 22_050);
        let block = source.read_block(8);
        assert_eq!(block.samples(), &[0.0, 0.5, -0.5, -1.0]);
    }

    #[test]
    fn decodes_float_samples() {
        let path = temp_path("float.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.25_f32).unwrap();
        writer.write_sample(-0.75_f32).unwrap();
        writer.finalize().unwrap();

        let mut source = load_wav(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(source.read_block(4).samples(), &[0.25, -0.75]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_wav(&temp_path("does-not-exist.wav")).is_err());
    }
}

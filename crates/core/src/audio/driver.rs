use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{BeatFrameError, Result, SampleSource, SampleWriter};

/// State shared between the driver handle and its device thread. Only atomics,
/// so the device loop never takes a lock.
#[derive(Debug, Default)]
struct DriverShared {
    stop: AtomicBool,
    paused: AtomicBool,
    finished: AtomicBool,
    periods: AtomicU64,
}

/// Thread that behaves like a playback device: once per period it pulls one
/// block from the source and publishes exactly what it would have sent to the
/// hardware.
///
/// The block buffer is allocated before the thread starts; the loop itself
/// only copies.
#[derive(Debug)]
pub struct SimulatedDevice {
    shared: Arc<DriverShared>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedDevice {
    /// Starts the device thread. `frames_per_buffer` frames are delivered per
    /// period of `frames_per_buffer / sample_rate` seconds.
    pub fn spawn(
        mut source: Box<dyn SampleSource>,
        mut writer: SampleWriter,
        frames_per_buffer: usize,
    ) -> Result<Self> {
        let sample_rate = source.sample_rate();
        let channels = source.channels();
        if frames_per_buffer == 0 || sample_rate == 0 || channels == 0 {
            return Err(BeatFrameError::config(
                "simulated device needs a non-empty period and a valid source format",
            ));
        }

        let block_len = frames_per_buffer * channels as usize;
        if block_len > writer.capacity() {
            return Err(BeatFrameError::config(format!(
                "device period of {block_len} samples exceeds bridge capacity {}",
                writer.capacity()
            )));
        }

        writer.attach_format(channels, sample_rate);
        let period = Duration::from_secs_f64(frames_per_buffer as f64 / sample_rate as f64);
        let shared = Arc::new(DriverShared::default());
        let thread_shared = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name("beatframe-device".to_string())
            .spawn(move || {
                let mut buffer = vec![0.0_f32; block_len];
                run_device_loop(source.as_mut(), &mut writer, &mut buffer, period, &thread_shared);
            })
            .map_err(|err| BeatFrameError::device(format!("failed to spawn device thread: {err}")))?;

        tracing::debug!(sample_rate, channels, frames_per_buffer, "simulated device started");

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }

    /// True once the source ran dry and the final block was published.
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    /// Device periods delivered so far.
    pub fn periods(&self) -> u64 {
        self.shared.periods.load(Ordering::Relaxed)
    }

    /// Stops the device thread and waits for it to exit.
    pub fn stop(&mut self) -> Result<()> {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| BeatFrameError::device("device thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(%err, "simulated device did not shut down cleanly");
        }
    }
}

fn run_device_loop(
    source: &mut dyn SampleSource,
    writer: &mut SampleWriter,
    buffer: &mut [f32],
    period: Duration,
    shared: &DriverShared,
) {
    let mut deadline = Instant::now();

    while !shared.stop.load(Ordering::Relaxed) {
        if shared.paused.load(Ordering::Relaxed) {
            thread::sleep(period);
            deadline = Instant::now();
            continue;
        }

        let written = source.fill(buffer);
        shared.periods.fetch_add(1, Ordering::Relaxed);
        if written < buffer.len() {
            writer.publish_final(&buffer[..written]);
            shared.finished.store(true, Ordering::Release);
            return;
        }
        writer.publish(buffer);

        deadline += period;
        match deadline.checked_duration_since(Instant::now()) {
            Some(wait) => thread::sleep(wait),
            // Fell behind; restart the schedule instead of bursting.
            None => deadline = Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CrossThreadSampleBridge, MemorySource};

    #[test]
    fn rejects_period_larger_than_bridge() {
        let source = MemorySource::new(vec![0.0; 64], 2, 1_000).unwrap();
        let (writer, _reader) = CrossThreadSampleBridge::new(8, 2, 1_000);

        let err = SimulatedDevice::spawn(Box::new(source), writer, 16).unwrap_err();
        assert!(matches!(err, BeatFrameError::Configuration(_)));
    }

    #[test]
    fn delivers_until_source_runs_dry() {
        // 10 full periods of 4 frames plus a 2 frame tail, 4 ms per period.
        let samples: Vec<f32> = (0..42).map(|v| v as f32).collect();
        let source = MemorySource::new(samples, 1, 1_000).unwrap();
        let (writer, mut reader) = CrossThreadSampleBridge::new(4, 1, 1_000);

        let mut device = SimulatedDevice::spawn(Box::new(source), writer, 4).unwrap();
        let started = Instant::now();
        while !device.is_finished() && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(1));
        }

        assert!(device.is_finished());
        assert_eq!(device.periods(), 11);
        assert_eq!(reader.consume().samples(), &[40.0, 41.0]);
        assert!(reader.consume().is_empty());
        device.stop().unwrap();
    }

    #[test]
    fn stop_joins_a_running_device() {
        let source = MemorySource::new(vec![0.1; 1_000_000], 1, 1_000).unwrap();
        let (writer, _reader) = CrossThreadSampleBridge::new(16, 1, 1_000);

        let mut device = SimulatedDevice::spawn(Box::new(source), writer, 16).unwrap();
        device.pause();
        assert!(device.is_paused());
        device.resume();
        device.stop().unwrap();

        assert!(!device.is_finished());
    }
}

//! Real-time safe handoff of the latest sample block from the device thread
//! to the analysis thread.
//!
//! The bridge is a triple buffer of fixed-capacity slots. The writer copies
//! into its private slot and swaps it in with a single atomic exchange, so the
//! device thread never waits on the reader and never allocates. The reader
//! always sees a whole block, never a partially written one.
//!
//! ```text
//! device thread                      analysis thread
//! SampleWriter::publish(&[f32]) ──▶  SampleReader::consume() -> SampleBlock
//!        (copy + swap)                    (swap + copy)
//! ```

use triple_buffer::{Input, Output, TripleBuffer};

use crate::SampleBlock;

/// One buffer of the triple buffer. `samples` is allocated once at full
/// capacity; `len` tracks how much of it the last publish filled.
#[derive(Debug, Clone)]
struct Slot {
    samples: Vec<f32>,
    len: usize,
    channels: u16,
    sample_rate: u32,
    end_of_stream: bool,
    sequence: u64,
}

/// Constructor for the writer/reader pair.
pub struct CrossThreadSampleBridge;

impl CrossThreadSampleBridge {
    /// Creates a bridge whose slots hold up to `capacity` interleaved samples.
    ///
    /// This is the only place the bridge allocates.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(capacity: usize, channels: u16, sample_rate: u32) -> (SampleWriter, SampleReader) {
        let channels = channels.max(1);
        let initial = Slot {
            samples: vec![0.0; capacity],
            len: 0,
            channels,
            sample_rate,
            end_of_stream: false,
            sequence: 0,
        };
        let (input, output) = TripleBuffer::new(&initial).split();

        let writer = SampleWriter {
            input,
            capacity,
            channels,
            sample_rate,
            sequence: 0,
        };
        let reader = SampleReader {
            output,
            seen_sequence: 0,
            drained: false,
        };
        (writer, reader)
    }
}

/// Producer half, owned by the device thread.
pub struct SampleWriter {
    input: Input<Slot>,
    capacity: usize,
    channels: u16,
    sample_rate: u32,
    sequence: u64,
}

impl SampleWriter {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Declares the format of the source that is about to publish.
    pub fn attach_format(&mut self, channels: u16, sample_rate: u32) {
        self.channels = channels.max(1);
        self.sample_rate = sample_rate;
    }

    /// Replaces the shared block with `samples`.
    ///
    /// Samples beyond the slot capacity are dropped, rounded down to whole
    /// frames. Returns the number of samples published.
    pub fn publish(&mut self, samples: &[f32]) -> usize {
        self.write(samples, false)
    }

    /// Publishes the last (usually short) block of a stream. Once the reader
    /// has consumed it, further reads come back empty until the next publish.
    pub fn publish_final(&mut self, samples: &[f32]) -> usize {
        self.write(samples, true)
    }

    /// Publishes a block, adopting its format.
    pub fn publish_block(&mut self, block: &SampleBlock) -> usize {
        self.attach_format(block.channels(), block.sample_rate());
        self.publish(block.samples())
    }

    fn write(&mut self, samples: &[f32], end_of_stream: bool) -> usize {
        let channels = self.channels as usize;
        let mut count = samples.len().min(self.capacity);
        if count < samples.len() {
            count -= count % channels;
        }
        self.sequence += 1;

        let slot = self.input.input_buffer();
        slot.samples[..count].copy_from_slice(&samples[..count]);
        slot.len = count;
        slot.channels = self.channels;
        slot.sample_rate = self.sample_rate;
        slot.end_of_stream = end_of_stream;
        slot.sequence = self.sequence;
        self.input.publish();

        count
    }
}

/// Consumer half, owned by the analysis thread.
pub struct SampleReader {
    output: Output<Slot>,
    seen_sequence: u64,
    drained: bool,
}

impl SampleReader {
    /// Returns a copy of the most recently published block.
    ///
    /// The same block is returned again until something new is published.
    /// The result is empty before the first publish and after the final
    /// block of a stream has been handed out once.
    pub fn consume(&mut self) -> SampleBlock {
        match self.consume_fresh() {
            Some(block) => block,
            None if self.drained => {
                let slot = self.output.read();
                SampleBlock::empty(slot.channels, slot.sample_rate)
            }
            None => copy_block(self.output.read()),
        }
    }

    /// Returns the latest block only if it was published after the previous
    /// read. Starved ticks see `None`.
    pub fn consume_fresh(&mut self) -> Option<SampleBlock> {
        let slot = self.output.read();
        if slot.sequence == self.seen_sequence {
            return None;
        }

        self.seen_sequence = slot.sequence;
        self.drained = slot.end_of_stream;
        Some(copy_block(slot))
    }

    /// True once the final block of a stream has been handed out and nothing
    /// newer has arrived.
    pub fn is_drained(&self) -> bool {
        self.drained
    }
}

fn copy_block(slot: &Slot) -> SampleBlock {
    SampleBlock::new(
        slot.samples[..slot.len].to_vec(),
        slot.channels,
        slot.sample_rate,
    )
}

impl std::fmt::Debug for SampleWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleWriter")
            .field("capacity", &self.capacity)
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl std::fmt::Debug for SampleReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleReader")
            .field("seen_sequence", &self.seen_sequence)
            .field("drained", &self.drained)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_before_publish_is_empty() {
        let (_writer, mut reader) = CrossThreadSampleBridge::new(16, 2, 48_000);

        let block = reader.consume();
        assert!(block.is_empty());
        assert_eq!(block.channels(), 2);
        assert!(reader.consume_fresh().is_none());
    }

    #[test]
    fn publish_then_consume_round_trips() {
        let (mut writer, mut reader) = CrossThreadSampleBridge::new(16, 2, 48_000);
        let samples = [0.1, -0.1, 0.2, -0.2, 0.3, -0.3];

        assert_eq!(writer.publish(&samples), samples.len());
        let block = reader.consume();

        assert_eq!(block.samples(), &samples);
        assert_eq!(block.channels(), 2);
        assert_eq!(block.sample_rate(), 48_000);
    }

    #[test]
    fn latest_block_wins() {
        let (mut writer, mut reader) = CrossThreadSampleBridge::new(8, 1, 100);
        writer.publish(&[1.0; 8]);
        writer.publish(&[2.0; 4]);

        let block = reader.consume();
        assert_eq!(block.samples(), &[2.0; 4]);
    }

    #[test]
    fn repeated_consume_returns_last_block() {
        let (mut writer, mut reader) = CrossThreadSampleBridge::new(8, 1, 100);
        writer.publish(&[0.5; 3]);

        assert_eq!(reader.consume().len(), 3);
        assert_eq!(reader.consume().samples(), &[0.5; 3]);
        assert!(reader.consume_fresh().is_none());
    }

    #[test]
    fn shorter_block_does_not_leak_stale_tail() {
        let (mut writer, mut reader) = CrossThreadSampleBridge::new(8, 1, 100);
        writer.publish(&[1.0; 8]);
        reader.consume();
        writer.publish(&[2.0; 8]);
        reader.consume();
        writer.publish(&[3.0; 2]);

        assert_eq!(reader.consume().samples(), &[3.0, 3.0]);
    }

    #[test]
    fn oversized_block_is_truncated_to_whole_frames() {
        let (mut writer, mut reader) = CrossThreadSampleBridge::new(5, 2, 100);

        let written = writer.publish(&[0.25; 9]);

        assert_eq!(written, 4);
        assert_eq!(reader.consume().len(), 4);
    }

    #[test]
    fn final_block_is_delivered_once() {
        let (mut writer, mut reader) = CrossThreadSampleBridge::new(8, 1, 100);
        writer.publish(&[1.0; 8]);
        writer.publish_final(&[0.5; 3]);

        assert_eq!(reader.consume().samples(), &[0.5; 3]);
        assert!(reader.is_drained());
        assert!(reader.consume().is_empty());
        assert!(reader.consume().is_empty());

        // A new stream revives the bridge.
        writer.publish(&[0.75; 2]);
        assert_eq!(reader.consume().samples(), &[0.75; 2]);
        assert!(!reader.is_drained());
    }

    #[test]
    fn publish_block_adopts_format() {
        let (mut writer, mut reader) = CrossThreadSampleBridge::new(8, 1, 100);
        let block = SampleBlock::new(vec![0.1, 0.2, 0.3, 0.4], 2, 22_050);

        writer.publish_block(&block);

        assert_eq!(reader.consume(), block);
        assert_eq!(writer.channels(), 2);
    }

    #[test]
    fn halves_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SampleWriter>();
        assert_send::<SampleReader>();
    }
}

use crate::audio::AudioFormat;
use crate::error::{PipelineError, WriterError};
use crate::storage::wav::{self, FinalizedFile};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Destination for sample batches in streaming mode.
#[async_trait]
pub trait SampleSink: Send {
    async fn accept(&mut self, batch: Vec<i16>) -> Result<(), PipelineError>;
}

/// Running counters for the active stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamState {
    pub total_samples: u64,
    pub packet_count: u64,
    pub last_sequence: Option<u16>,
}

pub enum AccumulatorMode {
    /// Keep every sample in memory for a one-shot save.
    Buffered(Vec<i16>),
    /// Forward each batch to the sink and keep nothing.
    Streaming(Box<dyn SampleSink>),
}

pub struct SampleAccumulator {
    state: StreamState,
    mode: AccumulatorMode,
}

impl SampleAccumulator {
    pub fn buffered() -> Self {
        Self {
            state: StreamState::default(),
            mode: AccumulatorMode::Buffered(Vec::new()),
        }
    }

    pub fn streaming(sink: Box<dyn SampleSink>) -> Self {
        Self {
            state: StreamState::default(),
            mode: AccumulatorMode::Streaming(sink),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.mode, AccumulatorMode::Streaming(_))
    }

    pub async fn ingest(&mut self, batch: Vec<i16>) -> Result<(), PipelineError> {
        let count = batch.len() as u64;

        match &mut self.mode {
            AccumulatorMode::Buffered(samples) => samples.extend_from_slice(&batch),
            AccumulatorMode::Streaming(sink) => sink.accept(batch).await?,
        }

        self.state.total_samples += count;
        self.state.packet_count += 1;
        Ok(())
    }

    pub fn record_sequence(&mut self, sequence: u16) {
        self.state.last_sequence = Some(sequence);
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn sample_count(&self) -> u64 {
        self.state.total_samples
    }

    pub fn packet_count(&self) -> u64 {
        self.state.packet_count
    }

    pub fn duration(&self, sample_rate: u32) -> Duration {
        if sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.state.total_samples as f64 / sample_rate as f64)
    }

    /// Buffered samples; empty in streaming mode.
    pub fn samples(&self) -> &[i16] {
        match &self.mode {
            AccumulatorMode::Buffered(samples) => samples.as_slice(),
            AccumulatorMode::Streaming(_) => &[],
        }
    }

    /// Write the buffered samples to `path` in one go. Streaming mode has
    /// nothing to save and yields an empty file.
    pub fn save_wav(&self, path: &Path, format: AudioFormat) -> Result<FinalizedFile, WriterError> {
        wav::save_wav(self.samples(), path, format)
    }

    /// Move the buffered samples out for a one-shot save. Counters are kept.
    pub fn take_samples(&mut self) -> Vec<i16> {
        match &mut self.mode {
            AccumulatorMode::Buffered(samples) => std::mem::take(samples),
            AccumulatorMode::Streaming(_) => Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.state = StreamState::default();
        if let AccumulatorMode::Buffered(samples) = &mut self.mode {
            samples.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct CollectingSink(Arc<Mutex<Vec<Vec<i16>>>>);

    #[async_trait]
    impl SampleSink for CollectingSink {
        async fn accept(&mut self, batch: Vec<i16>) -> Result<(), PipelineError> {
            self.0.lock().unwrap().push(batch);
            Ok(())
        }
    }

    struct ClosedSink;

    #[async_trait]
    impl SampleSink for ClosedSink {
        async fn accept(&mut self, _batch: Vec<i16>) -> Result<(), PipelineError> {
            Err(PipelineError::WriterClosed)
        }
    }

    #[tokio::test]
    async fn test_buffered_mode_keeps_samples() {
        let mut acc = SampleAccumulator::buffered();
        acc.ingest(vec![1, 2, 3]).await.unwrap();
        acc.ingest(vec![4, 5]).await.unwrap();
        acc.record_sequence(7);

        assert_eq!(acc.samples(), &[1, 2, 3, 4, 5]);
        assert_eq!(acc.sample_count(), 5);
        assert_eq!(acc.packet_count(), 2);
        assert_eq!(acc.state().last_sequence, Some(7));

        assert_eq!(acc.take_samples(), vec![1, 2, 3, 4, 5]);
        assert!(acc.samples().is_empty());
        assert_eq!(acc.sample_count(), 5);
        acc.ingest(vec![6]).await.unwrap();

        acc.clear();
        assert_eq!(acc.state(), StreamState::default());
        assert!(acc.samples().is_empty());
        // Clearing twice is harmless.
        acc.clear();
    }

    #[tokio::test]
    async fn test_streaming_mode_forwards_without_retaining() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let mut acc = SampleAccumulator::streaming(Box::new(CollectingSink(received.clone())));
        acc.ingest(vec![10; 121]).await.unwrap();
        acc.ingest(vec![20; 121]).await.unwrap();

        assert!(acc.is_streaming());
        assert!(acc.samples().is_empty());
        assert_eq!(acc.sample_count(), 242);
        assert_eq!(received.lock().unwrap().len(), 2);
        assert!(acc.take_samples().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_is_not_counted() {
        let mut acc = SampleAccumulator::streaming(Box::new(ClosedSink));
        assert!(acc.ingest(vec![1, 2]).await.is_err());
        assert_eq!(acc.sample_count(), 0);
        assert_eq!(acc.packet_count(), 0);
    }

    #[tokio::test]
    async fn test_buffered_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffered.wav");
        let mut acc = SampleAccumulator::buffered();
        acc.ingest(vec![7; 121]).await.unwrap();
        acc.ingest(vec![-7; 121]).await.unwrap();

        let file = acc.save_wav(&path, AudioFormat::DEVICE).unwrap();
        assert_eq!(file.samples, 242);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 44 + 484);
        assert_eq!(acc.sample_count(), 242);
    }

    #[tokio::test]
    async fn test_duration() {
        let mut acc = SampleAccumulator::buffered();
        acc.ingest(vec![0; 16000]).await.unwrap();
        assert_eq!(acc.duration(32000), Duration::from_millis(500));
        assert_eq!(acc.duration(0), Duration::ZERO);
    }
}

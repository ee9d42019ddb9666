//! Background persistence for one recording.
//!
//! The notification handler hands sample batches to a [`WriterHandle`]; a
//! dedicated blocking thread drains the bounded channel in arrival order and
//! owns the [`StreamingWavWriter`]. A full channel makes the producer wait
//! instead of queueing without bound.

use super::wav::{FinalizedFile, StreamingWavWriter};
use crate::audio::AudioFormat;
use crate::capture::accumulator::SampleSink;
use crate::error::{PipelineError, WriterError};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const DEFAULT_QUEUE_DEPTH: usize = 256;

#[derive(Debug)]
pub enum WriterMessage {
    Samples(Vec<i16>),
    Finalize,
    Discard,
}

#[derive(Debug)]
pub enum WriterOutcome {
    Finalized(FinalizedFile),
    Discarded(PathBuf),
}

#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriterMessage>,
}

impl WriterHandle {
    pub async fn write_samples(&self, samples: Vec<i16>) -> Result<(), PipelineError> {
        self.tx
            .send(WriterMessage::Samples(samples))
            .await
            .map_err(|_| PipelineError::WriterClosed)
    }

    async fn send(&self, msg: WriterMessage) {
        if self.tx.send(msg).await.is_err() {
            warn!("Writer already stopped, command dropped");
        }
    }
}

#[async_trait]
impl SampleSink for WriterHandle {
    async fn accept(&mut self, batch: Vec<i16>) -> Result<(), PipelineError> {
        self.write_samples(batch).await
    }
}

/// Owner side of a running writer: the control handle and the worker's
/// join handle.
pub struct WriterTask {
    handle: WriterHandle,
    join: JoinHandle<Result<WriterOutcome, WriterError>>,
    path: PathBuf,
}

impl WriterTask {
    /// Create the file and start the worker. Fails without spawning
    /// anything if the file cannot be created.
    pub async fn spawn(
        path: PathBuf,
        format: AudioFormat,
        queue_depth: usize,
    ) -> Result<Self, WriterError> {
        Self::start(StreamingWavWriter::new(path, format), queue_depth).await
    }

    /// Like [`WriterTask::spawn`] for a writer that is already configured
    /// but not yet opened.
    pub async fn start(mut writer: StreamingWavWriter, queue_depth: usize) -> Result<Self, WriterError> {
        let path = writer.path().to_path_buf();
        let writer = tokio::task::spawn_blocking(move || {
            writer.open()?;
            Ok::<_, WriterError>(writer)
        })
        .await
        .map_err(|e| WriterError::TaskFailed(e.to_string()))??;

        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let storage = StorageWriter { writer, rx };
        let join = tokio::task::spawn_blocking(move || storage.run());

        info!("Writer started for {:?}", path);
        Ok(Self {
            handle: WriterHandle { tx },
            join,
            path,
        })
    }

    pub fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Finalize the file once every queued batch is written.
    ///
    /// The work happens on the blocking thread, so dropping this future does
    /// not cancel an in-progress finalize.
    pub async fn finalize(self) -> Result<FinalizedFile, WriterError> {
        self.handle.send(WriterMessage::Finalize).await;
        match self.join().await? {
            WriterOutcome::Finalized(file) => Ok(file),
            WriterOutcome::Discarded(path) => Err(WriterError::TaskFailed(format!(
                "{:?} was discarded before finalize",
                path
            ))),
        }
    }

    pub async fn discard(self) -> Result<(), WriterError> {
        self.handle.send(WriterMessage::Discard).await;
        self.join().await.map(|_| ())
    }

    /// Wait for the worker to exit and collect its result.
    pub async fn join(self) -> Result<WriterOutcome, WriterError> {
        let Self { handle, join, .. } = self;
        drop(handle);
        join.await.map_err(|e| WriterError::TaskFailed(e.to_string()))?
    }
}

struct StorageWriter {
    writer: StreamingWavWriter,
    rx: mpsc::Receiver<WriterMessage>,
}

impl StorageWriter {
    fn run(mut self) -> Result<WriterOutcome, WriterError> {
        info!("Storage writer task started");

        while let Some(msg) = self.rx.blocking_recv() {
            match msg {
                WriterMessage::Samples(samples) => {
                    if let Err(e) = self.writer.write_samples(&samples) {
                        error!("Failed to write samples to {:?}: {}", self.writer.path(), e);
                        self.rx.close();
                        if let Err(discard_err) = self.writer.discard() {
                            error!("Failed to remove partial file: {}", discard_err);
                        }
                        return Err(e);
                    }
                }
                WriterMessage::Finalize => {
                    info!("Storage writer finalizing");
                    return self.writer.finalize().map(WriterOutcome::Finalized);
                }
                WriterMessage::Discard => {
                    info!("Storage writer discarding");
                    self.writer.discard()?;
                    return Ok(WriterOutcome::Discarded(self.writer.path().to_path_buf()));
                }
            }
        }

        info!("Storage channel closed, finalizing");
        self.writer.finalize().map(WriterOutcome::Finalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::wav::WavHeader;
    use std::time::Duration;

    #[tokio::test]
    async fn test_batches_are_written_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ordered.wav");
        let task = WriterTask::spawn(path.clone(), AudioFormat::DEVICE, 2)
            .await
            .unwrap();

        let handle = task.handle();
        for i in 0..50i16 {
            handle.write_samples(vec![i; 10]).await.unwrap();
        }
        drop(handle);

        let file = task.finalize().await.unwrap();
        assert_eq!(file.samples, 500);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 44 + 1000);

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        let expected: Vec<i16> = (0..50i16).flat_map(|i| std::iter::repeat(i).take(10)).collect();
        assert_eq!(samples, expected);
    }

    #[tokio::test]
    async fn test_closed_channel_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("implicit.wav");
        let task = WriterTask::spawn(path.clone(), AudioFormat::DEVICE, 8)
            .await
            .unwrap();
        task.handle().write_samples(vec![3; 121]).await.unwrap();

        match task.join().await.unwrap() {
            WriterOutcome::Finalized(file) => assert_eq!(file.samples, 121),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(WavHeader::read_from(&path).unwrap().data_len, 242);
    }

    #[tokio::test]
    async fn test_discard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discard.wav");
        let task = WriterTask::spawn(path.clone(), AudioFormat::DEVICE, 8)
            .await
            .unwrap();
        task.handle().write_samples(vec![1; 10]).await.unwrap();
        task.discard().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_write_failure_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failing.wav");
        let writer = StreamingWavWriter::new(&path, AudioFormat::DEVICE).with_max_samples(150);
        let task = WriterTask::start(writer, 4).await.unwrap();

        let handle = task.handle();
        handle.write_samples(vec![1; 121]).await.unwrap();
        handle.write_samples(vec![2; 121]).await.unwrap();

        let err = task.join().await.unwrap_err();
        assert!(matches!(err, WriterError::DataLimit { max_samples: 150 }));
        assert!(!path.exists());
        assert!(matches!(
            handle.write_samples(vec![3; 121]).await,
            Err(PipelineError::WriterClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_makes_producer_wait() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = WriterHandle { tx };

        handle.write_samples(vec![1; 121]).await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(100), handle.write_samples(vec![2; 121])).await;
        assert!(blocked.is_err());

        // Once the consumer catches up the producer gets through, in order.
        assert!(matches!(rx.recv().await, Some(WriterMessage::Samples(b)) if b[0] == 1));
        handle.write_samples(vec![2; 121]).await.unwrap();
        assert!(matches!(rx.recv().await, Some(WriterMessage::Samples(b)) if b[0] == 2));
    }

    #[tokio::test]
    async fn test_spawn_fails_when_file_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        let result = WriterTask::spawn(dir.path().to_path_buf(), AudioFormat::DEVICE, 8).await;
        assert!(matches!(result, Err(WriterError::Create { .. })));
    }
}

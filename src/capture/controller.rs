//! Recording session controller.
//!
//! Drives one stream at a time through
//! `Idle -> Discarding -> Recording -> Stopped`, wiring decoded packets into
//! the accumulator and the background writer. The first seconds after the
//! start command carry warm-up noise from the device and are dropped.
//!
//! Inside a running stream a segment can be marked with
//! [`RecordingController::mark_start`] and [`RecordingController::mark_stop`].
//! Marked samples are kept in memory alongside the full recording and saved
//! to their own file.

use super::accumulator::{SampleAccumulator, StreamState};
use super::hexdump::{format_hexdump, PACKET_LABEL};
use super::packet::PacketDecoder;
use super::transport::{CaptureTransport, ConnectionState};
use crate::audio::AudioFormat;
use crate::error::{PipelineError, WriterError};
use crate::storage::wav::{save_wav, FinalizedFile, StreamingWavWriter};
use crate::storage::writer::{WriterOutcome, WriterTask, DEFAULT_QUEUE_DEPTH};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn, Level};

pub const DISCARD_WINDOW: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Persist every batch as it arrives.
    #[default]
    Streaming,
    /// Keep the recording in memory and save it once on stop.
    Buffered,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub temp_dir: PathBuf,
    pub format: AudioFormat,
    pub discard_window: Duration,
    pub queue_depth: usize,
    pub mode: CaptureMode,
    /// Cap on samples per recording. A recording that reaches it fails and
    /// is aborted.
    pub max_samples: Option<u64>,
}

impl ControllerConfig {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            format: AudioFormat::DEVICE,
            discard_window: DISCARD_WINDOW,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            mode: CaptureMode::Streaming,
            max_samples: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    #[default]
    Idle,
    Discarding,
    Recording,
    Stopped,
}

impl StreamPhase {
    pub fn is_streaming(&self) -> bool {
        matches!(self, StreamPhase::Discarding | StreamPhase::Recording)
    }
}

/// Snapshot published to observers on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    pub phase: StreamPhase,
    pub samples: u64,
    pub packets: u64,
    pub duration_secs: f64,
    pub sequence_gaps: u64,
    pub malformed_packets: u64,
    /// Samples in the marked segment, if one is being recorded.
    pub segment_samples: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRecording {
    pub path: PathBuf,
    pub samples: u64,
    pub duration: Duration,
    /// False when the device never acknowledged the stop command, or went
    /// away before it could be sent. The audio is kept either way.
    pub stop_acknowledged: bool,
}

pub struct RecordingController<T: CaptureTransport> {
    transport: T,
    config: ControllerConfig,
    phase: StreamPhase,
    decoder: PacketDecoder,
    accumulator: SampleAccumulator,
    writer: Option<WriterTask>,
    capture_path: Option<PathBuf>,
    segment: Option<SampleAccumulator>,
    started_at: Option<Instant>,
    sequence_gaps: u64,
    malformed_packets: u64,
    stats_tx: watch::Sender<StreamStats>,
}

impl<T: CaptureTransport> RecordingController<T> {
    pub fn new(transport: T, config: ControllerConfig) -> Self {
        let (stats_tx, _) = watch::channel(StreamStats::default());
        Self {
            transport,
            config,
            phase: StreamPhase::Idle,
            decoder: PacketDecoder::new(),
            accumulator: SampleAccumulator::buffered(),
            writer: None,
            capture_path: None,
            segment: None,
            started_at: None,
            sequence_gaps: 0,
            malformed_packets: 0,
            stats_tx,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.phase.is_streaming()
    }

    pub fn stream_state(&self) -> StreamState {
        self.accumulator.state()
    }

    pub fn sample_count(&self) -> u64 {
        self.accumulator.sample_count()
    }

    pub fn packet_count(&self) -> u64 {
        self.accumulator.packet_count()
    }

    pub fn duration(&self) -> Duration {
        self.accumulator.duration(self.config.format.sample_rate)
    }

    pub fn stats(&self) -> watch::Receiver<StreamStats> {
        self.stats_tx.subscribe()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn set_phase(&mut self, phase: StreamPhase) {
        if self.phase != phase {
            debug!("Stream phase {:?} -> {:?}", self.phase, phase);
        }
        self.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        self.stats_tx.send_replace(StreamStats {
            phase: self.phase,
            samples: self.accumulator.sample_count(),
            packets: self.accumulator.packet_count(),
            duration_secs: self.duration().as_secs_f64(),
            sequence_gaps: self.sequence_gaps,
            malformed_packets: self.malformed_packets,
            segment_samples: self.segment.as_ref().map(|s| s.sample_count()),
        });
    }

    fn reset_counters(&mut self) {
        self.decoder.reset();
        self.accumulator.clear();
        self.sequence_gaps = 0;
        self.malformed_packets = 0;
        self.started_at = None;
    }

    fn next_temp_path(&self, prefix: &str) -> PathBuf {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
        self.config.temp_dir.join(format!("{}_{}.wav", prefix, stamp))
    }

    fn next_capture_path(&self) -> PathBuf {
        self.next_temp_path("capture")
    }

    pub async fn start_stream(&mut self) -> Result<(), PipelineError> {
        if self.is_streaming() {
            return Err(PipelineError::AlreadyStreaming);
        }

        if self.segment.take().is_some() {
            warn!("Dropping unsaved segment from the previous stream");
        }
        self.reset_counters();
        let path = self.next_capture_path();

        match self.config.mode {
            CaptureMode::Streaming => {
                let mut writer = StreamingWavWriter::new(path.clone(), self.config.format);
                if let Some(limit) = self.config.max_samples {
                    writer = writer.with_max_samples(limit);
                }
                let task = match WriterTask::start(writer, self.config.queue_depth).await {
                    Ok(task) => task,
                    Err(e) => {
                        error!("Failed to open capture file {:?}: {}", path, e);
                        self.set_phase(StreamPhase::Idle);
                        return Err(e.into());
                    }
                };
                self.accumulator = SampleAccumulator::streaming(Box::new(task.handle()));
                self.writer = Some(task);
            }
            CaptureMode::Buffered => {
                self.accumulator = SampleAccumulator::buffered();
            }
        }
        self.capture_path = Some(path);

        if let Err(e) = self.transport.start_capture().await {
            error!("Error starting stream: {}", e);
            self.drop_capture().await;
            self.set_phase(StreamPhase::Idle);
            return Err(e.into());
        }

        self.started_at = Some(Instant::now());
        if self.config.discard_window.is_zero() {
            self.set_phase(StreamPhase::Recording);
        } else {
            self.set_phase(StreamPhase::Discarding);
        }
        info!("Stream started");
        Ok(())
    }

    /// Feed one raw notification payload.
    ///
    /// Malformed packets are logged and skipped. An error means the
    /// recording was aborted and the controller is back to idle.
    pub async fn handle_notification(&mut self, packet: &[u8]) -> Result<(), PipelineError> {
        match self.phase {
            StreamPhase::Discarding => {
                let elapsed = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed < self.config.discard_window {
                    trace!("Skipping notification, not enough time elapsed");
                    return Ok(());
                }
                info!("Discard window elapsed, recording");
                self.set_phase(StreamPhase::Recording);
            }
            StreamPhase::Recording => {}
            phase => {
                debug!("Ignoring notification while {:?}", phase);
                return Ok(());
            }
        }

        if tracing::enabled!(Level::TRACE) {
            trace!("{}", format_hexdump(PACKET_LABEL, packet));
        }

        let decoded = match self.decoder.decode(packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Dropping packet: {}", e);
                self.malformed_packets += 1;
                self.publish();
                return Ok(());
            }
        };

        if decoded.gap.is_some() {
            self.sequence_gaps += 1;
        }
        self.accumulator.record_sequence(decoded.sequence);

        if let Some(limit) = self.config.max_samples {
            let total = self.accumulator.sample_count() + decoded.samples.len() as u64;
            if !self.accumulator.is_streaming() && total > limit {
                let cause = WriterError::DataLimit { max_samples: limit };
                return Err(self.abort(cause.into()).await);
            }
        }

        if let Some(segment) = self.segment.as_mut() {
            segment.ingest(decoded.samples.clone()).await?;
        }

        if let Err(e) = self.accumulator.ingest(decoded.samples).await {
            return Err(self.abort(e).await);
        }

        self.publish();
        Ok(())
    }

    /// Stop the stream and finalize what was captured. Calling it when no
    /// stream is active does nothing.
    pub async fn stop_stream(&mut self) -> Result<Option<FinishedRecording>, PipelineError> {
        if !self.is_streaming() {
            debug!("Stop requested while {:?}, nothing to do", self.phase);
            return Ok(None);
        }

        let acknowledged = match self.transport.stop_capture().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Stop command failed, keeping captured audio: {}", e);
                false
            }
        };

        self.finish(acknowledged).await.map(Some)
    }

    /// Throw away the current capture, deleting any file already written.
    pub async fn discard(&mut self) -> Result<(), PipelineError> {
        let was_streaming = self.is_streaming();

        let result = match self.writer.take() {
            Some(task) => task.discard().await.map_err(PipelineError::from),
            None => Ok(()),
        };

        if was_streaming {
            if let Err(e) = self.transport.stop_capture().await {
                warn!("Stop command failed during discard: {}", e);
            }
        }

        self.accumulator = SampleAccumulator::buffered();
        self.capture_path = None;
        self.segment = None;
        self.reset_counters();
        self.set_phase(StreamPhase::Idle);
        info!("Capture discarded");
        result
    }

    pub fn is_marking(&self) -> bool {
        self.segment.is_some()
    }

    /// Start a marked segment. Every sample recorded from now on also goes
    /// into the segment until [`Self::mark_stop`]. Marking again while a
    /// segment is open keeps the open one.
    pub fn mark_start(&mut self) -> Result<(), PipelineError> {
        if !self.is_streaming() {
            return Err(PipelineError::NotStreaming);
        }
        if self.segment.is_some() {
            debug!("Segment already marked");
            return Ok(());
        }

        self.segment = Some(SampleAccumulator::buffered());
        info!("Segment started");
        self.publish();
        Ok(())
    }

    /// End the marked segment and save it to a file of its own. Returns
    /// `None` when no segment was marked. A segment still open when its
    /// stream ended can be saved here too.
    pub async fn mark_stop(&mut self) -> Result<Option<FinishedRecording>, PipelineError> {
        let Some(mut segment) = self.segment.take() else {
            debug!("No segment marked");
            return Ok(None);
        };
        self.publish();

        let samples = segment.take_samples();
        let path = self.next_temp_path("segment");
        let format = self.config.format;
        info!("Segment stopped, {} samples recorded", samples.len());

        let file = tokio::task::spawn_blocking(move || save_wav(&samples, &path, format))
            .await
            .map_err(|e| WriterError::TaskFailed(e.to_string()))??;

        Ok(Some(FinishedRecording {
            duration: file.format.duration(file.samples),
            path: file.path,
            samples: file.samples,
            stop_acknowledged: true,
        }))
    }

    pub async fn handle_connection_state(
        &mut self,
        state: ConnectionState,
    ) -> Result<Option<FinishedRecording>, PipelineError> {
        match state {
            ConnectionState::Connected => {
                info!("Device connected");
                Ok(None)
            }
            ConnectionState::Disconnected if self.is_streaming() => {
                warn!("Device disconnected while streaming, keeping what was captured");
                self.finish(false).await.map(Some)
            }
            ConnectionState::Disconnected => {
                info!("Device disconnected");
                Ok(None)
            }
        }
    }

    async fn finish(&mut self, stop_acknowledged: bool) -> Result<FinishedRecording, PipelineError> {
        let elapsed = self.started_at.take().map(|t| t.elapsed()).unwrap_or_default();

        let result = match self.writer.take() {
            Some(task) => task.finalize().await,
            None => self.save_buffered().await,
        };
        self.capture_path = None;
        self.set_phase(StreamPhase::Stopped);

        let file = result?;
        info!(
            "Stream stopped, recording time: {:?}, {} samples in {} packets ({} gaps, {} malformed)",
            elapsed,
            file.samples,
            self.accumulator.packet_count(),
            self.sequence_gaps,
            self.malformed_packets
        );

        Ok(FinishedRecording {
            duration: file.format.duration(file.samples),
            path: file.path,
            samples: file.samples,
            stop_acknowledged,
        })
    }

    async fn save_buffered(&mut self) -> Result<FinalizedFile, WriterError> {
        let path = self
            .capture_path
            .clone()
            .unwrap_or_else(|| self.next_capture_path());
        let samples = self.accumulator.take_samples();
        let format = self.config.format;

        tokio::task::spawn_blocking(move || save_wav(&samples, &path, format))
            .await
            .map_err(|e| WriterError::TaskFailed(e.to_string()))?
    }

    /// Abort after a writer failure: collect the worker's error, tell the
    /// device to stop and return to idle.
    async fn abort(&mut self, cause: PipelineError) -> PipelineError {
        error!("Aborting recording: {}", cause);

        // Release the sink's sender so the worker can observe the close.
        self.accumulator = SampleAccumulator::buffered();

        let err = match self.writer.take() {
            Some(task) => match task.join().await {
                Err(e) => PipelineError::Writer(e),
                Ok(WriterOutcome::Finalized(file)) => {
                    remove_partial(&file.path);
                    cause
                }
                Ok(WriterOutcome::Discarded(_)) => cause,
            },
            None => cause,
        };

        if let Err(e) = self.transport.stop_capture().await {
            warn!("Stop command failed during abort: {}", e);
        }

        self.capture_path = None;
        self.reset_counters();
        self.set_phase(StreamPhase::Idle);
        err
    }

    /// Release a writer opened for a stream that never started.
    async fn drop_capture(&mut self) {
        self.accumulator = SampleAccumulator::buffered();
        if let Some(task) = self.writer.take() {
            if let Err(e) = task.discard().await {
                warn!("Failed to discard capture file: {}", e);
            }
        }
        self.capture_path = None;
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to remove partial recording {:?}: {}", path, e);
    }
}

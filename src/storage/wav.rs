//! Incremental WAV writing with a back-patched header.
//!
//! The file is created with a zeroed 44-byte header, samples are appended as
//! they arrive, and the real header is written over the placeholder when the
//! recording is finalized. Every write goes straight to the file, so until
//! then the on-disk length is always `44 + samples * 2`, even if the process
//! dies, but the header is not valid.

use crate::audio::AudioFormat;
use crate::error::WriterError;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const HEADER_LEN: usize = 44;
const FMT_CHUNK_LEN: u32 = 16;
const PCM_FORMAT: u16 = 1;
const MAX_DATA_LEN: u64 = u32::MAX as u64 - 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub format: AudioFormat,
    pub data_len: u32,
}

impl WavHeader {
    /// Largest sample count whose data chunk still fits the 32-bit RIFF
    /// size fields.
    pub fn max_samples(format: AudioFormat) -> u64 {
        MAX_DATA_LEN / format.block_align().max(1) as u64
    }

    /// Header for `samples` samples. Counts past [`Self::max_samples`] are
    /// clamped, so the header then under-reports the data.
    pub fn for_samples(format: AudioFormat, samples: u64) -> Self {
        let data_len = samples.saturating_mul(format.block_align() as u64);
        if data_len > MAX_DATA_LEN {
            warn!(
                "{} samples overflow the WAV data chunk, header clamped to {} bytes",
                samples, MAX_DATA_LEN
            );
        }
        Self {
            format,
            data_len: data_len.min(MAX_DATA_LEN) as u32,
        }
    }

    pub fn samples(&self) -> u64 {
        let block = self.format.block_align().max(1) as u64;
        self.data_len as u64 / block
    }

    pub fn duration_secs(&self) -> f64 {
        self.format.duration_secs(self.samples())
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        let mut cursor = &mut buf[..];
        // Writes into a fixed slice of exactly HEADER_LEN bytes cannot fail.
        let _ = self.write_to(&mut cursor);
        buf
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let format = &self.format;
        w.write_all(b"RIFF")?;
        w.write_u32::<LittleEndian>(self.data_len + 36)?;
        w.write_all(b"WAVE")?;

        w.write_all(b"fmt ")?;
        w.write_u32::<LittleEndian>(FMT_CHUNK_LEN)?;
        w.write_u16::<LittleEndian>(PCM_FORMAT)?;
        w.write_u16::<LittleEndian>(format.channels)?;
        w.write_u32::<LittleEndian>(format.sample_rate)?;
        w.write_u32::<LittleEndian>(format.byte_rate())?;
        w.write_u16::<LittleEndian>(format.block_align())?;
        w.write_u16::<LittleEndian>(format.bits_per_sample)?;

        w.write_all(b"data")?;
        w.write_u32::<LittleEndian>(self.data_len)?;
        Ok(())
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, WriterError> {
        if bytes.len() < HEADER_LEN {
            return Err(WriterError::InvalidHeader(format!(
                "{} bytes, need {}",
                bytes.len(),
                HEADER_LEN
            )));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(WriterError::InvalidHeader("missing RIFF/WAVE tags".into()));
        }
        if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
            return Err(WriterError::InvalidHeader("missing fmt/data chunks".into()));
        }
        let audio_format = LittleEndian::read_u16(&bytes[20..22]);
        if audio_format != PCM_FORMAT {
            return Err(WriterError::InvalidHeader(format!(
                "unsupported format code {}",
                audio_format
            )));
        }

        Ok(Self {
            format: AudioFormat {
                channels: LittleEndian::read_u16(&bytes[22..24]),
                sample_rate: LittleEndian::read_u32(&bytes[24..28]),
                bits_per_sample: LittleEndian::read_u16(&bytes[34..36]),
            },
            data_len: LittleEndian::read_u32(&bytes[40..44]),
        })
    }

    pub fn read_from(path: &Path) -> Result<Self, WriterError> {
        let mut file = File::open(path)?;
        let mut buf = [0u8; HEADER_LEN];
        file.read_exact(&mut buf)?;
        Self::parse(&buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Closed,
    Open,
    Finalized,
    Failed,
    Discarded,
}

impl WriterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriterState::Closed => "closed",
            WriterState::Open => "open",
            WriterState::Finalized => "finalized",
            WriterState::Failed => "failed",
            WriterState::Discarded => "discarded",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedFile {
    pub path: PathBuf,
    pub samples: u64,
    pub format: AudioFormat,
}

impl FinalizedFile {
    pub fn duration_secs(&self) -> f64 {
        self.format.duration_secs(self.samples)
    }
}

pub struct StreamingWavWriter {
    path: PathBuf,
    format: AudioFormat,
    state: WriterState,
    file: Option<File>,
    samples_written: u64,
    max_samples: u64,
    scratch: Vec<u8>,
}

impl StreamingWavWriter {
    pub fn new(path: impl Into<PathBuf>, format: AudioFormat) -> Self {
        Self {
            path: path.into(),
            format,
            state: WriterState::Closed,
            file: None,
            samples_written: 0,
            max_samples: WavHeader::max_samples(format),
            scratch: Vec::new(),
        }
    }

    /// Refuse writes past `limit` samples. The data chunk limit of the
    /// format always applies.
    pub fn with_max_samples(mut self, limit: u64) -> Self {
        self.max_samples = limit.min(WavHeader::max_samples(self.format));
        self
    }

    pub fn max_samples(&self) -> u64 {
        self.max_samples
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    fn expect_state(&self, expected: WriterState, operation: &'static str) -> Result<(), WriterError> {
        if self.state != expected {
            return Err(WriterError::InvalidState {
                state: self.state.as_str(),
                operation,
            });
        }
        Ok(())
    }

    pub fn open(&mut self) -> Result<(), WriterError> {
        self.expect_state(WriterState::Closed, "open")?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| WriterError::Create {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }

        let mut file = File::create(&self.path).map_err(|source| WriterError::Create {
            path: self.path.clone(),
            source,
        })?;
        file.write_all(&[0u8; HEADER_LEN])
            .map_err(|source| WriterError::Create {
                path: self.path.clone(),
                source,
            })?;

        self.file = Some(file);
        self.samples_written = 0;
        self.state = WriterState::Open;
        debug!("Opened {:?} with placeholder header", self.path);
        Ok(())
    }

    /// Append samples. Errors leave the writer open with the file cut back
    /// to the samples already counted; the caller decides whether to abort.
    pub fn write_samples(&mut self, samples: &[i16]) -> Result<(), WriterError> {
        self.expect_state(WriterState::Open, "write samples")?;

        let total = self.samples_written + samples.len() as u64;
        if total > self.max_samples {
            return Err(WriterError::DataLimit {
                max_samples: self.max_samples,
            });
        }

        let Some(file) = self.file.as_mut() else {
            return Err(WriterError::InvalidState {
                state: self.state.as_str(),
                operation: "write samples",
            });
        };

        self.scratch.resize(samples.len() * 2, 0);
        LittleEndian::write_i16_into(samples, &mut self.scratch);
        if let Err(e) = file.write_all(&self.scratch) {
            let committed = HEADER_LEN as u64 + self.samples_written * 2;
            if let Err(trunc) = file
                .set_len(committed)
                .and_then(|()| file.seek(SeekFrom::Start(committed)).map(|_| ()))
            {
                warn!("Failed to trim {:?} after a short write: {}", self.path, trunc);
            }
            return Err(e.into());
        }

        self.samples_written = total;
        Ok(())
    }

    pub fn finalize(&mut self) -> Result<FinalizedFile, WriterError> {
        self.expect_state(WriterState::Open, "finalize")?;

        match self.patch_header() {
            Ok(()) => {
                self.state = WriterState::Finalized;
                info!(
                    "Finalized {:?}: {} samples ({:.2}s)",
                    self.path,
                    self.samples_written,
                    self.format.duration_secs(self.samples_written)
                );
                Ok(FinalizedFile {
                    path: self.path.clone(),
                    samples: self.samples_written,
                    format: self.format,
                })
            }
            Err(e) => {
                self.state = WriterState::Failed;
                Err(e)
            }
        }
    }

    fn patch_header(&mut self) -> Result<(), WriterError> {
        if let Some(file) = self.file.take() {
            file.sync_data()?;
        }

        let header = WavHeader::for_samples(self.format, self.samples_written);
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.encode())?;
        file.sync_all()?;
        Ok(())
    }

    /// Close the handle and delete the backing file.
    pub fn discard(&mut self) -> Result<(), WriterError> {
        if matches!(self.state, WriterState::Finalized | WriterState::Discarded) {
            return Err(WriterError::InvalidState {
                state: self.state.as_str(),
                operation: "discard",
            });
        }

        self.file.take();
        let previous = self.state;
        self.state = WriterState::Discarded;

        if previous == WriterState::Closed {
            return Ok(());
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Discarded {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Discarded file {:?} was already gone", self.path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// One-shot save of an in-memory recording.
pub fn save_wav(samples: &[i16], path: &Path, format: AudioFormat) -> Result<FinalizedFile, WriterError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = hound::WavWriter::create(path, format.wav_spec())?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    info!("Saved {} samples to {:?}", samples.len(), path);
    Ok(FinalizedFile {
        path: path.to_path_buf(),
        samples: samples.len() as u64,
        format,
    })
}

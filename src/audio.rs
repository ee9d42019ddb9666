use std::time::Duration;

/// Fixed operating parameters of the capture device.
pub const SAMPLE_RATE: u32 = 32000;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub const DEVICE: AudioFormat = AudioFormat {
        sample_rate: SAMPLE_RATE,
        channels: CHANNELS,
        bits_per_sample: BITS_PER_SAMPLE,
    };

    pub fn bytes_per_sample(&self) -> u32 {
        self.bits_per_sample as u32 / 8
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample / 8
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.channels as u32 * self.bits_per_sample as u32 / 8
    }

    pub fn duration_secs(&self, samples: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        samples as f64 / self.sample_rate as f64
    }

    pub fn duration(&self, samples: u64) -> Duration {
        Duration::from_secs_f64(self.duration_secs(samples))
    }

    pub fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::DEVICE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_format_rates() {
        let format = AudioFormat::DEVICE;
        assert_eq!(format.byte_rate(), 64000);
        assert_eq!(format.block_align(), 2);
        assert_eq!(format.bytes_per_sample(), 2);
    }

    #[test]
    fn test_duration() {
        let format = AudioFormat::DEVICE;
        assert_eq!(format.duration_secs(16000), 0.5);
        assert_eq!(format.duration(64000), Duration::from_secs(2));
    }
}

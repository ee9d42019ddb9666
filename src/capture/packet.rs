//! Audio notification packet decoding.
//!
//! Wire layout of one notification:
//!
//! ```text
//! byte 0..2   sequence number, u16 little-endian
//! byte 1..    up to 121 samples, i16 little-endian
//! ```
//!
//! The sample payload starts at byte 1, inside the sequence number. That is
//! how the device firmware frames its packets and must not be "corrected".

use crate::error::DecodeError;
use byteorder::{ByteOrder, LittleEndian};
use tracing::warn;

/// Shortest packet that still carries a sequence number and one sample.
pub const MIN_PACKET_LEN: usize = 4;
pub const MAX_SAMPLES_PER_PACKET: usize = 121;
const SAMPLE_OFFSET: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub sequence: u16,
    pub samples: Vec<i16>,
    /// Packets missing between the previous sequence number and this one.
    pub gap: Option<u16>,
}

impl DecodedPacket {
    pub fn samples_decoded(&self) -> usize {
        self.samples.len()
    }
}

/// Number of packets lost between two consecutive sequence numbers,
/// modulo the 16-bit counter.
pub fn sequence_gap(previous: u16, current: u16) -> u16 {
    current.wrapping_sub(previous).wrapping_sub(1)
}

/// Number of samples a packet of `len` bytes carries.
pub fn sample_count(len: usize) -> usize {
    (len.saturating_sub(SAMPLE_OFFSET) / 2).min(MAX_SAMPLES_PER_PACKET)
}

#[derive(Debug, Default)]
pub struct PacketDecoder {
    last_sequence: Option<u16>,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_sequence(&self) -> Option<u16> {
        self.last_sequence
    }

    pub fn reset(&mut self) {
        self.last_sequence = None;
    }

    pub fn decode(&mut self, packet: &[u8]) -> Result<DecodedPacket, DecodeError> {
        if packet.len() < MIN_PACKET_LEN {
            return Err(DecodeError::MalformedPacket {
                len: packet.len(),
                min: MIN_PACKET_LEN,
            });
        }

        let sequence = LittleEndian::read_u16(&packet[..2]);

        let count = sample_count(packet.len());
        let mut samples = vec![0i16; count];
        LittleEndian::read_i16_into(
            &packet[SAMPLE_OFFSET..SAMPLE_OFFSET + count * 2],
            &mut samples,
        );

        let gap = self.last_sequence.and_then(|previous| {
            let gap = sequence_gap(previous, sequence);
            if gap > 0 {
                warn!(
                    "Sequence gap: {} packet(s) missing between {} and {}",
                    gap, previous, sequence
                );
                Some(gap)
            } else {
                None
            }
        });
        self.last_sequence = Some(sequence);

        Ok(DecodedPacket {
            sequence,
            samples,
            gap,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(sequence: u16, len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        data[..2].copy_from_slice(&sequence.to_le_bytes());
        data
    }

    #[test]
    fn test_sequence_is_little_endian_prefix() {
        let mut decoder = PacketDecoder::new();
        let decoded = decoder.decode(&[0x34, 0x12, 0x00, 0x00]).unwrap();
        assert_eq!(decoded.sequence, 0x1234);
        assert_eq!(decoder.last_sequence(), Some(0x1234));
    }

    #[test]
    fn test_short_packet_is_malformed() {
        let mut decoder = PacketDecoder::new();
        let err = decoder.decode(&[1, 2, 3]).unwrap_err();
        assert_eq!(err, DecodeError::MalformedPacket { len: 3, min: 4 });
        assert_eq!(decoder.last_sequence(), None);
        assert!(decoder.decode(&[]).is_err());
    }

    #[test]
    fn test_sample_count_by_length() {
        let mut decoder = PacketDecoder::new();
        for (len, expected) in [(4, 1), (5, 2), (6, 2), (100, 49), (243, 121), (244, 121), (512, 121)] {
            let decoded = decoder.decode(&packet(0, len)).unwrap();
            assert_eq!(decoded.samples_decoded(), expected, "len {}", len);
            assert_eq!(sample_count(len), expected);
        }
    }

    #[test]
    fn test_samples_start_at_byte_one() {
        let mut decoder = PacketDecoder::new();
        // seq = 0x0201, samples read from bytes 1.. : [0x02,0x03] [0x04,0xFF] [0xFE,0x7F]
        let data = [0x01, 0x02, 0x03, 0x04, 0xFF, 0xFE, 0x7F];
        let decoded = decoder.decode(&data).unwrap();
        assert_eq!(decoded.sequence, 0x0201);
        assert_eq!(decoded.samples, vec![0x0302, 0xFF04u16 as i16, 0x7FFE]);
    }

    #[test]
    fn test_gap_detection() {
        assert_eq!(sequence_gap(10, 11), 0);
        assert_eq!(sequence_gap(10, 15), 4);
        assert_eq!(sequence_gap(65534, 2), 3);
        assert_eq!(sequence_gap(65535, 0), 0);

        let mut decoder = PacketDecoder::new();
        assert_eq!(decoder.decode(&packet(10, 8)).unwrap().gap, None);
        assert_eq!(decoder.decode(&packet(11, 8)).unwrap().gap, None);
        let decoded = decoder.decode(&packet(15, 8)).unwrap();
        assert_eq!(decoded.gap, Some(4));
        assert_eq!(decoded.samples_decoded(), 3);

        decoder.reset();
        assert_eq!(decoder.decode(&packet(65534, 8)).unwrap().gap, None);
        assert_eq!(decoder.decode(&packet(2, 8)).unwrap().gap, Some(3));
    }
}

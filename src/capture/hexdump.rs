//! Packet dumps in the Zephyr `LOG_HEXDUMP_INF` layout.
//!
//! The device firmware and the bench capture tooling both log packets this
//! way, so the same text can be replayed through the pipeline later.
//!
//! ```text
//! Audio Packet:
//!                                         01 02 03 04 05 06 07 08  09 0a 0b 0c 0d 0e 0f 10  |
//!                                         11 12                                            |
//! ```

use std::fmt::Write as _;

pub const PACKET_LABEL: &str = "Audio Packet";

const LINE_WIDTH: usize = 16;
const INDENT: usize = 40;
const HEX_COLUMN: usize = 49;

pub fn format_hexdump(label: &str, data: &[u8]) -> String {
    let mut output = format!("{}: ", label);

    for chunk in data.chunks(LINE_WIDTH) {
        let (left, right) = chunk.split_at(chunk.len().min(8));
        let left = hex_bytes(left);
        let hex = if right.is_empty() {
            format!("{:<23} ", left)
        } else {
            format!("{}  {}", left, hex_bytes(right))
        };
        let _ = write!(output, "\n{:indent$}{:<width$} |", "", hex, indent = INDENT, width = HEX_COLUMN);
    }

    output
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract every dump labelled `label` from a log.
///
/// A line containing `"<label>:"` starts a packet; each following line whose
/// text before `|` is made only of hex byte pairs continues it. Anything else
/// ends the packet.
pub fn parse_hexdump(text: &str, label: &str) -> Vec<Vec<u8>> {
    let marker = format!("{}:", label);
    let mut packets = Vec::new();
    let mut current: Option<Vec<u8>> = None;

    for line in text.lines() {
        if line.contains(&marker) {
            if let Some(packet) = current.take() {
                packets.push(packet);
            }
            current = Some(Vec::new());
            continue;
        }

        let Some(packet) = current.as_mut() else {
            continue;
        };

        match parse_hex_line(line) {
            Some(bytes) => packet.extend(bytes),
            None => {
                if let Some(packet) = current.take() {
                    packets.push(packet);
                }
            }
        }
    }

    if let Some(packet) = current.take() {
        packets.push(packet);
    }

    packets.retain(|p| !p.is_empty());
    packets
}

fn parse_hex_line(line: &str) -> Option<Vec<u8>> {
    let (hex, _) = line.split_once('|')?;
    let bytes = hex
        .split_whitespace()
        .map(|token| {
            if token.len() == 2 {
                u8::from_str_radix(token, 16).ok()
            } else {
                None
            }
        })
        .collect::<Option<Vec<u8>>>()?;

    if bytes.is_empty() { None } else { Some(bytes) }
}

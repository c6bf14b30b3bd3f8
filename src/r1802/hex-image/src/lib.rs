use std::io::{self, BufRead};

const ADDRESS_SPACE: usize = 0x10000;

/// Record types understood by the loader; anything else ends the image
pub const RECORD_DATA: u8 = 0x00;
pub const RECORD_SEGMENT: u8 = 0x02;

/// One parsed `:LLAAAATT<data>CC` line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub address: u16,
    pub kind: u8,
    pub data: Vec<u8>,
    pub checksum: u8,
}

impl Record {
    /// Data interpreted as a big-endian 16-bit value (segment records)
    pub fn value(&self) -> u16 {
        let hi = self.data.first().copied().unwrap_or(0) as u16;
        let lo = self.data.get(1).copied().unwrap_or(0) as u16;
        hi << 8 | lo
    }
}

/// What a load wrote and what it had to drop
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub records: usize,
    pub written: usize,
    pub dropped: usize, // Bytes addressed at or beyond 0x10000
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

// Reads `n` hex digits; characters that are not hex digits are skipped over
// without contributing, and running off the end reads as zero
fn hex_field(bytes: &[u8], pos: &mut usize, n: usize) -> u32 {
    let mut value = 0;
    for _ in 0..n {
        if let Some(d) = bytes.get(*pos).copied().and_then(hex_digit) {
            value = value << 4 | d as u32;
        }
        *pos += 1;
    }
    value
}

/// Parses a record line. Returns None for lines without the leading colon.
/// The checksum is read but not verified.
pub fn parse_record(line: &[u8]) -> Option<Record> {
    let start = line
        .iter()
        .position(|c| !c.is_ascii_whitespace())
        .unwrap_or(line.len());
    let bytes = &line[start..];
    if bytes.first() != Some(&b':') {
        return None;
    }

    let mut pos = 1;
    let count = hex_field(bytes, &mut pos, 2) as usize;
    let address = hex_field(bytes, &mut pos, 4) as u16;
    let kind = hex_field(bytes, &mut pos, 2) as u8;
    let data = (0..count)
        .map(|_| hex_field(bytes, &mut pos, 2) as u8)
        .collect();
    let checksum = hex_field(bytes, &mut pos, 2) as u8;

    Some(Record {
        address,
        kind,
        data,
        checksum,
    })
}

/// Loads an Intel-HEX style image into `memory`, which is indexed from 0.
/// Data records are placed at the current segment base plus their address;
/// bytes that would land past the end of the 64K space are counted and
/// dropped. Loading stops at the first record of an unknown type. Lines are
/// taken as raw bytes, so text that is not UTF-8 is skipped like any other
/// non-record line.
pub fn load_image<R: BufRead>(reader: R, memory: &mut [u8]) -> io::Result<LoadSummary> {
    let mut summary = LoadSummary::default();
    let mut base: usize = 0;
    let limit = memory.len().min(ADDRESS_SPACE);

    for line in reader.split(b'\n') {
        let record = match parse_record(&line?) {
            Some(record) => record,
            None => continue,
        };
        summary.records += 1;

        match record.kind {
            RECORD_DATA => {
                let mut addr = base + record.address as usize;
                for byte in record.data {
                    if addr < limit {
                        memory[addr] = byte;
                        summary.written += 1;
                    } else {
                        summary.dropped += 1;
                    }
                    addr += 1;
                }
            }
            RECORD_SEGMENT => base = (record.value() as usize) << 4,
            _ => break,
        }
    }

    Ok(summary)
}

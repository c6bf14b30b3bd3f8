use log::debug;
use std::io::{self, BufRead, Write};

// Entries below this share of samples are left out of the report
const REPORT_THRESHOLD: f64 = 0.1;

struct Symbol {
    addr: u16,
    label: String,
    hits: u64,
}

/// Sampling profiler over a sorted symbol table. Each sample is credited to
/// the symbol whose range `[addr, next addr)` holds the PC.
pub struct Profile {
    symbols: Vec<Symbol>,
    samples: u64,
}

impl Profile {
    /// Reads `ADDR LABEL` lines with a hexadecimal address. Lines that do
    /// not parse are skipped.
    pub fn load<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut symbols = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let parsed = match (fields.next(), fields.next()) {
                (Some(addr), Some(label)) => u16::from_str_radix(addr, 16)
                    .ok()
                    .map(|addr| (addr, label.to_string())),
                _ => None,
            };
            match parsed {
                Some((addr, label)) => symbols.push(Symbol {
                    addr,
                    label,
                    hits: 0,
                }),
                None => debug!("Symbol file line {} skipped: {:?}", n + 1, line),
            }
        }
        symbols.sort_by_key(|s| s.addr);

        Ok(Profile {
            symbols,
            samples: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Tally one PC sample. PCs below the first symbol only count towards
    /// the total.
    pub fn sample(&mut self, pc: u16) {
        self.samples += 1;
        let above = self.symbols.partition_point(|s| s.addr <= pc);
        if above > 0 {
            self.symbols[above - 1].hits += 1;
        }
    }

    /// (label, percent) pairs at or above the threshold, busiest first
    pub fn ranking(&self) -> Vec<(&str, f64)> {
        if self.samples == 0 {
            return Vec::new();
        }
        let mut ranked: Vec<(&str, f64)> = self
            .symbols
            .iter()
            .map(|s| (s.label.as_str(), 100.0 * s.hits as f64 / self.samples as f64))
            .filter(|(_, pct)| *pct >= REPORT_THRESHOLD)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }

    pub fn report<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (label, pct) in self.ranking() {
            writeln!(out, "{:6.2}% {}", pct, label)?;
        }
        Ok(())
    }
}

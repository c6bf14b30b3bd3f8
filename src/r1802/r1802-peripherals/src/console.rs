use log::{info, warn};
use r1802_core::constants::ports::PORT_CONSOLE;
use r1802_core::memory::mods::IoPeriph;
use std::io::{self, Write};

/// Character output on the console port plus Q reporting
pub struct ConsolePeriph<W: Write> {
    out: W,
    q: bool,
}

impl ConsolePeriph<io::Stdout> {
    pub fn stdout() -> Self {
        ConsolePeriph::new(io::stdout())
    }
}

impl<W: Write> ConsolePeriph<W> {
    pub fn new(out: W) -> Self {
        ConsolePeriph { out, q: false }
    }

    /// Last level reported on Q
    pub fn q(&self) -> bool {
        self.q
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> IoPeriph for ConsolePeriph<W> {
    fn read(&mut self, _port: u8) -> Option<u8> {
        None
    }

    fn write(&mut self, port: u8, value: u8) {
        if port != PORT_CONSOLE {
            return;
        }
        // Unbuffered so interleaving with log output stays readable
        let res = self.out.write_all(&[value]).and_then(|_| self.out.flush());
        if let Err(e) = res {
            warn!("Console write failed: {}", e);
        }
    }

    fn set_q(&mut self, level: bool) {
        self.q = level;
        info!("Q={}", level as u8);
    }
}

use log::debug;
use r1802_core::constants::ports::PORT_STORAGE;
use r1802_core::memory::mods::IoPeriph;
use std::io::{ErrorKind, Read};

/// Sequential byte source behind the storage input port. Reads past the end
/// of the stream return 0xFF, like an erased block.
pub struct StoragePeriph<R: Read> {
    src: R,
    position: u64,
    exhausted: bool,
}

const ERASED: u8 = 0xFF;

impl<R: Read> StoragePeriph<R> {
    pub fn new(src: R) -> Self {
        StoragePeriph {
            src,
            position: 0,
            exhausted: false,
        }
    }

    /// Bytes delivered so far
    pub fn position(&self) -> u64 {
        self.position
    }

    fn next_byte(&mut self) -> u8 {
        if self.exhausted {
            return ERASED;
        }
        let mut byte = [0u8; 1];
        loop {
            match self.src.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    self.position += 1;
                    return byte[0];
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("Storage read failed at {}: {}", self.position, e);
                    break;
                }
            }
        }
        debug!("Storage exhausted after {} bytes", self.position);
        self.exhausted = true;
        ERASED
    }
}

impl<R: Read> IoPeriph for StoragePeriph<R> {
    fn read(&mut self, port: u8) -> Option<u8> {
        if port == PORT_STORAGE {
            Some(self.next_byte())
        } else {
            None
        }
    }

    fn write(&mut self, _port: u8, _value: u8) {}
}

use super::mods::IoPeriph;
use crate::constants::ports;

use log::{debug, warn};

const MAX_DEVICES: usize = 8;

/// Routes 1802 port traffic (N lines 1-7, EF1-EF4, Q) to attached devices
pub struct IoController<'a> {
    port_map: [u8; ports::PORT_COUNT], // Last value written to each output port
    devices: heapless::Vec<&'a mut dyn IoPeriph, MAX_DEVICES>,
}

impl<'a> IoController<'a> {
    /// Creates controller without attached peripherals
    pub fn empty() -> Self {
        Self {
            port_map: [0; ports::PORT_COUNT],
            devices: heapless::Vec::new(),
        }
    }

    /// Attaches a device; every device sees every output write
    pub fn attach(&mut self, periph: &'a mut dyn IoPeriph) -> Result<(), &'static str> {
        self.devices
            .push(periph)
            .map_err(|_| "Too many I/O devices attached")
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Input port read, first device driving the port wins
    pub fn read_port(&mut self, port: u8) -> u8 {
        let port = port & ports::PORT_MASK;
        for dev in self.devices.iter_mut() {
            if let Some(value) = dev.read(port) {
                debug!("Reading I/O port {}: {:02x}", port, value);
                return value;
            }
        }
        debug!("Reading undriven I/O port {}", port);
        0
    }

    /// Output port write, mirrored to all attached devices
    pub fn write_port(&mut self, port: u8, value: u8) {
        let port = port & ports::PORT_MASK;
        debug!("OUT({})={:02x}", port, value);
        if port == 0 {
            warn!("Write to unselected output port 0");
        }

        self.port_map[port as usize] = value;
        for dev in self.devices.iter_mut() {
            dev.write(port, value);
        }
    }

    /// Last value written to an output port
    pub fn latched(&self, port: u8) -> u8 {
        self.port_map[(port & ports::PORT_MASK) as usize]
    }

    /// External flag EF1-EF4, asserted if any device drives it
    pub fn flag(&self, ef: u8) -> bool {
        if ef == 0 || ef > ports::EF_COUNT {
            warn!("Invalid external flag EF{}", ef);
            return false;
        }
        self.devices.iter().any(|dev| dev.flag(ef))
    }

    pub fn set_q(&mut self, level: bool) {
        for dev in self.devices.iter_mut() {
            dev.set_q(level);
        }
    }
}

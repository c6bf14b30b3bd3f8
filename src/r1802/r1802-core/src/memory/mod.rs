pub mod io;
mod registers;

pub mod mods;
pub use io::IoController;
pub use registers::Registers;

use crate::constants::MEMORY_SIZE;

/// Flat 64K memory map plus the I/O bus. The RAM array is owned by the host;
/// the map only borrows it so the host can load images and inspect display
/// memory around CPU execution.
pub struct MemoryMap<'a> {
    ram: &'a mut [u8; MEMORY_SIZE], // Shared memory array
    io: IoController<'a>,           // Port and flag routing
}

impl<'a> MemoryMap<'a> {
    /// Creates memory map with no I/O devices attached
    pub fn new_blank(ram: &'a mut [u8; MEMORY_SIZE]) -> MemoryMap<'a> {
        MemoryMap {
            ram,
            io: IoController::empty(),
        }
    }

    /// Creates operational memory map with the host's I/O devices
    pub fn new(ram: &'a mut [u8; MEMORY_SIZE], io: IoController<'a>) -> MemoryMap<'a> {
        MemoryMap { ram, io }
    }

    pub fn read(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        self.ram[addr as usize] = value;
    }

    pub fn read_io(&mut self, port: u8) -> u8 {
        self.io.read_port(port)
    }

    pub fn write_io(&mut self, port: u8, value: u8) {
        self.io.write_port(port, value)
    }

    pub fn flag(&self, ef: u8) -> bool {
        self.io.flag(ef)
    }

    pub fn set_q(&mut self, level: bool) {
        self.io.set_q(level)
    }

    pub fn io(&mut self) -> &mut IoController<'a> {
        &mut self.io
    }

    /// Read-only view of RAM (framebuffer, test inspection)
    pub fn ram(&self) -> &[u8; MEMORY_SIZE] {
        &*self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8; MEMORY_SIZE] {
        &mut *self.ram
    }
}

// Size of the flat address space shared with the host
pub const MEMORY_SIZE: usize = 0x10000;

// Number of general purpose registers (R0-RF)
pub const REGISTER_COUNT: usize = 16;

pub mod registers {
    // Register implicitly used by MARK as a stack pointer
    pub const REGISTER_STACK: usize = 0x2;
    pub const REGISTER_MASK: u8 = 0xF;
}

pub mod timing {
    // Clock units per instruction: 2 machine cycles of 8 clocks
    pub const CYCLES_SHORT: u16 = 16;
    // Long branch/skip family takes 3 machine cycles
    pub const CYCLES_LONG: u16 = 24;

    // Pacing loop slice length in microseconds (100 Hz)
    pub const SLICE_MICROS: u64 = 10_000;
    pub const DEFAULT_CLOCK_MHZ: u64 = 1000;
}

pub mod ports {
    // Output ports
    pub const PORT_PSG_SELECT: u8 = 4;
    pub const PORT_PSG_DATA: u8 = 5;
    pub const PORT_CONSOLE: u8 = 7;

    // Input ports
    pub const PORT_STORAGE: u8 = 2;

    // Ports 1-7 are addressable, 0 is never selected by OUT/INP
    pub const PORT_COUNT: usize = 8;
    pub const PORT_MASK: u8 = 0x7;

    // External flag lines EF1-EF4
    pub const EF_COUNT: u8 = 4;
}

pub mod psg {
    pub const CHANNELS: usize = 32;
    // Right shift applied to the mixed sums (headroom for 32 voices)
    pub const ATTENUATION: u32 = 9;
    pub const SAMPLE_RATE: u32 = 48_000;
    pub const AMPLITUDE: i16 = 0x2000;
    // Delta values in this band select the noise generator
    pub const NOISE_BAND: u16 = 0xFF00;
    pub const NOISE_SEED: u32 = 1 << 16;

    // Register selectors (low 3 bits of the address byte)
    pub const REG_DELTA_LO: u8 = 0;
    pub const REG_DELTA_HI: u8 = 1;
    pub const REG_VOLUME_LEFT: u8 = 2;
    pub const REG_VOLUME_RIGHT: u8 = 3;
    pub const REG_WAVE_TYPE: u8 = 5;
}

pub mod trace {
    pub const TRACE_DEPTH: usize = 10_000;
    // Opcode plus up to two immediate bytes
    pub const MAX_OPERANDS: usize = 3;
    pub const MAX_ACCESSES: usize = 4;
}

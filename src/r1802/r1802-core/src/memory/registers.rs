use crate::constants::REGISTER_COUNT;
use crate::utils::pack_xp;

/// CPU register file and flags
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Registers {
    pub r: [u16; REGISTER_COUNT], // Scratchpad registers R0-RF
    pub d: u8,                    // Accumulator
    pub df: bool,                 // Data flag (carry / not borrow)
    pub x: u8,                    // Index register select
    pub p: u8,                    // Program counter select
    pub q: bool,                  // Output flip-flop
    pub t: u8,                    // Saved X,P for interrupts/MARK
    pub ie: bool,                 // Interrupt enable
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Current program counter value, R(P)
    pub fn pc(&self) -> u16 {
        self.r[self.p as usize]
    }

    /// Current index register value, R(X)
    pub fn rx(&self) -> u16 {
        self.r[self.x as usize]
    }

    pub fn xp(&self) -> u8 {
        pack_xp(self.x, self.p)
    }
}

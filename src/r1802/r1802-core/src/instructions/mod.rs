pub mod instructions;

use crate::constants::ports::PORT_MASK;
use crate::constants::registers::REGISTER_MASK;
use core::fmt;

// Import trait implementations for CPU instruction categories
pub use instructions::Arithmetic;
pub use instructions::ControlFlow;
pub use instructions::Interrupt;
pub use instructions::Io;
pub use instructions::LoadStore;

// Bit masks for opcode fields
const FAMILY_MASK: u8 = 0xF0; // I field
const FAMILY_LONG: u8 = 0xC0; // Long branch/skip family (3 machine cycles)

/// Enum representing CDP1802 instruction mnemonics
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mnemonic {
    IDL,  // Idle
    LDN,  // Load via N
    INC,  // Increment reg N
    DEC,  // Decrement reg N
    SBR,  // Short branch family (BR, BZ, ..., SKP)
    LDA,  // Load advance
    STR,  // Store via N
    IRX,  // Increment reg X
    OUT,  // Output
    INP,  // Input
    RET,  // Return
    DIS,  // Disable
    LDXA, // Load via X and advance
    STXD, // Store via X and decrement
    ADC,  // Add with carry
    SDB,  // Subtract D with borrow
    SHRC, // Shift right with carry
    SMB,  // Subtract memory with borrow
    SAV,  // Save
    MARK, // Push X,P to stack
    REQ,  // Reset Q
    SEQ,  // Set Q
    ADCI, // Add with carry, immediate
    SDBI, // Subtract D with borrow, immediate
    SHLC, // Shift left with carry
    SMBI, // Subtract memory with borrow, immediate
    GLO,  // Get low reg N
    GHI,  // Get high reg N
    PLO,  // Put low reg N
    PHI,  // Put high reg N
    LBR,  // Long branch family (LBR, LBZ, ..., LBNF)
    NOP,  // No operation
    LSKP, // Long skip family (LSKP, LSZ, ..., LSIE)
    SEP,  // Set P
    SEX,  // Set X
    LDX,  // Load via X
    OR,   // Or
    AND,  // And
    XOR,  // Exclusive or
    ADD,  // Add
    SD,   // Subtract D
    SHR,  // Shift right
    SM,   // Subtract memory
    LDI,  // Load immediate
    ORI,  // Or immediate
    ANI,  // And immediate
    XRI,  // Exclusive or immediate
    ADI,  // Add immediate
    SDI,  // Subtract D immediate
    SHL,  // Shift left
    SMI,  // Subtract memory immediate
    INVALID,
}

/// Branch and skip conditions sampled at execution time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Always,
    Never,
    Q,
    NotQ,
    Zero,
    NotZero,
    Df,
    NotDf,
    Ef(u8),
    NotEf(u8),
    Ie,
}

/// Structure representing a decoded CDP1802 instruction
#[derive(Clone, Copy, Debug)]
pub struct Instructions {
    pub pc: u16,         // Address the opcode was fetched from
    pub mnem: Mnemonic,  // Mnemonic representation
    pub data: u8,        // Raw opcode byte
    pub cond: Condition, // Branch/skip condition, Always for the rest
}

impl Instructions {
    pub fn new() -> Instructions {
        Instructions {
            pc: 0x0000,
            data: 0x00,
            mnem: Mnemonic::INVALID,
            cond: Condition::Always,
        }
    }

    /// Register selected by the low nibble
    pub fn get_register(&self) -> usize {
        (self.data & REGISTER_MASK) as usize
    }

    /// Port selected by OUT/INP
    pub fn get_port(&self) -> u8 {
        self.data & PORT_MASK
    }

    /// Low nibble as a raw value (SEP/SEX)
    pub fn get_nibble(&self) -> u8 {
        self.data & REGISTER_MASK
    }

    /// Long branches and skips take an extra machine cycle
    pub fn is_long(&self) -> bool {
        self.data & FAMILY_MASK == FAMILY_LONG
    }

    /// Name as written in RCA assembly, e.g. `BNZ` or `LSDF`
    pub fn name(&self) -> &'static str {
        const SHORT_BRANCH: [&str; 16] = [
            "BR", "BQ", "BZ", "BDF", "B1", "B2", "B3", "B4", "SKP", "BNQ", "BNZ", "BNF", "BN1",
            "BN2", "BN3", "BN4",
        ];
        const LONG_FAMILY: [&str; 16] = [
            "LBR", "LBQ", "LBZ", "LBDF", "NOP", "LSNQ", "LSNZ", "LSNF", "LSKP", "LBNQ", "LBNZ",
            "LBNF", "LSIE", "LSQ", "LSZ", "LSDF",
        ];

        match self.mnem {
            Mnemonic::SBR => SHORT_BRANCH[self.get_register()],
            Mnemonic::LBR | Mnemonic::LSKP | Mnemonic::NOP => LONG_FAMILY[self.get_register()],
            Mnemonic::IDL => "IDL",
            Mnemonic::LDN => "LDN",
            Mnemonic::INC => "INC",
            Mnemonic::DEC => "DEC",
            Mnemonic::LDA => "LDA",
            Mnemonic::STR => "STR",
            Mnemonic::IRX => "IRX",
            Mnemonic::OUT => "OUT",
            Mnemonic::INP => "INP",
            Mnemonic::RET => "RET",
            Mnemonic::DIS => "DIS",
            Mnemonic::LDXA => "LDXA",
            Mnemonic::STXD => "STXD",
            Mnemonic::ADC => "ADC",
            Mnemonic::SDB => "SDB",
            Mnemonic::SHRC => "SHRC",
            Mnemonic::SMB => "SMB",
            Mnemonic::SAV => "SAV",
            Mnemonic::MARK => "MARK",
            Mnemonic::REQ => "REQ",
            Mnemonic::SEQ => "SEQ",
            Mnemonic::ADCI => "ADCI",
            Mnemonic::SDBI => "SDBI",
            Mnemonic::SHLC => "SHLC",
            Mnemonic::SMBI => "SMBI",
            Mnemonic::GLO => "GLO",
            Mnemonic::GHI => "GHI",
            Mnemonic::PLO => "PLO",
            Mnemonic::PHI => "PHI",
            Mnemonic::SEP => "SEP",
            Mnemonic::SEX => "SEX",
            Mnemonic::LDX => "LDX",
            Mnemonic::OR => "OR",
            Mnemonic::AND => "AND",
            Mnemonic::XOR => "XOR",
            Mnemonic::ADD => "ADD",
            Mnemonic::SD => "SD",
            Mnemonic::SHR => "SHR",
            Mnemonic::SM => "SM",
            Mnemonic::LDI => "LDI",
            Mnemonic::ORI => "ORI",
            Mnemonic::ANI => "ANI",
            Mnemonic::XRI => "XRI",
            Mnemonic::ADI => "ADI",
            Mnemonic::SDI => "SDI",
            Mnemonic::SHL => "SHL",
            Mnemonic::SMI => "SMI",
            Mnemonic::INVALID => "???",
        }
    }
}

impl Default for Instructions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mnem {
            Mnemonic::LDN
            | Mnemonic::INC
            | Mnemonic::DEC
            | Mnemonic::LDA
            | Mnemonic::STR
            | Mnemonic::GLO
            | Mnemonic::GHI
            | Mnemonic::PLO
            | Mnemonic::PHI
            | Mnemonic::SEP
            | Mnemonic::SEX => write!(f, "{} R{:X}", self.name(), self.get_nibble()),
            Mnemonic::OUT | Mnemonic::INP => write!(f, "{} {}", self.name(), self.get_port()),
            _ => f.write_str(self.name()),
        }
    }
}

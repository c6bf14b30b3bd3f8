use crate::instructions::{Condition, Instructions, Mnemonic};
use log::{debug, error};

/// Condition tested by a short branch (3N); bit 3 inverts the test
fn short_condition(n: u8) -> Condition {
    let inverted = n & 0x8 != 0;
    match (n & 0x7, inverted) {
        (0, false) => Condition::Always,
        (0, true) => Condition::Never, // SKP
        (1, false) => Condition::Q,
        (1, true) => Condition::NotQ,
        (2, false) => Condition::Zero,
        (2, true) => Condition::NotZero,
        (3, false) => Condition::Df,
        (3, true) => Condition::NotDf,
        (ef, false) => Condition::Ef(ef - 3),
        (ef, true) => Condition::NotEf(ef - 3),
    }
}

/// Decode the long branch / long skip family (CN)
fn decoder_long(mut i: Instructions) -> Result<Instructions, &'static str> {
    let (mnem, cond) = match i.get_nibble() {
        0x0 => (Mnemonic::LBR, Condition::Always),
        0x1 => (Mnemonic::LBR, Condition::Q),
        0x2 => (Mnemonic::LBR, Condition::Zero),
        0x3 => (Mnemonic::LBR, Condition::Df),
        0x4 => (Mnemonic::NOP, Condition::Never),
        0x5 => (Mnemonic::LSKP, Condition::NotQ),
        0x6 => (Mnemonic::LSKP, Condition::NotZero),
        0x7 => (Mnemonic::LSKP, Condition::NotDf),
        0x8 => (Mnemonic::LSKP, Condition::Always),
        0x9 => (Mnemonic::LBR, Condition::NotQ),
        0xA => (Mnemonic::LBR, Condition::NotZero),
        0xB => (Mnemonic::LBR, Condition::NotDf),
        0xC => (Mnemonic::LSKP, Condition::Ie),
        0xD => (Mnemonic::LSKP, Condition::Q),
        0xE => (Mnemonic::LSKP, Condition::Zero),
        0xF => (Mnemonic::LSKP, Condition::Df),
        _ => {
            error!("Nibble out of range in long family: {:02x}", i.data);
            return Err("Invalid Opcode Nibble");
        }
    };
    i.mnem = mnem;
    i.cond = cond;
    Ok(i)
}

/// Decode the 6N and 7N groups, which encode one operation per opcode
fn decoder_misc(mut i: Instructions) -> Result<Instructions, &'static str> {
    i.mnem = match i.data {
        0x60 => Mnemonic::IRX,
        0x61..=0x67 => Mnemonic::OUT,
        0x68 => {
            debug!("Illegal op:{:02x} at {:04x}", i.data, i.pc);
            return Err("Illegal Opcode");
        }
        0x69..=0x6F => Mnemonic::INP,
        0x70 => Mnemonic::RET,
        0x71 => Mnemonic::DIS,
        0x72 => Mnemonic::LDXA,
        0x73 => Mnemonic::STXD,
        0x74 => Mnemonic::ADC,
        0x75 => Mnemonic::SDB,
        0x76 => Mnemonic::SHRC,
        0x77 => Mnemonic::SMB,
        0x78 => Mnemonic::SAV,
        0x79 => Mnemonic::MARK,
        0x7A => Mnemonic::REQ,
        0x7B => Mnemonic::SEQ,
        0x7C => Mnemonic::ADCI,
        0x7D => Mnemonic::SDBI,
        0x7E => Mnemonic::SHLC,
        0x7F => Mnemonic::SMBI,
        _ => {
            error!("Opcode {:02x} routed to the wrong group", i.data);
            return Err("Invalid Opcode Group");
        }
    };
    Ok(i)
}

/// Decode the FN group (ALU via X and immediate)
fn decoder_alu(mut i: Instructions) -> Instructions {
    i.mnem = match i.get_nibble() {
        0x0 => Mnemonic::LDX,
        0x1 => Mnemonic::OR,
        0x2 => Mnemonic::AND,
        0x3 => Mnemonic::XOR,
        0x4 => Mnemonic::ADD,
        0x5 => Mnemonic::SD,
        0x6 => Mnemonic::SHR,
        0x7 => Mnemonic::SM,
        0x8 => Mnemonic::LDI,
        0x9 => Mnemonic::ORI,
        0xA => Mnemonic::ANI,
        0xB => Mnemonic::XRI,
        0xC => Mnemonic::ADI,
        0xD => Mnemonic::SDI,
        0xE => Mnemonic::SHL,
        _ => Mnemonic::SMI,
    };
    i
}

/// Main decoder function, dispatches on the I (high) nibble
pub fn decoder(pc: u16, data: u8) -> Result<Instructions, &'static str> {
    let mut i = Instructions {
        pc,
        data,
        mnem: Mnemonic::INVALID, // Initial placeholder
        cond: Condition::Always,
    };

    match data >> 4 {
        0x0 => {
            i.mnem = if data == 0x00 {
                Mnemonic::IDL
            } else {
                Mnemonic::LDN
            };
        }
        0x1 => i.mnem = Mnemonic::INC,
        0x2 => i.mnem = Mnemonic::DEC,
        0x3 => {
            i.mnem = Mnemonic::SBR;
            i.cond = short_condition(i.get_nibble());
        }
        0x4 => i.mnem = Mnemonic::LDA,
        0x5 => i.mnem = Mnemonic::STR,
        0x6 | 0x7 => return decoder_misc(i),
        0x8 => i.mnem = Mnemonic::GLO,
        0x9 => i.mnem = Mnemonic::GHI,
        0xA => i.mnem = Mnemonic::PLO,
        0xB => i.mnem = Mnemonic::PHI,
        0xC => return decoder_long(i),
        0xD => i.mnem = Mnemonic::SEP,
        0xE => i.mnem = Mnemonic::SEX,
        _ => return Ok(decoder_alu(i)),
    }

    Ok(i)
}

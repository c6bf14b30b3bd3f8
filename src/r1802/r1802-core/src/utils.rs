// 9-bit addition; returns the low byte and the carry out of bit 7
pub fn add_with_carry(op1: u8, op2: u8, carry_in: bool) -> (u8, bool) {
    let sum = op1 as u16 + op2 as u16 + carry_in as u16;
    ((sum & 0xFF) as u8, sum & 0x100 != 0)
}

// 9-bit subtraction (minuend - subtrahend - borrow). The returned flag is
// the DF convention: true when no borrow occurred.
pub fn sub_with_borrow(minuend: u8, subtrahend: u8, borrow_in: bool) -> (u8, bool) {
    let diff = (minuend as u16)
        .wrapping_sub(subtrahend as u16)
        .wrapping_sub(borrow_in as u16);
    ((diff & 0xFF) as u8, diff & 0x100 == 0)
}

// Packs X and P into the T/stack byte layout (X high nibble, P low nibble)
pub fn pack_xp(x: u8, p: u8) -> u8 {
    (x & 0xF) << 4 | (p & 0xF)
}

pub fn unpack_xp(value: u8) -> (u8, u8) {
    (value >> 4, value & 0xF)
}

pub fn low_byte(value: u16) -> u8 {
    (value & 0xFF) as u8
}

pub fn high_byte(value: u16) -> u8 {
    (value >> 8) as u8
}

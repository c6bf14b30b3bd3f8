use super::{Instructions, Mnemonic};
use crate::constants::registers::REGISTER_STACK;
use crate::constants::timing::{CYCLES_LONG, CYCLES_SHORT};
use crate::cpu::Cpu;
use crate::trace::Tracer;
use crate::utils::{add_with_carry, high_byte, low_byte, sub_with_borrow, unpack_xp};

// Immediate forms take their operand from M(R(P)) instead of M(R(X))
fn is_immediate(cmd: &Instructions) -> bool {
    matches!(cmd.data, 0x7C..=0x7F | 0xF8..=0xFF)
}

// 7N ALU forms feed DF back in as carry/borrow
fn uses_carry(cmd: &Instructions) -> bool {
    matches!(cmd.data, 0x74..=0x7F)
}

impl<'a, T: Tracer> Cpu<'a, T> {
    /// Second ALU operand: immediate byte or M(R(X))
    fn alu_operand(&mut self, cmd: &Instructions) -> u8 {
        if is_immediate(cmd) {
            self.imm8()
        } else {
            let addr = self.regs.rx();
            self.read(addr)
        }
    }
}

/// Arithmetic and logic on D (binary, DF = carry / not borrow)
pub trait Arithmetic {
    fn logic(&mut self, cmd: &Instructions) -> u16; // OR AND XOR ORI ANI XRI
    fn add(&mut self, cmd: &Instructions) -> u16; // ADD ADI ADC ADCI
    fn sub_d(&mut self, cmd: &Instructions) -> u16; // SD SDI SDB SDBI (M - D)
    fn sub_m(&mut self, cmd: &Instructions) -> u16; // SM SMI SMB SMBI (D - M)
    fn shift_right(&mut self, cmd: &Instructions) -> u16; // SHR SHRC
    fn shift_left(&mut self, cmd: &Instructions) -> u16; // SHL SHLC
}

impl<'a, T: Tracer> Arithmetic for Cpu<'a, T> {
    fn logic(&mut self, cmd: &Instructions) -> u16 {
        let operand = self.alu_operand(cmd);
        self.regs.d = match cmd.mnem {
            Mnemonic::OR | Mnemonic::ORI => self.regs.d | operand,
            Mnemonic::AND | Mnemonic::ANI => self.regs.d & operand,
            _ => self.regs.d ^ operand,
        };
        CYCLES_SHORT
    }

    fn add(&mut self, cmd: &Instructions) -> u16 {
        let operand = self.alu_operand(cmd);
        let carry = uses_carry(cmd) && self.regs.df;
        let (res, df) = add_with_carry(self.regs.d, operand, carry);
        self.regs.d = res;
        self.regs.df = df;
        CYCLES_SHORT
    }

    fn sub_d(&mut self, cmd: &Instructions) -> u16 {
        let operand = self.alu_operand(cmd);
        let borrow = uses_carry(cmd) && !self.regs.df;
        let (res, df) = sub_with_borrow(operand, self.regs.d, borrow);
        self.regs.d = res;
        self.regs.df = df;
        CYCLES_SHORT
    }

    fn sub_m(&mut self, cmd: &Instructions) -> u16 {
        let operand = self.alu_operand(cmd);
        let borrow = uses_carry(cmd) && !self.regs.df;
        let (res, df) = sub_with_borrow(self.regs.d, operand, borrow);
        self.regs.d = res;
        self.regs.df = df;
        CYCLES_SHORT
    }

    fn shift_right(&mut self, cmd: &Instructions) -> u16 {
        let carry_in = if uses_carry(cmd) && self.regs.df {
            0x80
        } else {
            0x00
        };
        self.regs.df = self.regs.d & 1 != 0;
        self.regs.d = carry_in | self.regs.d >> 1;
        CYCLES_SHORT
    }

    fn shift_left(&mut self, cmd: &Instructions) -> u16 {
        // D + D is D << 1 with bit 7 landing in the carry
        let carry = uses_carry(cmd) && self.regs.df;
        let (res, df) = add_with_carry(self.regs.d, self.regs.d, carry);
        self.regs.d = res;
        self.regs.df = df;
        CYCLES_SHORT
    }
}

/// Branching, skipping and register selection
pub trait ControlFlow {
    fn short_branch(&mut self, cmd: &Instructions) -> u16; // 3N: branch in page
    fn long_branch(&mut self, cmd: &Instructions) -> u16; // LBR family
    fn long_skip(&mut self, cmd: &Instructions) -> u16; // LSKP family
    fn nop(&mut self, cmd: &Instructions) -> u16;
    fn sep(&mut self, cmd: &Instructions) -> u16; // Set P
    fn sex(&mut self, cmd: &Instructions) -> u16; // Set X
}

impl<'a, T: Tracer> ControlFlow for Cpu<'a, T> {
    fn short_branch(&mut self, cmd: &Instructions) -> u16 {
        let p = self.regs.p as usize;
        if self.test(cmd.cond) {
            // Target page is the page holding the branch byte
            let page = self.regs.r[p] & 0xFF00;
            let target = self.imm8();
            self.regs.r[p] = page | target as u16;
        } else {
            self.advance(p);
        }
        CYCLES_SHORT
    }

    fn long_branch(&mut self, cmd: &Instructions) -> u16 {
        let p = self.regs.p as usize;
        if self.test(cmd.cond) {
            let hi = self.imm8();
            let lo = self.imm8();
            self.regs.r[p] = (hi as u16) << 8 | lo as u16;
        } else {
            self.regs.r[p] = self.regs.r[p].wrapping_add(2);
        }
        CYCLES_LONG
    }

    fn long_skip(&mut self, cmd: &Instructions) -> u16 {
        if self.test(cmd.cond) {
            let p = self.regs.p as usize;
            self.regs.r[p] = self.regs.r[p].wrapping_add(2);
        }
        CYCLES_LONG
    }

    fn nop(&mut self, _cmd: &Instructions) -> u16 {
        CYCLES_LONG
    }

    fn sep(&mut self, cmd: &Instructions) -> u16 {
        self.regs.p = cmd.get_nibble();
        CYCLES_SHORT
    }

    fn sex(&mut self, cmd: &Instructions) -> u16 {
        self.regs.x = cmd.get_nibble();
        CYCLES_SHORT
    }
}

/// Interrupt linkage: X,P save and restore through T and the stack
pub trait Interrupt {
    fn ret(&mut self, cmd: &Instructions) -> u16; // RET / DIS
    fn sav(&mut self, cmd: &Instructions) -> u16; // Save T
    fn mark(&mut self, cmd: &Instructions) -> u16; // Push X,P
}

impl<'a, T: Tracer> Interrupt for Cpu<'a, T> {
    fn ret(&mut self, cmd: &Instructions) -> u16 {
        let addr = self.advance(self.regs.x as usize);
        let (x, p) = unpack_xp(self.read(addr));
        self.regs.x = x;
        self.regs.p = p;
        self.regs.ie = cmd.mnem == Mnemonic::RET;
        CYCLES_SHORT
    }

    fn sav(&mut self, _cmd: &Instructions) -> u16 {
        let addr = self.regs.rx();
        self.write(addr, self.regs.t);
        CYCLES_SHORT
    }

    fn mark(&mut self, _cmd: &Instructions) -> u16 {
        self.regs.t = self.regs.xp();
        self.regs.x = self.regs.p;
        let addr = self.retreat(REGISTER_STACK);
        self.write(addr, self.regs.t);
        CYCLES_SHORT
    }
}

/// Port I/O and the Q output
pub trait Io {
    fn out(&mut self, cmd: &Instructions) -> u16; // 61-67
    fn inp(&mut self, cmd: &Instructions) -> u16; // 69-6F
    fn q_latch(&mut self, cmd: &Instructions) -> u16; // REQ / SEQ
}

impl<'a, T: Tracer> Io for Cpu<'a, T> {
    fn out(&mut self, cmd: &Instructions) -> u16 {
        let addr = self.advance(self.regs.x as usize);
        let value = self.read(addr);
        self.write_io(cmd.get_port(), value);
        CYCLES_SHORT
    }

    fn inp(&mut self, cmd: &Instructions) -> u16 {
        let value = self.read_io(cmd.get_port());
        self.regs.d = value;
        let addr = self.regs.rx();
        self.write(addr, value);
        CYCLES_SHORT
    }

    fn q_latch(&mut self, cmd: &Instructions) -> u16 {
        self.set_q(cmd.mnem == Mnemonic::SEQ);
        CYCLES_SHORT
    }
}

/// Trait handling memory load/store and register transfer operations
pub trait LoadStore {
    fn ldn(&mut self, cmd: &Instructions) -> u16;
    fn lda(&mut self, cmd: &Instructions) -> u16;
    fn ldx(&mut self, cmd: &Instructions) -> u16; // LDX / LDI
    fn ldxa(&mut self, cmd: &Instructions) -> u16;
    fn store(&mut self, cmd: &Instructions) -> u16; // STR
    fn stxd(&mut self, cmd: &Instructions) -> u16;
    fn inc(&mut self, cmd: &Instructions) -> u16;
    fn dec(&mut self, cmd: &Instructions) -> u16;
    fn irx(&mut self, cmd: &Instructions) -> u16;
    fn glo(&mut self, cmd: &Instructions) -> u16;
    fn ghi(&mut self, cmd: &Instructions) -> u16;
    fn plo(&mut self, cmd: &Instructions) -> u16;
    fn phi(&mut self, cmd: &Instructions) -> u16;
}

impl<'a, T: Tracer> LoadStore for Cpu<'a, T> {
    // Load via N, R(N) unchanged
    fn ldn(&mut self, cmd: &Instructions) -> u16 {
        let addr = self.regs.r[cmd.get_register()];
        self.regs.d = self.read(addr);
        CYCLES_SHORT
    }

    // Load advance
    fn lda(&mut self, cmd: &Instructions) -> u16 {
        let addr = self.advance(cmd.get_register());
        self.regs.d = self.read(addr);
        CYCLES_SHORT
    }

    fn ldx(&mut self, cmd: &Instructions) -> u16 {
        self.regs.d = self.alu_operand(cmd);
        CYCLES_SHORT
    }

    fn ldxa(&mut self, _cmd: &Instructions) -> u16 {
        let addr = self.advance(self.regs.x as usize);
        self.regs.d = self.read(addr);
        CYCLES_SHORT
    }

    fn store(&mut self, cmd: &Instructions) -> u16 {
        let addr = self.regs.r[cmd.get_register()];
        self.write(addr, self.regs.d);
        CYCLES_SHORT
    }

    fn stxd(&mut self, _cmd: &Instructions) -> u16 {
        let addr = self.retreat(self.regs.x as usize);
        self.write(addr, self.regs.d);
        CYCLES_SHORT
    }

    fn inc(&mut self, cmd: &Instructions) -> u16 {
        let n = cmd.get_register();
        self.set_reg(n, self.regs.r[n].wrapping_add(1));
        CYCLES_SHORT
    }

    fn dec(&mut self, cmd: &Instructions) -> u16 {
        let n = cmd.get_register();
        self.set_reg(n, self.regs.r[n].wrapping_sub(1));
        CYCLES_SHORT
    }

    fn irx(&mut self, _cmd: &Instructions) -> u16 {
        let x = self.regs.x as usize;
        self.set_reg(x, self.regs.r[x].wrapping_add(1));
        CYCLES_SHORT
    }

    fn glo(&mut self, cmd: &Instructions) -> u16 {
        self.regs.d = low_byte(self.regs.r[cmd.get_register()]);
        CYCLES_SHORT
    }

    fn ghi(&mut self, cmd: &Instructions) -> u16 {
        self.regs.d = high_byte(self.regs.r[cmd.get_register()]);
        CYCLES_SHORT
    }

    fn plo(&mut self, cmd: &Instructions) -> u16 {
        let n = cmd.get_register();
        self.set_reg(n, (self.regs.r[n] & 0xFF00) | self.regs.d as u16);
        CYCLES_SHORT
    }

    fn phi(&mut self, cmd: &Instructions) -> u16 {
        let n = cmd.get_register();
        self.set_reg(n, (self.regs.d as u16) << 8 | (self.regs.r[n] & 0x00FF));
        CYCLES_SHORT
    }
}

#[cfg(test)]
mod instruction_tests {
    use crate::cpu::cpu_tests::{blank_ram, with_program};
    use crate::cpu::{Cpu, Halt};
    use crate::memory::mods::IoPeriph;
    use crate::memory::{IoController, MemoryMap};
    use crate::trace::Tracer;

    fn run_to_idle<T: Tracer>(cpu: &mut Cpu<'_, T>) {
        assert!(matches!(cpu.run(1_000_000), Err(Halt::Idle { .. })));
    }

    /// Executes `op` with D = `d`, DF = `df` and M(R(X)) = `m`
    fn alu(cpu: &mut Cpu<'_>, op: u8, d: u8, df: bool, m: u8) -> (u8, bool) {
        cpu.reset();
        let mem = cpu.memory();
        mem.write(0x0000, op);
        mem.write(0x0001, m); // immediate operand for the xI forms
        mem.write(0x0002, 0x00);
        mem.write(0x0100, m);
        cpu.regs.x = 1;
        cpu.regs.r[1] = 0x0100;
        cpu.regs.d = d;
        cpu.regs.df = df;
        let length = if matches!(op, 0x7C | 0x7D | 0x7F | 0xF8..=0xFD | 0xFF) {
            2
        } else {
            1
        };
        assert_eq!(cpu.step(), Ok(16));
        assert_eq!(cpu.pc(), length);
        (cpu.regs.d, cpu.regs.df)
    }

    #[test]
    fn test_add_and_subtract_every_pair() {
        let mut ram = blank_ram();
        let mut cpu = Cpu::new(MemoryMap::new_blank(&mut ram));
        for a in 0..=255u16 {
            for b in 0..=255u16 {
                // ADD: D = D + M
                let (d, df) = alu(&mut cpu, 0xF4, a as u8, false, b as u8);
                assert_eq!(d as u16, (a + b) & 0xFF);
                assert_eq!(df, a + b >= 256);

                // SD: D = M - D
                let (d, df) = alu(&mut cpu, 0xF5, b as u8, false, a as u8);
                assert_eq!(d, (a as u8).wrapping_sub(b as u8));
                assert_eq!(df, a >= b);

                // SM: D = D - M
                let (d, df) = alu(&mut cpu, 0xF7, a as u8, false, b as u8);
                assert_eq!(d, (a as u8).wrapping_sub(b as u8));
                assert_eq!(df, a >= b);
            }
        }
    }

    #[test]
    fn test_plain_forms_ignore_df() {
        let mut ram = blank_ram();
        let mut cpu = Cpu::new(MemoryMap::new_blank(&mut ram));
        assert_eq!(alu(&mut cpu, 0xF4, 0x10, true, 0x20), (0x30, false));
        assert_eq!(alu(&mut cpu, 0xFC, 0x10, true, 0x20), (0x30, false));
        assert_eq!(alu(&mut cpu, 0xF7, 0x30, false, 0x20), (0x10, true));
        assert_eq!(alu(&mut cpu, 0xFF, 0x30, false, 0x20), (0x10, true));
        assert_eq!(alu(&mut cpu, 0xFD, 0x20, false, 0x30), (0x10, true));
    }

    #[test]
    fn test_carry_and_borrow_forms() {
        let mut ram = blank_ram();
        let mut cpu = Cpu::new(MemoryMap::new_blank(&mut ram));
        // ADC / ADCI add DF
        assert_eq!(alu(&mut cpu, 0x74, 0x10, true, 0x20), (0x31, false));
        assert_eq!(alu(&mut cpu, 0x7C, 0xFF, true, 0x00), (0x00, true));
        // SDB: M - D - !DF
        assert_eq!(alu(&mut cpu, 0x75, 0x10, false, 0x30), (0x1F, true));
        assert_eq!(alu(&mut cpu, 0x75, 0x10, true, 0x30), (0x20, true));
        assert_eq!(alu(&mut cpu, 0x7D, 0x30, true, 0x30), (0x00, true));
        assert_eq!(alu(&mut cpu, 0x7D, 0x30, false, 0x30), (0xFF, false));
        // SMB: D - M - !DF
        assert_eq!(alu(&mut cpu, 0x77, 0x00, false, 0x00), (0xFF, false));
        assert_eq!(alu(&mut cpu, 0x7F, 0x05, true, 0x03), (0x02, true));
    }

    #[test]
    fn test_carry_chaining() {
        let mut ram = blank_ram();
        let mut cpu = Cpu::new(MemoryMap::new_blank(&mut ram));
        for a in (0..=255u16).step_by(3) {
            for b in (0..=255u16).step_by(7) {
                let (d, df) = alu(&mut cpu, 0x74, a as u8, true, b as u8);
                let total = a + b + 1;
                assert_eq!(d as u16, total & 0xFF);
                assert_eq!(df, total >= 256);
            }
        }
    }

    #[test]
    fn test_logic() {
        let mut ram = blank_ram();
        let mut cpu = Cpu::new(MemoryMap::new_blank(&mut ram));
        assert_eq!(alu(&mut cpu, 0xF1, 0xF0, true, 0x0F).0, 0xFF);
        assert_eq!(alu(&mut cpu, 0xF2, 0xF0, true, 0x3C).0, 0x30);
        assert_eq!(alu(&mut cpu, 0xF3, 0xFF, true, 0x0F).0, 0xF0);
        assert_eq!(alu(&mut cpu, 0xF9, 0x01, false, 0x80).0, 0x81);
        assert_eq!(alu(&mut cpu, 0xFA, 0x81, false, 0x80).0, 0x80);
        assert_eq!(alu(&mut cpu, 0xFB, 0x81, false, 0x80), (0x01, false));
        assert_eq!(alu(&mut cpu, 0xF0, 0x00, false, 0x5A).0, 0x5A);
        assert_eq!(alu(&mut cpu, 0xF8, 0x00, false, 0xA5).0, 0xA5);
    }

    #[test]
    fn test_shifts() {
        let mut ram = blank_ram();
        let mut cpu = Cpu::new(MemoryMap::new_blank(&mut ram));
        // SHR / SHRC
        assert_eq!(alu(&mut cpu, 0xF6, 0x81, true, 0), (0x40, true));
        assert_eq!(alu(&mut cpu, 0x76, 0x81, true, 0), (0xC0, true));
        assert_eq!(alu(&mut cpu, 0x76, 0x02, false, 0), (0x01, false));
        // SHL / SHLC
        assert_eq!(alu(&mut cpu, 0xFE, 0x81, true, 0), (0x02, true));
        assert_eq!(alu(&mut cpu, 0x7E, 0x81, true, 0), (0x03, true));
        assert_eq!(alu(&mut cpu, 0x7E, 0x40, false, 0), (0x80, false));
    }

    #[test]
    fn test_short_branch() {
        let mut ram = blank_ram();
        // 0x1234: BZ 56 ; D == 0 so taken
        with_program(&mut ram, 0x1234, &[0x32, 0x56]);
        let mut cpu = Cpu::new(MemoryMap::new_blank(&mut ram));
        cpu.regs.r[0] = 0x1234;
        cpu.step().unwrap();
        assert_eq!(cpu.pc(), 0x1256);

        // BNZ not taken skips exactly one byte
        cpu.memory().write(0x1256, 0x3A);
        cpu.step().unwrap();
        assert_eq!(cpu.pc(), 0x1258);

        // SKP never branches
        cpu.memory().write(0x1258, 0x38);
        cpu.step().unwrap();
        assert_eq!(cpu.pc(), 0x125A);
    }

    #[test]
    fn test_short_branch_uses_page_of_operand() {
        let mut ram = blank_ram();
        // Opcode on the last byte of page 0x12, operand on page 0x13
        with_program(&mut ram, 0x12FF, &[0x30, 0x40]);
        let mut cpu = Cpu::new(MemoryMap::new_blank(&mut ram));
        cpu.regs.r[0] = 0x12FF;
        cpu.step().unwrap();
        assert_eq!(cpu.pc(), 0x1340);
    }

    #[test]
    fn test_long_branch_and_skip() {
        let mut ram = blank_ram();
        // LBR 4321
        with_program(&mut ram, 0x0000, &[0xC0, 0x43, 0x21]);
        // LBDF (DF clear) not taken, then LSZ (D == 0) taken
        with_program(&mut ram, 0x4321, &[0xC3, 0x00, 0x00, 0xCE]);
        // LSNZ (D == 0) not taken, then LSIE taken once IE is set
        with_program(&mut ram, 0x4327, &[0xC6, 0xCC, 0xC4]);
        let mut cpu = Cpu::new(MemoryMap::new_blank(&mut ram));
        assert_eq!(cpu.step(), Ok(24));
        assert_eq!(cpu.pc(), 0x4321);
        assert_eq!(cpu.step(), Ok(24));
        assert_eq!(cpu.pc(), 0x4324);
        assert_eq!(cpu.step(), Ok(24));
        assert_eq!(cpu.pc(), 0x4327);
        assert_eq!(cpu.step(), Ok(24));
        assert_eq!(cpu.pc(), 0x4328);
        cpu.regs.ie = true;
        assert_eq!(cpu.step(), Ok(24));
        assert_eq!(cpu.pc(), 0x432B);
    }

    // Drives EF1-EF4 from a bit mask (bit 0 = EF1)
    struct Flags(u8);

    impl IoPeriph for Flags {
        fn read(&mut self, _port: u8) -> Option<u8> {
            None
        }

        fn write(&mut self, _port: u8, _value: u8) {}

        fn flag(&self, ef: u8) -> bool {
            self.0 >> (ef - 1) & 1 != 0
        }
    }

    #[derive(Clone, Copy)]
    struct State {
        q: bool,
        zero: bool,
        df: bool,
        ie: bool,
        ef: u8,
    }

    impl State {
        fn ef(&self, n: u8) -> bool {
            self.ef >> (n - 1) & 1 != 0
        }
    }

    // Whether 3N branches in the given state
    fn short_taken(n: u8, s: State) -> bool {
        match n {
            0x0 => true,
            0x1 => s.q,
            0x2 => s.zero,
            0x3 => s.df,
            0x4..=0x7 => s.ef(n - 3),
            0x8 => false,
            0x9 => !s.q,
            0xA => !s.zero,
            0xB => !s.df,
            _ => !s.ef(n - 0xB),
        }
    }

    // Ok(taken) for the CN long branches, Err(skipped) for the skips
    fn long_outcome(n: u8, s: State) -> Result<bool, bool> {
        match n {
            0x0 => Ok(true),
            0x1 => Ok(s.q),
            0x2 => Ok(s.zero),
            0x3 => Ok(s.df),
            0x4 => Err(false),
            0x5 => Err(!s.q),
            0x6 => Err(!s.zero),
            0x7 => Err(!s.df),
            0x8 => Err(true),
            0x9 => Ok(!s.q),
            0xA => Ok(!s.zero),
            0xB => Ok(!s.df),
            0xC => Err(s.ie),
            0xD => Err(s.q),
            0xE => Err(s.zero),
            _ => Err(s.df),
        }
    }

    #[test]
    fn test_every_branch_and_skip_condition() {
        const ORIGIN: u16 = 0x12F0;
        let mut ram = blank_ram();
        for ef in 0..16u8 {
            let mut flags = Flags(ef);
            let mut io = IoController::empty();
            io.attach(&mut flags).unwrap();
            let mut cpu = Cpu::new(MemoryMap::new(&mut ram, io));

            for bits in 0..16u8 {
                let s = State {
                    q: bits & 1 != 0,
                    zero: bits & 2 != 0,
                    df: bits & 4 != 0,
                    ie: bits & 8 != 0,
                    ef,
                };
                for n in 0..16u8 {
                    for family in [0x30u8, 0xC0] {
                        let op = family | n;
                        cpu.reset();
                        let mem = cpu.memory();
                        mem.write(ORIGIN, op);
                        mem.write(ORIGIN + 1, 0x40);
                        mem.write(ORIGIN + 2, 0x78);
                        cpu.regs.r[0] = ORIGIN;
                        cpu.regs.q = s.q;
                        cpu.regs.d = if s.zero { 0x00 } else { 0x5A };
                        cpu.regs.df = s.df;
                        cpu.regs.ie = s.ie;

                        let (cost, expected) = if family == 0x30 {
                            let pc = if short_taken(n, s) { 0x1240 } else { ORIGIN + 2 };
                            (16, pc)
                        } else {
                            let pc = match long_outcome(n, s) {
                                Ok(true) => 0x4078,
                                Ok(false) | Err(true) => ORIGIN + 3,
                                Err(false) => ORIGIN + 1,
                            };
                            (24, pc)
                        };
                        assert_eq!(cpu.step(), Ok(cost), "op {:02X}", op);
                        assert_eq!(
                            cpu.pc(),
                            expected,
                            "op {:02X} q={} zero={} df={} ie={} ef={:04b}",
                            op,
                            s.q,
                            s.zero,
                            s.df,
                            s.ie,
                            ef
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_register_transfers() {
        let mut ram = blank_ram();
        let prog = [
            0xF8, 0xAB, 0xB5, // LDI AB; PHI R5
            0xF8, 0xCD, 0xA5, // LDI CD; PLO R5
            0x95, 0x56, // GHI R5; STR R6
            0x85, 0x16, 0x56, // GLO R5; INC R6; STR R6
            0x25, 0x00, // DEC R5; IDL
        ];
        with_program(&mut ram, 0, &prog);
        let mut cpu = Cpu::new(MemoryMap::new_blank(&mut ram));
        cpu.regs.r[6] = 0x0800;
        run_to_idle(&mut cpu);
        assert_eq!(cpu.regs.r[5], 0xABCC);
        assert_eq!(cpu.regs.r[6], 0x0801);
        assert_eq!(&cpu.memory().ram()[0x0800..0x0802], &[0xAB, 0xCD]);
    }

    #[test]
    fn test_load_store_via_x() {
        let mut ram = blank_ram();
        ram[0x0900] = 0x11;
        ram[0x0901] = 0x22;
        let prog = [
            0xE7, // SEX 7
            0x72, // LDXA -> 11
            0xF0, // LDX -> 22
            0x60, // IRX
            0x73, // STXD (stores 22 at 0902)
            0x47, // LDA R7 (R7 = 0901) -> 22
            0x07, // LDN R7 (R7 = 0902) -> 22
            0x00,
        ];
        with_program(&mut ram, 0, &prog);
        let mut cpu = Cpu::new(MemoryMap::new_blank(&mut ram));
        cpu.regs.r[7] = 0x0900;
        run_to_idle(&mut cpu);
        assert_eq!(cpu.regs.r[7], 0x0902);
        assert_eq!(cpu.regs.d, 0x22);
        assert_eq!(cpu.memory().ram()[0x0902], 0x22);
    }

    #[test]
    fn test_mark_sav_ret() {
        let mut ram = blank_ram();
        // SEX 3; MARK; SEX 4; SAV; SEX 2; INC R2; RET
        with_program(&mut ram, 0, &[0xE3, 0x79, 0xE4, 0x78, 0xE2, 0x12, 0x70]);
        let mut cpu = Cpu::new(MemoryMap::new_blank(&mut ram));
        cpu.regs.r[2] = 0x07FF;
        cpu.regs.r[4] = 0x0600;
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.regs.t, 0x30);
        assert_eq!(cpu.regs.x, 0);
        assert_eq!(cpu.regs.r[2], 0x07FE);
        assert_eq!(cpu.memory().read(0x07FF), 0x30);

        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.memory().read(0x0600), 0x30);

        // RET pops X,P = 3,0 and enables interrupts
        cpu.step().unwrap();
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.regs.x, 3);
        assert_eq!(cpu.regs.p, 0);
        assert!(cpu.regs.ie);
        assert_eq!(cpu.regs.r[2], 0x0800);
        assert_eq!(cpu.pc(), 7);
    }

    #[test]
    fn test_dis_clears_ie() {
        let mut ram = blank_ram();
        ram[0x0500] = 0x45;
        with_program(&mut ram, 0, &[0xE1, 0x71]);
        let mut cpu = Cpu::new(MemoryMap::new_blank(&mut ram));
        cpu.regs.ie = true;
        cpu.regs.r[1] = 0x0500;
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert!(!cpu.regs.ie);
        assert_eq!((cpu.regs.x, cpu.regs.p), (4, 5));
        assert_eq!(cpu.regs.r[1], 0x0501);
    }

    struct Bus {
        written: Vec<(u8, u8)>,
        reads: usize,
        q: Vec<bool>,
        ef3: bool,
    }

    impl IoPeriph for Bus {
        fn read(&mut self, port: u8) -> Option<u8> {
            self.reads += 1;
            Some(0x40 | port)
        }

        fn write(&mut self, port: u8, value: u8) {
            self.written.push((port, value));
        }

        fn flag(&self, ef: u8) -> bool {
            ef == 3 && self.ef3
        }

        fn set_q(&mut self, level: bool) {
            self.q.push(level);
        }
    }

    #[test]
    fn test_port_io() {
        let mut bus = Bus {
            written: Vec::new(),
            reads: 0,
            q: Vec::new(),
            ef3: true,
        };
        let mut ram = blank_ram();
        ram[0x0300] = 0x99;
        let prog = [
            0xE1, // SEX 1
            0x65, // OUT 5 -> 99, R1++
            0x6E, // INP 6 -> D and M(R1)
            0x7B, // SEQ
            0x36, 0x09, // B3 (EF3 set) -> 0009
            0x00, 0x00, 0x00, // skipped
            0x7A, // REQ
            0x00,
        ];
        with_program(&mut ram, 0, &prog);
        {
            let mut io = IoController::empty();
            io.attach(&mut bus).unwrap();
            let mut cpu = Cpu::new(MemoryMap::new(&mut ram, io));
            cpu.regs.r[1] = 0x0300;
            run_to_idle(&mut cpu);
            assert_eq!(cpu.regs.r[1], 0x0301);
            assert_eq!(cpu.regs.d, 0x46);
            assert!(!cpu.regs.q);
            assert_eq!(cpu.pc(), 0x000B);
        }
        assert_eq!(ram[0x0301], 0x46);
        assert_eq!(bus.written, [(5, 0x99)]);
        // OUT does not fall through into an input cycle
        assert_eq!(bus.reads, 1);
        assert_eq!(bus.q, [true, false]);
    }
}

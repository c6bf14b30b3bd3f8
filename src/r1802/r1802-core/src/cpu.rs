use crate::constants::timing::{CYCLES_LONG, CYCLES_SHORT};
use crate::decoder::decoder;
use crate::instructions::{Arithmetic, ControlFlow, Interrupt, Io, LoadStore};
use crate::instructions::{Condition, Instructions, Mnemonic};
use crate::memory::{MemoryMap, Registers};
use crate::trace::{Access, NoTrace, Tracer};
use core::fmt;

/// Reasons the CPU stops executing. None of them are resumable; the host
/// decides how to report them and terminate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Halt {
    Idle { addr: u16 },                     // IDL (00) executed
    IllegalOpcode { addr: u16, opcode: u8 }, // Reserved encoding fetched
    TraceFull { addr: u16 },                 // Trace buffer filled in stop mode
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Halt::Idle { addr } => write!(f, "IDL at {:04x}", addr),
            Halt::IllegalOpcode { addr, opcode } => {
                write!(f, "Illegal op:{:02x} at {:04x}", opcode, addr)
            }
            Halt::TraceFull { addr } => write!(f, "Trace buffer full at {:04x}", addr),
        }
    }
}

/// Struct representing the CPU and its state
pub struct Cpu<'a, T: Tracer = NoTrace> {
    mem: MemoryMap<'a>,    // Memory mapping
    pub regs: Registers,   // Register file and flags
    pub total_cycles: u64, // Total clock units executed
    tracer: T,             // Instruction observer
}

impl<'a> Cpu<'a, NoTrace> {
    /// Creates a new CPU instance without tracing
    pub fn new(memmap: MemoryMap<'a>) -> Self {
        Cpu::with_tracer(memmap, NoTrace)
    }
}

impl<'a, T: Tracer> Cpu<'a, T> {
    /// Creates a new CPU instance reporting to the given tracer
    pub fn with_tracer(memmap: MemoryMap<'a>, tracer: T) -> Self {
        let mut cpu = Cpu {
            mem: memmap,
            regs: Registers::new(),
            total_cycles: 0,
            tracer,
        };

        cpu.reset();
        cpu
    }

    /// Reset CPU to startup state: all registers and flags zero
    pub fn reset(&mut self) {
        self.regs.reset();
    }

    pub fn tracer(&self) -> &T {
        &self.tracer
    }

    pub fn memory(&mut self) -> &mut MemoryMap<'a> {
        &mut self.mem
    }

    /// Current program counter, R(P)
    pub fn pc(&self) -> u16 {
        self.regs.pc()
    }

    // Memory read/write functions, the only points the tracer sees bus data

    pub fn read(&mut self, addr: u16) -> u8 {
        let data = self.mem.read(addr);
        self.tracer.access(Access::Load { addr, data });
        data
    }

    pub fn write(&mut self, addr: u16, data: u8) {
        self.mem.write(addr, data);
        self.tracer.access(Access::Store { addr, data });
    }

    /// Explicit register update (INC/DEC/IRX/PLO/PHI)
    pub fn set_reg(&mut self, index: usize, value: u16) {
        self.regs.r[index] = value;
        self.tracer.access(Access::Register {
            index: index as u8,
            value,
        });
    }

    /// Fetch the byte at R(P) and advance R(P)
    pub fn imm8(&mut self) -> u8 {
        let p = self.regs.p as usize;
        let addr = self.regs.r[p];
        let byte = self.mem.read(addr);
        self.regs.r[p] = addr.wrapping_add(1);
        self.tracer.operand(byte);
        byte
    }

    /// Post-increment R(N), returning the old value
    pub fn advance(&mut self, index: usize) -> u16 {
        let addr = self.regs.r[index];
        self.regs.r[index] = addr.wrapping_add(1);
        addr
    }

    /// Post-decrement R(N), returning the old value
    pub fn retreat(&mut self, index: usize) -> u16 {
        let addr = self.regs.r[index];
        self.regs.r[index] = addr.wrapping_sub(1);
        addr
    }

    // IO functions
    pub fn read_io(&mut self, port: u8) -> u8 {
        self.mem.read_io(port)
    }

    pub fn write_io(&mut self, port: u8, value: u8) {
        self.mem.write_io(port, value)
    }

    pub fn set_q(&mut self, level: bool) {
        self.regs.q = level;
        self.mem.set_q(level);
    }

    /// Evaluate a branch/skip condition against the current state
    pub fn test(&self, cond: Condition) -> bool {
        match cond {
            Condition::Always => true,
            Condition::Never => false,
            Condition::Q => self.regs.q,
            Condition::NotQ => !self.regs.q,
            Condition::Zero => self.regs.d == 0,
            Condition::NotZero => self.regs.d != 0,
            Condition::Df => self.regs.df,
            Condition::NotDf => !self.regs.df,
            Condition::Ef(n) => self.mem.flag(n),
            Condition::NotEf(n) => !self.mem.flag(n),
            Condition::Ie => self.regs.ie,
        }
    }

    /// Execute the instruction and return cycle count
    pub fn execute(&mut self, inst: &Instructions) -> u16 {
        match inst.mnem {
            Mnemonic::LDN => self.ldn(inst),
            Mnemonic::INC => self.inc(inst),
            Mnemonic::DEC => self.dec(inst),
            Mnemonic::SBR => self.short_branch(inst),
            Mnemonic::LDA => self.lda(inst),
            Mnemonic::STR => self.store(inst),
            Mnemonic::IRX => self.irx(inst),
            Mnemonic::OUT => self.out(inst),
            Mnemonic::INP => self.inp(inst),
            Mnemonic::RET | Mnemonic::DIS => self.ret(inst),
            Mnemonic::LDXA => self.ldxa(inst),
            Mnemonic::STXD => self.stxd(inst),
            Mnemonic::SAV => self.sav(inst),
            Mnemonic::MARK => self.mark(inst),
            Mnemonic::REQ | Mnemonic::SEQ => self.q_latch(inst),
            Mnemonic::GLO => self.glo(inst),
            Mnemonic::GHI => self.ghi(inst),
            Mnemonic::PLO => self.plo(inst),
            Mnemonic::PHI => self.phi(inst),
            Mnemonic::LBR => self.long_branch(inst),
            Mnemonic::LSKP => self.long_skip(inst),
            Mnemonic::NOP => self.nop(inst),
            Mnemonic::SEP => self.sep(inst),
            Mnemonic::SEX => self.sex(inst),
            Mnemonic::LDX | Mnemonic::LDI => self.ldx(inst),
            Mnemonic::OR
            | Mnemonic::AND
            | Mnemonic::XOR
            | Mnemonic::ORI
            | Mnemonic::ANI
            | Mnemonic::XRI => self.logic(inst),
            Mnemonic::ADD | Mnemonic::ADI | Mnemonic::ADC | Mnemonic::ADCI => self.add(inst),
            Mnemonic::SD | Mnemonic::SDI | Mnemonic::SDB | Mnemonic::SDBI => self.sub_d(inst),
            Mnemonic::SM | Mnemonic::SMI | Mnemonic::SMB | Mnemonic::SMBI => self.sub_m(inst),
            Mnemonic::SHR | Mnemonic::SHRC => self.shift_right(inst),
            Mnemonic::SHL | Mnemonic::SHLC => self.shift_left(inst),
            // Handled by step() before dispatch
            Mnemonic::IDL | Mnemonic::INVALID => 0,
        }
    }

    /// Fetch, decode and execute a single instruction
    pub fn step(&mut self) -> Result<u16, Halt> {
        let addr = self.regs.pc();
        self.tracer.begin(addr, self.regs.p);

        let opcode = self.imm8();
        let inst = match decoder(addr, opcode) {
            Ok(inst) => inst,
            Err(_) => {
                self.tracer.end(&self.regs);
                return Err(Halt::IllegalOpcode { addr, opcode });
            }
        };
        self.tracer.decoded(&inst);

        if inst.mnem == Mnemonic::IDL {
            self.tracer.end(&self.regs);
            return Err(Halt::Idle { addr });
        }

        let cycles = self.execute(&inst);
        debug_assert_eq!(cycles, cycles_for(&inst));
        self.total_cycles += cycles as u64;

        if !self.tracer.end(&self.regs) {
            return Err(Halt::TraceFull { addr });
        }
        Ok(cycles)
    }

    /// Run whole instructions until at least `budget` clock units have
    /// elapsed. Returns the overshoot so the caller can shorten the next
    /// budget. At least one instruction is always executed.
    pub fn run(&mut self, budget: i64) -> Result<i64, Halt> {
        let mut clock: i64 = 0;
        loop {
            clock += self.step()? as i64;
            if clock >= budget {
                break;
            }
        }
        Ok(clock - budget)
    }
}

/// Cycle cost of an instruction by family
pub fn cycles_for(inst: &Instructions) -> u16 {
    if inst.is_long() {
        CYCLES_LONG
    } else {
        CYCLES_SHORT
    }
}

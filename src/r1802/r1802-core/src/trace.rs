use crate::constants::trace::{MAX_ACCESSES, MAX_OPERANDS};
use crate::instructions::Instructions;
use crate::memory::Registers;
use core::fmt;
use heapless::HistoryBuffer;

/// Bus activity recorded for a single instruction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Load { addr: u16, data: u8 },
    Store { addr: u16, data: u8 },
    Register { index: u8, value: u16 },
}

/// Observer hooks called by the CPU around each instruction. All hooks
/// default to no-ops so a tracer only overrides what it records.
pub trait Tracer {
    fn begin(&mut self, _pc: u16, _p: u8) {}
    fn operand(&mut self, _byte: u8) {}
    fn decoded(&mut self, _inst: &Instructions) {}
    fn access(&mut self, _access: Access) {}

    /// Called after execution; returning false stops the CPU
    fn end(&mut self, _regs: &Registers) -> bool {
        true
    }
}

/// Default tracer, compiles down to nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTrace;

impl Tracer for NoTrace {}

// Lets the host keep ownership of a recorder while the CPU borrows it
impl<T: Tracer + ?Sized> Tracer for &mut T {
    fn begin(&mut self, pc: u16, p: u8) {
        (**self).begin(pc, p)
    }

    fn operand(&mut self, byte: u8) {
        (**self).operand(byte)
    }

    fn decoded(&mut self, inst: &Instructions) {
        (**self).decoded(inst)
    }

    fn access(&mut self, access: Access) {
        (**self).access(access)
    }

    fn end(&mut self, regs: &Registers) -> bool {
        (**self).end(regs)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceMode {
    Wrap,         // Keep the most recent entries indefinitely
    StopWhenFull, // Halt the CPU once the buffer fills
}

/// Snapshot of one executed instruction
#[derive(Clone, Debug, Default)]
pub struct TraceEntry {
    pub pc: u16,
    pub p: u8,
    pub ops: heapless::Vec<u8, MAX_OPERANDS>,
    pub inst: Option<Instructions>,
    pub d: u8,
    pub df: bool,
    pub x: u8,
    pub accesses: heapless::Vec<Access, MAX_ACCESSES>,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:04X} ", self.p, self.pc)?;
        for j in 0..MAX_OPERANDS {
            match self.ops.get(j) {
                Some(op) => write!(f, "{:02X} ", op)?,
                None => f.write_str("   ")?,
            }
        }
        match &self.inst {
            Some(inst) => write!(f, "{:<8}", inst.name())?,
            None => write!(f, "{:<8}", "???")?,
        }
        write!(f, "{:02X} {} {:X}", self.d, self.df as u8, self.x)?;
        for acs in self.accesses.iter() {
            match acs {
                Access::Load { addr, data } => write!(f, " L {:04X} {:02X}", addr, data)?,
                Access::Store { addr, data } => write!(f, " S {:04X} {:02X}", addr, data)?,
                Access::Register { index, value } => write!(f, " {:04X}->R{:X}", value, index)?,
            }
        }
        Ok(())
    }
}

/// Ring buffer of the last N executed instructions
pub struct TraceRecorder<const N: usize> {
    buffer: HistoryBuffer<TraceEntry, N>,
    current: TraceEntry,
    mode: TraceMode,
}

impl<const N: usize> TraceRecorder<N> {
    pub fn new(mode: TraceMode) -> Self {
        Self {
            buffer: HistoryBuffer::new(),
            current: TraceEntry::default(),
            mode,
        }
    }

    pub fn mode(&self) -> TraceMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() == N
    }

    pub fn clear(&mut self) {
        self.buffer = HistoryBuffer::new();
        self.current = TraceEntry::default();
    }

    /// Entries from oldest to newest
    pub fn entries(&self) -> impl Iterator<Item = &TraceEntry> {
        self.buffer.oldest_ordered()
    }

    /// Writes one numbered line per entry, oldest first
    pub fn dump<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        for (i, entry) in self.entries().enumerate() {
            writeln!(out, "{:4} {}", i, entry)?;
        }
        Ok(())
    }
}

impl<const N: usize> Tracer for TraceRecorder<N> {
    fn begin(&mut self, pc: u16, p: u8) {
        self.current = TraceEntry {
            pc,
            p,
            ..TraceEntry::default()
        };
    }

    fn operand(&mut self, byte: u8) {
        // Anything beyond the opcode and two immediates is not kept
        let _ = self.current.ops.push(byte);
    }

    fn decoded(&mut self, inst: &Instructions) {
        self.current.inst = Some(*inst);
    }

    fn access(&mut self, access: Access) {
        let _ = self.current.accesses.push(access);
    }

    fn end(&mut self, regs: &Registers) -> bool {
        self.current.d = regs.d;
        self.current.df = regs.df;
        self.current.x = regs.x;
        self.buffer.write(self.current.clone());
        !(self.mode == TraceMode::StopWhenFull && self.is_full())
    }
}

#[cfg(test)]
mod trace_tests {
    use super::*;
    use crate::decoder::decoder;

    fn record(rec: &mut TraceRecorder<4>, pc: u16, ops: &[u8]) -> bool {
        rec.begin(pc, 3);
        for op in ops {
            rec.operand(*op);
        }
        rec.decoded(&decoder(pc, ops[0]).unwrap());
        rec.access(Access::Load {
            addr: 0x1234,
            data: 0x56,
        });
        let mut regs = Registers::new();
        regs.d = 0xAB;
        regs.df = true;
        regs.x = 2;
        rec.end(&regs)
    }

    #[test]
    fn test_wrap_keeps_latest() {
        let mut rec = TraceRecorder::<4>::new(TraceMode::Wrap);
        for pc in 0..6u16 {
            assert!(record(&mut rec, pc, &[0xF0]));
        }
        assert_eq!(rec.len(), 4);
        let pcs: std::vec::Vec<u16> = rec.entries().map(|e| e.pc).collect();
        assert_eq!(pcs, [2, 3, 4, 5]);
    }

    #[test]
    fn test_stop_when_full() {
        let mut rec = TraceRecorder::<4>::new(TraceMode::StopWhenFull);
        assert!(record(&mut rec, 0, &[0xF0]));
        assert!(record(&mut rec, 1, &[0xF0]));
        assert!(record(&mut rec, 2, &[0xF0]));
        assert!(!record(&mut rec, 3, &[0xF0]));
        assert!(rec.is_full());
        rec.clear();
        assert!(rec.is_empty());
    }

    #[test]
    fn test_dump_format() {
        let mut rec = TraceRecorder::<4>::new(TraceMode::Wrap);
        record(&mut rec, 0x0200, &[0xF8, 0x12]);
        let mut out = std::string::String::new();
        rec.dump(&mut out).unwrap();
        assert_eq!(out, "   0 3 0200 F8 12    LDI     AB 1 2 L 1234 56\n");
    }

    #[test]
    fn test_dump_p_in_decimal() {
        let mut rec = TraceRecorder::<4>::new(TraceMode::Wrap);
        rec.begin(0x0200, 12);
        rec.operand(0xC4);
        rec.decoded(&decoder(0x0200, 0xC4).unwrap());
        rec.end(&Registers::new());
        let mut out = std::string::String::new();
        rec.dump(&mut out).unwrap();
        assert_eq!(out, "   0 12 0200 C4       NOP     00 0 0\n");
    }
}

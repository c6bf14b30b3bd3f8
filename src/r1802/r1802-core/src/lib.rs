#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod constants;
pub mod cpu;
pub mod decoder;
pub mod instructions;
pub mod memory;
pub mod psg;
pub mod trace;
pub mod utils;

pub use cpu::{Cpu, Halt};
pub use memory::{IoController, MemoryMap};

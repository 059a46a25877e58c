// Laemu is a LoongArch64 system emulator core with a built-in gdb stub.

#[macro_use]
pub mod utils;

pub mod config;
pub mod csr;
pub mod debug;
pub mod elf;
pub mod emulator;
pub mod error;
pub mod events;
pub mod exception;
pub mod guest;
pub mod hart;
pub mod insn;
pub mod irq;
pub mod log;
pub mod mmu;
pub mod state;
pub mod tcache;

pub use error::{
    Error,
    Result,
};
pub use insn::InsnSet;

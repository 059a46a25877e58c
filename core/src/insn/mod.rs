//! Instruction decoding.
//!
//! LoongArch instructions are fixed 32-bit words. Decoders split a word into one of
//! the operand formats below and pick the executor for it; the engine caches the
//! result per pc.

use std::fmt::Debug;

use crate::exception::Exccode;
use crate::guest::GuestMem;
use crate::state::CpuState;

/// Immediates are stored as raw bit fields, not yet sign-extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    R3 {
        // [14:10] rk
        // [9:5] rj
        // [4:0] rd
        rk: u8,
        rj: u8,
        rd: u8,
        raw: u32,
    },
    R2I {
        // [21:10] si12/ui12, [15:10] ui6, [14:10] ui5 or [23:10] csr number
        // [9:5] rj
        // [4:0] rd
        imm: u32,
        rj: u8,
        rd: u8,
        raw: u32,
    },
    R1I20 {
        // [24:5] si20
        // [4:0] rd
        imm: u32,
        rd: u8,
        raw: u32,
    },
    R2I16 {
        // [25:10] offs[15:0]
        // [9:5] rj
        // [4:0] rd
        imm: u32,
        rj: u8,
        rd: u8,
        raw: u32,
    },
    R1I21 {
        // [25:10] offs[15:0]
        // [9:5] rj
        // [4:0] offs[20:16]
        imm: u32,
        rj: u8,
        raw: u32,
    },
    I26 {
        // [25:10] offs[15:0]
        // [9:0] offs[25:16]
        imm: u32,
        raw: u32,
    },
    Code {
        // [14:0] code
        code: u32,
        raw: u32,
    },
    NoOperand {
        raw: u32,
    },
}

impl Instruction {
    pub fn raw(&self) -> u32 {
        match *self {
            Instruction::R3 { raw, .. }
            | Instruction::R2I { raw, .. }
            | Instruction::R1I20 { raw, .. }
            | Instruction::R2I16 { raw, .. }
            | Instruction::R1I21 { raw, .. }
            | Instruction::I26 { raw, .. }
            | Instruction::Code { raw, .. }
            | Instruction::NoOperand { raw } => raw,
        }
    }

    pub fn r3(raw: u32) -> Self {
        Instruction::R3 {
            rk: ((raw >> 10) & 0x1f) as u8,
            rj: ((raw >> 5) & 0x1f) as u8,
            rd: (raw & 0x1f) as u8,
            raw,
        }
    }

    /// Two registers and an immediate of `bits` width at bit 10.
    pub fn r2i(raw: u32, bits: u32) -> Self {
        Instruction::R2I {
            imm: (raw >> 10) & ((1 << bits) - 1),
            rj: ((raw >> 5) & 0x1f) as u8,
            rd: (raw & 0x1f) as u8,
            raw,
        }
    }

    pub fn r1i20(raw: u32) -> Self {
        Instruction::R1I20 {
            imm: (raw >> 5) & 0xf_ffff,
            rd: (raw & 0x1f) as u8,
            raw,
        }
    }

    pub fn r2i16(raw: u32) -> Self {
        Instruction::R2I16 {
            imm: (raw >> 10) & 0xffff,
            rj: ((raw >> 5) & 0x1f) as u8,
            rd: (raw & 0x1f) as u8,
            raw,
        }
    }

    pub fn r1i21(raw: u32) -> Self {
        Instruction::R1I21 {
            imm: ((raw & 0x1f) << 16) | ((raw >> 10) & 0xffff),
            rj: ((raw >> 5) & 0x1f) as u8,
            raw,
        }
    }

    pub fn i26(raw: u32) -> Self {
        Instruction::I26 {
            imm: ((raw & 0x3ff) << 16) | ((raw >> 10) & 0xffff),
            raw,
        }
    }

    pub fn code(raw: u32) -> Self {
        Instruction::Code {
            code: raw & 0x7fff,
            raw,
        }
    }
}

macro_rules! gen_insn_unwrappers {
    ($dollar:tt, $($name:ident, $type:ident),*) => {
        $(
            macro_rules! $name {
                ($insn:expr, $dollar($field:ident),* => $body:block) => {
                    if let &$crate::insn::Instruction::$type { $dollar($field),*, .. } = $insn {
                        $body
                    } else {
                        tracing::error!("operand format mismatch for {:x?}", $insn);
                        return Err($crate::exception::Exccode::INE);
                    }
                }
            }
        )*
    };
}

gen_insn_unwrappers!(
    $,
    r3, R3,
    r2i, R2I,
    r1i20, R1I20,
    r2i16, R2I16,
    r1i21, R1I21,
    i26, I26
);

/// How the pc moves after an instruction retires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Next,
    Jump(u64),
}

/// Executors raise guest exceptions through the `Err` side.
pub type Executor = fn(&mut CpuState, &mut GuestMem, &Instruction) -> Result<Flow, Exccode>;

pub type Decoded = (Instruction, Executor);

pub trait Decoder: Debug + Send + Sync {
    fn decode(&self, raw: u32) -> Option<Decoded>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsnSet {
    /// Integer, memory and branch instructions
    Base,
    /// CSR access, ERTN and IDLE
    Privileged,
}

pub mod la64;
pub mod privileged;

pub use la64::La64Decoder;
pub use privileged::PrivilegedDecoder;

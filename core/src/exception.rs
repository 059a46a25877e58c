//! Exception causes and the trap entry sequence.
//!
//! A cause is raised by returning `Err(Exccode)` from fetch or execute. The engine
//! records it in [`CpuState::exception`] and calls [`do_interrupt`] exactly once,
//! which saves the privileged state and redirects the pc to the handler.

use std::fmt;

use tracing::{debug, error, warn};

use crate::config::DEBUG_VECTOR_OFFSET;
use crate::csr::*;
use crate::error::*;
use crate::state::CpuState;

/// Vector number of the first external interrupt.
pub const EXCCODE_EXTERNAL_INT: u64 = 64;

/// Vector stride when ECFG.VS is zero: every cause enters at EENTRY.
pub const UNVECTORED_STRIDE: u64 = 0;

/// Exception cause, encoded as `subcode << 6 | code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Exccode(u32);

impl Exccode {
    pub const fn new(code: u32, subcode: u32) -> Self {
        Self((subcode << 6) | code)
    }

    pub const INT: Self = Self::new(0, 0);
    pub const PIL: Self = Self::new(1, 0);
    pub const PIS: Self = Self::new(2, 0);
    pub const PIF: Self = Self::new(3, 0);
    pub const PME: Self = Self::new(4, 0);
    pub const PNR: Self = Self::new(5, 0);
    pub const PNX: Self = Self::new(6, 0);
    pub const PPI: Self = Self::new(7, 0);
    pub const ADEF: Self = Self::new(8, 0);
    pub const ADEM: Self = Self::new(8, 1);
    pub const ALE: Self = Self::new(9, 0);
    pub const BCE: Self = Self::new(10, 0);
    pub const SYS: Self = Self::new(11, 0);
    pub const BRK: Self = Self::new(12, 0);
    pub const INE: Self = Self::new(13, 0);
    pub const IPE: Self = Self::new(14, 0);
    pub const FPD: Self = Self::new(15, 0);
    pub const SXD: Self = Self::new(16, 0);
    pub const ASXD: Self = Self::new(17, 0);
    pub const FPE: Self = Self::new(18, 0);
    pub const VFPE: Self = Self::new(18, 1);
    pub const WPEF: Self = Self::new(19, 0);
    pub const WPEM: Self = Self::new(19, 1);
    pub const BTD: Self = Self::new(20, 0);
    pub const BTE: Self = Self::new(21, 0);
    /// Reserved subcode used for debug
    pub const DBP: Self = Self::new(26, 0);

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn code(self) -> u32 {
        self.0 & 0x3f
    }

    pub const fn subcode(self) -> u32 {
        self.0 >> 6
    }

    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::INT => "INT",
            Self::PIL => "PIL",
            Self::PIS => "PIS",
            Self::PIF => "PIF",
            Self::PME => "PME",
            Self::PNR => "PNR",
            Self::PNX => "PNX",
            Self::PPI => "PPI",
            Self::ADEF => "ADEF",
            Self::ADEM => "ADEM",
            Self::ALE => "ALE",
            Self::BCE => "BCE",
            Self::SYS => "SYS",
            Self::BRK => "BRK",
            Self::INE => "INE",
            Self::IPE => "IPE",
            Self::FPD => "FPD",
            Self::SXD => "SXD",
            Self::ASXD => "ASXD",
            Self::FPE => "FPE",
            Self::VFPE => "VFPE",
            Self::WPEF => "WPEF",
            Self::WPEM => "WPEM",
            Self::BTD => "BTD",
            Self::BTE => "BTE",
            Self::DBP => "DBP",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Exccode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "{:#x}", self.0),
        }
    }
}

/// Takes the pending exception and enters its handler.
pub fn do_interrupt(state: &mut CpuState) -> Result<()> {
    let Some(cause) = state.exception else {
        return Err(Error::NoPendingException(state.pc));
    };
    let tlbfill = TLBRERA_ISTLBR.ex(state.csr.tlbrera) == 1;
    let vs = ECFG_VS.ex(state.csr.ecfg);

    if cause != Exccode::INT {
        debug!(
            "exception {} at pc {:#x}, badv {:#x}, tlbfill {}",
            cause, state.pc, state.csr.badv, tlbfill
        );
    }

    let mut update_badi = true;
    match cause {
        Exccode::DBP => {
            state.csr.dbg = DBG_DCL.dp(state.csr.dbg, 1);
            state.csr.dbg = DBG_ECODE.dp(state.csr.dbg, 0xc);
            enter_debug(state);
            finish(state, cause, false);
            return Ok(());
        }
        Exccode::INT if DBG_DST.ex(state.csr.dbg) == 1 => {
            state.csr.dbg = DBG_DEI.dp(state.csr.dbg, 1);
            enter_debug(state);
            finish(state, cause, false);
            return Ok(());
        }
        Exccode::INT | Exccode::PIF | Exccode::ADEF => update_badi = false,
        Exccode::SYS
        | Exccode::BRK
        | Exccode::INE
        | Exccode::IPE
        | Exccode::FPD
        | Exccode::FPE
        | Exccode::SXD
        | Exccode::ASXD => state.csr.badv = state.pc,
        // BADV was recorded when the fault was raised.
        Exccode::BCE
        | Exccode::ADEM
        | Exccode::ALE
        | Exccode::PIL
        | Exccode::PIS
        | Exccode::PME
        | Exccode::PNR
        | Exccode::PNX
        | Exccode::PPI => {}
        _ => {
            error!("exception {} has not been supported, pc {:#x}", cause, state.pc);
            return Err(Error::UnsupportedException(cause));
        }
    }

    if update_badi {
        state.csr.badi = state.insn as u64;
    }

    let plv = CRMD_PLV.ex(state.csr.crmd);
    let ie = CRMD_IE.ex(state.csr.crmd);
    if tlbfill {
        state.csr.tlbrprmd = PRMD_PPLV.dp(state.csr.tlbrprmd, plv);
        state.csr.tlbrprmd = PRMD_PIE.dp(state.csr.tlbrprmd, ie);
        // Refill handlers run in direct address mode.
        state.csr.crmd = CRMD_DA.dp(state.csr.crmd, 1);
        state.csr.crmd = CRMD_PG.dp(state.csr.crmd, 0);
        state.csr.tlbrera = TLBRERA_PC.dp(state.csr.tlbrera, state.pc >> 2);
    } else {
        if cause != Exccode::INT || vs != 0 {
            state.csr.estat = ESTAT_ECODE.dp(state.csr.estat, cause.code() as u64);
            state.csr.estat = ESTAT_ESUBCODE.dp(state.csr.estat, cause.subcode() as u64);
        }
        state.csr.prmd = PRMD_PPLV.dp(state.csr.prmd, plv);
        state.csr.prmd = PRMD_PIE.dp(state.csr.prmd, ie);
        state.csr.era = state.pc;
    }

    state.csr.crmd = CRMD_PLV.dp(state.csr.crmd, 0);
    state.csr.crmd = CRMD_IE.dp(state.csr.crmd, 0);

    let stride = if vs != 0 { 4 << vs } else { UNVECTORED_STRIDE };

    state.pc = if cause == Exccode::INT {
        let pending = ESTAT_IS.ex(state.csr.estat) & ECFG_LIE.ex(state.csr.ecfg);
        let vector = if pending == 0 {
            warn!("interrupt dispatched with nothing pending, pc {:#x}", state.pc);
            0
        } else {
            63 - pending.leading_zeros() as u64
        };
        state
            .csr
            .eentry
            .wrapping_add((EXCCODE_EXTERNAL_INT + vector).wrapping_mul(stride))
    } else if tlbfill {
        state.csr.tlbrentry
    } else {
        state
            .csr
            .eentry
            .wrapping_add((cause.code() as u64).wrapping_mul(stride))
    };

    finish(state, cause, tlbfill);
    Ok(())
}

fn enter_debug(state: &mut CpuState) {
    state.csr.dera = state.pc;
    state.csr.dbg = DBG_DST.dp(state.csr.dbg, 1);
    state.pc = state.csr.eentry.wrapping_add(DEBUG_VECTOR_OFFSET);
}

fn finish(state: &mut CpuState, cause: Exccode, tlbfill: bool) {
    if tlbfill {
        state.counters.tlb_refills += 1;
    } else if cause == Exccode::INT {
        state.counters.interrupts += 1;
    } else {
        state.counters.per_cause[(cause.raw() & 0xff) as usize] += 1;
    }
    state.exception = None;
    // The handler runs in a different translation context.
    state.tcache.flush();
}

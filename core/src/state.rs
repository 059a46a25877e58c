//! Current state of the CPU, including registers and flags.

use std::fmt;

use crate::config::*;
use crate::csr::*;
use crate::exception::Exccode;
use crate::mmu::Tlb;
use crate::tcache::TranslationCache;

#[derive(Debug, Clone)]
pub struct CpuState {
    pub pc: u64,
    pub gpr: [u64; 32],
    pub csr: Csrs,
    pub tlb: Tlb,
    pub tcache: TranslationCache,
    /// Last fetched instruction word, reported in BADI.
    pub insn: u32,
    /// Raised but not yet dispatched.
    pub exception: Option<Exccode>,
    pub counters: Counters,
}

impl CpuState {
    pub fn new() -> Self {
        let mut state = Self {
            pc: 0,
            gpr: [0; 32],
            csr: Csrs::default(),
            tlb: Tlb::new(),
            tcache: TranslationCache::new(),
            insn: 0,
            exception: None,
            counters: Counters::default(),
        };
        state.reset();
        state
    }

    /// Restores the architectural reset state. Counters are kept.
    pub fn reset(&mut self) {
        self.gpr = [0; 32];
        self.csr = Csrs::default();
        self.csr.crmd = CRMD_DA.dp(0, 1);
        self.csr.crmd = CRMD_DATF.dp(self.csr.crmd, 1);
        self.csr.crmd = CRMD_DATM.dp(self.csr.crmd, 1);
        self.csr.ecfg = ECFG_VS.dp(0, 7);
        self.csr.asid = ASID_ASIDBITS.dp(0, 0xa);
        self.pc = RESET_PC;
        self.insn = 0;
        self.exception = None;
        self.tlb = Tlb::new();
        self.tcache.flush();
    }
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Counters {
    /// Retired instructions
    pub icount: u64,
    /// Decode cache hits
    pub ic_hits: u64,
    /// Synchronous faults taken
    pub faults: u64,
    pub tlb_refills: u64,
    pub interrupts: u64,
    /// Indexed by `Exccode::raw()`
    pub per_cause: [u64; 256],
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            icount: 0,
            ic_hits: 0,
            faults: 0,
            tlb_refills: 0,
            interrupts: 0,
            per_cause: [0; 256],
        }
    }
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "retired:     {}", self.icount)?;
        writeln!(f, "ic hits:     {}", self.ic_hits)?;
        writeln!(f, "faults:      {}", self.faults)?;
        writeln!(f, "tlb refills: {}", self.tlb_refills)?;
        write!(f, "interrupts:  {}", self.interrupts)?;
        for (raw, count) in self.per_cause.iter().enumerate() {
            if *count != 0 {
                let cause = Exccode::new(raw as u32 & 0x3f, raw as u32 >> 6);
                write!(f, "\n  {:<9} {}", cause.to_string(), count)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_state() {
        let mut state = CpuState::new();
        state.gpr[4] = 7;
        state.pc = 0x42;
        state.counters.icount = 9;
        state.reset();

        assert_eq!(state.pc, 0x1c00_0000);
        assert_eq!(state.gpr[4], 0);
        assert_eq!(state.csr.crmd, 0xa8);
        assert_eq!(state.csr.plv(), 0);
        assert!(!state.csr.paging());
        assert_eq!(ECFG_VS.ex(state.csr.ecfg), 7);
        assert_eq!(ASID_ASIDBITS.ex(state.csr.asid), 10);
        assert_eq!(state.counters.icount, 9);
    }

    #[test]
    fn test_counters_display_lists_taken_causes() {
        let mut counters = Counters::default();
        counters.icount = 3;
        counters.per_cause[Exccode::ADEM.raw() as usize] = 2;
        let text = counters.to_string();
        assert!(text.starts_with("retired:     3\n"));
        assert!(text.contains("ADEM"));
        assert!(!text.contains("SYS"));
    }
}

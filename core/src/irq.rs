//! Interrupt lines and the constant timer.

use crate::csr::*;
use crate::state::CpuState;

/// Lines 0..=1 are software, 2..=9 hardware, then PMC, timer and IPI.
pub const N_IRQS: u32 = 13;
pub const IRQ_TIMER: u32 = 11;
pub const IRQ_IPI: u32 = 12;

/// Raises or lowers an interrupt line in ESTAT.IS.
pub fn set_irq(state: &mut CpuState, irq: u32, level: bool) {
    debug_assert!(irq < N_IRQS);
    if level {
        state.csr.estat |= 1 << irq;
    } else {
        state.csr.estat &= !(1 << irq);
    }
}

/// True if an enabled line is pending and CRMD.IE lets it through.
pub fn has_pending_irq(state: &CpuState) -> bool {
    let pending = ESTAT_IS.ex(state.csr.estat) & ECFG_LIE.ex(state.csr.ecfg);
    pending != 0 && CRMD_IE.ex(state.csr.crmd) == 1
}

/// Advances the timer by one retired instruction.
pub fn tick_timer(state: &mut CpuState) {
    if TCFG_EN.ex(state.csr.tcfg) == 0 {
        return;
    }
    if state.csr.tval > 0 {
        state.csr.tval -= 1;
        return;
    }
    set_irq(state, IRQ_TIMER, true);
    if TCFG_PERIODIC.ex(state.csr.tcfg) == 1 {
        state.csr.tval = TCFG_INITVAL.ex(state.csr.tcfg) << 2;
    } else {
        state.csr.tcfg = TCFG_EN.dp(state.csr.tcfg, 0);
    }
}

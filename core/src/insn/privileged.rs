//! Privileged instructions: CSR access, exception return and idle.
//!
//! All of them require PLV0 and raise IPE otherwise.

use tracing::trace;

use crate::csr::*;
use crate::exception::Exccode;
use crate::guest::GuestMem;
use crate::insn::{Decoded, Decoder, Executor, Flow, Instruction};
use crate::state::CpuState;

const OP_CSR: u32 = 0x04; // raw >> 24
const OP_IDLE: u32 = 0x0c91; // raw >> 15
const INSN_ERTN: u32 = 0x0648_3800;

/// `rj` values selecting csrrd and csrwr; anything else is csrxchg.
const CSR_RJ_READ: u8 = 0;
const CSR_RJ_WRITE: u8 = 1;

#[derive(Debug)]
pub struct PrivilegedDecoder;

impl Decoder for PrivilegedDecoder {
    fn decode(&self, raw: u32) -> Option<Decoded> {
        if raw >> 24 == OP_CSR {
            let insn = Instruction::r2i(raw, 14);
            let executor = match (raw >> 5) as u8 & 0x1f {
                CSR_RJ_READ => priv_csrrd as Executor,
                CSR_RJ_WRITE => priv_csrwr as Executor,
                _ => priv_csrxchg as Executor,
            };
            return Some((insn, executor));
        }
        if raw == INSN_ERTN {
            return Some((Instruction::NoOperand { raw }, priv_ertn as Executor));
        }
        if raw >> 15 == OP_IDLE {
            return Some((Instruction::code(raw), priv_idle as Executor));
        }
        None
    }
}

fn check_plv0(state: &CpuState) -> Result<(), Exccode> {
    if state.csr.plv() != 0 {
        return Err(Exccode::IPE);
    }
    Ok(())
}

fn write_csr(state: &mut CpuState, num: u16, value: u64) {
    if state.csr.write(num, value) == WriteEffect::Translation {
        state.tcache.flush();
    }
}

fn priv_csrrd(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    check_plv0(state)?;
    r2i!(insn, rd, imm => {
        state.gpr[rd as usize] = state.csr.read(imm as u16);
        Ok(Flow::Next)
    })
}

fn priv_csrwr(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    check_plv0(state)?;
    r2i!(insn, rd, imm => {
        let num = imm as u16;
        let (old, value) = (state.csr.read(num), state.gpr[rd as usize]);
        write_csr(state, num, value);
        state.gpr[rd as usize] = old;
        Ok(Flow::Next)
    })
}

fn priv_csrxchg(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    check_plv0(state)?;
    r2i!(insn, rd, rj, imm => {
        let num = imm as u16;
        let mask = state.gpr[rj as usize];
        let old = state.csr.read(num);
        let value = (old & !mask) | (state.gpr[rd as usize] & mask);
        write_csr(state, num, value);
        state.gpr[rd as usize] = old;
        Ok(Flow::Next)
    })
}

fn priv_ertn(state: &mut CpuState, _guest: &mut GuestMem, _insn: &Instruction) -> Result<Flow, Exccode> {
    check_plv0(state)?;
    let target = if TLBRERA_ISTLBR.ex(state.csr.tlbrera) == 1 {
        state.csr.tlbrera = TLBRERA_ISTLBR.dp(state.csr.tlbrera, 0);
        let prmd = state.csr.tlbrprmd;
        state.csr.crmd = CRMD_PLV.dp(state.csr.crmd, PRMD_PPLV.ex(prmd));
        state.csr.crmd = CRMD_IE.dp(state.csr.crmd, PRMD_PIE.ex(prmd));
        state.csr.crmd = CRMD_DA.dp(state.csr.crmd, 0);
        state.csr.crmd = CRMD_PG.dp(state.csr.crmd, 1);
        TLBRERA_PC.ex(state.csr.tlbrera) << 2
    } else {
        let prmd = state.csr.prmd;
        state.csr.crmd = CRMD_PLV.dp(state.csr.crmd, PRMD_PPLV.ex(prmd));
        state.csr.crmd = CRMD_IE.dp(state.csr.crmd, PRMD_PIE.ex(prmd));
        state.csr.era
    };
    trace!("ertn to {:#x}, plv {}", target, state.csr.plv());
    state.tcache.flush();
    Ok(Flow::Jump(target))
}

/// Stays on the idle instruction until an enabled line is pending.
fn priv_idle(state: &mut CpuState, _guest: &mut GuestMem, _insn: &Instruction) -> Result<Flow, Exccode> {
    check_plv0(state)?;
    if ESTAT_IS.ex(state.csr.estat) & ECFG_LIE.ex(state.csr.ecfg) != 0 {
        Ok(Flow::Next)
    } else {
        Ok(Flow::Jump(state.pc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log;

    fn exec(state: &mut CpuState, guest: &mut GuestMem, raw: u32) -> Result<Flow, Exccode> {
        let (insn, executor) = PrivilegedDecoder.decode(raw).expect("undecodable test word");
        executor(state, guest, &insn)
    }

    fn setup() -> (CpuState, GuestMem) {
        log::log_init(log::Level::Off);
        (CpuState::new(), GuestMem::new(0x1000).unwrap())
    }

    /// csr op with the given rj selector
    fn csr_insn(csr: u16, rj: u32, rd: u32) -> u32 {
        0x0400_0000 | ((csr as u32) << 10) | (rj << 5) | rd
    }

    #[test]
    fn test_csr_read_write_exchange() {
        let (mut state, mut guest) = setup();
        state.csr.eentry = 0x1000;
        state.gpr[4] = 0x2000;

        // csrrd $t0, EENTRY
        exec(&mut state, &mut guest, csr_insn(CSR_EENTRY, 0, 12)).unwrap();
        assert_eq!(state.gpr[12], 0x1000);

        // csrwr $a0, EENTRY swaps
        exec(&mut state, &mut guest, csr_insn(CSR_EENTRY, 1, 4)).unwrap();
        assert_eq!(state.csr.eentry, 0x2000);
        assert_eq!(state.gpr[4], 0x1000);

        // csrxchg $a0, $a1, EENTRY only touches masked bits
        state.gpr[4] = 0xffff;
        state.gpr[5] = 0x00f0;
        exec(&mut state, &mut guest, csr_insn(CSR_EENTRY, 5, 4)).unwrap();
        assert_eq!(state.csr.eentry, 0x20f0);
        assert_eq!(state.gpr[4], 0x2000);
    }

    #[test]
    fn test_crmd_write_flushes_translation_cache() {
        let (mut state, mut guest) = setup();
        state.tcache.insert(0x1c00_0000, 0x1c00_0000);
        state.gpr[4] = state.csr.crmd;
        exec(&mut state, &mut guest, csr_insn(CSR_CRMD, 1, 4)).unwrap();
        assert_eq!(state.tcache.lookup(0x1c00_0000), None);
    }

    #[test]
    fn test_user_mode_raises_ipe() {
        let (mut state, mut guest) = setup();
        state.csr.crmd = CRMD_PLV.dp(state.csr.crmd, 3);
        assert_eq!(exec(&mut state, &mut guest, csr_insn(CSR_ERA, 0, 4)), Err(Exccode::IPE));
        assert_eq!(exec(&mut state, &mut guest, INSN_ERTN), Err(Exccode::IPE));
    }

    #[test]
    fn test_ertn_restores_context() {
        let (mut state, mut guest) = setup();
        state.csr.era = 0x1200_0000;
        state.csr.prmd = PRMD_PPLV.dp(PRMD_PIE.dp(0, 1), 3);
        state.tcache.insert(0x1c00_0000, 0x1c00_0000);

        assert_eq!(exec(&mut state, &mut guest, INSN_ERTN), Ok(Flow::Jump(0x1200_0000)));
        assert_eq!(state.csr.plv(), 3);
        assert_eq!(CRMD_IE.ex(state.csr.crmd), 1);
        assert_eq!(state.tcache.lookup(0x1c00_0000), None);
    }

    #[test]
    fn test_ertn_from_refill_reenables_paging() {
        let (mut state, mut guest) = setup();
        state.csr.tlbrera = TLBRERA_PC.dp(TLBRERA_ISTLBR.dp(0, 1), 0x1200_0040 >> 2);
        state.csr.tlbrprmd = PRMD_PPLV.dp(0, 3);
        state.csr.era = 0xdead;

        assert_eq!(exec(&mut state, &mut guest, INSN_ERTN), Ok(Flow::Jump(0x1200_0040)));
        assert_eq!(TLBRERA_ISTLBR.ex(state.csr.tlbrera), 0);
        assert!(state.csr.paging());
        assert_eq!(state.csr.plv(), 3);
    }

    #[test]
    fn test_idle_waits_for_interrupt() {
        let (mut state, mut guest) = setup();
        state.pc = 0x100;
        assert_eq!(exec(&mut state, &mut guest, 0x0648_8000), Ok(Flow::Jump(0x100)));
        state.csr.ecfg = ECFG_LIE.dp(0, 1 << 11);
        state.csr.estat = 1 << 11;
        assert_eq!(exec(&mut state, &mut guest, 0x0648_8000), Ok(Flow::Next));
    }
}

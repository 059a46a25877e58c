//! LA64 base integer instructions.

use crate::exception::Exccode;
use crate::guest::GuestMem;
use crate::insn::{Decoded, Decoder, Executor, Flow, Instruction};
use crate::mmu;
use crate::state::CpuState;

// raw >> 15
const OP_ADD_W: u32 = 0x20;
const OP_ADD_D: u32 = 0x21;
const OP_SUB_W: u32 = 0x22;
const OP_SUB_D: u32 = 0x23;
const OP_SLT: u32 = 0x24;
const OP_SLTU: u32 = 0x25;
const OP_NOR: u32 = 0x28;
const OP_AND: u32 = 0x29;
const OP_OR: u32 = 0x2a;
const OP_XOR: u32 = 0x2b;
const OP_SLL_W: u32 = 0x2e;
const OP_SRL_W: u32 = 0x2f;
const OP_SRA_W: u32 = 0x30;
const OP_SLL_D: u32 = 0x31;
const OP_SRL_D: u32 = 0x32;
const OP_SRA_D: u32 = 0x33;
const OP_BREAK: u32 = 0x54;
const OP_SYSCALL: u32 = 0x56;
const OP_SLLI_W: u32 = 0x81;
const OP_SRLI_W: u32 = 0x89;
const OP_SRAI_W: u32 = 0x91;
const OP_DBAR: u32 = 0x70e4;
const OP_IBAR: u32 = 0x70e5;

// raw >> 16
const OP_SLLI_D: u32 = 0x41;
const OP_SRLI_D: u32 = 0x45;
const OP_SRAI_D: u32 = 0x49;

// raw >> 22
const OP_SLTI: u32 = 0x008;
const OP_SLTUI: u32 = 0x009;
const OP_ADDI_W: u32 = 0x00a;
const OP_ADDI_D: u32 = 0x00b;
const OP_LU52I_D: u32 = 0x00c;
const OP_ANDI: u32 = 0x00d;
const OP_ORI: u32 = 0x00e;
const OP_XORI: u32 = 0x00f;
const OP_LD_B: u32 = 0x0a0;
const OP_LD_H: u32 = 0x0a1;
const OP_LD_W: u32 = 0x0a2;
const OP_LD_D: u32 = 0x0a3;
const OP_ST_B: u32 = 0x0a4;
const OP_ST_H: u32 = 0x0a5;
const OP_ST_W: u32 = 0x0a6;
const OP_ST_D: u32 = 0x0a7;
const OP_LD_BU: u32 = 0x0a8;
const OP_LD_HU: u32 = 0x0a9;
const OP_LD_WU: u32 = 0x0aa;

// raw >> 25
const OP_LU12I_W: u32 = 0x0a;
const OP_LU32I_D: u32 = 0x0b;
const OP_PCADDI: u32 = 0x0c;
const OP_PCADDU12I: u32 = 0x0e;

// raw >> 26
const OP_BEQZ: u32 = 0x10;
const OP_BNEZ: u32 = 0x11;
const OP_JIRL: u32 = 0x13;
const OP_B: u32 = 0x14;
const OP_BL: u32 = 0x15;
const OP_BEQ: u32 = 0x16;
const OP_BNE: u32 = 0x17;
const OP_BLT: u32 = 0x18;
const OP_BGE: u32 = 0x19;
const OP_BLTU: u32 = 0x1a;
const OP_BGEU: u32 = 0x1b;

/// Return address register
const REG_RA: usize = 1;

#[derive(Debug)]
pub struct La64Decoder;

impl Decoder for La64Decoder {
    fn decode(&self, raw: u32) -> Option<Decoded> {
        let res = match raw >> 26 {
            OP_BEQZ => (Instruction::r1i21(raw), la64_beqz as Executor),
            OP_BNEZ => (Instruction::r1i21(raw), la64_bnez as Executor),
            OP_JIRL => (Instruction::r2i16(raw), la64_jirl as Executor),
            OP_B => (Instruction::i26(raw), la64_b as Executor),
            OP_BL => (Instruction::i26(raw), la64_bl as Executor),
            OP_BEQ => (Instruction::r2i16(raw), la64_beq as Executor),
            OP_BNE => (Instruction::r2i16(raw), la64_bne as Executor),
            OP_BLT => (Instruction::r2i16(raw), la64_blt as Executor),
            OP_BGE => (Instruction::r2i16(raw), la64_bge as Executor),
            OP_BLTU => (Instruction::r2i16(raw), la64_bltu as Executor),
            OP_BGEU => (Instruction::r2i16(raw), la64_bgeu as Executor),
            _ => match raw >> 25 {
                OP_LU12I_W => (Instruction::r1i20(raw), la64_lu12i_w as Executor),
                OP_LU32I_D => (Instruction::r1i20(raw), la64_lu32i_d as Executor),
                OP_PCADDI => (Instruction::r1i20(raw), la64_pcaddi as Executor),
                OP_PCADDU12I => (Instruction::r1i20(raw), la64_pcaddu12i as Executor),
                _ => return decode_r2i12(raw).or_else(|| decode_short(raw)),
            },
        };
        Some(res)
    }
}

fn decode_r2i12(raw: u32) -> Option<Decoded> {
    let executor = match raw >> 22 {
        OP_SLTI => la64_slti as Executor,
        OP_SLTUI => la64_sltui as Executor,
        OP_ADDI_W => la64_addi_w as Executor,
        OP_ADDI_D => la64_addi_d as Executor,
        OP_LU52I_D => la64_lu52i_d as Executor,
        OP_ANDI => la64_andi as Executor,
        OP_ORI => la64_ori as Executor,
        OP_XORI => la64_xori as Executor,
        OP_LD_B => la64_ld_b as Executor,
        OP_LD_H => la64_ld_h as Executor,
        OP_LD_W => la64_ld_w as Executor,
        OP_LD_D => la64_ld_d as Executor,
        OP_ST_B => la64_st_b as Executor,
        OP_ST_H => la64_st_h as Executor,
        OP_ST_W => la64_st_w as Executor,
        OP_ST_D => la64_st_d as Executor,
        OP_LD_BU => la64_ld_bu as Executor,
        OP_LD_HU => la64_ld_hu as Executor,
        OP_LD_WU => la64_ld_wu as Executor,
        _ => return None,
    };
    Some((Instruction::r2i(raw, 12), executor))
}

fn decode_short(raw: u32) -> Option<Decoded> {
    let res = match raw >> 16 {
        OP_SLLI_D => (Instruction::r2i(raw, 6), la64_slli_d as Executor),
        OP_SRLI_D => (Instruction::r2i(raw, 6), la64_srli_d as Executor),
        OP_SRAI_D => (Instruction::r2i(raw, 6), la64_srai_d as Executor),
        _ => match raw >> 15 {
            OP_ADD_W => (Instruction::r3(raw), la64_add_w as Executor),
            OP_ADD_D => (Instruction::r3(raw), la64_add_d as Executor),
            OP_SUB_W => (Instruction::r3(raw), la64_sub_w as Executor),
            OP_SUB_D => (Instruction::r3(raw), la64_sub_d as Executor),
            OP_SLT => (Instruction::r3(raw), la64_slt as Executor),
            OP_SLTU => (Instruction::r3(raw), la64_sltu as Executor),
            OP_NOR => (Instruction::r3(raw), la64_nor as Executor),
            OP_AND => (Instruction::r3(raw), la64_and as Executor),
            OP_OR => (Instruction::r3(raw), la64_or as Executor),
            OP_XOR => (Instruction::r3(raw), la64_xor as Executor),
            OP_SLL_W => (Instruction::r3(raw), la64_sll_w as Executor),
            OP_SRL_W => (Instruction::r3(raw), la64_srl_w as Executor),
            OP_SRA_W => (Instruction::r3(raw), la64_sra_w as Executor),
            OP_SLL_D => (Instruction::r3(raw), la64_sll_d as Executor),
            OP_SRL_D => (Instruction::r3(raw), la64_srl_d as Executor),
            OP_SRA_D => (Instruction::r3(raw), la64_sra_d as Executor),
            OP_SLLI_W => (Instruction::r2i(raw, 5), la64_slli_w as Executor),
            OP_SRLI_W => (Instruction::r2i(raw, 5), la64_srli_w as Executor),
            OP_SRAI_W => (Instruction::r2i(raw, 5), la64_srai_w as Executor),
            OP_BREAK => (Instruction::code(raw), la64_break as Executor),
            OP_SYSCALL => (Instruction::code(raw), la64_syscall as Executor),
            OP_DBAR | OP_IBAR => (Instruction::code(raw), la64_barrier as Executor),
            _ => return None,
        },
    };
    Some(res)
}

/// Sign-extends the low 32 bits to a register value.
fn sext32(value: u64) -> u64 {
    value as u32 as i32 as i64 as u64
}

fn la64_add_w(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        state.gpr[rd as usize] = sext32(state.gpr[rj as usize].wrapping_add(state.gpr[rk as usize]));
        Ok(Flow::Next)
    })
}

fn la64_add_d(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        state.gpr[rd as usize] = state.gpr[rj as usize].wrapping_add(state.gpr[rk as usize]);
        Ok(Flow::Next)
    })
}

fn la64_sub_w(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        state.gpr[rd as usize] = sext32(state.gpr[rj as usize].wrapping_sub(state.gpr[rk as usize]));
        Ok(Flow::Next)
    })
}

fn la64_sub_d(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        state.gpr[rd as usize] = state.gpr[rj as usize].wrapping_sub(state.gpr[rk as usize]);
        Ok(Flow::Next)
    })
}

fn la64_slt(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        let value = (state.gpr[rj as usize] as i64) < (state.gpr[rk as usize] as i64);
        state.gpr[rd as usize] = value as u64;
        Ok(Flow::Next)
    })
}

fn la64_sltu(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        let value = state.gpr[rj as usize] < state.gpr[rk as usize];
        state.gpr[rd as usize] = value as u64;
        Ok(Flow::Next)
    })
}

fn la64_nor(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        state.gpr[rd as usize] = !(state.gpr[rj as usize] | state.gpr[rk as usize]);
        Ok(Flow::Next)
    })
}

fn la64_and(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        state.gpr[rd as usize] = state.gpr[rj as usize] & state.gpr[rk as usize];
        Ok(Flow::Next)
    })
}

fn la64_or(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        state.gpr[rd as usize] = state.gpr[rj as usize] | state.gpr[rk as usize];
        Ok(Flow::Next)
    })
}

fn la64_xor(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        state.gpr[rd as usize] = state.gpr[rj as usize] ^ state.gpr[rk as usize];
        Ok(Flow::Next)
    })
}

fn la64_sll_w(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        let value = (state.gpr[rj as usize] as u32) << (state.gpr[rk as usize] & 0x1f);
        state.gpr[rd as usize] = sext32(value as u64);
        Ok(Flow::Next)
    })
}

fn la64_srl_w(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        let value = (state.gpr[rj as usize] as u32) >> (state.gpr[rk as usize] & 0x1f);
        state.gpr[rd as usize] = sext32(value as u64);
        Ok(Flow::Next)
    })
}

fn la64_sra_w(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        let value = (state.gpr[rj as usize] as i32) >> (state.gpr[rk as usize] & 0x1f);
        state.gpr[rd as usize] = value as i64 as u64;
        Ok(Flow::Next)
    })
}

fn la64_sll_d(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        state.gpr[rd as usize] = state.gpr[rj as usize] << (state.gpr[rk as usize] & 0x3f);
        Ok(Flow::Next)
    })
}

fn la64_srl_d(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        state.gpr[rd as usize] = state.gpr[rj as usize] >> (state.gpr[rk as usize] & 0x3f);
        Ok(Flow::Next)
    })
}

fn la64_sra_d(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r3!(insn, rd, rj, rk => {
        let value = (state.gpr[rj as usize] as i64) >> (state.gpr[rk as usize] & 0x3f);
        state.gpr[rd as usize] = value as u64;
        Ok(Flow::Next)
    })
}

fn la64_slli_w(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let value = (state.gpr[rj as usize] as u32) << imm;
        state.gpr[rd as usize] = sext32(value as u64);
        Ok(Flow::Next)
    })
}

fn la64_srli_w(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let value = (state.gpr[rj as usize] as u32) >> imm;
        state.gpr[rd as usize] = sext32(value as u64);
        Ok(Flow::Next)
    })
}

fn la64_srai_w(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let value = (state.gpr[rj as usize] as i32) >> imm;
        state.gpr[rd as usize] = value as i64 as u64;
        Ok(Flow::Next)
    })
}

fn la64_slli_d(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        state.gpr[rd as usize] = state.gpr[rj as usize] << imm;
        Ok(Flow::Next)
    })
}

fn la64_srli_d(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        state.gpr[rd as usize] = state.gpr[rj as usize] >> imm;
        Ok(Flow::Next)
    })
}

fn la64_srai_d(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        state.gpr[rd as usize] = ((state.gpr[rj as usize] as i64) >> imm) as u64;
        Ok(Flow::Next)
    })
}

fn la64_slti(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let value = (state.gpr[rj as usize] as i64) < sign_extend!(imm, 12);
        state.gpr[rd as usize] = value as u64;
        Ok(Flow::Next)
    })
}

fn la64_sltui(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let value = state.gpr[rj as usize] < sign_extend!(imm, 12) as u64;
        state.gpr[rd as usize] = value as u64;
        Ok(Flow::Next)
    })
}

fn la64_addi_w(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let value = state.gpr[rj as usize].wrapping_add(sign_extend!(imm, 12) as u64);
        state.gpr[rd as usize] = sext32(value);
        Ok(Flow::Next)
    })
}

fn la64_addi_d(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        state.gpr[rd as usize] = state.gpr[rj as usize].wrapping_add(sign_extend!(imm, 12) as u64);
        Ok(Flow::Next)
    })
}

fn la64_lu52i_d(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let low = state.gpr[rj as usize] & 0x000f_ffff_ffff_ffff;
        state.gpr[rd as usize] = low | ((imm as u64) << 52);
        Ok(Flow::Next)
    })
}

fn la64_andi(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        state.gpr[rd as usize] = state.gpr[rj as usize] & imm as u64;
        Ok(Flow::Next)
    })
}

fn la64_ori(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        state.gpr[rd as usize] = state.gpr[rj as usize] | imm as u64;
        Ok(Flow::Next)
    })
}

fn la64_xori(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        state.gpr[rd as usize] = state.gpr[rj as usize] ^ imm as u64;
        Ok(Flow::Next)
    })
}

fn la64_lu12i_w(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r1i20!(insn, rd, imm => {
        state.gpr[rd as usize] = sext32((imm as u64) << 12);
        Ok(Flow::Next)
    })
}

fn la64_lu32i_d(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r1i20!(insn, rd, imm => {
        let high = (sign_extend!(imm, 20) as u64) << 32;
        state.gpr[rd as usize] = (state.gpr[rd as usize] & 0xffff_ffff) | high;
        Ok(Flow::Next)
    })
}

fn la64_pcaddi(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r1i20!(insn, rd, imm => {
        state.gpr[rd as usize] = state.pc.wrapping_add(sign_extend!(imm << 2, 22) as u64);
        Ok(Flow::Next)
    })
}

fn la64_pcaddu12i(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r1i20!(insn, rd, imm => {
        state.gpr[rd as usize] = state.pc.wrapping_add(sign_extend!((imm as u64) << 12, 32) as u64);
        Ok(Flow::Next)
    })
}

/// Effective address of a 2RI12 memory access.
fn ea(state: &CpuState, rj: u8, imm: u32) -> u64 {
    state.gpr[rj as usize].wrapping_add(sign_extend!(imm, 12) as u64)
}

fn la64_ld_b(state: &mut CpuState, guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let va = ea(state, rj, imm);
        let value = mmu::load(state, guest, va, 1)?;
        state.gpr[rd as usize] = sign_extend!(value, 8) as u64;
        Ok(Flow::Next)
    })
}

fn la64_ld_h(state: &mut CpuState, guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let va = ea(state, rj, imm);
        let value = mmu::load(state, guest, va, 2)?;
        state.gpr[rd as usize] = sign_extend!(value, 16) as u64;
        Ok(Flow::Next)
    })
}

fn la64_ld_w(state: &mut CpuState, guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let va = ea(state, rj, imm);
        let value = mmu::load(state, guest, va, 4)?;
        state.gpr[rd as usize] = sext32(value);
        Ok(Flow::Next)
    })
}

fn la64_ld_d(state: &mut CpuState, guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let va = ea(state, rj, imm);
        state.gpr[rd as usize] = mmu::load(state, guest, va, 8)?;
        Ok(Flow::Next)
    })
}

fn la64_ld_bu(state: &mut CpuState, guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let va = ea(state, rj, imm);
        state.gpr[rd as usize] = mmu::load(state, guest, va, 1)?;
        Ok(Flow::Next)
    })
}

fn la64_ld_hu(state: &mut CpuState, guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let va = ea(state, rj, imm);
        state.gpr[rd as usize] = mmu::load(state, guest, va, 2)?;
        Ok(Flow::Next)
    })
}

fn la64_ld_wu(state: &mut CpuState, guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let va = ea(state, rj, imm);
        state.gpr[rd as usize] = mmu::load(state, guest, va, 4)?;
        Ok(Flow::Next)
    })
}

fn la64_st_b(state: &mut CpuState, guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let (va, value) = (ea(state, rj, imm), state.gpr[rd as usize]);
        mmu::store(state, guest, va, 1, value)?;
        Ok(Flow::Next)
    })
}

fn la64_st_h(state: &mut CpuState, guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let (va, value) = (ea(state, rj, imm), state.gpr[rd as usize]);
        mmu::store(state, guest, va, 2, value)?;
        Ok(Flow::Next)
    })
}

fn la64_st_w(state: &mut CpuState, guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let (va, value) = (ea(state, rj, imm), state.gpr[rd as usize]);
        mmu::store(state, guest, va, 4, value)?;
        Ok(Flow::Next)
    })
}

fn la64_st_d(state: &mut CpuState, guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i!(insn, rd, rj, imm => {
        let (va, value) = (ea(state, rj, imm), state.gpr[rd as usize]);
        mmu::store(state, guest, va, 8, value)?;
        Ok(Flow::Next)
    })
}

fn la64_jirl(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r2i16!(insn, rd, rj, imm => {
        // rd may alias rj.
        let target = state.gpr[rj as usize].wrapping_add(sign_extend!(imm << 2, 18) as u64);
        state.gpr[rd as usize] = state.pc.wrapping_add(4);
        Ok(Flow::Jump(target))
    })
}

fn la64_b(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    i26!(insn, imm => {
        Ok(Flow::Jump(state.pc.wrapping_add(sign_extend!(imm << 2, 28) as u64)))
    })
}

fn la64_bl(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    i26!(insn, imm => {
        state.gpr[REG_RA] = state.pc.wrapping_add(4);
        Ok(Flow::Jump(state.pc.wrapping_add(sign_extend!(imm << 2, 28) as u64)))
    })
}

/// Conditional branch on `rj` against `rd`.
fn branch_if(
    state: &CpuState,
    insn: &Instruction,
    cond: fn(u64, u64) -> bool,
) -> Result<Flow, Exccode> {
    r2i16!(insn, rd, rj, imm => {
        if cond(state.gpr[rj as usize], state.gpr[rd as usize]) {
            Ok(Flow::Jump(state.pc.wrapping_add(sign_extend!(imm << 2, 18) as u64)))
        } else {
            Ok(Flow::Next)
        }
    })
}

fn la64_beq(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    branch_if(state, insn, |a, b| a == b)
}

fn la64_bne(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    branch_if(state, insn, |a, b| a != b)
}

fn la64_blt(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    branch_if(state, insn, |a, b| (a as i64) < (b as i64))
}

fn la64_bge(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    branch_if(state, insn, |a, b| (a as i64) >= (b as i64))
}

fn la64_bltu(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    branch_if(state, insn, |a, b| a < b)
}

fn la64_bgeu(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    branch_if(state, insn, |a, b| a >= b)
}

fn la64_beqz(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r1i21!(insn, rj, imm => {
        if state.gpr[rj as usize] == 0 {
            Ok(Flow::Jump(state.pc.wrapping_add(sign_extend!(imm << 2, 23) as u64)))
        } else {
            Ok(Flow::Next)
        }
    })
}

fn la64_bnez(state: &mut CpuState, _guest: &mut GuestMem, insn: &Instruction) -> Result<Flow, Exccode> {
    r1i21!(insn, rj, imm => {
        if state.gpr[rj as usize] != 0 {
            Ok(Flow::Jump(state.pc.wrapping_add(sign_extend!(imm << 2, 23) as u64)))
        } else {
            Ok(Flow::Next)
        }
    })
}

fn la64_syscall(_state: &mut CpuState, _guest: &mut GuestMem, _insn: &Instruction) -> Result<Flow, Exccode> {
    Err(Exccode::SYS)
}

fn la64_break(_state: &mut CpuState, _guest: &mut GuestMem, _insn: &Instruction) -> Result<Flow, Exccode> {
    Err(Exccode::BRK)
}

/// Single hart, in-order memory: barriers are no-ops.
fn la64_barrier(_state: &mut CpuState, _guest: &mut GuestMem, _insn: &Instruction) -> Result<Flow, Exccode> {
    Ok(Flow::Next)
}

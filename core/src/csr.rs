//! Control and status registers.

use tracing::warn;

use crate::utils::Field;

pub const CSR_CRMD: u16 = 0x0;
pub const CSR_PRMD: u16 = 0x1;
pub const CSR_EUEN: u16 = 0x2;
pub const CSR_ECFG: u16 = 0x4;
pub const CSR_ESTAT: u16 = 0x5;
pub const CSR_ERA: u16 = 0x6;
pub const CSR_BADV: u16 = 0x7;
pub const CSR_BADI: u16 = 0x8;
pub const CSR_EENTRY: u16 = 0xc;
pub const CSR_TLBIDX: u16 = 0x10;
pub const CSR_TLBEHI: u16 = 0x11;
pub const CSR_TLBELO0: u16 = 0x12;
pub const CSR_TLBELO1: u16 = 0x13;
pub const CSR_ASID: u16 = 0x18;
pub const CSR_PGDL: u16 = 0x19;
pub const CSR_PGDH: u16 = 0x1a;
pub const CSR_CPUID: u16 = 0x20;
pub const CSR_SAVE0: u16 = 0x30;
pub const CSR_TID: u16 = 0x40;
pub const CSR_TCFG: u16 = 0x41;
pub const CSR_TVAL: u16 = 0x42;
pub const CSR_TICLR: u16 = 0x44;
pub const CSR_TLBRENTRY: u16 = 0x88;
pub const CSR_TLBRBADV: u16 = 0x89;
pub const CSR_TLBRERA: u16 = 0x8a;
pub const CSR_TLBRSAVE: u16 = 0x8b;
pub const CSR_TLBRELO0: u16 = 0x8c;
pub const CSR_TLBRELO1: u16 = 0x8d;
pub const CSR_TLBREHI: u16 = 0x8e;
pub const CSR_TLBRPRMD: u16 = 0x8f;
pub const CSR_DMW0: u16 = 0x180;
pub const CSR_DBG: u16 = 0x500;
pub const CSR_DERA: u16 = 0x501;
pub const CSR_DSAVE: u16 = 0x502;

pub const CRMD_PLV: Field = Field::new(0, 2);
pub const CRMD_IE: Field = Field::new(2, 1);
pub const CRMD_DA: Field = Field::new(3, 1);
pub const CRMD_PG: Field = Field::new(4, 1);
pub const CRMD_DATF: Field = Field::new(5, 2);
pub const CRMD_DATM: Field = Field::new(7, 2);

/// Also the layout of TLBRPRMD.
pub const PRMD_PPLV: Field = Field::new(0, 2);
pub const PRMD_PIE: Field = Field::new(2, 1);

pub const ECFG_LIE: Field = Field::new(0, 13);
pub const ECFG_VS: Field = Field::new(16, 3);

pub const ESTAT_IS: Field = Field::new(0, 13);
pub const ESTAT_ECODE: Field = Field::new(16, 6);
pub const ESTAT_ESUBCODE: Field = Field::new(22, 9);

pub const ASID_ASID: Field = Field::new(0, 10);
pub const ASID_ASIDBITS: Field = Field::new(16, 8);

pub const TLBRERA_ISTLBR: Field = Field::new(0, 1);
pub const TLBRERA_PC: Field = Field::new(2, 62);

pub const TCFG_EN: Field = Field::new(0, 1);
pub const TCFG_PERIODIC: Field = Field::new(1, 1);
pub const TCFG_INITVAL: Field = Field::new(2, 46);

pub const TICLR_CLR: Field = Field::new(0, 1);

pub const DMW_PLV0: Field = Field::new(0, 1);
pub const DMW_MAT: Field = Field::new(4, 2);
pub const DMW_VSEG: Field = Field::new(60, 4);

pub const DBG_DST: Field = Field::new(0, 1);
pub const DBG_DEI: Field = Field::new(8, 1);
pub const DBG_DCL: Field = Field::new(9, 1);
pub const DBG_ECODE: Field = Field::new(16, 6);

/// Software-writable interrupt status bits (SWI0, SWI1).
const ESTAT_SW_MASK: u64 = 0b11;
const TIMER_TICK_MASK: u64 = 0xffff_ffff_fffc;

#[derive(Debug, Clone, Default)]
pub struct Csrs {
    pub crmd: u64,
    pub prmd: u64,
    pub euen: u64,
    pub ecfg: u64,
    pub estat: u64,
    pub era: u64,
    pub badv: u64,
    pub badi: u64,
    pub eentry: u64,
    pub tlbidx: u64,
    pub tlbehi: u64,
    pub tlbelo0: u64,
    pub tlbelo1: u64,
    pub asid: u64,
    pub pgdl: u64,
    pub pgdh: u64,
    pub cpuid: u64,
    pub save: [u64; 16],
    pub tid: u64,
    pub tcfg: u64,
    pub tval: u64,
    pub tlbrentry: u64,
    pub tlbrbadv: u64,
    pub tlbrera: u64,
    pub tlbrsave: u64,
    pub tlbrelo0: u64,
    pub tlbrelo1: u64,
    pub tlbrehi: u64,
    pub tlbrprmd: u64,
    pub dmw: [u64; 4],
    pub dbg: u64,
    pub dera: u64,
    pub dsave: u64,
}

/// What a CSR write changed beyond the register itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEffect {
    None,
    /// Address translation context changed (mode, ASID or a direct-mapped window).
    Translation,
}

impl Csrs {
    pub fn plv(&self) -> u64 {
        CRMD_PLV.ex(self.crmd)
    }

    pub fn paging(&self) -> bool {
        CRMD_DA.ex(self.crmd) == 0 && CRMD_PG.ex(self.crmd) == 1
    }

    pub fn read(&self, num: u16) -> u64 {
        match num {
            CSR_CRMD => self.crmd,
            CSR_PRMD => self.prmd,
            CSR_EUEN => self.euen,
            CSR_ECFG => self.ecfg,
            CSR_ESTAT => self.estat,
            CSR_ERA => self.era,
            CSR_BADV => self.badv,
            CSR_BADI => self.badi,
            CSR_EENTRY => self.eentry,
            CSR_TLBIDX => self.tlbidx,
            CSR_TLBEHI => self.tlbehi,
            CSR_TLBELO0 => self.tlbelo0,
            CSR_TLBELO1 => self.tlbelo1,
            CSR_ASID => self.asid,
            CSR_PGDL => self.pgdl,
            CSR_PGDH => self.pgdh,
            CSR_CPUID => self.cpuid,
            n if (CSR_SAVE0..CSR_SAVE0 + 16).contains(&n) => self.save[(n - CSR_SAVE0) as usize],
            CSR_TID => self.tid,
            CSR_TCFG => self.tcfg,
            CSR_TVAL => self.tval,
            CSR_TICLR => 0,
            CSR_TLBRENTRY => self.tlbrentry,
            CSR_TLBRBADV => self.tlbrbadv,
            CSR_TLBRERA => self.tlbrera,
            CSR_TLBRSAVE => self.tlbrsave,
            CSR_TLBRELO0 => self.tlbrelo0,
            CSR_TLBRELO1 => self.tlbrelo1,
            CSR_TLBREHI => self.tlbrehi,
            CSR_TLBRPRMD => self.tlbrprmd,
            n if (CSR_DMW0..CSR_DMW0 + 4).contains(&n) => self.dmw[(n - CSR_DMW0) as usize],
            CSR_DBG => self.dbg,
            CSR_DERA => self.dera,
            CSR_DSAVE => self.dsave,
            _ => {
                warn!("read of unimplemented csr {:#x}", num);
                0
            }
        }
    }

    pub fn write(&mut self, num: u16, value: u64) -> WriteEffect {
        match num {
            CSR_CRMD => {
                self.crmd = value;
                return WriteEffect::Translation;
            }
            CSR_PRMD => self.prmd = value,
            CSR_EUEN => self.euen = value,
            CSR_ECFG => self.ecfg = value,
            CSR_ESTAT => self.estat = (self.estat & !ESTAT_SW_MASK) | (value & ESTAT_SW_MASK),
            CSR_ERA => self.era = value,
            CSR_BADV => self.badv = value,
            CSR_BADI => self.badi = value,
            CSR_EENTRY => self.eentry = value,
            CSR_TLBIDX => self.tlbidx = value,
            CSR_TLBEHI => self.tlbehi = value,
            CSR_TLBELO0 => self.tlbelo0 = value,
            CSR_TLBELO1 => self.tlbelo1 = value,
            CSR_ASID => {
                self.asid = ASID_ASID.dp(self.asid, value);
                return WriteEffect::Translation;
            }
            CSR_PGDL => self.pgdl = value,
            CSR_PGDH => self.pgdh = value,
            CSR_CPUID => {}
            n if (CSR_SAVE0..CSR_SAVE0 + 16).contains(&n) => self.save[(n - CSR_SAVE0) as usize] = value,
            CSR_TID => self.tid = value,
            CSR_TCFG => {
                self.tcfg = value;
                self.tval = value & TIMER_TICK_MASK;
            }
            CSR_TVAL => {}
            CSR_TICLR => {
                if TICLR_CLR.ex(value) == 1 {
                    self.estat &= !(1 << crate::irq::IRQ_TIMER);
                }
            }
            CSR_TLBRENTRY => self.tlbrentry = value,
            CSR_TLBRBADV => self.tlbrbadv = value,
            CSR_TLBRERA => self.tlbrera = value,
            CSR_TLBRSAVE => self.tlbrsave = value,
            CSR_TLBRELO0 => self.tlbrelo0 = value,
            CSR_TLBRELO1 => self.tlbrelo1 = value,
            CSR_TLBREHI => self.tlbrehi = value,
            CSR_TLBRPRMD => self.tlbrprmd = value,
            n if (CSR_DMW0..CSR_DMW0 + 4).contains(&n) => {
                self.dmw[(n - CSR_DMW0) as usize] = value;
                return WriteEffect::Translation;
            }
            CSR_DBG => self.dbg = value,
            CSR_DERA => self.dera = value,
            CSR_DSAVE => self.dsave = value,
            _ => warn!("write of unimplemented csr {:#x} = {:#x}", num, value),
        }
        WriteEffect::None
    }
}

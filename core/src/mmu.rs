//! Virtual to physical address translation.
//!
//! Translation faults are reported as `Err(Exccode)` with BADV and the TLB
//! exception registers already filled in, ready for [`crate::exception::do_interrupt`].

use bitflags::bitflags;
use tracing::trace;

use crate::config::*;
use crate::csr::*;
use crate::exception::Exccode;
use crate::guest::GuestMem;
use crate::state::CpuState;

const VA_MASK: u64 = (1 << 48) - 1;
/// Low bits dropped from TLBEHI/TLBREHI (even/odd page pair of 4 KiB pages).
const EHI_MASK: u64 = !0x1fff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAccess {
    Read,
    Write,
    Fetch,
}

impl MemAccess {
    /// Cause raised for a missing or invalid mapping.
    pub fn invalid_cause(self) -> Exccode {
        match self {
            MemAccess::Read => Exccode::PIL,
            MemAccess::Write => Exccode::PIS,
            MemAccess::Fetch => Exccode::PIF,
        }
    }
}

bitflags! {
    /// Layout of TLBELO0/1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntryLo: u64 {
        const V = 1 << 0;
        const D = 1 << 1;
        const PLV = 0b11 << 2;
        const MAT = 0b11 << 4;
        const G = 1 << 6;
        const PPN = 0xffff_ffff_f000;
        const NR = 1 << 61;
        const NX = 1 << 62;
        const RPLV = 1 << 63;
    }
}

impl EntryLo {
    pub fn plv(self) -> u64 {
        (self.bits() & Self::PLV.bits()) >> 2
    }

    pub fn with_plv(self, plv: u64) -> Self {
        Self::from_bits_retain((self.bits() & !Self::PLV.bits()) | ((plv & 0b11) << 2))
    }

    pub fn with_ppn(self, pa: u64) -> Self {
        Self::from_bits_retain((self.bits() & !Self::PPN.bits()) | (pa & Self::PPN.bits()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TlbEntry {
    /// Virtual address of the even page (low 13 bits ignored).
    pub vppn: u64,
    /// log2 of the page size.
    pub ps: u8,
    pub asid: u16,
    pub global: bool,
    /// The E bit; cleared entries never match.
    pub present: bool,
    /// Even and odd page.
    pub lo: [EntryLo; 2],
}

impl TlbEntry {
    fn matches(&self, va: u64, asid: u16) -> bool {
        let shift = self.ps as u32 + 1;
        self.present
            && (self.global || self.asid == asid)
            && (va & VA_MASK) >> shift == (self.vppn & VA_MASK) >> shift
    }
}

#[derive(Debug, Clone)]
pub struct Tlb {
    entries: Vec<TlbEntry>,
}

impl Tlb {
    pub fn new() -> Self {
        Self {
            entries: vec![TlbEntry::default(); TLB_ENTRIES],
        }
    }

    pub fn write(&mut self, index: usize, entry: TlbEntry) {
        let index = index % TLB_ENTRIES;
        trace!("tlb[{}] <- {:x?}", index, entry);
        self.entries[index] = entry;
    }

    pub fn get(&self, index: usize) -> Option<&TlbEntry> {
        self.entries.get(index)
    }

    pub fn lookup(&self, va: u64, asid: u16) -> Option<TlbEntry> {
        self.entries.iter().find(|e| e.matches(va, asid)).copied()
    }

    pub fn invalidate_all(&mut self) {
        self.entries.iter_mut().for_each(|e| e.present = false);
    }
}

impl Default for Tlb {
    fn default() -> Self {
        Self::new()
    }
}

/// Translates `va` under the current privilege level and address mode.
pub fn translate(state: &mut CpuState, va: u64, access: MemAccess) -> Result<u64, Exccode> {
    if !state.csr.paging() {
        return Ok(va & PHYS_MASK);
    }

    let plv = state.csr.plv();
    let windowed = state
        .csr
        .dmw
        .iter()
        .any(|&dmw| (dmw >> plv) & 1 == 1 && DMW_VSEG.ex(dmw) == va >> 60);
    if windowed {
        return Ok(va & PHYS_MASK);
    }

    let asid = ASID_ASID.ex(state.csr.asid) as u16;
    let Some(entry) = state.tlb.lookup(va, asid) else {
        trace!("tlb refill for va {:#x} ({:?})", va, access);
        state.csr.tlbrera = TLBRERA_ISTLBR.dp(state.csr.tlbrera, 1);
        state.csr.tlbrbadv = va;
        state.csr.tlbrehi = va & EHI_MASK;
        return Err(access.invalid_cause());
    };

    let ps = entry.ps as u32;
    let lo = entry.lo[((va >> ps) & 1) as usize];
    let plv_denied = if lo.contains(EntryLo::RPLV) {
        plv != lo.plv()
    } else {
        plv > lo.plv()
    };

    let fault = if !lo.contains(EntryLo::V) {
        Some(access.invalid_cause())
    } else if access == MemAccess::Fetch && lo.contains(EntryLo::NX) {
        Some(Exccode::PNX)
    } else if access == MemAccess::Read && lo.contains(EntryLo::NR) {
        Some(Exccode::PNR)
    } else if plv_denied {
        Some(Exccode::PPI)
    } else if access == MemAccess::Write && !lo.contains(EntryLo::D) {
        Some(Exccode::PME)
    } else {
        None
    };
    if let Some(cause) = fault {
        state.csr.badv = va;
        state.csr.tlbehi = va & EHI_MASK;
        return Err(cause);
    }

    let offset_mask = (1u64 << ps) - 1;
    Ok((lo.bits() & EntryLo::PPN.bits() & !offset_mask) | (va & offset_mask))
}

/// Loads `size` bytes (1, 2, 4 or 8), zero-extended.
pub fn load(state: &mut CpuState, guest: &GuestMem, va: u64, size: u8) -> Result<u64, Exccode> {
    if va & (size as u64 - 1) != 0 {
        state.csr.badv = va;
        return Err(Exccode::ALE);
    }
    let pa = translate(state, va, MemAccess::Read)?;
    let value = match size {
        1 => guest.read_u8(pa).map(u64::from),
        2 => guest.read_u16(pa).map(u64::from),
        4 => guest.read_u32(pa).map(u64::from),
        _ => guest.read_u64(pa),
    };
    value.map_err(|_| {
        state.csr.badv = va;
        Exccode::ADEM
    })
}

/// Stores the low `size` bytes (1, 2, 4 or 8) of `value`.
pub fn store(
    state: &mut CpuState,
    guest: &mut GuestMem,
    va: u64,
    size: u8,
    value: u64,
) -> Result<(), Exccode> {
    if va & (size as u64 - 1) != 0 {
        state.csr.badv = va;
        return Err(Exccode::ALE);
    }
    let pa = translate(state, va, MemAccess::Write)?;
    let res = match size {
        1 => guest.write_u8(pa, value as u8),
        2 => guest.write_u16(pa, value as u16),
        4 => guest.write_u32(pa, value as u32),
        _ => guest.write_u64(pa, value),
    };
    res.map_err(|_| {
        state.csr.badv = va;
        Exccode::ADEM
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log;

    const USER_VA: u64 = 0x1_2000_3000;

    fn paged_state(plv: u64) -> CpuState {
        log::log_init(log::Level::Off);
        let mut state = CpuState::new();
        state.csr.crmd = CRMD_PLV.dp(CRMD_PG.dp(0, 1), plv);
        state.csr.asid = ASID_ASID.dp(state.csr.asid, 5);
        state
    }

    fn user_page(flags: EntryLo, pa: u64) -> EntryLo {
        (flags | EntryLo::V).with_plv(3).with_ppn(pa)
    }

    fn map_pair(state: &mut CpuState, even: EntryLo, odd: EntryLo) {
        state.tlb.write(
            3,
            TlbEntry {
                vppn: USER_VA & EHI_MASK,
                ps: 12,
                asid: 5,
                global: false,
                present: true,
                lo: [even, odd],
            },
        );
    }

    #[test]
    fn test_direct_address_mode() {
        let mut state = CpuState::new();
        assert_eq!(translate(&mut state, 0x9000_0000_1c00_0000, MemAccess::Fetch), Ok(0x1c00_0000));
    }

    #[test]
    fn test_direct_mapped_window() {
        let mut state = paged_state(0);
        state.csr.dmw[1] = DMW_VSEG.dp(DMW_PLV0.dp(0, 1), 0x9);
        assert_eq!(translate(&mut state, 0x9000_0000_0020_0000, MemAccess::Read), Ok(0x20_0000));

        // Window is not enabled for PLV3.
        state.csr.crmd = CRMD_PLV.dp(state.csr.crmd, 3);
        assert_eq!(translate(&mut state, 0x9000_0000_0020_0000, MemAccess::Read), Err(Exccode::PIL));
    }

    #[test]
    fn test_tlb_miss_requests_refill() {
        let mut state = paged_state(3);
        assert_eq!(translate(&mut state, USER_VA + 0x1234, MemAccess::Write), Err(Exccode::PIS));
        assert_eq!(TLBRERA_ISTLBR.ex(state.csr.tlbrera), 1);
        assert_eq!(state.csr.tlbrbadv, USER_VA + 0x1234);
        // 0x1_2000_4234 sits in the next even/odd pair.
        assert_eq!(state.csr.tlbrehi, 0x1_2000_4000);
    }

    #[test]
    fn test_tlb_hit_selects_odd_page() {
        let mut state = paged_state(3);
        map_pair(&mut state, user_page(EntryLo::D, 0x40_0000), user_page(EntryLo::D, 0x80_0000));
        // USER_VA has bit 12 set, so it is the odd page.
        assert_eq!(translate(&mut state, USER_VA + 0x10, MemAccess::Read), Ok(0x80_0010));
        assert_eq!(translate(&mut state, USER_VA - 0x1000, MemAccess::Write), Ok(0x40_0000));

        state.csr.asid = ASID_ASID.dp(state.csr.asid, 6);
        assert_eq!(translate(&mut state, USER_VA, MemAccess::Read), Err(Exccode::PIL));
    }

    #[test]
    fn test_page_permission_faults() {
        let mut state = paged_state(3);
        map_pair(
            &mut state,
            user_page(EntryLo::NX | EntryLo::NR, 0x40_0000),
            user_page(EntryLo::empty(), 0x80_0000),
        );
        let even = USER_VA - 0x1000;
        assert_eq!(translate(&mut state, even, MemAccess::Fetch), Err(Exccode::PNX));
        assert_eq!(state.csr.badv, even);
        assert_eq!(translate(&mut state, even, MemAccess::Read), Err(Exccode::PNR));
        assert_eq!(translate(&mut state, USER_VA, MemAccess::Write), Err(Exccode::PME));
        assert_eq!(state.csr.tlbehi, USER_VA & EHI_MASK);
        assert_eq!(TLBRERA_ISTLBR.ex(state.csr.tlbrera), 0);
    }

    #[test]
    fn test_privilege_fault() {
        let mut state = paged_state(3);
        let kernel = (EntryLo::V | EntryLo::D).with_ppn(0x40_0000);
        map_pair(&mut state, kernel, kernel.with_plv(2) | EntryLo::RPLV);
        assert_eq!(translate(&mut state, USER_VA - 0x1000, MemAccess::Read), Err(Exccode::PPI));
        assert_eq!(translate(&mut state, USER_VA, MemAccess::Read), Err(Exccode::PPI));

        state.csr.crmd = CRMD_PLV.dp(state.csr.crmd, 0);
        assert!(translate(&mut state, USER_VA - 0x1000, MemAccess::Read).is_ok());
        // RPLV requires an exact level match.
        assert_eq!(translate(&mut state, USER_VA, MemAccess::Read), Err(Exccode::PPI));
    }

    #[test]
    fn test_invalid_entry() {
        let mut state = paged_state(3);
        map_pair(&mut state, EntryLo::empty(), EntryLo::empty());
        assert_eq!(translate(&mut state, USER_VA, MemAccess::Fetch), Err(Exccode::PIF));
        state.tlb.invalidate_all();
        assert!(state.tlb.lookup(USER_VA, 5).is_none());
    }

    #[test]
    fn test_load_store_faults() {
        let mut state = CpuState::new();
        let mut guest = GuestMem::new(0x1000).unwrap();

        store(&mut state, &mut guest, 0x100, 4, 0xdead_beef).unwrap();
        assert_eq!(load(&mut state, &guest, 0x100, 2), Ok(0xbeef));
        assert_eq!(load(&mut state, &guest, 0x102, 1), Ok(0xad));

        assert_eq!(load(&mut state, &guest, 0x101, 4), Err(Exccode::ALE));
        assert_eq!(state.csr.badv, 0x101);
        assert_eq!(store(&mut state, &mut guest, 0x2000, 8, 0), Err(Exccode::ADEM));
        assert_eq!(state.csr.badv, 0x2000);
    }
}

//! Fetch breakpoints armed by the debugger.

use crate::config::BREAKPOINT_SLOTS;

#[derive(Debug, Clone, Default)]
pub struct BreakpointTable {
    slots: [Option<u64>; BREAKPOINT_SLOTS],
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the first free slot. Returns false when the table is full.
    pub fn arm(&mut self, addr: u64) -> bool {
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(addr);
                true
            }
            None => false,
        }
    }

    /// Frees every slot holding `addr`.
    pub fn disarm(&mut self, addr: u64) {
        for slot in self.slots.iter_mut() {
            if *slot == Some(addr) {
                *slot = None;
            }
        }
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.slots.contains(&Some(addr))
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.slots.iter().flatten().copied()
    }
}

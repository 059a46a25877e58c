//! A single hardware thread: fetch, decode, execute and fault recovery.

use std::sync::Arc;

use tracing::{error, trace};

use crate::debug::breakpoint::BreakpointTable;
use crate::error::*;
use crate::events::Events;
use crate::exception::{self, Exccode};
use crate::guest::GuestMem;
use crate::insn::*;
use crate::irq;
use crate::mmu::{self, MemAccess};
use crate::state::CpuState;
use crate::tcache::DecodeCache;

/// Why [`Hart::run`] handed control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Debugger input is waiting.
    YieldForMessage,
    /// The pc reached an armed breakpoint; that instruction has not run.
    BreakpointHit,
}

#[derive(Debug)]
pub struct Hart {
    pub state: CpuState,
    pub decoders: Vec<Arc<dyn Decoder>>,
    icache: DecodeCache,
}

impl Hart {
    pub fn new() -> Self {
        Self {
            state: CpuState::new(),
            decoders: vec![],
            icache: DecodeCache::new(),
        }
    }

    pub fn add_decoder(&mut self, set: InsnSet) {
        let decoder: Arc<dyn Decoder> = match set {
            InsnSet::Base => Arc::new(La64Decoder),
            InsnSet::Privileged => Arc::new(PrivilegedDecoder),
        };
        self.decoders.push(decoder);
    }

    pub fn decode(&self, raw: u32) -> Option<Decoded> {
        self.decoders.iter().find_map(|decoder| decoder.decode(raw))
    }

    /// Drops cached fetch translations. Needed after editing live TLB entries.
    pub fn flush_translation(&mut self) {
        self.state.tcache.flush();
    }

    /// Fetches and decodes the instruction at pc.
    pub fn fetch(&mut self, guest: &GuestMem) -> std::result::Result<(u32, Decoded), Exccode> {
        let pc = self.state.pc;
        if pc & 0x3 != 0 {
            self.state.csr.badv = pc;
            return Err(Exccode::ADEF);
        }

        let pa = match self.state.tcache.lookup(pc) {
            Some(pa) => pa,
            None => {
                let pa = mmu::translate(&mut self.state, pc, MemAccess::Fetch)?;
                self.state.tcache.insert(pc, pa);
                pa
            }
        };

        let raw = match guest.read_u32(pa) {
            Ok(raw) => raw,
            Err(_) => {
                self.state.csr.badv = pc;
                return Err(Exccode::ADEF);
            }
        };
        self.state.insn = raw;

        if let Some(&decoded) = self.icache.lookup(pc, raw) {
            self.state.counters.ic_hits += 1;
            return Ok((raw, decoded));
        }
        let Some(decoded) = self.decode(raw) else {
            trace!("unknown instruction at {:#x}: {:#010x}", pc, raw);
            return Err(Exccode::INE);
        };
        self.icache.insert(pc, raw, decoded);
        Ok((raw, decoded))
    }

    /// Delivers a pending interrupt, or retires one instruction, or takes the
    /// exception it raised. Only an undeliverable exception is an error.
    pub fn step(&mut self, guest: &mut GuestMem) -> Result<()> {
        if irq::has_pending_irq(&self.state) {
            self.state.exception = Some(Exccode::INT);
            return exception::do_interrupt(&mut self.state);
        }

        let (raw, (insn, executor)) = match self.fetch(guest) {
            Ok(fetched) => fetched,
            Err(cause) => return self.take_fault(cause),
        };

        trace!("pc@{:#x}: executing {:#010x}", self.state.pc, raw);
        match executor(&mut self.state, guest, &insn) {
            Ok(flow) => {
                self.state.pc = match flow {
                    Flow::Next => self.state.pc.wrapping_add(4),
                    Flow::Jump(target) => target,
                };
                self.state.gpr[0] = 0;
                self.state.counters.icount += 1;
                irq::tick_timer(&mut self.state);
                Ok(())
            }
            Err(cause) => self.take_fault(cause),
        }
    }

    fn take_fault(&mut self, cause: Exccode) -> Result<()> {
        self.state.gpr[0] = 0;
        self.state.exception = Some(cause);
        self.state.counters.faults += 1;
        exception::do_interrupt(&mut self.state).inspect_err(|e| {
            error!("cannot deliver {} at pc {:#x}: {}", cause, self.state.pc, e);
        })
    }

    /// Runs until debugger input arrives or a breakpoint is reached.
    pub fn run(
        &mut self,
        guest: &mut GuestMem,
        events: &Events,
        breakpoints: &BreakpointTable,
    ) -> Result<ExitReason> {
        loop {
            if events.has_message() {
                return Ok(ExitReason::YieldForMessage);
            }
            if breakpoints.contains(self.state.pc) {
                trace!("breakpoint hit at {:#x}", self.state.pc);
                return Ok(ExitReason::BreakpointHit);
            }
            self.step(guest)?;
        }
    }
}

impl Default for Hart {
    fn default() -> Self {
        Self::new()
    }
}

//! Interface for users to interact with the emulator.
//! Loading a kernel, free-running it, or handing it to a gdb session.

use tracing::{info, warn};

use crate::config::*;
use crate::debug::{GdbConfig, GdbServer};
use crate::error::*;
use crate::events::Events;
use crate::guest::GuestMem;
use crate::hart::Hart;
use crate::insn::InsnSet;
use crate::state::Counters;

#[derive(Debug)]
pub struct Emulator {
    pub hart: Hart,
    pub guest: GuestMem,
}

#[derive(Debug, Clone)]
pub struct EmulatorBuilder {
    ram_size: usize,
    decoders: Vec<InsnSet>,
}

impl EmulatorBuilder {
    pub fn ram_size(mut self, bytes: usize) -> Self {
        self.ram_size = bytes;
        self
    }

    pub fn decoder(mut self, set: InsnSet) -> Self {
        if !self.decoders.contains(&set) {
            self.decoders.push(set);
        }
        self
    }

    pub fn build(self) -> Result<Emulator> {
        let guest = GuestMem::new(self.ram_size)?;
        info!("guest ram: {} MiB", guest.size() >> 20);
        let mut hart = Hart::new();
        if self.decoders.is_empty() {
            warn!("no instruction set selected, every fetch will raise INE");
        }
        for set in self.decoders {
            hart.add_decoder(set);
        }
        Ok(Emulator { hart, guest })
    }
}

impl Emulator {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> EmulatorBuilder {
        EmulatorBuilder {
            ram_size: RAM_SIZE,
            decoders: vec![],
        }
    }

    /// Loads the kernel and points the pc at its entry.
    pub fn load_elf(&mut self, elf: &[u8]) -> Result<()> {
        let entry = crate::elf::load(&mut self.guest, elf)?;
        self.hart.state.pc = entry;
        Ok(())
    }

    /// Steps the hart without a debugger attached, for at most `max_insns`
    /// steps when given. Returns only on the step limit or a fatal exception.
    pub fn run(&mut self, max_insns: Option<u64>) -> Result<()> {
        let mut steps = 0u64;
        while max_insns.is_none_or(|max| steps < max) {
            self.hart.step(&mut self.guest)?;
            steps += 1;
        }
        info!("step limit reached at pc {:#x}", self.hart.state.pc);
        Ok(())
    }

    /// Waits for gdb and serves it until the session ends.
    pub fn serve_gdb(&mut self, config: GdbConfig) -> Result<()> {
        let events = Events::new();
        let mut server = GdbServer::listen(config, events)?;
        server.serve(&mut self.hart, &mut self.guest)
    }

    pub fn counters(&self) -> &Counters {
        &self.hart.state.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::tests::build_elf;
    use crate::log;

    #[test]
    fn test_build_load_and_run() {
        log::log_init(log::Level::Off);
        let mut emu = Emulator::new()
            .ram_size(0x2000_0000)
            .decoder(InsnSet::Base)
            .decoder(InsnSet::Base)
            .build()
            .unwrap();
        assert_eq!(emu.hart.decoders.len(), 1);
        assert_eq!(emu.guest.size(), 0x2000_0000);

        // addi.d $a0, $a0, 1 ; b -4
        let code = [0x84, 0x04, 0xc0, 0x02, 0xff, 0xff, 0xff, 0x53];
        // Linked in the cached window; loads at physical 0x0c000000, which
        // direct-address fetch reaches by dropping the high bits.
        emu.load_elf(&build_elf(0x9000_0000_0c00_0000, &code, 0)).unwrap();
        assert_eq!(emu.hart.state.pc, 0x9000_0000_0c00_0000);
        assert_eq!(emu.guest.read_u32(0x0c00_0000).unwrap(), 0x02c0_0484);

        emu.run(Some(10)).unwrap();
        assert_eq!(emu.hart.state.gpr[4], 5);
        assert_eq!(emu.counters().icount, 10);
    }

    #[test]
    fn test_faults_count_as_steps() {
        log::log_init(log::Level::Off);
        let mut emu = Emulator::new()
            .ram_size(0x2000_0000)
            .decoder(InsnSet::Base)
            .build()
            .unwrap();
        // Misaligned handler: every fetch faults back onto itself.
        emu.hart.state.pc = 0x1c00_0002;
        emu.hart.state.csr.eentry = 0x1c00_0002;
        emu.hart.state.csr.ecfg = 0;

        emu.run(Some(3)).unwrap();
        assert_eq!(emu.counters().faults, 3);
        assert_eq!(emu.counters().icount, 0);
    }
}

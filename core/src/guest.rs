//! Guest physical memory.
//!
//! RAM is a single anonymous mapping starting at physical address 0. All accessors
//! take physical addresses; virtual-to-physical translation happens in [`crate::mmu`].

use memmap2::{MmapMut, MmapOptions};
use tracing::{trace, warn};

use crate::error::*;

#[derive(Debug)]
pub struct GuestMem {
    ram: MmapMut,
}

impl GuestMem {
    pub fn new(size: usize) -> Result<Self> {
        let ram = MmapOptions::new().len(size).map_anon().map_err(|e| {
            warn!("Failed to create memory map of {:#x} bytes: {}", size, e);
            Error::IoError(e)
        })?;
        trace!("guest ram mapped, {:#x} bytes", size);
        Ok(Self { ram })
    }

    pub fn size(&self) -> usize {
        self.ram.len()
    }

    pub fn contains(&self, paddr: u64, len: usize) -> bool {
        paddr
            .checked_add(len as u64)
            .is_some_and(|end| end <= self.ram.len() as u64)
    }

    fn slice(&self, paddr: u64, len: usize) -> Result<&[u8]> {
        if !self.contains(paddr, len) {
            return Err(Error::MemAccessFault(paddr));
        }
        let start = paddr as usize;
        Ok(&self.ram[start..start + len])
    }

    fn slice_mut(&mut self, paddr: u64, len: usize) -> Result<&mut [u8]> {
        if !self.contains(paddr, len) {
            return Err(Error::MemAccessFault(paddr));
        }
        let start = paddr as usize;
        Ok(&mut self.ram[start..start + len])
    }

    /// Copies `data` into RAM at `paddr`.
    pub fn load_image(&mut self, paddr: u64, data: &[u8]) -> Result<()> {
        self.slice_mut(paddr, data.len())?.copy_from_slice(data);
        Ok(())
    }

    pub fn zero(&mut self, paddr: u64, len: usize) -> Result<()> {
        self.slice_mut(paddr, len)?.fill(0);
        Ok(())
    }

    /// Byte read that never fails: addresses outside RAM read as 0xff.
    pub fn read_u8_or_ones(&self, paddr: u64) -> u8 {
        self.read_u8(paddr).unwrap_or(0xff)
    }

    pub fn read_u8(&self, paddr: u64) -> Result<u8> {
        Ok(self.slice(paddr, 1)?[0])
    }

    pub fn write_u8(&mut self, paddr: u64, value: u8) -> Result<()> {
        self.slice_mut(paddr, 1)?[0] = value;
        Ok(())
    }

    pub fn read_u16(&self, paddr: u64) -> Result<u16> {
        let mut bytes = [0u8; 2];
        bytes.copy_from_slice(self.slice(paddr, 2)?);
        Ok(u16::from_le_bytes(bytes))
    }

    pub fn write_u16(&mut self, paddr: u64, value: u16) -> Result<()> {
        self.slice_mut(paddr, 2)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn read_u32(&self, paddr: u64) -> Result<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.slice(paddr, 4)?);
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn write_u32(&mut self, paddr: u64, value: u32) -> Result<()> {
        self.slice_mut(paddr, 4)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn read_u64(&self, paddr: u64) -> Result<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.slice(paddr, 8)?);
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn write_u64(&mut self, paddr: u64, value: u64) -> Result<()> {
        self.slice_mut(paddr, 8)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

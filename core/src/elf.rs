//! ELF64 kernel loading

use tracing::{debug, info, warn};

use crate::config::ELF_LOAD_MASK;
use crate::error::*;
use crate::guest::GuestMem;

/// Size of the ELF identification array.
pub const EI_NIDENT: usize = 16;
/// Magic number for ELF files.
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
/// LoongArch machine type.
pub const EM_LOONGARCH: u16 = 0x102;
/// Index of ELF class in e_ident.
pub const EI_CLASS: usize = 4;
/// Index of data encoding in e_ident.
pub const EI_DATA: usize = 5;

/// 64-bit ELF class.
pub const ELF_CLASS_64: u8 = 2;
/// Two's complement, little-endian.
pub const ELF_DATA_LSB: u8 = 1;

/// Loadable segment type.
pub const PT_LOAD: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ElfHeader {
    pub e_ident: [u8; EI_NIDENT],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

impl ElfHeader {
    pub fn from_bytes(src: &[u8]) -> Result<Self> {
        if src.len() < size_of::<Self>() {
            warn!("ELF header truncated: expected {}, got {}", size_of::<Self>(), src.len());
            return Err(Error::InvalidElf("truncated header"));
        }
        // SAFETY: length checked above; every bit pattern is a valid header.
        let res: Self = unsafe { std::ptr::read_unaligned(src.as_ptr() as *const Self) };

        if res.e_ident[..4] != ELF_MAGIC {
            warn!("Invalid ELF magic number: {:?}", &res.e_ident[..4]);
            return Err(Error::InvalidElf("bad magic"));
        }
        if res.e_ident[EI_CLASS] != ELF_CLASS_64 {
            warn!("Unsupported ELF class: expected {}, got {}", ELF_CLASS_64, res.e_ident[EI_CLASS]);
            return Err(Error::InvalidElf("not ELF64"));
        }
        if res.e_ident[EI_DATA] != ELF_DATA_LSB {
            return Err(Error::InvalidElf("not little-endian"));
        }
        if res.e_machine != EM_LOONGARCH {
            warn!("Unsupported machine type: expected {:#x}, got {:#x}", EM_LOONGARCH, res.e_machine);
            return Err(Error::InvalidElf("not a LoongArch binary"));
        }

        Ok(res)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

impl ProgramHeader {
    pub fn from_bytes(src: &[u8]) -> Result<Self> {
        if src.len() < size_of::<Self>() {
            return Err(Error::InvalidElf("truncated program header"));
        }
        // SAFETY: as for `ElfHeader::from_bytes`.
        Ok(unsafe { std::ptr::read_unaligned(src.as_ptr() as *const Self) })
    }
}

/// Copies every loadable segment into guest RAM at its masked physical address
/// and returns the entry point.
pub fn load(mem: &mut GuestMem, elf: &[u8]) -> Result<u64> {
    let ehdr = ElfHeader::from_bytes(elf)?;
    debug!("{:#x?}", ehdr);

    for i in 0..ehdr.e_phnum as usize {
        let offset = (ehdr.e_phentsize as usize)
            .checked_mul(i)
            .and_then(|rel| rel.checked_add(usize::try_from(ehdr.e_phoff).ok()?))
            .ok_or(Error::InvalidElf("program header offset overflows"))?;
        let phdr = ProgramHeader::from_bytes(elf.get(offset..).unwrap_or_default())?;
        if phdr.p_type != PT_LOAD {
            continue;
        }
        if phdr.p_filesz > phdr.p_memsz {
            return Err(Error::InvalidElf("segment file size exceeds memory size"));
        }

        let start = phdr.p_offset as usize;
        let data = start
            .checked_add(phdr.p_filesz as usize)
            .and_then(|end| elf.get(start..end))
            .ok_or(Error::InvalidElf("segment past end of file"))?;
        let paddr = phdr.p_paddr & ELF_LOAD_MASK;
        mem.load_image(paddr, data)?;
        mem.zero(paddr + phdr.p_filesz, (phdr.p_memsz - phdr.p_filesz) as usize)?;
        debug!(
            "segment {}: {:#x} bytes at {:#x} (+{:#x} zeroed)",
            i,
            phdr.p_filesz,
            paddr,
            phdr.p_memsz - phdr.p_filesz
        );
    }

    info!("loaded kernel, entry {:#x}", ehdr.e_entry);
    Ok(ehdr.e_entry)
}

/// Default gdb port
pub const GDB_PORT: u16 = 1234;

/// Bad address error
pub const EFAULT: u8 = 14;

/// Number of fetch breakpoints the debugger may arm at once.
pub const BREAKPOINT_SLOTS: usize = 4;

pub const PAGE_BITS: u32 = 12;
pub const PAGE_SIZE: u64 = 1 << PAGE_BITS;
pub const PAGE_MASK: u64 = !(PAGE_SIZE - 1);

/// Translation cache: 256 direct-mapped buckets.
pub const TC_BITS: u32 = 8;
pub const TC_NUM: usize = 1 << TC_BITS;

/// Decode cache: 16384 direct-mapped buckets, indexed by word address.
pub const IC_BITS: u32 = 14;
pub const IC_NUM: usize = 1 << IC_BITS;

pub const TLB_ENTRIES: usize = 64;

pub const PHYS_ADDR_BITS: u32 = 48;
pub const PHYS_MASK: u64 = (1 << PHYS_ADDR_BITS) - 1;

/// Default guest RAM size (256 MiB)
pub const RAM_SIZE: usize = 0x1000_0000;

/// Physical load address mask applied to `p_paddr` of ELF segments.
pub const ELF_LOAD_MASK: u64 = 0x0fff_ffff;

pub const RESET_PC: u64 = 0x1c00_0000;

/// Offset of the debug exception entry from EENTRY.
pub const DEBUG_VECTOR_OFFSET: u64 = 0x480;

/// Receive buffer limit for debugger input.
pub const RECEIVE_BUF_CAPACITY: usize = 0x10000;
/// Largest packet the stub will frame.
pub const SEND_BUF_CAPACITY: usize = 0x100000;

/// Filler for the two register slots gdb expects but the CPU does not model.
pub const REG_PLACEHOLDER: u64 = 0x1234_5678_1234_5678;

/// Thread id reported for `qC`.
pub const GDB_THREAD_ID: &str = "2222";

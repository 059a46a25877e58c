use thiserror::Error;

use crate::exception::Exccode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid ELF file: {0}")]
    InvalidElf(&'static str),
    /// (physical address)
    #[error("Memory access fault at {0:#x}")]
    MemAccessFault(u64),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    // Fatal guest conditions
    #[error("Exception {0} has no vectoring support")]
    UnsupportedException(Exccode),
    #[error("Exception dispatch without a raised cause at pc {0:#x}")]
    NoPendingException(u64),

    // Debug session
    #[error("Packet does not begin with '$': {0:?}")]
    BadFrameStart(String),
    #[error("Checksum mismatch, checksum: {computed:02x} receive_checksum: {received:02x}")]
    ChecksumMismatch { computed: u8, received: u8 },
    #[error("Checksum digits are not hex: {0:?}")]
    MalformedChecksum(String),
    #[error("Packet exceeds the receive buffer ({0} bytes)")]
    PacketTooLarge(usize),
    #[error("Debugger connection closed")]
    Disconnected,
}

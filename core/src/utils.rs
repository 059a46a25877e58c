/// Sign-extends the low `$bits` bits of `$val` to an `i64`.
#[macro_export]
macro_rules! sign_extend {
    ($val:expr, $bits:expr) => {
        ((($val as u64) << (64 - $bits)) as i64 >> (64 - $bits))
    };
}

/// Bit field inside a 64-bit register, `len` bits wide starting at `shift`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub shift: u32,
    pub len: u32,
}

impl Field {
    pub const fn new(shift: u32, len: u32) -> Self {
        Self { shift, len }
    }

    pub const fn mask(self) -> u64 {
        if self.len >= 64 {
            u64::MAX
        } else {
            ((1u64 << self.len) - 1) << self.shift
        }
    }

    /// Extracts the field from `reg`.
    pub const fn ex(self, reg: u64) -> u64 {
        (reg & self.mask()) >> self.shift
    }

    /// Returns `reg` with the field replaced by `value` (truncated to the field width).
    pub const fn dp(self, reg: u64, value: u64) -> u64 {
        (reg & !self.mask()) | ((value << self.shift) & self.mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_roundtrip() {
        let plv = Field::new(0, 2);
        let vs = Field::new(16, 3);
        let reg = vs.dp(plv.dp(0, 3), 7);
        assert_eq!(reg, 0x7_0003);
        assert_eq!(plv.ex(reg), 3);
        assert_eq!(vs.ex(reg), 7);
        // Wider values are truncated.
        assert_eq!(plv.dp(0, 0xff), 3);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend!(0xfffu32, 12), -1);
        assert_eq!(sign_extend!(0x7ffu32, 12), 0x7ff);
        assert_eq!(sign_extend!(0x8000u32, 16), -0x8000);
    }
}

//! Remote serial protocol framing: `$<payload>#<hh>`.

use std::fmt::Write;

use crate::error::*;

pub const ACK: u8 = b'+';
pub const NACK: u8 = b'-';
/// Out-of-band break request sent by gdb on Ctrl-C.
pub const INTERRUPT: u8 = 0x03;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Interrupt,
    Packet(Vec<u8>),
}

pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Wraps `payload` for the wire.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(b'$');
    out.extend_from_slice(payload);
    out.extend_from_slice(format!("#{:02x}", checksum(payload)).as_bytes());
    out
}

/// Two lowercase hex digits per byte.
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Parses an unsigned hex number of at most 16 digits.
pub fn parse_hex(digits: &[u8]) -> Option<u64> {
    if digits.is_empty() || digits.len() > 16 {
        return None;
    }
    let text = std::str::from_utf8(digits).ok()?;
    u64::from_str_radix(text, 16).ok()
}

/// Whether [`next_frame`] would produce something other than `Ok(None)`.
pub fn frame_ready(buf: &[u8]) -> bool {
    let Some(start) = buf.iter().position(|&b| b != ACK) else {
        return false;
    };
    let rest = &buf[start..];
    if rest[0] != b'$' {
        // Interrupt byte, or garbage that is rejected at once.
        return true;
    }
    rest.iter()
        .position(|&b| b == b'#')
        .is_some_and(|hash| rest.len() >= hash + 3)
}

/// Removes the next frame from the front of `buf`.
///
/// Leading acks are dropped. `Ok(None)` means only part of a frame has arrived.
/// On error the offending bytes are already removed, so a caller that chooses to
/// carry on can call again.
pub fn next_frame(buf: &mut Vec<u8>) -> Result<Option<Frame>> {
    let skip = buf.iter().take_while(|&&b| b == ACK).count();
    buf.drain(..skip);

    match buf.first() {
        None => return Ok(None),
        Some(&INTERRUPT) => {
            buf.remove(0);
            return Ok(Some(Frame::Interrupt));
        }
        Some(&b'$') => {}
        Some(_) => {
            let end = buf
                .iter()
                .position(|&b| b == b'$' || b == INTERRUPT)
                .unwrap_or(buf.len());
            let garbage: Vec<u8> = buf.drain(..end).collect();
            return Err(Error::BadFrameStart(String::from_utf8_lossy(&garbage).into_owned()));
        }
    }

    let Some(hash) = buf.iter().position(|&b| b == b'#') else {
        return Ok(None);
    };
    if buf.len() < hash + 3 {
        return Ok(None);
    }

    let raw: Vec<u8> = buf.drain(..hash + 3).collect();
    let payload = &raw[1..hash];
    let digits = &raw[hash + 1..];
    let Some(received) = parse_hex(digits) else {
        return Err(Error::MalformedChecksum(String::from_utf8_lossy(digits).into_owned()));
    };
    let computed = checksum(payload);
    if received as u8 != computed {
        return Err(Error::ChecksumMismatch { computed, received: received as u8 });
    }
    Ok(Some(Frame::Packet(payload.to_vec())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_frames() {
        assert_eq!(frame(b"OK"), b"$OK#9a");
        assert_eq!(frame(b"S05"), b"$S05#b8");
        assert_eq!(frame(b"E14"), b"$E14#aa");
        assert_eq!(frame(b""), b"$#00");
        assert_eq!(frame(b"QC2222"), b"$QC2222#5c");
    }

    #[test]
    fn test_strips_acks_and_keeps_partial() {
        let mut buf = b"++$g#6".to_vec();
        assert_eq!(next_frame(&mut buf).unwrap(), None);
        assert_eq!(buf, b"$g#6");

        buf.push(b'7');
        buf.extend_from_slice(b"+$?#3F");
        assert_eq!(next_frame(&mut buf).unwrap(), Some(Frame::Packet(b"g".to_vec())));
        // Upper-case digits are accepted.
        assert_eq!(next_frame(&mut buf).unwrap(), Some(Frame::Packet(b"?".to_vec())));
        assert!(buf.is_empty());
        assert_eq!(next_frame(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_frame_ready() {
        assert!(!frame_ready(b""));
        assert!(!frame_ready(b"++"));
        assert!(!frame_ready(b"+$c#6"));
        assert!(frame_ready(b"+$c#63"));
        assert!(frame_ready(&[ACK, INTERRUPT]));
        assert!(frame_ready(b"junk"));
    }

    #[test]
    fn test_interrupt_byte() {
        let mut buf = vec![ACK, INTERRUPT, b'$'];
        assert_eq!(next_frame(&mut buf).unwrap(), Some(Frame::Interrupt));
        assert_eq!(buf, b"$");
    }

    #[test]
    fn test_bad_frames() {
        let mut buf = b"xyz$c#63".to_vec();
        assert!(matches!(next_frame(&mut buf), Err(Error::BadFrameStart(s)) if s == "xyz"));
        assert_eq!(next_frame(&mut buf).unwrap(), Some(Frame::Packet(b"c".to_vec())));

        let mut buf = b"$c#64$c#63".to_vec();
        assert!(matches!(
            next_frame(&mut buf),
            Err(Error::ChecksumMismatch { computed: 0x63, received: 0x64 })
        ));
        assert_eq!(next_frame(&mut buf).unwrap(), Some(Frame::Packet(b"c".to_vec())));

        let mut buf = b"$c#zz".to_vec();
        assert!(matches!(next_frame(&mut buf), Err(Error::MalformedChecksum(_))));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(hex_encode(&[0x00, 0xab, 0x7f]), "00ab7f");
        assert_eq!(parse_hex(b"1c000000"), Some(0x1c00_0000));
        assert_eq!(parse_hex(b"fffffffffffffffc"), Some(0xffff_ffff_ffff_fffc));
        assert_eq!(parse_hex(b"10000000000000000"), None);
        assert_eq!(parse_hex(b""), None);
        assert_eq!(parse_hex(b"12g"), None);
    }

    proptest! {
        #[test]
        fn prop_framed_payload_parses(payload in proptest::collection::vec(
            any::<u8>().prop_filter("framing bytes", |b| !b"$#".contains(b)), 0..256)) {
            let wire = frame(&payload);
            let digits = &wire[wire.len() - 2..];
            let want = format!("{:02x}", checksum(&payload));
            prop_assert_eq!(digits, want.as_bytes());

            let mut buf = wire.clone();
            prop_assert_eq!(next_frame(&mut buf).unwrap(), Some(Frame::Packet(payload.clone())));
            prop_assert!(buf.is_empty());
        }

        #[test]
        fn prop_corrupted_payload_rejected(
            payload in proptest::collection::vec(b'a'..=b'z', 1..64),
            index in any::<prop::sample::Index>(),
            delta in 1u8..=25,
        ) {
            let mut wire = frame(&payload);
            let at = 1 + index.index(payload.len());
            wire[at] = b'a' + (wire[at] - b'a' + delta) % 26;
            let mut buf = wire;
            let rejected = matches!(next_frame(&mut buf), Err(Error::ChecksumMismatch { .. }));
            prop_assert!(rejected);
        }
    }
}

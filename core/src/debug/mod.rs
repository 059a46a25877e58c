//! gdb remote stub.
//!
//! The stub and the CPU share one thread. The server handles buffered packets
//! while the hart is halted, and while it runs the hart yields back whenever the
//! transport raises the message flag or a breakpoint is reached.

use gdbstub::common::Signal;
use tracing::{debug, info, trace, warn};

use crate::config::*;
use crate::error::*;
use crate::events::Events;
use crate::guest::GuestMem;
use crate::hart::{ExitReason, Hart};

pub mod breakpoint;
pub mod conn;
pub mod packet;

use breakpoint::BreakpointTable;
use conn::{TcpConn, Transport};
use packet::{Frame, hex_encode, parse_hex};

/// Addresses gdb probes that must not be read.
const GUARDED_ADDRS: [u64; 2] = [0, 0xffff_ffff_ffff_fffc];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GdbConfig {
    pub port: u16,
    /// Answer bad frames with `-` and keep going instead of ending the session.
    pub nack_on_error: bool,
}

impl Default for GdbConfig {
    fn default() -> Self {
        Self {
            port: GDB_PORT,
            nack_on_error: false,
        }
    }
}

/// What the session loop does after a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Continue,
    Kill,
}

fn stop_reply() -> String {
    format!("S{:02x}", Signal::SIGTRAP.0)
}

#[derive(Debug)]
pub struct GdbServer<T: Transport> {
    conn: T,
    events: Events,
    pub breakpoints: BreakpointTable,
    running: bool,
    rx_buf: Vec<u8>,
    nack_on_error: bool,
}

impl GdbServer<TcpConn> {
    /// Blocks until a debugger connects on `config.port`.
    pub fn listen(config: GdbConfig, events: Events) -> Result<Self> {
        let conn = TcpConn::accept(config.port, events.clone())?;
        Ok(Self::new(conn, events, config))
    }
}

impl<T: Transport> GdbServer<T> {
    pub fn new(conn: T, events: Events, config: GdbConfig) -> Self {
        Self {
            conn,
            events,
            breakpoints: BreakpointTable::new(),
            running: false,
            rx_buf: Vec::with_capacity(RECEIVE_BUF_CAPACITY),
            nack_on_error: config.nack_on_error,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Runs the session until gdb sends `k`. Framing errors end it unless
    /// NACK mode is on; a dropped connection ends it with `Error::Disconnected`.
    pub fn serve(&mut self, hart: &mut Hart, guest: &mut GuestMem) -> Result<()> {
        info!("gdb session started, cpu halted at {:#x}", hart.state.pc);
        loop {
            if self.events.has_message() {
                self.fill(false)?;
            }

            match self.poll_packet(hart, guest)? {
                Some(Control::Kill) => {
                    info!("gdb session killed");
                    return Ok(());
                }
                Some(Control::Continue) => {}
                None if !self.running => {
                    // Halted and nothing complete to act on.
                    self.fill(true)?;
                    continue;
                }
                None => {}
            }

            // Buffered input is handled before the cpu gets to run again.
            if self.running && !packet::frame_ready(&self.rx_buf) {
                match hart.run(guest, &self.events, &self.breakpoints)? {
                    ExitReason::BreakpointHit => {
                        debug!("stopped at breakpoint {:#x}", hart.state.pc);
                        self.send_packet(stop_reply().as_bytes())?;
                        self.running = false;
                    }
                    ExitReason::YieldForMessage => {}
                }
            }
        }
    }

    fn fill(&mut self, wait: bool) -> Result<()> {
        let room = RECEIVE_BUF_CAPACITY.saturating_sub(self.rx_buf.len());
        if room == 0 {
            if self.nack_on_error {
                warn!("receive buffer full, dropping {} bytes", self.rx_buf.len());
                self.rx_buf.clear();
                self.conn.send(&[packet::NACK])?;
                return Ok(());
            }
            return Err(Error::PacketTooLarge(self.rx_buf.len()));
        }
        self.conn.recv(&mut self.rx_buf, room, wait)?;
        Ok(())
    }

    /// Handles at most one frame from the receive buffer.
    fn poll_packet(&mut self, hart: &Hart, guest: &GuestMem) -> Result<Option<Control>> {
        let frame = match packet::next_frame(&mut self.rx_buf) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(e) if self.nack_on_error => {
                warn!("rejecting frame: {}", e);
                self.conn.send(&[packet::NACK])?;
                return Ok(Some(Control::Continue));
            }
            Err(e) => return Err(e),
        };

        match frame {
            Frame::Interrupt => {
                debug!("interrupted at {:#x}", hart.state.pc);
                self.running = false;
                self.send_packet(stop_reply().as_bytes())?;
                Ok(Some(Control::Continue))
            }
            Frame::Packet(payload) => self.handle_message(&payload, hart, guest).map(Some),
        }
    }

    fn send_packet(&mut self, payload: &[u8]) -> Result<()> {
        trace!("-> {}", String::from_utf8_lossy(payload));
        self.conn.send(&packet::frame(payload))
    }

    fn reply(&mut self, payload: &[u8]) -> Result<Control> {
        self.conn.send(&[packet::ACK])?;
        self.send_packet(payload)?;
        Ok(Control::Continue)
    }

    fn handle_message(&mut self, msg: &[u8], hart: &Hart, guest: &GuestMem) -> Result<Control> {
        trace!("<- {}", String::from_utf8_lossy(msg));
        let Some((&cmd, args)) = msg.split_first() else {
            return self.reply(b"");
        };

        match cmd {
            b'?' => self.reply(stop_reply().as_bytes()),
            b'g' => {
                let regs = read_registers(hart);
                self.reply(regs.as_bytes())
            }
            b'm' => match read_memory(guest, args) {
                Some(hex) => self.reply(hex.as_bytes()),
                None => self.reply(b""),
            },
            b'Z' => match breakpoint_addr(args) {
                Some(addr) if self.breakpoints.arm(addr) => {
                    debug!("breakpoint armed at {:#x}", addr);
                    self.reply(b"OK")
                }
                Some(addr) => {
                    warn!("no free breakpoint slot for {:#x}", addr);
                    self.reply(b"")
                }
                None => self.reply(b""),
            },
            b'z' => match breakpoint_addr(args) {
                Some(addr) => {
                    self.breakpoints.disarm(addr);
                    debug!("breakpoint removed at {:#x}", addr);
                    self.reply(b"OK")
                }
                None => self.reply(b""),
            },
            b'c' if args.is_empty() => {
                self.running = true;
                self.reply(b"OK")
            }
            b'q' => {
                if args == b"C" {
                    self.reply(format!("QC{}", GDB_THREAD_ID).as_bytes())
                } else if args.starts_with(b"Attached") {
                    self.reply(b"0")
                } else {
                    self.reply(b"")
                }
            }
            b'k' => {
                self.conn.send(&[packet::ACK])?;
                Ok(Control::Kill)
            }
            _ => self.reply(b""),
        }
    }
}

/// r0-r31, a placeholder, pc, another placeholder; each as little-endian bytes.
fn read_registers(hart: &Hart) -> String {
    let state = &hart.state;
    let mut bytes = Vec::with_capacity(35 * 8);
    for reg in state.gpr.iter() {
        bytes.extend_from_slice(&reg.to_le_bytes());
    }
    bytes.extend_from_slice(&REG_PLACEHOLDER.to_le_bytes());
    bytes.extend_from_slice(&state.pc.to_le_bytes());
    bytes.extend_from_slice(&REG_PLACEHOLDER.to_le_bytes());
    hex_encode(&bytes)
}

/// `addr,len`. `None` means an empty reply.
fn read_memory(guest: &GuestMem, args: &[u8]) -> Option<String> {
    let (addr, len) = split_pair(args)?;
    if GUARDED_ADDRS.contains(&addr) {
        return Some(format!("E{:02}", EFAULT));
    }
    let len = usize::try_from(len).ok()?;
    if len.checked_mul(2)?.checked_add(4)? > SEND_BUF_CAPACITY {
        warn!("memory read of {} bytes exceeds the send buffer", len);
        return None;
    }
    let bytes: Vec<u8> = (0..len as u64)
        .map(|i| guest.read_u8_or_ones(addr.wrapping_add(i)))
        .collect();
    Some(hex_encode(&bytes))
}

/// `0,addr,kind` for software breakpoints; other types are unsupported.
fn breakpoint_addr(args: &[u8]) -> Option<u64> {
    let rest = args.strip_prefix(b"0,")?;
    split_pair(rest).map(|(addr, _)| addr)
}

fn split_pair(args: &[u8]) -> Option<(u64, u64)> {
    let comma = args.iter().position(|&b| b == b',')?;
    Some((parse_hex(&args[..comma])?, parse_hex(&args[comma + 1..])?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::InsnSet;
    use crate::log;
    use super::conn::MockConn;
    use super::packet::frame;

    const BASE: u64 = 0x1c00_0000;
    // addi.d $a0, $a0, 1
    const ADDI_A0_1: u32 = 0x02c0_0484;
    // b 0
    const SELF_LOOP: u32 = 0x5000_0000;

    fn setup(program: &[u32]) -> (Hart, GuestMem) {
        log::log_init(log::Level::Off);
        let mut hart = Hart::new();
        hart.add_decoder(InsnSet::Base);
        let mut guest = GuestMem::new(0x2000_0000).unwrap();
        for (i, word) in program.iter().enumerate() {
            guest.write_u32(BASE + 4 * i as u64, *word).unwrap();
        }
        (hart, guest)
    }

    fn server(chunks: &[&[u8]], nack: bool) -> GdbServer<MockConn> {
        let events = Events::new();
        let conn = MockConn::new(events.clone(), chunks);
        let config = GdbConfig {
            nack_on_error: nack,
            ..Default::default()
        };
        GdbServer::new(conn, events, config)
    }

    /// Ack followed by a framed reply.
    fn acked(payload: &str) -> Vec<u8> {
        let mut out = vec![b'+'];
        out.extend(frame(payload.as_bytes()));
        out
    }

    fn replies(payloads: &[&str]) -> Vec<u8> {
        payloads.iter().flat_map(|p| acked(p)).collect()
    }

    #[test]
    fn test_queries() {
        let (mut hart, mut guest) = setup(&[]);
        let mut gdb = server(&[b"+$?#3f", b"$qC#b4$qAttached:1#fa", b"$Hg0#df$qSupported#37", b"$k#6b"], false);
        gdb.serve(&mut hart, &mut guest).unwrap();

        let mut expected = replies(&["S05", "QC2222", "0", "", ""]);
        expected.push(b'+');
        assert_eq!(gdb.conn.sent, expected);
    }

    #[test]
    fn test_read_registers() {
        let (mut hart, mut guest) = setup(&[]);
        hart.state.gpr[1] = 0x1122_3344_5566_7788;
        let mut gdb = server(&[b"$g#67", b"$k#6b"], false);
        gdb.serve(&mut hart, &mut guest).unwrap();

        let sent = String::from_utf8(gdb.conn.sent.clone()).unwrap();
        // "+$" <560 hex> "#hh" "+"
        let regs = &sent[2..2 + 560];
        assert_eq!(sent.len(), 2 + 560 + 3 + 1);
        assert_eq!(&regs[..16], "0000000000000000");
        assert_eq!(&regs[16..32], "8877665544332211");
        assert_eq!(&regs[32 * 16..33 * 16], "7856341278563412");
        assert_eq!(&regs[33 * 16..34 * 16], "0000001c00000000");
        assert_eq!(&regs[34 * 16..], "7856341278563412");
    }

    #[test]
    fn test_read_memory() {
        let (mut hart, mut guest) = setup(&[ADDI_A0_1]);
        let chunks: Vec<Vec<u8>> = [
            "m1c000000,4",
            "m0,4",
            "mfffffffffffffffc,4",
            "m1c000000",
            "m1c000000,100000",
            "mffffffffffffffffc,4",
            "k",
        ]
            .iter()
            .map(|p| frame(p.as_bytes()))
            .collect();
        let chunks: Vec<&[u8]> = chunks.iter().map(|c| c.as_slice()).collect();
        let mut gdb = server(&chunks, false);
        gdb.serve(&mut hart, &mut guest).unwrap();

        // 17 address digits do not fit an address: empty, not E14.
        let mut expected = replies(&["8404c002", "E14", "E14", "", "", ""]);
        expected.push(b'+');
        assert_eq!(gdb.conn.sent, expected);
    }

    #[test]
    fn test_breakpoint_commands() {
        let (mut hart, mut guest) = setup(&[]);
        let chunks: Vec<Vec<u8>> = [
            "Z0,1000,4", "Z0,1004,4", "Z0,1008,4", "Z0,100c,4", "Z0,1010,4", "Z1,2000,4",
            "z0,1004,4", "z0,dead,4", "z2,1000,4",
        ]
        .iter()
        .map(|p| frame(p.as_bytes()))
        .chain(std::iter::once(b"$k#6b".to_vec()))
        .collect();
        let chunks: Vec<&[u8]> = chunks.iter().map(|c| c.as_slice()).collect();
        let mut gdb = server(&chunks, false);
        gdb.serve(&mut hart, &mut guest).unwrap();

        let mut expected = replies(&["OK", "OK", "OK", "OK", "", "", "OK", "OK", ""]);
        expected.push(b'+');
        assert_eq!(gdb.conn.sent, expected);

        let mut armed: Vec<u64> = gdb.breakpoints.iter().collect();
        armed.sort_unstable();
        assert_eq!(armed, vec![0x1000, 0x1008, 0x100c]);
    }

    #[test]
    fn test_continue_to_breakpoint() {
        let (mut hart, mut guest) = setup(&[ADDI_A0_1, ADDI_A0_1, ADDI_A0_1, SELF_LOOP]);
        let bp = frame(b"Z0,1c000008,4");
        let mut gdb = server(&[&bp, b"$c#63"], false);

        // The script ends after the stop, which reads as a disconnect.
        let err = gdb.serve(&mut hart, &mut guest).unwrap_err();
        assert!(matches!(err, Error::Disconnected));

        let mut expected = replies(&["OK", "OK"]);
        expected.extend(frame(b"S05"));
        assert_eq!(gdb.conn.sent, expected);
        assert_eq!(hart.state.pc, BASE + 8);
        assert_eq!(hart.state.gpr[4], 2);
        assert!(!gdb.is_running());
    }

    #[test]
    fn test_interrupt_halts_running_cpu() {
        let (mut hart, mut guest) = setup(&[SELF_LOOP]);
        let mut gdb = server(&[b"$c#63", &[packet::INTERRUPT], b"$?#3f", b"$k#6b"], false);
        gdb.serve(&mut hart, &mut guest).unwrap();

        let mut expected = acked("OK");
        expected.extend(frame(b"S05"));
        expected.extend(acked("S05"));
        expected.push(b'+');
        assert_eq!(gdb.conn.sent, expected);
        assert!(!gdb.is_running());
    }

    #[test]
    fn test_interrupt_in_same_chunk_as_continue() {
        let (mut hart, mut guest) = setup(&[ADDI_A0_1, ADDI_A0_1, ADDI_A0_1, SELF_LOOP]);
        let bp = frame(b"Z0,1c000008,4");
        let mut gdb = server(&[&bp, b"$c#63\x03"], false);

        let err = gdb.serve(&mut hart, &mut guest).unwrap_err();
        assert!(matches!(err, Error::Disconnected));

        // One stop reply, for the interrupt; the cpu never reached the breakpoint.
        let mut expected = replies(&["OK", "OK"]);
        expected.extend(frame(b"S05"));
        assert_eq!(gdb.conn.sent, expected);
        assert_eq!(hart.state.counters.icount, 0);
        assert_eq!(hart.state.pc, BASE);
        assert!(!gdb.is_running());
    }

    #[test]
    fn test_continue_with_address_is_ignored() {
        let (mut hart, mut guest) = setup(&[SELF_LOOP]);
        let c = frame(b"c1c000000");
        let mut gdb = server(&[&c, b"$k#6b"], false);
        gdb.serve(&mut hart, &mut guest).unwrap();
        assert!(!gdb.is_running());
        assert_eq!(hart.state.counters.icount, 0);
    }

    #[test]
    fn test_partial_frames_are_buffered() {
        let (mut hart, mut guest) = setup(&[]);
        let mut gdb = server(&[b"$q", b"C#b", b"4", b"$k#6b"], false);
        gdb.serve(&mut hart, &mut guest).unwrap();
        let mut expected = acked("QC2222");
        expected.push(b'+');
        assert_eq!(gdb.conn.sent, expected);
    }

    #[test]
    fn test_bad_frames_are_fatal() {
        let (mut hart, mut guest) = setup(&[]);
        let mut gdb = server(&[b"$?#00"], false);
        let err = gdb.serve(&mut hart, &mut guest).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { computed: 0x3f, received: 0 }));

        let mut gdb = server(&[b"junk"], false);
        let err = gdb.serve(&mut hart, &mut guest).unwrap_err();
        assert!(matches!(err, Error::BadFrameStart(_)));
    }

    #[test]
    fn test_nack_mode_recovers() {
        let (mut hart, mut guest) = setup(&[]);
        let mut gdb = server(&[b"$?#00", b"junk$?#3f", b"$k#6b"], true);
        gdb.serve(&mut hart, &mut guest).unwrap();

        let mut expected = vec![b'-', b'-'];
        expected.extend(acked("S05"));
        expected.push(b'+');
        assert_eq!(gdb.conn.sent, expected);
    }
}

//! Byte transport between the debugger and the stub.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use tracing::{debug, info, trace, warn};

use crate::error::*;
use crate::events::Events;

pub trait Transport {
    /// Appends received bytes to `buf`, at most `limit` of them. With `wait` set,
    /// blocks until at least one byte is available. A closed peer is
    /// `Error::Disconnected`.
    fn recv(&mut self, buf: &mut Vec<u8>, limit: usize, wait: bool) -> Result<usize>;

    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

/// A single accepted gdb client.
///
/// A reader thread owns a clone of the socket, forwards every chunk over a
/// channel and raises the message flag. The control thread drains the channel
/// only when it chooses to.
#[derive(Debug)]
pub struct TcpConn {
    stream: TcpStream,
    chunks: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    events: Events,
}

impl TcpConn {
    /// Waits for one client on `port`. The listener is closed once it connects.
    pub fn accept(port: u16, events: Events) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        info!("waiting for gdb on port {}", port);
        let (stream, peer) = listener.accept()?;
        drop(listener);
        info!("gdb connected from {}", peer);

        stream.set_nodelay(true)?;
        set_keepalive(&stream)?;

        let reader = stream.try_clone()?;
        let (tx, chunks) = mpsc::channel();
        let notify = events.clone();
        thread::Builder::new()
            .name("gdb-reader".into())
            .spawn(move || {
                let mut reader = reader;
                let mut buf = [0u8; 4096];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                            notify.notify_message();
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            warn!("gdb read failed: {}", e);
                            break;
                        }
                    }
                }
                debug!("gdb reader exiting");
                drop(tx);
                // Wake the control loop so it sees the closed channel.
                notify.notify_message();
            })?;

        Ok(Self {
            stream,
            chunks,
            pending: vec![],
            events,
        })
    }

    fn move_pending(&mut self, buf: &mut Vec<u8>, limit: usize) -> usize {
        let n = self.pending.len().min(limit);
        buf.extend(self.pending.drain(..n));
        n
    }
}

impl Transport for TcpConn {
    fn recv(&mut self, buf: &mut Vec<u8>, limit: usize, wait: bool) -> Result<usize> {
        self.events.take_message();

        let mut moved = self.move_pending(buf, limit);
        let mut closed = false;
        while moved < limit {
            let chunk = if wait && moved == 0 {
                match self.chunks.recv() {
                    Ok(chunk) => chunk,
                    Err(_) => {
                        closed = true;
                        break;
                    }
                }
            } else {
                match self.chunks.try_recv() {
                    Ok(chunk) => chunk,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            };
            self.pending.extend_from_slice(&chunk);
            moved += self.move_pending(buf, limit - moved);
        }

        if !self.pending.is_empty() {
            self.events.notify_message();
        }
        if closed && moved == 0 {
            return Err(Error::Disconnected);
        }
        trace!("received {} bytes", moved);
        Ok(moved)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_keepalive(stream: &TcpStream) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    let on: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_KEEPALIVE,
            &on as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_keepalive(_stream: &TcpStream) -> io::Result<()> {
    Ok(())
}

/// Scripted transport: hands out one queued chunk per `recv` and records
/// everything sent. Running out of chunks while waiting reads as a disconnect.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockConn {
    pub incoming: std::collections::VecDeque<Vec<u8>>,
    pub sent: Vec<u8>,
    pub events: Events,
}

#[cfg(test)]
impl MockConn {
    pub fn new(events: Events, chunks: &[&[u8]]) -> Self {
        let conn = Self {
            incoming: chunks.iter().map(|c| c.to_vec()).collect(),
            sent: vec![],
            events,
        };
        if !conn.incoming.is_empty() {
            conn.events.notify_message();
        }
        conn
    }
}

#[cfg(test)]
impl Transport for MockConn {
    fn recv(&mut self, buf: &mut Vec<u8>, limit: usize, _wait: bool) -> Result<usize> {
        self.events.take_message();
        let Some(mut chunk) = self.incoming.pop_front() else {
            return Err(Error::Disconnected);
        };
        if chunk.len() > limit {
            let rest = chunk.split_off(limit);
            self.incoming.push_front(rest);
        }
        buf.extend_from_slice(&chunk);
        if !self.incoming.is_empty() {
            self.events.notify_message();
        }
        Ok(chunk.len())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.sent.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_tcp_roundtrip() {
        let events = Events::new();
        let port = {
            // Reserve an ephemeral port, then free it for `accept`.
            let probe = TcpListener::bind(("127.0.0.1", 0)).unwrap();
            probe.local_addr().unwrap().port()
        };

        let client = thread::spawn(move || {
            let mut stream = loop {
                match TcpStream::connect(("127.0.0.1", port)) {
                    Ok(stream) => break stream,
                    Err(_) => thread::sleep(Duration::from_millis(10)),
                }
            };
            stream.write_all(b"$?#3f").unwrap();
            let mut reply = [0u8; 8];
            stream.read_exact(&mut reply).unwrap();
            reply
        });

        let mut conn = TcpConn::accept(port, events.clone()).unwrap();
        let mut buf = vec![];
        while buf.len() < 5 {
            conn.recv(&mut buf, 64, true).unwrap();
        }
        assert_eq!(buf, b"$?#3f");
        conn.send(b"+$S05#b8").unwrap();
        assert_eq!(&client.join().unwrap(), b"+$S05#b8");

        // Peer is gone: waiting now reports the disconnect.
        let mut rest = vec![];
        assert!(matches!(conn.recv(&mut rest, 64, true), Err(Error::Disconnected)));
    }

    #[test]
    fn test_mock_respects_limit() {
        let events = Events::new();
        let mut conn = MockConn::new(events.clone(), &[b"abcdef"]);
        assert!(events.has_message());

        let mut buf = vec![];
        assert_eq!(conn.recv(&mut buf, 4, false).unwrap(), 4);
        assert!(events.has_message());
        assert_eq!(conn.recv(&mut buf, 4, false).unwrap(), 2);
        assert!(!events.has_message());
        assert_eq!(buf, b"abcdef");
        assert!(matches!(conn.recv(&mut buf, 4, true), Err(Error::Disconnected)));
    }
}

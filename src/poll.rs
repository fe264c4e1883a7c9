use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::io::AsRawFd;

use libc::{SOCK_DGRAM, SOCK_STREAM};

use crate::addr::Protocol;
use crate::buffer::WriteBuf;
use crate::command::{Command, CommandChannel, CommandSender};
use crate::epoll::{self, Epoll, EpollOpt, Evented, Ready, Token};
use crate::error::ReactorError;
use crate::slot::{SlotId, SlotKind, SlotTable, WriteNode, READ_HINT_DEFAULT, READ_HINT_MAX, READ_HINT_MIN};
use crate::sys::Socket;

/// Token reserved for the self-pipe's read end. Slot ids live in
/// `0..MAX_SLOTS` (`MAX_SLOTS` is far below `usize::MAX`), so this can
/// never collide with a real slot.
const COMMAND_TOKEN: Token = Token(usize::MAX);

const UDP_RECV_CAP: usize = 64 * 1024;

/// One readiness notification translated out of raw epoll bits, scoped to
/// a single slot (or `None` for the command channel).
pub(crate) struct PollEvent {
    pub slot: Option<SlotId>,
    pub read: bool,
    pub write: bool,
    pub error: bool,
    pub eof: bool,
}

/// Owns the epoll instance, the fixed slot table, the self-pipe command
/// channel, and the one UDP receive buffer this reactor uses for every
/// datagram socket it owns (the original used a single process-wide
/// buffer; keeping it here instead means two reactors in the same process
/// never share it).
pub(crate) struct Poll {
    epoll: Epoll,
    events: epoll::Events,
    slots: SlotTable,
    commands: CommandChannel,
    udp_recv_buf: Vec<u8>,
}

impl Poll {
    pub fn new() -> io::Result<Poll> {
        let epoll = Epoll::new()?;
        let commands = CommandChannel::new()?;

        commands
            .pipe()
            .add(&epoll, COMMAND_TOKEN, Ready::readable(), EpollOpt::edge())?;

        Ok(Poll {
            epoll,
            events: epoll::Events::with_capacity(1024),
            slots: SlotTable::new(),
            commands,
            udp_recv_buf: vec![0u8; UDP_RECV_CAP],
        })
    }

    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    pub fn try_recv_command(&mut self) -> io::Result<Option<Command>> {
        self.commands.try_recv()
    }

    pub fn kind_of(&self, id: SlotId) -> SlotKind {
        self.slots.get(id).map(|s| s.kind).unwrap_or(SlotKind::Invalid)
    }

    pub fn protocol_of(&self, id: SlotId) -> Option<Protocol> {
        self.slots.get(id).map(|s| s.protocol)
    }

    pub fn peer_addr_of(&self, id: SlotId) -> Option<SocketAddr> {
        self.slots.get(id).and_then(|s| s.peer_addr)
    }

    pub fn is_closing(&self, id: SlotId) -> bool {
        self.slots.get(id).map(|s| s.closing).unwrap_or(true)
    }

    /// Every slot still open, in table order. Used by reactor shutdown to
    /// close out whatever is left.
    pub fn live_slot_ids(&self) -> Vec<SlotId> {
        self.slots.live_ids()
    }

    pub fn local_addr(&self, id: SlotId) -> io::Result<SocketAddr> {
        let slot = self
            .slots
            .get(id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "stale slot"))?;
        slot.socket.as_ref().unwrap().local_addr()
    }

    // ---- listen / connect / accept ----------------------------------

    pub fn listen_tcp(&mut self, host: &str, port: u16, backlog: i32) -> Result<SlotId, ReactorError> {
        let addr = resolve_one(host, port)?;

        let sock = Socket::new(&addr, SOCK_STREAM)?;
        sock.set_reuseaddr(true)?;
        sock.bind(&addr)?;
        sock.listen(backlog)?;

        let id = self.slots.allocate()?;
        let fd = sock.as_raw_fd();
        self.epoll.add(&fd, Token(id.0), Ready::readable(), EpollOpt::edge())?;

        let slot = self.slots.get_mut(id).unwrap();
        slot.kind = SlotKind::Listening;
        slot.protocol = Protocol::Tcp;
        slot.read_enabled = true;
        slot.socket = Some(sock);
        Ok(id)
    }

    /// Begins a nonblocking connect. The returned bool is `true` if the
    /// connection completed synchronously (rare but possible for loopback),
    /// in which case the slot is already `Connected`; otherwise the slot is
    /// `Connecting` and the caller should wait for write-readiness to
    /// resolve it via [`check_connect`](Poll::check_connect).
    pub fn connect_tcp(&mut self, host: &str, port: u16) -> Result<(SlotId, bool), ReactorError> {
        let addr = resolve_one(host, port)?;
        let sock = Socket::new(&addr, SOCK_STREAM)?;
        let connected_now = sock.connect_nonblocking(&addr)?;

        let id = self.slots.allocate()?;
        let fd = sock.as_raw_fd();

        if connected_now {
            self.epoll.add(&fd, Token(id.0), Ready::readable(), EpollOpt::edge())?;
        } else {
            self.epoll.add(&fd, Token(id.0), Ready::writable(), EpollOpt::edge())?;
        }

        let slot = self.slots.get_mut(id).unwrap();
        slot.protocol = Protocol::Tcp;
        slot.peer_addr = Some(addr);
        if connected_now {
            slot.kind = SlotKind::Connected;
            slot.read_enabled = true;
        } else {
            slot.kind = SlotKind::Connecting;
            slot.write_enabled = true;
        }
        slot.socket = Some(sock);

        Ok((id, connected_now))
    }

    pub fn bind_udp(&mut self, host: &str, port: u16) -> Result<SlotId, ReactorError> {
        let addr = resolve_one(host, port)?;
        let sock = Socket::new(&addr, SOCK_DGRAM)?;
        sock.bind(&addr)?;

        let id = self.slots.allocate()?;
        let fd = sock.as_raw_fd();
        self.epoll.add(&fd, Token(id.0), Ready::readable(), EpollOpt::edge())?;

        let slot = self.slots.get_mut(id).unwrap();
        slot.kind = SlotKind::UdpBound;
        slot.protocol = match addr {
            SocketAddr::V4(_) => Protocol::UdpV4,
            SocketAddr::V6(_) => Protocol::UdpV6,
        };
        slot.read_enabled = true;
        slot.socket = Some(sock);
        Ok(id)
    }

    /// Accepts in a loop until `EAGAIN`, as required by edge-triggered
    /// readiness: a single `accept` per readable event could leave
    /// already-queued connections unnoticed until new activity arrives.
    pub fn accept_all(&mut self, listener: SlotId) -> io::Result<Vec<(SlotId, SocketAddr)>> {
        let mut out = Vec::new();
        loop {
            let accepted = match self.slots.get(listener) {
                Some(s) => s.socket.as_ref().unwrap().accept(),
                None => break,
            };

            match accepted {
                Ok((conn, peer)) => {
                    let id = match self.slots.allocate() {
                        Ok(id) => id,
                        Err(_) => break,
                    };
                    let fd = conn.as_raw_fd();
                    self.epoll.add(&fd, Token(id.0), Ready::readable(), EpollOpt::edge())?;

                    let slot = self.slots.get_mut(id).unwrap();
                    slot.kind = SlotKind::Connected;
                    slot.protocol = Protocol::Tcp;
                    slot.peer_addr = Some(peer);
                    slot.read_enabled = true;
                    slot.socket = Some(conn);
                    out.push((id, peer));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Called when write-readiness fires on a `Connecting` slot. `Ok(None)`
    /// means the connect succeeded and the slot is now `Connected` with
    /// read-readiness registered instead of write.
    pub fn check_connect(&mut self, id: SlotId) -> io::Result<Option<io::Error>> {
        let (fd, err) = {
            let slot = match self.slots.get_mut(id) {
                Some(s) => s,
                None => return Ok(None),
            };
            let sock = slot.socket.as_ref().unwrap();
            (sock.as_raw_fd(), sock.take_error()?)
        };

        if let Some(e) = err {
            return Ok(Some(e));
        }

        self.epoll.modify(&fd, Token(id.0), Ready::readable(), EpollOpt::edge())?;
        let slot = self.slots.get_mut(id).unwrap();
        slot.kind = SlotKind::Connected;
        slot.write_enabled = false;
        slot.read_enabled = true;
        Ok(None)
    }

    // ---- wait ---------------------------------------------------------

    pub fn wait(&mut self, timeout_ms: i64) -> io::Result<Vec<PollEvent>> {
        let timeout = if timeout_ms < 0 {
            None
        } else {
            Some(std::time::Duration::from_millis(timeout_ms as u64))
        };

        self.epoll.wait(&mut self.events, timeout)?;

        let mut out = Vec::with_capacity(self.events.len());
        for i in 0..self.events.len() {
            let ev = match self.events.get(i) {
                Some(ev) => ev,
                None => continue,
            };
            let token = ev.token();
            let kind = ev.kind();

            let slot = if token == COMMAND_TOKEN {
                None
            } else {
                Some(SlotId(usize::from(token)))
            };

            out.push(PollEvent {
                slot,
                read: kind.is_readable(),
                write: kind.is_writable(),
                error: kind.is_error(),
                eof: kind.is_hup(),
            });
        }
        Ok(out)
    }

    // ---- read -----------------------------------------------------------

    /// Reads one chunk. `Ok(0)` is an orderly peer close; `WouldBlock`
    /// means the caller's read-until-EAGAIN loop is done for this event.
    pub fn read_tcp(&mut self, id: SlotId, buf: &mut [u8]) -> io::Result<usize> {
        let slot = self
            .slots
            .get(id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "stale slot"))?;
        slot.socket.as_ref().unwrap().read(buf)
    }

    /// Current buffer-size hint for `id`'s next TCP read.
    pub fn read_hint(&self, id: SlotId) -> usize {
        self.slots.get(id).map(|s| s.read_hint).unwrap_or(READ_HINT_DEFAULT)
    }

    /// Adjusts the hint after a read: doubles it when the buffer was filled
    /// completely (more data may be waiting), halves it when the read badly
    /// underfilled the buffer (it was oversized for this peer's traffic).
    pub fn note_read_result(&mut self, id: SlotId, requested: usize, got: usize) {
        if let Some(slot) = self.slots.get_mut(id) {
            if got >= requested && slot.read_hint < READ_HINT_MAX {
                slot.read_hint = (slot.read_hint * 2).min(READ_HINT_MAX);
            } else if requested > 0 && got < requested / 2 && slot.read_hint > READ_HINT_MIN {
                slot.read_hint = (slot.read_hint / 2).max(READ_HINT_MIN);
            }
        }
    }

    pub fn read_udp(&mut self, id: SlotId) -> io::Result<(Vec<u8>, SocketAddr)> {
        let slot = self
            .slots
            .get(id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "stale slot"))?;
        let (n, peer) = slot
            .socket
            .as_ref()
            .unwrap()
            .recv_from(&mut self.udp_recv_buf)?;
        Ok((self.udp_recv_buf[..n].to_vec(), peer))
    }

    // ---- write / enqueue ------------------------------------------------

    /// Queues `buf` for `id`. If the queue is currently empty, attempts one
    /// direct send first so a single small write does not pay for a queue
    /// round-trip.
    pub fn enqueue(&mut self, id: SlotId, buf: WriteBuf, dest: Option<SocketAddr>) {
        let slot = match self.slots.get_mut(id) {
            Some(s) => s,
            None => return, // dropping buf here releases/frees it
        };

        if slot.closing {
            return;
        }

        if !slot.write_queue.is_empty() {
            slot.write_queue.push_back(WriteNode { buf, offset: 0, dest });
            return;
        }

        let sent = match dest {
            Some(addr) => slot.socket.as_ref().unwrap().send_to(buf.as_slice(), &addr).ok(),
            None => slot.socket.as_ref().unwrap().write(buf.as_slice()).ok(),
        };

        // A UDP send the kernel accepted at all, even partially, has already
        // handed off the one datagram the node represents; there is no
        // remaining tail to requeue and resend.
        if dest.is_some() && sent.is_some() {
            return;
        }

        let offset = match sent {
            Some(n) if n >= buf.len() => return,
            Some(n) => n,
            None => 0,
        };

        slot.write_queue.push_back(WriteNode { buf, offset, dest });
        slot.write_enabled = true;
        let fd = slot.socket.as_ref().unwrap().as_raw_fd();
        let _ = self.epoll.modify(
            &fd,
            Token(id.0),
            Ready::readable() | Ready::writable(),
            EpollOpt::edge(),
        );
    }

    /// Drains as much of the write queue as the kernel will currently
    /// accept. Disables write-readiness once the queue empties, and
    /// completes a deferred close if one was requested.
    pub fn flush_writes(&mut self, id: SlotId) -> io::Result<()> {
        loop {
            let result = {
                let slot = match self.slots.get_mut(id) {
                    Some(s) => s,
                    None => return Ok(()),
                };
                let node = match slot.write_queue.front() {
                    Some(n) => n,
                    None => break,
                };
                let sock = slot.socket.as_ref().unwrap();
                match node.dest {
                    Some(addr) => sock.send_to(node.remaining(), &addr),
                    None => sock.write(node.remaining()),
                }
            };

            match result {
                Ok(n) => {
                    let slot = self.slots.get_mut(id).unwrap();
                    let node = slot.write_queue.front_mut().unwrap();
                    if node.dest.is_some() {
                        // UDP: a short send is still full consumption of
                        // this datagram, not a partial write to resume.
                        slot.write_queue.pop_front();
                    } else {
                        node.offset += n;
                        if node.is_drained() {
                            slot.write_queue.pop_front();
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }

        let (fd, read_enabled, closing) = {
            let slot = match self.slots.get_mut(id) {
                Some(s) => s,
                None => return Ok(()),
            };
            if !slot.write_queue.is_empty() {
                return Ok(());
            }
            slot.write_enabled = false;
            (slot.socket.as_ref().unwrap().as_raw_fd(), slot.read_enabled, slot.closing)
        };

        let interest = if read_enabled { Ready::readable() } else { Ready::empty() };
        let _ = self.epoll.modify(&fd, Token(id.0), interest, EpollOpt::edge());
        if closing {
            self.teardown(id);
        }

        Ok(())
    }

    // ---- teardown ---------------------------------------------------------

    /// Soft close: tears down immediately if nothing is queued, otherwise
    /// defers until `flush_writes` drains the queue.
    pub fn close_slot(&mut self, id: SlotId) {
        let empty = match self.slots.get_mut(id) {
            Some(slot) => {
                slot.closing = true;
                slot.write_queue.is_empty()
            }
            None => return,
        };
        if empty {
            self.teardown(id);
        }
    }

    /// Hard close: unregisters from epoll, drops the socket (closing the
    /// fd) and the write queue (releasing/freeing every pending buffer via
    /// ordinary `Drop`), then frees the slot for reuse.
    pub fn teardown(&mut self, id: SlotId) {
        if let Some(slot) = self.slots.get_mut(id) {
            if let Some(sock) = &slot.socket {
                let fd = sock.as_raw_fd();
                let _ = self.epoll.delete(&fd);
            }
        }
        self.slots.free(id);
    }
}

fn resolve_one(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no address resolved"))
}

use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use log::{debug, trace, warn};

use crate::addr::Protocol;
use crate::buffer::{RefBuf, WriteBuf};
use crate::callbacks::{ErrorKind, ReactorCallbacks};
use crate::command::{Command, CommandSender};
use crate::poll::Poll;
use crate::slot::{SlotId, SlotKind};
use crate::timer::TimerHeap;
use crate::Result;

/// Longest a single `Poll.wait` is allowed to block when no timer bounds it
/// tighter, so a reactor with no pending work still wakes periodically.
const MAX_WAIT_MS: i64 = 1000;

/// A cheap, `Send + Clone` handle to a reactor's command channel. Any thread
/// — including another reactor's loop thread — can hold one and post
/// commands without touching the reactor's internals directly.
#[derive(Clone)]
pub struct ReactorHandle {
    sender: CommandSender,
}

impl ReactorHandle {
    pub(crate) fn from_sender(sender: CommandSender) -> ReactorHandle {
        ReactorHandle { sender }
    }

    pub fn send(&self, command: Command) -> io::Result<()> {
        self.sender.send(command)
    }

    pub fn exit(&self) -> io::Result<()> {
        self.send(Command::Exit)
    }

    pub fn close(&self, id: SlotId) -> io::Result<()> {
        self.send(Command::Close { id })
    }

    pub fn send_tcp(&self, id: SlotId, buf: impl Into<WriteBuf>) -> io::Result<()> {
        self.send(Command::SendTcp { id, buf: buf.into() })
    }

    pub fn broadcast_tcp(&self, ids: Vec<SlotId>, buf: RefBuf) -> io::Result<()> {
        self.send(Command::BroadcastTcp { ids, buf })
    }

    pub fn send_udp(&self, id: SlotId, buf: impl Into<WriteBuf>) -> io::Result<()> {
        self.send(Command::SendUdp { id, buf: buf.into() })
    }

    pub fn send_to_udp(&self, id: SlotId, addr: SocketAddr, buf: impl Into<WriteBuf>) -> io::Result<()> {
        self.send(Command::SendToUdp { id, addr, buf: buf.into() })
    }

    /// Asks the reactor owning this handle to listen, asynchronously. The
    /// result is posted back to `source` as a `User` command tagged
    /// `back_cmd`, carrying the new slot id (or `-1` on failure) as an
    /// 8-byte little-endian payload.
    pub fn listen_tcp(
        &self,
        source: ReactorHandle,
        back_cmd: i32,
        host: impl Into<String>,
        port: u16,
        backlog: i32,
    ) -> io::Result<()> {
        self.send(Command::Listen {
            source,
            back_cmd,
            host: host.into(),
            port,
            backlog,
        })
    }

    pub fn connect_tcp(
        &self,
        source: ReactorHandle,
        back_cmd: i32,
        host: impl Into<String>,
        port: u16,
    ) -> io::Result<()> {
        self.send(Command::Connect {
            source,
            back_cmd,
            host: host.into(),
            port,
        })
    }

    pub fn send_user_command(&self, source: ReactorHandle, command: i32, data: Box<[u8]>) -> io::Result<()> {
        self.send(Command::User { source, command, data })
    }
}

fn encode_slot_result(result: Result<usize>) -> Box<[u8]> {
    let v: i64 = match result {
        Ok(idx) => idx as i64,
        Err(_) => -1,
    };
    v.to_le_bytes().to_vec().into_boxed_slice()
}

/// The event loop: one `Poll`, one `TimerHeap`, a quit flag, and the user's
/// callback set. Everything here runs on a single thread; the only way in
/// from another thread is a command posted through a [`ReactorHandle`].
pub struct Reactor {
    poll: Poll,
    timers: TimerHeap,
    start: Instant,
    now_ms: u64,
    quit: bool,
    // `Option` so dispatch can `take()` it out, hand `&mut self` to the
    // callback as `ctx`, then put it back — a callback method can't borrow
    // `self.callbacks` and take `&mut Reactor` at the same time otherwise.
    callbacks: Option<Box<dyn ReactorCallbacks>>,
}

impl Reactor {
    pub fn new(callbacks: Box<dyn ReactorCallbacks>) -> Result<Reactor> {
        Ok(Reactor {
            poll: Poll::new()?,
            timers: TimerHeap::new(),
            start: Instant::now(),
            now_ms: 0,
            quit: false,
            callbacks: Some(callbacks),
        })
    }

    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle::from_sender(self.poll.command_sender())
    }

    /// Runs the loop until an `Exit` command or [`Reactor::exit`] is
    /// observed.
    pub fn run(&mut self) -> Result<()> {
        self.now_ms = self.elapsed_ms();
        while !self.quit {
            self.tick()?;
        }
        self.shutdown();
        Ok(())
    }

    /// Runs exactly one loop iteration. Exposed for tests that want to
    /// drive a reactor deterministically instead of via `run`'s own thread.
    pub fn tick(&mut self) -> Result<()> {
        self.drain_commands()?;
        self.now_ms = self.elapsed_ms();
        self.fire_expired_timers();

        let wait_ms = self.compute_wait();
        let events = match self.poll.wait(wait_ms) {
            Ok(events) => events,
            Err(e) => {
                warn!("poll.wait failed: {}", e);
                return Ok(());
            }
        };
        trace!("poll.wait returned {} event(s)", events.len());

        for ev in events {
            let id = match ev.slot {
                Some(id) => id,
                None => continue, // self-pipe readiness; commands already drained above
            };

            if self.poll.kind_of(id) == SlotKind::Invalid {
                continue;
            }

            let kind = self.poll.kind_of(id);

            if ev.read {
                match kind {
                    SlotKind::Listening => self.dispatch_accept(id)?,
                    SlotKind::Connected | SlotKind::UdpBound => self.dispatch_read(id)?,
                    _ => {}
                }
            }

            if ev.write && self.poll.kind_of(id) != SlotKind::Invalid {
                match self.poll.kind_of(id) {
                    SlotKind::Connecting => self.dispatch_connect(id)?,
                    SlotKind::Connected | SlotKind::UdpBound => {
                        if let Err(e) = self.poll.flush_writes(id) {
                            warn!("write error on slot {:?}: {}", id, e);
                            self.fail_slot(id, ErrorKind::Io);
                        }
                    }
                    _ => {}
                }
            }

            if self.poll.kind_of(id) != SlotKind::Invalid {
                if ev.error {
                    self.fail_slot(id, ErrorKind::Oob);
                } else if ev.eof {
                    self.fail_slot(id, ErrorKind::Eof);
                }
            }
        }

        Ok(())
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn shutdown(&mut self) {
        debug!("reactor shutting down");
        let _ = self.drain_commands();

        for id in self.poll.live_slot_ids() {
            self.poll.close_slot(id);
            if self.poll.kind_of(id) == SlotKind::Invalid {
                continue;
            }
            // One more best-effort pass to push out whatever the kernel
            // will currently accept; the loop isn't running anymore to wait
            // for further write-readiness, so this is the last chance to
            // drain before the socket closes underneath the queue.
            if let Err(e) = self.poll.flush_writes(id) {
                warn!("shutdown: write error draining slot {:?}: {}", id, e);
            }
            if self.poll.kind_of(id) != SlotKind::Invalid {
                self.poll.teardown(id);
            }
        }
    }

    fn compute_wait(&self) -> i64 {
        if self.quit {
            return 0;
        }
        match self.timers.top() {
            Some(t) => t.expire_ms.saturating_sub(self.now_ms).min(MAX_WAIT_MS as u64) as i64,
            None => MAX_WAIT_MS,
        }
    }

    fn fire_expired_timers(&mut self) {
        loop {
            match self.timers.top() {
                Some(t) if t.expire_ms <= self.now_ms => {
                    let entry = self.timers.pop().expect("top() just confirmed an entry");
                    trace!("firing timer {}", entry.id);
                    let mut cb = self.callbacks.take().expect("callbacks missing");
                    cb.on_timeout(self, entry.id);
                    self.callbacks = Some(cb);
                }
                _ => break,
            }
        }
    }

    fn drain_commands(&mut self) -> Result<()> {
        loop {
            let cmd = match self.poll.try_recv_command()? {
                Some(cmd) => cmd,
                None => break,
            };
            self.handle_command(cmd)?;
        }
        Ok(())
    }

    fn handle_command(&mut self, cmd: Command) -> Result<()> {
        match cmd {
            Command::Exit => {
                debug!("exit command received");
                self.quit = true;
            }
            Command::Listen {
                source,
                back_cmd,
                host,
                port,
                backlog,
            } => {
                let result = self.listen_tcp(&host, port, backlog).map(|id| id.0);
                let _ = source.send(Command::User {
                    source: self.handle(),
                    command: back_cmd,
                    data: encode_slot_result(result),
                });
            }
            Command::Connect {
                source,
                back_cmd,
                host,
                port,
            } => {
                let result = self.connect_tcp(&host, port).map(|(id, _)| id.0);
                let _ = source.send(Command::User {
                    source: self.handle(),
                    command: back_cmd,
                    data: encode_slot_result(result),
                });
            }
            Command::Close { id } => self.poll.close_slot(id),
            Command::SendTcp { id, buf } => self.poll.enqueue(id, buf, None),
            Command::BroadcastTcp { ids, buf } => {
                for id in ids {
                    self.poll.enqueue(id, WriteBuf::Shared(buf.acquire()), None);
                }
            }
            Command::SendUdp { id, buf } => {
                let dest = self.poll.peer_addr_of(id);
                self.poll.enqueue(id, buf, dest);
            }
            Command::SendToUdp { id, addr, buf } => self.poll.enqueue(id, buf, Some(addr)),
            Command::User { source, command, data } => {
                let mut cb = self.callbacks.take().expect("callbacks missing");
                let _keep = cb.on_command(self, source, command, data);
                self.callbacks = Some(cb);
            }
        }
        Ok(())
    }

    fn dispatch_accept(&mut self, listener: SlotId) -> Result<()> {
        let accepted = match self.poll.accept_all(listener) {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept error on listener {:?}: {}", listener, e);
                self.fail_slot(listener, ErrorKind::Io);
                return Ok(());
            }
        };
        for (id, peer) in accepted {
            debug!("accepted {} on listener {:?}", peer, listener);
            let mut cb = self.callbacks.take().expect("callbacks missing");
            cb.on_listen(self, listener, id);
            self.callbacks = Some(cb);
        }
        Ok(())
    }

    fn dispatch_connect(&mut self, id: SlotId) -> Result<()> {
        match self.poll.check_connect(id) {
            Ok(None) => {
                debug!("slot {:?} connected", id);
                let mut cb = self.callbacks.take().expect("callbacks missing");
                cb.on_connect(self, id, 0);
                self.callbacks = Some(cb);
            }
            Ok(Some(e)) | Err(e) => {
                let errno = e.raw_os_error().unwrap_or(-1);
                warn!("slot {:?} failed to connect: {}", id, e);
                self.poll.teardown(id);
                let mut cb = self.callbacks.take().expect("callbacks missing");
                cb.on_connect(self, id, errno);
                self.callbacks = Some(cb);
            }
        }
        Ok(())
    }

    fn dispatch_read(&mut self, id: SlotId) -> Result<()> {
        match self.poll.protocol_of(id) {
            Some(Protocol::Tcp) => self.dispatch_read_tcp(id),
            Some(Protocol::UdpV4) | Some(Protocol::UdpV6) => self.dispatch_read_udp(id),
            None => Ok(()),
        }
    }

    fn dispatch_read_tcp(&mut self, id: SlotId) -> Result<()> {
        loop {
            let hint = self.poll.read_hint(id);
            let mut buf = vec![0u8; hint];
            match self.poll.read_tcp(id, &mut buf) {
                Ok(0) => {
                    debug!("slot {:?} peer closed", id);
                    self.poll.teardown(id);
                    let mut cb = self.callbacks.take().expect("callbacks missing");
                    cb.on_error(self, id, ErrorKind::Eof);
                    self.callbacks = Some(cb);
                    break;
                }
                Ok(n) => {
                    self.poll.note_read_result(id, hint, n);
                    buf.truncate(n);
                    let peer = self.poll.peer_addr_of(id);
                    let mut cb = self.callbacks.take().expect("callbacks missing");
                    let _keep = cb.on_recv(self, id, buf.into_boxed_slice(), peer);
                    self.callbacks = Some(cb);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("read error on slot {:?}: {}", id, e);
                    self.poll.teardown(id);
                    let mut cb = self.callbacks.take().expect("callbacks missing");
                    cb.on_error(self, id, ErrorKind::Io);
                    self.callbacks = Some(cb);
                    break;
                }
            }
        }
        Ok(())
    }

    fn dispatch_read_udp(&mut self, id: SlotId) -> Result<()> {
        loop {
            match self.poll.read_udp(id) {
                Ok((data, peer)) => {
                    let mut cb = self.callbacks.take().expect("callbacks missing");
                    let _keep = cb.on_recv(self, id, data.into_boxed_slice(), Some(peer));
                    self.callbacks = Some(cb);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("recvfrom error on slot {:?}: {}", id, e);
                    self.poll.teardown(id);
                    let mut cb = self.callbacks.take().expect("callbacks missing");
                    cb.on_error(self, id, ErrorKind::Io);
                    self.callbacks = Some(cb);
                    break;
                }
            }
        }
        Ok(())
    }

    fn fail_slot(&mut self, id: SlotId, what: ErrorKind) {
        if self.poll.kind_of(id) == SlotKind::Invalid {
            return;
        }
        self.poll.teardown(id);
        let mut cb = self.callbacks.take().expect("callbacks missing");
        cb.on_error(self, id, what);
        self.callbacks = Some(cb);
    }

    // ---- synchronous public API (same thread as the reactor) ----------

    pub fn listen_tcp(&mut self, host: &str, port: u16, backlog: i32) -> Result<SlotId> {
        let id = self.poll.listen_tcp(host, port, backlog)?;
        debug!("listening on {}:{} -> {:?}", host, port, id);
        Ok(id)
    }

    pub fn connect_tcp(&mut self, host: &str, port: u16) -> Result<(SlotId, bool)> {
        let (id, connected_now) = self.poll.connect_tcp(host, port)?;
        if connected_now {
            let mut cb = self.callbacks.take().expect("callbacks missing");
            cb.on_connect(self, id, 0);
            self.callbacks = Some(cb);
        }
        Ok((id, connected_now))
    }

    pub fn bind_udp(&mut self, host: &str, port: u16) -> Result<SlotId> {
        self.poll.bind_udp(host, port)
    }

    /// The local address a listener or bound UDP socket ended up on —
    /// mainly useful for tests that bind to port 0 and need the ephemeral
    /// port the kernel picked.
    pub fn local_addr(&self, id: SlotId) -> io::Result<SocketAddr> {
        self.poll.local_addr(id)
    }

    pub fn send_tcp(&mut self, id: SlotId, buf: impl Into<WriteBuf>) {
        self.poll.enqueue(id, buf.into(), None);
    }

    pub fn broadcast_tcp(&mut self, ids: &[SlotId], buf: &RefBuf) {
        for &id in ids {
            self.poll.enqueue(id, WriteBuf::Shared(buf.acquire()), None);
        }
    }

    pub fn send_udp(&mut self, id: SlotId, buf: impl Into<WriteBuf>) {
        let dest = self.poll.peer_addr_of(id);
        self.poll.enqueue(id, buf.into(), dest);
    }

    pub fn send_to_udp(&mut self, id: SlotId, addr: SocketAddr, buf: impl Into<WriteBuf>) {
        self.poll.enqueue(id, buf.into(), Some(addr));
    }

    pub fn close(&mut self, id: SlotId) {
        self.poll.close_slot(id);
    }

    pub fn exit(&mut self) {
        self.quit = true;
    }

    pub fn push_timer(&mut self, id: i32, delay_ms: u64) {
        self.timers.push(id, self.now_ms + delay_ms);
    }

    /// Posts a `User` command to another reactor's handle, with this
    /// reactor as the reply-to `source`. The only sanctioned way for one
    /// reactor to reach another.
    pub fn send_user_command(&self, target: &ReactorHandle, command: i32, data: Box<[u8]>) -> io::Result<()> {
        target.send_user_command(self.handle(), command, data)
    }
}

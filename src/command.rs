use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::buffer::{RefBuf, WriteBuf};
use crate::reactor::ReactorHandle;
use crate::slot::SlotId;
use crate::sys::SelfPipe;

/// Tag written as the wire header's `type` byte. Order mirrors the table in
/// the external-interfaces section of the design: not a compatibility
/// requirement (the pipe is internal), just a stable name for each frame
/// kind when tracing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Exit = 0,
    Listen = 1,
    Connect = 2,
    Close = 3,
    SendTcp = 4,
    BroadcastTcp = 5,
    SendUdp = 6,
    SendToUdp = 7,
    User = 8,
}

/// A typed request posted into a reactor's command channel, from any
/// thread. Close and Connect are independent variants dispatched
/// independently — see the crate's design notes on the original's
/// missing-`break` fallthrough bug, which this rewrite does not reproduce.
pub enum Command {
    Exit,
    Listen {
        source: ReactorHandle,
        back_cmd: i32,
        host: String,
        port: u16,
        backlog: i32,
    },
    Connect {
        source: ReactorHandle,
        back_cmd: i32,
        host: String,
        port: u16,
    },
    Close {
        id: SlotId,
    },
    SendTcp {
        id: SlotId,
        buf: WriteBuf,
    },
    BroadcastTcp {
        ids: Vec<SlotId>,
        buf: RefBuf,
    },
    SendUdp {
        id: SlotId,
        buf: WriteBuf,
    },
    SendToUdp {
        id: SlotId,
        addr: SocketAddr,
        buf: WriteBuf,
    },
    User {
        source: ReactorHandle,
        command: i32,
        data: Box<[u8]>,
    },
}

impl Command {
    fn kind(&self) -> CommandType {
        match self {
            Command::Exit => CommandType::Exit,
            Command::Listen { .. } => CommandType::Listen,
            Command::Connect { .. } => CommandType::Connect,
            Command::Close { .. } => CommandType::Close,
            Command::SendTcp { .. } => CommandType::SendTcp,
            Command::BroadcastTcp { .. } => CommandType::BroadcastTcp,
            Command::SendUdp { .. } => CommandType::SendUdp,
            Command::SendToUdp { .. } => CommandType::SendToUdp,
            Command::User { .. } => CommandType::User,
        }
    }
}

const HEADER_LEN: usize = 2;
const BODY_LEN: usize = std::mem::size_of::<usize>();
const MAX_BODY: usize = 253;

/// The self-pipe plus the typed framing on top of it.
///
/// Frames are `{type: u8, len: u8}` followed by `len` bytes. The body is
/// always a single pointer-sized payload: the address of a `Box<Command>`
/// moved onto the heap by the sender. This is the same trick the original
/// protocol uses (a real heap pointer crosses the pipe and ownership passes
/// to whichever thread reads it back out) adapted to a typed Rust enum
/// instead of a `void*` plus a hand-decoded byte layout. The write of
/// `HEADER_LEN + BODY_LEN` bytes stays far under `PIPE_BUF`, so concurrent
/// producers never interleave a partial frame.
pub struct CommandChannel {
    pipe: Arc<SelfPipe>,
    recv_buf: Vec<u8>,
}

impl CommandChannel {
    pub fn new() -> io::Result<CommandChannel> {
        Ok(CommandChannel {
            pipe: Arc::new(SelfPipe::new()?),
            recv_buf: Vec::new(),
        })
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            pipe: self.pipe.clone(),
        }
    }

    pub fn pipe(&self) -> &SelfPipe {
        &self.pipe
    }

    /// Drain and decode one pending command, if any are queued.
    pub fn try_recv(&mut self) -> io::Result<Option<Command>> {
        let mut chunk = [0u8; 256];
        loop {
            match self.pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.recv_buf.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }

        if self.recv_buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = self.recv_buf[1] as usize;
        let frame_len = HEADER_LEN + len;
        if self.recv_buf.len() < frame_len {
            return Ok(None);
        }

        debug_assert_eq!(len, BODY_LEN, "command frames always carry one pointer");

        let mut ptr_bytes = [0u8; BODY_LEN];
        ptr_bytes.copy_from_slice(&self.recv_buf[HEADER_LEN..frame_len]);
        let addr = usize::from_ne_bytes(ptr_bytes);

        self.recv_buf.drain(0..frame_len);

        // SAFETY: `addr` was produced by `CommandSender::send`, which leaked
        // exactly one `Box<Command>` per frame written; each frame is read
        // and reconstructed exactly once here.
        let boxed = unsafe { Box::from_raw(addr as *mut Command) };
        Ok(Some(*boxed))
    }
}

/// The cheap, `Send + Sync` half of a command channel: the write end of the
/// self-pipe, clonable so every producer thread gets its own handle to the
/// same reactor.
#[derive(Clone)]
pub struct CommandSender {
    pipe: Arc<SelfPipe>,
}

impl CommandSender {
    pub fn send(&self, command: Command) -> io::Result<()> {
        let kind = command.kind();
        let boxed = Box::new(command);
        let addr = Box::into_raw(boxed) as usize;

        let mut frame = [0u8; HEADER_LEN + BODY_LEN];
        frame[0] = kind as u8;
        frame[1] = BODY_LEN as u8;
        frame[HEADER_LEN..].copy_from_slice(&addr.to_ne_bytes());

        match self.pipe.write(&frame) {
            Ok(n) if n == frame.len() => Ok(()),
            Ok(_) => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "short write on command pipe (frame larger than PIPE_BUF?)",
            )),
            Err(e) => {
                // Reclaim the leaked box so a failed send does not leak.
                unsafe {
                    drop(Box::from_raw(addr as *mut Command));
                }
                Err(e)
            }
        }
    }
}

const _: () = assert!(MAX_BODY >= BODY_LEN);

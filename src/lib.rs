//! A single-threaded, event-driven network reactor: an epoll-backed I/O
//! multiplexer with TCP/UDP sockets, a timer heap, and a lock-free
//! cross-thread command channel.
//!
//! ```no_run
//! use reactor_core::{Reactor, ReactorCallbacks, SlotId, ErrorKind};
//!
//! struct Echo;
//!
//! impl ReactorCallbacks for Echo {
//!     fn on_listen(&mut self, _ctx: &mut Reactor, _listener: SlotId, _accepted: SlotId) {}
//!     fn on_connect(&mut self, _ctx: &mut Reactor, _id: SlotId, _errno: i32) {}
//!     fn on_recv(&mut self, ctx: &mut Reactor, id: SlotId, buf: Box<[u8]>, _peer: Option<std::net::SocketAddr>) -> bool {
//!         let _ = ctx.send_tcp(id, buf);
//!         false
//!     }
//!     fn on_error(&mut self, _ctx: &mut Reactor, _id: SlotId, _what: ErrorKind) {}
//!     fn on_timeout(&mut self, _ctx: &mut Reactor, _timer_id: i32) {}
//!     fn on_command(&mut self, _ctx: &mut Reactor, _source: reactor_core::ReactorHandle, _command: i32, _data: Box<[u8]>) -> bool {
//!         false
//!     }
//! }
//!
//! let mut reactor = Reactor::new(Box::new(Echo)).unwrap();
//! reactor.listen_tcp("127.0.0.1", 0, 128).unwrap();
//! ```

#[macro_use]
mod macros;

mod addr;
mod buffer;
mod callbacks;
mod command;
mod error;
pub mod epoll;
mod log_reactor;
mod poll;
mod reactor;
mod slot;
mod sys;
mod timer;

pub use addr::Protocol;
pub use buffer::{RefBuf, WriteBuf};
pub use callbacks::{ErrorKind, ReactorCallbacks};
pub use command::{Command, CommandType};
pub use error::ReactorError;
pub use log_reactor::LogReactor;
pub use reactor::{Reactor, ReactorHandle};
pub use slot::{SlotId, SlotKind};
pub use timer::{TimerEntry, TimerHeap};

pub type Result<T> = std::result::Result<T, ReactorError>;

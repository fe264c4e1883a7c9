//! Thin wrappers around the raw Linux syscalls the reactor needs.
//!
//! Nothing above this module touches `libc` directly; `Epoll`, `Socket`,
//! `FileDesc` and `SelfPipe` are the only things that do.

mod commom;
mod epoll;
mod fd;
mod self_pipe;
mod socket;

pub use self::commom::{AsInner, FromInner, IntoInner};
pub use self::epoll::{Epoll, Events};
pub use self::fd::FileDesc;
pub use self::self_pipe::SelfPipe;
pub use self::socket::Socket;

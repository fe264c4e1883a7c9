use std::os::unix::io::RawFd;
use std::io;

use super::{Epoll, Token, Ready, EpollOpt};

/// Anything that can be registered with an `Epoll` instance: a raw fd, or a
/// type that owns one and wants to add bookkeeping around registration
/// (e.g. `SelectorId` reuse checks).
pub trait Source {
    fn add(&self, epoll: &Epoll, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()>;

    fn modify(&self, epoll: &Epoll, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()>;

    fn delete(&self, epoll: &Epoll) -> io::Result<()>;
}

impl Source for RawFd {
    fn add(&self, epoll: &Epoll, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()> {
        epoll.0.add(*self, token, interest, opts)
    }

    fn modify(&self, epoll: &Epoll, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()> {
        epoll.0.modify(*self, token, interest, opts)
    }

    fn delete(&self, epoll: &Epoll) -> io::Result<()> {
        epoll.0.delete(*self)
    }
}

/// A value backed by an OS handle that can be registered with the reactor's
/// epoll instance. Distinct from [`Source`]: `Evented` types delegate to
/// `Epoll::add`/`modify`/`delete` (validating interest, associating a
/// `SelectorId`) rather than touching `sys::Epoll` directly.
pub trait Evented {
    fn add(&self, epoll: &Epoll, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()>;
    fn modify(&self, epoll: &Epoll, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()>;
    fn delete(&self, epoll: &Epoll) -> io::Result<()>;
}

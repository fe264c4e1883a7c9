use std::net::SocketAddr;

use crate::reactor::{Reactor, ReactorHandle};
use crate::slot::SlotId;

/// Why `on_error` fired.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A read, write or connect syscall failed.
    Io,
    /// epoll reported `EPOLLERR` / an out-of-band condition.
    Oob,
    /// The peer closed the connection (distinct from a read returning 0
    /// bytes only where the platform surfaces it separately, e.g. `EPOLLRDHUP`).
    Eof,
}

/// The reactor's dispatch surface. Expressed as a trait object
/// (`Box<dyn ReactorCallbacks>`) rather than six free function pointers in
/// a context struct, so state the callbacks need lives in `Self` instead of
/// behind a void pointer.
pub trait ReactorCallbacks {
    fn on_listen(&mut self, ctx: &mut Reactor, listener_id: SlotId, accepted_id: SlotId);

    /// `errno == 0` means the connect succeeded.
    fn on_connect(&mut self, ctx: &mut Reactor, id: SlotId, errno: i32);

    /// Return `true` to keep ownership of `buf` (the reactor will not touch
    /// it again); return `false` to let the reactor drop it immediately.
    fn on_recv(
        &mut self,
        ctx: &mut Reactor,
        id: SlotId,
        buf: Box<[u8]>,
        peer_addr: Option<SocketAddr>,
    ) -> bool;

    fn on_error(&mut self, ctx: &mut Reactor, id: SlotId, what: ErrorKind);

    fn on_timeout(&mut self, ctx: &mut Reactor, timer_id: i32);

    /// Same `true`-keeps/`false`-drops convention as `on_recv`.
    fn on_command(
        &mut self,
        ctx: &mut Reactor,
        source: ReactorHandle,
        command: i32,
        data: Box<[u8]>,
    ) -> bool;
}

use std::net::SocketAddr;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use reactor_core::{ErrorKind, Reactor, ReactorCallbacks, ReactorHandle, SlotId};

/// Everything a [`Forwarding`] callback can observe, handed back to the test
/// thread over an `mpsc` channel so a test can drive a reactor running on a
/// background thread without reaching into its internals.
#[derive(Debug)]
pub enum Event {
    Listened { listener: SlotId, accepted: SlotId },
    Connected { id: SlotId, errno: i32 },
    Received { id: SlotId, data: Vec<u8>, peer: Option<SocketAddr> },
    Error { id: SlotId, kind: ErrorKind },
    Timeout { timer_id: i32 },
    Command { command: i32, data: Vec<u8> },
}

/// A [`ReactorCallbacks`] impl that does nothing but forward every callback
/// invocation to a channel. Shared by every scenario test below; where a
/// test needs a reactor that actually *does* something (the echo server in
/// the S1 test, say), it writes its own small callback instead.
pub struct Forwarding {
    tx: Sender<Event>,
}

impl Forwarding {
    pub fn new() -> (Forwarding, Receiver<Event>) {
        let (tx, rx) = channel();
        (Forwarding { tx }, rx)
    }
}

impl ReactorCallbacks for Forwarding {
    fn on_listen(&mut self, _ctx: &mut Reactor, listener_id: SlotId, accepted_id: SlotId) {
        let _ = self.tx.send(Event::Listened { listener: listener_id, accepted: accepted_id });
    }

    fn on_connect(&mut self, _ctx: &mut Reactor, id: SlotId, errno: i32) {
        let _ = self.tx.send(Event::Connected { id, errno });
    }

    fn on_recv(&mut self, _ctx: &mut Reactor, id: SlotId, buf: Box<[u8]>, peer_addr: Option<SocketAddr>) -> bool {
        let _ = self.tx.send(Event::Received { id, data: buf.into_vec(), peer: peer_addr });
        false
    }

    fn on_error(&mut self, _ctx: &mut Reactor, id: SlotId, what: ErrorKind) {
        let _ = self.tx.send(Event::Error { id, kind: what });
    }

    fn on_timeout(&mut self, _ctx: &mut Reactor, timer_id: i32) {
        let _ = self.tx.send(Event::Timeout { timer_id });
    }

    fn on_command(&mut self, _ctx: &mut Reactor, _source: ReactorHandle, command: i32, data: Box<[u8]>) -> bool {
        let _ = self.tx.send(Event::Command { command, data: data.into_vec() });
        false
    }
}

/// Builds a `Forwarding`-backed reactor and hands back its handle plus the
/// event channel, without starting the loop yet — callers that need to run
/// setup (like `listen_tcp`) on the reactor's owning thread before it's
/// moved into a background thread should do so between this call and
/// [`run_on_thread`].
pub fn new_reactor() -> (Reactor, ReactorHandle, Receiver<Event>) {
    let (cb, rx) = Forwarding::new();
    let reactor = Reactor::new(Box::new(cb)).expect("reactor construction");
    let handle = reactor.handle();
    (reactor, handle, rx)
}

pub fn run_on_thread(mut reactor: Reactor) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let _ = reactor.run();
    })
}

pub fn recv(rx: &Receiver<Event>) -> Event {
    match rx.recv_timeout(Duration::from_secs(5)) {
        Ok(ev) => ev,
        Err(RecvTimeoutError::Timeout) => panic!("timed out waiting for an event"),
        Err(RecvTimeoutError::Disconnected) => panic!("reactor exited before sending an event"),
    }
}

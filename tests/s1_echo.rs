mod common;

use std::net::SocketAddr;

use reactor_core::{ErrorKind, Reactor, ReactorCallbacks, ReactorHandle, SlotId};

use common::Event;

/// Echoes every byte it receives straight back to the same slot. Runs on
/// the "server" reactor; doesn't need to report anything back to the test
/// thread, it just needs to do the echoing.
struct Echo;

impl ReactorCallbacks for Echo {
    fn on_listen(&mut self, _ctx: &mut Reactor, _listener: SlotId, _accepted: SlotId) {}
    fn on_connect(&mut self, _ctx: &mut Reactor, _id: SlotId, _errno: i32) {}

    fn on_recv(&mut self, ctx: &mut Reactor, id: SlotId, buf: Box<[u8]>, _peer: Option<SocketAddr>) -> bool {
        ctx.send_tcp(id, buf);
        false
    }

    fn on_error(&mut self, _ctx: &mut Reactor, _id: SlotId, _what: ErrorKind) {}
    fn on_timeout(&mut self, _ctx: &mut Reactor, _timer_id: i32) {}

    fn on_command(&mut self, _ctx: &mut Reactor, _source: ReactorHandle, _command: i32, _data: Box<[u8]>) -> bool {
        false
    }
}

#[test]
fn bytes_sent_come_back_unchanged() {
    // Bind the listener before handing the reactor off to its own thread,
    // so we can read back the ephemeral port the kernel picked.
    let mut server = Reactor::new(Box::new(Echo)).unwrap();
    let listener = server.listen_tcp("127.0.0.1", 0, 128).unwrap();
    let addr = server.local_addr(listener).unwrap();
    let server_handle = server.handle();
    let server_join = common::run_on_thread(server);

    let (client, client_handle, client_rx) = common::new_reactor();
    let client_join = common::run_on_thread(client);

    client_handle
        .connect_tcp(client_handle.clone(), 0, addr.ip().to_string(), addr.port())
        .unwrap();

    let client_id = match common::recv(&client_rx) {
        Event::Connected { id, errno } => {
            assert_eq!(errno, 0, "connect should succeed against a live listener");
            id
        }
        other => panic!("expected Connected, got {:?}", other),
    };

    client_handle.send_tcp(client_id, b"ping".to_vec()).unwrap();

    match common::recv(&client_rx) {
        Event::Received { id, data, .. } => {
            assert_eq!(id, client_id);
            assert_eq!(data, b"ping");
        }
        other => panic!("expected Received, got {:?}", other),
    }

    server_handle.exit().unwrap();
    client_handle.exit().unwrap();
    server_join.join().unwrap();
    client_join.join().unwrap();
}

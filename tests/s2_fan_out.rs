mod common;

use reactor_core::{RefBuf, SlotId};

use common::Event;

#[test]
fn broadcast_reaches_all_peers_and_releases_the_buffer() {
    let (mut server, server_handle, server_rx) = common::new_reactor();
    let listener = server.listen_tcp("127.0.0.1", 0, 128).unwrap();
    let port = server.local_addr(listener).unwrap().port();
    let server_join = common::run_on_thread(server);

    let mut client_handles = Vec::new();
    let mut client_rxs = Vec::new();
    let mut client_joins = Vec::new();

    for _ in 0..3 {
        let (client, handle, rx) = common::new_reactor();
        let join = common::run_on_thread(client);
        handle
            .connect_tcp(handle.clone(), 0, "127.0.0.1", port)
            .unwrap();
        client_handles.push(handle);
        client_rxs.push(rx);
        client_joins.push(join);
    }

    for rx in &client_rxs {
        match common::recv(rx) {
            Event::Connected { errno, .. } => assert_eq!(errno, 0),
            other => panic!("expected Connected, got {:?}", other),
        }
    }

    let mut accepted: Vec<SlotId> = Vec::new();
    for _ in 0..3 {
        match common::recv(&server_rx) {
            Event::Listened { accepted: id, .. } => accepted.push(id),
            other => panic!("expected Listened, got {:?}", other),
        }
    }

    let payload = RefBuf::new(b"hello".to_vec());
    let probe = payload.acquire();
    server_handle.broadcast_tcp(accepted, payload).unwrap();

    for rx in &client_rxs {
        match common::recv(rx) {
            Event::Received { data, .. } => assert_eq!(data, b"hello"),
            other => panic!("expected Received, got {:?}", other),
        }
    }

    // Every clone the broadcast took (one per destination) has been sent
    // and dropped by now; only our own probe reference is left.
    assert_eq!(probe.strong_count(), 1);

    server_handle.exit().unwrap();
    for handle in &client_handles {
        handle.exit().unwrap();
    }
    server_join.join().unwrap();
    for join in client_joins {
        join.join().unwrap();
    }
}

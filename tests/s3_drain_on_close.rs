mod common;

use common::Event;

/// Enqueues a payload larger than a typical loopback socket send buffer and
/// closes the slot in the same breath. The close must not cut the data off
/// short: every byte has to reach the peer before the slot tears down.
#[test]
fn close_drains_the_write_queue_before_tearing_down() {
    const PAYLOAD_LEN: usize = 64 * 1024;

    let (mut server, server_handle, server_rx) = common::new_reactor();
    let listener = server.listen_tcp("127.0.0.1", 0, 128).unwrap();
    let port = server.local_addr(listener).unwrap().port();
    let server_join = common::run_on_thread(server);

    let (client, client_handle, client_rx) = common::new_reactor();
    let client_join = common::run_on_thread(client);

    client_handle
        .connect_tcp(client_handle.clone(), 0, "127.0.0.1", port)
        .unwrap();

    match common::recv(&client_rx) {
        Event::Connected { errno, .. } => assert_eq!(errno, 0),
        other => panic!("expected Connected, got {:?}", other),
    }

    let accepted = match common::recv(&server_rx) {
        Event::Listened { accepted, .. } => accepted,
        other => panic!("expected Listened, got {:?}", other),
    };

    server_handle
        .send_tcp(accepted, vec![0xABu8; PAYLOAD_LEN])
        .unwrap();
    server_handle.close(accepted).unwrap();

    let mut total = 0usize;
    loop {
        match common::recv(&client_rx) {
            Event::Received { data, .. } => {
                assert!(data.iter().all(|&b| b == 0xAB));
                total += data.len();
                if total == PAYLOAD_LEN {
                    break;
                }
                assert!(total < PAYLOAD_LEN, "received more bytes than were sent");
            }
            other => panic!("expected Received before Eof, got {:?}", other),
        }
    }

    match common::recv(&client_rx) {
        Event::Error { kind, .. } => assert_eq!(kind, reactor_core::ErrorKind::Eof),
        other => panic!("expected Eof after the full payload, got {:?}", other),
    }

    server_handle.exit().unwrap();
    client_handle.exit().unwrap();
    server_join.join().unwrap();
    client_join.join().unwrap();
}

mod common;

use common::Event;

/// Port 1 on loopback has nothing listening; connecting to it should fail
/// fast with `ECONNREFUSED` rather than hang or panic.
#[test]
fn connect_to_a_closed_port_reports_failure() {
    let (reactor, handle, rx) = common::new_reactor();
    let join = common::run_on_thread(reactor);

    handle
        .connect_tcp(handle.clone(), 99, "127.0.0.1", 1)
        .unwrap();

    let mut saw_connected_failure = false;
    for _ in 0..4 {
        match common::recv(&rx) {
            Event::Connected { errno, .. } => {
                assert_ne!(errno, 0, "connecting to a closed port should not succeed");
                assert_eq!(errno, libc::ECONNREFUSED);
                saw_connected_failure = true;
                break;
            }
            Event::Command { command, .. } => {
                assert_eq!(command, 99);
                // This is the synchronous ack for the connect request itself
                // (the new slot id or -1); the real outcome arrives later as
                // Connected once the kernel reports the refused connection.
            }
            other => panic!("unexpected event while waiting for connect failure: {:?}", other),
        }
    }

    assert!(saw_connected_failure, "never observed a failed Connected event");

    // The reactor already tore the slot down; closing it again must be a
    // harmless no-op rather than a panic.
    handle.close(reactor_core::SlotId(0)).unwrap();

    handle.exit().unwrap();
    join.join().unwrap();
}

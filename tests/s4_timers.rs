mod common;

use common::Event;

#[test]
fn timers_fire_in_expiry_order_not_insertion_order() {
    let (mut reactor, handle, rx) = common::new_reactor();

    // Pushed before the reactor's loop starts ticking, so all three are
    // relative to essentially the same "now" — the middle one still has to
    // fire first.
    reactor.push_timer(1, 50);
    reactor.push_timer(2, 10);
    reactor.push_timer(3, 50);

    let join = common::run_on_thread(reactor);

    let mut order = Vec::new();
    for _ in 0..3 {
        match common::recv(&rx) {
            Event::Timeout { timer_id } => order.push(timer_id),
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    assert_eq!(order, vec![2, 1, 3]);

    handle.exit().unwrap();
    join.join().unwrap();
}

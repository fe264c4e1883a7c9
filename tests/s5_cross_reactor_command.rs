mod common;

use std::time::{Duration, Instant};

use reactor_core::LogReactor;

/// Drives the cross-reactor path `LogReactor` exists to demonstrate: reactor
/// `M` posts a `User` command into reactor `L`'s handle; `L` records it
/// without ever touching `M`'s internals, only the `ReactorHandle` it was
/// handed as `source`.
#[test]
fn log_reactor_records_a_command_from_another_reactor() {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let log_path = std::env::temp_dir().join(format!("reactor-core-s5-{}-{}.log", std::process::id(), nanos));

    let log = LogReactor::with_file(&log_path).unwrap();
    let (log_handle, log_join) = log.spawn().unwrap();

    let (m, m_handle, _m_rx) = common::new_reactor();
    let m_join = common::run_on_thread(m);

    log_handle
        .send_user_command(m_handle.clone(), 7, b"hi".to_vec().into_boxed_slice())
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut contents = String::new();
    loop {
        if let Ok(s) = std::fs::read_to_string(&log_path) {
            if s.contains("hi") {
                contents = s;
                break;
            }
        }
        assert!(Instant::now() < deadline, "log file never received the command");
        std::thread::sleep(Duration::from_millis(20));
    }

    assert!(contents.contains("command 7"));
    assert!(contents.contains("hi"));

    log_handle.exit().unwrap();
    m_handle.exit().unwrap();
    log_join.join().unwrap();
    m_join.join().unwrap();

    let _ = std::fs::remove_file(&log_path);
}

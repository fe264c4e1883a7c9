use std::fs::OpenOptions;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use log::{error, info};

use crate::callbacks::{ErrorKind, ReactorCallbacks};
use crate::reactor::{Reactor, ReactorHandle};
use crate::slot::SlotId;

/// Where a [`LogReactor`] writes the commands it receives.
enum Sink {
    /// `log::info!`, the default.
    Log,
    File(Mutex<std::fs::File>),
}

/// A second, independent [`Reactor`] whose only job is to receive `User`
/// commands and record them. Exists to exercise the cross-reactor command
/// path end to end: nothing outside this module ever touches its `Poll` or
/// `TimerHeap` directly, only its [`ReactorHandle`].
pub struct LogReactor {
    sink: Sink,
}

impl LogReactor {
    pub fn new() -> LogReactor {
        LogReactor { sink: Sink::Log }
    }

    pub fn with_file(path: impl AsRef<Path>) -> io::Result<LogReactor> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(LogReactor {
            sink: Sink::File(Mutex::new(file)),
        })
    }

    /// Builds the underlying reactor, spawns it on its own thread, and
    /// returns a handle any other reactor can post `User` commands to plus
    /// the thread's `JoinHandle`.
    pub fn spawn(self) -> io::Result<(ReactorHandle, JoinHandle<()>)> {
        let mut reactor = Reactor::new(Box::new(self))?;
        let handle = reactor.handle();

        let join = thread::Builder::new()
            .name("log-reactor".into())
            .spawn(move || {
                if let Err(e) = reactor.run() {
                    error!("log reactor exited: {}", e);
                }
            })?;

        Ok((handle, join))
    }

    fn record(&self, command: i32, data: &[u8]) {
        match &self.sink {
            Sink::Log => info!("log reactor: command {} ({} bytes): {}", command, data.len(), preview(data)),
            Sink::File(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = writeln!(file, "command {} ({} bytes): {}", command, data.len(), preview(data));
                }
            }
        }
    }
}

impl Default for LogReactor {
    fn default() -> LogReactor {
        LogReactor::new()
    }
}

fn preview(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

impl ReactorCallbacks for LogReactor {
    fn on_listen(&mut self, _ctx: &mut Reactor, _listener_id: SlotId, _accepted_id: SlotId) {}

    fn on_connect(&mut self, _ctx: &mut Reactor, _id: SlotId, _errno: i32) {}

    fn on_recv(&mut self, _ctx: &mut Reactor, _id: SlotId, _buf: Box<[u8]>, _peer_addr: Option<SocketAddr>) -> bool {
        false
    }

    fn on_error(&mut self, _ctx: &mut Reactor, _id: SlotId, _what: ErrorKind) {}

    fn on_timeout(&mut self, _ctx: &mut Reactor, _timer_id: i32) {}

    fn on_command(&mut self, _ctx: &mut Reactor, _source: ReactorHandle, command: i32, data: Box<[u8]>) -> bool {
        self.record(command, &data);
        false
    }
}

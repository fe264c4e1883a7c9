use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};

use crate::epoll::{Epoll, EpollOpt, Evented, Ready, Token};

use super::fd::FileDesc;

/// The command channel's transport: a `pipe(2)` pair registered with the
/// reactor's epoll instance on the read end.
///
/// Writes up to `PIPE_BUF` bytes are atomic on POSIX, which is what lets
/// multiple producer threads push framed commands without a lock.
pub struct SelfPipe {
    reader: FileDesc,
    writer: FileDesc,
}

impl SelfPipe {
    pub fn new() -> io::Result<SelfPipe> {
        let mut fds = [0; 2];
        syscall!(pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK))?;

        Ok(SelfPipe {
            reader: unsafe { FileDesc::new(fds[0]) },
            writer: unsafe { FileDesc::new(fds[1]) },
        })
    }

    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (&self.writer).write(buf)
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.reader).read(buf)
    }

    pub fn writer_fd(&self) -> RawFd {
        self.writer.as_raw_fd()
    }
}

impl Evented for SelfPipe {
    fn add(&self, epoll: &Epoll, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()> {
        epoll.add(&self.reader.as_raw_fd(), token, interest, opts)
    }

    fn modify(&self, epoll: &Epoll, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()> {
        epoll.modify(&self.reader.as_raw_fd(), token, interest, opts)
    }

    fn delete(&self, epoll: &Epoll) -> io::Result<()> {
        epoll.delete(&self.reader.as_raw_fd())
    }
}

#[cfg(test)]
mod test {
    use super::SelfPipe;

    #[test]
    fn write_then_read() {
        let pipe = SelfPipe::new().unwrap();
        pipe.write(b"hi").unwrap();

        let mut buf = [0u8; 8];
        let n = pipe.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hi");
    }

    #[test]
    fn read_empty_would_block() {
        let pipe = SelfPipe::new().unwrap();
        let mut buf = [0u8; 8];
        let err = pipe.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }
}

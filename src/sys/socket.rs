use std::io::{self, Error, ErrorKind};
use std::mem;
use std::net::{Shutdown, SocketAddr, SocketAddrV4, SocketAddrV6};

use libc::{self, c_int, c_void, sockaddr, socklen_t, MSG_PEEK, SOCK_CLOEXEC};

use super::commom::{FromInner, IntoInner};
use super::fd::FileDesc;

pub fn setsockopt<T>(sock: &Socket, opt: c_int, val: c_int, payload: T) -> io::Result<()> {
    let payload = &payload as *const T as *const c_void;
    syscall!(setsockopt(
        sock.0.raw(),
        opt,
        val,
        payload,
        mem::size_of::<T>() as libc::socklen_t
    ))?;
    Ok(())
}

pub fn getsockopt<T: Copy>(sock: &Socket, opt: c_int, val: c_int) -> io::Result<T> {
    let mut slot: T = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<T>() as libc::socklen_t;
    syscall!(getsockopt(
        sock.0.raw(),
        opt,
        val,
        &mut slot as *mut _ as *mut _,
        &mut len
    ))?;
    assert_eq!(len as usize, mem::size_of::<T>());
    Ok(slot)
}

struct _SocketAddrV4 {
    pub inner: libc::sockaddr_in,
}

struct _SocketAddrV6 {
    pub inner: libc::sockaddr_in6,
}

impl FromInner<libc::sockaddr_in> for SocketAddrV4 {
    fn from_inner(addr: libc::sockaddr_in) -> SocketAddrV4 {
        unsafe { mem::transmute(_SocketAddrV4 { inner: addr }) }
    }
}

impl FromInner<libc::sockaddr_in6> for SocketAddrV6 {
    fn from_inner(addr: libc::sockaddr_in6) -> SocketAddrV6 {
        unsafe { mem::transmute(_SocketAddrV6 { inner: addr }) }
    }
}

impl<'a> IntoInner<(*const libc::sockaddr, libc::socklen_t)> for &'a SocketAddr {
    fn into_inner(self) -> (*const libc::sockaddr, libc::socklen_t) {
        match *self {
            SocketAddr::V4(ref a) => (
                a as *const _ as *const _,
                mem::size_of_val(a) as libc::socklen_t,
            ),
            SocketAddr::V6(ref a) => (
                a as *const _ as *const _,
                mem::size_of_val(a) as libc::socklen_t,
            ),
        }
    }
}

pub fn sockaddr_to_addr(storage: &libc::sockaddr_storage, len: usize) -> io::Result<SocketAddr> {
    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            assert!(len >= mem::size_of::<libc::sockaddr_in>());
            Ok(SocketAddr::V4(FromInner::from_inner(unsafe {
                *(storage as *const _ as *const libc::sockaddr_in)
            })))
        }
        libc::AF_INET6 => {
            assert!(len >= mem::size_of::<libc::sockaddr_in6>());
            Ok(SocketAddr::V6(FromInner::from_inner(unsafe {
                *(storage as *const _ as *const libc::sockaddr_in6)
            })))
        }
        _ => Err(Error::new(ErrorKind::InvalidInput, "invalid argument")),
    }
}

/// A raw, always-nonblocking socket.
///
/// Higher layers never block on it: connect returns as soon as the kernel
/// accepts or defers the attempt, and reads/writes surface `WouldBlock`
/// instead of waiting.
pub struct Socket(FileDesc);

impl Socket {
    pub fn new(addr: &SocketAddr, ty: c_int) -> io::Result<Socket> {
        let fam = match *addr {
            SocketAddr::V4(..) => libc::AF_INET,
            SocketAddr::V6(..) => libc::AF_INET6,
        };
        Socket::new_raw(fam, ty)
    }

    pub fn new_raw(fam: c_int, ty: c_int) -> io::Result<Socket> {
        match syscall!(socket(fam, ty | SOCK_CLOEXEC, 0)) {
            Ok(fd) => return Ok(Socket(unsafe { FileDesc::new(fd) })),
            Err(ref e) if e.raw_os_error() == Some(libc::EINVAL) => {}
            Err(e) => return Err(e),
        }

        let fd = syscall!(socket(fam, ty, 0))?;
        let socket = Socket(unsafe { FileDesc::new(fd) });
        socket.set_nonblocking(true)?;
        Ok(socket)
    }

    /// Begin a nonblocking connect. Returns `Ok(true)` if the connection
    /// completed synchronously, `Ok(false)` if it is in progress and the
    /// caller must wait for write-readiness and then call [`take_error`].
    ///
    /// [`take_error`]: Socket::take_error
    pub fn connect_nonblocking(&self, addr: &SocketAddr) -> io::Result<bool> {
        self.set_nonblocking(true)?;
        let (addrp, len) = addr.into_inner();

        match syscall!(connect(self.0.raw(), addrp, len)) {
            Ok(_) => Ok(true),
            Err(ref e) if e.raw_os_error() == Some(libc::EINPROGRESS) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn bind(&self, addr: &SocketAddr) -> io::Result<()> {
        let (addrp, len) = addr.into_inner();
        syscall!(bind(self.0.raw(), addrp, len))?;
        Ok(())
    }

    pub fn listen(&self, backlog: i32) -> io::Result<()> {
        syscall!(listen(self.0.raw(), backlog))?;
        Ok(())
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        unsafe {
            let mut storage: libc::sockaddr_storage = mem::zeroed();
            let mut len = mem::size_of_val(&storage) as libc::socklen_t;
            syscall!(getsockname(
                self.0.raw(),
                &mut storage as *mut _ as *mut _,
                &mut len
            ))?;
            sockaddr_to_addr(&storage, len as usize)
        }
    }

    pub fn accept(&self) -> io::Result<(Socket, SocketAddr)> {
        unsafe {
            let mut storage: libc::sockaddr_storage = mem::zeroed();
            let mut len = mem::size_of_val(&storage) as libc::socklen_t;
            let storage_ptr = &mut storage as *mut _ as *mut sockaddr;
            let len_ptr = &mut len as *mut socklen_t;

            let fd = match syscall!(accept4(self.0.raw(), storage_ptr, len_ptr, SOCK_CLOEXEC)) {
                Ok(fd) => fd,
                Err(ref e) if e.raw_os_error() == Some(libc::ENOSYS) => {
                    let fd = syscall!(accept(self.0.raw(), storage_ptr, len_ptr))?;
                    let sock = Socket(FileDesc::new(fd));
                    sock.0.set_cloexec()?;
                    sock.set_nonblocking(true)?;
                    return Ok((sock, sockaddr_to_addr(&storage, len as usize)?));
                }
                Err(e) => return Err(e),
            };

            let sock = Socket(FileDesc::new(fd));
            sock.set_nonblocking(true)?;
            Ok((sock, sockaddr_to_addr(&storage, len as usize)?))
        }
    }

    fn recv_with_flags(&self, buf: &mut [u8], flags: c_int) -> io::Result<usize> {
        let ret = syscall!(recv(
            self.0.raw(),
            buf.as_mut_ptr() as *mut c_void,
            buf.len(),
            flags
        ))?;
        Ok(ret as usize)
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv_with_flags(buf, 0)
    }

    pub fn peek(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv_with_flags(buf, MSG_PEEK)
    }

    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        unsafe {
            let mut storage: libc::sockaddr_storage = mem::zeroed();
            let mut addrlen = mem::size_of_val(&storage) as libc::socklen_t;

            let n = syscall!(recvfrom(
                self.0.raw(),
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
                0,
                &mut storage as *mut _ as *mut _,
                &mut addrlen
            ))?;
            Ok((n as usize, sockaddr_to_addr(&storage, addrlen as usize)?))
        }
    }

    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    pub fn send_to(&self, buf: &[u8], addr: &SocketAddr) -> io::Result<usize> {
        let (addrp, len) = addr.into_inner();
        let ret = syscall!(sendto(
            self.0.raw(),
            buf.as_ptr() as *const c_void,
            buf.len(),
            0,
            addrp,
            len
        ))?;
        Ok(ret as usize)
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        let how = match how {
            Shutdown::Write => libc::SHUT_WR,
            Shutdown::Read => libc::SHUT_RD,
            Shutdown::Both => libc::SHUT_RDWR,
        };
        syscall!(shutdown(self.0.raw(), how))?;
        Ok(())
    }

    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        setsockopt(self, libc::IPPROTO_TCP, libc::TCP_NODELAY, nodelay as c_int)
    }

    pub fn set_reuseaddr(&self, reuse: bool) -> io::Result<()> {
        setsockopt(self, libc::SOL_SOCKET, libc::SO_REUSEADDR, reuse as c_int)
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        let mut nonblocking = nonblocking as libc::c_int;
        syscall!(ioctl(self.0.raw(), libc::FIONBIO, &mut nonblocking)).map(|_| ())
    }

    /// Reads and clears `SO_ERROR`. `None` means the socket is healthy;
    /// this is how a completed nonblocking connect is checked for success.
    pub fn take_error(&self) -> io::Result<Option<io::Error>> {
        let raw: c_int = getsockopt(self, libc::SOL_SOCKET, libc::SO_ERROR)?;
        if raw == 0 {
            Ok(None)
        } else {
            Ok(Some(io::Error::from_raw_os_error(raw)))
        }
    }
}

impl std::os::unix::io::AsRawFd for Socket {
    fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        self.0.raw()
    }
}

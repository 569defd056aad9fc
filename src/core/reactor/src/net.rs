// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Socket constructors for the shared listening ports.
//!
//! Every worker binds its own listener and UDP socket on the same address
//! with `SO_REUSEADDR | SO_REUSEPORT`, letting the kernel distribute
//! connections and datagrams across workers. mio's wrappers do not expose
//! `SO_REUSEPORT`, so the sockets are created through libc and handed to
//! mio once configured.

use mio::net::{TcpListener, UdpSocket};
use std::io::{Error, ErrorKind, Result};
use std::net::SocketAddr;
use std::os::unix::io::FromRawFd;

fn socket(addr: &SocketAddr, kind: libc::c_int) -> Result<libc::c_int> {
    let domain = match addr {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    };

    let fd = unsafe {
        libc::socket(
            domain,
            kind | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            0,
        )
    };
    if fd < 0 {
        return Err(Error::last_os_error());
    }

    let one: libc::c_int = 1;
    for opt in [libc::SO_REUSEADDR, libc::SO_REUSEPORT] {
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                opt,
                &one as *const libc::c_int as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            let e = Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(e);
        }
    }

    Ok(fd)
}

fn bind(fd: libc::c_int, addr: &SocketAddr) -> Result<()> {
    let rc = match addr {
        SocketAddr::V4(v4) => {
            let sin = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: v4.port().to_be(),
                sin_addr: libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.ip().octets()),
                },
                sin_zero: [0; 8],
            };
            unsafe {
                libc::bind(
                    fd,
                    &sin as *const libc::sockaddr_in as *const libc::sockaddr,
                    std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                )
            }
        }
        SocketAddr::V6(v6) => {
            let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_addr.s6_addr = v6.ip().octets();
            unsafe {
                libc::bind(
                    fd,
                    &sin6 as *const libc::sockaddr_in6 as *const libc::sockaddr,
                    std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
                )
            }
        }
    };
    if rc < 0 {
        let e = Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(e);
    }
    Ok(())
}

/// Binds and listens a non-blocking TCP socket with the shared-port
/// options set.
pub fn tcp_listener(addr: SocketAddr, backlog: usize) -> Result<TcpListener> {
    let fd = socket(&addr, libc::SOCK_STREAM)?;
    bind(fd, &addr)?;

    let backlog = libc::c_int::try_from(backlog)
        .map_err(|_| Error::new(ErrorKind::InvalidInput, "backlog out of range"))?;
    if unsafe { libc::listen(fd, backlog) } < 0 {
        let e = Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(e);
    }

    Ok(unsafe { TcpListener::from_raw_fd(fd) })
}

/// Binds a non-blocking UDP socket with the shared-port options set.
pub fn udp_socket(addr: SocketAddr) -> Result<UdpSocket> {
    let fd = socket(&addr, libc::SOCK_DGRAM)?;
    bind(fd, &addr)?;
    Ok(unsafe { UdpSocket::from_raw_fd(fd) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_port_tcp_listeners() {
        let a = tcp_listener("127.0.0.1:0".parse().unwrap(), 128).unwrap();
        let addr = a.local_addr().unwrap();
        // a second listener on the same port must succeed
        let b = tcp_listener(addr, 128).unwrap();
        assert_eq!(b.local_addr().unwrap(), addr);
    }

    #[test]
    fn shared_port_udp_sockets() {
        let a = udp_socket("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = a.local_addr().unwrap();
        let b = udp_socket(addr).unwrap();
        assert_eq!(b.local_addr().unwrap(), addr);
    }

    #[test]
    fn bind_failure_is_reported() {
        // port 1 requires privileges in most environments; accept either
        // outcome but require a clean error (not a panic) when it fails
        let result = tcp_listener("8.8.8.8:1".parse().unwrap(), 1);
        assert!(result.is_err());
    }
}

//! Low-level socket creation.
//!
//! Sockets that need options tokio cannot set after the fact (address
//! reuse, broadcast) are created through `socket2`, switched to
//! non-blocking mode and handed to tokio.

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};

fn domain_for(addr: SocketAddr) -> Domain {
    if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    }
}

/// Create a bound, non-blocking TCP listener with address reuse.
pub(crate) fn bind_tcp_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(domain_for(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Create a bound, non-blocking UDP socket, optionally broadcast-capable.
pub(crate) fn bind_udp(addr: SocketAddr, broadcast: bool) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(domain_for(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    if broadcast {
        socket.set_broadcast(true)?;
    }
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_udp_broadcast() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let socket = bind_udp(addr, true).unwrap();
        assert!(socket.broadcast().unwrap());
    }

    #[test]
    fn test_bind_tcp_listener() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = bind_tcp_listener(addr).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}

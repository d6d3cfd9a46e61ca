use std::io;
use std::net::{Shutdown, SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, Type};

/// Open the worker's datagram socket.
///
/// Reads block for at most `poll_interval`, which is what bounds the worker's
/// reaction time to its deadline and to `stop()`. An IPv6 bind address gets a
/// dual-stack socket so IPv4 endpoints stay reachable.
pub fn open_probe_socket(bind_addr: SocketAddr, poll_interval: Duration) -> io::Result<UdpSocket> {
    let domain = match bind_addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if domain == Domain::IPV6 {
        socket.set_only_v6(false)?;
    }
    socket.set_read_timeout(Some(poll_interval))?;
    socket.bind(&bind_addr.into())?;

    Ok(socket.into())
}

/// Shut the socket down in both directions, waking a blocked reader.
///
/// Errors are ignored: an unconnected UDP socket may report `ENOTCONN` even
/// though the shutdown took effect.
pub fn shutdown(socket: &UdpSocket) {
    let _ = SockRef::from(socket).shutdown(Shutdown::Both);
}

/// Address to send to, rejecting combinations the socket cannot reach.
pub fn destination(local: SocketAddr, target: SocketAddr) -> Option<SocketAddr> {
    if target.port() == 0 {
        return None;
    }
    match (local, target) {
        (SocketAddr::V4(_), SocketAddr::V6(_)) => None,
        (SocketAddr::V6(_), SocketAddr::V4(v4)) => {
            Some(SocketAddr::new(v4.ip().to_ipv6_mapped().into(), v4.port()))
        }
        _ => Some(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    fn v4(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn v6(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), port)
    }

    #[test]
    fn opens_with_read_timeout() {
        let socket = open_probe_socket(v4(0), Duration::from_millis(100)).unwrap();
        assert_eq!(socket.read_timeout().unwrap(), Some(Duration::from_millis(100)));
        assert_ne!(socket.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn recv_gives_up_after_poll_interval() {
        let socket = open_probe_socket(v4(0), Duration::from_millis(50)).unwrap();
        let mut buf = [0u8; 4];
        let err = socket.recv_from(&mut buf).unwrap_err();
        assert!(matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut));
    }

    #[test]
    fn destination_rules() {
        assert_eq!(destination(v4(0), v4(3075)), Some(v4(3075)));
        assert_eq!(destination(v4(0), v6(3075)), None);
        assert_eq!(destination(v4(0), v4(0)), None);

        let mapped = destination(v6(0), v4(3075)).unwrap();
        assert!(mapped.is_ipv6());
        assert_eq!(mapped.ip().to_canonical(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}

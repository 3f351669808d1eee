//! Normalized peer network addresses.

use std::{
    fmt,
    net::{IpAddr, Ipv6Addr, SocketAddr, SocketAddrV6},
};

/// A peer's network address, normalized to a v6-mapped representation so two channels to the
/// "same" peer always compare equal regardless of whether the underlying socket was v4 or v6.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(SocketAddrV6);

impl Endpoint {
    pub fn new(addr: SocketAddr) -> Self {
        let v6 = match addr {
            SocketAddr::V4(v4) => {
                SocketAddrV6::new(v4.ip().to_ipv6_mapped(), v4.port(), 0, 0)
            }
            SocketAddr::V6(v6) => v6,
        };
        Self(v6)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V6(self.0)
    }

    pub fn ip(&self) -> Ipv6Addr {
        *self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_and_mapped_v6_are_equal() {
        let v4: SocketAddr = "127.0.0.1:7075".parse().unwrap();
        let v6: SocketAddr = "[::ffff:127.0.0.1]:7075".parse().unwrap();
        assert_eq!(Endpoint::new(v4), Endpoint::new(v6));
    }
}

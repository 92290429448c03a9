//! Address types shared by every layer of the engine: tagged IP addresses,
//! interface addresses with their derived broadcast and solicited-node
//! multicast forms, socket addresses and the four-tuple used as the socket
//! demultiplexing key.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use ipnetwork::{Ipv4Network, Ipv6Network};

/// Address family selector used where an operation needs a family but no
/// concrete address, such as buffer allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Af {
    V4,
    V6,
}

impl Af {
    /// Length of an address of this family in bytes.
    pub fn addr_len(&self) -> u16 {
        match *self {
            Af::V4 => 4,
            Af::V6 => 16,
        }
    }

    /// Length of an IP header (without options) of this family.
    pub fn ip_hdr_len(&self) -> u16 {
        match *self {
            Af::V4 => 20,
            Af::V6 => 40,
        }
    }
}

/// A tagged IPv4 or IPv6 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Addr {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl Addr {
    pub fn af(&self) -> Af {
        match *self {
            Addr::V4(..) => Af::V4,
            Addr::V6(..) => Af::V6,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        match *self {
            Addr::V4(a) => a.is_unspecified(),
            Addr::V6(a) => a.is_unspecified(),
        }
    }

    /// Whether this is a link-local address (`169.254.0.0/16` or
    /// `fe80::/10`).
    pub fn is_linklocal(&self) -> bool {
        match *self {
            Addr::V4(a) => a.octets()[0] == 169 && a.octets()[1] == 254,
            Addr::V6(a) => a.octets()[0] == 0xfe && (a.octets()[1] & 0xc0) == 0x80,
        }
    }

    /// Whether this is a private (RFC 1918) or unique-local address.
    pub fn is_private(&self) -> bool {
        match *self {
            Addr::V4(a) => {
                let o = a.octets();
                o[0] == 10 || (o[0] == 172 && o[1] & 0xf0 == 16) || (o[0] == 192 && o[1] == 168)
            }
            Addr::V6(a) => a.octets()[0] & 0xfe == 0xfc,
        }
    }
}

impl From<IpAddr> for Addr {
    fn from(ip: IpAddr) -> Addr {
        match ip {
            IpAddr::V4(a) => Addr::V4(a),
            IpAddr::V6(a) => Addr::V6(a),
        }
    }
}

impl From<Addr> for IpAddr {
    fn from(a: Addr) -> IpAddr {
        match a {
            Addr::V4(a) => IpAddr::V4(a),
            Addr::V6(a) => IpAddr::V6(a),
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Addr::V4(a) => a.fmt(f),
            Addr::V6(a) => a.fmt(f),
        }
    }
}

/// Construct the solicited-node multicast address of `addr`: the fixed
/// prefix `ff02::1:ff00:0/104` followed by the low 24 bits of `addr`.
pub fn solicited_node_multicast(addr: &Ipv6Addr) -> Ipv6Addr {
    let o = addr.octets();
    Ipv6Addr::new(0xff02,
                  0,
                  0,
                  0,
                  0,
                  1,
                  0xff00 | o[13] as u16,
                  (o[14] as u16) << 8 | o[15] as u16)
}

/// One address configured on the engine's interface, together with the
/// derived forms the receive and neighbor-discovery paths match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfAddr {
    V4 {
        addr: Ipv4Addr,
        /// Contiguous prefix length.
        prefix: u8,
        /// Directed broadcast address of the prefix.
        bcast: Ipv4Addr,
    },
    V6 {
        addr: Ipv6Addr,
        prefix: u8,
        /// All-ones host part of the prefix.
        bcast: Ipv6Addr,
        /// Solicited-node multicast address of `addr`.
        snma: Ipv6Addr,
        /// IPv6 scope identifier.
        scope_id: u32,
    },
}

impl IfAddr {
    /// Build an IPv4 interface address, deriving the directed broadcast
    /// from the prefix length.
    pub fn v4(addr: Ipv4Addr, prefix: u8) -> IfAddr {
        let bcast = match Ipv4Network::new(addr, prefix) {
            Ok(net) => net.broadcast(),
            Err(..) => Ipv4Addr::new(255, 255, 255, 255),
        };
        IfAddr::V4 {
            addr: addr,
            prefix: prefix,
            bcast: bcast,
        }
    }

    /// Build an IPv6 interface address, deriving the all-ones host form and
    /// the solicited-node multicast from the prefix length.
    pub fn v6(addr: Ipv6Addr, prefix: u8, scope_id: u32) -> IfAddr {
        let bcast = match Ipv6Network::new(addr, prefix) {
            Ok(net) => {
                let mask = net.mask().octets();
                let mut o = addr.octets();
                for i in 0..16 {
                    o[i] |= !mask[i];
                }
                Ipv6Addr::from(o)
            }
            Err(..) => addr,
        };
        IfAddr::V6 {
            addr: addr,
            prefix: prefix,
            bcast: bcast,
            snma: solicited_node_multicast(&addr),
            scope_id: scope_id,
        }
    }

    pub fn addr(&self) -> Addr {
        match *self {
            IfAddr::V4 { addr, .. } => Addr::V4(addr),
            IfAddr::V6 { addr, .. } => Addr::V6(addr),
        }
    }

    pub fn af(&self) -> Af {
        self.addr().af()
    }

    pub fn prefix(&self) -> u8 {
        match *self {
            IfAddr::V4 { prefix, .. } | IfAddr::V6 { prefix, .. } => prefix,
        }
    }

    pub fn scope_id(&self) -> u32 {
        match *self {
            IfAddr::V4 { .. } => 0,
            IfAddr::V6 { scope_id, .. } => scope_id,
        }
    }

    /// Whether `dst` falls inside this address's prefix.
    pub fn contains(&self, dst: &Addr) -> bool {
        match (*self, *dst) {
            (IfAddr::V4 { addr, prefix, .. }, Addr::V4(d)) => {
                match Ipv4Network::new(addr, prefix) {
                    Ok(net) => net.contains(d),
                    Err(..) => false,
                }
            }
            (IfAddr::V6 { addr, prefix, .. }, Addr::V6(d)) => {
                match Ipv6Network::new(addr, prefix) {
                    Ok(net) => net.contains(d),
                    Err(..) => false,
                }
            }
            _ => false,
        }
    }
}

/// An IP address and a port number, in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SockAddr {
    pub addr: Addr,
    pub port: u16,
}

impl SockAddr {
    pub fn new(addr: Addr, port: u16) -> SockAddr {
        SockAddr {
            addr: addr,
            port: port,
        }
    }
}

impl From<SocketAddr> for SockAddr {
    fn from(sa: SocketAddr) -> SockAddr {
        SockAddr {
            addr: Addr::from(sa.ip()),
            port: sa.port(),
        }
    }
}

impl From<SockAddr> for SocketAddr {
    fn from(sa: SockAddr) -> SocketAddr {
        SocketAddr::new(sa.addr.into(), sa.port)
    }
}

impl fmt::Display for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.addr {
            Addr::V4(..) => write!(f, "{}:{}", self.addr, self.port),
            Addr::V6(..) => write!(f, "[{}]:{}", self.addr, self.port),
        }
    }
}

/// The socket demultiplexing key: local address and port plus, for a
/// connected socket, the remote address and port. A bound-only listener has
/// `remote == None`, so it hashes and compares differently from every
/// connected flow on the same local port and the two can coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SockTuple {
    pub local: SockAddr,
    pub remote: Option<SockAddr>,
}

impl SockTuple {
    pub fn bound(local: SockAddr) -> SockTuple {
        SockTuple {
            local: local,
            remote: None,
        }
    }

    pub fn connected(local: SockAddr, remote: SockAddr) -> SockTuple {
        SockTuple {
            local: local,
            remote: Some(remote),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;

    #[test]
    fn snma_low_24_bits() {
        let snma = solicited_node_multicast(&"fe80::2".parse().unwrap());
        assert_eq!(snma, "ff02::1:ff00:2".parse::<Ipv6Addr>().unwrap());

        let snma = solicited_node_multicast(&"2001:db8::abcd:ef12".parse().unwrap());
        assert_eq!(snma, "ff02::1:ffcd:ef12".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn v4_directed_broadcast() {
        let ia = IfAddr::v4(Ipv4Addr::new(10, 0, 0, 1), 24);
        match ia {
            IfAddr::V4 { bcast, .. } => assert_eq!(bcast, Ipv4Addr::new(10, 0, 0, 255)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn contains_respects_prefix() {
        let ia = IfAddr::v4(Ipv4Addr::new(10, 0, 0, 1), 24);
        assert!(ia.contains(&Addr::V4(Ipv4Addr::new(10, 0, 0, 77))));
        assert!(!ia.contains(&Addr::V4(Ipv4Addr::new(10, 0, 1, 77))));
        assert!(!ia.contains(&Addr::V6("::1".parse().unwrap())));
    }

    #[test]
    fn bound_and_connected_tuples_coexist() {
        let local = SockAddr::new(Addr::V4(Ipv4Addr::new(10, 0, 0, 1)), 443);
        let remote = SockAddr::new(Addr::V4(Ipv4Addr::new(10, 0, 0, 2)), 6000);

        let mut map = HashMap::new();
        map.insert(SockTuple::bound(local), "listener");
        map.insert(SockTuple::connected(local, remote), "flow");

        assert_eq!(map.len(), 2);
        assert_eq!(map[&SockTuple::bound(local)], "listener");
        assert_eq!(map[&SockTuple::connected(local, remote)], "flow");
    }

    #[test]
    fn linklocal_and_private() {
        assert!(Addr::V4(Ipv4Addr::new(169, 254, 3, 4)).is_linklocal());
        assert!(Addr::V6("fe80::1".parse().unwrap()).is_linklocal());
        assert!(Addr::V4(Ipv4Addr::new(192, 168, 1, 1)).is_private());
        assert!(Addr::V4(Ipv4Addr::new(172, 16, 0, 1)).is_private());
        assert!(!Addr::V4(Ipv4Addr::new(8, 8, 8, 8)).is_private());
    }
}

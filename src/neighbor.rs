//! The neighbor cache: IP address to link-layer address mappings learned
//! from ARP and IPv6 neighbor discovery, and the blocking resolution loop
//! the bypass transmit path uses to fill it.

use std::collections::HashMap;

use pnet::util::MacAddr;

use addr::Addr;
use arp;
use engine::Engine;
use icmpv6;
use util;

/// Map from IP address to link-layer address. A missing entry reads as the
/// broadcast sentinel, meaning "unresolved / query in progress".
#[derive(Debug, Default)]
pub struct NeighborTable {
    map: HashMap<Addr, MacAddr>,
}

impl NeighborTable {
    pub fn new() -> NeighborTable {
        NeighborTable { map: HashMap::new() }
    }

    /// Look up `addr`; the broadcast address means unresolved.
    pub fn find(&self, addr: &Addr) -> MacAddr {
        match self.map.get(addr) {
            Some(mac) => *mac,
            None => MacAddr::broadcast(),
        }
    }

    /// Insert or overwrite the mapping for `addr`. Every receive path that
    /// observes a sender's link-layer address calls this opportunistically.
    pub fn update(&mut self, addr: Addr, mac: MacAddr) {
        info!("neighbor cache entry: {} is at {}", addr, mac);
        self.map.insert(addr, mac);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Return the link-layer address for `addr`, resolving it first if the
/// cache has no entry. Resolution emits an ARP request (IPv4) or a neighbor
/// solicitation (IPv6) and blocks in the engine receive poll with a one
/// second timeout, re-querying until an answer arrives. Callers assume a
/// responsive peer; the loop is unbounded.
pub fn who_has(w: &mut Engine, addr: &Addr) -> MacAddr {
    let mut mac = w.neighbors.find(addr);
    while mac == MacAddr::broadcast() {
        info!("no neighbor entry for {}, sending query", addr);

        match *addr {
            Addr::V4(ip) => arp::who_has(w, ip),
            Addr::V6(ip) => icmpv6::neighbor_solicit(w, &ip),
        }

        // wait until packets have been received, then handle them
        w.nic_rx(util::NS_PER_S as i64);

        mac = w.neighbors.find(addr);
    }
    mac
}

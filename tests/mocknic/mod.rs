//! An in-memory NIC driver for driving a bypass engine from tests, plus
//! builders for the wire frames the tests inject.
//!
//! The mock keeps the netmap contract of the real collaborator: a buffer
//! region indexed in 2048-byte units, RX/TX rings whose slots carry buffer
//! indices, and index swaps flagged with `SLOT_BUF_CHANGED`. Frames given
//! to `MockHandle::inject` appear in the RX ring at the next poll; frames
//! the engine transmits come back out of `MockHandle::sent` after the
//! engine's `nic_tx`.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use pnet::packet::arp::{ArpHardwareTypes, ArpOperation, MutableArpPacket};
use pnet::packet::ethernet::{EtherType, EtherTypes, MutableEthernetPacket};
use pnet::packet::icmpv6::{Icmpv6Packet, MutableIcmpv6Packet};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, MutableIpv4Packet};
use pnet::packet::ipv6::MutableIpv6Packet;
use pnet::packet::udp::{self, MutableUdpPacket};
use pnet::packet::MutablePacket;
use pnet::util::MacAddr;

use std::net::{Ipv4Addr, Ipv6Addr};

use zudp::{Engine, IfAddr, InterfaceInfo, NicDriver, Ring};

const RING_SLOTS: u32 = 64;
const BUF_SIZE: usize = 2048;

#[derive(Default)]
struct MockShared {
    inbox: VecDeque<Vec<u8>>,
    outbox: Vec<Vec<u8>>,
}

/// Test-side handle to a [`MockNic`] that has been handed to an engine.
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Mutex<MockShared>>,
}

impl MockHandle {
    /// Queue a frame for the engine's next RX poll.
    pub fn inject(&self, frame: &[u8]) {
        self.shared.lock().unwrap().inbox.push_back(frame.to_vec());
    }

    /// Frames the engine has transmitted so far, draining the capture.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        ::std::mem::replace(&mut self.shared.lock().unwrap().outbox, Vec::new())
    }
}

pub struct MockNic {
    mem: Box<[u8]>,
    rx: Ring,
    tx: Ring,
    extra: Vec<u32>,
    shared: Arc<Mutex<MockShared>>,
}

impl MockNic {
    pub fn new(nbufs: u32) -> (MockNic, MockHandle) {
        let shared = Arc::new(Mutex::new(MockShared::default()));
        let nic = MockNic {
            mem: vec![0u8; (2 * RING_SLOTS + nbufs) as usize * BUF_SIZE].into_boxed_slice(),
            rx: Ring::new_rx(RING_SLOTS, 0),
            tx: Ring::new_tx(RING_SLOTS, RING_SLOTS),
            extra: (2 * RING_SLOTS..2 * RING_SLOTS + nbufs).collect(),
            shared: shared.clone(),
        };
        (nic, MockHandle { shared: shared })
    }
}

impl NicDriver for MockNic {
    fn buf_size(&self) -> u16 {
        BUF_SIZE as u16
    }

    fn region(&self) -> *mut u8 {
        self.mem.as_ptr() as *mut u8
    }

    fn region_len(&self) -> usize {
        self.mem.len()
    }

    fn take_extra_bufs(&mut self) -> Vec<u32> {
        ::std::mem::replace(&mut self.extra, Vec::new())
    }

    fn rx_rings(&self) -> u32 {
        1
    }

    fn tx_rings(&self) -> u32 {
        1
    }

    fn rx_ring(&mut self, _ri: u32) -> &mut Ring {
        &mut self.rx
    }

    fn tx_ring(&mut self, _ri: u32) -> &mut Ring {
        &mut self.tx
    }

    fn poll(&mut self, _nsec: i64) -> bool {
        let mut shared = self.shared.lock().unwrap();
        while let Some(frame) = shared.inbox.pop_front() {
            let tail = self.rx.tail;
            if self.rx.next(tail) == self.rx.head {
                shared.inbox.push_front(frame);
                break;
            }
            let len = ::std::cmp::min(frame.len(), BUF_SIZE);
            let s = &mut self.rx.slots[tail as usize];
            let off = s.buf_idx as usize * BUF_SIZE;
            self.mem[off..off + len].copy_from_slice(&frame[..len]);
            s.len = len as u16;
            s.flags = 0;
            self.rx.tail = self.rx.next(tail);
        }
        !self.rx.is_empty()
    }

    fn tx_sync(&mut self) {
        let mut shared = self.shared.lock().unwrap();
        while self.tx.next(self.tx.tail) != self.tx.head {
            let j = self.tx.next(self.tx.tail);
            let s = self.tx.slots[j as usize];
            let off = s.buf_idx as usize * BUF_SIZE;
            shared.outbox.push(self.mem[off..off + s.len as usize].to_vec());
            self.tx.tail = j;
        }
    }
}

pub const ENGINE_MAC: MacAddr = MacAddr(2, 0, 0, 0, 0, 1);
pub const PEER_MAC: MacAddr = MacAddr(2, 0, 0, 0, 0, 2);
pub const ENGINE_IP4: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const PEER_IP4: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

pub fn engine_ip6() -> Ipv6Addr {
    "fe80::1".parse().unwrap()
}

pub fn peer_ip6() -> Ipv6Addr {
    "fe80::2".parse().unwrap()
}

/// A bypass engine on a mock NIC with `10.0.0.1/24` and `fe80::1/64`
/// configured. `name` has to be unique per test, the engine registry is
/// process wide.
pub fn mock_engine(name: &str, nbufs: u32) -> (Engine, MockHandle) {
    let (nic, handle) = MockNic::new(nbufs);
    let mut info = InterfaceInfo::new(name, ENGINE_MAC, 1500);
    info.addrs = vec![IfAddr::v6(engine_ip6(), 64, 0), IfAddr::v4(ENGINE_IP4, 24)];
    let w = Engine::init_bypass(Box::new(nic), info, None).unwrap();
    (w, handle)
}

/// Parameters of a UDP-in-IPv4 test frame.
pub struct Udp4 {
    pub smac: MacAddr,
    pub dmac: MacAddr,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub sport: u16,
    pub dport: u16,
    pub payload: Vec<u8>,
    pub tos: u8,
    pub ttl: u8,
    pub frag_off: u16,
    /// Added to the correct UDP checksum, to corrupt it.
    pub cksum_add: u16,
}

impl Udp4 {
    pub fn new(dport: u16, payload: &[u8]) -> Udp4 {
        Udp4 {
            smac: PEER_MAC,
            dmac: ENGINE_MAC,
            src: PEER_IP4,
            dst: ENGINE_IP4,
            sport: 6666,
            dport: dport,
            payload: payload.to_vec(),
            tos: 0,
            ttl: 64,
            frag_off: 0,
            cksum_add: 0,
        }
    }
}

/// Build a complete Ethernet+IPv4+UDP frame.
pub fn udp4_frame(cfg: &Udp4) -> Vec<u8> {
    let udp_len = 8 + cfg.payload.len();
    let total = 20 + udp_len;
    let mut buf = vec![0u8; 14 + total];
    {
        let mut eth = MutableEthernetPacket::new(&mut buf).unwrap();
        eth.set_source(cfg.smac);
        eth.set_destination(cfg.dmac);
        eth.set_ethertype(EtherTypes::Ipv4);
    }
    {
        let mut ip = MutableIpv4Packet::new(&mut buf[14..]).unwrap();
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_dscp(cfg.tos >> 2);
        ip.set_ecn(cfg.tos & 0b11);
        ip.set_total_length(total as u16);
        ip.set_identification(0x4242);
        ip.set_ttl(cfg.ttl);
        ip.set_fragment_offset(cfg.frag_off);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
        ip.set_source(cfg.src);
        ip.set_destination(cfg.dst);
        let ck = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(ck);
    }
    {
        let mut u = MutableUdpPacket::new(&mut buf[34..]).unwrap();
        u.set_source(cfg.sport);
        u.set_destination(cfg.dport);
        u.set_length(udp_len as u16);
        u.payload_mut()[..cfg.payload.len()].copy_from_slice(&cfg.payload);
        let ck = udp::ipv4_checksum(&u.to_immutable(), &cfg.src, &cfg.dst);
        u.set_checksum(ck.wrapping_add(cfg.cksum_add));
    }
    buf
}

/// Build a complete Ethernet+IPv6+UDP frame.
pub fn udp6_frame(src: Ipv6Addr,
                  dst: Ipv6Addr,
                  sport: u16,
                  dport: u16,
                  payload: &[u8],
                  tc: u8)
                  -> Vec<u8> {
    let udp_len = 8 + payload.len();
    let mut buf = vec![0u8; 14 + 40 + udp_len];
    {
        let mut eth = MutableEthernetPacket::new(&mut buf).unwrap();
        eth.set_source(PEER_MAC);
        eth.set_destination(ENGINE_MAC);
        eth.set_ethertype(EtherTypes::Ipv6);
    }
    {
        let mut ip = MutableIpv6Packet::new(&mut buf[14..]).unwrap();
        ip.set_version(6);
        ip.set_traffic_class(tc);
        ip.set_payload_length(udp_len as u16);
        ip.set_next_header(IpNextHeaderProtocols::Udp);
        ip.set_hop_limit(64);
        ip.set_source(src);
        ip.set_destination(dst);
    }
    {
        let mut u = MutableUdpPacket::new(&mut buf[54..]).unwrap();
        u.set_source(sport);
        u.set_destination(dport);
        u.set_length(udp_len as u16);
        u.payload_mut()[..payload.len()].copy_from_slice(payload);
        let ck = udp::ipv6_checksum(&u.to_immutable(), &src, &dst);
        u.set_checksum(ck);
    }
    buf
}

/// Build an Ethernet+ARP frame.
pub fn arp_frame(op: ArpOperation,
                 sha: MacAddr,
                 spa: Ipv4Addr,
                 tha: MacAddr,
                 tpa: Ipv4Addr,
                 eth_dst: MacAddr)
                 -> Vec<u8> {
    let mut buf = vec![0u8; 14 + 28];
    {
        let mut eth = MutableEthernetPacket::new(&mut buf).unwrap();
        eth.set_source(sha);
        eth.set_destination(eth_dst);
        eth.set_ethertype(EtherTypes::Arp);
    }
    {
        let mut arp = MutableArpPacket::new(&mut buf[14..]).unwrap();
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(op);
        arp.set_sender_hw_addr(sha);
        arp.set_sender_proto_addr(spa);
        arp.set_target_hw_addr(tha);
        arp.set_target_proto_addr(tpa);
    }
    buf
}

/// Build an Ethernet+IPv6+ICMPv6 frame around a raw ICMPv6 message,
/// filling in the checksum.
pub fn icmp6_frame(smac: MacAddr,
                   dmac: MacAddr,
                   src: Ipv6Addr,
                   dst: Ipv6Addr,
                   msg: &[u8])
                   -> Vec<u8> {
    let mut buf = vec![0u8; 14 + 40 + msg.len()];
    {
        let mut eth = MutableEthernetPacket::new(&mut buf).unwrap();
        eth.set_source(smac);
        eth.set_destination(dmac);
        eth.set_ethertype(EtherTypes::Ipv6);
    }
    {
        let mut ip = MutableIpv6Packet::new(&mut buf[14..]).unwrap();
        ip.set_version(6);
        ip.set_payload_length(msg.len() as u16);
        ip.set_next_header(IpNextHeaderProtocols::Icmpv6);
        ip.set_hop_limit(255);
        ip.set_source(src);
        ip.set_destination(dst);
    }
    {
        buf[54..].copy_from_slice(msg);
        let ck = {
            let icmp = Icmpv6Packet::new(&buf[54..]).unwrap();
            ::pnet::packet::icmpv6::checksum(&icmp, &src, &dst)
        };
        MutableIcmpv6Packet::new(&mut buf[54..]).unwrap().set_checksum(ck);
    }
    buf
}

/// A neighbor advertisement message body for `target`, carrying a
/// target-link-layer-address option.
pub fn na_msg(target: Ipv6Addr, tll: MacAddr) -> Vec<u8> {
    let mut msg = vec![0u8; 32];
    msg[0] = 136;
    msg[4] = 0x60;
    msg[8..24].copy_from_slice(&target.octets());
    msg[24] = 2;
    msg[25] = 1;
    msg[26..32].copy_from_slice(&[tll.0, tll.1, tll.2, tll.3, tll.4, tll.5]);
    msg
}

/// A neighbor solicitation message body for `target`, carrying a
/// source-link-layer-address option.
pub fn ns_msg(target: Ipv6Addr, sla: MacAddr) -> Vec<u8> {
    let mut msg = vec![0u8; 32];
    msg[0] = 135;
    msg[8..24].copy_from_slice(&target.octets());
    msg[24] = 1;
    msg[25] = 1;
    msg[26..32].copy_from_slice(&[sla.0, sla.1, sla.2, sla.3, sla.4, sla.5]);
    msg
}

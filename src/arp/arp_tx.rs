use std::net::Ipv4Addr;

use pnet::packet::arp::{ArpHardwareTypes, ArpOperation, ArpOperations, ArpPacket,
                        MutableArpPacket};
use pnet::packet::ethernet::EtherTypes;
use pnet::util::MacAddr;

use engine::Engine;
use ethernet;
use iov::Iov;

/// Broadcast an ARP request asking for `target`.
pub(crate) fn who_has(w: &mut Engine, target: Ipv4Addr) {
    let spa = match w.first_v4() {
        Some(ip) => ip,
        None => return,
    };
    let mut v = match w.alloc_raw() {
        Some(v) => v,
        None => {
            error!("no more bufs; neighbor request not sent");
            return;
        }
    };

    let arp_end = (ethernet::HDR_LEN + ArpPacket::minimum_packet_size()) as u16;
    v.set_window(arp_end, 0);
    build(&mut v,
          ArpOperations::Request,
          w.mac,
          spa,
          MacAddr::zero(),
          target);
    ethernet::build(&mut v, w.mac, MacAddr::broadcast(), EtherTypes::Arp);

    info!("ARP request who has {} tell {}", target, spa);
    w.tx_and_free(v);
}

/// Answer an ARP request from `req_sha`/`req_spa` that asked for our
/// address `ip`.
pub(crate) fn is_at(w: &mut Engine, req_sha: MacAddr, req_spa: Ipv4Addr, ip: Ipv4Addr) {
    let mut v = match w.alloc_raw() {
        Some(v) => v,
        None => {
            error!("no more bufs; ARP reply not sent");
            return;
        }
    };

    let arp_end = (ethernet::HDR_LEN + ArpPacket::minimum_packet_size()) as u16;
    v.set_window(arp_end, 0);
    build(&mut v, ArpOperations::Reply, w.mac, ip, req_sha, req_spa);
    ethernet::build(&mut v, w.mac, req_sha, EtherTypes::Arp);

    info!("ARP reply {} is at {}", ip, w.mac);
    w.tx_and_free(v);
}

fn build(v: &mut Iov,
         op: ArpOperation,
         sha: MacAddr,
         spa: Ipv4Addr,
         tha: MacAddr,
         tpa: Ipv4Addr) {
    v.grow_front(ArpPacket::minimum_packet_size() as u16);
    let (off, len) = (v.off(), v.len());
    let mut arp = MutableArpPacket::new(v.window_mut(off, off + len)).unwrap();
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

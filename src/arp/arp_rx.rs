use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket};
use pnet::packet::ethernet::EtherTypes;

use addr::Addr;
use engine::Engine;
use ethernet;
use super::arp_tx;
use {RxError, RxResult};

/// Receive an ARP packet and react to it: answer requests that ask for one
/// of the engine's IPv4 addresses, and record the sender's mapping in the
/// neighbor cache either way.
pub(crate) fn rx(w: &mut Engine, frame: &[u8]) -> RxResult {
    let arp_bytes = &frame[ethernet::HDR_LEN..];
    if arp_bytes.len() < ArpPacket::minimum_packet_size() {
        return Err(RxError::InvalidLength);
    }
    let (hrd, pro, hln, pln, op, sha, spa, tpa) = {
        let arp = ArpPacket::new(arp_bytes).unwrap();
        (arp.get_hardware_type(),
         arp.get_protocol_type(),
         arp.get_hw_addr_len(),
         arp.get_proto_addr_len(),
         arp.get_operation(),
         arp.get_sender_hw_addr(),
         arp.get_sender_proto_addr(),
         arp.get_target_proto_addr())
    };

    if hrd != ArpHardwareTypes::Ethernet || hln != 6 {
        info!("unhandled ARP hardware format {} with len {}", hrd.0, hln);
        return Err(RxError::InvalidContent);
    }
    if pro != EtherTypes::Ipv4 || pln != 4 {
        info!("unhandled ARP protocol format 0x{:04x} with len {}", pro.0, pln);
        return Err(RxError::InvalidContent);
    }

    if op == ArpOperations::Request {
        info!("ARP request who has {} tell {}", tpa, spa);
        if w.ifaddr_match4(tpa, false).is_some() {
            arp_tx::is_at(w, sha, spa, tpa);
        } else {
            debug!("ignoring ARP request not asking for us");
        }
    } else if op == ArpOperations::Reply {
        info!("ARP reply {} is at {}", spa, sha);
    } else {
        info!("unhandled ARP operation {}", op.0);
        return Ok(false);
    }

    w.neighbors.update(Addr::V4(spa), sha);
    Ok(false)
}

use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::util::MacAddr;

use arp;
use engine::Engine;
use ipv4;
use ipv6;
use {RxError, RxResult};

/// Receive an Ethernet frame out of RX ring `ri`, slot `si`. This is the
/// lowest-level receive function, called once per inbound frame. Frames
/// not addressed to the engine's MAC, the broadcast address or an IPv6
/// multicast address are dropped here; everything else is dispatched on
/// the EtherType.
pub(crate) fn rx(w: &mut Engine, ri: u32, si: u32, frame: &[u8]) -> RxResult {
    if frame.len() < EthernetPacket::minimum_packet_size() {
        return Err(RxError::InvalidLength);
    }
    let (dst, src, ethertype) = {
        let eth = EthernetPacket::new(frame).unwrap();
        (eth.get_destination(), eth.get_source(), eth.get_ethertype())
    };
    debug!("Eth {} -> {}, type 0x{:04x}, len {}",
           src,
           dst,
           ethertype.0,
           frame.len());

    if dst != w.mac && dst != MacAddr::broadcast() && !(dst.0 == 0x33 && dst.1 == 0x33) {
        return Err(RxError::NoListener(format!("ethernet frame to {} not destined to us ({})",
                                               dst,
                                               w.mac)));
    }

    if ethertype == EtherTypes::Ipv6 {
        if w.have_ip6 {
            ipv6::rx(w, ri, si, frame)
        } else {
            Ok(false)
        }
    } else if ethertype == EtherTypes::Ipv4 {
        if w.have_ip4 {
            ipv4::rx(w, ri, si, frame)
        } else {
            Ok(false)
        }
    } else if ethertype == EtherTypes::Arp {
        if w.have_ip4 {
            arp::rx(w, frame)?;
        }
        Ok(false)
    } else {
        Err(RxError::NoListener(format!("unhandled ethertype 0x{:04x}", ethertype.0)))
    }
}

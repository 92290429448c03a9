use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv6::Ipv6Packet;

use addr::Af;
use engine::Engine;
use ethernet;
use icmpv6;
use udp;
use {RxError, RxResult};

/// Receive processing for an IPv6 packet: validate the version and the
/// destination (one of our addresses, its solicited-node multicast, or the
/// configured broadcast), then dispatch on the next header to UDP or
/// ICMPv6.
pub(crate) fn rx(w: &mut Engine, ri: u32, si: u32, frame: &[u8]) -> RxResult {
    let ip_bytes = &frame[ethernet::HDR_LEN..];
    if ip_bytes.len() < Ipv6Packet::minimum_packet_size() {
        return Err(RxError::InvalidLength);
    }

    let ip = Ipv6Packet::new(ip_bytes).unwrap();
    debug!("IPv6: {} -> {}, hlim {}, next-hdr {}, plen {}, tc 0x{:02x}",
           ip.get_source(),
           ip.get_destination(),
           ip.get_hop_limit(),
           ip.get_next_header().0,
           ip.get_payload_length(),
           ip.get_traffic_class());

    if ip.get_version() != 6 {
        error!("illegal IPv6 version {}", ip.get_version());
        return Err(RxError::InvalidContent);
    }

    if w.ifaddr_match6(ip.get_destination(), true).is_none() {
        return Err(RxError::NoListener(format!("IPv6 packet from {} to {} (not us)",
                                               ip.get_source(),
                                               ip.get_destination())));
    }

    let next = ip.get_next_header();
    drop(ip);
    if next == IpNextHeaderProtocols::Udp {
        udp::rx(w, ri, si, frame, Af::V6)
    } else if next == IpNextHeaderProtocols::Icmpv6 {
        icmpv6::rx(w, frame);
        Ok(false)
    } else {
        info!("unhandled next-header protocol {}", next.0);
        Ok(false)
    }
}

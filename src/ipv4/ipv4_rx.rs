use pnet::packet::icmp::{destination_unreachable, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{checksum, Ipv4Packet};

use addr::Af;
use engine::Engine;
use ethernet;
use icmp;
use udp;
use {RxError, RxResult};

/// Receive processing for an IPv4 packet: validate version, header length,
/// destination, checksum and fragmentation state, then dispatch to UDP or
/// ICMPv4. Unknown transport protocols draw an ICMP protocol-unreachable.
///
/// IPv4 options and fragments are unsupported and dropped.
pub(crate) fn rx(w: &mut Engine, ri: u32, si: u32, frame: &[u8]) -> RxResult {
    let ip_bytes = &frame[ethernet::HDR_LEN..];
    if ip_bytes.len() < Ipv4Packet::minimum_packet_size() {
        return Err(RxError::InvalidLength);
    }

    let ip = Ipv4Packet::new(ip_bytes).unwrap();
    debug!("IPv4: {} -> {}, dscp {}, ecn {}, ttl {}, id {}, proto {}, tot {}, cksum 0x{:04x}",
           ip.get_source(),
           ip.get_destination(),
           ip.get_dscp(),
           ip.get_ecn(),
           ip.get_ttl(),
           ip.get_identification(),
           ip.get_next_level_protocol().0,
           ip.get_total_length(),
           ip.get_checksum());

    if ip.get_version() != 4 {
        error!("illegal IPv4 version {}", ip.get_version());
        return Err(RxError::InvalidContent);
    }

    if ip.get_header_length() != 5 {
        debug!("no support for IP options");
        return Err(RxError::InvalidContent);
    }

    let total_len = ip.get_total_length() as usize;
    if total_len < Ipv4Packet::minimum_packet_size() || total_len > ip_bytes.len() {
        return Err(RxError::InvalidLength);
    }

    if w.ifaddr_match4(ip.get_destination(), true).is_none() {
        return Err(RxError::NoListener(format!("IPv4 packet from {} to {} (not us)",
                                               ip.get_source(),
                                               ip.get_destination())));
    }

    let want = checksum(&ip);
    if ip.get_checksum() != want {
        warn!("invalid IP checksum, received 0x{:04x} != 0x{:04x}",
              ip.get_checksum(),
              want);
        return Err(RxError::InvalidChecksum);
    }

    if ip.get_fragment_offset() != 0 {
        debug!("no support for IP fragments");
        return Err(RxError::InvalidContent);
    }

    let proto = ip.get_next_level_protocol();
    drop(ip);
    if proto == IpNextHeaderProtocols::Udp {
        udp::rx(w, ri, si, frame, Af::V4)
    } else if proto == IpNextHeaderProtocols::Icmp {
        icmp::rx(w, frame);
        Ok(false)
    } else {
        info!("unhandled IP protocol {}", proto.0);
        // be standards compliant and send an ICMP unreachable
        icmp::tx(w,
                 IcmpTypes::DestinationUnreachable,
                 destination_unreachable::IcmpCodes::DestinationProtocolUnreachable,
                 frame);
        Ok(false)
    }
}

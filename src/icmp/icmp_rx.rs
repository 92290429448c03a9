use std::cmp;

use pnet::packet::icmp::{checksum, destination_unreachable, IcmpCode, IcmpPacket, IcmpTypes};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;

use engine::Engine;
use ethernet;
use ipv4;
use super::icmp_tx;

/// Analyze an inbound ICMPv4 packet and react to it: echo requests are
/// answered, unreachable reports are logged. The caller has already
/// validated the enclosing IPv4 header.
pub(crate) fn rx(w: &mut Engine, frame: &[u8]) {
    let icmp_off = ethernet::HDR_LEN + ipv4::HDR_LEN as usize;
    let ip = Ipv4Packet::new(&frame[ethernet::HDR_LEN..]).unwrap();
    let ip_plen = (ip.get_total_length() as usize).saturating_sub(ipv4::HDR_LEN as usize);
    let icmp_len = cmp::min(ip_plen, frame.len() - icmp_off);
    if icmp_len < IcmpPacket::minimum_packet_size() {
        return;
    }
    let icmp = IcmpPacket::new(&frame[icmp_off..icmp_off + icmp_len]).unwrap();
    debug!("received ICMPv4 type {}, code {}",
           icmp.get_icmp_type().0,
           icmp.get_icmp_code().0);

    let want = checksum(&icmp);
    if icmp.get_checksum() != want {
        warn!("invalid ICMPv4 checksum, received 0x{:04x}", icmp.get_checksum());
        return;
    }

    match icmp.get_icmp_type() {
        IcmpTypes::EchoRequest => {
            // send an echo reply
            icmp_tx::tx(w, IcmpTypes::EchoReply, IcmpCode(0), frame);
        }
        IcmpTypes::DestinationUnreachable => {
            // the quoted packet starts after the 4 unused bytes
            let quoted = icmp.payload().get(4..).unwrap_or(&[]);
            let orig = Ipv4Packet::new(quoted);
            match icmp.get_icmp_code() {
                destination_unreachable::IcmpCodes::DestinationProtocolUnreachable => {
                    if let Some(orig) = orig {
                        warn!("received ICMPv4 protocol {} unreachable",
                              orig.get_next_level_protocol().0);
                    }
                }
                destination_unreachable::IcmpCodes::DestinationPortUnreachable => {
                    if let Some(orig) = orig {
                        let dport = quoted.get(20..28)
                            .and_then(|b| UdpPacket::new(b))
                            .map(|u| u.get_destination());
                        warn!("received ICMPv4 IP proto {} port {} unreachable",
                              orig.get_next_level_protocol().0,
                              dport.unwrap_or(0));
                    }
                }
                code => warn!("unhandled ICMPv4 code {}", code.0),
            }
        }
        t => warn!("unhandled ICMPv4 type {}", t.0),
    }
}

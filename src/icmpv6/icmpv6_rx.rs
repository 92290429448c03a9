use std::cmp;
use std::net::Ipv6Addr;

use pnet::packet::ethernet::EthernetPacket;
use pnet::packet::icmpv6::{checksum, Icmpv6Code, Icmpv6Packet, Icmpv6Types};
use pnet::packet::ipv6::Ipv6Packet;
use pnet::util::MacAddr;

use addr::Addr;
use engine::Engine;
use ethernet;
use ipv6;
use super::icmpv6_tx;
use super::{OPT_SOURCE_LL_ADDR, OPT_TARGET_LL_ADDR};

/// Walk the NDP options after `skip` bytes of message body and return the
/// link-layer address carried by the first option of type `want`, if any.
fn ll_addr_option(msg: &[u8], skip: usize, want: u8) -> Option<MacAddr> {
    let mut i = skip;
    while i + 8 <= msg.len() {
        let (t, l) = (msg[i], msg[i + 1]);
        if l == 0 {
            return None;
        }
        if t == want && l == 1 {
            let m = &msg[i + 2..i + 8];
            return Some(MacAddr::new(m[0], m[1], m[2], m[3], m[4], m[5]));
        }
        i += l as usize * 8;
    }
    None
}

fn target_of(msg: &[u8]) -> Option<Ipv6Addr> {
    let mut o = [0u8; 16];
    o.copy_from_slice(msg.get(8..24)?);
    Some(Ipv6Addr::from(o))
}

/// Analyze an inbound ICMPv6 packet and react to it: answer echo requests
/// and neighbor solicitations for our addresses, record advertised
/// neighbors, log unreachables. The caller has already validated the
/// enclosing IPv6 header.
pub(crate) fn rx(w: &mut Engine, frame: &[u8]) {
    let icmp_off = ethernet::HDR_LEN + ipv6::HDR_LEN as usize;
    let ip = Ipv6Packet::new(&frame[ethernet::HDR_LEN..]).unwrap();
    let (src6, dst6) = (ip.get_source(), ip.get_destination());
    let icmp_len = cmp::min(ip.get_payload_length() as usize,
                            frame.len().saturating_sub(icmp_off));
    if icmp_len < Icmpv6Packet::minimum_packet_size() {
        return;
    }
    let msg = &frame[icmp_off..icmp_off + icmp_len];
    let icmp = Icmpv6Packet::new(msg).unwrap();
    debug!("received ICMPv6 type {}, code {}",
           icmp.get_icmpv6_type().0,
           icmp.get_icmpv6_code().0);

    let want = checksum(&icmp, &src6, &dst6);
    if icmp.get_checksum() != want {
        warn!("invalid ICMPv6 checksum, received 0x{:04x}", icmp.get_checksum());
        return;
    }

    let eth_src = EthernetPacket::new(frame).unwrap().get_source();

    match icmp.get_icmpv6_type() {
        Icmpv6Types::NeighborAdvert => {
            let target = match target_of(msg) {
                Some(t) => t,
                None => return,
            };
            let tll = ll_addr_option(msg, 24, OPT_TARGET_LL_ADDR);
            info!("neighbor advertisement, {} is at {}",
                  target,
                  tll.unwrap_or(eth_src));
            w.neighbors.update(Addr::V6(target), tll.unwrap_or(eth_src));
        }

        Icmpv6Types::NeighborSolicit => {
            let target = match target_of(msg) {
                Some(t) => t,
                None => return,
            };
            let sla = ll_addr_option(msg, 24, OPT_SOURCE_LL_ADDR);
            match sla {
                Some(mac) => info!("neighbor solicitation, who has {} tell {}", target, mac),
                None => info!("neighbor solicitation, who has {}", target),
            }

            if w.ifaddr_match6(target, false).is_some() {
                icmpv6_tx::neighbor_advert(w, frame, &target, sla);

                // opportunistically store the ND mapping
                w.neighbors.update(Addr::V6(src6), sla.unwrap_or(eth_src));
            } else {
                debug!("received ICMPv6 neighbor solicitation for unknown address");
            }
        }

        Icmpv6Types::EchoRequest => {
            // send an echo reply
            icmpv6_tx::tx(w, Icmpv6Types::EchoReply, Icmpv6Code(0), frame);
        }

        Icmpv6Types::DestinationUnreachable => {
            match icmp.get_icmpv6_code().0 {
                super::UNREACH_PORT => {
                    warn!("received ICMPv6 port unreachable");
                }
                code => warn!("unhandled ICMPv6 code {}", code),
            }
        }

        t => debug!("unhandled ICMPv6 type {}", t.0),
    }
}

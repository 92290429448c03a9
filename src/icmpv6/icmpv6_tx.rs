use std::cmp;
use std::net::Ipv6Addr;

use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::icmpv6::{checksum, Icmpv6Code, Icmpv6Packet, Icmpv6Type, Icmpv6Types,
                           MutableIcmpv6Packet};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::util::MacAddr;

use addr::solicited_node_multicast;
use engine::Engine;
use ethernet;
use iov::Iov;
use ipv6;
use super::{HDR_LEN, NA_SOLICITED_OVERRIDE, OPT_SOURCE_LL_ADDR, OPT_TARGET_LL_ADDR};

/// Checksum the ICMPv6 message in `v`, wrap it in IPv6 and Ethernet
/// headers and put it on the wire.
fn finish(w: &mut Engine, mut v: Iov, src: Ipv6Addr, dst: Ipv6Addr, eth_dst: MacAddr) {
    {
        let msg = v.as_mut_slice();
        let ck = checksum(&Icmpv6Packet::new(msg).unwrap(), &src, &dst);
        MutableIcmpv6Packet::new(msg).unwrap().set_checksum(ck);
    }
    ipv6::build(&mut v,
                &ipv6::Ipv6Hdr {
                    src: src,
                    dst: dst,
                    tos: 0,
                    next: IpNextHeaderProtocols::Icmpv6,
                });
    ethernet::build(&mut v, w.mac, eth_dst, EtherTypes::Ipv6);
    w.tx_and_free(v);
}

/// Multicast a neighbor solicitation for `target` to its solicited-node
/// group, carrying our MAC in a source link-layer address option.
pub(crate) fn neighbor_solicit(w: &mut Engine, target: &Ipv6Addr) {
    let src = match w.first_v6() {
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

    let icmp_off = (ethernet::HDR_LEN + ipv6::HDR_LEN as usize) as u16;
    v.set_window(icmp_off, HDR_LEN + 16 + 8);
    {
        let msg = v.as_mut_slice();
        msg[0] = Icmpv6Types::NeighborSolicit.0;
        for b in &mut msg[1..8] {
            *b = 0;
        }
        msg[8..24].copy_from_slice(&target.octets());
        msg[24] = OPT_SOURCE_LL_ADDR;
        msg[25] = 1; // length in units of eight octets
        msg[26..32].copy_from_slice(&w.mac.octets());
    }

    info!("neighbor solicitation, who has {} tell {}", target, w.mac);

    // the frame goes to the multicast MAC mapped from the solicited-node
    // group: 33:33 plus the low 32 bits
    let snma = solicited_node_multicast(target);
    let o = snma.octets();
    let eth_dst = MacAddr::new(0x33, 0x33, o[12], o[13], o[14], o[15]);
    finish(w, v, src, snma, eth_dst);
}

/// Answer a neighbor solicitation for our address `target`: a neighbor
/// advertisement with the Solicited and Override flags and a target
/// link-layer address option, sent to the soliciting node.
pub(crate) fn neighbor_advert(w: &mut Engine,
                              frame: &[u8],
                              target: &Ipv6Addr,
                              req_sla: Option<MacAddr>) {
    let mut v = match w.alloc_raw() {
        Some(v) => v,
        None => {
            error!("no more bufs; neighbor advertisement not sent");
            return;
        }
    };

    let icmp_off = (ethernet::HDR_LEN + ipv6::HDR_LEN as usize) as u16;
    v.set_window(icmp_off, HDR_LEN + 16 + 8);
    {
        let msg = v.as_mut_slice();
        msg[0] = Icmpv6Types::NeighborAdvert.0;
        for b in &mut msg[1..8] {
            *b = 0;
        }
        msg[4] = NA_SOLICITED_OVERRIDE;
        msg[8..24].copy_from_slice(&target.octets());
        msg[24] = OPT_TARGET_LL_ADDR;
        msg[25] = 1;
        msg[26..32].copy_from_slice(&w.mac.octets());
    }

    info!("neighbor advertisement, {} is at {}", target, w.mac);

    let src_eth = EthernetPacket::new(frame).unwrap().get_source();
    let dst6 = Ipv6Packet::new(&frame[ethernet::HDR_LEN..]).unwrap().get_source();
    finish(w, v, *target, dst6, req_sla.unwrap_or(src_eth));
}

/// Build and send an ICMPv6 message of the given type and code in reaction
/// to the received packet in `frame`. Echo replies copy the request's id,
/// sequence number and payload; unreachables quote the offending IPv6
/// header plus eight bytes.
pub(crate) fn tx(w: &mut Engine, icmp_type: Icmpv6Type, icmp_code: Icmpv6Code, frame: &[u8]) {
    let mut v = match w.alloc_raw() {
        Some(v) => v,
        None => {
            error!("no more bufs; ICMPv6 not sent (type {}, code {})",
                   icmp_type.0,
                   icmp_code.0);
            return;
        }
    };
    info!("sending ICMPv6 type {}, code {}", icmp_type.0, icmp_code.0);

    let ip_off = ethernet::HDR_LEN;
    let icmp_off = (ip_off + ipv6::HDR_LEN as usize) as u16;
    let src_ip = Ipv6Packet::new(&frame[ip_off..]).unwrap();
    let plen = cmp::min(src_ip.get_payload_length(),
                        w.mtu - ipv6::HDR_LEN) as usize;

    let (head, data_off, data_len) = match icmp_type {
        Icmpv6Types::EchoReply => {
            let req = &frame[icmp_off as usize..];
            if req.len() < HDR_LEN as usize {
                w.free.push_front(v);
                return;
            }
            // copy id and seq from the echo request
            ([req[4], req[5], req[6], req[7]],
             icmp_off as usize + HDR_LEN as usize,
             plen.saturating_sub(HDR_LEN as usize))
        }
        Icmpv6Types::DestinationUnreachable => {
            // quote the IPv6 header plus 64 bits of the original packet
            ([0; 4], ip_off, ipv6::HDR_LEN as usize + 8)
        }
        t => {
            error!("don't know how to send ICMPv6 type {}", t.0);
            w.free.push_front(v);
            return;
        }
    };
    let data_len = cmp::min(data_len, frame.len().saturating_sub(data_off));

    v.set_window(icmp_off, HDR_LEN + data_len as u16);
    {
        let msg = v.as_mut_slice();
        msg[0] = icmp_type.0;
        msg[1] = icmp_code.0;
        msg[2] = 0;
        msg[3] = 0;
        msg[4..8].copy_from_slice(&head);
        msg[8..].copy_from_slice(&frame[data_off..data_off + data_len]);
    }

    let src_eth = EthernetPacket::new(frame).unwrap().get_source();
    let (src6, dst6) = (src_ip.get_destination(), src_ip.get_source());
    finish(w, v, src6, dst6, src_eth);
}

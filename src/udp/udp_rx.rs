use std::cmp;

use pnet::packet::icmp::{destination_unreachable, IcmpTypes};
use pnet::packet::icmpv6::{Icmpv6Code, Icmpv6Types};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::udp::{ipv4_checksum, ipv6_checksum, UdpPacket};

use addr::{Addr, Af, SockAddr};
use backend::bypass::SLOT_BUF_CHANGED;
use engine::Engine;
use ethernet;
use icmp;
use icmpv6;
use super::HDR_LEN;
use {RxError, RxResult};

/// Receive a UDP datagram: validate the checksum, look up the socket for
/// the four-tuple (connected flow first, then bound-only listener), swap
/// the RX ring slot's buffer with a free vector and append that vector to
/// the socket's receive queue. A miss on both lookups draws an ICMP
/// port-unreachable, unless the datagram was sent to a broadcast or
/// multicast address.
pub(crate) fn rx(w: &mut Engine, ri: u32, si: u32, frame: &[u8], af: Af) -> RxResult {
    let (ip_hdr_len, ip_plen, src_addr, dst_addr, tos, ttl) = match af {
        Af::V4 => {
            let ip = Ipv4Packet::new(&frame[ethernet::HDR_LEN..]).unwrap();
            (20usize,
             (ip.get_total_length() as usize).saturating_sub(20),
             Addr::V4(ip.get_source()),
             Addr::V4(ip.get_destination()),
             ip.get_dscp() << 2 | ip.get_ecn(),
             ip.get_ttl())
        }
        Af::V6 => {
            let ip = Ipv6Packet::new(&frame[ethernet::HDR_LEN..]).unwrap();
            (40usize,
             ip.get_payload_length() as usize,
             Addr::V6(ip.get_source()),
             Addr::V6(ip.get_destination()),
             ip.get_traffic_class(),
             ip.get_hop_limit())
        }
    };

    let udp_off = ethernet::HDR_LEN + ip_hdr_len;
    let ip_plen = cmp::min(ip_plen, frame.len().saturating_sub(udp_off));
    if ip_plen < HDR_LEN as usize {
        warn!("IP payload {} too short for UDP header", ip_plen);
        return Err(RxError::InvalidLength);
    }

    let (sport, dport, len_field, got_ck) = {
        let udp = UdpPacket::new(&frame[udp_off..udp_off + ip_plen]).unwrap();
        (udp.get_source(), udp.get_destination(), udp.get_length(), udp.get_checksum())
    };
    debug!("UDP :{} -> :{}, cksum 0x{:04x}, len {}",
           sport,
           dport,
           got_ck,
           len_field);

    let udp_len = cmp::min(len_field as usize, ip_plen);
    if udp_len < HDR_LEN as usize {
        return Err(RxError::InvalidLength);
    }

    // a zero checksum means "not computed"; anything else has to verify
    if got_ck != 0 {
        let udp = UdpPacket::new(&frame[udp_off..udp_off + udp_len]).unwrap();
        let want = match (src_addr, dst_addr) {
            (Addr::V4(s), Addr::V4(d)) => ipv4_checksum(&udp, &s, &d),
            (Addr::V6(s), Addr::V6(d)) => ipv6_checksum(&udp, &s, &d),
            _ => unreachable!(),
        };
        if got_ck != want && !(want == 0 && got_ck == 0xffff) {
            warn!("invalid UDP checksum, received 0x{:04x}", got_ck);
            return Err(RxError::InvalidChecksum);
        }
    }

    let local = SockAddr::new(dst_addr, dport);
    let remote = SockAddr::new(src_addr, sport);

    // a connected flow wins over a bound-only listener
    let sid = w.get_sock(&local, Some(&remote)).or_else(|| w.get_sock(&local, None));
    let sid = match sid {
        Some(sid) => sid,
        None => {
            // nobody bound to this port; answer with an unreachable, but
            // never for broadcast or multicast destinations
            match dst_addr {
                Addr::V4(d) => {
                    if w.ifaddr_match4(d, false).is_some() {
                        icmp::tx(w,
                                 IcmpTypes::DestinationUnreachable,
                                 destination_unreachable::IcmpCodes::DestinationPortUnreachable,
                                 frame);
                    }
                }
                Addr::V6(d) => {
                    if w.ifaddr_match6(d, false).is_some() {
                        icmpv6::tx(w,
                                   Icmpv6Types::DestinationUnreachable,
                                   Icmpv6Code(icmpv6::UNREACH_PORT),
                                   frame);
                    }
                }
            }
            return Err(RxError::NoListener(format!("udp, no socket for {}", local)));
        }
    };

    let mut v = match w.alloc_raw() {
        Some(v) => v,
        None => {
            error!("no more bufs; UDP packet RX failed");
            return Ok(false);
        }
    };

    // swap the slot's buffer with the spare vector: the slot gets a fresh
    // buffer for the next arrival, the vector takes over the payload
    let slot_idx = {
        let b = w.bypass_mut();
        let slot_idx;
        {
            let r = b.driver.rx_ring(ri);
            let s = &mut r.slots[si as usize];
            slot_idx = s.buf_idx;
            s.buf_idx = v.idx();
            s.flags = SLOT_BUF_CHANGED;
        }
        slot_idx
    };
    let base = w.bypass().buf_ptr(slot_idx);
    v.retarget(slot_idx, base);

    v.set_window((udp_off + HDR_LEN as usize) as u16,
                 (udp_len - HDR_LEN as usize) as u16);
    v.saddr = remote;
    v.flags = tos;
    v.ttl = ttl;

    w.sock_mut(sid).expect("socket vanished").iv.push_back(v);
    Ok(true)
}

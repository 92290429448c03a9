use std::cmp;

use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::icmp::{checksum, IcmpCode, IcmpPacket, IcmpType, IcmpTypes, MutableIcmpPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;

use engine::Engine;
use ethernet;
use ipv4;
use super::HDR_LEN;

/// Build and send an ICMPv4 message of the given type and code in reaction
/// to the received packet in `frame`. Echo replies copy the request's id,
/// sequence number and payload; unreachables quote the offending IP header
/// plus eight bytes.
pub(crate) fn tx(w: &mut Engine, icmp_type: IcmpType, icmp_code: IcmpCode, frame: &[u8]) {
    let src = match w.first_v4() {
        Some(ip) => ip,
        None => return,
    };
    let mut v = match w.alloc_raw() {
        Some(v) => v,
        None => {
            error!("no more bufs; ICMPv4 not sent (type {}, code {})",
                   icmp_type.0,
                   icmp_code.0);
            return;
        }
    };
    info!("sending ICMPv4 type {}, code {}", icmp_type.0, icmp_code.0);

    let ip_off = ethernet::HDR_LEN;
    let icmp_off = (ip_off + ipv4::HDR_LEN as usize) as u16;
    let src_ip = Ipv4Packet::new(&frame[ip_off..]).unwrap();
    let total = cmp::min(src_ip.get_total_length(), w.mtu) as usize;

    let (id, seq, data_off, data_len) = match icmp_type {
        IcmpTypes::EchoReply => {
            // id and seq sit right after the 4-byte ICMP header of the
            // request
            let req = &frame[icmp_off as usize..];
            if req.len() < HDR_LEN as usize {
                w.free.push_front(v);
                return;
            }
            let id = (req[4] as u16) << 8 | req[5] as u16;
            let seq = (req[6] as u16) << 8 | req[7] as u16;
            let hlen = (ipv4::HDR_LEN + HDR_LEN) as usize;
            (id, seq, ip_off + hlen, total.saturating_sub(hlen))
        }
        IcmpTypes::DestinationUnreachable => {
            // quote the IP header plus 64 bits of the original packet
            (0, 0, ip_off, cmp::min(ipv4::HDR_LEN as usize + 8, total))
        }
        t => {
            error!("don't know how to send ICMPv4 type {}", t.0);
            w.free.push_front(v);
            return;
        }
    };

    let data_len = cmp::min(data_len, frame.len().saturating_sub(data_off));
    let icmp_len = HDR_LEN + data_len as u16;
    v.set_window(icmp_off, icmp_len);
    {
        let msg = v.as_mut_slice();
        msg[0] = icmp_type.0;
        msg[1] = icmp_code.0;
        msg[2] = 0;
        msg[3] = 0;
        msg[4] = (id >> 8) as u8;
        msg[5] = id as u8;
        msg[6] = (seq >> 8) as u8;
        msg[7] = seq as u8;
        msg[8..].copy_from_slice(&frame[data_off..data_off + data_len]);
        let ck = checksum(&IcmpPacket::new(msg).unwrap());
        MutableIcmpPacket::new(msg).unwrap().set_checksum(ck);
    }

    let id = w.rand_u16();
    ipv4::build(&mut v,
                &ipv4::Ipv4Hdr {
                    src: src,
                    dst: src_ip.get_source(),
                    tos: 0,
                    id: id,
                    proto: IpNextHeaderProtocols::Icmp,
                });

    let eth_dst = EthernetPacket::new(frame).unwrap().get_source();
    ethernet::build(&mut v, w.mac, eth_dst, EtherTypes::Ipv4);

    w.tx_and_free(v);
}

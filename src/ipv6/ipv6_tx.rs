use std::net::Ipv6Addr;

use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv6::MutableIpv6Packet;

use iov::Iov;
use super::HDR_LEN;

/// Field values for one outgoing IPv6 header.
pub(crate) struct Ipv6Hdr {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    /// DSCP + ECN byte, emitted as the traffic class.
    pub tos: u8,
    pub next: IpNextHeaderProtocol,
}

/// Prepend an IPv6 header to the packet being assembled in `v`: version 6,
/// no flow label, hop limit 255.
pub(crate) fn build(v: &mut Iov, h: &Ipv6Hdr) {
    v.grow_front(HDR_LEN);
    let (off, len) = (v.off(), v.len());
    let mut ip = MutableIpv6Packet::new(v.window_mut(off, off + len)).unwrap();
    ip.set_version(6);
    ip.set_traffic_class(h.tos);
    ip.set_flow_label(0);
    ip.set_payload_length(len - HDR_LEN);
    ip.set_next_header(h.next);
    ip.set_hop_limit(0xff);
    ip.set_source(h.src);
    ip.set_destination(h.dst);
}

use std::net::Ipv4Addr;

use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv4::{checksum, Ipv4Flags, MutableIpv4Packet};

use iov::Iov;
use super::{ECN_MASK, HDR_LEN};

/// Field values for one outgoing IPv4 header.
pub(crate) struct Ipv4Hdr {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    /// DSCP + ECN byte to emit.
    pub tos: u8,
    /// Identification; callers draw it from the engine PRNG.
    pub id: u16,
    pub proto: IpNextHeaderProtocol,
}

/// Prepend an IPv4 header to the packet being assembled in `v`: fixed
/// 20-byte header, DF set, TTL 255, checksum over the header.
pub(crate) fn build(v: &mut Iov, h: &Ipv4Hdr) {
    v.grow_front(HDR_LEN);
    let (off, len) = (v.off(), v.len());
    let mut ip = MutableIpv4Packet::new(v.window_mut(off, off + len)).unwrap();
    ip.set_version(4);
    ip.set_header_length(5);
    ip.set_dscp(h.tos >> 2);
    ip.set_ecn(h.tos & ECN_MASK);
    ip.set_total_length(len);
    ip.set_identification(h.id);
    ip.set_flags(Ipv4Flags::DontFragment);
    ip.set_fragment_offset(0);
    ip.set_ttl(0xff);
    ip.set_next_level_protocol(h.proto);
    ip.set_source(h.src);
    ip.set_destination(h.dst);
    ip.set_checksum(0);
    let ck = checksum(&ip.to_immutable());
    ip.set_checksum(ck);
}

use pnet::packet::ethernet::EtherTypes;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::udp::{ipv4_checksum, ipv6_checksum, MutableUdpPacket};

use addr::Addr;
use backend::bypass::EthTx;
use engine::Engine;
use ethernet;
use iov::Iov;
use ipv4;
use ipv6;
use neighbor;
use sock::SockId;
use super::HDR_LEN;

/// Transmit one vector over socket `sid` in the bypass backend: build the
/// UDP, IP and Ethernet headers in place below the payload and hand the
/// frame to a TX ring. For a disconnected socket the destination comes
/// from the vector's `saddr`, and its link-layer address is resolved
/// (blocking) through the neighbor cache. Returns the vector when all TX
/// rings are full, so the caller can drain them and retry.
pub(crate) fn tx(w: &mut Engine, sid: SockId, v: Iov, last: bool) -> Option<Iov> {
    let mut v = v;

    let (local, remote, opt, dmac, af) = {
        let s = match w.sock_ref(sid) {
            Ok(s) => s,
            Err(..) => {
                w.free.push_front(v);
                return None;
            }
        };
        (s.tup.local, s.tup.remote, s.opt, s.dmac, s.af())
    };

    // the window has to sit right behind the header space for the frame to
    // start at the top of the buffer
    let hdr = w.iov_off(af);
    if v.off() != hdr {
        warn!("vector window at {} does not match the {}-byte header space; dropping",
              v.off(),
              hdr);
        w.free.push_front(v);
        return None;
    }

    let dst = match remote {
        Some(r) => r,
        None => v.saddr,
    };
    if dst.addr.af() != af {
        warn!("destination {} does not match socket address family; dropping", dst);
        w.free.push_front(v);
        return None;
    }

    let dmac = match remote {
        Some(..) => dmac,
        None => neighbor::who_has(w, &dst.addr),
    };

    // per-vector DSCP+ECN, with the socket ECN default when unmarked
    let mut tos = v.flags;
    if tos & ipv4::ECN_MASK == 0 && opt.enable_ecn {
        tos |= ipv4::ECN_ECT0;
    }

    build(&mut v,
          local.port,
          dst.port,
          &local.addr,
          &dst.addr,
          opt.enable_udp_zero_checksums);

    match (local.addr, dst.addr) {
        (Addr::V4(src), Addr::V4(d)) => {
            let id = w.rand_u16();
            ipv4::build(&mut v,
                        &ipv4::Ipv4Hdr {
                            src: src,
                            dst: d,
                            tos: tos,
                            id: id,
                            proto: IpNextHeaderProtocols::Udp,
                        });
        }
        (Addr::V6(src), Addr::V6(d)) => {
            ipv6::build(&mut v,
                        &ipv6::Ipv6Hdr {
                            src: src,
                            dst: d,
                            tos: tos,
                            next: IpNextHeaderProtocols::Udp,
                        });
        }
        _ => unreachable!(),
    }

    let ethertype = match af {
        ::addr::Af::V4 => EtherTypes::Ipv4,
        ::addr::Af::V6 => EtherTypes::Ipv6,
    };
    ethernet::build(&mut v, w.mac, dmac, ethertype);

    match w.bypass_mut().place_tx(v, last) {
        EthTx::Parked => None,
        EthTx::Copied(v) => {
            w.free.push_front(v);
            None
        }
        EthTx::Full(mut v) => {
            // strip the headers again so a retry rebuilds them cleanly
            let plen = v.len() - hdr;
            v.set_window(hdr, plen);
            Some(v)
        }
    }
}

/// Prepend a UDP header to the payload in `v`: ports, length, and the
/// pseudo-header checksum unless zero checksums are enabled.
fn build(v: &mut Iov, sport: u16, dport: u16, src: &Addr, dst: &Addr, zero_cksum: bool) {
    v.grow_front(HDR_LEN);
    let (off, len) = (v.off(), v.len());
    let mut udp = MutableUdpPacket::new(v.window_mut(off, off + len)).unwrap();
    udp.set_source(sport);
    udp.set_destination(dport);
    udp.set_length(len);
    udp.set_checksum(0);
    if !zero_cksum {
        let ck = match (*src, *dst) {
            (Addr::V4(s), Addr::V4(d)) => ipv4_checksum(&udp.to_immutable(), &s, &d),
            (Addr::V6(s), Addr::V6(d)) => ipv6_checksum(&udp.to_immutable(), &s, &d),
            _ => 0,
        };
        udp.set_checksum(ck);
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::ptr::NonNull;

    use pnet::packet::udp::{ipv4_checksum, UdpPacket};

    use addr::Addr;
    use iov::Iov;
    use super::build;

    #[test]
    fn checksum_verifies_over_pseudo_header() {
        let mut buf = [0u8; 128];
        let mut v = Iov::new(0, NonNull::new(buf.as_mut_ptr()).unwrap(), 128);
        v.set_window(42, 5);
        v.as_mut_slice().copy_from_slice(b"hello");

        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        build(&mut v, 6000, 7000, &Addr::V4(src), &Addr::V4(dst), false);

        assert_eq!(v.off(), 34);
        let udp = UdpPacket::new(v.as_slice()).unwrap();
        assert_eq!(udp.get_source(), 6000);
        assert_eq!(udp.get_destination(), 7000);
        assert_eq!(udp.get_length(), 13);
        assert_eq!(udp.get_checksum(), ipv4_checksum(&udp, &src, &dst));
    }

    #[test]
    fn zero_checksum_option_emits_zero() {
        let mut buf = [0u8; 128];
        let mut v = Iov::new(0, NonNull::new(buf.as_mut_ptr()).unwrap(), 128);
        v.set_window(42, 5);
        v.as_mut_slice().copy_from_slice(b"hello");

        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        build(&mut v, 6000, 7000, &Addr::V4(src), &Addr::V4(dst), true);

        let udp = UdpPacket::new(v.as_slice()).unwrap();
        assert_eq!(udp.get_checksum(), 0);
    }
}

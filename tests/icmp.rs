extern crate pnet;
extern crate zudp;

mod mocknic;

use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::icmp::{checksum as icmp_checksum, IcmpPacket, MutableIcmpPacket};
use pnet::packet::icmpv6::Icmpv6Packet;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::Packet;

use mocknic::{engine_ip6, icmp6_frame, mock_engine, peer_ip6, ENGINE_IP4, ENGINE_MAC, PEER_IP4,
              PEER_MAC};

fn echo4_frame(id: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    let icmp_len = 8 + payload.len();
    let total = 20 + icmp_len;
    let mut buf = vec![0u8; 14 + total];
    {
        let mut eth = MutableEthernetPacket::new(&mut buf).unwrap();
        eth.set_source(PEER_MAC);
        eth.set_destination(ENGINE_MAC);
        eth.set_ethertype(EtherTypes::Ipv4);
    }
    {
        let mut ip = MutableIpv4Packet::new(&mut buf[14..]).unwrap();
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_total_length(total as u16);
        ip.set_ttl(64);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
        ip.set_source(PEER_IP4);
        ip.set_destination(ENGINE_IP4);
        let ck = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(ck);
    }
    {
        let msg = &mut buf[34..];
        msg[0] = 8; // echo request
        msg[4] = (id >> 8) as u8;
        msg[5] = id as u8;
        msg[6] = (seq >> 8) as u8;
        msg[7] = seq as u8;
        msg[8..].copy_from_slice(payload);
        let ck = icmp_checksum(&IcmpPacket::new(msg).unwrap());
        MutableIcmpPacket::new(msg).unwrap().set_checksum(ck);
    }
    buf
}

#[test]
fn echo_request_gets_replied() {
    let (mut w, nic) = mock_engine("icmp0", 16);

    nic.inject(&echo4_frame(0x1234, 7, b"ping data"));
    w.nic_rx(0);

    let sent = nic.sent();
    assert_eq!(sent.len(), 1);
    let eth = EthernetPacket::new(&sent[0]).unwrap();
    assert_eq!(eth.get_destination(), PEER_MAC);
    let ip = Ipv4Packet::new(eth.payload()).unwrap();
    assert_eq!(ip.get_next_level_protocol(), IpNextHeaderProtocols::Icmp);
    assert_eq!(ip.get_destination(), PEER_IP4);
    let icmp = IcmpPacket::new(ip.payload()).unwrap();
    assert_eq!(icmp.get_icmp_type().0, 0); // echo reply
    let msg = icmp.packet();
    assert_eq!(&msg[4..6], &[0x12, 0x34]);
    assert_eq!(&msg[6..8], &[0, 7]);
    assert_eq!(&msg[8..], b"ping data");
    // the reply checksums to the stored value
    assert_eq!(icmp.get_checksum(), icmp_checksum(&icmp));
}

#[test]
fn corrupted_echo_request_is_ignored() {
    let (mut w, nic) = mock_engine("icmp1", 16);

    let mut frame = echo4_frame(1, 1, b"x");
    let last = frame.len() - 1;
    frame[last] ^= 0xff; // breaks the ICMP checksum
    nic.inject(&frame);
    w.nic_rx(0);

    assert!(nic.sent().is_empty());
}

#[test]
fn echo_request_v6_gets_replied() {
    let (mut w, nic) = mock_engine("icmp2", 16);

    let mut msg = vec![0u8; 8 + 4];
    msg[0] = 128; // echo request
    msg[4] = 0xab;
    msg[5] = 0xcd;
    msg[7] = 9;
    msg[8..].copy_from_slice(b"six!");
    nic.inject(&icmp6_frame(PEER_MAC, ENGINE_MAC, peer_ip6(), engine_ip6(), &msg));
    w.nic_rx(0);

    let sent = nic.sent();
    assert_eq!(sent.len(), 1);
    let eth = EthernetPacket::new(&sent[0]).unwrap();
    let ip = Ipv6Packet::new(eth.payload()).unwrap();
    assert_eq!(ip.get_destination(), peer_ip6());
    assert_eq!(ip.get_next_header(), IpNextHeaderProtocols::Icmpv6);
    let icmp = Icmpv6Packet::new(ip.payload()).unwrap();
    assert_eq!(icmp.get_icmpv6_type().0, 129); // echo reply
    let reply = icmp.packet();
    assert_eq!(&reply[4..8], &[0xab, 0xcd, 0, 9]);
    assert_eq!(&reply[8..], b"six!");
}

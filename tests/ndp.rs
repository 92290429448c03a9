extern crate pnet;
extern crate zudp;

mod mocknic;

use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::icmpv6::Icmpv6Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::Packet;
use pnet::util::MacAddr;

use zudp::Addr;

use mocknic::{engine_ip6, icmp6_frame, mock_engine, na_msg, ns_msg, peer_ip6, ENGINE_MAC,
              PEER_MAC};

#[test]
fn resolution_solicits_the_multicast_group() {
    let (mut w, nic) = mock_engine("ndp0", 16);

    // the peer's advertisement is already queued when the solicitation
    // goes out
    nic.inject(&icmp6_frame(PEER_MAC,
                            ENGINE_MAC,
                            peer_ip6(),
                            engine_ip6(),
                            &na_msg(peer_ip6(), PEER_MAC)));

    let mac = w.who_has(&Addr::V6(peer_ip6()));
    assert_eq!(mac, PEER_MAC);

    let sent = nic.sent();
    assert_eq!(sent.len(), 1);
    let eth = EthernetPacket::new(&sent[0]).unwrap();
    assert_eq!(eth.get_ethertype(), EtherTypes::Ipv6);
    // fe80::2 maps to the solicited-node group ff02::1:ff00:2, whose MAC
    // is 33:33:ff:00:00:02
    assert_eq!(eth.get_destination(), MacAddr(0x33, 0x33, 0xff, 0, 0, 2));

    let ip = Ipv6Packet::new(eth.payload()).unwrap();
    assert_eq!(ip.get_destination(), "ff02::1:ff00:2".parse::<::std::net::Ipv6Addr>().unwrap());
    assert_eq!(ip.get_hop_limit(), 255);

    let icmp = Icmpv6Packet::new(ip.payload()).unwrap();
    assert_eq!(icmp.get_icmpv6_type().0, 135);
    let msg = icmp.packet();
    assert_eq!(&msg[8..24], &peer_ip6().octets());
    // source link-layer address option carries our MAC
    assert_eq!(msg[24], 1);
    assert_eq!(msg[25], 1);
    assert_eq!(&msg[26..32], &ENGINE_MAC.octets());

    // resolved now; no further frames
    assert_eq!(w.who_has(&Addr::V6(peer_ip6())), PEER_MAC);
    assert!(nic.sent().is_empty());
}

#[test]
fn solicitation_for_us_draws_an_advertisement() {
    let (mut w, nic) = mock_engine("ndp1", 16);

    nic.inject(&icmp6_frame(PEER_MAC,
                            ENGINE_MAC,
                            peer_ip6(),
                            engine_ip6(),
                            &ns_msg(engine_ip6(), PEER_MAC)));
    w.nic_rx(0);

    let sent = nic.sent();
    assert_eq!(sent.len(), 1);
    let eth = EthernetPacket::new(&sent[0]).unwrap();
    assert_eq!(eth.get_destination(), PEER_MAC);
    let ip = Ipv6Packet::new(eth.payload()).unwrap();
    assert_eq!(ip.get_destination(), peer_ip6());
    let icmp = Icmpv6Packet::new(ip.payload()).unwrap();
    assert_eq!(icmp.get_icmpv6_type().0, 136);
    let msg = icmp.packet();
    // Solicited + Override
    assert_eq!(msg[4], 0x60);
    assert_eq!(&msg[8..24], &engine_ip6().octets());
    // target link-layer address option carries our MAC
    assert_eq!(msg[24], 2);
    assert_eq!(msg[25], 1);
    assert_eq!(&msg[26..32], &ENGINE_MAC.octets());

    // the soliciting node was recorded opportunistically
    assert_eq!(w.who_has(&Addr::V6(peer_ip6())), PEER_MAC);
    assert!(nic.sent().is_empty());
}

#[test]
fn advertisement_without_option_uses_ethernet_source() {
    let (mut w, nic) = mock_engine("ndp2", 16);

    let mut msg = na_msg(peer_ip6(), PEER_MAC);
    msg.truncate(24); // strip the target-link-layer option
    nic.inject(&icmp6_frame(PEER_MAC,
                            ENGINE_MAC,
                            peer_ip6(),
                            engine_ip6(),
                            &msg));
    w.nic_rx(0);

    assert_eq!(w.who_has(&Addr::V6(peer_ip6())), PEER_MAC);
    assert!(nic.sent().is_empty());
}

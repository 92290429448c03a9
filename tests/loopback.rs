extern crate zudp;

use zudp::{Addr, Af, Engine, IovQ, SockAddr};

use std::net::Ipv6Addr;

fn ip6_loopback() -> Ipv6Addr {
    Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1)
}

/// One datagram from a connected client to a bound server over the
/// in-memory pipe, and the echo back.
#[test]
fn echo_round_trip() {
    let (mut srv, mut cli) = Engine::loopback_pair(64).unwrap();

    // address index 0 is ::1 on a loopback pair
    let s = srv.bind(0, 55555, None).unwrap();
    let c = cli.bind(0, 0, None).unwrap();
    let cli_port = cli.local_addr(c).unwrap().port;
    assert!(cli_port >= 1024);

    cli.connect(c, SockAddr::new(Addr::V6(ip6_loopback()), 55555)).unwrap();

    let mut q = IovQ::new();
    let mut v = cli.alloc_iov(Af::V6, 0, 0).unwrap();
    v.as_mut_slice()[..13].copy_from_slice(b"Hello, world!");
    v.trim(13);
    v.flags = 0xa9;
    q.push_back(v);

    cli.tx(c, &mut q).unwrap();
    assert!(q.is_empty());
    cli.nic_tx();

    assert!(srv.nic_rx(100_000_000));
    let mut ready = Vec::new();
    assert_eq!(srv.rx_ready(&mut ready), 1);
    assert_eq!(ready, vec![s]);

    let mut rq = IovQ::new();
    srv.rx(s, &mut rq).unwrap();
    assert_eq!(rq.cnt(), 1);
    {
        let v = rq.front().unwrap();
        assert_eq!(v.len(), 13);
        assert_eq!(v.as_slice(), b"Hello, world!");
        assert_eq!(v.flags, 0xa9);
        assert_eq!(v.saddr.addr, Addr::V6(ip6_loopback()));
        assert_eq!(v.saddr.port, cli_port);
    }

    // echo it back over the disconnected server socket
    let peer = rq.front().unwrap().saddr;
    srv.free(&mut rq);

    let mut eq = IovQ::new();
    let mut v = srv.alloc_iov(Af::V6, 0, 0).unwrap();
    v.as_mut_slice()[..13].copy_from_slice(b"Hello, world!");
    v.trim(13);
    v.saddr = peer;
    eq.push_back(v);
    srv.tx(s, &mut eq).unwrap();
    srv.nic_tx();

    assert!(cli.nic_rx(100_000_000));
    let mut cq = IovQ::new();
    cli.rx(c, &mut cq).unwrap();
    assert_eq!(cq.cnt(), 1);
    assert_eq!(cq.front().unwrap().as_slice(), b"Hello, world!");
    assert_eq!(cq.front().unwrap().saddr.port, 55555);
}

/// Chained vectors arrive in order with their payload intact.
#[test]
fn chained_vectors_preserve_order() {
    let (mut srv, mut cli) = Engine::loopback_pair(64).unwrap();

    let s = srv.bind(0, 44444, None).unwrap();
    let c = cli.bind(0, 0, None).unwrap();
    cli.connect(c, SockAddr::new(Addr::V6(ip6_loopback()), 44444)).unwrap();

    let mut q = IovQ::new();
    cli.alloc_cnt(Af::V6, &mut q, 3, 4, 0);
    assert_eq!(q.cnt(), 3);
    for (i, v) in q.iter_mut().enumerate() {
        let label = [b'0' + i as u8; 4];
        v.as_mut_slice().copy_from_slice(&label);
    }
    cli.tx(c, &mut q).unwrap();
    cli.nic_tx();

    assert!(srv.nic_rx(100_000_000));
    let mut rq = IovQ::new();
    srv.rx(s, &mut rq).unwrap();
    assert_eq!(rq.cnt(), 3);
    for (i, v) in rq.iter().enumerate() {
        assert_eq!(v.as_slice(), &[b'0' + i as u8; 4]);
    }
    assert_eq!(rq.byte_len(), 12);
}

/// The max payload reflects the pipe MTU minus IP and UDP headers.
#[test]
fn max_udp_payload_subtracts_headers() {
    let (mut srv, _cli) = Engine::loopback_pair(8).unwrap();
    let s6 = srv.bind(0, 1111, None).unwrap();
    let s4 = srv.bind(1, 1111, None).unwrap();
    let mtu = srv.mtu();
    assert_eq!(srv.max_udp_payload(s6).unwrap(), mtu - 40 - 8);
    assert_eq!(srv.max_udp_payload(s4).unwrap(), mtu - 20 - 8);
}

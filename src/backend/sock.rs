//! The OS-socket backend: one kernel datagram socket per engine socket,
//! batched scatter-gather I/O with `sendmmsg`/`recvmmsg` where the OS has
//! them, DSCP/ECN and TTL transported through control messages, and a
//! portable `poll(2)` readiness multiplexer.

use std::io;
use std::mem;
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::unix::io::AsRawFd;
use std::ptr;

use libc;
use socket2::{Domain, Protocol, Socket, Type};

use addr::{Addr, Af, SockAddr};
use engine::Engine;
use iov::IovQ;
use ipv4::ECN_ECT0;
use sock::{Sock, SockId, SockOpt};
use util;
use {Error, Result};

/// Messages per scatter-gather batch. Large enough to amortize the
/// syscall, small enough to keep the stack frames reasonable.
const BATCH: usize = 64;

/// Room for one TOS plus one TTL control message.
const CMSG_CAP: usize = 64;

#[derive(Debug, Default)]
pub struct SockBackend {
    /// Sockets the last poll reported readable.
    pub(crate) ready: Vec<SockId>,
}

fn setsockopt_int(fd: i32, level: i32, name: i32, value: i32) -> io::Result<()> {
    let ret = unsafe {
        libc::setsockopt(fd,
                         level,
                         name,
                         &value as *const i32 as *const libc::c_void,
                         mem::size_of::<i32>() as libc::socklen_t)
    };
    if ret != 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn local_sockaddr(s: &Sock) -> SocketAddr {
    match s.tup.local.addr {
        Addr::V4(ip) => SocketAddr::V4(SocketAddrV4::new(ip, s.tup.local.port)),
        Addr::V6(ip) => SocketAddr::V6(SocketAddrV6::new(ip, s.tup.local.port, 0, s.scope)),
    }
}

/// Open and bind the kernel socket for `s`, enable TOS and TTL reporting
/// and the IPv4 don't-fragment bit, and learn the kernel-chosen port when
/// binding to port zero.
pub(crate) fn open_and_bind(s: &mut Sock) -> Result<()> {
    let domain = match s.af() {
        Af::V4 => Domain::IPV4,
        Af::V6 => Domain::IPV6,
    };
    let sock = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(Error::Io)?;
    sock.bind(&local_sockaddr(s).into()).map_err(Error::Io)?;

    let fd = sock.as_raw_fd();

    // always receive TOS and TTL information with each datagram
    match s.af() {
        Af::V4 => {
            setsockopt_int(fd, libc::IPPROTO_IP, libc::IP_RECVTOS, 1).map_err(Error::Io)?;
            setsockopt_int(fd, libc::IPPROTO_IP, libc::IP_RECVTTL, 1).map_err(Error::Io)?;
        }
        Af::V6 => {
            setsockopt_int(fd, libc::IPPROTO_IPV6, libc::IPV6_RECVTCLASS, 1).map_err(Error::Io)?;
            setsockopt_int(fd, libc::IPPROTO_IPV6, libc::IPV6_RECVHOPLIMIT, 1)
                .map_err(Error::Io)?;
        }
    }

    // set DF on IPv4
    #[cfg(target_os = "linux")]
    {
        if s.af() == Af::V4 {
            if let Err(e) = setsockopt_int(fd,
                                           libc::IPPROTO_IP,
                                           libc::IP_MTU_DISCOVER,
                                           libc::IP_PMTUDISC_DO) {
                warn!("cannot setsockopt IP_MTU_DISCOVER ({})", e);
            }
        }
    }

    // learn the local port when binding to a random one
    if s.tup.local.port == 0 {
        let local = sock.local_addr().map_err(Error::Io)?;
        if let Some(sa) = local.as_socket() {
            s.tup.local.port = sa.port();
        }
    }

    s.fd = Some(sock);
    Ok(())
}

/// Map the socket options onto `setsockopt` calls: zero UDP checksums are
/// best-effort per platform, the ECN default writes ECT(0) into the
/// socket's TOS / traffic-class byte.
pub(crate) fn set_sockopt(s: &mut Sock, opt: &SockOpt) {
    let fd = match s.fd {
        Some(ref f) => f.as_raw_fd(),
        None => return,
    };

    if s.af() == Af::V4 &&
       s.opt.enable_udp_zero_checksums != opt.enable_udp_zero_checksums {
        s.opt.enable_udp_zero_checksums = opt.enable_udp_zero_checksums;
        #[cfg(target_os = "linux")]
        {
            if let Err(e) = setsockopt_int(fd,
                                           libc::SOL_SOCKET,
                                           libc::SO_NO_CHECK,
                                           opt.enable_udp_zero_checksums as i32) {
                warn!("cannot setsockopt SO_NO_CHECK ({})", e);
            }
        }
    }

    if s.opt.enable_ecn != opt.enable_ecn {
        s.opt.enable_ecn = opt.enable_ecn;
        let tos = if opt.enable_ecn { ECN_ECT0 as i32 } else { 0 };
        let ret = match s.af() {
            Af::V4 => setsockopt_int(fd, libc::IPPROTO_IP, libc::IP_TOS, tos),
            Af::V6 => setsockopt_int(fd, libc::IPPROTO_IPV6, libc::IPV6_TCLASS, tos),
        };
        if let Err(e) = ret {
            warn!("cannot setsockopt IP_TOS/IPV6_TCLASS ({}); running on WSL?", e);
        }
    }
}

/// Connect the kernel socket; the OS reports port collisions as errors.
pub(crate) fn connect(s: &mut Sock) -> io::Result<()> {
    let remote = match s.tup.remote {
        Some(r) => r,
        None => return Err(io::Error::new(io::ErrorKind::InvalidInput, "no remote")),
    };
    let sa: SocketAddr = match remote.addr {
        Addr::V4(ip) => SocketAddr::V4(SocketAddrV4::new(ip, remote.port)),
        Addr::V6(ip) => SocketAddr::V6(SocketAddrV6::new(ip, remote.port, 0, s.scope)),
    };
    match s.fd {
        Some(ref f) => f.connect(&sa.into()),
        None => Err(io::Error::new(io::ErrorKind::NotConnected, "no socket")),
    }
}

fn to_storage(sa: &SockAddr, scope: u32) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut ss: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let len = match sa.addr {
        Addr::V4(ip) => {
            let sin = &mut ss as *mut libc::sockaddr_storage as *mut libc::sockaddr_in;
            unsafe {
                (*sin).sin_family = libc::AF_INET as libc::sa_family_t;
                (*sin).sin_port = sa.port.to_be();
                (*sin).sin_addr.s_addr = u32::from(ip).to_be();
            }
            mem::size_of::<libc::sockaddr_in>()
        }
        Addr::V6(ip) => {
            let sin6 = &mut ss as *mut libc::sockaddr_storage as *mut libc::sockaddr_in6;
            unsafe {
                (*sin6).sin6_family = libc::AF_INET6 as libc::sa_family_t;
                (*sin6).sin6_port = sa.port.to_be();
                (*sin6).sin6_addr.s6_addr = ip.octets();
                (*sin6).sin6_scope_id = scope;
            }
            mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (ss, len as libc::socklen_t)
}

fn from_storage(ss: &libc::sockaddr_storage) -> Option<SockAddr> {
    match ss.ss_family as i32 {
        libc::AF_INET => {
            let sin = ss as *const libc::sockaddr_storage as *const libc::sockaddr_in;
            let (ip, port) = unsafe {
                (u32::from_be((*sin).sin_addr.s_addr), u16::from_be((*sin).sin_port))
            };
            Some(SockAddr::new(Addr::V4(ip.into()), port))
        }
        libc::AF_INET6 => {
            let sin6 = ss as *const libc::sockaddr_storage as *const libc::sockaddr_in6;
            let (ip, port) = unsafe {
                ((*sin6).sin6_addr.s6_addr, u16::from_be((*sin6).sin6_port))
            };
            Some(SockAddr::new(Addr::V6(ip.into()), port))
        }
        _ => None,
    }
}

/// Attach a TOS / traffic-class control message to `mh`.
unsafe fn set_tos_cmsg(mh: &mut libc::msghdr, ctrl: &mut [u8; CMSG_CAP], af: Af, tos: u8) {
    mh.msg_control = ctrl.as_mut_ptr() as *mut libc::c_void;
    mh.msg_controllen = CMSG_CAP as _;
    let cmsg = libc::CMSG_FIRSTHDR(mh);
    (*cmsg).cmsg_level = match af {
        Af::V4 => libc::IPPROTO_IP,
        Af::V6 => libc::IPPROTO_IPV6,
    };
    (*cmsg).cmsg_type = match af {
        Af::V4 => libc::IP_TOS,
        Af::V6 => libc::IPV6_TCLASS,
    };
    (*cmsg).cmsg_len = libc::CMSG_LEN(mem::size_of::<libc::c_int>() as u32) as _;
    *(libc::CMSG_DATA(cmsg) as *mut libc::c_int) = tos as libc::c_int;
    mh.msg_controllen = libc::CMSG_SPACE(mem::size_of::<libc::c_int>() as u32) as _;
}

/// Pull the TOS and TTL values out of the control messages of `mh`.
unsafe fn tos_ttl_cmsgs(mh: &libc::msghdr) -> (Option<u8>, Option<u8>) {
    let mut tos = None;
    let mut ttl = None;
    let empty = libc::CMSG_LEN(0) as usize;
    let mut cmsg = libc::CMSG_FIRSTHDR(mh);
    while !cmsg.is_null() {
        let c = &*cmsg;
        if c.cmsg_level == libc::IPPROTO_IP || c.cmsg_level == libc::IPPROTO_IPV6 {
            // TOS arrives as a byte on some platforms and an int on others
            let val = if c.cmsg_len as usize >= empty + mem::size_of::<libc::c_int>() {
                ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const libc::c_int) as u8
            } else {
                *libc::CMSG_DATA(cmsg)
            };
            match c.cmsg_type {
                libc::IP_TOS | libc::IPV6_TCLASS => tos = Some(val),
                libc::IP_TTL | libc::IPV6_HOPLIMIT => ttl = Some(val),
                _ => {}
            }
        }
        cmsg = libc::CMSG_NXTHDR(mh, cmsg);
    }
    (tos, ttl)
}

/// Send all vectors of `q` over `sid` in batches of up to [`BATCH`]
/// messages, with per-message destinations for a disconnected socket and a
/// TOS control message for every vector with a non-zero `flags`. Transient
/// errors are logged; the vectors return to the arena either way.
pub(crate) fn tx(w: &mut Engine, sid: SockId, q: &mut IovQ) {
    let (fd, connected, scope, af) = {
        let s = match w.sock_ref(sid) {
            Ok(s) => s,
            Err(..) => return,
        };
        let fd = match s.fd {
            Some(ref f) => f.as_raw_fd(),
            None => return,
        };
        (fd, s.connected(), s.scope, s.af())
    };

    while !q.is_empty() {
        let mut batch = IovQ::with_capacity(BATCH);
        while batch.cnt() < BATCH {
            match q.pop_front() {
                Some(v) => batch.push_back(v),
                None => break,
            }
        }
        let n = batch.cnt();

        let mut iovs: Vec<libc::iovec> = Vec::with_capacity(n);
        let mut names: Vec<libc::sockaddr_storage> = Vec::with_capacity(n);
        let mut name_lens: Vec<libc::socklen_t> = Vec::with_capacity(n);
        let mut ctrls: Vec<[u8; CMSG_CAP]> = vec![[0; CMSG_CAP]; n];
        for v in batch.iter() {
            iovs.push(libc::iovec {
                iov_base: v.as_slice().as_ptr() as *mut libc::c_void,
                iov_len: v.len() as usize,
            });
            // a disconnected socket sends to the vector's destination
            let (ss, len) = if connected {
                (unsafe { mem::zeroed() }, 0)
            } else {
                to_storage(&v.saddr, scope)
            };
            names.push(ss);
            name_lens.push(len);
        }

        let mut msgs: Vec<libc::mmsghdr> = Vec::with_capacity(n);
        for i in 0..n {
            let mut mh: libc::msghdr = unsafe { mem::zeroed() };
            if !connected {
                mh.msg_name = &mut names[i] as *mut libc::sockaddr_storage as *mut libc::c_void;
                mh.msg_namelen = name_lens[i];
            }
            mh.msg_iov = &mut iovs[i] as *mut libc::iovec;
            mh.msg_iovlen = 1;
            msgs.push(libc::mmsghdr {
                msg_hdr: mh,
                msg_len: 0,
            });
        }
        for (i, v) in batch.iter().enumerate() {
            if v.flags != 0 {
                unsafe {
                    set_tos_cmsg(&mut msgs[i].msg_hdr, &mut ctrls[i], af, v.flags);
                }
            }
        }

        send_msgs(fd, &mut msgs);

        // the batch has left (or was dropped by) the kernel; the buffers
        // go back to the arena
        w.free.append(&mut batch);
    }
}

#[cfg(target_os = "linux")]
fn send_msgs(fd: i32, msgs: &mut [libc::mmsghdr]) {
    let r = unsafe { libc::sendmmsg(fd, msgs.as_mut_ptr(), msgs.len() as libc::c_uint, 0) };
    if r < 0 {
        let e = io::Error::last_os_error();
        match e.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::ETIMEDOUT) => debug!("sendmmsg: {}", e),
            _ => error!("sendmmsg returned {}", e),
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn send_msgs(fd: i32, msgs: &mut [libc::mmsghdr]) {
    for m in msgs.iter_mut() {
        let r = unsafe { libc::sendmsg(fd, &m.msg_hdr, 0) };
        if r < 0 {
            let e = io::Error::last_os_error();
            match e.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::ETIMEDOUT) => debug!("sendmsg: {}", e),
                _ => error!("sendmsg returned {}", e),
            }
        }
    }
}

/// Receive pending datagrams on `sid` into fresh arena vectors, in batches
/// of up to [`BATCH`], filling each vector's sender address, TOS and TTL
/// from the message and control-message metadata. Appends to `q`; unused
/// vectors of a batch return to the free list.
pub(crate) fn rx(w: &mut Engine, sid: SockId, q: &mut IovQ) -> Result<()> {
    let (fd, af) = {
        let s = w.sock_ref(sid)?;
        let fd = match s.fd {
            Some(ref f) => f.as_raw_fd(),
            None => return Ok(()),
        };
        (fd, s.af())
    };

    loop {
        let mut batch = IovQ::with_capacity(BATCH);
        w.alloc_cnt(af, &mut batch, BATCH, 0, 0);
        let nbufs = batch.cnt();
        if nbufs == 0 {
            error!("no more bufs");
            return Ok(());
        }

        let mut iovs: Vec<libc::iovec> = Vec::with_capacity(nbufs);
        let mut names: Vec<libc::sockaddr_storage> = Vec::with_capacity(nbufs);
        let mut ctrls: Vec<[u8; CMSG_CAP]> = vec![[0; CMSG_CAP]; nbufs];
        for v in batch.iter_mut() {
            iovs.push(libc::iovec {
                iov_base: v.as_mut_slice().as_mut_ptr() as *mut libc::c_void,
                iov_len: v.len() as usize,
            });
            names.push(unsafe { mem::zeroed() });
        }

        let mut msgs: Vec<libc::mmsghdr> = Vec::with_capacity(nbufs);
        for i in 0..nbufs {
            let mut mh: libc::msghdr = unsafe { mem::zeroed() };
            mh.msg_name = &mut names[i] as *mut libc::sockaddr_storage as *mut libc::c_void;
            mh.msg_namelen = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
            mh.msg_iov = &mut iovs[i] as *mut libc::iovec;
            mh.msg_iovlen = 1;
            mh.msg_control = ctrls[i].as_mut_ptr() as *mut libc::c_void;
            mh.msg_controllen = CMSG_CAP as _;
            msgs.push(libc::mmsghdr {
                msg_hdr: mh,
                msg_len: 0,
            });
        }

        let n = recv_msgs(fd, &mut msgs);

        for (i, mut v) in batch.into_iter().enumerate() {
            if (i as isize) < n {
                v.trim(msgs[i].msg_len as u16);
                if let Some(sa) = from_storage(&names[i]) {
                    v.saddr = sa;
                }
                let (tos, ttl) = unsafe { tos_ttl_cmsgs(&msgs[i].msg_hdr) };
                v.flags = tos.unwrap_or(0);
                v.ttl = ttl.unwrap_or(0);
                q.push_back(v);
            } else {
                // unused buffers go back to the arena
                w.free.push_front(v);
            }
        }

        if n < nbufs as isize {
            return Ok(());
        }
    }
}

#[cfg(target_os = "linux")]
fn recv_msgs(fd: i32, msgs: &mut [libc::mmsghdr]) -> isize {
    let r = unsafe {
        libc::recvmmsg(fd,
                       msgs.as_mut_ptr(),
                       msgs.len() as libc::c_uint,
                       libc::MSG_DONTWAIT,
                       ptr::null_mut())
    };
    if r < 0 {
        let e = io::Error::last_os_error();
        match e.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::ETIMEDOUT) => {}
            _ => error!("recvmmsg returned {}", e),
        }
        return 0;
    }
    r as isize
}

#[cfg(not(target_os = "linux"))]
fn recv_msgs(fd: i32, msgs: &mut [libc::mmsghdr]) -> isize {
    let mut n = 0isize;
    for m in msgs.iter_mut() {
        let r = unsafe { libc::recvmsg(fd, &mut m.msg_hdr, libc::MSG_DONTWAIT) };
        if r < 0 {
            let e = io::Error::last_os_error();
            match e.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::ETIMEDOUT) => {}
                _ => error!("recvmsg returned {}", e),
            }
            break;
        }
        m.msg_len = r as u32;
        n += 1;
    }
    n
}

/// Wait up to `nsec` nanoseconds for any socket of the engine to become
/// readable. Remembers the ready set for [`rx_ready`](Engine::rx_ready).
pub(crate) fn nic_rx(w: &mut Engine, nsec: i64) -> bool {
    let mut fds: Vec<libc::pollfd> = Vec::new();
    let mut ids: Vec<SockId> = Vec::new();
    for (i, s) in w.socks.iter().enumerate() {
        if let Some(s) = s.as_ref() {
            if let Some(ref f) = s.fd {
                fds.push(libc::pollfd {
                    fd: f.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                });
                ids.push(SockId(i as u32));
            }
        }
    }

    let timeout = if nsec < 0 {
        -1
    } else {
        (nsec as u64 / util::NS_PER_MS) as libc::c_int
    };
    let n = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) };

    let ready = fds.iter()
        .zip(ids)
        .filter(|&(f, _)| f.revents & libc::POLLIN != 0)
        .map(|(_, id)| id)
        .collect();
    if let ::backend::Backend::Sock(ref mut b) = w.backend {
        b.ready = ready;
    }
    n > 0
}

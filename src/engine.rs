//! The engine: owns one interface, the buffer arena and free list, the
//! socket table, the neighbor cache and the backend. All public API calls
//! go through here.

use std::cmp;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Mutex;

use libc;

use pnet::util::MacAddr;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use addr::{Addr, Af, IfAddr, SockAddr, SockTuple};
use backend::bypass::{BypassBackend, EthTx, NicDriver};
use backend::pipe::PipeDriver;
use backend::sock as sockbe;
use backend::Backend;
use ethernet;
use interface::{self, InterfaceInfo};
use iov::{Iov, IovQ};
use neighbor::{self, NeighborTable};
use sock::{Sock, SockId, SockOpt};
use udp;
use util;
use {Error, Result, RxError};

lazy_static! {
    /// Names of interfaces that already have a non-loopback engine. Only
    /// used for duplicate detection at init; engine state itself is never
    /// shared between threads.
    static ref ENGINES: Mutex<Vec<String>> = Mutex::new(Vec::new());
}

/// A backend engine for one network interface.
pub struct Engine {
    pub(crate) ifname: String,
    pub(crate) mtu: u16,
    pub(crate) mbps: u32,
    pub(crate) mac: MacAddr,
    pub(crate) is_loopback: bool,

    /// Interface addresses, IPv6 first.
    pub(crate) ifaddrs: Vec<IfAddr>,
    /// Index of the first IPv4 entry in `ifaddrs`.
    pub(crate) addr4_pos: usize,
    pub(crate) have_ip4: bool,
    pub(crate) have_ip6: bool,

    /// Default router for off-subnet IPv4 destinations.
    pub(crate) rip: Option<Ipv4Addr>,

    pub(crate) rng: SmallRng,

    /// Free list of the arena. LIFO so recently used buffers stay
    /// cache-warm.
    pub(crate) free: IovQ,

    /// Backing storage of the arena in the OS backend. Bypass engines use
    /// the driver's mapped region instead.
    pub(crate) mem: Box<[u8]>,

    pub(crate) socks: Vec<Option<Sock>>,
    pub(crate) by_tup: ::std::collections::HashMap<SockTuple, u32>,

    pub(crate) neighbors: NeighborTable,

    pub(crate) backend: Backend,

    registered: bool,
}

// An engine may be moved to another thread, but has no internal locking:
// all calls must come from the thread that currently owns it.
unsafe impl Send for Engine {}

impl Engine {
    /// Initialize an engine on OS interface `ifname`, using the OS-socket
    /// backend with `nbufs` packet buffers. Blocks with a one-second retry
    /// loop while the link is down or no addresses are configured. A
    /// default router `rip` is needed if communication beyond the local
    /// IPv4 subnet is desired.
    pub fn init(ifname: &str, rip: Option<Ipv4Addr>, nbufs: u32) -> Result<Engine> {
        let info = loop {
            match interface::lookup(ifname)? {
                Some(info) if info.is_up && !info.addrs.is_empty() && info.mtu > 0 => break info,
                _ => {
                    warn!("{}: could not obtain required interface information, retrying",
                          ifname);
                    util::nanosleep(util::NS_PER_S);
                }
            }
        };
        let registered = register(&info)?;

        // some interfaces have huge MTUs, cap to something sensible
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u16;
        let mtu = cmp::min(info.mtu, page / 2);

        let buf_len = mtu - 28; // 28 = min IP header + UDP header
        let mem = vec![0u8; nbufs as usize * buf_len as usize].into_boxed_slice();

        let mut w = Engine::assemble(info,
                                     mtu,
                                     rip,
                                     mem,
                                     Backend::Sock(sockbe::SockBackend::default()),
                                     registered);
        for i in 0..nbufs {
            let base = unsafe {
                ::std::ptr::NonNull::new_unchecked(w.mem.as_ptr().add(i as usize *
                                                                      buf_len as usize) as
                                                   *mut u8)
            };
            w.free.push_front(Iov::new(i, base, buf_len));
        }

        w.log_ready();
        Ok(w)
    }

    /// Initialize an engine over a kernel-bypass NIC driver. The driver's
    /// extra buffers become the engine free list; `info` describes the
    /// interface the driver is attached to.
    pub fn init_bypass(driver: Box<dyn NicDriver>,
                       info: InterfaceInfo,
                       rip: Option<Ipv4Addr>)
                       -> Result<Engine> {
        let registered = register(&info)?;

        // a frame has to fit one buffer, Ethernet header included
        let buf_size = driver.buf_size();
        let mtu = cmp::min(info.mtu, buf_size - ethernet::HDR_LEN as u16);
        let backend = Backend::Bypass(BypassBackend::new(driver));
        let mut w = Engine::assemble(info, mtu, rip, Vec::new().into_boxed_slice(), backend, registered);

        let idxs = match w.backend {
            Backend::Bypass(ref mut b) => b.driver.take_extra_bufs(),
            _ => unreachable!(),
        };
        for idx in idxs {
            let base = w.bypass().buf_ptr(idx);
            let v = Iov::new(idx, base, buf_size);
            w.free.push_front(v);
        }

        w.log_ready();
        Ok(w)
    }

    /// Construct a connected pair of loopback engines over an in-memory
    /// pipe, each with `nbufs` buffers. Both ends carry `::1` (address
    /// index 0) and `127.0.0.1` (address index 1), and their neighbor
    /// caches are preloaded so connects resolve instantly.
    pub fn loopback_pair(nbufs: u32) -> Result<(Engine, Engine)> {
        let (l, r) = PipeDriver::new_pair(nbufs);
        let mut pair = Vec::with_capacity(2);
        for (name, drv) in vec![("pipe0", l), ("pipe1", r)] {
            let mut info = InterfaceInfo::new(name, MacAddr::zero(), 2048 - ethernet::HDR_LEN as u16);
            info.is_loopback = true;
            info.addrs = vec![IfAddr::v6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1), 128, 0),
                              IfAddr::v4(Ipv4Addr::new(127, 0, 0, 1), 8)];
            let mut w = Engine::init_bypass(Box::new(drv), info, None)?;
            for ia in w.ifaddrs.clone() {
                w.neighbors.update(ia.addr(), MacAddr::zero());
            }
            pair.push(w);
        }
        let b = pair.pop().unwrap();
        let a = pair.pop().unwrap();
        Ok((a, b))
    }

    fn assemble(info: InterfaceInfo,
                mtu: u16,
                rip: Option<Ipv4Addr>,
                mem: Box<[u8]>,
                backend: Backend,
                registered: bool)
                -> Engine {
        // IPv6 addresses first, like the receive and source-selection
        // paths expect
        let mut ifaddrs: Vec<IfAddr> = Vec::with_capacity(info.addrs.len());
        ifaddrs.extend(info.addrs.iter().filter(|a| a.af() == Af::V6).cloned());
        let addr4_pos = ifaddrs.len();
        ifaddrs.extend(info.addrs.iter().filter(|a| a.af() == Af::V4).cloned());

        Engine {
            ifname: info.name,
            mtu: mtu,
            mbps: info.mbps,
            mac: info.mac,
            is_loopback: info.is_loopback,
            have_ip6: addr4_pos > 0,
            have_ip4: addr4_pos < ifaddrs.len(),
            ifaddrs: ifaddrs,
            addr4_pos: addr4_pos,
            rip: rip,
            rng: SmallRng::from_entropy(),
            free: IovQ::new(),
            mem: mem,
            socks: Vec::new(),
            by_tup: ::std::collections::HashMap::new(),
            neighbors: NeighborTable::new(),
            backend: backend,
            registered: registered,
        }
    }

    fn log_ready(&self) {
        info!("{} MAC addr {}, MTU {}, speed {}G",
              self.ifname,
              self.mac,
              self.mtu,
              self.mbps / 1000);
        for ia in &self.ifaddrs {
            info!("{} IPv{} addr {}/{}",
                  self.ifname,
                  match ia.af() {
                      Af::V4 => 4,
                      Af::V6 => 6,
                  },
                  ia.addr(),
                  ia.prefix());
        }
        info!("engine using {} {}-byte bufs on {}",
              self.free.cnt(),
              self.buf_len(),
              self.ifname);
    }

    /// Shut the engine down, releasing all resources. Equivalent to
    /// dropping it.
    pub fn cleanup(self) {}

    pub fn ifname(&self) -> &str {
        &self.ifname
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Link speed in Mb/s, zero when unknown.
    pub fn mbps(&self) -> u32 {
        self.mbps
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn is_loopback(&self) -> bool {
        self.is_loopback
    }

    /// The interface addresses, IPv6 entries first. Indices into this
    /// slice are the `addr_idx` parameter of [`bind`](Engine::bind).
    pub fn ifaddrs(&self) -> &[IfAddr] {
        &self.ifaddrs
    }

    // ------------------------------------------------------------------
    // arena

    /// Usable bytes per packet buffer.
    pub(crate) fn buf_len(&self) -> u16 {
        match self.backend {
            Backend::Bypass(..) => self.mtu,
            Backend::Sock(..) => self.mtu - 28,
        }
    }

    /// Header space reserved in front of the payload of a freshly
    /// allocated vector.
    pub(crate) fn iov_off(&self, af: Af) -> u16 {
        match self.backend {
            Backend::Bypass(..) => ethernet::HDR_LEN as u16 + af.ip_hdr_len() + udp::HDR_LEN,
            Backend::Sock(..) => 0,
        }
    }

    /// Pop a spare vector off the free list, window covering the whole
    /// buffer.
    pub(crate) fn alloc_raw(&mut self) -> Option<Iov> {
        let mut v = self.free.pop_front()?;
        v.reinit();
        Some(v)
    }

    /// Allocate a single vector for address family `af`. The payload
    /// window starts after the header space plus `off` extra bytes and is
    /// `len` bytes long, or everything up to the MTU when `len` is zero.
    /// Returns `None` when the free list is empty.
    pub fn alloc_iov(&mut self, af: Af, len: u16, off: u16) -> Option<Iov> {
        let hdr = self.iov_off(af);
        let win = self.buf_len();
        let v = self.alloc_raw()?;
        let start = hdr + off;
        if start >= win {
            warn!("offset {} leaves no room in a {}-byte buffer", off, win);
            self.free.push_front(v);
            return None;
        }
        let mut v = v;
        let space = win - start;
        v.set_window(start, if len == 0 { space } else { cmp::min(len, space) });
        Some(v)
    }

    /// Allocate a chain of vectors summing to `qlen` payload bytes and
    /// append it to `q`; the last vector is trimmed to fit. Each vector is
    /// at most `len` bytes (zero: the maximum), with `off` extra leading
    /// space. If the free list runs dry the chain is shorter than
    /// requested; the caller is responsible for checking.
    pub fn alloc_len(&mut self, af: Af, q: &mut IovQ, qlen: usize, len: u16, off: u16) {
        let mut needed = qlen;
        while needed > 0 {
            let mut v = match self.alloc_iov(af, len, off) {
                Some(v) => v,
                None => return,
            };
            if needed > v.len() as usize {
                needed -= v.len() as usize;
            } else {
                v.trim(needed as u16);
                needed = 0;
            }
            q.push_back(v);
        }
    }

    /// Allocate `count` vectors of `len` bytes each (zero: the maximum)
    /// and append them to `q`. If the free list runs dry the chain is
    /// shorter than requested; the caller is responsible for checking.
    pub fn alloc_cnt(&mut self, af: Af, q: &mut IovQ, count: usize, len: u16, off: u16) {
        for _ in 0..count {
            match self.alloc_iov(af, len, off) {
                Some(v) => q.push_back(v),
                None => return,
            }
        }
    }

    /// Return a single vector to the arena.
    pub fn free_iov(&mut self, v: Iov) {
        self.free.push_front(v);
    }

    /// Return all vectors of `q` to the arena.
    pub fn free(&mut self, q: &mut IovQ) {
        self.free.append(q);
    }

    /// Maximum payload a vector can carry for address family `af`, given
    /// its current window offset.
    pub fn max_iov_len(&self, v: &Iov, af: Af) -> u16 {
        self.mtu.saturating_sub(v.off()).saturating_sub(af.ip_hdr_len())
    }

    // ------------------------------------------------------------------
    // randomness

    /// Uniform random 64-bit integer.
    pub fn rand64(&mut self) -> u64 {
        self.rng.gen()
    }

    /// Uniform random 32-bit integer.
    pub fn rand32(&mut self) -> u32 {
        self.rng.gen()
    }

    /// Uniform random integer in `[0, upper_bound)`, without modulo bias.
    pub fn rand_uniform64(&mut self, upper_bound: u64) -> u64 {
        if upper_bound < 2 {
            return 0;
        }
        self.rng.gen_range(0..upper_bound)
    }

    /// Uniform random integer in `[0, upper_bound)`, without modulo bias.
    pub fn rand_uniform32(&mut self, upper_bound: u32) -> u32 {
        if upper_bound < 2 {
            return 0;
        }
        self.rng.gen_range(0..upper_bound)
    }

    pub(crate) fn rand_u16(&mut self) -> u16 {
        self.rng.gen()
    }

    pub(crate) fn pick_local_port(&mut self) -> u16 {
        self.rng.gen_range(1024u16..=65535)
    }

    // ------------------------------------------------------------------
    // sockets

    /// Bind a socket to the interface address with index `addr_idx` (into
    /// [`ifaddrs`](Engine::ifaddrs)) and the given local port. Port zero
    /// picks a random port. Binding the same bound-only tuple twice fails
    /// with [`Error::AddrInUse`].
    pub fn bind(&mut self, addr_idx: usize, port: u16, opt: Option<SockOpt>) -> Result<SockId> {
        let ia = *self.ifaddrs.get(addr_idx).ok_or(Error::InvalidInterface)?;
        let scope = ia.scope_id();

        let sid = if self.backend.is_bypass() {
            let port = if port == 0 { self.pick_local_port() } else { port };
            let local = SockAddr::new(ia.addr(), port);
            if self.get_sock(&local, None).is_some() {
                warn!("UDP source port {} already bound", port);
                return Err(Error::AddrInUse);
            }
            let s = Sock::new(SockTuple::bound(local), scope, opt.unwrap_or_default());
            self.insert_sock(s)
        } else {
            let local = SockAddr::new(ia.addr(), port);
            let mut s = Sock::new(SockTuple::bound(local), scope, SockOpt::default());
            sockbe::open_and_bind(&mut s)?;
            if let Some(o) = opt {
                sockbe::set_sockopt(&mut s, &o);
            }
            if self.by_tup.contains_key(&s.tup) {
                return Err(Error::AddrInUse);
            }
            self.insert_sock(s)
        };

        info!("socket bound to {}", self.sock_ref(sid)?.tup.local);
        Ok(sid)
    }

    /// Connect a bound socket to `peer`. In the bypass backend this may
    /// block until the peer's (or the router's) link-layer address has
    /// been resolved. Subsequent [`tx`](Engine::tx) calls on the socket
    /// send towards `peer`.
    pub fn connect(&mut self, sid: SockId, peer: SockAddr) -> Result<()> {
        let (connected, af, local) = {
            let s = self.sock_ref(sid)?;
            (s.connected(), s.af(), s.tup.local)
        };
        if connected {
            error!("socket already connected");
            return Err(Error::AddrInUse);
        }
        if peer.addr.af() != af {
            error!("peer has unknown address family");
            return Err(Error::AfMismatch);
        }

        if self.backend.is_bypass() {
            // the key is about to change
            self.by_tup.remove(&SockTuple::bound(local));

            // resolve the peer, or the router for off-subnet peers
            let target = self.next_hop(&local, &peer.addr);
            let dmac = neighbor::who_has(self, &target);

            let mut local = local;
            let mut n = 200u8;
            while self.by_tup.contains_key(&SockTuple::connected(local, peer)) {
                n -= 1;
                if n == 0 {
                    self.by_tup.insert(SockTuple::bound(local), sid.0);
                    error!("no free local port towards {}", peer);
                    return Err(Error::PortsExhausted);
                }
                local.port = self.pick_local_port();
            }

            let tup = SockTuple::connected(local, peer);
            {
                let s = self.sock_mut(sid)?;
                s.tup = tup;
                s.dmac = dmac;
            }
            self.by_tup.insert(tup, sid.0);
        } else {
            let tup = SockTuple::connected(local, peer);
            {
                let s = self.sock_mut(sid)?;
                s.tup = tup;
                if let Err(e) = sockbe::connect(s) {
                    s.tup = SockTuple::bound(local);
                    error!("socket not connected to {} ({})", peer, e);
                    return Err(Error::Io(e));
                }
            }
            self.by_tup.remove(&SockTuple::bound(local));
            self.by_tup.insert(tup, sid.0);
        }

        debug!("socket connected to {}", peer);
        Ok(())
    }

    /// Close a socket, returning its queued receive vectors to the arena.
    pub fn close(&mut self, sid: SockId) -> Result<()> {
        let s = self.socks
            .get_mut(sid.0 as usize)
            .and_then(|s| s.take())
            .ok_or(Error::InvalidSock)?;
        self.by_tup.remove(&s.tup);
        let mut iv = s.iv;
        self.free.append(&mut iv);
        if let Backend::Sock(ref mut b) = self.backend {
            b.ready.retain(|r| *r != sid);
        }
        Ok(())
    }

    /// Change the options of an open socket.
    pub fn set_sockopt(&mut self, sid: SockId, opt: &SockOpt) -> Result<()> {
        if self.backend.is_bypass() {
            self.sock_mut(sid)?.opt = *opt;
        } else {
            sockbe::set_sockopt(self.sock_mut(sid)?, opt);
        }
        Ok(())
    }

    pub fn get_sockopt(&self, sid: SockId) -> Result<SockOpt> {
        Ok(self.sock_ref(sid)?.opt)
    }

    /// The local address and port the socket is bound to.
    pub fn local_addr(&self, sid: SockId) -> Result<SockAddr> {
        Ok(self.sock_ref(sid)?.tup.local)
    }

    /// Whether the socket has been connected.
    pub fn connected(&self, sid: SockId) -> Result<bool> {
        Ok(self.sock_ref(sid)?.connected())
    }

    /// Maximum UDP payload for this socket: the MTU minus IP and UDP
    /// headers for the socket's address family.
    pub fn max_udp_payload(&self, sid: SockId) -> Result<u16> {
        let af = self.sock_ref(sid)?.af();
        Ok(self.mtu - af.ip_hdr_len() - udp::HDR_LEN)
    }

    // ------------------------------------------------------------------
    // I/O

    /// Enqueue all vectors of `q` for transmission over socket `sid`,
    /// draining `q`. For a disconnected socket each vector's `saddr` names
    /// its destination. Transmitted vectors return to the arena once the
    /// NIC reports completion (bypass; see [`nic_tx`](Engine::nic_tx)) or
    /// the batch has been handed to the kernel (OS backend).
    pub fn tx(&mut self, sid: SockId, q: &mut IovQ) -> Result<()> {
        self.sock_ref(sid)?;
        if !self.backend.is_bypass() {
            sockbe::tx(self, sid, q);
            return Ok(());
        }
        while let Some(v) = q.pop_front() {
            let last = q.is_empty();
            let mut v = v;
            loop {
                match udp::tx(self, sid, v, last) {
                    None => break,
                    Some(ret) => {
                        // all rings full: drain and retry
                        v = ret;
                        self.nic_tx();
                    }
                }
            }
        }
        Ok(())
    }

    /// Flush the TX rings and reclaim transmitted buffers (bypass). No-op
    /// in the OS backend.
    pub fn nic_tx(&mut self) {
        if let Backend::Bypass(ref mut b) = self.backend {
            b.nic_tx(&mut self.free);
        }
    }

    /// Move the vectors queued on socket `sid` into `q`, transferring
    /// ownership to the caller.
    pub fn rx(&mut self, sid: SockId, q: &mut IovQ) -> Result<()> {
        if self.backend.is_bypass() {
            let mut iv = IovQ::new();
            ::std::mem::swap(&mut iv, &mut self.sock_mut(sid)?.iv);
            q.append(&mut iv);
            Ok(())
        } else {
            sockbe::rx(self, sid, q)
        }
    }

    /// Block up to `nsec` nanoseconds until inbound data is available.
    /// Zero returns immediately, -1 blocks indefinitely. Returns whether
    /// anything became ready; an interrupted wait returns `false`.
    pub fn nic_rx(&mut self, nsec: i64) -> bool {
        if self.backend.is_bypass() {
            self.bypass_nic_rx(nsec)
        } else {
            sockbe::nic_rx(self, nsec)
        }
    }

    /// Append the sockets with pending inbound data to `sl`; returns how
    /// many were added. Callers use this after [`nic_rx`](Engine::nic_rx)
    /// to drain only active sockets.
    pub fn rx_ready(&mut self, sl: &mut Vec<SockId>) -> u32 {
        match self.backend {
            Backend::Bypass(..) => {
                let mut n = 0;
                for (i, s) in self.socks.iter().enumerate() {
                    if let Some(s) = s.as_ref() {
                        if !s.iv.is_empty() {
                            sl.push(SockId(i as u32));
                            n += 1;
                        }
                    }
                }
                n
            }
            Backend::Sock(ref b) => {
                for sid in &b.ready {
                    sl.push(*sid);
                }
                b.ready.len() as u32
            }
        }
    }

    /// Resolve the link-layer address of `addr`, blocking until an ARP
    /// reply or neighbor advertisement arrives (bypass backend).
    pub fn who_has(&mut self, addr: &Addr) -> MacAddr {
        neighbor::who_has(self, addr)
    }

    fn bypass_nic_rx(&mut self, nsec: i64) -> bool {
        loop {
            if !self.bypass_mut().driver.poll(nsec) {
                return false;
            }

            let mut rx = false;
            let nrings = self.bypass().driver.rx_rings();
            for ri in 0..nrings {
                loop {
                    let (cur, buf_idx, flen) = {
                        let r = self.bypass_mut().driver.rx_ring(ri);
                        if r.is_empty() {
                            break;
                        }
                        let cur = r.cur;
                        let s = r.slots[cur as usize];
                        (cur, s.buf_idx, s.len)
                    };

                    let ptr = self.bypass().buf_ptr(buf_idx);
                    let frame =
                        unsafe { ::std::slice::from_raw_parts(ptr.as_ptr(), flen as usize) };

                    match ethernet::rx(self, ri, cur, frame) {
                        Ok(hit) => rx |= hit,
                        Err(RxError::NoListener(ref msg)) => debug!("rx drop: {}", msg),
                        Err(e) => warn!("rx drop: {:?}", e),
                    }

                    let r = self.bypass_mut().driver.rx_ring(ri);
                    let next = r.next(cur);
                    r.head = next;
                    r.cur = next;
                }
            }

            if rx || nsec != -1 {
                return rx;
            }
        }
    }

    // ------------------------------------------------------------------
    // internals shared with the protocol modules

    pub(crate) fn bypass(&self) -> &BypassBackend {
        match self.backend {
            Backend::Bypass(ref b) => b,
            _ => panic!("bypass backend required"),
        }
    }

    pub(crate) fn bypass_mut(&mut self) -> &mut BypassBackend {
        match self.backend {
            Backend::Bypass(ref mut b) => b,
            _ => panic!("bypass backend required"),
        }
    }

    pub(crate) fn sock_ref(&self, sid: SockId) -> Result<&Sock> {
        self.socks
            .get(sid.0 as usize)
            .and_then(|s| s.as_ref())
            .ok_or(Error::InvalidSock)
    }

    pub(crate) fn sock_mut(&mut self, sid: SockId) -> Result<&mut Sock> {
        self.socks
            .get_mut(sid.0 as usize)
            .and_then(|s| s.as_mut())
            .ok_or(Error::InvalidSock)
    }

    /// Look up the socket for a four-tuple: the connected tuple when
    /// `remote` is given, the bound-only tuple otherwise.
    pub(crate) fn get_sock(&self, local: &SockAddr, remote: Option<&SockAddr>) -> Option<SockId> {
        let tup = match remote {
            Some(r) => SockTuple::connected(*local, *r),
            None => SockTuple::bound(*local),
        };
        self.by_tup.get(&tup).map(|i| SockId(*i))
    }

    fn insert_sock(&mut self, s: Sock) -> SockId {
        let tup = s.tup;
        let idx = match self.socks.iter().position(|s| s.is_none()) {
            Some(i) => {
                self.socks[i] = Some(s);
                i
            }
            None => {
                self.socks.push(Some(s));
                self.socks.len() - 1
            }
        };
        self.by_tup.insert(tup, idx as u32);
        SockId(idx as u32)
    }

    /// Index of the interface address equal to `ip`, optionally matching
    /// the directed or limited broadcast as well.
    pub(crate) fn ifaddr_match4(&self, ip: Ipv4Addr, match_bcast: bool) -> Option<usize> {
        for (i, ia) in self.ifaddrs.iter().enumerate().skip(self.addr4_pos) {
            if let IfAddr::V4 { addr, bcast, .. } = *ia {
                if ip == addr {
                    return Some(i);
                }
                if match_bcast && (ip == bcast || ip == Ipv4Addr::new(255, 255, 255, 255)) {
                    return Some(i);
                }
            }
        }
        None
    }

    /// Index of the interface address equal to `ip`, optionally matching
    /// the solicited-node multicast and configured broadcast as well.
    pub(crate) fn ifaddr_match6(&self, ip: Ipv6Addr, match_mcast: bool) -> Option<usize> {
        for (i, ia) in self.ifaddrs.iter().enumerate().take(self.addr4_pos) {
            if let IfAddr::V6 { addr, bcast, snma, .. } = *ia {
                if ip == addr {
                    return Some(i);
                }
                if match_mcast && (ip == snma || ip == bcast) {
                    return Some(i);
                }
            }
        }
        None
    }

    pub(crate) fn first_v4(&self) -> Option<Ipv4Addr> {
        match self.ifaddrs.get(self.addr4_pos) {
            Some(&IfAddr::V4 { addr, .. }) => Some(addr),
            _ => None,
        }
    }

    pub(crate) fn first_v6(&self) -> Option<Ipv6Addr> {
        match self.ifaddrs.first() {
            Some(&IfAddr::V6 { addr, .. }) => Some(addr),
            _ => None,
        }
    }

    /// The address to resolve on the link for a packet towards `dst`: the
    /// configured router when `dst` is IPv4 and outside the local prefix,
    /// `dst` itself otherwise.
    fn next_hop(&self, local: &SockAddr, dst: &Addr) -> Addr {
        if let (Some(rip), &Addr::V4(..)) = (self.rip, dst) {
            let on_link = self.ifaddrs
                .iter()
                .find(|ia| ia.addr() == local.addr)
                .map(|ia| ia.contains(dst))
                .unwrap_or(false);
            if !on_link {
                return Addr::V4(rip);
            }
        }
        *dst
    }

    /// Place a control-plane frame (already built inside `v`) on the wire
    /// and return the buffer to the arena once it left.
    pub(crate) fn tx_and_free(&mut self, v: Iov) {
        let mut v = v;
        loop {
            let parked_before = self.bypass().parked_cnt();
            match self.bypass_mut().place_tx(v, true) {
                EthTx::Full(ret) => {
                    v = ret;
                    self.nic_tx();
                }
                EthTx::Copied(ret) => {
                    self.nic_tx();
                    self.free.push_front(ret);
                    return;
                }
                EthTx::Parked => {
                    while self.bypass().parked_cnt() > parked_before {
                        util::nanosleep(100 * util::NS_PER_US);
                        self.nic_tx();
                    }
                    return;
                }
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.registered {
            let mut engines = ENGINES.lock().unwrap();
            if let Some(pos) = engines.iter().position(|n| *n == self.ifname) {
                engines.remove(pos);
            }
        }
    }
}

/// Register a new engine's interface, rejecting duplicates. Loopback
/// engines are exempt and unregistered.
fn register(info: &InterfaceInfo) -> Result<bool> {
    if info.is_loopback {
        return Ok(false);
    }
    let mut engines = ENGINES.lock().unwrap();
    if engines.iter().any(|n| *n == info.name) {
        error!("can only have one engine active on {}", info.name);
        return Err(Error::InterfaceInUse);
    }
    engines.push(info.name.clone());
    Ok(true)
}

//! Socket state: options, the per-socket record, and the handle type the
//! application uses to refer to a socket.

use pnet::util::MacAddr;
use socket2::Socket;

use addr::{Af, SockTuple};
use iov::IovQ;

/// Socket options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SockOpt {
    /// Do not compute a UDP checksum for outgoing packets.
    pub enable_udp_zero_checksums: bool,

    /// Enable ECN by setting ECT(0) on all packets without a per-vector
    /// marking.
    pub enable_ecn: bool,
}

/// Handle to an open socket of an [`Engine`](::Engine). Handles are plain
/// copyable values; all operations go through the engine that issued them.
/// Using a handle after `close` yields [`Error::InvalidSock`](::Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SockId(pub(crate) u32);

/// One open socket.
#[derive(Debug)]
pub(crate) struct Sock {
    /// The demultiplexing four-tuple. `tup.remote` is set iff the socket is
    /// connected.
    pub tup: SockTuple,

    /// IPv6 scope of the local bind.
    pub scope: u32,

    pub opt: SockOpt,

    /// Resolved link-layer address of the destination. Bypass backend only,
    /// valid once connected.
    pub dmac: MacAddr,

    /// Queue of received, unread vectors. Bypass backend only; the OS
    /// backend reads straight out of the kernel socket.
    pub iv: IovQ,

    /// The kernel socket backing this socket. OS backend only.
    pub fd: Option<Socket>,
}

impl Sock {
    pub fn new(tup: SockTuple, scope: u32, opt: SockOpt) -> Sock {
        Sock {
            tup: tup,
            scope: scope,
            opt: opt,
            dmac: MacAddr::zero(),
            iv: IovQ::new(),
            fd: None,
        }
    }

    pub fn connected(&self) -> bool {
        self.tup.remote.is_some()
    }

    pub fn af(&self) -> Af {
        self.tup.local.addr.af()
    }
}

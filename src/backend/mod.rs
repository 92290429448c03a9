//! Engine backends. [`bypass`] exchanges buffers with netmap-style NIC
//! rings by index swap; [`sock`] goes through kernel datagram sockets;
//! [`pipe`] is the in-memory loopback ring driver used by pipe engines.

pub mod bypass;
pub mod pipe;
pub mod sock;

use self::bypass::BypassBackend;
use self::sock::SockBackend;

/// The backend of one engine, chosen at construction time.
#[derive(Debug)]
pub(crate) enum Backend {
    Bypass(BypassBackend),
    Sock(SockBackend),
}

impl Backend {
    pub fn is_bypass(&self) -> bool {
        match *self {
            Backend::Bypass(..) => true,
            Backend::Sock(..) => false,
        }
    }
}

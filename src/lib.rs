// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # zudp - a zero-copy userspace UDP engine
//!
//! `zudp` is a userspace UDP networking engine exposing a socket-like API on
//! top of two interchangeable backends:
//!
//! - a **kernel-bypass backend** that speaks directly to netmap-style NIC
//!   rings mapped into user memory, exchanging fixed-size packet buffers
//!   with ring slots by 32-bit buffer-index swaps, and
//! - a portable **OS-socket backend** that uses kernel datagram sockets with
//!   batched scatter-gather I/O.
//!
//! Both backends share the same application contract: allocate, transmit
//! and receive datagrams as zero-copy *I/O vectors* ([`Iov`]) drawn from an
//! engine-owned buffer arena, over IPv4 and IPv6, with DSCP/ECN and TTL
//! visibility and optional suppression of UDP checksums.
//!
//! ## Usage
//!
//! ```rust,no_run
//! extern crate zudp;
//! use zudp::{Af, Engine, IovQ};
//!
//! let mut w = Engine::init("eth0", None, 1024).unwrap();
//! let s = w.bind(0, 55555, None).unwrap();
//! let mut q = IovQ::new();
//! w.alloc_cnt(Af::V4, &mut q, 1, 0, 0);
//! if let Some(v) = q.front_mut() {
//!     v.as_mut_slice()[..5].copy_from_slice(b"hello");
//!     v.trim(5);
//! }
//! w.tx(s, &mut q).unwrap();
//! w.nic_tx();
//! ```
//!
//! ## Architecture and terminology
//!
//! - An [`Engine`] owns one network interface, a fixed *arena* of packet
//!   buffers, a socket table keyed by four-tuple, and (in the bypass
//!   backend) a neighbor cache fed by ARP and IPv6 NDP.
//! - An [`Iov`] is an owning handle to one arena buffer; it is the unit of
//!   I/O exposed to applications. Vectors move by value between [`IovQ`]
//!   queues: the engine free list, per-socket receive queues, and queues
//!   held by the caller. While a vector is loaned into a TX ring slot it is
//!   parked in a backend side table and owned by nobody else.
//! - Each protocol layer lives in its own module with separate receive and
//!   transmit halves (`ethernet`, `arp`, `ipv4`, `ipv6`, `icmp`, `icmpv6`,
//!   `udp`). The receive halves parse frames in place, directly out of ring
//!   or socket buffers; the transmit halves build headers in place inside
//!   arena buffers, growing the vector's window downward layer by layer.
//!
//! An engine is single-threaded cooperative: it may be *moved* to another
//! thread (engines are `Send`), but all calls on one engine must come from
//! the thread that currently owns it. The only operations that block are
//! [`Engine::nic_rx`] and the neighbor-resolution loop inside connect.
//!
//! ## Tests
//!
//! Unit tests live next to the code they test. The integration tests under
//! `tests/` drive a full engine against an in-memory mock NIC driver
//! (`tests/mocknic/`) that implements the same ring contract as a real
//! netmap interface, plus real loopback sockets for the OS backend.

extern crate ipnetwork;
extern crate libc;
extern crate pnet;
extern crate rand;
extern crate socket2;

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

use std::io;

pub mod addr;
pub mod iov;
pub mod sock;
pub mod neighbor;
pub mod interface;
pub mod backend;

pub mod ethernet;

/// Module containing everything related to the address resolution protocol
/// (Arp).
pub mod arp;

/// Module containing IPv4 functionality.
pub mod ipv4;

/// Module containing IPv6 functionality.
pub mod ipv6;

/// Module containing ICMPv4 functionality.
pub mod icmp;

/// Module containing ICMPv6 and neighbor discovery functionality.
pub mod icmpv6;

/// Module containing UDP functionality.
pub mod udp;

mod engine;

/// Small time helpers shared with applications: a monotonic-ish clock and
/// a nanosecond sleep.
pub mod util;

pub use addr::{Addr, Af, IfAddr, SockAddr, SockTuple};
pub use backend::bypass::{NicDriver, Ring, Slot, SLOT_BUF_CHANGED, SLOT_REPORT};
pub use backend::pipe::PipeDriver;
pub use engine::Engine;
pub use interface::InterfaceInfo;
pub use iov::{Iov, IovQ};
pub use sock::{SockId, SockOpt};

/// Errors returned from the configuration surface of the engine: init, bind,
/// connect and socket lookups. Protocol violations in received frames are
/// never surfaced here; they are logged and the frame is dropped.
#[derive(Debug)]
pub enum Error {
    /// A non-loopback engine already exists on this interface.
    InterfaceInUse,

    /// The named interface does not exist or has no usable addresses.
    InvalidInterface,

    /// The bound-only four-tuple is already taken, or the socket is already
    /// connected.
    AddrInUse,

    /// The peer address family does not match the local bind.
    AfMismatch,

    /// Connect re-rolled the local port the maximum number of times and
    /// every resulting four-tuple collided with an existing socket.
    PortsExhausted,

    /// The socket handle does not refer to an open socket of this engine.
    InvalidSock,

    /// The engine free list is empty.
    NoBufs,

    /// An error reported by the operating system.
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        let other = |msg: &str| io::Error::new(io::ErrorKind::Other, msg.to_owned());
        match e {
            Error::InterfaceInUse => other("interface already has an engine"),
            Error::InvalidInterface => other("invalid interface"),
            Error::AddrInUse => io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
            Error::AfMismatch => other("address family mismatch"),
            Error::PortsExhausted => other("no free local port"),
            Error::InvalidSock => other("invalid socket handle"),
            Error::NoBufs => other("out of packet buffers"),
            Error::Io(e2) => e2,
        }
    }
}

/// Type binding for the `Result` returned by the engine configuration
/// surface.
pub type Result<T> = std::result::Result<T, Error>;

/// Error classifying what was wrong with a received frame. These never
/// propagate to the application; the receive path logs them and drops the
/// frame.
#[derive(Debug, Eq, PartialEq)]
pub enum RxError {
    /// Nothing is listening for this frame (unknown EtherType or protocol,
    /// no socket bound to the destination port, not our address).
    NoListener(String),

    /// The frame contains an invalid checksum.
    InvalidChecksum,

    /// The length of the frame does not match the requirements or header
    /// content of a protocol.
    InvalidLength,

    /// Other invalid frame content (bad version field, unsupported header
    /// format, fragment).
    InvalidContent,
}

/// Result of a receive dispatch step. `Ok(true)` means a datagram was
/// delivered into a socket receive queue.
pub type RxResult = std::result::Result<bool, RxError>;

//! ICMPv6: echo and unreachable handling plus the neighbor-discovery
//! subset the engine needs (neighbor solicitation and advertisement,
//! RFC 4861 shaped).

mod icmpv6_rx;
mod icmpv6_tx;

pub(crate) use self::icmpv6_rx::rx;
pub(crate) use self::icmpv6_tx::{neighbor_solicit, tx};

/// Length of the fixed ICMPv6 header (type, code, checksum, 4 bytes of
/// message-dependent data).
pub const HDR_LEN: u16 = 8;

/// NDP option type: source link-layer address.
pub const OPT_SOURCE_LL_ADDR: u8 = 1;

/// NDP option type: target link-layer address.
pub const OPT_TARGET_LL_ADDR: u8 = 2;

/// Neighbor advertisement flags: Solicited + Override.
pub const NA_SOLICITED_OVERRIDE: u8 = 0x60;

/// ICMPv6 destination-unreachable code: port unreachable.
pub const UNREACH_PORT: u8 = 4;

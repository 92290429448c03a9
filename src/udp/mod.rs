//! UDP: checksum validation, socket demultiplexing and the slot/buffer
//! exchange on receive; header-chain construction on transmit.

mod udp_rx;
mod udp_tx;

pub(crate) use self::udp_rx::rx;
pub(crate) use self::udp_tx::tx;

/// Length of a UDP header.
pub const HDR_LEN: u16 = 8;

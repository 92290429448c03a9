//! Ethernet framing: lowest-level receive dispatch and transmit header
//! construction.

mod ethernet_rx;
mod ethernet_tx;

pub(crate) use self::ethernet_rx::rx;
pub(crate) use self::ethernet_tx::build;

/// Length of an Ethernet header.
pub const HDR_LEN: usize = 14;

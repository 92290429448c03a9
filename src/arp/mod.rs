//! Address resolution for IPv4-over-Ethernet, RFC 826 shaped: receive
//! handling of requests and replies, plus the query and answer transmit
//! paths.

mod arp_rx;
mod arp_tx;

pub(crate) use self::arp_rx::rx;
pub(crate) use self::arp_tx::who_has;

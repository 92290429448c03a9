use pnet::packet::ethernet::{EtherType, MutableEthernetPacket};
use pnet::util::MacAddr;

use iov::Iov;
use super::HDR_LEN;

/// Prepend an Ethernet header to the frame being assembled in `v`. After
/// this the vector's window covers the complete frame, starting at offset
/// zero of its buffer.
pub(crate) fn build(v: &mut Iov, src: MacAddr, dst: MacAddr, ethertype: EtherType) {
    v.grow_front(HDR_LEN as u16);
    let (off, len) = (v.off(), v.len());
    debug_assert_eq!(off, 0);
    let mut eth = MutableEthernetPacket::new(v.window_mut(off, off + len)).unwrap();
    eth.set_destination(dst);
    eth.set_source(src);
    eth.set_ethertype(ethertype);
}

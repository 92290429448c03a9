//! The kernel-bypass backend: NIC rings mapped into user memory, described
//! by the [`NicDriver`] trait with netmap semantics. Packet buffers are
//! referenced by 32-bit indices; ownership moves between the engine and the
//! NIC by swapping indices between ring slots and arena vectors.

use std::fmt;
use std::ptr::NonNull;

use iov::{Iov, IovQ};

/// Slot flag requesting a completion notification from the NIC.
pub const SLOT_REPORT: u16 = 0x0002;

/// Slot flag telling the driver that the slot's buffer index changed.
pub const SLOT_BUF_CHANGED: u16 = 0x0004;

/// One descriptor position in a NIC ring: a buffer index and a length plus
/// flags pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct Slot {
    pub buf_idx: u32,
    pub len: u16,
    pub flags: u16,
}

/// A circular buffer of slots with netmap `(head, cur, tail)` state. On TX
/// rings the engine fills slots at `cur` and the NIC advances `tail` as
/// frames leave the wire; on RX rings the NIC fills slots at `tail` and the
/// engine consumes from `cur`.
pub struct Ring {
    pub head: u32,
    pub cur: u32,
    pub tail: u32,
    pub slots: Vec<Slot>,
}

impl Ring {
    /// A TX ring over `num` consecutive buffers starting at `first_idx`.
    pub fn new_tx(num: u32, first_idx: u32) -> Ring {
        Ring {
            head: 0,
            cur: 0,
            tail: num - 1,
            slots: (0..num)
                .map(|i| Slot {
                    buf_idx: first_idx + i,
                    len: 0,
                    flags: 0,
                })
                .collect(),
        }
    }

    /// An RX ring over `num` consecutive buffers starting at `first_idx`.
    pub fn new_rx(num: u32, first_idx: u32) -> Ring {
        Ring {
            head: 0,
            cur: 0,
            tail: 0,
            slots: (0..num)
                .map(|i| Slot {
                    buf_idx: first_idx + i,
                    len: 0,
                    flags: 0,
                })
                .collect(),
        }
    }

    pub fn num_slots(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn next(&self, i: u32) -> u32 {
        if i + 1 == self.num_slots() {
            0
        } else {
            i + 1
        }
    }

    /// No unread slots (RX) / no free slots (TX).
    pub fn is_empty(&self) -> bool {
        self.cur == self.tail
    }

    /// Number of slots available between `cur` and `tail`.
    pub fn space(&self) -> u32 {
        let n = self.num_slots();
        (self.tail + n - self.cur) % n
    }
}

impl fmt::Debug for Ring {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f,
               "Ring {{ head: {}, cur: {}, tail: {}, num_slots: {} }}",
               self.head,
               self.cur,
               self.tail,
               self.num_slots())
    }
}

/// The contract a kernel-bypass NIC driver has to fulfill. Semantics match
/// netmap: a contiguous buffer region indexed in `buf_size` units, rings of
/// slots carrying buffer indices, a pollable wait for RX traffic and a sync
/// call that pushes filled TX slots onto the wire. Loopback pipes report
/// `is_pipe`, which makes the engine copy frames into TX slots instead of
/// swapping buffer indices, because the pipe partner consumes and replaces
/// the slot itself.
pub trait NicDriver: Send {
    /// Size of one buffer in the region.
    fn buf_size(&self) -> u16;

    /// Start of the shared buffer region.
    fn region(&self) -> *mut u8;

    /// Length of the shared buffer region in bytes.
    fn region_len(&self) -> usize;

    /// The buffer indices owned by the engine (its initial free list).
    /// Called once at engine init.
    fn take_extra_bufs(&mut self) -> Vec<u32>;

    fn rx_rings(&self) -> u32;
    fn tx_rings(&self) -> u32;

    fn rx_ring(&mut self, ri: u32) -> &mut Ring;
    fn tx_ring(&mut self, ri: u32) -> &mut Ring;

    /// Wait up to `nsec` nanoseconds for RX traffic. Zero polls, -1 blocks
    /// indefinitely. Returns whether any RX ring has unread slots.
    fn poll(&mut self, nsec: i64) -> bool;

    /// Kick the TX path: transmit filled slots and advance TX ring tails as
    /// they complete.
    fn tx_sync(&mut self);

    fn is_pipe(&self) -> bool {
        false
    }
}

/// Outcome of placing a frame into a TX ring.
pub(crate) enum EthTx {
    /// Swapped into a slot; the vector is parked in the side table and will
    /// return to the free list on the next completed `nic_tx`.
    Parked,

    /// Pipe mode: the frame was copied into the slot; the vector is handed
    /// back to the caller.
    Copied(Iov),

    /// All TX rings are full.
    Full(Iov),
}

/// Backend state for a bypass engine: the driver, the round-robin TX ring
/// cursor, the TX tails remembered from the last sync, and the parallel
/// `slot -> vector` side table that holds each vector loaned into a TX ring
/// until the NIC reports it transmitted.
pub struct BypassBackend {
    pub driver: Box<dyn NicDriver>,
    pub(crate) cur_txr: u32,
    pub(crate) tails: Vec<u32>,
    pub(crate) slot_iov: Vec<Vec<Option<Iov>>>,
}

impl fmt::Debug for BypassBackend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BypassBackend {{ cur_txr: {} }}", self.cur_txr)
    }
}

impl BypassBackend {
    pub fn new(mut driver: Box<dyn NicDriver>) -> BypassBackend {
        let mut tails = Vec::new();
        let mut slot_iov = Vec::new();
        for ri in 0..driver.tx_rings() {
            let r = driver.tx_ring(ri);
            tails.push(r.tail);
            let mut parked = Vec::new();
            for _ in 0..r.num_slots() {
                parked.push(None);
            }
            slot_iov.push(parked);
        }
        BypassBackend {
            driver: driver,
            cur_txr: 0,
            tails: tails,
            slot_iov: slot_iov,
        }
    }

    /// Pointer to the start of buffer `idx`.
    ///
    /// # Panics
    ///
    /// Panics when `idx` lies outside the mapped region; that can only
    /// happen if the index bookkeeping is corrupt.
    pub fn buf_ptr(&self, idx: u32) -> NonNull<u8> {
        let off = idx as usize * self.driver.buf_size() as usize;
        assert!(off + self.driver.buf_size() as usize <= self.driver.region_len(),
                "buffer index {} out of region",
                idx);
        unsafe { NonNull::new_unchecked(self.driver.region().add(off)) }
    }

    /// Number of vectors currently loaned into TX ring slots.
    pub(crate) fn parked_cnt(&self) -> usize {
        self.slot_iov
            .iter()
            .map(|ring| ring.iter().filter(|v| v.is_some()).count())
            .sum()
    }

    /// Place the Ethernet frame held by `v` (window covering the whole
    /// frame, offset zero) into a TX ring slot: round-robin over the rings
    /// for one with space, swap the slot's buffer index with the vector's
    /// and park the vector, or copy in pipe mode. `last` marks the final
    /// vector of a batch, which requests a completion report.
    pub(crate) fn place_tx(&mut self, mut v: Iov, last: bool) -> EthTx {
        debug_assert_eq!(v.off(), 0);

        let nrings = self.driver.tx_rings();
        let mut found = false;
        for _ in 0..nrings {
            if !self.driver.tx_ring(self.cur_txr).is_empty() {
                found = true;
                break;
            }
            info!("tx ring {} full; moving to next", self.cur_txr);
            self.cur_txr = (self.cur_txr + 1) % nrings;
        }
        if !found {
            info!("all tx rings are full");
            return EthTx::Full(v);
        }

        let ri = self.cur_txr;
        let is_pipe = self.driver.is_pipe();
        let (cur, slot_idx) = {
            let r = self.driver.tx_ring(ri);
            let cur = r.cur;
            let report = r.space() == 1 || last;
            let s = &mut r.slots[cur as usize];
            s.len = v.len();
            s.flags = if report {
                SLOT_BUF_CHANGED | SLOT_REPORT
            } else {
                SLOT_BUF_CHANGED
            };
            (cur, s.buf_idx)
        };

        debug!("{} iov idx {} into tx ring {} slot {} ({} {})",
               if is_pipe { "copying" } else { "placing" },
               v.idx(),
               ri,
               cur,
               if is_pipe { "idx" } else { "swap with" },
               slot_idx);

        let ret = if is_pipe {
            // the pipe partner consumes and replaces the slot itself, so the
            // frame has to be copied into the slot's own buffer
            let len = v.len() as usize;
            let dst = self.buf_ptr(slot_idx);
            unsafe {
                ::std::ptr::copy_nonoverlapping(v.as_slice().as_ptr(), dst.as_ptr(), len);
            }
            EthTx::Copied(v)
        } else {
            let base = self.buf_ptr(slot_idx);
            let v_idx = v.idx();
            v.retarget(slot_idx, base);
            {
                let r = self.driver.tx_ring(ri);
                r.slots[cur as usize].buf_idx = v_idx;
            }
            self.slot_iov[ri as usize][cur as usize] = Some(v);
            EthTx::Parked
        };

        let r = self.driver.tx_ring(ri);
        let next = r.next(cur);
        r.head = next;
        r.cur = next;
        ret
    }

    /// Sync the TX rings and reverse the index swap for every slot the NIC
    /// reports transmitted since the last call, returning the parked
    /// vectors to `free`.
    pub(crate) fn nic_tx(&mut self, free: &mut IovQ) {
        self.driver.tx_sync();

        if self.driver.is_pipe() {
            return;
        }

        for ri in 0..self.driver.tx_rings() {
            let tail_now = self.driver.tx_ring(ri).tail;
            let old_tail = self.tails[ri as usize];

            let mut j = self.driver.tx_ring(ri).next(old_tail);
            let stop = self.driver.tx_ring(ri).next(tail_now);
            while j != stop {
                if let Some(mut v) = self.slot_iov[ri as usize][j as usize].take() {
                    let slot_idx = {
                        let r = self.driver.tx_ring(ri);
                        let s = &mut r.slots[j as usize];
                        let slot_idx = s.buf_idx;
                        s.buf_idx = v.idx();
                        s.flags = SLOT_BUF_CHANGED;
                        slot_idx
                    };
                    let base = self.buf_ptr(slot_idx);
                    v.retarget(slot_idx, base);
                    free.push_front(v);
                }
                j = self.driver.tx_ring(ri).next(j);
            }

            self.tails[ri as usize] = tail_now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Ring;

    #[test]
    fn tx_ring_starts_with_full_space() {
        let r = Ring::new_tx(64, 0);
        assert_eq!(r.space(), 63);
        assert!(!r.is_empty());
    }

    #[test]
    fn rx_ring_starts_empty() {
        let r = Ring::new_rx(64, 0);
        assert!(r.is_empty());
    }

    #[test]
    fn next_wraps() {
        let r = Ring::new_tx(4, 0);
        assert_eq!(r.next(2), 3);
        assert_eq!(r.next(3), 0);
    }
}

//! An in-memory loopback NIC: two connected [`NicDriver`] endpoints. What
//! one end syncs out of its TX ring shows up in the other end's RX ring.
//! This is the driver behind [`Engine::loopback_pair`](::Engine), and the
//! reason the bypass TX path has a copy mode: a pipe consumes the TX slot
//! itself, so the frame is copied rather than index-swapped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use backend::bypass::{NicDriver, Ring};
use util;

const RING_SLOTS: u32 = 64;
const BUF_SIZE: u16 = 2048;

/// Frames in flight between the two ends.
#[derive(Default)]
struct PipeShared {
    inbox: [VecDeque<Vec<u8>>; 2],
}

/// One end of an in-memory loopback pipe.
pub struct PipeDriver {
    mem: Box<[u8]>,
    rx: Ring,
    tx: Ring,
    extra: Vec<u32>,
    shared: Arc<Mutex<PipeShared>>,
    side: usize,
}

impl PipeDriver {
    /// Create a connected pair of pipe endpoints, each owning `nbufs` extra
    /// buffers for its engine's free list.
    pub fn new_pair(nbufs: u32) -> (PipeDriver, PipeDriver) {
        let shared = Arc::new(Mutex::new(PipeShared::default()));
        let left = PipeDriver::new(nbufs, shared.clone(), 0);
        let right = PipeDriver::new(nbufs, shared, 1);
        (left, right)
    }

    fn new(nbufs: u32, shared: Arc<Mutex<PipeShared>>, side: usize) -> PipeDriver {
        let total = (2 * RING_SLOTS + nbufs) as usize * BUF_SIZE as usize;
        PipeDriver {
            mem: vec![0u8; total].into_boxed_slice(),
            rx: Ring::new_rx(RING_SLOTS, 0),
            tx: Ring::new_tx(RING_SLOTS, RING_SLOTS),
            extra: (2 * RING_SLOTS..2 * RING_SLOTS + nbufs).collect(),
            shared: shared,
            side: side,
        }
    }

    /// Move pending inbound frames into free RX ring slots.
    fn pump(&mut self) {
        let mut shared = self.shared.lock().unwrap();
        let inbox = &mut shared.inbox[self.side];
        while let Some(frame) = inbox.pop_front() {
            let tail = self.rx.tail;
            if self.rx.next(tail) == self.rx.head {
                inbox.push_front(frame);
                break;
            }
            let len = ::std::cmp::min(frame.len(), BUF_SIZE as usize);
            let s = &mut self.rx.slots[tail as usize];
            let off = s.buf_idx as usize * BUF_SIZE as usize;
            self.mem[off..off + len].copy_from_slice(&frame[..len]);
            s.len = len as u16;
            s.flags = 0;
            self.rx.tail = self.rx.next(tail);
        }
    }
}

impl NicDriver for PipeDriver {
    fn buf_size(&self) -> u16 {
        BUF_SIZE
    }

    fn region(&self) -> *mut u8 {
        self.mem.as_ptr() as *mut u8
    }

    fn region_len(&self) -> usize {
        self.mem.len()
    }

    fn take_extra_bufs(&mut self) -> Vec<u32> {
        ::std::mem::replace(&mut self.extra, Vec::new())
    }

    fn rx_rings(&self) -> u32 {
        1
    }

    fn tx_rings(&self) -> u32 {
        1
    }

    fn rx_ring(&mut self, _ri: u32) -> &mut Ring {
        &mut self.rx
    }

    fn tx_ring(&mut self, _ri: u32) -> &mut Ring {
        &mut self.tx
    }

    fn poll(&mut self, nsec: i64) -> bool {
        let deadline = util::Deadline::new(nsec);
        loop {
            self.pump();
            if !self.rx.is_empty() {
                return true;
            }
            if deadline.expired() {
                return false;
            }
            util::nanosleep(util::NS_PER_MS);
        }
    }

    fn tx_sync(&mut self) {
        let mut shared = self.shared.lock().unwrap();
        let peer = &mut shared.inbox[1 - self.side];
        while self.tx.next(self.tx.tail) != self.tx.head {
            let j = self.tx.next(self.tx.tail);
            let s = self.tx.slots[j as usize];
            let off = s.buf_idx as usize * BUF_SIZE as usize;
            peer.push_back(self.mem[off..off + s.len as usize].to_vec());
            self.tx.tail = j;
        }
    }

    fn is_pipe(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use backend::bypass::NicDriver;
    use super::PipeDriver;

    #[test]
    fn frames_cross_the_pipe() {
        let (mut l, mut r) = PipeDriver::new_pair(4);

        // place one frame into the left TX ring by hand
        {
            let tx = l.tx_ring(0);
            let cur = tx.cur;
            let idx = tx.slots[cur as usize].buf_idx;
            tx.slots[cur as usize].len = 5;
            let next = tx.next(cur);
            tx.head = next;
            tx.cur = next;
            let off = idx as usize * 2048;
            l.mem[off..off + 5].copy_from_slice(b"abcde");
        }
        l.tx_sync();

        assert!(r.poll(0));
        let rx = r.rx_ring(0);
        let cur = rx.cur;
        let s = rx.slots[cur as usize];
        assert_eq!(s.len, 5);
        assert!(!l.poll(0));
    }
}

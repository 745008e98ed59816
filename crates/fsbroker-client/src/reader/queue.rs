//! Completed reads waiting to be consumed, oldest first.

use std::collections::VecDeque;

use crate::event::Message;
use crate::protocol::ReadResponse;

#[derive(Debug)]
struct Completed {
    msg: Message,
    // unconsumed span of msg.body
    pos: usize,
    end: usize,
}

#[derive(Debug, Default)]
pub(crate) struct CompletionQueue {
    items: VecDeque<Completed>,
    buffered: usize,
}

impl CompletionQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, msg: Message, resp: &ReadResponse) {
        self.buffered += resp.data.len();
        self.items.push_back(Completed {
            msg,
            pos: resp.data.start,
            end: resp.data.end,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Unconsumed bytes across all entries.
    pub(crate) fn buffered_bytes(&self) -> usize {
        self.buffered
    }

    /// Copy from the front entry into `dst`. Returns the bytes copied and
    /// whether the front entry is now fully consumed. The entry stays queued
    /// until [`pop_front`](Self::pop_front).
    pub(crate) fn copy_front(&mut self, dst: &mut [u8]) -> Option<(usize, bool)> {
        let front = self.items.front_mut()?;
        let n = dst.len().min(front.end - front.pos);
        dst[..n].copy_from_slice(&front.msg.body[front.pos..front.pos + n]);
        front.pos += n;
        self.buffered -= n;
        Some((n, front.pos == front.end))
    }

    /// Drop the front entry, releasing its payload buffer.
    pub(crate) fn pop_front(&mut self) {
        if let Some(done) = self.items.pop_front() {
            self.buffered -= done.end - done.pos;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
        self.buffered = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_read_response, encode_read_response};
    use fsbroker_core::id::RequestId;
    use fsbroker_mem::BufferPool;

    fn push(q: &mut CompletionQueue, pool: &BufferPool, data: &[u8]) {
        let msg = Message::new(RequestId::new(0), encode_read_response(pool, 0, data).unwrap());
        let resp = decode_read_response(&msg).unwrap();
        q.push(msg, &resp);
    }

    #[test]
    fn copies_across_partial_reads_in_order() {
        let pool = BufferPool::unbounded();
        let mut q = CompletionQueue::new();
        push(&mut q, &pool, b"hello");
        push(&mut q, &pool, b"world");
        assert_eq!(q.buffered_bytes(), 10);

        let mut out = [0u8; 3];
        assert_eq!(q.copy_front(&mut out), Some((3, false)));
        assert_eq!(&out, b"hel");

        let mut out = [0u8; 8];
        assert_eq!(q.copy_front(&mut out), Some((2, true)));
        assert_eq!(&out[..2], b"lo");
        q.pop_front();

        assert_eq!(q.len(), 1);
        assert_eq!(q.buffered_bytes(), 5);
        assert_eq!(q.copy_front(&mut out[..5]), Some((5, true)));
        assert_eq!(&out[..5], b"world");
    }

    #[test]
    fn popping_releases_payload() {
        let pool = BufferPool::unbounded();
        let mut q = CompletionQueue::new();
        push(&mut q, &pool, &[1u8; 64]);
        assert!(pool.used_bytes() >= 64);
        q.pop_front();
        assert_eq!(pool.used_bytes(), 0);
        assert_eq!(q.buffered_bytes(), 0);
        assert_eq!(q.copy_front(&mut [0u8; 4]), None);
    }
}

//! Single-slot handoff channel
//!
//! Bridges one producer thread that is handed chunks by a push-style call
//! and one consumer thread that must fill buffers for a pull-style call.
//! The producer blocks until its chunk is fully drained, so at most one
//! chunk is ever held, whatever sizes either side works in.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Result status of an [`HandoffChannel::acquire`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    /// The whole requested length was copied
    Complete,
    /// The channel closed before the request was satisfied
    Cancelled,
}

/// Outcome of an [`HandoffChannel::acquire`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquired {
    /// Bytes copied into the caller's buffer
    pub len: usize,
    /// Whether the request was satisfied
    pub status: AcquireStatus,
}

impl Acquired {
    /// Check if the full request was satisfied
    pub fn is_complete(&self) -> bool {
        self.status == AcquireStatus::Complete
    }
}

#[derive(Debug, Default)]
struct Slot {
    /// Pending chunk; bytes before `cursor` were already drained
    chunk: Vec<u8>,
    cursor: usize,
    done: bool,
}

impl Slot {
    fn pending(&self) -> usize {
        self.chunk.len() - self.cursor
    }
}

/// Bounded rendezvous buffer between one producer and one consumer
#[derive(Debug, Default)]
pub struct HandoffChannel {
    slot: Mutex<Slot>,
    /// Signalled when a chunk is published or the channel closes
    data_ready: Condvar,
    /// Signalled when the pending chunk is drained or the channel closes
    drained: Condvar,
}

impl HandoffChannel {
    /// Create an open, empty channel
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish one chunk and wait until the consumer has drained it.
    ///
    /// Returns the number of bytes drained, which is less than
    /// `chunk.len()` only if the channel was closed first.
    pub fn publish(&self, chunk: &[u8]) -> usize {
        let mut slot = self
            .drained
            .wait_while(self.lock(), |s| !s.done && s.pending() > 0)
            .unwrap_or_else(PoisonError::into_inner);

        if slot.done {
            return 0;
        }

        slot.chunk.clear();
        slot.chunk.extend_from_slice(chunk);
        slot.cursor = 0;
        self.data_ready.notify_one();

        let slot = self
            .drained
            .wait_while(slot, |s| !s.done && s.pending() > 0)
            .unwrap_or_else(PoisonError::into_inner);

        slot.cursor
    }

    /// Fill `buf` from published chunks, waiting for more as needed.
    ///
    /// Chunk boundaries are not preserved: one call may span several
    /// chunks, and one chunk may be spread over several calls.
    pub fn acquire(&self, buf: &mut [u8]) -> Acquired {
        let want = buf.len();
        let mut copied = 0;
        let mut slot = self.lock();

        while copied < want {
            slot = self
                .data_ready
                .wait_while(slot, |s| !s.done && s.pending() == 0)
                .unwrap_or_else(PoisonError::into_inner);

            // Nothing moves after close, so the producer's count stays exact
            if slot.done {
                return Acquired {
                    len: copied,
                    status: AcquireStatus::Cancelled,
                };
            }

            let n = (want - copied).min(slot.pending());
            let start = slot.cursor;
            buf[copied..copied + n].copy_from_slice(&slot.chunk[start..start + n]);
            slot.cursor += n;
            copied += n;

            if slot.pending() == 0 {
                self.drained.notify_one();
            }
        }

        Acquired {
            len: copied,
            status: AcquireStatus::Complete,
        }
    }

    /// Close the channel and wake both sides. Idempotent.
    pub fn close(&self) {
        let mut slot = self.lock();
        slot.done = true;
        drop(slot);
        self.data_ready.notify_all();
        self.drained.notify_all();
    }

    /// Check if the channel has been closed
    pub fn is_closed(&self) -> bool {
        self.lock().done
    }
}

/// Closes a channel when dropped, so a panicking side still releases the
/// other one
pub struct CloseOnDrop<'a>(pub &'a HandoffChannel);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn relay(chunks: Vec<Vec<u8>>, requests: Vec<usize>) -> Vec<u8> {
        let channel = Arc::new(HandoffChannel::new());
        let total: usize = chunks.iter().map(Vec::len).sum();

        let producer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                for chunk in &chunks {
                    assert_eq!(channel.publish(chunk), chunk.len());
                }
            })
        };

        let mut out = Vec::with_capacity(total);
        let mut i = 0;
        while out.len() < total {
            let want = requests[i % requests.len()].min(total - out.len());
            i += 1;
            let mut buf = vec![0u8; want];
            let got = channel.acquire(&mut buf);
            assert!(got.is_complete());
            out.extend_from_slice(&buf[..got.len]);
        }

        producer.join().unwrap();
        channel.close();
        out
    }

    #[test]
    fn test_reslicing() {
        let chunks = vec![b"hello ".to_vec(), b"handoff ".to_vec(), b"channel".to_vec()];
        let out = relay(chunks, vec![4, 1, 9]);
        assert_eq!(out, b"hello handoff channel");
    }

    #[test]
    fn test_acquire_spans_chunks() {
        let chunks = vec![vec![1u8; 3], vec![2u8; 3], vec![3u8; 3]];
        let out = relay(chunks, vec![9]);
        assert_eq!(out, [1, 1, 1, 2, 2, 2, 3, 3, 3]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let channel = HandoffChannel::new();
        channel.close();
        channel.close();
        assert!(channel.is_closed());

        assert_eq!(channel.publish(b"late"), 0);
        let mut buf = [0u8; 4];
        let got = channel.acquire(&mut buf);
        assert_eq!(got.len, 0);
        assert_eq!(got.status, AcquireStatus::Cancelled);
    }

    #[test]
    fn test_zero_length_acquire() {
        let channel = HandoffChannel::new();
        let got = channel.acquire(&mut []);
        assert!(got.is_complete());
        assert_eq!(got.len, 0);
    }

    #[test]
    fn test_close_unblocks_publisher() {
        let channel = Arc::new(HandoffChannel::new());

        let producer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.publish(&[0u8; 1024]))
        };

        let mut buf = [0u8; 100];
        assert!(channel.acquire(&mut buf).is_complete());
        channel.close();

        assert_eq!(producer.join().unwrap(), 100);
    }

    #[test]
    fn test_close_unblocks_consumer() {
        let channel = Arc::new(HandoffChannel::new());

        let consumer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                let mut buf = [0u8; 64];
                channel.acquire(&mut buf)
            })
        };

        thread::sleep(Duration::from_millis(20));
        channel.close();

        let got = consumer.join().unwrap();
        assert_eq!(got.status, AcquireStatus::Cancelled);
        assert_eq!(got.len, 0);
    }

    #[test]
    fn test_partial_then_closed() {
        let channel = Arc::new(HandoffChannel::new());

        let producer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                let drained = channel.publish(b"abc");
                channel.close();
                drained
            })
        };

        let mut buf = [0u8; 8];
        let got = channel.acquire(&mut buf);
        assert_eq!(producer.join().unwrap(), 3);
        assert_eq!(got.status, AcquireStatus::Cancelled);
        assert_eq!(&buf[..got.len], b"abc");
    }

    #[test]
    fn test_close_on_drop() {
        let channel = HandoffChannel::new();
        {
            let _guard = CloseOnDrop(&channel);
        }
        assert!(channel.is_closed());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_bytes_preserved_in_order(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 0..24),
            requests in prop::collection::vec(1usize..100, 1..8),
        ) {
            let expected = chunks.concat();
            let out = relay(chunks, requests);
            prop_assert_eq!(out, expected);
        }
    }
}

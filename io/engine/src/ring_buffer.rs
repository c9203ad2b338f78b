//! Fixed-capacity circular byte buffer for direct socket I/O.
//!
//! The buffer is allocated once and never moves or grows. Callers get
//! zero-copy access to the largest contiguous region on either side of the
//! cursors, so a socket `read`/`write` can target the storage directly:
//!
//! - [`RingBuffer::contiguous_write_span`] + [`RingBuffer::reserve`] for
//!   filling from a socket
//! - [`RingBuffer::contiguous_read_span`] + [`RingBuffer::consume`] for
//!   draining to a socket
//!
//! [`RingBuffer::put`] and [`RingBuffer::get`] are the copying variants and
//! handle the wrap point internally.
//!
//! There is no locking. A buffer is only ever touched by the thread that
//! owns the engine loop.

use std::io;

/// A fixed-capacity FIFO of bytes backed by a single `Box<[u8]>`.
///
/// The occupied count is tracked explicitly so that `head == tail` is
/// unambiguous: it means empty when `occupied() == 0` and full when
/// `occupied() == capacity()`.
///
/// # Example
///
/// ```
/// use io_engine::RingBuffer;
///
/// let mut buf = RingBuffer::new(16);
/// assert_eq!(buf.put(b"hello"), 5);
///
/// let span = buf.contiguous_read_span();
/// assert_eq!(span, b"hello");
/// let n = span.len();
/// buf.consume(n);
/// assert!(buf.is_empty());
/// ```
#[derive(Debug)]
pub struct RingBuffer {
    data: Box<[u8]>,
    /// Read cursor.
    head: usize,
    /// Write cursor.
    tail: usize,
    /// Occupied bytes.
    len: usize,
}

impl RingBuffer {
    /// Create a buffer with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Returns the total capacity of the buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns the number of bytes waiting to be read.
    #[inline]
    pub fn occupied(&self) -> usize {
        self.len
    }

    /// Returns the number of bytes that can still be written.
    #[inline]
    pub fn free_space(&self) -> usize {
        self.data.len() - self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    /// Returns the occupied bytes that are laid out contiguously from the
    /// read cursor. Empty if the buffer is empty.
    ///
    /// When the occupied region wraps, only the part up to the end of the
    /// storage is returned; consume it and call again for the rest.
    #[inline]
    pub fn contiguous_read_span(&self) -> &[u8] {
        let n = self.len.min(self.data.len() - self.head);
        &self.data[self.head..self.head + n]
    }

    /// Advance the read cursor by `n` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the current contiguous read span. This
    /// indicates the caller claimed more than it was handed.
    #[inline]
    pub fn consume(&mut self, n: usize) {
        let available = self.contiguous_read_span().len();
        assert!(
            n <= available,
            "consume({}) exceeds contiguous readable bytes ({})",
            n,
            available
        );
        self.head += n;
        self.len -= n;

        if self.head == self.data.len() {
            self.head = 0;
        }

        // Rewind when drained so the next write span is as large as possible
        if self.len == 0 {
            self.head = 0;
            self.tail = 0;
        }
    }

    /// Returns the free bytes that are laid out contiguously from the write
    /// cursor. Empty if the buffer is full.
    #[inline]
    pub fn contiguous_write_span(&mut self) -> &mut [u8] {
        let n = self.free_space().min(self.data.len() - self.tail);
        &mut self.data[self.tail..self.tail + n]
    }

    /// Advance the write cursor by `n` bytes that were written into the
    /// span returned by [`contiguous_write_span`](Self::contiguous_write_span).
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the current contiguous write span.
    #[inline]
    pub fn reserve(&mut self, n: usize) {
        let available = self.free_space().min(self.data.len() - self.tail);
        assert!(
            n <= available,
            "reserve({}) exceeds contiguous free bytes ({})",
            n,
            available
        );
        self.tail += n;
        self.len += n;

        if self.tail == self.data.len() {
            self.tail = 0;
        }
    }

    /// Copy as much of `src` as fits into the buffer.
    ///
    /// Returns the number of bytes copied, which is less than `src.len()`
    /// only when the buffer ran out of free space.
    pub fn put(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.free_space());
        let mut copied = 0;

        // At most two passes: up to the end of storage, then from the start
        while copied < n {
            let span = self.contiguous_write_span();
            let s = span.len().min(n - copied);
            span[..s].copy_from_slice(&src[copied..copied + s]);
            self.reserve(s);
            copied += s;
        }

        n
    }

    /// Copy up to `dest.len()` bytes out of the buffer.
    ///
    /// Returns the number of bytes copied, bounded by the occupied count.
    pub fn get(&mut self, dest: &mut [u8]) -> usize {
        let n = dest.len().min(self.len);
        let mut copied = 0;

        while copied < n {
            let span = self.contiguous_read_span();
            let s = span.len().min(n - copied);
            dest[copied..copied + s].copy_from_slice(&span[..s]);
            self.consume(s);
            copied += s;
        }

        n
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }
}

/// Writes never block. A full buffer reports `Ok(0)`, so `write_all` turns
/// an overflow into `ErrorKind::WriteZero`.
impl io::Write for RingBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.put(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Read for RingBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.get(buf))
    }
}

/// The caller-owned pair of buffers an [`Engine`](crate::Engine) pumps.
#[derive(Debug)]
pub struct Buffers {
    /// Bytes received from the peer, drained by the caller.
    pub read: RingBuffer,
    /// Bytes queued by the caller, drained to the peer.
    pub write: RingBuffer,
}

impl Buffers {
    /// Allocate a read and a write buffer of the same capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            read: RingBuffer::new(capacity),
            write: RingBuffer::new(capacity),
        }
    }

    /// Drop any bytes left over from a previous connection.
    pub fn clear(&mut self) {
        self.read.clear();
        self.write.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;
    use std::collections::VecDeque;
    use std::io::Write;

    #[test]
    fn test_basic_operations() {
        let mut buf = RingBuffer::new(1024);

        assert_eq!(buf.capacity(), 1024);
        assert_eq!(buf.occupied(), 0);
        assert_eq!(buf.free_space(), 1024);
        assert!(buf.is_empty());
        assert!(buf.contiguous_read_span().is_empty());

        assert_eq!(buf.put(b"hello"), 5);
        assert_eq!(buf.occupied(), 5);
        assert_eq!(buf.contiguous_read_span(), b"hello");

        buf.consume(2);
        assert_eq!(buf.occupied(), 3);
        assert_eq!(buf.contiguous_read_span(), b"llo");
    }

    #[test]
    fn test_wraparound_preserves_unread_data() {
        let mut buf = RingBuffer::new(16);
        let first: Vec<u8> = (0..10).collect();
        let second: Vec<u8> = (100..108).collect();

        assert_eq!(buf.put(&first), 10);

        let mut out = [0u8; 6];
        assert_eq!(buf.get(&mut out), 6);
        assert_eq!(out, [0, 1, 2, 3, 4, 5]);

        assert_eq!(buf.put(&second), 8);
        assert_eq!(buf.occupied(), 12);

        let mut out = [0u8; 12];
        assert_eq!(buf.get(&mut out), 12);
        assert_eq!(&out[..4], &[6, 7, 8, 9]);
        assert_eq!(&out[4..], &second[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_spans_split_at_wrap_point() {
        let mut buf = RingBuffer::new(8);
        buf.put(b"abcdef");
        let mut out = [0u8; 5];
        buf.get(&mut out);

        // head = 5, tail = 6
        assert_eq!(buf.contiguous_write_span().len(), 2);
        buf.put(b"ghij");

        // occupied region is "fgh" at 5..8 then "ij" at 0..2
        assert_eq!(buf.contiguous_read_span(), b"fgh");
        buf.consume(3);
        assert_eq!(buf.contiguous_read_span(), b"ij");
    }

    #[test]
    fn test_full_and_empty_are_distinct() {
        let mut buf = RingBuffer::new(4);
        assert_eq!(buf.put(b"abcdef"), 4);
        assert!(buf.is_full());
        assert_eq!(buf.free_space(), 0);
        assert!(buf.contiguous_write_span().is_empty());
        assert_eq!(buf.put(b"x"), 0);

        let mut out = [0u8; 8];
        assert_eq!(buf.get(&mut out), 4);
        assert_eq!(&out[..4], b"abcd");
        assert!(buf.is_empty());
        assert_eq!(buf.get(&mut out), 0);
    }

    #[test]
    fn test_reserve_after_direct_write() {
        let mut buf = RingBuffer::new(32);

        let span = buf.contiguous_write_span();
        span[..5].copy_from_slice(b"hello");
        buf.reserve(5);

        assert_eq!(buf.contiguous_read_span(), b"hello");
    }

    #[test]
    fn test_rewinds_when_drained() {
        let mut buf = RingBuffer::new(8);
        buf.put(b"abcde");
        buf.consume(5);

        assert_eq!(buf.contiguous_write_span().len(), 8);
    }

    #[test]
    #[should_panic(expected = "consume(4) exceeds contiguous readable bytes (3)")]
    fn test_consume_overflow_panics() {
        let mut buf = RingBuffer::new(16);
        buf.put(b"abc");
        buf.consume(4);
    }

    #[test]
    #[should_panic(expected = "reserve(17) exceeds contiguous free bytes (16)")]
    fn test_reserve_overflow_panics() {
        let mut buf = RingBuffer::new(16);
        buf.reserve(17);
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn test_zero_capacity_panics() {
        let _ = RingBuffer::new(0);
    }

    #[test]
    fn test_write_all_reports_overflow() {
        let mut buf = RingBuffer::new(4);
        let err = buf.write_all(b"too long").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert!(buf.is_full());
    }

    #[test]
    fn test_matches_vecdeque_model() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let mut buf = RingBuffer::new(61);
        let mut model: VecDeque<u8> = VecDeque::new();
        let mut next = 0u8;

        for _ in 0..10_000 {
            match rng.gen_range(0..4) {
                0 => {
                    let want = rng.gen_range(0..40);
                    let src: Vec<u8> = (0..want)
                        .map(|_| {
                            next = next.wrapping_add(1);
                            next
                        })
                        .collect();
                    let n = buf.put(&src);
                    assert!(n <= src.len());
                    model.extend(&src[..n]);
                }
                1 => {
                    let want = rng.gen_range(0..40);
                    let mut dest = vec![0u8; want];
                    let n = buf.get(&mut dest);
                    let expected: Vec<u8> = model.drain(..n).collect();
                    assert_eq!(&dest[..n], &expected[..]);
                }
                2 => {
                    let span = buf.contiguous_write_span();
                    let n = rng.gen_range(0..=span.len());
                    for b in &mut span[..n] {
                        next = next.wrapping_add(1);
                        *b = next;
                        model.push_back(next);
                    }
                    buf.reserve(n);
                }
                _ => {
                    let span = buf.contiguous_read_span();
                    let n = rng.gen_range(0..=span.len());
                    let expected: Vec<u8> = model.drain(..n).collect();
                    assert_eq!(&span[..n], &expected[..]);
                    buf.consume(n);
                }
            }

            assert_eq!(buf.occupied(), model.len());
            assert!(buf.occupied() <= buf.capacity());
            assert_eq!(buf.free_space(), buf.capacity() - model.len());
        }
    }
}

use std::borrow::Cow;
use std::collections::VecDeque;

/// Append-only byte accumulator over owned chunks.
///
/// Chunks are pushed on the back and bytes are dropped from the front without
/// shuffling chunk contents; a cursor into the front chunk makes front drops
/// cheap. Out-of-range requests are clamped to the buffered length and never
/// fail.
pub struct ChunkBuffer {
    chunks: VecDeque<Vec<u8>>,
    // read cursor into the front chunk, always < its length
    head: usize,
    len: usize,
}

impl ChunkBuffer {
    #[must_use]
    pub fn new() -> Self {
        ChunkBuffer {
            chunks: VecDeque::new(),
            head: 0,
            len: 0,
        }
    }

    /// Number of buffered bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a chunk. Empty chunks are ignored.
    pub fn add(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// The first `n` buffered bytes, without consuming them.
    ///
    /// Borrows from the front chunk when the span does not cross a chunk
    /// boundary and copies otherwise.
    #[must_use]
    pub fn peek(&self, n: usize) -> Cow<'_, [u8]> {
        let n = n.min(self.len);
        if n == 0 {
            return Cow::Borrowed(&[]);
        }
        let front = &self.chunks[0];
        if self.head + n <= front.len() {
            return Cow::Borrowed(&front[self.head..self.head + n]);
        }
        let mut out = Vec::with_capacity(n);
        out.extend_from_slice(&front[self.head..]);
        for chunk in self.chunks.iter().skip(1) {
            if out.len() == n {
                break;
            }
            let take = (n - out.len()).min(chunk.len());
            out.extend_from_slice(&chunk[..take]);
        }
        Cow::Owned(out)
    }

    /// Consume and return the first `n` buffered bytes.
    pub fn read(&mut self, n: usize) -> Vec<u8> {
        let out = self.peek(n).into_owned();
        self.truncate(out.len());
        out
    }

    /// Drop the first `n` buffered bytes, returning how many were dropped.
    ///
    /// Cost is proportional to the number of chunks fully consumed, not to
    /// `n`.
    pub fn truncate(&mut self, n: usize) -> usize {
        let dropped = n.min(self.len);
        let mut remaining = dropped;
        while remaining > 0 {
            let avail = self.chunks[0].len() - self.head;
            if remaining < avail {
                self.head += remaining;
                break;
            }
            remaining -= avail;
            self.chunks.pop_front();
            self.head = 0;
        }
        self.len -= dropped;
        dropped
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.head = 0;
        self.len = 0;
    }

    /// Merge all buffered bytes into a single front chunk so [`Self::as_slice`]
    /// can expose one contiguous window.
    pub(crate) fn coalesce(&mut self) {
        if self.chunks.len() <= 1 && self.head == 0 {
            return;
        }
        let mut merged = match self.chunks.pop_front() {
            Some(front) => front,
            None => return,
        };
        if self.head > 0 {
            merged.drain(..self.head);
            self.head = 0;
        }
        merged.reserve(self.len.saturating_sub(merged.len()));
        while let Some(chunk) = self.chunks.pop_front() {
            merged.extend_from_slice(&chunk);
        }
        self.chunks.push_front(merged);
    }

    /// All buffered bytes as one slice. Only valid after [`Self::coalesce`].
    pub(crate) fn as_slice(&self) -> &[u8] {
        debug_assert!(
            self.chunks.len() <= 1 && self.head == 0,
            "coalesce before as_slice"
        );
        match self.chunks.front() {
            Some(chunk) => chunk,
            None => &[],
        }
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}

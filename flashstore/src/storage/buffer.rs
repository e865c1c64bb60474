/// Write-side staging buffer. Bytes collect here until a full buffer (or a
/// close) pushes them to flash in page-sized programs.
use crate::flash::PAGE_SIZE;

/// Buffer capacity in bytes.
pub const BUFFER_SIZE: usize = 1024;

static_assertions::const_assert_eq!(BUFFER_SIZE % PAGE_SIZE as usize, 0);

pub struct WriteBuffer {
    data: [u8; BUFFER_SIZE],
    len: usize,
}

impl WriteBuffer {
    pub const fn new() -> Self {
        Self {
            data: [0u8; BUFFER_SIZE],
            len: 0,
        }
    }

    /// Copy as much of `src` as fits. Returns the number of bytes taken.
    pub fn fill(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(BUFFER_SIZE - self.len);
        self.data[self.len..self.len + n].copy_from_slice(&src[..n]);
        self.len += n;
        n
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == BUFFER_SIZE
    }

    /// Pending bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Drop the first `n` pending bytes, keeping the rest in order.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.data.copy_within(n..self.len, 0);
        self.len -= n;
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

//! Fixed-capacity byte ring buffer
//!
//! One ring holds the raw bytes of a single audio channel. The ring does no
//! locking of its own: the owning [`ChannelBuffers`](super::ChannelBuffers)
//! sits behind the buffers lock.

/// Byte ring with independent read and write cursors
pub struct RingBuffer {
    data: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
    write_avail: usize,
}

impl RingBuffer {
    /// Create a zeroed ring holding `size` bytes
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
            write_avail: size,
        }
    }

    /// Copy as much of `src` as fits without overwriting unread bytes.
    /// Returns the number of bytes written.
    pub fn write(&mut self, src: &[u8]) -> usize {
        if src.is_empty() || self.write_avail == 0 {
            return 0;
        }

        let size = self.data.len();
        let len = src.len().min(self.write_avail);
        let tail = size - self.write_pos;

        if len > tail {
            self.data[self.write_pos..].copy_from_slice(&src[..tail]);
            self.data[..len - tail].copy_from_slice(&src[tail..len]);
        } else {
            self.data[self.write_pos..self.write_pos + len].copy_from_slice(&src[..len]);
        }

        self.write_pos = (self.write_pos + len) % size;
        self.write_avail -= len;
        len
    }

    /// Copy up to `dst.len()` unread bytes into `dst`.
    /// Returns the number of bytes read.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let read_avail = self.read_available();
        if dst.is_empty() || read_avail == 0 {
            return 0;
        }

        let size = self.data.len();
        let len = dst.len().min(read_avail);
        let tail = size - self.read_pos;

        if len > tail {
            dst[..tail].copy_from_slice(&self.data[self.read_pos..]);
            dst[tail..len].copy_from_slice(&self.data[..len - tail]);
        } else {
            dst[..len].copy_from_slice(&self.data[self.read_pos..self.read_pos + len]);
        }

        self.read_pos = (self.read_pos + len) % size;
        self.write_avail += len;
        len
    }

    /// Zero the storage and mark the ring empty
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.read_pos = 0;
        self.write_pos = 0;
        self.write_avail = self.data.len();
    }

    /// Total size in bytes
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes that can be written before the ring is full
    pub fn write_available(&self) -> usize {
        self.write_avail
    }

    /// Bytes waiting to be read
    pub fn read_available(&self) -> usize {
        self.data.len() - self.write_avail
    }

    pub fn is_empty(&self) -> bool {
        self.read_available() == 0
    }

    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.read_available() as f32 / self.data.len() as f32
    }
}

//! Pooled I/O buffers.

use std::io;

use crate::transport::Transport;

const MIN_CAPACITY: usize = 1024;

/// A growable byte buffer with a read cursor.
///
/// Blocks are recycled through a per-direction free list (the `link`
/// field) and are owned by exactly one place at a time: the free list,
/// a connection slot, or a local variable.
pub(crate) struct Block {
    pub(crate) data: Vec<u8>,
    pub(crate) off: usize,
    pub(crate) link: Option<Box<Block>>,
}

impl Block {
    pub(crate) fn new() -> Self {
        Block {
            data: Vec::new(),
            off: 0,
            link: None,
        }
    }

    /// Ensure at least `n` bytes of capacity, doubling from a 1 KiB floor.
    fn reserve(&mut self, n: usize) {
        if self.data.capacity() >= n {
            return;
        }
        let mut target = self.data.capacity().max(MIN_CAPACITY);
        while target < n {
            target *= 2;
        }
        self.data.reserve_exact(target - self.data.len());
    }

    /// Set the buffer length to `n`, zero-filling any growth.
    pub(crate) fn resize(&mut self, n: usize) {
        self.reserve(n);
        self.data.resize(n, 0);
    }

    /// Read from `stream` until the buffer holds at least `n` bytes.
    ///
    /// End-of-stream before `n` bytes surfaces as `UnexpectedEof`; the
    /// buffer keeps whatever was read, so the caller can tell a close at
    /// a record boundary (empty buffer) from a mid-record truncation.
    pub(crate) fn read_from_until<S: Transport>(&mut self, stream: &S, n: usize) -> io::Result<()> {
        if self.data.len() >= n {
            return Ok(());
        }
        let mut filled = self.data.len();
        self.resize(n);
        while filled < n {
            match stream.read(&mut self.data[filled..n]) {
                Ok(0) => {
                    self.data.truncate(filled);
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                Ok(read) => filled += read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    self.data.truncate(filled);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Copy bytes from the read cursor into `buf`, advancing the cursor.
    pub(crate) fn read(&mut self, buf: &mut [u8]) -> usize {
        let available = &self.data[self.off..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.off += n;
        n
    }

    /// The bytes remaining past the read cursor.
    pub(crate) fn remaining(&self) -> &[u8] {
        &self.data[self.off..]
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.off >= self.data.len()
    }
}

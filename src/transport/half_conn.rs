//! Per-direction record state.

use crate::crypto::{CipherState, TAG_SIZE};
use crate::error::{Error, Result};
use crate::transport::Block;
use crate::MAX_PAYLOAD_SIZE;

const LENGTH_PREFIX: usize = 2;

/// One direction of a connection: its cipher state once the handshake
/// completes, its sticky error, its padding granularity, and a free list
/// of recycled blocks.
///
/// A `HalfConn` has no lock of its own; the owning connection wraps each
/// direction in a mutex and hands out exclusive access.
pub(crate) struct HalfConn {
    pub(crate) cipher: Option<CipherState>,
    pub(crate) err: Option<Error>,
    pub(crate) padding: u16,
    free: Option<Box<Block>>,
}

impl HalfConn {
    pub(crate) fn new() -> Self {
        HalfConn {
            cipher: None,
            err: None,
            padding: 0,
            free: None,
        }
    }

    /// Latch `err` as this direction's permanent failure and return it.
    pub(crate) fn set_error(&mut self, err: Error) -> Error {
        self.err = Some(err.clone());
        err
    }

    /// Take a block from the free list, or allocate a fresh one.
    pub(crate) fn new_block(&mut self) -> Box<Block> {
        match self.free.take() {
            Some(mut block) => {
                self.free = block.link.take();
                block.data.clear();
                block.off = 0;
                block
            }
            None => Box::new(Block::new()),
        }
    }

    /// Return a block to the free list. The working set is a handful of
    /// blocks per direction, so the list is never trimmed.
    pub(crate) fn free_block(&mut self, mut block: Box<Block>) {
        block.link = self.free.take();
        self.free = Some(block);
    }

    /// Truncate `block` to its first `n` bytes, returning a new block
    /// holding the remainder, if any.
    pub(crate) fn split_block(&mut self, block: &mut Block, n: usize) -> Option<Box<Block>> {
        if block.data.len() <= n {
            return None;
        }
        let mut rest = self.new_block();
        rest.data.extend_from_slice(&block.data[n..]);
        block.data.truncate(n);
        Some(rest)
    }

    /// Seal an outgoing record in place.
    ///
    /// `block` must start with two reserved bytes followed by the
    /// plaintext. With a cipher installed the plaintext is encrypted in
    /// place and the tag appended; either way the final payload length is
    /// written over the reserved bytes.
    ///
    /// Panics if the payload would overflow the u16 framing: the writer
    /// chunks data below this ceiling, so overflow is a bug upstream,
    /// never peer input.
    pub(crate) fn encrypt(&mut self, block: &mut Block) {
        let payload_len = match &mut self.cipher {
            Some(cipher) => {
                let plain_len = block.data.len() - LENGTH_PREFIX;
                assert!(
                    plain_len + TAG_SIZE <= MAX_PAYLOAD_SIZE,
                    "record payload exceeds wire limit"
                );
                let tag = cipher.seal(&mut block.data[LENGTH_PREFIX..]);
                block.data.extend_from_slice(&tag);
                plain_len + TAG_SIZE
            }
            None => {
                let len = block.data.len() - LENGTH_PREFIX;
                assert!(len <= MAX_PAYLOAD_SIZE, "record payload exceeds wire limit");
                len
            }
        };
        block.data[..LENGTH_PREFIX].copy_from_slice(&(payload_len as u16).to_be_bytes());
    }

    /// Open an incoming record in place.
    ///
    /// `block` must hold one complete record, length prefix included; the
    /// framing reader guarantees the prefix matches the body it read.
    /// After a successful call the block holds the plaintext (still behind
    /// the two prefix bytes).
    pub(crate) fn decrypt(&mut self, block: &mut Block) -> Result<()> {
        if block.data.len() < LENGTH_PREFIX {
            return Err(Error::InvalidFraming("record shorter than its length prefix"));
        }
        let declared = u16::from_be_bytes([block.data[0], block.data[1]]) as usize;
        if declared != block.data.len() - LENGTH_PREFIX {
            return Err(Error::InvalidFraming("length prefix does not match record body"));
        }

        if let Some(cipher) = &mut self.cipher {
            let body = &mut block.data[LENGTH_PREFIX..];
            if body.len() < TAG_SIZE {
                return Err(Error::AuthenticationFailure);
            }
            let split = body.len() - TAG_SIZE;
            let (ciphertext, tag) = body.split_at_mut(split);
            cipher.open(ciphertext, tag)?;
            block.data.truncate(LENGTH_PREFIX + split);
        }
        Ok(())
    }
}

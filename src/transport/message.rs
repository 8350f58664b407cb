//! Inner message framing and serialization.
//!
//! Once a record layer cipher is active, every record's plaintext is a
//! sequence of typed TLV messages:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Inner Len (2) │ Type (2) │ Data (variable)   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! `Inner Len` counts the type field plus the data. Padding messages
//! carry zeros whose only purpose is rounding the encrypted record up to
//! the configured granularity; CustomCert messages carry the caller's
//! opaque handshake payload.

use bytes::BufMut;

use crate::error::{Error, Result};

/// Bytes of overhead per inner message (length + type).
pub(crate) const HEADER_LEN: usize = 4;

/// Inner message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Zero filler, discarded by the receiver
    Padding,
    /// Application bytes
    Data,
    /// Opaque caller payload exchanged during the handshake
    CustomCert,
}

impl MessageType {
    /// The type's wire value.
    pub fn wire(self) -> u16 {
        match self {
            MessageType::Padding => 0,
            MessageType::Data => 1,
            MessageType::CustomCert => 1024,
        }
    }

    /// Map a wire value back to a known type.
    pub fn from_wire(value: u16) -> Option<Self> {
        match value {
            0 => Some(MessageType::Padding),
            1 => Some(MessageType::Data),
            1024 => Some(MessageType::CustomCert),
            _ => None,
        }
    }
}

/// Append one inner message to `out`.
pub(crate) fn append_message(out: &mut Vec<u8>, ty: MessageType, data: &[u8]) {
    debug_assert!(data.len() + 2 <= u16::MAX as usize);
    out.put_u16((data.len() + 2) as u16);
    out.put_u16(ty.wire());
    out.put_slice(data);
}

/// Append a padding message carrying `n` zero bytes.
pub(crate) fn append_padding(out: &mut Vec<u8>, n: usize) {
    out.put_u16((n + 2) as u16);
    out.put_u16(MessageType::Padding.wire());
    out.resize(out.len() + n, 0);
}

/// One parsed inner message, borrowed from the record plaintext.
pub(crate) struct InnerMessage<'a> {
    /// Raw wire type; unknown values are preserved so callers can log them.
    pub(crate) ty: u16,
    pub(crate) data: &'a [u8],
    /// Offset of `data` within the buffer handed to the iterator.
    pub(crate) offset: usize,
}

/// Iterator over the inner messages of a record plaintext.
///
/// Yields an error and then fuses if the TLV structure is inconsistent.
pub(crate) struct MessageIter<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> MessageIter<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        MessageIter {
            buf,
            pos: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Result<InnerMessage<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos == self.buf.len() {
            return None;
        }
        let rest = &self.buf[self.pos..];
        if rest.len() < HEADER_LEN {
            self.failed = true;
            return Some(Err(Error::InvalidFraming("truncated inner message header")));
        }
        let inner_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        let ty = u16::from_be_bytes([rest[2], rest[3]]);
        if inner_len < 2 {
            self.failed = true;
            return Some(Err(Error::InvalidFraming("inner length below type size")));
        }
        let data_len = inner_len - 2;
        if rest.len() - HEADER_LEN < data_len {
            self.failed = true;
            return Some(Err(Error::InvalidFraming("inner message exceeds record")));
        }
        let offset = self.pos + HEADER_LEN;
        self.pos = offset + data_len;
        Some(Ok(InnerMessage {
            ty,
            data: &self.buf[offset..offset + data_len],
            offset,
        }))
    }
}

/// Wrap a caller's handshake payload as a CustomCert message.
pub(crate) fn encode_handshake_payload(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    append_message(&mut out, MessageType::CustomCert, payload);
    out
}

/// Pull the CustomCert payload out of a handshake message body.
///
/// Padding is skipped; other message types are logged and ignored.
pub(crate) fn extract_handshake_payload(buf: &[u8]) -> Result<Option<Vec<u8>>> {
    for message in MessageIter::new(buf) {
        let message = message?;
        match MessageType::from_wire(message.ty) {
            Some(MessageType::CustomCert) => return Ok(Some(message.data.to_vec())),
            Some(MessageType::Padding) => {}
            _ => {
                tracing::warn!("ignoring message type {} in handshake payload", message.ty);
            }
        }
    }
    Ok(None)
}

//! Handshake multiplexing and suite negotiation.
//!
//! The initiator's first flight offers every supported suite at once: one
//! sub-message per suite, each carrying that suite's first Noise message,
//! in priority order. The responder picks one by its own preference and
//! answers with the chosen index. Both sides mix a prologue covering the
//! complete offer into every handshake transcript, so a middlebox that
//! adds, drops, or reorders offers breaks the handshake instead of
//! downgrading it.
//!
//! Flight layout, repeated per offered suite:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │ u8 nameLen │ name │ u16 msgLen │ Noise message bytes  │
//! └───────────────────────────────────────────────────────┘
//! ```

use bytes::BufMut;
use snow::HandshakeState;
use zeroize::Zeroizing;

use crate::crypto::{Keypair, PUBLIC_KEY_SIZE};
use crate::error::{Error, Result};
use crate::suite::{registry, Pattern, RESPONDER_PREFERENCE};
use crate::transport::message;
use crate::MAX_PAYLOAD_SIZE;

/// The first flight must fit one record alongside its length prefix.
const MAX_FLIGHT_LEN: usize = MAX_PAYLOAD_SIZE - 2;

/// One offered suite on the initiator side, parallel to the flight's
/// sub-messages.
#[derive(Debug)]
pub(crate) struct InitiatorSuite {
    /// Registry index of the suite
    pub(crate) suite: usize,
    pub(crate) state: HandshakeState,
    /// Whether this sub-message carried the application payload
    pub(crate) payload_embedded: bool,
}

/// The responder's view of a parsed first flight.
#[derive(Debug)]
pub(crate) struct ParsedHandshake {
    /// Raw Noise payload of the chosen first message
    pub(crate) payload: Vec<u8>,
    pub(crate) state: HandshakeState,
    /// Registry index of the chosen suite
    pub(crate) suite: usize,
    /// Position of the chosen sub-message within the offered flight,
    /// echoed back so the initiator knows which state to continue with
    pub(crate) index: u8,
}

/// Build the initiator's multi-suite first flight.
///
/// XX is always offered; IK is appended when the responder's static key
/// is known. The application payload rides in the first sub-message whose
/// pattern sends a static key (and therefore encrypts) in message zero;
/// with only XX offered it is deferred to a later handshake message.
pub(crate) fn compose_initiator(
    keys: &Keypair,
    peer_static: Option<&[u8]>,
    payload: &[u8],
) -> Result<(Vec<u8>, Vec<InitiatorSuite>)> {
    if let Some(key) = peer_static {
        if key.len() != PUBLIC_KEY_SIZE {
            return Err(Error::InvalidKey(key.len()));
        }
    }
    let reg = registry();
    let mut patterns = vec![Pattern::Xx];
    if peer_static.is_some() {
        patterns.push(Pattern::Ik);
    }

    let total: usize = patterns.iter().map(|&p| reg.priority(p).len()).sum();
    debug_assert!(total <= u8::MAX as usize);
    let mut prologue = Vec::with_capacity(1 + 40 * total);
    prologue.put_u8(total as u8);
    for &pattern in &patterns {
        prologue.put_slice(reg.prologue(pattern));
    }

    let wrapped = if payload.is_empty() {
        Vec::new()
    } else {
        message::encode_handshake_payload(payload)
    };
    let secret = Zeroizing::new(keys.secret_bytes());

    let mut flight = Vec::with_capacity(2048);
    let mut offers = Vec::with_capacity(total);
    let mut payload_written = false;
    let mut msg_buf = vec![0u8; MAX_PAYLOAD_SIZE];
    for &pattern in &patterns {
        for &index in reg.priority(pattern) {
            let suite = reg.suite(index);
            let mut builder = snow::Builder::new(suite.params())
                .prologue(&prologue)
                .local_private_key(&secret[..]);
            if pattern.use_remote_static() {
                if let Some(key) = peer_static {
                    builder = builder.remote_public_key(key);
                }
            }
            let mut state = builder.build_initiator()?;

            let body: &[u8] =
                if !payload_written && !wrapped.is_empty() && pattern.message_has_static(0) {
                    payload_written = true;
                    &wrapped
                } else {
                    &[]
                };
            let payload_embedded = !body.is_empty();
            let written = state.write_message(body, &mut msg_buf)?;

            let name = suite.name().as_bytes();
            flight.put_u8(name.len() as u8);
            flight.put_slice(name);
            flight.put_u16(written as u16);
            flight.put_slice(&msg_buf[..written]);
            if flight.len() > MAX_FLIGHT_LEN {
                return Err(Error::MessageTooLarge);
            }
            offers.push(InitiatorSuite {
                suite: index,
                state,
                payload_embedded,
            });
        }
    }
    Ok((flight, offers))
}

/// Parse an initiator's first flight, pick a suite, and read its first
/// Noise message.
///
/// The prologue is reconstructed from the offers exactly as received, so
/// any tampering with the flight surfaces as a transcript mismatch inside
/// the chosen handshake rather than silently narrowing the offer.
pub(crate) fn parse_handshake(keys: &Keypair, flight: &[u8]) -> Result<ParsedHandshake> {
    let reg = registry();
    let mut offered: Vec<(&[u8], &[u8])> = Vec::new();
    let mut prologue = vec![0u8];
    let mut rest = flight;
    while !rest.is_empty() {
        let name_len = rest[0] as usize;
        rest = &rest[1..];
        if name_len == 0 || rest.len() < name_len {
            return Err(Error::handshake("malformed suite name in handshake flight"));
        }
        let (name, tail) = rest.split_at(name_len);
        rest = tail;
        if rest.len() < 2 {
            return Err(Error::handshake("truncated handshake sub-message"));
        }
        let msg_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        rest = &rest[2..];
        if msg_len == 0 {
            return Err(Error::handshake("zero-length handshake message"));
        }
        if rest.len() < msg_len {
            return Err(Error::handshake("handshake sub-message exceeds flight"));
        }
        let (msg, tail) = rest.split_at(msg_len);
        rest = tail;

        if offered.len() == u8::MAX as usize {
            return Err(Error::handshake("too many offered suites"));
        }
        prologue.put_u8(name_len as u8);
        prologue.put_slice(name);
        offered.push((name, msg));
    }
    if offered.is_empty() {
        return Err(Error::handshake("empty handshake flight"));
    }
    prologue[0] = offered.len() as u8;

    let mut chosen = None;
    'select: for &pattern in &RESPONDER_PREFERENCE {
        for &index in reg.priority(pattern) {
            let name = reg.suite(index).name().as_bytes();
            if let Some(pos) = offered.iter().position(|&(offer, _)| offer == name) {
                chosen = Some((pos, index));
                break 'select;
            }
        }
    }
    let (pos, suite_index) = chosen.ok_or(Error::UnsupportedProtocol)?;
    let suite = reg.suite(suite_index);
    tracing::debug!("selected handshake protocol {}", suite.name());

    let secret = Zeroizing::new(keys.secret_bytes());
    let mut state = snow::Builder::new(suite.params())
        .prologue(&prologue)
        .local_private_key(&secret[..])
        .build_responder()?;

    let mut payload = vec![0u8; MAX_PAYLOAD_SIZE];
    let read = state.read_message(offered[pos].1, &mut payload)?;
    payload.truncate(read);

    Ok(ParsedHandshake {
        payload,
        state,
        suite: suite_index,
        index: pos as u8,
    })
}

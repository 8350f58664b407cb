//! Encrypted connection state machine.
//!
//! A [`Conn`] wraps a reliable byte stream and upgrades it, on first use,
//! to a mutually-authenticated encrypted channel. The handshake is lazy
//! and idempotent: the first `read`, `write`, or explicit [`Conn::handshake`]
//! call runs it exactly once, and every caller observes the same outcome.
//!
//! One reader and one writer may drive the same connection concurrently;
//! each direction is serialized by its own lock and latches its first
//! fatal error permanently.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use zeroize::Zeroize;

use crate::crypto::{CipherChoice, CipherState, Keypair, TAG_SIZE};
use crate::error::{Error, Result};
use crate::handshake::{self, InitiatorSuite};
use crate::suite::registry;
use crate::transport::message::{self, MessageType};
use crate::transport::{Block, HalfConn, Transport};
use crate::{DEFAULT_PADDING, MAX_PAYLOAD_SIZE};

/// Inbound direction: record state plus the staging blocks the reader
/// shuttles wire bytes through. Everything here is guarded by one lock.
struct ReadState {
    half: HalfConn,
    /// Decrypted application bytes awaiting the caller
    input: Option<Box<Block>>,
    /// Wire bytes accumulated towards the next record
    raw_input: Option<Box<Block>>,
}

struct HandshakeStatus {
    complete: bool,
    err: Option<Error>,
}

#[derive(Default)]
struct PeerInfo {
    payload: Option<Vec<u8>>,
    static_key: Option<Vec<u8>>,
}

/// A secure connection over a reliable byte stream.
///
/// Created with [`Conn::client`] or [`Conn::server`]; most callers go
/// through [`crate::dial`] and [`crate::Listener`] instead and never name
/// the stream type.
pub struct Conn<S = TcpStream> {
    stream: S,
    keys: Keypair,
    peer_key: Option<Vec<u8>>,
    payload: Vec<u8>,
    is_client: bool,
    padding: u16,
    /// Mirrors `status.complete` for lock-free completeness checks on the
    /// write path, which must not touch the status lock while holding the
    /// outbound lock.
    done: AtomicBool,
    inbound: Mutex<ReadState>,
    outbound: Mutex<HalfConn>,
    status: Mutex<HandshakeStatus>,
    peer: Mutex<PeerInfo>,
}

impl<S: Transport> Conn<S> {
    fn new(
        stream: S,
        keys: Keypair,
        peer_key: Option<Vec<u8>>,
        payload: Vec<u8>,
        is_client: bool,
    ) -> Self {
        Conn {
            stream,
            keys,
            peer_key,
            payload,
            is_client,
            padding: DEFAULT_PADDING,
            done: AtomicBool::new(false),
            inbound: Mutex::new(ReadState {
                half: HalfConn::new(),
                input: None,
                raw_input: None,
            }),
            outbound: Mutex::new(HalfConn::new()),
            status: Mutex::new(HandshakeStatus {
                complete: false,
                err: None,
            }),
            peer: Mutex::new(PeerInfo::default()),
        }
    }

    /// Wrap `stream` as the initiating side.
    ///
    /// With `peer_static` set to the responder's public key the connection
    /// additionally offers the IK pattern, which authenticates in two
    /// messages and encrypts the handshake payload from the first flight.
    /// `payload` is an opaque byte string delivered to the peer during the
    /// handshake.
    pub fn client(
        stream: S,
        keys: Keypair,
        peer_static: Option<&[u8]>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Conn::new(
            stream,
            keys,
            peer_static.map(<[u8]>::to_vec),
            payload.into(),
            true,
        )
    }

    /// Wrap `stream` as the responding side.
    pub fn server(stream: S, keys: Keypair, payload: impl Into<Vec<u8>>) -> Self {
        Conn::new(stream, keys, None, payload.into(), false)
    }

    /// Set the padding granularity for outgoing records.
    ///
    /// Encrypted records are rounded up to a multiple of this many bytes;
    /// zero disables padding. Takes effect at handshake completion, so it
    /// must be called before the first I/O.
    pub fn set_padding(&mut self, granularity: u16) {
        self.padding = granularity;
    }

    /// Whether the handshake has completed successfully.
    pub fn handshake_complete(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// The payload the peer carried in its handshake, once complete.
    pub fn peer_payload(&self) -> Option<Vec<u8>> {
        self.peer.lock().payload.clone()
    }

    /// The peer's authenticated static public key, once complete.
    pub fn peer_static(&self) -> Option<Vec<u8>> {
        self.peer.lock().static_key.clone()
    }

    /// The local address of the underlying stream.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    /// The remote address of the underlying stream.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// Bound the time a single read may block.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    /// Bound the time a single write may block.
    ///
    /// After a write times out the outbound direction is corrupt (a
    /// partial record may be on the wire); the error is latched and all
    /// further writes fail with it.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_write_timeout(timeout)
    }

    /// Bound both directions at once.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)?;
        self.stream.set_write_timeout(timeout)
    }

    /// Close the underlying stream, unblocking pending reads and writes.
    pub fn close(&self) -> Result<()> {
        self.stream.shutdown()?;
        Ok(())
    }

    /// Run the handshake if it has not run yet.
    ///
    /// Callers rarely need this: the first `read` or `write` performs it
    /// automatically. Concurrent calls are safe; the handshake runs at
    /// most once and a failure is permanent for the connection.
    pub fn handshake(&self) -> Result<()> {
        // Fast path: the status lock alone answers "already settled?".
        // A blocked reader holds the inbound lock, and going for it here
        // would wedge every writer that only wants the answer.
        {
            let status = self.status.lock();
            if let Some(err) = &status.err {
                return Err(err.clone());
            }
            if status.complete {
                return Ok(());
            }
        }

        // Full path: inbound lock first, then status lock, then re-check
        // to cover the window where another caller finished the job.
        let mut inbound = self.inbound.lock();
        let mut status = self.status.lock();
        if let Some(err) = &status.err {
            return Err(err.clone());
        }
        if status.complete {
            return Ok(());
        }

        let result = if self.is_client {
            self.run_client_handshake(&mut inbound)
        } else {
            self.run_server_handshake(&mut inbound)
        };
        match result {
            Ok(()) => {
                status.complete = true;
                self.done.store(true, Ordering::Release);
                Ok(())
            }
            Err(err) => {
                status.err = Some(err.clone());
                Err(err)
            }
        }
    }

    fn run_client_handshake(&self, inbound: &mut ReadState) -> Result<()> {
        let (flight, mut offers) =
            handshake::compose_initiator(&self.keys, self.peer_key.as_deref(), &self.payload)?;
        tracing::debug!("offering {} handshake protocols", offers.len());
        self.write_packet(&flight)?;

        let reply = self.read_handshake_record(inbound)?;
        if reply.len() < 2 {
            return Err(Error::handshake("negotiation reply too short"));
        }
        let index = reply[0] as usize;
        if reply[1] != 0 {
            return Err(Error::handshake("unsupported negotiation message type"));
        }
        if index >= offers.len() {
            return Err(Error::handshake("selected protocol index out of range"));
        }
        let InitiatorSuite {
            suite,
            mut state,
            payload_embedded,
        } = offers.swap_remove(index);
        let suite = registry().suite(suite);
        tracing::debug!("peer selected {}", suite.name());

        let mut buf = vec![0u8; MAX_PAYLOAD_SIZE];
        let read = state.read_message(&reply[2..], &mut buf)?;
        let mut peer_payload = process_payload(&buf[..read])?;

        let wrapped = if self.payload.is_empty() {
            Vec::new()
        } else {
            message::encode_handshake_payload(&self.payload)
        };
        let mut payload_sent = payload_embedded || wrapped.is_empty();
        // Message 0 went out with the flight and message 1 was the reply.
        let mut msg_index = 2;
        while !state.is_handshake_finished() {
            let body: &[u8] = if !payload_sent && suite.pattern().message_has_static(msg_index) {
                payload_sent = true;
                &wrapped
            } else {
                &[]
            };
            let written = state.write_message(body, &mut buf)?;
            self.write_packet(&buf[..written])?;
            msg_index += 1;
            if state.is_handshake_finished() {
                break;
            }

            let msg = self.read_handshake_record(inbound)?;
            let read = state.read_message(&msg, &mut buf)?;
            if peer_payload.is_none() && read > 0 {
                peer_payload = process_payload(&buf[..read])?;
            }
            msg_index += 1;
        }

        self.install_cipher_states(inbound, state, suite.cipher(), peer_payload)
    }

    fn run_server_handshake(&self, inbound: &mut ReadState) -> Result<()> {
        let flight = self.read_handshake_record(inbound)?;
        let parsed = handshake::parse_handshake(&self.keys, &flight)?;
        let mut peer_payload = process_payload(&parsed.payload)?;
        let suite = registry().suite(parsed.suite);
        let mut state = parsed.state;

        let wrapped = if self.payload.is_empty() {
            Vec::new()
        } else {
            message::encode_handshake_payload(&self.payload)
        };
        let mut buf = vec![0u8; MAX_PAYLOAD_SIZE];
        let written = state.write_message(&wrapped, &mut buf)?;
        let mut reply = Vec::with_capacity(2 + written);
        reply.push(parsed.index);
        reply.push(0); // reserved negotiation message type
        reply.extend_from_slice(&buf[..written]);
        self.write_packet(&reply)?;

        while !state.is_handshake_finished() {
            let msg = self.read_handshake_record(inbound)?;
            let read = state.read_message(&msg, &mut buf)?;
            if peer_payload.is_none() && read > 0 {
                peer_payload = process_payload(&buf[..read])?;
            }
            if state.is_handshake_finished() {
                break;
            }
            let written = state.write_message(&[], &mut buf)?;
            self.write_packet(&buf[..written])?;
        }

        self.install_cipher_states(inbound, state, suite.cipher(), peer_payload)
    }

    /// Move the finished handshake's split keys into the two directions
    /// and record what we learned about the peer.
    fn install_cipher_states(
        &self,
        inbound: &mut ReadState,
        mut state: snow::HandshakeState,
        cipher: CipherChoice,
        peer_payload: Option<Vec<u8>>,
    ) -> Result<()> {
        let static_key = state.get_remote_static().map(<[u8]>::to_vec);
        let (mut initiator_key, mut responder_key) = state.dangerously_get_raw_split();
        let (send_key, recv_key) = if self.is_client {
            (&initiator_key, &responder_key)
        } else {
            (&responder_key, &initiator_key)
        };

        inbound.half.cipher = Some(CipherState::new(cipher, recv_key));
        inbound.half.padding = self.padding;
        {
            let mut outbound = self.outbound.lock();
            outbound.cipher = Some(CipherState::new(cipher, send_key));
            outbound.padding = self.padding;
        }
        initiator_key.zeroize();
        responder_key.zeroize();

        let mut peer = self.peer.lock();
        peer.payload = peer_payload;
        peer.static_key = static_key;
        Ok(())
    }

    /// Read application data, running the handshake first if needed.
    ///
    /// Returns `Ok(0)` only for an empty `buf` or when the peer closed
    /// the stream cleanly at a record boundary.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.handshake()?;
        if buf.is_empty() {
            // Zero-length reads exist for the handshake side effect.
            return Ok(0);
        }

        let mut guard = self.inbound.lock();
        let inbound = &mut *guard;
        loop {
            if let Some(err) = &inbound.half.err {
                return Err(err.clone());
            }
            if let Some(block) = inbound.input.as_mut() {
                let n = block.read(buf);
                if block.is_drained() {
                    if let Some(block) = inbound.input.take() {
                        inbound.half.free_block(block);
                    }
                }
                return Ok(n);
            }
            if !self.read_packet(inbound)? {
                return Ok(0);
            }
            // A padding-only record leaves no input; keep reading.
        }
    }

    /// Write application data, running the handshake first if needed.
    ///
    /// The data is chunked into encrypted records; on success the whole
    /// buffer has been flushed to the underlying stream.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.handshake()?;
        if !self.done.load(Ordering::Acquire) {
            return Err(Error::Internal("write before handshake completion"));
        }
        let mut outbound = self.outbound.lock();
        if let Some(err) = &outbound.err {
            return Err(err.clone());
        }
        self.write_packet_locked(&mut outbound, buf)
    }

    /// Frame and send `data`, taking the outbound lock. Handshake path.
    fn write_packet(&self, data: &[u8]) -> Result<()> {
        let mut outbound = self.outbound.lock();
        if let Some(err) = &outbound.err {
            return Err(err.clone());
        }
        self.write_packet_locked(&mut outbound, data).map(drop)
    }

    fn write_packet_locked(&self, out: &mut HalfConn, data: &[u8]) -> Result<usize> {
        let mut written = 0;
        let mut rest = data;
        while !rest.is_empty() {
            let chunk_max = if out.cipher.is_some() {
                let mut max = MAX_PAYLOAD_SIZE - TAG_SIZE - message::HEADER_LEN;
                if out.padding > 0 {
                    max -= message::HEADER_LEN;
                }
                max
            } else {
                MAX_PAYLOAD_SIZE
            };
            let take = rest.len().min(chunk_max);
            let (chunk, tail) = rest.split_at(take);
            rest = tail;

            let mut block = out.new_block();
            block.resize(2);
            if out.cipher.is_some() {
                message::append_message(&mut block.data, MessageType::Data, chunk);
                if out.padding > 0 {
                    let granularity = out.padding as usize;
                    let sealed = block.data.len() - 2 + TAG_SIZE;
                    let needed = (granularity - sealed % granularity) % granularity;
                    if needed > 0 {
                        let mut pad = (needed + granularity - message::HEADER_LEN) % granularity;
                        let space = (MAX_PAYLOAD_SIZE - TAG_SIZE)
                            - (block.data.len() - 2)
                            - message::HEADER_LEN;
                        pad = pad.min(space);
                        message::append_padding(&mut block.data, pad);
                    }
                }
            } else {
                block.data.extend_from_slice(chunk);
            }

            out.encrypt(&mut block);
            if let Err(err) = self.write_record(&block.data) {
                return Err(out.set_error(err));
            }
            written += chunk.len();
            out.free_block(block);
        }
        Ok(written)
    }

    /// Push one complete record onto the stream, retrying short writes.
    fn write_record(&self, record: &[u8]) -> Result<()> {
        let mut pos = 0;
        while pos < record.len() {
            match self.stream.write(&record[pos..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => pos += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Read one handshake record and return its bytes.
    fn read_handshake_record(&self, inbound: &mut ReadState) -> Result<Vec<u8>> {
        if !self.read_packet(inbound)? {
            // The handshake is mid-conversation; a close here is never clean.
            return Err(Error::Truncated);
        }
        match inbound.input.take() {
            Some(block) => {
                let msg = block.remaining().to_vec();
                inbound.half.free_block(block);
                Ok(msg)
            }
            None => Err(Error::handshake("empty handshake record")),
        }
    }

    /// Pull the next record off the wire into `inbound.input`.
    ///
    /// Returns `Ok(false)` when the peer closed cleanly at a record
    /// boundary. All other failures latch the inbound sticky error.
    fn read_packet(&self, inbound: &mut ReadState) -> Result<bool> {
        if inbound.raw_input.is_none() {
            let block = inbound.half.new_block();
            inbound.raw_input = Some(block);
        }
        let raw = match inbound.raw_input.as_mut() {
            Some(block) => block,
            None => return Err(Error::Internal("raw input block missing")),
        };

        if let Err(err) = raw.read_from_until(&self.stream, 2) {
            if err.kind() == io::ErrorKind::UnexpectedEof && raw.data.is_empty() {
                return Ok(false);
            }
            let err = map_read_error(err);
            return Err(inbound.half.set_error(err));
        }
        let payload_len = u16::from_be_bytes([raw.data[0], raw.data[1]]) as usize;

        if let Err(err) = raw.read_from_until(&self.stream, 2 + payload_len) {
            let err = map_read_error(err);
            return Err(inbound.half.set_error(err));
        }

        let mut record = match inbound.raw_input.take() {
            Some(block) => block,
            None => return Err(Error::Internal("raw input block missing")),
        };
        inbound.raw_input = inbound.half.split_block(&mut record, 2 + payload_len);

        if let Err(err) = inbound.half.decrypt(&mut record) {
            return Err(inbound.half.set_error(err));
        }

        if inbound.half.cipher.is_some() {
            match extract_data(&record) {
                Ok(Some((start, end))) => {
                    record.off = start;
                    record.data.truncate(end);
                    inbound.input = Some(record);
                }
                Ok(None) => {
                    // Padding-only record; nothing for the caller.
                    inbound.half.free_block(record);
                }
                Err(err) => {
                    inbound.half.free_block(record);
                    return Err(inbound.half.set_error(err));
                }
            }
        } else {
            record.off = 2;
            inbound.input = Some(record);
        }
        Ok(true)
    }
}

/// Locate the application bytes inside a decrypted record.
///
/// Returns the byte range of the first non-empty Data message; everything
/// else in the record is padding or noise to be discarded.
fn extract_data(record: &Block) -> Result<Option<(usize, usize)>> {
    let plaintext = &record.data[2..];
    let mut found: Option<(usize, usize)> = None;
    let mut extra = 0usize;
    for msg in message::MessageIter::new(plaintext) {
        let msg = msg?;
        match MessageType::from_wire(msg.ty) {
            Some(MessageType::Data) => {
                if found.is_none() {
                    found = Some((2 + msg.offset, 2 + msg.offset + msg.data.len()));
                } else {
                    extra += 1;
                }
            }
            Some(MessageType::Padding) => {}
            Some(MessageType::CustomCert) => {
                tracing::warn!("discarding CustomCert message outside the handshake");
            }
            None => {
                tracing::warn!("discarding inner message of unknown type {}", msg.ty);
            }
        }
    }
    if extra > 0 {
        tracing::warn!("record carried {} extra data messages; delivering the first", extra);
    }
    Ok(found.filter(|&(start, end)| end > start))
}

/// Unwrap the peer's CustomCert payload from a handshake message body.
fn process_payload(body: &[u8]) -> Result<Option<Vec<u8>>> {
    if body.is_empty() {
        return Ok(None);
    }
    message::extract_handshake_payload(body)
        .map_err(|err| Error::handshake(format!("invalid handshake payload: {err}")))
}

fn map_read_error(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::Truncated
    } else {
        err.into()
    }
}

impl<S: Transport> io::Read for &Conn<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Conn::read(*self, buf).map_err(Into::into)
    }
}

impl<S: Transport> io::Write for &Conn<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Conn::write(*self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Transport> io::Read for Conn<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Conn::read(self, buf).map_err(Into::into)
    }
}

impl<S: Transport> io::Write for Conn<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Conn::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

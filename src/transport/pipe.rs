//! In-memory duplex stream for tests.
//!
//! Blocking semantics match a socket: reads wait for data or close,
//! writes always succeed until the pipe is shut down.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::transport::Transport;

#[derive(Default)]
struct Shared {
    buf: VecDeque<u8>,
    closed: bool,
}

#[derive(Default)]
struct Channel {
    state: Mutex<Shared>,
    ready: Condvar,
}

/// One side of an in-memory duplex pipe.
#[derive(Clone)]
pub(crate) struct PipeEnd {
    rx: Arc<Channel>,
    tx: Arc<Channel>,
}

/// Create a connected pair of pipe ends.
pub(crate) fn pipe() -> (PipeEnd, PipeEnd) {
    let a = Arc::new(Channel::default());
    let b = Arc::new(Channel::default());
    (
        PipeEnd {
            rx: a.clone(),
            tx: b.clone(),
        },
        PipeEnd { rx: b, tx: a },
    )
}

impl Transport for PipeEnd {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.rx.state.lock();
        while state.buf.is_empty() && !state.closed {
            self.rx.ready.wait(&mut state);
        }
        let n = buf.len().min(state.buf.len());
        for slot in buf[..n].iter_mut() {
            *slot = state.buf.pop_front().expect("counted above");
        }
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.tx.state.lock();
        if state.closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        state.buf.extend(buf.iter().copied());
        self.tx.ready.notify_all();
        Ok(buf.len())
    }

    fn shutdown(&self) -> io::Result<()> {
        for half in [&self.rx, &self.tx] {
            half.state.lock().closed = true;
            half.ready.notify_all();
        }
        Ok(())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(([127, 0, 0, 1], 0).into())
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Ok(([127, 0, 0, 1], 0).into())
    }

    fn set_read_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn set_write_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_round_trip() {
        let (a, b) = pipe();
        a.write(b"ping").unwrap();

        let mut buf = [0u8; 8];
        let n = b.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
    }

    #[test]
    fn test_shutdown_unblocks_reader() {
        let (a, b) = pipe();
        let reader = std::thread::spawn(move || {
            let mut buf = [0u8; 4];
            b.read(&mut buf).unwrap()
        });
        std::thread::sleep(Duration::from_millis(10));
        a.shutdown().unwrap();
        assert_eq!(reader.join().unwrap(), 0);
    }
}

//! End-to-end tests over real TCP sockets.

use std::sync::Arc;
use std::thread;

use noisesocket::{dial, Keypair, Listener};
use rand::RngCore;

/// Accept one connection and echo everything until the peer closes.
fn echo_server(listener: Listener) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let conn = listener.accept().unwrap();
        let mut buf = vec![0u8; 16384];
        loop {
            let n = conn.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            conn.write(&buf[..n]).unwrap();
        }
    })
}

fn read_full(conn: &noisesocket::Conn, buf: &mut [u8]) {
    let mut have = 0;
    while have < buf.len() {
        let n = conn.read(&mut buf[have..]).unwrap();
        assert!(n > 0, "stream ended early");
        have += n;
    }
}

#[test]
fn test_echo_large_transfer() {
    let listener = Listener::bind("127.0.0.1:0", Keypair::generate(), "echo").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = echo_server(listener);

    let conn = Arc::new(dial(addr, Keypair::generate(), None, "client").unwrap());
    let mut data = vec![0u8; 1 << 20];
    rand::thread_rng().fill_bytes(&mut data);

    // Write from a second thread: a single-threaded echo of this much
    // data would deadlock once both socket buffers fill up.
    let writer = {
        let conn = conn.clone();
        let data = data.clone();
        thread::spawn(move || conn.write(&data).unwrap())
    };

    let mut echoed = vec![0u8; data.len()];
    read_full(&conn, &mut echoed);
    assert_eq!(writer.join().unwrap(), data.len());
    assert_eq!(echoed, data);

    conn.close().unwrap();
    server.join().unwrap();
}

#[test]
fn test_lazy_handshake_on_first_write() {
    let listener = Listener::bind("127.0.0.1:0", Keypair::generate(), "").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = echo_server(listener);

    let conn = dial(addr, Keypair::generate(), None, "").unwrap();
    assert!(!conn.handshake_complete());
    conn.write(b"ping").unwrap();
    assert!(conn.handshake_complete());

    let mut buf = [0u8; 4];
    read_full(&conn, &mut buf);
    assert_eq!(&buf, b"ping");

    conn.close().unwrap();
    server.join().unwrap();
}

#[test]
fn test_ik_negotiation_and_payload_exchange() {
    let server_keys = Keypair::generate();
    let server_public = server_keys.public().to_vec();
    let listener = Listener::bind("127.0.0.1:0", server_keys, "server-hello").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let conn = listener.accept().unwrap();
        conn.handshake().unwrap();
        let mut buf = [0u8; 4];
        read_full(&conn, &mut buf);
        assert_eq!(&buf, b"ping");
        conn.write(b"pong").unwrap();
        (conn.peer_payload(), conn.peer_static())
    });

    // A pinned server key upgrades the offer to IK.
    let client_keys = Keypair::generate();
    let client_public = client_keys.public().to_vec();
    let conn = dial(addr, client_keys, Some(&server_public), "client-hello").unwrap();
    conn.handshake().unwrap();
    assert_eq!(conn.peer_payload().as_deref(), Some(&b"server-hello"[..]));
    assert_eq!(conn.peer_static().as_deref(), Some(&server_public[..]));

    conn.write(b"ping").unwrap();
    let mut buf = [0u8; 4];
    read_full(&conn, &mut buf);
    assert_eq!(&buf, b"pong");

    let (peer_payload, peer_static) = server.join().unwrap();
    assert_eq!(peer_payload.as_deref(), Some(&b"client-hello"[..]));
    assert_eq!(peer_static.as_deref(), Some(&client_public[..]));
}

#[test]
fn test_bidirectional_transfer() {
    let listener = Listener::bind("127.0.0.1:0", Keypair::generate(), "").unwrap();
    let addr = listener.local_addr().unwrap();

    let mut client_data = vec![0u8; 256 * 1024];
    let mut server_data = vec![0u8; 256 * 1024];
    rand::thread_rng().fill_bytes(&mut client_data);
    rand::thread_rng().fill_bytes(&mut server_data);

    let server = {
        let client_data = client_data.clone();
        let server_data = server_data.clone();
        thread::spawn(move || {
            let conn = Arc::new(listener.accept().unwrap());
            let writer = {
                let conn = conn.clone();
                thread::spawn(move || conn.write(&server_data).unwrap())
            };
            let mut received = vec![0u8; client_data.len()];
            read_full(&conn, &mut received);
            assert_eq!(received, client_data);
            writer.join().unwrap();
        })
    };

    let conn = Arc::new(dial(addr, Keypair::generate(), None, "").unwrap());
    let writer = {
        let conn = conn.clone();
        let client_data = client_data.clone();
        thread::spawn(move || conn.write(&client_data).unwrap())
    };
    let mut received = vec![0u8; server_data.len()];
    read_full(&conn, &mut received);
    assert_eq!(received, server_data);
    writer.join().unwrap();
    server.join().unwrap();
}

#[test]
fn test_std_io_adapters() {
    use std::io::{Read, Write};

    let listener = Listener::bind("127.0.0.1:0", Keypair::generate(), "").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = echo_server(listener);

    let conn = dial(addr, Keypair::generate(), None, "").unwrap();
    let mut handle = &conn;
    handle.write_all(b"via std::io").unwrap();

    let mut buf = [0u8; 11];
    handle.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"via std::io");

    conn.close().unwrap();
    server.join().unwrap();
}

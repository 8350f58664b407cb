//! Connection benchmarks.
//!
//! Measures handshake latency and record-layer throughput over loopback
//! TCP.

use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use noisesocket::{dial, Keypair, Listener};

fn bench_echo_throughput(c: &mut Criterion) {
    let listener = Listener::bind("127.0.0.1:0", Keypair::generate(), "").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let conn = listener.accept().unwrap();
        let mut buf = vec![0u8; 65536];
        loop {
            match conn.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if conn.write(&buf[..n]).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let conn = dial(addr, Keypair::generate(), None, "").unwrap();
    conn.handshake().unwrap();

    let payload = vec![0xA5u8; 16 * 1024];
    let mut group = c.benchmark_group("echo_throughput");
    group.throughput(Throughput::Bytes(2 * payload.len() as u64));
    group.bench_function("16k_round_trip", |b| {
        let mut echo = vec![0u8; payload.len()];
        b.iter(|| {
            conn.write(&payload).unwrap();
            let mut have = 0;
            while have < echo.len() {
                have += conn.read(&mut echo[have..]).unwrap();
            }
            black_box(&echo[..]);
        })
    });
    group.finish();
}

fn bench_handshake(c: &mut Criterion) {
    let server_keys = Keypair::generate();
    let server_public = server_keys.public().to_vec();
    let listener = Listener::bind("127.0.0.1:0", server_keys, "").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        while let Ok(conn) = listener.accept() {
            let _ = conn.handshake();
        }
    });

    let client_keys = Keypair::generate();
    let mut group = c.benchmark_group("handshake");
    group.bench_function("ik_two_flights", |b| {
        b.iter(|| {
            let conn = dial(addr, client_keys.clone(), Some(&server_public), "").unwrap();
            conn.handshake().unwrap();
            black_box(conn.peer_static());
        })
    });
    group.bench_function("xx_three_flights", |b| {
        b.iter(|| {
            let conn = dial(addr, client_keys.clone(), None, "").unwrap();
            conn.handshake().unwrap();
            black_box(conn.peer_static());
        })
    });
    group.finish();
}

criterion_group!(benches, bench_echo_throughput, bench_handshake);
criterion_main!(benches);

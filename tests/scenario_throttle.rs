//! spec.md §8 Scenario 5 — a dedicated write throttle paces delivery of a
//! response body larger than its per-interval capacity.

mod common;

use orbitd::orchestrator::ThrottleSpec;
use orbitd::{Control, Request, Response, ServerConfig};
use std::io::{Read, Write};
use std::time::{Duration, Instant};

#[test]
fn write_throttle_paces_a_large_response() {
    let mut config = ServerConfig::default();
    config.orchestrator.dedicated_write_throttle =
        Some(ThrottleSpec { capacity: 1024, interval: Duration::from_secs(1) });

    let body = vec![b'x'; 4096];
    let (mut server, addr) = common::start(config, move |_addr| {
        let body = body.clone();
        move |_req: &Request, resp: &mut Response| {
            resp.set_content(body.clone());
            Control::SendResponse
        }
    });

    let mut client = common::connect(addr);
    client.write_all(b"GET / HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
    client.set_read_timeout(Some(Duration::from_millis(200))).unwrap();

    let start = Instant::now();
    let mut total = 0usize;
    let mut buf = [0u8; 8192];
    while start.elapsed() < Duration::from_millis(900) {
        match client.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {}
            Err(e) => panic!("read failed: {e}"),
        }
    }
    // within the first ~900ms at 1024 B/s, we should see meaningfully less
    // than the full 4096-byte body (plus headers) delivered.
    assert!(total < 4096, "throttle did not pace delivery, got {total} bytes early");

    // given enough time, the full response (headers + 4096-byte body)
    // eventually arrives.
    client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    loop {
        match client.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                total += n;
                if total >= 4096 {
                    break;
                }
            }
            Err(e) => panic!("read failed: {e}"),
        }
    }
    assert!(total >= 4096, "expected the full body to eventually arrive, got {total}");

    server.stop().unwrap();
}

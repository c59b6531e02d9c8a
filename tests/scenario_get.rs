//! spec.md §8 Scenario 1 — header-only GET, 200 OK.

mod common;

use orbitd::{Control, Request, Response, ServerConfig};
use std::io::{Read, Write};
use std::time::Duration;

#[test]
fn header_only_get_yields_expected_wire_bytes() {
    let (mut server, addr) = common::start(ServerConfig::default(), |_addr| {
        move |_req: &Request, resp: &mut Response| {
            resp.set_content(Vec::new());
            Control::SendResponse
        }
    });

    let mut client = common::connect(addr);
    client.write_all(b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let mut buf = [0u8; 256];
    let n = client.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");

    server.stop().unwrap();
}

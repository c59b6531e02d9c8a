//! spec.md §8 Scenario 3 — `Expect: 100-continue` precedes the body read.

mod common;

use orbitd::{Control, Request, Response, ServerConfig};
use std::io::{Read, Write};
use std::time::Duration;

#[test]
fn hundred_continue_is_sent_before_body_is_read() {
    let (mut server, addr) = common::start(ServerConfig::default(), |_addr| {
        move |req: &Request, resp: &mut Response| {
            if req.body.is_empty() {
                Control::FetchContent
            } else {
                resp.set_content(Vec::new());
                Control::SendResponse
            }
        }
    });

    let mut client = common::connect(addr);
    client
        .write_all(b"POST / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 5\r\n\r\n")
        .unwrap();
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let mut buf = [0u8; 256];
    let n = client.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"HTTP/1.1 100 Continue\r\n\r\n");

    client.write_all(b"hello").unwrap();
    let n = client.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");

    server.stop().unwrap();
}

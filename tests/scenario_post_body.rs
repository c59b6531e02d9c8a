//! spec.md §8 Scenario 2 — POST with body: the processor returns
//! `FetchContent` before the body has arrived, then `SendResponse` once it
//! has.

mod common;

use orbitd::{Control, Request, Response, ServerConfig};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn processor_sees_full_body_after_fetch_content() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_handler = seen.clone();

    let (mut server, addr) = common::start(ServerConfig::default(), move |_addr| {
        let seen = seen_in_handler.clone();
        move |req: &Request, resp: &mut Response| {
            if req.body.is_empty() {
                Control::FetchContent
            } else {
                *seen.lock().unwrap() = req.body.clone();
                resp.set_content(Vec::new());
                Control::SendResponse
            }
        }
    });

    let mut client = common::connect(addr);
    client
        .write_all(b"POST / HTTP/1.1\r\nContent-Length: 13\r\n\r\nRequest body!")
        .unwrap();
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let mut buf = [0u8; 256];
    let n = client.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    assert_eq!(*seen.lock().unwrap(), b"Request body!");

    server.stop().unwrap();
}

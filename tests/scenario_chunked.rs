//! spec.md §8 Scenario 4 — a streamed, chunked response body.

mod common;

use orbitd::response::InputStream;
use orbitd::{Control, Request, Response, ServerConfig};
use std::io::{Read, Write};
use std::time::Duration;

struct Chunks {
    remaining: std::vec::IntoIter<&'static [u8]>,
}

impl InputStream for Chunks {
    fn next_chunk(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.remaining.next().map(|c| c.to_vec()))
    }
}

#[test]
fn streamed_body_is_chunk_encoded() {
    let (mut server, addr) = common::start(ServerConfig::default(), |_addr| {
        move |_req: &Request, resp: &mut Response| {
            let chunks: Vec<&'static [u8]> = vec![b"<b>", b"hello ", b"world", b"</b>"];
            resp.set_stream(Box::new(Chunks { remaining: chunks.into_iter() }));
            Control::SendResponse
        }
    });

    let mut client = common::connect(addr);
    client.write_all(b"GET / HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let mut response = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match client.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                response.extend_from_slice(&buf[..n]);
                if response.ends_with(b"0\r\n\r\n") {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => panic!("read failed: {e}"),
        }
    }

    let text = String::from_utf8(response).unwrap();
    assert!(text.contains("Transfer-Encoding: chunked\r\n"), "{text}");
    assert!(
        text.ends_with("3\r\n<b>\r\n6\r\nhello \r\n5\r\nworld\r\n4\r\n</b>\r\n0\r\n\r\n"),
        "{text}"
    );

    server.stop().unwrap();
}

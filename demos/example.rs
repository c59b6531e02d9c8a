//! Smallest possible server: one listener thread, a single processor
//! closure that echoes the request target back as the response body.

use orbitd::{Control, Request, Response, Server, ServerConfig};
use std::time::Duration;

fn main() {
    let addr = "127.0.0.1:8080".parse().unwrap();
    let server = Server::start(addr, ServerConfig::default(), |_peer| {
        move |req: &Request, resp: &mut Response| {
            resp.set_content(format!("hello, {}\n", req.target).into_bytes());
            Control::SendResponse
        }
    })
    .expect("failed to start server");

    std::thread::sleep(Duration::from_secs(60));
    drop(server);
}

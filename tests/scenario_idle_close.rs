//! spec.md §8 Scenario 6 — a connection that sends nothing is closed once
//! it has been idle past the inactivity timeout, with no bytes written.

mod common;

use orbitd::{Control, Request, Response, ServerConfig};
use std::io::Read;
use std::time::Duration;

#[test]
fn idle_connection_is_closed_without_writing() {
    let mut config = ServerConfig::default();
    config.orchestrator.inactivity_timeout = Duration::from_millis(100);

    let (mut server, addr) = common::start(config, |_addr| {
        move |_req: &Request, resp: &mut Response| {
            resp.set_content(Vec::new());
            Control::SendResponse
        }
    });

    let mut client = common::connect(addr);
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let mut buf = [0u8; 16];
    let n = client.read(&mut buf).unwrap();
    assert_eq!(n, 0, "expected the idle connection to be closed with no bytes written");

    server.stop().unwrap();
}

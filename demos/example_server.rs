//! A more complete demo: several listener threads sharing one orchestrator,
//! a dedicated write throttle, and a processor that fetches the request
//! body before responding.

use orbitd::orchestrator::{OrchestratorConfig, ThrottleSpec};
use orbitd::{Control, Request, Response, Server, ServerConfig};
use std::thread::available_parallelism;
use std::time::Duration;

fn main() -> std::io::Result<()> {
    let addr = "127.0.0.1:8080".parse().unwrap();

    let config = ServerConfig {
        listeners: usize::from(available_parallelism()?),
        orchestrator: OrchestratorConfig {
            dedicated_write_throttle: Some(ThrottleSpec {
                capacity: 1 << 20,
                interval: Duration::from_secs(1),
            }),
            ..OrchestratorConfig::default()
        },
    };

    let server = Server::start(addr, config, |_peer| {
        move |req: &Request, resp: &mut Response| {
            if req.content_length().unwrap_or(0) > 0 && req.body.is_empty() {
                return Control::FetchContent;
            }
            resp.set_field("X-Served-By", "orbitd");
            resp.set_content(req.body.clone());
            Control::SendResponse
        }
    })
    .expect("failed to start server");

    std::thread::sleep(Duration::from_secs(3600));
    drop(server);
    Ok(())
}

use orbitd::{Handler, Server, ServerConfig};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// Binds an ephemeral port, starts a [`Server`] against it, and returns the
/// running server plus the address clients should connect to.
pub fn start<H, F>(config: ServerConfig, factory: F) -> (Server<H, F>, SocketAddr)
where
    H: Handler + 'static,
    F: Fn(SocketAddr) -> H + Send + Sync + 'static,
{
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);
    let server = Server::start(addr, config, factory).unwrap();
    (server, addr)
}

/// Connects to `addr`, retrying briefly: the acceptor's listener thread may
/// not have reached `accept()` the instant `Server::start` returns.
pub fn connect(addr: SocketAddr) -> TcpStream {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        match TcpStream::connect(addr) {
            Ok(s) => return s,
            Err(_) if std::time::Instant::now() < deadline => std::thread::sleep(Duration::from_millis(10)),
            Err(e) => panic!("failed to connect to {addr}: {e}"),
        }
    }
}

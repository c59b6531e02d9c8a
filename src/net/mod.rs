//! Socket capability traits, abstracted over `mio` and `std` so that the
//! channel and acceptor code can be exercised against in-memory fakes in
//! tests without depending on a real file descriptor.

mod tcp_stream;

pub use tcp_stream::TcpStream;

//! Representation of the requested HTTP version.
//!
//! HTTP/2 and HTTP/3 are out of scope for this crate (see the crate-level
//! Non-goals); a request line naming either is rejected by the parser rather
//! than represented here.

use std::fmt::Display;

/// Representation of the requested HTTP version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// HTTP/1.0
    H1_0,
    /// HTTP/1.1
    H1_1,
}

impl Version {
    /// Parses the version token of a request line, e.g. `HTTP/1.1`.
    pub fn parse(token: &[u8]) -> Option<Self> {
        match token {
            b"HTTP/1.0" => Some(Self::H1_0),
            b"HTTP/1.1" => Some(Self::H1_1),
            _ => None,
        }
    }

    /// Whether this version defaults to persistent connections absent a
    /// `Connection` field (HTTP/1.1 does; HTTP/1.0 does not).
    pub fn keeps_alive_by_default(&self) -> bool {
        matches!(self, Self::H1_1)
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::H1_0 => "HTTP/1.0",
            Self::H1_1 => "HTTP/1.1",
        })
    }
}

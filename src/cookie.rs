//! `Set-Cookie` field encoding.
//!
//! Grounded on `examples/original_source/include/Response.h`'s
//! `CookieOptions` and `Response::SetCookie`: a cookie has a name/value pair
//! plus optional `Domain`, `Path`, `Max-Age`, `Expires` (RFC 1123, GMT),
//! `HttpOnly`, and `Secure` attributes.

use chrono::{DateTime, Utc};
use std::fmt::Write as _;

/// Optional attributes accompanying a `Set-Cookie` field.
#[derive(Debug, Clone, Default)]
pub struct CookieOptions {
    pub domain: Option<String>,
    pub path: Option<String>,
    pub max_age: Option<std::time::Duration>,
    pub expires: Option<DateTime<Utc>>,
    pub http_only: bool,
    pub secure: bool,
}

/// Renders `name=value` plus any attributes into the value of a single
/// `Set-Cookie` field (the caller is responsible for the field name).
pub fn encode(name: &str, value: &str, options: &CookieOptions) -> String {
    let mut out = String::new();
    let _ = write!(out, "{name}={value}");

    if let Some(domain) = &options.domain {
        let _ = write!(out, "; Domain={domain}");
    }
    if let Some(path) = &options.path {
        let _ = write!(out, "; Path={path}");
    }
    if let Some(max_age) = options.max_age {
        let _ = write!(out, "; Max-Age={}", max_age.as_secs());
    }
    if let Some(expires) = options.expires {
        // RFC 1123 date, e.g. "Sun, 06 Nov 1994 08:49:37 GMT".
        let _ = write!(out, "; Expires={}", expires.format("%a, %d %b %Y %H:%M:%S GMT"));
    }
    if options.http_only {
        out.push_str("; HttpOnly");
    }
    if options.secure {
        out.push_str("; Secure");
    }
    out
}

//! Http Status Codes
//! [RFC 9110 Section 15](https://www.rfc-editor.org/rfc/rfc9110#section-15)
//!
//! Trimmed to the registry subset this crate's status line writer actually
//! emits (spec.md §6): 100, 101, 200–206, 300–305, 307, 400–417, 500–505.

use std::fmt::Display;

/// Http Status Codes
/// [RFC 9110 Section 15](https://www.rfc-editor.org/rfc/rfc9110#section-15)
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 15.2.1
    Continue = 100,
    /// 15.2.2
    SwitchingProtocols = 101,
    /// 15.3.1
    Ok = 200,
    /// 15.3.2
    Created = 201,
    /// 15.3.3
    Accepted = 202,
    /// 15.3.4
    NonAuthoritativeInformation = 203,
    /// 15.3.5
    NoContent = 204,
    /// 15.3.6
    ResetContent = 205,
    /// 15.3.7
    PartialContent = 206,
    /// 15.4.1
    MultipleChoices = 300,
    /// 15.4.2
    MovedPermanently = 301,
    /// 15.4.3
    Found = 302,
    /// 15.4.4
    SeeOther = 303,
    /// 15.4.5
    NotModified = 304,
    /// 15.4.6
    UseProxy = 305,
    /// 15.4.8
    TemporaryRedirect = 307,
    /// 15.5.1
    BadRequest = 400,
    /// 15.5.2
    Unauthorized = 401,
    /// 15.5.3
    PaymentRequired = 402,
    /// 15.5.4
    Forbidden = 403,
    /// 15.5.5
    NotFound = 404,
    /// 15.5.6
    MethodNotAllowed = 405,
    /// 15.5.7
    NotAcceptable = 406,
    /// 15.5.8
    ProxyAuthenticationRequired = 407,
    /// 15.5.9
    RequestTimeout = 408,
    /// 15.5.10
    Conflict = 409,
    /// 15.5.11
    Gone = 410,
    /// 15.5.12
    LengthRequired = 411,
    /// 15.5.13
    PreconditionFailed = 412,
    /// 15.5.14
    ContentTooLarge = 413,
    /// 15.5.15
    UriTooLong = 414,
    /// 15.5.16
    UnsupportedMediaType = 415,
    /// 15.5.17
    RangeNotSatisfiable = 416,
    /// 15.5.18
    ExpectationFailed = 417,
    /// 15.6.1
    InternalServerError = 500,
    /// 15.6.2
    NotImplemented = 501,
    /// 15.6.3
    BadGateway = 502,
    /// 15.6.4
    ServiceUnavailable = 503,
    /// 15.6.5
    GatewayTimeout = 504,
    /// 15.6.6
    HttpVersionNotSupported = 505,
}

impl Status {
    /// The numeric status code.
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// The standard reason phrase, as written on the status line.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Continue => "Continue",
            Self::SwitchingProtocols => "Switching Protocols",
            Self::Ok => "OK",
            Self::Created => "Created",
            Self::Accepted => "Accepted",
            Self::NonAuthoritativeInformation => "Non-Authoritative Information",
            Self::NoContent => "No Content",
            Self::ResetContent => "Reset Content",
            Self::PartialContent => "Partial Content",
            Self::MultipleChoices => "Multiple Choices",
            Self::MovedPermanently => "Moved Permanently",
            Self::Found => "Found",
            Self::SeeOther => "See Other",
            Self::NotModified => "Not Modified",
            Self::UseProxy => "Use Proxy",
            Self::TemporaryRedirect => "Temporary Redirect",
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::PaymentRequired => "Payment Required",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::NotAcceptable => "Not Acceptable",
            Self::ProxyAuthenticationRequired => "Proxy Authentication Required",
            Self::RequestTimeout => "Request Timeout",
            Self::Conflict => "Conflict",
            Self::Gone => "Gone",
            Self::LengthRequired => "Length Required",
            Self::PreconditionFailed => "Precondition Failed",
            Self::ContentTooLarge => "Content Too Large",
            Self::UriTooLong => "URI Too Long",
            Self::UnsupportedMediaType => "Unsupported Media Type",
            Self::RangeNotSatisfiable => "Range Not Satisfiable",
            Self::ExpectationFailed => "Expectation Failed",
            Self::InternalServerError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
            Self::BadGateway => "Bad Gateway",
            Self::ServiceUnavailable => "Service Unavailable",
            Self::GatewayTimeout => "Gateway Timeout",
            Self::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_format_matches_wire_expectation() {
        assert_eq!(Status::Ok.to_string(), "200 OK");
        assert_eq!(Status::ExpectationFailed.to_string(), "417 Expectation Failed");
    }
}

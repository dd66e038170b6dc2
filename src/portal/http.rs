//! Just enough HTTP for the settings page.
//!
//! A request is whatever arrived in a single read of at most
//! [`MAX_REQUEST_BYTES`]. Routing is substring matching on that raw text;
//! there is no header parsing, no chunked bodies and no keep-alive.

use std::fmt;

/// Largest request accepted, headers and body together.
pub const MAX_REQUEST_BYTES: usize = 1024;

/// Where a raw request goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `GET /` or `GET /config`.
    ConfigPage,
    /// `POST /save_device`.
    SaveDevice,
    /// `POST /save_wifi`.
    SaveWifi,
    /// `POST /save`, the combined WiFi form served in setup mode.
    Save,
    NotFound,
}

impl Route {
    /// Route by substring, most specific save path first.
    pub fn of(request: &str) -> Self {
        if request.contains("GET / ") || request.contains("GET /config") {
            Self::ConfigPage
        } else if request.contains("POST /save_device") {
            Self::SaveDevice
        } else if request.contains("POST /save_wifi") {
            Self::SaveWifi
        } else if request.contains("POST /save") {
            Self::Save
        } else {
            Self::NotFound
        }
    }
}

/// Text after the first blank line, or empty if there is none.
pub fn body(request: &str) -> &str {
    request
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("")
}

/// Decode the raw bytes of a request.
///
/// A multi-byte character cut off by the read limit is dropped; any other
/// invalid UTF-8 is rejected.
pub fn decode_request(raw: &[u8]) -> Result<&str, ProtocolError> {
    if raw.is_empty() {
        return Err(ProtocolError::Empty);
    }
    match std::str::from_utf8(raw) {
        Ok(text) => Ok(text),
        Err(e) if e.error_len().is_none() => {
            // Truncated at the end; the prefix is valid by construction.
            std::str::from_utf8(&raw[..e.valid_up_to()]).map_err(|_| ProtocolError::NotUtf8)
        }
        Err(_) => Err(ProtocolError::NotUtf8),
    }
}

/// Response status codes used by the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    InternalServerError,
}

impl Status {
    /// Numeric status code.
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::InternalServerError => 500,
        }
    }

    /// Reason phrase for the status line.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::InternalServerError => "Internal Server Error",
        }
    }
}

/// An HTML response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: Status,
    pub body: String,
}

impl HttpResponse {
    /// 200 with an HTML body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            body: body.into(),
        }
    }

    /// 400 with `message` as the body.
    pub fn bad_request(message: impl fmt::Display) -> Self {
        Self {
            status: Status::BadRequest,
            body: message.to_string(),
        }
    }

    /// 404 with an empty body.
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            body: String::new(),
        }
    }

    /// 500 with the error text inlined in the body.
    pub fn internal_error(error: impl fmt::Display) -> Self {
        Self {
            status: Status::InternalServerError,
            body: format!("Error: {}", error),
        }
    }

    /// Serialize as sent on the wire.
    pub fn to_wire(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: text/html\r\n\r\n{}",
            self.status.code(),
            self.status.reason(),
            self.body
        )
    }
}

/// Requests that cannot be handled at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Client connected and sent nothing.
    Empty,
    /// Request bytes are not UTF-8.
    NotUtf8,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty request"),
            Self::NotUtf8 => write!(f, "request is not valid UTF-8"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes() {
        assert_eq!(Route::of("GET / HTTP/1.1\r\n\r\n"), Route::ConfigPage);
        assert_eq!(Route::of("GET /config HTTP/1.1\r\n\r\n"), Route::ConfigPage);
        assert_eq!(Route::of("POST /save HTTP/1.1\r\n\r\nssid=a"), Route::Save);
        assert_eq!(Route::of("POST /save_wifi HTTP/1.1\r\n\r\n"), Route::SaveWifi);
        assert_eq!(Route::of("POST /save_device HTTP/1.1\r\n\r\n"), Route::SaveDevice);
    }

    #[test]
    fn test_unknown_routes() {
        assert_eq!(Route::of("GET /favicon.ico HTTP/1.1\r\n\r\n"), Route::NotFound);
        assert_eq!(Route::of("DELETE / HTTP/1.1\r\n\r\n"), Route::NotFound);
        assert_eq!(Route::of("GET /save HTTP/1.1\r\n\r\n"), Route::NotFound);
        assert_eq!(Route::of(""), Route::NotFound);
    }

    #[test]
    fn test_body_split() {
        assert_eq!(body("POST /save HTTP/1.1\r\nHost: x\r\n\r\nssid=a&b=c"), "ssid=a&b=c");
        assert_eq!(body("POST /save HTTP/1.1\r\nHost: x"), "");
    }

    #[test]
    fn test_wire_format() {
        let wire = HttpResponse::ok("<p>hi</p>").to_wire();
        assert_eq!(
            wire,
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n<p>hi</p>"
        );
        assert!(HttpResponse::not_found().to_wire().starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn test_internal_error_inlines_text() {
        let response = HttpResponse::internal_error("disk full");
        assert_eq!(response.status.code(), 500);
        assert_eq!(response.body, "Error: disk full");
    }

    #[test]
    fn test_decode_truncated_multibyte() {
        let mut raw = b"POST /save_wifi HTTP/1.1\r\n\r\nssid=caf".to_vec();
        raw.push(0xC3); // first byte of 'é', second byte cut off by the read limit
        assert_eq!(
            decode_request(&raw).unwrap(),
            "POST /save_wifi HTTP/1.1\r\n\r\nssid=caf"
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode_request(&[0xFF, b'G', b'E', b'T']), Err(ProtocolError::NotUtf8));
        assert_eq!(decode_request(&[]), Err(ProtocolError::Empty));
    }
}

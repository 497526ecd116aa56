//! HTTP response assembly with pooled bodies.
//!
//! The builder sizes the serialized SOAP envelope, leases a pool buffer when
//! it fits, and falls back to an owned allocation otherwise. The body's
//! ownership tag tells the connection task nothing extra; the pooled buffer
//! returns itself when the response is dropped after the write.

use crate::buffer::{BufferPool, PooledBuffer};

/// SOAP 1.2 content type used on every service response.
pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Headroom added to the body estimate for status line and headers.
const HEADER_ALLOWANCE: usize = 256;

/// Response body storage: leased from the pool or owned.
pub enum ResponseBody {
    Pooled(PooledBuffer),
    Owned(Vec<u8>),
}

impl ResponseBody {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            ResponseBody::Pooled(buf) => buf.as_slice(),
            ResponseBody::Owned(buf) => buf.as_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the body came from the pool.
    pub fn is_pooled(&self) -> bool {
        matches!(self, ResponseBody::Pooled(_))
    }
}

/// An assembled HTTP response.
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub extra_headers: Vec<(&'static str, String)>,
    pub body: ResponseBody,
}

impl HttpResponse {
    fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            413 => "Payload Too Large",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }

    /// Render status line and headers. The body is written separately so a
    /// pooled body is never copied again.
    pub fn encode_head(&self) -> Vec<u8> {
        let mut head = String::with_capacity(HEADER_ALLOWANCE);
        head.push_str(&format!(
            "HTTP/1.1 {} {}\r\n",
            self.status,
            Self::status_text(self.status)
        ));
        head.push_str(&format!("Content-Type: {}\r\n", self.content_type));
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        for (name, value) in &self.extra_headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("Connection: close\r\n\r\n");
        head.into_bytes()
    }
}

/// Builds responses, preferring pooled buffers for medium-size bodies.
pub struct ResponseBuilder<'p> {
    pool: &'p BufferPool,
}

impl<'p> ResponseBuilder<'p> {
    pub fn new(pool: &'p BufferPool) -> Self {
        Self { pool }
    }

    /// Wrap serialized SOAP bytes into a response.
    pub fn soap(&self, status: u16, xml: &str) -> HttpResponse {
        let body = match self.pool.lease(xml.len()) {
            Some(mut buf) => {
                buf.extend_from_slice(xml.as_bytes());
                ResponseBody::Pooled(buf)
            }
            None => ResponseBody::Owned(xml.as_bytes().to_vec()),
        };

        HttpResponse {
            status,
            content_type: SOAP_CONTENT_TYPE,
            extra_headers: Vec::new(),
            body,
        }
    }

    /// Plain-text response (error paths outside SOAP).
    pub fn text(&self, status: u16, message: &str) -> HttpResponse {
        HttpResponse {
            status,
            content_type: "text/plain; charset=utf-8",
            extra_headers: Vec::new(),
            body: ResponseBody::Owned(message.as_bytes().to_vec()),
        }
    }

    /// 401 challenge carrying the Basic realm.
    pub fn unauthorized(&self) -> HttpResponse {
        HttpResponse {
            status: 401,
            content_type: "text/plain; charset=utf-8",
            extra_headers: vec![("WWW-Authenticate", "Basic realm=\"ONVIF\"".to_string())],
            body: ResponseBody::Owned(Vec::new()),
        }
    }
}

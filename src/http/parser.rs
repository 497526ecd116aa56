//! Incremental HTTP/1.1 request parser.
//!
//! A three-state machine (request line, headers, body) over a
//! connection-owned byte buffer. The connection task appends whatever the
//! socket produced and calls [`HttpParser::advance`]; the parser either asks
//! for more data or marks the request complete. The parsed
//! [`HttpRequest`] borrows directly from the connection buffer: header names
//! and values and the body are zero-copy slices.
//!
//! Hard limits keep a hostile peer from growing the buffer without bound.

use std::ops::Range;

use thiserror::Error;

/// Maximum method length in bytes.
pub const MAX_METHOD_LEN: usize = 15;

/// Maximum request path length in bytes.
pub const MAX_PATH_LEN: usize = 255;

/// Maximum HTTP version token length in bytes.
pub const MAX_VERSION_LEN: usize = 15;

/// Maximum length of a single header line (including the request line).
pub const MAX_HEADER_LINE: usize = 8192;

/// Maximum accepted Content-Length.
pub const MAX_CONTENT_LENGTH: usize = 262_144;

/// Parse failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HttpParseError {
    /// Malformed request syntax.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Content-Length exceeds the accepted maximum.
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Method other than POST or GET.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
}

/// Progress of one `advance` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// The transport must read more bytes.
    NeedMore,
    /// A full request is buffered; `request()` may be called.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    RequestLine,
    Headers,
    Body,
}

type Span = Range<usize>;

/// Stateful request parser. One instance per request.
#[derive(Debug)]
pub struct HttpParser {
    state: State,
    pos: usize,
    method: Span,
    path: Span,
    version: Span,
    headers: Vec<(Span, Span)>,
    content_length: usize,
    body: Span,
}

impl HttpParser {
    pub fn new() -> Self {
        Self {
            state: State::RequestLine,
            pos: 0,
            method: 0..0,
            path: 0..0,
            version: 0..0,
            headers: Vec::new(),
            content_length: 0,
            body: 0..0,
        }
    }

    /// Consume newly buffered bytes. `buf` must contain everything received
    /// so far for this request; earlier bytes must not move.
    pub fn advance(&mut self, buf: &[u8]) -> Result<ParseStatus, HttpParseError> {
        loop {
            match self.state {
                State::RequestLine => {
                    let Some(line) = self.take_line(buf)? else {
                        return Ok(ParseStatus::NeedMore);
                    };
                    self.parse_request_line(buf, line)?;
                    self.state = State::Headers;
                }
                State::Headers => {
                    let Some(line) = self.take_line(buf)? else {
                        return Ok(ParseStatus::NeedMore);
                    };
                    if line.is_empty() {
                        self.body = self.pos..self.pos + self.content_length;
                        self.state = State::Body;
                    } else {
                        self.parse_header_line(buf, line)?;
                    }
                }
                State::Body => {
                    if buf.len() >= self.body.end {
                        return Ok(ParseStatus::Complete);
                    }
                    return Ok(ParseStatus::NeedMore);
                }
            }
        }
    }

    /// Total length of the complete request (request line through body).
    pub fn total_len(&self) -> usize {
        self.body.end
    }

    /// Materialize the parsed request as zero-copy slices into `buf`.
    ///
    /// Only valid after `advance` returned [`ParseStatus::Complete`] for the
    /// same buffer.
    pub fn request<'a>(&self, buf: &'a [u8]) -> HttpRequest<'a> {
        let text = |span: &Span| -> &'a str {
            // Validated as UTF-8 while the line was parsed.
            std::str::from_utf8(&buf[span.clone()]).unwrap_or("")
        };

        HttpRequest {
            method: text(&self.method),
            path: text(&self.path),
            version: text(&self.version),
            headers: self
                .headers
                .iter()
                .map(|(n, v)| (text(n), text(v)))
                .collect(),
            body: &buf[self.body.clone()],
        }
    }

    /// Find the next CRLF- or LF-terminated line starting at the cursor.
    /// Returns the line span without the terminator and moves the cursor
    /// past it.
    fn take_line(&mut self, buf: &[u8]) -> Result<Option<Span>, HttpParseError> {
        let rest = &buf[self.pos..];
        match rest.iter().position(|&b| b == b'\n') {
            Some(nl) => {
                if nl + 1 > MAX_HEADER_LINE {
                    return Err(HttpParseError::InvalidRequest(
                        "header line too long".to_string(),
                    ));
                }
                let mut end = self.pos + nl;
                if end > self.pos && buf[end - 1] == b'\r' {
                    end -= 1;
                }
                let span = self.pos..end;
                self.pos += nl + 1;
                Ok(Some(span))
            }
            None => {
                if rest.len() > MAX_HEADER_LINE {
                    return Err(HttpParseError::InvalidRequest(
                        "header line too long".to_string(),
                    ));
                }
                Ok(None)
            }
        }
    }

    fn parse_request_line(&mut self, buf: &[u8], line: Span) -> Result<(), HttpParseError> {
        let text = std::str::from_utf8(&buf[line.clone()])
            .map_err(|_| HttpParseError::InvalidRequest("request line is not UTF-8".to_string()))?;

        let mut parts = text.split(' ').filter(|p| !p.is_empty());
        let (Some(method), Some(path), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(HttpParseError::InvalidRequest(
                "malformed request line".to_string(),
            ));
        };

        if method.len() > MAX_METHOD_LEN {
            return Err(HttpParseError::InvalidRequest("method too long".to_string()));
        }
        if path.len() > MAX_PATH_LEN {
            return Err(HttpParseError::InvalidRequest("path too long".to_string()));
        }
        if version.len() > MAX_VERSION_LEN || !version.starts_with("HTTP/") {
            return Err(HttpParseError::InvalidRequest(
                "malformed HTTP version".to_string(),
            ));
        }
        if method != "POST" && method != "GET" {
            return Err(HttpParseError::UnsupportedMethod(method.to_string()));
        }

        let offset = |s: &str| {
            let start = s.as_ptr() as usize - text.as_ptr() as usize + line.start;
            start..start + s.len()
        };
        self.method = offset(method);
        self.path = offset(path);
        self.version = offset(version);
        Ok(())
    }

    fn parse_header_line(&mut self, buf: &[u8], line: Span) -> Result<(), HttpParseError> {
        let text = std::str::from_utf8(&buf[line.clone()])
            .map_err(|_| HttpParseError::InvalidRequest("header line is not UTF-8".to_string()))?;

        let Some(colon) = text.find(':') else {
            return Err(HttpParseError::InvalidRequest(
                "header line without colon".to_string(),
            ));
        };

        let name = &text[..colon];
        if name.is_empty()
            || !name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(HttpParseError::InvalidRequest(format!(
                "invalid header name '{}'",
                name
            )));
        }

        let value = text[colon + 1..].trim();

        if name.eq_ignore_ascii_case("content-length") {
            let length: usize = value.parse().map_err(|_| {
                HttpParseError::InvalidRequest("malformed Content-Length".to_string())
            })?;
            if length > MAX_CONTENT_LENGTH {
                return Err(HttpParseError::PayloadTooLarge(length));
            }
            self.content_length = length;
        }

        let name_start = line.start;
        let value_start = line.start + colon + 1 + (text[colon + 1..].len() - text[colon + 1..].trim_start().len());
        self.headers.push((
            name_start..name_start + name.len(),
            value_start..value_start + value.len(),
        ));
        Ok(())
    }
}

impl Default for HttpParser {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed request borrowing from the connection buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct HttpRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub version: &'a str,
    headers: Vec<(&'a str, &'a str)>,
    pub body: &'a [u8],
}

impl<'a> HttpRequest<'a> {
    /// Case-insensitive header lookup; first match wins.
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }

    /// Ordered header list.
    pub fn headers(&self) -> &[(&'a str, &'a str)] {
        &self.headers
    }

    /// Serialize back to wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.body.len());
        out.extend_from_slice(
            format!("{} {} {}\r\n", self.method, self.path, self.version).as_bytes(),
        );
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(self.body);
        out
    }
}

/// One-shot parse of a fully buffered request.
pub fn parse_request(buf: &[u8]) -> Result<(HttpParser, ParseStatus), HttpParseError> {
    let mut parser = HttpParser::new();
    let status = parser.advance(buf)?;
    Ok((parser, status))
}

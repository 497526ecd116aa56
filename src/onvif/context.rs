//! Request-scoped SOAP context.
//!
//! One [`SoapContext`] exists per in-flight request. It owns the decoded
//! envelope tree, the canonical operation name, the response arena, and the
//! fault slot. Creation parses the envelope; dropping the value releases
//! everything, so no exit path can leak per-request state.

use super::error::{OnvifError, OnvifResult};
use super::soap::{SOAP_ENVELOPE_NS, XmlElement, build_soap_response, parse_xml};

/// Per-request SOAP state. Never shared across tasks.
pub struct SoapContext {
    operation: String,
    payload: XmlElement,
    header: Option<XmlElement>,
    response: String,
    fault: Option<OnvifError>,
}

impl SoapContext {
    /// Parse a request envelope and extract the operation.
    ///
    /// Fails with `Parse` on malformed XML and `InvalidNamespace` when the
    /// document is not a SOAP 1.2 envelope.
    pub fn parse(body: &[u8]) -> OnvifResult<Self> {
        let text = std::str::from_utf8(body)
            .map_err(|_| OnvifError::Parse("request body is not UTF-8".to_string()))?;

        let root = parse_xml(text)?;

        if root.name != "Envelope" {
            return Err(OnvifError::Parse(format!(
                "expected Envelope, found '{}'",
                root.name
            )));
        }
        if root.namespace.as_deref() != Some(SOAP_ENVELOPE_NS) {
            return Err(OnvifError::InvalidNamespace(
                "envelope is not SOAP 1.2".to_string(),
            ));
        }

        let header = root.child("Header").cloned();
        let body_element = root
            .child("Body")
            .ok_or_else(|| OnvifError::Parse("missing SOAP Body".to_string()))?;
        let payload = body_element
            .children
            .first()
            .cloned()
            .ok_or_else(|| OnvifError::Parse("empty SOAP Body".to_string()))?;

        Ok(Self {
            operation: payload.name.clone(),
            payload,
            header,
            response: String::new(),
            fault: None,
        })
    }

    /// The operation name, namespace prefix already stripped.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The operation element inside the Body; extractors walk this.
    pub fn payload(&self) -> &XmlElement {
        &self.payload
    }

    /// The SOAP Header element, when present.
    pub fn header(&self) -> Option<&XmlElement> {
        self.header.as_ref()
    }

    /// Build the response envelope from a callback that emits exactly one
    /// operation's response XML into the arena.
    pub fn generate_response_with<F>(&mut self, build: F)
    where
        F: FnOnce(&mut String),
    {
        let mut body = String::new();
        build(&mut body);
        self.response = build_soap_response(&body);
        self.fault = None;
    }

    /// Record a fault; the response becomes the fault envelope.
    pub fn generate_fault(&mut self, error: OnvifError) {
        self.response = error.to_soap_fault();
        self.fault = Some(error);
    }

    /// The serialized response. Valid until the context is dropped.
    pub fn response_data(&self) -> &str {
        &self.response
    }

    /// Length of the serialized response in bytes.
    pub fn response_len(&self) -> usize {
        self.response.len()
    }

    /// The recorded fault, if the request failed.
    pub fn fault(&self) -> Option<&OnvifError> {
        self.fault.as_ref()
    }

    /// HTTP status to send with the current response.
    pub fn http_status(&self) -> u16 {
        self.fault.as_ref().map(|f| f.http_status()).unwrap_or(200)
    }
}

//! SOAP 1.2 envelope handling.
//!
//! Incoming envelopes are decoded into a small [`XmlElement`] tree with
//! namespaces resolved, which the typed per-operation extractors walk.
//! Outgoing responses are rendered with one envelope template carrying the
//! ONVIF namespace declarations every service uses; faults get their own
//! template with code, subcode, reason, and optional detail.

use quick_xml::NsReader;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;

use super::error::{OnvifError, OnvifResult};

/// SOAP 1.2 envelope namespace.
pub const SOAP_ENVELOPE_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// ONVIF Device service namespace.
pub const TDS_NS: &str = "http://www.onvif.org/ver10/device/wsdl";

/// ONVIF Media service namespace.
pub const TRT_NS: &str = "http://www.onvif.org/ver10/media/wsdl";

/// ONVIF PTZ service namespace.
pub const TPTZ_NS: &str = "http://www.onvif.org/ver20/ptz/wsdl";

/// ONVIF Imaging service namespace.
pub const TIMG_NS: &str = "http://www.onvif.org/ver20/imaging/wsdl";

/// ONVIF schema namespace.
pub const TT_NS: &str = "http://www.onvif.org/ver10/schema";

/// ONVIF error namespace.
pub const TER_NS: &str = "http://www.onvif.org/ver10/error";

/// A decoded XML element with resolved namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Local name, prefix stripped.
    pub name: String,
    /// Resolved namespace URI, when bound.
    pub namespace: Option<String>,
    /// Attributes with prefix-stripped names.
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<XmlElement>,
    /// Concatenated character data directly inside this element.
    pub text: String,
}

impl XmlElement {
    /// First direct child with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Depth-first search for a descendant with the given local name.
    pub fn descendant(&self, name: &str) -> Option<&XmlElement> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// Trimmed text of a direct child.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim())
    }

    /// Attribute value by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed own text.
    pub fn text_trim(&self) -> &str {
        self.text.trim()
    }

    /// Parse an attribute as a number.
    pub fn attr_parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.attr(name).and_then(|v| v.parse().ok())
    }

    /// Parse a direct child's text as a number.
    pub fn child_parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.child_text(name).and_then(|v| v.parse().ok())
    }
}

/// Decode an XML document into an element tree.
pub fn parse_xml(text: &str) -> OnvifResult<XmlElement> {
    let mut reader = NsReader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let element = element_from_start(&reader, &e)?;
                stack.push(element);
            }
            Ok(Event::Empty(e)) => {
                let element = element_from_start(&reader, &e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().ok_or_else(|| {
                    OnvifError::Parse("unbalanced closing tag".to_string())
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let content = t
                        .xml_content()
                        .map_err(|e| OnvifError::Parse(format!("bad character data: {}", e)))?;
                    top.text.push_str(&content);
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(OnvifError::Parse(format!(
                    "XML error at position {}: {}",
                    reader.error_position(),
                    e
                )));
            }
        }
    }

    if !stack.is_empty() {
        return Err(OnvifError::Parse("unterminated element".to_string()));
    }

    root.ok_or_else(|| OnvifError::Parse("empty document".to_string()))
}

fn element_from_start(
    reader: &NsReader<&[u8]>,
    e: &quick_xml::events::BytesStart<'_>,
) -> OnvifResult<XmlElement> {
    let (resolved, local) = reader.resolve_element(e.name());
    let namespace = match resolved {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).to_string()),
        _ => None,
    };

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| OnvifError::Parse(format!("bad attribute: {}", e)))?;
        // Namespace declarations are not payload data.
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let name = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| OnvifError::Parse(format!("bad attribute value: {}", e)))?
            .to_string();
        attributes.push((name, value));
    }

    Ok(XmlElement {
        name: String::from_utf8_lossy(local.as_ref()).to_string(),
        namespace,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(
    stack: &mut Vec<XmlElement>,
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> OnvifResult<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(OnvifError::Parse(
                    "multiple top-level elements".to_string(),
                ));
            }
            *root = Some(element);
            Ok(())
        }
    }
}

/// Escape character data for inclusion in built XML.
pub fn xml_escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// Wrap a response body in the SOAP 1.2 envelope with ONVIF namespaces.
pub fn build_soap_response(body_xml: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="{SOAP_ENVELOPE_NS}" xmlns:tt="{TT_NS}" xmlns:tds="{TDS_NS}" xmlns:trt="{TRT_NS}" xmlns:tptz="{TPTZ_NS}" xmlns:timg="{TIMG_NS}">
  <s:Body>
    {body_xml}
  </s:Body>
</s:Envelope>"#
    )
}

/// Build a SOAP 1.2 fault envelope.
pub fn build_soap_fault(code: &str, subcode: &str, reason: &str, detail: Option<&str>) -> String {
    let detail_element = detail
        .map(|d| format!("\n      <s:Detail><s:Text>{}</s:Text></s:Detail>", xml_escape(d)))
        .unwrap_or_default();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="{SOAP_ENVELOPE_NS}" xmlns:ter="{TER_NS}">
  <s:Body>
    <s:Fault>
      <s:Code>
        <s:Value>{code}</s:Value>
        <s:Subcode>
          <s:Value>{subcode}</s:Value>
        </s:Subcode>
      </s:Code>
      <s:Reason>
        <s:Text xml:lang="en">{reason}</s:Text>
      </s:Reason>{detail_element}
    </s:Fault>
  </s:Body>
</s:Envelope>"#,
        reason = xml_escape(reason),
    )
}

//! SOAP XML parsing utilities.
//!
//! Uses quick-xml, which doesn't expand entities, and rejects any document
//! carrying a DTD. Body text is kept exactly as sent. Namespaces are resolved through `NsReader` so prefixes chosen by
//! the client do not matter.

use crate::config::SoapVersion;
use crate::error::ServiceError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;

/// SOAP namespace URIs.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const WSSE_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

/// Parsed SOAP envelope.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    /// Detected SOAP version
    pub version: SoapVersion,
    /// SOAP Header (if present)
    pub header: Option<SoapHeader>,
    /// SOAP Body
    pub body: SoapBody,
}

/// Parsed SOAP Header.
#[derive(Debug, Clone, Default)]
pub struct SoapHeader {
    /// WS-Security header (if present)
    pub security: Option<WsSecurityHeader>,
    /// All other header elements
    pub elements: Vec<HeaderElement>,
}

/// A generic header element.
#[derive(Debug, Clone)]
pub struct HeaderElement {
    pub name: QName,
    /// Must understand flag
    pub must_understand: bool,
}

/// Parsed WS-Security header.
#[derive(Debug, Clone, Default)]
pub struct WsSecurityHeader {
    pub timestamp: Option<SecurityTimestamp>,
    pub username_token: Option<UsernameToken>,
}

/// WS-Security Timestamp.
#[derive(Debug, Clone, Default)]
pub struct SecurityTimestamp {
    /// Created timestamp (ISO 8601)
    pub created: Option<String>,
    /// Expires timestamp (ISO 8601)
    pub expires: Option<String>,
}

/// WS-Security UsernameToken.
#[derive(Debug, Clone, Default)]
pub struct UsernameToken {
    pub username: String,
    pub password: Option<String>,
    /// Password type URI
    pub password_type: Option<String>,
    /// Nonce (base64 encoded)
    pub nonce: Option<String>,
    pub created: Option<String>,
}

/// Namespace-qualified element name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    pub namespace: Option<String>,
    pub local_name: String,
}

impl QName {
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }
}

/// Parsed SOAP Body.
#[derive(Debug, Clone, Default)]
pub struct SoapBody {
    /// First element inside the Body
    pub operation: Option<QName>,
    /// Leaf elements below the operation element
    pub fields: Vec<BodyField>,
    pub analysis: BodyAnalysis,
}

impl SoapBody {
    /// Text of the first leaf at `path` (local names below the operation).
    pub fn field(&self, path: &[&str]) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.path.iter().map(String::as_str).eq(path.iter().copied()))
            .map(|f| f.text.as_str())
    }
}

/// A leaf element of the body payload.
#[derive(Debug, Clone)]
pub struct BodyField {
    /// Local names from the operation's child down to this element
    pub path: Vec<String>,
    pub namespace: Option<String>,
    pub text: String,
}

/// Body content analysis.
#[derive(Debug, Clone, Default)]
pub struct BodyAnalysis {
    /// Maximum nesting depth found
    pub max_depth: u32,
    /// Total element count
    pub element_count: u32,
}

/// An element currently open in the document.
struct Frame {
    name: QName,
    text: String,
    type_attr: Option<String>,
    has_children: bool,
}

/// Parse raw bytes as SOAP envelope.
pub fn parse_soap_envelope(data: &[u8]) -> Result<SoapEnvelope, ServiceError> {
    let xml_str = std::str::from_utf8(data)
        .map_err(|e| ServiceError::MalformedRequest(format!("Invalid UTF-8: {}", e)))?;

    let mut reader = NsReader::from_str(xml_str);

    let mut version: Option<SoapVersion> = None;
    let mut header: Option<SoapHeader> = None;
    let mut body: Option<SoapBody> = None;
    let mut stack: Vec<Frame> = Vec::new();

    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| ServiceError::MalformedRequest(format!("XML parse error: {}", e)))?;
        let ns = match ns {
            ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
            _ => None,
        };

        match event {
            Event::Start(ref e) => {
                let frame = open_element(e, ns, &stack, &mut version, &mut header, &mut body)?;
                if let Some(parent) = stack.last_mut() {
                    parent.has_children = true;
                }
                stack.push(frame);
            }

            Event::Empty(ref e) => {
                // Self-closing tags open and close in one event
                let frame = open_element(e, ns, &stack, &mut version, &mut header, &mut body)?;
                if let Some(parent) = stack.last_mut() {
                    parent.has_children = true;
                }
                close_element(frame, &stack, &mut header, &mut body);
            }

            Event::End(_) => {
                if let Some(frame) = stack.pop() {
                    close_element(frame, &stack, &mut header, &mut body);
                }
            }

            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map_err(|e| ServiceError::MalformedRequest(format!("XML parse error: {}", e)))?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }

            Event::CData(ref e) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(e));
                }
            }

            // Entity declarations can only live in a DTD
            Event::DocType(_) => {
                return Err(ServiceError::MalformedRequest(
                    "DOCTYPE declarations are not allowed".to_string(),
                ));
            }

            Event::Eof => break,

            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ServiceError::MalformedRequest(
            "Unexpected end of document".to_string(),
        ));
    }

    let version = version.ok_or_else(|| {
        ServiceError::MalformedRequest(
            "No valid SOAP Envelope found with recognized namespace".to_string(),
        )
    })?;
    let body = body.ok_or_else(|| {
        ServiceError::MalformedRequest("SOAP Body is missing".to_string())
    })?;

    Ok(SoapEnvelope {
        version,
        header,
        body,
    })
}

/// Handle an opening tag at depth `stack.len()`.
fn open_element(
    e: &BytesStart,
    namespace: Option<String>,
    stack: &[Frame],
    version: &mut Option<SoapVersion>,
    header: &mut Option<SoapHeader>,
    body: &mut Option<SoapBody>,
) -> Result<Frame, ServiceError> {
    let name = QName {
        namespace,
        local_name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
    };

    match stack.len() {
        0 => {
            *version = if name.is(SOAP_11_NS, "Envelope") {
                Some(SoapVersion::Soap11)
            } else if name.is(SOAP_12_NS, "Envelope") {
                Some(SoapVersion::Soap12)
            } else {
                return Err(ServiceError::MalformedRequest(format!(
                    "Root element '{}' is not a SOAP Envelope",
                    name.local_name
                )));
            };
        }
        1 => {
            let envelope_ns = version.map(|v| v.namespace()).unwrap_or_default();
            if name.is(envelope_ns, "Header") && header.is_none() && body.is_none() {
                *header = Some(SoapHeader::default());
            } else if name.is(envelope_ns, "Body") && body.is_none() {
                *body = Some(SoapBody::default());
            } else {
                return Err(ServiceError::MalformedRequest(format!(
                    "Unexpected element '{}' in SOAP Envelope",
                    name.local_name
                )));
            }
        }
        depth => {
            if let Some(body) = body.as_mut().filter(|_| stack[1].name.local_name == "Body") {
                let body_depth = (depth - 1) as u32;
                body.analysis.element_count += 1;
                body.analysis.max_depth = body.analysis.max_depth.max(body_depth);
                if depth == 2 && body.operation.is_none() {
                    body.operation = Some(name.clone());
                }
            } else if let Some(header) = header.as_mut() {
                if depth == 2 && name.is(WSSE_NS, "Security") {
                    header.security.get_or_insert_with(WsSecurityHeader::default);
                } else if depth == 3 && stack[2].name.is(WSSE_NS, "Security") {
                    if let Some(security) = header.security.as_mut() {
                        if name.is(WSU_NS, "Timestamp") {
                            security.timestamp = Some(SecurityTimestamp::default());
                        } else if name.is(WSSE_NS, "UsernameToken") {
                            security.username_token = Some(UsernameToken::default());
                        }
                    }
                } else if depth == 2 {
                    header.elements.push(HeaderElement {
                        name: name.clone(),
                        must_understand: get_must_understand(e),
                    });
                }
            }
        }
    }

    Ok(Frame {
        name,
        text: String::new(),
        type_attr: get_attribute(e, "Type"),
        has_children: false,
    })
}

/// Handle a closing tag; `stack` holds the ancestors of `frame`.
fn close_element(
    frame: Frame,
    stack: &[Frame],
    header: &mut Option<SoapHeader>,
    body: &mut Option<SoapBody>,
) {
    let depth = stack.len();
    if depth < 2 {
        return;
    }

    if stack[1].name.local_name == "Body" {
        if depth >= 3 && !frame.has_children {
            if let Some(body) = body.as_mut() {
                let mut path: Vec<String> =
                    stack[3..].iter().map(|f| f.name.local_name.clone()).collect();
                path.push(frame.name.local_name);
                body.fields.push(BodyField {
                    path,
                    namespace: frame.name.namespace,
                    text: frame.text,
                });
            }
        }
        return;
    }

    if depth != 4 || !stack[2].name.is(WSSE_NS, "Security") {
        return;
    }
    let Some(security) = header.as_mut().and_then(|h| h.security.as_mut()) else {
        return;
    };

    // Token values are whitespace-insensitive, unlike body payload text
    let value = frame.text.trim().to_string();
    let parent = &stack[3].name;
    if parent.is(WSU_NS, "Timestamp") {
        if let Some(ts) = security.timestamp.as_mut() {
            if frame.name.is(WSU_NS, "Created") {
                ts.created = Some(value);
            } else if frame.name.is(WSU_NS, "Expires") {
                ts.expires = Some(value);
            }
        }
    } else if parent.is(WSSE_NS, "UsernameToken") {
        if let Some(token) = security.username_token.as_mut() {
            match (frame.name.namespace.as_deref(), frame.name.local_name.as_str()) {
                (Some(WSSE_NS), "Username") => token.username = value,
                (Some(WSSE_NS), "Password") => {
                    token.password = Some(value);
                    token.password_type = frame.type_attr;
                }
                (Some(WSSE_NS), "Nonce") => token.nonce = Some(value),
                (Some(WSU_NS), "Created") => token.created = Some(value),
                _ => {}
            }
        }
    }
}

/// Value of the attribute with the given local name, ignoring its prefix.
fn get_attribute(e: &BytesStart, local_name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == local_name.as_bytes())
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Check mustUnderstand attribute.
fn get_must_understand(e: &BytesStart) -> bool {
    matches!(
        get_attribute(e, "mustUnderstand").as_deref(),
        Some("1") | Some("true")
    )
}

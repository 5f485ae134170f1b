//! SOAP envelope parsing.
//!
//! Uses quick-xml, which never expands external entities. DOCTYPE and entity
//! declarations are rejected outright before parsing starts.

use crate::config::SoapVersion;
use crate::error::{Fault, FaultCode};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

/// SOAP namespace URIs.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

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
    /// Element local name
    pub local_name: String,
    /// Element namespace URI
    pub namespace: Option<String>,
    /// Must understand flag
    pub must_understand: bool,
}

/// Parsed WS-Security header.
#[derive(Debug, Clone, Default)]
pub struct WsSecurityHeader {
    /// Timestamp element
    pub timestamp: Option<SecurityTimestamp>,
    /// Username token
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
    /// Password type URI
    pub password_type: Option<String>,
}

/// Parsed SOAP Body.
#[derive(Debug, Clone, Default)]
pub struct SoapBody {
    /// Payload root local name
    pub operation: Option<String>,
    /// Payload root namespace
    pub operation_namespace: Option<String>,
    /// Direct children of the payload root, in document order
    pub fields: Vec<PayloadField>,
    /// Structural analysis
    pub analysis: BodyAnalysis,
}

impl SoapBody {
    /// Text of the first payload field with this local name.
    ///
    /// Only unqualified fields and fields in the payload root's namespace
    /// match; a same-named element from a foreign namespace is skipped.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| {
                f.name == name
                    && (f.namespace.is_none() || f.namespace == self.operation_namespace)
            })
            .map(|f| f.value.as_str())
    }
}

/// A child element of the payload root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadField {
    pub name: String,
    pub namespace: Option<String>,
    /// Trimmed text content; empty for self-closing or element-only children
    pub value: String,
}

/// Body content analysis.
#[derive(Debug, Clone, Default)]
pub struct BodyAnalysis {
    /// Maximum nesting depth found
    pub max_depth: u32,
    /// Total element count
    pub element_count: u32,
}

/// Parse raw bytes as SOAP envelope.
pub fn parse_soap_envelope(data: &[u8]) -> Result<SoapEnvelope, Fault> {
    let xml_str = std::str::from_utf8(data)
        .map_err(|e| Fault::new(FaultCode::InvalidXml, format!("Invalid UTF-8: {}", e)))?;

    check_xxe_patterns(xml_str)?;

    let mut reader = NsReader::from_str(xml_str);
    reader.config_mut().trim_text(true);

    let mut builder = EnvelopeBuilder::default();

    loop {
        let (ns, event) = match reader.read_resolved_event() {
            Ok((resolved, event)) => (namespace_uri(&resolved), event),
            Err(e) => {
                return Err(Fault::new(
                    FaultCode::InvalidXml,
                    format!("XML parse error: {}", e),
                ));
            }
        };

        match event {
            Event::Start(ref e) => builder.start(local_name_str(e), ns, e)?,
            Event::Empty(ref e) => {
                builder.start(local_name_str(e), ns, e)?;
                builder.end();
            }
            Event::End(_) => builder.end(),
            Event::Text(ref e) => {
                let text = e.unescape().map_err(|err| {
                    Fault::new(FaultCode::InvalidXml, format!("Invalid text content: {}", err))
                })?;
                builder.text.push_str(&text);
            }
            Event::CData(ref e) => {
                builder.text.push_str(&String::from_utf8_lossy(e));
            }
            Event::DocType(_) => {
                return Err(Fault::new(
                    FaultCode::DoctypeDetected,
                    "DOCTYPE declarations are not allowed",
                ));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    builder.finish()
}

/// One open element.
#[derive(Debug)]
struct Frame {
    local_name: String,
    namespace: Option<String>,
}

/// Accumulates envelope parts while walking the event stream.
#[derive(Debug, Default)]
struct EnvelopeBuilder {
    stack: Vec<Frame>,
    text: String,
    version: Option<SoapVersion>,
    header: Option<SoapHeader>,
    has_body: bool,
    body: SoapBody,
    operation_open: bool,
}

impl EnvelopeBuilder {
    /// Whether we are inside the envelope child with this name. The child
    /// must be in the envelope's own namespace.
    fn in_section(&self, name: &str) -> bool {
        let envelope_ns = self.version.map(|v| v.namespace());
        self.stack
            .get(1)
            .is_some_and(|f| f.local_name == name && f.namespace.as_deref() == envelope_ns)
    }

    fn in_security(&self) -> bool {
        self.stack.get(2).is_some_and(|f| {
            f.local_name == "Security" && f.namespace.as_deref() == Some(WSSE_NS)
        })
    }

    fn parent_name(&self) -> Option<&str> {
        self.stack.last().map(|f| f.local_name.as_str())
    }

    fn start(
        &mut self,
        local_name: String,
        namespace: Option<String>,
        e: &BytesStart,
    ) -> Result<(), Fault> {
        // depth of the element being opened, the envelope is 1
        let depth = self.stack.len() + 1;
        self.text.clear();

        match depth {
            1 => {
                self.version = match (local_name.as_str(), namespace.as_deref()) {
                    ("Envelope", Some(SOAP_11_NS)) => Some(SoapVersion::Soap11),
                    ("Envelope", Some(SOAP_12_NS)) => Some(SoapVersion::Soap12),
                    _ => {
                        return Err(Fault::new(
                            FaultCode::MissingEnvelope,
                            format!(
                                "Root element '{}' is not a SOAP Envelope with a recognized namespace",
                                local_name
                            ),
                        ));
                    }
                };
            }
            2 => {
                let envelope_ns = self.version.map(|v| v.namespace());
                if namespace.as_deref() == envelope_ns {
                    match local_name.as_str() {
                        "Header" => self.header = Some(SoapHeader::default()),
                        "Body" => self.has_body = true,
                        _ => {}
                    }
                }
            }
            _ => {
                if self.in_section("Header") {
                    self.start_header_element(depth, &local_name, &namespace, e);
                } else if self.in_section("Body") {
                    self.start_body_element(depth, &local_name, &namespace);
                }
            }
        }

        self.stack.push(Frame {
            local_name,
            namespace,
        });
        Ok(())
    }

    fn start_header_element(
        &mut self,
        depth: usize,
        local_name: &str,
        namespace: &Option<String>,
        e: &BytesStart,
    ) {
        let in_security = self.in_security();
        let parent = self.parent_name().map(str::to_string);
        let Some(header) = self.header.as_mut() else {
            return;
        };

        if depth == 3 {
            if local_name == "Security" && namespace.as_deref() == Some(WSSE_NS) {
                header.security = Some(WsSecurityHeader::default());
            } else {
                header.elements.push(HeaderElement {
                    local_name: local_name.to_string(),
                    namespace: namespace.clone(),
                    must_understand: get_must_understand(e),
                });
            }
            return;
        }

        let Some(security) = header.security.as_mut().filter(|_| in_security) else {
            return;
        };
        match (depth, local_name, parent.as_deref()) {
            (4, "Timestamp", _) if namespace.as_deref() == Some(WSU_NS) => {
                security.timestamp = Some(SecurityTimestamp::default())
            }
            (4, "UsernameToken", _) => security.username_token = Some(UsernameToken::default()),
            (5, "Password", Some("UsernameToken")) => {
                if let Some(token) = security.username_token.as_mut() {
                    token.password_type = get_attribute(e, "Type");
                }
            }
            _ => {}
        }
    }

    fn start_body_element(&mut self, depth: usize, local_name: &str, namespace: &Option<String>) {
        let analysis = &mut self.body.analysis;
        analysis.element_count += 1;
        // the payload root sits at body depth 1
        let body_depth = (depth - 2) as u32;
        if body_depth > analysis.max_depth {
            analysis.max_depth = body_depth;
        }

        if depth == 3 && self.body.operation.is_none() {
            self.body.operation = Some(local_name.to_string());
            self.body.operation_namespace = namespace.clone();
            self.operation_open = true;
        }
    }

    fn text(&mut self) -> String {
        std::mem::take(&mut self.text).trim().to_string()
    }

    fn end(&mut self) {
        let depth = self.stack.len();
        let text = self.text();
        let Some(frame) = self.stack.pop() else {
            return;
        };

        if self.in_section("Body") {
            if depth == 3 {
                self.operation_open = false;
            } else if depth == 4 && self.operation_open {
                self.body.fields.push(PayloadField {
                    name: frame.local_name,
                    namespace: frame.namespace,
                    value: text,
                });
            }
        } else if self.in_section("Header") && depth == 5 && self.in_security() {
            let parent = self.parent_name().map(str::to_string);
            self.end_security_field(parent.as_deref(), &frame.local_name, text);
        }
    }

    fn end_security_field(&mut self, parent: Option<&str>, local_name: &str, text: String) {
        let Some(security) = self
            .header
            .as_mut()
            .and_then(|h| h.security.as_mut())
        else {
            return;
        };

        match (parent, local_name) {
            (Some("Timestamp"), "Created") => {
                if let Some(ts) = security.timestamp.as_mut() {
                    ts.created = Some(text);
                }
            }
            (Some("Timestamp"), "Expires") => {
                if let Some(ts) = security.timestamp.as_mut() {
                    ts.expires = Some(text);
                }
            }
            (Some("UsernameToken"), "Username") => {
                if let Some(token) = security.username_token.as_mut() {
                    token.username = text;
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> Result<SoapEnvelope, Fault> {
        if let Some(open) = self.stack.last() {
            return Err(Fault::new(
                FaultCode::InvalidXml,
                format!("Unexpected end of document inside '{}'", open.local_name),
            ));
        }

        let version = self.version.ok_or_else(|| {
            Fault::new(
                FaultCode::MissingEnvelope,
                "No valid SOAP Envelope found with recognized namespace",
            )
        })?;

        if !self.has_body {
            return Err(Fault::new(
                FaultCode::MissingEnvelope,
                "SOAP Envelope has no Body",
            ));
        }

        Ok(SoapEnvelope {
            version,
            header: self.header,
            body: self.body,
        })
    }
}

/// Check for XXE attack patterns.
fn check_xxe_patterns(xml: &str) -> Result<(), Fault> {
    let upper = xml.to_ascii_uppercase();

    if upper.contains("<!DOCTYPE") {
        return Err(Fault::new(
            FaultCode::DoctypeDetected,
            "DOCTYPE declarations are not allowed",
        ));
    }

    if upper.contains("<!ENTITY") {
        return Err(Fault::new(
            FaultCode::ExternalEntityDetected,
            "Entity declarations are not allowed",
        ));
    }

    Ok(())
}

fn namespace_uri(resolved: &ResolveResult) -> Option<String> {
    match resolved {
        ResolveResult::Bound(ns) => std::str::from_utf8(ns.as_ref()).ok().map(String::from),
        _ => None,
    }
}

/// Extract local name from element.
fn local_name_str(e: &BytesStart) -> String {
    let name = e.local_name();
    std::str::from_utf8(name.as_ref()).unwrap_or("").to_string()
}

/// Value of an attribute matched by local name, ignoring its prefix.
fn get_attribute(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        let key = attr.key.local_name();
        if key.as_ref() == name.as_bytes() {
            std::str::from_utf8(&attr.value).ok().map(String::from)
        } else {
            None
        }
    })
}

/// Check mustUnderstand attribute.
fn get_must_understand(e: &BytesStart) -> bool {
    get_attribute(e, "mustUnderstand").is_some_and(|v| v == "1" || v == "true")
}

/// Extract SOAPAction from HTTP header value (removes quotes).
pub fn parse_soap_action(header_value: &str) -> String {
    header_value.trim().trim_matches('"').to_string()
}

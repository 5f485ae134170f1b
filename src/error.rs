//! Error types and SOAP Fault generation.

use crate::config::SoapVersion;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Entity endpoint errors.
#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Seed data error: {0}")]
    Seed(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad class of a fault, as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Client-supplied data failed structural validation
    MalformedRequest,
    /// Valid request, no matching record
    NotFound,
    /// Unexpected store or mapper failure
    InternalFailure,
}

/// Fault codes carried in the fault detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultCode {
    /// Content-Type is not a SOAP content type
    InvalidContentType,
    /// Body larger than the configured maximum
    BodyTooLarge,
    /// Invalid XML syntax
    InvalidXml,
    /// Missing SOAP envelope
    MissingEnvelope,
    /// Unsupported SOAP version
    UnsupportedVersion,
    /// Body depth exceeded
    BodyDepthExceeded,
    /// DOCTYPE detected (XXE)
    DoctypeDetected,
    /// Entity declaration or external reference detected (XXE)
    ExternalEntityDetected,
    /// WS-Security header missing or unacceptable
    SecurityHeaderRejected,
    /// Header block flagged mustUnderstand that no processor handles
    MustUnderstand,
    /// Empty SOAP body
    MissingOperation,
    /// No route for the payload root
    UnknownOperation,
    /// SOAPAction header required but absent
    MissingSoapAction,
    /// SOAPAction does not match the routed operation
    SoapActionMismatch,
    /// Payload fields absent or of the wrong type
    MalformedRequest,
    /// No entity with the requested id
    EntityNotFound,
    /// Unexpected failure behind the endpoint
    InternalFailure,
}

impl FaultCode {
    /// Get the string code for this fault.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidContentType => "INVALID_CONTENT_TYPE",
            Self::BodyTooLarge => "BODY_TOO_LARGE",
            Self::InvalidXml => "INVALID_XML",
            Self::MissingEnvelope => "MISSING_ENVELOPE",
            Self::UnsupportedVersion => "UNSUPPORTED_VERSION",
            Self::BodyDepthExceeded => "BODY_DEPTH_EXCEEDED",
            Self::DoctypeDetected => "DOCTYPE_DETECTED",
            Self::ExternalEntityDetected => "EXTERNAL_ENTITY_DETECTED",
            Self::SecurityHeaderRejected => "SECURITY_HEADER_REJECTED",
            Self::MustUnderstand => "MUST_UNDERSTAND",
            Self::MissingOperation => "MISSING_OPERATION",
            Self::UnknownOperation => "UNKNOWN_OPERATION",
            Self::MissingSoapAction => "MISSING_SOAP_ACTION",
            Self::SoapActionMismatch => "SOAP_ACTION_MISMATCH",
            Self::MalformedRequest => "MALFORMED_REQUEST",
            Self::EntityNotFound => "ENTITY_NOT_FOUND",
            Self::InternalFailure => "INTERNAL_FAILURE",
        }
    }

    /// Classify this code.
    pub fn class(&self) -> FaultClass {
        match self {
            Self::EntityNotFound => FaultClass::NotFound,
            Self::InternalFailure => FaultClass::InternalFailure,
            _ => FaultClass::MalformedRequest,
        }
    }
}

/// A structured fault produced while handling one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    /// Fault code
    pub code: FaultCode,
    /// Human-readable message
    pub message: String,
    /// Element path or field hint (if available)
    pub location: Option<String>,
}

impl Fault {
    /// Create a new fault.
    pub fn new(code: FaultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
        }
    }

    /// Create a fault with location.
    pub fn with_location(
        code: FaultCode,
        message: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            location: Some(location.into()),
        }
    }

    /// Fault for a request payload that failed mapping.
    pub fn malformed(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::with_location(FaultCode::MalformedRequest, message, field)
    }

    /// Generic internal fault. The cause is logged, never sent.
    pub fn internal() -> Self {
        Self::new(FaultCode::InternalFailure, "Internal server error")
    }
}

/// Generate a SOAP Fault envelope.
pub fn soap_fault_response(fault: &Fault, soap_version: Option<SoapVersion>) -> String {
    match soap_version.unwrap_or(SoapVersion::Soap11) {
        SoapVersion::Soap11 => soap_11_fault(fault),
        SoapVersion::Soap12 => soap_12_fault(fault),
    }
}

fn fault_detail(fault: &Fault) -> String {
    let location = fault
        .location
        .as_deref()
        .map(|l| format!(" location=\"{}\"", xml_escape(l)))
        .unwrap_or_default();

    format!(
        "<ws:fault xmlns:ws=\"urn:soap-entity-endpoint:fault\" code=\"{}\"{}>{}</ws:fault>",
        fault.code.as_str(),
        location,
        xml_escape(&fault.message)
    )
}

fn soap_11_fault(fault: &Fault) -> String {
    let fault_code = match (fault.code, fault.code.class()) {
        (FaultCode::MustUnderstand, _) => "soap:MustUnderstand",
        (_, FaultClass::InternalFailure) => "soap:Server",
        _ => "soap:Client",
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <soap:Fault>
      <faultcode>{}</faultcode>
      <faultstring>[{}] {}</faultstring>
      <detail>
        {}
      </detail>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        fault_code,
        fault.code.as_str(),
        xml_escape(&fault.message),
        fault_detail(fault)
    )
}

fn soap_12_fault(fault: &Fault) -> String {
    let code_value = match (fault.code, fault.code.class()) {
        (FaultCode::MustUnderstand, _) => "soap:MustUnderstand",
        (_, FaultClass::InternalFailure) => "soap:Receiver",
        _ => "soap:Sender",
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <soap:Fault>
      <soap:Code>
        <soap:Value>{}</soap:Value>
      </soap:Code>
      <soap:Reason>
        <soap:Text xml:lang="en">[{}] {}</soap:Text>
      </soap:Reason>
      <soap:Detail>
        {}
      </soap:Detail>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        code_value,
        fault.code.as_str(),
        xml_escape(&fault.message),
        fault_detail(fault)
    )
}

pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

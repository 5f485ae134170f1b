//! Mapping between wire payloads and domain calls.
//!
//! Wire types are kept apart from [`EntityRecord`]: the mapper copies fields
//! explicitly in both directions.

use crate::config::{ServiceConfig, SoapVersion};
use crate::error::{xml_escape, Fault};
use crate::parser::SoapBody;
use crate::store::EntityRecord;

/// Name of the payload field carrying the entity id.
pub const ID_FIELD: &str = "id";

/// Domain request for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupRequest {
    pub id: u64,
}

/// Wire representation of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEntity {
    pub id: u64,
    pub name: String,
}

/// Wire response to a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResponse {
    pub entity: WireEntity,
}

/// Extract a typed lookup request from the payload.
pub fn to_domain_request(body: &SoapBody) -> Result<LookupRequest, Fault> {
    let raw = body
        .field(ID_FIELD)
        .ok_or_else(|| Fault::malformed("Required field 'id' is missing", ID_FIELD))?;

    if raw.is_empty() {
        return Err(Fault::malformed("Field 'id' is empty", ID_FIELD));
    }

    match raw.parse::<u64>() {
        Ok(id) => Ok(LookupRequest { id }),
        Err(_) if is_negative_integer(raw) => Err(Fault::malformed(
            format!("Field 'id' must be non-negative, got {}", raw),
            ID_FIELD,
        )),
        Err(_) => Err(Fault::malformed(
            format!("Field 'id' is not an integer: '{}'", raw),
            ID_FIELD,
        )),
    }
}

fn is_negative_integer(raw: &str) -> bool {
    raw.strip_prefix('-')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Copy a domain record into its wire representation.
pub fn to_wire_response(record: &EntityRecord) -> LookupResponse {
    LookupResponse {
        entity: WireEntity {
            id: record.id,
            name: record.name.clone(),
        },
    }
}

impl LookupResponse {
    /// Serialize the response payload, without the envelope.
    pub fn payload_xml(&self, service: &ServiceConfig) -> String {
        format!(
            "<ent:{element} xmlns:ent=\"{ns}\"><ent:entity><ent:id>{id}</ent:id><ent:name>{name}</ent:name></ent:entity></ent:{element}>",
            element = service.response_element,
            ns = xml_escape(&service.namespace),
            id = self.entity.id,
            name = xml_escape(&self.entity.name),
        )
    }

    /// Serialize the response inside a SOAP envelope.
    pub fn to_xml(&self, service: &ServiceConfig, version: SoapVersion) -> String {
        soap_envelope(version, &self.payload_xml(service))
    }
}

/// Wrap a payload in a SOAP envelope of the given version.
pub fn soap_envelope(version: SoapVersion, payload: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{}">
  <soap:Body>
    {}
  </soap:Body>
</soap:Envelope>"#,
        version.namespace(),
        payload
    )
}

//! Configuration types for the entity endpoint.

use crate::error::EndpointError;
use crate::store::EntityRecord;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the entity endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Config version
    pub version: String,

    /// General request handling settings
    pub settings: SettingsConfig,

    /// Envelope validation configuration
    pub envelope: EnvelopeConfig,

    /// Wire contract of the entity service
    pub service: ServiceConfig,

    /// WS-Security header interceptor configuration
    pub ws_security: WsSecurityConfig,

    /// Entity store seeding
    pub store: StoreConfig,

    /// HTTP transport
    pub server: ServerConfig,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: SettingsConfig::default(),
            envelope: EnvelopeConfig::default(),
            service: ServiceConfig::default(),
            ws_security: WsSecurityConfig::default(),
            store: StoreConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl EndpointConfig {
    /// Check the values serde cannot check for us.
    pub fn validate(&self) -> Result<(), EndpointError> {
        if self.settings.max_body_size == 0 {
            return Err(EndpointError::Config(
                "settings.max_body_size must be greater than zero".to_string(),
            ));
        }
        if self.envelope.allowed_versions.is_empty() {
            return Err(EndpointError::Config(
                "envelope.allowed_versions must list at least one SOAP version".to_string(),
            ));
        }

        let service = &self.service;
        for (field, value) in [
            ("service.namespace", &service.namespace),
            ("service.request_element", &service.request_element),
            ("service.response_element", &service.response_element),
        ] {
            if value.trim().is_empty() {
                return Err(EndpointError::Config(format!("{} must not be empty", field)));
            }
        }

        if !self.server.path.starts_with('/') {
            return Err(EndpointError::Config(format!(
                "server.path '{}' must start with '/'",
                self.server.path
            )));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(EndpointError::Config(
                "server.request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Maximum request body size to process (bytes)
    pub max_body_size: usize,

    /// Allowed Content-Type headers for SOAP requests
    pub allowed_content_types: Vec<String>,

    /// Fault requests that carry no SOAPAction header
    pub require_soap_action: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1_048_576, // 1MB
            allowed_content_types: vec![
                "text/xml".to_string(),
                "application/soap+xml".to_string(),
            ],
            require_soap_action: false,
        }
    }
}

/// SOAP envelope validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Allowed SOAP versions
    pub allowed_versions: Vec<SoapVersion>,

    /// Maximum nesting depth in SOAP Body
    pub max_body_depth: u32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            allowed_versions: vec![SoapVersion::Soap11, SoapVersion::Soap12],
            max_body_depth: 20,
        }
    }
}

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    /// Envelope namespace URI for this version.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Soap11 => crate::parser::SOAP_11_NS,
            Self::Soap12 => crate::parser::SOAP_12_NS,
        }
    }

    /// HTTP Content-Type used for messages of this version.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml; charset=utf-8",
            Self::Soap12 => "application/soap+xml; charset=utf-8",
        }
    }
}

/// Wire contract of the entity lookup operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Namespace of the request and response payloads
    pub namespace: String,

    /// Local name of the request payload root
    pub request_element: String,

    /// Local name of the response payload root
    pub response_element: String,

    /// SOAPAction bound to the operation
    pub soap_action: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            namespace: "http://example.org/ws/entity".to_string(),
            request_element: "getEntityRequest".to_string(),
            response_element: "getEntityResponse".to_string(),
            soap_action: Some("http://example.org/ws/entity/getEntity".to_string()),
        }
    }
}

/// WS-Security header interceptor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsSecurityConfig {
    /// Install the WS-Security header interceptor
    pub enabled: bool,

    /// Require timestamp in Security header
    pub require_timestamp: bool,

    /// Maximum timestamp age in seconds (for replay prevention)
    pub max_timestamp_age_secs: u64,

    /// Require username token
    pub require_username_token: bool,

    /// Allowed username token password types
    pub allowed_password_types: Vec<PasswordType>,
}

impl Default for WsSecurityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            require_timestamp: false,
            max_timestamp_age_secs: 300, // 5 minutes
            require_username_token: false,
            allowed_password_types: vec![PasswordType::PasswordDigest],
        }
    }
}

/// WS-Security UsernameToken password types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordType {
    /// Plain text password
    #[serde(rename = "PasswordText")]
    PasswordText,
    /// Digested password (SHA-1 with nonce and timestamp)
    #[serde(rename = "PasswordDigest")]
    PasswordDigest,
}

impl PasswordType {
    /// Whether a password `Type` URI names this password type.
    pub fn matches(&self, type_uri: &str) -> bool {
        match self {
            Self::PasswordText => type_uri.ends_with("PasswordText"),
            Self::PasswordDigest => type_uri.ends_with("PasswordDigest"),
        }
    }
}

/// Entity store seeding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Records declared inline
    pub entities: Vec<EntityRecord>,

    /// YAML or JSON file with additional records
    pub seed_file: Option<PathBuf>,
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub listen_address: String,

    /// Path the endpoint is mounted on
    pub path: String,

    /// Per-request timeout
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8080".to_string(),
            path: "/ws".to_string(),
            request_timeout_secs: 30,
        }
    }
}

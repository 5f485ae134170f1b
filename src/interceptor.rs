//! Request interceptors.
//!
//! Interceptors see the parsed envelope after structural validation and
//! before the route handler runs. Any fault they return ends the call.

use crate::config::WsSecurityConfig;
use crate::error::{Fault, FaultCode};
use crate::parser::{SecurityTimestamp, SoapEnvelope, UsernameToken};
use chrono::{DateTime, Duration, Utc};

/// Pre-dispatch check over an inbound envelope.
pub trait Interceptor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Accept the envelope or reject it with a fault.
    fn handle_request(&self, envelope: &SoapEnvelope) -> Result<(), Fault>;
}

/// Clock skew tolerated on `Created` timestamps.
const FUTURE_TOLERANCE_SECS: i64 = 300;

/// Structural WS-Security header checks.
///
/// Verifies the presence and freshness of the security header parts. It does
/// not verify signatures or decrypt anything.
pub struct WsSecurityInterceptor {
    config: WsSecurityConfig,
}

impl WsSecurityInterceptor {
    pub fn new(config: WsSecurityConfig) -> Self {
        Self { config }
    }

    fn check_timestamp(&self, timestamp: &SecurityTimestamp, now: DateTime<Utc>) -> Result<(), Fault> {
        let created = timestamp.created.as_deref().ok_or_else(|| {
            rejected("Timestamp has no Created element")
        })?;
        let created = parse_instant(created, "Created")?;

        let age = now.signed_duration_since(created);
        let max_age = Duration::seconds(self.config.max_timestamp_age_secs as i64);
        if age > max_age {
            return Err(rejected(format!(
                "Timestamp is too old: {} seconds (max: {})",
                age.num_seconds(),
                self.config.max_timestamp_age_secs
            )));
        }
        if age < -Duration::seconds(FUTURE_TOLERANCE_SECS) {
            return Err(rejected("Timestamp is in the future"));
        }

        if let Some(expires) = timestamp.expires.as_deref() {
            if now > parse_instant(expires, "Expires")? {
                return Err(rejected("Security timestamp has expired"));
            }
        }

        Ok(())
    }

    fn check_username_token(&self, token: &UsernameToken) -> Result<(), Fault> {
        if token.username.is_empty() {
            return Err(rejected("UsernameToken has no Username"));
        }

        if let Some(ref pw_type) = token.password_type {
            let allowed = self
                .config
                .allowed_password_types
                .iter()
                .any(|t| t.matches(pw_type));
            if !allowed {
                return Err(rejected(format!("Password type '{}' is not allowed", pw_type)));
            }
        }

        Ok(())
    }

    fn check_at(&self, envelope: &SoapEnvelope, now: DateTime<Utc>) -> Result<(), Fault> {
        let security = envelope
            .header
            .as_ref()
            .and_then(|h| h.security.as_ref())
            .ok_or_else(|| rejected("WS-Security header is required but not present"))?;

        if self.config.require_timestamp {
            let timestamp = security.timestamp.as_ref().ok_or_else(|| {
                rejected("Timestamp is required in WS-Security header but not present")
            })?;
            self.check_timestamp(timestamp, now)?;
        }

        if self.config.require_username_token {
            let token = security
                .username_token
                .as_ref()
                .ok_or_else(|| rejected("UsernameToken is required but not present"))?;
            self.check_username_token(token)?;
        }

        Ok(())
    }
}

impl Interceptor for WsSecurityInterceptor {
    fn name(&self) -> &'static str {
        "ws-security"
    }

    fn handle_request(&self, envelope: &SoapEnvelope) -> Result<(), Fault> {
        self.check_at(envelope, Utc::now())
    }
}

fn rejected(message: impl Into<String>) -> Fault {
    Fault::with_location(FaultCode::SecurityHeaderRejected, message, "Header/Security")
}

fn parse_instant(value: &str, element: &str) -> Result<DateTime<Utc>, Fault> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| rejected(format!("Invalid {} timestamp format: {}", element, value)))
}

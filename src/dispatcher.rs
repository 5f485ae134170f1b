//! Endpoint dispatcher.
//!
//! Binds inbound messages to registered routes by payload root and
//! SOAPAction, and turns handler results into SOAP responses or faults.

use crate::config::{EndpointConfig, SoapVersion};
use crate::error::{soap_fault_response, Fault, FaultClass, FaultCode};
use crate::interceptor::{Interceptor, WsSecurityInterceptor};
use crate::parser::{parse_soap_action, parse_soap_envelope, SoapBody, SoapEnvelope};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Route handler: payload in, serialized response envelope out.
pub type Handler = Arc<dyn Fn(&SoapBody, SoapVersion) -> Result<String, Fault> + Send + Sync>;

/// Payload root a route answers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub namespace: String,
    pub local_part: String,
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local_part)
    }
}

/// One operation bound to the dispatcher.
#[derive(Clone)]
pub struct Route {
    key: RouteKey,
    action: Option<String>,
    handler: Handler,
}

impl Route {
    pub fn new<F>(
        namespace: impl Into<String>,
        local_part: impl Into<String>,
        action: Option<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(&SoapBody, SoapVersion) -> Result<String, Fault> + Send + Sync + 'static,
    {
        Self {
            key: RouteKey {
                namespace: namespace.into(),
                local_part: local_part.into(),
            },
            action,
            handler: Arc::new(handler),
        }
    }

    pub fn key(&self) -> &RouteKey {
        &self.key
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }
}

/// A decoded inbound message, as handed over by the transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct InboundMessage<'a> {
    /// Content-Type header
    pub content_type: Option<&'a str>,
    /// SOAPAction header, raw
    pub soap_action: Option<&'a str>,
    /// Request body
    pub body: &'a [u8],
}

/// Lifecycle of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Validating,
    Dispatched,
    Responded,
    Faulted,
}

impl DispatchState {
    /// Whether `next` may follow this state.
    pub fn can_advance_to(self, next: DispatchState) -> bool {
        use DispatchState::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Dispatched)
                | (Validating, Faulted)
                | (Dispatched, Responded)
                | (Dispatched, Faulted)
        )
    }

    fn advance(self, next: DispatchState) -> DispatchState {
        debug_assert!(
            self.can_advance_to(next),
            "invalid dispatch transition {:?} -> {:?}",
            self,
            next
        );
        next
    }
}

/// Result of dispatching one message.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Terminal state, `Responded` or `Faulted`
    pub state: DispatchState,
    /// HTTP status to send
    pub status: u16,
    /// Content-Type to send
    pub content_type: &'static str,
    /// Serialized envelope
    pub body: String,
    /// Fault, when faulted
    pub fault: Option<Fault>,
    /// Routed operation, when one was found
    pub operation: Option<String>,
}

impl DispatchOutcome {
    pub fn is_fault(&self) -> bool {
        self.state == DispatchState::Faulted
    }
}

/// Counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherMetrics {
    pub requests_processed: u64,
    pub faults_returned: u64,
}

/// Routes inbound SOAP messages to their handlers.
pub struct EndpointDispatcher {
    config: EndpointConfig,
    routes: HashMap<RouteKey, Route>,
    interceptors: Vec<Box<dyn Interceptor>>,
    requests_processed: AtomicU64,
    faults_returned: AtomicU64,
}

impl EndpointDispatcher {
    /// Create a dispatcher with no routes. The WS-Security interceptor is
    /// installed when the configuration enables it.
    pub fn new(config: EndpointConfig) -> Self {
        let mut interceptors: Vec<Box<dyn Interceptor>> = Vec::new();
        if config.ws_security.enabled {
            interceptors.push(Box::new(WsSecurityInterceptor::new(
                config.ws_security.clone(),
            )));
        }

        Self {
            config,
            routes: HashMap::new(),
            interceptors,
            requests_processed: AtomicU64::new(0),
            faults_returned: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Bind a route. A route with the same payload root is replaced.
    pub fn register(&mut self, route: Route) {
        info!(
            operation = %route.key,
            action = ?route.action,
            "Registered endpoint route"
        );
        self.routes.insert(route.key.clone(), route);
    }

    /// Append a request interceptor. Interceptors run in insertion order.
    pub fn add_interceptor(&mut self, interceptor: Box<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn metrics(&self) -> DispatcherMetrics {
        DispatcherMetrics {
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
            faults_returned: self.faults_returned.load(Ordering::Relaxed),
        }
    }

    /// Check if Content-Type is valid for SOAP.
    fn is_valid_content_type(&self, content_type: Option<&str>) -> bool {
        match content_type {
            Some(ct) => {
                let ct_lower = ct.to_lowercase();
                self.config
                    .settings
                    .allowed_content_types
                    .iter()
                    .any(|allowed| ct_lower.contains(&allowed.to_lowercase()))
            }
            None => false,
        }
    }

    fn check_content_type(&self, content_type: Option<&str>) -> Result<(), Fault> {
        if !self.is_valid_content_type(content_type) {
            return Err(Fault::new(
                FaultCode::InvalidContentType,
                format!(
                    "Content-Type {:?} is not a SOAP content type",
                    content_type.unwrap_or("")
                ),
            ));
        }
        Ok(())
    }

    /// Checks that need nothing but the raw message.
    fn check_transport(&self, message: &InboundMessage<'_>) -> Result<(), Fault> {
        self.check_content_type(message.content_type)?;

        let max = self.config.settings.max_body_size;
        if message.body.len() > max {
            return Err(Fault::new(
                FaultCode::BodyTooLarge,
                format!(
                    "Request body size {} exceeds maximum {}",
                    message.body.len(),
                    max
                ),
            ));
        }

        Ok(())
    }

    /// Envelope validation, interceptors, routing and SOAPAction binding.
    fn check_envelope(
        &self,
        envelope: &SoapEnvelope,
        message: &InboundMessage<'_>,
    ) -> Result<&Route, Fault> {
        let config = &self.config.envelope;

        if !config.allowed_versions.contains(&envelope.version) {
            return Err(Fault::new(
                FaultCode::UnsupportedVersion,
                format!(
                    "SOAP version {:?} not allowed, allowed versions: {:?}",
                    envelope.version, config.allowed_versions
                ),
            ));
        }

        if envelope.body.analysis.max_depth > config.max_body_depth {
            return Err(Fault::new(
                FaultCode::BodyDepthExceeded,
                format!(
                    "SOAP Body nesting depth {} exceeds maximum {}",
                    envelope.body.analysis.max_depth, config.max_body_depth
                ),
            ));
        }

        if let Some(block) = envelope
            .header
            .iter()
            .flat_map(|h| h.elements.iter())
            .find(|e| e.must_understand)
        {
            return Err(Fault::with_location(
                FaultCode::MustUnderstand,
                format!(
                    "Header block {{{}}}{} is marked mustUnderstand but is not understood",
                    block.namespace.as_deref().unwrap_or(""),
                    block.local_name
                ),
                format!("Header/{}", block.local_name),
            ));
        }

        for interceptor in &self.interceptors {
            interceptor.handle_request(envelope).inspect_err(|fault| {
                debug!(
                    interceptor = interceptor.name(),
                    code = fault.code.as_str(),
                    "Interceptor rejected request"
                );
            })?;
        }

        let local_part = envelope.body.operation.clone().ok_or_else(|| {
            Fault::new(FaultCode::MissingOperation, "SOAP Body carries no payload")
        })?;
        let key = RouteKey {
            namespace: envelope.body.operation_namespace.clone().unwrap_or_default(),
            local_part,
        };
        let route = self.routes.get(&key).ok_or_else(|| {
            Fault::with_location(
                FaultCode::UnknownOperation,
                format!("No endpoint mapped for payload {}", key),
                key.to_string(),
            )
        })?;

        let action = message
            .soap_action
            .map(parse_soap_action)
            .or_else(|| message.content_type.and_then(action_from_content_type))
            .filter(|a| !a.is_empty());

        match (action.as_deref(), route.action()) {
            (None, _) if self.config.settings.require_soap_action => Err(Fault::new(
                FaultCode::MissingSoapAction,
                "SOAPAction header is required but not present",
            )),
            (Some(actual), Some(expected)) if actual != expected => {
                warn!(
                    soap_action = actual,
                    expected = expected,
                    "SOAPAction mismatch with routed operation"
                );
                Err(Fault::new(
                    FaultCode::SoapActionMismatch,
                    format!(
                        "SOAPAction '{}' does not match operation {} ('{}')",
                        actual, key, expected
                    ),
                ))
            }
            _ => Ok(route),
        }
    }

    /// Handle one inbound message.
    pub fn dispatch(&self, message: &InboundMessage<'_>) -> DispatchOutcome {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
        let state = DispatchState::Idle.advance(DispatchState::Validating);

        debug!(
            content_type = ?message.content_type,
            soap_action = ?message.soap_action,
            body_size = message.body.len(),
            "Processing SOAP request"
        );

        if let Err(fault) = self.check_transport(message) {
            return self.faulted(state, fault, None, None);
        }

        let envelope = match parse_soap_envelope(message.body) {
            Ok(env) => env,
            Err(fault) => return self.faulted(state, fault, None, None),
        };

        let route = match self.check_envelope(&envelope, message) {
            Ok(route) => route,
            Err(fault) => {
                return self.faulted(state, fault, Some(envelope.version), None);
            }
        };

        let operation = route.key.local_part.clone();
        let state = state.advance(DispatchState::Dispatched);
        debug!(operation = %operation, "Dispatching to endpoint");

        match (route.handler)(&envelope.body, envelope.version) {
            Ok(body) => {
                debug!(operation = %operation, "SOAP request answered");
                DispatchOutcome {
                    state: state.advance(DispatchState::Responded),
                    status: 200,
                    content_type: envelope.version.content_type(),
                    body,
                    fault: None,
                    operation: Some(operation),
                }
            }
            Err(fault) => self.faulted(state, fault, Some(envelope.version), Some(operation)),
        }
    }

    /// Fault a message whose body never reached [`dispatch`](Self::dispatch),
    /// such as one cut off by the transport for exceeding the size limit.
    /// The Content-Type check still runs first.
    pub fn reject(&self, content_type: Option<&str>, fault: Fault) -> DispatchOutcome {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
        let state = DispatchState::Idle.advance(DispatchState::Validating);

        let fault = self.check_content_type(content_type).err().unwrap_or(fault);
        self.faulted(state, fault, None, None)
    }

    fn faulted(
        &self,
        state: DispatchState,
        fault: Fault,
        version: Option<SoapVersion>,
        operation: Option<String>,
    ) -> DispatchOutcome {
        self.faults_returned.fetch_add(1, Ordering::Relaxed);

        match fault.code.class() {
            FaultClass::InternalFailure => error!(
                operation = ?operation,
                code = fault.code.as_str(),
                message = %fault.message,
                "SOAP request failed"
            ),
            _ => warn!(
                operation = ?operation,
                code = fault.code.as_str(),
                message = %fault.message,
                "SOAP request faulted"
            ),
        }

        let version = version.unwrap_or(SoapVersion::Soap11);
        DispatchOutcome {
            state: state.advance(DispatchState::Faulted),
            status: 500,
            content_type: version.content_type(),
            body: soap_fault_response(&fault, Some(version)),
            fault: Some(fault),
            operation,
        }
    }
}

/// SOAP 1.2 carries the action as a Content-Type parameter.
fn action_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("action") {
            Some(parse_soap_action(value))
        } else {
            None
        }
    })
}

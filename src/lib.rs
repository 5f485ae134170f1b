//! SOAP entity lookup endpoint.
//!
//! Answers `getEntityRequest` messages with the data of the stored entity,
//! or with a SOAP Fault whose detail code tells a malformed request apart
//! from an unknown id.
//!
//! # Features
//!
//! - SOAP 1.1 / 1.2 envelope parsing with XXE rejection
//! - Explicit route table keyed by payload root, with SOAPAction binding
//! - Typed request mapping with field-by-field response construction
//! - Pluggable request interceptors, including WS-Security header checks
//! - Axum HTTP transport
//!
//! # Example
//!
//! ```ignore
//! use soap_entity_endpoint::{EndpointConfig, EndpointDispatcher, EntityEndpoint};
//!
//! let config = EndpointConfig::default();
//! let mut dispatcher = EndpointDispatcher::new(config.clone());
//! EntityEndpoint::new(store).register(&mut dispatcher, &config.service);
//! SoapServer::new(Arc::new(dispatcher)).run(listener).await?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod interceptor;
pub mod mapper;
pub mod parser;
pub mod server;
pub mod store;

pub use config::EndpointConfig;
pub use dispatcher::{DispatchOutcome, DispatchState, EndpointDispatcher, InboundMessage, Route};
pub use endpoint::EntityEndpoint;
pub use error::{EndpointError, Fault, FaultCode};
pub use server::SoapServer;
pub use store::{EntityRecord, EntityStore, InMemoryEntityStore, StoreError};

//! Entity lookup endpoint.

use crate::config::ServiceConfig;
use crate::dispatcher::{EndpointDispatcher, Route};
use crate::error::{Fault, FaultCode};
use crate::mapper::{to_domain_request, to_wire_response, LookupResponse};
use crate::parser::SoapBody;
use crate::store::{EntityStore, StoreError};
use std::sync::Arc;
use tracing::{debug, error};

/// Receives a request with the id of a single entity and answers with that
/// entity's data.
pub struct EntityEndpoint {
    store: Arc<dyn EntityStore>,
}

impl EntityEndpoint {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Handle one `getEntityRequest` payload.
    pub fn get_entity(&self, body: &SoapBody) -> Result<LookupResponse, Fault> {
        let request = to_domain_request(body)?;

        debug!(entity_id = request.id, "Received request for entity");

        let entity = self.store.find_by_id(request.id).map_err(|e| match e {
            StoreError::NotFound(id) => Fault::with_location(
                FaultCode::EntityNotFound,
                format!("No entity with id {}", id),
                "id",
            ),
            StoreError::Unavailable(ref reason) => {
                error!(entity_id = request.id, reason = %reason, "Entity store failure");
                Fault::internal()
            }
        })?;

        debug!(entity_id = entity.id, name = %entity.name, "Found entity");

        Ok(to_wire_response(&entity))
    }

    /// Register the lookup operation on a dispatcher.
    pub fn register(self, dispatcher: &mut EndpointDispatcher, service: &ServiceConfig) {
        let endpoint = Arc::new(self);
        let response_service = service.clone();

        dispatcher.register(Route::new(
            service.namespace.clone(),
            service.request_element.clone(),
            service.soap_action.clone(),
            move |body, version| {
                endpoint
                    .get_entity(body)
                    .map(|response| response.to_xml(&response_service, version))
            },
        ));
    }
}

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::identity::EndpointRecord;
use crate::error::ConstructionError;

/// Endpoints known to the engine, keyed by the id upstream events target.
pub struct EndpointRegistry {
    adapter_id: String,
    endpoints: RwLock<HashMap<String, EndpointRecord>>,
}

impl EndpointRegistry {
    pub fn new(adapter_id: impl Into<String>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    pub fn adapter_id(&self) -> &str {
        &self.adapter_id
    }

    /// Add or replace an endpoint. Records of another adapter are rejected.
    pub fn register(&self, record: EndpointRecord) -> Result<Option<EndpointRecord>, ConstructionError> {
        record.ensure_adapter(&self.adapter_id)?;
        let mut endpoints = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
        Ok(endpoints.insert(record.id.clone(), record))
    }

    pub fn get(&self, id: &str) -> Option<EndpointRecord> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &str) -> Option<EndpointRecord> {
        self.endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

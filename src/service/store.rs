// src/service/store.rs

//! Service persistence boundary.
//!
//! Mirrors the graph store: an explicit interface injected into the
//! registry, with the in-memory implementation the daemon ships with.

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::errors::{ProcdagError, Result};
use crate::service::model::ServiceDefinition;

pub trait ServiceStore: Send + Sync {
    fn insert(&self, def: ServiceDefinition) -> Result<()>;
    fn get(&self, id: Uuid) -> Result<ServiceDefinition>;
    fn list(&self) -> Vec<ServiceDefinition>;
    fn replace(&self, def: ServiceDefinition) -> Result<()>;
    fn remove(&self, id: Uuid) -> Result<()>;

    /// Whether `name` is already used by a service other than `excluding`.
    fn name_taken(&self, name: &str, excluding: Option<Uuid>) -> bool;
}

#[derive(Debug, Default)]
pub struct MemoryServiceStore {
    services: Mutex<HashMap<Uuid, ServiceDefinition>>,
}

impl MemoryServiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServiceStore for MemoryServiceStore {
    fn insert(&self, def: ServiceDefinition) -> Result<()> {
        self.services.lock().insert(def.id, def);
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<ServiceDefinition> {
        self.services
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| ProcdagError::NotFound(format!("service {id}")))
    }

    fn list(&self) -> Vec<ServiceDefinition> {
        let mut all: Vec<ServiceDefinition> =
            self.services.lock().values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    fn replace(&self, def: ServiceDefinition) -> Result<()> {
        let mut services = self.services.lock();
        if !services.contains_key(&def.id) {
            return Err(ProcdagError::NotFound(format!("service {}", def.id)));
        }
        services.insert(def.id, def);
        Ok(())
    }

    fn remove(&self, id: Uuid) -> Result<()> {
        self.services
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ProcdagError::NotFound(format!("service {id}")))
    }

    fn name_taken(&self, name: &str, excluding: Option<Uuid>) -> bool {
        self.services
            .lock()
            .values()
            .any(|def| def.name() == name && Some(def.id) != excluding)
    }
}

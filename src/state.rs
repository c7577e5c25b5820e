use std::sync::Arc;

use crate::services::{CredentialService, SessionService, ShiftService};
use crate::store::Store;

/// Shared application state: one store backing, services built on demand
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn credentials(&self) -> CredentialService {
        CredentialService::new(self.store.clone())
    }

    pub fn sessions(&self) -> SessionService {
        SessionService::new(self.store.clone())
    }

    pub fn shifts(&self) -> ShiftService {
        ShiftService::new(self.store.clone())
    }
}

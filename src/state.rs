use std::sync::Arc;

use crate::auth::{AuthPort, AuthUser};
use crate::persistence::PersistencePort;
use crate::services::UsageRecorder;
use crate::store::TaskStore;

#[derive(Clone)]
pub struct AppState {
    pub persistence: Arc<dyn PersistencePort>,
    pub auth: Arc<dyn AuthPort>,
    pub usage: Arc<dyn UsageRecorder>,
}

impl AppState {
    /// A fresh, unloaded store scoped to the signed-in user.
    pub fn store_for(&self, user: &AuthUser) -> TaskStore {
        TaskStore::new(user.id.clone(), self.persistence.clone(), self.usage.clone())
    }
}

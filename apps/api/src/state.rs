use std::sync::Arc;

use crate::access::AccessPolicy;
use crate::store::AdherenceStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Pluggable persistence. Default: PgStore.
    pub store: Arc<dyn AdherenceStore>,
    /// Capability grants loaded from ADMIN_USER_IDS.
    pub access: AccessPolicy,
}

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

/// Mints resource ids and tracks the `ResourceType/id → fullUrl` mapping
/// used when a bundle is assembled.
///
/// Ids have the form `{lowercase-resource}-{8-hex}` (a shortened UUIDv4),
/// e.g. `patient-1f3a9c2d`. One manager lives per request; the interior
/// mutex only guards against the map being used from a handler that fans
/// out, not cross-request sharing.
#[derive(Debug, Default)]
pub struct ReferenceManager {
    full_urls: Mutex<HashMap<String, String>>,
}

impl ReferenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh id for a resource type.
    pub fn mint_id(&self, resource_type: &str) -> String {
        let uuid = Uuid::new_v4().simple().to_string();
        format!("{}-{}", resource_type.to_lowercase(), &uuid[..8])
    }

    /// Canonical `ResourceType/id` reference string.
    pub fn reference(&self, resource_type: &str, id: &str) -> String {
        format!("{}/{}", resource_type, id)
    }

    /// Register the bundle-internal fullUrl for a resource. Called by the
    /// assembler during entry construction.
    pub fn register_full_url(&self, resource_type: &str, id: &str, full_url: &str) {
        self.full_urls
            .lock()
            .unwrap()
            .insert(self.reference(resource_type, id), full_url.to_string());
    }

    /// Resolve a canonical reference to its registered fullUrl, if any.
    pub fn full_url_for(&self, reference: &str) -> Option<String> {
        self.full_urls.lock().unwrap().get(reference).cloned()
    }

    /// Snapshot of the full mapping, for the assembler's rewrite pass.
    pub fn full_url_map(&self) -> HashMap<String, String> {
        self.full_urls.lock().unwrap().clone()
    }
}

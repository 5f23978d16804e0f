// Resource ownership lookup - injected collaborator
//
// The underlying resources (pod files, context entries) live in the host
// application. The registry only asks one question: does this resource
// exist and does the caller own it?

use crate::identity::UserId;
use crate::sharing::model::ResourceType;
use std::collections::HashSet;

/// Answers existence/ownership questions about underlying resources
pub trait ResourceOwnershipLookup: Send + Sync {
    fn exists(&self, resource_type: ResourceType, resource_id: &str, owner: &UserId) -> bool;
}

/// Lookup backed by a static set of (type, id, owner) tuples
#[derive(Default)]
pub struct StaticOwnershipLookup {
    entries: HashSet<(ResourceType, String, UserId)>,
}

impl StaticOwnershipLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource as existing and owned by `owner`
    pub fn insert(&mut self, resource_type: ResourceType, resource_id: &str, owner: &UserId) {
        self.entries
            .insert((resource_type, resource_id.to_string(), owner.clone()));
    }

    pub fn with_entry(mut self, resource_type: ResourceType, resource_id: &str, owner: &UserId) -> Self {
        self.insert(resource_type, resource_id, owner);
        self
    }
}

impl ResourceOwnershipLookup for StaticOwnershipLookup {
    fn exists(&self, resource_type: ResourceType, resource_id: &str, owner: &UserId) -> bool {
        self.entries
            .contains(&(resource_type, resource_id.to_string(), owner.clone()))
    }
}

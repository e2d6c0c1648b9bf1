//! Media endpoints bound to users in their current call

use std::collections::HashMap;

/// Endpoint created for one user, with the backend session that scopes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointBinding {
    pub endpoint_id: String,
    pub backend_session_id: String,
}

#[derive(Debug, Default)]
pub struct EndpointDirectory {
    endpoints: HashMap<String, EndpointBinding>,
}

impl EndpointDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, identity: &str, binding: EndpointBinding) {
        self.endpoints.insert(identity.to_string(), binding);
    }

    pub fn get(&self, identity: &str) -> Option<&EndpointBinding> {
        self.endpoints.get(identity)
    }

    pub fn unbind(&mut self, identity: &str) -> Option<EndpointBinding> {
        self.endpoints.remove(identity)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

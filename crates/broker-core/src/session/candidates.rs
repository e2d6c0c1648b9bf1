//! ICE candidates that arrived before their media endpoint existed

use std::collections::HashMap;

use crate::types::IceCandidate;

/// Candidates kept per identity while no endpoint exists
pub const MAX_PENDING_CANDIDATES: usize = 64;

/// Per-identity FIFO queues of early candidates
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    queues: HashMap<String, Vec<IceCandidate>>,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `candidate`; returns false if the identity's queue is full
    pub fn push(&mut self, identity: &str, candidate: IceCandidate) -> bool {
        let queue = self.queues.entry(identity.to_string()).or_default();
        if queue.len() >= MAX_PENDING_CANDIDATES {
            return false;
        }
        queue.push(candidate);
        true
    }

    /// Remove and return the queue for `identity` in arrival order
    pub fn take(&mut self, identity: &str) -> Vec<IceCandidate> {
        self.queues.remove(identity).unwrap_or_default()
    }

    pub fn clear(&mut self, identity: &str) {
        self.queues.remove(identity);
    }

    pub fn pending(&self, identity: &str) -> &[IceCandidate] {
        self.queues.get(identity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of candidates buffered across all identities
    pub fn total(&self) -> usize {
        self.queues.values().map(Vec::len).sum()
    }
}

//! In-process [`RegistryClient`].
//!
//! Remote images are published with arbitrary content; their digest is the
//! SHA-256 of that content. Pulls store images under the short name a
//! container tool would use (`docker.io/library/nginx:1` → `nginx:1`), so the
//! engine's local-presence fallback is exercised. Every call is logged, and
//! failures or panics can be injected per operation and reference.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};

use imgsync_core::naming::local_candidates;

use crate::client::docker::split_reference;
use crate::client::{RegistryClient, RegistryOp};
use crate::error::ClientError;

/// One recorded client call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCall {
    pub op: RegistryOp,
    /// Reference the call was made for; `"<source> -> <target>"` for tags.
    pub reference: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    remote: HashMap<String, String>,
    local: HashMap<String, String>,
    pushed: HashMap<String, String>,
    failures: HashSet<(RegistryOp, String)>,
    panics: HashSet<(RegistryOp, String)>,
    ghost_pulls: HashSet<String>,
    calls: Vec<RegistryCall>,
}

/// Deterministic registry + local image store.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: Mutex<MemoryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `content` upstream as `reference` (`<repo>:<tag>`) and return
    /// its digest. Re-publishing replaces the content.
    pub fn publish(&self, reference: &str, content: &str) -> String {
        let digest = content_digest(content);
        self.lock()
            .remote
            .insert(reference.to_string(), digest.clone());
        digest
    }

    /// Delete `reference` upstream.
    pub fn unpublish(&self, reference: &str) {
        self.lock().remote.remove(reference);
    }

    /// Make `op` on `reference` fail until [`MemoryRegistry::clear_failures`].
    pub fn fail_on(&self, op: RegistryOp, reference: &str) {
        self.lock().failures.insert((op, reference.to_string()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Make `op` on `reference` panic.
    pub fn panic_on(&self, op: RegistryOp, reference: &str) {
        self.lock().panics.insert((op, reference.to_string()));
    }

    /// Make pulls of `reference` report success without storing anything.
    pub fn ghost_pull(&self, reference: &str) {
        self.lock().ghost_pulls.insert(reference.to_string());
    }

    /// Digest pushed to `reference`, if any.
    pub fn pushed(&self, reference: &str) -> Option<String> {
        self.lock().pushed.get(reference).cloned()
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: RegistryOp) -> usize {
        self.lock().calls.iter().filter(|c| c.op == op).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and apply injected behaviour. Panics happen after the
    /// lock is released so later calls still work.
    fn enter(&self, op: RegistryOp, reference: &str) -> Result<(), ClientError> {
        let key = (op, reference.to_string());
        let should_panic = {
            let mut state = self.lock();
            state.calls.push(RegistryCall {
                op,
                reference: reference.to_string(),
            });
            if state.failures.contains(&key) {
                return Err(ClientError::Other(format!(
                    "injected failure: {op} {reference}"
                )));
            }
            state.panics.contains(&key)
        };
        if should_panic {
            panic!("injected panic: {op} {reference}");
        }
        Ok(())
    }
}

impl RegistryClient for MemoryRegistry {
    fn manifest_exists(&self, reference: &str) -> Result<bool, ClientError> {
        self.enter(RegistryOp::ManifestExists, reference)?;
        Ok(self.lock().remote.contains_key(reference))
    }

    fn pull(&self, reference: &str) -> Result<(), ClientError> {
        self.enter(RegistryOp::Pull, reference)?;
        let mut state = self.lock();
        let digest = state
            .remote
            .get(reference)
            .cloned()
            .ok_or_else(|| ClientError::Other(format!("manifest unknown: {reference}")))?;
        if state.ghost_pulls.contains(reference) {
            return Ok(());
        }
        state.local.insert(stored_name(reference), digest);
        Ok(())
    }

    fn local_exists(&self, reference: &str) -> Result<bool, ClientError> {
        self.enter(RegistryOp::LocalExists, reference)?;
        Ok(self.lock().local.contains_key(reference))
    }

    fn local_digest(&self, reference: &str) -> Result<Option<String>, ClientError> {
        self.enter(RegistryOp::LocalDigest, reference)?;
        Ok(self.lock().local.get(reference).cloned())
    }

    fn tag(&self, source: &str, target: &str) -> Result<(), ClientError> {
        self.enter(RegistryOp::Tag, &format!("{source} -> {target}"))?;
        let mut state = self.lock();
        let digest = state
            .local
            .get(source)
            .cloned()
            .ok_or_else(|| ClientError::Other(format!("no such image: {source}")))?;
        state.local.insert(target.to_string(), digest);
        Ok(())
    }

    fn push(&self, reference: &str) -> Result<(), ClientError> {
        self.enter(RegistryOp::Push, reference)?;
        let mut state = self.lock();
        let digest = state
            .local
            .get(reference)
            .cloned()
            .ok_or_else(|| ClientError::Other(format!("no such image: {reference}")))?;
        state.remote.insert(reference.to_string(), digest.clone());
        state.pushed.insert(reference.to_string(), digest);
        Ok(())
    }
}

/// `sha256:<hex>` of `content`.
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

// Name a container tool files a pulled reference under.
fn stored_name(reference: &str) -> String {
    let (repository, tag) = split_reference(reference);
    local_candidates(repository, tag)
        .pop()
        .unwrap_or_else(|| reference.to_string())
}

//! Trust store abstraction and the in-memory implementation.
//!
//! The trust record is a single small blob per lock, and the engine treats
//! the store as authoritative at the moment of each call: a command checks
//! pairing state by loading, not by caching. The trait is synchronous for
//! that reason; backends are expected to be local (keychain, flash, file).

use std::sync::RwLock;

use crate::errors::StoreError;
use crate::types::TrustAnchor;

/// Persistence for the pairing credentials.
///
/// `save_trust` must be atomic: after a crash either the old record or the
/// new one is read back, never a torn mix.
pub trait TrustStore: Send + Sync {
    /// Load the current trust record, if paired.
    fn load_trust(&self) -> Result<Option<TrustAnchor>, StoreError>;

    /// Persist a new trust record, replacing any previous one.
    fn save_trust(&self, anchor: &TrustAnchor) -> Result<(), StoreError>;

    /// Remove the trust record. Removing an absent record is not an error.
    fn clear_trust(&self) -> Result<(), StoreError>;
}

/// In-memory store for tests and short-lived tools.
#[derive(Default)]
pub struct InMemoryTrustStore {
    anchor: RwLock<Option<TrustAnchor>>,
}

impl InMemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrustStore for InMemoryTrustStore {
    fn load_trust(&self) -> Result<Option<TrustAnchor>, StoreError> {
        let guard = self
            .anchor
            .read()
            .map_err(|e| StoreError::OperationFailed(e.to_string()))?;
        Ok(guard.clone())
    }

    fn save_trust(&self, anchor: &TrustAnchor) -> Result<(), StoreError> {
        let mut guard = self
            .anchor
            .write()
            .map_err(|e| StoreError::OperationFailed(e.to_string()))?;
        *guard = Some(anchor.clone());
        Ok(())
    }

    fn clear_trust(&self) -> Result<(), StoreError> {
        let mut guard = self
            .anchor
            .write()
            .map_err(|e| StoreError::OperationFailed(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

//! Active session names
//!
//! Session names are unique per provider: a second `open` with a name that
//! is still claimed is a name collision. Claims release on drop.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

use crate::domain::StartFailure;

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` until the returned guard is dropped
    ///
    /// # Errors
    /// [`StartFailure::NameCollision`] if the name is held by a live session
    pub fn claim(&self, name: &str) -> Result<NameClaim, StartFailure> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(name.to_string()) {
            return Err(StartFailure::NameCollision);
        }
        debug!("Claimed session name '{name}'");
        Ok(NameClaim {
            registry: self.clone(),
            name: name.to_string(),
        })
    }

    #[must_use]
    pub fn is_active(&self, name: &str) -> bool {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).contains(name)
    }
}

/// Holds a session name; releases it when dropped
#[derive(Debug)]
pub struct NameClaim {
    registry: SessionRegistry,
    name: String,
}

impl Drop for NameClaim {
    fn drop(&mut self) {
        self.registry
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
        debug!("Released session name '{}'", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_claim_collides() {
        let registry = SessionRegistry::new();
        let _first = registry.claim("selfprof").unwrap();
        assert!(matches!(registry.claim("selfprof"), Err(StartFailure::NameCollision)));
        assert!(registry.claim("other").is_ok());
    }

    #[test]
    fn test_drop_releases_name() {
        let registry = SessionRegistry::new();
        let claim = registry.claim("selfprof").unwrap();
        assert!(registry.is_active("selfprof"));
        drop(claim);
        assert!(!registry.is_active("selfprof"));
        assert!(registry.claim("selfprof").is_ok());
    }
}

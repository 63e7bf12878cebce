//! Per-domain mutual exclusion for issuance.

use std::sync::Arc;

use certkeeper_common::{AttemptId, DomainName};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Domains with an issuance in flight
///
/// Acquisition never waits: a second caller for the same domain gets
/// `None` and is expected to report the conflict. Different domains never
/// contend.
#[derive(Debug, Clone, Default)]
pub struct DomainLocks {
    held: Arc<DashMap<DomainName, AttemptId>>,
}

impl DomainLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `domain` for `attempt`, unless another attempt holds it
    pub fn try_acquire(&self, domain: &DomainName, attempt: &AttemptId) -> Option<DomainGuard> {
        match self.held.entry(domain.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(attempt.clone());
                Some(DomainGuard {
                    held: Arc::clone(&self.held),
                    domain: domain.clone(),
                })
            }
        }
    }

    /// Attempt currently holding `domain`
    pub fn holder(&self, domain: &DomainName) -> Option<AttemptId> {
        self.held.get(domain).map(|entry| entry.value().clone())
    }
}

/// Releases the domain when dropped, including when the owning future is
/// cancelled
#[derive(Debug)]
pub struct DomainGuard {
    held: Arc<DashMap<DomainName, AttemptId>>,
    domain: DomainName,
}

impl Drop for DomainGuard {
    fn drop(&mut self) {
        self.held.remove(&self.domain);
    }
}

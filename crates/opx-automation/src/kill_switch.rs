// crates/opx-automation/src/kill_switch.rs
// ============================================================================
// Module: Kill Switch Guard
// Description: The fail-open read guard every handler consults before
// running, and the emergency-override-gated disable/enable operations.
// Purpose: Centralize "treat a read failure as inactive" so no handler
// re-derives that policy inline.
// Dependencies: opx_core::authority, opx_core::time, opx-stores::kill_switch_store
// ============================================================================

//! ## Overview
//! The kill switch is an emergency affordance: a store read failure must
//! never itself block automation, so [`KillSwitchGuard::is_blocking`] treats
//! any [`StoreError`] the same as "absent" (inactive). Disabling or
//! re-enabling the switch requires [`AuthorityType::EmergencyOverride`],
//! per spec.

use opx_core::authority::Authority;
use opx_core::authority::AuthorityType;
use opx_core::time::Timestamp;
use opx_stores::error::StoreError;
use opx_stores::kill_switch_store::KillSwitch;
use opx_stores::kill_switch_store::KillSwitchStore;
use opx_stores::kill_switch_store::SharedKillSwitchStore;

/// Why a kill switch mutation was rejected.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KillSwitchError {
    /// The caller's authority does not satisfy `EmergencyOverride`.
    #[error("kill switch mutation requires emergency override authority, got {0}")]
    AuthorityNotPermitted(AuthorityType),
    /// The underlying store failed.
    #[error("kill switch store error: {0}")]
    Store(#[from] StoreError),
}

/// Guards handler entry on the global automation kill switch.
pub struct KillSwitchGuard {
    /// Backing store.
    store: SharedKillSwitchStore,
}

impl KillSwitchGuard {
    /// Wraps a store handle in a guard.
    #[must_use]
    pub fn new(store: SharedKillSwitchStore) -> Self {
        Self { store }
    }

    /// Returns whether automation should refuse to run right now. A store
    /// read failure is treated as "not blocking" (fail-open).
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        match self.store.read() {
            Ok(Some(switch)) => switch.is_active(),
            Ok(None) | Err(_) => false,
        }
    }

    /// Disables automation (activates the kill switch).
    ///
    /// # Errors
    ///
    /// Returns [`KillSwitchError::AuthorityNotPermitted`] unless `authority`
    /// satisfies [`AuthorityType::EmergencyOverride`], or
    /// [`KillSwitchError::Store`] on I/O failure.
    pub fn disable(&self, authority: &Authority, reason: impl Into<String>, now: Timestamp) -> Result<(), KillSwitchError> {
        require_emergency_override(authority)?;
        self.store.write(KillSwitch {
            enabled: false,
            disabled_at: Some(now),
            disabled_by: Some(authority.clone()),
            reason: Some(reason.into()),
            last_modified: now,
        })?;
        Ok(())
    }

    /// Re-enables automation (deactivates the kill switch).
    ///
    /// # Errors
    ///
    /// Returns [`KillSwitchError::AuthorityNotPermitted`] unless `authority`
    /// satisfies [`AuthorityType::EmergencyOverride`], or
    /// [`KillSwitchError::Store`] on I/O failure.
    pub fn enable(&self, authority: &Authority, now: Timestamp) -> Result<(), KillSwitchError> {
        require_emergency_override(authority)?;
        self.store.write(KillSwitch::absent_default(now))?;
        Ok(())
    }
}

/// Returns an error unless `authority` satisfies `EmergencyOverride`.
fn require_emergency_override(authority: &Authority) -> Result<(), KillSwitchError> {
    if authority.satisfies(AuthorityType::EmergencyOverride) {
        Ok(())
    } else {
        Err(KillSwitchError::AuthorityNotPermitted(authority.authority_type))
    }
}

#[cfg(test)]
mod tests {
    use opx_stores::kill_switch_store::InMemoryKillSwitchStore;

    use super::*;

    fn now() -> Timestamp {
        Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts")
    }

    fn emergency() -> Authority {
        Authority::new(AuthorityType::EmergencyOverride, "oncall@example.com".to_string())
    }

    #[test]
    fn absent_switch_does_not_block() {
        let guard = KillSwitchGuard::new(SharedKillSwitchStore::from_store(InMemoryKillSwitchStore::new()));
        assert!(!guard.is_blocking());
    }

    #[test]
    fn disable_then_block_then_enable_then_unblock() {
        let guard = KillSwitchGuard::new(SharedKillSwitchStore::from_store(InMemoryKillSwitchStore::new()));
        guard.disable(&emergency(), "incident storm", now()).expect("disable");
        assert!(guard.is_blocking());
        guard.enable(&emergency(), now()).expect("enable");
        assert!(!guard.is_blocking());
    }

    #[test]
    fn disable_rejects_insufficient_authority() {
        let guard = KillSwitchGuard::new(SharedKillSwitchStore::from_store(InMemoryKillSwitchStore::new()));
        let operator = Authority::new(AuthorityType::HumanOperator, "sre@example.com".to_string());
        let err = guard.disable(&operator, "too much", now()).unwrap_err();
        assert!(matches!(err, KillSwitchError::AuthorityNotPermitted(AuthorityType::HumanOperator)));
        assert!(!guard.is_blocking());
    }
}

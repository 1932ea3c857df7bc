// crates/opx-core/src/authority.rs
// ============================================================================
// Module: Authority
// Description: The `{type, principal}` caller identity used for every
// authority check in the incident FSM and automation orchestration layer.
// Purpose: Centralize the authority level ordering so every gate compares
// authority the same way.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! `Authority` identifies who is asking for a state transition or automation
//! invocation. The `AuthorityType` ordering is the single source of truth for
//! "does this caller have enough privilege" checks; nothing compares raw
//! strings.

use serde::Deserialize;
use serde::Serialize;

/// Authority level, ordered so `level(actual) >= level(required)` is a
/// correct sufficiency check via `PartialOrd`/`Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorityType {
    /// The automation engine itself (scheduled invocations).
    AutoEngine = 0,
    /// A human operator.
    HumanOperator = 1,
    /// An on-call SRE.
    OnCallSre = 2,
    /// Emergency override, satisfies every authority level.
    EmergencyOverride = 999,
}

impl AuthorityType {
    /// Returns the stable wire label for this authority type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AutoEngine => "AUTO_ENGINE",
            Self::HumanOperator => "HUMAN_OPERATOR",
            Self::OnCallSre => "ON_CALL_SRE",
            Self::EmergencyOverride => "EMERGENCY_OVERRIDE",
        }
    }

    /// Returns true when this authority type satisfies the required level.
    #[must_use]
    pub fn satisfies(self, required: Self) -> bool {
        self >= required
    }
}

impl std::fmt::Display for AuthorityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller identity carried through every authority-gated operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    /// Authority type.
    #[serde(rename = "type")]
    pub authority_type: AuthorityType,
    /// Principal identifier (e.g. an IAM ARN or operator handle).
    pub principal: String,
}

impl Authority {
    /// Builds an authority value.
    #[must_use]
    pub fn new(authority_type: AuthorityType, principal: impl Into<String>) -> Self {
        Self {
            authority_type,
            principal: principal.into(),
        }
    }

    /// Builds the literal SYSTEM authority used by scheduler entry points.
    ///
    /// Design Note ("Implicit authority default in schedulers"): scheduled
    /// invocations must state this literally rather than defaulting silently.
    #[must_use]
    pub fn system() -> Self {
        Self::new(AuthorityType::AutoEngine, "SYSTEM")
    }

    /// Returns true when this authority satisfies the required level.
    #[must_use]
    pub fn satisfies(&self, required: AuthorityType) -> bool {
        self.authority_type.satisfies(required)
    }

    /// Returns true when this authority is an emergency override.
    #[must_use]
    pub fn is_emergency_override(&self) -> bool {
        self.authority_type == AuthorityType::EmergencyOverride
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emergency_override_satisfies_every_level() {
        let auth = Authority::new(AuthorityType::EmergencyOverride, "oncall:jane");
        assert!(auth.satisfies(AuthorityType::AutoEngine));
        assert!(auth.satisfies(AuthorityType::HumanOperator));
        assert!(auth.satisfies(AuthorityType::OnCallSre));
        assert!(auth.satisfies(AuthorityType::EmergencyOverride));
    }

    #[test]
    fn human_operator_does_not_satisfy_on_call_sre() {
        let auth = Authority::new(AuthorityType::HumanOperator, "op:bob");
        assert!(!auth.satisfies(AuthorityType::OnCallSre));
    }

    #[test]
    fn ordering_matches_spec_levels() {
        assert!(AuthorityType::AutoEngine < AuthorityType::HumanOperator);
        assert!(AuthorityType::HumanOperator < AuthorityType::OnCallSre);
        assert!(AuthorityType::OnCallSre < AuthorityType::EmergencyOverride);
    }
}

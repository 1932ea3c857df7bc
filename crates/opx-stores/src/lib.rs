// crates/opx-stores/src/lib.rs
// ============================================================================
// Crate: opx-stores
// Description: In-memory reference store implementations for every opx-core
// entity, behind trait seams a durable backend (opx-store-sqlite) implements
// identically.
// Purpose: Give the automation layer and API surface a storage abstraction
// that is swappable without touching call sites.
// ============================================================================

//! ## Overview
//! Each module pairs one entity with an `InMemory*` reference
//! implementation and a `Shared*` `Arc`-wrapped handle, mirroring the
//! run-state store pattern this crate's storage layer is modeled on.
//! Append-only entities expose `put`/`create` returning [`PutOutcome`];
//! the one mutable entity (incidents) additionally exposes a
//! version-gated `update`.

pub mod audit_store;
pub mod error;
pub mod evidence_store;
pub mod idempotency_store;
pub mod incident_event_store;
pub mod incident_store;
pub mod kill_switch_store;
pub mod learning_store;
pub mod outcome_store;
pub mod promotion_store;
pub mod rate_limit_store;
pub mod signal_store;

pub use audit_store::AuditStore;
pub use audit_store::AuditStoreError;
pub use audit_store::AuditStoreOrState;
pub use audit_store::InMemoryAuditStore;
pub use audit_store::SharedAuditStore;
pub use error::PutOutcome;
pub use error::StoreError;
pub use evidence_store::EvidenceStore;
pub use evidence_store::InMemoryEvidenceStore;
pub use evidence_store::SharedEvidenceStore;
pub use idempotency_store::IdempotencyStore;
pub use idempotency_store::IdempotencyStoreError;
pub use idempotency_store::IdempotencyStoreOrState;
pub use idempotency_store::InMemoryIdempotencyStore;
pub use idempotency_store::SharedIdempotencyStore;
pub use incident_event_store::IncidentEventStore;
pub use incident_event_store::InMemoryIncidentEventStore;
pub use incident_event_store::SharedIncidentEventStore;
pub use incident_store::IncidentFilters;
pub use incident_store::IncidentStore;
pub use incident_store::IncidentStoreError;
pub use incident_store::IncidentStoreOrConflict;
pub use incident_store::InMemoryIncidentStore;
pub use incident_store::SharedIncidentStore;
pub use kill_switch_store::InMemoryKillSwitchStore;
pub use kill_switch_store::KillSwitch;
pub use kill_switch_store::KillSwitchStore;
pub use kill_switch_store::SharedKillSwitchStore;
pub use learning_store::CalibrationStore;
pub use learning_store::InMemoryCalibrationStore;
pub use learning_store::InMemorySnapshotStore;
pub use learning_store::InMemorySummaryStore;
pub use learning_store::SharedCalibrationStore;
pub use learning_store::SharedSnapshotStore;
pub use learning_store::SharedSummaryStore;
pub use learning_store::SnapshotStore;
pub use learning_store::SummaryStore;
pub use outcome_store::InMemoryOutcomeStore;
pub use outcome_store::OutcomeStore;
pub use outcome_store::SharedOutcomeStore;
pub use promotion_store::InMemoryPromotionStore;
pub use promotion_store::PromotionKey;
pub use promotion_store::PromotionStore;
pub use promotion_store::SharedPromotionStore;
pub use rate_limit_store::InMemoryRateLimitStore;
pub use rate_limit_store::RateLimitKey;
pub use rate_limit_store::RateLimitStore;
pub use rate_limit_store::SharedRateLimitStore;
pub use signal_store::InMemorySignalStore;
pub use signal_store::SharedSignalStore;
pub use signal_store::SignalStore;

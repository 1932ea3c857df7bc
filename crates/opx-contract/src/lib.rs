// crates/opx-contract/src/lib.rs
// ============================================================================
// Module: opx Contract Library
// Description: Public API surface for the HTTP request/response DTOs and
// the ApiError status-code taxonomy.
// Purpose: Give the broker and CLI layers a shared, typed wire contract
// without depending on opx-automation's engine types or any web framework.
// Dependencies: crate::{automation, error, incidents}
// ============================================================================

//! ## Overview
//! `opx-contract` has no I/O and no framework dependency: it is the typed
//! shape of every request body, response body, and error this workspace's
//! HTTP surface exposes, per spec.md's external interfaces section. A
//! broker crate serializing/deserializing at the framework boundary, and
//! `opx-cli` constructing requests for a human operator, both depend on
//! this crate instead of hand-rolling `serde_json::Value` shapes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod automation;
pub mod error;
pub mod incidents;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use automation::AcceptedResponse;
pub use automation::CalibrateRequest;
pub use automation::CreateSnapshotRequest;
pub use automation::ExtractPatternsRequest;
pub use automation::KillSwitchDisableRequest;
pub use automation::KillSwitchStatusResponse;
pub use error::ApiError;
pub use error::ErrorBody;
pub use error::RateLimitHeaders;
pub use incidents::DEFAULT_INCIDENT_LIST_LIMIT;
pub use incidents::IncidentListQuery;
pub use incidents::IncidentListResponse;
pub use incidents::MAX_INCIDENT_LIST_LIMIT;
pub use incidents::TransitionRequestBody;

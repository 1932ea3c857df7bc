// crates/opx-cli/src/main.rs
// ============================================================================
// Module: opx CLI Entry Point
// Description: Command dispatcher for manual job triggering, kill-switch
// control, and incident inspection against a durable SQLite-backed store.
// Purpose: Give an operator the same surface the HTTP API exposes, without
// standing up a server.
// Dependencies: clap, opx-automation, opx-contract, opx-core, opx-stores,
// opx-store-sqlite, serde_json, thiserror, time, tokio.
// ============================================================================

//! ## Overview
//! Every subcommand opens (or creates) one `SQLite` database, builds the
//! collaborators it needs from [`opx_store_sqlite::OpxSqliteStore`], and
//! prints its result as JSON on stdout. The job-trigger subcommands
//! (`extract-patterns`, `calibrate`, `snapshot`) go through
//! [`opx_automation::AutomationEngine::trigger_manual`] exactly as the HTTP
//! surface's manual-trigger endpoints would: they never run the operation
//! inline, only accept it for async invocation, mirroring the 202 response
//! the HTTP surface returns.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use opx_automation::AuditRecorder;
use opx_automation::AutomationEngine;
use opx_automation::KillSwitchGuard;
use opx_automation::NoopAlertSink;
use opx_automation::NoopJobDispatcher;
use opx_automation::NoopMetricsSink;
use opx_automation::RateLimiter;
use opx_automation::RetryPolicy;
use opx_automation::WindowCadence;
use opx_contract::AcceptedResponse;
use opx_contract::CalibrateRequest;
use opx_contract::CreateSnapshotRequest;
use opx_contract::ExtractPatternsRequest;
use opx_contract::IncidentListQuery;
use opx_contract::KillSwitchStatusResponse;
use opx_core::audit::OperationType;
use opx_core::audit::TriggerType;
use opx_core::authority::Authority;
use opx_core::authority::AuthorityType;
use opx_core::incident::IncidentStatus;
use opx_core::incident::Resolution;
use opx_core::incident::ResolutionType;
use opx_core::incident::TransitionRequest;
use opx_core::learning::SnapshotType;
use opx_core::time::Timestamp;
use opx_store_sqlite::OpxSqliteStore;
use opx_stores::IncidentFilters;
use opx_stores::IncidentStore;
use opx_stores::KillSwitchStore;
use opx_stores::SharedAuditStore;
use opx_stores::SharedCalibrationStore;
use opx_stores::SharedKillSwitchStore;
use opx_stores::SharedOutcomeStore;
use opx_stores::SharedRateLimitStore;
use opx_stores::SharedSnapshotStore;
use opx_stores::SharedSummaryStore;
use serde_json::json;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "opx", disable_help_subcommand = true)]
struct Cli {
    /// Path to the `SQLite` database file; created if absent.
    #[arg(long, global = true, default_value = "opx.db")]
    db: PathBuf,
    /// Principal to attribute this invocation to.
    #[arg(long, global = true, default_value = "cli-operator")]
    principal: String,
    /// Authority level to invoke at.
    #[arg(long, value_enum, global = true, default_value_t = AuthorityArg::Human)]
    authority: AuthorityArg,
    /// Selected subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Manually trigger pattern extraction.
    ExtractPatterns {
        /// Restrict to one service.
        #[arg(long)]
        service: Option<String>,
        /// Window cadence.
        #[arg(long, value_enum, default_value_t = CadenceArg::Daily)]
        cadence: CadenceArg,
        /// Bypass the kill switch and rate limit; requires emergency authority.
        #[arg(long)]
        emergency: bool,
    },
    /// Manually trigger confidence calibration.
    Calibrate {
        /// Window cadence.
        #[arg(long, value_enum, default_value_t = CadenceArg::Monthly)]
        cadence: CadenceArg,
        /// Bypass the kill switch and rate limit; requires emergency authority.
        #[arg(long)]
        emergency: bool,
    },
    /// Manually trigger a learning snapshot.
    Snapshot {
        /// Snapshot cadence being recorded.
        #[arg(long, value_enum)]
        snapshot_type: SnapshotTypeArg,
        /// Window cadence the snapshot's `{start, end}` are resolved from.
        #[arg(long, value_enum, default_value_t = CadenceArg::Daily)]
        cadence: CadenceArg,
        /// Bypass the kill switch and rate limit; requires emergency authority.
        #[arg(long)]
        emergency: bool,
    },
    /// Kill switch control.
    KillSwitch {
        /// Selected kill-switch subcommand.
        #[command(subcommand)]
        command: KillSwitchCommand,
    },
    /// Incident inspection and lifecycle transitions.
    Incidents {
        /// Selected incident subcommand.
        #[command(subcommand)]
        command: IncidentCommand,
    },
}

/// Kill-switch subcommands.
#[derive(Subcommand, Debug)]
enum KillSwitchCommand {
    /// Disables automation. Requires emergency authority.
    Disable {
        /// Why the switch is being disabled.
        reason: String,
    },
    /// Re-enables automation. Requires emergency authority.
    Enable,
    /// Prints the current kill switch state.
    Status,
}

/// Incident subcommands.
#[derive(Subcommand, Debug)]
enum IncidentCommand {
    /// Lists incidents matching the given filters.
    List {
        /// Restrict to this status.
        #[arg(long, value_enum)]
        status: Option<IncidentStatusArg>,
        /// Restrict to this service.
        #[arg(long)]
        service: Option<String>,
        /// Maximum records returned; clamped to 100.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Transitions `PENDING -> OPEN`.
    Open(TransitionArgs),
    /// Transitions `OPEN -> MITIGATING`.
    Mitigate(TransitionArgs),
    /// Transitions `OPEN|MITIGATING -> RESOLVED`.
    Resolve(ResolveArgs),
    /// Transitions `RESOLVED -> CLOSED`.
    Close(TransitionArgs),
}

/// Shared fields for transitions that don't set resolution metadata.
#[derive(clap::Args, Debug)]
struct TransitionArgs {
    /// The incident id.
    id: String,
    /// Required entering `RESOLVED`.
    #[arg(long)]
    reason: Option<String>,
    /// Required when invoking with emergency authority; 20-2048 characters.
    #[arg(long)]
    justification: Option<String>,
    /// The version last observed for this incident.
    #[arg(long)]
    expected_version: u64,
}

/// Fields for the `resolve` transition, which additionally sets resolution
/// metadata.
#[derive(clap::Args, Debug)]
struct ResolveArgs {
    /// The incident id.
    id: String,
    /// Required entering `RESOLVED`.
    #[arg(long)]
    reason: Option<String>,
    /// Required when invoking with emergency authority; 20-2048 characters.
    #[arg(long)]
    justification: Option<String>,
    /// The version last observed for this incident.
    #[arg(long)]
    expected_version: u64,
    /// Human-readable resolution summary.
    #[arg(long)]
    summary: String,
    /// Resolution classification.
    #[arg(long, value_enum)]
    resolution_type: ResolutionTypeArg,
    /// Who resolved the incident.
    #[arg(long)]
    resolved_by: String,
}

/// CLI-facing authority levels.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum AuthorityArg {
    /// `AUTO_ENGINE`.
    Auto,
    /// `HUMAN_OPERATOR`.
    Human,
    /// `ON_CALL_SRE`.
    Oncall,
    /// `EMERGENCY_OVERRIDE`.
    Emergency,
}

impl std::fmt::Display for AuthorityArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Human => "human",
            Self::Oncall => "oncall",
            Self::Emergency => "emergency",
        })
    }
}

impl From<AuthorityArg> for AuthorityType {
    fn from(value: AuthorityArg) -> Self {
        match value {
            AuthorityArg::Auto => Self::AutoEngine,
            AuthorityArg::Human => Self::HumanOperator,
            AuthorityArg::Oncall => Self::OnCallSre,
            AuthorityArg::Emergency => Self::EmergencyOverride,
        }
    }
}

/// CLI-facing window cadences.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum CadenceArg {
    /// `[yesterday 00:00, today 00:00)`.
    Daily,
    /// Previous Monday through previous Sunday.
    Weekly,
    /// Full previous calendar month.
    Monthly,
}

impl std::fmt::Display for CadenceArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        })
    }
}

impl From<CadenceArg> for WindowCadence {
    fn from(value: CadenceArg) -> Self {
        match value {
            CadenceArg::Daily => Self::Daily,
            CadenceArg::Weekly => Self::Weekly,
            CadenceArg::Monthly => Self::Monthly,
        }
    }
}

/// CLI-facing snapshot types.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum SnapshotTypeArg {
    /// Daily cadence.
    Daily,
    /// Weekly cadence.
    Weekly,
    /// Monthly cadence.
    Monthly,
    /// Explicit operator-triggered window.
    Custom,
}

impl From<SnapshotTypeArg> for SnapshotType {
    fn from(value: SnapshotTypeArg) -> Self {
        match value {
            SnapshotTypeArg::Daily => Self::Daily,
            SnapshotTypeArg::Weekly => Self::Weekly,
            SnapshotTypeArg::Monthly => Self::Monthly,
            SnapshotTypeArg::Custom => Self::Custom,
        }
    }
}

/// CLI-facing incident statuses.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum IncidentStatusArg {
    /// `PENDING`.
    Pending,
    /// `OPEN`.
    Open,
    /// `MITIGATING`.
    Mitigating,
    /// `RESOLVED`.
    Resolved,
    /// `CLOSED`.
    Closed,
}

impl From<IncidentStatusArg> for IncidentStatus {
    fn from(value: IncidentStatusArg) -> Self {
        match value {
            IncidentStatusArg::Pending => Self::Pending,
            IncidentStatusArg::Open => Self::Open,
            IncidentStatusArg::Mitigating => Self::Mitigating,
            IncidentStatusArg::Resolved => Self::Resolved,
            IncidentStatusArg::Closed => Self::Closed,
        }
    }
}

/// CLI-facing resolution classifications.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ResolutionTypeArg {
    /// The underlying issue was fixed.
    Fixed,
    /// The incident was a false positive.
    FalsePositive,
    /// The incident duplicates another one.
    Duplicate,
    /// The team decided not to fix the underlying issue.
    WontFix,
}

impl From<ResolutionTypeArg> for ResolutionType {
    fn from(value: ResolutionTypeArg) -> Self {
        match value {
            ResolutionTypeArg::Fixed => Self::Fixed,
            ResolutionTypeArg::FalsePositive => Self::FalsePositive,
            ResolutionTypeArg::Duplicate => Self::Duplicate,
            ResolutionTypeArg::WontFix => Self::WontFix,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Everything that can go wrong running a CLI command.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Opening or initializing the `SQLite` database failed.
    #[error("could not open database: {0}")]
    Connection(#[from] opx_store_sqlite::ConnectionError),
    /// A store call faulted.
    #[error("store error: {0}")]
    Store(#[from] opx_stores::StoreError),
    /// A handler invocation faulted.
    #[error("handler error: {0}")]
    Handler(#[from] opx_automation::HandlerError),
    /// A kill-switch mutation was rejected.
    #[error("kill switch error: {0}")]
    KillSwitch(#[from] opx_automation::KillSwitchError),
    /// An audit lifecycle transition was rejected.
    #[error("audit error: {0}")]
    Audit(#[from] opx_automation::AuditRecorderError),
    /// An incident transition was rejected.
    #[error("transition error: {0}")]
    Transition(#[from] opx_core::incident::TransitionError),
    /// The incident update lost a concurrency race or the id was unknown.
    #[error("incident update rejected: {0}")]
    IncidentUpdate(#[from] opx_stores::IncidentStoreOrConflict),
    /// No incident exists at the requested id.
    #[error("incident {0} not found")]
    IncidentNotFound(String),
    /// Serializing the result to JSON failed.
    #[error("failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Writing the result to stdout failed.
    #[error("failed to write output: {0}")]
    Output(std::io::Error),
    /// `--justification` was missing or out of range for an emergency-override transition.
    #[error("justification must be 20-2048 characters under emergency override authority")]
    InvalidJustification,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let body = json!({"error": "CLI_ERROR", "message": err.to_string()});
            let _ignored = write_stdout_line(&body.to_string());
            ExitCode::FAILURE
        }
    }
}

/// Writes a single line to stdout without going through `println!`.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    use std::io::Write as _;
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Executes the selected subcommand and prints its JSON result.
async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let store = OpxSqliteStore::open(&opx_store_sqlite::SqliteStoreConfig::new(cli.db.clone()))?;
    let authority = Authority::new(AuthorityType::from(cli.authority), cli.principal.clone());
    let now = Timestamp::from_offset_date_time(time::OffsetDateTime::now_utc());

    let output = match cli.command {
        Commands::ExtractPatterns { service, cadence, emergency } => {
            let window = WindowCadence::from(cadence).resolve(now);
            let request = ExtractPatternsRequest {
                service,
                start_date: window.start.to_rfc3339(),
                end_date: window.end.to_rfc3339(),
                emergency: Some(emergency),
            };
            let payload = serde_json::to_value(&request)?;
            trigger(&store, OperationType::PatternExtraction, &authority, &cli.principal, payload, now)?
        }
        Commands::Calibrate { cadence, emergency } => {
            let window = WindowCadence::from(cadence).resolve(now);
            let request = CalibrateRequest { start_date: window.start.to_rfc3339(), end_date: window.end.to_rfc3339(), emergency: Some(emergency) };
            let payload = serde_json::to_value(&request)?;
            trigger(&store, OperationType::Calibration, &authority, &cli.principal, payload, now)?
        }
        Commands::Snapshot { snapshot_type, cadence, emergency } => {
            let window = WindowCadence::from(cadence).resolve(now);
            let request = CreateSnapshotRequest {
                snapshot_type: SnapshotType::from(snapshot_type),
                start_date: window.start.to_rfc3339(),
                end_date: window.end.to_rfc3339(),
                emergency: Some(emergency),
            };
            let payload = serde_json::to_value(&request)?;
            trigger(&store, OperationType::Snapshot, &authority, &cli.principal, payload, now)?
        }
        Commands::KillSwitch { command } => kill_switch_command(&store, command, &authority, now)?,
        Commands::Incidents { command } => incident_command(&store, command, &authority, now)?,
    };

    write_stdout_line(&output.to_string()).map_err(CliError::Output)?;
    Ok(())
}

/// Runs a manual-trigger request through the automation engine, identical
/// to what `POST /automation/*` would do.
fn trigger(store: &OpxSqliteStore, operation_type: OperationType, authority: &Authority, principal: &str, payload: serde_json::Value, now: Timestamp) -> Result<serde_json::Value, CliError> {
    let engine = build_engine(store);
    let trigger_type = if authority.is_emergency_override() { TriggerType::ManualEmergency } else { TriggerType::Manual };
    let accepted = engine.trigger_manual(operation_type, principal, authority.clone(), trigger_type, payload, now)?;
    let response = AcceptedResponse { audit_id: accepted.audit_id, status: accepted.status.to_string() };
    Ok(serde_json::to_value(response)?)
}

/// Builds an [`AutomationEngine`] against `store`'s shared handles, using
/// no-op metrics/alert sinks and dispatcher since the CLI never runs a job
/// inline.
fn build_engine(store: &OpxSqliteStore) -> AutomationEngine {
    AutomationEngine::new(
        AuditRecorder::new(SharedAuditStore::from_store(store.audits.clone())),
        Arc::new(NoopMetricsSink),
        Arc::new(NoopAlertSink),
        KillSwitchGuard::new(SharedKillSwitchStore::from_store(store.kill_switch.clone())),
        RateLimiter::new(SharedRateLimitStore::from_store(store.rate_limits.clone())),
        Arc::new(NoopJobDispatcher),
        RetryPolicy::default(),
        SharedOutcomeStore::from_store(store.outcomes.clone()),
        SharedSummaryStore::from_store(store.summaries.clone()),
        SharedCalibrationStore::from_store(store.calibrations.clone()),
        SharedSnapshotStore::from_store(store.snapshots.clone()),
    )
}

/// Dispatches a kill-switch subcommand.
fn kill_switch_command(store: &OpxSqliteStore, command: KillSwitchCommand, authority: &Authority, now: Timestamp) -> Result<serde_json::Value, CliError> {
    let kill_switch_store = SharedKillSwitchStore::from_store(store.kill_switch.clone());
    let guard = KillSwitchGuard::new(kill_switch_store.clone());
    match command {
        KillSwitchCommand::Disable { reason } => {
            let audit = AuditRecorder::new(SharedAuditStore::from_store(store.audits.clone()));
            let started = audit.start(OperationType::KillSwitchDisable, TriggerType::Manual, now, json!({"reason": reason}), authority.clone())?;
            guard.disable(authority, reason, now)?;
            let terminal = audit.succeed(started, now, json!({}))?;
            Ok(json!({"auditId": terminal.audit_id, "status": "ACCEPTED"}))
        }
        KillSwitchCommand::Enable => {
            let audit = AuditRecorder::new(SharedAuditStore::from_store(store.audits.clone()));
            let started = audit.start(OperationType::KillSwitchEnable, TriggerType::Manual, now, json!({}), authority.clone())?;
            guard.enable(authority, now)?;
            let terminal = audit.succeed(started, now, json!({}))?;
            Ok(json!({"auditId": terminal.audit_id, "status": "ACCEPTED"}))
        }
        KillSwitchCommand::Status => {
            let switch = kill_switch_store.read()?;
            let response = switch.map_or_else(
                || KillSwitchStatusResponse { active: false, enabled: true, disabled_at: None, disabled_by: None, reason: None, last_modified: now.to_rfc3339() },
                |switch| KillSwitchStatusResponse {
                    active: switch.is_active(),
                    enabled: switch.enabled,
                    disabled_at: switch.disabled_at.map(|ts| ts.to_rfc3339()),
                    disabled_by: switch.disabled_by.map(|authority| authority.principal),
                    reason: switch.reason,
                    last_modified: switch.last_modified.to_rfc3339(),
                },
            );
            Ok(serde_json::to_value(response)?)
        }
    }
}

/// Dispatches an incident subcommand.
fn incident_command(store: &OpxSqliteStore, command: IncidentCommand, authority: &Authority, now: Timestamp) -> Result<serde_json::Value, CliError> {
    match command {
        IncidentCommand::List { status, service, limit } => {
            let query = IncidentListQuery { status: status.map(IncidentStatus::from), service, limit };
            let filters = IncidentFilters { status: query.status, service: query.service.clone(), limit: query.effective_limit() };
            let incidents = store.incidents.list(&filters)?;
            Ok(json!({"incidents": incidents}))
        }
        IncidentCommand::Open(args) => apply_transition(store, &args.id, IncidentStatus::Open, args.reason, None, args.justification, args.expected_version, authority, now),
        IncidentCommand::Mitigate(args) => apply_transition(store, &args.id, IncidentStatus::Mitigating, args.reason, None, args.justification, args.expected_version, authority, now),
        IncidentCommand::Resolve(args) => {
            let resolution = Resolution { summary: args.summary, resolution_type: ResolutionType::from(args.resolution_type), resolved_by: args.resolved_by };
            apply_transition(store, &args.id, IncidentStatus::Resolved, args.reason, Some(resolution), args.justification, args.expected_version, authority, now)
        }
        IncidentCommand::Close(args) => apply_transition(store, &args.id, IncidentStatus::Closed, args.reason, None, args.justification, args.expected_version, authority, now),
    }
}

/// Reads the current incident, validates the transition, and persists the
/// result under optimistic concurrency.
#[allow(clippy::too_many_arguments, reason = "mirrors TransitionRequest's full field set plus the incident id and store handle")]
fn apply_transition(
    store: &OpxSqliteStore,
    incident_id: &str,
    to: IncidentStatus,
    reason: Option<String>,
    resolution: Option<Resolution>,
    justification: Option<String>,
    expected_version: u64,
    authority: &Authority,
    now: Timestamp,
) -> Result<serde_json::Value, CliError> {
    if authority.is_emergency_override() {
        let length = justification.as_deref().map_or(0, str::len);
        if !(20..=2048).contains(&length) {
            return Err(CliError::InvalidJustification);
        }
    }
    let incident = store.incidents.get(incident_id)?.ok_or_else(|| CliError::IncidentNotFound(incident_id.to_string()))?;
    let request = TransitionRequest { to, authority, reason: reason.as_deref(), justification: justification.as_deref(), resolution, now, expected_version };
    let transitioned = opx_core::incident::transition(&incident, request)?;
    let updated = store.incidents.update(transitioned, expected_version)?;
    Ok(serde_json::to_value(updated)?)
}

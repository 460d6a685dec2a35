//! Core of the federated round coordinator: iteration ledger, assignment
//! registry, submission log and the shared service bootstrap (tracing, config,
//! readiness flags).

use anyhow::Result;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn mark_not_live() { NODE_LIVENESS.store(false, Ordering::SeqCst); }
pub fn is_ready() -> bool { NODE_READINESS.load(Ordering::SeqCst) }
pub fn is_live() -> bool { NODE_LIVENESS.load(Ordering::SeqCst) }

/// Installs the global subscriber once. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(service: &str, default_level: &str, json: bool) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
        let registry = tracing_subscriber::registry().with(env_filter);
        if json {
            registry.with(fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)).try_init()?;
        } else {
            registry.with(fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)).try_init()?;
        }
        Ok(())
    })?;
    info!(target: "fedround", %service, "tracing initialized");
    Ok(())
}

pub mod artifact;
pub mod clock;
pub mod coordinator;
pub mod dashboard;
pub mod error;
pub mod identity;
pub mod input;
pub mod ledger;
pub mod model;
pub mod registry;
pub mod settings;
pub mod store;
pub mod submissions;
pub mod telemetry;

pub use artifact::{ArtifactKind, ArtifactStore, FsArtifactStore, MemoryArtifactStore, Upload};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::Coordinator;
pub use dashboard::{ClientSummary, CurrentIteration, Dashboard, IterationParticipant, SubmissionRow};
pub use error::{CoordinatorError, CoordinatorResult};
pub use identity::IdentityDirectory;
pub use input::{IterationPatch, NewAssignment, NewIteration, NewParticipant, NewSubmission};
pub use ledger::{IterationLedger, ReopenPolicy};
pub use model::{
    ArtifactRef, Assignment, AssignmentId, IterationId, IterationRecord, IterationStatus, Metrics,
    Participant, ParticipantId, Role, Submission, SubmissionId,
};
pub use registry::{AssignmentRegistry, RunningAssignment};
pub use settings::{load_config, CoordinatorConfig, StorageBackend};
pub use store::{CoordinatorStore, MemoryStore, SledStore};
pub use submissions::SubmissionLog;
pub use telemetry::COORDINATOR_METRICS;

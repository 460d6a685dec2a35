//! Round assignment & submission coordinator: wires the ledger, registry,
//! submission log and dashboard over one injected store and artifact store.
//!
//! Operations that carry a model file run every check first, then upload,
//! then commit the record. If the commit fails the upload is removed again,
//! so a failed write never leaves an orphaned artifact or a partial record.
//! Commits run on the blocking pool: the sled backend flushes on every write.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::artifact::{ArtifactKind, ArtifactStore, FsArtifactStore, Upload};
use crate::clock::{Clock, SystemClock};
use crate::dashboard::Dashboard;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::identity::IdentityDirectory;
use crate::input::{IterationPatch, NewAssignment, NewIteration, NewSubmission};
use crate::ledger::{IterationLedger, ReopenPolicy};
use crate::model::{ArtifactRef, Assignment, IterationId, IterationRecord, ParticipantId, Submission};
use crate::registry::AssignmentRegistry;
use crate::settings::{CoordinatorConfig, StorageBackend};
use crate::store::{CoordinatorStore, MemoryStore, SledStore};
use crate::submissions::SubmissionLog;

#[derive(Clone)]
pub struct Coordinator {
    identity: IdentityDirectory,
    ledger: IterationLedger,
    registry: AssignmentRegistry,
    log: SubmissionLog,
    dashboard: Dashboard,
    artifacts: Arc<dyn ArtifactStore>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn CoordinatorStore>, artifacts: Arc<dyn ArtifactStore>, clock: Arc<dyn Clock>, policy: ReopenPolicy) -> Self {
        let identity = IdentityDirectory::new(store.clone(), clock.clone());
        let ledger = IterationLedger::new(store.clone(), identity.clone(), clock.clone(), policy);
        let registry = AssignmentRegistry::new(store.clone(), identity.clone(), ledger.clone(), clock.clone());
        let log = SubmissionLog::new(store, registry.clone(), clock);
        let dashboard = Dashboard::new(identity.clone(), ledger.clone(), registry.clone(), log.clone(), artifacts.clone());
        Self { identity, ledger, registry, log, dashboard, artifacts }
    }

    pub fn from_config(cfg: &CoordinatorConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn CoordinatorStore> = match cfg.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::Sled => Arc::new(SledStore::open(&cfg.storage.path)?),
        };
        let artifacts = Arc::new(FsArtifactStore::new(&cfg.artifacts.root, cfg.artifacts.base_url.clone()));
        info!(backend=?cfg.storage.backend, artifacts=%cfg.artifacts.root.display(), reopen=?cfg.reopen_policy, "coordinator_configured");
        Ok(Self::new(store, artifacts, Arc::new(SystemClock), cfg.reopen_policy))
    }

    pub fn identity(&self) -> &IdentityDirectory { &self.identity }
    pub fn ledger(&self) -> &IterationLedger { &self.ledger }
    pub fn registry(&self) -> &AssignmentRegistry { &self.registry }
    pub fn submissions(&self) -> &SubmissionLog { &self.log }
    pub fn dashboard(&self) -> &Dashboard { &self.dashboard }
    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> { &self.artifacts }

    async fn commit_or_discard<T, F>(&self, artifact: ArtifactRef, commit: F) -> CoordinatorResult<T>
    where
        T: Send + 'static,
        F: FnOnce(ArtifactRef) -> CoordinatorResult<T> + Send + 'static,
    {
        let staged = artifact.clone();
        let committed = tokio::task::spawn_blocking(move || commit(staged)).await.map_err(CoordinatorError::from).and_then(|r| r);
        match committed {
            Ok(v) => Ok(v),
            Err(e) => {
                if let Err(rm) = self.artifacts.remove(&artifact).await {
                    warn!(error=%rm, path=%artifact.path, "orphaned_artifact");
                }
                Err(e)
            }
        }
    }

    #[instrument(skip(self, input, upload), fields(iteration = %input.iteration_name, version = input.version))]
    pub async fn start_iteration(&self, input: &NewIteration, upload: Upload) -> CoordinatorResult<IterationRecord> {
        let input = self.ledger.preflight_create(input)?;
        let artifact = self.artifacts.store(ArtifactKind::CentralModel, &upload.bytes, &upload.file_name).await?;
        let ledger = self.ledger.clone();
        self.commit_or_discard(artifact, move |a| ledger.create_iteration(&input, a)).await
    }

    #[instrument(skip(self, patch, upload))]
    pub async fn revise_iteration(&self, id: IterationId, patch: &IterationPatch, acting_owner: Option<ParticipantId>, upload: Option<Upload>) -> CoordinatorResult<IterationRecord> {
        self.ledger.plan_update(id, patch, acting_owner)?;
        match upload {
            None => {
                let (ledger, patch) = (self.ledger.clone(), patch.clone());
                tokio::task::spawn_blocking(move || ledger.update_iteration(id, &patch, acting_owner, None)).await?
            }
            Some(u) => {
                let artifact = self.artifacts.store(ArtifactKind::CentralModel, &u.bytes, &u.file_name).await?;
                let (ledger, patch) = (self.ledger.clone(), patch.clone());
                self.commit_or_discard(artifact, move |a| ledger.update_iteration(id, &patch, acting_owner, Some(a))).await
            }
        }
    }

    pub fn assign(&self, input: &NewAssignment) -> CoordinatorResult<Assignment> { self.registry.assign(input) }

    #[instrument(skip(self, input, upload), fields(assignment = %input.assignment))]
    pub async fn submit_model(&self, input: &NewSubmission, upload: Upload) -> CoordinatorResult<Submission> {
        self.log.preflight(input)?;
        let artifact = self.artifacts.store(ArtifactKind::ClientModel, &upload.bytes, &upload.file_name).await?;
        let (log, input) = (self.log.clone(), input.clone());
        self.commit_or_discard(artifact, move |a| log.submit(&input, a)).await
    }
}

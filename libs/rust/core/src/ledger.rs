//! Iteration ledger: append-mostly history of model versions per iteration name.
//!
//! The status of an iteration name is derived from its most recent record
//! across all owners (creation time, then id): version > 0 means running,
//! version 0 means finalized. Writers are serialized by a ledger-wide mutex so
//! the uniqueness and re-open checks cannot interleave with another write.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::identity::IdentityDirectory;
use crate::input::{IterationPatch, NewIteration};
use crate::model::{
    ArtifactRef, IterationId, IterationRecord, IterationStatus, Participant, ParticipantId, Role,
};
use crate::store::{CoordinatorStore, Table};
use crate::telemetry::COORDINATOR_METRICS;

/// Whether a version > 0 record may be written for a name that already has a
/// version 0 (finalizing) record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReopenPolicy {
    #[default]
    Allow,
    Reject,
}

#[derive(Clone)]
pub struct IterationLedger {
    store: Arc<dyn CoordinatorStore>,
    identity: IdentityDirectory,
    clock: Arc<dyn Clock>,
    policy: ReopenPolicy,
    write_lock: Arc<Mutex<()>>,
}

/// Resolve each name to the status of its most recent record.
pub fn resolve_statuses(records: &[IterationRecord]) -> HashMap<String, IterationStatus> {
    let mut latest: HashMap<&str, &IterationRecord> = HashMap::new();
    for r in records {
        let slot = latest.entry(r.iteration_name.as_str()).or_insert(r);
        if r.recency() > slot.recency() { *slot = r; }
    }
    latest.into_iter().map(|(name, r)| (name.to_string(), IterationStatus::from_version(r.version))).collect()
}

impl IterationLedger {
    pub fn new(store: Arc<dyn CoordinatorStore>, identity: IdentityDirectory, clock: Arc<dyn Clock>, policy: ReopenPolicy) -> Self {
        Self { store, identity, clock, policy, write_lock: Arc::new(Mutex::new(())) }
    }

    pub fn policy(&self) -> ReopenPolicy { self.policy }

    /// Missing participants and non-central roles are both `InvalidOwner`.
    fn check_owner(&self, owner: ParticipantId) -> CoordinatorResult<Participant> {
        match self.store.participant(owner)? {
            Some(p) if p.role == Role::Central => Ok(p),
            Some(p) => Err(CoordinatorError::InvalidOwner(format!("participant {} has role {}", p.id, p.role))),
            None => Err(CoordinatorError::InvalidOwner(format!("participant {owner} does not exist"))),
        }
    }

    fn check_unique(&self, owner: ParticipantId, name: &str, version: u32, except: Option<IterationId>) -> CoordinatorResult<()> {
        let clash = self.store.iterations_named(name)?.into_iter()
            .any(|r| r.owner == owner && r.version == version && Some(r.id) != except);
        if clash {
            return Err(CoordinatorError::Duplicate(format!("iteration '{name}' version {version} already exists for owner {owner}")));
        }
        Ok(())
    }

    fn check_reopen(&self, name: &str, version: u32, except: Option<IterationId>) -> CoordinatorResult<()> {
        if self.policy == ReopenPolicy::Allow || version == 0 { return Ok(()); }
        let finalized = self.store.iterations_named(name)?.into_iter()
            .any(|r| r.version == 0 && Some(r.id) != except);
        if finalized {
            warn!(iteration=%name, version, "reopen_rejected");
            return Err(CoordinatorError::IterationFinalized(name.to_string()));
        }
        Ok(())
    }

    /// Every check `create_iteration` performs, without writing. Run before
    /// uploading an artifact so rejected requests leave nothing behind.
    pub fn preflight_create(&self, input: &NewIteration) -> CoordinatorResult<NewIteration> {
        let input = input.validate()?;
        self.check_owner(input.owner)?;
        self.check_unique(input.owner, &input.iteration_name, input.version, None)?;
        self.check_reopen(&input.iteration_name, input.version, None)?;
        Ok(input)
    }

    #[instrument(skip(self, input, artifact), fields(iteration = %input.iteration_name, version = input.version))]
    pub fn create_iteration(&self, input: &NewIteration, artifact: ArtifactRef) -> CoordinatorResult<IterationRecord> {
        let input = input.validate()?;
        self.check_owner(input.owner)?;
        let _guard = self.write_lock.lock();
        self.check_unique(input.owner, &input.iteration_name, input.version, None)?;
        self.check_reopen(&input.iteration_name, input.version, None)?;
        let record = IterationRecord {
            id: IterationId(self.store.next_id(Table::Iterations)?),
            owner: input.owner,
            iteration_name: input.iteration_name,
            model_name: input.model_name,
            domain: input.domain,
            version: input.version,
            artifact,
            created_at: self.clock.now(),
        };
        self.store.put_iteration(&record)?;
        COORDINATOR_METRICS.iterations_created.add(1, &[]);
        if record.is_finalizer() { COORDINATOR_METRICS.iterations_finalized.add(1, &[]); }
        info!(id=%record.id, owner=%record.owner, finalized=record.is_finalizer(), "iteration_recorded");
        Ok(record)
    }

    pub fn get(&self, id: IterationId) -> CoordinatorResult<IterationRecord> {
        self.store.iteration(id)?.ok_or_else(|| CoordinatorError::not_found(format!("iteration {id}")))
    }

    /// Checks an update and returns the record it would produce (artifact untouched).
    pub fn plan_update(&self, id: IterationId, patch: &IterationPatch, acting_owner: Option<ParticipantId>) -> CoordinatorResult<IterationRecord> {
        let patch = patch.validate()?;
        let mut record = self.get(id)?;
        if let Some(actor) = acting_owner {
            if actor != record.owner {
                return Err(CoordinatorError::Forbidden(format!("participant {actor} may not edit iteration {id}")));
            }
        }
        if let Some(owner) = patch.owner {
            self.check_owner(owner)?;
            record.owner = owner;
        }
        if let Some(name) = patch.iteration_name { record.iteration_name = name; }
        if let Some(model) = patch.model_name { record.model_name = model; }
        if let Some(domain) = patch.domain { record.domain = if domain.is_empty() { None } else { Some(domain) }; }
        if let Some(version) = patch.version { record.version = version; }
        self.check_unique(record.owner, &record.iteration_name, record.version, Some(record.id))?;
        self.check_reopen(&record.iteration_name, record.version, Some(record.id))?;
        Ok(record)
    }

    #[instrument(skip(self, patch, artifact))]
    pub fn update_iteration(&self, id: IterationId, patch: &IterationPatch, acting_owner: Option<ParticipantId>, artifact: Option<ArtifactRef>) -> CoordinatorResult<IterationRecord> {
        let _guard = self.write_lock.lock();
        let before = self.get(id)?;
        let mut record = self.plan_update(id, patch, acting_owner)?;
        if let Some(a) = artifact { record.artifact = a; }
        self.store.put_iteration(&record)?;
        if record.is_finalizer() && !before.is_finalizer() { COORDINATOR_METRICS.iterations_finalized.add(1, &[]); }
        info!(id=%record.id, version=record.version, "iteration_updated");
        Ok(record)
    }

    pub fn status_of(&self, name: &str) -> CoordinatorResult<Option<IterationStatus>> {
        Ok(self.latest_record(name)?.map(|r| IterationStatus::from_version(r.version)))
    }

    /// Version of the running round for `name`, if the name is running.
    pub fn current_version(&self, name: &str) -> CoordinatorResult<Option<u32>> {
        Ok(self.latest_record(name)?.filter(|r| r.version > 0).map(|r| r.version))
    }

    pub fn latest_record(&self, name: &str) -> CoordinatorResult<Option<IterationRecord>> {
        Ok(self.store.iterations_named(name)?.into_iter().max_by_key(|r| r.recency()))
    }

    pub fn statuses(&self) -> CoordinatorResult<HashMap<String, IterationStatus>> {
        Ok(resolve_statuses(&self.store.iterations()?))
    }

    /// Running records of `owner`, highest version first.
    pub fn list_running(&self, owner: ParticipantId) -> CoordinatorResult<Vec<IterationRecord>> {
        self.identity.require_role(owner, Role::Central)?;
        let statuses = self.statuses()?;
        let mut out: Vec<_> = self.store.iterations_owned_by(owner)?.into_iter()
            .filter(|r| r.version > 0 && statuses.get(&r.iteration_name) == Some(&IterationStatus::Running))
            .collect();
        out.sort_by(|a, b| b.version.cmp(&a.version).then_with(|| b.recency().cmp(&a.recency())));
        Ok(out)
    }

    /// Every record of `owner`, newest first.
    pub fn list_all(&self, owner: ParticipantId) -> CoordinatorResult<Vec<IterationRecord>> {
        self.identity.require_role(owner, Role::Central)?;
        let mut out = self.store.iterations_owned_by(owner)?;
        out.sort_by(|a, b| b.recency().cmp(&a.recency()));
        Ok(out)
    }

    /// Records for any of `names`, newest first.
    pub fn records_named_any(&self, names: &[String]) -> CoordinatorResult<Vec<IterationRecord>> {
        let mut out: Vec<_> = self.store.iterations()?.into_iter().filter(|r| names.contains(&r.iteration_name)).collect();
        out.sort_by(|a, b| b.recency().cmp(&a.recency()));
        Ok(out)
    }
}

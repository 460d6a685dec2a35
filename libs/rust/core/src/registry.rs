//! Assignment registry: binds clients to iteration names.
//!
//! Invariant: a client is bound to at most one running iteration at any
//! instant. The running-assignment check and the insert execute under a
//! mutex striped by client id, so two concurrent `assign` calls for the same
//! client cannot both pass the check. Only a name that is running right now
//! can be assigned; otherwise a later start of that name would hand the
//! client a second running round.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::identity::IdentityDirectory;
use crate::input::NewAssignment;
use crate::ledger::IterationLedger;
use crate::model::{Assignment, AssignmentId, IterationStatus, ParticipantId, Role};
use crate::store::{CoordinatorStore, Table};
use crate::telemetry::COORDINATOR_METRICS;

pub(crate) const LOCK_STRIPES: usize = 64;

/// Fixed set of mutexes; a key always maps to the same stripe.
pub(crate) struct StripedLocks { stripes: Vec<Mutex<()>> }

impl StripedLocks {
    pub(crate) fn new(n: usize) -> Self { Self { stripes: (0..n.max(1)).map(|_| Mutex::new(())).collect() } }
    pub(crate) fn for_key(&self, key: u64) -> &Mutex<()> {
        &self.stripes[(key % self.stripes.len() as u64) as usize]
    }
}

/// An assignment whose iteration is currently running, with the round number.
#[derive(Debug, Clone, Serialize)]
pub struct RunningAssignment {
    pub assignment: Assignment,
    pub version: u32,
}

#[derive(Clone)]
pub struct AssignmentRegistry {
    store: Arc<dyn CoordinatorStore>,
    identity: IdentityDirectory,
    ledger: IterationLedger,
    clock: Arc<dyn Clock>,
    locks: Arc<StripedLocks>,
}

impl AssignmentRegistry {
    pub fn new(store: Arc<dyn CoordinatorStore>, identity: IdentityDirectory, ledger: IterationLedger, clock: Arc<dyn Clock>) -> Self {
        Self { store, identity, ledger, clock, locks: Arc::new(StripedLocks::new(LOCK_STRIPES)) }
    }

    #[instrument(skip(self, input), fields(client = %input.client, iteration = %input.iteration_name))]
    pub fn assign(&self, input: &NewAssignment) -> CoordinatorResult<Assignment> {
        let input = input.validate()?;
        let owner = self.identity.require_role(input.owner, Role::Central)?;
        let client = self.identity.require_role(input.client, Role::Client)?;

        let started = Instant::now();
        let _guard = self.locks.for_key(client.id.0).lock();
        let existing = self.store.assignments_for_client(client.id)?;
        let statuses = self.ledger.statuses()?;
        if let Some(active) = existing.iter().find(|a| statuses.get(&a.iteration_name) == Some(&IterationStatus::Running)) {
            COORDINATOR_METRICS.assignment_conflicts.add(1, &[]);
            warn!(client=%client.id, running=%active.iteration_name, "assignment_rejected_already_active");
            return Err(CoordinatorError::AlreadyActive { client: client.id.0, iteration: active.iteration_name.clone() });
        }
        if existing.iter().any(|a| a.iteration_name == input.iteration_name) {
            return Err(CoordinatorError::Duplicate(format!("client {} is already assigned to '{}'", client.id, input.iteration_name)));
        }
        if statuses.get(&input.iteration_name) != Some(&IterationStatus::Running) {
            return Err(CoordinatorError::not_found(format!("running iteration '{}'", input.iteration_name)));
        }
        let assignment = Assignment {
            id: AssignmentId(self.store.next_id(Table::Assignments)?),
            client: client.id,
            owner: owner.id,
            iteration_name: input.iteration_name,
            domain: input.domain,
            model_name: input.model_name,
            assigned_at: self.clock.now(),
        };
        self.store.insert_assignment(&assignment)?;
        COORDINATOR_METRICS.assignments_created.add(1, &[]);
        COORDINATOR_METRICS.assign_latency_ms.record(started.elapsed().as_secs_f64() * 1000.0, &[]);
        info!(id=%assignment.id, owner=%owner.id, "assignment_created");
        Ok(assignment)
    }

    pub fn get(&self, id: AssignmentId) -> CoordinatorResult<Assignment> {
        self.store.assignment(id)?.ok_or_else(|| CoordinatorError::not_found(format!("assignment {id}")))
    }

    pub fn by_owner(&self, owner: ParticipantId) -> CoordinatorResult<Vec<Assignment>> { self.store.assignments_for_owner(owner) }

    pub fn by_owner_email(&self, email: &str) -> CoordinatorResult<Vec<Assignment>> {
        if email.trim().is_empty() { return Err(CoordinatorError::validation("email parameter is required")); }
        match self.store.participant_by_email(email.trim())? {
            Some(owner) => self.by_owner(owner.id),
            None => Ok(Vec::new()),
        }
    }

    pub fn by_client(&self, client: ParticipantId) -> CoordinatorResult<Vec<Assignment>> { self.store.assignments_for_client(client) }

    pub fn by_iteration_name(&self, name: &str) -> CoordinatorResult<Vec<Assignment>> { self.store.assignments_named(name) }

    pub fn running_for_client(&self, client: ParticipantId) -> CoordinatorResult<Vec<RunningAssignment>> {
        let mut out = Vec::new();
        for a in self.by_client(client)? {
            if let Some(version) = self.ledger.current_version(&a.iteration_name)? {
                out.push(RunningAssignment { assignment: a, version });
            }
        }
        Ok(out)
    }
}

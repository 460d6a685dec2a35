//! Submission log: append-only client deliveries per assignment.
//!
//! "Latest" means max `created_at`; identical timestamps fall back to the
//! higher submission id, which is insertion order. Auto-assigned versions are
//! computed and inserted under a per-assignment stripe lock, so concurrent
//! submits for one assignment never share a version.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::clock::Clock;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::model::{ArtifactRef, Assignment, AssignmentId, Submission, SubmissionId};
use crate::input::NewSubmission;
use crate::registry::{AssignmentRegistry, StripedLocks, LOCK_STRIPES};
use crate::store::{CoordinatorStore, Table};
use crate::telemetry::COORDINATOR_METRICS;

#[derive(Clone)]
pub struct SubmissionLog {
    store: Arc<dyn CoordinatorStore>,
    registry: AssignmentRegistry,
    clock: Arc<dyn Clock>,
    locks: Arc<StripedLocks>,
}

impl SubmissionLog {
    pub fn new(store: Arc<dyn CoordinatorStore>, registry: AssignmentRegistry, clock: Arc<dyn Clock>) -> Self {
        Self { store, registry, clock, locks: Arc::new(StripedLocks::new(LOCK_STRIPES)) }
    }

    /// Validation, assignment existence and client ownership, without writing.
    pub fn preflight(&self, input: &NewSubmission) -> CoordinatorResult<Assignment> {
        let input = input.validate()?;
        let assignment = self.registry.get(input.assignment)?;
        if let Some(actor) = input.acting_client {
            if actor != assignment.client {
                return Err(CoordinatorError::Forbidden(format!("participant {actor} does not hold assignment {}", assignment.id)));
            }
        }
        Ok(assignment)
    }

    #[instrument(skip(self, input, artifact), fields(assignment = %input.assignment))]
    pub fn submit(&self, input: &NewSubmission, artifact: ArtifactRef) -> CoordinatorResult<Submission> {
        let assignment = self.preflight(input)?;
        let _guard = self.locks.for_key(assignment.id.0).lock();
        let version = match input.version {
            Some(v) => v,
            None => self.store.submissions_for(assignment.id)?.iter().map(|s| s.version).max().unwrap_or(0) + 1,
        };
        let submission = Submission {
            id: SubmissionId(self.store.next_id(Table::Submissions)?),
            assignment: assignment.id,
            artifact,
            metrics: input.metrics,
            version,
            created_at: self.clock.now(),
        };
        self.store.insert_submission(&submission)?;
        COORDINATOR_METRICS.submissions_accepted.add(1, &[]);
        info!(id=%submission.id, version, iteration=%assignment.iteration_name, "submission_recorded");
        Ok(submission)
    }

    pub fn latest_for(&self, assignment: AssignmentId) -> CoordinatorResult<Option<Submission>> {
        self.registry.get(assignment)?;
        Ok(self.store.submissions_for(assignment)?.into_iter().max_by_key(|s| s.recency()))
    }

    /// Assignments of `name` that have at least one submission, each with its latest.
    pub fn latest_per_assignment(&self, name: &str) -> CoordinatorResult<Vec<(Assignment, Submission)>> {
        let assignments = self.registry.by_iteration_name(name)?;
        if assignments.is_empty() { return Ok(Vec::new()); }
        let submissions = self.store.submissions()?;
        Ok(assignments.into_iter()
            .filter_map(|a| {
                let latest = submissions.iter().filter(|s| s.assignment == a.id).max_by_key(|s| s.recency()).cloned();
                latest.map(|s| (a, s))
            })
            .collect())
    }

    /// Oldest first.
    pub fn history_for(&self, assignment: AssignmentId) -> CoordinatorResult<Vec<Submission>> {
        self.registry.get(assignment)?;
        let mut out = self.store.submissions_for(assignment)?;
        out.sort_by_key(|s| s.recency());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::identity::IdentityDirectory;
    use crate::input::{NewAssignment, NewIteration, NewParticipant};
    use crate::ledger::{IterationLedger, ReopenPolicy};
    use crate::model::{Metrics, ParticipantId, Role};
    use crate::store::MemoryStore;
    use chrono::Duration;

    struct Fixture { log: SubmissionLog, registry: AssignmentRegistry, clock: Arc<ManualClock>, assignment: Assignment }

    fn fixture() -> Fixture {
        let store: Arc<dyn CoordinatorStore> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let identity = IdentityDirectory::new(store.clone(), clock.clone());
        let owner = identity.register(&NewParticipant { email: "o@fl.org".into(), hospital: None, role: Role::Central }).unwrap();
        let client = identity.register(&NewParticipant { email: "a@h.org".into(), hospital: None, role: Role::Client }).unwrap();
        let ledger = IterationLedger::new(store.clone(), identity.clone(), clock.clone(), ReopenPolicy::Allow);
        let art0 = ArtifactRef { path: "central_models/diag-1".into(), sha256: "00".into(), size_bytes: 1 };
        ledger.create_iteration(&NewIteration { owner: owner.id, iteration_name: "diag-1".into(), model_name: "m".into(), domain: None, version: 1 }, art0).unwrap();
        let registry = AssignmentRegistry::new(store.clone(), identity, ledger, clock.clone());
        let assignment = registry.assign(&NewAssignment { owner: owner.id, client: client.id, domain: "xray".into(), model_name: "m".into(), iteration_name: "diag-1".into() }).unwrap();
        Fixture { log: SubmissionLog::new(store, registry.clone(), clock.clone()), registry, clock, assignment }
    }

    fn art(tag: &str) -> ArtifactRef { ArtifactRef { path: format!("client_models/{tag}"), sha256: tag.into(), size_bytes: 1 } }

    fn sub(a: AssignmentId, acc: f64) -> NewSubmission {
        NewSubmission { assignment: a, metrics: Metrics { accuracy: Some(acc), ..Default::default() }, version: None, acting_client: None }
    }

    #[test]
    fn versions_auto_increment_and_latest_wins() {
        let f = fixture();
        let first = f.log.submit(&sub(f.assignment.id, 0.7), art("1")).unwrap();
        f.clock.advance(Duration::seconds(5));
        let second = f.log.submit(&sub(f.assignment.id, 0.8), art("2")).unwrap();
        assert_eq!((first.version, second.version), (1, 2));
        for _ in 0..3 { assert_eq!(f.log.latest_for(f.assignment.id).unwrap().unwrap().id, second.id); }
        assert_eq!(f.log.history_for(f.assignment.id).unwrap().len(), 2);
    }

    #[test]
    fn concurrent_submits_get_distinct_versions() {
        let f = fixture();
        let versions: Vec<u32> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|i| {
                let log = f.log.clone();
                let id = f.assignment.id;
                s.spawn(move || log.submit(&sub(id, 0.5), art(&format!("c{i}"))).unwrap().version)
            }).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (1..=8).collect::<Vec<u32>>());
    }

    #[test]
    fn identical_timestamps_fall_back_to_id() {
        let f = fixture();
        f.log.submit(&sub(f.assignment.id, 0.5), art("a")).unwrap();
        let later = f.log.submit(&sub(f.assignment.id, 0.6), art("b")).unwrap();
        assert_eq!(f.log.latest_for(f.assignment.id).unwrap().unwrap().id, later.id);
    }

    #[test]
    fn missing_assignment_and_wrong_client() {
        let f = fixture();
        assert!(matches!(f.log.submit(&sub(AssignmentId(77), 0.5), art("x")), Err(CoordinatorError::NotFound(_))));
        let mut foreign = sub(f.assignment.id, 0.5);
        foreign.acting_client = Some(ParticipantId(9_999));
        assert!(matches!(f.log.submit(&foreign, art("x")), Err(CoordinatorError::Forbidden(_))));
        assert!(f.log.latest_for(f.assignment.id).unwrap().is_none());
    }

    #[test]
    fn no_placeholder_rows_for_silent_assignments() {
        let f = fixture();
        assert!(f.log.latest_per_assignment("diag-1").unwrap().is_empty());
        f.log.submit(&sub(f.assignment.id, 0.9), art("z")).unwrap();
        let rows = f.log.latest_per_assignment("diag-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.id, f.assignment.id);
        assert_eq!(f.registry.by_iteration_name("diag-1").unwrap().len(), 1);
    }
}

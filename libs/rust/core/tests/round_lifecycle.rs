//! End-to-end round lifecycle against both storage backends.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use chrono::Duration;
use fedround_core::{
    AssignmentId, Coordinator, CoordinatorError, CoordinatorStore, IterationPatch, IterationStatus, ManualClock,
    MemoryArtifactStore, MemoryStore, Metrics, NewAssignment, NewIteration, NewParticipant,
    NewSubmission, Participant, ReopenPolicy, Role, SledStore, Upload,
};
use fedround_core::model::{Assignment, IterationId, IterationRecord, ParticipantId, Submission};
use fedround_core::store::Table;
use fedround_core::{CoordinatorResult, SystemClock};
use parking_lot::Mutex;

struct World {
    coord: Coordinator,
    clock: Arc<ManualClock>,
    artifacts: Arc<MemoryArtifactStore>,
    o: Participant,
    o2: Participant,
    client_a: Participant,
    client_b: Participant,
}

fn world(store: Arc<dyn CoordinatorStore>, policy: ReopenPolicy) -> World {
    let clock = Arc::new(ManualClock::default());
    let artifacts = Arc::new(MemoryArtifactStore::new());
    let coord = Coordinator::new(store, artifacts.clone(), clock.clone(), policy);
    let reg = |email: &str, hospital: Option<&str>, role| coord.identity()
        .register(&NewParticipant { email: email.into(), hospital: hospital.map(Into::into), role }).unwrap();
    let o = reg("o@central.org", None, Role::Central);
    let o2 = reg("o2@central.org", None, Role::Central);
    let client_a = reg("a@stmary.org", Some("St. Mary"), Role::Client);
    let client_b = reg("b@general.org", Some("General"), Role::Client);
    World { coord, clock, artifacts, o, o2, client_a, client_b }
}

fn iteration(owner: &Participant, name: &str, version: u32) -> NewIteration {
    NewIteration { owner: owner.id, iteration_name: name.into(), model_name: "ResNet50".into(), domain: Some("chest-xray".into()), version }
}

fn assignment(owner: &Participant, client: &Participant, name: &str) -> NewAssignment {
    NewAssignment { owner: owner.id, client: client.id, domain: "chest-xray".into(), model_name: "ResNet50".into(), iteration_name: name.into() }
}

fn upload() -> Upload { Upload::new("weights.pkl", b"\x80\x04weights".to_vec()) }

async fn scenario(w: World) {
    let c = &w.coord;
    let diag = c.start_iteration(&iteration(&w.o, "diag-1", 1), upload()).await.unwrap();
    assert_eq!(c.ledger().status_of("diag-1").unwrap(), Some(IterationStatus::Running));

    let a = c.assign(&assignment(&w.o, &w.client_a, "diag-1")).unwrap();
    let err = c.assign(&assignment(&w.o2, &w.client_a, "diag-1")).unwrap_err();
    assert!(matches!(err, CoordinatorError::AlreadyActive { .. }), "got {err:?}");
    let b = c.assign(&assignment(&w.o, &w.client_b, "diag-1")).unwrap();

    w.clock.advance(Duration::seconds(10));
    let first = c.submit_model(&NewSubmission { assignment: a.id, metrics: Metrics { accuracy: Some(0.81), ..Default::default() }, version: None, acting_client: Some(w.client_a.id) }, upload()).await.unwrap();
    w.clock.advance(Duration::seconds(10));
    let second = c.submit_model(&NewSubmission { assignment: a.id, metrics: Metrics { accuracy: Some(0.88), f1: Some(0.85), ..Default::default() }, version: None, acting_client: None }, upload()).await.unwrap();
    assert_eq!(second.version, first.version + 1);
    assert_eq!(c.submissions().latest_for(a.id).unwrap().unwrap().id, second.id);

    // b never submitted: no placeholder row
    let rows = c.submissions().latest_per_assignment("diag-1").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0.id, a.id);
    assert!(rows.iter().all(|(asg, _)| asg.id != b.id));

    let view = c.dashboard().iteration_submissions(diag.id).unwrap();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].client_email, "a@stmary.org");
    assert_eq!(view[0].accuracy, Some(0.88));
    assert!(view[0].model_file.starts_with("mem://client_models/"));

    let people = c.dashboard().iteration_participants(diag.id).unwrap();
    assert_eq!(people.len(), 2);
    assert_eq!(people[0].client_hospital.as_deref(), Some("St. Mary"));

    let current = c.dashboard().current_client_iterations("a@stmary.org").unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].central_auth_email, "o@central.org");
    assert_eq!(current[0].version, 1);

    w.clock.advance(Duration::seconds(10));
    c.start_iteration(&iteration(&w.o, "diag-1", 0), upload()).await.unwrap();
    assert!(c.ledger().list_running(w.o.id).unwrap().is_empty());
    assert_eq!(c.ledger().status_of("diag-1").unwrap(), Some(IterationStatus::Finalized));
    assert!(c.dashboard().current_client_iterations("a@stmary.org").unwrap().is_empty());

    // the finalized round no longer blocks the client
    c.start_iteration(&iteration(&w.o, "diag-2", 1), upload()).await.unwrap();
    c.assign(&assignment(&w.o, &w.client_a, "diag-2")).unwrap();

    let summary = c.dashboard().client_summary("a@stmary.org").unwrap();
    assert_eq!((summary.total_rounds, summary.current_running_rounds, summary.total_finalized_models), (2, 1, 1));
    assert_eq!(summary.hospital.as_deref(), Some("St. Mary"));

    let history = c.dashboard().client_iterations(w.client_a.id).unwrap();
    assert_eq!(history.iter().map(|r| (r.iteration_name.as_str(), r.version)).collect::<Vec<_>>(), vec![("diag-2", 1), ("diag-1", 0), ("diag-1", 1)]);

    // 3 iteration files + 2 client files
    assert_eq!(w.artifacts.len(), 5);
}

#[tokio::test]
async fn lifecycle_memory_store() {
    scenario(world(Arc::new(MemoryStore::new()), ReopenPolicy::Allow)).await;
}

#[tokio::test]
async fn lifecycle_sled_store() {
    scenario(world(Arc::new(SledStore::temporary().unwrap()), ReopenPolicy::Allow)).await;
}

#[tokio::test]
async fn rejected_writes_leave_no_artifacts() {
    let w = world(Arc::new(MemoryStore::new()), ReopenPolicy::Reject);
    let err = w.coord.start_iteration(&iteration(&w.client_a, "diag-1", 1), upload()).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidOwner(_)));
    let err = w.coord.submit_model(&NewSubmission { assignment: AssignmentId(42), metrics: Metrics::default(), version: None, acting_client: None }, upload()).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::NotFound(_)));
    let err = w.coord.start_iteration(&iteration(&w.o, "diag-1", 1), Upload::new("empty.bin", Vec::new())).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Validation(_)));
    assert!(w.artifacts.is_empty());

    w.coord.start_iteration(&iteration(&w.o, "diag-1", 1), upload()).await.unwrap();
    w.coord.start_iteration(&iteration(&w.o, "diag-1", 0), upload()).await.unwrap();
    let err = w.coord.start_iteration(&iteration(&w.o, "diag-1", 2), upload()).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::IterationFinalized(_)));
    assert_eq!(w.artifacts.len(), 2);
}

#[tokio::test]
async fn revise_iteration_replaces_artifact() {
    let w = world(Arc::new(MemoryStore::new()), ReopenPolicy::Allow);
    let rec = w.coord.start_iteration(&iteration(&w.o, "diag-1", 1), upload()).await.unwrap();
    let patch = IterationPatch { version: Some(2), ..Default::default() };
    let err = w.coord.revise_iteration(rec.id, &patch, Some(w.o2.id), Some(upload())).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Forbidden(_)));
    assert_eq!(w.artifacts.len(), 1);

    let updated = w.coord.revise_iteration(rec.id, &patch, Some(w.o.id), Some(Upload::new("v2.pkl", b"v2".to_vec()))).await.unwrap();
    assert_eq!(updated.version, 2);
    assert_ne!(updated.artifact, rec.artifact);
    assert_eq!(updated.model_name, "ResNet50");
    assert!(w.artifacts.contains(&updated.artifact));
}

/// Records which thread performed each write.
#[derive(Default)]
struct WriterThreads { inner: MemoryStore, writers: Mutex<Vec<ThreadId>> }

impl WriterThreads {
    fn note(&self) { self.writers.lock().push(thread::current().id()); }
}

impl CoordinatorStore for WriterThreads {
    fn next_id(&self, table: Table) -> CoordinatorResult<u64> { self.inner.next_id(table) }
    fn insert_participant(&self, p: &Participant) -> CoordinatorResult<()> { self.inner.insert_participant(p) }
    fn participant(&self, id: ParticipantId) -> CoordinatorResult<Option<Participant>> { self.inner.participant(id) }
    fn participants(&self) -> CoordinatorResult<Vec<Participant>> { self.inner.participants() }
    fn put_iteration(&self, r: &IterationRecord) -> CoordinatorResult<()> { self.note(); self.inner.put_iteration(r) }
    fn iteration(&self, id: IterationId) -> CoordinatorResult<Option<IterationRecord>> { self.inner.iteration(id) }
    fn iterations(&self) -> CoordinatorResult<Vec<IterationRecord>> { self.inner.iterations() }
    fn insert_assignment(&self, a: &Assignment) -> CoordinatorResult<()> { self.inner.insert_assignment(a) }
    fn assignment(&self, id: AssignmentId) -> CoordinatorResult<Option<Assignment>> { self.inner.assignment(id) }
    fn assignments(&self) -> CoordinatorResult<Vec<Assignment>> { self.inner.assignments() }
    fn insert_submission(&self, s: &Submission) -> CoordinatorResult<()> { self.note(); self.inner.insert_submission(s) }
    fn submissions(&self) -> CoordinatorResult<Vec<Submission>> { self.inner.submissions() }
}

#[tokio::test]
async fn upload_commits_run_on_the_blocking_pool() {
    let store = Arc::new(WriterThreads::default());
    let coord = Coordinator::new(store.clone(), Arc::new(MemoryArtifactStore::new()), Arc::new(SystemClock), ReopenPolicy::Allow);
    let o = coord.identity().register(&NewParticipant { email: "o@central.org".into(), hospital: None, role: Role::Central }).unwrap();
    let a = coord.identity().register(&NewParticipant { email: "a@ward.org".into(), hospital: None, role: Role::Client }).unwrap();
    let rec = coord.start_iteration(&iteration(&o, "diag-1", 1), upload()).await.unwrap();
    coord.revise_iteration(rec.id, &IterationPatch { model_name: Some("ViT".into()), ..Default::default() }, Some(o.id), None).await.unwrap();
    let asg = coord.assign(&assignment(&o, &a, "diag-1")).unwrap();
    coord.submit_model(&NewSubmission { assignment: asg.id, metrics: Metrics::default(), version: None, acting_client: None }, upload()).await.unwrap();

    let here = thread::current().id();
    let writers = store.writers.lock().clone();
    assert_eq!(writers.len(), 3);
    assert!(writers.iter().all(|t| *t != here), "a commit ran on the async task's thread");
}

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use parking_lot::RwLock;

use super::{CoordinatorStore, Table};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::model::{
    Assignment, AssignmentId, IterationId, IterationRecord, Participant, ParticipantId, Submission,
};

#[derive(Debug, Default)]
struct Tables {
    seq: [u64; 4],
    participants: BTreeMap<u64, Participant>,
    iterations: BTreeMap<u64, IterationRecord>,
    assignments: BTreeMap<u64, Assignment>,
    submissions: BTreeMap<u64, Submission>,
}

fn insert_new<T: Clone>(map: &mut BTreeMap<u64, T>, table: Table, id: u64, value: &T) -> CoordinatorResult<()> {
    match map.entry(id) {
        Entry::Occupied(_) => Err(CoordinatorError::Storage(format!("{} row {id} already exists", table.name()))),
        Entry::Vacant(v) => { v.insert(value.clone()); Ok(()) }
    }
}

/// In-process store; the default for tests and `storage.backend = memory`.
#[derive(Debug, Default)]
pub struct MemoryStore { inner: RwLock<Tables> }

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl CoordinatorStore for MemoryStore {
    fn next_id(&self, table: Table) -> CoordinatorResult<u64> {
        let mut t = self.inner.write();
        let slot = &mut t.seq[table as usize];
        *slot += 1;
        Ok(*slot)
    }

    fn insert_participant(&self, p: &Participant) -> CoordinatorResult<()> {
        insert_new(&mut self.inner.write().participants, Table::Participants, p.id.0, p)
    }
    fn participant(&self, id: ParticipantId) -> CoordinatorResult<Option<Participant>> {
        Ok(self.inner.read().participants.get(&id.0).cloned())
    }
    fn participants(&self) -> CoordinatorResult<Vec<Participant>> {
        Ok(self.inner.read().participants.values().cloned().collect())
    }

    fn put_iteration(&self, r: &IterationRecord) -> CoordinatorResult<()> {
        self.inner.write().iterations.insert(r.id.0, r.clone());
        Ok(())
    }
    fn iteration(&self, id: IterationId) -> CoordinatorResult<Option<IterationRecord>> {
        Ok(self.inner.read().iterations.get(&id.0).cloned())
    }
    fn iterations(&self) -> CoordinatorResult<Vec<IterationRecord>> {
        Ok(self.inner.read().iterations.values().cloned().collect())
    }

    fn insert_assignment(&self, a: &Assignment) -> CoordinatorResult<()> {
        insert_new(&mut self.inner.write().assignments, Table::Assignments, a.id.0, a)
    }
    fn assignment(&self, id: AssignmentId) -> CoordinatorResult<Option<Assignment>> {
        Ok(self.inner.read().assignments.get(&id.0).cloned())
    }
    fn assignments(&self) -> CoordinatorResult<Vec<Assignment>> {
        Ok(self.inner.read().assignments.values().cloned().collect())
    }

    fn insert_submission(&self, s: &Submission) -> CoordinatorResult<()> {
        insert_new(&mut self.inner.write().submissions, Table::Submissions, s.id.0, s)
    }
    fn submissions(&self) -> CoordinatorResult<Vec<Submission>> {
        Ok(self.inner.read().submissions.values().cloned().collect())
    }
}

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, Tree};
use tracing::info;

use super::{CoordinatorStore, Table};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::model::{
    Assignment, AssignmentId, IterationId, IterationRecord, Participant, ParticipantId, Submission,
};

/// Embedded persistent store: one sled tree per table, big-endian id keys so
/// scans come back in insertion order, JSON-encoded values.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    participants: Tree,
    iterations: Tree,
    assignments: Tree,
    submissions: Tree,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> CoordinatorResult<Self> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        let store = Self::from_db(db)?;
        info!(path=%path.display(), iterations=store.iterations.len(), assignments=store.assignments.len(), "sled_store_opened");
        Ok(store)
    }

    /// Throwaway database removed on drop.
    pub fn temporary() -> CoordinatorResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> CoordinatorResult<Self> {
        Ok(Self {
            participants: db.open_tree(Table::Participants.name())?,
            iterations: db.open_tree(Table::Iterations.name())?,
            assignments: db.open_tree(Table::Assignments.name())?,
            submissions: db.open_tree(Table::Submissions.name())?,
            db,
        })
    }

    fn tree(&self, table: Table) -> &Tree {
        match table {
            Table::Participants => &self.participants,
            Table::Iterations => &self.iterations,
            Table::Assignments => &self.assignments,
            Table::Submissions => &self.submissions,
        }
    }

    fn put<T: Serialize>(&self, table: Table, id: u64, value: &T) -> CoordinatorResult<()> {
        let tree = self.tree(table);
        tree.insert(id.to_be_bytes(), serde_json::to_vec(value)?)?;
        tree.flush()?;
        Ok(())
    }

    fn insert_new<T: Serialize>(&self, table: Table, id: u64, value: &T) -> CoordinatorResult<()> {
        let tree = self.tree(table);
        let bytes = serde_json::to_vec(value)?;
        if tree.compare_and_swap(id.to_be_bytes(), None::<&[u8]>, Some(bytes))?.is_err() {
            return Err(CoordinatorError::Storage(format!("{} row {id} already exists", table.name())));
        }
        tree.flush()?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, table: Table, id: u64) -> CoordinatorResult<Option<T>> {
        match self.tree(table).get(id.to_be_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, table: Table) -> CoordinatorResult<Vec<T>> {
        let mut out = Vec::with_capacity(self.tree(table).len());
        for kv in self.tree(table).iter() {
            let (_, raw) = kv?;
            out.push(serde_json::from_slice(&raw)?);
        }
        Ok(out)
    }
}

impl CoordinatorStore for SledStore {
    fn next_id(&self, _table: Table) -> CoordinatorResult<u64> {
        // generate_id starts at 0; keep ids >= 1 like the memory store
        Ok(self.db.generate_id()? + 1)
    }

    fn insert_participant(&self, p: &Participant) -> CoordinatorResult<()> { self.insert_new(Table::Participants, p.id.0, p) }
    fn participant(&self, id: ParticipantId) -> CoordinatorResult<Option<Participant>> { self.get(Table::Participants, id.0) }
    fn participants(&self) -> CoordinatorResult<Vec<Participant>> { self.scan(Table::Participants) }

    fn put_iteration(&self, r: &IterationRecord) -> CoordinatorResult<()> { self.put(Table::Iterations, r.id.0, r) }
    fn iteration(&self, id: IterationId) -> CoordinatorResult<Option<IterationRecord>> { self.get(Table::Iterations, id.0) }
    fn iterations(&self) -> CoordinatorResult<Vec<IterationRecord>> { self.scan(Table::Iterations) }

    fn insert_assignment(&self, a: &Assignment) -> CoordinatorResult<()> { self.insert_new(Table::Assignments, a.id.0, a) }
    fn assignment(&self, id: AssignmentId) -> CoordinatorResult<Option<Assignment>> { self.get(Table::Assignments, id.0) }
    fn assignments(&self) -> CoordinatorResult<Vec<Assignment>> { self.scan(Table::Assignments) }

    fn insert_submission(&self, s: &Submission) -> CoordinatorResult<()> { self.insert_new(Table::Submissions, s.id.0, s) }
    fn submissions(&self) -> CoordinatorResult<Vec<Submission>> { self.scan(Table::Submissions) }
}

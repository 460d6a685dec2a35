//! Storage interface injected into the coordinator components.
//!
//! Implementations only persist and scan records; every business rule lives in
//! the ledger, registry and submission log. Assignment and submission rows are
//! append-only: inserting an id that already exists is a storage failure.

use crate::error::CoordinatorResult;
use crate::model::{
    Assignment, AssignmentId, IterationId, IterationRecord, Participant, ParticipantId, Submission,
};

mod memory;
mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table { Participants, Iterations, Assignments, Submissions }

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Participants => "participants",
            Table::Iterations => "iterations",
            Table::Assignments => "assignments",
            Table::Submissions => "submissions",
        }
    }
}

pub trait CoordinatorStore: Send + Sync {
    /// Monotonic id for `table`; ids never repeat within a table.
    fn next_id(&self, table: Table) -> CoordinatorResult<u64>;

    fn insert_participant(&self, p: &Participant) -> CoordinatorResult<()>;
    fn participant(&self, id: ParticipantId) -> CoordinatorResult<Option<Participant>>;
    fn participants(&self) -> CoordinatorResult<Vec<Participant>>;

    /// Insert or replace (ledger updates rewrite the record in place).
    fn put_iteration(&self, r: &IterationRecord) -> CoordinatorResult<()>;
    fn iteration(&self, id: IterationId) -> CoordinatorResult<Option<IterationRecord>>;
    fn iterations(&self) -> CoordinatorResult<Vec<IterationRecord>>;

    fn insert_assignment(&self, a: &Assignment) -> CoordinatorResult<()>;
    fn assignment(&self, id: AssignmentId) -> CoordinatorResult<Option<Assignment>>;
    fn assignments(&self) -> CoordinatorResult<Vec<Assignment>>;

    fn insert_submission(&self, s: &Submission) -> CoordinatorResult<()>;
    fn submissions(&self) -> CoordinatorResult<Vec<Submission>>;

    fn participant_by_email(&self, email: &str) -> CoordinatorResult<Option<Participant>> {
        Ok(self.participants()?.into_iter().find(|p| p.email.eq_ignore_ascii_case(email)))
    }

    fn iterations_named(&self, name: &str) -> CoordinatorResult<Vec<IterationRecord>> {
        Ok(self.iterations()?.into_iter().filter(|r| r.iteration_name == name).collect())
    }

    fn iterations_owned_by(&self, owner: ParticipantId) -> CoordinatorResult<Vec<IterationRecord>> {
        Ok(self.iterations()?.into_iter().filter(|r| r.owner == owner).collect())
    }

    fn assignments_for_client(&self, client: ParticipantId) -> CoordinatorResult<Vec<Assignment>> {
        Ok(self.assignments()?.into_iter().filter(|a| a.client == client).collect())
    }

    fn assignments_for_owner(&self, owner: ParticipantId) -> CoordinatorResult<Vec<Assignment>> {
        Ok(self.assignments()?.into_iter().filter(|a| a.owner == owner).collect())
    }

    fn assignments_named(&self, name: &str) -> CoordinatorResult<Vec<Assignment>> {
        Ok(self.assignments()?.into_iter().filter(|a| a.iteration_name == name).collect())
    }

    fn submissions_for(&self, assignment: AssignmentId) -> CoordinatorResult<Vec<Submission>> {
        Ok(self.submissions()?.into_iter().filter(|s| s.assignment == assignment).collect())
    }
}

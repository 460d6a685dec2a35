//! Thin adapter over the identity records held in the store.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::clock::Clock;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::input::NewParticipant;
use crate::model::{Participant, ParticipantId, Role};
use crate::store::{CoordinatorStore, Table};

#[derive(Clone)]
pub struct IdentityDirectory {
    store: Arc<dyn CoordinatorStore>,
    clock: Arc<dyn Clock>,
    register_lock: Arc<Mutex<()>>,
}

impl IdentityDirectory {
    pub fn new(store: Arc<dyn CoordinatorStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, register_lock: Arc::new(Mutex::new(())) }
    }

    pub fn register(&self, input: &NewParticipant) -> CoordinatorResult<Participant> {
        let input = input.validate()?;
        let _guard = self.register_lock.lock();
        if self.store.participant_by_email(&input.email)?.is_some() {
            return Err(CoordinatorError::Duplicate(format!("email {} already exists", input.email)));
        }
        let participant = Participant {
            id: ParticipantId(self.store.next_id(Table::Participants)?),
            email: input.email,
            hospital: input.hospital,
            role: input.role,
            created_at: self.clock.now(),
        };
        self.store.insert_participant(&participant)?;
        info!(id=%participant.id, role=%participant.role, "participant_registered");
        Ok(participant)
    }

    pub fn get_participant(&self, id: ParticipantId) -> CoordinatorResult<Participant> {
        self.store.participant(id)?.ok_or_else(|| CoordinatorError::not_found(format!("participant {id}")))
    }

    pub fn find_by_email(&self, email: &str) -> CoordinatorResult<Participant> {
        self.store.participant_by_email(email.trim())?
            .ok_or_else(|| CoordinatorError::not_found(format!("participant {}", email.trim())))
    }

    /// Case-insensitive substring match on email or hospital. Empty text matches everyone.
    pub fn filter_by_role_and_text(&self, role: Role, text: &str) -> CoordinatorResult<Vec<Participant>> {
        let needle = text.trim().to_lowercase();
        Ok(self.store.participants()?.into_iter()
            .filter(|p| p.role == role)
            .filter(|p| needle.is_empty()
                || p.email.to_lowercase().contains(&needle)
                || p.hospital.as_deref().map(|h| h.to_lowercase().contains(&needle)).unwrap_or(false))
            .collect())
    }

    /// Missing participants and role mismatches both surface as `NotFound`.
    pub fn require_role(&self, id: ParticipantId, role: Role) -> CoordinatorResult<Participant> {
        match self.store.participant(id)? {
            Some(p) if p.role == role => Ok(p),
            _ => Err(CoordinatorError::not_found(format!("{role} participant {id}"))),
        }
    }

    pub fn require_role_by_email(&self, email: &str, role: Role) -> CoordinatorResult<Participant> {
        match self.store.participant_by_email(email.trim())? {
            Some(p) if p.role == role => Ok(p),
            _ => Err(CoordinatorError::not_found(format!("{role} participant {}", email.trim()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::MemoryStore;

    fn directory() -> IdentityDirectory { IdentityDirectory::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock)) }

    fn reg(dir: &IdentityDirectory, email: &str, hospital: Option<&str>, role: Role) -> Participant {
        dir.register(&NewParticipant { email: email.into(), hospital: hospital.map(Into::into), role }).unwrap()
    }

    #[test]
    fn duplicate_email_rejected() {
        let dir = directory();
        reg(&dir, "a@h.org", None, Role::Client);
        let err = dir.register(&NewParticipant { email: "A@H.org".into(), hospital: None, role: Role::Central }).unwrap_err();
        assert!(matches!(err, CoordinatorError::Duplicate(_)));
    }

    #[test]
    fn filter_matches_email_or_hospital() {
        let dir = directory();
        reg(&dir, "ops@stmary.org", Some("St. Mary"), Role::Client);
        reg(&dir, "lab@general.org", Some("General Hospital"), Role::Client);
        reg(&dir, "boss@general.org", None, Role::Central);
        assert_eq!(dir.filter_by_role_and_text(Role::Client, "general").unwrap().len(), 1);
        assert_eq!(dir.filter_by_role_and_text(Role::Client, "MARY").unwrap().len(), 1);
        assert_eq!(dir.filter_by_role_and_text(Role::Client, "").unwrap().len(), 2);
        assert_eq!(dir.filter_by_role_and_text(Role::Central, "").unwrap().len(), 1);
    }

    #[test]
    fn require_role_hides_wrong_role() {
        let dir = directory();
        let c = reg(&dir, "c@x.org", None, Role::Central);
        assert!(dir.require_role(c.id, Role::Central).is_ok());
        assert!(matches!(dir.require_role(c.id, Role::Client), Err(CoordinatorError::NotFound(_))));
        assert!(matches!(dir.get_participant(ParticipantId(999)), Err(CoordinatorError::NotFound(_))));
    }
}

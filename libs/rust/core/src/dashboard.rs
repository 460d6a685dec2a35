//! Read-only views composed from the ledger, registry and submission log.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::artifact::ArtifactStore;
use crate::error::CoordinatorResult;
use crate::identity::IdentityDirectory;
use crate::ledger::IterationLedger;
use crate::model::{AssignmentId, IterationId, IterationRecord, IterationStatus, ParticipantId, Role};
use crate::registry::AssignmentRegistry;
use crate::submissions::SubmissionLog;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSummary {
    pub client_email: String,
    pub hospital: Option<String>,
    pub total_rounds: usize,
    pub current_running_rounds: usize,
    pub total_finalized_models: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IterationParticipant {
    pub client_email: String,
    pub client_hospital: Option<String>,
    pub data_domain: String,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRow {
    pub client_email: String,
    pub client_hospital: Option<String>,
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1_score: Option<f64>,
    pub version: u32,
    pub model_file: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentIteration {
    pub assignment_id: AssignmentId,
    pub iteration_name: String,
    pub model_name: String,
    pub data_domain: String,
    pub central_auth_email: String,
    pub version: u32,
}

#[derive(Clone)]
pub struct Dashboard {
    identity: IdentityDirectory,
    ledger: IterationLedger,
    registry: AssignmentRegistry,
    log: SubmissionLog,
    artifacts: Arc<dyn ArtifactStore>,
}

impl Dashboard {
    pub fn new(identity: IdentityDirectory, ledger: IterationLedger, registry: AssignmentRegistry, log: SubmissionLog, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { identity, ledger, registry, log, artifacts }
    }

    /// With status derived from each name's latest record, a name is either
    /// running or finalized, so the two counts never overlap.
    pub fn client_summary(&self, email: &str) -> CoordinatorResult<ClientSummary> {
        let client = self.identity.require_role_by_email(email, Role::Client)?;
        let assignments = self.registry.by_client(client.id)?;
        let statuses = self.ledger.statuses()?;
        let count = |wanted: IterationStatus| assignments.iter().filter(|a| statuses.get(&a.iteration_name) == Some(&wanted)).count();
        Ok(ClientSummary {
            client_email: client.email,
            hospital: client.hospital,
            total_rounds: assignments.len(),
            current_running_rounds: count(IterationStatus::Running),
            total_finalized_models: count(IterationStatus::Finalized),
        })
    }

    pub fn participants_for_name(&self, name: &str) -> CoordinatorResult<Vec<IterationParticipant>> {
        let mut out = Vec::new();
        for a in self.registry.by_iteration_name(name)? {
            let client = self.identity.get_participant(a.client)?;
            out.push(IterationParticipant { client_email: client.email, client_hospital: client.hospital, data_domain: a.domain, assigned_at: a.assigned_at });
        }
        Ok(out)
    }

    pub fn iteration_participants(&self, iteration: IterationId) -> CoordinatorResult<Vec<IterationParticipant>> {
        let record = self.ledger.get(iteration)?;
        self.participants_for_name(&record.iteration_name)
    }

    pub fn iteration_submissions(&self, iteration: IterationId) -> CoordinatorResult<Vec<SubmissionRow>> {
        let record = self.ledger.get(iteration)?;
        let mut out = Vec::new();
        for (a, s) in self.log.latest_per_assignment(&record.iteration_name)? {
            let client = self.identity.get_participant(a.client)?;
            out.push(SubmissionRow {
                client_email: client.email,
                client_hospital: client.hospital,
                accuracy: s.metrics.accuracy,
                precision: s.metrics.precision,
                recall: s.metrics.recall,
                f1_score: s.metrics.f1,
                version: s.version,
                model_file: self.artifacts.url_of(&s.artifact),
                submitted_at: s.created_at,
            });
        }
        Ok(out)
    }

    /// Ledger records (running and finalized) of every name the client is assigned to.
    pub fn client_iterations(&self, client: ParticipantId) -> CoordinatorResult<Vec<IterationRecord>> {
        self.identity.require_role(client, Role::Client)?;
        let mut names: Vec<String> = self.registry.by_client(client)?.into_iter().map(|a| a.iteration_name).collect();
        names.sort();
        names.dedup();
        self.ledger.records_named_any(&names)
    }

    pub fn current_client_iterations(&self, email: &str) -> CoordinatorResult<Vec<CurrentIteration>> {
        let client = self.identity.require_role_by_email(email, Role::Client)?;
        let mut out = Vec::new();
        for running in self.registry.running_for_client(client.id)? {
            let owner = self.identity.get_participant(running.assignment.owner)?;
            let a = running.assignment;
            out.push(CurrentIteration {
                assignment_id: a.id,
                iteration_name: a.iteration_name,
                model_name: a.model_name,
                data_domain: a.domain,
                central_auth_email: owner.email,
                version: running.version,
            });
        }
        Ok(out)
    }
}

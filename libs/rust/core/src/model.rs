//! Domain records for iterations, assignments and submissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self { Self(v) }
        }
    };
}

id_type!(ParticipantId);
id_type!(IterationId);
id_type!(AssignmentId);
id_type!(SubmissionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { Client, Central }

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self { Role::Client => "client", Role::Central => "central" }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "central" => Ok(Role::Central),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub email: String,
    pub hospital: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Reference to a persisted model file. Only the artifact store interprets `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: String,
    pub sha256: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub id: IterationId,
    pub owner: ParticipantId,
    pub iteration_name: String,
    pub model_name: String,
    pub domain: Option<String>,
    /// 0 finalizes the iteration name, anything above is a running round.
    pub version: u32,
    pub artifact: ArtifactRef,
    pub created_at: DateTime<Utc>,
}

impl IterationRecord {
    pub fn is_finalizer(&self) -> bool { self.version == 0 }

    /// Ordering key for "most recent record": creation time, then id.
    pub fn recency(&self) -> (DateTime<Utc>, IterationId) { (self.created_at, self.id) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationStatus { Running, Finalized }

impl IterationStatus {
    pub fn from_version(version: u32) -> Self {
        if version == 0 { IterationStatus::Finalized } else { IterationStatus::Running }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub client: ParticipantId,
    pub owner: ParticipantId,
    pub iteration_name: String,
    pub domain: String,
    pub model_name: String,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    #[serde(alias = "f1_score")]
    pub f1: Option<f64>,
}

impl Metrics {
    pub fn fields(&self) -> [(&'static str, Option<f64>); 4] {
        [("accuracy", self.accuracy), ("precision", self.precision), ("recall", self.recall), ("f1", self.f1)]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub assignment: AssignmentId,
    pub artifact: ArtifactRef,
    pub metrics: Metrics,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// Latest-submission key: max `created_at`, ties broken by max id.
    pub fn recency(&self) -> (DateTime<Utc>, SubmissionId) { (self.created_at, self.id) }
}

//! Typed, range-checked inputs for each coordinator operation.

use serde::{Deserialize, Serialize};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::model::{AssignmentId, Metrics, ParticipantId, Role};

const MAX_NAME_LEN: usize = 255;
const MAX_EMAIL_LEN: usize = 254;

fn required(field: &str, value: &str) -> CoordinatorResult<String> {
    let v = value.trim();
    if v.is_empty() { return Err(CoordinatorError::validation(format!("{field} is required"))); }
    if v.chars().count() > MAX_NAME_LEN {
        return Err(CoordinatorError::validation(format!("{field} exceeds {MAX_NAME_LEN} characters")));
    }
    Ok(v.to_string())
}

fn optional(field: &str, value: Option<&str>) -> CoordinatorResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => required(field, v).map(Some),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewParticipant {
    pub email: String,
    #[serde(default)]
    pub hospital: Option<String>,
    pub role: Role,
}

impl NewParticipant {
    pub fn validate(&self) -> CoordinatorResult<NewParticipant> {
        let email = self.email.trim().to_ascii_lowercase();
        if email.is_empty() { return Err(CoordinatorError::validation("email is required")); }
        if email.len() > MAX_EMAIL_LEN { return Err(CoordinatorError::validation("email is too long")); }
        match email.split_once('@') {
            Some((local, host)) if !local.is_empty() && !host.is_empty() => {}
            _ => return Err(CoordinatorError::validation(format!("'{email}' is not a valid email"))),
        }
        Ok(NewParticipant { email, hospital: optional("hospital", self.hospital.as_deref())?, role: self.role })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIteration {
    pub owner: ParticipantId,
    pub iteration_name: String,
    pub model_name: String,
    #[serde(default)]
    pub domain: Option<String>,
    pub version: u32,
}

impl NewIteration {
    pub fn validate(&self) -> CoordinatorResult<NewIteration> {
        Ok(NewIteration {
            owner: self.owner,
            iteration_name: required("iteration_name", &self.iteration_name)?,
            model_name: required("model_name", &self.model_name)?,
            domain: optional("dataset_domain", self.domain.as_deref())?,
            version: self.version,
        })
    }
}

/// Partial update: `None` keeps the stored value. `domain: Some("")` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationPatch {
    pub owner: Option<ParticipantId>,
    pub iteration_name: Option<String>,
    pub model_name: Option<String>,
    pub domain: Option<String>,
    pub version: Option<u32>,
}

impl IterationPatch {
    pub fn validate(&self) -> CoordinatorResult<IterationPatch> {
        Ok(IterationPatch {
            owner: self.owner,
            iteration_name: self.iteration_name.as_deref().map(|v| required("iteration_name", v)).transpose()?,
            model_name: self.model_name.as_deref().map(|v| required("model_name", v)).transpose()?,
            domain: match self.domain.as_deref() {
                None => None,
                Some(v) if v.trim().is_empty() => Some(String::new()),
                Some(v) => Some(required("dataset_domain", v)?),
            },
            version: self.version,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.iteration_name.is_none() && self.model_name.is_none() && self.domain.is_none() && self.version.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAssignment {
    #[serde(alias = "central_auth_id")]
    pub owner: ParticipantId,
    #[serde(alias = "client_id")]
    pub client: ParticipantId,
    #[serde(alias = "data_domain")]
    pub domain: String,
    pub model_name: String,
    pub iteration_name: String,
}

impl NewAssignment {
    pub fn validate(&self) -> CoordinatorResult<NewAssignment> {
        Ok(NewAssignment {
            owner: self.owner,
            client: self.client,
            domain: required("data_domain", &self.domain)?,
            model_name: required("model_name", &self.model_name)?,
            iteration_name: required("iteration_name", &self.iteration_name)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubmission {
    pub assignment: AssignmentId,
    #[serde(default)]
    pub metrics: Metrics,
    /// Omitted: one past the highest version already submitted for the assignment.
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub acting_client: Option<ParticipantId>,
}

impl NewSubmission {
    pub fn validate(&self) -> CoordinatorResult<NewSubmission> {
        for (name, value) in self.metrics.fields() {
            if let Some(v) = value {
                if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                    return Err(CoordinatorError::validation(format!("{name} must be within [0, 1], got {v}")));
                }
            }
        }
        if self.version == Some(0) {
            return Err(CoordinatorError::validation("submission version must be >= 1"));
        }
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_names_are_trimmed_and_required() {
        let input = NewIteration { owner: ParticipantId(1), iteration_name: "  diag-1 ".into(), model_name: "ResNet50".into(), domain: Some("   ".into()), version: 1 };
        let v = input.validate().unwrap();
        assert_eq!(v.iteration_name, "diag-1");
        assert_eq!(v.domain, None);

        let bad = NewIteration { iteration_name: "".into(), ..input };
        assert!(matches!(bad.validate(), Err(CoordinatorError::Validation(_))));
    }

    #[test]
    fn overlong_name_rejected() {
        let input = NewAssignment { owner: ParticipantId(1), client: ParticipantId(2), domain: "xray".into(), model_name: "m".into(), iteration_name: "x".repeat(256) };
        assert!(input.validate().is_err());
    }

    #[test]
    fn metrics_out_of_range_rejected() {
        let mut sub = NewSubmission { assignment: AssignmentId(1), metrics: Metrics { accuracy: Some(1.2), ..Default::default() }, version: None, acting_client: None };
        assert!(sub.validate().is_err());
        sub.metrics.accuracy = Some(f64::NAN);
        assert!(sub.validate().is_err());
        sub.metrics.accuracy = Some(0.91);
        assert!(sub.validate().is_ok());
        sub.version = Some(0);
        assert!(sub.validate().is_err());
    }

    #[test]
    fn email_normalized() {
        let p = NewParticipant { email: " Ops@Clinic.org ".into(), hospital: Some("St. Mary".into()), role: Role::Client };
        assert_eq!(p.validate().unwrap().email, "ops@clinic.org");
        let bad = NewParticipant { email: "nobody".into(), hospital: None, role: Role::Client };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn patch_domain_clear_marker() {
        let p = IterationPatch { domain: Some(" ".into()), ..Default::default() }.validate().unwrap();
        assert_eq!(p.domain.as_deref(), Some(""));
        assert!(IterationPatch::default().is_empty());
    }
}

//! Multipart form decoding for the upload endpoints.
//!
//! Text fields are collected by name; the single file part is `model_file`.
//! Several field names are accepted under legacy aliases (`central_auth`,
//! `dataset_domain`, `f1_score`, ...).
//!
//! On iteration edits `central_auth` names the user making the edit, not a
//! new owner. Ownership moves only through an explicit `new_owner` field.

use std::collections::HashMap;
use std::str::FromStr;

use axum::extract::Multipart;
use fedround_core::{
    AssignmentId, CoordinatorError, IterationPatch, Metrics, NewIteration, NewSubmission,
    ParticipantId, Upload,
};

use crate::error::ApiResult;

pub const FILE_FIELD: &str = "model_file";

#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    pub file: Option<Upload>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == FILE_FIELD {
                let file_name = field.file_name().unwrap_or("model.bin").to_string();
                let bytes = field.bytes().await?;
                form.file = Some(Upload::new(file_name, bytes.to_vec()));
            } else if !name.is_empty() {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    fn text(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|n| self.fields.get(*n)).map(String::as_str)
    }

    fn parsed<T: FromStr>(&self, names: &[&str]) -> Result<Option<T>, CoordinatorError> {
        match self.text(names).map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some)
                .map_err(|_| CoordinatorError::validation(format!("{} has an invalid value '{raw}'", names[0]))),
        }
    }

    fn require<T: FromStr>(&self, names: &[&str]) -> Result<T, CoordinatorError> {
        self.parsed(names)?.ok_or_else(|| CoordinatorError::validation(format!("{} is required", names[0])))
    }

    pub fn take_file(&mut self) -> Result<Upload, CoordinatorError> {
        self.file.take().ok_or_else(|| CoordinatorError::validation(format!("{FILE_FIELD} is required")))
    }

    pub fn new_iteration(&self) -> Result<NewIteration, CoordinatorError> {
        Ok(NewIteration {
            owner: ParticipantId(self.require(&["central_auth", "central_auth_id", "owner"])?),
            iteration_name: self.text(&["iteration_name"]).unwrap_or_default().to_string(),
            model_name: self.text(&["model_name"]).unwrap_or_default().to_string(),
            domain: self.text(&["dataset_domain", "domain"]).map(str::to_string),
            version: self.require(&["version"])?,
        })
    }

    pub fn iteration_patch(&self) -> Result<IterationPatch, CoordinatorError> {
        Ok(IterationPatch {
            owner: self.parsed(&["new_owner"])?.map(ParticipantId),
            iteration_name: self.text(&["iteration_name"]).map(str::to_string),
            model_name: self.text(&["model_name"]).map(str::to_string),
            domain: self.text(&["dataset_domain", "domain"]).map(str::to_string),
            version: self.parsed(&["version"])?,
        })
    }

    pub fn acting_owner(&self) -> Result<Option<ParticipantId>, CoordinatorError> {
        Ok(self.parsed(&["acting_owner", "central_auth", "central_auth_id"])?.map(ParticipantId))
    }

    pub fn new_submission(&self) -> Result<NewSubmission, CoordinatorError> {
        Ok(NewSubmission {
            assignment: AssignmentId(self.require(&["assignment", "assignment_id"])?),
            metrics: Metrics {
                accuracy: self.parsed(&["accuracy"])?,
                precision: self.parsed(&["precision"])?,
                recall: self.parsed(&["recall"])?,
                f1: self.parsed(&["f1_score", "f1"])?,
            },
            version: self.parsed(&["version"])?,
            acting_client: self.parsed(&["client", "client_id"])?.map(ParticipantId),
        })
    }
}

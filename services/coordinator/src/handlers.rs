use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use fedround_core::{
    Assignment, ClientSummary, Coordinator, CoordinatorError, CoordinatorResult, CurrentIteration,
    IterationId, IterationParticipant, IterationRecord, NewAssignment, NewParticipant, Participant,
    ParticipantId, Role, Submission, SubmissionRow,
};
use serde::Deserialize;
use tracing::debug;

use crate::error::ApiResult;
use crate::forms::UploadForm;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    user_id: Option<String>,
}

impl UserQuery {
    fn owner(&self) -> Result<ParticipantId, CoordinatorError> {
        let raw = self.user_id.as_deref().map(str::trim).unwrap_or_default();
        if raw.is_empty() { return Err(CoordinatorError::validation("user_id parameter is required")); }
        raw.parse().map(ParticipantId).map_err(|_| CoordinatorError::validation(format!("user_id '{raw}' is not a valid id")))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ParticipantQuery {
    role: Option<String>,
    #[serde(default)]
    search: String,
}

/// Runs a synchronous core call on the blocking pool; store writes flush to disk.
async fn blocking<T, F>(st: &AppState, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Coordinator) -> CoordinatorResult<T> + Send + 'static,
{
    let coordinator = st.coordinator.clone();
    let out = tokio::task::spawn_blocking(move || f(&coordinator)).await.map_err(CoordinatorError::from)?;
    Ok(out?)
}

fn parse_id(raw: &str, what: &str) -> Result<u64, CoordinatorError> {
    raw.trim().parse().map_err(|_| CoordinatorError::validation(format!("{what} '{raw}' is not a valid id")))
}

pub async fn register_participant(State(st): State<AppState>, Json(input): Json<NewParticipant>) -> ApiResult<(StatusCode, Json<Participant>)> {
    let p = blocking(&st, move |c| c.identity().register(&input)).await?;
    Ok((StatusCode::CREATED, Json(p)))
}

pub async fn search_participants(State(st): State<AppState>, Query(q): Query<ParticipantQuery>) -> ApiResult<Json<Vec<Participant>>> {
    let role: Role = q.role.as_deref()
        .ok_or_else(|| CoordinatorError::validation("role parameter is required"))?
        .parse()
        .map_err(CoordinatorError::Validation)?;
    Ok(Json(blocking(&st, move |c| c.identity().filter_by_role_and_text(role, &q.search)).await?))
}

pub async fn create_iteration(State(st): State<AppState>, multipart: Multipart) -> ApiResult<(StatusCode, Json<IterationRecord>)> {
    let mut form = UploadForm::read(multipart).await?;
    let input = form.new_iteration()?;
    let upload = form.take_file()?;
    let record = st.coordinator.start_iteration(&input, upload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_iterations(State(st): State<AppState>, Query(q): Query<UserQuery>) -> ApiResult<Json<Vec<IterationRecord>>> {
    let owner = q.owner()?;
    Ok(Json(blocking(&st, move |c| c.ledger().list_all(owner)).await?))
}

pub async fn list_running_iterations(State(st): State<AppState>, Query(q): Query<UserQuery>) -> ApiResult<Json<Vec<IterationRecord>>> {
    let owner = q.owner()?;
    Ok(Json(blocking(&st, move |c| c.ledger().list_running(owner)).await?))
}

pub async fn update_iteration(State(st): State<AppState>, Path(id): Path<String>, multipart: Multipart) -> ApiResult<Json<IterationRecord>> {
    let id = IterationId(parse_id(&id, "iteration id")?);
    let mut form = UploadForm::read(multipart).await?;
    let patch = form.iteration_patch()?;
    let acting_owner = form.acting_owner()?;
    debug!(%id, empty = patch.is_empty(), has_file = form.file.is_some(), "iteration_patch_received");
    let record = st.coordinator.revise_iteration(id, &patch, acting_owner, form.file.take()).await?;
    Ok(Json(record))
}

pub async fn iteration_clients(State(st): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Vec<IterationParticipant>>> {
    let id = IterationId(parse_id(&id, "iteration id")?);
    Ok(Json(blocking(&st, move |c| c.dashboard().iteration_participants(id)).await?))
}

pub async fn iteration_submissions(State(st): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Vec<SubmissionRow>>> {
    let id = IterationId(parse_id(&id, "iteration id")?);
    Ok(Json(blocking(&st, move |c| c.dashboard().iteration_submissions(id)).await?))
}

pub async fn create_assignment(State(st): State<AppState>, Json(input): Json<NewAssignment>) -> ApiResult<(StatusCode, Json<Assignment>)> {
    let a = blocking(&st, move |c| c.assign(&input)).await?;
    Ok((StatusCode::CREATED, Json(a)))
}

pub async fn owner_assignments(State(st): State<AppState>, Path(email): Path<String>) -> ApiResult<Json<Vec<Assignment>>> {
    Ok(Json(blocking(&st, move |c| c.registry().by_owner_email(&email)).await?))
}

pub async fn client_dashboard(State(st): State<AppState>, Path(email): Path<String>) -> ApiResult<Json<ClientSummary>> {
    Ok(Json(blocking(&st, move |c| c.dashboard().client_summary(&email)).await?))
}

pub async fn client_current_iterations(State(st): State<AppState>, Path(email): Path<String>) -> ApiResult<Json<Vec<CurrentIteration>>> {
    Ok(Json(blocking(&st, move |c| c.dashboard().current_client_iterations(&email)).await?))
}

pub async fn client_iterations(State(st): State<AppState>, Path(client): Path<String>) -> ApiResult<Json<Vec<IterationRecord>>> {
    let client = ParticipantId(parse_id(&client, "client id")?);
    Ok(Json(blocking(&st, move |c| c.dashboard().client_iterations(client)).await?))
}

pub async fn submit_model(State(st): State<AppState>, multipart: Multipart) -> ApiResult<(StatusCode, Json<Submission>)> {
    let mut form = UploadForm::read(multipart).await?;
    let input = form.new_submission()?;
    let upload = form.take_file()?;
    let s = st.coordinator.submit_model(&input, upload).await?;
    Ok((StatusCode::CREATED, Json(s)))
}

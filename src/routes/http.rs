//! HTTP endpoint handlers. These are thin wrappers that forward to the store and the evaluator.
//! Each handler is instrumented and logs ids and basic result info, never submitted code.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
  extract::{rejection::JsonRejection, FromRequestParts, Path, State},
  http::{request::Parts, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Contest, Problem, Submission};
use crate::error::EvalError;
use crate::protocol::*;
use crate::state::{AppState, RegisterOutcome};

/// Header carrying the authenticated caller's id (set by the auth proxy in front of us).
pub const USER_ID_HEADER: &str = "x-user-id";

/// Entries returned by the recent-activity endpoint.
const RECENT_ACTIVITY: usize = 10;

/// JSON error with a status code; body is `{ "success": false, "message": ... }`.
#[derive(Debug)]
pub struct ApiError {
  status: StatusCode,
  message: String,
}

impl ApiError {
  fn new(status: StatusCode, message: impl Into<String>) -> Self {
    Self { status, message: message.into() }
  }
  fn bad_request(message: impl Into<String>) -> Self {
    Self::new(StatusCode::BAD_REQUEST, message)
  }
  fn not_found(message: impl Into<String>) -> Self {
    Self::new(StatusCode::NOT_FOUND, message)
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.status, Json(ErrorOut { success: false, message: self.message })).into_response()
  }
}

impl From<EvalError> for ApiError {
  fn from(err: EvalError) -> Self {
    let status = match &err {
      EvalError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
      EvalError::NotFound(_) => StatusCode::NOT_FOUND,
      EvalError::JudgeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      EvalError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
    };
    Self::new(status, err.to_string())
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rej: JsonRejection) -> Self {
    Self::bad_request(rej.body_text())
  }
}

/// Caller identity from the `X-User-Id` header; 401 when absent or blank.
#[derive(Debug, Clone)]
pub struct CallerId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    parts
      .headers
      .get(USER_ID_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .map(|v| CallerId(v.to_string()))
      .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Authentication required"))
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, judge_configured: state.evaluator.judge_configured() })
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_problems(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let problems: Vec<ProblemOut> = state.store.list_problems().await.iter().map(to_out).collect();
  info!(target: "devforces", count = problems.len(), "HTTP problems listed");
  Json(problems)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_problem(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<ProblemOut>, ApiError> {
  let p = state.store.get_problem(&id).await.ok_or_else(|| ApiError::not_found("Problem not found"))?;
  Ok(Json(to_out(&p)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_contests(State(state): State<Arc<AppState>>) -> Json<Vec<Contest>> {
  Json(state.store.list_contests().await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_contest(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<Contest>, ApiError> {
  state.store.get_contest(&id).await.map(Json).ok_or_else(|| ApiError::not_found("Contest not found"))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %user_id))]
pub async fn http_register(
  State(state): State<Arc<AppState>>,
  CallerId(user_id): CallerId,
  body: Result<Json<RegistrationIn>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
  let Json(body) = body?;
  match state.store.register(&user_id, &body.contest_id).await {
    RegisterOutcome::Registered(reg) => {
      info!(target: "devforces", %user_id, contest_id = %reg.contest_id, registration_id = %reg.id, "Contest registration created");
      Ok((StatusCode::CREATED, Json(json!({ "success": true, "registration": reg }))))
    }
    RegisterOutcome::AlreadyRegistered => Err(ApiError::bad_request("Already registered for this contest")),
    RegisterOutcome::UnknownContest => Err(ApiError::not_found("Contest not found")),
  }
}

#[instrument(level = "info", skip(state), fields(user_id = %user_id))]
pub async fn http_unregister(
  State(state): State<Arc<AppState>>,
  CallerId(user_id): CallerId,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  if !state.store.unregister(&user_id, &id).await {
    return Err(ApiError::not_found("Registration not found"));
  }
  info!(target: "devforces", %user_id, registration_id = %id, "Contest registration deleted");
  Ok(Json(json!({ "success": true, "message": "Unregistered from contest" })))
}

/// Evaluate then persist. Nothing is stored when evaluation fails.
#[instrument(level = "info", skip(state, body), fields(user_id = %user_id))]
pub async fn http_create_submission(
  State(state): State<Arc<AppState>>,
  CallerId(user_id): CallerId,
  body: Result<Json<SubmissionIn>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmissionOut>), ApiError> {
  let Json(body) = body?;
  if body.code.trim().is_empty() {
    return Err(ApiError::bad_request("Code is required"));
  }
  if let Some(contest_id) = &body.contest_id {
    if state.store.get_contest(contest_id).await.is_none() {
      return Err(ApiError::not_found("Contest not found"));
    }
  }

  let evaluation = match state.evaluator.evaluate(&body.problem_id, &body.code, &body.language).await {
    Ok(ev) => ev,
    Err(e) => {
      match &e {
        EvalError::NotFound(_) => warn!(target: "devforces", problem_id = %body.problem_id, "Submission for unknown problem"),
        _ => error!(target: "devforces", problem_id = %body.problem_id, policy = ?state.evaluator.policy(), error = %e, "Submission evaluation failed; nothing persisted"),
      }
      return Err(e.into());
    }
  };

  let submission = Submission {
    id: Uuid::new_v4().to_string(),
    user_id,
    problem_id: body.problem_id,
    contest_id: body.contest_id,
    language: body.language,
    code: body.code,
    points: evaluation.scores.final_score,
    created_at: Utc::now(),
  };
  state.store.insert_submission(submission.clone()).await;
  info!(
    target: "devforces",
    submission_id = %submission.id,
    problem_id = %submission.problem_id,
    points = submission.points,
    passed = evaluation.passed,
    total = evaluation.total,
    "Submission stored"
  );
  Ok((StatusCode::CREATED, Json(SubmissionOut { success: true, submission, evaluation })))
}

#[instrument(level = "info", skip(state), fields(user_id = %user_id))]
pub async fn http_get_submission(
  State(state): State<Arc<AppState>>,
  CallerId(user_id): CallerId,
  Path(id): Path<String>,
) -> Result<Json<Submission>, ApiError> {
  // Someone else's submission looks the same as a missing one.
  state
    .store
    .get_submission(&id)
    .await
    .filter(|s| s.user_id == user_id)
    .map(Json)
    .ok_or_else(|| ApiError::not_found("Submission not found"))
}

#[instrument(level = "info", skip(state), fields(user_id = %user_id))]
pub async fn http_list_submissions(
  State(state): State<Arc<AppState>>,
  CallerId(user_id): CallerId,
) -> Json<Vec<Submission>> {
  Json(state.store.submissions_for_user(&user_id).await)
}

#[instrument(level = "info", skip(state), fields(user_id = %user_id))]
pub async fn http_user_progress(
  State(state): State<Arc<AppState>>,
  CallerId(user_id): CallerId,
) -> Json<ProgressOut> {
  Json(state.store.solved_counts(&user_id).await.into())
}

#[instrument(level = "info", skip(state), fields(user_id = %user_id))]
pub async fn http_user_activity(
  State(state): State<Arc<AppState>>,
  CallerId(user_id): CallerId,
) -> impl IntoResponse {
  let activity: Vec<ActivityOut> =
    state.store.recent_activity(&user_id, RECENT_ACTIVITY).await.into_iter().map(Into::into).collect();
  Json(json!({ "success": true, "activity": activity }))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_admin_create_problem(
  State(state): State<Arc<AppState>>,
  body: Result<Json<CreateProblemIn>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
  let Json(body) = body?;
  let problem = body.into_problem().map_err(ApiError::bad_request)?;
  info!(target: "devforces", id = %problem.id, difficulty = %problem.difficulty, test_cases = problem.test_cases.len(), "Problem created");
  state.store.insert_problem(problem.clone()).await;
  Ok((StatusCode::CREATED, Json(problem)))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_admin_update_problem(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  body: Result<Json<UpdateProblemIn>, JsonRejection>,
) -> Result<Json<Problem>, ApiError> {
  let Json(body) = body?;
  let mut problem = state.store.get_problem(&id).await.ok_or_else(|| ApiError::not_found("Problem not found"))?;
  body.apply(&mut problem).map_err(ApiError::bad_request)?;
  state.store.insert_problem(problem.clone()).await;
  info!(target: "devforces", %id, difficulty = %problem.difficulty, "Problem updated");
  Ok(Json(problem))
}

#[instrument(level = "info", skip(state))]
pub async fn http_admin_delete_problem(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  let removed = state.store.delete_problem(&id).await.ok_or_else(|| ApiError::not_found("Problem not found"))?;
  info!(target: "devforces", %id, submissions_removed = removed, "Problem deleted");
  Ok(Json(json!({ "success": true, "message": "Problem and related submissions deleted" })))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_admin_create_contest(
  State(state): State<Arc<AppState>>,
  body: Result<Json<CreateContestIn>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
  let Json(body) = body?;
  let contest = body.into_contest(Utc::now()).map_err(ApiError::bad_request)?;
  info!(target: "devforces", id = %contest.id, status = ?contest.status, "Contest created");
  state.store.insert_contest(contest.clone()).await;
  Ok((StatusCode::CREATED, Json(json!({ "success": true, "contest": contest }))))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_admin_update_contest(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  body: Result<Json<UpdateContestIn>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
  let Json(body) = body?;
  let current = state.store.get_contest(&id).await.ok_or_else(|| ApiError::not_found("Contest not found"))?;
  let contest = body.apply(&current, Utc::now()).map_err(ApiError::bad_request)?;
  state.store.insert_contest(contest.clone()).await;
  info!(target: "devforces", %id, status = ?contest.status, "Contest updated");
  Ok(Json(json!({ "success": true, "contest": contest })))
}

#[instrument(level = "info", skip(state))]
pub async fn http_admin_delete_contest(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  if !state.store.delete_contest(&id).await {
    return Err(ApiError::not_found("Contest not found"));
  }
  info!(target: "devforces", %id, "Contest deleted");
  Ok(Json(json!({ "success": true, "message": "Contest deleted" })))
}

// --- Admin test cases ---

#[instrument(level = "info", skip(state, body))]
pub async fn http_admin_create_test_case(
  State(state): State<Arc<AppState>>,
  body: Result<Json<CreateTestCaseIn>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
  let Json(body) = body?;
  let (problem_id, tc) = body.into_test_case().map_err(ApiError::bad_request)?;
  let tc = state.store.add_test_case(&problem_id, tc).await.ok_or_else(|| ApiError::not_found("Problem not found"))?;
  info!(target: "devforces", %problem_id, test_case_id = %tc.id, is_public = tc.is_public, "Test case created");
  let testcase = TestCaseOut::from((problem_id, tc));
  Ok((StatusCode::CREATED, Json(json!({ "success": true, "testcase": testcase }))))
}

#[instrument(level = "info", skip(state))]
pub async fn http_admin_list_test_cases(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let testcases: Vec<TestCaseOut> = state.store.all_test_cases().await.into_iter().map(Into::into).collect();
  Json(json!({ "success": true, "testcases": testcases }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_admin_get_test_case(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  let found = state.store.find_test_case(&id).await.ok_or_else(|| ApiError::not_found("Test case not found"))?;
  Ok(Json(json!({ "success": true, "testcase": TestCaseOut::from(found) })))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_admin_update_test_case(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  body: Result<Json<UpdateTestCaseIn>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
  let Json(body) = body?;
  let updated = state
    .store
    .update_test_case(&id, |tc| body.apply(tc))
    .await
    .ok_or_else(|| ApiError::not_found("Test case not found"))?;
  info!(target: "devforces", test_case_id = %id, problem_id = %updated.0, "Test case updated");
  Ok(Json(json!({ "success": true, "testcase": TestCaseOut::from(updated) })))
}

#[instrument(level = "info", skip(state))]
pub async fn http_admin_delete_test_case(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  if !state.store.delete_test_case(&id).await {
    return Err(ApiError::not_found("Test case not found"));
  }
  info!(target: "devforces", test_case_id = %id, "Test case deleted");
  Ok(Json(json!({ "success": true, "message": "Test case deleted" })))
}

/// All cases of one problem, hidden ones included. 404 when there are none.
#[instrument(level = "info", skip(state))]
pub async fn http_admin_problem_test_cases(
  State(state): State<Arc<AppState>>,
  Path(problem_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  let cases = state
    .store
    .test_cases_for_problem(&problem_id)
    .await
    .filter(|cases| !cases.is_empty())
    .ok_or_else(|| ApiError::not_found("No test cases found for this problem"))?;
  Ok(Json(json!({ "success": true, "testcases": cases })))
}

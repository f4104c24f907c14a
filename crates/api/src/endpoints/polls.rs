//! Poll endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use livepoll_common::{AppError, AppResult};
use livepoll_core::{CreatePollInput, Poll, UserPollStats};
use serde::Deserialize;
use validator::Validate;

use crate::{
    extractors::{AuthUser, MaybeAuthUser},
    middleware::AppState,
    response::ApiResponse,
};

/// Create poll request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 2, max = 10))]
    pub options: Vec<String>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Vote request. The ledger decides whether the option exists.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub option_id: String,
}

/// List polls whose stored flag is active.
async fn list_polls(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<Poll>>> {
    let polls = state.poll_service.list_active().await?;
    Ok(ApiResponse::ok(polls))
}

/// List polls still accepting votes.
async fn list_open_polls(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<Poll>>> {
    let polls = state.poll_service.list_open().await?;
    Ok(ApiResponse::ok(polls))
}

/// Get a poll.
async fn show_poll(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Poll>> {
    let poll = state.poll_service.get(&id).await?;
    Ok(ApiResponse::ok(poll))
}

/// Create a poll and announce it to every streaming connection.
async fn create_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreatePollRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;

    let poll = state
        .poll_service
        .create(
            &user,
            CreatePollInput {
                title: req.title,
                description: req.description,
                options: req.options,
                end_date: req.end_date,
            },
        )
        .await?;

    state.streaming.publish_poll_created(poll.id());
    Ok((StatusCode::CREATED, ApiResponse::ok(poll)))
}

/// Vote on a poll. Waits for the ledger and returns the updated snapshot.
async fn vote(
    MaybeAuthUser(user): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> AppResult<ApiResponse<Poll>> {
    let poll = state
        .intake
        .vote(user.as_ref(), &id, &req.option_id)
        .await
        .map_err(AppError::from)?;
    Ok(ApiResponse::ok(poll))
}

/// End a poll (creator only).
async fn end_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Poll>> {
    let poll = state.poll_service.end(&id, &user).await?;
    Ok(ApiResponse::ok(poll))
}

/// Polls created by the caller.
async fn my_created_polls(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<Poll>>> {
    let polls = state.poll_service.list_created_by(&user).await?;
    Ok(ApiResponse::ok(polls))
}

/// Polls the caller voted on.
async fn my_voted_polls(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<Poll>>> {
    let polls = state.poll_service.list_voted_by(&user).await?;
    Ok(ApiResponse::ok(polls))
}

/// Counts over the caller's polls and votes.
async fn my_stats(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<UserPollStats>> {
    let stats = state.poll_service.stats(&user).await?;
    Ok(ApiResponse::ok(stats))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_polls).post(create_poll))
        .route("/active", get(list_open_polls))
        .route("/user/created", get(my_created_polls))
        .route("/user/voted", get(my_voted_polls))
        .route("/user/stats", get(my_stats))
        .route("/{id}", get(show_poll))
        .route("/{id}/vote", post(vote))
        .route("/{id}/end", put(end_poll))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_validation() {
        let req: CreatePollRequest = serde_json::from_str(
            r#"{"title":"Lunch?","options":["Pizza","Tacos"],"endDate":"2099-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
        assert!(req.end_date.is_some());

        let req: CreatePollRequest =
            serde_json::from_str(r#"{"title":"","options":["Pizza"]}"#).unwrap();
        let err = req.validate().unwrap_err();
        assert!(err.field_errors().contains_key("title"));
        assert!(err.field_errors().contains_key("options"));
    }

    #[test]
    fn test_vote_request_uses_camel_case() {
        let req: VoteRequest = serde_json::from_str(r#"{"optionId":"abc"}"#).unwrap();
        assert_eq!(req.option_id, "abc");
    }
}

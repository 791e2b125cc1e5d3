use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::server::{AppState, JsonResult, RouteError};
use crate::db::prelude::{ConnectionEvent, MonthlyScore, RankingEntry, UserType};
use crate::identity::Identity;
use crate::scoring::ConnectionResult;

/// Optional month selector; omitted or zero components fall back to the current month.
///
/// Malformed query strings are rejected through [`RouteError`] so clients always get a JSON body.
#[derive(Debug, Default, Deserialize, FromRequestParts)]
#[from_request(via(Query), rejection(RouteError))]
pub struct WindowQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

/// JSON request body with rejections reported as [`RouteError`].
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(RouteError))]
pub struct JsonBody<T>(pub T);

#[derive(Debug, Serialize, Deserialize)]
pub struct TodayStatus {
    pub connected_today: bool,
}

/// Builds the identity a user-scoped route refers to; display fields are irrelevant for reads.
fn subject(user_type: &str, user_id: String) -> Result<Identity, RouteError> {
    let user_type = user_type
        .parse::<UserType>()
        .map_err(|_| RouteError::InvalidUserType(user_type.to_owned()))?;

    Ok(Identity {
        user_id: user_id.into(),
        user_type,
        name: String::new(),
        photo: None,
    })
}

#[instrument(skip(state))]
pub async fn ranking(
    param: WindowQuery,
    State(state): State<Arc<AppState>>,
) -> JsonResult<Vec<RankingEntry>> {
    let window = state.scoring.window(param.year, param.month)?;
    Ok(Json(state.scoring.monthly_ranking(Some(window)).await))
}

#[instrument(skip(state))]
pub async fn user_score(
    State(state): State<Arc<AppState>>,
    Path((user_type, user_id)): Path<(String, String)>,
    param: WindowQuery,
) -> JsonResult<MonthlyScore> {
    let identity = subject(&user_type, user_id)?;
    let window = state.scoring.window(param.year, param.month)?;

    Ok(Json(
        state.scoring.user_score(Some(&identity), Some(window)).await,
    ))
}

#[instrument(skip(state))]
pub async fn user_connections(
    State(state): State<Arc<AppState>>,
    Path((user_type, user_id)): Path<(String, String)>,
    param: WindowQuery,
) -> JsonResult<Vec<ConnectionEvent>> {
    let identity = subject(&user_type, user_id)?;
    let window = state.scoring.window(param.year, param.month)?;

    Ok(Json(
        state.scoring.user_connections(&identity, Some(window)).await,
    ))
}

#[instrument(skip(state))]
pub async fn connected_today(
    State(state): State<Arc<AppState>>,
    Path((user_type, user_id)): Path<(String, String)>,
) -> JsonResult<TodayStatus> {
    let identity = subject(&user_type, user_id)?;
    Ok(Json(TodayStatus {
        connected_today: state.scoring.has_connected_today(&identity).await,
    }))
}

#[instrument(skip(state), fields(user_id = %identity.user_id, user_type = %identity.user_type))]
pub async fn record_connection(
    State(state): State<Arc<AppState>>,
    JsonBody(identity): JsonBody<Identity>,
) -> JsonResult<ConnectionResult> {
    if identity.user_id.as_str().trim().is_empty() {
        return Err(RouteError::MissingUserId);
    }

    Ok(Json(state.scoring.record_connection(&identity).await))
}

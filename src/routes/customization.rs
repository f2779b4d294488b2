//! Customization routes.
//!
//! Every failure is a JSON body with a `detail` string; a version conflict
//! also carries `boardId`, `expected` and `actual` so clients can refetch.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use gridlayout::model::{BoardCustomization, UiCustomization};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::services::customization::{self, CustomizationError, ReplaceMode};
use crate::state::AppState;

#[cfg(test)]
#[path = "customization_test.rs"]
mod tests;

const INTERNAL_DETAIL: &str = "Failed to update board customization";

#[derive(Debug, Deserialize)]
pub struct CustomizationBody {
    #[serde(default)]
    pub boards: Vec<BoardCustomization>,
}

/// `GET /api/customization`: the full document.
pub async fn get_customization(State(state): State<AppState>) -> Result<Json<UiCustomization>, Response> {
    customization::get_customization(&state.pool, &state.user_id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// `POST /api/customization`: create or replace the board list.
pub async fn create_customization(
    State(state): State<AppState>,
    Json(body): Json<CustomizationBody>,
) -> Result<Json<UiCustomization>, Response> {
    customization::replace_customization(&state.pool, &state.user_id, &body.boards, ReplaceMode::CreateOrReplace)
        .await
        .map(Json)
        .map_err(error_response)
}

/// `PUT /api/customization`: replace the board list of an existing document.
pub async fn replace_customization(
    State(state): State<AppState>,
    Json(body): Json<CustomizationBody>,
) -> Result<Json<UiCustomization>, Response> {
    customization::replace_customization(&state.pool, &state.user_id, &body.boards, ReplaceMode::ExistingOnly)
        .await
        .map(Json)
        .map_err(error_response)
}

/// `PUT /api/customization/boards/{board_id}`: upsert one board.
pub async fn put_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Json(board): Json<BoardCustomization>,
) -> Result<Json<BoardCustomization>, Response> {
    customization::upsert_board(&state.pool, &state.user_id, &board_id, board)
        .await
        .map(Json)
        .map_err(error_response)
}

/// `DELETE /api/customization/boards/{board_id}`: remove one board.
pub async fn delete_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
) -> Result<Json<Value>, Response> {
    customization::delete_board(&state.pool, &state.user_id, &board_id)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "message": "Board customization deleted" })))
}

pub(crate) fn customization_error_to_status(err: &CustomizationError) -> StatusCode {
    match err {
        CustomizationError::NotFound => StatusCode::NOT_FOUND,
        CustomizationError::Conflict { .. } => StatusCode::CONFLICT,
        CustomizationError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CustomizationError::Database(_) | CustomizationError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_body(err: &CustomizationError) -> Value {
    match err {
        CustomizationError::Conflict { board_id, expected, actual } => json!({
            "detail": err.to_string(),
            "boardId": board_id,
            "expected": expected,
            "actual": actual,
        }),
        CustomizationError::Database(_) | CustomizationError::Encode(_) => json!({ "detail": INTERNAL_DETAIL }),
        _ => json!({ "detail": err.to_string() }),
    }
}

fn error_response(err: CustomizationError) -> Response {
    let status = customization_error_to_status(&err);
    if status.is_server_error() {
        error!(error = %err, "customization request failed");
    } else {
        warn!(error = %err, %status, "customization request rejected");
    }
    (status, Json(error_body(&err))).into_response()
}

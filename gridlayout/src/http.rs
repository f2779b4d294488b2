//! reqwest-backed customization store.
//!
//! Thin HTTP wrapper over the studyboard server's `/customization` routes.
//! URL building and error-body parsing are pure functions for testability.
//!
//! ERROR HANDLING
//! ==============
//! Non-success replies become [`RepositoryError`] values carrying the server's
//! `detail` text, formatted the way the settings UI shows it: plain strings
//! pass through, validation arrays are flattened to `loc.path: msg` pairs.

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::HttpConfig;
use crate::model::{BoardCustomization, UiCustomization};
use crate::repository::{CustomizationRepository, RepositoryError};

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

const GENERIC_SAVE_ERROR: &str = "Failed to update board customization";

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpRepository {
    http: reqwest::Client,
    base: Url,
}

impl HttpRepository {
    /// Build a client for the API rooted at `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidUrl`] for an unusable base URL or
    /// [`RepositoryError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(config: &HttpConfig) -> Result<Self, RepositoryError> {
        let base = parse_base_url(&config.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| RepositoryError::ClientBuild(e.to_string()))?;
        Ok(Self { http, base })
    }

    /// `GET`/`POST`/`PUT` target for the whole document.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidUrl`] if the base cannot take path segments.
    pub fn customization_url(&self) -> Result<Url, RepositoryError> {
        endpoint(&self.base, &["customization"])
    }

    /// `PUT`/`DELETE` target for one board. The id is percent-encoded.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidUrl`] if the base cannot take path segments.
    pub fn board_url(&self, board_id: &str) -> Result<Url, RepositoryError> {
        endpoint(&self.base, &["customization", "boards", board_id])
    }

    /// Replace the whole board list (`PUT /customization`).
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] if no document exists yet.
    pub async fn replace_all(&self, boards: &[BoardCustomization]) -> Result<UiCustomization, RepositoryError> {
        let url = self.customization_url()?;
        debug!(%url, boards = boards.len(), "replacing customization");
        let body = serde_json::json!({ "boards": boards });
        let response = self
            .http
            .put(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;
        read_json(response).await
    }
}

#[async_trait::async_trait]
impl CustomizationRepository for HttpRepository {
    async fn fetch_all(&self) -> Result<UiCustomization, RepositoryError> {
        let url = self.customization_url()?;
        debug!(%url, "fetching customization");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;
        read_json(response).await
    }

    async fn save(&self, board_id: &str, board: &BoardCustomization) -> Result<BoardCustomization, RepositoryError> {
        let url = self.board_url(board_id)?;
        debug!(%url, cards = board.cards.len(), version = ?board.version, "saving board");
        let response = self
            .http
            .put(url)
            .json(board)
            .send()
            .await
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;
        read_json(response).await
    }

    async fn delete(&self, board_id: &str) -> Result<(), RepositoryError> {
        let url = self.board_url(board_id)?;
        debug!(%url, "deleting board");
        let response = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response
            .text()
            .await
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;
        Err(status_error(board_id, status.as_u16(), &text))
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RepositoryError> {
    let status = response.status();
    let path = response.url().path().to_owned();
    let text = response
        .text()
        .await
        .map_err(|e| RepositoryError::Transport(e.to_string()))?;
    if !status.is_success() {
        return Err(status_error(&path, status.as_u16(), &text));
    }
    serde_json::from_str(&text).map_err(|e| RepositoryError::Decode(e.to_string()))
}

// =============================================================================
// PURE HELPERS
// =============================================================================

fn parse_base_url(raw: &str) -> Result<Url, RepositoryError> {
    let base = Url::parse(raw.trim_end_matches('/')).map_err(|e| RepositoryError::InvalidUrl(format!("{raw}: {e}")))?;
    if base.cannot_be_a_base() {
        return Err(RepositoryError::InvalidUrl(raw.to_owned()));
    }
    Ok(base)
}

fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, RepositoryError> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| RepositoryError::InvalidUrl(base.to_string()))?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

/// Map a non-success reply to an error. `subject` names the board or path.
fn status_error(subject: &str, status: u16, body: &str) -> RepositoryError {
    let parsed = match serde_json::from_str::<Value>(body) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(status, subject, error = %err, "error body is not JSON");
            None
        }
    };

    if status == 404 {
        return RepositoryError::NotFound;
    }
    if status == 409 {
        let versions = parsed.as_ref().and_then(|v| {
            let expected = v.get("expected").and_then(Value::as_i64)?;
            let actual = v.get("actual").and_then(Value::as_i64)?;
            Some((expected, actual))
        });
        if let Some((expected, actual)) = versions {
            let board_id = parsed
                .as_ref()
                .and_then(|v| v.get("boardId"))
                .and_then(Value::as_str)
                .unwrap_or(subject)
                .to_owned();
            return RepositoryError::Conflict { board_id, expected, actual };
        }
    }

    let message = parsed
        .as_ref()
        .and_then(|v| v.get("detail"))
        .and_then(format_error_detail)
        .unwrap_or_else(|| GENERIC_SAVE_ERROR.to_owned());
    RepositoryError::Status { status, message }
}

/// Render a `detail` payload for display: strings verbatim, validation error
/// arrays as `loc.path: msg` joined by commas.
#[must_use]
pub fn format_error_detail(detail: &Value) -> Option<String> {
    match detail {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Array(items) if !items.is_empty() => Some(
            items
                .iter()
                .map(|item| {
                    let loc = item
                        .get("loc")
                        .and_then(Value::as_array)
                        .map(|parts| parts.iter().map(loc_part).collect::<Vec<_>>().join("."))
                        .unwrap_or_default();
                    let msg = item.get("msg").and_then(Value::as_str).unwrap_or("invalid");
                    format!("{loc}: {msg}")
                })
                .collect::<Vec<_>>()
                .join(", "),
        ),
        _ => None,
    }
}

fn loc_part(part: &Value) -> String {
    match part {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

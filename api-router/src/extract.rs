use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};

use crate::error::ApiError;

/// Identifies the caller for every protected route: `X-User-Id` is mandatory, the
/// `X-Project-Id` scope header is optional (its absence means the caller's personal scope).
pub struct UserContext {
    pub user_id: String,
    pub project_id: Option<String>,
}

impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::Unauthorized("missing X-User-Id header".to_string()))?;

        let project_id = parts
            .headers
            .get("x-project-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Ok(Self { user_id, project_id })
    }
}

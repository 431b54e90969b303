use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::database::AppState;

/// Middleware to check for Authorization header
///
/// When `AppConfig::authorization` holds a secret, the request must carry an
/// `Authorization` header with exactly that value. Without a configured
/// secret the check is skipped.
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if let Some(secret) = state.config.authorization.as_deref() {
        let authorized = headers
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == secret);

        if !authorized {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Invalid or missing authorization header",
                    "code": "unauthorized"
                })),
            )
                .into_response());
        }
    }

    Ok(next.run(request).await)
}

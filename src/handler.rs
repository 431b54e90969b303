//! HTTP request handlers for smart links and QR export
//!
//! This module adapts the core operations to HTTP:
//! - Resolving `/s/{code}` and redirecting visitors to the destination
//! - Unlocking password-protected links
//! - Creating links, reading their stats and changing their destination
//! - Rendering a QR spec and returning it in the requested export format

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::database::AppState;
use crate::error::{ApiError, LinkError, RenderError};
use crate::export::{self, ExportFormat};
use crate::model::{
    CreateLinkRequest, CreateLinkResponse, ExportParams, LinkStats, SmartLinkRecord, UnlockRequest,
    UpdateLinkRequest,
};
use crate::qr::{AssetRef, QrSpec};
use crate::smart_link::{self, PasswordOutcome, Resolution};

fn status_json(status: StatusCode, error: &str, code: &str) -> Response {
    (status, Json(json!({ "error": error, "code": code }))).into_response()
}

fn not_found() -> Response {
    status_json(StatusCode::NOT_FOUND, "Smart link not found", "not_found")
}

fn expired() -> Response {
    status_json(StatusCode::GONE, "This link has expired", "expired")
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

/// "Redirecting to ..." page shown to browsers during the display delay
///
/// Serving it counts nothing; both the refresh and the "Go now" link lead to
/// `go_url`, which counts the click and redirects.
#[derive(Template)]
#[template(path = "redirect.html")]
struct RedirectPage<'a> {
    target: &'a str,
    go_url: String,
    delay_secs: u64,
}

impl<'a> RedirectPage<'a> {
    fn new(code: &str, target: &'a str, delay_secs: u64) -> Self {
        Self {
            target,
            go_url: format!("/s/{code}/go"),
            delay_secs,
        }
    }
}

fn stats(state: &AppState, record: SmartLinkRecord) -> LinkStats {
    LinkStats {
        short_url: smart_link::short_url(&state.config.base_url, &record.short_code),
        expired: record.is_expired_at(Utc::now()),
        protected: record.password.is_some(),
        short_code: record.short_code,
        original_url: record.original_url,
        tracking: record.tracking,
        clicks: record.clicks,
        expiry: record.expiry,
        created: record.created,
        updated: record.updated,
    }
}

fn password_required() -> Response {
    status_json(
        StatusCode::UNAUTHORIZED,
        "This link is password protected",
        "password_required",
    )
}

/// Resolves a smart link and sends the visitor on
///
/// # Response
///
/// - **307 Temporary Redirect** - Redirects to the destination, counting a click
/// - **200 OK** - HTML "redirecting" page for browsers when a display delay is
///   configured; the click is counted once the page moves on to `/s/{code}/go`
/// - **401 Unauthorized** - Password required, submit it to `/s/{code}/unlock`
/// - **404 Not Found** - Unknown (or unreadable) short code
/// - **410 Gone** - Link has expired
///
/// # Note
///
/// Uses 307 instead of 301 so browsers never cache the redirect; the
/// destination may change and every visit must be counted.
pub async fn redirect_link(
    Path(code): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let record = match smart_link::resolve(state.store.as_ref(), &code).await {
        Resolution::NotFound => return not_found(),
        Resolution::Expired => return expired(),
        Resolution::PasswordRequired(_) => return password_required(),
        Resolution::ReadyToRedirect(record) => record,
    };

    let delay = state.config.redirect_delay.as_secs();
    if delay > 0 && wants_html(&headers) {
        return match RedirectPage::new(&code, &record.original_url, delay).render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => ApiError::from(err).into_response(),
        };
    }

    follow(&state, &record).await
}

/// Counts the click and redirects; where the redirect page leads
///
/// # Response
///
/// - **307 Temporary Redirect** - Redirects to the destination, counting a click
/// - **401 Unauthorized** / **404 Not Found** / **410 Gone** - As for `/s/{code}`
pub async fn go_link(Path(code): Path<String>, State(state): State<AppState>) -> Response {
    match smart_link::resolve(state.store.as_ref(), &code).await {
        Resolution::NotFound => not_found(),
        Resolution::Expired => expired(),
        Resolution::PasswordRequired(_) => password_required(),
        Resolution::ReadyToRedirect(record) => follow(&state, &record).await,
    }
}

async fn follow(state: &AppState, record: &SmartLinkRecord) -> Response {
    let target = smart_link::track_and_get_target(state.store.as_ref(), record).await;
    debug!(code = %record.short_code, %target, "redirecting");
    Redirect::temporary(&target).into_response()
}

/// Submits a password for a protected link
///
/// # Request Body
///
/// ```json
/// { "password": "abc123" }
/// ```
///
/// # Response
///
/// - **303 See Other** - Password matched, redirects to the destination
/// - **401 Unauthorized** - Incorrect password; the visitor may retry
/// - **404 Not Found** / **410 Gone** - As for the redirect endpoint
pub async fn unlock_link(
    Path(code): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<UnlockRequest>,
) -> Response {
    let record = match smart_link::resolve(state.store.as_ref(), &code).await {
        Resolution::NotFound => return not_found(),
        Resolution::Expired => return expired(),
        Resolution::PasswordRequired(record) | Resolution::ReadyToRedirect(record) => record,
    };

    match smart_link::submit_password(state.store.as_ref(), &record, &payload.password).await {
        PasswordOutcome::Redirect(target) => Redirect::to(&target).into_response(),
        PasswordOutcome::IncorrectPassword => status_json(
            StatusCode::UNAUTHORIZED,
            "Incorrect password",
            "incorrect_password",
        ),
    }
}

/// Creates a new smart link
///
/// # Request Body
///
/// ```json
/// {
///   "url": "https://example.com/menu",
///   "expiry_days": 30,        // Optional
///   "password": "abc123",     // Optional
///   "custom_code": "menu"     // Optional
/// }
/// ```
///
/// # Response
///
/// - **201 Created** - Link created; `short_url` is what goes into the QR code
/// - **400 Bad Request** - Invalid URL, custom code or expiry
/// - **409 Conflict** - Custom code already taken
pub async fn create_link(
    State(state): State<AppState>,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<Response, ApiError> {
    let record = smart_link::create_link(state.store.as_ref(), payload.into(), Utc::now()).await?;

    let response = CreateLinkResponse {
        short_url: smart_link::short_url(&state.config.base_url, &record.short_code),
        protected: record.password.is_some(),
        short_code: record.short_code,
        original_url: record.original_url,
        expiry: record.expiry,
        created: record.created,
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Returns click count and policy of a link. Never includes the password.
pub async fn link_stats(
    Path(code): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LinkStats>, ApiError> {
    let record = state
        .store
        .get(&code)
        .await
        .map_err(LinkError::from)?
        .ok_or(LinkError::NotFound)?;
    Ok(Json(stats(&state, record)))
}

/// Changes where a link points. The short code (and any printed QR code) stays valid.
pub async fn update_link(
    Path(code): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateLinkRequest>,
) -> Result<Json<LinkStats>, ApiError> {
    let record = smart_link::update_destination(state.store.as_ref(), &code, &payload.url).await?;
    Ok(Json(stats(&state, record)))
}

/// Renders a QR spec and returns it as a download
///
/// # Example Request
///
/// `POST /api/qr?format=svg` with a `QrSpec` JSON body
///
/// # Response
///
/// - **200 OK** - Exported bytes with `Content-Type` and an attachment file name
/// - **400 Bad Request** - Empty content, or an image given as a server path
/// - **422 Unprocessable Entity** - Content does not fit the chosen error-correction level
pub async fn render_qr(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
    Json(spec): Json<QrSpec>,
) -> Result<Response, ApiError> {
    // Clients upload images; they never name files on this host
    if spec.style.assets().any(|asset| matches!(asset, AssetRef::Path(_))) {
        return Err(RenderError::InvalidInput("images must be sent as data: URLs".into()).into());
    }

    let format = params.format.unwrap_or_default();
    let image = state.renderer.render(&spec).await?;
    let bytes = export::export(&image, format)?;

    Ok(download(format, bytes))
}

fn download(format: ExportFormat, bytes: Vec<u8>) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"",
        format.file_name(Utc::now().timestamp_millis())
    );
    (
        [
            (header::CONTENT_TYPE, format.mime_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_page_escapes_the_target() {
        let html = RedirectPage::new("abc", r#"https://x.test/?a=1&b="<script>""#, 3)
            .render()
            .unwrap();

        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("a=1&amp;b="));
        assert!(html.contains(r#"content="3;url="#));
        assert!(html.contains("Go now"));
    }

    #[test]
    fn html_detection() {
        let mut headers = HeaderMap::new();
        assert!(!wants_html(&headers));
        headers.insert(header::ACCEPT, "text/html,application/xhtml+xml".parse().unwrap());
        assert!(wants_html(&headers));
    }
}

//! Smart links: creation, resolution and the visitor-side redirect session
//!
//! A smart link is a short code stored in a [`LinkStore`] that points at a
//! mutable destination. Resolving one never fails loudly: a store that cannot
//! be read is indistinguishable from a missing code.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::{distr::Alphanumeric, Rng};
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

use crate::error::{LinkError, StoreError};
use crate::model::{CreateLinkRequest, LinkPatch, SmartLinkRecord};
use crate::store::LinkStore;

/// Length of generated short codes
pub const CODE_LENGTH: usize = 10;

/// Generated codes tried before giving up on a colliding keyspace
pub const MAX_CODE_ATTEMPTS: usize = 5;

pub const CUSTOM_CODE_MIN: usize = 3;
pub const CUSTOM_CODE_MAX: usize = 64;

/// Everything needed to create a link, with defaults already applied
#[derive(Debug, Clone, PartialEq)]
pub struct NewLink {
    pub url: String,
    pub tracking: bool,
    /// Explicit expiry; wins over `expiry_days`
    pub expires_at: Option<DateTime<Utc>>,
    pub expiry_days: Option<u32>,
    pub password: Option<String>,
    pub custom_code: Option<String>,
}

impl NewLink {
    /// Public, tracked, never-expiring link with a generated code.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tracking: true,
            expires_at: None,
            expiry_days: None,
            password: None,
            custom_code: None,
        }
    }
}

impl From<CreateLinkRequest> for NewLink {
    fn from(req: CreateLinkRequest) -> Self {
        Self {
            url: req.url,
            tracking: req.tracking.unwrap_or(true),
            expires_at: req.expires_at,
            expiry_days: req.expiry_days,
            password: req.password,
            // Empty custom codes are treated as absent
            custom_code: req.custom_code.filter(|code| !code.is_empty()),
        }
    }
}

/// Result of looking up a short code
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    NotFound,
    Expired,
    PasswordRequired(SmartLinkRecord),
    ReadyToRedirect(SmartLinkRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordOutcome {
    Redirect(String),
    IncorrectPassword,
}

/// Public URL of a smart link, `{base}/s/{code}`
pub fn short_url(base_url: &str, code: &str) -> String {
    format!("{}/s/{}", base_url.trim_end_matches('/'), code)
}

/// Accepts only absolute http(s) URLs with a host.
pub fn validate_url(raw: &str) -> Result<String, LinkError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(LinkError::InvalidInput("url must not be empty".into()));
    }

    // The stored text becomes a `Location` header verbatim
    if raw.chars().any(char::is_control) {
        return Err(LinkError::InvalidInput("url must not contain control characters".into()));
    }

    let url = Url::parse(raw).map_err(|err| LinkError::InvalidInput(format!("invalid url: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(LinkError::InvalidInput(format!(
            "url must be an absolute http(s) address, got `{raw}`"
        )));
    }
    Ok(raw.to_string())
}

pub fn validate_custom_code(code: &str) -> Result<(), LinkError> {
    let len_ok = (CUSTOM_CODE_MIN..=CUSTOM_CODE_MAX).contains(&code.len());
    let chars_ok = code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if len_ok && chars_ok {
        Ok(())
    } else {
        Err(LinkError::InvalidInput(format!(
            "custom code must be {CUSTOM_CODE_MIN}-{CUSTOM_CODE_MAX} characters of letters, digits, `-` or `_`"
        )))
    }
}

fn generate_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_LENGTH)
        .map(char::from)
        .collect()
}

fn resolve_expiry(link: &NewLink, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, LinkError> {
    match (link.expires_at, link.expiry_days) {
        (Some(at), _) if at <= now => Err(LinkError::InvalidInput("expiry must be in the future".into())),
        (Some(at), _) => Ok(Some(at)),
        (None, Some(0)) => Err(LinkError::InvalidInput("expiry_days must be at least 1".into())),
        (None, Some(days)) => Ok(Some(now + chrono::Duration::days(i64::from(days)))),
        (None, None) => Ok(None),
    }
}

/// Validates `link` and stores it under a fresh (or the requested) code.
///
/// Nothing is written unless every field is valid. A taken custom code is
/// [`LinkError::CodeTaken`]; generated codes are retried on collision.
pub async fn create_link(
    store: &dyn LinkStore,
    link: NewLink,
    now: DateTime<Utc>,
) -> Result<SmartLinkRecord, LinkError> {
    let original_url = validate_url(&link.url)?;
    if let Some(code) = &link.custom_code {
        validate_custom_code(code)?;
    }
    let expiry = resolve_expiry(&link, now)?;
    let password = link.password.clone().filter(|p| !p.is_empty());

    let record_for = |code: String| SmartLinkRecord {
        short_code: code,
        original_url: original_url.clone(),
        tracking: link.tracking,
        expiry,
        password: password.clone(),
        clicks: 0,
        created: now,
        updated: now,
    };

    if let Some(code) = link.custom_code.clone() {
        let record = record_for(code.clone());
        return match store.put(&code, &record).await {
            Ok(()) => Ok(record),
            Err(StoreError::Conflict(_)) => Err(LinkError::CodeTaken(code)),
            Err(err) => Err(err.into()),
        };
    }

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let record = record_for(generate_code());
        match store.put(&record.short_code, &record).await {
            Ok(()) => {
                debug!(code = %record.short_code, "smart link created");
                return Ok(record);
            }
            Err(StoreError::Conflict(code)) => {
                warn!(%code, attempt, "generated short code collided, retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(LinkError::CodeSpaceExhausted)
}

pub async fn resolve(store: &dyn LinkStore, code: &str) -> Resolution {
    resolve_at(store, code, Utc::now()).await
}

/// Looks up `code` as of `now`. Store failures degrade to `NotFound`.
pub async fn resolve_at(store: &dyn LinkStore, code: &str, now: DateTime<Utc>) -> Resolution {
    let record = match store.get(code).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            debug!(code, "smart link not found");
            return Resolution::NotFound;
        }
        Err(err) => {
            warn!(code, error = %err, "smart link unreadable, treating as not found");
            return Resolution::NotFound;
        }
    };

    if record.is_expired_at(now) {
        debug!(code, "smart link expired");
        Resolution::Expired
    } else if record.password.is_some() {
        Resolution::PasswordRequired(record)
    } else {
        Resolution::ReadyToRedirect(record)
    }
}

/// Exact, case-sensitive comparison. Only a match counts a click.
pub async fn submit_password(
    store: &dyn LinkStore,
    record: &SmartLinkRecord,
    attempt: &str,
) -> PasswordOutcome {
    match &record.password {
        Some(password) if password != attempt => {
            debug!(code = %record.short_code, "incorrect password");
            PasswordOutcome::IncorrectPassword
        }
        _ => PasswordOutcome::Redirect(track_and_get_target(store, record).await),
    }
}

/// Counts a click when tracking is on and returns where to send the visitor.
///
/// A failed increment is logged and the redirect still happens.
pub async fn track_and_get_target(store: &dyn LinkStore, record: &SmartLinkRecord) -> String {
    if !record.tracking {
        return record.original_url.clone();
    }

    match store.update(&record.short_code, LinkPatch::click()).await {
        Ok(Some(updated)) => updated.original_url,
        Ok(None) => {
            warn!(code = %record.short_code, "smart link vanished before click was counted");
            record.original_url.clone()
        }
        Err(err) => {
            warn!(code = %record.short_code, error = %err, "failed to count click");
            record.original_url.clone()
        }
    }
}

/// Points an existing link somewhere else. The code and counters are kept.
pub async fn update_destination(
    store: &dyn LinkStore,
    code: &str,
    url: &str,
) -> Result<SmartLinkRecord, LinkError> {
    let url = validate_url(url)?;
    store
        .update(code, LinkPatch::destination(url))
        .await?
        .ok_or(LinkError::NotFound)
}

/// What ended the auto-redirect wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTrigger {
    Elapsed,
    GoNow,
    Aborted,
}

/// Visitor actions that interrupt the auto-redirect countdown
///
/// Clones share the same flags.
#[derive(Debug, Clone)]
pub struct RedirectSignals {
    go_now: Arc<watch::Sender<bool>>,
    abort: Arc<watch::Sender<bool>>,
}

impl Default for RedirectSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl RedirectSignals {
    pub fn new() -> Self {
        let (go_now, _) = watch::channel(false);
        let (abort, _) = watch::channel(false);
        Self {
            go_now: Arc::new(go_now),
            abort: Arc::new(abort),
        }
    }

    /// Skip the rest of the countdown.
    pub fn go_now(&self) {
        self.go_now.send_replace(true);
    }

    /// The visitor navigated away; never redirect.
    pub fn abort(&self) {
        self.abort.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.abort.borrow()
    }
}

/// Waits out `delay` unless a signal arrives first. Abort wins over go-now.
pub async fn await_redirect(delay: Duration, signals: &RedirectSignals) -> RedirectTrigger {
    let mut go_now = signals.go_now.subscribe();
    let mut abort = signals.abort.subscribe();

    tokio::select! {
        biased;
        Ok(_) = abort.wait_for(|aborted| *aborted) => RedirectTrigger::Aborted,
        Ok(_) = go_now.wait_for(|go| *go) => RedirectTrigger::GoNow,
        _ = tokio::time::sleep(delay) => RedirectTrigger::Elapsed,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Loading,
    NotFound,
    Expired,
    PasswordRequired(SmartLinkRecord),
    ReadyToRedirect(SmartLinkRecord),
    Redirecting(String),
}

/// One visitor's walk through a smart link
///
/// `Loading → {NotFound | Expired | PasswordRequired | ReadyToRedirect} →
/// Redirecting`. The click is counted on entering `Redirecting`, which can
/// happen only once per session.
pub struct LinkSession {
    store: Arc<dyn LinkStore>,
    code: String,
    state: SessionState,
}

impl LinkSession {
    pub fn new(store: Arc<dyn LinkStore>, code: impl Into<String>) -> Self {
        Self {
            store,
            code: code.into(),
            state: SessionState::Loading,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Resolves the code. Does nothing once the session has left `Loading`.
    pub async fn load(&mut self) -> &SessionState {
        self.load_at(Utc::now()).await
    }

    pub async fn load_at(&mut self, now: DateTime<Utc>) -> &SessionState {
        if self.state == SessionState::Loading {
            self.state = match resolve_at(self.store.as_ref(), &self.code, now).await {
                Resolution::NotFound => SessionState::NotFound,
                Resolution::Expired => SessionState::Expired,
                Resolution::PasswordRequired(record) => SessionState::PasswordRequired(record),
                Resolution::ReadyToRedirect(record) => SessionState::ReadyToRedirect(record),
            };
        }
        &self.state
    }

    /// Checks `attempt` against the stored password.
    ///
    /// Returns `None` when the session is not waiting for a password. A wrong
    /// attempt leaves the session in `PasswordRequired`.
    pub async fn submit_password(&mut self, attempt: &str) -> Option<PasswordOutcome> {
        let SessionState::PasswordRequired(record) = &self.state else {
            return None;
        };

        let outcome = submit_password(self.store.as_ref(), record, attempt).await;
        if let PasswordOutcome::Redirect(url) = &outcome {
            self.state = SessionState::Redirecting(url.clone());
        }
        Some(outcome)
    }

    /// Redirects immediately from `ReadyToRedirect`.
    ///
    /// Returns the destination; repeated calls return it again without
    /// counting another click.
    pub async fn redirect_now(&mut self) -> Option<String> {
        match &self.state {
            SessionState::ReadyToRedirect(record) => {
                let url = track_and_get_target(self.store.as_ref(), record).await;
                self.state = SessionState::Redirecting(url.clone());
                Some(url)
            }
            SessionState::Redirecting(url) => Some(url.clone()),
            _ => None,
        }
    }

    /// Auto-redirect after `delay`, honouring go-now and abort.
    ///
    /// An aborted wait leaves the session in `ReadyToRedirect`.
    pub async fn run_redirect(&mut self, delay: Duration, signals: &RedirectSignals) -> Option<String> {
        if !matches!(self.state, SessionState::ReadyToRedirect(_)) {
            return self.redirect_now().await;
        }

        match await_redirect(delay, signals).await {
            RedirectTrigger::Aborted => {
                debug!(code = %self.code, "redirect aborted");
                None
            }
            trigger => {
                debug!(code = %self.code, ?trigger, "redirecting");
                self.redirect_now().await
            }
        }
    }
}

use std::time::Duration;

use anyhow::{Context, Result};

use crate::pipeline::Renderer;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Path of the redb file, e.g. "data.db"
    pub database_url: String,

    /// Public origin used when building smart link URLs, e.g. "https://qrenzo.app".
    /// Never has a trailing slash.
    pub base_url: String,

    /// Shared secret required in the `Authorization` header of `/api/*`.
    /// `None` disables the check.
    pub authorization: Option<String>,

    /// Edge length of rendered QR images in pixels
    pub canvas_size: u32,

    /// How long the "redirecting to ..." notice stays up before navigating
    pub redirect_delay: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let base_url = std::env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        let canvas_size = std::env::var("CANVAS_SIZE")
            .unwrap_or_else(|_| Renderer::DEFAULT_SIZE.to_string())
            .parse::<u32>()
            .context("CANVAS_SIZE must be a positive integer")?
            .clamp(Renderer::MIN_SIZE, Renderer::MAX_SIZE);

        let redirect_delay_secs = std::env::var("REDIRECT_DELAY_SECS")
            .unwrap_or_else(|_| "2".into())
            .parse::<u64>()
            .context("REDIRECT_DELAY_SECS must be a whole number of seconds")?;

        // An empty secret is treated as unset
        let authorization = std::env::var("AUTHORIZATION")
            .ok()
            .filter(|secret| !secret.is_empty());

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            database_url: std::env::var("DATABASE_URL").unwrap_or_else(|_| "data.db".into()),
            base_url,
            authorization,
            canvas_size,
            redirect_delay: Duration::from_secs(redirect_delay_secs),
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            database_url: "data.db".into(),
            base_url: "http://localhost:8080".into(),
            authorization: None,
            canvas_size: Renderer::DEFAULT_SIZE,
            redirect_delay: Duration::from_secs(2),
        }
    }
}

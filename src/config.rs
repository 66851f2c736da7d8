use anyhow::{Context, Result};
use std::time::Duration;

use crate::validator;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Public base URL used when generating short links, e.g. "https://go.example.com".
    /// When unset, links are built from the request's Host header.
    /// Never has a trailing slash.
    pub base_url: Option<String>,

    /// Where the browser UI lives. `GET /` redirects here.
    pub frontend_url: String,

    /// Origins allowed to call the API from a browser.
    pub allowed_origins: Vec<String>,

    /// Validity (minutes) applied when a create request omits it.
    pub default_validity_minutes: i64,

    /// How often the background sweep purges expired links.
    pub sweep_interval: Duration,

    /// Resolve country/city for public client IPs via ip-api.com.
    pub geo_lookup: bool,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_source<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = get("PORT")
            .unwrap_or_else(|| "3001".into())
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let base_url = get("BASE_URL")
            .map(|s| s.trim().trim_end_matches('/').to_owned())
            .filter(|s| !s.is_empty());

        let frontend_url = get("FRONTEND_URL")
            .unwrap_or_else(|| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_owned();

        let allowed_origins = match get("ALLOWED_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().trim_end_matches('/').to_owned())
                .filter(|s| !s.is_empty())
                .collect(),
            None => vec![frontend_url.clone(), "http://127.0.0.1:3000".to_owned()],
        };
        // CORS runs with credentials, which cannot be combined with a wildcard.
        if allowed_origins.iter().any(|origin| origin == "*") {
            anyhow::bail!("ALLOWED_ORIGINS must list explicit origins; '*' is not supported");
        }

        let default_validity_minutes = get("DEFAULT_VALIDITY_MINUTES")
            .unwrap_or_else(|| "30".into())
            .parse::<i64>()
            .context("DEFAULT_VALIDITY_MINUTES must be an integer")?;
        if !validator::is_valid_minutes(default_validity_minutes) {
            anyhow::bail!(
                "DEFAULT_VALIDITY_MINUTES must be between 1 and {}",
                validator::MAX_VALIDITY_MINUTES
            );
        }

        let sweep_secs = get("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|| "300".into())
            .parse::<u64>()
            .context("SWEEP_INTERVAL_SECS must be a positive integer")?;
        if sweep_secs == 0 {
            anyhow::bail!("SWEEP_INTERVAL_SECS must not be zero");
        }

        let geo_lookup = get("GEO_LOOKUP")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            base_url,
            frontend_url,
            allowed_origins,
            default_validity_minutes,
            sweep_interval: Duration::from_secs(sweep_secs),
            geo_lookup,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3001,
            base_url: None,
            frontend_url: "http://localhost:3000".into(),
            allowed_origins: vec![
                "http://localhost:3000".into(),
                "http://127.0.0.1:3000".into(),
            ],
            default_validity_minutes: 30,
            sweep_interval: Duration::from_secs(300),
            geo_lookup: false,
        }
    }
}

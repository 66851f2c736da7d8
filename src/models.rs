use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// A stored short link.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortUrlRecord {
    pub id: Uuid,
    pub original_url: String,
    pub shortcode: String,
    #[serde(serialize_with = "iso_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "iso_millis")]
    pub expires_at: DateTime<Utc>,
    /// Always `true` today; an inactive record is treated as absent.
    pub is_active: bool,
}

impl ShortUrlRecord {
    pub fn new(
        original_url: impl Into<String>,
        shortcode: impl Into<String>,
        created_at: DateTime<Utc>,
        validity_minutes: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_url: original_url.into(),
            shortcode: shortcode.into(),
            created_at,
            expires_at: created_at + chrono::Duration::minutes(validity_minutes),
            is_active: true,
        }
    }

    /// Visible to lookups: active and `expires_at` strictly after `now`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

/// One recorded redirect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickEvent {
    pub id: Uuid,
    pub shortcode: String,
    #[serde(serialize_with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub referrer: String,
    pub user_agent: String,
    pub ip: String,
    pub country: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

// ── API payloads ───────────────────────────────────────────────────────────

/// Body of `POST /shorturls`.
///
/// `validity` stays a raw JSON value so that non-integers and strings are
/// reported as validation errors rather than body rejections.
#[derive(Debug, Default, Deserialize)]
pub struct CreateShortUrlRequest {
    pub url: Option<String>,
    pub validity: Option<serde_json::Value>,
    pub shortcode: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShortUrlResponse {
    pub short_link: String,
    #[serde(serialize_with = "iso_millis")]
    pub expiry: DateTime<Utc>,
}

/// Body of `GET /shorturls/:shortcode`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortUrlStats {
    pub shortcode: String,
    pub original_url: String,
    #[serde(serialize_with = "iso_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "iso_millis")]
    pub expires_at: DateTime<Utc>,
    pub total_clicks: usize,
    pub clicks: Vec<ClickEvent>,
}

/// A row of `GET /shorturls`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortUrlSummary {
    pub shortcode: String,
    pub original_url: String,
    #[serde(serialize_with = "iso_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "iso_millis")]
    pub expires_at: DateTime<Utc>,
    pub total_clicks: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(serialize_with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub uptime: f64,
}

/// Serialise as e.g. `2024-01-01T00:00:00.000Z`.
fn iso_millis<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

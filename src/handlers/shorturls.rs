use crate::{
    error::{ApiError, StoreError},
    models::{
        CreateShortUrlRequest, CreateShortUrlResponse, ShortUrlRecord, ShortUrlStats,
        ShortUrlSummary,
    },
    shortcode,
    store::LinkStore,
    validator, AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// POST /shorturls
///
/// Validation runs before anything touches the store, so a rejected request
/// leaves no trace. The shortcode is claimed with a single insert-if-absent.
pub async fn create_short_url(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateShortUrlRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateShortUrlResponse>), ApiError> {
    let Json(req) = payload.map_err(|e| {
        tracing::warn!("Create short URL failed - unreadable body: {}", e.body_text());
        ApiError::validation(format!("Invalid request body: {}", e.body_text()))
    })?;

    let url = match req.url.as_deref() {
        Some(url) if !url.is_empty() => url.to_owned(),
        _ => {
            tracing::warn!("Create short URL failed - missing URL");
            return Err(ApiError::validation("URL is required"));
        }
    };

    if !validator::is_valid_url(&url) {
        tracing::warn!(url = %url, "Create short URL failed - invalid URL format");
        return Err(ApiError::validation("Invalid URL format"));
    }

    let validity = validator::validity_minutes(
        req.validity.as_ref(),
        state.config.default_validity_minutes,
    )
    .ok_or_else(|| {
        tracing::warn!(validity = ?req.validity, "Create short URL failed - invalid validity");
        ApiError::validation(format!(
            "Validity must be a positive integer (max {} minutes)",
            validator::MAX_VALIDITY_MINUTES
        ))
    })?;

    let custom = req.shortcode.as_deref().filter(|s| !s.is_empty());
    let record = assign_shortcode(&state, &url, custom, Utc::now(), validity)?;

    let response = CreateShortUrlResponse {
        short_link: format!("{}/{}", public_base(&state, &headers), record.shortcode),
        expiry: record.expires_at,
    };

    tracing::info!(
        shortcode = %record.shortcode,
        original_url = %record.original_url,
        validity,
        "Short URL created successfully"
    );

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /shorturls/:shortcode
pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<ShortUrlStats>, ApiError> {
    let Some(record) = state.store.lookup(&code) else {
        tracing::warn!(shortcode = %code, "Statistics request failed - shortcode not found");
        return Err(ApiError::not_found("Short URL not found or expired"));
    };
    let clicks = state.store.get_clicks(&code);

    tracing::info!(shortcode = %code, total_clicks = clicks.len(), "Statistics retrieved");

    Ok(Json(ShortUrlStats {
        shortcode: record.shortcode,
        original_url: record.original_url,
        created_at: record.created_at,
        expires_at: record.expires_at,
        total_clicks: clicks.len(),
        clicks,
    }))
}

/// GET /shorturls
pub async fn list_short_urls(State(state): State<Arc<AppState>>) -> Json<Vec<ShortUrlSummary>> {
    let links = state
        .store
        .list_active(Utc::now())
        .into_iter()
        .map(|(record, total_clicks)| ShortUrlSummary {
            shortcode: record.shortcode,
            original_url: record.original_url,
            created_at: record.created_at,
            expires_at: record.expires_at,
            total_clicks,
        })
        .collect();
    Json(links)
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Claim `custom` if given, otherwise a freshly generated code, and store
/// the record under it.
fn assign_shortcode(
    state: &AppState,
    url: &str,
    custom: Option<&str>,
    now: DateTime<Utc>,
    validity: i64,
) -> Result<ShortUrlRecord, ApiError> {
    let Some(code) = custom else {
        let candidates = shortcode::attempt_lengths().map(shortcode::generate);
        return claim_generated(&state.store, url, now, validity, candidates);
    };

    if !shortcode::is_valid(code) {
        tracing::warn!(shortcode = code, "Create short URL failed - invalid shortcode format");
        return Err(ApiError::validation(
            "Shortcode must be 3-20 alphanumeric characters",
        ));
    }

    let record = ShortUrlRecord::new(url, code, now, validity);
    match state.store.create(record.clone()) {
        Ok(()) => Ok(record),
        Err(StoreError::ShortcodeTaken(_)) => {
            tracing::warn!(shortcode = code, "Create short URL failed - shortcode conflict");
            Err(ApiError::conflict("Shortcode already exists"))
        }
    }
}

/// Store the record under the first free code in `candidates`. Running out
/// of candidates is an internal error, not a client one.
fn claim_generated(
    store: &LinkStore,
    url: &str,
    now: DateTime<Utc>,
    validity: i64,
    candidates: impl IntoIterator<Item = String>,
) -> Result<ShortUrlRecord, ApiError> {
    for code in candidates {
        if store.is_shortcode_available(&code) {
            let record = ShortUrlRecord::new(url, code, now, validity);
            match store.create(record.clone()) {
                Ok(()) => return Ok(record),
                Err(StoreError::ShortcodeTaken(code)) => {
                    tracing::debug!(shortcode = %code, "Generated shortcode lost a race, retrying");
                }
            }
        } else {
            tracing::debug!(shortcode = %code, "Generated shortcode collided, retrying");
        }
    }

    tracing::error!("Could not find a free shortcode after exhausting all attempts");
    Err(ApiError::internal())
}

/// Origin short links are built on: the configured base URL, or whatever
/// host the client reached us through.
fn public_base(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.config.base_url {
        return base.clone();
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("localhost:{}", state.config.port));

    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|p| *p == "http" || *p == "https")
        .unwrap_or("http");

    format!("{proto}://{host}")
}

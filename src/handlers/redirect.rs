use crate::{error::ApiError, geo, models::ClickEvent, AppState};
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::{net::SocketAddr, sync::Arc};
use uuid::Uuid;
use woothee::parser::Parser;

/// Address recorded when nothing better is known about the client.
const LOOPBACK: &str = "127.0.0.1";

/// GET /:code
///
/// 1. Resolve the code; unknown and expired codes are both a 404.
/// 2. Record the click synchronously so it is visible as soon as the
///    redirect is sent. Recording never fails the redirect.
/// 3. Return a 302 redirect to the original URL.
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    // ── 1. Resolve URL ─────────────────────────────────────────────────────
    let Some(link) = state.store.lookup(&code) else {
        tracing::warn!(shortcode = %code, "Redirect failed - shortcode not found");
        return Err(ApiError::not_found("Short URL not found or expired"));
    };

    // ── 2. Extract request metadata ────────────────────────────────────────
    let ip = extract_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    let user_agent = header_str(&headers, header::USER_AGENT.as_str())
        .unwrap_or("Unknown")
        .to_owned();

    let referrer = header_str(&headers, header::REFERER.as_str())
        .or_else(|| header_str(&headers, "referrer"))
        .unwrap_or("Direct")
        .to_owned();

    let (browser, os, device_type) = parse_user_agent(Some(&user_agent));
    let (country, city) = geo::locate(&ip, &state.geo_cache, state.config.geo_lookup);

    let click = ClickEvent {
        id: Uuid::new_v4(),
        shortcode: code.clone(),
        timestamp: Utc::now(),
        referrer,
        user_agent,
        ip,
        country,
        city,
        browser,
        os,
        device_type,
    };
    let click_id = click.id;
    state.store.add_click(&code, click);

    tracing::info!(
        shortcode = %code,
        original_url = %link.original_url,
        click_id = %click_id,
        "Redirect successful"
    );

    // ── 3. Redirect ────────────────────────────────────────────────────────
    Ok((StatusCode::FOUND, [(header::LOCATION, link.original_url)]).into_response())
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Determine the client IP: the socket peer first, then the proxy headers,
/// then loopback.
fn extract_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(addr) = peer {
        return addr.ip().to_string();
    }

    // X-Forwarded-For can be a comma-separated list; take the first entry.
    if let Some(ip) = header_str(headers, "x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return ip.to_owned();
    }

    if let Some(real_ip) = header_str(headers, "x-real-ip") {
        return real_ip.to_owned();
    }

    LOOPBACK.to_owned()
}

/// Parse a User-Agent string using woothee and return
/// `(browser_name, os_name, device_category)`.
fn parse_user_agent(ua: Option<&str>) -> (Option<String>, Option<String>, Option<String>) {
    let ua = match ua {
        Some(s) if !s.is_empty() => s,
        _ => return (None, None, None),
    };

    let known = |s: &str| (!s.is_empty() && s != "UNKNOWN").then(|| s.to_owned());

    match Parser::new().parse(ua) {
        Some(result) => (known(&result.name), known(&result.os), known(&result.category)),
        None => (None, None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{body_json, get, test_app};
    use crate::models::ShortUrlRecord;
    use axum::http::HeaderValue;
    use tower::ServiceExt;

    #[tokio::test]
    async fn unknown_code_is_404() {
        let (app, _) = test_app();
        let resp = app.oneshot(get("/nothere")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "NotFoundError");
        assert_eq!(body["statusCode"], 404);
    }

    #[tokio::test]
    async fn known_code_redirects_and_records_one_click() {
        let (app, state) = test_app();
        state
            .store
            .create(ShortUrlRecord::new("https://example.com/landing", "go1234", Utc::now(), 30))
            .unwrap();

        let mut req = get("/go1234");
        req.headers_mut().insert(
            header::USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            ),
        );
        req.headers_mut()
            .insert(header::REFERER, HeaderValue::from_static("https://news.example"));

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "https://example.com/landing"
        );

        let clicks = state.store.get_clicks("go1234");
        assert_eq!(clicks.len(), 1);
        let click = &clicks[0];
        assert_eq!(click.shortcode, "go1234");
        assert_eq!(click.referrer, "https://news.example");
        assert_eq!(click.ip, LOOPBACK);
        assert_eq!(click.country, "Local");
        assert_eq!(click.city, "Local");
        assert_eq!(click.browser.as_deref(), Some("Chrome"));
    }

    #[tokio::test]
    async fn missing_headers_use_defaults() {
        let (app, state) = test_app();
        state
            .store
            .create(ShortUrlRecord::new("https://example.com", "plain1", Utc::now(), 30))
            .unwrap();

        let resp = app.oneshot(get("/plain1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);

        let click = state.store.get_clicks("plain1").pop().unwrap();
        assert_eq!(click.referrer, "Direct");
        assert_eq!(click.user_agent, "Unknown");
        assert_eq!(click.browser, None);
    }

    #[tokio::test]
    async fn expired_code_is_404_and_not_clicked() {
        let (app, state) = test_app();
        let long_ago = Utc::now() - chrono::Duration::hours(1);
        state
            .store
            .create(ShortUrlRecord::new("https://example.com", "old123", long_ago, 1))
            .unwrap();

        let resp = app.oneshot(get("/old123")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(state.store.get_clicks("old123").is_empty());
    }

    #[test]
    fn peer_address_wins_over_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        let peer: SocketAddr = "198.51.100.7:5555".parse().unwrap();
        assert_eq!(extract_ip(&headers, Some(peer)), "198.51.100.7");
    }

    #[test]
    fn forwarded_for_then_real_ip_then_loopback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.2"));
        assert_eq!(extract_ip(&headers, None), "203.0.113.1");

        headers.remove("x-forwarded-for");
        assert_eq!(extract_ip(&headers, None), "203.0.113.2");

        headers.remove("x-real-ip");
        assert_eq!(extract_ip(&headers, None), "127.0.0.1");
    }

    #[test]
    fn user_agent_parsing() {
        let (browser, os, device) = parse_user_agent(Some(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 \
             (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
        ));
        assert_eq!(browser.as_deref(), Some("Safari"));
        assert_eq!(os.as_deref(), Some("iPhone"));
        assert_eq!(device.as_deref(), Some("smartphone"));

        assert_eq!(parse_user_agent(None), (None, None, None));
        assert_eq!(parse_user_agent(Some("Unknown")), (None, None, None));
    }
}

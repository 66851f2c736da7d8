use serde_json::Value;
use url::Url;

/// Longest validity a link may be created with: one year, in minutes.
pub const MAX_VALIDITY_MINUTES: i64 = 525_600;

/// Accepts only absolute `http`/`https` URLs.
pub fn is_valid_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            let ok = matches!(parsed.scheme(), "http" | "https");
            if !ok {
                tracing::warn!(url, scheme = parsed.scheme(), "Invalid URL protocol");
            }
            ok
        }
        Err(e) => {
            tracing::warn!(url, error = %e, "Invalid URL format");
            false
        }
    }
}

/// `true` for an absent validity (the default applies) or a positive
/// integer no larger than [`MAX_VALIDITY_MINUTES`].
pub fn is_valid_validity(value: Option<&Value>) -> bool {
    let ok = match requested_minutes(value) {
        Ok(None) => true,
        Ok(Some(m)) => is_valid_minutes(m),
        Err(()) => false,
    };
    if !ok {
        tracing::warn!(validity = ?value, "Invalid validity period");
    }
    ok
}

/// Resolve the requested validity to a number of minutes, or `None` when
/// it fails [`is_valid_validity`]. Absent or `null` yields `default`.
pub fn validity_minutes(value: Option<&Value>, default: i64) -> Option<i64> {
    if !is_valid_validity(value) {
        return None;
    }
    Some(requested_minutes(value).ok().flatten().unwrap_or(default))
}

/// Integral JSON numbers (including `5.0`) become minutes; absent and
/// `null` are `Ok(None)`; anything else is an error.
fn requested_minutes(value: Option<&Value>) -> Result<Option<i64>, ()> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() <= i64::MAX as f64 {
                    Ok(Some(f as i64))
                } else {
                    Err(())
                }
            } else {
                Err(())
            }
        }
        Some(_) => Err(()),
    }
}

pub fn is_valid_minutes(minutes: i64) -> bool {
    (1..=MAX_VALIDITY_MINUTES).contains(&minutes)
}

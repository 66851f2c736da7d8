use dashmap::{mapref::entry::Entry, DashMap};
use serde::Deserialize;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Placeholder recorded for private, loopback and unparseable addresses.
pub const LOCAL: &str = "Local";

/// Placeholder recorded when a public address has no known location yet.
pub const UNKNOWN: &str = "Unknown";

// ── Types ──────────────────────────────────────────────────────────────────

/// Geolocation data for a single IP address.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoInfo {
    pub country: String,
    pub city: String,
}

/// State of one address in the [`GeoCache`].
#[derive(Debug, Clone)]
enum GeoEntry {
    /// A background lookup has been started and not finished yet.
    Pending,
    /// `None` means we already tried and the lookup failed/returned no data.
    Resolved(Option<GeoInfo>),
}

/// Thread-safe in-memory cache: IP string → lookup state.
#[derive(Clone, Debug, Default)]
pub struct GeoCache {
    inner: Arc<DashMap<String, GeoEntry>>,
}

impl GeoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished lookup for `ip`, if there is one.
    fn resolved(&self, ip: &str) -> Option<Option<GeoInfo>> {
        match self.inner.get(ip).as_deref() {
            Some(GeoEntry::Resolved(info)) => Some(info.clone()),
            Some(GeoEntry::Pending) | None => None,
        }
    }

    /// Mark `ip` as pending. Returns `false` if it was already pending or
    /// resolved, in which case no new lookup should start.
    fn claim(&self, ip: &str) -> bool {
        match self.inner.entry(ip.to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(GeoEntry::Pending);
                true
            }
        }
    }

    fn insert(&self, ip: &str, info: Option<GeoInfo>) {
        self.inner.insert(ip.to_owned(), GeoEntry::Resolved(info));
    }
}

// ── ip-api.com response shape ──────────────────────────────────────────────

#[derive(Deserialize)]
struct IpApiResponse {
    status: String,
    country: Option<String>,
    city: Option<String>,
}

// ── Public API ─────────────────────────────────────────────────────────────

/// Resolve `(country, city)` for a click without touching the network.
///
/// Private addresses are "Local". Public addresses come from the cache when
/// `enabled`; a miss is "Unknown" and starts one background lookup per
/// address, which fills the cache for later clicks from it.
pub fn locate(ip: &str, cache: &GeoCache, enabled: bool) -> (String, String) {
    if is_private(ip) {
        return (LOCAL.to_owned(), LOCAL.to_owned());
    }
    if !enabled {
        return (UNKNOWN.to_owned(), UNKNOWN.to_owned());
    }

    match cache.resolved(ip) {
        Some(Some(info)) => (info.country, info.city),
        Some(None) => (UNKNOWN.to_owned(), UNKNOWN.to_owned()),
        None => {
            if cache.claim(ip) {
                let ip_bg = ip.to_owned();
                let cache_bg = cache.clone();
                tokio::spawn(async move {
                    let result = fetch_geo(&ip_bg).await;
                    cache_bg.insert(&ip_bg, result);
                });
            }
            (UNKNOWN.to_owned(), UNKNOWN.to_owned())
        }
    }
}

/// Look up geolocation for `ip`, using `cache` to avoid repeated network
/// requests for the same address.
///
/// The lookup is performed with a 3-second timeout so it can never stall a
/// background task for long.
pub async fn lookup(ip: &str, cache: &GeoCache) -> Option<GeoInfo> {
    if is_private(ip) {
        return None;
    }

    if let Some(entry) = cache.resolved(ip) {
        return entry;
    }

    let result = fetch_geo(ip).await;

    // Store in cache regardless of outcome so we don't retry endlessly
    cache.insert(ip, result.clone());

    result
}

// ── Internal helpers ───────────────────────────────────────────────────────

async fn fetch_geo(ip: &str) -> Option<GeoInfo> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .ok()?;

    let url = format!("http://ip-api.com/json/{}?fields=status,country,city", ip);

    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| tracing::debug!("geo lookup network error for {}: {}", ip, e))
        .ok()?;

    let body: IpApiResponse = resp
        .json()
        .await
        .map_err(|e| tracing::debug!("geo lookup parse error for {}: {}", ip, e))
        .ok()?;

    if body.status != "success" {
        tracing::debug!("geo lookup returned non-success status for {}", ip);
        return None;
    }

    let country = body.country.filter(|s| !s.is_empty());
    let city = body.city.filter(|s| !s.is_empty());
    if country.is_none() && city.is_none() {
        return None;
    }

    Some(GeoInfo {
        country: country.unwrap_or_else(|| UNKNOWN.to_owned()),
        city: city.unwrap_or_else(|| UNKNOWN.to_owned()),
    })
}

/// Return `true` for addresses that should never be sent to a public
/// geolocation API: loopback, link-local, private ranges, and IPv6 special
/// addresses.
fn is_private(ip_str: &str) -> bool {
    // "::ffff:1.2.3.4" → "1.2.3.4"
    let ip_str = ip_str.strip_prefix("::ffff:").unwrap_or(ip_str);

    match IpAddr::from_str(ip_str) {
        Ok(IpAddr::V4(addr)) => {
            let octets = addr.octets();
            addr.is_loopback()
                || addr.is_link_local()
                || addr.is_unspecified()
                || addr.is_broadcast()
                || octets[0] == 10
                || (octets[0] == 172 && (16..=31).contains(&octets[1]))
                || (octets[0] == 192 && octets[1] == 168)
        }
        Ok(IpAddr::V6(addr)) => {
            addr.is_loopback()
                || addr.is_unspecified()
                // fe80::/10
                || (addr.segments()[0] & 0xffc0) == 0xfe80
                // fc00::/7
                || (addr.segments()[0] & 0xfe00) == 0xfc00
        }
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_ranges() {
        for ip in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.10",
            "169.254.0.1",
            "0.0.0.0",
            "::1",
            "fe80::1",
            "fd00::1",
            "::ffff:192.168.0.1",
            "not-an-ip",
        ] {
            assert!(is_private(ip), "{ip} should be private");
        }
        for ip in ["8.8.8.8", "172.32.0.1", "2001:4860:4860::8888"] {
            assert!(!is_private(ip), "{ip} should be public");
        }
    }

    #[test]
    fn private_addresses_are_local() {
        let cache = GeoCache::new();
        assert_eq!(
            locate("127.0.0.1", &cache, true),
            ("Local".to_owned(), "Local".to_owned())
        );
    }

    #[test]
    fn disabled_lookup_reports_unknown() {
        let cache = GeoCache::new();
        assert_eq!(
            locate("8.8.8.8", &cache, false),
            ("Unknown".to_owned(), "Unknown".to_owned())
        );
    }

    #[test]
    fn cached_entries_are_used() {
        let cache = GeoCache::new();
        cache.insert(
            "8.8.8.8",
            Some(GeoInfo {
                country: "United States".into(),
                city: "Mountain View".into(),
            }),
        );
        cache.insert("1.1.1.1", None);

        assert_eq!(
            locate("8.8.8.8", &cache, true),
            ("United States".to_owned(), "Mountain View".to_owned())
        );
        assert_eq!(
            locate("1.1.1.1", &cache, true),
            ("Unknown".to_owned(), "Unknown".to_owned())
        );
    }

    #[test]
    fn an_address_is_claimed_once() {
        let cache = GeoCache::new();
        assert!(cache.claim("203.0.113.9"));
        assert!(!cache.claim("203.0.113.9"));

        cache.insert("198.51.100.4", None);
        assert!(!cache.claim("198.51.100.4"));
    }

    #[test]
    fn pending_address_starts_no_second_lookup() {
        // No runtime here: a second spawn would panic.
        let cache = GeoCache::new();
        assert!(cache.claim("203.0.113.9"));
        for _ in 0..3 {
            assert_eq!(
                locate("203.0.113.9", &cache, true),
                ("Unknown".to_owned(), "Unknown".to_owned())
            );
        }
        assert_eq!(cache.resolved("203.0.113.9"), None);
    }

    #[tokio::test]
    async fn lookup_skips_private_and_uses_cache() {
        let cache = GeoCache::new();
        assert_eq!(lookup("192.168.0.1", &cache).await, None);

        let info = GeoInfo {
            country: "Japan".into(),
            city: "Tokyo".into(),
        };
        cache.insert("203.0.113.7", Some(info.clone()));
        assert_eq!(lookup("203.0.113.7", &cache).await, Some(info));
    }
}

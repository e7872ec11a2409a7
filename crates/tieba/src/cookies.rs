//! Per-account cookie store.
//!
//! Cookies persist across runs as a flat `name=value;name=value;...` string,
//! the sole persisted-state interface of this crate. Values containing `;` or
//! `=` are a known unhandled edge case (no escaping is performed).

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use rustc_hash::FxHashMap;
use tracing::debug;

#[derive(Debug, Clone)]
struct Cookie {
    value: String,
    /// `None` means a session cookie that never expires within a run.
    expires_at: Option<DateTime<Utc>>,
}

impl Cookie {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

/// Unordered set of name/value cookie pairs scoped to the site's domain.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: FxHashMap<String, Cookie>,
}

impl CookieJar {
    /// Parse a `name=value;name=value` string, trimming surrounding
    /// whitespace from each side. Imported cookies carry no expiry.
    pub fn from_cookie_str(cookie_str: &str) -> Self {
        let mut jar = Self::default();
        jar.load_cookie_str(cookie_str);
        jar
    }

    pub fn load_cookie_str(&mut self, cookie_str: &str) {
        for part in cookie_str.split(';').map(str::trim) {
            if part.is_empty() {
                continue;
            }

            let Some((name, value)) = part.split_once('=') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                continue;
            }

            self.cookies.insert(
                name.to_owned(),
                Cookie {
                    value: value.to_owned(),
                    expires_at: None,
                },
            );
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Serialize all live cookies back to the flat string format, in jar
    /// iteration order (order is not significant downstream). Expired
    /// entries are dropped here.
    pub fn export(&self) -> String {
        let now = Utc::now();
        let mut out = String::new();
        for (name, cookie) in &self.cookies {
            if cookie.is_expired(now) {
                continue;
            }
            if !out.is_empty() {
                out.push(';');
            }
            out.push_str(name);
            out.push('=');
            out.push_str(&cookie.value);
        }
        out
    }

    /// Build a `Cookie` request header value from the live cookies.
    pub(crate) fn header_value(&self) -> Option<String> {
        let now = Utc::now();
        let mut out = String::new();
        for (name, cookie) in &self.cookies {
            if cookie.is_expired(now) {
                continue;
            }
            if !out.is_empty() {
                out.push_str("; ");
            }
            out.push_str(name);
            out.push('=');
            out.push_str(&cookie.value);
        }
        (!out.is_empty()).then_some(out)
    }

    /// Merge `Set-Cookie` response headers into the jar. Received cookies
    /// overwrite same-named existing ones; `Max-Age` takes precedence over
    /// `Expires` when both are present.
    pub(crate) fn store_response_cookies(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(reqwest::header::SET_COOKIE).iter() {
            let Ok(cookie_str) = value.to_str() else {
                continue;
            };

            let mut parts = cookie_str.split(';');
            let Some((name, value)) = parts.next().and_then(|p| p.split_once('=')) else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                continue;
            }

            let mut expires_at = None;
            for attr in parts {
                let attr = attr.trim();
                let (key, attr_value) = match attr.split_once('=') {
                    Some((k, v)) => (k.trim(), v.trim()),
                    None => continue,
                };
                if key.eq_ignore_ascii_case("max-age") {
                    if let Ok(secs) = attr_value.parse::<i64>() {
                        expires_at = Some(Utc::now() + chrono::Duration::seconds(secs));
                        break;
                    }
                } else if key.eq_ignore_ascii_case("expires")
                    && let Ok(when) = DateTime::parse_from_rfc2822(attr_value)
                {
                    expires_at = Some(when.with_timezone(&Utc));
                }
            }

            debug!(name, "storing response cookie");
            self.cookies.insert(
                name.to_owned(),
                Cookie {
                    value: value.to_owned(),
                    expires_at,
                },
            );
        }
    }

    #[cfg(test)]
    fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|c| c.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, SET_COOKIE};

    #[test]
    fn test_load_trims_whitespace() {
        let jar = CookieJar::from_cookie_str(" BDUSS=abc ; STOKEN = xyz ;;");
        assert_eq!(jar.get("BDUSS"), Some("abc"));
        assert_eq!(jar.get("STOKEN"), Some("xyz"));
    }

    #[test]
    fn test_export_round_trip() {
        let jar = CookieJar::from_cookie_str("a=1;b=2;c=3");
        let reloaded = CookieJar::from_cookie_str(&jar.export());
        for name in ["a", "b", "c"] {
            assert_eq!(reloaded.get(name), jar.get(name));
        }
    }

    #[test]
    fn test_expired_cookies_dropped_on_export() {
        let mut jar = CookieJar::from_cookie_str("keep=1");
        jar.cookies.insert(
            "gone".to_owned(),
            Cookie {
                value: "x".to_owned(),
                expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
            },
        );

        let exported = jar.export();
        assert!(exported.contains("keep=1"));
        assert!(!exported.contains("gone"));
        assert!(jar.header_value().unwrap().contains("keep=1"));
        assert!(!jar.header_value().unwrap().contains("gone"));
    }

    #[test]
    fn test_response_cookies_overwrite() {
        let mut jar = CookieJar::from_cookie_str("BDUSS=old");
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("BDUSS=new; Path=/; HttpOnly"),
        );
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("extra=1; Max-Age=3600"),
        );

        jar.store_response_cookies(&headers);
        assert_eq!(jar.get("BDUSS"), Some("new"));
        assert_eq!(jar.get("extra"), Some("1"));
        assert!(jar.cookies["extra"].expires_at.is_some());
    }

    #[test]
    fn test_expires_attribute_parsed() {
        let mut jar = CookieJar::default();
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("old=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT"),
        );

        jar.store_response_cookies(&headers);
        // Already past its expiry, so it never leaves the jar.
        assert!(!jar.export().contains("old"));
    }

    #[test]
    fn test_empty_jar_has_no_header() {
        assert!(CookieJar::default().header_value().is_none());
        assert_eq!(CookieJar::default().export(), "");
    }
}

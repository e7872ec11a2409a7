//! Rate-limited HTTP client.
//!
//! Every network access of an account goes through one `RateLimitedClient`
//! instance, which owns the account's cookie jar and enforces a minimum
//! spacing between consecutive requests so the automation stays below the
//! site's anti-automation thresholds.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, Response};
use tokio::time::Instant;
use tracing::debug;

use crate::cookies::CookieJar;
use crate::error::Result;

/// Minimum spacing between two consecutive requests of one client.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(3);

pub(crate) const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

// The check-in interface only exists on the mobile-formatted pages; requests
// against it carry a mobile user-agent instead of the desktop default.
pub(crate) const MOBILE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

/// Build the shared `reqwest::Client` used by all operators.
pub fn default_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create HTTP client")
}

/// HTTP client bound to one account: cookie jar plus request throttling.
#[derive(Debug, Clone)]
pub struct RateLimitedClient {
    client: Client,
    default_headers: HeaderMap,
    cookies: CookieJar,
    /// Completion instant of the most recent request, mutated only by this
    /// instance.
    last_request: Option<Instant>,
}

impl RateLimitedClient {
    pub fn new(client: Client, cookies: CookieJar) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_UA));
        default_headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        default_headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.8,en-US;q=0.5,en;q=0.3"),
        );

        Self {
            client,
            default_headers,
            cookies,
            last_request: None,
        }
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Export the live cookies for persistence at the end of a work unit.
    pub fn export_cookies(&self) -> String {
        self.cookies.export()
    }

    /// Suspend until `MIN_REQUEST_INTERVAL` has elapsed since the previous
    /// request completed. Deterministic, bounded wait.
    async fn throttle(&self) {
        if let Some(last) = self.last_request {
            let next_allowed = last + MIN_REQUEST_INTERVAL;
            if next_allowed > Instant::now() {
                debug!("throttling request");
                tokio::time::sleep_until(next_allowed).await;
            }
        }
    }

    /// Issue one request. `form` switches the method to POST with a
    /// url-encoded body; `as_mobile` injects the mobile user-agent unless the
    /// caller's extra headers already set one. Non-2xx statuses are errors.
    /// Cookies returned by the server are merged into the jar.
    pub async fn request(
        &mut self,
        url: &str,
        form: Option<&[(&str, &str)]>,
        extra_headers: Option<HeaderMap>,
        as_mobile: bool,
    ) -> Result<Response> {
        self.throttle().await;

        let mut headers = self.default_headers.clone();
        let caller_set_ua = extra_headers
            .as_ref()
            .is_some_and(|h| h.contains_key(USER_AGENT));
        if let Some(extra) = extra_headers {
            for (name, value) in extra.iter() {
                headers.insert(name, value.clone());
            }
        }
        if as_mobile && !caller_set_ua {
            headers.insert(USER_AGENT, HeaderValue::from_static(MOBILE_UA));
        }

        if let Some(cookie_header) = self.cookies.header_value() {
            match HeaderValue::from_str(&cookie_header) {
                Ok(value) => {
                    headers.insert(COOKIE, value);
                }
                Err(e) => {
                    // Malformed cookies: skip the header rather than send an
                    // invalid value.
                    debug!(error = %e, "failed to build Cookie header");
                }
            }
        }

        let method = if form.is_some() {
            Method::POST
        } else {
            Method::GET
        };
        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(form) = form {
            builder = builder.form(form);
        }

        let response = builder.send().await?;
        self.last_request = Some(Instant::now());

        let response = response.error_for_status()?;
        self.cookies.store_response_cookies(response.headers());
        Ok(response)
    }

    pub async fn get_bytes(&mut self, url: &str, as_mobile: bool) -> Result<Bytes> {
        Ok(self.request(url, None, None, as_mobile).await?.bytes().await?)
    }

    /// GET the response body as UTF-8 text (charset from Content-Type wins).
    pub async fn get_text(&mut self, url: &str, as_mobile: bool) -> Result<String> {
        Ok(self.request(url, None, None, as_mobile).await?.text().await?)
    }

    /// GET the response body as text, decoding with `charset` when the
    /// response does not declare one. The favorites listing is served in a
    /// legacy Chinese encoding without a charset header.
    pub async fn get_text_with_charset(
        &mut self,
        url: &str,
        charset: &str,
        as_mobile: bool,
    ) -> Result<String> {
        Ok(self
            .request(url, None, None, as_mobile)
            .await?
            .text_with_charset(charset)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::CookieJar;

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_not_throttled() {
        let client = RateLimitedClient::new(default_client(), CookieJar::default());
        let start = Instant::now();
        client.throttle().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_dispatch_waits_out_min_interval() {
        let mut client = RateLimitedClient::new(default_client(), CookieJar::default());
        client.last_request = Some(Instant::now());

        let start = Instant::now();
        client.throttle().await;
        assert!(start.elapsed() >= MIN_REQUEST_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_already_elapsed() {
        let mut client = RateLimitedClient::new(default_client(), CookieJar::default());
        client.last_request = Some(Instant::now());
        tokio::time::sleep(MIN_REQUEST_INTERVAL * 2).await;

        let start = Instant::now();
        client.throttle().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_mobile_ua_differs_from_default() {
        assert_ne!(DEFAULT_UA, MOBILE_UA);
        assert!(MOBILE_UA.contains("Mobile"));
    }
}

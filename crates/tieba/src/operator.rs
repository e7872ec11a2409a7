//! Per-account operator: favorites listing and the sign convergence loop.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use tracing::{debug, info};

use crate::classify::{BASE_URL, PageState, classify};
use crate::client::RateLimitedClient;
use crate::cookies::CookieJar;
use crate::error::{OperatorError, Result};
use crate::utils::{capture_group_1, decode_entities};

/// Upper bound on fetch+classify iterations of one `sign_forum` call.
pub const SIGN_RETRY_LIMIT: u32 = 10;

const MOBILE_LANDING_URL: &str = "http://tieba.baidu.com/mo/";
const FAVORITES_URL: &str = "http://tieba.baidu.com/f/like/mylike";
/// The favorites listing is served in a legacy Chinese encoding and carries
/// no charset header; every other endpoint is UTF-8.
const FAVORITES_CHARSET: &str = "gbk";
const NEXT_PAGE_MARKER: &str = "下一页";

/// Favorites-tab link on the mobile landing page; the sign URL prefix is
/// derived from it.
static FAVORITES_TAB_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+tab=favorite)""#).unwrap());

/// Forum entry in the favorites listing. A name is accepted only when the
/// title attribute and the inner text are identical, which filters decorated
/// or truncated entries.
static FORUM_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"title="([^"]+)">([^<]+)</a></td>"#).unwrap());

/// Terminal result of one `sign_forum` call. Transport failures are not an
/// outcome; they propagate as `Err` and the caller retries at work-unit
/// granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutcome {
    /// The account no longer follows this forum. Definitive, not an error.
    NotFollowed,
    /// A sign attempt was issued in this call and the server confirmed it.
    Success,
    /// The forum was already signed before this call started.
    AlreadySigned,
    /// The retry bound was exhausted on ambiguous pages.
    UnknownError,
}

impl fmt::Display for SignOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignOutcome::NotFollowed => "not followed",
            SignOutcome::Success => "signed",
            SignOutcome::AlreadySigned => "already signed",
            SignOutcome::UnknownError => "no terminal state within retry limit",
        };
        f.write_str(s)
    }
}

/// Next URL the convergence loop should fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FetchTarget {
    Entry,
    Sign(String),
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Fetch(FetchTarget),
    Terminal(SignOutcome),
}

/// Pure state of one sign convergence loop: whether a sign attempt has been
/// issued, and how many iterations remain. The action is idempotent on the
/// server side, so re-fetching and re-classifying is always safe.
#[derive(Debug)]
struct Convergence {
    sign_issued: bool,
    remaining: u32,
}

impl Convergence {
    fn new() -> Self {
        Self {
            sign_issued: false,
            remaining: SIGN_RETRY_LIMIT,
        }
    }

    /// Consume one iteration and advance on the observed page state.
    fn observe(&mut self, state: PageState) -> Step {
        self.remaining = self.remaining.saturating_sub(1);
        match state {
            PageState::NotFollowed => Step::Terminal(SignOutcome::NotFollowed),
            PageState::Signed => Step::Terminal(if self.sign_issued {
                SignOutcome::Success
            } else {
                SignOutcome::AlreadySigned
            }),
            PageState::Unsigned { sign_url } => {
                self.sign_issued = true;
                self.next(FetchTarget::Sign(sign_url))
            }
            // Discard any sign URL and start over from the entry page. The
            // sign_issued memory survives ambiguity.
            PageState::Ambiguous => self.next(FetchTarget::Entry),
        }
    }

    fn next(&self, target: FetchTarget) -> Step {
        if self.remaining == 0 {
            Step::Terminal(SignOutcome::UnknownError)
        } else {
            Step::Fetch(target)
        }
    }
}

/// Derive the session-scoped sign URL prefix from the mobile landing page.
/// The prefix ends in `?` or `&`, ready for the `kw=` forum parameter.
fn derive_sign_url_prefix(html: &str) -> Result<String> {
    let link = capture_group_1(&FAVORITES_TAB_REGEX, html).ok_or_else(|| {
        OperatorError::Parse("favorites tab link not found on mobile landing page".to_owned())
    })?;

    let link = decode_entities(link);
    let prefix = link
        .strip_suffix("tab=favorite")
        .ok_or_else(|| OperatorError::Parse(format!("unexpected favorites tab link: {link}")))?;
    if !(prefix.ends_with('?') || prefix.ends_with('&')) {
        return Err(OperatorError::Parse(format!(
            "favorites tab link has no query separator: {link}"
        )));
    }

    if prefix.starts_with("http") {
        Ok(prefix.to_owned())
    } else {
        Ok(format!("{BASE_URL}{prefix}"))
    }
}

/// Accumulate one favorites listing page. Returns whether the explicit
/// next-page marker is present, i.e. whether pagination continues.
fn accumulate_favorites_page(names: &mut Vec<String>, html: &str) -> bool {
    names.extend(parse_favorites_page(html));
    html.contains(NEXT_PAGE_MARKER)
}

/// Extract forum names from one favorites listing page, in document order.
fn parse_favorites_page(html: &str) -> Vec<String> {
    FORUM_NAME_REGEX
        .captures_iter(html)
        .filter_map(|caps| {
            let title = caps.get(1)?.as_str();
            let text = caps.get(2)?.as_str();
            (title == text).then(|| title.to_owned())
        })
        .collect()
}

/// One account's operator. Owns the account's rate-limited client and cookie
/// jar; all of the account's forum check-ins go through it sequentially.
pub struct TiebaOperator {
    client: RateLimitedClient,
    /// Discovered lazily from the mobile landing page, cached for the
    /// operator's lifetime.
    sign_url_prefix: Option<String>,
}

impl TiebaOperator {
    pub fn new(client: Client, cookie_str: &str) -> Self {
        Self {
            client: RateLimitedClient::new(client, CookieJar::from_cookie_str(cookie_str)),
            sign_url_prefix: None,
        }
    }

    /// Export the jar for persistence at the end of a work unit.
    pub fn export_cookies(&self) -> String {
        self.client.export_cookies()
    }

    /// Fetch the full followed-forum list, materialized eagerly across all
    /// listing pages.
    pub async fn fetch_favorites(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut page = 1u32;

        loop {
            let url = format!("{FAVORITES_URL}?pn={page}");
            let html = self
                .client
                .get_text_with_charset(&url, FAVORITES_CHARSET, false)
                .await?;

            if !accumulate_favorites_page(&mut names, &html) {
                break;
            }
            page += 1;
        }

        debug!(count = names.len(), "fetched favorites list");
        Ok(names)
    }

    /// Drive one forum's check-in to a terminal outcome.
    ///
    /// Each iteration fetches the current target page (mobile mode) and
    /// classifies it; the page that reports state is the same page that
    /// offers the action link, so there is no atomic "am I signed" query and
    /// the loop converges by re-fetching.
    pub async fn sign_forum(&mut self, name: &str) -> Result<SignOutcome> {
        let prefix = self.sign_url_prefix().await?;
        let entry_url = format!("{prefix}kw={}", urlencoding::encode(name));

        let mut convergence = Convergence::new();
        let mut target = FetchTarget::Entry;

        loop {
            let url = match &target {
                FetchTarget::Entry => entry_url.as_str(),
                FetchTarget::Sign(sign_url) => sign_url.as_str(),
            };
            let html = self.client.get_text(url, true).await?;

            match convergence.observe(classify(&html)) {
                Step::Terminal(outcome) => {
                    info!(forum = name, %outcome, "sign loop converged");
                    return Ok(outcome);
                }
                Step::Fetch(next) => target = next,
            }
        }
    }

    async fn sign_url_prefix(&mut self) -> Result<String> {
        if let Some(prefix) = &self.sign_url_prefix {
            return Ok(prefix.clone());
        }

        let html = self.client.get_text(MOBILE_LANDING_URL, true).await?;
        let prefix = derive_sign_url_prefix(&html)?;
        debug!(prefix = %prefix, "discovered sign url prefix");
        self.sign_url_prefix = Some(prefix.clone());
        Ok(prefix)
    }
}

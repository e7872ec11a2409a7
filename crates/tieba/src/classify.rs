//! Page-state classifier.
//!
//! The check-in surface offers no structured API; state is inferred from raw
//! HTML text markers. Server-rendered fragments are not mutually exclusive in
//! raw text even though the states are semantically exclusive, so the markers
//! are searched in a fixed priority order and the first match wins.

use std::sync::LazyLock;

use regex::Regex;

use crate::utils::{capture_group_1, decode_entities};

pub(crate) const BASE_URL: &str = "http://tieba.baidu.com";

/// "Like this forum" link text shown when the account does not follow it.
const NOT_FOLLOWED_MARKER: &str = "喜欢本吧";
/// Shown once the day's check-in has been recorded.
const SIGNED_MARKER: &str = "已签到";

/// Sign action link on the mobile forum page, e.g.
/// `<a href="mo/q/sign?tn=...&amp;kw=...">签到</a>`.
static SIGN_LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(mo/[^"]+?)">签到"#).unwrap());

/// Semantic state of one fetched forum page. Derived transiently; never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    /// The account does not follow this forum.
    NotFollowed,
    /// Not signed today; `sign_url` is the absolute URL of the sign action.
    Unsigned { sign_url: String },
    /// Today's check-in is already recorded.
    Signed,
    /// No recognized marker: malformed page, interstitial, or transient
    /// inconsistency. Retryable, not fatal.
    Ambiguous,
}

/// Classify one HTML document. Pure and deterministic.
pub fn classify(html: &str) -> PageState {
    if html.contains(NOT_FOLLOWED_MARKER) {
        return PageState::NotFollowed;
    }

    if let Some(link) = capture_group_1(&SIGN_LINK_REGEX, html) {
        let sign_url = format!("{BASE_URL}/{}", decode_entities(link));
        return PageState::Unsigned { sign_url };
    }

    if html.contains(SIGNED_MARKER) {
        return PageState::Signed;
    }

    PageState::Ambiguous
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNSIGNED_PAGE: &str =
        r#"<div class="sign"><a href="mo/q/sign?tn=bdsign&amp;kw=rust&amp;ssid=0">签到</a></div>"#;

    #[test]
    fn test_unsigned_extracts_decoded_absolute_url() {
        match classify(UNSIGNED_PAGE) {
            PageState::Unsigned { sign_url } => {
                assert_eq!(
                    sign_url,
                    "http://tieba.baidu.com/mo/q/sign?tn=bdsign&kw=rust&ssid=0"
                );
            }
            other => panic!("expected Unsigned, got {other:?}"),
        }
    }

    #[test]
    fn test_signed_marker() {
        assert_eq!(classify("<span>已签到</span>"), PageState::Signed);
    }

    #[test]
    fn test_not_followed_marker() {
        assert_eq!(
            classify(r#"<a href="mo/q/like?kw=rust">喜欢本吧</a>"#),
            PageState::NotFollowed
        );
    }

    #[test]
    fn test_ambiguous_when_no_marker_matches() {
        assert_eq!(classify("<html><body>verify</body></html>"), PageState::Ambiguous);
        assert_eq!(classify(""), PageState::Ambiguous);
    }

    #[test]
    fn test_not_followed_wins_over_signed() {
        let html = "<div>喜欢本吧</div><div>已签到</div>";
        assert_eq!(classify(html), PageState::NotFollowed);
    }

    #[test]
    fn test_sign_link_wins_over_signed_marker() {
        let html = format!("{UNSIGNED_PAGE}<div>昨日已签到</div>");
        assert!(matches!(classify(&html), PageState::Unsigned { .. }));
    }

    #[test]
    fn test_classify_is_deterministic() {
        let html = format!("{UNSIGNED_PAGE}<p>已签到</p>");
        assert_eq!(classify(&html), classify(&html));
    }
}

use regex::Regex;

#[inline]
pub fn capture_group_1<'a>(re: &Regex, input: &'a str) -> Option<&'a str> {
    re.captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Decode the HTML entities that occur inside href attributes.
///
/// Only the fixed named entities below appear in the markup this crate
/// consumes; this is not a general-purpose HTML decoder.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_owned();
    }

    input
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_capture_group_1() {
        let re = Regex::new(r#"href="([^"]+)""#).unwrap();
        assert_eq!(
            capture_group_1(&re, r#"<a href="/mo/q/sign">go</a>"#),
            Some("/mo/q/sign")
        );
        assert_eq!(capture_group_1(&re, "<a>no href</a>"), None);
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(
            decode_entities("mo/q/sign?tn=x&amp;kw=rust"),
            "mo/q/sign?tn=x&kw=rust"
        );
        assert_eq!(decode_entities("plain"), "plain");
        assert_eq!(decode_entities("&quot;&#39;&lt;&gt;"), "\"'<>");
    }
}

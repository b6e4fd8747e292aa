//! Conditional request negotiation (RFC 7232).
//!
//! All predicates compare request validator headers against the validators
//! already present on the response (`ETag`, `Last-Modified`). Reading them
//! back from the response, rather than recomputing, keeps validators set by
//! a custom headers hook authoritative.

use super::date::parse_http_date;
use crate::fs::FileStat;
use axum::http::{HeaderMap, header};

/// Weak entity tag derived from size and modification time.
pub fn weak_etag(stat: &FileStat) -> String {
    format!("W/\"{:x}-{:x}\"", stat.size, stat.modified)
}

/// Whether the request carries any cache validator header.
pub fn is_conditional(request: &HeaderMap) -> bool {
    [
        header::IF_MATCH,
        header::IF_NONE_MATCH,
        header::IF_MODIFIED_SINCE,
        header::IF_UNMODIFIED_SINCE,
    ]
    .iter()
    .any(|name| get(request, name).is_some_and(|value| !value.is_empty()))
}

/// Whether `If-Match` or `If-Unmodified-Since` rejects the current resource.
///
/// `If-Match` takes precedence; `If-Unmodified-Since` is only evaluated in
/// its absence and only when it parses as a date. An `If-Match` list passes
/// when any listed tag weakly matches the current one.
pub fn is_precondition_failed(request: &HeaderMap, response: &HeaderMap) -> bool {
    if let Some(condition) = get(request, &header::IF_MATCH).filter(|value| !value.is_empty()) {
        let Some(etag) = get(response, &header::ETAG) else {
            return true;
        };
        return condition.trim() != "*" && !etag_list_matches(condition, etag);
    }

    let unmodified_since =
        get(request, &header::IF_UNMODIFIED_SINCE).and_then(parse_http_date);

    if let Some(unmodified_since) = unmodified_since {
        return match get(response, &header::LAST_MODIFIED).and_then(parse_http_date) {
            Some(last_modified) => last_modified > unmodified_since,
            None => true,
        };
    }

    false
}

/// Whether the client's cached copy is still fresh (`304 Not Modified`).
///
/// Follows the usual cache rules: a `no-cache` request is never fresh;
/// `If-None-Match` must match the current tag; `If-Modified-Since` must not
/// predate the current `Last-Modified`.
pub fn is_fresh(request: &HeaderMap, response: &HeaderMap) -> bool {
    let modified_since = get(request, &header::IF_MODIFIED_SINCE).filter(|v| !v.is_empty());
    let none_match = get(request, &header::IF_NONE_MATCH).filter(|v| !v.is_empty());

    if modified_since.is_none() && none_match.is_none() {
        return false;
    }

    if get(request, &header::CACHE_CONTROL).is_some_and(has_no_cache) {
        return false;
    }

    if let Some(none_match) = none_match {
        if none_match.trim() != "*" {
            let Some(etag) = get(response, &header::ETAG) else {
                return false;
            };
            if !etag_list_matches(none_match, etag) {
                return false;
            }
        }
    }

    if let Some(modified_since) = modified_since {
        let last_modified = get(response, &header::LAST_MODIFIED).and_then(parse_http_date);
        let modified_since = parse_http_date(modified_since);

        match (last_modified, modified_since) {
            (Some(last_modified), Some(modified_since)) if last_modified <= modified_since => {}
            _ => return false,
        }
    }

    true
}

/// Whether a `Range` may be honoured given `If-Range`.
///
/// Absent `If-Range` is fresh. An entity tag must match the current tag; a
/// date must equal the current `Last-Modified` exactly.
pub fn is_range_fresh(request: &HeaderMap, response: &HeaderMap) -> bool {
    let Some(if_range) = get(request, &header::IF_RANGE).filter(|v| !v.is_empty()) else {
        return true;
    };

    if is_etag(if_range) {
        return get(response, &header::ETAG).is_some_and(|etag| etag_list_matches(if_range, etag));
    }

    match (
        parse_http_date(if_range),
        get(response, &header::LAST_MODIFIED).and_then(parse_http_date),
    ) {
        (Some(if_range), Some(last_modified)) => if_range == last_modified,
        _ => false,
    }
}

fn get<'a>(headers: &'a HeaderMap, name: &header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn is_etag(value: &str) -> bool {
    let value = value.strip_prefix("W/").unwrap_or(value);
    value.len() > 2 && value.starts_with('"') && value.ends_with('"')
}

/// Weak comparison: `W/"x"` and `"x"` are equivalent.
fn etag_matches(candidate: &str, etag: &str) -> bool {
    let strip = |tag: &str| tag.strip_prefix("W/").unwrap_or(tag).to_owned();
    candidate == etag || strip(candidate) == strip(etag)
}

fn etag_list_matches(list: &str, etag: &str) -> bool {
    list.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .any(|token| etag_matches(token, etag))
}

fn has_no_cache(cache_control: &str) -> bool {
    cache_control
        .split(',')
        .any(|directive| directive.trim().eq_ignore_ascii_case("no-cache"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const LAST_MODIFIED: &str = "Sun, 06 Nov 1994 08:49:37 GMT";
    const EARLIER: &str = "Sat, 05 Nov 1994 08:49:37 GMT";
    const LATER: &str = "Mon, 07 Nov 1994 08:49:37 GMT";

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn response() -> HeaderMap {
        headers(&[
            (header::ETAG, "W/\"a-1\""),
            (header::LAST_MODIFIED, LAST_MODIFIED),
        ])
    }

    #[test]
    fn test_weak_etag_format() {
        let stat = FileStat {
            size: 255,
            is_dir: false,
            modified: 4096,
        };
        assert_eq!(weak_etag(&stat), "W/\"ff-1000\"");
    }

    #[test]
    fn test_is_conditional() {
        assert!(!is_conditional(&HeaderMap::new()));
        assert!(!is_conditional(&headers(&[(header::RANGE, "bytes=0-1")])));
        assert!(is_conditional(&headers(&[(header::IF_MATCH, "*")])));
        assert!(is_conditional(&headers(&[(header::IF_NONE_MATCH, "\"x\"")])));
        assert!(is_conditional(&headers(&[(header::IF_MODIFIED_SINCE, LAST_MODIFIED)])));
        assert!(is_conditional(&headers(&[(header::IF_UNMODIFIED_SINCE, LAST_MODIFIED)])));
    }

    #[test]
    fn test_if_match() {
        let res = response();
        assert!(!is_precondition_failed(&headers(&[(header::IF_MATCH, "*")]), &res));
        assert!(!is_precondition_failed(&headers(&[(header::IF_MATCH, "W/\"a-1\"")]), &res));
        // Weak equivalence
        assert!(!is_precondition_failed(&headers(&[(header::IF_MATCH, "\"a-1\"")]), &res));
        assert!(!is_precondition_failed(
            &headers(&[(header::IF_MATCH, "\"zzz\", \"a-1\"")]),
            &res
        ));
        assert!(is_precondition_failed(&headers(&[(header::IF_MATCH, "\"stale\"")]), &res));
    }

    #[test]
    fn test_if_match_list_passes_on_any_tag() {
        let res = response();
        assert!(!is_precondition_failed(
            &headers(&[(header::IF_MATCH, "\"a-1\", \"old\", \"older\"")]),
            &res
        ));
        assert!(!is_precondition_failed(
            &headers(&[(header::IF_MATCH, "\"old\",W/\"a-1\"")]),
            &res
        ));
        assert!(is_precondition_failed(
            &headers(&[(header::IF_MATCH, "\"old\", \"older\"")]),
            &res
        ));
    }

    #[test]
    fn test_if_match_without_etag_fails() {
        let res = headers(&[(header::LAST_MODIFIED, LAST_MODIFIED)]);
        assert!(is_precondition_failed(&headers(&[(header::IF_MATCH, "*")]), &res));
    }

    #[test]
    fn test_if_unmodified_since() {
        let res = response();
        assert!(!is_precondition_failed(
            &headers(&[(header::IF_UNMODIFIED_SINCE, LAST_MODIFIED)]),
            &res
        ));
        assert!(!is_precondition_failed(
            &headers(&[(header::IF_UNMODIFIED_SINCE, LATER)]),
            &res
        ));
        assert!(is_precondition_failed(
            &headers(&[(header::IF_UNMODIFIED_SINCE, EARLIER)]),
            &res
        ));
        // Unparseable dates are ignored
        assert!(!is_precondition_failed(
            &headers(&[(header::IF_UNMODIFIED_SINCE, "garbage")]),
            &res
        ));
    }

    #[test]
    fn test_fresh_if_none_match() {
        let res = response();
        assert!(is_fresh(&headers(&[(header::IF_NONE_MATCH, "W/\"a-1\"")]), &res));
        assert!(is_fresh(&headers(&[(header::IF_NONE_MATCH, "\"a-1\"")]), &res));
        assert!(is_fresh(&headers(&[(header::IF_NONE_MATCH, "*")]), &res));
        assert!(!is_fresh(&headers(&[(header::IF_NONE_MATCH, "\"b-2\"")]), &res));
    }

    #[test]
    fn test_fresh_if_modified_since() {
        let res = response();
        assert!(is_fresh(&headers(&[(header::IF_MODIFIED_SINCE, LAST_MODIFIED)]), &res));
        assert!(is_fresh(&headers(&[(header::IF_MODIFIED_SINCE, LATER)]), &res));
        assert!(!is_fresh(&headers(&[(header::IF_MODIFIED_SINCE, EARLIER)]), &res));
    }

    #[test]
    fn test_not_fresh_with_no_cache_or_without_validators() {
        let res = response();
        assert!(!is_fresh(&HeaderMap::new(), &res));
        assert!(!is_fresh(
            &headers(&[
                (header::IF_NONE_MATCH, "W/\"a-1\""),
                (header::CACHE_CONTROL, "max-age=0, no-cache"),
            ]),
            &res
        ));
        // Validator requested but not present on the response
        assert!(!is_fresh(
            &headers(&[(header::IF_NONE_MATCH, "W/\"a-1\"")]),
            &headers(&[(header::LAST_MODIFIED, LAST_MODIFIED)])
        ));
    }

    #[test]
    fn test_range_fresh() {
        let res = response();
        assert!(is_range_fresh(&HeaderMap::new(), &res));
        assert!(is_range_fresh(&headers(&[(header::IF_RANGE, "W/\"a-1\"")]), &res));
        assert!(!is_range_fresh(&headers(&[(header::IF_RANGE, "\"other\"")]), &res));
        assert!(is_range_fresh(&headers(&[(header::IF_RANGE, LAST_MODIFIED)]), &res));
        // Exact match only, a later date is not fresh
        assert!(!is_range_fresh(&headers(&[(header::IF_RANGE, LATER)]), &res));
        assert!(!is_range_fresh(&headers(&[(header::IF_RANGE, "nonsense")]), &res));
    }

    #[test]
    fn test_range_fresh_etag_without_response_etag() {
        let res = headers(&[(header::LAST_MODIFIED, LAST_MODIFIED)]);
        assert!(!is_range_fresh(&headers(&[(header::IF_RANGE, "\"a-1\"")]), &res));
    }
}

//! Session cookie helpers
//!
//! Cookies are built and parsed by hand: the only cookie this API touches
//! is its own session token.

use axum::http::{header, HeaderMap};

pub const SESSION_COOKIE: &str = "wordcapture_session";

pub fn session_cookie(token: &str, max_age_hours: i64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    )
}

pub fn clear_session_cookie() -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        SESSION_COOKIE
    )
}

pub fn get_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(str::trim)
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val.to_string())
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("TOKEN123", 24);
        assert!(cookie.starts_with("wordcapture_session=TOKEN123;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=86400"));
    }

    #[test]
    fn test_clear_cookie_zeroes_max_age() {
        let cookie = clear_session_cookie();
        assert!(cookie.starts_with("wordcapture_session=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_get_cookie_value_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("other=1; wordcapture_session=TOKEN123; theme=dark"),
        );

        assert_eq!(
            get_cookie_value(&headers, SESSION_COOKIE),
            Some("TOKEN123".to_string())
        );
        assert_eq!(get_cookie_value(&headers, "missing"), None);
    }
}

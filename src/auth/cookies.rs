use axum::http::{header, HeaderMap};

use crate::config::AuthConfig;

pub fn access_cookie(auth: &AuthConfig, token: &str) -> String {
    build_cookie(
        &auth.access_cookie,
        token,
        auth.access_token_days * 24 * 3600,
        auth.secure_cookies,
    )
}

pub fn refresh_cookie(auth: &AuthConfig, token: &str) -> String {
    build_cookie(
        &auth.refresh_cookie,
        token,
        auth.refresh_token_days * 24 * 3600,
        auth.secure_cookies,
    )
}

pub fn clear_cookie(auth: &AuthConfig, name: &str) -> String {
    build_cookie(name, "", 0, auth.secure_cookies)
}

fn build_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn get_cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, value.parse().unwrap());
        headers
    }

    #[test]
    fn access_cookie_is_http_only_lax_with_week_max_age() {
        let cookie = access_cookie(&AuthConfig::default(), "abc");
        assert_eq!(
            cookie,
            "access_token=abc; HttpOnly; SameSite=Lax; Path=/; Max-Age=604800"
        );
    }

    #[test]
    fn secure_flag_follows_config() {
        let auth = AuthConfig {
            secure_cookies: true,
            ..AuthConfig::default()
        };
        assert!(refresh_cookie(&auth, "x").ends_with("; Secure"));
        assert!(clear_cookie(&auth, "refresh_token").contains("Max-Age=0"));
    }

    #[test]
    fn finds_named_cookie_among_others() {
        let headers = headers_with(header::COOKIE, "theme=dark; access_token=tok123; other=1");
        assert_eq!(get_cookie_value(&headers, "access_token"), Some("tok123"));
        assert_eq!(get_cookie_value(&headers, "refresh_token"), None);
    }

    #[test]
    fn empty_cookie_value_is_ignored() {
        let headers = headers_with(header::COOKIE, "access_token=");
        assert_eq!(get_cookie_value(&headers, "access_token"), None);
    }

    #[test]
    fn bearer_token_is_extracted() {
        let headers = headers_with(header::AUTHORIZATION, "Bearer tok456");
        assert_eq!(bearer_token(&headers), Some("tok456"));
        let headers = headers_with(header::AUTHORIZATION, "Basic abc");
        assert_eq!(bearer_token(&headers), None);
    }
}

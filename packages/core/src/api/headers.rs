use axum::http::{HeaderName, HeaderValue};
use axum::http::header;

/// Header name carrying the admin API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// `Cache-Control: no-store` for live status endpoints.
pub fn no_store() -> (HeaderName, HeaderValue) {
    (header::CACHE_CONTROL, HeaderValue::from_static("no-store"))
}

/// `Cache-Control: private, max-age=<secs>`.
pub fn private_max_age(secs: u64) -> (HeaderName, HeaderValue) {
    let value = HeaderValue::from_str(&format!("private, max-age={}", secs))
        .unwrap_or_else(|_| HeaderValue::from_static("no-store"));
    (header::CACHE_CONTROL, value)
}

/// Compare two secrets without short-circuiting on the first mismatch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_age_header_is_formatted() {
        let (name, value) = private_max_age(5);
        assert_eq!(name, header::CACHE_CONTROL);
        assert_eq!(value, "private, max-age=5");
    }

    #[test]
    fn constant_time_eq_matches_only_identical_input() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret-longer"));
    }
}

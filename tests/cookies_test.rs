use turbonet::cookies::{parse_set_cookie, CookieMap};
use turbonet::http::orderedheaders::ResponseHeaders;

#[test]
fn test_parse_name_value() {
    let parsed = parse_set_cookie("session=abc123; Path=/; HttpOnly; Secure");
    assert_eq!(parsed, Some(("session".to_string(), "abc123".to_string())));
}

#[test]
fn test_parse_rejects_garbage() {
    assert_eq!(parse_set_cookie(""), None);
    assert_eq!(parse_set_cookie("no-equals-sign"), None);
}

#[test]
fn test_cookie_map_from_headers() {
    let mut headers = ResponseHeaders::new();
    headers.append("Set-Cookie", "a=1; Path=/");
    headers.append("Content-Type", "text/plain");
    headers.append("set-cookie", "b=2; Max-Age=60");
    headers.append("Set-Cookie", "a=3");

    let cookies = CookieMap::from_headers(&headers);
    assert_eq!(cookies.len(), 2);
    assert_eq!(cookies.get("a"), Some("3"));
    assert_eq!(cookies.get("b"), Some("2"));
}

#[test]
fn test_cookie_map_empty_without_set_cookie() {
    let mut headers = ResponseHeaders::new();
    headers.append("Content-Type", "text/plain");
    assert!(CookieMap::from_headers(&headers).is_empty());
}

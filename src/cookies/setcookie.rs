use crate::http::orderedheaders::ResponseHeaders;
use cookie::Cookie;

/// Parse one `Set-Cookie` header value into its name and value.
///
/// Returns `None` if the value is not a cookie at all.
pub fn parse_set_cookie(value: &str) -> Option<(String, String)> {
    match Cookie::parse(value) {
        Ok(c) => Some((c.name().to_string(), c.value().to_string())),
        Err(e) => {
            tracing::debug!(error = %e, "skipping unparseable Set-Cookie value");
            None
        }
    }
}

/// Cookie name to value mapping, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieMap {
    cookies: Vec<(String, String)>,
}

impl CookieMap {
    pub fn new() -> Self {
        Self {
            cookies: Vec::new(),
        }
    }

    /// Collect every `Set-Cookie` line of a response.
    ///
    /// A later line for the same name replaces the earlier value.
    pub fn from_headers(headers: &ResponseHeaders) -> Self {
        let mut map = Self::new();
        for value in headers.get_all("set-cookie") {
            if let Some((name, value)) = parse_set_cookie(value) {
                map.insert(name, value);
            }
        }
        map
    }

    pub fn insert(&mut self, name: String, value: String) {
        if let Some((_, v)) = self.cookies.iter_mut().find(|(n, _)| *n == name) {
            *v = value;
        } else {
            self.cookies.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

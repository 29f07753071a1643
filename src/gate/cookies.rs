//! Request cookie parsing and the cookie side channel of identity resolution.
//!
//! Resolvers never touch the request directly. They return
//! [`CookieMutation`]s, which the gate applies twice: to the forwarded
//! request's `Cookie` header and to the response as `Set-Cookie`.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lax => f.write_str("Lax"),
            Self::Strict => f.write_str("Strict"),
            Self::None => f.write_str("None"),
        }
    }
}

/// Attributes shared by every cookie a resolver writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            http_only: true,
            secure: true,
            same_site: SameSite::Lax,
        }
    }
}

impl CookieOptions {
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// A cookie write requested while resolving identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieMutation {
    pub name: String,
    pub value: String,
    pub max_age: Option<i64>,
    pub options: CookieOptions,
}

impl CookieMutation {
    #[must_use]
    pub fn set(
        name: impl Into<String>,
        value: impl Into<String>,
        max_age: Option<i64>,
        options: &CookieOptions,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age,
            options: options.clone(),
        }
    }

    /// Expire the cookie on the client and drop it from the request.
    #[must_use]
    pub fn remove(name: impl Into<String>, options: &CookieOptions) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            max_age: Some(0),
            options: options.clone(),
        }
    }

    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.max_age == Some(0)
    }

    /// Render as a `Set-Cookie` header value.
    ///
    /// # Errors
    /// Returns an error if the name or value contains bytes not allowed in a header.
    pub fn to_set_cookie(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!("{}={}; Path={}", self.name, self.value, self.options.path);
        if let Some(max_age) = self.max_age {
            cookie.push_str(&format!("; Max-Age={max_age}"));
        }
        if self.options.http_only {
            cookie.push_str("; HttpOnly");
        }
        cookie.push_str(&format!("; SameSite={}", self.options.same_site));
        if self.options.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}

/// Cookies sent with the request, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestCookies {
    pairs: Vec<(String, String)>,
}

impl RequestCookies {
    /// Parse every `Cookie` header; pairs without `=` or with an empty name are skipped.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let pairs = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { pairs }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn apply(&mut self, mutation: &CookieMutation) {
        if mutation.is_removal() {
            self.pairs.retain(|(key, _)| *key != mutation.name);
            return;
        }
        match self.pairs.iter_mut().find(|(key, _)| *key == mutation.name) {
            Some(pair) => pair.1.clone_from(&mutation.value),
            None => self
                .pairs
                .push((mutation.name.clone(), mutation.value.clone())),
        }
    }

    /// Rebuild the `Cookie` header, `None` when no cookies remain.
    ///
    /// # Errors
    /// Returns an error if a cookie value cannot be encoded as a header.
    pub fn to_header_value(&self) -> Result<Option<HeaderValue>, InvalidHeaderValue> {
        if self.pairs.is_empty() {
            return Ok(None);
        }
        let joined = self
            .pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&joined).map(Some)
    }

    /// Replace the request's `Cookie` header with the current cookie set.
    ///
    /// # Errors
    /// Returns an error if a cookie value cannot be encoded as a header.
    pub fn write_to(&self, headers: &mut HeaderMap) -> Result<(), InvalidHeaderValue> {
        headers.remove(COOKIE);
        if let Some(value) = self.to_header_value()? {
            headers.insert(COOKIE, value);
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestCookies {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1; b = 2"));
        headers.append(COOKIE, HeaderValue::from_static("malformed; c=3=3; =x"));

        let cookies = RequestCookies::from_headers(&headers);
        assert_eq!(cookies.get("a"), Some("1"));
        assert_eq!(cookies.get("b"), Some("2"));
        assert_eq!(cookies.get("c"), Some("3=3"));
        assert_eq!(cookies.get("malformed"), None);
        assert_eq!(cookies.get(""), None);
    }

    #[test]
    fn first_occurrence_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; a=2"));
        let cookies = RequestCookies::from_headers(&headers);
        assert_eq!(cookies.get("a"), Some("1"));
    }

    #[test]
    fn apply_set_and_remove() {
        let options = CookieOptions::default();
        let mut cookies: RequestCookies = [("session", "old"), ("theme", "dark")]
            .into_iter()
            .collect();

        cookies.apply(&CookieMutation::set("session", "new", Some(60), &options));
        cookies.apply(&CookieMutation::set("extra", "1", None, &options));
        assert_eq!(cookies.get("session"), Some("new"));
        assert_eq!(cookies.get("extra"), Some("1"));

        cookies.apply(&CookieMutation::remove("theme", &options));
        assert_eq!(cookies.get("theme"), None);
        assert_eq!(
            cookies.to_header_value().unwrap(),
            Some(HeaderValue::from_static("session=new; extra=1"))
        );
    }

    #[test]
    fn write_to_drops_header_when_empty() {
        let options = CookieOptions::default();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("only=1"));
        let mut cookies = RequestCookies::from_headers(&headers);

        cookies.apply(&CookieMutation::remove("only", &options));
        cookies.write_to(&mut headers).unwrap();
        assert!(headers.get(COOKIE).is_none());
    }

    #[test]
    fn set_cookie_rendering() {
        let options = CookieOptions::default();
        let set = CookieMutation::set("sb-access-token", "abc", Some(3600), &options);
        assert_eq!(
            set.to_set_cookie().unwrap(),
            "sb-access-token=abc; Path=/; Max-Age=3600; HttpOnly; SameSite=Lax; Secure"
        );

        let insecure = CookieOptions::default().with_secure(false);
        let removal = CookieMutation::remove("sb-access-token", &insecure);
        assert!(removal.is_removal());
        assert_eq!(
            removal.to_set_cookie().unwrap(),
            "sb-access-token=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn set_cookie_rejects_control_characters() {
        let options = CookieOptions::default();
        let bad = CookieMutation::set("a", "line\nbreak", None, &options);
        assert!(bad.to_set_cookie().is_err());
    }
}

//! Immutable route configuration: which paths skip the gate, which are
//! public, which need the admin role, and where redirects point.

use regex::Regex;
use url::form_urlencoded;

pub const ROOT_PATH: &str = "/";
pub const DEFAULT_HUB_PATH: &str = "/hub";
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_SIGNUP_PATH: &str = "/signup";
pub const DEFAULT_PUBLIC_PREFIX: &str = "/auth";
pub const DEFAULT_ADMIN_PREFIX: &str = "/admin";

const ASSET_PREFIXES: [&str; 3] = ["/_next/static", "/_next/image", "/favicon.ico"];
const IMAGE_EXTENSIONS: [&str; 6] = ["svg", "png", "jpg", "jpeg", "gif", "webp"];

#[derive(Clone, Debug)]
pub struct RoutePolicy {
    hub_path: String,
    login_path: String,
    signup_path: String,
    admin_prefix: String,
    public_prefixes: Vec<String>,
    public_paths: Vec<String>,
    excluded: Option<Regex>,
}

impl RoutePolicy {
    /// Default routes: hub `/hub`, public `/auth/*`, `/login` and `/signup`,
    /// admin `/admin/*`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hub_path: DEFAULT_HUB_PATH.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            signup_path: DEFAULT_SIGNUP_PATH.to_string(),
            admin_prefix: DEFAULT_ADMIN_PREFIX.to_string(),
            public_prefixes: vec![DEFAULT_PUBLIC_PREFIX.to_string()],
            public_paths: vec![
                DEFAULT_LOGIN_PATH.to_string(),
                DEFAULT_SIGNUP_PATH.to_string(),
            ],
            excluded: excluded_pattern(),
        }
    }

    #[must_use]
    pub fn with_hub_path(mut self, path: impl Into<String>) -> Self {
        self.hub_path = path.into();
        self
    }

    /// Sets the login path and keeps it reachable without a session.
    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        let login_path = &self.login_path;
        let signup_path = &self.signup_path;
        self.public_paths
            .retain(|p| p != login_path || p == signup_path);
        if !self.public_paths.contains(&path) {
            self.public_paths.push(path.clone());
        }
        self.login_path = path;
        self
    }

    /// Sets the signup path; the previous one is no longer public.
    #[must_use]
    pub fn with_signup_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        let login_path = &self.login_path;
        let signup_path = &self.signup_path;
        self.public_paths
            .retain(|p| p != signup_path || p == login_path);
        if !self.public_paths.contains(&path) {
            self.public_paths.push(path.clone());
        }
        self.signup_path = path;
        self
    }

    #[must_use]
    pub fn with_admin_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.admin_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_public_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.public_prefixes = prefixes;
        self
    }

    #[must_use]
    pub fn hub_path(&self) -> &str {
        &self.hub_path
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn signup_path(&self) -> &str {
        &self.signup_path
    }

    #[must_use]
    pub fn admin_prefix(&self) -> &str {
        &self.admin_prefix
    }

    /// Static assets and images never reach the gate.
    #[must_use]
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded.as_ref().is_some_and(|re| re.is_match(path))
    }

    #[must_use]
    pub fn is_root(&self, path: &str) -> bool {
        path == ROOT_PATH
    }

    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| p == path)
            || self
                .public_prefixes
                .iter()
                .any(|prefix| under_prefix(path, prefix))
    }

    /// Plain string prefix: `/admin`, `/admin/team` and `/administrator`
    /// all require the admin role.
    #[must_use]
    pub fn is_admin(&self, path: &str) -> bool {
        path.starts_with(self.admin_prefix.trim_end_matches('/'))
    }

    /// Login location carrying the originally requested path as `next`.
    #[must_use]
    pub fn login_redirect(&self, next: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("next", next)
            .finish();
        format!("{}?{query}", self.login_path)
    }
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Segment-aware prefix match for public prefixes: `/auth` covers `/auth`
/// and `/auth/callback` but not `/authority`.
fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn excluded_pattern() -> Option<Regex> {
    let prefixes = ASSET_PREFIXES
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    let extensions = IMAGE_EXTENSIONS.join("|");
    let pattern = format!(r"^(?:{prefixes})(?:/|$)|\.(?:{extensions})$");
    Regex::new(&pattern).ok()
}

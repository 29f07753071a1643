//! Identity resolution seam.
//!
//! A resolver answers "who is the current user?" from the request cookies and
//! reports any cookie writes (session refresh, stale cookie cleanup) as data
//! instead of mutating the request.

mod hosted;
mod session;

pub use hosted::{
    DEFAULT_ACCESS_TOKEN_COOKIE, DEFAULT_REFRESH_TOKEN_COOKIE, HostedIdentityProvider,
    HostedProviderConfig,
};
pub use session::{DEFAULT_SESSION_COOKIE, SessionStore, SessionStoreConfig};

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    cookies::{CookieMutation, RequestCookies},
    error::GateError,
};

/// Authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// Outcome of one resolution: the identity, if any, plus cookies to write back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub identity: Option<Identity>,
    pub mutations: Vec<CookieMutation>,
}

impl Resolution {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            mutations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_mutations(mut self, mutations: Vec<CookieMutation>) -> Self {
        self.mutations = mutations;
        self
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve the caller from request cookies.
    ///
    /// # Errors
    /// Returns an error when the backing provider cannot be reached or answers
    /// with something other than a user or an authentication rejection.
    async fn resolve(&self, cookies: &RequestCookies) -> Result<Resolution, GateError>;
}

pub(crate) fn parse_user_id(raw: &str) -> Result<Uuid, GateError> {
    Uuid::parse_str(raw).map_err(|_| GateError::InvalidUserId(raw.to_string()))
}

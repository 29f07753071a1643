//! Request gate: authentication and role checks in front of the dashboard.
//!
//! [`Gate::evaluate`] is a pure decision over the request path and cookies,
//! with two external calls (identity, then role for admin paths). The axum
//! wiring lives in [`middleware`].

pub mod cookies;
mod error;
pub mod identity;
pub mod middleware;
pub mod roles;
pub mod routes;

pub use cookies::{CookieMutation, CookieOptions, RequestCookies, SameSite};
pub use error::GateError;
pub use identity::{
    HostedIdentityProvider, HostedProviderConfig, Identity, IdentityResolver, Resolution,
    SessionStore, SessionStoreConfig,
};
pub use roles::{MerchantRoles, Role, RoleLookup};
pub use routes::RoutePolicy;

use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_DEV_BYPASS_COOKIE: &str = "mock-session";
const DEV_BYPASS_VALUE: &str = "true";

/// Where a rejected request is sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Redirect {
    /// Unauthenticated: login page, then back to `next`.
    Login { next: String },
    /// Root shortcut, or authenticated without the admin role.
    Hub,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Redirect(Redirect),
}

/// Decision for one request plus the cookie writes to apply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub outcome: Outcome,
    pub identity: Option<Identity>,
    pub mutations: Vec<CookieMutation>,
}

impl Evaluation {
    fn redirect(redirect: Redirect, resolution: Resolution) -> Self {
        Self {
            outcome: Outcome::Redirect(redirect),
            identity: resolution.identity,
            mutations: resolution.mutations,
        }
    }
}

pub struct Gate {
    policy: RoutePolicy,
    identity: Arc<dyn IdentityResolver>,
    roles: Arc<dyn RoleLookup>,
    dev_bypass_cookie: Option<String>,
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("policy", &self.policy)
            .field("dev_bypass_cookie", &self.dev_bypass_cookie)
            .finish_non_exhaustive()
    }
}

impl Gate {
    /// Gate with the development bypass cookie enabled.
    #[must_use]
    pub fn new(
        policy: RoutePolicy,
        identity: Arc<dyn IdentityResolver>,
        roles: Arc<dyn RoleLookup>,
    ) -> Self {
        Self {
            policy,
            identity,
            roles,
            dev_bypass_cookie: Some(DEFAULT_DEV_BYPASS_COOKIE.to_string()),
        }
    }

    /// `None` disables the development bypass.
    #[must_use]
    pub fn with_dev_bypass_cookie(mut self, name: Option<String>) -> Self {
        self.dev_bypass_cookie = name;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    #[must_use]
    pub fn dev_bypass_cookie(&self) -> Option<&str> {
        self.dev_bypass_cookie.as_deref()
    }

    fn has_dev_bypass(&self, cookies: &RequestCookies) -> bool {
        self.dev_bypass_cookie
            .as_deref()
            .is_some_and(|name| cookies.get(name) == Some(DEV_BYPASS_VALUE))
    }

    /// Decide what happens to a request for `path`.
    ///
    /// Provider failures are logged and treated as "no identity"; role store
    /// failures as "no record".
    pub async fn evaluate(&self, path: &str, cookies: &RequestCookies) -> Evaluation {
        if self.policy.is_root(path) {
            return Evaluation::redirect(Redirect::Hub, Resolution::anonymous());
        }

        let resolution = match self.identity.resolve(cookies).await {
            Ok(resolution) => resolution,
            Err(err) => {
                warn!("identity resolution failed: {err}");
                Resolution::anonymous()
            }
        };

        let is_public = self.policy.is_public(path);
        let bypass = self.has_dev_bypass(cookies);

        if resolution.identity.is_none() && !is_public && !bypass {
            debug!(path, "no session, redirecting to login");
            return Evaluation::redirect(
                Redirect::Login {
                    next: path.to_string(),
                },
                resolution,
            );
        }

        if let Some(identity) = &resolution.identity
            && self.policy.is_admin(path)
        {
            let role = match self.roles.lookup_role(identity.user_id).await {
                Ok(role) => role,
                Err(err) => {
                    warn!(user_id = %identity.user_id, "role lookup failed: {err}");
                    None
                }
            }
            .unwrap_or_else(Role::least_privileged);

            if !role.is_admin() {
                debug!(path, user_id = %identity.user_id, %role, "admin path denied");
                return Evaluation::redirect(Redirect::Hub, resolution);
            }
        }

        Evaluation {
            outcome: Outcome::Continue,
            identity: resolution.identity,
            mutations: resolution.mutations,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    pub const SESSION_COOKIE: &str = "test-session";

    /// Resolves `test-session=<uuid>` cookies; `test-session=boom` fails.
    #[derive(Default)]
    pub struct FakeResolver {
        pub calls: AtomicUsize,
        pub mutations: Vec<CookieMutation>,
    }

    #[async_trait]
    impl IdentityResolver for FakeResolver {
        async fn resolve(&self, cookies: &RequestCookies) -> Result<Resolution, GateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let resolution = match cookies.get(SESSION_COOKIE) {
                Some("boom") => return Err(GateError::InvalidUserId("boom".to_string())),
                Some(raw) => Resolution::authenticated(Identity {
                    user_id: identity::parse_user_id(raw)?,
                    email: None,
                }),
                None => Resolution::anonymous(),
            };
            Ok(resolution.with_mutations(self.mutations.clone()))
        }
    }

    #[derive(Default)]
    pub struct FakeRoles {
        pub calls: AtomicUsize,
        pub roles: HashMap<Uuid, Role>,
        pub fail: bool,
    }

    #[async_trait]
    impl RoleLookup for FakeRoles {
        async fn lookup_role(&self, user_id: Uuid) -> Result<Option<Role>, GateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GateError::InvalidUserId(user_id.to_string()));
            }
            Ok(self.roles.get(&user_id).cloned())
        }
    }

    pub const ADMIN: &str = "00000000-0000-4000-8000-000000000001";
    pub const VIEWER: &str = "00000000-0000-4000-8000-000000000002";
    pub const NO_RECORD: &str = "00000000-0000-4000-8000-000000000003";
    pub const SUPPORT: &str = "00000000-0000-4000-8000-000000000004";

    pub fn fake_roles() -> FakeRoles {
        let mut roles = HashMap::new();
        for (id, role) in [
            (ADMIN, Role::Admin),
            (VIEWER, Role::Viewer),
            (SUPPORT, Role::Other("support".to_string())),
        ] {
            if let Ok(id) = Uuid::parse_str(id) {
                roles.insert(id, role);
            }
        }
        FakeRoles {
            roles,
            ..FakeRoles::default()
        }
    }
}

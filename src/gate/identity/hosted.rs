//! Hosted auth provider client.
//!
//! The provider issues an access token and a refresh token, stored in two
//! cookies. An access token is verified with `GET /auth/v1/user`; when the
//! provider rejects it, the refresh token is exchanged through
//! `POST /auth/v1/token?grant_type=refresh_token` and both cookies are
//! rewritten. A rejected refresh token clears both cookies.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::{Identity, IdentityResolver, Resolution, parse_user_id};
use crate::gate::{
    cookies::{CookieMutation, CookieOptions, RequestCookies},
    error::GateError,
};

pub const DEFAULT_ACCESS_TOKEN_COOKIE: &str = "sb-access-token";
pub const DEFAULT_REFRESH_TOKEN_COOKIE: &str = "sb-refresh-token";
const DEFAULT_SESSION_TTL_SECONDS: i64 = 604_800;
const REQUEST_TIMEOUT_SECONDS: u64 = 5;

#[derive(Clone, Debug)]
pub struct HostedProviderConfig {
    base_url: Url,
    api_key: SecretString,
    access_cookie: String,
    refresh_cookie: String,
    session_ttl_seconds: i64,
    cookie_options: CookieOptions,
}

impl HostedProviderConfig {
    #[must_use]
    pub fn new(base_url: Url, api_key: SecretString) -> Self {
        Self {
            base_url,
            api_key,
            access_cookie: DEFAULT_ACCESS_TOKEN_COOKIE.to_string(),
            refresh_cookie: DEFAULT_REFRESH_TOKEN_COOKIE.to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            cookie_options: CookieOptions::default(),
        }
    }

    #[must_use]
    pub fn with_access_cookie(mut self, name: impl Into<String>) -> Self {
        self.access_cookie = name.into();
        self
    }

    #[must_use]
    pub fn with_refresh_cookie(mut self, name: impl Into<String>) -> Self {
        self.refresh_cookie = name.into();
        self
    }

    /// Lifetime of the refresh token cookie.
    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cookie_options(mut self, options: CookieOptions) -> Self {
        self.cookie_options = options;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: ProviderUser,
}

impl TryFrom<ProviderUser> for Identity {
    type Error = GateError;

    fn try_from(user: ProviderUser) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: parse_user_id(&user.id)?,
            email: user.email,
        })
    }
}

enum TokenCheck {
    Valid(Identity),
    Rejected,
}

#[derive(Debug)]
pub struct HostedIdentityProvider {
    client: Client,
    config: HostedProviderConfig,
    user_url: Url,
    token_url: Url,
}

impl HostedIdentityProvider {
    /// # Errors
    /// Returns an error if the provider endpoints cannot be derived from the base URL
    /// or the HTTP client cannot be built.
    pub fn new(config: HostedProviderConfig) -> Result<Self, GateError> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;
        let base = with_trailing_slash(&config.base_url);
        let user_url = base.join("auth/v1/user")?;
        let mut token_url = base.join("auth/v1/token")?;
        token_url
            .query_pairs_mut()
            .append_pair("grant_type", "refresh_token");

        Ok(Self {
            client,
            config,
            user_url,
            token_url,
        })
    }

    #[instrument(skip_all)]
    async fn fetch_user(&self, access_token: &str) -> Result<TokenCheck, GateError> {
        let response = self
            .client
            .get(self.user_url.clone())
            .header("apikey", self.config.api_key.expose_secret())
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let user: ProviderUser = response.json().await?;
                Ok(TokenCheck::Valid(user.try_into()?))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(TokenCheck::Rejected),
            status => Err(GateError::ProviderStatus(status)),
        }
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<Resolution, GateError> {
        let response = self
            .client
            .post(self.token_url.clone())
            .header("apikey", self.config.api_key.expose_secret())
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let grant: TokenGrant = response.json().await?;
                let options = &self.config.cookie_options;
                let mutations = vec![
                    CookieMutation::set(
                        &self.config.access_cookie,
                        grant.access_token,
                        Some(grant.expires_in),
                        options,
                    ),
                    CookieMutation::set(
                        &self.config.refresh_cookie,
                        grant.refresh_token,
                        Some(self.config.session_ttl_seconds),
                        options,
                    ),
                ];
                debug!("session refreshed");
                Ok(Resolution::authenticated(grant.user.try_into()?).with_mutations(mutations))
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                debug!("refresh token rejected, clearing session cookies");
                Ok(Resolution::anonymous().with_mutations(self.clear_cookies()))
            }
            status => Err(GateError::ProviderStatus(status)),
        }
    }

    fn clear_cookies(&self) -> Vec<CookieMutation> {
        let options = &self.config.cookie_options;
        vec![
            CookieMutation::remove(&self.config.access_cookie, options),
            CookieMutation::remove(&self.config.refresh_cookie, options),
        ]
    }
}

#[async_trait]
impl IdentityResolver for HostedIdentityProvider {
    async fn resolve(&self, cookies: &RequestCookies) -> Result<Resolution, GateError> {
        let access = cookies
            .get(&self.config.access_cookie)
            .filter(|v| !v.is_empty());
        let refresh = cookies
            .get(&self.config.refresh_cookie)
            .filter(|v| !v.is_empty());

        if let Some(token) = access
            && let TokenCheck::Valid(identity) = self.fetch_user(token).await?
        {
            return Ok(Resolution::authenticated(identity));
        }

        match refresh {
            Some(token) => self.refresh(token).await,
            None if access.is_some() => {
                // Expired access token with nothing to refresh it.
                Ok(Resolution::anonymous().with_mutations(vec![CookieMutation::remove(
                    &self.config.access_cookie,
                    &self.config.cookie_options,
                )]))
            }
            None => Ok(Resolution::anonymous()),
        }
    }
}

fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

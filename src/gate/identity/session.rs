//! Database-backed sessions with sliding expiry.
//!
//! The cookie carries a random token; only its SHA-256 hash is stored in
//! `user_sessions`. Sessions close to expiry are extended and the cookie is
//! re-issued with a fresh `Max-Age`.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{Instrument, debug};
use uuid::Uuid;

use super::{Identity, IdentityResolver, Resolution};
use crate::gate::{
    cookies::{CookieMutation, CookieOptions, RequestCookies},
    error::GateError,
};

pub const DEFAULT_SESSION_COOKIE: &str = "riglify_session";
const DEFAULT_SESSION_TTL_SECONDS: i64 = 604_800;
const DEFAULT_REFRESH_THRESHOLD_SECONDS: i64 = 86_400;

#[derive(Clone, Debug)]
pub struct SessionStoreConfig {
    cookie_name: String,
    ttl_seconds: i64,
    refresh_threshold_seconds: i64,
    cookie_options: CookieOptions,
}

impl SessionStoreConfig {
    /// Default config: `riglify_session` cookie, 7 day TTL, refreshed when
    /// less than a day remains.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            refresh_threshold_seconds: DEFAULT_REFRESH_THRESHOLD_SECONDS,
            cookie_options: CookieOptions::default(),
        }
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_threshold_seconds(mut self, seconds: i64) -> Self {
        self.refresh_threshold_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cookie_options(mut self, options: CookieOptions) -> Self {
        self.cookie_options = options;
        self
    }

    fn needs_refresh(&self, expires_at_unix: i64, now_unix: i64) -> bool {
        expires_at_unix - now_unix < self.refresh_threshold_seconds
    }
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct SessionRow {
    user_id: Uuid,
    email: String,
    expires_at_unix: i64,
}

#[derive(Clone, Debug)]
pub struct SessionStore {
    pool: PgPool,
    config: SessionStoreConfig,
}

impl SessionStore {
    #[must_use]
    pub fn new(pool: PgPool, config: SessionStoreConfig) -> Self {
        Self { pool, config }
    }

    async fn lookup(&self, token_hash: &[u8]) -> Result<Option<SessionRow>, GateError> {
        // Only unexpired sessions of active users count.
        let query = r"
            SELECT users.id, users.email,
                   EXTRACT(EPOCH FROM user_sessions.expires_at)::BIGINT AS expires_at_unix
            FROM user_sessions
            JOIN users ON users.id = user_sessions.user_id
            WHERE user_sessions.session_hash = $1
              AND user_sessions.expires_at > NOW()
              AND users.status = 'active'
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.map(|row| SessionRow {
            user_id: row.get("id"),
            email: row.get("email"),
            expires_at_unix: row.get("expires_at_unix"),
        }))
    }

    async fn extend(&self, token_hash: &[u8]) -> Result<(), GateError> {
        let query = r"
            UPDATE user_sessions
            SET expires_at = NOW() + make_interval(secs => $2)
            WHERE session_hash = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        #[allow(clippy::cast_precision_loss)]
        let ttl = self.config.ttl_seconds as f64;
        sqlx::query(query)
            .bind(token_hash)
            .bind(ttl)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityResolver for SessionStore {
    async fn resolve(&self, cookies: &RequestCookies) -> Result<Resolution, GateError> {
        let Some(token) = cookies
            .get(&self.config.cookie_name)
            .filter(|v| !v.is_empty())
        else {
            return Ok(Resolution::anonymous());
        };

        let token_hash = hash_session_token(token);
        let Some(session) = self.lookup(&token_hash).await? else {
            debug!("unknown or expired session cookie");
            return Ok(
                Resolution::anonymous().with_mutations(vec![CookieMutation::remove(
                    &self.config.cookie_name,
                    &self.config.cookie_options,
                )]),
            );
        };

        let identity = Identity {
            user_id: session.user_id,
            email: Some(session.email),
        };

        if !self.config.needs_refresh(session.expires_at_unix, unix_now()) {
            return Ok(Resolution::authenticated(identity));
        }

        self.extend(&token_hash).await?;
        debug!("session extended");
        Ok(
            Resolution::authenticated(identity).with_mutations(vec![CookieMutation::set(
                &self.config.cookie_name,
                token,
                Some(self.config.ttl_seconds),
                &self.config.cookie_options,
            )]),
        )
    }
}

/// Hash a session token so raw values never touch the database.
pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_sha256() {
        let hash = hash_session_token("token");
        assert_eq!(hash.len(), 32);
        assert_eq!(hash, hash_session_token("token"));
        assert_ne!(hash, hash_session_token("other"));
    }

    #[test]
    fn refresh_threshold() {
        let config = SessionStoreConfig::new().with_refresh_threshold_seconds(100);
        assert!(config.needs_refresh(1_050, 1_000));
        assert!(!config.needs_refresh(1_100, 1_000));
        assert!(!config.needs_refresh(5_000, 1_000));
    }

    #[test]
    fn config_defaults() {
        let config = SessionStoreConfig::default();
        assert_eq!(config.cookie_name, DEFAULT_SESSION_COOKIE);
        assert_eq!(config.ttl_seconds, 604_800);
        assert_eq!(config.refresh_threshold_seconds, 86_400);
        assert!(config.cookie_options.secure);
    }

    mod storage {
        use super::*;
        use crate::test_postgres::{ensure_container_runtime, insert_user, pool};
        use anyhow::Result;
        use sqlx::postgres::PgPoolOptions;

        async fn insert_session(
            pool: &PgPool,
            user_id: Uuid,
            token: &str,
            expires_in_seconds: i64,
        ) -> Result<()> {
            sqlx::query(
                "INSERT INTO user_sessions (user_id, session_hash, expires_at) \
                 VALUES ($1, $2, NOW() + make_interval(secs => $3))",
            )
            .bind(user_id)
            .bind(hash_session_token(token))
            .bind(expires_in_seconds as f64)
            .execute(pool)
            .await?;
            Ok(())
        }

        async fn expires_in(pool: &PgPool, token: &str) -> Result<i64> {
            let seconds: i64 = sqlx::query_scalar(
                "SELECT EXTRACT(EPOCH FROM expires_at - NOW())::BIGINT \
                 FROM user_sessions WHERE session_hash = $1",
            )
            .bind(hash_session_token(token))
            .fetch_one(pool)
            .await?;
            Ok(seconds)
        }

        fn cookie(token: &str) -> RequestCookies {
            [(DEFAULT_SESSION_COOKIE, token)].into_iter().collect()
        }

        fn token() -> String {
            Uuid::new_v4().simple().to_string()
        }

        #[tokio::test]
        async fn missing_cookie_skips_the_database() -> Result<()> {
            let pool = PgPoolOptions::new()
                .acquire_timeout(std::time::Duration::from_millis(200))
                .connect_lazy("postgres://riglify@127.0.0.1:1/riglify")?;
            let store = SessionStore::new(pool, SessionStoreConfig::new());

            let resolution = store.resolve(&RequestCookies::default()).await?;
            assert_eq!(resolution, Resolution::anonymous());

            let resolution = store.resolve(&cookie("")).await?;
            assert_eq!(resolution, Resolution::anonymous());
            Ok(())
        }

        #[tokio::test]
        async fn fresh_session_resolves_without_cookie_writes() -> Result<()> {
            if let Err(err) = ensure_container_runtime() {
                eprintln!("Skipping integration test: {err}");
                return Ok(());
            }
            let pool = pool().await?;
            let user_id = insert_user(&pool, "active").await?;
            let token = token();
            insert_session(&pool, user_id, &token, 604_800).await?;

            let store = SessionStore::new(pool, SessionStoreConfig::new());
            let resolution = store.resolve(&cookie(&token)).await?;

            assert_eq!(resolution.identity.map(|i| i.user_id), Some(user_id));
            assert!(resolution.mutations.is_empty());
            Ok(())
        }

        #[tokio::test]
        async fn unknown_token_clears_cookie() -> Result<()> {
            if let Err(err) = ensure_container_runtime() {
                eprintln!("Skipping integration test: {err}");
                return Ok(());
            }
            let store = SessionStore::new(pool().await?, SessionStoreConfig::new());
            let resolution = store.resolve(&cookie(&token())).await?;

            assert!(resolution.identity.is_none());
            assert_eq!(resolution.mutations.len(), 1);
            assert!(resolution.mutations[0].is_removal());
            assert_eq!(resolution.mutations[0].name, DEFAULT_SESSION_COOKIE);
            Ok(())
        }

        #[tokio::test]
        async fn expired_session_clears_cookie() -> Result<()> {
            if let Err(err) = ensure_container_runtime() {
                eprintln!("Skipping integration test: {err}");
                return Ok(());
            }
            let pool = pool().await?;
            let user_id = insert_user(&pool, "active").await?;
            let token = token();
            insert_session(&pool, user_id, &token, -3600).await?;

            let store = SessionStore::new(pool, SessionStoreConfig::new());
            let resolution = store.resolve(&cookie(&token)).await?;

            assert!(resolution.identity.is_none());
            assert!(resolution.mutations.iter().all(CookieMutation::is_removal));
            assert_eq!(resolution.mutations.len(), 1);
            Ok(())
        }

        #[tokio::test]
        async fn inactive_user_is_anonymous() -> Result<()> {
            if let Err(err) = ensure_container_runtime() {
                eprintln!("Skipping integration test: {err}");
                return Ok(());
            }
            let pool = pool().await?;
            let user_id = insert_user(&pool, "disabled").await?;
            let token = token();
            insert_session(&pool, user_id, &token, 604_800).await?;

            let store = SessionStore::new(pool, SessionStoreConfig::new());
            let resolution = store.resolve(&cookie(&token)).await?;

            assert!(resolution.identity.is_none());
            Ok(())
        }

        #[tokio::test]
        async fn session_near_expiry_is_extended() -> Result<()> {
            if let Err(err) = ensure_container_runtime() {
                eprintln!("Skipping integration test: {err}");
                return Ok(());
            }
            let pool = pool().await?;
            let user_id = insert_user(&pool, "active").await?;
            let token = token();
            insert_session(&pool, user_id, &token, 3600).await?;

            let store = SessionStore::new(pool.clone(), SessionStoreConfig::new());
            let resolution = store.resolve(&cookie(&token)).await?;

            assert_eq!(resolution.identity.map(|i| i.user_id), Some(user_id));
            assert_eq!(
                resolution.mutations,
                vec![CookieMutation::set(
                    DEFAULT_SESSION_COOKIE,
                    token.as_str(),
                    Some(604_800),
                    &CookieOptions::default(),
                )]
            );
            // Pushed out to the full TTL, allowing for clock drift during the test.
            assert!(expires_in(&pool, &token).await? > 604_800 - 60);
            Ok(())
        }
    }
}

use crate::{
    api,
    cli::commands::{gate as gate_args, identity as identity_args},
    gate::{
        CookieOptions, Gate, HostedIdentityProvider, HostedProviderConfig, IdentityResolver,
        MerchantRoles, RoutePolicy, SessionStore, SessionStoreConfig,
    },
};
use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub upstream_url: Url,
    pub gate: gate_args::Options,
    pub identity: identity_args::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the identity backend
/// cannot be built, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let pool = api::connect(&args.dsn).await?;

    let cookie_options = CookieOptions::default().with_secure(args.gate.secure_cookies);
    let identity = resolver(&args.identity, cookie_options, pool.clone())?;

    let policy = RoutePolicy::new()
        .with_hub_path(args.gate.hub_path.clone())
        .with_login_path(args.gate.login_path.clone())
        .with_signup_path(args.gate.signup_path.clone())
        .with_admin_prefix(args.gate.admin_prefix.clone())
        .with_public_prefixes(args.gate.public_prefixes.clone());

    if let Some(cookie) = &args.gate.dev_bypass_cookie {
        warn!(
            cookie = %cookie,
            "Development bypass is enabled: `{cookie}=true` skips the login redirect"
        );
    }

    let gate = Gate::new(policy, identity, Arc::new(MerchantRoles::new(pool.clone())))
        .with_dev_bypass_cookie(args.gate.dev_bypass_cookie.clone());

    let upstream = api::Upstream::new(args.upstream_url)?;

    api::new(args.port, pool, Arc::new(gate), Arc::new(upstream)).await
}

fn resolver(
    options: &identity_args::Options,
    cookie_options: CookieOptions,
    pool: PgPool,
) -> Result<Arc<dyn IdentityResolver>> {
    let resolver: Arc<dyn IdentityResolver> = match &options.backend {
        identity_args::Backend::Hosted {
            url,
            api_key,
            access_cookie,
            refresh_cookie,
        } => {
            let config = HostedProviderConfig::new(url.clone(), api_key.clone())
                .with_access_cookie(access_cookie.clone())
                .with_refresh_cookie(refresh_cookie.clone())
                .with_session_ttl_seconds(options.session_ttl_seconds)
                .with_cookie_options(cookie_options);
            Arc::new(HostedIdentityProvider::new(config)?)
        }
        identity_args::Backend::Session { cookie } => {
            let config = SessionStoreConfig::new()
                .with_cookie_name(cookie.clone())
                .with_ttl_seconds(options.session_ttl_seconds)
                .with_refresh_threshold_seconds(options.session_refresh_seconds)
                .with_cookie_options(cookie_options);
            Arc::new(SessionStore::new(pool, config))
        }
    };
    Ok(resolver)
}

fn log_startup_args(args: &Args) {
    let backend = match &args.identity.backend {
        identity_args::Backend::Hosted { url, .. } => format!("hosted ({url})"),
        identity_args::Backend::Session { cookie } => format!("session (cookie {cookie})"),
    };
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("upstream", args.upstream_url.to_string()),
        ("identity", backend),
        ("hub_path", args.gate.hub_path.clone()),
        ("login_path", args.gate.login_path.clone()),
        ("admin_prefix", args.gate.admin_prefix.clone()),
        ("public_prefixes", args.gate.public_prefixes.join(",")),
        (
            "dev_bypass_cookie",
            args.gate
                .dev_bypass_cookie
                .clone()
                .unwrap_or_else(|| "disabled".to_string()),
        ),
        ("secure_cookies", args.gate.secure_cookies.to_string()),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "riglify {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

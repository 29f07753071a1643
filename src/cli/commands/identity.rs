use clap::{Arg, ArgMatches, Command, builder::PossibleValuesParser};
use secrecy::SecretString;
use url::Url;

use crate::gate::identity::{
    DEFAULT_ACCESS_TOKEN_COOKIE, DEFAULT_REFRESH_TOKEN_COOKIE, DEFAULT_SESSION_COOKIE,
};

pub const ARG_BACKEND: &str = "identity-backend";
pub const ARG_IDENTITY_URL: &str = "identity-url";
pub const ARG_IDENTITY_API_KEY: &str = "identity-api-key";
pub const ARG_ACCESS_TOKEN_COOKIE: &str = "access-token-cookie";
pub const ARG_REFRESH_TOKEN_COOKIE: &str = "refresh-token-cookie";
pub const ARG_SESSION_COOKIE: &str = "session-cookie";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_SESSION_REFRESH_SECONDS: &str = "session-refresh-seconds";

const BACKEND_HOSTED: &str = "hosted";
const BACKEND_SESSION: &str = "session";

/// Where session cookies are turned into identities.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Hosted auth provider; tokens are verified and refreshed over HTTP.
    Hosted {
        url: Url,
        api_key: SecretString,
        access_cookie: String,
        refresh_cookie: String,
    },
    /// Sessions stored in the `user_sessions` table.
    Session { cookie: String },
}

#[derive(Debug, Clone)]
pub struct Options {
    pub backend: Backend,
    pub session_ttl_seconds: i64,
    pub session_refresh_seconds: i64,
}

impl Options {
    /// Parse identity backend arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the hosted backend is selected without a valid
    /// provider URL and API key.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let string = |id: &str| matches.get_one::<String>(id).cloned().unwrap_or_default();

        let backend = match matches
            .get_one::<String>(ARG_BACKEND)
            .map_or(BACKEND_HOSTED, String::as_str)
        {
            BACKEND_SESSION => Backend::Session {
                cookie: string(ARG_SESSION_COOKIE),
            },
            _ => {
                let url = matches.get_one::<String>(ARG_IDENTITY_URL).ok_or_else(|| {
                    anyhow::anyhow!("missing required argument: --{ARG_IDENTITY_URL}")
                })?;
                let url = Url::parse(url)
                    .map_err(|e| anyhow::anyhow!("invalid --{ARG_IDENTITY_URL}: {e}"))?;
                let api_key = matches
                    .get_one::<String>(ARG_IDENTITY_API_KEY)
                    .filter(|key| !key.trim().is_empty())
                    .ok_or_else(|| {
                        anyhow::anyhow!("missing required argument: --{ARG_IDENTITY_API_KEY}")
                    })?;
                Backend::Hosted {
                    url,
                    api_key: SecretString::from(api_key.clone()),
                    access_cookie: string(ARG_ACCESS_TOKEN_COOKIE),
                    refresh_cookie: string(ARG_REFRESH_TOKEN_COOKIE),
                }
            }
        };

        let session_ttl_seconds = matches
            .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
            .copied()
            .unwrap_or(604_800);
        let session_refresh_seconds = matches
            .get_one::<i64>(ARG_SESSION_REFRESH_SECONDS)
            .copied()
            .unwrap_or(86_400);
        if session_refresh_seconds >= session_ttl_seconds {
            anyhow::bail!(
                "--{ARG_SESSION_REFRESH_SECONDS} ({session_refresh_seconds}) must be lower than --{ARG_SESSION_TTL_SECONDS} ({session_ttl_seconds})"
            );
        }

        Ok(Self {
            backend,
            session_ttl_seconds,
            session_refresh_seconds,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BACKEND)
                .long(ARG_BACKEND)
                .help("Identity backend")
                .env("RIGLIFY_IDENTITY_BACKEND")
                .value_parser(PossibleValuesParser::new([BACKEND_HOSTED, BACKEND_SESSION]))
                .default_value(BACKEND_HOSTED),
        )
        .arg(
            Arg::new(ARG_IDENTITY_URL)
                .long(ARG_IDENTITY_URL)
                .help("Hosted auth provider base URL, example: https://project.auth.tld")
                .env("RIGLIFY_IDENTITY_URL"),
        )
        .arg(
            Arg::new(ARG_IDENTITY_API_KEY)
                .long(ARG_IDENTITY_API_KEY)
                .help("Hosted auth provider public API key")
                .env("RIGLIFY_IDENTITY_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_COOKIE)
                .long(ARG_ACCESS_TOKEN_COOKIE)
                .help("Cookie holding the provider access token")
                .env("RIGLIFY_ACCESS_TOKEN_COOKIE")
                .default_value(DEFAULT_ACCESS_TOKEN_COOKIE),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_COOKIE)
                .long(ARG_REFRESH_TOKEN_COOKIE)
                .help("Cookie holding the provider refresh token")
                .env("RIGLIFY_REFRESH_TOKEN_COOKIE")
                .default_value(DEFAULT_REFRESH_TOKEN_COOKIE),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE)
                .long(ARG_SESSION_COOKIE)
                .help("Cookie holding the opaque session token (session backend)")
                .env("RIGLIFY_SESSION_COOKIE")
                .default_value(DEFAULT_SESSION_COOKIE),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds")
                .env("RIGLIFY_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(60..)),
        )
        .arg(
            Arg::new(ARG_SESSION_REFRESH_SECONDS)
                .long(ARG_SESSION_REFRESH_SECONDS)
                .help("Extend a session when less than this many seconds remain")
                .env("RIGLIFY_SESSION_REFRESH_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
}

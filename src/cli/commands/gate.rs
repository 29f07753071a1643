use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::gate::{
    DEFAULT_DEV_BYPASS_COOKIE,
    routes::{
        DEFAULT_ADMIN_PREFIX, DEFAULT_HUB_PATH, DEFAULT_LOGIN_PATH, DEFAULT_PUBLIC_PREFIX,
        DEFAULT_SIGNUP_PATH,
    },
};

pub const ARG_HUB_PATH: &str = "hub-path";
pub const ARG_LOGIN_PATH: &str = "login-path";
pub const ARG_SIGNUP_PATH: &str = "signup-path";
pub const ARG_PUBLIC_PREFIX: &str = "public-prefix";
pub const ARG_ADMIN_PREFIX: &str = "admin-prefix";
pub const ARG_DEV_BYPASS_COOKIE: &str = "dev-bypass-cookie";
pub const ARG_DISABLE_DEV_BYPASS: &str = "disable-dev-bypass";
pub const ARG_INSECURE_COOKIES: &str = "insecure-cookies";

#[derive(Debug, Clone)]
pub struct Options {
    pub hub_path: String,
    pub login_path: String,
    pub signup_path: String,
    pub public_prefixes: Vec<String>,
    pub admin_prefix: String,
    pub dev_bypass_cookie: Option<String>,
    pub secure_cookies: bool,
}

impl Options {
    /// Parse route and cookie arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a configured path does not start with `/`.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let path = |id: &str| -> anyhow::Result<String> {
            let value = matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .unwrap_or_default();
            if !value.starts_with('/') {
                anyhow::bail!("--{id} must start with '/', got: {value:?}");
            }
            Ok(value)
        };

        let public_prefixes = matches
            .get_many::<String>(ARG_PUBLIC_PREFIX)
            .map(|values| {
                values
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if let Some(bad) = public_prefixes.iter().find(|p| !p.starts_with('/')) {
            anyhow::bail!("--{ARG_PUBLIC_PREFIX} must start with '/', got: {bad:?}");
        }

        let dev_bypass_cookie = if matches.get_flag(ARG_DISABLE_DEV_BYPASS) {
            None
        } else {
            matches
                .get_one::<String>(ARG_DEV_BYPASS_COOKIE)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        Ok(Self {
            hub_path: path(ARG_HUB_PATH)?,
            login_path: path(ARG_LOGIN_PATH)?,
            signup_path: path(ARG_SIGNUP_PATH)?,
            public_prefixes,
            admin_prefix: path(ARG_ADMIN_PREFIX)?,
            dev_bypass_cookie,
            secure_cookies: !matches.get_flag(ARG_INSECURE_COOKIES),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_HUB_PATH)
                .long(ARG_HUB_PATH)
                .help("Landing path for `/` and for non-admins on admin paths")
                .env("RIGLIFY_HUB_PATH")
                .default_value(DEFAULT_HUB_PATH),
        )
        .arg(
            Arg::new(ARG_LOGIN_PATH)
                .long(ARG_LOGIN_PATH)
                .help("Login page; unauthenticated requests are redirected here with `next`")
                .env("RIGLIFY_LOGIN_PATH")
                .default_value(DEFAULT_LOGIN_PATH),
        )
        .arg(
            Arg::new(ARG_SIGNUP_PATH)
                .long(ARG_SIGNUP_PATH)
                .help("Signup page, reachable without a session")
                .env("RIGLIFY_SIGNUP_PATH")
                .default_value(DEFAULT_SIGNUP_PATH),
        )
        .arg(
            Arg::new(ARG_PUBLIC_PREFIX)
                .long(ARG_PUBLIC_PREFIX)
                .help("Path prefix reachable without a session (repeatable, comma separated)")
                .env("RIGLIFY_PUBLIC_PREFIX")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .default_value(DEFAULT_PUBLIC_PREFIX),
        )
        .arg(
            Arg::new(ARG_ADMIN_PREFIX)
                .long(ARG_ADMIN_PREFIX)
                .help("Path prefix that requires the admin merchant role")
                .env("RIGLIFY_ADMIN_PREFIX")
                .default_value(DEFAULT_ADMIN_PREFIX),
        )
        .arg(
            Arg::new(ARG_DEV_BYPASS_COOKIE)
                .long(ARG_DEV_BYPASS_COOKIE)
                .help("Cookie that, set to `true`, skips the login redirect (development only)")
                .env("RIGLIFY_DEV_BYPASS_COOKIE")
                .default_value(DEFAULT_DEV_BYPASS_COOKIE),
        )
        .arg(
            Arg::new(ARG_DISABLE_DEV_BYPASS)
                .long(ARG_DISABLE_DEV_BYPASS)
                .help("Ignore the development bypass cookie")
                .env("RIGLIFY_DISABLE_DEV_BYPASS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_INSECURE_COOKIES)
                .long(ARG_INSECURE_COOKIES)
                .help("Write session cookies without the Secure attribute (plain HTTP dev setups)")
                .env("RIGLIFY_INSECURE_COOKIES")
                .action(ArgAction::SetTrue),
        )
}

//! # Riglify (Dashboard Request Gate)
//!
//! `riglify` sits in front of the Riglify operations dashboard and decides,
//! for every inbound request, whether it may reach the dashboard.
//!
//! ## Decision Flow
//!
//! 1. Static assets (`/_next/static`, `/_next/image`, `/favicon.ico`, image
//!    extensions) skip the gate entirely.
//! 2. `/` always redirects to the hub path.
//! 3. The caller's identity is resolved from session cookies through an
//!    [`gate::IdentityResolver`]. Resolution may refresh the session, in which
//!    case the refreshed cookies are mirrored onto both the forwarded request
//!    and the response.
//! 4. Protected paths without an identity redirect to the login page with a
//!    `next` parameter pointing back to the requested path.
//! 5. Paths under `/admin` additionally require the `admin` merchant role,
//!    looked up through a [`gate::RoleLookup`]. A missing record counts as
//!    `viewer`. Non-admins are sent to the hub.
//!
//! The gate keeps no state between requests; role records are looked up on
//! every admin request.
//!
//! ## Development Bypass
//!
//! A `mock-session=true` cookie satisfies the authentication check (never the
//! role check). It is enabled by default and can be disabled with
//! `--disable-dev-bypass`.

pub mod api;
pub mod cli;
pub mod gate;

#[cfg(test)]
pub(crate) mod test_postgres;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

//! axum middleware applying [`Gate::evaluate`] to every request.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header::SET_COOKIE},
    middleware::Next,
    response::{IntoResponse, Redirect as RedirectResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use super::{CookieMutation, Gate, Outcome, Redirect, RequestCookies};

/// Gate middleware, for use with `axum::middleware::from_fn_with_state`.
///
/// Excluded paths go straight through. On `continue`, cookie mutations are
/// applied to the forwarded request and appended to the response; the
/// resolved [`super::Identity`], if any, is inserted into request extensions.
pub async fn enforce(State(gate): State<Arc<Gate>>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if gate.policy().is_excluded(&path) {
        return next.run(request).await;
    }

    let mut cookies = RequestCookies::from_headers(request.headers());
    let evaluation = gate.evaluate(&path, &cookies).await;

    let set_cookies = match set_cookie_headers(&evaluation.mutations) {
        Ok(headers) => headers,
        Err(err) => {
            error!("Failed to encode refreshed cookies: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response = match evaluation.outcome {
        Outcome::Redirect(Redirect::Hub) => {
            RedirectResponse::temporary(gate.policy().hub_path()).into_response()
        }
        Outcome::Redirect(Redirect::Login { next }) => {
            RedirectResponse::temporary(&gate.policy().login_redirect(&next)).into_response()
        }
        Outcome::Continue => {
            for mutation in &evaluation.mutations {
                cookies.apply(mutation);
            }
            if let Err(err) = cookies.write_to(request.headers_mut()) {
                error!("Failed to rewrite request cookies: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            if let Some(identity) = evaluation.identity {
                request.extensions_mut().insert(identity);
            }
            next.run(request).await
        }
    };

    let headers = response.headers_mut();
    for value in set_cookies {
        headers.append(SET_COOKIE, value);
    }
    response
}

fn set_cookie_headers(
    mutations: &[CookieMutation],
) -> Result<Vec<HeaderValue>, axum::http::header::InvalidHeaderValue> {
    mutations.iter().map(CookieMutation::to_set_cookie).collect()
}

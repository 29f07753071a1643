use crate::GIT_COMMIT_HASH;
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tracing::{Instrument, error, info_span};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
}

impl Health {
    fn new(database_ok: bool) -> Self {
        Self {
            commit: GIT_COMMIT_HASH.to_string(),
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: if database_ok { "ok" } else { "error" }.to_string(),
        }
    }

    /// `name:version:shorthash`, the short hash empty when unknown.
    fn app_header(&self) -> String {
        let short_hash = self.commit.get(..7).filter(|_| self.commit.len() > 7);
        format!(
            "{}:{}:{}",
            self.name,
            self.version,
            short_hash.unwrap_or_default()
        )
    }
}

async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut conn = pool
        .acquire()
        .instrument(info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        ))
        .await?;
    conn.ping()
        .instrument(info_span!(
            "db.ping",
            db.system = "postgresql",
            db.operation = "PING"
        ))
        .await
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Role store is reachable", body = [Health]),
        (status = 503, description = "Role store is unreachable", body = [Health])
    ),
    tag= "health"
)]
// axum handler for health
pub async fn health(method: Method, Extension(pool): Extension<PgPool>) -> Response {
    let status = match ping(&pool).await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            error!("Role store health check failed: {err}");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    let health = Health::new(status == StatusCode::OK);

    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&health.app_header()) {
        Ok(value) => {
            headers.insert("X-App", value);
        }
        Err(err) => error!("Failed to build X-App header: {err}"),
    }

    if method == Method::HEAD {
        (status, headers).into_response()
    } else {
        (status, headers, Json(health)).into_response()
    }
}

//! Merchant roles and the role lookup seam.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::fmt;
use tracing::Instrument;
use uuid::Uuid;

use super::error::GateError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Admin,
    Viewer,
    Other(String),
}

impl Role {
    /// Role assumed when no merchant record exists.
    #[must_use]
    pub const fn least_privileged() -> Self {
        Self::Viewer
    }

    /// Exact match on the stored value; `Admin` or ` admin` are not admin.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "admin" => Self::Admin,
            "viewer" => Self::Viewer,
            _ => Self::Other(raw.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Viewer => "viewer",
            Self::Other(role) => role,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait RoleLookup: Send + Sync {
    /// Fetch the merchant role for a user, `None` when no record exists.
    ///
    /// # Errors
    /// Returns an error when the role store cannot be queried.
    async fn lookup_role(&self, user_id: Uuid) -> Result<Option<Role>, GateError>;
}

/// Role records in the `merchants` table.
#[derive(Clone, Debug)]
pub struct MerchantRoles {
    pool: PgPool,
}

impl MerchantRoles {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleLookup for MerchantRoles {
    async fn lookup_role(&self, user_id: Uuid) -> Result<Option<Role>, GateError> {
        let query = "SELECT role FROM merchants WHERE id = $1 LIMIT 1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.and_then(|row| row.get::<Option<String>, _>("role").map(|r| Role::parse(&r))))
    }
}

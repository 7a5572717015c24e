#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Database side of rlskit.
//!
//! - [`session`]: writes an [`RlsContext`](rlskit_security::RlsContext) into
//!   `PostgreSQL` session variables, skipping other backends.
//! - [`RlsDb`]: pool handle whose connections and transactions are always
//!   handed out with the request's context applied, and whose released
//!   connections are scrubbed.
//! - [`autofill`]: fills RLS columns of new `SeaORM` records from the context.
//! - [`policy`]: renders `CREATE POLICY` migrations.
//! - [`migration_user`]: swaps in the policy-owner credentials for migrations.
//!
//! # Features
//! - `pg`, `sqlite`: enable `SQLx` backends
//! - `integration`: `PostgreSQL` testcontainer tests

#![cfg_attr(
    not(any(feature = "pg", feature = "sqlite")),
    allow(unused_imports, unused_variables, dead_code, unreachable_code)
)]

pub mod autofill;
pub mod migration_user;
pub mod policy;
pub mod pool;
mod pool_opts;
pub mod session;

pub use autofill::{AutofillError, RlsScopedEntity, autofill, scoped_insert};
pub use migration_user::migration_dsn;
pub use policy::{PolicyCommand, PolicyError, PolicyField, RlsPolicy, SqlType};
pub use pool::{RlsConn, RlsDb};
pub use pool_opts::ConnectOpts;
pub use session::{
    Applied, SessionAssignment, SessionMode, SessionPlan, SessionVarWriter, TxSessionWriter,
    apply_session, reset_session,
};

#[cfg(feature = "pg")]
pub use session::PgSessionWriter;

use thiserror::Error;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Unknown DSN: {0}")]
    UnknownDsn(String),

    #[error("Feature not enabled: {0}")]
    FeatureDisabled(&'static str),

    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),

    #[error("migration_user.enabled requires both user and password")]
    MissingMigrationCredentials,

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[cfg(any(feature = "pg", feature = "sqlite"))]
    #[error(transparent)]
    Sqlx(#[from] sea_orm::sqlx::Error),

    #[error(transparent)]
    Sea(#[from] sea_orm::DbErr),
}

/// Supported engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbEngine {
    Postgres,
    MySql,
    Sqlite,
}

impl DbEngine {
    /// Detect engine by DSN scheme.
    ///
    /// # Errors
    /// Returns `DbError::UnknownDsn` if the DSN scheme is not recognized.
    pub fn detect(dsn: &str) -> Result<Self> {
        // Trim only leading spaces/newlines to be forgiving with env files.
        let s = dsn.trim_start();

        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if s.starts_with("mysql://") {
            Ok(Self::MySql)
        } else if s.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else {
            Err(DbError::UnknownDsn(redact_dsn(dsn)))
        }
    }

    /// Whether the engine has `set_config()`/`current_setting()` session
    /// variables that RLS policies can read.
    #[must_use]
    pub fn supports_session_vars(self) -> bool {
        matches!(self, Self::Postgres)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }
}

impl From<sea_orm::DatabaseBackend> for DbEngine {
    fn from(b: sea_orm::DatabaseBackend) -> Self {
        match b {
            sea_orm::DatabaseBackend::Postgres => Self::Postgres,
            sea_orm::DatabaseBackend::MySql => Self::MySql,
            sea_orm::DatabaseBackend::Sqlite => Self::Sqlite,
        }
    }
}

/// Strip the password from a DSN for logs and error messages.
#[must_use]
pub fn redact_dsn(dsn: &str) -> String {
    let Ok(mut url) = url::Url::parse(dsn) else {
        return dsn.to_owned();
    };
    if url.password().is_none() || url.set_password(Some("***")).is_err() {
        return dsn.to_owned();
    }
    url.into()
}

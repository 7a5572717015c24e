//! Credentials swap for schema migrations.
//!
//! Policies must be owned by a role other than the one the application
//! connects as, otherwise the application role could alter them. When
//! `migration_user.enabled` is set, migration connections use that role.

use rlskit_security::MigrationUserSettings;
use secrecy::ExposeSecret;
use url::Url;

use crate::{DbError, Result, redact_dsn};

/// DSN to run migrations with.
///
/// Returns `dsn` unchanged when the migration user is disabled, otherwise
/// `dsn` with its user and password replaced.
///
/// # Errors
/// Returns `DbError::MissingMigrationCredentials` when enabled without both
/// user and password, and `DbError::InvalidDsn` when `dsn` is not a URL that
/// can carry credentials.
pub fn migration_dsn(dsn: &str, migration_user: &MigrationUserSettings) -> Result<String> {
    if !migration_user.enabled {
        return Ok(dsn.to_owned());
    }

    let (Some(user), Some(password)) = (&migration_user.user, &migration_user.password) else {
        return Err(DbError::MissingMigrationCredentials);
    };

    let mut url = Url::parse(dsn)?;
    if url.set_username(user).is_err()
        || url.set_password(Some(password.expose_secret())).is_err()
    {
        return Err(DbError::InvalidDsn(redact_dsn(dsn)));
    }

    tracing::info!(
        user = %user,
        host = url.host_str().unwrap_or_default(),
        "using migration user"
    );
    Ok(url.into())
}

//! Static RLS settings, loaded once at startup.

use figment::Figment;
use figment::providers::Serialized;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// `PostgreSQL` truncates identifiers longer than this.
pub const PG_IDENT_MAX: usize = 63;

pub const DEFAULT_NAMESPACE_PREFIX: &str = "rls";

/// Credentials of the role that owns RLS policies.
///
/// Migrations run as this role so the runtime role stays subject to the
/// policies it does not own.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationUserSettings {
    pub enabled: bool,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<SecretString>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RlsSettings {
    /// Fields that may be enforced through RLS, e.g. `tenant_id`, `user_id`.
    pub enforce_fields: Vec<String>,

    /// Entities (`"app.Model"`) whose RLS fields are auto-filled on create.
    pub tenant_scoped: Vec<String>,

    /// Entities excluded from auto-fill even when listed in `tenant_scoped`.
    pub skip_models: Vec<String>,

    /// Populate RLS fields on newly created records from the current context.
    pub auto_set_fields: bool,

    /// Namespace of the session variables read by `current_setting()`.
    ///
    /// Changing it breaks policies generated with the old prefix.
    pub session_namespace_prefix: String,

    pub migration_user: MigrationUserSettings,
}

impl Default for RlsSettings {
    fn default() -> Self {
        Self {
            enforce_fields: Vec::new(),
            tenant_scoped: Vec::new(),
            skip_models: Vec::new(),
            auto_set_fields: false,
            session_namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_owned(),
            migration_user: MigrationUserSettings::default(),
        }
    }
}

impl RlsSettings {
    /// Extract the `rls` section of a layered configuration, on top of the
    /// defaults, and validate it.
    ///
    /// # Errors
    /// Returns `SettingsError` if the section cannot be deserialized or fails
    /// validation.
    pub fn from_figment(figment: &Figment) -> Result<Self, SettingsError> {
        let settings: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(figment.focus("rls"))
            .extract()?;
        settings.validate()?;
        tracing::debug!(
            fields = ?settings.enforce_fields,
            prefix = %settings.session_namespace_prefix,
            auto_set_fields = settings.auto_set_fields,
            "RLS settings loaded"
        );
        Ok(settings)
    }

    /// # Errors
    /// Returns `SettingsError` on an empty prefix, an invalid or duplicate
    /// field name, or incomplete migration credentials.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.session_namespace_prefix.is_empty() {
            return Err(SettingsError::EmptyPrefix);
        }
        check_identifier("session_namespace_prefix", &self.session_namespace_prefix)?;

        for (i, field) in self.enforce_fields.iter().enumerate() {
            check_identifier("enforce_fields", field)?;
            if self.enforce_fields[..i].contains(field) {
                return Err(SettingsError::DuplicateField(field.clone()));
            }
        }

        let mu = &self.migration_user;
        if mu.enabled && (mu.user.is_none() || mu.password.is_none()) {
            return Err(SettingsError::MissingMigrationCredentials);
        }
        Ok(())
    }

    #[must_use]
    pub fn is_enforced(&self, field: &str) -> bool {
        self.enforce_fields.iter().any(|f| f == field)
    }

    /// True if records of `entity` get their RLS fields auto-filled.
    #[must_use]
    pub fn autofills(&self, entity: &str) -> bool {
        self.auto_set_fields
            && self.tenant_scoped.iter().any(|m| m == entity)
            && !self.skip_models.iter().any(|m| m == entity)
    }

    /// Session variable carrying the value of `field`, e.g. `rls.tenant_id`.
    #[must_use]
    pub fn value_var(&self, field: &str) -> String {
        format!("{}.{field}", self.session_namespace_prefix)
    }

    /// Session variable carrying the mode of `field`, e.g. `rls_mode.tenant_id`.
    #[must_use]
    pub fn mode_var(&self, field: &str) -> String {
        format!("{}_mode.{field}", self.session_namespace_prefix)
    }
}

/// Check that `value` is a plain SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`.
///
/// # Errors
/// Returns `SettingsError::InvalidIdentifier` describing the first violation.
pub fn check_identifier(setting: &'static str, value: &str) -> Result<(), SettingsError> {
    let invalid = |reason| SettingsError::InvalidIdentifier {
        setting,
        value: value.to_owned(),
        reason,
    };

    let mut chars = value.chars();
    match chars.next() {
        None => return Err(invalid("empty")),
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        Some(_) => return Err(invalid("must start with a letter or underscore")),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("only ASCII letters, digits and underscores are allowed"));
    }
    if value.len() > PG_IDENT_MAX {
        return Err(invalid("longer than 63 bytes"));
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = RlsSettings::default();
        assert_eq!(s.session_namespace_prefix, "rls");
        assert!(s.enforce_fields.is_empty());
        assert!(!s.auto_set_fields);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn variable_names() {
        let s = RlsSettings::default();
        assert_eq!(s.value_var("tenant_id"), "rls.tenant_id");
        assert_eq!(s.mode_var("tenant_id"), "rls_mode.tenant_id");
    }

    #[test]
    fn identifiers() {
        assert!(check_identifier("t", "tenant_id").is_ok());
        assert!(check_identifier("t", "_x1").is_ok());
        assert!(check_identifier("t", "").is_err());
        assert!(check_identifier("t", "1abc").is_err());
        assert!(check_identifier("t", "a.b").is_err());
        assert!(check_identifier("t", "x'; drop table t; --").is_err());
        assert!(check_identifier("t", &"a".repeat(64)).is_err());
    }

    #[test]
    fn duplicate_fields_rejected() {
        let s = RlsSettings {
            enforce_fields: vec!["tenant_id".to_owned(), "tenant_id".to_owned()],
            ..RlsSettings::default()
        };
        assert!(matches!(
            s.validate(),
            Err(SettingsError::DuplicateField(f)) if f == "tenant_id"
        ));
    }

    #[test]
    fn migration_user_needs_credentials() {
        let mut s = RlsSettings::default();
        s.migration_user.enabled = true;
        s.migration_user.user = Some("owner".to_owned());
        assert!(matches!(
            s.validate(),
            Err(SettingsError::MissingMigrationCredentials)
        ));

        s.migration_user.password = Some(SecretString::from("secret"));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn autofill_respects_skip_list() {
        let s = RlsSettings {
            auto_set_fields: true,
            tenant_scoped: vec!["app.Order".to_owned(), "core.AuditLog".to_owned()],
            skip_models: vec!["core.AuditLog".to_owned()],
            ..RlsSettings::default()
        };
        assert!(s.autofills("app.Order"));
        assert!(!s.autofills("core.AuditLog"));
        assert!(!s.autofills("app.Other"));

        let off = RlsSettings {
            auto_set_fields: false,
            ..s
        };
        assert!(!off.autofills("app.Order"));
    }
}
